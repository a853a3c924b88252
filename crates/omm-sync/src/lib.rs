//! Time-budgeted sync of ongoing tournaments and their matches into storage.
//!
//! A run walks games, then the ongoing tournaments of each game, then each
//! tournament's matches, all strictly in sequence. The [`DeadlineClock`] is
//! consulted before every game, every tournament, every page request and every
//! batch decision, so no new unit of work starts once the budget is spent.
//! Page and batch failures end only their own unit of work.

pub mod batch;
pub mod config;
pub mod telemetry;

use anyhow::{Context, Result};
use omm_adapters::{FaceitAdapter, Paginator, Resource, StopReason, UpstreamSource};
use omm_core::{is_excluded, roster_player_ids, DeadlineClock, MatchRecord, TournamentHandle};
use omm_storage::{HttpClientConfig, HttpFetcher, MatchSink, MemorySink, PostgrestSink, ReportStore};
use serde_json::Value as JsonValue;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use batch::{BatchWriter, FlushOutcome};
pub use config::{ConfigError, PipelineSettings, SyncConfig};
pub use telemetry::{FailureSummary, RunTelemetry, SyncRunSummary, RUN_MODE};

pub const CRATE_NAME: &str = "omm-sync";

/// Sample payloads are logged only for the first few match pages of a run.
const SAMPLE_PAGE_WINDOW: u64 = 5;
const SAMPLES_PER_TOURNAMENT: usize = 2;

pub struct SyncPipeline<S, K> {
    settings: PipelineSettings,
    source: S,
    sink: K,
    reports: Option<ReportStore>,
}

impl<S, K> SyncPipeline<S, K>
where
    S: UpstreamSource,
    K: MatchSink,
{
    pub fn new(settings: PipelineSettings, source: S, sink: K) -> Self {
        Self {
            settings,
            source,
            sink,
            reports: None,
        }
    }

    pub fn with_reports(mut self, reports: ReportStore) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let clock = DeadlineClock::start(self.settings.hard_timeout, self.settings.stop_with_left);
        let mut telemetry = RunTelemetry::new();
        let mut writer = BatchWriter::new(&self.sink, self.settings.upsert_batch_size);

        info!(
            %run_id,
            games = %self.settings.games.join(", "),
            budget_ms = self.settings.hard_timeout.as_millis() as u64,
            "syncing ongoing tournaments; upserting while streaming, skipping cancelled"
        );

        for game in &self.settings.games {
            if clock.exceeded() {
                warn!(game = %game, "deadline reached before starting game");
                telemetry.mark_deadline_reached();
                break;
            }
            self.sync_game(game, &clock, &mut telemetry, &mut writer)
                .instrument(info_span!("sync_game", game = %game))
                .await;
        }

        let summary = telemetry.finalize(run_id, &self.settings.games, clock.elapsed());
        summary.log();

        if let Some(reports) = &self.reports {
            let path = reports
                .store_json(run_id, "summary.json", &summary)
                .await
                .context("persisting run summary")?;
            info!(path = %path.display(), "run summary written");
        }

        Ok(summary)
    }

    async fn sync_game(
        &self,
        game: &str,
        clock: &DeadlineClock,
        telemetry: &mut RunTelemetry,
        writer: &mut BatchWriter<'_, K>,
    ) {
        info!("paging ongoing tournaments");
        let mut tournaments = Paginator::new(
            &self.source,
            Resource::OngoingTournaments {
                game: game.to_string(),
            },
            self.settings.tournament_limits(),
            *clock,
        );

        while let Some(item) = tournaments.next_item().await {
            if clock.exceeded() {
                warn!("deadline reached before starting next tournament");
                telemetry.mark_deadline_reached();
                break;
            }
            let Some(mut handle) = TournamentHandle::from_upstream(&item) else {
                warn!("tournament item without championship_id skipped");
                continue;
            };
            telemetry.tournaments_processed += 1;

            let span = info_span!("tournament", id = %handle.id, name = %handle.name);
            self.sync_tournament(game, &mut handle, clock, telemetry, writer)
                .instrument(span)
                .await;
        }

        telemetry.tournament_pages_fetched += tournaments.pages_fetched();
        if tournaments.stop_reason() == Some(StopReason::DeadlineExceeded) {
            telemetry.mark_deadline_reached();
        }
    }

    async fn sync_tournament(
        &self,
        game: &str,
        handle: &mut TournamentHandle,
        clock: &DeadlineClock,
        telemetry: &mut RunTelemetry,
        writer: &mut BatchWriter<'_, K>,
    ) {
        let mut matches = Paginator::new(
            &self.source,
            Resource::TournamentMatches {
                tournament_id: handle.id.clone(),
            },
            self.settings.match_limits(),
            *clock,
        );
        let mut samples_logged = 0usize;

        while let Some(item) = matches.next_item().await {
            telemetry.api_total_matches_seen += 1;
            handle.matches_seen += 1;

            let raw_status = item
                .get("status")
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            telemetry.record_raw_status(raw_status);
            if is_excluded(raw_status) {
                continue;
            }
            telemetry.eligible_non_cancelled += 1;
            telemetry.record_players(roster_player_ids(&item));

            let Some(record) = MatchRecord::from_upstream(&item) else {
                telemetry.skipped_missing_id += 1;
                warn!("match item without match_id skipped");
                continue;
            };
            telemetry.touch_bounds(game, record.best_match_date());

            if samples_logged < SAMPLES_PER_TOURNAMENT
                && telemetry.match_pages_fetched + matches.pages_fetched() < SAMPLE_PAGE_WINDOW
            {
                debug!(match_id = %record.match_id, payload = %item, "sample match");
                samples_logged += 1;
            }

            writer.push(record, clock, telemetry).await;
        }

        telemetry.match_pages_fetched += matches.pages_fetched();
        if matches.stop_reason() == Some(StopReason::DeadlineExceeded) {
            telemetry.mark_deadline_reached();
        }

        writer.finish(clock, telemetry).await;

        if handle.matches_seen == 0 {
            telemetry.tournaments_with_zero += 1;
            info!("tournament returned 0 matches");
        } else {
            telemetry.tournaments_with_matches += 1;
            info!(matches = handle.matches_seen, "tournament returned matches");
        }
    }
}

/// Outcome of [`run_from_config`], tagged by the sink that received the rows.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: SyncRunSummary,
    /// Distinct rows the in-memory sink holds after a dry run.
    pub dry_run_rows: Option<usize>,
}

/// Builds the FACEIT source and the storage sink from `config` and runs once.
/// With `dry_run`, rows go to an in-memory merge sink instead of the table.
pub async fn run_from_config(config: &SyncConfig, dry_run: bool) -> Result<RunOutcome> {
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: config.fetch_timeout,
        user_agent: Some(config.user_agent.clone()),
    })?;
    let source = FaceitAdapter::new(http, &config.faceit_api_base, config.faceit_api_key.clone())?;
    let reports = config.reports_dir.clone().map(ReportStore::new);

    if dry_run {
        let pipeline = attach_reports(
            SyncPipeline::new(config.pipeline.clone(), source, MemorySink::new()),
            reports,
        );
        let summary = pipeline.run_once().await?;
        let rows = pipeline.sink().len();
        info!(rows, "dry run: distinct rows that would be written");
        return Ok(RunOutcome {
            summary,
            dry_run_rows: Some(rows),
        });
    }

    let sink = PostgrestSink::new(
        &config.supabase_url,
        config.supabase_service_role_key.clone(),
        config.sink_timeout,
    )?;
    let pipeline = attach_reports(
        SyncPipeline::new(config.pipeline.clone(), source, sink),
        reports,
    );
    let summary = pipeline.run_once().await?;
    Ok(RunOutcome {
        summary,
        dry_run_rows: None,
    })
}

fn attach_reports<S, K>(
    pipeline: SyncPipeline<S, K>,
    reports: Option<ReportStore>,
) -> SyncPipeline<S, K>
where
    S: UpstreamSource,
    K: MatchSink,
{
    match reports {
        Some(reports) => pipeline.with_reports(reports),
        None => pipeline,
    }
}

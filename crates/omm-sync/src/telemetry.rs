//! Run-scoped counters and the summaries rendered from them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use omm_core::{format_canonical, parse_canonical};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const RUN_MODE: &str = "ongoing_streaming_non_cancelled";

/// Oldest and newest match date seen for one game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateBounds {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

impl DateBounds {
    pub fn widen(&mut self, at: DateTime<Utc>) {
        if self.min.map_or(true, |min| at < min) {
            self.min = Some(at);
        }
        if self.max.map_or(true, |max| at > max) {
            self.max = Some(at);
        }
    }
}

/// Accumulates for the lifetime of one run. Nothing here is ever decremented
/// or cleared.
#[derive(Debug, Default)]
pub struct RunTelemetry {
    pub tournaments_processed: u64,
    pub tournament_pages_fetched: u64,
    pub match_pages_fetched: u64,
    pub api_total_matches_seen: u64,
    pub eligible_non_cancelled: u64,
    pub skipped_missing_id: u64,
    pub upsert_attempted: u64,
    pub upsert_succeeded: u64,
    pub batches_failed: u64,
    pub rows_dropped_at_deadline: u64,
    pub tournaments_with_matches: u64,
    pub tournaments_with_zero: u64,
    pub deadline_reached: bool,
    statuses_seen: BTreeSet<String>,
    status_counts: BTreeMap<String, u64>,
    player_ids: HashSet<String>,
    date_bounds: BTreeMap<String, DateBounds>,
}

impl RunTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Histogram of raw (lower-cased) statuses, excluded ones included.
    pub fn record_raw_status(&mut self, raw: &str) {
        let status = raw.to_lowercase();
        if status.is_empty() {
            return;
        }
        *self.status_counts.entry(status.clone()).or_default() += 1;
        self.statuses_seen.insert(status);
    }

    pub fn record_players<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.player_ids.extend(ids);
    }

    /// Widens the bounds for `game` with a canonical timestamp. Unparseable or
    /// absent dates are ignored.
    pub fn touch_bounds(&mut self, game: &str, iso: Option<&str>) {
        let Some(at) = iso.and_then(parse_canonical) else {
            return;
        };
        self.date_bounds
            .entry(game.to_string())
            .or_default()
            .widen(at);
    }

    pub fn mark_deadline_reached(&mut self) {
        self.deadline_reached = true;
    }

    pub fn status_counts(&self) -> &BTreeMap<String, u64> {
        &self.status_counts
    }

    pub fn unique_players(&self) -> usize {
        self.player_ids.len()
    }

    pub fn bounds(&self, game: &str) -> DateBounds {
        self.date_bounds.get(game).copied().unwrap_or_default()
    }

    pub fn finalize(&self, run_id: Uuid, games: &[String], duration: Duration) -> SyncRunSummary {
        let match_date_bounds = games
            .iter()
            .map(|game| {
                let bounds = self.bounds(game);
                (
                    game.clone(),
                    DateBoundsIso {
                        oldest: bounds.min.map(format_canonical),
                        newest: bounds.max.map(format_canonical),
                    },
                )
            })
            .collect();

        SyncRunSummary {
            success: true,
            run_id,
            duration_ms: duration.as_millis() as u64,
            games_processed: games.to_vec(),
            mode: RUN_MODE.to_string(),
            deadline_reached: self.deadline_reached,
            tournaments_processed: self.tournaments_processed,
            tournament_pages_fetched: self.tournament_pages_fetched,
            match_pages_fetched: self.match_pages_fetched,
            api_total_matches_seen: self.api_total_matches_seen,
            eligible_non_cancelled: self.eligible_non_cancelled,
            skipped_missing_id: self.skipped_missing_id,
            upsert_attempted: self.upsert_attempted,
            upsert_succeeded: self.upsert_succeeded,
            batches_failed: self.batches_failed,
            rows_dropped_at_deadline: self.rows_dropped_at_deadline,
            tournaments_with_matches: self.tournaments_with_matches,
            tournaments_with_zero: self.tournaments_with_zero,
            statuses_seen: self.statuses_seen.iter().cloned().collect(),
            status_counts: self.status_counts.clone(),
            unique_players_found: self.player_ids.len(),
            match_date_bounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBoundsIso {
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub success: bool,
    pub run_id: Uuid,
    pub duration_ms: u64,
    pub games_processed: Vec<String>,
    pub mode: String,
    pub deadline_reached: bool,
    pub tournaments_processed: u64,
    pub tournament_pages_fetched: u64,
    pub match_pages_fetched: u64,
    pub api_total_matches_seen: u64,
    pub eligible_non_cancelled: u64,
    pub skipped_missing_id: u64,
    pub upsert_attempted: u64,
    pub upsert_succeeded: u64,
    pub batches_failed: u64,
    pub rows_dropped_at_deadline: u64,
    #[serde(rename = "champs_with_matches")]
    pub tournaments_with_matches: u64,
    #[serde(rename = "champs_with_zero")]
    pub tournaments_with_zero: u64,
    pub statuses_seen: Vec<String>,
    pub status_counts: BTreeMap<String, u64>,
    pub unique_players_found: usize,
    pub match_date_bounds: BTreeMap<String, DateBoundsIso>,
}

impl SyncRunSummary {
    /// End-of-run log lines, one per fact.
    pub fn log(&self) {
        for (game, bounds) in &self.match_date_bounds {
            let game = game.to_uppercase();
            info!(
                "{game} oldest match date (this run): {}",
                bounds.oldest.as_deref().unwrap_or("none")
            );
            info!(
                "{game} most recent match date (this run): {}",
                bounds.newest.as_deref().unwrap_or("none")
            );
        }
        info!(duration_ms = self.duration_ms, "ongoing sync completed");
        info!(total = self.api_total_matches_seen, "matches seen");
        info!(eligible = self.eligible_non_cancelled, "eligible (non-cancelled) matches");
        info!(
            attempted = self.upsert_attempted,
            succeeded = self.upsert_succeeded,
            "upserts"
        );
        info!(status_counts = ?self.status_counts, "status counts");
        info!(
            with_matches = self.tournaments_with_matches,
            with_zero = self.tournaments_with_zero,
            "tournaments"
        );
        if self.deadline_reached {
            info!(
                rows_dropped = self.rows_dropped_at_deadline,
                "run stopped at the time budget"
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub success: bool,
    pub error: String,
    pub duration_ms: u64,
    pub mode: String,
}

impl FailureSummary {
    pub fn new(error: &anyhow::Error, duration: Duration) -> Self {
        Self {
            success: false,
            error: format!("{error:#}"),
            duration_ms: duration.as_millis() as u64,
            mode: RUN_MODE.to_string(),
        }
    }
}

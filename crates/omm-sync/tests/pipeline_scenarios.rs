use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use omm_adapters::{Resource, SourceError, UpstreamSource};
use omm_core::{MatchRecord, MatchStatus};
use omm_storage::{FetchError, MatchSink, MemorySink, ReportStore, SinkError};
use omm_sync::{PipelineSettings, SyncPipeline};
use serde_json::{json, Value as JsonValue};
use tempfile::tempdir;

/// Upstream stand-in: static pages per resource, optional failures and
/// simulated latency, and a log of every page requested.
#[derive(Default)]
struct ScriptedSource {
    pages: HashMap<Resource, Vec<Vec<JsonValue>>>,
    failing: HashSet<Resource>,
    latency: HashMap<Resource, Duration>,
    requests: Mutex<Vec<(Resource, usize)>>,
}

impl ScriptedSource {
    fn with_tournaments(mut self, game: &str, ids: &[&str]) -> Self {
        let items = ids
            .iter()
            .map(|id| json!({"championship_id": id, "name": format!("Cup {id}")}))
            .collect();
        self.pages.insert(tournaments(game), vec![items]);
        self
    }

    fn with_match_pages(mut self, tournament_id: &str, pages: Vec<Vec<JsonValue>>) -> Self {
        self.pages.insert(matches(tournament_id), pages);
        self
    }

    fn failing(mut self, tournament_id: &str) -> Self {
        self.failing.insert(matches(tournament_id));
        self
    }

    fn slow(mut self, tournament_id: &str, latency: Duration) -> Self {
        self.latency.insert(matches(tournament_id), latency);
        self
    }

    fn requested(&self) -> Vec<(Resource, usize)> {
        self.requests.lock().expect("lock").clone()
    }

    fn requested_resource(&self, resource: &Resource) -> bool {
        self.requested().iter().any(|(r, _)| r == resource)
    }
}

#[async_trait]
impl UpstreamSource for ScriptedSource {
    async fn fetch_page(
        &self,
        resource: &Resource,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JsonValue>, SourceError> {
        self.requests
            .lock()
            .expect("lock")
            .push((resource.clone(), offset));
        if let Some(latency) = self.latency.get(resource) {
            tokio::time::sleep(*latency).await;
        }
        if self.failing.contains(resource) {
            return Err(SourceError::Fetch(FetchError::HttpStatus {
                status: 503,
                url: resource.to_string(),
                body: "unavailable".to_string(),
            }));
        }
        Ok(self
            .pages
            .get(resource)
            .and_then(|pages| pages.get(offset / limit))
            .cloned()
            .unwrap_or_default())
    }
}

/// Rejects the first `failures` batches, then behaves like [`MemorySink`].
struct FlakySink {
    failures: usize,
    calls: AtomicUsize,
    inner: MemorySink,
}

#[async_trait]
impl MatchSink for FlakySink {
    async fn upsert_matches(&self, rows: &[MatchRecord]) -> Result<(), SinkError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(SinkError::Rejected("statement timeout".to_string()));
        }
        self.inner.upsert_matches(rows).await
    }
}

fn tournaments(game: &str) -> Resource {
    Resource::OngoingTournaments {
        game: game.to_string(),
    }
}

fn matches(tournament_id: &str) -> Resource {
    Resource::TournamentMatches {
        tournament_id: tournament_id.to_string(),
    }
}

fn match_item(id: &str, status: &str) -> JsonValue {
    json!({
        "match_id": id,
        "game": "cs2",
        "status": status,
        "scheduled_at": 1700000000,
        "teams": {
            "faction1": {"roster": [{"player_id": format!("{id}-a")}]},
            "faction2": {"roster": [{"player_id": format!("{id}-b")}]}
        }
    })
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        games: vec!["cs2".to_string()],
        hard_timeout: Duration::from_secs(300),
        stop_with_left: Duration::from_millis(1500),
        page_size: 100,
        max_tournament_pages: 10,
        max_match_pages: 10,
        upsert_batch_size: 50,
    }
}

#[tokio::test]
async fn cancelled_matches_are_counted_but_never_written() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages(
            "c1",
            vec![vec![
                match_item("m1", "finished"),
                match_item("m2", "cancelled"),
                match_item("m3", "ongoing"),
            ]],
        );
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    let summary = pipeline.run_once().await.expect("run");

    let rows = pipeline.sink().snapshot();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows["m1"].status, MatchStatus::Finished);
    assert_eq!(rows["m3"].status, MatchStatus::Ongoing);
    assert!(!rows.contains_key("m2"));

    assert!(summary.success);
    assert_eq!(summary.api_total_matches_seen, 3);
    assert_eq!(summary.eligible_non_cancelled, 2);
    assert_eq!(summary.upsert_attempted, 2);
    assert_eq!(summary.upsert_succeeded, 2);
    assert_eq!(summary.tournaments_with_matches, 1);
    assert_eq!(summary.tournaments_with_zero, 0);
    assert_eq!(summary.unique_players_found, 4);
    let expected: BTreeMap<String, u64> = [("cancelled", 1), ("finished", 1), ("ongoing", 1)]
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();
    assert_eq!(summary.status_counts, expected);
    assert_eq!(summary.statuses_seen, vec!["cancelled", "finished", "ongoing"]);
}

#[tokio::test(start_paused = true)]
async fn deadline_between_tournaments_skips_the_second() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1", "c2"])
        .with_match_pages(
            "c1",
            vec![vec![match_item("m1", "ongoing"), match_item("m2", "ready")]],
        )
        .with_match_pages("c2", vec![vec![match_item("m9", "ongoing")]])
        .slow("c1", Duration::from_secs(9));
    let pipeline = SyncPipeline::new(
        PipelineSettings {
            hard_timeout: Duration::from_secs(10),
            ..settings()
        },
        source,
        MemorySink::new(),
    );

    let summary = pipeline.run_once().await.expect("run");

    assert!(summary.success);
    assert!(summary.deadline_reached);
    assert_eq!(summary.tournaments_processed, 1);
    assert_eq!(summary.api_total_matches_seen, 2);
    assert_eq!(summary.upsert_succeeded, 2);
    assert_eq!(pipeline.sink().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_tournament_is_never_requested_after_the_deadline() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1", "c2"])
        .with_match_pages("c1", vec![vec![match_item("m1", "ongoing")]])
        .with_match_pages("c2", vec![vec![match_item("m9", "ongoing")]])
        .slow("c1", Duration::from_secs(9));
    let pipeline = SyncPipeline::new(
        PipelineSettings {
            hard_timeout: Duration::from_secs(10),
            ..settings()
        },
        source,
        MemorySink::new(),
    );

    pipeline.run_once().await.expect("run");

    assert!(pipeline.source().requested_resource(&matches("c1")));
    assert!(!pipeline.source().requested_resource(&matches("c2")));
    let rows = pipeline.sink().snapshot();
    assert!(rows.contains_key("m1"));
    assert!(!rows.contains_key("m9"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_issues_no_requests() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages("c1", vec![vec![match_item("m1", "ongoing")]]);
    let pipeline = SyncPipeline::new(
        PipelineSettings {
            hard_timeout: Duration::ZERO,
            ..settings()
        },
        source,
        MemorySink::new(),
    );

    let summary = pipeline.run_once().await.expect("run");

    assert!(summary.success);
    assert!(summary.deadline_reached);
    assert_eq!(summary.api_total_matches_seen, 0);
    assert!(pipeline.source().requested().is_empty());
    assert!(pipeline.sink().is_empty());
}

#[tokio::test]
async fn batches_stay_within_the_threshold_across_pages() {
    let first_page: Vec<_> = (0..100)
        .map(|i| match_item(&format!("m{i}"), if i % 10 == 0 { "canceled" } else { "finished" }))
        .collect();
    let second_page: Vec<_> = (100..120)
        .map(|i| match_item(&format!("m{i}"), "scheduled"))
        .collect();
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages("c1", vec![first_page, second_page]);
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    let summary = pipeline.run_once().await.expect("run");

    let sizes = pipeline.sink().batch_sizes();
    assert_eq!(sizes, vec![50, 50, 10]);
    assert!(sizes.iter().all(|size| *size <= 50));
    assert_eq!(summary.eligible_non_cancelled, 110);
    assert_eq!(summary.match_pages_fetched, 2);
    assert!(pipeline
        .sink()
        .snapshot()
        .values()
        .all(|row| row.status != MatchStatus::Cancelled));
    assert_eq!(summary.status_counts.get("canceled"), Some(&10));
}

#[tokio::test]
async fn rerunning_against_unchanged_upstream_is_idempotent() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1", "c2"])
        .with_match_pages(
            "c1",
            vec![vec![match_item("m1", "finished"), match_item("m2", "ongoing")]],
        )
        .with_match_pages("c2", vec![vec![match_item("m3", "voting")]]);
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    pipeline.run_once().await.expect("first run");
    let after_first = pipeline.sink().snapshot();
    pipeline.run_once().await.expect("second run");
    let after_second = pipeline.sink().snapshot();

    assert_eq!(after_first.len(), 3);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn failing_match_listing_does_not_stop_the_run() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1", "c2"])
        .failing("c1")
        .with_match_pages("c2", vec![vec![match_item("m5", "live")]]);
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    let summary = pipeline.run_once().await.expect("run");

    assert!(summary.success);
    assert_eq!(summary.tournaments_processed, 2);
    assert_eq!(summary.tournaments_with_zero, 1);
    assert_eq!(summary.tournaments_with_matches, 1);
    assert_eq!(pipeline.sink().snapshot()["m5"].status, MatchStatus::Ongoing);
}

#[tokio::test]
async fn failed_batch_is_not_retried_and_the_run_continues() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1", "c2"])
        .with_match_pages("c1", vec![vec![match_item("m1", "ongoing")]])
        .with_match_pages("c2", vec![vec![match_item("m2", "ongoing")]]);
    let sink = FlakySink {
        failures: 1,
        calls: AtomicUsize::new(0),
        inner: MemorySink::new(),
    };
    let pipeline = SyncPipeline::new(settings(), source, sink);

    let summary = pipeline.run_once().await.expect("run");

    assert!(summary.success);
    assert_eq!(summary.upsert_attempted, 2);
    assert_eq!(summary.upsert_succeeded, 1);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(pipeline.sink().calls.load(Ordering::SeqCst), 2);
    let rows = pipeline.sink().inner.snapshot();
    assert!(!rows.contains_key("m1"));
    assert!(rows.contains_key("m2"));
}

#[tokio::test]
async fn date_bounds_use_the_first_available_timestamp() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages(
            "c1",
            vec![vec![
                json!({
                    "match_id": "a",
                    "status": "finished",
                    "started_at": 1700000000,
                    "scheduled_at": 1600000000
                }),
                json!({"match_id": "b", "status": "ready", "scheduled_at": "2024-01-01T00:00:00Z"}),
                json!({"match_id": "c", "status": "finished", "finished_at": 1690000000}),
                json!({"match_id": "d", "status": "cancelled", "started_at": 1500000000}),
                json!({"match_id": "e", "status": "ongoing"}),
            ]],
        );
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    let summary = pipeline.run_once().await.expect("run");

    let bounds = &summary.match_date_bounds["cs2"];
    assert_eq!(bounds.oldest.as_deref(), Some("2023-07-22T04:26:40.000Z"));
    assert_eq!(bounds.newest.as_deref(), Some("2024-01-01T00:00:00.000Z"));
    assert_eq!(pipeline.sink().len(), 4);
}

#[tokio::test]
async fn items_without_identifiers_are_skipped_but_their_players_count() {
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages(
            "c1",
            vec![vec![
                json!({
                    "status": "finished",
                    "teams": {
                        "faction1": {"roster": [{"player_id": "anon-a"}]},
                        "faction2": {"roster": [{"player_id": "anon-b"}]}
                    }
                }),
                match_item("m1", "finished"),
            ]],
        );
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new());

    let summary = pipeline.run_once().await.expect("run");

    assert_eq!(summary.api_total_matches_seen, 2);
    assert_eq!(summary.eligible_non_cancelled, 2);
    assert_eq!(summary.skipped_missing_id, 1);
    assert_eq!(summary.unique_players_found, 4);
    assert_eq!(pipeline.sink().len(), 1);
}

#[tokio::test]
async fn summary_is_persisted_when_a_report_store_is_configured() {
    let dir = tempdir().expect("tempdir");
    let source = ScriptedSource::default()
        .with_tournaments("cs2", &["c1"])
        .with_match_pages("c1", vec![vec![match_item("m1", "finished")]]);
    let pipeline = SyncPipeline::new(settings(), source, MemorySink::new())
        .with_reports(ReportStore::new(dir.path()));

    let summary = pipeline.run_once().await.expect("run");

    let path = dir
        .path()
        .join(summary.run_id.to_string())
        .join("summary.json");
    let stored: JsonValue =
        serde_json::from_str(&std::fs::read_to_string(path).expect("report")).expect("json");
    assert_eq!(stored["success"], true);
    assert_eq!(stored["eligible_non_cancelled"], 1);
    assert_eq!(stored["champs_with_matches"], 1);
}

//! Core domain model for the ongoing-match mirror.

pub mod deadline;
pub mod status;
pub mod timestamp;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

pub use deadline::DeadlineClock;
pub use status::{is_excluded, MatchStatus};
pub use timestamp::{canonical_timestamp, format_canonical, parse_canonical};

pub const CRATE_NAME: &str = "omm-core";

/// One mirrored row, keyed by `match_id` on the storage side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub game: Option<String>,
    pub region: Option<String>,
    pub competition_name: Option<String>,
    pub competition_type: Option<String>,
    pub organized_by: Option<String>,
    pub status: MatchStatus,
    pub started_at: Option<String>,
    pub scheduled_at: Option<String>,
    pub finished_at: Option<String>,
    pub configured_at: Option<String>,
    pub calculate_elo: JsonValue,
    pub version: JsonValue,
    pub teams: JsonValue,
    pub voting: JsonValue,
    /// Projection kept for queries written against the older schema.
    pub faceit_data: JsonValue,
    pub raw_data: JsonValue,
    pub championship_stream_url: Option<String>,
    pub championship_raw_data: Option<JsonValue>,
}

impl MatchRecord {
    /// Builds a row from one upstream match item.
    ///
    /// Returns `None` when the item has no usable `match_id` or carries an
    /// excluded status; such items must never reach storage.
    pub fn from_upstream(item: &JsonValue) -> Option<Self> {
        let match_id = json_string(item, "match_id").filter(|id| !id.trim().is_empty())?;
        let status = MatchStatus::normalize(item.get("status").and_then(JsonValue::as_str));
        if status == MatchStatus::Cancelled {
            return None;
        }

        Some(Self {
            match_id,
            game: json_string(item, "game"),
            region: json_string(item, "region"),
            competition_name: json_string(item, "competition_name"),
            competition_type: json_string(item, "competition_type"),
            organized_by: json_string(item, "organized_by"),
            status,
            started_at: canonical_timestamp(item.get("started_at")),
            scheduled_at: canonical_timestamp(item.get("scheduled_at")),
            finished_at: canonical_timestamp(item.get("finished_at")),
            configured_at: canonical_timestamp(item.get("configured_at")),
            calculate_elo: passthrough(item, "calculate_elo"),
            version: passthrough(item, "version"),
            teams: passthrough(item, "teams"),
            voting: passthrough(item, "voting"),
            faceit_data: json!({
                "region": passthrough(item, "region"),
                "competition_type": passthrough(item, "competition_type"),
                "organized_by": passthrough(item, "organized_by"),
                "calculate_elo": passthrough(item, "calculate_elo"),
                "results": passthrough(item, "results"),
            }),
            raw_data: item.clone(),
            championship_stream_url: None,
            championship_raw_data: None,
        })
    }

    /// Date used for the per-game bounds: first of started, scheduled, finished.
    pub fn best_match_date(&self) -> Option<&str> {
        self.started_at
            .as_deref()
            .or(self.scheduled_at.as_deref())
            .or(self.finished_at.as_deref())
    }
}

/// Player ids from both faction rosters. Missing teams or rosters count as empty.
pub fn roster_player_ids(item: &JsonValue) -> Vec<String> {
    ["faction1", "faction2"]
        .iter()
        .filter_map(|faction| {
            item.get("teams")
                .and_then(|teams| teams.get(faction))
                .and_then(|team| team.get("roster"))
                .and_then(JsonValue::as_array)
        })
        .flatten()
        .filter_map(|player| player.get("player_id").and_then(JsonValue::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// A tournament being walked during the current run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentHandle {
    pub id: String,
    pub name: String,
    pub matches_seen: u64,
}

impl TournamentHandle {
    pub fn from_upstream(item: &JsonValue) -> Option<Self> {
        let id = json_string(item, "championship_id").filter(|id| !id.trim().is_empty())?;
        Some(Self {
            id,
            name: json_string(item, "name").unwrap_or_default(),
            matches_seen: 0,
        })
    }
}

fn json_string(item: &JsonValue, key: &str) -> Option<String> {
    item.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn passthrough(item: &JsonValue, key: &str) -> JsonValue {
    item.get(key).cloned().unwrap_or(JsonValue::Null)
}

//! Upstream match status vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Statuses that are never written. Also the filter used by the sync loop.
pub const EXCLUDED_STATUSES: &[&str] = &["cancelled", "canceled"];
pub const FINISHED_STATUSES: &[&str] = &["finished", "completed"];
pub const UPCOMING_STATUSES: &[&str] = &[
    "scheduled",
    "configured",
    "pending",
    "voting",
    "ready",
    "created",
    "not_started",
    "to_be_played",
    "open",
];
pub const LIVE_STATUSES: &[&str] = &["ongoing", "live", "running", "started"];

/// Internal status stored on every mirrored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Cancelled,
    Finished,
    Upcoming,
    Ongoing,
    Unknown,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 5] = [
        MatchStatus::Cancelled,
        MatchStatus::Finished,
        MatchStatus::Upcoming,
        MatchStatus::Ongoing,
        MatchStatus::Unknown,
    ];

    /// Maps a raw upstream status onto the internal vocabulary. Total: any
    /// input that is not in one of the known tables (including empty) maps
    /// to [`MatchStatus::Unknown`].
    pub fn normalize(raw: Option<&str>) -> Self {
        let lowered = raw.unwrap_or_default().to_lowercase();
        let s = lowered.as_str();
        if EXCLUDED_STATUSES.contains(&s) {
            MatchStatus::Cancelled
        } else if FINISHED_STATUSES.contains(&s) {
            MatchStatus::Finished
        } else if UPCOMING_STATUSES.contains(&s) {
            MatchStatus::Upcoming
        } else if LIVE_STATUSES.contains(&s) {
            MatchStatus::Ongoing
        } else {
            MatchStatus::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Finished => "finished",
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the raw status belongs to the excluded (cancelled) vocabulary.
pub fn is_excluded(raw: &str) -> bool {
    MatchStatus::normalize(Some(raw)) == MatchStatus::Cancelled
}

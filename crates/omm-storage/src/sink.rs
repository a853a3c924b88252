//! Write side: merge-on-conflict upserts keyed by `match_id`.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use omm_core::MatchRecord;
use thiserror::Error;

use crate::{FetchError, HttpClientConfig, HttpFetcher};

pub const DEFAULT_MATCH_TABLE: &str = "faceit_matches";
const MERGE_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Storage contract. Rows sharing a `match_id` overwrite each other; an
/// implementation must never duplicate them.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn upsert_matches(&self, rows: &[MatchRecord]) -> Result<(), SinkError>;
}

/// PostgREST (Supabase) table sink.
#[derive(Debug, Clone)]
pub struct PostgrestSink {
    http: HttpFetcher,
    endpoint: String,
    service_key: String,
}

impl PostgrestSink {
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::for_table(base_url, DEFAULT_MATCH_TABLE, service_key, timeout)
    }

    pub fn for_table(
        base_url: &str,
        table: &str,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout,
            user_agent: None,
        })?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/rest/v1/{table}?on_conflict=match_id",
                base_url.trim_end_matches('/')
            ),
            service_key: service_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MatchSink for PostgrestSink {
    async fn upsert_matches(&self, rows: &[MatchRecord]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }
        let bearer = format!("Bearer {}", self.service_key);
        let headers = [
            ("apikey", self.service_key.as_str()),
            ("Authorization", bearer.as_str()),
            ("Prefer", MERGE_PREFERENCE),
        ];
        self.http.post_json(&self.endpoint, &headers, rows).await?;
        Ok(())
    }
}

/// In-process sink with the same merge semantics as the table. Backs dry runs
/// and the pipeline tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<String, MatchRecord>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MatchRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sizes of every batch received, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MatchSink for MemorySink {
    async fn upsert_matches(&self, rows: &[MatchRecord]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stored = self
            .rows
            .lock()
            .map_err(|_| SinkError::Rejected("memory sink lock poisoned".to_string()))?;
        for row in rows {
            stored.insert(row.match_id.clone(), row.clone());
        }
        drop(stored);

        self.batch_sizes
            .lock()
            .map_err(|_| SinkError::Rejected("memory sink lock poisoned".to_string()))?
            .push(rows.len());
        Ok(())
    }
}

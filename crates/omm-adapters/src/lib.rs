//! Upstream source contract and the FACEIT Data API adapter.

pub mod paginate;

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use omm_storage::{FetchError, HttpFetcher};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

pub use paginate::{PaginationLimits, Paginator, StopReason};

pub const CRATE_NAME: &str = "omm-adapters";
pub const DEFAULT_FACEIT_API_BASE: &str = "https://open.faceit.com/data/v4";

/// A list endpoint family that can be paged with offset/limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    OngoingTournaments { game: String },
    TournamentMatches { tournament_id: String },
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::OngoingTournaments { game } => write!(f, "championships {game}/ongoing"),
            Resource::TournamentMatches { tournament_id } => {
                write!(f, "championship {tournament_id} matches")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unparseable body for {resource}: {source}")]
    Parse {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot build url for {0}")]
    Url(String),
}

impl SourceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Fetch(err) => err.status(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Fetch one page of raw items. An empty vector means the listing is exhausted.
    async fn fetch_page(
        &self,
        resource: &Resource,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JsonValue>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    items: Option<Vec<JsonValue>>,
}

/// Reads championships and their matches from the FACEIT Data API v4.
#[derive(Debug, Clone)]
pub struct FaceitAdapter {
    http: HttpFetcher,
    base_url: Url,
    api_key: String,
}

impl FaceitAdapter {
    pub fn new(
        http: HttpFetcher,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("parsing FACEIT api base {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("FACEIT api base {base_url} cannot carry a path");
        }
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn page_url(
        &self,
        resource: &Resource,
        limit: usize,
        offset: usize,
    ) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SourceError::Url(resource.to_string()))?;
            segments.pop_if_empty();
            match resource {
                Resource::OngoingTournaments { .. } => {
                    segments.push("championships");
                }
                Resource::TournamentMatches { tournament_id } => {
                    segments.extend(["championships", tournament_id.as_str(), "matches"]);
                }
            }
        }
        {
            let mut query = url.query_pairs_mut();
            if let Resource::OngoingTournaments { game } = resource {
                query.append_pair("game", game).append_pair("type", "ongoing");
            }
            query
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl UpstreamSource for FaceitAdapter {
    async fn fetch_page(
        &self,
        resource: &Resource,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JsonValue>, SourceError> {
        let url = self.page_url(resource, limit, offset)?;
        let response = self.http.get_bytes(url.as_str(), &self.api_key).await?;
        let page: ItemsPage =
            serde_json::from_slice(&response.body).map_err(|source| SourceError::Parse {
                resource: resource.to_string(),
                source,
            })?;
        Ok(page.items.unwrap_or_default())
    }
}

//! Environment-driven configuration for a sync run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use omm_adapters::{PaginationLimits, DEFAULT_FACEIT_API_BASE};
use thiserror::Error;

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_FACEIT_API_KEY: &str = "FACEIT_API_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Tunables that shape a run. Defaults mirror the production cron job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub games: Vec<String>,
    pub hard_timeout: Duration,
    pub stop_with_left: Duration,
    pub page_size: usize,
    pub max_tournament_pages: usize,
    pub max_match_pages: usize,
    pub upsert_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            games: vec!["cs2".to_string()],
            hard_timeout: Duration::from_millis(350_000),
            stop_with_left: Duration::from_millis(1_500),
            page_size: 100,
            max_tournament_pages: 500,
            max_match_pages: 500,
            upsert_batch_size: 50,
        }
    }
}

impl PipelineSettings {
    pub fn tournament_limits(&self) -> PaginationLimits {
        PaginationLimits {
            page_size: self.page_size,
            max_pages: self.max_tournament_pages,
        }
    }

    pub fn match_limits(&self) -> PaginationLimits {
        PaginationLimits {
            page_size: self.page_size,
            max_pages: self.max_match_pages,
        }
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub faceit_api_key: String,
    pub faceit_api_base: String,
    pub fetch_timeout: Duration,
    pub sink_timeout: Duration,
    pub user_agent: String,
    pub reports_dir: Option<PathBuf>,
    pub pipeline: PipelineSettings,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_role_key", &"<redacted>")
            .field("faceit_api_key", &"<redacted>")
            .field("faceit_api_base", &self.faceit_api_base)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("sink_timeout", &self.sink_timeout)
            .field("user_agent", &self.user_agent)
            .field("reports_dir", &self.reports_dir)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable lookup. All missing secrets are
    /// reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let supabase_url = read(ENV_SUPABASE_URL);
        let service_key = read(ENV_SUPABASE_SERVICE_ROLE_KEY);
        let faceit_key = read(ENV_FACEIT_API_KEY);

        let missing: Vec<&'static str> = [
            (ENV_SUPABASE_URL, supabase_url.is_none()),
            (ENV_SUPABASE_SERVICE_ROLE_KEY, service_key.is_none()),
            (ENV_FACEIT_API_KEY, faceit_key.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        let (Some(supabase_url), Some(supabase_service_role_key), Some(faceit_api_key)) =
            (supabase_url, service_key, faceit_key)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let defaults = PipelineSettings::default();
        let games = match read("OMM_GAMES") {
            Some(list) => parse_games(&list).ok_or(ConfigError::Invalid {
                name: "OMM_GAMES",
                value: list,
            })?,
            None => defaults.games,
        };

        let pipeline = PipelineSettings {
            games,
            hard_timeout: Duration::from_millis(parse_or(
                &read,
                "OMM_HARD_TIMEOUT_MS",
                defaults.hard_timeout.as_millis() as u64,
            )?),
            stop_with_left: Duration::from_millis(parse_or(
                &read,
                "OMM_STOP_WITH_MS_LEFT",
                defaults.stop_with_left.as_millis() as u64,
            )?),
            page_size: positive(&read, "OMM_PAGE_SIZE", defaults.page_size)?,
            max_tournament_pages: positive(
                &read,
                "OMM_MAX_TOURNAMENT_PAGES",
                defaults.max_tournament_pages,
            )?,
            max_match_pages: positive(&read, "OMM_MAX_MATCH_PAGES", defaults.max_match_pages)?,
            upsert_batch_size: positive(
                &read,
                "OMM_UPSERT_BATCH_SIZE",
                defaults.upsert_batch_size,
            )?,
        };

        Ok(Self {
            supabase_url,
            supabase_service_role_key,
            faceit_api_key,
            faceit_api_base: read("FACEIT_API_BASE")
                .unwrap_or_else(|| DEFAULT_FACEIT_API_BASE.to_string()),
            fetch_timeout: Duration::from_millis(parse_or(&read, "OMM_FETCH_TIMEOUT_MS", 7_000)?),
            sink_timeout: Duration::from_secs(parse_or(&read, "OMM_SINK_TIMEOUT_SECS", 120)?),
            user_agent: read("OMM_USER_AGENT").unwrap_or_else(|| "omm-sync/0.1".to_string()),
            reports_dir: read("OMM_REPORTS_DIR").map(PathBuf::from),
            pipeline,
        })
    }
}

/// Which required secrets are set to a non-blank value, in declaration order.
/// Only presence is reported, never the value.
pub fn secrets_present<F>(lookup: F) -> [(&'static str, bool); 3]
where
    F: Fn(&str) -> Option<String>,
{
    [ENV_SUPABASE_URL, ENV_SUPABASE_SERVICE_ROLE_KEY, ENV_FACEIT_API_KEY]
        .map(|name| (name, lookup(name).is_some_and(|v| !v.trim().is_empty())))
}

pub fn parse_games(list: &str) -> Option<Vec<String>> {
    let games: Vec<String> = list
        .split(',')
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    (!games.is_empty()).then_some(games)
}

fn parse_or<R>(read: &R, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    R: Fn(&str) -> Option<String>,
{
    match read(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn positive<R>(read: &R, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    R: Fn(&str) -> Option<String>,
{
    match read(name) {
        Some(value) => match value.parse::<usize>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ConfigError::Invalid { name, value }),
        },
        None => Ok(default),
    }
}

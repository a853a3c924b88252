//! HTTP plumbing, the storage sink contract and run report persistence.

pub mod sink;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use sink::{MatchSink, MemorySink, PostgrestSink, SinkError};

pub const CRATE_NAME: &str = "omm-storage";

/// Longest response body excerpt carried inside a [`FetchError::HttpStatus`].
const ERROR_BODY_EXCERPT: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-call timeout. Independent of the run deadline.
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(7),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Request(err) => err.status().map(|s| s.as_u16()),
        }
    }
}

/// Single-request HTTP client. Calls are never retried; callers decide what a
/// failure means for their unit of work.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// GET with bearer auth, returning the body of a 2xx response.
    pub async fn get_bytes(&self, url: &str, bearer: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", method = "GET", url);
        async {
            let resp = self
                .client
                .get(url)
                .bearer_auth(bearer)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            debug!(status = status.as_u16(), "response received");

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                    body: excerpt(&body),
                });
            }

            let body = resp.bytes().await?.to_vec();
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }

    /// POST a JSON body with the given extra headers. Any 2xx status is success.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<StatusCode, FetchError> {
        let span = info_span!("http_fetch", method = "POST", url);
        async {
            let mut request = self.client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let resp = request.send().await?;
            let status = resp.status();
            debug!(status = status.as_u16(), "response received");

            if !status.is_success() {
                let final_url = resp.url().to_string();
                let body = resp.text().await.unwrap_or_default();
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                    body: excerpt(&body),
                });
            }
            Ok(status)
        }
        .instrument(span)
        .await
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Writes per-run JSON reports under `<root>/<run_id>/`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_path(&self, run_id: Uuid, name: &str) -> PathBuf {
        self.root.join(run_id.to_string()).join(name)
    }

    /// Store a pretty-printed JSON report using an atomic temp-file rename, so a
    /// reader never sees a half-written file.
    pub async fn store_json<T: Serialize + ?Sized>(
        &self,
        run_id: Uuid,
        name: &str,
        value: &T,
    ) -> anyhow::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing report {name}"))?;
        let absolute_path = self.report_path(run_id, name);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating report directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp report file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp report file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp report file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp report {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(absolute_path)
    }
}

//! Deadline-aware offset/limit paging over an [`UpstreamSource`].

use std::collections::VecDeque;

use omm_core::DeadlineClock;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::{Resource, UpstreamSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 500,
        }
    }
}

/// Why a [`Paginator`] stopped issuing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DeadlineExceeded,
    PageCeiling,
    SourceError,
    EmptyPage,
    ShortPage,
}

/// Lazy, finite item sequence for one resource.
///
/// Pages are requested only when the buffered items run out, so dropping the
/// paginator early never costs an extra request. Failures end the sequence
/// instead of surfacing to the caller.
pub struct Paginator<'a, S: UpstreamSource + ?Sized> {
    source: &'a S,
    resource: Resource,
    limits: PaginationLimits,
    clock: DeadlineClock,
    page: usize,
    offset: usize,
    pages_fetched: u64,
    buffer: VecDeque<JsonValue>,
    stopped: Option<StopReason>,
}

impl<'a, S: UpstreamSource + ?Sized> Paginator<'a, S> {
    pub fn new(
        source: &'a S,
        resource: Resource,
        limits: PaginationLimits,
        clock: DeadlineClock,
    ) -> Self {
        Self {
            source,
            resource,
            limits: PaginationLimits {
                page_size: limits.page_size.max(1),
                max_pages: limits.max_pages,
            },
            clock,
            page: 0,
            offset: 0,
            pages_fetched: 0,
            buffer: VecDeque::new(),
            stopped: None,
        }
    }

    pub async fn next_item(&mut self) -> Option<JsonValue> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.stopped.is_some() {
                return None;
            }
            self.fetch_next_page().await;
        }
    }

    /// Successful page responses so far, empty pages included.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    async fn fetch_next_page(&mut self) {
        if self.clock.exceeded() {
            debug!(
                resource = %self.resource,
                page = self.page,
                "deadline reached; not requesting page"
            );
            self.stopped = Some(StopReason::DeadlineExceeded);
            return;
        }
        if self.page >= self.limits.max_pages {
            warn!(
                resource = %self.resource,
                max_pages = self.limits.max_pages,
                "page ceiling reached"
            );
            self.stopped = Some(StopReason::PageCeiling);
            return;
        }

        let items = match self
            .source
            .fetch_page(&self.resource, self.limits.page_size, self.offset)
            .await
        {
            Ok(items) => items,
            Err(err) => {
                warn!(
                    resource = %self.resource,
                    page = self.page,
                    status = ?err.status(),
                    error = %err,
                    "page fetch failed; ending this listing"
                );
                self.stopped = Some(StopReason::SourceError);
                return;
            }
        };

        self.pages_fetched += 1;
        if items.is_empty() {
            self.stopped = Some(StopReason::EmptyPage);
            return;
        }

        let short_page = items.len() < self.limits.page_size;
        self.buffer.extend(items);
        if short_page {
            self.stopped = Some(StopReason::ShortPage);
        } else {
            self.page += 1;
            self.offset += self.limits.page_size;
        }
    }
}

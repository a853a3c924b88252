//! Fixed-size upsert batching with deadline-aware flushing.

use omm_core::{DeadlineClock, MatchRecord};
use omm_storage::MatchSink;
use tracing::{error, warn};

use crate::telemetry::RunTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was sent.
    Pending,
    Written(usize),
    /// The sink rejected the batch. Its rows are not retried.
    Failed(usize),
    /// Final batch left over after the deadline passed; never sent.
    Dropped(usize),
}

/// Buffers eligible rows and hands them to the sink in batches of at most
/// `batch_size`.
pub struct BatchWriter<'a, K: MatchSink + ?Sized> {
    sink: &'a K,
    batch_size: usize,
    buffer: Vec<MatchRecord>,
}

impl<'a, K: MatchSink + ?Sized> BatchWriter<'a, K> {
    pub fn new(sink: &'a K, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Adds a row and flushes when the batch is full or the deadline is close.
    pub async fn push(
        &mut self,
        row: MatchRecord,
        clock: &DeadlineClock,
        telemetry: &mut RunTelemetry,
    ) -> FlushOutcome {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size || clock.exceeded() {
            self.flush(telemetry).await
        } else {
            FlushOutcome::Pending
        }
    }

    /// Flushes the trailing partial batch, unless the deadline has already
    /// passed, in which case the rows are dropped for this run.
    pub async fn finish(
        &mut self,
        clock: &DeadlineClock,
        telemetry: &mut RunTelemetry,
    ) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Pending;
        }
        if clock.exceeded() {
            let dropped = self.buffer.len();
            self.buffer.clear();
            telemetry.rows_dropped_at_deadline += dropped as u64;
            telemetry.mark_deadline_reached();
            warn!(rows = dropped, "deadline reached; final batch not written this run");
            return FlushOutcome::Dropped(dropped);
        }
        self.flush(telemetry).await
    }

    async fn flush(&mut self, telemetry: &mut RunTelemetry) -> FlushOutcome {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let rows = batch.len();
        telemetry.upsert_attempted += rows as u64;

        match self.sink.upsert_matches(&batch).await {
            Ok(()) => {
                telemetry.upsert_succeeded += rows as u64;
                FlushOutcome::Written(rows)
            }
            Err(err) => {
                telemetry.batches_failed += 1;
                error!(rows, error = %err, "batch upsert failed");
                FlushOutcome::Failed(rows)
            }
        }
    }
}

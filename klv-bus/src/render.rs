use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::RecordDecoder,
    queue::{Popped, RecordReceiver},
    record::RawRecord,
    writer::{OutputWriter, WriteError},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub records: u64,
    pub skipped_records: u64,
    pub items: u64,
    pub skipped_items: u64,
}

impl Display for RenderStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "records: {}, skipped records: {}, items: {}, skipped items: {}",
            self.records, self.skipped_records, self.items, self.skipped_items
        )
    }
}

/// Decodes queued records and renders them, in arrival order, into the sink it
/// owns.
pub struct Renderer {
    decoder: Arc<dyn RecordDecoder>,
    writer: Box<dyn OutputWriter>,
    out: Box<dyn Write + Send>,
    poll_interval: Duration,
    stats: RenderStats,
}

impl Renderer {
    pub fn new(
        decoder: Arc<dyn RecordDecoder>,
        writer: Box<dyn OutputWriter>,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            decoder,
            writer,
            out,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats: RenderStats::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs until `cancel` fires or the queue is closed and drained.
    /// `stream_end` is written exactly once on either path; a sink error
    /// aborts immediately. The sink stays open; see [`Renderer::into_sink`].
    pub async fn run(
        &mut self,
        mut rx: RecordReceiver,
        cancel: CancellationToken,
    ) -> Result<RenderStats, WriteError> {
        self.writer.stream_start(&mut self.out)?;

        while !cancel.is_cancelled() {
            match rx.pop(self.poll_interval).await {
                Popped::Record(record) => self.render_record(&record)?,
                Popped::Empty => continue,
                Popped::Closed => {
                    log::debug!("record queue closed and drained");
                    break;
                }
            }
        }

        self.writer.stream_end(&mut self.out)?;
        self.out.flush()?;
        Ok(self.stats.clone())
    }

    /// Hands the sink back so the owner decides when it is closed.
    pub fn into_sink(self) -> Box<dyn Write + Send> {
        self.out
    }

    fn render_record(&mut self, record: &RawRecord) -> Result<(), WriteError> {
        let items = match self.decoder.decode(record) {
            Ok(items) => items,
            Err(e) => {
                log::warn!("dropping undecodable record ({}): {}", record, e);
                self.stats.skipped_records += 1;
                return Ok(());
            }
        };

        self.stats.records += 1;
        let entry_index = self.stats.records;
        self.writer.entry_start(&mut self.out, entry_index)?;

        for (i, item) in items.iter().enumerate() {
            let item_index = i as u64 + 1;
            match self
                .writer
                .item(&mut self.out, item, entry_index, item_index)
            {
                Ok(()) => self.stats.items += 1,
                Err(e) if e.is_item_error() => {
                    log::debug!("record #{} item #{} skipped: {}", entry_index, item_index, e);
                    self.stats.skipped_items += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.writer.entry_end(&mut self.out, entry_index)
    }

    /// Runs the renderer on the runtime and returns its result together with
    /// the sink. Hooks write to the sink synchronously, so a stalled sink
    /// holds one worker thread until it drains or fails.
    pub fn spawn(
        mut self,
        rx: RecordReceiver,
        cancel: CancellationToken,
    ) -> JoinHandle<(Result<RenderStats, WriteError>, Box<dyn Write + Send>)> {
        tokio::spawn(async move {
            let result = self.run(rx, cancel).await;
            match &result {
                Ok(stats) => log::info!("renderer finished: {}", stats),
                Err(e) => log::error!("renderer failed: {:#}", e),
            }
            (result, self.into_sink())
        })
    }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

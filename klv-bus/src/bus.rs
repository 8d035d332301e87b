use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::RecordDecoder,
    input::{FrameConfig, FrameError, FrameReader, ReadStats},
    queue::record_queue,
    render::{DEFAULT_POLL_INTERVAL, RenderStats, Renderer},
    writer::{OutputWriter, WriteError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub frame: FrameConfig,
    /// Upper bound on how long the renderer waits for a record before it
    /// re-checks the stop signal.
    pub poll_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusReport {
    pub read: ReadStats,
    pub render: RenderStats,
}

impl Display for BusReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "read [{}], render [{}]", self.read, self.render)
    }
}

/// One reading session: a frame reader and a renderer joined by a record
/// queue, sharing a single stop signal.
pub struct Bus {
    cancel: CancellationToken,
    reader: JoinHandle<Result<ReadStats, FrameError>>,
    renderer: JoinHandle<(Result<RenderStats, WriteError>, Box<dyn Write + Send>)>,
}

impl Bus {
    /// Spawns both tasks. Must be called inside a Tokio runtime.
    pub fn start<R>(
        config: BusConfig,
        source: R,
        decoder: Arc<dyn RecordDecoder>,
        writer: Box<dyn OutputWriter>,
        sink: Box<dyn Write + Send>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let reader = FrameReader::new(source, config.frame)?;
        let (tx, rx) = record_queue();

        let renderer = Renderer::new(decoder, writer, sink)
            .with_poll_interval(config.poll_interval)
            .spawn(rx, cancel.clone());
        let reader = reader.spawn(tx, cancel.clone());

        Ok(Self {
            cancel,
            reader,
            renderer,
        })
    }

    /// Asks both tasks to stop at their next check. A reader blocked inside a
    /// source read only notices once that read returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Joins both tasks. A renderer failure stops the reader too. The sink is
    /// dropped only once both tasks have finished.
    pub async fn wait(self) -> anyhow::Result<BusReport> {
        let Bus {
            cancel,
            reader,
            renderer,
        } = self;
        let renderer = async move {
            let result = renderer.await;
            if !matches!(result, Ok((Ok(_), _))) {
                cancel.cancel();
            }
            result
        };
        let (read, render) = tokio::join!(reader, renderer);

        let (render, sink) = render.context("renderer task panicked")?;
        drop(sink);
        let render = render.context("rendering failed")?;
        let read = read
            .context("frame reader task panicked")?
            .context("reading failed")?;
        Ok(BusReport { read, render })
    }
}

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

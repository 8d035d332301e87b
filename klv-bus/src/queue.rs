//! Unbounded FIFO hand-off between the frame reader and the renderer.
//!
//! Pushing never blocks, so a slow renderer lets the queue grow; the byte
//! source is the only throttle.

use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::record::RawRecord;

pub fn record_queue() -> (RecordSender, RecordReceiver) {
    let (tx, rx) = unbounded_channel();
    (RecordSender { tx }, RecordReceiver { rx })
}

#[derive(Clone)]
pub struct RecordSender {
    tx: UnboundedSender<RawRecord>,
}

#[derive(Debug, thiserror::Error)]
#[error("record queue closed")]
pub struct QueueClosed(pub RawRecord);

impl RecordSender {
    pub fn push(&self, record: RawRecord) -> Result<(), QueueClosed> {
        self.tx.send(record).map_err(|e| QueueClosed(e.0))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Popped {
    Record(RawRecord),
    /// Nothing arrived within the timeout.
    Empty,
    /// Every sender is gone and the queue is drained.
    Closed,
}

pub struct RecordReceiver {
    rx: UnboundedReceiver<RawRecord>,
}

impl RecordReceiver {
    pub async fn pop(&mut self, timeout: Duration) -> Popped {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(record)) => Popped::Record(record),
            Ok(None) => Popped::Closed,
            Err(_) => Popped::Empty,
        }
    }
}

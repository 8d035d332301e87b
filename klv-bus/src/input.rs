use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    ber::{self, BerError},
    queue::RecordSender,
    record::RawRecord,
};

/// First four bytes of every SMPTE universal label.
pub const DEFAULT_SYNC_PATTERN: [u8; 4] = [0x06, 0x0e, 0x2b, 0x34];
/// A full universal label key.
pub const DEFAULT_HEADER_SIZE: usize = 16;
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameConfig {
    pub sync_pattern: Vec<u8>,
    /// Fixed header length in bytes, sync pattern included.
    pub header_size: usize,
    /// Declared lengths above this are treated as framing errors.
    pub max_payload_len: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            sync_pattern: DEFAULT_SYNC_PATTERN.to_vec(),
            header_size: DEFAULT_HEADER_SIZE,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.sync_pattern.is_empty() {
            return Err(FrameError::InvalidConfig(
                "sync pattern must not be empty".to_string(),
            ));
        }
        if self.header_size < self.sync_pattern.len() {
            return Err(FrameError::InvalidConfig(format!(
                "header size {} is shorter than the {}-byte sync pattern",
                self.header_size,
                self.sync_pattern.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame config: {0}")]
    InvalidConfig(String),
    #[error("byte source error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a chunk of input was thrown away.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResyncReason {
    #[error("sync pattern mismatch")]
    SyncMismatch,
    #[error("invalid length field: {0}")]
    InvalidLength(#[from] BerError),
    #[error("declared payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(u64),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Record(RawRecord),
    Resync { discarded: usize, reason: ResyncReason },
    /// `truncated` is set when the source ended after a sync pattern matched.
    EndOfStream { truncated: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub records: u64,
    pub resyncs: u64,
    pub discarded_bytes: u64,
    pub truncated: bool,
}

impl Display for ReadStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "records: {}, resyncs: {}, discarded bytes: {}, truncated: {}",
            self.records, self.resyncs, self.discarded_bytes, self.truncated
        )
    }
}

/// Splits a blocking byte source into [`RawRecord`]s.
///
/// On a sync mismatch the whole `sync_pattern.len()` chunk is dropped and the
/// next chunk is tested; the scan never shifts by a single byte, so the input
/// must be aligned on record boundaries to stay in sync.
pub struct FrameReader<R> {
    src: R,
    config: FrameConfig,
}

impl<R: Read> FrameReader<R> {
    pub fn new(src: R, config: FrameConfig) -> Result<Self, FrameError> {
        config.validate()?;
        Ok(Self { src, config })
    }

    /// Reads one sync chunk and, if it matches, the rest of the record.
    pub fn next_record(&mut self) -> Result<ReadOutcome, FrameError> {
        let sync_len = self.config.sync_pattern.len();
        let header_size = self.config.header_size;
        let mut buf = Vec::with_capacity(header_size + 1);

        if !self.read_into(&mut buf, sync_len)? {
            return Ok(ReadOutcome::EndOfStream { truncated: false });
        }
        if buf != self.config.sync_pattern {
            return Ok(ReadOutcome::Resync {
                discarded: sync_len,
                reason: ResyncReason::SyncMismatch,
            });
        }

        if !self.read_into(&mut buf, header_size - sync_len)? || !self.read_into(&mut buf, 1)? {
            return Ok(ReadOutcome::EndOfStream { truncated: true });
        }

        let first = buf[header_size];
        let count = match ber::following_bytes(first) {
            Ok(count) => count,
            Err(e) => {
                return Ok(ReadOutcome::Resync {
                    discarded: buf.len(),
                    reason: e.into(),
                });
            }
        };
        if !self.read_into(&mut buf, count)? {
            return Ok(ReadOutcome::EndOfStream { truncated: true });
        }

        let len = ber::length_from_parts(first, &buf[header_size + 1..]);
        if len > self.config.max_payload_len {
            return Ok(ReadOutcome::Resync {
                discarded: buf.len(),
                reason: ResyncReason::PayloadTooLarge(len),
            });
        }

        let payload_offset = buf.len();
        if !self.read_into(&mut buf, len as usize)? {
            return Ok(ReadOutcome::EndOfStream { truncated: true });
        }

        Ok(ReadOutcome::Record(RawRecord::new(
            Bytes::from(buf),
            header_size,
            payload_offset,
        )))
    }

    /// Appends exactly `n` bytes to `buf`. Returns `false` if the source ended
    /// first; the partial bytes are left in `buf`.
    fn read_into(&mut self, buf: &mut Vec<u8>, n: usize) -> std::io::Result<bool> {
        let start = buf.len();
        buf.resize(start + n, 0);
        let mut filled = 0;
        while filled < n {
            match self.src.read(&mut buf[start + filled..]) {
                Ok(0) => {
                    buf.truncate(start + filled);
                    return Ok(false);
                }
                Ok(k) => filled += k,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    buf.truncate(start + filled);
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    /// Reads records until the source ends, `cancel` fires, or the queue is
    /// closed. The stop signal is checked between records only.
    pub fn run(
        mut self,
        sender: RecordSender,
        cancel: CancellationToken,
    ) -> Result<ReadStats, FrameError> {
        let mut stats = ReadStats::default();
        while !cancel.is_cancelled() {
            match self.next_record()? {
                ReadOutcome::Record(record) => {
                    log::trace!("framed {}", record);
                    if sender.push(record).is_err() {
                        log::debug!("record queue closed, stopping frame reader");
                        break;
                    }
                    stats.records += 1;
                }
                ReadOutcome::Resync { discarded, reason } => {
                    stats.resyncs += 1;
                    stats.discarded_bytes += discarded as u64;
                    match reason {
                        ResyncReason::SyncMismatch => {
                            log::trace!("discarded {} bytes: {}", discarded, reason)
                        }
                        _ => log::warn!("discarded {} bytes: {}", discarded, reason),
                    }
                }
                ReadOutcome::EndOfStream { truncated } => {
                    stats.truncated = truncated;
                    if truncated {
                        log::warn!("byte source ended inside a record, partial record dropped");
                    }
                    break;
                }
            }
        }
        Ok(stats)
    }
}

impl<R: Read + Send + 'static> FrameReader<R> {
    /// Runs the reader on the blocking pool; the byte source read may block
    /// indefinitely.
    pub fn spawn(
        self,
        sender: RecordSender,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<ReadStats, FrameError>> {
        tokio::task::spawn_blocking(move || {
            let result = self.run(sender, cancel);
            match &result {
                Ok(stats) => log::info!("frame reader finished: {}", stats),
                Err(e) => log::error!("frame reader failed: {:#}", e),
            }
            result
        })
    }
}

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

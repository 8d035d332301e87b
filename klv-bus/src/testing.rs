//! Packet builders and sinks shared by the unit tests.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    ber,
    decoder::checksum,
    local_set::{CHECKSUM_TAG, UAS_LOCAL_SET_KEY},
};

/// `key + BER(len) + payload`.
pub(crate) fn frame(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = key.to_vec();
    out.extend(ber::encode_length(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

/// A UAS local set packet holding `items` followed by a valid checksum.
pub(crate) fn local_set(items: &[(u8, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (tag, value) in items {
        body.push(*tag);
        body.extend(ber::encode_length(value.len() as u64));
        body.extend_from_slice(value);
    }
    body.extend([CHECKSUM_TAG as u8, 2]);

    let mut packet = UAS_LOCAL_SET_KEY.to_vec();
    packet.extend(ber::encode_length(body.len() as u64 + 2));
    packet.extend(body);
    let sum = checksum(&packet);
    packet.extend(sum.to_be_bytes());
    packet
}

/// Discards output and raises its flag when dropped.
pub(crate) struct DropFlag(pub Arc<AtomicBool>);

impl DropFlag {
    pub(crate) fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(flag.clone()), flag)
    }
}

impl Write for DropFlag {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

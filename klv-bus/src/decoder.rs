use crate::{
    ber::{self, BerError},
    local_set::{self, CHECKSUM_TAG, UAS_LOCAL_SET_KEY},
    record::{DecodedItem, RawRecord},
};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected universal key {}", hex::encode(.0))]
    UnknownKey(Vec<u8>),
    #[error("malformed item at payload offset {offset}: {source}")]
    Malformed { offset: usize, source: BerError },
    #[error("tag {tag} at payload offset {offset} declares {len} bytes, {available} remain")]
    Overrun {
        tag: u64,
        offset: usize,
        len: u64,
        available: usize,
    },
}

/// Turns one framed record into its fields, in wire order.
pub trait RecordDecoder: Send + Sync {
    fn decode(&self, record: &RawRecord) -> Result<Vec<DecodedItem>, DecodeError>;
}

/// Decoder for KLV local sets: `tag(BER-OID) length(BER) value` triples
/// following a fixed universal key.
pub struct LocalSetDecoder {
    key: Vec<u8>,
    verify_checksum: bool,
}

impl Default for LocalSetDecoder {
    fn default() -> Self {
        Self::new(UAS_LOCAL_SET_KEY.to_vec())
    }
}

impl LocalSetDecoder {
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            verify_checksum: true,
        }
    }

    pub fn with_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }
}

impl RecordDecoder for LocalSetDecoder {
    fn decode(&self, record: &RawRecord) -> Result<Vec<DecodedItem>, DecodeError> {
        if record.key() != self.key.as_slice() {
            return Err(DecodeError::UnknownKey(record.key().to_vec()));
        }

        let payload = record.payload_bytes();
        let mut items = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let malformed = |source| DecodeError::Malformed { offset, source };
            let (tag, tag_len) = ber::decode_oid(&payload[offset..]).map_err(malformed)?;
            let (len, len_len) =
                ber::decode_length(&payload[offset + tag_len..]).map_err(malformed)?;

            let start = offset + tag_len + len_len;
            let available = payload.len() - start;
            if len > available as u64 {
                return Err(DecodeError::Overrun {
                    tag,
                    offset,
                    len,
                    available,
                });
            }
            let end = start + len as usize;

            if tag == CHECKSUM_TAG && self.verify_checksum {
                verify_checksum(record, record.payload_offset() + start, &payload[start..end]);
            }

            items.push(local_set::decode_item(tag, payload.slice(start..end)));
            offset = end;
        }

        Ok(items)
    }
}

/// 16-bit running sum over every byte before the checksum value, high byte
/// first.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().enumerate().fold(0u16, |acc, (i, b)| {
        acc.wrapping_add((*b as u16) << (8 * ((i + 1) % 2)))
    })
}

fn verify_checksum(record: &RawRecord, value_offset: usize, value: &[u8]) {
    let [hi, lo] = value else {
        log::warn!("checksum item has {} bytes, expected 2", value.len());
        return;
    };
    let expected = u16::from_be_bytes([*hi, *lo]);
    let computed = checksum(&record.data()[..value_offset]);
    if expected != computed {
        log::warn!(
            "checksum mismatch: record carries {:04x}, computed {:04x}",
            expected,
            computed
        );
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;

//! BER length and BER-OID tag codecs used by KLV framing.

/// Marks the long form: the low 7 bits count the length bytes that follow.
pub const LONG_FORM: u8 = 0x80;

/// Longest long-form length we accept (fits in a `u64`).
pub const MAX_LENGTH_BYTES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BerError {
    #[error("indefinite BER length is not supported")]
    Indefinite,
    #[error("BER length uses {0} bytes, at most 8 are supported")]
    TooLong(usize),
    #[error("BER field truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("BER-OID tag does not fit in 64 bits")]
    OidOverflow,
}

/// Returns how many length bytes follow `first`.
pub fn following_bytes(first: u8) -> Result<usize, BerError> {
    if first < LONG_FORM {
        return Ok(0);
    }
    match (first & !LONG_FORM) as usize {
        0 => Err(BerError::Indefinite),
        n if n > MAX_LENGTH_BYTES => Err(BerError::TooLong(n)),
        n => Ok(n),
    }
}

/// Combines the first length byte with the big-endian bytes that follow it.
pub fn length_from_parts(first: u8, rest: &[u8]) -> u64 {
    if first < LONG_FORM {
        return first as u64;
    }
    rest.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Decodes a BER length at the start of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode_length(bytes: &[u8]) -> Result<(u64, usize), BerError> {
    let first = *bytes.first().ok_or(BerError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let count = following_bytes(first)?;
    let rest = bytes.get(1..1 + count).ok_or(BerError::Truncated {
        needed: 1 + count,
        available: bytes.len(),
    })?;
    Ok((length_from_parts(first, rest), 1 + count))
}

/// Minimal BER encoding of `len`.
pub fn encode_length(len: u64) -> Vec<u8> {
    if len < LONG_FORM as u64 {
        return vec![len as u8];
    }
    let be = len.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    let body = &be[skip..];

    let mut out = Vec::with_capacity(1 + body.len());
    out.push(LONG_FORM | body.len() as u8);
    out.extend_from_slice(body);
    out
}

/// Decodes a BER-OID encoded tag (7 bits per byte, high bit set on every byte
/// but the last).
pub fn decode_oid(bytes: &[u8]) -> Result<(u64, usize), BerError> {
    let mut value = 0u64;
    for (i, b) in bytes.iter().enumerate() {
        if value > (u64::MAX >> 7) {
            return Err(BerError::OidOverflow);
        }
        value = (value << 7) | (b & 0x7f) as u64;
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(BerError::Truncated {
        needed: bytes.len() + 1,
        available: bytes.len(),
    })
}

#[cfg(test)]
#[path = "ber_test.rs"]
mod ber_test;

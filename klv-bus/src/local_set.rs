//! A subset of the MISB ST 0601 UAS Datalink Local Set dictionary.

use bytes::Bytes;
use chrono::DateTime;

use crate::record::{DecodedItem, Value};

/// Universal key of the UAS Datalink Local Set.
pub const UAS_LOCAL_SET_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x02, 0x0b, 0x01, 0x01, 0x0e, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00, 0x00,
];

pub const CHECKSUM_TAG: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kind {
    Bytes,
    Text,
    Unsigned,
    /// Microseconds since the Unix epoch.
    Timestamp,
    /// Unsigned integer mapped linearly onto `min..=max`.
    MappedUnsigned { min: f64, max: f64 },
    /// Two's complement integer mapped onto `-range..=range`.
    MappedSigned { range: f64 },
}

#[derive(Debug)]
pub struct FieldSpec {
    pub tag: u64,
    pub name: &'static str,
    pub short_name: &'static str,
    pub kind: Kind,
}

const fn field(tag: u64, name: &'static str, short_name: &'static str, kind: Kind) -> FieldSpec {
    FieldSpec {
        tag,
        name,
        short_name,
        kind,
    }
}

const ALTITUDE: Kind = Kind::MappedUnsigned {
    min: -900.0,
    max: 19000.0,
};
const LATITUDE: Kind = Kind::MappedSigned { range: 90.0 };
const LONGITUDE: Kind = Kind::MappedSigned { range: 180.0 };
const FULL_CIRCLE: Kind = Kind::MappedUnsigned {
    min: 0.0,
    max: 360.0,
};
const HALF_CIRCLE: Kind = Kind::MappedUnsigned {
    min: 0.0,
    max: 180.0,
};

static FIELDS: &[FieldSpec] = &[
    field(1, "Checksum", "Checksum", Kind::Bytes),
    field(2, "Precision Time Stamp", "Unix Time Stamp", Kind::Timestamp),
    field(3, "Mission ID", "Mission Number", Kind::Text),
    field(4, "Platform Tail Number", "Tail Number", Kind::Text),
    field(5, "Platform Heading Angle", "Platform Heading", FULL_CIRCLE),
    field(6, "Platform Pitch Angle", "Platform Pitch", Kind::MappedSigned { range: 20.0 }),
    field(7, "Platform Roll Angle", "Platform Roll", Kind::MappedSigned { range: 50.0 }),
    field(8, "Platform True Airspeed", "True Airspeed", Kind::Unsigned),
    field(9, "Platform Indicated Airspeed", "Indicated Airspeed", Kind::Unsigned),
    field(10, "Platform Designation", "Project ID Code", Kind::Text),
    field(11, "Image Source Sensor", "Sensor Name", Kind::Text),
    field(12, "Image Coordinate System", "Image Coordinate System", Kind::Text),
    field(13, "Sensor Latitude", "Sensor Latitude", LATITUDE),
    field(14, "Sensor Longitude", "Sensor Longitude", LONGITUDE),
    field(15, "Sensor True Altitude", "Sensor Altitude", ALTITUDE),
    field(16, "Sensor Horizontal Field of View", "Field of View", HALF_CIRCLE),
    field(17, "Sensor Vertical Field of View", "Vertical Field of View", HALF_CIRCLE),
    field(18, "Sensor Relative Azimuth Angle", "Sensor Relative Azimuth", FULL_CIRCLE),
    field(19, "Sensor Relative Elevation Angle", "Sensor Relative Elevation", LONGITUDE),
    field(20, "Sensor Relative Roll Angle", "Sensor Relative Roll", FULL_CIRCLE),
    field(
        21,
        "Slant Range",
        "Slant Range",
        Kind::MappedUnsigned {
            min: 0.0,
            max: 5_000_000.0,
        },
    ),
    field(
        22,
        "Target Width",
        "Target Width",
        Kind::MappedUnsigned {
            min: 0.0,
            max: 10_000.0,
        },
    ),
    field(23, "Frame Center Latitude", "Target Latitude", LATITUDE),
    field(24, "Frame Center Longitude", "Target Longitude", LONGITUDE),
    field(25, "Frame Center Elevation", "Frame Center Elevation", ALTITUDE),
    field(48, "Security Local Metadata Set", "Security Local Set", Kind::Bytes),
    field(65, "UAS Datalink LS Version Number", "LS Version", Kind::Unsigned),
];

pub fn lookup(tag: u64) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.tag == tag)
}

/// Resolves one local set item. Unknown tags keep their raw bytes and no name.
pub fn decode_item(tag: u64, raw: Bytes) -> DecodedItem {
    match lookup(tag) {
        Some(spec) => {
            let value = spec.kind.convert(&raw).unwrap_or_else(|| {
                log::debug!(
                    "tag {} ({}): cannot convert {} bytes, keeping raw value",
                    tag,
                    spec.name,
                    raw.len()
                );
                Value::Bytes(raw)
            });
            DecodedItem::new(tag, spec.name, spec.short_name, value)
        }
        None => DecodedItem::unknown(tag, raw),
    }
}

fn unsigned(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || raw.len() > 8 {
        return None;
    }
    Some(raw.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn signed(raw: &[u8]) -> Option<i64> {
    let v = unsigned(raw)?;
    let shift = 64 - 8 * raw.len() as u32;
    Some(((v << shift) as i64) >> shift)
}

impl Kind {
    /// Returns `None` when `raw` does not fit the kind.
    pub fn convert(&self, raw: &[u8]) -> Option<Value> {
        match *self {
            Kind::Bytes => Some(Value::Bytes(Bytes::copy_from_slice(raw))),
            Kind::Text => std::str::from_utf8(raw)
                .ok()
                .map(|s| Value::Text(s.trim_end_matches('\0').to_string())),
            Kind::Unsigned => unsigned(raw).map(Value::Unsigned),
            Kind::Timestamp => {
                let micros = i64::try_from(unsigned(raw)?).ok()?;
                DateTime::from_timestamp_micros(micros).map(Value::Timestamp)
            }
            Kind::MappedUnsigned { min, max } => {
                let v = unsigned(raw)?;
                let bits = 8 * raw.len() as i32;
                let scale = (max - min) / (2f64.powi(bits) - 1.0);
                Some(Value::Float(min + v as f64 * scale))
            }
            Kind::MappedSigned { range } => {
                let v = signed(raw)?;
                let bits = 8 * raw.len() as i32;
                let scale = range / (2f64.powi(bits - 1) - 1.0);
                Some(Value::Float(v as f64 * scale))
            }
        }
    }
}

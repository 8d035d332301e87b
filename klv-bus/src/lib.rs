//! Streaming KLV record extraction and rendering.
//!
//! Bytes flow from a blocking source through the [`input::FrameReader`], across
//! the [`queue`] into the [`render::Renderer`], which decodes every record and
//! drives an [`writer::OutputWriter`]. [`bus::Bus`] owns both tasks.

pub mod ber;
pub mod bus;
pub mod decoder;
pub mod input;
pub mod local_set;
pub mod queue;
pub mod record;
pub mod render;
pub mod writer;

#[cfg(test)]
mod testing;

pub use bus::{Bus, BusConfig, BusReport};
pub use decoder::{DecodeError, LocalSetDecoder, RecordDecoder};
pub use input::{FrameConfig, FrameReader};
pub use record::{DecodedItem, RawRecord, Value};
pub use writer::{OutputFormat, OutputWriter, WriteError};

//! Getting a raw KLV byte stream out of a media container.
//!
//! ```text
//! input ──► ffprobe (find KLV stream) ──► ffmpeg -map 0:N -f data pipe: ──► stdout
//! ```

pub mod demux;
pub mod probe;

pub use demux::FfmpegDemux;
pub use probe::{MediaInfo, StreamInfo, probe};

use std::time::Duration;

use clap::{ArgAction, Parser};
use klv_bus::{
    BusConfig, FrameConfig, OutputFormat,
    input::{DEFAULT_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_LEN},
};

/// Extract and output KLV metadata from a video file or stream.
/// Requires FFmpeg on the PATH unless `--raw` is given.
#[derive(Parser, Debug)]
#[command(name = "klvprint", author, version, about, long_about = None)]
pub struct Args {
    /// Path to video file or stream URL; `-` reads a raw KLV stream from stdin
    pub input: String,

    /// Output format: text, csv or json
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,

    /// FFmpeg -map value for the KLV data stream (e.g. 0:1); detected with
    /// ffprobe when missing
    #[arg(short, long)]
    pub map: Option<String>,

    /// Read the input as a raw KLV byte stream instead of demuxing it
    #[arg(long)]
    pub raw: bool,

    /// Sync pattern that starts every record, as hex
    #[arg(long, default_value = "060e2b34")]
    pub sync_pattern: String,

    /// Fixed header size in bytes, sync pattern included
    #[arg(long, default_value_t = DEFAULT_HEADER_SIZE)]
    pub header_size: usize,

    /// Largest payload accepted before the record is treated as garbage
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_LEN)]
    pub max_payload: u64,

    /// How often the renderer re-checks for shutdown while idle, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Do not verify local set checksums
    #[arg(long)]
    pub skip_checksum: bool,

    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn bus_config(&self) -> anyhow::Result<BusConfig> {
        let sync_pattern = hex::decode(&self.sync_pattern)
            .map_err(|e| anyhow::anyhow!("invalid sync pattern {:?}: {}", self.sync_pattern, e))?;
        let frame = FrameConfig {
            sync_pattern,
            header_size: self.header_size,
            max_payload_len: self.max_payload,
        };
        frame.validate()?;

        Ok(BusConfig {
            frame,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
        })
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// stdin can only carry a raw stream.
    pub fn is_raw(&self) -> bool {
        self.raw || self.input == "-"
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

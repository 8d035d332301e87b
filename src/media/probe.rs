//! Stream discovery through `ffprobe`.

use std::fmt;

use serde::Deserialize;
use tokio::process::Command;

/// Per-stream info, as reported by `ffprobe -show_streams`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    /// Type: "video" | "audio" | "data" etc.
    #[serde(default)]
    pub codec_type: String,
    /// Codec name, e.g. "h264", "klv"
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub codec_tag_string: String,
}

impl StreamInfo {
    pub fn is_klv(&self) -> bool {
        self.codec_type == "data" && self.codec_name.contains("klv")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn parse(json: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(json).map_err(|e| anyhow::anyhow!("invalid ffprobe output: {}", e))
    }

    /// First KLV data stream, if any.
    pub fn klv_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.is_klv())
    }

    /// FFmpeg `-map` specifier of the first KLV data stream.
    pub fn klv_map(&self) -> Option<String> {
        self.klv_stream().map(|s| format!("0:{}", s.index))
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.codec_type)?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            if !s.codec_tag_string.is_empty() {
                writeln!(f, "codec_tag_string={}", s.codec_tag_string)?;
            }
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

/// Runs `ffprobe` on `input` and returns its stream list.
pub async fn probe(ffprobe: &str, input: &str) -> anyhow::Result<MediaInfo> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_streams", input])
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("failed to execute {}: {}", ffprobe, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} could not open {:?} ({})",
            ffprobe,
            input,
            output.status
        ));
    }

    let info = MediaInfo::parse(&output.stdout)?;
    log::debug!("probed {}:\n{}", input, info);
    Ok(info)
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod probe_test;

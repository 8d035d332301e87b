//! Pulls the KLV data stream out of a container with an `ffmpeg` child
//! process. Packets are copied untouched to the child's stdout.

use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FfmpegDemux {
    child: Arc<Mutex<Child>>,
}

impl FfmpegDemux {
    pub fn args(input: &str, map: &str) -> Vec<String> {
        [
            "-i",
            input,
            "-map",
            map,
            "-codec",
            "copy",
            "-f",
            "data",
            "-flush_packets",
            "1",
            "-loglevel",
            "quiet",
            "pipe:",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Starts `ffmpeg` and hands back its stdout as the raw KLV source.
    pub fn spawn(ffmpeg: &str, input: &str, map: &str) -> anyhow::Result<(Self, ChildStdout)> {
        let args = Self::args(input, map);
        log::info!("{} {}", ffmpeg, args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to execute {}: {}", ffmpeg, e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("{} stdout not captured", ffmpeg))?;

        Ok((
            Self {
                child: Arc::new(Mutex::new(child)),
            },
            stdout,
        ))
    }

    /// Kills the child, which ends the stdout stream. Errors are ignored:
    /// the child may already have exited.
    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
        }
    }

    pub async fn wait(self) -> anyhow::Result<ExitStatus> {
        let child = self.child;
        tokio::task::spawn_blocking(move || {
            let mut child = child
                .lock()
                .map_err(|_| anyhow::anyhow!("ffmpeg handle poisoned"))?;
            child
                .wait()
                .map_err(|e| anyhow::anyhow!("failed to wait for ffmpeg: {}", e))
        })
        .await?
    }
}

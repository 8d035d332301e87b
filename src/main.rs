use std::fs::File;
use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use klv_bus::{Bus, LocalSetDecoder};
use tokio_util::sync::CancellationToken;

use crate::config::Args;
use crate::media::FfmpegDemux;

mod config;
mod media;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_level());

    if let Err(e) = run(args).await {
        eprintln!("klvprint: {:#}", e);
        std::process::exit(1);
    }
}

async fn open_source(args: &Args) -> anyhow::Result<(Box<dyn Read + Send>, Option<FfmpegDemux>)> {
    if args.is_raw() {
        let source: Box<dyn Read + Send> = if args.input == "-" {
            Box::new(std::io::stdin())
        } else {
            let file = File::open(&args.input)
                .map_err(|e| anyhow::anyhow!("failed to open {}: {}", args.input, e))?;
            Box::new(file)
        };
        return Ok((source, None));
    }

    let map = match &args.map {
        Some(map) => map.clone(),
        None => media::probe(&args.ffprobe, &args.input)
            .await?
            .klv_map()
            .ok_or_else(|| anyhow::anyhow!("Could not detect KLV stream index!"))?,
    };
    log::info!("reading KLV stream {} of {}", map, args.input);

    let (demux, stdout) = FfmpegDemux::spawn(&args.ffmpeg, &args.input, &map)?;
    let source: Box<dyn Read + Send> = Box::new(stdout);
    Ok((source, Some(demux)))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.bus_config()?;
    let (source, demux) = open_source(&args).await?;

    let cancel = CancellationToken::new();
    let decoder = Arc::new(LocalSetDecoder::default().with_checksum(!args.skip_checksum));
    let bus = Bus::start(
        config,
        source,
        decoder,
        args.output.writer(),
        Box::new(std::io::stdout()),
        cancel.clone(),
    )?;

    // A blocked read only returns once ffmpeg goes away.
    let watcher = {
        let cancel = cancel.clone();
        let demux = demux.clone();
        tokio::spawn(async move {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {
                    log::info!("interrupted, stopping");
                    cancel.cancel();
                },
                _ = cancel.cancelled() => {},
            }
            if let Some(demux) = demux {
                demux.kill();
            }
        })
    };

    let result = bus.wait().await;
    cancel.cancel();
    let _ = watcher.await;

    if let Some(demux) = demux {
        match demux.wait().await {
            Ok(status) => log::debug!("ffmpeg exited: {}", status),
            Err(e) => log::warn!("{:#}", e),
        }
    }

    let report = result?;
    log::info!("{}", report);
    Ok(())
}

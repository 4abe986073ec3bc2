//! Audio Play — a small CLI utility that decodes an audio file and plays it
//! on a CPAL output device.
//!
//! ## Pipeline
//! 1. **Decode**: a background thread uses Symphonia to decode the input into
//!    interleaved 16-bit PCM blocks.
//! 2. **Playback**: the CPAL callback pulls blocks through a supplier handle
//!    and splices them into the device buffer, padding with silence on
//!    underrun.
//!
//! The stages communicate through a queue bounded by `--high-water-seconds`
//! of decoded audio, which keeps memory flat on large files.

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audio_pipeline::config::PipelineConfig;
use audio_pipeline::decode::Decoder;
use audio_pipeline::device;
use audio_pipeline::playback::AudioRenderer;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,audio_play=info")),
        )
        .init();

    if args.list_devices {
        device::list_devices(&cpal::default_host())?;
        return Ok(());
    }

    let path = args.path.as_deref().context("no input file")?;
    let cfg = PipelineConfig {
        high_water_seconds: args.high_water_seconds,
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_handler = interrupted.clone();
    let _ = ctrlc::set_handler(move || {
        interrupted_handler.store(true, Ordering::Relaxed);
    });

    let mut decoder = Decoder::new();
    decoder.open(path, &cfg)?;

    let rate = decoder
        .media_sample_rate()
        .context("no source sample rate")?;
    let channels = decoder.media_channels().context("no source channels")?;
    tracing::info!(path = ?path, rate_hz = rate, channels, "source");

    let mut renderer = AudioRenderer::new(decoder.pcm_supplier());
    renderer.prefer_device(args.device.clone());
    renderer.start(rate, channels as u16)?;

    // Run until the decoder hits end-of-stream and the callback has played
    // out everything buffered behind it, or until Ctrl-C.
    while !interrupted.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
        if decoder.is_decode_finished() && !renderer.is_playing() {
            break;
        }
    }

    renderer.stop();
    decoder.close();

    if interrupted.load(Ordering::Relaxed) {
        tracing::info!("interrupted");
        std::process::exit(130);
    }
    Ok(())
}

//! Streaming audio decode stage.
//!
//! [`Decoder`] uses Symphonia to:
//! - probe the input container/codec and pin down the source format
//! - decode packets into fixed-format PCM blocks on a background thread
//! - feed a bounded [`PcmQueue`] that throttles decode against playback
//!
//! The queue pull side is exposed both directly ([`Decoder::pull_pcm_data`])
//! and as an injectable [`PcmSupplier`] so the playback stage never depends
//! on this type.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SignalSpec;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::PipelineConfig;
use crate::convert::FormatConverter;
use crate::pcm::{PcmBuffer, PcmSupplier};
use crate::queue::PcmQueue;

/// Decodes one media file's audio track into a bounded stream of PCM blocks.
///
/// Constructed closed; [`open`] spawns the decode thread, [`close`] tears it
/// down again. The decoder is reusable: close then open works, open while
/// already open is an error.
///
/// [`open`]: Decoder::open
/// [`close`]: Decoder::close
pub struct Decoder {
    session: Option<DecodeSession>,
    finished: Arc<AtomicBool>,
}

struct DecodeSession {
    queue: Arc<PcmQueue>,
    handle: thread::JoinHandle<()>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            session: None,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open `path` and start decoding its default audio track.
    ///
    /// Probes the container, opens the track's codec, fixes the source
    /// sample rate/channel count for the session and picks the sample-format
    /// conversion mode, then spawns the decode thread.
    ///
    /// Fails if the decoder is already open, the container cannot be probed,
    /// there is no default audio track, the track's sample rate or channel
    /// layout is unknown, or the codec cannot be opened. A failed open
    /// leaves the decoder closed.
    pub fn open(&mut self, path: &Path, cfg: &PipelineConfig) -> Result<()> {
        if self.session.is_some() {
            return Err(anyhow!("decoder is already open"));
        }
        self.finished.store(false, Ordering::Relaxed);

        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let track_id = track.id;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| anyhow!("Unknown channels"))?;

        let rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate"))?;

        let spec = SignalSpec::new(rate, channels);
        let codec_params = track.codec_params.clone();

        let decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

        let converter = FormatConverter::for_codec(&codec_params, spec);
        if converter.is_verbatim() {
            tracing::info!("sample format conversion skipped");
        } else {
            tracing::info!("converting source samples to the 16-bit output format");
        }

        let queue = Arc::new(PcmQueue::new(
            rate,
            channels.count(),
            cfg.high_water_seconds,
        ));
        tracing::debug!(
            rate_hz = queue.sample_rate(),
            channels = queue.channels(),
            high_water_seconds = queue.high_water_seconds(),
            "pcm queue ready"
        );

        let queue_thread = queue.clone();
        let finished_thread = self.finished.clone();
        let handle = thread::spawn(move || {
            decode_loop(format, decoder, converter, track_id, &queue_thread, &finished_thread);
        });

        self.session = Some(DecodeSession { queue, handle });
        Ok(())
    }

    /// Native sample rate discovered during open; `None` while closed.
    pub fn media_sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.queue.sample_rate())
    }

    /// Native channel count discovered during open; `None` while closed.
    pub fn media_channels(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.queue.channels())
    }

    /// Whether the decode thread has hit end-of-stream and exited.
    ///
    /// One-way latch for the current session, cleared as the next [`open`]
    /// begins (even one that goes on to fail). An empty queue with this
    /// still false is transient starvation, not the end of the track.
    ///
    /// [`open`]: Decoder::open
    pub fn is_decode_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Pop the oldest decoded block without blocking.
    ///
    /// Safe to call from the playback callback: it takes the queue lock only
    /// for the pop and wakes the decode thread if it was parked on
    /// backpressure.
    pub fn pull_pcm_data(&self) -> Option<PcmBuffer> {
        self.session.as_ref().and_then(|s| s.queue.pop())
    }

    /// A pull handle bound to the current session's queue.
    ///
    /// The returned callable keeps the queue alive on its own, so it stays
    /// valid (yielding `None` once drained) even across a later `close`. A
    /// closed decoder hands out a supplier that is always empty.
    pub fn pcm_supplier(&self) -> PcmSupplier {
        match &self.session {
            Some(session) => {
                let queue = Arc::clone(&session.queue);
                Arc::new(move || queue.pop())
            }
            None => Arc::new(|| None),
        }
    }

    /// Stop decoding and release the session.
    ///
    /// Closes the queue first so a producer blocked above the high-water
    /// mark wakes and exits, joins the decode thread, then discards whatever
    /// audio was still buffered. No-op when already closed.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.queue.close();
            let _ = session.handle.join();
            session.queue.clear();
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background decode loop: packet → frame → PCM block → bounded queue.
///
/// Exits on end-of-stream, on an unrecoverable read error (both set the
/// finished latch) or when the queue is closed under it. Per-packet decode
/// and per-frame conversion failures are logged and skipped.
fn decode_loop(
    mut format: Box<dyn FormatReader>,
    mut decoder: Box<dyn symphonia::core::codecs::Decoder>,
    mut converter: FormatConverter,
    track_id: u32,
    queue: &Arc<PcmQueue>,
    finished: &Arc<AtomicBool>,
) {
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(e) => {
                if !is_end_of_stream(&e) {
                    tracing::warn!("packet read error: {e}");
                }
                finished.store(true, Ordering::Relaxed);
                break;
            }
        };

        // Packets from other tracks are dropped without comment.
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("decode error: {e}");
                continue;
            }
        };

        if decoded.frames() == 0 {
            continue;
        }

        let buf = match converter.convert(decoded) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("sample conversion error: {e}");
                continue;
            }
        };

        if !queue.push_blocking(buf) {
            // Queue closed: stop requested, the pending block is discarded.
            break;
        }
    }
}

/// Symphonia reports end-of-stream as an unexpected-EOF I/O error.
fn is_end_of_stream(err: &SymphoniaError) -> bool {
    matches!(
        err,
        SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
    )
}

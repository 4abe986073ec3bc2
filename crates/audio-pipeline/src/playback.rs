//! Playback stage (CPAL output stream).
//!
//! [`AudioRenderer`] owns the output side of the pipeline. The real-time
//! callback:
//! - pulls decoded PCM blocks through an injected [`PcmSupplier`]
//! - splices blocks at frame granularity into the device buffer
//! - fills with silence (and reports not-playing) when the supply runs dry
//!
//! CPAL streams are not `Send`, so the stream lives on a dedicated thread
//! for the whole session; `start` hands the outcome of stream creation back
//! over a channel and `stop` flips a flag and joins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Sender, unbounded};

use crate::device;
use crate::pcm::{PcmBuffer, PcmSupplier};

/// Read cursor over the supplier's stream of PCM blocks.
///
/// Owned by the output callback alone, so no locking: the supplier is the
/// only shared edge. `offset` is a byte position into `current` and always
/// lands on a sample boundary; a trailing ragged byte in a block is skipped.
struct PcmCursor {
    supplier: PcmSupplier,
    current: Option<PcmBuffer>,
    offset: usize,
}

impl PcmCursor {
    fn new(supplier: PcmSupplier) -> Self {
        Self {
            supplier,
            current: None,
            offset: 0,
        }
    }

    /// Fill `out` with decoded samples, zero-padding on starvation.
    ///
    /// Returns whether the whole request was satisfied from real audio.
    /// Partially consumed blocks stay in the cursor, so consecutive device
    /// buffers splice mid-block without dropping frames.
    fn fill(&mut self, out: &mut [i16]) -> bool {
        let mut written = 0usize;
        while written < out.len() {
            let bytes = match &self.current {
                Some(buf) if self.offset + 2 <= buf.bytes().len() => buf.bytes(),
                _ => {
                    self.current = (self.supplier)();
                    self.offset = 0;
                    if self.current.is_none() {
                        out[written..].fill(0);
                        return false;
                    }
                    continue;
                }
            };

            let avail = &bytes[self.offset..];
            let want = (out.len() - written) * 2;
            let take = want.min(avail.len() & !1);
            for (dst, src) in out[written..].iter_mut().zip(avail[..take].chunks_exact(2)) {
                *dst = i16::from_le_bytes([src[0], src[1]]);
            }
            self.offset += take;
            written += take / 2;
        }
        true
    }
}

/// Plays a supplier's PCM stream on a CPAL output device.
///
/// Constructed stopped; [`start`] opens the stream, [`stop`] tears it down.
/// The renderer never touches the decode stage directly, only the supplier
/// it was given.
///
/// [`start`]: AudioRenderer::start
/// [`stop`]: AudioRenderer::stop
pub struct AudioRenderer {
    supplier: PcmSupplier,
    device_name: Option<String>,
    playing: Arc<AtomicBool>,
    session: Option<RenderSession>,
}

struct RenderSession {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl AudioRenderer {
    pub fn new(supplier: PcmSupplier) -> Self {
        Self {
            supplier,
            device_name: None,
            playing: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    /// Select the output device by name substring; `None` means the host
    /// default. Takes effect on the next [`start`].
    ///
    /// [`start`]: AudioRenderer::start
    pub fn prefer_device(&mut self, name: Option<String>) {
        self.device_name = name;
    }

    /// Open the output stream at the given interleaved format and begin
    /// pulling from the supplier.
    ///
    /// Spawns the stream-owning thread and waits for it to report whether
    /// the device opened; device and stream errors surface here, not later.
    /// Fails if already started.
    pub fn start(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        if self.session.is_some() {
            return Err(anyhow!("renderer is already started"));
        }

        self.playing.store(false, Ordering::Relaxed);

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = unbounded::<Result<()>>();

        let supplier = Arc::clone(&self.supplier);
        let device_name = self.device_name.clone();
        let playing = Arc::clone(&self.playing);
        let running_thread = Arc::clone(&running);
        let handle = thread::spawn(move || {
            render_thread_main(
                supplier,
                device_name,
                sample_rate,
                channels,
                playing,
                running_thread,
                ready_tx,
            );
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(RenderSession { running, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("output thread exited before opening the stream"))
            }
        }
    }

    /// Whether the last callback was fully satisfied from decoded audio.
    ///
    /// False before the first callback of a session and after starvation;
    /// `stop` leaves the last value in place.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Close the stream and join its thread. No-op when not started.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.running.store(false, Ordering::Relaxed);
            let _ = session.handle.join();
        }
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the CPAL stream for one session.
///
/// Keeps the stream alive until `running` goes false, then drops it, which
/// stops the callback.
fn render_thread_main(
    supplier: PcmSupplier,
    device_name: Option<String>,
    sample_rate: u32,
    channels: u16,
    playing: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    ready_tx: Sender<Result<()>>,
) {
    let stream = match open_stream(supplier, device_name.as_deref(), sample_rate, channels, playing)
    {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
    drop(stream);
}

fn open_stream(
    supplier: PcmSupplier,
    device_name: Option<&str>,
    sample_rate: u32,
    channels: u16,
    playing: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_name)?;
    if let Ok(desc) = device.description() {
        tracing::info!(device = %desc, rate_hz = sample_rate, channels, "opening output stream");
    }

    let config = cpal::StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let mut cursor = PcmCursor::new(supplier);
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [i16], _| {
            let satisfied = cursor.fill(data);
            playing.store(satisfied, Ordering::Relaxed);
        },
        err_fn,
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

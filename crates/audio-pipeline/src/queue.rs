//! Thread-safe bounded queue of decoded PCM buffers.
//!
//! [`PcmQueue`] sits between the decode thread and the playback callback:
//! - decode thread → [`PcmQueue::push_blocking`] (throttled by the water level)
//! - playback callback → [`PcmQueue::pop`] (non-blocking)
//!
//! The API is designed to make shutdown deterministic (`close()` wakes a
//! producer parked above the high-water mark) while keeping the playback
//! side real-time friendly.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::pcm::PcmBuffer;

/// FIFO of [`PcmBuffer`] blocks bounded by buffered duration.
///
/// ## Design
/// - Bounded by the **water level**: the producer blocks while more than
///   `high_water_seconds` of audio is queued. The bound is duration-based,
///   so it caps memory at roughly the same point regardless of source
///   bitrate or packet size.
/// - Uses a single [`Condvar`] as a general "state changed" signal: a pop
///   frees room, a close aborts the wait.
/// - The `closed` flag is stored *under the same mutex* as the queue to
///   avoid races.
///
/// Buffers come out in exactly the order they were pushed.
pub struct PcmQueue {
    sample_rate: u32,
    channels: usize,
    high_water_seconds: f64,
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    queue: VecDeque<PcmBuffer>,
    water_level: f64,
    closed: bool,
}

impl PcmQueue {
    /// Create a queue for an interleaved stream at `sample_rate`/`channels`.
    ///
    /// `high_water_seconds` is the buffered-duration threshold above which
    /// producers are throttled. Non-finite or non-positive values fall back
    /// to one second.
    pub fn new(sample_rate: u32, channels: usize, high_water_seconds: f64) -> Self {
        let high_water = if high_water_seconds.is_finite() && high_water_seconds > 0.0 {
            high_water_seconds
        } else {
            1.0
        };
        Self {
            sample_rate,
            channels,
            high_water_seconds: high_water,
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                water_level: 0.0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Sample rate of the stream this queue carries.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the stream this queue carries.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered duration threshold that throttles the producer.
    pub fn high_water_seconds(&self) -> f64 {
        self.high_water_seconds
    }

    /// Seconds of audio currently buffered (best-effort snapshot).
    ///
    /// The value can change immediately after the call returns; use it for
    /// monitoring, not for control flow.
    pub fn water_level(&self) -> f64 {
        let g = self.inner.lock().unwrap();
        g.water_level
    }

    /// Number of queued buffers (best-effort snapshot).
    pub fn len(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.queue.len()
    }

    /// Whether the queue currently holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.closed
    }

    /// Push one buffer, blocking while the water level is above the mark.
    ///
    /// Returns `true` once the buffer is queued. If the queue is closed,
    /// whether before the call or while waiting for room, the buffer is
    /// dropped and `false` is returned so the producer can stop promptly.
    pub fn push_blocking(&self, buf: PcmBuffer) -> bool {
        let mut g = self.inner.lock().unwrap();

        while g.water_level > self.high_water_seconds && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
        if g.closed {
            return false;
        }

        g.water_level += buf.duration_seconds(self.sample_rate, self.channels);
        g.queue.push_back(buf);
        true
    }

    /// Pop the oldest buffer without blocking.
    ///
    /// Returns `None` when the queue is empty (the caller distinguishes
    /// transient starvation from end of stream elsewhere). A successful pop
    /// lowers the water level and wakes a producer blocked on backpressure.
    pub fn pop(&self) -> Option<PcmBuffer> {
        let mut g = self.inner.lock().unwrap();
        let buf = g.queue.pop_front()?;
        let dur = buf.duration_seconds(self.sample_rate, self.channels);
        g.water_level = (g.water_level - dur).max(0.0);
        drop(g);
        self.cv.notify_all();
        Some(buf)
    }

    /// Close the queue and wake all waiters.
    ///
    /// After calling this, blocked and future pushes return `false` and drop
    /// their buffer. Already-queued buffers stay poppable until [`clear`]
    /// runs. Idempotent.
    ///
    /// [`clear`]: PcmQueue::clear
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Discard all queued buffers and reset the water level.
    pub fn clear(&self) {
        let mut g = self.inner.lock().unwrap();
        g.queue.clear();
        g.water_level = 0.0;
        drop(g);
        self.cv.notify_all();
    }
}

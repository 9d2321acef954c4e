//! The handoff buffer between the mixing pass (producer) and the hardware
//! output callback (consumer). Unbounded on the producer side; the
//! consumer blocks in [`AudioQueue::drain`] until enough samples exist,
//! which is the engine's backpressure point: a lagging producer is heard
//! as silence, never as corrupted memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Thread-safe, growable sample buffer owned by a listener.
///
/// Exactly one producer (the world's mixing pass) appends through
/// [`begin`](AudioQueue::begin)/[`QueueWriter::end`], and one consumer
/// (the output callback) removes through [`drain`](AudioQueue::drain) or
/// [`drain_n`](AudioQueue::drain_n). Samples are interleaved f32 at the
/// owning listener's channel count.
pub struct AudioQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    buffered: AtomicUsize,
}

struct QueueInner {
    /// Published samples, oldest first.
    samples: Vec<f32>,
    /// Recycled writer buffer so steady-state passes do not allocate.
    staging: Vec<f32>,
}

impl AudioQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                samples: Vec::new(),
                staging: Vec::new(),
            }),
            ready: Condvar::new(),
            buffered: AtomicUsize::new(0),
        }
    }

    /// Reserves a zeroed span of `len` samples for the producer to fill.
    ///
    /// Nothing becomes visible to the consumer until the returned writer
    /// publishes (explicitly via [`QueueWriter::end`], or on drop). The
    /// queue's lock is not held while the span is being filled.
    pub fn begin(&self, len: usize) -> QueueWriter<'_> {
        let mut staging = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.staging)
        };
        staging.clear();
        staging.resize(len, 0.0);
        QueueWriter {
            queue: self,
            buf: staging,
        }
    }

    /// Blocks until `output.len()` samples are available, then removes
    /// them in FIFO order.
    ///
    /// This waits indefinitely by contract; only the hardware callback is
    /// expected to call it, and an underrun shows up as that callback
    /// blocking (silence) until the producer catches up.
    pub fn drain(&self, output: &mut [f32]) {
        let mut inner = self.inner.lock().unwrap();
        while inner.samples.len() < output.len() {
            inner = self.ready.wait(inner).unwrap();
        }
        output.copy_from_slice(&inner.samples[..output.len()]);
        inner.samples.drain(..output.len());
        self.buffered.store(inner.samples.len(), Ordering::Release);
    }

    /// Non-blocking drain: removes at most `output.len()` samples and
    /// returns how many were actually copied.
    pub fn drain_n(&self, output: &mut [f32]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let count = output.len().min(inner.samples.len());
        output[..count].copy_from_slice(&inner.samples[..count]);
        inner.samples.drain(..count);
        self.buffered.store(inner.samples.len(), Ordering::Release);
        count
    }

    /// Drops up to `count` buffered samples from the front and returns
    /// how many were dropped.
    pub fn discard(&self, count: usize) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let count = count.min(inner.samples.len());
        inner.samples.drain(..count);
        self.buffered.store(inner.samples.len(), Ordering::Release);
        count
    }

    /// Drops everything buffered. Used when a stream restarts, so stale
    /// audio queued before the restart is never heard.
    pub fn discard_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.samples.clear();
        self.buffered.store(0, Ordering::Release);
    }

    /// Published sample count, readable without taking the queue lock.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.buffered() == 0
    }
}

impl Default for AudioQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioQueue")
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Writable span handed out by [`AudioQueue::begin`].
///
/// Dereferences to the reserved `&mut [f32]`. Publishing happens on drop,
/// so a panicking producer still wakes any blocked consumer with whatever
/// it managed to write.
pub struct QueueWriter<'a> {
    queue: &'a AudioQueue,
    buf: Vec<f32>,
}

impl QueueWriter<'_> {
    /// Publishes the span: appends it to the queue, updates the buffered
    /// counter, and wakes waiting consumers.
    pub fn end(self) {
        drop(self);
    }
}

impl std::ops::Deref for QueueWriter<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buf
    }
}

impl std::ops::DerefMut for QueueWriter<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buf
    }
}

impl Drop for QueueWriter<'_> {
    fn drop(&mut self) {
        let mut inner = self.queue.inner.lock().unwrap();
        inner.samples.append(&mut self.buf);
        inner.staging = std::mem::take(&mut self.buf);
        self.queue
            .buffered
            .store(inner.samples.len(), Ordering::Release);
        drop(inner);
        self.queue.ready.notify_all();
    }
}

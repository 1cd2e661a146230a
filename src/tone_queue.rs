//! Bounded tone queue: producer/consumer FIFO shared between
//! the client thread and the generator's consumer thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{CwError, CwResult};

/// How the synthesizer should shape the rise/fall of a tone, consumed here
/// only as an opaque field of `Tone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeMode {
    Standard,
    None,
    RisingOnly,
    FallingOnly,
}

/// Sentinel unit: the smallest duration the generator reasons about.
pub const QUANTUM_US: i64 = 100;

/// Sentinel tone duration meaning "keep emitting this tone until a new one
/// is enqueued".
pub const FOREVER: i64 = -QUANTUM_US;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub duration_us: i64,
    pub frequency_hz: i32,
    pub slope_mode: SlopeMode,
}

impl Tone {
    pub fn new(duration_us: i64, frequency_hz: i32, slope_mode: SlopeMode) -> Self {
        Tone {
            duration_us,
            frequency_hz,
            slope_mode,
        }
    }

    pub fn forever(frequency_hz: i32, slope_mode: SlopeMode) -> Self {
        Tone {
            duration_us: FOREVER,
            frequency_hz,
            slope_mode,
        }
    }

    pub fn is_forever(&self) -> bool {
        self.duration_us == FOREVER
    }

    pub fn silence(duration_us: i64) -> Self {
        Tone {
            duration_us,
            frequency_hz: 0,
            slope_mode: SlopeMode::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Busy,
}

type LowWaterCallback = Box<dyn FnMut() + Send>;

struct Inner {
    buf: VecDeque<Tone>,
    capacity: usize,
    low_water_mark: usize,
    low_water_callback: Option<LowWaterCallback>,
    stop_requested: bool,
    /// Whether `buf.len() > low_water_mark` as of the last enqueue/dequeue/
    /// flush, so a dequeue only fires the callback on the downward crossing
    /// rather than on every pop that happens to land at or below the mark.
    was_above_low_water: bool,
}

/// Fixed-capacity circular FIFO of tones, with a low-water callback and a
/// FOREVER-tone dequeue sentinel. One producer thread and one consumer
/// thread may operate concurrently.
pub struct ToneQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full_enough: Condvar,
}

impl ToneQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(ToneQueue {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                low_water_mark: 0,
                low_water_callback: None,
                stop_requested: false,
                was_above_low_water: false,
            }),
            not_empty: Condvar::new(),
            not_full_enough: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    pub fn length(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    pub fn is_full(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.buf.len() >= g.capacity
    }

    pub fn state(&self) -> QueueState {
        if self.length() == 0 {
            QueueState::Idle
        } else {
            QueueState::Busy
        }
    }

    /// Registers a callback invoked (from the consumer thread) exactly once
    /// each time `len` transitions from above `level` to at or below it,
    /// after a successful dequeue.
    pub fn register_low_water_callback(&self, level: usize, callback: impl FnMut() + Send + 'static) {
        let mut g = self.inner.lock().unwrap();
        g.low_water_mark = level;
        g.low_water_callback = Some(Box::new(callback));
        g.was_above_low_water = g.buf.len() > level;
    }

    /// Enqueues a tone. If the tail is a FOREVER tone and it is the only
    /// entry, replaces it in place instead of growing the queue — this is
    /// the mechanism that ends a "forever" idle tone.
    pub fn enqueue(&self, tone: Tone) -> CwResult<()> {
        let mut g = self.inner.lock().unwrap();
        if g.buf.len() == 1 && g.buf.back().map(Tone::is_forever).unwrap_or(false) {
            *g.buf.back_mut().unwrap() = tone;
            g.was_above_low_water = g.buf.len() > g.low_water_mark;
            self.not_empty.notify_all();
            return Ok(());
        }
        if g.buf.len() >= g.capacity {
            return Err(CwError::QueueFull);
        }
        g.buf.push_back(tone);
        g.was_above_low_water = g.buf.len() > g.low_water_mark;
        self.not_empty.notify_all();
        Ok(())
    }

    /// Blocks until a tone is available or the queue is told to stop.
    /// Returns `None` once stopped with nothing left to drain. If the head
    /// is the last remaining tone and it is FOREVER, it is returned
    /// repeatedly without being removed.
    pub fn dequeue(&self) -> Option<(Tone, QueueState)> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(&front) = g.buf.front() {
                let keep_forever = g.buf.len() == 1 && front.is_forever();
                if !keep_forever {
                    let was_above = g.was_above_low_water;
                    g.buf.pop_front();
                    let len = g.buf.len();
                    let low_water = g.low_water_mark;
                    if was_above && len <= low_water {
                        if let Some(cb) = g.low_water_callback.as_mut() {
                            cb();
                        }
                    }
                    g.was_above_low_water = len > low_water;
                    self.not_full_enough.notify_all();
                }
                let state = if g.buf.is_empty() {
                    QueueState::Idle
                } else {
                    QueueState::Busy
                };
                return Some((front, state));
            }
            if g.stop_requested {
                return None;
            }
            g = self.not_empty.wait(g).unwrap();
        }
    }

    /// Clears the queue and transitions to IDLE; delivers the low-water
    /// callback if the drop crosses the threshold. Cooperative: does not
    /// interrupt an in-progress tone already dequeued by the consumer.
    pub fn flush(&self) {
        let mut g = self.inner.lock().unwrap();
        let was_above = g.was_above_low_water;
        g.buf.clear();
        if was_above {
            if let Some(cb) = g.low_water_callback.as_mut() {
                cb();
            }
        }
        g.was_above_low_water = false;
        self.not_full_enough.notify_all();
    }

    /// Blocks the caller until `length() <= target_len`.
    pub fn wait_for_level(&self, target_len: usize) {
        let mut g = self.inner.lock().unwrap();
        while g.buf.len() > target_len && !g.stop_requested {
            g = self.not_full_enough.wait(g).unwrap();
        }
    }

    /// Signals the consumer to stop blocking in `dequeue` once the queue
    /// drains; does not clear pending tones.
    pub fn request_stop(&self) {
        let mut g = self.inner.lock().unwrap();
        g.stop_requested = true;
        self.not_empty.notify_all();
        self.not_full_enough.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(us: i64) -> Tone {
        Tone::new(us, 600, SlopeMode::Standard)
    }

    #[test]
    fn fifo_conservation() {
        let q = ToneQueue::new(8);
        q.enqueue(tone(1)).unwrap();
        q.enqueue(tone(2)).unwrap();
        q.enqueue(tone(3)).unwrap();
        q.request_stop();
        assert_eq!(q.dequeue().unwrap().0.duration_us, 1);
        assert_eq!(q.dequeue().unwrap().0.duration_us, 2);
        assert_eq!(q.dequeue().unwrap().0.duration_us, 3);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn forever_tone_survives_repeated_dequeue() {
        let q = ToneQueue::new(8);
        q.enqueue(Tone::forever(600, SlopeMode::None)).unwrap();
        for _ in 0..5 {
            let (t, _) = q.dequeue().unwrap();
            assert!(t.is_forever());
            assert_eq!(q.length(), 1);
        }
        q.enqueue(tone(123)).unwrap();
        assert_eq!(q.length(), 1); // replaced in place, did not grow
        let (t, state) = q.dequeue().unwrap();
        assert_eq!(t.duration_us, 123);
        assert_eq!(state, QueueState::Idle);
        assert_eq!(q.length(), 0);
    }

    #[test]
    fn enqueue_full_queue_fails() {
        let q = ToneQueue::new(2);
        q.enqueue(tone(1)).unwrap();
        q.enqueue(tone(2)).unwrap();
        assert_eq!(q.enqueue(tone(3)), Err(CwError::QueueFull));
    }

    #[test]
    fn low_water_callback_fires_once_per_crossing() {
        let q = ToneQueue::new(8);
        let count = Arc::new(Mutex::new(0));
        let count2 = count.clone();
        q.register_low_water_callback(1, move || {
            *count2.lock().unwrap() += 1;
        });
        for i in 0..4 {
            q.enqueue(tone(i + 1)).unwrap();
        }
        // len: 4 -> 3 -> 2 -> 1 -> 0; the queue is only above the mark (1)
        // before the dequeue that takes it from 2 to 1, so the callback
        // fires exactly once, on that single downward crossing.
        q.dequeue().unwrap();
        q.dequeue().unwrap();
        q.dequeue().unwrap();
        q.dequeue().unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn flush_fires_callback_only_when_above_threshold() {
        let q = ToneQueue::new(8);
        let count = Arc::new(Mutex::new(0));
        let count2 = count.clone();
        q.register_low_water_callback(1, move || {
            *count2.lock().unwrap() += 1;
        });

        q.enqueue(tone(1)).unwrap();
        q.enqueue(tone(2)).unwrap();
        q.enqueue(tone(3)).unwrap();
        assert_eq!(q.length(), 3);
        q.flush();
        assert_eq!(q.length(), 0);
        assert_eq!(q.state(), QueueState::Idle);
        assert_eq!(*count.lock().unwrap(), 1, "length 3 was above the mark of 1");

        // Already at/below the mark: a second flush on an empty queue must
        // not fire again.
        q.flush();
        assert_eq!(*count.lock().unwrap(), 1);

        q.enqueue(tone(1)).unwrap();
        assert_eq!(q.length(), 1);
        q.flush();
        assert_eq!(
            *count.lock().unwrap(),
            1,
            "length 1 was already at the mark, not above it"
        );
    }

    #[test]
    fn wait_for_level_unblocks_after_dequeue() {
        let q = ToneQueue::new(8);
        q.enqueue(tone(1)).unwrap();
        q.enqueue(tone(2)).unwrap();
        let q2 = Arc::clone(&q);
        let handle = std::thread::spawn(move || {
            q2.wait_for_level(1);
        });
        q.dequeue().unwrap();
        handle.join().unwrap();
        assert!(q.length() <= 1);
    }
}

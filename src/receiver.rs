//! Receiver state machine: classifies keying edges into
//! marks and spaces, and marks/spaces into representations and characters.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CwError, CwResult};
use crate::morse;
use crate::timing::{ReceiveDerived, ReceiveTimingParams};

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Mark,
    Space,
    EocGap,
    EowGap,
    EocGapErr,
    EowGapErr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkKind {
    Dot,
    Dash,
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Dot,
    Dash,
    InterMarkSpace,
    InterCharSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkEndOutcome {
    Accepted,
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivePoll {
    TryAgain,
    Ready {
        representation: String,
        is_end_of_word: bool,
        is_error: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharPoll {
    TryAgain,
    Ready {
        character: char,
        is_end_of_word: bool,
    },
}

/// 4-slot moving average ring, oldest sample evicted on each push.
#[derive(Debug, Clone, Copy)]
struct RingAvg4 {
    buf: [i64; 4],
    len: usize,
    idx: usize,
    default: i64,
}

impl RingAvg4 {
    fn new(default: i64) -> Self {
        RingAvg4 {
            buf: [default; 4],
            len: 0,
            idx: 0,
            default,
        }
    }

    fn push(&mut self, value: i64) {
        self.buf[self.idx] = value;
        self.idx = (self.idx + 1) % self.buf.len();
        if self.len < self.buf.len() {
            self.len += 1;
        }
    }

    fn mean(&self) -> i64 {
        if self.len == 0 {
            return self.default;
        }
        let sum: i64 = self.buf[..self.len].iter().sum();
        sum / self.len as i64
    }
}

/// 256-slot statistics ring of (kind, observed - ideal) in microseconds.
#[derive(Debug, Default)]
struct StatsRing {
    records: VecDeque<(StatKind, i64)>,
}

const STATS_CAPACITY: usize = 256;

impl StatsRing {
    fn push(&mut self, kind: StatKind, delta_us: i64) {
        if self.records.len() == STATS_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back((kind, delta_us));
    }

    fn stddev(&self, kind: StatKind) -> f64 {
        let deltas: Vec<i64> = self
            .records
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, d)| *d)
            .collect();
        if deltas.is_empty() {
            return 0.0;
        }
        let mean_sq: f64 = deltas.iter().map(|d| (*d as f64).powi(2)).sum::<f64>() / deltas.len() as f64;
        mean_sq.sqrt()
    }
}

/// Consumes keying edges and timestamps, classifies marks and spaces, and
/// produces representations and characters.
pub struct Receiver {
    state: ReceiverState,
    timing: ReceiveTimingParams,
    rep: String,
    mark_start: i64,
    mark_end: i64,
    last_timestamp: Option<i64>,
    dot_avg: RingAvg4,
    dash_avg: RingAvg4,
    stats: StatsRing,
}

impl Receiver {
    pub fn new(timing: ReceiveTimingParams) -> Self {
        let unit = timing.ideal_unit();
        Receiver {
            state: ReceiverState::Idle,
            timing,
            rep: String::with_capacity(morse::MAX_REP_LEN),
            mark_start: 0,
            mark_end: 0,
            last_timestamp: None,
            dot_avg: RingAvg4::new(unit),
            dash_avg: RingAvg4::new(3 * unit),
            stats: StatsRing::default(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn timing(&mut self) -> &mut ReceiveTimingParams {
        &mut self.timing
    }

    fn resolve_timestamp(&mut self, t: Option<i64>) -> CwResult<i64> {
        let t = t.unwrap_or_else(now_us);
        if let Some(last) = self.last_timestamp {
            if t < last {
                return Err(CwError::OutOfOrder);
            }
        }
        self.last_timestamp = Some(t);
        Ok(t)
    }

    fn record_stat(&mut self, kind: StatKind, delta_us: i64) {
        self.stats.push(kind, delta_us);
    }

    fn identify_mark(mark_len: i64, d: ReceiveDerived) -> MarkKind {
        if mark_len >= d.dot_min && mark_len <= d.dot_max {
            MarkKind::Dot
        } else if mark_len >= d.dash_min && mark_len <= d.dash_max {
            MarkKind::Dash
        } else {
            MarkKind::Unrecognized
        }
    }

    fn update_adaptive(&mut self, mark_len: i64, is_dot: bool) {
        if !self.timing.adaptive_mode() {
            return;
        }
        if is_dot {
            self.dot_avg.push(mark_len);
        } else {
            self.dash_avg.push(mark_len);
        }
        let avg_dot = self.dot_avg.mean();
        let avg_dash = self.dash_avg.mean();
        let threshold = avg_dot + (avg_dash - avg_dot) / 2;
        self.timing.update_adaptive_threshold(threshold);
        self.timing.sync();
        self.timing.force_resync();
        self.timing.sync();
    }

    /// Appends an accepted symbol to the representation buffer, completing
    /// the IDLE/SPACE -> MARK -> SPACE (or synthetic add_dot/add_dash)
    /// transition.
    fn push_symbol(&mut self, symbol: char, t: i64) -> CwResult<()> {
        if self.rep.len() >= morse::MAX_REP_LEN {
            self.state = ReceiverState::EocGapErr;
            self.mark_end = t;
            return Err(CwError::BufferFull);
        }
        self.rep.push(symbol);
        self.mark_end = t;
        self.state = ReceiverState::Space;
        Ok(())
    }

    /// Precondition: state in {Idle, Space}. Starts a new mark.
    pub fn notify_mark_begin(&mut self, t: Option<i64>) -> CwResult<()> {
        if !matches!(self.state, ReceiverState::Idle | ReceiverState::Space) {
            return Err(CwError::OutOfOrder);
        }
        let t = self.resolve_timestamp(t)?;
        if self.state == ReceiverState::Space {
            let ideal = self.timing.ideal_unit();
            self.record_stat(StatKind::InterMarkSpace, (t - self.mark_end) - ideal);
        }
        self.mark_start = t;
        self.state = ReceiverState::Mark;
        Ok(())
    }

    /// Precondition: state == Mark. Classifies the mark just ended.
    pub fn notify_mark_end(&mut self, t: Option<i64>) -> CwResult<MarkEndOutcome> {
        if self.state != ReceiverState::Mark {
            return Err(CwError::OutOfOrder);
        }
        let t = self.resolve_timestamp(t)?;
        let mark_len = t - self.mark_start;

        let threshold = self.timing.noise_spike_threshold_us();
        if threshold > 0 && mark_len <= threshold {
            self.state = if self.rep.is_empty() {
                ReceiverState::Idle
            } else {
                ReceiverState::Space
            };
            return Ok(MarkEndOutcome::Suppressed);
        }

        let d = self.timing.derived();
        let ideal_unit = self.timing.ideal_unit();
        match Self::identify_mark(mark_len, d) {
            MarkKind::Dot => {
                self.record_stat(StatKind::Dot, mark_len - ideal_unit);
                self.update_adaptive(mark_len, true);
                self.push_symbol('.', t)?;
                Ok(MarkEndOutcome::Accepted)
            }
            MarkKind::Dash => {
                self.record_stat(StatKind::Dash, mark_len - 3 * ideal_unit);
                self.update_adaptive(mark_len, false);
                self.push_symbol('-', t)?;
                Ok(MarkEndOutcome::Accepted)
            }
            MarkKind::Unrecognized => {
                self.state = if mark_len > d.eoc_max {
                    ReceiverState::EowGapErr
                } else {
                    ReceiverState::EocGapErr
                };
                self.mark_end = t;
                Err(CwError::Unrecognizable)
            }
        }
    }

    /// Synthetic edge path: appends a dot without observing a key-down.
    pub fn add_dot(&mut self, t: Option<i64>) -> CwResult<()> {
        self.add_symbol('.', t)
    }

    /// Synthetic edge path: appends a dash without observing a key-down.
    pub fn add_dash(&mut self, t: Option<i64>) -> CwResult<()> {
        self.add_symbol('-', t)
    }

    fn add_symbol(&mut self, symbol: char, t: Option<i64>) -> CwResult<()> {
        if !matches!(self.state, ReceiverState::Idle | ReceiverState::Space) {
            return Err(CwError::OutOfOrder);
        }
        let t = self.resolve_timestamp(t)?;
        self.push_symbol(symbol, t)
    }

    /// Polls for a completed representation. Returns `TryAgain` while still
    /// inside a mark, idle, or a space that hasn't yet resolved to an
    /// end-of-character or end-of-word gap.
    pub fn poll_representation(&mut self, now: Option<i64>) -> ReceivePoll {
        let now = now.unwrap_or_else(now_us);
        match self.state {
            ReceiverState::Idle | ReceiverState::Mark => ReceivePoll::TryAgain,
            ReceiverState::EowGap | ReceiverState::EowGapErr => ReceivePoll::Ready {
                representation: self.rep.clone(),
                is_end_of_word: true,
                is_error: self.state == ReceiverState::EowGapErr,
            },
            ReceiverState::Space | ReceiverState::EocGap | ReceiverState::EocGapErr => {
                let d = self.timing.derived();
                let space_len = now - self.mark_end;
                if space_len < d.eoc_min {
                    return ReceivePoll::TryAgain;
                }
                if space_len <= d.eoc_max {
                    if self.state == ReceiverState::Space {
                        let ideal = 3 * self.timing.ideal_unit();
                        self.record_stat(StatKind::InterCharSpace, space_len - ideal);
                        self.state = ReceiverState::EocGap;
                    }
                    ReceivePoll::Ready {
                        representation: self.rep.clone(),
                        is_end_of_word: false,
                        is_error: self.state == ReceiverState::EocGapErr,
                    }
                } else {
                    self.state = match self.state {
                        ReceiverState::EocGapErr => ReceiverState::EowGapErr,
                        _ => ReceiverState::EowGap,
                    };
                    ReceivePoll::Ready {
                        representation: self.rep.clone(),
                        is_end_of_word: true,
                        is_error: self.state == ReceiverState::EowGapErr,
                    }
                }
            }
        }
    }

    /// Composes `poll_representation` with the reverse Morse lookup.
    pub fn poll_character(&mut self, now: Option<i64>) -> CwResult<CharPoll> {
        match self.poll_representation(now) {
            ReceivePoll::TryAgain => Ok(CharPoll::TryAgain),
            ReceivePoll::Ready {
                representation,
                is_end_of_word,
                is_error,
            } => {
                if is_error {
                    return Err(CwError::Unrecognizable);
                }
                match morse::representation_to_character(&representation) {
                    Some(character) => Ok(CharPoll::Ready {
                        character,
                        is_end_of_word,
                    }),
                    None => Err(CwError::Unrecognizable),
                }
            }
        }
    }

    /// Resets the representation buffer and returns to IDLE; statistics and
    /// adaptive averages are preserved.
    pub fn clear_buffer(&mut self) {
        self.rep.clear();
        self.state = ReceiverState::Idle;
    }

    /// Full reset including statistics and adaptive averages.
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.mark_start = 0;
        self.mark_end = 0;
        self.last_timestamp = None;
        self.stats = StatsRing::default();
        let unit = self.timing.ideal_unit();
        self.dot_avg = RingAvg4::new(unit);
        self.dash_avg = RingAvg4::new(3 * unit);
    }

    pub fn stddev(&self, kind: StatKind) -> f64 {
        self.stats.stddev(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ReceiveTimingParams;

    fn fixed_receiver(wpm: u32, tolerance_pct: u32) -> Receiver {
        let timing = ReceiveTimingParams::new(wpm, tolerance_pct, 0).unwrap();
        Receiver::new(timing)
    }

    #[test]
    fn scenario_feed_a_at_12_wpm() {
        // [mark 100ms, space 100ms, mark 300ms, space 300ms] -> "A", not EOW.
        let mut r = fixed_receiver(12, 5);
        r.notify_mark_begin(Some(0)).unwrap();
        r.notify_mark_end(Some(100_000)).unwrap();
        r.notify_mark_begin(Some(200_000)).unwrap();
        r.notify_mark_end(Some(500_000)).unwrap();
        match r.poll_representation(Some(800_000)) {
            ReceivePoll::Ready {
                representation,
                is_end_of_word,
                is_error,
            } => {
                assert_eq!(representation, ".-");
                assert!(!is_end_of_word);
                assert!(!is_error);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(
            morse::representation_to_character(".-"),
            Some('A')
        );
    }

    #[test]
    fn out_of_order_on_double_mark_begin() {
        let mut r = fixed_receiver(12, 5);
        r.notify_mark_begin(Some(0)).unwrap();
        r.notify_mark_end(Some(100_000)).unwrap();
        // Second mark_end while not in Mark state.
        assert_eq!(r.notify_mark_end(Some(150_000)), Err(CwError::OutOfOrder));
    }

    #[test]
    fn noise_suppression_restores_state() {
        let mut r = fixed_receiver(20, 5);
        r.timing().set_noise_spike_threshold(10_000).unwrap();
        r.notify_mark_begin(Some(0)).unwrap();
        let outcome = r.notify_mark_end(Some(5_000)).unwrap();
        assert_eq!(outcome, MarkEndOutcome::Suppressed);
        assert_eq!(r.state(), ReceiverState::Idle);
        assert_eq!(r.rep, "");
    }

    #[test]
    fn eow_poll_is_idempotent() {
        let mut r = fixed_receiver(20, 5);
        r.notify_mark_begin(Some(0)).unwrap();
        r.notify_mark_end(Some(60_000)).unwrap(); // dot
        let first = r.poll_representation(Some(60_000 + 1_000_000));
        let second = r.poll_representation(Some(60_000 + 2_000_000));
        assert_eq!(first, second);
    }

    #[test]
    fn adaptive_tracks_speed_to_within_one_wpm() {
        let mut timing = ReceiveTimingParams::new(20, 0, 0).unwrap();
        timing.set_adaptive_mode(true);
        let mut r = Receiver::new(timing);
        let mut t: i64 = 0;
        for _ in 0..50 {
            r.notify_mark_begin(Some(t)).unwrap();
            t += 60_000;
            r.notify_mark_end(Some(t)).unwrap();
            t += 60_000; // intra-char gap
            r.notify_mark_begin(Some(t)).unwrap();
            t += 180_000;
            r.notify_mark_end(Some(t)).unwrap();
            t += 60_000;
        }
        let wpm = r.timing.speed_wpm() as i64;
        assert!((wpm - 20).abs() <= 1, "expected ~20 wpm, got {}", wpm);
    }

    #[test]
    fn buffer_full_transitions_to_eoc_gap_err() {
        let mut r = fixed_receiver(20, 5);
        let mut t: i64 = 0;
        for _ in 0..morse::MAX_REP_LEN {
            r.add_dot(Some(t)).unwrap();
            t += 1;
        }
        assert_eq!(r.add_dot(Some(t)), Err(CwError::BufferFull));
        assert_eq!(r.state(), ReceiverState::EocGapErr);
    }
}

//! Sine synthesizer and slope table: sample-accurate PCM generation for a
//! tone, with shaped rise/fall and phase continuity across concatenated
//! tones.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use crate::tone_queue::{SlopeMode, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SlopeShape {
    Linear,
    RaisedCosine,
    Sine,
    Rectangular,
}

/// Precomputed rise amplitude curve in `[0.0, 1.0]`, shared by rising and
/// falling portions of a tone (the falling portion reads it in reverse).
#[derive(Debug, Clone)]
struct SlopeTable {
    amps: Vec<f32>,
}

impl SlopeTable {
    fn new(sample_rate: u32, slope_length_us: u32, shape: SlopeShape) -> Self {
        let n = ((slope_length_us as u64 * sample_rate as u64) / 1_000_000).max(1) as usize;
        let denom = (n.saturating_sub(1)).max(1) as f32;
        let amps = (0..n)
            .map(|i| match shape {
                SlopeShape::Linear => i as f32 / denom,
                SlopeShape::RaisedCosine => {
                    (1.0 - (PI as f32 * i as f32 / denom).cos()) / 2.0
                }
                SlopeShape::Sine => ((PI as f32 / 2.0) * i as f32 / denom).sin(),
                SlopeShape::Rectangular => 1.0,
            })
            .collect();
        SlopeTable { amps }
    }

    fn len(&self) -> usize {
        self.amps.len()
    }

    fn amp(&self, i: usize) -> f32 {
        self.amps.get(i).copied().unwrap_or(1.0)
    }
}

/// Parameters a running synthesizer reads on every buffer; changes made by
/// the client thread are picked up by the consumer thread under a short
/// lock, per the slope-table-reallocation design note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub slope_length_us: u32,
    pub shape: SlopeShape,
    pub volume: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            sample_rate: 44_100,
            slope_length_us: 5_000,
            shape: SlopeShape::RaisedCosine,
            volume: 0.5,
        }
    }
}

pub type SharedSynthConfig = Arc<Mutex<SynthConfig>>;

/// Generates PCM samples for the currently dequeued tone. Persists phase
/// across tones of the same frequency so back-to-back tones don't click.
pub struct SineSynthesizer {
    config: SharedSynthConfig,
    cached: SynthConfig,
    table: SlopeTable,
    phase: f64,
}

impl SineSynthesizer {
    pub fn new(config: SharedSynthConfig) -> Self {
        let cached = *config.lock().unwrap();
        let table = SlopeTable::new(cached.sample_rate, cached.slope_length_us, cached.shape);
        SineSynthesizer {
            config,
            cached,
            table,
            phase: 0.0,
        }
    }

    fn refresh(&mut self) {
        let current = *self.config.lock().unwrap();
        if current.sample_rate != self.cached.sample_rate
            || current.slope_length_us != self.cached.slope_length_us
            || current.shape != self.cached.shape
        {
            self.table = SlopeTable::new(current.sample_rate, current.slope_length_us, current.shape);
        }
        self.cached = current;
    }

    fn amplitude_at(&self, k: usize, n_samples: usize, mode: SlopeMode) -> f32 {
        let slope_n = self.table.len();
        let rising_ok = matches!(mode, SlopeMode::Standard | SlopeMode::RisingOnly);
        let falling_ok = matches!(mode, SlopeMode::Standard | SlopeMode::FallingOnly);
        if rising_ok && k < slope_n {
            return self.table.amp(k);
        }
        if falling_ok {
            let idx_from_end = n_samples.saturating_sub(1).saturating_sub(k);
            if idx_from_end < slope_n {
                return self.table.amp(idx_from_end);
            }
        }
        1.0
    }

    /// Returns the sample count for `tone` at the current sample rate.
    pub fn sample_count(&self, tone: &Tone) -> usize {
        ((tone.duration_us.max(0) as u64 * self.cached.sample_rate as u64) / 1_000_000) as usize
    }

    /// Fills `out` with exactly `out.len()` samples of `tone`. Frequency 0
    /// emits silence. Does not reset phase between calls for the same tone,
    /// so callers filling one tone across several buffer writes must not
    /// call `fill` for a different tone mid-way.
    pub fn fill(&mut self, tone: Tone, out: &mut [i16], sample_offset: usize, n_samples: usize) {
        self.refresh();
        if tone.frequency_hz == 0 {
            out.fill(0);
            return;
        }
        let sr = self.cached.sample_rate as f64;
        let increment = 2.0 * PI * tone.frequency_hz as f64 / sr;
        // Fast-forward local phase bookkeeping is unnecessary: `self.phase`
        // already reflects the accumulated angle up to `sample_offset`
        // because `fill` is called for consecutive chunks of the same tone
        // in order.
        for (i, slot) in out.iter_mut().enumerate() {
            let k = sample_offset + i;
            let amp = self.amplitude_at(k, n_samples, tone.slope_mode);
            let s = self.cached.volume * amp * self.phase.sin() as f32;
            *slot = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.phase += increment;
            if self.phase > 2.0 * PI {
                self.phase -= 2.0 * PI;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone_queue::SlopeMode;

    fn synth(shape: SlopeShape) -> SineSynthesizer {
        let cfg = Arc::new(Mutex::new(SynthConfig {
            sample_rate: 8000,
            slope_length_us: 5000,
            shape,
            volume: 1.0,
        }));
        SineSynthesizer::new(cfg)
    }

    #[test]
    fn slope_table_endpoints() {
        let t = SlopeTable::new(8000, 5000, SlopeShape::Linear);
        assert!((t.amp(0) - 0.0).abs() < 1e-6);
        assert!((t.amp(t.len() - 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rectangular_slope_is_flat() {
        let t = SlopeTable::new(8000, 5000, SlopeShape::Rectangular);
        for i in 0..t.len() {
            assert_eq!(t.amp(i), 1.0);
        }
    }

    #[test]
    fn silence_tone_is_all_zero() {
        let mut s = synth(SlopeShape::Sine);
        let tone = Tone::new(10_000, 0, SlopeMode::Standard);
        let n = s.sample_count(&tone);
        let mut buf = vec![1234i16; n];
        s.fill(tone, &mut buf, 0, n);
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn tone_starts_near_zero_amplitude_with_rising_slope() {
        let mut s = synth(SlopeShape::RaisedCosine);
        let tone = Tone::new(50_000, 600, SlopeMode::Standard);
        let n = s.sample_count(&tone);
        let mut buf = vec![0i16; n];
        s.fill(tone, &mut buf, 0, n);
        assert!(buf[0].abs() < 200, "expected near-zero first sample, got {}", buf[0]);
    }

    #[test]
    fn none_slope_has_full_amplitude_immediately() {
        let mut s = synth(SlopeShape::Sine);
        let tone = Tone::new(50_000, 600, SlopeMode::None);
        let n = s.sample_count(&tone);
        let mut buf = vec![0i16; n];
        s.fill(tone, &mut buf, 0, n);
        // sample 0 at phase 0 is sin(0) == 0 regardless of amplitude, so
        // check a later sample where sin() is away from a zero crossing.
        assert!(buf[2].unsigned_abs() > 1000);
    }
}

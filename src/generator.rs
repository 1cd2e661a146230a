//! Generator: owns a tone queue, an audio sink, and a consumer thread that
//! drains tones into rendered samples, as a long-lived worker rather than a
//! one-shot buffer build.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rand::Rng;

use crate::audio::AudioSink;
use crate::bridge::KeyCallback;
use crate::error::{CwError, CwResult};
use crate::morse;
use crate::synth::{SharedSynthConfig, SineSynthesizer, SynthConfig};
use crate::timing::GenTimingParams;
use crate::tone_queue::{SlopeMode, Tone, ToneQueue};

const RENDER_CHUNK_SAMPLES: usize = 256;
const DEFAULT_QUEUE_CAPACITY: usize = 3000;

/// SSB-style band-pass noise: an auxiliary QRM coloring of the rendered
/// signal, not part of the core send-path semantics.
struct QrmNoise {
    amplitude: f32,
    i: f32,
    q: f32,
    phase: f64,
}

impl QrmNoise {
    fn new(qrm_level: u8) -> Self {
        let amplitude = match qrm_level {
            0 => 0.01,
            1 => 0.03,
            2 => 0.06,
            3 => 0.10,
            4 => 0.18,
            5 => 0.30,
            6 => 0.50,
            7 => 0.80,
            8 => 1.20,
            9 => 2.00,
            _ => 0.01,
        };
        QrmNoise { amplitude, i: 0.0, q: 0.0, phase: 0.0 }
    }

    fn next(&mut self, sample_rate: u32) -> f32 {
        let white = rand::rng().random_range(-1.0f32..1.0);
        self.i += (white - self.i) * 0.12;
        let target_q = self.i;
        self.q += (target_q - self.q) * 0.12;
        self.phase += 2.0 * std::f64::consts::PI * 1000.0 / sample_rate as f64;
        let car_i = self.phase.cos() as f32;
        let car_q = self.phase.sin() as f32;
        self.i * car_i - self.q * car_q
    }
}

/// Frequency-drift shaping applied across the lifetime of a single tone:
/// an exponential decay of the frequency scale factor toward a target.
struct Drift {
    percentage: Option<u8>,
}

impl Drift {
    fn factor(&self, elapsed_s: f64) -> f64 {
        match self.percentage {
            None => 1.0,
            Some(pct) => {
                let target_fraction = pct as f64 / 100.0;
                let decay_rate = 1.2;
                target_fraction + (1.0 - target_fraction) * (-decay_rate * elapsed_s).exp()
            }
        }
    }
}

/// Tone queue + consumer thread + audio sink, the send-path endpoint that
/// turns character enqueues into rendered, played-or-saved audio.
pub struct Generator {
    queue: Arc<ToneQueue>,
    timing: Arc<Mutex<GenTimingParams>>,
    synth_config: SharedSynthConfig,
    frequency_hz: Arc<AtomicI32>,
    qrm_level: Arc<AtomicU32>,
    drift_percentage: Arc<Mutex<Option<u8>>>,
    key_callback: Arc<Mutex<Option<KeyCallback>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Generator {
    pub fn new(speed_wpm: u32, tolerance_pct: u32, gap_units: u32, weighting_pct: u32) -> CwResult<Self> {
        let timing = GenTimingParams::new(speed_wpm, tolerance_pct, gap_units, weighting_pct)?;
        Ok(Generator {
            queue: ToneQueue::new(DEFAULT_QUEUE_CAPACITY),
            timing: Arc::new(Mutex::new(timing)),
            synth_config: Arc::new(Mutex::new(SynthConfig::default())),
            frequency_hz: Arc::new(AtomicI32::new(600)),
            qrm_level: Arc::new(AtomicU32::new(0)),
            drift_percentage: Arc::new(Mutex::new(None)),
            key_callback: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn register_key_callback(&self, callback: KeyCallback) {
        *self.key_callback.lock().unwrap() = Some(callback);
    }

    pub fn set_qrm_level(&self, level: u8) {
        self.qrm_level.store(level.min(9) as u32, Ordering::Relaxed);
    }

    pub fn set_drift_percentage(&self, pct: Option<u8>) {
        *self.drift_percentage.lock().unwrap() = pct;
    }

    pub fn set_speed(&self, wpm: u32) -> CwResult<()> {
        self.timing.lock().unwrap().set_speed(wpm)
    }

    pub fn set_gap(&self, units: u32) -> CwResult<()> {
        self.timing.lock().unwrap().set_gap(units)
    }

    pub fn set_weighting(&self, pct: u32) -> CwResult<()> {
        self.timing.lock().unwrap().set_weighting(pct)
    }

    pub fn set_frequency(&self, hz: i32) -> CwResult<()> {
        if !(20..=20_000).contains(&hz) {
            return Err(CwError::InvalidParameter {
                name: "frequency_hz",
                value: hz.to_string(),
                range: "20..20000",
            });
        }
        self.frequency_hz.store(hz, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) -> CwResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(CwError::InvalidParameter {
                name: "volume",
                value: volume.to_string(),
                range: "0.0..1.0",
            });
        }
        self.synth_config.lock().unwrap().volume = volume;
        Ok(())
    }

    /// Spawns the consumer thread against `sink`. `sink` is opened on the
    /// worker thread and closed when `stop` joins it.
    pub fn start(&mut self, mut sink: Box<dyn AudioSink>) -> CwResult<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);
        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let qrm_level = Arc::clone(&self.qrm_level);
        let key_callback = Arc::clone(&self.key_callback);
        let synth_config = Arc::clone(&self.synth_config);

        let handle = std::thread::spawn(move || {
            sink.open().expect("audio sink open");
            let sample_rate = sink.preferred_sample_rate();
            {
                let mut cfg = synth_config.lock().unwrap();
                cfg.sample_rate = sample_rate;
            }
            let mut synth = SineSynthesizer::new(Arc::clone(&synth_config));
            let mut noise = QrmNoise::new(qrm_level.load(Ordering::Relaxed) as u8);
            let mut sample_time = 0.0f64;

            while let Some((tone, _state)) = queue.dequeue() {
                let n = synth.sample_count(&tone);
                let is_mark = tone.frequency_hz != 0;

                if is_mark {
                    if let Some(cb) = key_callback.lock().unwrap().as_mut() {
                        cb((sample_time * 1_000_000.0) as i64, true);
                    }
                }

                let mut offset = 0usize;
                let mut buf = vec![0i16; RENDER_CHUNK_SAMPLES.min(n.max(1))];
                while offset < n {
                    let take = (n - offset).min(buf.len());
                    let chunk = &mut buf[..take];
                    synth.fill(tone, chunk, offset, n);

                    if qrm_level.load(Ordering::Relaxed) > 0 {
                        for s in chunk.iter_mut() {
                            let mixed = *s as f32 + noise.next(sample_rate) * i16::MAX as f32;
                            *s = mixed.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                        }
                    }

                    if sink.write(chunk).is_err() {
                        running.store(false, Ordering::Release);
                        return;
                    }
                    offset += take;
                    sample_time += take as f64 / sample_rate as f64;
                }

                if is_mark {
                    if let Some(cb) = key_callback.lock().unwrap().as_mut() {
                        cb((sample_time * 1_000_000.0) as i64, false);
                    }
                }
            }
            let _ = sink.close();
        });
        self.worker = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.queue.request_stop();
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// Renders `text` through the synthesizer into an owned buffer without
    /// a live sink or queue, for the CLI's WAV-export path and for
    /// standalone frequency-drift rendering. Uses the QRM level and drift
    /// percentage last set via `set_qrm_level`/
    /// `set_drift_percentage`.
    pub fn render_text_to_samples(&self, text: &str, sample_rate: u32) -> CwResult<Vec<i16>> {
        let qrm_level = self.qrm_level.load(Ordering::Relaxed) as u8;
        let drift_percentage = *self.drift_percentage.lock().unwrap();
        let tones = self.string_to_tones(text)?;
        let synth_config = Arc::new(Mutex::new(SynthConfig {
            sample_rate,
            ..*self.synth_config.lock().unwrap()
        }));
        let mut synth = SineSynthesizer::new(synth_config);
        let mut noise = QrmNoise::new(qrm_level.min(9));
        let drift = Drift { percentage: drift_percentage };
        let mut out = Vec::new();
        let mut sample_time = 0.0f64;

        for tone in tones {
            let n = synth.sample_count(&tone);
            let symbol_start = sample_time;
            let mut buf = vec![0i16; n];
            synth.fill(tone, &mut buf, 0, n);
            for s in buf.iter_mut() {
                let elapsed = sample_time - symbol_start;
                let factor = drift.factor(elapsed);
                if tone.frequency_hz != 0 && (factor - 1.0).abs() > f64::EPSILON {
                    *s = ((*s as f64) * factor.min(1.0)) as i16;
                }
                if qrm_level > 0 {
                    let mixed = *s as f32 + noise.next(sample_rate) * i16::MAX as f32;
                    *s = mixed.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
                sample_time += 1.0 / sample_rate as f64;
            }
            out.extend_from_slice(&buf);
        }
        Ok(out)
    }

    /// Enqueues a single character as dot/dash/inter-mark-space tones
    /// followed by an inter-character space.
    pub fn enqueue_character(&self, c: char) -> CwResult<()> {
        let rep = morse::character_to_representation(c).ok_or(CwError::InvalidCharacter(c))?;
        self.enqueue_representation(rep)
    }

    /// Enqueues a raw dot/dash representation (no trailing inter-character
    /// space), for callers composing their own spacing.
    pub fn enqueue_representation(&self, rep: &str) -> CwResult<()> {
        for tone in self.representation_to_tones(rep)? {
            self.queue.enqueue(tone)?;
        }
        Ok(())
    }

    /// Enqueues whitespace-separated text: each word's characters get
    /// inter-character spacing, words get inter-word spacing.
    pub fn enqueue_string(&self, text: &str) -> CwResult<()> {
        for tone in self.string_to_tones(text)? {
            self.queue.enqueue(tone)?;
        }
        Ok(())
    }

    fn representation_to_tones(&self, rep: &str) -> CwResult<Vec<Tone>> {
        if !morse::representation_is_valid(rep) {
            return Err(CwError::InvalidRepresentation(rep.to_string()));
        }
        let mut timing = self.timing.lock().unwrap();
        let d = timing.derived();
        let freq = self.frequency_hz.load(Ordering::Relaxed);
        let mut tones = Vec::new();
        for (i, sym) in rep.chars().enumerate() {
            let dur = match sym {
                '.' => d.dot_length_us,
                '-' => d.dash_length_us,
                _ => unreachable!("validated above"),
            };
            tones.push(Tone::new(dur, freq, SlopeMode::Standard));
            if i + 1 < rep.chars().count() {
                tones.push(Tone::silence(d.eoe_delay_us));
            }
        }
        Ok(tones)
    }

    fn string_to_tones(&self, text: &str) -> CwResult<Vec<Tone>> {
        self.string_to_tones_inner(text, false)
    }

    /// Enqueues `text` with each character's representation reversed
    /// (`.` <-> `-`), as a paddle wired backwards would send it.
    pub fn enqueue_string_paddle_reversed(&self, text: &str) -> CwResult<()> {
        for tone in self.string_to_tones_inner(text, true)? {
            self.queue.enqueue(tone)?;
        }
        Ok(())
    }

    fn string_to_tones_inner(&self, text: &str, reverse_paddles: bool) -> CwResult<Vec<Tone>> {
        let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
        let mut tones = Vec::new();
        for (wi, word) in words.iter().enumerate() {
            let chars: Vec<char> = word.chars().collect();
            for (ci, &ch) in chars.iter().enumerate() {
                let rep = morse::character_to_representation(ch).ok_or(CwError::InvalidCharacter(ch))?;
                let reversed;
                let rep = if reverse_paddles {
                    reversed = rep
                        .chars()
                        .map(|s| if s == '.' { '-' } else { '.' })
                        .collect::<String>();
                    reversed.as_str()
                } else {
                    rep
                };
                tones.extend(self.representation_to_tones(rep)?);
                if ci + 1 < chars.len() {
                    let eoc = self.timing.lock().unwrap().derived().eoc_delay_us;
                    tones.push(Tone::silence(eoc));
                }
            }
            let eow = self.timing.lock().unwrap().derived().eow_delay_us;
            tones.push(Tone::silence(eow));
        }
        Ok(tones)
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;

    #[test]
    fn paris_at_20_wpm_is_fifty_dot_units() {
        let gen = Generator::new(20, 0, 0, 50).unwrap();
        let tones = gen.string_to_tones("PARIS").unwrap();
        let unit = crate::timing::DOT_CALIBRATION / 20;
        let total: i64 = tones.iter().map(|t| t.duration_us.max(0)).sum();
        assert_eq!(total, 50 * unit, "total={total} unit={unit}");
    }

    #[test]
    fn invalid_character_rejected() {
        let gen = Generator::new(20, 0, 0, 50).unwrap();
        assert!(matches!(gen.enqueue_character('\u{1}'), Err(CwError::InvalidCharacter(_))));
    }

    #[test]
    fn start_stop_drains_queue_through_null_sink() {
        let mut gen = Generator::new(20, 0, 0, 50).unwrap();
        gen.enqueue_string("SOS").unwrap();
        gen.start(Box::new(NullSink::new())).unwrap();
        gen.queue.request_stop();
        gen.stop();
        assert_eq!(gen.queue.length(), 0);
    }
}

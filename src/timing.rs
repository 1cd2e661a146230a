//! Timing parameters: derives dot/dash/space bounds for the generator (C2,
//! send path) and the receiver (C2, classification bounds) from
//! (speed, tolerance, gap, weighting).

use crate::error::{CwError, CwResult};

/// 1,200,000 microseconds / WPM = dot duration in microseconds. Defined by
/// the word "PARIS" = 50 dot-units.
pub const DOT_CALIBRATION: i64 = 1_200_000;

pub const SPEED_MIN: u32 = 5;
pub const SPEED_MAX: u32 = 60;
pub const TOLERANCE_MIN: u32 = 0;
pub const TOLERANCE_MAX: u32 = 90;
pub const GAP_MIN: u32 = 0;
pub const GAP_MAX: u32 = 60;
pub const WEIGHTING_MIN: u32 = 20;
pub const WEIGHTING_MAX: u32 = 80;

/// Sentinel standing in for "no upper bound" (adaptive-mode dash_max).
pub const UNBOUNDED: i64 = i64::MAX;

fn check_range(name: &'static str, value: u32, min: u32, max: u32) -> CwResult<()> {
    if value < min || value > max {
        Err(CwError::InvalidParameter {
            name,
            value: value.to_string(),
            range: match name {
                "speed_wpm" => "5..60",
                "tolerance_pct" => "0..90",
                "gap_units" => "0..60",
                "weighting_pct" => "20..80",
                _ => "?",
            },
        })
    } else {
        Ok(())
    }
}

/// Send-path derived timings, the generator synchronizer's element lengths.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenDerived {
    pub dot_length_us: i64,
    pub dash_length_us: i64,
    pub eoe_delay_us: i64,
    pub eoc_delay_us: i64,
    pub eow_delay_us: i64,
    pub additional_delay_us: i64,
    pub adjustment_delay_us: i64,
}

/// Generator-side timing parameters: speed, tolerance, gap and weighting,
/// independent of any paired receiver's settings.
#[derive(Debug, Clone, Copy)]
pub struct GenTimingParams {
    speed_wpm: u32,
    /// Accepted and stored for parity with `ReceiveTimingParams`; the send
    /// path emits exact ideal durations and does not band them by
    /// tolerance (tolerance only matters to a receiver classifying noisy
    /// timing, not to the sender producing it).
    tolerance_pct: u32,
    gap_units: u32,
    weighting_pct: u32,
    dirty: bool,
    derived: GenDerived,
}

impl GenTimingParams {
    pub fn new(speed_wpm: u32, tolerance_pct: u32, gap_units: u32, weighting_pct: u32) -> CwResult<Self> {
        let mut p = GenTimingParams {
            speed_wpm: 20,
            tolerance_pct: 0,
            gap_units: 0,
            weighting_pct: 50,
            dirty: true,
            derived: GenDerived::default(),
        };
        p.set_speed(speed_wpm)?;
        p.set_tolerance(tolerance_pct)?;
        p.set_gap(gap_units)?;
        p.set_weighting(weighting_pct)?;
        p.sync();
        Ok(p)
    }

    pub fn set_speed(&mut self, wpm: u32) -> CwResult<()> {
        check_range("speed_wpm", wpm, SPEED_MIN, SPEED_MAX)?;
        self.speed_wpm = wpm;
        self.dirty = true;
        Ok(())
    }

    pub fn set_tolerance(&mut self, pct: u32) -> CwResult<()> {
        check_range("tolerance_pct", pct, TOLERANCE_MIN, TOLERANCE_MAX)?;
        self.tolerance_pct = pct;
        self.dirty = true;
        Ok(())
    }

    pub fn set_gap(&mut self, units: u32) -> CwResult<()> {
        check_range("gap_units", units, GAP_MIN, GAP_MAX)?;
        self.gap_units = units;
        self.dirty = true;
        Ok(())
    }

    pub fn set_weighting(&mut self, pct: u32) -> CwResult<()> {
        check_range("weighting_pct", pct, WEIGHTING_MIN, WEIGHTING_MAX)?;
        self.weighting_pct = pct;
        self.dirty = true;
        Ok(())
    }

    pub fn speed_wpm(&self) -> u32 {
        self.speed_wpm
    }

    /// Recomputes derived durations if the dirty flag is set. Idempotent
    /// and deterministic.
    pub fn sync(&mut self) {
        if !self.dirty {
            return;
        }
        let unit = DOT_CALIBRATION / self.speed_wpm as i64;

        // Weighting biases dot vs dash while keeping dot + dash == 4 * unit;
        // weighting_pct == 50 is neutral (dot == unit, dash == 3 * unit).
        let bias = self.weighting_pct as i64 - 50;
        let dot_length_us = unit + (bias * unit) / 50;
        let dash_length_us = 4 * unit - dot_length_us;

        let additional_delay_us = self.gap_units as i64 * unit;
        let adjustment_delay_us = (7 * additional_delay_us) / 3;

        self.derived = GenDerived {
            dot_length_us,
            dash_length_us,
            eoe_delay_us: unit,
            eoc_delay_us: 3 * unit + additional_delay_us,
            // 7-unit word gap at the canonical ratio (dot:gap:char-gap:word-gap
            // == 1:1:3:7), plus any Farnsworth-derived adjustment.
            eow_delay_us: 7 * unit + adjustment_delay_us,
            additional_delay_us,
            adjustment_delay_us,
        };
        self.dirty = false;
    }

    /// Forces a sync (if dirty) and returns the derived timings.
    pub fn derived(&mut self) -> GenDerived {
        self.sync();
        self.derived
    }
}

/// Receive-path derived timings: the classification bounds for marks and gaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveDerived {
    pub dot_min: i64,
    pub dot_max: i64,
    pub dash_min: i64,
    pub dash_max: i64,
    pub eom_min: i64,
    pub eom_max: i64,
    pub eoc_min: i64,
    pub eoc_max: i64,
}

/// Receiver-side timing parameters: speed, tolerance, gap, noise threshold
/// and adaptive mode, independent of any paired generator's settings.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveTimingParams {
    speed_wpm: u32,
    tolerance_pct: u32,
    gap_units: u32,
    noise_spike_threshold_us: i64,
    adaptive_mode: bool,
    adaptive_speed_threshold_us: i64,
    dirty: bool,
    derived: ReceiveDerived,
}

impl ReceiveTimingParams {
    pub fn new(speed_wpm: u32, tolerance_pct: u32, gap_units: u32) -> CwResult<Self> {
        let mut p = ReceiveTimingParams {
            speed_wpm: 20,
            tolerance_pct: 0,
            gap_units: 0,
            noise_spike_threshold_us: 0,
            adaptive_mode: false,
            adaptive_speed_threshold_us: 0,
            dirty: true,
            derived: ReceiveDerived::default(),
        };
        p.set_speed(speed_wpm)?;
        p.set_tolerance(tolerance_pct)?;
        p.set_gap(gap_units)?;
        p.sync();
        Ok(p)
    }

    pub fn set_speed(&mut self, wpm: u32) -> CwResult<()> {
        if self.adaptive_mode {
            return Err(CwError::AdaptiveConflict);
        }
        check_range("speed_wpm", wpm, SPEED_MIN, SPEED_MAX)?;
        self.speed_wpm = wpm;
        self.dirty = true;
        Ok(())
    }

    pub fn set_tolerance(&mut self, pct: u32) -> CwResult<()> {
        check_range("tolerance_pct", pct, TOLERANCE_MIN, TOLERANCE_MAX)?;
        self.tolerance_pct = pct;
        self.dirty = true;
        Ok(())
    }

    pub fn set_gap(&mut self, units: u32) -> CwResult<()> {
        check_range("gap_units", units, GAP_MIN, GAP_MAX)?;
        self.gap_units = units;
        self.dirty = true;
        Ok(())
    }

    pub fn set_noise_spike_threshold(&mut self, us: i64) -> CwResult<()> {
        if us < 0 {
            return Err(CwError::InvalidParameter {
                name: "noise_spike_threshold_us",
                value: us.to_string(),
                range: ">= 0",
            });
        }
        self.noise_spike_threshold_us = us;
        self.dirty = true;
        Ok(())
    }

    pub fn set_adaptive_mode(&mut self, enabled: bool) {
        self.adaptive_mode = enabled;
        if !enabled {
            self.adaptive_speed_threshold_us = 0;
        }
        self.dirty = true;
    }

    pub fn adaptive_mode(&self) -> bool {
        self.adaptive_mode
    }

    pub fn noise_spike_threshold_us(&self) -> i64 {
        self.noise_spike_threshold_us
    }

    pub fn speed_wpm(&self) -> u32 {
        self.speed_wpm
    }

    pub fn adaptive_speed_threshold_us(&self) -> i64 {
        self.adaptive_speed_threshold_us
    }

    /// Updates the adaptive speed threshold from the receiver's moving
    /// averages and marks the parameters dirty. Internal to the receiver's
    /// adaptive tracker; not part of the public setter API because it is
    /// derived, not client-chosen.
    pub(crate) fn update_adaptive_threshold(&mut self, threshold_us: i64) {
        debug_assert!(self.adaptive_mode);
        self.adaptive_speed_threshold_us = threshold_us;
        self.dirty = true;
    }

    /// Marks the parameters dirty without changing any value. Used by the
    /// adaptive tracker, which re-syncs twice per accepted mark so a
    /// speed change clamped on the first pass fully propagates to derived
    /// bounds on the second.
    pub(crate) fn force_resync(&mut self) {
        self.dirty = true;
    }

    /// `DOT_CALIBRATION / speed_wpm`, the current ideal dot duration.
    pub fn ideal_unit(&self) -> i64 {
        DOT_CALIBRATION / self.speed_wpm as i64
    }

    /// Recomputes derived bounds if the dirty flag is set.
    pub fn sync(&mut self) {
        if !self.dirty {
            return;
        }
        if self.adaptive_mode && self.adaptive_speed_threshold_us > 0 {
            let half = self.adaptive_speed_threshold_us / 2;
            if half > 0 {
                let wpm = (DOT_CALIBRATION / half).clamp(SPEED_MIN as i64, SPEED_MAX as i64) as u32;
                self.speed_wpm = wpm;
            }
        }

        let unit = DOT_CALIBRATION / self.speed_wpm as i64;
        let dot_ideal = unit;

        self.derived = if self.adaptive_mode {
            // Adaptive mode: ranges cover [0, infinity); dot/dash share the
            // boundary at 2*dot_ideal, ties resolved to dot.
            let dot_max = 2 * dot_ideal;
            ReceiveDerived {
                dot_min: 0,
                dot_max,
                dash_min: dot_max,
                dash_max: UNBOUNDED,
                eom_min: 0,
                eom_max: dot_max,
                eoc_min: dot_max,
                eoc_max: 5 * dot_ideal,
            }
        } else {
            let dash_ideal = 3 * unit;
            let dot_min = dot_ideal - dot_ideal * self.tolerance_pct as i64 / 100;
            let dot_max = dot_ideal + dot_ideal * self.tolerance_pct as i64 / 100;
            let dash_min = dash_ideal - dash_ideal * self.tolerance_pct as i64 / 100;
            let dash_max = dash_ideal + dash_ideal * self.tolerance_pct as i64 / 100;
            let additional_delay = self.gap_units as i64 * unit;
            let adjustment_delay = (7 * additional_delay) / 3;
            ReceiveDerived {
                dot_min,
                dot_max,
                dash_min,
                dash_max,
                eom_min: dot_min,
                eom_max: dot_max,
                eoc_min: dash_min,
                eoc_max: dash_max + additional_delay + adjustment_delay,
            }
        };
        self.dirty = false;
    }

    pub fn derived(&mut self) -> ReceiveDerived {
        self.sync();
        self.derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_dot_max_below_dash_min() {
        let mut p = ReceiveTimingParams::new(12, 5, 0).unwrap();
        let d = p.derived();
        assert!(d.dot_max < d.dash_min, "P2 violated: {:?}", d);
    }

    #[test]
    fn adaptive_mode_touches_at_one_value() {
        let mut p = ReceiveTimingParams::new(20, 0, 0).unwrap();
        p.set_adaptive_mode(true);
        let d = p.derived();
        assert_eq!(d.dot_max, d.dash_min);
        assert_eq!(d.dash_max, UNBOUNDED);
    }

    #[test]
    fn adaptive_conflict_on_set_speed() {
        let mut p = ReceiveTimingParams::new(20, 0, 0).unwrap();
        p.set_adaptive_mode(true);
        assert_eq!(p.set_speed(15), Err(CwError::AdaptiveConflict));
    }

    #[test]
    fn generator_dot_dash_sum_is_four_units() {
        let mut p = GenTimingParams::new(20, 0, 0, 50).unwrap();
        let d = p.derived();
        let unit = DOT_CALIBRATION / 20;
        assert_eq!(d.dot_length_us + d.dash_length_us, 4 * unit);
        assert_eq!(d.dot_length_us, unit);
        assert_eq!(d.dash_length_us, 3 * unit);
    }

    #[test]
    fn out_of_range_speed_rejected() {
        assert!(matches!(
            GenTimingParams::new(200, 0, 0, 50),
            Err(CwError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn sync_is_idempotent() {
        let mut p = ReceiveTimingParams::new(20, 5, 0).unwrap();
        let first = p.derived();
        let second = p.derived();
        assert_eq!(first.dot_min, second.dot_min);
        assert_eq!(first.eoc_max, second.eoc_max);
    }
}

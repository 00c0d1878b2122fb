//! Motion classifier: compares telemetry-reported extrusion against sensor
//! pulses and decides whether the filament path is jammed.
//!
//! Three aggregation modes shape the reported distances:
//! - cumulative: totals since the last resync
//! - windowed: sum of timestamped samples inside the trailing window
//! - EWMA: exponentially smoothed expected/actual increments
//!
//! The jam verdict itself comes from two hysteretic accumulators fed with the
//! movement observed between consecutive checks. The hard accumulator catches
//! total blockage (almost no pulses); the soft accumulator catches partial
//! clogs (pass ratio below the configured threshold).

use std::collections::VecDeque;

use flowguard_traits::Millis;

use crate::config::{JamThresholds, TrackingCfg, TrackingMode};
use crate::util::elapsed_ms;

/// Upper bound on samples kept in windowed mode.
pub const MAX_WINDOW_SAMPLES: usize = 20;
/// Expected deltas below this are telemetry noise.
pub const NOISE_EPSILON_MM: f32 = 0.01;
/// Silence longer than this before new extrusion restarts the grace period.
pub const TELEMETRY_GAP_MS: Millis = 2000;
/// Pass ratio below which movement counts as "none at all".
pub const HARD_JAM_RATIO: f32 = 0.10;
/// Below this expected distance the flow ratio is meaningless.
pub const MIN_RATIO_EXPECTED_MM: f32 = 1.0;
pub const MAX_FLOW_RATIO: f32 = 1.5;
/// An accumulator streak is abandoned after this many missed check intervals.
const STREAK_GAP_CHECKS: Millis = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JamKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub timestamp_ms: Millis,
    pub expected_mm: f32,
    pub actual_mm: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct EwmaState {
    expected_avg: f32,
    actual_avg: f32,
    last_expected_baseline: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Movement {
    expected_mm: f32,
    actual_mm: f32,
}

/// Hysteresis accumulator for one jam class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JamAccumulator {
    expected_mm: f32,
    actual_mm: f32,
    streak_start_ms: Option<Millis>,
    last_sample_ms: Option<Millis>,
}

impl JamAccumulator {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add the movement observed over `[window_start, now]`; a new streak is
    /// anchored at `window_start`.
    fn feed(&mut self, now: Millis, window_start: Millis, m: Movement, check_interval_ms: Millis) {
        let max_gap = check_interval_ms.saturating_mul(STREAK_GAP_CHECKS);
        if let Some(last) = self.last_sample_ms
            && elapsed_ms(now, last) > max_gap
        {
            self.reset();
        }
        self.streak_start_ms.get_or_insert(window_start);
        self.last_sample_ms = Some(now);
        self.expected_mm += m.expected_mm;
        self.actual_mm += m.actual_mm;
    }

    fn ratio(&self) -> f32 {
        if self.expected_mm > 0.0 {
            self.actual_mm / self.expected_mm
        } else {
            1.0
        }
    }

    fn held_ms(&self, now: Millis) -> Millis {
        self.streak_start_ms.map_or(0, |start| elapsed_ms(now, start))
    }

    fn deficit_mm(&self) -> f32 {
        (self.expected_mm - self.actual_mm).max(0.0)
    }

    pub fn expected_mm(&self) -> f32 {
        self.expected_mm
    }

    pub fn actual_mm(&self) -> f32 {
        self.actual_mm
    }
}

#[derive(Debug, Clone)]
pub struct MotionClassifier {
    mode: TrackingMode,
    window_ms: Millis,
    alpha: f32,
    initialized: bool,
    last_update_ms: Millis,
    grace_start_ms: Millis,
    last_check_ms: Option<Millis>,
    baseline_mm: f32,
    expected_position_mm: f32,
    sensor_distance_mm: f32,
    samples: VecDeque<MotionSample>,
    ewma: EwmaState,
    since_check: Movement,
    hard: JamAccumulator,
    soft: JamAccumulator,
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new(&TrackingCfg::default())
    }
}

impl MotionClassifier {
    pub fn new(cfg: &TrackingCfg) -> Self {
        Self {
            mode: cfg.mode,
            window_ms: cfg.window_ms,
            alpha: TrackingCfg::clamp_alpha(cfg.ewma_alpha),
            initialized: false,
            last_update_ms: 0,
            grace_start_ms: 0,
            last_check_ms: None,
            baseline_mm: 0.0,
            expected_position_mm: 0.0,
            sensor_distance_mm: 0.0,
            samples: VecDeque::with_capacity(MAX_WINDOW_SAMPLES),
            ewma: EwmaState::default(),
            since_check: Movement::default(),
            hard: JamAccumulator::default(),
            soft: JamAccumulator::default(),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop all tracking state; the next telemetry value becomes the baseline.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.last_update_ms = 0;
        self.grace_start_ms = 0;
        self.last_check_ms = None;
        self.baseline_mm = 0.0;
        self.expected_position_mm = 0.0;
        self.sensor_distance_mm = 0.0;
        self.samples.clear();
        self.ewma = EwmaState::default();
        self.since_check = Movement::default();
        self.hard.reset();
        self.soft.reset();
    }

    /// Feed the printer's reported total extrusion for the current job.
    pub fn update_expected_position(&mut self, total_mm: f32, now: Millis) {
        if !total_mm.is_finite() {
            return;
        }
        if !self.initialized {
            self.initialized = true;
            self.last_update_ms = now;
            self.grace_start_ms = now;
            self.last_check_ms = Some(now);
            self.baseline_mm = total_mm;
            self.expected_position_mm = total_mm;
            self.sensor_distance_mm = 0.0;
            self.ewma = EwmaState {
                last_expected_baseline: total_mm,
                ..EwmaState::default()
            };
            tracing::debug!(total_mm, "motion tracking baseline established");
            return;
        }

        if total_mm < self.expected_position_mm {
            tracing::debug!(
                from_mm = self.expected_position_mm,
                to_mm = total_mm,
                "retraction detected, resyncing motion tracking"
            );
            self.resync(total_mm, now);
            return;
        }

        let delta = total_mm - self.expected_position_mm;
        if elapsed_ms(now, self.last_update_ms) > TELEMETRY_GAP_MS && delta > NOISE_EPSILON_MM {
            tracing::trace!(
                gap_ms = elapsed_ms(now, self.last_update_ms),
                "telemetry gap, restarting grace period"
            );
            self.grace_start_ms = now;
        }
        self.last_update_ms = now;

        if delta > NOISE_EPSILON_MM {
            match self.mode {
                TrackingMode::Windowed => self.push_sample(delta, now),
                TrackingMode::Ewma => {
                    let step = total_mm - self.ewma.last_expected_baseline;
                    self.ewma.expected_avg =
                        self.alpha * step + (1.0 - self.alpha) * self.ewma.expected_avg;
                    self.ewma.last_expected_baseline = total_mm;
                }
                TrackingMode::Cumulative => {}
            }
            self.since_check.expected_mm += delta;
        }
        self.expected_position_mm = total_mm;
    }

    /// Attribute one sensor pulse of `mm_per_pulse` to the active mode.
    pub fn add_sensor_pulse(&mut self, mm_per_pulse: f32) {
        if !self.initialized || !(mm_per_pulse > 0.0) || !mm_per_pulse.is_finite() {
            return;
        }
        self.sensor_distance_mm += mm_per_pulse;
        match self.mode {
            TrackingMode::Windowed => {
                if let Some(latest) = self.samples.back_mut() {
                    latest.actual_mm += mm_per_pulse;
                }
            }
            TrackingMode::Ewma => {
                self.ewma.actual_avg =
                    self.alpha * mm_per_pulse + (1.0 - self.alpha) * self.ewma.actual_avg;
            }
            TrackingMode::Cumulative => {}
        }
        self.since_check.actual_mm += mm_per_pulse;
    }

    /// Age out window samples; call once per tick before reading distances.
    pub fn refresh(&mut self, now: Millis) {
        if self.mode == TrackingMode::Windowed {
            self.prune_samples(now);
        }
    }

    /// Classify the movement observed since the previous call.
    ///
    /// Returns `None` while uninitialized, inside the grace period, or when
    /// expected extrusion did not advance since the last check; the last case
    /// also clears both accumulators.
    pub fn is_jammed(&mut self, t: &JamThresholds, now: Millis) -> Option<JamKind> {
        self.refresh(now);
        let movement = std::mem::take(&mut self.since_check);
        let since = self.last_check_ms.replace(now).unwrap_or(now);
        let window_start = now.wrapping_sub(elapsed_ms(now, since).min(t.check_interval_ms));

        if !self.initialized
            || !(t.ratio_threshold > 0.0)
            || !(t.hard_jam_mm > 0.0)
            || t.check_interval_ms == 0
        {
            self.clear_accumulators();
            return None;
        }
        if t.grace_period_ms > 0 && elapsed_ms(now, self.grace_start_ms) < t.grace_period_ms {
            self.clear_accumulators();
            return None;
        }
        if movement.expected_mm < NOISE_EPSILON_MM {
            self.clear_accumulators();
            return None;
        }

        self.hard.feed(now, window_start, movement, t.check_interval_ms);
        let hard_jam = if self.hard.ratio() < HARD_JAM_RATIO {
            self.hard.held_ms(now) >= t.hard_jam_time_ms && self.hard.expected_mm >= t.hard_jam_mm
        } else {
            self.hard.reset();
            false
        };

        self.soft.feed(now, window_start, movement, t.check_interval_ms);
        let soft_jam = if self.soft.ratio() < t.ratio_threshold {
            self.soft.held_ms(now) >= t.soft_jam_time_ms
                && self.soft.deficit_mm() >= t.hard_jam_mm
                && self.mode_confirms(t.ratio_threshold)
        } else {
            self.soft.reset();
            false
        };

        tracing::trace!(
            expected_mm = movement.expected_mm,
            actual_mm = movement.actual_mm,
            hard_ratio = self.hard.ratio(),
            soft_ratio = self.soft.ratio(),
            hard_held_ms = self.hard.held_ms(now),
            soft_held_ms = self.soft.held_ms(now),
            "jam check"
        );

        if hard_jam {
            Some(JamKind::Hard)
        } else if soft_jam {
            Some(JamKind::Soft)
        } else {
            None
        }
    }

    // The active mode must agree with a soft verdict whenever it has enough
    // expected distance to express a ratio.
    fn mode_confirms(&self, ratio_threshold: f32) -> bool {
        self.expected_distance() < MIN_RATIO_EXPECTED_MM || self.flow_ratio() < ratio_threshold
    }

    pub fn expected_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match self.mode {
            TrackingMode::Cumulative => self.expected_position_mm - self.baseline_mm,
            TrackingMode::Windowed => self.samples.iter().map(|s| s.expected_mm).sum(),
            TrackingMode::Ewma => self.ewma.expected_avg,
        }
    }

    pub fn sensor_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match self.mode {
            TrackingMode::Cumulative => self.sensor_distance_mm,
            TrackingMode::Windowed => self.samples.iter().map(|s| s.actual_mm).sum(),
            TrackingMode::Ewma => self.ewma.actual_avg,
        }
    }

    pub fn deficit(&self) -> f32 {
        (self.expected_distance() - self.sensor_distance()).max(0.0)
    }

    /// actual/expected clamped to [0, 1.5]; 0 when expected is under 1 mm.
    pub fn flow_ratio(&self) -> f32 {
        let expected = self.expected_distance();
        if !self.initialized || expected < MIN_RATIO_EXPECTED_MM {
            return 0.0;
        }
        (self.sensor_distance() / expected).clamp(0.0, MAX_FLOW_RATIO)
    }

    /// Sensor distance since the last resync, independent of mode.
    pub fn total_sensor_mm(&self) -> f32 {
        self.sensor_distance_mm
    }

    /// Expected distance since the last resync, independent of mode.
    pub fn total_expected_mm(&self) -> f32 {
        if self.initialized {
            self.expected_position_mm - self.baseline_mm
        } else {
            0.0
        }
    }

    pub fn window_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn hard_accumulator(&self) -> &JamAccumulator {
        &self.hard
    }

    pub fn soft_accumulator(&self) -> &JamAccumulator {
        &self.soft
    }

    fn resync(&mut self, total_mm: f32, now: Millis) {
        self.last_update_ms = now;
        self.grace_start_ms = now;
        self.last_check_ms = Some(now);
        self.baseline_mm = total_mm;
        self.expected_position_mm = total_mm;
        self.sensor_distance_mm = 0.0;
        self.samples.clear();
        self.ewma = EwmaState {
            last_expected_baseline: total_mm,
            ..EwmaState::default()
        };
        self.since_check = Movement::default();
        self.clear_accumulators();
    }

    fn clear_accumulators(&mut self) {
        self.hard.reset();
        self.soft.reset();
    }

    fn push_sample(&mut self, expected_mm: f32, now: Millis) {
        self.prune_samples(now);
        if self.samples.len() >= MAX_WINDOW_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(MotionSample {
            timestamp_ms: now,
            expected_mm,
            actual_mm: 0.0,
        });
    }

    fn prune_samples(&mut self, now: Millis) {
        while let Some(front) = self.samples.front() {
            if elapsed_ms(now, front.timestamp_ms) <= self.window_ms {
                break;
            }
            self.samples.pop_front();
        }
    }
}

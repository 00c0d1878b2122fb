//! Configuration types for the guard engine.
//!
//! These are the runtime structs consumed by `FilamentGuard` and its parts.
//! They are separate from the TOML-deserialized config in `flowguard_config`.

use flowguard_traits::Millis;

/// Pause guard settings.
#[derive(Debug, Clone)]
pub struct PauseCfg {
    /// Global enable; when false the guard never pauses.
    pub enabled: bool,
    /// When false, runout is left to the printer's own handling.
    pub pause_on_runout: bool,
    /// No pause within this many ms of a fresh print start.
    pub start_print_timeout_ms: Millis,
    /// Minimum spacing between two pause requests.
    pub rearm_delay_ms: Millis,
    /// Print treated as finished below this many remaining ticks.
    pub min_remaining_ticks: i64,
}

impl Default for PauseCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            pause_on_runout: true,
            start_print_timeout_ms: 10_000,
            rearm_delay_ms: 10_000,
            min_remaining_ticks: 100,
        }
    }
}

/// Which flow-deficit detector drives the jam signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectorKind {
    /// MotionClassifier with hard/soft hysteresis.
    #[default]
    Classifier,
    /// Chunk FIFO ledger with a deficit hold latch.
    ChunkLedger,
}

/// Jam classifier thresholds.
#[derive(Debug, Clone, Copy)]
pub struct JamThresholds {
    /// Soft jam when actual/expected stays below this pass ratio.
    pub ratio_threshold: f32,
    /// Minimum expected mm for a hard jam; also the soft-jam deficit floor.
    pub hard_jam_mm: f32,
    pub soft_jam_time_ms: Millis,
    pub hard_jam_time_ms: Millis,
    pub check_interval_ms: Millis,
    pub grace_period_ms: Millis,
}

impl Default for JamThresholds {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.30,
            hard_jam_mm: 5.0,
            soft_jam_time_ms: 3000,
            hard_jam_time_ms: 2000,
            check_interval_ms: 1000,
            grace_period_ms: 500,
        }
    }
}

/// Chunk ledger parameters.
#[derive(Debug, Clone, Copy)]
pub struct LedgerCfg {
    pub deficit_threshold_mm: f32,
    pub deficit_hold_ms: Millis,
    /// 0 disables age pruning.
    pub prune_window_ms: Millis,
}

impl Default for LedgerCfg {
    fn default() -> Self {
        Self {
            deficit_threshold_mm: 8.4,
            deficit_hold_ms: 1000,
            prune_window_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectionCfg {
    pub detector: DetectorKind,
    pub jam: JamThresholds,
    pub ledger: LedgerCfg,
}

/// How expected and actual distances are aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingMode {
    Cumulative,
    #[default]
    Windowed,
    Ewma,
}

pub const MIN_EWMA_ALPHA: f32 = 0.01;
pub const MAX_EWMA_ALPHA: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct TrackingCfg {
    pub mode: TrackingMode,
    pub window_ms: Millis,
    /// Smoothing factor; always within [MIN_EWMA_ALPHA, MAX_EWMA_ALPHA].
    pub ewma_alpha: f32,
    pub mm_per_pulse: f32,
}

impl TrackingCfg {
    /// Clamp alpha into its valid range; NaN falls back to the default.
    pub fn clamp_alpha(alpha: f32) -> f32 {
        if alpha.is_nan() {
            return 0.3;
        }
        alpha.clamp(MIN_EWMA_ALPHA, MAX_EWMA_ALPHA)
    }
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Windowed,
            window_ms: 5000,
            ewma_alpha: 0.3,
            mm_per_pulse: 2.88,
        }
    }
}

/// Override applied to the pause condition while status telemetry is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LossPolicy {
    /// Keep the base condition.
    Unchanged,
    /// Force a pause.
    Pause,
    /// Ignore the jam signal; runout still pauses.
    #[default]
    Continue,
}

/// Jam signal used while extrusion telemetry is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TelemetryFallback {
    /// No jam decision at all.
    #[default]
    None,
    /// Jam when no motion edge was seen for the movement timeout.
    MovementTimeout,
}

#[derive(Debug, Clone, Copy)]
pub struct TelemetryCfg {
    pub stale_ms: Millis,
    pub loss_policy: LossPolicy,
    pub fallback: TelemetryFallback,
    pub movement_timeout_ms: Millis,
    pub first_layer_timeout_ms: Millis,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            stale_ms: 5000,
            loss_policy: LossPolicy::Continue,
            fallback: TelemetryFallback::None,
            movement_timeout_ms: 4000,
            first_layer_timeout_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProtocolCfg {
    pub ack_timeout_ms: Millis,
    /// 0 disables the keepalive ping.
    pub keepalive_ms: Millis,
    /// 0 disables periodic status queries.
    pub status_poll_ms: Millis,
    pub tick_ms: Millis,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            keepalive_ms: 29_900,
            status_poll_ms: 1000,
            tick_ms: 20,
        }
    }
}

/// Everything the guard needs, assembled once at the composition root.
#[derive(Debug, Clone, Default)]
pub struct GuardConfig {
    /// Preconfigured controller id; empty means learn it from frames.
    pub mainboard_id: String,
    pub pause: PauseCfg,
    pub detection: DetectionCfg,
    pub tracking: TrackingCfg,
    pub telemetry: TelemetryCfg,
    pub protocol: ProtocolCfg,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_clamped() {
        assert!((TrackingCfg::clamp_alpha(0.0) - MIN_EWMA_ALPHA).abs() < f32::EPSILON);
        assert!((TrackingCfg::clamp_alpha(4.0) - MAX_EWMA_ALPHA).abs() < f32::EPSILON);
        assert!((TrackingCfg::clamp_alpha(0.5) - 0.5).abs() < f32::EPSILON);
        assert!((TrackingCfg::clamp_alpha(f32::NAN) - 0.3).abs() < f32::EPSILON);
    }
}

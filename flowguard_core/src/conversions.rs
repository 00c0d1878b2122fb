//! `From` implementations bridging `flowguard_config` types to `flowguard_core` types.

use crate::config::{
    DetectionCfg, DetectorKind, GuardConfig, JamThresholds, LedgerCfg, LossPolicy, PauseCfg,
    ProtocolCfg, TelemetryCfg, TelemetryFallback, TrackingCfg, TrackingMode,
};

// ── PauseCfg ─────────────────────────────────────────────────────────────────

impl From<&flowguard_config::PauseCfg> for PauseCfg {
    fn from(c: &flowguard_config::PauseCfg) -> Self {
        Self {
            enabled: c.enabled,
            pause_on_runout: c.pause_on_runout,
            start_print_timeout_ms: c.start_print_timeout_ms,
            rearm_delay_ms: c.rearm_delay_ms,
            min_remaining_ticks: c.min_remaining_ticks,
        }
    }
}

// ── DetectionCfg ─────────────────────────────────────────────────────────────

impl From<flowguard_config::DetectorKind> for DetectorKind {
    fn from(k: flowguard_config::DetectorKind) -> Self {
        match k {
            flowguard_config::DetectorKind::Classifier => Self::Classifier,
            flowguard_config::DetectorKind::ChunkLedger => Self::ChunkLedger,
        }
    }
}

impl From<&flowguard_config::DetectionCfg> for DetectionCfg {
    fn from(c: &flowguard_config::DetectionCfg) -> Self {
        Self {
            detector: c.detector.into(),
            jam: JamThresholds {
                ratio_threshold: c.ratio_threshold,
                hard_jam_mm: c.hard_jam_mm,
                soft_jam_time_ms: c.soft_jam_time_ms,
                hard_jam_time_ms: c.hard_jam_time_ms,
                check_interval_ms: c.check_interval_ms,
                grace_period_ms: c.grace_period_ms,
            },
            ledger: LedgerCfg {
                deficit_threshold_mm: c.deficit_threshold_mm,
                deficit_hold_ms: c.deficit_hold_ms,
                prune_window_ms: c.prune_window_ms,
            },
        }
    }
}

// ── TrackingCfg ──────────────────────────────────────────────────────────────

impl From<flowguard_config::TrackingMode> for TrackingMode {
    fn from(m: flowguard_config::TrackingMode) -> Self {
        match m {
            flowguard_config::TrackingMode::Cumulative => Self::Cumulative,
            flowguard_config::TrackingMode::Windowed => Self::Windowed,
            flowguard_config::TrackingMode::Ewma => Self::Ewma,
        }
    }
}

impl From<&flowguard_config::TrackingCfg> for TrackingCfg {
    fn from(c: &flowguard_config::TrackingCfg) -> Self {
        Self {
            mode: c.mode.into(),
            window_ms: c.window_ms,
            ewma_alpha: Self::clamp_alpha(c.ewma_alpha),
            mm_per_pulse: c.mm_per_pulse,
        }
    }
}

// ── TelemetryCfg ─────────────────────────────────────────────────────────────

impl From<&flowguard_config::TelemetryCfg> for TelemetryCfg {
    fn from(c: &flowguard_config::TelemetryCfg) -> Self {
        Self {
            stale_ms: c.stale_ms,
            loss_policy: match c.loss_behavior {
                flowguard_config::LossBehavior::Unchanged => LossPolicy::Unchanged,
                flowguard_config::LossBehavior::Pause => LossPolicy::Pause,
                flowguard_config::LossBehavior::Continue => LossPolicy::Continue,
            },
            fallback: match c.fallback {
                flowguard_config::Fallback::None => TelemetryFallback::None,
                flowguard_config::Fallback::MovementTimeout => TelemetryFallback::MovementTimeout,
            },
            movement_timeout_ms: c.movement_timeout_ms,
            first_layer_timeout_ms: c.first_layer_timeout_ms,
        }
    }
}

// ── ProtocolCfg ──────────────────────────────────────────────────────────────

impl From<&flowguard_config::ProtocolCfg> for ProtocolCfg {
    fn from(c: &flowguard_config::ProtocolCfg) -> Self {
        Self {
            ack_timeout_ms: c.ack_timeout_ms,
            keepalive_ms: c.keepalive_ms,
            status_poll_ms: c.status_poll_ms,
            tick_ms: c.tick_ms,
        }
    }
}

// ── GuardConfig ──────────────────────────────────────────────────────────────

impl From<&flowguard_config::Config> for GuardConfig {
    fn from(c: &flowguard_config::Config) -> Self {
        Self {
            mainboard_id: c.printer.mainboard_id.clone(),
            pause: (&c.pause).into(),
            detection: (&c.detection).into(),
            tracking: (&c.tracking).into(),
            telemetry: (&c.telemetry).into(),
            protocol: (&c.protocol).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_defaults_match_runtime_defaults() {
        let file = flowguard_config::Config::default();
        let cfg = GuardConfig::from(&file);
        let rt = GuardConfig::default();
        assert_eq!(cfg.pause.start_print_timeout_ms, rt.pause.start_print_timeout_ms);
        assert_eq!(cfg.pause.min_remaining_ticks, rt.pause.min_remaining_ticks);
        assert_eq!(cfg.detection.detector, rt.detection.detector);
        assert_eq!(cfg.detection.jam.check_interval_ms, rt.detection.jam.check_interval_ms);
        assert_eq!(cfg.tracking.mode, rt.tracking.mode);
        assert_eq!(cfg.telemetry.loss_policy, rt.telemetry.loss_policy);
        assert_eq!(cfg.protocol.keepalive_ms, rt.protocol.keepalive_ms);
    }

    #[test]
    fn alpha_clamped_during_conversion() {
        let mut file = flowguard_config::Config::default();
        file.tracking.ewma_alpha = 7.0;
        let cfg = GuardConfig::from(&file);
        assert!((cfg.tracking.ewma_alpha - 1.0).abs() < f32::EPSILON);
    }
}

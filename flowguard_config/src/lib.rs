#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the filament guard.
//!
//! Every section is optional in TOML and falls back to field defaults, so an
//! empty file is a valid configuration. `Config::validate` rejects values the
//! engine cannot run with and names the offending key.
use serde::Deserialize;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Printer {
    /// Controller address; informational, the transport owns the connection.
    pub address: String,
    /// Empty means "learn it from the first frame that carries one".
    pub mainboard_id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub runout: u8,
    pub motion: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            runout: 12,
            motion: 13,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PauseCfg {
    pub enabled: bool,
    pub pause_on_runout: bool,
    /// Grace window after a print starts during which no pause is issued
    pub start_print_timeout_ms: u32,
    /// Minimum spacing between two pause requests
    pub rearm_delay_ms: u32,
    /// Below this many remaining ticks the print is treated as finished
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Classifier,
    ChunkLedger,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionCfg {
    pub detector: DetectorKind,
    /// Soft jam when actual/expected stays below this ratio
    pub ratio_threshold: f32,
    /// Hard jam needs at least this much expected movement with ~no pulses
    pub hard_jam_mm: f32,
    pub soft_jam_time_ms: u32,
    pub hard_jam_time_ms: u32,
    pub grace_period_ms: u32,
    pub check_interval_ms: u32,
    /// chunk_ledger: outstanding deficit threshold (mm)
    pub deficit_threshold_mm: f32,
    /// chunk_ledger: hold time above threshold before reporting
    pub deficit_hold_ms: u32,
    /// chunk_ledger: chunks older than this are pruned; 0 disables pruning
    pub prune_window_ms: u32,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Classifier,
            ratio_threshold: 0.30,
            hard_jam_mm: 5.0,
            soft_jam_time_ms: 3000,
            hard_jam_time_ms: 2000,
            grace_period_ms: 500,
            check_interval_ms: 1000,
            deficit_threshold_mm: 8.4,
            deficit_hold_ms: 1000,
            prune_window_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Cumulative,
    #[default]
    Windowed,
    Ewma,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackingCfg {
    pub mode: TrackingMode,
    pub window_ms: u32,
    /// Clamped to [0.01, 1.0] at conversion time
    pub ewma_alpha: f32,
    pub mm_per_pulse: f32,
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LossBehavior {
    Unchanged,
    Pause,
    #[default]
    Continue,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    #[default]
    None,
    MovementTimeout,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryCfg {
    pub stale_ms: u32,
    pub loss_behavior: LossBehavior,
    pub fallback: Fallback,
    pub movement_timeout_ms: u32,
    /// Used instead of movement_timeout_ms while current Z < 0.1
    pub first_layer_timeout_ms: u32,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            stale_ms: 5000,
            loss_behavior: LossBehavior::Continue,
            fallback: Fallback::None,
            movement_timeout_ms: 4000,
            first_layer_timeout_ms: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProtocolCfg {
    pub ack_timeout_ms: u32,
    /// 0 disables the keepalive ping
    pub keepalive_ms: u32,
    /// 0 disables periodic status queries
    pub status_poll_ms: u32,
    pub tick_ms: u32,
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

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub printer: Printer,
    pub pins: Pins,
    pub pause: PauseCfg,
    pub detection: DetectionCfg,
    pub tracking: TrackingCfg,
    pub telemetry: TelemetryCfg,
    pub protocol: ProtocolCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

const DAY_MS: u32 = 24 * 60 * 60 * 1000;

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.runout == self.pins.motion {
            eyre::bail!("pins.runout and pins.motion must differ");
        }

        // Pause
        if self.pause.start_print_timeout_ms > DAY_MS {
            eyre::bail!("pause.start_print_timeout_ms is unreasonably large (>24h)");
        }
        if self.pause.rearm_delay_ms > DAY_MS {
            eyre::bail!("pause.rearm_delay_ms is unreasonably large (>24h)");
        }
        if self.pause.min_remaining_ticks < 0 {
            eyre::bail!("pause.min_remaining_ticks must be >= 0");
        }

        // Detection
        let d = &self.detection;
        if !(d.ratio_threshold > 0.0 && d.ratio_threshold <= 1.0) {
            eyre::bail!("detection.ratio_threshold must be in (0.0, 1.0]");
        }
        if !(d.hard_jam_mm.is_finite() && d.hard_jam_mm > 0.0) {
            eyre::bail!("detection.hard_jam_mm must be > 0");
        }
        if d.soft_jam_time_ms == 0 {
            eyre::bail!("detection.soft_jam_time_ms must be >= 1");
        }
        if d.hard_jam_time_ms == 0 {
            eyre::bail!("detection.hard_jam_time_ms must be >= 1");
        }
        if d.check_interval_ms == 0 {
            eyre::bail!("detection.check_interval_ms must be >= 1");
        }
        if !(d.deficit_threshold_mm.is_finite() && d.deficit_threshold_mm >= 0.0) {
            eyre::bail!("detection.deficit_threshold_mm must be >= 0");
        }

        // Tracking
        let t = &self.tracking;
        if !(t.mm_per_pulse.is_finite() && t.mm_per_pulse > 0.0) {
            eyre::bail!("tracking.mm_per_pulse must be > 0");
        }
        if t.mm_per_pulse > 100.0 {
            eyre::bail!("tracking.mm_per_pulse is unreasonably large (>100mm)");
        }
        if t.mode == TrackingMode::Windowed && t.window_ms == 0 {
            eyre::bail!("tracking.window_ms must be >= 1 in windowed mode");
        }
        if !t.ewma_alpha.is_finite() {
            eyre::bail!("tracking.ewma_alpha must be a finite number");
        }

        // Telemetry
        let tel = &self.telemetry;
        if tel.stale_ms == 0 {
            eyre::bail!("telemetry.stale_ms must be >= 1");
        }
        if tel.fallback == Fallback::MovementTimeout
            && (tel.movement_timeout_ms == 0 || tel.first_layer_timeout_ms == 0)
        {
            eyre::bail!(
                "telemetry.movement_timeout_ms and telemetry.first_layer_timeout_ms must be >= 1 when fallback = \"movement_timeout\""
            );
        }

        // Protocol
        if self.protocol.ack_timeout_ms == 0 {
            eyre::bail!("protocol.ack_timeout_ms must be >= 1");
        }
        if self.protocol.tick_ms == 0 {
            eyre::bail!("protocol.tick_ms must be >= 1");
        }
        if self.protocol.tick_ms > 10_000 {
            eyre::bail!("protocol.tick_ms is unreasonably large (>10s)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of \"never\", \"daily\", \"hourly\"");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.pins.runout, 12);
        assert_eq!(cfg.pins.motion, 13);
        assert_eq!(cfg.tracking.mode, TrackingMode::Windowed);
        assert!((cfg.tracking.mm_per_pulse - 2.88).abs() < f32::EPSILON);
        assert_eq!(cfg.telemetry.loss_behavior, LossBehavior::Continue);
        assert_eq!(cfg.detection.detector, DetectorKind::Classifier);
        assert_eq!(cfg.protocol.keepalive_ms, 29_900);
        cfg.validate().unwrap();
    }

    #[test]
    fn enum_spellings_match_documented_values() {
        let cfg = load_toml(
            r#"
[detection]
detector = "chunk_ledger"
[tracking]
mode = "ewma"
[telemetry]
loss_behavior = "pause"
fallback = "movement_timeout"
"#,
        )
        .unwrap();
        assert_eq!(cfg.detection.detector, DetectorKind::ChunkLedger);
        assert_eq!(cfg.tracking.mode, TrackingMode::Ewma);
        assert_eq!(cfg.telemetry.loss_behavior, LossBehavior::Pause);
        assert_eq!(cfg.telemetry.fallback, Fallback::MovementTimeout);
    }
}

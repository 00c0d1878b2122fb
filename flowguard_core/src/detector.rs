//! Flow-deficit detector seam.
//!
//! Exactly one detector is active per guard; both implementations consume the
//! same expected/actual inputs and report a [`JamVerdict`].

use flowguard_traits::Millis;

use crate::config::{DetectionCfg, DetectorKind, JamThresholds, LedgerCfg, TrackingCfg};
use crate::flow_tracker::FlowDeficitTracker;
use crate::motion::{JamKind, MIN_RATIO_EXPECTED_MM, MAX_FLOW_RATIO, MotionClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JamVerdict {
    #[default]
    Clear,
    /// Expected extrusion advancing with almost no pulses.
    HardJam,
    /// Pass ratio below threshold for the soft hold time.
    SoftJam,
    /// Ledger deficit above threshold for the hold time.
    DeficitHold,
}

impl JamVerdict {
    pub fn is_jam(self) -> bool {
        !matches!(self, Self::Clear)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::HardJam => "hard_jam",
            Self::SoftJam => "soft_jam",
            Self::DeficitHold => "deficit_hold",
        }
    }
}

/// Read-only view of detector state for logs and status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowSnapshot {
    pub expected_mm: f32,
    pub actual_mm: f32,
    pub deficit_mm: f32,
    pub flow_ratio: f32,
}

pub trait FlowDeficitDetector {
    fn name(&self) -> &'static str;
    /// Printer-reported total extrusion for the current job.
    fn record_expected(&mut self, total_extrusion_mm: f32, now: Millis);
    /// One confirmed movement quantum from the pulse sensor.
    fn record_actual(&mut self, mm: f32, now: Millis);
    fn evaluate(&mut self, now: Millis) -> JamVerdict;
    fn reset(&mut self);
    fn snapshot(&self) -> FlowSnapshot;
}

/// Build the detector selected by `detection.detector`.
pub fn build_detector(
    detection: &DetectionCfg,
    tracking: &TrackingCfg,
) -> Box<dyn FlowDeficitDetector + Send> {
    match detection.detector {
        DetectorKind::Classifier => Box::new(ClassifierDetector::new(tracking, detection.jam)),
        DetectorKind::ChunkLedger => Box::new(ChunkLedgerDetector::new(detection.ledger)),
    }
}

fn ratio_of(actual: f32, expected: f32) -> f32 {
    if expected < MIN_RATIO_EXPECTED_MM {
        0.0
    } else {
        (actual / expected).clamp(0.0, MAX_FLOW_RATIO)
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClassifierDetector {
    classifier: MotionClassifier,
    thresholds: JamThresholds,
}

impl ClassifierDetector {
    pub fn new(tracking: &TrackingCfg, thresholds: JamThresholds) -> Self {
        Self {
            classifier: MotionClassifier::new(tracking),
            thresholds,
        }
    }

    pub fn classifier(&self) -> &MotionClassifier {
        &self.classifier
    }
}

impl FlowDeficitDetector for ClassifierDetector {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn record_expected(&mut self, total_extrusion_mm: f32, now: Millis) {
        self.classifier.update_expected_position(total_extrusion_mm, now);
    }

    fn record_actual(&mut self, mm: f32, _now: Millis) {
        self.classifier.add_sensor_pulse(mm);
    }

    fn evaluate(&mut self, now: Millis) -> JamVerdict {
        match self.classifier.is_jammed(&self.thresholds, now) {
            Some(JamKind::Hard) => JamVerdict::HardJam,
            Some(JamKind::Soft) => JamVerdict::SoftJam,
            None => JamVerdict::Clear,
        }
    }

    fn reset(&mut self) {
        self.classifier.reset();
    }

    fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            expected_mm: self.classifier.expected_distance(),
            actual_mm: self.classifier.sensor_distance(),
            deficit_mm: self.classifier.deficit(),
            flow_ratio: self.classifier.flow_ratio(),
        }
    }
}

// ── Chunk ledger ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChunkLedgerDetector {
    tracker: FlowDeficitTracker,
    cfg: LedgerCfg,
    last_total_mm: Option<f32>,
    expected_mm: f32,
    actual_mm: f32,
}

impl ChunkLedgerDetector {
    pub fn new(cfg: LedgerCfg) -> Self {
        Self {
            tracker: FlowDeficitTracker::new(),
            cfg,
            last_total_mm: None,
            expected_mm: 0.0,
            actual_mm: 0.0,
        }
    }

    pub fn tracker(&self) -> &FlowDeficitTracker {
        &self.tracker
    }
}

impl FlowDeficitDetector for ChunkLedgerDetector {
    fn name(&self) -> &'static str {
        "chunk_ledger"
    }

    fn record_expected(&mut self, total_extrusion_mm: f32, now: Millis) {
        if !total_extrusion_mm.is_finite() {
            return;
        }
        match self.last_total_mm {
            Some(last) if total_extrusion_mm >= last => {
                let delta = total_extrusion_mm - last;
                self.tracker.add_expected(delta, now, self.cfg.prune_window_ms);
                if delta > 0.0 {
                    self.expected_mm += delta;
                }
            }
            Some(last) => {
                tracing::debug!(
                    from_mm = last,
                    to_mm = total_extrusion_mm,
                    "retraction detected, clearing ledger"
                );
                self.tracker.reset();
            }
            None => {}
        }
        self.last_total_mm = Some(total_extrusion_mm);
    }

    fn record_actual(&mut self, mm: f32, _now: Millis) {
        if self.last_total_mm.is_none() || !(mm > 0.0) {
            return;
        }
        self.actual_mm += mm;
        self.tracker.add_actual(mm);
    }

    fn evaluate(&mut self, now: Millis) -> JamVerdict {
        let outstanding = self.tracker.outstanding(now, self.cfg.prune_window_ms);
        if self.tracker.deficit_satisfied(
            outstanding,
            now,
            self.cfg.deficit_threshold_mm,
            self.cfg.deficit_hold_ms,
        ) {
            JamVerdict::DeficitHold
        } else {
            JamVerdict::Clear
        }
    }

    fn reset(&mut self) {
        self.tracker.reset();
        self.last_total_mm = None;
        self.expected_mm = 0.0;
        self.actual_mm = 0.0;
    }

    fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            expected_mm: self.expected_mm,
            actual_mm: self.actual_mm,
            deficit_mm: self.tracker.outstanding_cached(),
            flow_ratio: ratio_of(self.actual_mm, self.expected_mm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_honours_selection() {
        let mut detection = DetectionCfg::default();
        let tracking = TrackingCfg::default();
        assert_eq!(build_detector(&detection, &tracking).name(), "classifier");
        detection.detector = DetectorKind::ChunkLedger;
        assert_eq!(build_detector(&detection, &tracking).name(), "chunk_ledger");
    }

    #[test]
    fn ledger_reports_deficit_hold() {
        let mut d = ChunkLedgerDetector::new(LedgerCfg {
            deficit_threshold_mm: 5.0,
            deficit_hold_ms: 1000,
            prune_window_ms: 0,
        });
        d.record_expected(100.0, 0);
        d.record_expected(110.0, 100);
        assert_eq!(d.evaluate(100), JamVerdict::Clear);
        assert_eq!(d.evaluate(1100), JamVerdict::DeficitHold);
        d.record_actual(8.0, 1150);
        assert_eq!(d.evaluate(1200), JamVerdict::Clear);
        let snap = d.snapshot();
        assert!((snap.deficit_mm - 2.0).abs() < 1e-4);
        assert!((snap.flow_ratio - 0.8).abs() < 1e-4);
    }

    #[test]
    fn ledger_retraction_clears_chunks() {
        let mut d = ChunkLedgerDetector::new(LedgerCfg::default());
        d.record_expected(10.0, 0);
        d.record_expected(20.0, 100);
        d.record_expected(15.0, 200);
        assert!(d.tracker().is_empty());
    }

    #[test]
    fn ledger_ignores_pulses_before_baseline() {
        let mut d = ChunkLedgerDetector::new(LedgerCfg::default());
        d.record_actual(2.88, 0);
        assert_eq!(d.snapshot().actual_mm, 0.0);
    }

    #[test]
    fn verdict_labels() {
        assert!(!JamVerdict::Clear.is_jam());
        assert!(JamVerdict::DeficitHold.is_jam());
        assert_eq!(JamVerdict::SoftJam.as_str(), "soft_jam");
    }
}

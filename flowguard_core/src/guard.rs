//! Tick-driven composition root.
//!
//! `FilamentGuard` owns the pins, the transport, the active detector and the
//! session/decision/ack state. Inbound frames (`handle_text`) and the
//! periodic `tick` are the only mutation paths, and the caller must never run
//! them concurrently; [`crate::runner::run`] serializes both on one thread.

use std::sync::Arc;

use flowguard_traits::{Clock, DigitalInput, Millis, Transport};

use crate::ack::{AckCoordinator, PendingCommand, SendOutcome};
use crate::config::{GuardConfig, TelemetryFallback};
use crate::decision::{PauseDecision, PauseDecisionEngine, PauseInputs, PauseReason};
use crate::detector::{FlowDeficitDetector, FlowSnapshot, JamVerdict, build_detector};
use crate::error::GuardError;
use crate::protocol::{CommandTag, InboundFrame, PING, StatusUpdate, decode_frame};
use crate::sensors::{PulseEdgeDetector, RunoutMonitor};
use crate::session::{PrintSession, SessionEvent};
use crate::util::period_elapsed;

/// Below this Z the first-layer movement timeout applies.
pub const FIRST_LAYER_Z_MM: f32 = 0.1;

/// Fault and activity counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    pub pauses_requested: u32,
    pub frames_rejected: u32,
    pub pin_faults: u32,
    pub send_failures: u32,
    pub ack_timeouts: u32,
}

/// What one tick observed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub now_ms: Millis,
    pub pulse: bool,
    pub runout_changed: bool,
    pub pin_faults: u32,
    pub ack_timed_out: bool,
    /// Detector verdict when a check ran this tick.
    pub verdict: Option<JamVerdict>,
    pub jammed: bool,
    pub decision: PauseDecision,
    /// Set when a pause command went out this tick.
    pub pause_sent: Option<PauseReason>,
}

#[derive(Debug, Default)]
struct PinReport {
    pulse: bool,
    runout_changed: bool,
    faults: u32,
}

pub struct FilamentGuard {
    cfg: GuardConfig,
    transport: Box<dyn Transport + Send>,
    runout_pin: Box<dyn DigitalInput + Send>,
    motion_pin: Box<dyn DigitalInput + Send>,
    clock: Arc<dyn Clock + Send + Sync>,
    detector: Box<dyn FlowDeficitDetector + Send>,
    session: PrintSession,
    decision: PauseDecisionEngine,
    acks: AckCoordinator,
    runout: RunoutMonitor,
    motion: PulseEdgeDetector,
    connected: bool,
    jammed: bool,
    last_verdict: JamVerdict,
    last_check_ms: Option<Millis>,
    last_ping_ms: Millis,
    last_poll_ms: Millis,
    pulses: u64,
    stats: GuardStats,
}

impl core::fmt::Debug for FilamentGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilamentGuard")
            .field("detector", &self.detector.name())
            .field("phase", &self.session.phase())
            .field("connected", &self.connected)
            .field("runout", &self.runout.is_runout())
            .field("jammed", &self.jammed)
            .field("pulses", &self.pulses)
            .finish_non_exhaustive()
    }
}

impl FilamentGuard {
    pub(crate) fn from_parts(
        cfg: GuardConfig,
        transport: Box<dyn Transport + Send>,
        runout_pin: Box<dyn DigitalInput + Send>,
        motion_pin: Box<dyn DigitalInput + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let now = clock.millis();
        let detector = build_detector(&cfg.detection, &cfg.tracking);
        tracing::info!(
            detector = detector.name(),
            tracking = ?cfg.tracking.mode,
            mm_per_pulse = cfg.tracking.mm_per_pulse,
            "filament guard ready"
        );
        Self {
            session: PrintSession::new(cfg.mainboard_id.clone()),
            decision: PauseDecisionEngine::new(cfg.pause.clone(), cfg.telemetry.loss_policy),
            acks: AckCoordinator::new(cfg.protocol.ack_timeout_ms),
            runout: RunoutMonitor::new(),
            motion: PulseEdgeDetector::new(now),
            detector,
            cfg,
            transport,
            runout_pin,
            motion_pin,
            clock,
            connected: false,
            jammed: false,
            last_verdict: JamVerdict::Clear,
            last_check_ms: None,
            last_ping_ms: now,
            last_poll_ms: now,
            pulses: 0,
            stats: GuardStats::default(),
        }
    }

    // ── Transport events ─────────────────────────────────────────────────────

    pub fn on_connected(&mut self) {
        let now = self.clock.millis();
        self.connected = true;
        self.last_ping_ms = now;
        self.last_poll_ms = now;
        tracing::info!(mainboard_id = self.session.mainboard_id(), "controller connected");
        self.send(CommandTag::Status, false, now);
    }

    /// Drops acknowledgment state; tracking keeps its last readings.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.acks.on_disconnect();
        tracing::info!("controller disconnected");
    }

    /// Process one inbound text frame. Malformed frames change nothing.
    pub fn handle_text(&mut self, text: &str) -> Result<(), GuardError> {
        let now = self.clock.millis();
        let frame = match decode_frame(text) {
            Ok(f) => f,
            Err(e) => {
                self.stats.frames_rejected = self.stats.frames_rejected.saturating_add(1);
                tracing::warn!(error = %e, len = text.len(), "dropping inbound frame");
                return Err(e.into());
            }
        };
        match frame {
            InboundFrame::Pong => tracing::trace!("keepalive reply"),
            InboundFrame::Ack(ack) => {
                if let Some(id) = ack.mainboard_id.as_deref() {
                    self.session.learn_mainboard_id(id);
                }
                self.acks.on_ack(&ack);
            }
            InboundFrame::Status(update) => self.apply_status(&update, now),
        }
        Ok(())
    }

    fn apply_status(&mut self, update: &StatusUpdate, now: Millis) {
        match self.session.apply_status(update, now) {
            SessionEvent::None => {}
            SessionEvent::PrintStarted => {
                self.reset_tracking(now);
                tracing::info!(detector = self.detector.name(), "print started, flow tracking reset");
            }
            SessionEvent::Resumed { after_jam } => {
                self.motion.restart(now);
                if after_jam {
                    self.jammed = false;
                    self.last_verdict = JamVerdict::Clear;
                }
                tracing::info!(after_jam, "print resumed");
            }
            SessionEvent::PausedByJam => {
                let flow = self.detector.snapshot();
                tracing::info!(
                    expected_mm = flow.expected_mm,
                    actual_mm = flow.actual_mm,
                    "jam pause confirmed, flow tracking frozen"
                );
            }
            SessionEvent::PausedExternally => tracing::info!("print paused by controller"),
            SessionEvent::Finished => {
                let s = self.session.summary(&self.detector.snapshot(), self.pulses);
                tracing::info!(
                    status = s.status.code(),
                    progress = s.progress,
                    layer = s.layer,
                    total_layer = s.total_layer,
                    ticks = s.ticks,
                    total_ticks = s.total_ticks,
                    expected_mm = s.expected_mm,
                    actual_mm = s.actual_mm,
                    pulses = s.pulses,
                    "print finished"
                );
                self.reset_tracking(now);
            }
        }

        if self.session.is_printing()
            && !self.session.tracking_frozen()
            && let Some(mm) = update.print_info.as_ref().and_then(|p| p.extrusion_mm)
        {
            self.detector.record_expected(mm, now);
        }
    }

    fn reset_tracking(&mut self, now: Millis) {
        self.detector.reset();
        self.motion.restart(now);
        self.pulses = 0;
        self.jammed = false;
        self.last_verdict = JamVerdict::Clear;
        self.last_check_ms = None;
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// One pass of pin polling, link upkeep, detection and the pause decision.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.millis();
        let pins = self.poll_pins(now);
        let ack_timed_out = self.connected && self.service_link(now);
        let verdict = self.update_jam_state(now);
        let (decision, pause_sent) = self.decide(now);
        TickReport {
            now_ms: now,
            pulse: pins.pulse,
            runout_changed: pins.runout_changed,
            pin_faults: pins.faults,
            ack_timed_out,
            verdict,
            jammed: self.jammed,
            decision,
            pause_sent,
        }
    }

    fn poll_pins(&mut self, now: Millis) -> PinReport {
        let mut report = PinReport::default();
        match self.runout.poll(self.runout_pin.as_mut()) {
            Ok(changed) => report.runout_changed = changed,
            Err(e) => {
                report.faults += 1;
                tracing::warn!(pin = "runout", error = %e, "pin read failed");
            }
        }
        match self.motion.poll(self.motion_pin.as_mut(), now) {
            Ok(true) => {
                report.pulse = true;
                self.on_pulse(now);
            }
            Ok(false) => {}
            Err(e) => {
                report.faults += 1;
                tracing::warn!(pin = "motion", error = %e, "pin read failed");
            }
        }
        self.stats.pin_faults = self.stats.pin_faults.saturating_add(report.faults);
        report
    }

    fn on_pulse(&mut self, now: Millis) {
        if !self.session.is_printing() || self.session.tracking_frozen() {
            return;
        }
        if self.session.take_reset_on_next_pulse() {
            self.detector.reset();
            self.last_check_ms = None;
            tracing::info!("filament moving after jam resume, flow tracking reset");
        }
        self.pulses += 1;
        self.detector.record_actual(self.cfg.tracking.mm_per_pulse, now);
    }

    /// Ack timeout, keepalive and status polling. Returns true on ack timeout.
    fn service_link(&mut self, now: Millis) -> bool {
        let timed_out = self.acks.check_timeout(now).is_some();
        if timed_out {
            self.stats.ack_timeouts = self.stats.ack_timeouts.saturating_add(1);
        }

        let proto = self.cfg.protocol;
        if !self.acks.is_waiting() && period_elapsed(now, self.last_ping_ms, proto.keepalive_ms) {
            self.last_ping_ms = now;
            if let Err(e) = self.transport.send_text(PING) {
                self.stats.send_failures = self.stats.send_failures.saturating_add(1);
                tracing::warn!(error = %e, "keepalive send failed");
            }
        }
        if period_elapsed(now, self.last_poll_ms, proto.status_poll_ms) {
            self.last_poll_ms = now;
            self.send(CommandTag::Status, false, now);
        }
        timed_out
    }

    fn update_jam_state(&mut self, now: Millis) -> Option<JamVerdict> {
        if !self.session.is_printing() || self.session.tracking_frozen() {
            return None;
        }

        let telemetry = self.cfg.telemetry;
        let mut verdict = None;
        let (jammed, source) = if self.session.extrusion_available(now, telemetry.stale_ms) {
            let interval = self.cfg.detection.jam.check_interval_ms;
            if self
                .last_check_ms
                .is_none_or(|at| period_elapsed(now, at, interval))
            {
                self.last_check_ms = Some(now);
                let v = self.detector.evaluate(now);
                if v != self.last_verdict {
                    tracing::debug!(from = self.last_verdict.as_str(), to = v.as_str(), "verdict changed");
                }
                self.last_verdict = v;
                verdict = Some(v);
            }
            (self.last_verdict.is_jam(), self.last_verdict.as_str())
        } else {
            (self.movement_timed_out(now), "movement_timeout")
        };

        if jammed != self.jammed {
            let flow = self.detector.snapshot();
            if jammed {
                tracing::warn!(
                    source,
                    expected_mm = flow.expected_mm,
                    actual_mm = flow.actual_mm,
                    deficit_mm = flow.deficit_mm,
                    flow_ratio = flow.flow_ratio,
                    ms_since_pulse = self.motion.ms_since_edge(now),
                    "filament jam detected"
                );
            } else {
                tracing::info!(deficit_mm = flow.deficit_mm, "filament flow recovered");
            }
            self.jammed = jammed;
        }
        verdict
    }

    fn movement_timed_out(&self, now: Millis) -> bool {
        let t = &self.cfg.telemetry;
        match t.fallback {
            TelemetryFallback::None => false,
            TelemetryFallback::MovementTimeout => {
                let first_layer = self.session.z_mm().unwrap_or(0.0) < FIRST_LAYER_Z_MM;
                let limit = if first_layer {
                    t.first_layer_timeout_ms
                } else {
                    t.movement_timeout_ms
                };
                limit > 0 && self.motion.ms_since_edge(now) >= limit
            }
        }
    }

    fn decide(&mut self, now: Millis) -> (PauseDecision, Option<PauseReason>) {
        let inputs = PauseInputs {
            runout: self.runout.is_runout(),
            jammed: self.jammed,
            connected: self.connected,
            printing: self.session.is_printing(),
            ms_since_start: self.session.ms_since_start(now),
            ack_pending: self.acks.is_waiting(),
            telemetry_stale: self.session.status_stale(now, self.cfg.telemetry.stale_ms),
            total_ticks: self.session.info().total_ticks,
            remaining_ticks: self.session.remaining_ticks(),
        };
        let decision = self.decision.evaluate(&inputs, now);
        let PauseDecision::Pause(reason) = decision else {
            return (decision, None);
        };
        if !self.send(CommandTag::Pause, true, now).is_sent() {
            return (decision, None);
        }
        self.decision.record_pause_request(now);
        if reason.is_jam() {
            self.session.mark_jam_pause();
        }
        self.stats.pauses_requested = self.stats.pauses_requested.saturating_add(1);
        tracing::warn!(reason = reason.as_str(), "pause requested");
        (decision, Some(reason))
    }

    fn send(&mut self, tag: CommandTag, require_ack: bool, now: Millis) -> SendOutcome {
        let ctx = self.session.command_context(self.clock.unix_secs());
        let out = self
            .acks
            .send_command(self.transport.as_mut(), tag, require_ack, &ctx, now);
        if matches!(out, SendOutcome::Failed(_)) {
            self.stats.send_failures = self.stats.send_failures.saturating_add(1);
        }
        out
    }

    // ── Manual commands ──────────────────────────────────────────────────────

    pub fn request_pause(&mut self) -> SendOutcome {
        let now = self.clock.millis();
        let out = self.send(CommandTag::Pause, true, now);
        if out.is_sent() {
            tracing::info!("manual pause requested");
        }
        out
    }

    pub fn request_resume(&mut self) -> SendOutcome {
        let now = self.clock.millis();
        let out = self.send(CommandTag::Resume, true, now);
        if out.is_sent() {
            tracing::info!("manual resume requested");
        }
        out
    }

    // ── Read-only surface ────────────────────────────────────────────────────

    pub fn session(&self) -> &PrintSession {
        &self.session
    }

    pub fn flow_snapshot(&self) -> FlowSnapshot {
        self.detector.snapshot()
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn is_runout(&self) -> bool {
        self.runout.is_runout()
    }

    pub fn is_jammed(&self) -> bool {
        self.jammed
    }

    pub fn pending_command(&self) -> Option<&PendingCommand> {
        self.acks.pending()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Motion pulses counted during the current print.
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    pub fn stats(&self) -> GuardStats {
        self.stats
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.millis()
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }
}

//! Print session state machine.
//!
//! Tracks the controller-reported print status and decides when flow tracking
//! must reset (new job, finished job), freeze (jam-initiated pause) or re-arm
//! (resume after a jam). The guard owns the detector and acts on the returned
//! [`SessionEvent`].

use flowguard_traits::Millis;

use crate::detector::FlowSnapshot;
use crate::protocol::{
    CommandContext, MachineStatus, MachineStatusSet, PrintInfo, PrintStatus, StatusUpdate,
};
use crate::util::elapsed_ms;

/// Coarse lifecycle phase derived from [`PrintStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Heating, homing, leveling, file checks and unknown codes.
    Transitional,
    Printing,
    Pausing,
    Paused,
    /// Stopping, stopped or complete.
    Terminal,
}

impl From<PrintStatus> for SessionPhase {
    fn from(s: PrintStatus) -> Self {
        match s {
            PrintStatus::Idle => Self::Idle,
            PrintStatus::Printing => Self::Printing,
            PrintStatus::Pausing => Self::Pausing,
            PrintStatus::Paused => Self::Paused,
            PrintStatus::Stopping | PrintStatus::Stopped | PrintStatus::Complete => Self::Terminal,
            _ => Self::Transitional,
        }
    }
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Transitional => "transitional",
            Self::Printing => "printing",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Terminal => "terminal",
        }
    }

    fn is_suspended(self) -> bool {
        matches!(self, Self::Pausing | Self::Paused)
    }

    fn is_finished(self) -> bool {
        matches!(self, Self::Idle | Self::Terminal)
    }
}

/// What a status update means for flow tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    None,
    /// Fresh job: reset tracking, start the post-start grace window.
    PrintStarted,
    /// Back to printing after a pause.
    Resumed { after_jam: bool },
    /// Jam-initiated pause confirmed: tracking is frozen.
    PausedByJam,
    /// Pause initiated elsewhere (user, controller).
    PausedExternally,
    /// Job left the active phases: log a summary and reset tracking.
    Finished,
}

/// One-line job summary logged when a print ends.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintSummary {
    pub status: PrintStatus,
    pub progress: i64,
    pub layer: i64,
    pub total_layer: i64,
    pub ticks: i64,
    pub total_ticks: i64,
    pub expected_mm: f32,
    pub actual_mm: f32,
    pub pulses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PrintSession {
    status: PrintStatus,
    machine: MachineStatusSet,
    info: PrintInfo,
    z_mm: Option<f32>,
    mainboard_id: String,
    started_at_ms: Millis,
    active: bool,
    suspended: bool,
    jam_pause_requested: bool,
    tracking_frozen: bool,
    reset_on_next_pulse: bool,
    extrusion_mm: Option<f32>,
    last_extrusion_ms: Option<Millis>,
    last_status_ms: Option<Millis>,
}

impl PrintSession {
    pub fn new(mainboard_id: impl Into<String>) -> Self {
        Self {
            mainboard_id: mainboard_id.into(),
            ..Self::default()
        }
    }

    /// Fold one status frame into the session.
    pub fn apply_status(&mut self, update: &StatusUpdate, now: Millis) -> SessionEvent {
        self.last_status_ms = Some(now);
        if let Some(machine) = update.machine {
            self.machine = machine;
        }
        if let Some(z) = update.z_mm {
            self.z_mm = Some(z);
        }
        if let Some(id) = update.mainboard_id.as_deref() {
            self.learn_mainboard_id(id);
        }
        let Some(info) = update.print_info.as_ref() else {
            return SessionEvent::None;
        };

        let prev = self.phase();
        self.status = info.status;
        self.info = info.clone();
        if let Some(mm) = info.extrusion_mm {
            self.extrusion_mm = Some(mm);
            self.last_extrusion_ms = Some(now);
        }
        let next = self.phase();
        if prev == next {
            return SessionEvent::None;
        }
        tracing::info!(
            from = prev.as_str(),
            to = next.as_str(),
            status = info.status.code(),
            "print phase changed"
        );
        self.transition(prev, next, now)
    }

    fn transition(&mut self, prev: SessionPhase, next: SessionPhase, now: Millis) -> SessionEvent {
        match next {
            SessionPhase::Printing
                if self.suspended || prev.is_suspended() || self.jam_pause_requested =>
            {
                self.suspended = false;
                self.tracking_frozen = false;
                let after_jam = self.jam_pause_requested;
                if after_jam {
                    self.jam_pause_requested = false;
                    self.reset_on_next_pulse = true;
                }
                self.active = true;
                SessionEvent::Resumed { after_jam }
            }
            SessionPhase::Printing => {
                self.started_at_ms = now;
                self.active = true;
                self.clear_flags();
                SessionEvent::PrintStarted
            }
            SessionPhase::Pausing | SessionPhase::Paused if prev == SessionPhase::Printing => {
                self.suspended = true;
                if self.jam_pause_requested {
                    self.tracking_frozen = true;
                    SessionEvent::PausedByJam
                } else {
                    SessionEvent::PausedExternally
                }
            }
            phase if phase.is_finished() && self.active => {
                self.active = false;
                self.clear_flags();
                SessionEvent::Finished
            }
            _ => SessionEvent::None,
        }
    }

    fn clear_flags(&mut self) {
        self.suspended = false;
        self.jam_pause_requested = false;
        self.tracking_frozen = false;
        self.reset_on_next_pulse = false;
    }

    /// Record the controller id the first time a non-empty one is seen.
    pub fn learn_mainboard_id(&mut self, id: &str) {
        if self.mainboard_id.is_empty() && !id.is_empty() {
            tracing::info!(mainboard_id = id, "stored controller mainboard id");
            self.mainboard_id = id.to_owned();
        }
    }

    /// The guard just sent a jam-driven pause.
    pub fn mark_jam_pause(&mut self) {
        self.jam_pause_requested = true;
    }

    /// Consume the "reset on next pulse" flag armed by a post-jam resume.
    pub fn take_reset_on_next_pulse(&mut self) -> bool {
        std::mem::take(&mut self.reset_on_next_pulse)
    }

    /// Print status Printing and machine status set contains Printing.
    pub fn is_printing(&self) -> bool {
        self.status == PrintStatus::Printing && self.machine.contains(MachineStatus::Printing)
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.status)
    }

    pub fn status(&self) -> PrintStatus {
        self.status
    }

    pub fn machine(&self) -> MachineStatusSet {
        self.machine
    }

    pub fn info(&self) -> &PrintInfo {
        &self.info
    }

    pub fn z_mm(&self) -> Option<f32> {
        self.z_mm
    }

    pub fn mainboard_id(&self) -> &str {
        &self.mainboard_id
    }

    pub fn started_at_ms(&self) -> Millis {
        self.started_at_ms
    }

    pub fn ms_since_start(&self, now: Millis) -> Millis {
        elapsed_ms(now, self.started_at_ms)
    }

    pub fn jam_pause_requested(&self) -> bool {
        self.jam_pause_requested
    }

    pub fn tracking_frozen(&self) -> bool {
        self.tracking_frozen
    }

    pub fn reset_on_next_pulse(&self) -> bool {
        self.reset_on_next_pulse
    }

    /// Latest reported total extrusion, if any frame carried one.
    pub fn extrusion_mm(&self) -> Option<f32> {
        self.extrusion_mm
    }

    /// Extrusion telemetry arrived within `stale_ms`.
    pub fn extrusion_available(&self, now: Millis, stale_ms: Millis) -> bool {
        self.last_extrusion_ms
            .is_some_and(|t| elapsed_ms(now, t) <= stale_ms)
    }

    /// No status frame for longer than `stale_ms` (or never).
    pub fn status_stale(&self, now: Millis, stale_ms: Millis) -> bool {
        self.last_status_ms
            .is_none_or(|t| elapsed_ms(now, t) > stale_ms)
    }

    pub fn remaining_ticks(&self) -> i64 {
        self.info.total_ticks.saturating_sub(self.info.current_ticks)
    }

    pub fn command_context(&self, unix_secs: u64) -> CommandContext<'_> {
        CommandContext {
            mainboard_id: &self.mainboard_id,
            print_status: self.status,
            machine: self.machine,
            unix_secs,
        }
    }

    pub fn summary(&self, flow: &FlowSnapshot, pulses: u64) -> PrintSummary {
        PrintSummary {
            status: self.status,
            progress: self.info.progress,
            layer: self.info.current_layer,
            total_layer: self.info.total_layer,
            ticks: self.info.current_ticks,
            total_ticks: self.info.total_ticks,
            expected_mm: flow.expected_mm,
            actual_mm: flow.actual_mm,
            pulses,
        }
    }
}

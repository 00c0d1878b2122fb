//! Per-tick pause decision.
//!
//! Guards are checked in a fixed order and the first one that applies holds
//! the print. Only when every guard passes does the runout/jam condition, as
//! adjusted by the telemetry-loss policy, decide.

use flowguard_traits::Millis;

use crate::config::{LossPolicy, PauseCfg};
use crate::util::elapsed_ms;

/// Snapshot of everything the decision depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PauseInputs {
    pub runout: bool,
    pub jammed: bool,
    pub connected: bool,
    pub printing: bool,
    pub ms_since_start: Millis,
    pub ack_pending: bool,
    pub telemetry_stale: bool,
    pub total_ticks: i64,
    pub remaining_ticks: i64,
}

/// Why the guard is not pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    Disabled,
    RunoutLeftToPrinter,
    NotConnected,
    NotPrinting,
    StartGrace,
    AckPending,
    Rearming,
    NearlyComplete,
    TelemetryLossIgnored,
    NoFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Runout,
    Jam,
    RunoutAndJam,
    TelemetryLoss,
}

impl PauseReason {
    /// The pause was driven by the flow detector.
    pub fn is_jam(self) -> bool {
        matches!(self, Self::Jam | Self::RunoutAndJam)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runout => "runout",
            Self::Jam => "jam",
            Self::RunoutAndJam => "runout_and_jam",
            Self::TelemetryLoss => "telemetry_loss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseDecision {
    Continue(HoldReason),
    Pause(PauseReason),
}

impl PauseDecision {
    pub fn should_pause(self) -> bool {
        matches!(self, Self::Pause(_))
    }
}

#[derive(Debug, Clone)]
pub struct PauseDecisionEngine {
    cfg: PauseCfg,
    loss_policy: LossPolicy,
    last_pause_request_ms: Option<Millis>,
}

impl PauseDecisionEngine {
    pub fn new(cfg: PauseCfg, loss_policy: LossPolicy) -> Self {
        Self {
            cfg,
            loss_policy,
            last_pause_request_ms: None,
        }
    }

    /// Start the rearm delay.
    pub fn record_pause_request(&mut self, now: Millis) {
        self.last_pause_request_ms = Some(now);
    }

    /// Milliseconds left before another pause may be requested.
    pub fn rearm_remaining(&self, now: Millis) -> Millis {
        self.last_pause_request_ms
            .map_or(0, |at| self.cfg.rearm_delay_ms.saturating_sub(elapsed_ms(now, at)))
    }

    pub fn evaluate(&self, i: &PauseInputs, now: Millis) -> PauseDecision {
        let decision = self.decide(i, now);
        if let PauseDecision::Pause(reason) = decision {
            tracing::warn!(
                reason = reason.as_str(),
                enabled = self.cfg.enabled,
                runout = i.runout,
                pause_on_runout = self.cfg.pause_on_runout,
                jammed = i.jammed,
                connected = i.connected,
                printing = i.printing,
                ms_since_start = i.ms_since_start,
                ack_pending = i.ack_pending,
                rearm_remaining_ms = self.rearm_remaining(now),
                telemetry_stale = i.telemetry_stale,
                loss_policy = ?self.loss_policy,
                remaining_ticks = i.remaining_ticks,
                "pause condition met"
            );
        }
        decision
    }

    fn decide(&self, i: &PauseInputs, now: Millis) -> PauseDecision {
        if !self.cfg.enabled {
            return PauseDecision::Continue(HoldReason::Disabled);
        }
        if i.runout && !self.cfg.pause_on_runout {
            return PauseDecision::Continue(HoldReason::RunoutLeftToPrinter);
        }
        if !i.connected {
            return PauseDecision::Continue(HoldReason::NotConnected);
        }
        if !i.printing {
            return PauseDecision::Continue(HoldReason::NotPrinting);
        }
        if i.ms_since_start < self.cfg.start_print_timeout_ms {
            return PauseDecision::Continue(HoldReason::StartGrace);
        }
        if i.ack_pending {
            return PauseDecision::Continue(HoldReason::AckPending);
        }
        if self.rearm_remaining(now) > 0 {
            return PauseDecision::Continue(HoldReason::Rearming);
        }
        // Without tick telemetry there is nothing to compare against.
        if i.total_ticks > 0 && i.remaining_ticks < self.cfg.min_remaining_ticks {
            return PauseDecision::Continue(HoldReason::NearlyComplete);
        }

        let jammed = if i.telemetry_stale {
            match self.loss_policy {
                LossPolicy::Unchanged => i.jammed,
                LossPolicy::Continue => {
                    if !i.runout && i.jammed {
                        return PauseDecision::Continue(HoldReason::TelemetryLossIgnored);
                    }
                    false
                }
                LossPolicy::Pause => {
                    if !i.runout && !i.jammed {
                        return PauseDecision::Pause(PauseReason::TelemetryLoss);
                    }
                    i.jammed
                }
            }
        } else {
            i.jammed
        };

        match (i.runout, jammed) {
            (true, true) => PauseDecision::Pause(PauseReason::RunoutAndJam),
            (true, false) => PauseDecision::Pause(PauseReason::Runout),
            (false, true) => PauseDecision::Pause(PauseReason::Jam),
            (false, false) => PauseDecision::Continue(HoldReason::NoFault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> PauseInputs {
        PauseInputs {
            runout: false,
            jammed: true,
            connected: true,
            printing: true,
            ms_since_start: 60_000,
            ack_pending: false,
            telemetry_stale: false,
            total_ticks: 10_000,
            remaining_ticks: 5_000,
        }
    }

    fn engine() -> PauseDecisionEngine {
        PauseDecisionEngine::new(PauseCfg::default(), LossPolicy::Continue)
    }

    #[test]
    fn jam_pauses_when_all_guards_pass() {
        assert_eq!(
            engine().evaluate(&ready(), 0),
            PauseDecision::Pause(PauseReason::Jam)
        );
    }

    #[test]
    fn disabled_beats_everything() {
        let e = PauseDecisionEngine::new(
            PauseCfg {
                enabled: false,
                ..PauseCfg::default()
            },
            LossPolicy::Pause,
        );
        let i = PauseInputs {
            runout: true,
            ..ready()
        };
        assert_eq!(e.evaluate(&i, 0), PauseDecision::Continue(HoldReason::Disabled));
    }

    #[test]
    fn rearm_delay_blocks_until_elapsed() {
        let mut e = engine();
        e.record_pause_request(1000);
        assert_eq!(e.rearm_remaining(1000), 10_000);
        assert_eq!(e.evaluate(&ready(), 5000), PauseDecision::Continue(HoldReason::Rearming));
        assert!(e.evaluate(&ready(), 11_000).should_pause());
    }

    #[test]
    fn nearly_complete_only_with_tick_telemetry() {
        let e = engine();
        let done = PauseInputs {
            remaining_ticks: 50,
            ..ready()
        };
        assert_eq!(e.evaluate(&done, 0), PauseDecision::Continue(HoldReason::NearlyComplete));
        let unknown = PauseInputs {
            total_ticks: 0,
            remaining_ticks: 0,
            ..ready()
        };
        assert!(e.evaluate(&unknown, 0).should_pause());
    }

    #[test]
    fn loss_policies() {
        let stale_jam = PauseInputs {
            telemetry_stale: true,
            ..ready()
        };
        let stale_quiet = PauseInputs {
            jammed: false,
            ..stale_jam
        };
        let stale_runout = PauseInputs {
            runout: true,
            ..stale_jam
        };

        let cont = engine();
        assert_eq!(
            cont.evaluate(&stale_jam, 0),
            PauseDecision::Continue(HoldReason::TelemetryLossIgnored)
        );
        assert_eq!(
            cont.evaluate(&stale_runout, 0),
            PauseDecision::Pause(PauseReason::Runout)
        );

        let pause = PauseDecisionEngine::new(PauseCfg::default(), LossPolicy::Pause);
        assert_eq!(
            pause.evaluate(&stale_quiet, 0),
            PauseDecision::Pause(PauseReason::TelemetryLoss)
        );

        let unchanged = PauseDecisionEngine::new(PauseCfg::default(), LossPolicy::Unchanged);
        assert_eq!(
            unchanged.evaluate(&stale_quiet, 0),
            PauseDecision::Continue(HoldReason::NoFault)
        );
        assert!(unchanged.evaluate(&stale_jam, 0).should_pause());
    }

    #[test]
    fn reasons_classify_jam() {
        assert!(PauseReason::RunoutAndJam.is_jam());
        assert!(!PauseReason::Runout.is_jam());
        assert!(!PauseReason::TelemetryLoss.is_jam());
    }
}

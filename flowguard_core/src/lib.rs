#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament jam and runout guard (hardware-agnostic).
//!
//! All hardware interactions go through `flowguard_traits::DigitalInput` and
//! `flowguard_traits::Transport`; time comes from `flowguard_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Flow tracking**: chunk ledger (`flow_tracker`) and multi-mode motion
//!   classifier (`motion`), both behind the `detector::FlowDeficitDetector` seam
//! - **Session**: print status state machine (`session`)
//! - **Decision**: per-tick pause guards and telemetry-loss policy (`decision`)
//! - **Protocol**: frame codec (`protocol`) and ack correlation (`ack`)
//! - **Composition**: `FilamentGuard` (`guard`), its builder, and the event
//!   `runner`
//!
//! ## Time
//!
//! Timestamps are `u32` milliseconds from a wrapping counter. Every duration
//! is computed with wrapping subtraction (`util::elapsed_ms`).

pub mod ack;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod decision;
pub mod detector;
pub mod error;
pub mod flow_tracker;
pub mod guard;
pub mod hw_error;
pub mod mocks;
pub mod motion;
pub mod protocol;
pub mod runner;
pub mod sensors;
pub mod session;
pub mod util;

pub use ack::{AckCoordinator, PendingCommand, SendOutcome};
pub use builder::{FilamentGuardBuilder, Missing, Set};
pub use config::{
    DetectionCfg, DetectorKind, GuardConfig, JamThresholds, LedgerCfg, LossPolicy, PauseCfg,
    ProtocolCfg, TelemetryCfg, TelemetryFallback, TrackingCfg, TrackingMode,
};
pub use decision::{HoldReason, PauseDecision, PauseDecisionEngine, PauseInputs, PauseReason};
pub use detector::{
    ChunkLedgerDetector, ClassifierDetector, FlowDeficitDetector, FlowSnapshot, JamVerdict,
    build_detector,
};
pub use error::{BuildError, GuardError, Result};
pub use flow_tracker::{FlowChunk, FlowDeficitTracker};
pub use guard::{FilamentGuard, GuardStats, TickReport};
pub use motion::{JamKind, MotionClassifier};
pub use protocol::{CommandTag, FrameError, InboundFrame, PrintStatus, decode_frame};
pub use runner::{RunSummary, TransportEvent};
pub use session::{PrintSession, SessionEvent, SessionPhase};

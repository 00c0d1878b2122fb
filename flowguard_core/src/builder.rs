//! Type-state builder for `FilamentGuard`.
//!
//! The builder enforces at compile time that the transport and both sensor
//! inputs are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use flowguard_traits::{Clock, DigitalInput, MonotonicClock, Transport};

use crate::config::GuardConfig;
use crate::error::{BuildError, Result};
use crate::guard::FilamentGuard;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `FilamentGuard`. The config is validated on `build()`.
pub struct FilamentGuardBuilder<T, R, M> {
    transport: Option<Box<dyn Transport + Send>>,
    runout: Option<Box<dyn DigitalInput + Send>>,
    motion: Option<Box<dyn DigitalInput + Send>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    config: Option<GuardConfig>,
    _t: PhantomData<T>,
    _r: PhantomData<R>,
    _m: PhantomData<M>,
}

impl Default for FilamentGuardBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            transport: None,
            runout: None,
            motion: None,
            clock: None,
            config: None,
            _t: PhantomData,
            _r: PhantomData,
            _m: PhantomData,
        }
    }
}

impl FilamentGuard {
    /// Start building a guard.
    pub fn builder() -> FilamentGuardBuilder<Missing, Missing, Missing> {
        FilamentGuardBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &GuardConfig) -> Result<()> {
    let mm = cfg.tracking.mm_per_pulse;
    if !mm.is_finite() || mm <= 0.0 {
        return Err(invalid("mm_per_pulse must be > 0"));
    }
    if cfg.detection.jam.check_interval_ms == 0 {
        return Err(invalid("check_interval_ms must be >= 1"));
    }
    if !(cfg.detection.jam.ratio_threshold > 0.0 && cfg.detection.jam.ratio_threshold <= 1.0) {
        return Err(invalid("ratio_threshold must be in (0.0, 1.0]"));
    }
    if cfg.protocol.tick_ms == 0 {
        return Err(invalid("tick_ms must be >= 1"));
    }
    if cfg.protocol.ack_timeout_ms == 0 {
        return Err(invalid("ack_timeout_ms must be >= 1"));
    }
    if cfg.pause.min_remaining_ticks < 0 {
        return Err(invalid("min_remaining_ticks must be >= 0"));
    }
    Ok(())
}

impl<T, R, M> FilamentGuardBuilder<T, R, M> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<FilamentGuard> {
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let runout = self
            .runout
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRunoutInput))?;
        let motion = self
            .motion
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotionInput))?;
        let cfg = self.config.unwrap_or_default();
        validate(&cfg)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        Ok(FilamentGuard::from_parts(cfg, transport, runout, motion, clock))
    }

    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<R, M> FilamentGuardBuilder<Missing, R, M> {
    pub fn with_transport(
        self,
        transport: impl Transport + Send + 'static,
    ) -> FilamentGuardBuilder<Set, R, M> {
        FilamentGuardBuilder {
            transport: Some(Box::new(transport)),
            runout: self.runout,
            motion: self.motion,
            clock: self.clock,
            config: self.config,
            _t: PhantomData,
            _r: PhantomData,
            _m: PhantomData,
        }
    }
}

impl<T, M> FilamentGuardBuilder<T, Missing, M> {
    pub fn with_runout_input(
        self,
        pin: impl DigitalInput + Send + 'static,
    ) -> FilamentGuardBuilder<T, Set, M> {
        FilamentGuardBuilder {
            transport: self.transport,
            runout: Some(Box::new(pin)),
            motion: self.motion,
            clock: self.clock,
            config: self.config,
            _t: PhantomData,
            _r: PhantomData,
            _m: PhantomData,
        }
    }
}

impl<T, R> FilamentGuardBuilder<T, R, Missing> {
    pub fn with_motion_input(
        self,
        pin: impl DigitalInput + Send + 'static,
    ) -> FilamentGuardBuilder<T, R, Set> {
        FilamentGuardBuilder {
            transport: self.transport,
            runout: self.runout,
            motion: Some(Box::new(pin)),
            clock: self.clock,
            config: self.config,
            _t: PhantomData,
            _r: PhantomData,
            _m: PhantomData,
        }
    }
}

impl FilamentGuardBuilder<Set, Set, Set> {
    /// Validate and build. Only available once transport and both inputs are set.
    pub fn build(self) -> Result<FilamentGuard> {
        self.try_build()
    }
}

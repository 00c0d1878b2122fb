//! Single-context event loop.
//!
//! Transport callbacks arrive on a channel and are applied between ticks, so
//! frame handling and the tick never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;

use crate::error::Result;
use crate::guard::FilamentGuard;

/// Events produced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Text(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub pauses: u32,
    pub frames_rejected: u32,
}

/// Apply one transport event to the guard.
pub fn dispatch(guard: &mut FilamentGuard, event: TransportEvent) {
    match event {
        TransportEvent::Connected => guard.on_connected(),
        TransportEvent::Disconnected => guard.on_disconnected(),
        TransportEvent::Text(text) => {
            // Already logged and counted by the guard.
            let _ = guard.handle_text(&text);
        }
    }
}

/// Drive `guard` until `shutdown` is set or every event sender is dropped.
pub fn run(
    guard: &mut FilamentGuard,
    events: &xch::Receiver<TransportEvent>,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    let period = Duration::from_millis(u64::from(guard.config().protocol.tick_ms.max(1)));
    let clock = guard.clock().clone();
    let mut ticks = 0u64;

    tracing::debug!(tick_ms = guard.config().protocol.tick_ms, "runner started");
    'run: loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::debug!("runner received shutdown signal");
            break;
        }
        loop {
            match events.try_recv() {
                Ok(ev) => dispatch(guard, ev),
                Err(xch::TryRecvError::Empty) => break,
                Err(xch::TryRecvError::Disconnected) => {
                    tracing::debug!("event source disconnected, stopping runner");
                    break 'run;
                }
            }
        }

        let report = guard.tick();
        ticks += 1;
        if report.pin_faults > 0 {
            tracing::trace!(faults = report.pin_faults, "tick completed with pin faults");
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        clock.sleep(period);
    }

    let stats = guard.stats();
    tracing::info!(ticks, pauses = stats.pauses_requested, "runner stopped");
    Ok(RunSummary {
        ticks,
        pauses: stats.pauses_requested,
        frames_rejected: stats.frames_rejected,
    })
}

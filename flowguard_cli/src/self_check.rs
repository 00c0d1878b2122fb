//! `self-check`: validate the configuration, assemble a guard, and sample the pins once.

use std::io::Write;

use eyre::Result;
use flowguard_config::Config;
use flowguard_core::FilamentGuard;
use flowguard_core::config::GuardConfig;
use flowguard_core::mocks::NullTransport;
use serde_json::json;

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn build_guard(cfg: &Config, guard_cfg: GuardConfig) -> Result<(FilamentGuard, &'static str)> {
    use flowguard_core::hw_error::map_hw_error;
    use flowguard_hardware::gpio::GpioInput;

    let runout = GpioInput::new(cfg.pins.runout).map_err(|e| eyre::Report::new(map_hw_error(&e)))?;
    let motion = GpioInput::new(cfg.pins.motion).map_err(|e| eyre::Report::new(map_hw_error(&e)))?;
    let guard = FilamentGuard::builder()
        .with_transport(NullTransport)
        .with_runout_input(runout)
        .with_motion_input(motion)
        .with_config(guard_cfg)
        .build()?;
    Ok((guard, "gpio"))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn build_guard(_cfg: &Config, guard_cfg: GuardConfig) -> Result<(FilamentGuard, &'static str)> {
    use flowguard_hardware::SimulatedInput;

    let guard = FilamentGuard::builder()
        .with_transport(NullTransport)
        .with_runout_input(SimulatedInput::new(true))
        .with_motion_input(SimulatedInput::new(false))
        .with_config(guard_cfg)
        .build()?;
    Ok((guard, "simulated"))
}

/// Build a guard from `cfg` without a printer link and report its setup.
pub fn self_check<W: Write>(cfg: &Config, json_out: bool, out: &mut W) -> Result<()> {
    let guard_cfg = GuardConfig::from(cfg);
    let (mut guard, backend) = build_guard(cfg, guard_cfg)?;
    let sample = guard.tick();

    let gc = guard.config();
    let mode = format!("{:?}", gc.tracking.mode).to_ascii_lowercase();
    let mainboard = if gc.mainboard_id.is_empty() {
        "(learned from frames)"
    } else {
        gc.mainboard_id.as_str()
    };
    tracing::info!(
        backend,
        detector = guard.detector_name(),
        pin_faults = sample.pin_faults,
        "self-check complete"
    );

    if json_out {
        let obj = json!({
            "type": "self_check",
            "ok": sample.pin_faults == 0,
            "backend": backend,
            "printer": cfg.printer.address,
            "mainboard_id": gc.mainboard_id,
            "detector": guard.detector_name(),
            "tracking_mode": mode,
            "mm_per_pulse": gc.tracking.mm_per_pulse,
            "tick_ms": gc.protocol.tick_ms,
            "pins": { "runout": cfg.pins.runout, "motion": cfg.pins.motion },
            "filament_present": !guard.is_runout(),
            "pin_faults": sample.pin_faults,
        });
        writeln!(out, "{obj}")?;
    } else {
        writeln!(out, "Self-check OK ({backend} pins)")?;
        writeln!(out, "  printer:      {} ({mainboard})", cfg.printer.address)?;
        writeln!(
            out,
            "  detector:     {} / {mode} tracking, {:.2} mm per pulse",
            guard.detector_name(),
            gc.tracking.mm_per_pulse
        )?;
        writeln!(
            out,
            "  pins:         runout={} motion={}",
            cfg.pins.runout, cfg.pins.motion
        )?;
        writeln!(out, "  tick:         {} ms", gc.protocol.tick_ms)?;
        writeln!(
            out,
            "  filament:     {}",
            if guard.is_runout() { "missing" } else { "present" }
        )?;
        if sample.pin_faults > 0 {
            writeln!(out, "  pin faults:   {}", sample.pin_faults)?;
        }
    }
    Ok(())
}

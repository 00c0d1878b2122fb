use flowguard_core::config::GuardConfig;
use flowguard_core::error::BuildError;
use flowguard_core::FilamentGuard;
use flowguard_hardware::{SimulatedInput, SimulatedTransport};
use rstest::rstest;

#[rstest]
fn missing_transport_yields_typed_build_error() {
    let err = FilamentGuard::builder()
        .with_runout_input(SimulatedInput::new(true))
        .with_motion_input(SimulatedInput::new(false))
        .try_build()
        .expect_err("should fail with MissingTransport");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingTransport) => {}
        other => panic!("expected MissingTransport, got: {other:?}"),
    }
}

#[rstest]
fn missing_motion_input_yields_typed_build_error() {
    let err = FilamentGuard::builder()
        .with_transport(SimulatedTransport::new())
        .with_runout_input(SimulatedInput::new(true))
        .try_build()
        .expect_err("should fail with MissingMotionInput");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingMotionInput)
    ));
}

fn with_pulse(mm: f32) -> GuardConfig {
    let mut c = GuardConfig::default();
    c.tracking.mm_per_pulse = mm;
    c
}

fn with_interval(ms: u32) -> GuardConfig {
    let mut c = GuardConfig::default();
    c.detection.jam.check_interval_ms = ms;
    c
}

fn with_tick(ms: u32) -> GuardConfig {
    let mut c = GuardConfig::default();
    c.protocol.tick_ms = ms;
    c
}

fn with_ack_timeout(ms: u32) -> GuardConfig {
    let mut c = GuardConfig::default();
    c.protocol.ack_timeout_ms = ms;
    c
}

#[rstest]
#[case(with_pulse(0.0), "mm_per_pulse")]
#[case(with_pulse(f32::NAN), "mm_per_pulse")]
#[case(with_interval(0), "check_interval_ms")]
#[case(with_tick(0), "tick_ms")]
#[case(with_ack_timeout(0), "ack_timeout_ms")]
fn invalid_config_is_rejected(#[case] cfg: GuardConfig, #[case] needle: &str) {
    let err = FilamentGuard::builder()
        .with_transport(SimulatedTransport::new())
        .with_runout_input(SimulatedInput::new(true))
        .with_motion_input(SimulatedInput::new(false))
        .with_config(cfg)
        .build()
        .expect_err("invalid config");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn defaults_build_with_classifier() {
    let guard = FilamentGuard::builder()
        .with_transport(SimulatedTransport::new())
        .with_runout_input(SimulatedInput::new(true))
        .with_motion_input(SimulatedInput::new(false))
        .build()
        .expect("defaults are valid");
    assert_eq!(guard.detector_name(), "classifier");
    assert!(!guard.is_connected());
}

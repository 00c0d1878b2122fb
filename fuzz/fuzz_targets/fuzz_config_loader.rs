#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = flowguard_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _ = flowguard_core::config::GuardConfig::from(&cfg);
        }
    }
});

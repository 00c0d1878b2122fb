//! Human-readable error descriptions, exit codes, and structured JSON error formatting.

use flowguard_core::error::{BuildError, GuardError};

/// Errors raised by the CLI itself; each maps to a stable exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot read script {path}: {msg}")]
    ScriptRead { path: String, msg: String },
    #[error("script line {line}: {msg}")]
    Script { line: usize, msg: String },
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `flowguard self-check`."
            ),
            CliError::ScriptRead { path, msg } => format!(
                "What happened: The replay script {path} could not be read ({msg}).\nLikely causes: Wrong path or missing permissions.\nHow to fix: Pass an existing JSON-lines file via --script."
            ),
            CliError::Script { line, msg } => format!(
                "What happened: Replay script rejected at line {line} ({msg}).\nLikely causes: Malformed JSON, an unknown event name, or timestamps going backwards.\nHow to fix: Each line needs {{\"at_ms\": N, \"event\": ...}} with non-decreasing at_ms."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTransport => {
                "What happened: No printer link was provided to the guard.\nLikely causes: The transport failed to initialize or was not wired into the builder.\nHow to fix: Pass a transport via with_transport(...).".to_string()
            }
            BuildError::MissingRunoutInput | BuildError::MissingMotionInput => format!(
                "What happened: {be}.\nLikely causes: A sensor pin failed to initialize or was not wired into the builder.\nHow to fix: Check [pins] in the config and the sensor wiring."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `flowguard self-check`."
            ),
        };
    }

    if let Some(ge) = err.downcast_ref::<GuardError>() {
        if let GuardError::Hardware(_) | GuardError::HardwareFault(_) = ge {
            return format!(
                "What happened: {ge}.\nLikely causes: Wrong pin numbers, missing GPIO permissions, or a loose sensor cable.\nHow to fix: Check [pins] in the config and that the process may access GPIO."
            );
        }
        return format!(
            "What happened: {ge}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for replay script problems, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Config(_)) => return 2,
        Some(CliError::ScriptRead { .. } | CliError::Script { .. }) => return 3,
        None => {}
    }
    if matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ) || matches!(err.downcast_ref::<GuardError>(), Some(GuardError::Config(_)))
    {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        2 => "ConfigInvalid",
        3 => "ScriptError",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "type": "error",
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(CliError::Script { line, .. }) = err.downcast_ref::<CliError>() {
        obj["details"] = json!({ "line": line });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_two() {
        let err = eyre::Report::new(CliError::Config(
            "pins.runout and pins.motion must differ".into(),
        ));
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("pins.runout"));
        let err = eyre::Report::new(BuildError::InvalidConfig("tick_ms must be >= 1"));
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn script_errors_carry_the_line() {
        let err = eyre::Report::new(CliError::Script {
            line: 4,
            msg: "at_ms went backwards".into(),
        });
        assert_eq!(exit_code_for_error(&err), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "ScriptError");
        assert_eq!(v["details"]["line"], 4);
    }

    #[test]
    fn anything_else_is_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("boom"));
    }
}

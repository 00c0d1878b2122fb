//! Scripted replay: drive a guard with a manual clock, simulated pins, and a
//! recording link, then report what it sent.
//!
//! A script is JSON lines, one event per line:
//!
//! ```text
//! {"at_ms": 0, "event": "connected"}
//! {"at_ms": 100, "event": "frame", "frame": {"Status": {...}}}
//! {"at_ms": 150, "event": "motion", "high": true}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Ticks run every
//! `tick_ms` up to and including each event's timestamp before the event is
//! applied.

use std::io::Write;

use eyre::{Result, WrapErr};
use flowguard_core::config::GuardConfig;
use flowguard_core::protocol::CommandTag;
use flowguard_core::{FilamentGuard, TickReport};
use flowguard_hardware::{SimulatedInput, SimulatedTransport};
use flowguard_traits::{ManualClock, Millis};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error_fmt::CliError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Connected,
    Disconnected,
    /// Inbound frame given as a JSON object.
    Frame { frame: Value },
    /// Inbound frame given as raw text.
    Text { text: String },
    /// Runout switch level; low means no filament.
    Runout { high: bool },
    /// Motion sensor level; every change is one pulse.
    Motion { high: bool },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptLine {
    pub at_ms: Millis,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

/// Parse a script, keeping the 1-based source line of every event.
pub fn parse_script(text: &str) -> Result<Vec<(usize, ScriptLine)>, CliError> {
    let mut out = Vec::new();
    let mut last_at: Millis = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(trimmed).map_err(|e| CliError::Script {
            line,
            msg: e.to_string(),
        })?;
        if parsed.at_ms < last_at {
            return Err(CliError::Script {
                line,
                msg: format!("at_ms {} is earlier than {last_at}", parsed.at_ms),
            });
        }
        last_at = parsed.at_ms;
        out.push((line, parsed));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    pub tick_ms: Option<u32>,
    pub auto_ack: bool,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub ticks: u64,
    pub pauses: u32,
    pub pulses: u64,
    pub phase: &'static str,
    pub frames_sent: usize,
    pub frames_rejected: u32,
    pub ack_timeouts: u32,
    pub pin_faults: u32,
    pub runout: bool,
    pub jammed: bool,
    pub end_ms: Millis,
}

struct Replay<'w, W: Write> {
    guard: FilamentGuard,
    clock: ManualClock,
    runout: SimulatedInput,
    motion: SimulatedInput,
    link: SimulatedTransport,
    out: &'w mut W,
    opts: ReplayOptions,
    ticks: u64,
    frames_sent: usize,
}

impl<W: Write> Replay<'_, W> {
    fn emit(&mut self, plain: String, obj: Value) -> Result<()> {
        if self.opts.json {
            writeln!(self.out, "{obj}")?;
        } else {
            writeln!(self.out, "{plain}")?;
        }
        Ok(())
    }

    fn flush_sent(&mut self) -> Result<()> {
        let now = self.guard.now_ms();
        for frame in self.link.take_sent() {
            self.frames_sent += 1;
            let value = serde_json::from_str::<Value>(&frame)
                .unwrap_or_else(|_| Value::String(frame.clone()));
            self.emit(
                format!("{now:>8} ms  -> {frame}"),
                json!({ "type": "frame", "at_ms": now, "frame": value }),
            )?;
        }
        if self.opts.auto_ack {
            self.answer_pending()?;
        }
        Ok(())
    }

    fn answer_pending(&mut self) -> Result<()> {
        let Some((tag, id)) = self
            .guard
            .pending_command()
            .map(|p| (p.tag, p.correlation_id.clone()))
        else {
            return Ok(());
        };
        let frame = ack_frame(tag, &id, self.guard.session().mainboard_id());
        self.inbound(&frame)
    }

    fn inbound(&mut self, text: &str) -> Result<()> {
        if let Err(e) = self.guard.handle_text(text) {
            let now = self.guard.now_ms();
            self.emit(
                format!("{now:>8} ms  rejected frame: {e}"),
                json!({ "type": "rejected", "at_ms": now, "error": e.to_string() }),
            )?;
        }
        Ok(())
    }

    fn tick(&mut self, at: Millis) -> Result<()> {
        self.clock.set(at);
        let report: TickReport = self.guard.tick();
        self.ticks += 1;
        if let Some(reason) = report.pause_sent {
            self.emit(
                format!("{at:>8} ms  pause requested ({})", reason.as_str()),
                json!({ "type": "pause", "at_ms": at, "reason": reason.as_str() }),
            )?;
        }
        self.flush_sent()
    }

    fn apply(&mut self, at: Millis, event: ScriptEvent) -> Result<()> {
        self.clock.set(at);
        match event {
            ScriptEvent::Connected => {
                self.link.set_connected(true);
                self.guard.on_connected();
            }
            ScriptEvent::Disconnected => {
                self.link.set_connected(false);
                self.guard.on_disconnected();
            }
            ScriptEvent::Frame { frame } => self.inbound(&frame.to_string())?,
            ScriptEvent::Text { text } => self.inbound(&text)?,
            ScriptEvent::Runout { high } => self.runout.set_high(high),
            ScriptEvent::Motion { high } => self.motion.set_high(high),
        }
        self.flush_sent()
    }

    fn report(&self) -> ReplayReport {
        let stats = self.guard.stats();
        ReplayReport {
            ticks: self.ticks,
            pauses: stats.pauses_requested,
            pulses: self.guard.pulses(),
            phase: self.guard.session().phase().as_str(),
            frames_sent: self.frames_sent,
            frames_rejected: stats.frames_rejected,
            ack_timeouts: stats.ack_timeouts,
            pin_faults: stats.pin_faults,
            runout: self.guard.is_runout(),
            jammed: self.guard.is_jammed(),
            end_ms: self.guard.now_ms(),
        }
    }
}

fn ack_frame(tag: CommandTag, id: &str, mainboard_id: &str) -> String {
    json!({
        "Id": id,
        "Data": {
            "Cmd": tag.code(),
            "RequestID": id,
            "MainboardID": mainboard_id,
            "Data": { "Ack": 0 },
        },
    })
    .to_string()
}

/// Replay `script` and write the outbound traffic and the final report to `out`.
pub fn run_replay<W: Write>(
    mut cfg: GuardConfig,
    script: &[(usize, ScriptLine)],
    opts: ReplayOptions,
    out: &mut W,
) -> Result<ReplayReport> {
    if let Some(ms) = opts.tick_ms {
        cfg.protocol.tick_ms = ms;
    }
    let tick_ms = cfg.protocol.tick_ms;
    let clock = ManualClock::new();
    let runout = SimulatedInput::new(true);
    let motion = SimulatedInput::new(false);
    let link = SimulatedTransport::new();
    let guard = FilamentGuard::builder()
        .with_transport(link.clone())
        .with_runout_input(runout.clone())
        .with_motion_input(motion.clone())
        .with_clock(Box::new(clock.clone()))
        .with_config(cfg)
        .build()?;
    tracing::info!(
        events = script.len(),
        tick_ms,
        detector = guard.detector_name(),
        "replay starting"
    );

    let mut replay = Replay {
        guard,
        clock,
        runout,
        motion,
        link,
        out,
        opts,
        ticks: 0,
        frames_sent: 0,
    };

    let mut next_tick: Option<Millis> = Some(0);
    for (line, step) in script {
        while let Some(t) = next_tick
            && t <= step.at_ms
        {
            replay.tick(t)?;
            next_tick = t.checked_add(tick_ms);
        }
        tracing::debug!(line, at_ms = step.at_ms, event = ?step.event, "script event");
        replay
            .apply(step.at_ms, step.event.clone())
            .wrap_err_with(|| format!("replay script line {line}"))?;
    }

    let report = replay.report();
    let plain = format!(
        "Replay complete: {} ticks, {} pause(s) requested, {} pulses, phase {}, {} frame(s) sent, {} rejected",
        report.ticks,
        report.pauses,
        report.pulses,
        report.phase,
        report.frames_sent,
        report.frames_rejected
    );
    let mut obj = serde_json::to_value(&report)?;
    obj["type"] = json!("report");
    replay.emit(plain, obj)?;
    tracing::info!(
        ticks = report.ticks,
        pauses = report.pauses,
        phase = report.phase,
        "replay finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printing(extrusion: f32) -> String {
        json!({
            "Status": {
                "CurrentStatus": [1],
                "CurrenCoord": "10.0,10.0,0.3",
                "PrintInfo": {
                    "Status": 13, "CurrentLayer": 3, "TotalLayer": 100,
                    "CurrentTicks": 100, "TotalTicks": 10000,
                    "TotalExtrusion": extrusion,
                },
            },
            "MainboardID": "mb-1",
        })
        .to_string()
    }

    fn stalled_print_script(until_ms: u32) -> String {
        let mut lines = vec![json!({"at_ms": 0, "event": "connected"}).to_string()];
        for (i, at) in (0..=until_ms).step_by(100).enumerate() {
            let frame: Value = serde_json::from_str(&printing(i as f32)).unwrap();
            lines.push(json!({"at_ms": at, "event": "frame", "frame": frame}).to_string());
        }
        lines.join("\n")
    }

    fn quick_start() -> GuardConfig {
        let mut cfg = GuardConfig::default();
        cfg.pause.start_print_timeout_ms = 1000;
        cfg
    }

    #[test]
    fn parses_every_event_kind_and_skips_comments() {
        let text = r#"
# warm up
{"at_ms": 0, "event": "connected"}
{"at_ms": 5, "event": "text", "text": "pong"}
{"at_ms": 5, "event": "frame", "frame": {"Status": {}}}
{"at_ms": 7, "event": "runout", "high": false}
{"at_ms": 9, "event": "motion", "high": true}
{"at_ms": 10, "event": "disconnected"}
"#;
        let script = parse_script(text).unwrap();
        assert_eq!(script.len(), 6);
        assert_eq!(script[0].0, 3);
        assert_eq!(script[3].1.event, ScriptEvent::Runout { high: false });
        assert_eq!(script[5].1.at_ms, 10);
    }

    #[test]
    fn timestamps_must_not_go_backwards() {
        let text = "{\"at_ms\": 50, \"event\": \"connected\"}\n{\"at_ms\": 10, \"event\": \"disconnected\"}";
        match parse_script(text) {
            Err(CliError::Script { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_a_script_error() {
        let err = parse_script(r#"{"at_ms": 1, "event": "explode"}"#).unwrap_err();
        assert!(matches!(err, CliError::Script { line: 1, .. }));
    }

    #[test]
    fn stalled_print_requests_one_pause() {
        let script = parse_script(&stalled_print_script(6000)).unwrap();
        let mut out = Vec::new();
        let report = run_replay(
            quick_start(),
            &script,
            ReplayOptions {
                json: true,
                ..ReplayOptions::default()
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(report.pauses, 1);
        assert!(report.jammed);
        assert_eq!(report.pulses, 0);
        assert_eq!(report.phase, "printing");

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines.iter().any(|v| v["type"] == "pause" && v["reason"] == "jam"));
        let pauses: Vec<_> = lines
            .iter()
            .filter(|v| v["type"] == "frame" && v["frame"]["Data"]["Cmd"] == 129)
            .collect();
        assert_eq!(pauses.len(), 1);
        assert_eq!(lines.last().unwrap()["type"], "report");
        assert_eq!(lines.last().unwrap()["pauses"], 1);
    }

    #[test]
    fn auto_ack_clears_the_pending_pause() {
        let script = parse_script(&stalled_print_script(6000)).unwrap();
        let mut out = Vec::new();
        let report = run_replay(
            quick_start(),
            &script,
            ReplayOptions {
                auto_ack: true,
                ..ReplayOptions::default()
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(report.ack_timeouts, 0);
        assert_eq!(report.pauses, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("pause requested (jam)"));
        assert!(text.starts_with("       0 ms  -> "));
    }

    #[test]
    fn motion_edges_count_as_pulses_while_printing() {
        let mut text = stalled_print_script(0);
        for (i, at) in (50..=450).step_by(100).enumerate() {
            text.push_str(&format!(
                "\n{{\"at_ms\": {at}, \"event\": \"motion\", \"high\": {}}}",
                i % 2 == 0
            ));
        }
        text.push_str("\n{\"at_ms\": 500, \"event\": \"text\", \"text\": \"garbage\"}");
        let script = parse_script(&text).unwrap();
        let mut out = Vec::new();
        let report =
            run_replay(quick_start(), &script, ReplayOptions::default(), &mut out).unwrap();
        // the last edge at 450 is polled by the tick at 460
        assert_eq!(report.pulses, 5);
        assert_eq!(report.frames_rejected, 1);
        assert!(String::from_utf8(out).unwrap().contains("rejected frame"));
    }
}

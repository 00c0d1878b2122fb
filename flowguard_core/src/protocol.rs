//! Controller wire protocol: status codes, command tags, inbound frame
//! decoding and outbound command encoding.
//!
//! Frames are JSON text. Inbound frames are either status pushes (`Status`
//! object), command acknowledgments (`Id` + `Data`), or the keepalive reply
//! `pong`. Outbound commands embed the current session snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keepalive text frame sent to the controller.
pub const PING: &str = "ping";
/// Keepalive reply from the controller.
pub const PONG: &str = "pong";
/// Source marker carried in every outbound command.
pub const FROM_SENSOR: i32 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed json: {0}")]
    Json(String),
    #[error("frame is neither a status update nor an acknowledgment")]
    Unrecognized,
    #[error("acknowledgment is missing {0}")]
    MissingField(&'static str),
    #[error("encode failed: {0}")]
    Encode(String),
}

// ── Status codes ─────────────────────────────────────────────────────────────

/// Print job status as reported in `PrintInfo.Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintStatus {
    #[default]
    Idle,
    Homing,
    Dropping,
    Exposuring,
    Lifting,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Complete,
    FileChecking,
    Printing,
    Heating,
    BedLeveling,
    Other(i32),
}

impl From<i32> for PrintStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Homing,
            2 => Self::Dropping,
            3 => Self::Exposuring,
            4 => Self::Lifting,
            5 => Self::Pausing,
            6 => Self::Paused,
            7 => Self::Stopping,
            8 => Self::Stopped,
            9 => Self::Complete,
            10 => Self::FileChecking,
            13 => Self::Printing,
            16 => Self::Heating,
            20 => Self::BedLeveling,
            other => Self::Other(other),
        }
    }
}

impl PrintStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::Homing => 1,
            Self::Dropping => 2,
            Self::Exposuring => 3,
            Self::Lifting => 4,
            Self::Pausing => 5,
            Self::Paused => 6,
            Self::Stopping => 7,
            Self::Stopped => 8,
            Self::Complete => 9,
            Self::FileChecking => 10,
            Self::Printing => 13,
            Self::Heating => 16,
            Self::BedLeveling => 20,
            Self::Other(n) => n,
        }
    }
}

/// Machine-level activity flags from the `CurrentStatus` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MachineStatus {
    Idle = 0,
    Printing = 1,
    FileTransferring = 2,
    ExposureTesting = 3,
    DevicesTesting = 4,
}

impl MachineStatus {
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Printing,
        Self::FileTransferring,
        Self::ExposureTesting,
        Self::DevicesTesting,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Printing),
            2 => Some(Self::FileTransferring),
            3 => Some(Self::ExposureTesting),
            4 => Some(Self::DevicesTesting),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of simultaneously active machine statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachineStatusSet(u8);

impl MachineStatusSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw codes; values outside the known set are skipped.
    pub fn from_codes<I: IntoIterator<Item = i64>>(codes: I) -> Self {
        let mut set = Self::empty();
        for code in codes {
            match MachineStatus::from_code(code) {
                Some(s) => set.insert(s),
                None => tracing::debug!(code, "ignoring unknown machine status"),
            }
        }
        set
    }

    pub fn insert(&mut self, s: MachineStatus) {
        self.0 |= s.bit();
    }

    pub fn contains(self, s: MachineStatus) -> bool {
        self.0 & s.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = MachineStatus> {
        MachineStatus::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    pub fn codes(self) -> Vec<i32> {
        self.iter().map(|s| s as i32).collect()
    }
}

/// Vendor command identifiers; unknown values are preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    Status,
    Attributes,
    StartPrint,
    Pause,
    StopPrint,
    Resume,
    Other(i32),
}

impl From<i32> for CommandTag {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Status,
            1 => Self::Attributes,
            128 => Self::StartPrint,
            129 => Self::Pause,
            130 => Self::StopPrint,
            131 => Self::Resume,
            other => Self::Other(other),
        }
    }
}

impl CommandTag {
    pub fn code(self) -> i32 {
        match self {
            Self::Status => 0,
            Self::Attributes => 1,
            Self::StartPrint => 128,
            Self::Pause => 129,
            Self::StopPrint => 130,
            Self::Resume => 131,
            Self::Other(n) => n,
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrintInfo {
    pub status: PrintStatus,
    pub current_layer: i64,
    pub total_layer: i64,
    pub progress: i64,
    pub current_ticks: i64,
    pub total_ticks: i64,
    pub print_speed_pct: i64,
    /// `TotalExtrusion`, else `CurrentExtrusion`, else absent.
    pub extrusion_mm: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusUpdate {
    pub machine: Option<MachineStatusSet>,
    pub z_mm: Option<f32>,
    pub print_info: Option<PrintInfo>,
    pub mainboard_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub id: Option<String>,
    pub tag: CommandTag,
    pub request_id: String,
    pub mainboard_id: Option<String>,
    pub ack_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Status(StatusUpdate),
    Ack(Ack),
    Pong,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Data")]
    data: Option<RawAckData>,
    #[serde(rename = "Status")]
    status: Option<RawStatus>,
    #[serde(rename = "MainboardID")]
    mainboard_id: Option<String>,
}

#[derive(Deserialize)]
struct RawAckData {
    #[serde(rename = "Cmd")]
    cmd: Option<i32>,
    #[serde(rename = "RequestID")]
    request_id: Option<String>,
    #[serde(rename = "MainboardID")]
    mainboard_id: Option<String>,
    #[serde(rename = "Data")]
    data: Option<RawAckResult>,
}

#[derive(Deserialize)]
struct RawAckResult {
    #[serde(rename = "Ack")]
    ack: Option<i64>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(rename = "CurrentStatus")]
    current_status: Option<Vec<i64>>,
    #[serde(rename = "CurrenCoord")]
    current_coord: Option<String>,
    #[serde(rename = "PrintInfo")]
    print_info: Option<RawPrintInfo>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawPrintInfo {
    #[serde(rename = "Status")]
    status: i32,
    #[serde(rename = "CurrentLayer")]
    current_layer: i64,
    #[serde(rename = "TotalLayer")]
    total_layer: i64,
    #[serde(rename = "Progress")]
    progress: i64,
    #[serde(rename = "CurrentTicks")]
    current_ticks: i64,
    #[serde(rename = "TotalTicks")]
    total_ticks: i64,
    #[serde(rename = "PrintSpeedPct")]
    print_speed_pct: i64,
    #[serde(rename = "TotalExtrusion")]
    total_extrusion: Option<f32>,
    #[serde(rename = "CurrentExtrusion")]
    current_extrusion: Option<f32>,
}

/// Z from a `"x,y,z"` coordinate string.
pub fn parse_z(coord: &str) -> Option<f32> {
    let mut parts = coord.split(',');
    let z = parts.nth(2)?;
    z.trim().parse::<f32>().ok().filter(|z| z.is_finite())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let trimmed = text.trim();
    if trimmed == PONG {
        return Ok(InboundFrame::Pong);
    }
    let raw: RawFrame =
        serde_json::from_str(trimmed).map_err(|e| FrameError::Json(e.to_string()))?;

    if let Some(status) = raw.status {
        let print_info = status.print_info.map(|p| PrintInfo {
            status: PrintStatus::from(p.status),
            current_layer: p.current_layer,
            total_layer: p.total_layer,
            progress: p.progress,
            current_ticks: p.current_ticks,
            total_ticks: p.total_ticks,
            print_speed_pct: p.print_speed_pct,
            extrusion_mm: p
                .total_extrusion
                .or(p.current_extrusion)
                .filter(|v| v.is_finite()),
        });
        return Ok(InboundFrame::Status(StatusUpdate {
            machine: status.current_status.map(MachineStatusSet::from_codes),
            z_mm: status.current_coord.as_deref().and_then(parse_z),
            print_info,
            mainboard_id: non_empty(raw.mainboard_id),
        }));
    }

    if let Some(data) = raw.data {
        let cmd = data.cmd.ok_or(FrameError::MissingField("Cmd"))?;
        let request_id = data.request_id.ok_or(FrameError::MissingField("RequestID"))?;
        return Ok(InboundFrame::Ack(Ack {
            id: raw.id,
            tag: CommandTag::from(cmd),
            request_id,
            mainboard_id: non_empty(data.mainboard_id),
            ack_code: data.data.and_then(|d| d.ack),
        }));
    }

    Err(FrameError::Unrecognized)
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Session view embedded in outbound commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub mainboard_id: &'a str,
    pub print_status: PrintStatus,
    pub machine: MachineStatusSet,
    pub unix_secs: u64,
}

#[derive(Serialize)]
struct EmptyPayload {}

#[derive(Serialize)]
struct CommandFrame<'a> {
    #[serde(rename = "Id")]
    id: &'a str,
    #[serde(rename = "Data")]
    data: CommandData<'a>,
}

#[derive(Serialize)]
struct CommandData<'a> {
    #[serde(rename = "Cmd")]
    cmd: i32,
    #[serde(rename = "Data")]
    data: EmptyPayload,
    #[serde(rename = "RequestID")]
    request_id: &'a str,
    #[serde(rename = "MainboardID")]
    mainboard_id: &'a str,
    #[serde(rename = "TimeStamp")]
    timestamp: u64,
    #[serde(rename = "From")]
    from: i32,
    #[serde(rename = "PrintStatus")]
    print_status: i32,
    #[serde(rename = "CurrentStatus")]
    current_status: Vec<i32>,
}

/// Serialize a command frame; `Id` and `RequestID` both carry `correlation_id`.
pub fn encode_command(
    tag: CommandTag,
    correlation_id: &str,
    ctx: &CommandContext<'_>,
) -> Result<String, FrameError> {
    let frame = CommandFrame {
        id: correlation_id,
        data: CommandData {
            cmd: tag.code(),
            data: EmptyPayload {},
            request_id: correlation_id,
            mainboard_id: ctx.mainboard_id,
            timestamp: ctx.unix_secs,
            from: FROM_SENSOR,
            print_status: ctx.print_status.code(),
            current_status: ctx.machine.codes(),
        },
    };
    serde_json::to_string(&frame).map_err(|e| FrameError::Encode(e.to_string()))
}

//! Core types used throughout the marquee router.
//!
//! This module defines the source identities, raw observations and tracked
//! per-source state shared by the tracker, resolver and dedupe gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Command prefix the tty2rpi marquee looks for in front of the label
pub const PAYLOAD_PREFIX: &str = "CMDCOR§PARAM§";

/// Label used when a default memory card is active but the mode is unknown
pub const EMU_MENU_LABEL: &str = "EMU_MENU";

/// Native window handle (HWND on Windows)
pub type WindowHandle = u64;

/// Build the full payload written to the publish channel
pub fn payload_for(label: &str) -> String {
    format!("{PAYLOAD_PREFIX}{label}")
}

/// Identity of one tracked origin of state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// A top-level emulator window
    Window(WindowHandle),
    /// A memory card device, keyed by its network address
    Device(String),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Window(handle) => write!(f, "window 0x{handle:X}"),
            SourceId::Device(host) => write!(f, "device {host}"),
        }
    }
}

/// Emulator applications whose window titles are understood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorKind {
    Mame,
    Flycast,
    DuckStation,
    TeknoParrot,
    Pcsx2,
    Dolphin,
}

impl EmulatorKind {
    pub const ALL: [EmulatorKind; 6] = [
        EmulatorKind::Mame,
        EmulatorKind::Flycast,
        EmulatorKind::DuckStation,
        EmulatorKind::TeknoParrot,
        EmulatorKind::Pcsx2,
        EmulatorKind::Dolphin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmulatorKind::Mame => "mame",
            EmulatorKind::Flycast => "flycast",
            EmulatorKind::DuckStation => "duckstation",
            EmulatorKind::TeknoParrot => "teknoparrot",
            EmulatorKind::Pcsx2 => "pcsx2",
            EmulatorKind::Dolphin => "dolphin",
        }
    }
}

/// Console mode reported by (or inferred for) a memory card device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    Ps1,
    Ps2,
    Gc,
    /// A mode string the router has no rules for
    Unrecognized(String),
}

impl DeviceMode {
    /// Parse a mode name. Empty input means "no mode".
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_uppercase();
        match name.as_str() {
            "" => None,
            "PS1" => Some(DeviceMode::Ps1),
            "PS2" => Some(DeviceMode::Ps2),
            "GC" => Some(DeviceMode::Gc),
            _ => Some(DeviceMode::Unrecognized(name)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DeviceMode::Ps1 => "PS1",
            DeviceMode::Ps2 => "PS2",
            DeviceMode::Gc => "GC",
            DeviceMode::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The subset of `/api/currentState` the router cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    /// `currentMode`
    pub current_mode: Option<String>,
    /// `game_id`
    pub game_id: Option<String>,
    /// `gameID`, used by some firmware revisions instead of `game_id`
    pub game_id_alt: Option<String>,
    pub current_channel: Option<Value>,
    pub current_size: Option<Value>,
    pub rssi: Option<Value>,
}

impl DeviceState {
    /// Extract the known fields from a state document.
    ///
    /// Never fails: missing or oddly typed fields are simply absent.
    pub fn from_value(value: &Value) -> Self {
        Self {
            current_mode: text_field(value, "currentMode"),
            game_id: text_field(value, "game_id"),
            game_id_alt: text_field(value, "gameID"),
            current_channel: value.get("currentChannel").cloned(),
            current_size: value.get("currentSize").cloned(),
            rssi: value.get("rssi").cloned(),
        }
    }

    /// Self-reported mode, if present and non-empty
    pub fn reported_mode(&self) -> Option<DeviceMode> {
        self.current_mode.as_deref().and_then(DeviceMode::parse)
    }

    /// Reported game id; `game_id` wins over `gameID` when non-empty
    pub fn reported_id(&self) -> &str {
        self.game_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.game_id_alt.as_deref())
            .unwrap_or("")
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What a source is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Window(EmulatorKind),
    Device,
}

/// Last raw signal seen for a source
#[derive(Debug, Clone, PartialEq)]
pub enum RawObservation {
    Title(String),
    Device(DeviceState),
}

/// One entry of a poller snapshot
#[derive(Debug, Clone)]
pub struct SourceSample {
    pub id: SourceId,
    pub kind: SourceKind,
    pub raw: RawObservation,
}

/// Per-source tracking and dedupe state
#[derive(Debug, Clone)]
pub struct TrackedSource {
    pub id: SourceId,
    pub kind: SourceKind,
    pub raw: RawObservation,
    /// Last label admitted by the dedupe gate
    pub last_label: Option<String>,
    /// Last payload admitted by the dedupe gate
    pub last_published_payload: Option<String>,
    pub last_published_at: Option<DateTime<Utc>>,
    /// Recorded device mode (device sources only)
    pub mode: Option<DeviceMode>,
    /// Mode implied by the endpoint that answered (device sources only)
    pub endpoint_mode: Option<DeviceMode>,
    /// False while a retained device source is unreachable
    pub connected: bool,
    pub publish_count: u32,
}

impl TrackedSource {
    pub fn new(sample: SourceSample) -> Self {
        Self {
            id: sample.id,
            kind: sample.kind,
            raw: sample.raw,
            last_label: None,
            last_published_payload: None,
            last_published_at: None,
            mode: None,
            endpoint_mode: None,
            connected: true,
            publish_count: 0,
        }
    }
}

/// Process-wide record of the last payload sent by any source
#[derive(Debug, Clone, Default)]
pub struct GlobalPublishState {
    pub last_published_payload: Option<String>,
}

/// A payload admitted by the dedupe gate and due for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub source: SourceId,
    pub label: String,
    pub payload: String,
}

/// Failure to enumerate windows for a cycle
#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    #[error("Window enumeration failed: {0}")]
    Platform(String),
}

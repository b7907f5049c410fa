//! FlashForge protocol types and constants.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// Session commands
pub(crate) const CMD_HANDSHAKE: &str = "M601 S1";
pub(crate) const CMD_ANNOUNCE_TRANSFER: &str = "M650";
pub(crate) const CMD_FINALIZE_TRANSFER: &str = "M29";

// Protocol constants
pub const DEFAULT_PORT: u16 = 8899;
pub(crate) const LINE_PREFIX: &str = "~";
pub(crate) const LINE_SUFFIX: &str = "\r\n";
pub(crate) const READ_BUFFER_SIZE: usize = 1024;
pub(crate) const REMOTE_DIR: &str = "0:/user/";

// Upload framing
pub const PACKET_MAGIC: [u8; 4] = [0x5A, 0x5A, 0xA5, 0xA5];
pub const CHUNK_SIZE: usize = 4096;
pub const PACKET_HEADER_SIZE: usize = 16; // magic(4) + seq(4) + len(4) + crc(4)
pub const MAX_FILENAME_LEN: usize = 36;

// Timing defaults
pub(crate) const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_PACKET_DELAY: Duration = Duration::from_millis(10);

// Move defaults
pub const DEFAULT_FEEDRATE: u32 = 3000;

/// TCP endpoint of one printer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    /// Address on the default control port (8899).
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_PORT)
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Logical operations exposed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    GetInfo,
    GetPosition,
    GetTemperature,
    GetProgress,
    GetStatus,
    Home,
    Move,
    SetLed,
    Pause,
    Resume,
    Stop,
    Upload,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetInfo => "get-info",
            Self::GetPosition => "get-position",
            Self::GetTemperature => "get-temperature",
            Self::GetProgress => "get-progress",
            Self::GetStatus => "get-status",
            Self::Home => "home",
            Self::Move => "move",
            Self::SetLed => "set-led",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single extracted response field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Integer(n) => Some(*n as f64),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Fields extracted from one device response.
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParsedResult(BTreeMap<String, FieldValue>);

impl ParsedResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Text value of a field, if present and textual.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

/// Reply to an action command (home, move, LED, print control).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    /// Command text sent to the device, without envelope
    pub command: String,
    /// Decoded device response
    pub response: String,
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub filename: String,
    /// Destination on the device, e.g. `0:/user/part.gx`
    pub remote_path: String,
    /// Payload size in bytes
    pub bytes: usize,
    /// Number of framed packets streamed
    pub packets: u32,
    pub message: String,
}

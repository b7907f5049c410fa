//! Command catalog: logical operations to device command text.

use super::types::{DEFAULT_FEEDRATE, DeviceAddress, LINE_PREFIX, LINE_SUFFIX, Operation, REMOTE_DIR};
use crate::error::{PrinterError, Result};

/// A device command, one per logical operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Info,
    Position,
    Temperature,
    Progress,
    Status,
    /// Home one axis, or all of them when `None`
    Home(Option<String>),
    /// Linear move; omitted coordinates keep their current position
    Move {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed: u32,
    },
    /// Solid RGB color on the case LEDs
    SetLed { r: u8, g: u8, b: u8 },
    Pause,
    Resume,
    Stop,
}

impl Command {
    /// Build a home command from a caller-supplied axis name.
    ///
    /// `"all"` (any case) and `None` home every axis.
    pub fn home(axis: Option<&str>) -> Self {
        let axis = axis
            .map(str::trim)
            .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("all"))
            .map(str::to_uppercase);
        Self::Home(axis)
    }

    /// Build a move command; speed defaults to 3000 mm/min.
    pub fn move_to(x: Option<f64>, y: Option<f64>, z: Option<f64>, speed: Option<u32>) -> Self {
        Self::Move {
            x,
            y,
            z,
            speed: speed.unwrap_or(DEFAULT_FEEDRATE),
        }
    }

    /// Build an LED command; missing components are 0.
    pub fn set_led(r: Option<u8>, g: Option<u8>, b: Option<u8>) -> Self {
        Self::SetLed {
            r: r.unwrap_or(0),
            g: g.unwrap_or(0),
            b: b.unwrap_or(0),
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Info => Operation::GetInfo,
            Self::Position => Operation::GetPosition,
            Self::Temperature => Operation::GetTemperature,
            Self::Progress => Operation::GetProgress,
            Self::Status => Operation::GetStatus,
            Self::Home(_) => Operation::Home,
            Self::Move { .. } => Operation::Move,
            Self::SetLed { .. } => Operation::SetLed,
            Self::Pause => Operation::Pause,
            Self::Resume => Operation::Resume,
            Self::Stop => Operation::Stop,
        }
    }

    /// Literal command text, without the `~`/CRLF envelope.
    pub fn text(&self) -> String {
        match self {
            Self::Info => "M115".to_string(),
            Self::Position => "M114".to_string(),
            Self::Temperature => "M105".to_string(),
            Self::Progress => "M27".to_string(),
            Self::Status => "M119".to_string(),
            Self::Home(None) => "G28".to_string(),
            Self::Home(Some(axis)) => format!("G28 {axis}"),
            Self::Move { x, y, z, speed } => {
                let mut cmd = String::from("G1");
                for (label, value) in [('X', x), ('Y', y), ('Z', z)] {
                    if let Some(v) = value {
                        cmd.push_str(&format!(" {label}{v}"));
                    }
                }
                cmd.push_str(&format!(" F{speed}"));
                cmd
            }
            Self::SetLed { r, g, b } => format!("M146 r{r} g{g} b{b} f0"),
            Self::Pause => "M25".to_string(),
            Self::Resume => "M24".to_string(),
            Self::Stop => "M26".to_string(),
        }
    }
}

/// Reject an axis name that would break out of the command line.
pub(crate) fn validate_axis(address: &DeviceAddress, axis: Option<&str>) -> Result<()> {
    match axis {
        Some(axis) if has_control_chars(axis) => Err(PrinterError::validation(
            address,
            Operation::Home,
            format!("axis {axis:?} contains control characters"),
        )),
        _ => Ok(()),
    }
}

/// CR, LF and other control characters end or corrupt a device line.
pub(crate) fn has_control_chars(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// Wrap a command in the device line envelope: `~<command>\r\n`.
pub(crate) fn frame_line(command: &str) -> String {
    format!("{LINE_PREFIX}{command}{LINE_SUFFIX}")
}

/// `M28` transfer declaration for a payload of `size` bytes.
pub(crate) fn declare_transfer(size: usize, filename: &str) -> String {
    format!("M28 {size} {}", remote_path(filename))
}

/// Destination path of an uploaded file on the device.
pub(crate) fn remote_path(filename: &str) -> String {
    format!("{REMOTE_DIR}{filename}")
}

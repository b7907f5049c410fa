//! Error types and handling.

use crate::printer::{DeviceAddress, Operation};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the printer protocol client.
#[derive(Error, Debug)]
pub enum PrinterError {
    /// Input rejected before any socket was opened
    #[error("{operation} on {address}: invalid input: {message}")]
    Validation {
        address: DeviceAddress,
        operation: Operation,
        message: String,
    },

    /// Connect, read or write failure, including timeouts
    #[error("{operation} on {address}: {cause}")]
    Transport {
        address: DeviceAddress,
        operation: Operation,
        #[source]
        cause: TransportCause,
    },

    /// Device closed the connection before acknowledging with `ok`
    #[error("{operation} on {address}: protocol error: {message}")]
    Protocol {
        address: DeviceAddress,
        operation: Operation,
        message: String,
    },

    /// Multi-step file transfer aborted
    #[error("upload of {filename} to {address} failed during {step}: {source}")]
    Upload {
        address: DeviceAddress,
        filename: String,
        step: UploadStep,
        #[source]
        source: Box<PrinterError>,
    },
}

/// Underlying socket failure.
#[derive(Error, Debug)]
pub enum TransportCause {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

impl TransportCause {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::ReadTimeout(_) | Self::WriteTimeout(_)
        )
    }
}

/// Stage of the upload sequence at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    Connect,
    Handshake,
    /// `M650`
    Announce,
    /// `M28 <size> <path>`
    Declare,
    Stream,
    /// `M29`
    Finalize,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::Announce => "announce (M650)",
            Self::Declare => "declare (M28)",
            Self::Stream => "stream",
            Self::Finalize => "finalize (M29)",
        };
        f.write_str(name)
    }
}

/// Result type alias for PrinterError
pub type Result<T> = std::result::Result<T, PrinterError>;

impl PrinterError {
    /// Create a validation error with message
    pub fn validation(address: &DeviceAddress, operation: Operation, msg: impl Into<String>) -> Self {
        Self::Validation {
            address: address.clone(),
            operation,
            message: msg.into(),
        }
    }

    /// Create a transport error from a socket failure
    pub fn transport(address: &DeviceAddress, operation: Operation, cause: TransportCause) -> Self {
        Self::Transport {
            address: address.clone(),
            operation,
            cause,
        }
    }

    /// Create a protocol error with message
    pub fn protocol(address: &DeviceAddress, operation: Operation, msg: impl Into<String>) -> Self {
        Self::Protocol {
            address: address.clone(),
            operation,
            message: msg.into(),
        }
    }

    /// Device the failed operation targeted.
    pub fn address(&self) -> &DeviceAddress {
        match self {
            Self::Validation { address, .. }
            | Self::Transport { address, .. }
            | Self::Protocol { address, .. }
            | Self::Upload { address, .. } => address,
        }
    }

    /// Operation that was attempted.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Validation { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Protocol { operation, .. } => *operation,
            Self::Upload { .. } => Operation::Upload,
        }
    }

    /// Whether the failure was a connect/read/write timeout, looking through upload wrapping.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport { cause, .. } => cause.is_timeout(),
            Self::Upload { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

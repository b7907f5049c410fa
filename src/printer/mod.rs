//! FlashForge TCP control protocol client.
//!
//! Speaks the line protocol on port 8899: `~<gcode>\r\n` requests answered by
//! free-form text ending in `ok`, plus the framed binary mode used for file
//! uploads. Every operation runs on its own short-lived connection.
//!
//! # Example
//!
//! ```ignore
//! use flashforge_bridge::printer::{DeviceAddress, PrinterClient};
//!
//! let client = PrinterClient::new();
//! let printer = DeviceAddress::new("10.0.0.96");
//! let temps = client.get_temperature(&printer).await?;
//! client.home(&printer, Some("z")).await?;
//! ```

mod client;
mod commands;
mod io;
mod parser;
mod transfer;
mod types;


// Re-export public API
pub use client::PrinterClient;
pub use commands::Command;
pub use transfer::{UploadPacket, packetize};
pub use types::{
    CHUNK_SIZE, CommandAck, DEFAULT_FEEDRATE, DEFAULT_PORT, DeviceAddress, FieldValue, MAX_FILENAME_LEN,
    Operation, PACKET_HEADER_SIZE, PACKET_MAGIC, ParsedResult, UploadSummary,
};

//! PrinterClient struct and public API.

use super::commands::{Command, validate_axis};
use super::io::Session;
use super::parser::{parse_info, parse_position, parse_progress, parse_status, parse_temperature};
use super::transfer::upload_file;
use super::types::{
    CommandAck, DEFAULT_COMMAND_TIMEOUT, DEFAULT_PACKET_DELAY, DEFAULT_UPLOAD_TIMEOUT, DeviceAddress, ParsedResult,
    UploadSummary,
};
use crate::config::PrinterConfig;
use crate::error::Result;
use std::time::Duration;
use tracing::info;

/// FlashForge client for the line-based control protocol.
///
/// Holds only timing settings. Every call opens its own connection, performs
/// the `M601 S1` handshake, runs one command and closes the socket again.
#[derive(Debug, Clone)]
pub struct PrinterClient {
    command_timeout: Duration,
    upload_timeout: Duration,
    packet_delay: Duration,
}

impl Default for PrinterClient {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            packet_delay: DEFAULT_PACKET_DELAY,
        }
    }
}

impl PrinterClient {
    /// Create a client with the default timings (10 s commands, 30 s uploads, 10 ms packet delay).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client from the `[printer]` config section.
    pub fn from_config(config: &PrinterConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            packet_delay: Duration::from_millis(config.packet_delay_ms),
        }
    }

    /// Bound on connect and on each read/write of a plain command.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Bound on connect and on each read/write during an upload.
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Pause between upload packets.
    pub fn with_packet_delay(mut self, delay: Duration) -> Self {
        self.packet_delay = delay;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    /// Firmware and machine details (`M115`).
    pub async fn get_info(&self, address: &DeviceAddress) -> Result<ParsedResult> {
        let response = self.execute(address, &Command::Info).await?;
        Ok(parse_info(&response))
    }

    /// Print head coordinates (`M114`): `x`, `y`, `z`.
    pub async fn get_position(&self, address: &DeviceAddress) -> Result<ParsedResult> {
        let response = self.execute(address, &Command::Position).await?;
        Ok(parse_position(&response))
    }

    /// Extruder and bed temperatures (`M105`).
    pub async fn get_temperature(&self, address: &DeviceAddress) -> Result<ParsedResult> {
        let response = self.execute(address, &Command::Temperature).await?;
        Ok(parse_temperature(&response))
    }

    /// Print progress in bytes (`M27`): `current_byte`, `total_bytes`, `percentage`.
    pub async fn get_progress(&self, address: &DeviceAddress) -> Result<ParsedResult> {
        let response = self.execute(address, &Command::Progress).await?;
        Ok(parse_progress(&response))
    }

    /// Endstop states and raw status text (`M119`).
    pub async fn get_status(&self, address: &DeviceAddress) -> Result<ParsedResult> {
        let response = self.execute(address, &Command::Status).await?;
        Ok(parse_status(&response))
    }

    /// Home one axis, or all axes for `None`/`"all"`.
    pub async fn home(&self, address: &DeviceAddress, axis: Option<&str>) -> Result<CommandAck> {
        validate_axis(address, axis)?;
        self.acknowledge(address, Command::home(axis)).await
    }

    /// Move the print head. Omitted coordinates keep their position.
    pub async fn move_axis(
        &self,
        address: &DeviceAddress,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        speed: Option<u32>,
    ) -> Result<CommandAck> {
        self.acknowledge(address, Command::move_to(x, y, z, speed)).await
    }

    /// Set a solid LED color. Missing components are 0.
    pub async fn set_led(
        &self,
        address: &DeviceAddress,
        r: Option<u8>,
        g: Option<u8>,
        b: Option<u8>,
    ) -> Result<CommandAck> {
        self.acknowledge(address, Command::set_led(r, g, b)).await
    }

    pub async fn pause(&self, address: &DeviceAddress) -> Result<CommandAck> {
        self.acknowledge(address, Command::Pause).await
    }

    pub async fn resume(&self, address: &DeviceAddress) -> Result<CommandAck> {
        self.acknowledge(address, Command::Resume).await
    }

    /// Cancel the current print.
    pub async fn stop(&self, address: &DeviceAddress) -> Result<CommandAck> {
        self.acknowledge(address, Command::Stop).await
    }

    /// Upload a file to `0:/user/<filename>`.
    ///
    /// The filename is limited to 36 bytes; longer names fail before any
    /// connection is made. A failed upload must be restarted from scratch.
    pub async fn upload_file(
        &self,
        address: &DeviceAddress,
        filename: &str,
        content: &[u8],
    ) -> Result<UploadSummary> {
        upload_file(address, filename, content, self.upload_timeout, self.packet_delay).await
    }

    async fn acknowledge(&self, address: &DeviceAddress, command: Command) -> Result<CommandAck> {
        let response = self.execute(address, &command).await?;
        Ok(CommandAck {
            command: command.text(),
            response,
        })
    }

    /// Run one command in a fresh session: connect, handshake, command, close.
    async fn execute(&self, address: &DeviceAddress, command: &Command) -> Result<String> {
        let operation = command.operation();
        let text = command.text();

        let mut session = Session::open(address, operation, self.command_timeout).await?;
        session.handshake().await?;
        let response = session.send_command(&text).await?;
        session.close().await;

        info!("{operation} on {address}: {} bytes of response", response.len());
        Ok(response)
    }
}

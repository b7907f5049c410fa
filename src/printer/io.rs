//! Session transport: one TCP connection, line envelope and timeout handling.

use super::commands::frame_line;
use super::types::{CMD_HANDSHAKE, DeviceAddress, Operation, READ_BUFFER_SIZE};
use crate::error::{PrinterError, Result, TransportCause};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// Bytes read for one request/response exchange.
#[derive(Debug, Default)]
pub(crate) struct RawResponse {
    pub bytes: Vec<u8>,
    /// Terminator seen; `false` means the peer closed the connection first
    pub complete: bool,
}

/// How far to read before a response counts as finished.
#[derive(Debug, Clone, Copy)]
enum Terminator {
    /// `ok` anywhere in the accumulated bytes
    Ack,
    /// `ok\r\n` or `ok\n`
    AckLine,
}

impl Terminator {
    fn is_reached(self, buf: &[u8]) -> bool {
        match self {
            Self::Ack => contains(buf, b"ok"),
            Self::AckLine => contains(buf, b"ok\r\n") || contains(buf, b"ok\n"),
        }
    }
}

/// An open connection to one printer, owned by a single operation.
///
/// The socket is closed when the session is dropped.
pub(crate) struct Session {
    stream: TcpStream,
    address: DeviceAddress,
    operation: Operation,
    timeout_duration: Duration,
    awake: bool,
}

impl Session {
    /// Connect to the device. Connect and every later read/write are bounded by `timeout_duration`.
    pub(crate) async fn open(
        address: &DeviceAddress,
        operation: Operation,
        timeout_duration: Duration,
    ) -> Result<Self> {
        info!("Connecting to {address} for {operation} (timeout={timeout_duration:?})");

        let stream = timeout(
            timeout_duration,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| {
            error!("Connection timeout to {address}");
            PrinterError::transport(address, operation, TransportCause::ConnectTimeout(timeout_duration))
        })?
        .map_err(|e| {
            error!("Failed to connect to {address}: {e}");
            PrinterError::transport(address, operation, TransportCause::Connect(e))
        })?;

        Ok(Self {
            stream,
            address: address.clone(),
            operation,
            timeout_duration,
            awake: false,
        })
    }

    pub(crate) fn is_awake(&self) -> bool {
        self.awake
    }

    /// Wake the device with `M601 S1` and wait for its `ok`.
    pub(crate) async fn handshake(&mut self) -> Result<()> {
        self.expect_ok(CMD_HANDSHAKE).await?;
        self.awake = true;
        debug!("Device at {} is awake", self.address);
        Ok(())
    }

    /// Send a command and read the reply until an `ok` line or until the peer closes.
    pub(crate) async fn send_command(&mut self, command: &str) -> Result<String> {
        if !self.is_awake() {
            return Err(PrinterError::protocol(
                &self.address,
                self.operation,
                format!("command {command} sent before handshake"),
            ));
        }

        self.write_line(command).await?;
        let response = self.read_response(Terminator::AckLine).await?;
        if !response.complete {
            debug!("Peer closed after {} bytes, treating as end of response", response.bytes.len());
        }
        Ok(decode_permissive(&response.bytes))
    }

    /// Send a command and require an `ok` before the connection closes.
    pub(crate) async fn expect_ok(&mut self, command: &str) -> Result<String> {
        self.write_line(command).await?;
        let response = self.read_response(Terminator::Ack).await?;
        if !response.complete {
            error!("Connection to {} closed before ok for {command}", self.address);
            return Err(PrinterError::protocol(
                &self.address,
                self.operation,
                format!("connection closed before ok for {command}"),
            ));
        }
        Ok(decode_permissive(&response.bytes))
    }

    /// Write raw bytes (upload packets) with timeout.
    pub(crate) async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("TX {} bytes to {}", bytes.len(), self.address);
        timeout(self.timeout_duration, self.stream.write_all(bytes))
            .await
            .map_err(|_| self.transport_error(TransportCause::WriteTimeout(self.timeout_duration)))?
            .map_err(|e| {
                error!("Write to {} failed: {e}", self.address);
                self.transport_error(TransportCause::Write(e))
            })
    }

    /// Shut the socket down explicitly. Dropping the session also closes it.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown of {} reported: {e}", self.address);
        }
    }

    async fn write_line(&mut self, command: &str) -> Result<()> {
        debug!("TX {command} -> {}", self.address);
        let line = frame_line(command);
        self.write_bytes(line.as_bytes()).await
    }

    /// Accumulate reads of up to `READ_BUFFER_SIZE` bytes until the terminator or EOF.
    async fn read_response(&mut self, terminator: Terminator) -> Result<RawResponse> {
        let mut response = RawResponse::default();
        let mut chunk = [0u8; READ_BUFFER_SIZE];

        loop {
            let n = timeout(self.timeout_duration, self.stream.read(&mut chunk))
                .await
                .map_err(|_| {
                    error!("Read timeout waiting for {} ({:?})", self.address, self.timeout_duration);
                    self.transport_error(TransportCause::ReadTimeout(self.timeout_duration))
                })?
                .map_err(|e| {
                    error!("Read from {} failed: {e}", self.address);
                    self.transport_error(TransportCause::Read(e))
                })?;

            if n == 0 {
                break;
            }
            response.bytes.extend_from_slice(&chunk[..n]);
            if terminator.is_reached(&response.bytes) {
                response.complete = true;
                break;
            }
        }

        debug!("RX {} bytes from {}", response.bytes.len(), self.address);
        Ok(response)
    }

    fn transport_error(&self, cause: TransportCause) -> PrinterError {
        PrinterError::transport(&self.address, self.operation, cause)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Closing session to {} ({})", self.address, self.operation);
    }
}

/// Decode device output, dropping bytes that are not valid UTF-8.
pub(crate) fn decode_permissive(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

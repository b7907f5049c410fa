//! Chunked file upload: M650/M28 negotiation, framed packets, M29 finalize.

use super::commands::{declare_transfer, has_control_chars, remote_path};
use super::io::Session;
use super::types::{
    CHUNK_SIZE, CMD_ANNOUNCE_TRANSFER, CMD_FINALIZE_TRANSFER, DeviceAddress, MAX_FILENAME_LEN, Operation,
    PACKET_HEADER_SIZE, PACKET_MAGIC, UploadSummary,
};
use crate::error::{PrinterError, Result, UploadStep};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// One framed chunk of an upload.
///
/// Wire layout (big-endian): magic, sequence, length, crc32, then
/// `CHUNK_SIZE` data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPacket {
    pub sequence: u32,
    /// Declared payload length, always `CHUNK_SIZE`
    pub length: u32,
    /// CRC32 of the chunk before zero padding
    pub crc32: u32,
    /// Chunk data zero-padded to `CHUNK_SIZE`
    pub data: Vec<u8>,
}

impl UploadPacket {
    /// Frame `chunk` as packet number `sequence`.
    ///
    /// Returns `None` when the chunk is longer than `CHUNK_SIZE`.
    pub fn new(sequence: u32, chunk: &[u8]) -> Option<Self> {
        (chunk.len() <= CHUNK_SIZE).then(|| Self::framed(sequence, chunk))
    }

    /// Caller guarantees `chunk.len() <= CHUNK_SIZE`.
    fn framed(sequence: u32, chunk: &[u8]) -> Self {
        let crc32 = checksum(chunk);
        let mut data = Vec::with_capacity(CHUNK_SIZE);
        data.extend_from_slice(chunk);
        data.resize(CHUNK_SIZE, 0);

        Self {
            sequence,
            length: CHUNK_SIZE as u32,
            crc32,
            data,
        }
    }

    /// Serialize header and padded data.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(PACKET_HEADER_SIZE + self.data.len());
        packet.extend_from_slice(&PACKET_MAGIC);
        packet.extend_from_slice(&self.sequence.to_be_bytes());
        packet.extend_from_slice(&self.length.to_be_bytes());
        packet.extend_from_slice(&self.crc32.to_be_bytes());
        packet.extend_from_slice(&self.data);
        packet
    }
}

/// Split a payload into numbered packets, starting at 0.
pub fn packetize(content: &[u8]) -> impl Iterator<Item = UploadPacket> + '_ {
    content
        .chunks(CHUNK_SIZE)
        .zip(0u32..)
        .map(|(chunk, sequence)| UploadPacket::framed(sequence, chunk))
}

/// Calculate CRC32 checksum.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Reject uploads the device cannot accept. Returns the packet count.
pub(crate) fn validate_upload(address: &DeviceAddress, filename: &str, content: &[u8]) -> Result<u32> {
    if filename.is_empty() {
        return Err(PrinterError::validation(address, Operation::Upload, "filename is empty"));
    }
    if has_control_chars(filename) {
        return Err(PrinterError::validation(
            address,
            Operation::Upload,
            format!("filename {filename:?} contains control characters"),
        ));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(PrinterError::validation(
            address,
            Operation::Upload,
            format!(
                "filename '{filename}' is {} bytes, limit is {MAX_FILENAME_LEN}",
                filename.len()
            ),
        ));
    }

    u32::try_from(content.len().div_ceil(CHUNK_SIZE)).map_err(|_| {
        PrinterError::validation(
            address,
            Operation::Upload,
            format!("payload of {} bytes exceeds the packet counter", content.len()),
        )
    })
}

/// Upload `content` as `0:/user/<filename>` over a single session.
pub(crate) async fn upload_file(
    address: &DeviceAddress,
    filename: &str,
    content: &[u8],
    timeout_duration: Duration,
    packet_delay: Duration,
) -> Result<UploadSummary> {
    let packets = validate_upload(address, filename, content)?;

    info!(
        "Uploading {filename} ({} bytes, {packets} packets) to {address}",
        content.len()
    );

    let mut session = Session::open(address, Operation::Upload, timeout_duration)
        .await
        .map_err(at_step(address, filename, UploadStep::Connect))?;

    session
        .handshake()
        .await
        .map_err(at_step(address, filename, UploadStep::Handshake))?;

    session
        .expect_ok(CMD_ANNOUNCE_TRANSFER)
        .await
        .map_err(at_step(address, filename, UploadStep::Announce))?;

    session
        .expect_ok(&declare_transfer(content.len(), filename))
        .await
        .map_err(at_step(address, filename, UploadStep::Declare))?;

    stream_packets(&mut session, content, packet_delay)
        .await
        .map_err(at_step(address, filename, UploadStep::Stream))?;

    session
        .expect_ok(CMD_FINALIZE_TRANSFER)
        .await
        .map_err(at_step(address, filename, UploadStep::Finalize))?;

    session.close().await;
    info!("Upload of {filename} to {address} complete");

    Ok(UploadSummary {
        filename: filename.to_string(),
        remote_path: remote_path(filename),
        bytes: content.len(),
        packets,
        message: format!("File {filename} uploaded successfully"),
    })
}

/// Send every packet back-to-back with `packet_delay` between them. No per-packet ack.
async fn stream_packets(session: &mut Session, content: &[u8], packet_delay: Duration) -> Result<()> {
    for packet in packetize(content) {
        trace!("Packet {} crc={:#010x}", packet.sequence, packet.crc32);
        session.write_bytes(&packet.encode()).await?;

        if !packet_delay.is_zero() {
            tokio::time::sleep(packet_delay).await;
        }
    }
    debug!("Streamed {} bytes", content.len());
    Ok(())
}

fn at_step<'a>(
    address: &'a DeviceAddress,
    filename: &'a str,
    step: UploadStep,
) -> impl FnOnce(PrinterError) -> PrinterError + 'a {
    move |source| {
        error!("Upload of {filename} to {address} failed during {step}: {source}");
        PrinterError::Upload {
            address: address.clone(),
            filename: filename.to_string(),
            step,
            source: Box::new(source),
        }
    }
}

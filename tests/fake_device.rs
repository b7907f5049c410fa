//! Integration tests against a fake printer.
//!
//! Each test binds a `tokio::net::TcpListener` on loopback, runs the printer
//! half in a background task and drives it with a real `PrinterClient`.

use std::time::{Duration, Instant};

use flashforge_bridge::printer::{CHUNK_SIZE, FieldValue, PACKET_HEADER_SIZE, PACKET_MAGIC};
use flashforge_bridge::{DeviceAddress, PrinterClient, PrinterError, TransportCause, UploadStep};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn bind() -> (TcpListener, DeviceAddress) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake printer");
    let port = listener.local_addr().unwrap().port();
    (listener, DeviceAddress::with_port("127.0.0.1", port))
}

fn fast_client() -> PrinterClient {
    PrinterClient::new()
        .with_command_timeout(Duration::from_secs(2))
        .with_upload_timeout(Duration::from_secs(2))
        .with_packet_delay(Duration::from_millis(1))
}

/// Typical firmware reply: echo line, body, `ok`.
fn reply(line: &str, body: &str) -> String {
    let command = line.trim_start_matches('~');
    if body.is_empty() {
        format!("CMD {command} Received.\r\nok\r\n")
    } else {
        format!("CMD {command} Received.\r\n{body}\r\nok\r\n")
    }
}

fn finder_replies(line: &str) -> Option<String> {
    let body = match line {
        "~M601 S1" => "Control Success.",
        "~M115" => "Machine Type: Flashforge Finder\r\nMachine Name: Finder\r\nFirmware: V1.5 20170419",
        "~M114" => "X:-19.19 Y:6 Z:7.3 A:846.11 B:0",
        "~M105" => "T0:210 /215 B:60 /65",
        "~M27" => "SD printing byte 1234/5678",
        "~M119" => "Endstop: X-max:1 Y-max:0 Z-min:0\r\nx_min: TRIGGERED\r\nMachineStatus: READY",
        _ => "",
    };
    Some(reply(line, body))
}

/// Serve one connection, answering each line with `answer(line)`.
/// `None` closes the connection. Returns the lines received.
fn serve_lines<F>(listener: TcpListener, answer: F) -> JoinHandle<Vec<String>>
where
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut reader = BufReader::new(socket);
        let mut received = Vec::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            let response = answer(&line);
            received.push(line);

            match response {
                Some(text) => {
                    if reader.get_mut().write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }

        received
    })
}

/// Serve one upload. Packets following `M28` are collected raw.
/// Closes the connection on the first line starting with `close_on`.
fn serve_upload(listener: TcpListener, close_on: Option<&'static str>) -> JoinHandle<(Vec<String>, Vec<u8>)> {
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut reader = BufReader::new(socket);
        let mut lines = Vec::new();
        let mut packets = Vec::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            lines.push(line.clone());

            if close_on.is_some_and(|prefix| line.starts_with(prefix)) {
                break;
            }
            if reader.get_mut().write_all(reply(&line, "").as_bytes()).await.is_err() {
                break;
            }

            if let Some(declared) = line.strip_prefix("~M28 ") {
                let size: usize = declared.split_whitespace().next().unwrap().parse().unwrap();
                let mut raw = vec![0u8; size.div_ceil(CHUNK_SIZE) * (PACKET_HEADER_SIZE + CHUNK_SIZE)];
                reader.read_exact(&mut raw).await.expect("read packets");
                packets.extend_from_slice(&raw);
            }
        }

        (lines, packets)
    })
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn temperature_query_handshakes_first() {
    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);

    let temps = fast_client().get_temperature(&addr).await.expect("temperature");
    assert_eq!(temps.get_str("current_temperature"), Some("210"));
    assert_eq!(temps.get_str("target_temperature"), Some("215"));
    assert_eq!(temps.get_str("bed_current_temperature"), Some("60"));
    assert_eq!(temps.get_str("bed_target_temperature"), Some("65"));

    let lines = server.await.unwrap();
    assert_eq!(lines, vec!["~M601 S1", "~M105"]);
}

#[tokio::test]
async fn info_position_progress_status() {
    let client = fast_client();

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    let info = client.get_info(&addr).await.unwrap();
    assert_eq!(info.get_str("Machine Type"), Some("Flashforge Finder"));
    assert_eq!(info.get_str("Firmware"), Some("V1.5 20170419"));
    server.await.unwrap();

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    let pos = client.get_position(&addr).await.unwrap();
    assert_eq!(pos.get_str("x"), Some("-19.19"));
    assert_eq!(pos.get_str("z"), Some("7.3"));
    server.await.unwrap();

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    let progress = client.get_progress(&addr).await.unwrap();
    assert_eq!(progress.get("current_byte"), Some(&FieldValue::Integer(1234)));
    assert_eq!(progress.get("total_bytes"), Some(&FieldValue::Integer(5678)));
    assert!(progress.contains_key("percentage"));
    server.await.unwrap();

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    let status = client.get_status(&addr).await.unwrap();
    assert_eq!(status.get_str("x_min"), Some("TRIGGERED"));
    assert!(status.get_str("raw_response").unwrap().contains("MachineStatus: READY"));
    server.await.unwrap();
}

#[tokio::test]
async fn home_axis_is_uppercased() {
    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);

    let ack = fast_client().home(&addr, Some("x")).await.unwrap();
    assert_eq!(ack.command, "G28 X");
    assert!(ack.response.contains("ok"));

    assert_eq!(server.await.unwrap(), vec!["~M601 S1", "~G28 X"]);
}

#[tokio::test]
async fn action_commands_send_catalog_text() {
    let client = fast_client();

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    client.move_axis(&addr, Some(10.0), None, Some(2.5), None).await.unwrap();
    assert_eq!(server.await.unwrap()[1], "~G1 X10 Z2.5 F3000");

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    client.set_led(&addr, Some(255), None, Some(64)).await.unwrap();
    assert_eq!(server.await.unwrap()[1], "~M146 r255 g0 b64 f0");

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    client.pause(&addr).await.unwrap();
    assert_eq!(server.await.unwrap()[1], "~M25");

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    client.resume(&addr).await.unwrap();
    assert_eq!(server.await.unwrap()[1], "~M24");

    let (listener, addr) = bind().await;
    let server = serve_lines(listener, finder_replies);
    client.stop(&addr).await.unwrap();
    assert_eq!(server.await.unwrap()[1], "~M26");
}

#[tokio::test]
async fn peer_close_ends_command_response() {
    let (listener, addr) = bind().await;
    // Answer the handshake, then send counters without a trailing ok and hang up
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        reader.get_mut().write_all(b"Control Success.\r\nok\r\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        reader.get_mut().write_all(b"SD printing byte 10/40\r\n").await.unwrap();
    });

    let progress = fast_client().get_progress(&addr).await.expect("closed peer is end of response");
    assert_eq!(progress.get("percentage"), Some(&FieldValue::Float(25.0)));
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_timeout_is_transport_error_and_closes_socket() {
    let (listener, addr) = bind().await;
    // Never answers; reports whether the client hung up
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
    });

    let client = PrinterClient::new().with_command_timeout(Duration::from_millis(300));
    let start = Instant::now();
    let err = client.get_info(&addr).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(matches!(
        err,
        PrinterError::Transport {
            cause: TransportCause::ReadTimeout(_),
            ..
        }
    ));
    assert_eq!(err.address(), &addr);
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");

    let closed = timeout(Duration::from_secs(2), server)
        .await
        .expect("socket left open")
        .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn close_before_handshake_ok_is_protocol_error() {
    let (listener, addr) = bind().await;
    let server = serve_lines(listener, |_| None);

    let err = fast_client().get_temperature(&addr).await.unwrap_err();
    assert!(matches!(err, PrinterError::Protocol { .. }), "unexpected error: {err}");
    assert_eq!(server.await.unwrap(), vec!["~M601 S1"]);
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let (listener, addr) = bind().await;
    drop(listener);

    let err = fast_client().stop(&addr).await.unwrap_err();
    assert!(matches!(
        err,
        PrinterError::Transport {
            cause: TransportCause::Connect(_),
            ..
        }
    ));
    assert_eq!(err.operation().as_str(), "stop");
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_streams_framed_packets() {
    let (listener, addr) = bind().await;
    let server = serve_upload(listener, None);

    let content: Vec<u8> = (0..(CHUNK_SIZE * 2 + 10)).map(|i| (i % 253) as u8).collect();
    let summary = fast_client()
        .upload_file(&addr, "part.gx", &content)
        .await
        .expect("upload");

    assert_eq!(summary.filename, "part.gx");
    assert_eq!(summary.remote_path, "0:/user/part.gx");
    assert_eq!(summary.bytes, content.len());
    assert_eq!(summary.packets, 3);
    assert_eq!(summary.message, "File part.gx uploaded successfully");

    let (lines, raw) = server.await.unwrap();
    assert_eq!(
        lines,
        vec![
            "~M601 S1".to_string(),
            "~M650".to_string(),
            format!("~M28 {} 0:/user/part.gx", content.len()),
            "~M29".to_string(),
        ]
    );

    let mut remaining = content.len();
    let mut rebuilt = Vec::new();
    for (i, packet) in raw.chunks(PACKET_HEADER_SIZE + CHUNK_SIZE).enumerate() {
        assert_eq!(&packet[0..4], &PACKET_MAGIC);
        assert_eq!(be_u32(&packet[4..8]), i as u32);
        assert_eq!(be_u32(&packet[8..12]), CHUNK_SIZE as u32);

        let real_len = remaining.min(CHUNK_SIZE);
        let data = &packet[PACKET_HEADER_SIZE..];
        assert_eq!(be_u32(&packet[12..16]), crc32fast::hash(&data[..real_len]));
        assert!(data[real_len..].iter().all(|&b| b == 0));

        rebuilt.extend_from_slice(&data[..real_len]);
        remaining -= real_len;
    }
    assert_eq!(rebuilt, content);
}

#[tokio::test]
async fn upload_empty_file_sends_no_packets() {
    let (listener, addr) = bind().await;
    let server = serve_upload(listener, None);

    let summary = fast_client().upload_file(&addr, "empty.gx", &[]).await.unwrap();
    assert_eq!(summary.packets, 0);

    let (lines, raw) = server.await.unwrap();
    assert_eq!(lines, vec!["~M601 S1", "~M650", "~M28 0 0:/user/empty.gx", "~M29"]);
    assert!(raw.is_empty());
}

#[tokio::test]
async fn long_filename_rejected_before_connecting() {
    let (listener, addr) = bind().await;

    let name = "a".repeat(37);
    let err = fast_client().upload_file(&addr, &name, b"G28\n").await.unwrap_err();
    assert!(matches!(err, PrinterError::Validation { .. }), "unexpected error: {err}");

    let accepted = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "client connected despite invalid filename");
}

#[tokio::test]
async fn filename_with_line_break_rejected_before_connecting() {
    let (listener, addr) = bind().await;

    let err = fast_client()
        .upload_file(&addr, "cube.gx\r\n~M26", b"G28\n")
        .await
        .unwrap_err();
    assert!(matches!(err, PrinterError::Validation { .. }), "unexpected error: {err}");

    let accepted = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "client connected despite invalid filename");
}

#[tokio::test]
async fn home_axis_with_line_break_rejected_before_connecting() {
    let (listener, addr) = bind().await;

    let err = fast_client().home(&addr, Some("x\r\n~M26")).await.unwrap_err();
    assert!(matches!(err, PrinterError::Validation { .. }), "unexpected error: {err}");

    let accepted = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "client connected despite invalid axis");
}

#[tokio::test]
async fn filename_of_36_bytes_is_accepted() {
    let (listener, addr) = bind().await;
    let server = serve_upload(listener, None);

    let name = "b".repeat(33) + ".gx";
    fast_client().upload_file(&addr, &name, b"G28\n").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn upload_failure_reports_step() {
    let (listener, addr) = bind().await;
    let server = serve_upload(listener, Some("~M28"));

    let err = fast_client()
        .upload_file(&addr, "part.gx", &[1u8; 100])
        .await
        .unwrap_err();

    match err {
        PrinterError::Upload {
            step, source, filename, ..
        } => {
            assert_eq!(step, UploadStep::Declare);
            assert_eq!(filename, "part.gx");
            assert!(matches!(*source, PrinterError::Protocol { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn upload_timeout_wraps_transport_error() {
    let (listener, addr) = bind().await;
    // Acknowledge the handshake only
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        reader.get_mut().write_all(b"ok\r\n").await.unwrap();
        let mut rest = Vec::new();
        let _ = reader.read_to_end(&mut rest).await;
    });

    let client = PrinterClient::new().with_upload_timeout(Duration::from_millis(300));
    let err = client.upload_file(&addr, "part.gx", b"G28\n").await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(
        err,
        PrinterError::Upload {
            step: UploadStep::Announce,
            ..
        }
    ));
    timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
}

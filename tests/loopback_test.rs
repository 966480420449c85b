//! End-to-end loopback tests: client and transport against a real UDP
//! socket standing in for the command station.

use railpoint::io::{RetryPolicy, UdpTransport};
use railpoint::protocol::command;
use railpoint::services::CommandStationClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn station_socket() -> (UdpSocket, std::net::SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

#[tokio::test]
async fn test_connect_performs_startup_handshake_over_the_wire() {
    let (station, addr) = station_socket().await;

    let transport = Arc::new(UdpTransport::new(RetryPolicy::default()));
    let client = CommandStationClient::with_settings(transport, Duration::ZERO, Duration::ZERO);
    client.connect(addr).await.unwrap();

    let mut buf = [0u8; 64];
    let (len, _) =
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..len], command::handshake().as_slice());

    let (len, _) =
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..len], command::broadcast_flags_basic().as_slice());

    client.disconnect().await;
}

#[tokio::test]
async fn test_feedback_frame_round_trips_from_wire_to_typed_event() {
    let (station, addr) = station_socket().await;

    let transport = Arc::new(UdpTransport::new(RetryPolicy::default()));
    let client = CommandStationClient::with_settings(transport, Duration::ZERO, Duration::ZERO);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.feedback().subscribe(move |event: &railpoint::domain::types::FeedbackEvent| {
        let _ = tx.send((event.channel, event.occupied()));
    });

    client.connect(addr).await.unwrap();

    // Drain the startup frames to learn the client's address.
    let mut buf = [0u8; 64];
    let (_, client_addr) =
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();

    station.send_to(&[0x04, 0x00, 0xF0, 0xA1, 0x05, 0x03], client_addr).await.unwrap();

    let (channel, occupied) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(channel, 5);
    assert!(occupied);

    client.disconnect().await;
}

#[tokio::test]
async fn test_turnout_command_arrives_with_valid_checksum() {
    let (station, addr) = station_socket().await;

    let transport = Arc::new(UdpTransport::new(RetryPolicy::default()));
    let client = CommandStationClient::with_settings(transport, Duration::ZERO, Duration::ZERO);
    client.connect(addr).await.unwrap();

    // Skip the five startup frames.
    let mut buf = [0u8; 64];
    for _ in 0..5 {
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    }

    client.set_turnout(201, 0, true, false).await.unwrap();

    let (len, _) =
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    let frame = &buf[..len];

    assert_eq!(frame.len(), 9);
    assert_eq!(frame[4], 0x53);
    // Wire address is the decoder address minus one.
    assert_eq!(u16::from_be_bytes([frame[5], frame[6]]), 200);
    // Checksum recomputes from the frame's own bytes.
    assert_eq!(frame[8], frame[4] ^ frame[5] ^ frame[6] ^ frame[7]);

    client.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_emits_logoff_and_releases_socket() {
    let (station, addr) = station_socket().await;

    let transport = Arc::new(UdpTransport::new(RetryPolicy::default()));
    let client = CommandStationClient::with_settings(transport, Duration::ZERO, Duration::ZERO);
    client.connect(addr).await.unwrap();
    assert!(client.is_connected());

    let mut buf = [0u8; 64];
    for _ in 0..5 {
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    }

    client.disconnect().await;
    assert!(!client.is_connected());

    let (len, _) =
        timeout(Duration::from_secs(2), station.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..len], command::logoff().as_slice());
}

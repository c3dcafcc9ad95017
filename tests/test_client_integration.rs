//! Integration tests for the TCP client against an in-process endpoint
//!
//! Every test runs the real supervisor over loopback TCP. Timers are kept
//! short so the reconnect paths finish quickly.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use vmix_tcp::testing::{EventRecorder, MockEndpoint, MockPeer};
use vmix_tcp::{
    listener, ClientError, ConnectionOptions, ConnectionState, Event, EventKind, FunctionCommand,
    TcpClient,
};

const HOST: &str = "127.0.0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const RECONNECT_INTERVAL: Duration = Duration::from_millis(300);

fn options(port: u32) -> ConnectionOptions {
    ConnectionOptions::default()
        .with_port(port)
        .with_timing(CONNECT_TIMEOUT, RECONNECT_INTERVAL)
}

/// Client connected to a fresh endpoint, with a recorder on `kinds`
async fn connected(kinds: &[EventKind]) -> (MockEndpoint, TcpClient, MockPeer, EventRecorder) {
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(HOST, options(endpoint.port())).unwrap();
    let mut ready = EventRecorder::attach(&client, &[EventKind::Ready]);
    let recorder = EventRecorder::attach(&client, kinds);

    let peer = endpoint.accept().await.unwrap();
    ready.wait_for(EventKind::Ready).await.unwrap();
    ready.detach(&client);

    (endpoint, client, peer, recorder)
}

#[tokio::test]
async fn test_connect_emits_lifecycle_events_in_order() {
    // Arrange
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(HOST, options(endpoint.port())).unwrap();
    let mut recorder = EventRecorder::attach_all(&client);

    // Act
    let _peer = endpoint.accept().await.unwrap();
    recorder.wait_for(EventKind::Ready).await.unwrap();

    // Assert
    assert_eq!(
        recorder.kinds(),
        vec![
            EventKind::Connecting,
            EventKind::Lookup,
            EventKind::Connect,
            EventKind::Ready
        ]
    );
    assert_eq!(
        recorder.events()[1],
        Event::Lookup {
            address: HOST.to_string()
        }
    );
    assert!(client.connected());
    assert!(!client.connecting());
    let socket = client.socket().expect("socket info while connected");
    assert_eq!(socket.peer_addr, endpoint.address());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tally_without_subscriber_reaches_data_unmodified() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Data]).await;

    peer.write_line("TALLY OK 10000000").await.unwrap();

    assert_eq!(
        recorder.next().await.unwrap(),
        Event::Data("TALLY OK 10000000".to_string())
    );
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tally_subscriber_receives_summary() {
    let (_endpoint, client, mut peer, mut recorder) =
        connected(&[EventKind::Tally, EventKind::Data]).await;

    peer.write_line("TALLY OK 10000000").await.unwrap();

    let Event::Tally(summary) = recorder.next().await.unwrap() else {
        panic!("expected a tally event");
    };
    assert_eq!(summary.program, vec![1]);
    assert!(summary.preview.is_empty());
    assert_eq!(summary.inputs.len(), 8);
    assert_eq!(recorder.count(EventKind::Data), 0);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_tally_is_reported_and_framing_continues() {
    let (_endpoint, client, mut peer, mut recorder) =
        connected(&[EventKind::Tally, EventKind::Error]).await;

    peer.write(b"TALLY OK 1x0\r\nTALLY OK 012\r\n").await.unwrap();

    assert!(matches!(recorder.next().await.unwrap(), Event::Error(_)));
    let Event::Tally(summary) = recorder.next().await.unwrap() else {
        panic!("expected a tally event after the error");
    };
    assert_eq!(summary.program, vec![2]);
    assert_eq!(summary.preview, vec![3]);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_error_status_goes_to_data_despite_specialized_listeners() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[
        EventKind::Data,
        EventKind::Tally,
        EventKind::Activators,
    ])
    .await;

    peer.write_line("ADD ER invalid input").await.unwrap();
    peer.write_line("ACTS OK Input 1 1").await.unwrap();

    assert_eq!(
        recorder.next().await.unwrap(),
        Event::Data("ADD ER invalid input".to_string())
    );
    assert_eq!(
        recorder.next().await.unwrap(),
        Event::Activators("ACTS OK Input 1 1".to_string())
    );
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_xml_split_across_reads_is_reassembled() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Xml]).await;

    peer.write(b"XML 25\r\n<vmix><ver").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    peer.write(b"sion/></vmix>\r\n").await.unwrap();

    assert_eq!(
        recorder.next().await.unwrap(),
        Event::Xml("<vmix><version/></vmix>".to_string())
    );
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unclaimed_xml_falls_back_to_data() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Data]).await;

    peer.write_xml("<vmix><inputs/></vmix>").await.unwrap();

    assert_eq!(
        recorder.next().await.unwrap(),
        Event::Data("<vmix><inputs/></vmix>".to_string())
    );
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_burst_is_dispatched_in_order() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Data]).await;

    peer.write(b"\r\nFUNCTION OK Completed\r\nVERSION OK 27.0.0.49\r\nSUBSCRIBE OK TALLY\r\n")
        .await
        .unwrap();

    let mut lines = Vec::new();
    for _ in 0..3 {
        if let Event::Data(line) = recorder.next().await.unwrap() {
            lines.push(line);
        }
    }
    assert_eq!(
        lines,
        vec![
            "FUNCTION OK Completed",
            "VERSION OK 27.0.0.49",
            "SUBSCRIBE OK TALLY"
        ]
    );
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_writes_serialized_lines_in_order() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Drain]).await;

    client.send(["tally", "xmltext vmix/version"]).unwrap();
    client
        .send(
            FunctionCommand::new("SetText")
                .param("Input", "MyTitle")
                .param("SelectedName", "TitleField")
                .param("Value", "Updated text!"),
        )
        .unwrap();

    assert_eq!(peer.read_line().await.unwrap().as_deref(), Some("TALLY"));
    assert_eq!(
        peer.read_line().await.unwrap().as_deref(),
        Some("XMLTEXT vmix/version")
    );
    assert_eq!(
        peer.read_line().await.unwrap().as_deref(),
        Some("FUNCTION SetText Input=MyTitle&SelectedName=TitleField&Value=Updated%20text%21")
    );
    assert_eq!(recorder.wait_for(EventKind::Drain).await.unwrap(), Event::Drain);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_without_connection_fails() {
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(
        HOST,
        options(endpoint.port()).with_connect_on_startup(false),
    )
    .unwrap();

    let result = client.send("tally");

    assert!(matches!(
        result,
        Err(ClientError::NotConnected {
            state: ConnectionState::Disconnected
        })
    ));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_manual_connect_and_send_during_handshake() {
    // Arrange
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(
        HOST,
        options(endpoint.port()).with_connect_on_startup(false),
    )
    .unwrap();
    let mut recorder = EventRecorder::attach(&client, &[EventKind::Connecting]);

    // Act: send as soon as a transport exists, connected or not
    client.connect().unwrap();
    recorder.wait_for(EventKind::Connecting).await.unwrap();
    client.send("tally").unwrap();

    // Assert
    let mut peer = endpoint.accept().await.unwrap();
    assert_eq!(peer.read_line().await.unwrap().as_deref(), Some("TALLY"));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_on_data_option_is_registered() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(
        HOST,
        options(endpoint.port()).with_on_data(listener(move |event| {
            if let Some(text) = event.text() {
                sink.lock().unwrap().push(text.to_string());
            }
        })),
    )
    .unwrap();
    let mut recorder = EventRecorder::attach(&client, &[EventKind::Data]);

    let mut peer = endpoint.accept().await.unwrap();
    peer.write_line("VERSION OK 27.0.0.49").await.unwrap();
    recorder.wait_for(EventKind::Data).await.unwrap();

    assert_eq!(*received.lock().unwrap(), vec!["VERSION OK 27.0.0.49"]);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let (_endpoint, client, mut peer, mut recorder) = connected(&[EventKind::Data]).await;
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let handle = listener(move |_| *counter.lock().unwrap() += 1);

    client.on("Data", handle.clone()).unwrap();
    peer.write_line("FIRST OK").await.unwrap();
    recorder.next().await.unwrap();

    client.off("DATA", &handle).unwrap();
    peer.write_line("SECOND OK").await.unwrap();
    recorder.next().await.unwrap();

    assert_eq!(*calls.lock().unwrap(), 1);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_peer_drops() {
    // Arrange
    let (endpoint, client, peer, mut recorder) =
        connected(&[EventKind::End, EventKind::Close, EventKind::Connecting, EventKind::Ready])
            .await;

    // Act
    drop(peer);
    recorder.wait_for(EventKind::End).await.unwrap();
    let close = recorder.wait_for(EventKind::Close).await.unwrap();

    // Assert: retrying, then a fresh connection on the next tick
    assert_eq!(close, Event::Close { had_error: false });
    assert!(!client.connected());

    let _peer = endpoint.accept().await.unwrap();
    recorder.wait_for(EventKind::Ready).await.unwrap();
    assert!(client.connected());
    assert_eq!(recorder.count(EventKind::Connecting), 2);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refused_connection_retries_until_shutdown() {
    // Arrange: a port nobody listens on
    let port = {
        let endpoint = MockEndpoint::bind().await.unwrap();
        endpoint.port()
    };
    let client = TcpClient::new(HOST, options(port)).unwrap();
    let mut recorder = EventRecorder::attach_all(&client);

    // Act
    let close = recorder.wait_for(EventKind::Close).await.unwrap();
    recorder.wait_for(EventKind::Connecting).await.unwrap();
    recorder.wait_for(EventKind::Close).await.unwrap();

    // Assert
    assert_eq!(close, Event::Close { had_error: true });
    assert!(recorder.count(EventKind::Error) >= 2);
    assert_eq!(recorder.count(EventKind::Connect), 0);

    client.shutdown().await.unwrap();
    let attempts = recorder.count(EventKind::Connecting);
    sleep(RECONNECT_INTERVAL * 3).await;
    assert_eq!(recorder.count(EventKind::Connecting), attempts);
    assert_eq!(client.state(), ConnectionState::Shutdown);
}

#[tokio::test]
async fn test_no_reconnect_when_disabled() {
    let endpoint = MockEndpoint::bind().await.unwrap();
    let client = TcpClient::new(
        HOST,
        options(endpoint.port()).with_auto_reconnect(false),
    )
    .unwrap();
    let mut recorder = EventRecorder::attach_all(&client);

    let peer = endpoint.accept().await.unwrap();
    recorder.wait_for(EventKind::Ready).await.unwrap();
    drop(peer);
    recorder.wait_for(EventKind::Close).await.unwrap();
    sleep(RECONNECT_INTERVAL * 3).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.count(EventKind::Connecting), 1);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_sends_quit_and_is_idempotent() {
    // Arrange
    let (_endpoint, client, mut peer, recorder) =
        connected(&[EventKind::Close, EventKind::Disconnect, EventKind::Connecting]).await;

    // Act
    client.shutdown().await.unwrap();
    client.shutdown().await.unwrap();

    // Assert
    assert_eq!(peer.read_line().await.unwrap().as_deref(), Some("QUIT"));
    assert_eq!(peer.read_line().await.unwrap(), None);
    assert_eq!(
        recorder.kinds(),
        vec![
            EventKind::Connecting,
            EventKind::Close,
            EventKind::Disconnect
        ]
    );
    assert_eq!(client.state(), ConnectionState::Shutdown);
    assert!(client.socket().is_none());

    sleep(RECONNECT_INTERVAL * 2).await;
    assert_eq!(recorder.count(EventKind::Connecting), 1);
    assert!(client.send("tally").is_err());
}

#[tokio::test]
async fn test_invalid_arguments_fail_fast() {
    assert!(matches!(
        TcpClient::new("ab", ConnectionOptions::default()),
        Err(ClientError::InvalidHost { .. })
    ));
    assert!(matches!(
        TcpClient::new(HOST, ConnectionOptions::default().with_port(100_000)),
        Err(ClientError::InvalidPort { port: 100_000 })
    ));

    let client = TcpClient::new(
        HOST,
        ConnectionOptions::default().with_connect_on_startup(false),
    )
    .unwrap();
    let error = client.on("acts", listener(|_| {})).unwrap_err();
    assert_eq!(error.to_string(), "Invalid type of listener: 'acts'");
    client.shutdown().await.unwrap();
}

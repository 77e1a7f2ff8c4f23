use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use felicity_bridge::error::Error;
use felicity_bridge::felicity::{Client, Command};

/// Serves one canned response per accepted connection, in order, checking
/// that each request is a monitor command. An empty response means "accept,
/// read, close without writing".
async fn spawn_device(responses: Vec<Vec<u8>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(
                request.starts_with("wifilocalMonitor:"),
                "unexpected request: {:?}",
                request
            );
            if !response.is_empty() {
                socket.write_all(&response).await.unwrap();
            }
        }
    });

    port
}

fn client(port: u16) -> Client {
    Client::new(
        "127.0.0.1",
        port,
        Duration::from_secs(1),
        Duration::from_millis(500),
    )
}

#[tokio::test]
async fn send_and_receive_decodes_leniently() {
    let port = spawn_device(vec![b"  {'Batsoc':[[8400,0,0]]}\xff\xfe\r\n".to_vec()]).await;

    let text = client(port)
        .send_and_receive(Command::RealInfo)
        .await
        .unwrap();
    assert_eq!(text, "{'Batsoc':[[8400,0,0]]}");
}

#[tokio::test]
async fn response_split_across_writes_is_reassembled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        socket.read(&mut buf).await.unwrap();
        socket.write_all(b"{'Batt':[[52100],").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        socket.write_all(b"[-112]]}").await.unwrap();
    });

    let text = client(port)
        .send_and_receive(Command::RealInfo)
        .await
        .unwrap();
    assert_eq!(text, "{'Batt':[[52100],[-112]]}");
}

#[tokio::test]
async fn zero_bytes_is_an_empty_response_error() {
    let port = spawn_device(vec![Vec::new()]).await;

    match client(port).send_and_receive(Command::RealInfo).await {
        Err(Error::EmptyResponse { command, .. }) => assert_eq!(command, "real-info"),
        other => panic!("expected EmptyResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn silent_device_is_a_timeout_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        socket.read(&mut buf).await.unwrap();
        // hold the connection open without ever answering
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    match client(port).send_and_receive(Command::RealInfo).await {
        Err(Error::Timeout { command, .. }) => assert_eq!(command, "real-info"),
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    match client(port).send_and_receive(Command::RealInfo).await {
        Err(Error::Connect { .. }) => {}
        other => panic!("expected Connect, got {:?}", other),
    }
}

#[tokio::test]
async fn fetch_assembles_all_three_sections() {
    let port = spawn_device(vec![
        b"{'Batt':[[52100],[-112],[-604,-480]],'Batsoc':[[8400,0,0]],'DevSN':'F21001'}".to_vec(),
        b"{'SoftVer':'V1.2','DevType':'FLA48200'}".to_vec(),
        b"{'cVolHi':3650}{'cVolLo':2800}".to_vec(),
    ])
    .await;

    let snapshot = client(port).fetch().await.unwrap();
    assert!(snapshot.diagnostics().is_empty());
    assert_eq!(snapshot.nested_int("Batt", &[0, 0]), Some(52100));
    assert_eq!(snapshot.serial().as_deref(), Some("F21001"));
    assert_eq!(snapshot.basic().unwrap()["DevType"], "FLA48200");

    let settings = snapshot.settings().unwrap();
    assert_eq!(settings["cVolHi"], 3650);
    assert_eq!(settings["cVolLo"], 2800);
}

#[tokio::test]
async fn basic_and_settings_failures_degrade_to_diagnostics() {
    let port = spawn_device(vec![
        b"{'Batsoc':[[8400,0,0]]}".to_vec(),
        b"not json at all".to_vec(),
        b"also garbage".to_vec(),
    ])
    .await;

    let snapshot = client(port).fetch().await.unwrap();
    assert_eq!(snapshot.nested_int("Batsoc", &[0, 0]), Some(8400));
    assert!(snapshot.basic().is_none());
    assert!(snapshot.settings().is_none());
    assert_eq!(snapshot.diagnostics().len(), 2);
    assert_eq!(snapshot.diagnostics()[0].section, "basic-info");
    assert_eq!(snapshot.diagnostics()[1].section, "set-info");
}

#[tokio::test]
async fn real_info_without_essentials_fails_the_poll() {
    let port = spawn_device(vec![b"{'foo': 1}".to_vec()]).await;

    match client(port).fetch().await {
        Err(Error::EssentialFieldsMissing { raw }) => assert!(raw.contains("foo")),
        other => panic!("expected EssentialFieldsMissing, got {:?}", other),
    }
}

use std::time::Duration;

use anyhow::Result;
use bytes::BytesMut;
use nsca_server_sdk::{
    Client, ClientOptions, Error,
    codec::{
        InitPacket, ReportPacket, State,
        crypto::{Cipher, Method},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::sleep,
};

async fn send_init(stream: &mut TcpStream, iv: [u8; 128], timestamp: u32) -> Result<()> {
    let mut bytes = BytesMut::with_capacity(InitPacket::SIZE);
    InitPacket { iv, timestamp }.encode(&mut bytes);

    stream.write_all(&bytes).await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buffer = vec![0; ReportPacket::SIZE];
    stream.read_exact(&mut buffer).await?;
    Ok(buffer)
}

fn options(port: u16) -> ClientOptions {
    ClientOptions {
        host: "127.0.0.1".to_string(),
        port,
        ..ClientOptions::default()
    }
}

fn decrypt(frame: &[u8], iv: [u8; 128]) -> ReportPacket {
    let mut cipher = Cipher::new(Method::Blowfish, b"hunter2", &iv, &mut rand::rng());

    let mut buffer = frame.to_vec();
    cipher.decrypt(&mut buffer);

    ReportPacket::decode(&buffer).unwrap()
}

#[tokio::test]
async fn test_plaintext_host_report() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let (sender, mut receiver) = mpsc::channel(1);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        send_init(&mut stream, [0; 128], 1_600_000_000).await.unwrap();
        sender
            .send(read_frame(&mut stream).await.unwrap())
            .await
            .unwrap();
    });

    let mut client = Client::new(options(port));
    client.connect().await?;
    client.send_report("web01", None, State::Ok, "up").await?;

    let frame = receiver.recv().await.expect("no frame received");
    assert_eq!(frame.len(), ReportPacket::SIZE);

    let report = ReportPacket::decode(&frame)?;
    assert_eq!(report.hostname, "web01");
    assert_eq!(report.service, "");
    assert_eq!(report.state, State::Ok);
    assert_eq!(report.message, "up");
    assert_eq!(report.timestamp, 1_600_000_000);

    client.disconnect(true).await;
    Ok(())
}

#[tokio::test]
async fn test_service_report_state_on_the_wire() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let (sender, mut receiver) = mpsc::channel(1);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        send_init(&mut stream, [0; 128], 1_600_000_000).await.unwrap();
        sender
            .send(read_frame(&mut stream).await.unwrap())
            .await
            .unwrap();
    });

    let mut client = Client::new(options(port));
    client.connect().await?;
    client
        .send_report("web01", Some("nginx"), State::Warning, "slow")
        .await?;

    let frame = receiver.recv().await.expect("no frame received");
    assert_eq!(&frame[12..14], &[0x00, 0x01]);

    let report = ReportPacket::decode(&frame)?;
    assert_eq!(report.service, "nginx");
    assert_eq!(report.state, State::Warning);

    Ok(())
}

#[tokio::test]
async fn test_reconnects_and_rekeys_after_reset() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let (sender, mut receiver) = mpsc::channel(4);
    tokio::spawn(async move {
        // The first connection resets right after one report.
        let (mut stream, _) = listener.accept().await.unwrap();
        send_init(&mut stream, [1; 128], 100).await.unwrap();
        sender
            .send((1, read_frame(&mut stream).await.unwrap()))
            .await
            .unwrap();

        stream.set_linger(Some(Duration::ZERO)).unwrap();
        drop(stream);

        // The client is expected back for a fresh handshake.
        let (mut stream, _) = listener.accept().await.unwrap();
        send_init(&mut stream, [2; 128], 200).await.unwrap();
        sender
            .send((2, read_frame(&mut stream).await.unwrap()))
            .await
            .unwrap();
    });

    let mut client = Client::new(ClientOptions {
        encryption_method: Method::Blowfish,
        password: "hunter2".to_string(),
        ..options(port)
    });

    client.connect().await?;
    client.send_report("web01", None, State::Ok, "first").await?;

    let (connection, frame) = receiver.recv().await.expect("no frame received");
    assert_eq!(connection, 1);
    assert_eq!(decrypt(&frame, [1; 128]).message, "first");

    // Let the RST land so the next write observes it.
    sleep(Duration::from_millis(200)).await;

    client
        .send_report("web01", None, State::Ok, "second")
        .await?;

    let (connection, frame) = receiver.recv().await.expect("no frame received");
    assert_eq!(connection, 2);

    // The retransmission rides a fresh cipher and echoes the fresh session
    // timestamp.
    let report = decrypt(&frame, [2; 128]);
    assert_eq!(report.message, "second");
    assert_eq!(report.timestamp, 200);

    Ok(())
}

#[tokio::test]
async fn test_send_failed_after_retry_exhaustion() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let mut client = Client::new(options(port));

    let accept = async {
        let (mut stream, _) = listener.accept().await.unwrap();
        send_init(&mut stream, [0; 128], 100).await.unwrap();
        stream
    };

    let (connected, stream) = tokio::join!(client.connect(), accept);
    connected?;

    // Reset the live connection and unbind the listener so every reconnect
    // attempt is refused.
    stream.set_linger(Some(Duration::ZERO))?;
    drop(stream);
    drop(listener);
    sleep(Duration::from_millis(200)).await;

    let result = client
        .send_report_with_retries("web01", None, State::Ok, "up", 3)
        .await;

    assert!(matches!(
        result,
        Err(Error::SendFailed { attempts: 3, .. })
    ));

    Ok(())
}

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::SystemTime,
};

use bytes::BytesMut;
use codec::{
    InitPacket, ReportPacket,
    crypto::{Cipher, Method},
};
use rand::Rng;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{
        mpsc::{Receiver, Sender, channel, error::TrySendError},
        watch,
    },
    task::{JoinHandle, JoinSet},
};

use crate::{
    config::DEFAULT_PORT,
    statistics::{Statistics, Stats},
};

pub struct ServerOptions {
    pub bind: SocketAddr,
    pub password: String,
    pub encryption_method: Method,
    pub max_queue_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            password: String::new(),
            encryption_method: Method::Plaintext,
            max_queue_size: 1024,
        }
    }
}

struct Listener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Accepts NSCA client connections and yields the reports they deliver.
///
/// Every accepted connection gets its own timestamp, IV and cipher; its
/// handler feeds decoded reports into one shared bounded queue drained
/// through [`Server::recv`].
pub struct Server {
    options: Arc<ServerOptions>,
    statistics: Statistics,
    sender: Sender<ReportPacket>,
    receiver: Receiver<ReportPacket>,
    listener: Option<Listener>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        let (sender, receiver) = channel(options.max_queue_size);

        Self {
            options: Arc::new(options),
            statistics: Statistics::default(),
            sender,
            receiver,
            listener: None,
        }
    }

    /// Binds the listener and starts accepting connections. Starting an
    /// already running server is a no-op.
    pub async fn start(&mut self) -> io::Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.options.bind).await?;
        let local_addr = listener.local_addr()?;
        log::info!("nsca server listening: addr={local_addr}");

        let (shutdown, signal) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(
            listener,
            self.options.clone(),
            self.sender.clone(),
            self.statistics.clone(),
            signal,
        ));

        self.listener = Some(Listener {
            local_addr,
            shutdown,
            handle,
        });

        Ok(())
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|listener| listener.local_addr)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// The next decoded report.
    ///
    /// Reports from one connection arrive in the order they were received;
    /// across connections the order reflects interleaving on the queue.
    pub async fn recv(&mut self) -> Option<ReportPacket> {
        self.receiver.recv().await
    }

    /// Closes the listener and waits for in-flight connections to drain
    /// naturally. Stopping a stopped server is a no-op.
    pub async fn stop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        let _ = listener.shutdown.send(true);
        let _ = listener.handle.await;
        log::info!("nsca server stopped: addr={}", listener.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    options: Arc<ServerOptions>,
    sender: Sender<ReportPacket>,
    statistics: Statistics,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    log::info!("connection accepted: addr={addr}");
                    statistics.add(Stats::AcceptedConnection);

                    connections.spawn(handle_connection(
                        stream,
                        addr,
                        options.clone(),
                        sender.clone(),
                        statistics.clone(),
                    ));
                }
                Err(error) => {
                    log::warn!("listener accept failed: {error}");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    options: Arc<ServerOptions>,
    sender: Sender<ReportPacket>,
    statistics: Statistics,
) {
    let timestamp = epoch();

    let mut iv = [0; 128];
    rand::rng().fill(&mut iv[..]);

    let mut cipher = Cipher::new(
        options.encryption_method,
        options.password.as_bytes(),
        &iv,
        &mut rand::rng(),
    );

    let mut bytes = BytesMut::with_capacity(InitPacket::SIZE);
    InitPacket { iv, timestamp }.encode(&mut bytes);

    if let Err(error) = send_init(&mut stream, &bytes).await {
        log::warn!("failed to send init packet: addr={addr}, error={error}");
        return;
    }

    let mut frame = vec![0; ReportPacket::SIZE];
    for packet_num in 1.. {
        let size = match read_frame(&mut stream, &mut frame).await {
            Ok(size) => size,
            Err(error) => {
                log::warn!("connection read failed: addr={addr}, error={error}");
                break;
            }
        };

        match size {
            0 => {
                log::info!("connection closed: addr={addr}");
                break;
            }
            size if size < frame.len() => {
                log::warn!("incomplete report frame: addr={addr}, partial={size}");
                break;
            }
            _ => {}
        }

        cipher.decrypt(&mut frame);
        match ReportPacket::decode(&frame) {
            Ok(report) => {
                log::debug!("received report #{packet_num}: addr={addr}");
                enqueue(report, &sender, &statistics);
            }
            Err(error) => {
                // A CFB keystream cannot be resynchronized after a corrupt
                // frame; every later frame would decrypt to garbage. Drop
                // the connection and let the client handshake again.
                log::warn!("failed to decode report: addr={addr}, error={error}");
                statistics.add(Stats::ErrorPacket);
                break;
            }
        }
    }
}

async fn send_init(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Reads one fixed-size frame, returning the bytes actually read so the
/// caller can tell a clean close (0) from a truncated frame.
async fn read_frame(stream: &mut TcpStream, frame: &mut [u8]) -> io::Result<usize> {
    let mut offset = 0;

    while offset < frame.len() {
        let size = stream.read(&mut frame[offset..]).await?;
        if size == 0 {
            break;
        }

        offset += size;
    }

    Ok(offset)
}

fn enqueue(report: ReportPacket, sender: &Sender<ReportPacket>, statistics: &Statistics) {
    statistics.add(Stats::ReceivedReport);

    // Non-blocking enqueue: a consumer that cannot keep up costs dropped
    // reports, not stalled connection handlers.
    if let Err(TrySendError::Full(report)) = sender.try_send(report) {
        log::warn!(
            "report queue full, dropping report: host={:?}, service={:?}",
            report.hostname,
            report.service
        );
        statistics.add(Stats::DroppedReport);
    }
}

fn epoch() -> u32 {
    SystemTime::UNIX_EPOCH
        .elapsed()
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or_default()
}

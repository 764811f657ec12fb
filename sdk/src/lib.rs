//! # NSCA Client SDK
//!
//! A client for submitting passive host and service check results to an
//! NSCA monitoring host.
//!
//! Each connection starts with the server's init packet, whose IV and
//! timestamp key the session cipher; every report sent afterwards rides the
//! same keystream. A connection reset therefore invalidates the cipher along
//! with the socket, and [`Client::send_report`] recovers by redoing the full
//! handshake before retransmitting.
//!
//! ## Usage
//!
//! ```no_run
//! use nsca_server_sdk::{Client, ClientOptions, codec::State};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new(ClientOptions {
//!     host: "monitoring.example.org".to_string(),
//!     ..ClientOptions::default()
//! });
//!
//! client.connect().await?;
//!
//! // A report without a service is a check on the host itself.
//! client.send_report("web01", None, State::Ok, "up").await?;
//! client
//!     .send_report("web01", Some("nginx"), State::Warning, "slow")
//!     .await?;
//!
//! client.disconnect(true).await;
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use codec;

use std::io;

use bytes::BytesMut;
use codec::{
    InitPacket, ReportPacket, State,
    crypto::{Cipher, Method},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub const DEFAULT_PORT: u16 = 5667;
pub const DEFAULT_RETRIES: usize = 5;

#[derive(Debug)]
pub enum Error {
    Codec(codec::Error),
    Io(io::Error),
    InvalidConfig(String),
    SendFailed {
        host: String,
        port: u16,
        attempts: usize,
    },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        Self::Codec(value)
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Address of the NSCA host to send reports to.
    pub host: String,
    /// Port of the NSCA host.
    pub port: u16,
    /// Method used for encrypting reports.
    pub encryption_method: Method,
    /// Password used to key the report cipher.
    pub password: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            encryption_method: Method::Plaintext,
            password: String::new(),
        }
    }
}

struct Connection {
    stream: TcpStream,
    cipher: Cipher,
    timestamp: u32,
}

/// A client for sending NSCA reports.
pub struct Client {
    options: ClientOptions,
    connection: Option<Connection>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        if options.encryption_method != Method::Plaintext && options.password.is_empty() {
            log::warn!(
                "creating nsca client using encryption method {} with an empty password, is this intentional?",
                options.encryption_method
            );
        }

        log::debug!(
            "created nsca client: host={}:{}, encryption_method={}",
            options.host,
            options.port,
            options.encryption_method
        );

        Self {
            options,
            connection: None,
        }
    }

    /// Opens the TCP connection, consumes the init packet and keys the
    /// session cipher from the server-supplied IV.
    pub async fn connect(&mut self) -> Result<(), Error> {
        log::debug!(
            "connecting to {}:{}...",
            self.options.host,
            self.options.port
        );

        let mut stream =
            TcpStream::connect((self.options.host.as_str(), self.options.port)).await?;

        let mut buffer = [0; InitPacket::SIZE];
        stream.read_exact(&mut buffer).await?;

        let packet = InitPacket::decode(&buffer)?;
        log::debug!("received init packet: timestamp={}", packet.timestamp);

        self.connection = Some(Connection {
            cipher: Cipher::new(
                self.options.encryption_method,
                self.options.password.as_bytes(),
                &packet.iv,
                &mut rand::rng(),
            ),
            timestamp: packet.timestamp,
            stream,
        });

        Ok(())
    }

    /// Closes the connection, draining the send buffer first when asked to.
    /// Disconnecting an already closed client is a no-op, and peer errors
    /// while draining are swallowed.
    pub async fn disconnect(&mut self, flush: bool) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        log::debug!("disconnecting...");
        if flush {
            let _ = connection.stream.flush().await;
        }

        let _ = connection.stream.shutdown().await;
    }

    /// Sends a state report for the service `service` on host `host`, with
    /// the default retry bound.
    ///
    /// Passing `None` for `service` reports on the host itself.
    pub async fn send_report(
        &mut self,
        host: &str,
        service: Option<&str>,
        state: State,
        message: &str,
    ) -> Result<(), Error> {
        self.send_report_with_retries(host, service, state, message, DEFAULT_RETRIES)
            .await
    }

    /// Sends a state report, transparently reconnecting up to `retries`
    /// times when the connection is reset mid-send.
    ///
    /// The session keystream is consumed in wire order, so a reset can only
    /// be recovered by a fresh handshake: the connection is torn down, a new
    /// init packet keys a new cipher, and the report is retransmitted.
    /// Reconnect attempts that fail with a connection error consume a retry;
    /// any other failure is terminal.
    pub async fn send_report_with_retries(
        &mut self,
        host: &str,
        service: Option<&str>,
        state: State,
        message: &str,
        retries: usize,
    ) -> Result<(), Error> {
        // A report with an empty service name is interpreted as a host
        // report.
        let service = service.unwrap_or_default();

        log::debug!(
            "sending report: host={host:?}, service={service:?}, state={state:?}, message={message:?}"
        );

        for retry in 1..=retries {
            if self.connection.is_none() {
                match self.connect().await {
                    Ok(()) => {}
                    Err(error) if is_connection_error(&error) => {
                        log::warn!("failed to reconnect to nsca host ({retry}/{retries}): {error}");
                        continue;
                    }
                    Err(error) => return Err(error),
                }
            }

            match self.write_report(host, service, state, message).await {
                Ok(()) => return Ok(()),
                Err(error) if is_connection_reset(&error) => {
                    log::warn!(
                        "connection reset by nsca host, reconnecting ({retry}/{retries}): {error}"
                    );

                    self.disconnect(false).await;
                }
                Err(error) => return Err(error),
            }
        }

        Err(Error::SendFailed {
            host: self.options.host.clone(),
            port: self.options.port,
            attempts: retries,
        })
    }

    async fn write_report(
        &mut self,
        host: &str,
        service: &str,
        state: State,
        message: &str,
    ) -> Result<(), Error> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::Io(io::ErrorKind::NotConnected.into()));
        };

        let mut bytes = BytesMut::with_capacity(ReportPacket::SIZE);
        ReportPacket {
            hostname: host.to_string(),
            service: service.to_string(),
            state,
            message: message.to_string(),
            timestamp: connection.timestamp,
        }
        .encode(&mut rand::rng(), &mut bytes);

        connection.cipher.encrypt(&mut bytes);
        connection.stream.write_all(&bytes).await?;
        connection.stream.flush().await?;

        Ok(())
    }
}

// A peer that went away surfaces as either kind depending on whether the
// reset raced the local send buffer.
fn is_connection_reset(error: &Error) -> bool {
    matches!(
        error,
        Error::Io(e) if matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
        )
    )
}

fn is_connection_error(error: &Error) -> bool {
    matches!(
        error,
        Error::Io(e) if matches!(
            e.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
        )
    )
}

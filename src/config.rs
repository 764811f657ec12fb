use std::{
    net::{Ipv4Addr, SocketAddr},
    str::FromStr,
};

use clap::Parser;
use codec::crypto::Method;

pub const DEFAULT_PORT: u16 = 5667;

#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Config {
    /// Address and port the report listener binds.
    ///
    /// NSCA clients push passive check results to this endpoint. The
    /// default binds all interfaces on the well-known NSCA port.
    #[arg(long, default_value_t = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)))]
    pub listen: SocketAddr,

    /// Cipher protecting report frames.
    ///
    /// Accepts a method name (plaintext, blowfish) or a numeric NSCA
    /// method tag. Clients must be configured with the same method and
    /// password.
    #[arg(long, default_value = "plaintext")]
    pub encryption_method: Method,

    /// Password keying the report cipher.
    #[arg(long, env = "NSCA_HOST_PASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,

    /// Reports held for the consumer before new ones are dropped.
    #[arg(long, default_value_t = 1024)]
    pub max_queue_size: usize,

    /// Log verbosity.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

impl Config {
    /// Load configuration from command line parameters and the environment.
    pub fn load() -> Self {
        Self::parse()
    }
}

//! ## Nagios Service Check Acceptor (NSCA)
//!
//! NSCA is a push protocol for submitting passive host and service check
//! results to a monitoring host. A session is one TCP connection: the server
//! opens it by sending a single unencrypted init packet carrying a random
//! initialization vector and the session timestamp, after which the client
//! sends any number of fixed-size report packets, each encrypted with the
//! cipher keyed from the shared password and the init packet's IV.
//!
//! A report whose service field is empty is a host report and is interpreted
//! by the monitoring host as a check on the host itself rather than one of
//! its services.

pub mod crypto;

use std::{array::TryFromSliceError, str::Utf8Error};

use bytes::{BufMut, BytesMut};
use rand::Rng;

#[derive(Debug)]
pub enum Error {
    UnknownCipher(u8),
    ShortPacket { expected: usize, got: usize },
    UnexpectedVersion(u16),
    ChecksumMismatch { expected: u32, actual: u32 },
    InvalidState(u16),
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}

/// Service or host check outcome, with the numeric values fixed by Nagios.
///
/// Serialized as an unsigned 16-bit integer in network byte order.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl TryFrom<u16> for State {
    type Error = Error;

    /// # Test
    ///
    /// ```
    /// use nsca_server_codec::{Error, State};
    ///
    /// assert_eq!(State::try_from(2).unwrap(), State::Critical);
    /// assert!(matches!(State::try_from(9), Err(Error::InvalidState(9))));
    /// ```
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Ok,
            1 => Self::Warning,
            2 => Self::Critical,
            3 => Self::Unknown,
            _ => return Err(Error::InvalidState(value)),
        })
    }
}

impl Into<u16> for State {
    fn into(self) -> u16 {
        self as u16
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(raw) = value.parse::<u16>() {
            return Self::try_from(raw).map_err(|_| format!("unknown state: {value}"));
        }

        Ok(match value.to_ascii_lowercase().as_str() {
            "ok" => Self::Ok,
            "warning" => Self::Warning,
            "critical" => Self::Critical,
            "unknown" => Self::Unknown,
            _ => return Err(format!("unknown state: {value}")),
        })
    }
}

/// Pads a text value into a fixed-width wire field.
///
/// The UTF-8 encoding is truncated to at most `width - 1` bytes, terminated
/// with a single NUL and filled up to `width` with random lowercase ASCII.
/// The checksum covers the whole packet, so deterministic filler would let
/// distinct reports collide; random filler matches the reference
/// implementation.
///
/// # Test
///
/// ```
/// use nsca_server_codec::pad_random;
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let field = pad_random(&mut rng, "web01", 16);
///
/// assert_eq!(field.len(), 16);
/// assert_eq!(&field[..5], b"web01");
/// assert_eq!(field[5], 0);
/// assert!(field[6..].iter().all(|byte| byte.is_ascii_lowercase()));
/// ```
pub fn pad_random<R: Rng>(rng: &mut R, value: &str, width: usize) -> Vec<u8> {
    let value = value.as_bytes();
    let size = value.len().min(width - 1);

    let mut field = Vec::with_capacity(width);
    field.extend_from_slice(&value[..size]);
    field.push(0);

    while field.len() < width {
        field.push(rng.random_range(b'a'..=b'z'));
    }

    field
}

/// Chops a fixed-width wire field back to its text content.
///
/// # Test
///
/// ```
/// use nsca_server_codec::chop;
///
/// assert_eq!(chop(b"web01\x00xjqzfm").unwrap(), "web01");
/// assert_eq!(chop(b"unterminated").unwrap(), "unterminated");
/// ```
pub fn chop(bytes: &[u8]) -> Result<&str, Error> {
    let content = match bytes.iter().position(|byte| *byte == 0) {
        Some(index) => &bytes[..index],
        None => bytes,
    };

    Ok(std::str::from_utf8(content)?)
}

/// The init packet.
///
/// The first frame on every connection, sent unencrypted by the server: 128
/// opaque random bytes keying the session cipher, followed by the session
/// timestamp that every subsequent report must echo.
///
/// # Test
///
/// ```
/// use bytes::BytesMut;
/// use nsca_server_codec::InitPacket;
///
/// let mut bytes = BytesMut::with_capacity(InitPacket::SIZE);
/// InitPacket {
///     iv: [7; 128],
///     timestamp: 1_600_000_000,
/// }
/// .encode(&mut bytes);
///
/// let packet = InitPacket::decode(&bytes).unwrap();
///
/// assert_eq!(packet.iv, [7; 128]);
/// assert_eq!(packet.timestamp, 1_600_000_000);
/// ```
pub struct InitPacket {
    pub iv: [u8; 128],
    pub timestamp: u32,
}

impl InitPacket {
    pub const SIZE: usize = 132;

    pub fn encode(&self, bytes: &mut BytesMut) {
        bytes.clear();
        bytes.put(self.iv.as_slice());
        bytes.put_u32(self.timestamp);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::ShortPacket {
                expected: Self::SIZE,
                got: bytes.len(),
            });
        }

        Ok(Self {
            iv: bytes[..128].try_into()?,
            timestamp: u32::from_be_bytes(bytes[128..132].try_into()?),
        })
    }
}

pub const MAX_LENGTH_HOSTNAME: usize = 64;
pub const MAX_LENGTH_SERVICE: usize = 128;
pub const MAX_LENGTH_MESSAGE: usize = 4096;

pub const PACKET_VERSION: u16 = 3;

/// The report packet.
///
/// One passive check result, sent encrypted by the client. Fixed size,
/// network byte order:
///
/// ```text
/// ReportPacket {
///     version: u16,
///     _pad: [u8; 2],
///     crc: u32,
///     timestamp: u32,
///     state: u16,
///     hostname: [u8; 64],
///     service: [u8; 128],
///     message: [u8; 4096],
///     _pad: [u8; 2],
/// }
/// ```
///
/// The checksum is a CRC-32 (IEEE polynomial) over the whole packet with the
/// crc field zeroed, patched into place after assembly.
///
/// # Test
///
/// ```
/// use bytes::BytesMut;
/// use nsca_server_codec::{ReportPacket, State};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let mut bytes = BytesMut::with_capacity(ReportPacket::SIZE);
///
/// ReportPacket {
///     hostname: "web01".to_string(),
///     service: "nginx".to_string(),
///     state: State::Warning,
///     message: "slow".to_string(),
///     timestamp: 1_600_000_000,
/// }
/// .encode(&mut rng, &mut bytes);
///
/// let packet = ReportPacket::decode(&bytes).unwrap();
///
/// assert_eq!(packet.hostname, "web01");
/// assert_eq!(packet.service, "nginx");
/// assert_eq!(packet.state, State::Warning);
/// assert_eq!(packet.message, "slow");
/// assert_eq!(packet.timestamp, 1_600_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPacket {
    pub hostname: String,
    pub service: String,
    pub state: State,
    pub message: String,
    pub timestamp: u32,
}

impl ReportPacket {
    pub const SIZE: usize = 208 + MAX_LENGTH_MESSAGE;

    pub fn encode<R: Rng>(&self, rng: &mut R, bytes: &mut BytesMut) {
        bytes.clear();
        bytes.put_u16(PACKET_VERSION);
        bytes.put_bytes(0, 2);
        bytes.put_u32(0);
        bytes.put_u32(self.timestamp);
        bytes.put_u16(self.state.into());
        bytes.put(pad_random(rng, &self.hostname, MAX_LENGTH_HOSTNAME).as_slice());
        bytes.put(pad_random(rng, &self.service, MAX_LENGTH_SERVICE).as_slice());
        bytes.put(pad_random(rng, &self.message, MAX_LENGTH_MESSAGE).as_slice());
        bytes.put_bytes(0, 2);

        let crc = crc32fast::hash(&bytes[..]);
        bytes[4..8].copy_from_slice(&crc.to_be_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::ShortPacket {
                expected: Self::SIZE,
                got: bytes.len(),
            });
        }

        let version = u16::from_be_bytes(bytes[..2].try_into()?);
        if version != PACKET_VERSION {
            return Err(Error::UnexpectedVersion(version));
        }

        let actual = u32::from_be_bytes(bytes[4..8].try_into()?);
        let mut zeroed = bytes.to_vec();
        zeroed[4..8].fill(0);

        let expected = crc32fast::hash(&zeroed);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let state = u16::from_be_bytes(bytes[12..14].try_into()?);

        Ok(Self {
            timestamp: u32::from_be_bytes(bytes[8..12].try_into()?),
            state: State::try_from(state)?,
            hostname: chop(&bytes[14..14 + MAX_LENGTH_HOSTNAME])?.to_string(),
            service: chop(&bytes[78..78 + MAX_LENGTH_SERVICE])?.to_string(),
            message: chop(&bytes[206..206 + MAX_LENGTH_MESSAGE])?.to_string(),
        })
    }
}

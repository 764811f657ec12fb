use blowfish::Blowfish;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use rand::Rng;

use crate::Error;

/// Blowfish accepts keys up to 448 bits; the reference implementation always
/// feeds it exactly this many bytes, zero padded.
pub const BLOWFISH_KEY_SIZE: usize = 56;
pub const BLOWFISH_BLOCK_SIZE: usize = 8;

/// Encryption methods with the tags assigned by the NSCA protocol.
///
/// Only the plaintext and Blowfish modes are implemented; the remaining
/// historical tags (DES, 3DES, the mcrypt family) are unassigned here and
/// rejected at parse time.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    #[default]
    Plaintext = 0,
    Blowfish = 8,
}

impl TryFrom<u8> for Method {
    type Error = Error;

    /// # Test
    ///
    /// ```
    /// use nsca_server_codec::{Error, crypto::Method};
    ///
    /// assert_eq!(Method::try_from(8).unwrap(), Method::Blowfish);
    /// assert!(matches!(Method::try_from(3), Err(Error::UnknownCipher(3))));
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Plaintext,
            8 => Self::Blowfish,
            _ => return Err(Error::UnknownCipher(value)),
        })
    }
}

impl Into<u8> for Method {
    fn into(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plaintext => "plaintext",
            Self::Blowfish => "blowfish",
        };

        write!(f, "{} ({})", name, *self as u8)
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(tag) = value.parse::<u8>() {
            return Self::try_from(tag).map_err(|_| format!("unknown encryption method: {value}"));
        }

        Ok(match value.to_ascii_lowercase().as_str() {
            "plaintext" => Self::Plaintext,
            "blowfish" => Self::Blowfish,
            _ => return Err(format!("unknown encryption method: {value}")),
        })
    }
}

type BlowfishCfbEncryptor = cfb8::Encryptor<Blowfish>;
type BlowfishCfbDecryptor = cfb8::Decryptor<Blowfish>;

/// Per-connection stream cipher over report frames.
///
/// Both operations are length preserving and advance the connection
/// keystream: successive calls continue where the previous one stopped, so
/// frames must be processed in wire order. A CFB stream cannot be
/// resynchronized after a corrupt or missing frame; the only safe reaction
/// is to drop the connection and handshake again.
///
/// # Test
///
/// ```
/// use nsca_server_codec::crypto::{Cipher, Method};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let mut sender = Cipher::new(Method::Blowfish, b"hunter2", &[0x55; 128], &mut rng);
/// let mut receiver = Cipher::new(Method::Blowfish, b"hunter2", &[0x55; 128], &mut rng);
///
/// let mut buffer = *b"passive check result";
/// sender.encrypt(&mut buffer);
/// assert_ne!(&buffer, b"passive check result");
///
/// receiver.decrypt(&mut buffer);
/// assert_eq!(&buffer, b"passive check result");
/// ```
pub enum Cipher {
    Plaintext,
    Blowfish(BlowfishCfb),
}

impl Cipher {
    /// Constructs the cipher selected by `method`, keyed from the shared
    /// password and the IV delivered in the init packet.
    pub fn new<R: Rng>(method: Method, password: &[u8], iv: &[u8], rng: &mut R) -> Self {
        match method {
            Method::Plaintext => Self::Plaintext,
            Method::Blowfish => Self::Blowfish(BlowfishCfb::new(password, iv, rng)),
        }
    }

    pub fn encrypt(&mut self, buffer: &mut [u8]) {
        if let Self::Blowfish(cipher) = self {
            cipher.encrypt(buffer);
        }
    }

    pub fn decrypt(&mut self, buffer: &mut [u8]) {
        if let Self::Blowfish(cipher) = self {
            cipher.decrypt(buffer);
        }
    }
}

/// Blowfish in CFB mode with 8-bit segments, the historical NSCA pairing.
///
/// Encryption and decryption keep separate keystream positions: the client
/// side only ever encrypts and the server side only ever decrypts, each
/// consuming its stream in frame order.
pub struct BlowfishCfb {
    encryptor: BlowfishCfbEncryptor,
    decryptor: BlowfishCfbDecryptor,
}

impl BlowfishCfb {
    fn new<R: Rng>(password: &[u8], iv: &[u8], rng: &mut R) -> Self {
        let mut key = [0; BLOWFISH_KEY_SIZE];
        let size = password.len().min(BLOWFISH_KEY_SIZE);
        key[..size].copy_from_slice(&password[..size]);

        let mut block = [0; BLOWFISH_BLOCK_SIZE];
        let size = iv.len().min(BLOWFISH_BLOCK_SIZE);
        block[..size].copy_from_slice(&iv[..size]);
        if size < BLOWFISH_BLOCK_SIZE {
            rng.fill(&mut block[size..]);
        }

        Self {
            encryptor: BlowfishCfbEncryptor::new(
                GenericArray::from_slice(&key),
                GenericArray::from_slice(&block),
            ),
            decryptor: BlowfishCfbDecryptor::new(
                GenericArray::from_slice(&key),
                GenericArray::from_slice(&block),
            ),
        }
    }

    // CFB-8 runs the block cipher once per byte, so caller-side chunking
    // never affects the keystream.

    fn encrypt(&mut self, buffer: &mut [u8]) {
        for byte in buffer.chunks_mut(1) {
            self.encryptor.encrypt_block_mut(byte.into());
        }
    }

    fn decrypt(&mut self, buffer: &mut [u8]) {
        for byte in buffer.chunks_mut(1) {
            self.decryptor.decrypt_block_mut(byte.into());
        }
    }
}

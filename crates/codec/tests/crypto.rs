use nsca_server_codec::{
    Error, ReportPacket,
    crypto::{Cipher, Method},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const IV: [u8; 128] = [0x55; 128];

fn frame(seed: u64) -> Vec<u8> {
    let mut buffer = vec![0; ReportPacket::SIZE];
    StdRng::seed_from_u64(seed).fill(buffer.as_mut_slice());
    buffer
}

#[test]
fn test_plaintext_is_identity() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut cipher = Cipher::new(Method::Plaintext, b"", &IV, &mut rng);

    let mut buffer = frame(1);
    cipher.encrypt(&mut buffer);
    assert_eq!(buffer, frame(1));

    cipher.decrypt(&mut buffer);
    assert_eq!(buffer, frame(1));
}

#[test]
fn test_blowfish_round_trip() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut sender = Cipher::new(Method::Blowfish, b"hunter2", &IV, &mut rng);
    let mut receiver = Cipher::new(Method::Blowfish, b"hunter2", &IV, &mut rng);

    // Consecutive frames ride the same keystream on both sides.
    for seed in [1, 2, 3] {
        let mut buffer = frame(seed);
        sender.encrypt(&mut buffer);
        assert_ne!(buffer, frame(seed));

        receiver.decrypt(&mut buffer);
        assert_eq!(buffer, frame(seed));
    }
}

#[test]
fn test_blowfish_keystream_survives_chunking() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut whole = Cipher::new(Method::Blowfish, b"hunter2", &IV, &mut rng);
    let mut split = Cipher::new(Method::Blowfish, b"hunter2", &IV, &mut rng);

    let mut expected = frame(4);
    whole.encrypt(&mut expected);

    let mut actual = frame(4);
    let (head, tail) = actual.split_at_mut(ReportPacket::SIZE / 3);
    split.encrypt(head);
    split.encrypt(tail);

    assert_eq!(actual, expected);
}

#[test]
fn test_blowfish_extends_short_iv_from_rng() {
    let encrypt = |rng_seed: u64| {
        let mut rng = StdRng::seed_from_u64(rng_seed);
        let mut cipher = Cipher::new(Method::Blowfish, b"hunter2", &[1, 2, 3], &mut rng);

        let mut buffer = frame(5);
        cipher.encrypt(&mut buffer);
        buffer
    };

    // The missing IV bytes come from the injected generator, so a pinned
    // seed reproduces the ciphertext byte for byte.
    assert_eq!(encrypt(42), encrypt(42));
    assert_ne!(encrypt(42), encrypt(43));
}

#[test]
fn test_blowfish_key_shaping() {
    let encrypt = |password: &[u8]| {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cipher = Cipher::new(Method::Blowfish, password, &IV, &mut rng);

        let mut buffer = frame(6);
        cipher.encrypt(&mut buffer);
        buffer
    };

    // Oversized passwords are truncated to the Blowfish key size and short
    // ones are zero padded, matching the reference key schedule.
    let long = [0x61; 64];
    assert_eq!(encrypt(&long), encrypt(&long[..56]));

    let padded = [b"abc".as_slice(), &[0; 53]].concat();
    assert_eq!(encrypt(b"abc"), encrypt(&padded));
}

#[test]
fn test_method_registry() {
    assert_eq!(Method::try_from(0).unwrap(), Method::Plaintext);
    assert_eq!(Method::try_from(8).unwrap(), Method::Blowfish);

    for tag in [1, 3, 255] {
        assert!(matches!(
            Method::try_from(tag),
            Err(Error::UnknownCipher(t)) if t == tag
        ));
    }
}

#[test]
fn test_method_parse() {
    assert_eq!("plaintext".parse::<Method>().unwrap(), Method::Plaintext);
    assert_eq!("Blowfish".parse::<Method>().unwrap(), Method::Blowfish);
    assert_eq!("8".parse::<Method>().unwrap(), Method::Blowfish);

    assert!("xor".parse::<Method>().is_err());
    assert!("3".parse::<Method>().is_err());
}

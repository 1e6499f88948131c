//! XSalsa20-Poly1305 envelopes (NaCl `secretbox`)
//!
//! Envelope format (binary):
//! ```text
//! [24 bytes: random nonce][16 bytes: Poly1305 tag][N bytes: ciphertext]
//! ```
//!
//! This is byte-for-byte what `nonce || secretbox.Seal(..)` produces in NaCl
//! and libsodium, so objects sealed by other secretbox clients open here.
//! The nonce travels with the ciphertext, so decrypting needs nothing but the
//! envelope bytes and the key. Each `encrypt` call draws a fresh nonce from the
//! OS random source.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ccfs_core::{CcfsError, CcfsResult};
use rand::{rngs::OsRng, RngCore};
use xsalsa20poly1305::{
    aead::{Aead, KeyInit},
    Nonce, XSalsa20Poly1305,
};

use crate::kdf::SymmetricKey;
use crate::{MIN_ENVELOPE_SIZE, NONCE_SIZE};

/// One sealed value: `nonce || tag || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    /// Wrap raw bytes received from the wire. No validation happens here;
    /// `decrypt` rejects malformed input.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nonce prefix, if the envelope is long enough to carry one.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.0.get(..NONCE_SIZE)
    }

    /// Standard padded base64, safe for query parameters and header values.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> CcfsResult<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| CcfsError::Authentication(format!("envelope is not valid base64: {e}")))
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn fresh_nonce() -> CcfsResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CcfsError::Randomness(e.to_string()))?;
    Ok(nonce)
}

/// Seal `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CcfsResult<Envelope> {
    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());

    let nonce_bytes = fresh_nonce()?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    // tag || ciphertext
    let boxed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("envelope encryption failed: {e}"))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + boxed.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&boxed);
    Ok(Envelope(sealed))
}

/// Open an envelope. Fails closed: any truncation, wrong key, or modified
/// byte yields `Authentication` and no plaintext.
pub fn decrypt(envelope: &[u8], key: &SymmetricKey) -> CcfsResult<Vec<u8>> {
    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(CcfsError::Authentication(format!(
            "envelope too short: {} bytes (minimum {MIN_ENVELOPE_SIZE})",
            envelope.len()
        )));
    }

    let (nonce_bytes, boxed) = envelope.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, boxed)
        .map_err(|_| CcfsError::Authentication("envelope tag did not verify".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TAG_SIZE;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(0x42);
        let envelope = encrypt(b"hello, envelope", &k).unwrap();
        let plaintext = decrypt(envelope.as_bytes(), &k).unwrap();
        assert_eq!(plaintext, b"hello, envelope");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let k = key(0x01);
        let envelope = encrypt(b"", &k).unwrap();
        assert_eq!(envelope.len(), MIN_ENVELOPE_SIZE);
        assert_eq!(decrypt(envelope.as_bytes(), &k).unwrap(), b"");
    }

    #[test]
    fn test_envelope_size() {
        let k = key(0x02);
        let envelope = encrypt(&[0u8; 1000], &k).unwrap();
        // nonce (24) + plaintext (1000) + tag (16)
        assert_eq!(envelope.len(), NONCE_SIZE + 1000 + TAG_SIZE);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let envelope = encrypt(b"secret data", &key(1)).unwrap();
        let result = decrypt(envelope.as_bytes(), &key(2));
        assert!(matches!(result, Err(CcfsError::Authentication(_))));
    }

    #[test]
    fn test_decrypt_truncated() {
        let k = key(3);
        let envelope = encrypt(b"secret data", &k).unwrap();

        for len in [0, 1, NONCE_SIZE - 1, NONCE_SIZE, MIN_ENVELOPE_SIZE - 1] {
            let result = decrypt(&envelope.as_bytes()[..len], &k);
            assert!(
                matches!(result, Err(CcfsError::Authentication(_))),
                "length {len} must be rejected"
            );
        }

        // Dropping the last tag byte must also fail
        let short = &envelope.as_bytes()[..envelope.len() - 1];
        assert!(decrypt(short, &k).is_err());
    }

    #[test]
    fn test_nonce_unique_across_calls() {
        let k = key(4);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let envelope = encrypt(b"same plaintext", &k).unwrap();
            let nonce = envelope.nonce().unwrap().to_vec();
            assert!(seen.insert(nonce), "nonce repeated under one key");
        }
    }

    #[test]
    fn test_same_plaintext_different_envelopes() {
        let k = key(5);
        let a = encrypt(b"repeat", &k).unwrap();
        let b = encrypt(b"repeat", &k).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let k = key(6);
        let envelope = encrypt(b"bit flips", &k).unwrap();

        for byte in NONCE_SIZE..envelope.len() {
            for bit in 0..8 {
                let mut tampered = envelope.as_bytes().to_vec();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(decrypt(&tampered, &k), Err(CcfsError::Authentication(_))),
                    "flip at byte {byte} bit {bit} must fail"
                );
            }
        }
    }

    #[test]
    fn test_nonce_flip_detected() {
        let k = key(7);
        let mut tampered = encrypt(b"nonce", &k).unwrap().into_bytes();
        tampered[0] ^= 0x80;
        assert!(decrypt(&tampered, &k).is_err());
    }

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // NaCl crypto_secretbox test vector (tests/secretbox.c): firstkey, nonce, m, c.
    const NACL_KEY: &str = "1b27556473e985d462cd51197a9a46c76009549eac6474f206c4ee0844f68389";
    const NACL_NONCE: &str = "69696ee955b62b73cd62bda875fc73d68219e0036b7a0b37";
    const NACL_MESSAGE: &str = concat!(
        "be075fc53c81f2d5cf141316ebeb0c7b5228c52a4c62cbd44b66849b64244ffc",
        "e5ecbaaf33bd751a1ac728d45e6c61296cdc3c01233561f41db66cce314adb31",
        "0e3be8250c46f06dceea3a7fa1348057e2f6556ad6b1318a024a838f21af1fde",
        "048977eb48f59ffd4924ca1c60902e52f0a089bc76897040e082f93776384864",
        "5e0705",
    );
    const NACL_BOX: &str = concat!(
        "f3ffc7703f9400e52a7dfb4b3d3305d98e993b9f48681273c29650ba32fc76ce",
        "48332ea7164d96a4476fb8c531a1186ac0dfc17c98dce87b4da7f011ec48c972",
        "71d2c20f9b928fe2270d6fb863d51738b48eeee314a7cc8ab932164548e526ae",
        "90224368517acfeabd6bb3732bc0e9da99832b61ca01b6de56244a9e88d5f9b3",
        "7973f622a43d14a6599b1f654cb45a74e355a5",
    );

    fn nacl_key() -> SymmetricKey {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&unhex(NACL_KEY));
        SymmetricKey::from_bytes(bytes)
    }

    #[test]
    fn test_opens_nacl_secretbox_vector() {
        let mut envelope = unhex(NACL_NONCE);
        envelope.extend_from_slice(&unhex(NACL_BOX));

        let plaintext = decrypt(&envelope, &nacl_key()).unwrap();
        assert_eq!(plaintext, unhex(NACL_MESSAGE));
    }

    #[test]
    fn test_seal_matches_nacl_layout() {
        let k = nacl_key();
        let message = unhex(NACL_MESSAGE);
        let envelope = encrypt(&message, &k).unwrap();

        // Re-seal under the vector's nonce through the same primitive: the
        // result must be exactly the NaCl box.
        let cipher = XSalsa20Poly1305::new(k.as_bytes().into());
        let boxed = cipher
            .encrypt(Nonce::from_slice(&unhex(NACL_NONCE)), message.as_slice())
            .unwrap();
        assert_eq!(boxed, unhex(NACL_BOX));
        assert_eq!(envelope.len(), NONCE_SIZE + boxed.len());
    }

    #[test]
    fn test_nacl_vector_tamper_rejected() {
        let mut envelope = unhex(NACL_NONCE);
        envelope.extend_from_slice(&unhex(NACL_BOX));
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(matches!(
            decrypt(&envelope, &nacl_key()),
            Err(CcfsError::Authentication(_))
        ));
    }

    #[test]
    fn test_base64_roundtrip_and_garbage() {
        let k = key(8);
        let envelope = encrypt(b"name.txt", &k).unwrap();
        let parsed = Envelope::from_base64(&envelope.to_base64()).unwrap();
        assert_eq!(parsed, envelope);

        assert!(matches!(
            Envelope::from_base64("%%% not base64 %%%"),
            Err(CcfsError::Authentication(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            k in any::<[u8; 32]>(),
        ) {
            let k = SymmetricKey::from_bytes(k);
            let envelope = encrypt(&data, &k).unwrap();
            prop_assert_eq!(decrypt(envelope.as_bytes(), &k).unwrap(), data);
        }

        #[test]
        fn prop_wrong_key_rejected(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            k1 in any::<[u8; 32]>(),
            k2 in any::<[u8; 32]>(),
        ) {
            prop_assume!(k1 != k2);
            let envelope = encrypt(&data, &SymmetricKey::from_bytes(k1)).unwrap();
            prop_assert!(decrypt(envelope.as_bytes(), &SymmetricKey::from_bytes(k2)).is_err());
        }

        #[test]
        fn prop_single_bit_flip_rejected(
            data in proptest::collection::vec(any::<u8>(), 1..512),
            pos in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let k = SymmetricKey::from_bytes([9u8; 32]);
            let mut tampered = encrypt(&data, &k).unwrap().into_bytes();
            let idx = NONCE_SIZE + pos.index(tampered.len() - NONCE_SIZE);
            tampered[idx] ^= 1 << bit;
            prop_assert!(decrypt(&tampered, &k).is_err());
        }
    }
}

//! Key derivation: password → symmetric key
//!
//! The key is the SHA-256 digest of the UTF-8 password bytes. There is no
//! salt and no work factor, so keys are reproducible across independent
//! invocations and across clients that already stored objects this way.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit key used for one upload or download.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl ConstantTimeEq for SymmetricKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.bytes[..].ct_eq(&other.bytes[..])
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for SymmetricKey {}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the symmetric key for a password.
pub fn derive_key(password: &SecretString) -> SymmetricKey {
    let mut digest = Sha256::digest(password.expose_secret().as_bytes());
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    SymmetricKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let key1 = derive_key(&SecretString::from("correct horse"));
        let key2 = derive_key(&SecretString::from("correct horse"));

        assert_eq!(key1, key2, "key derivation must be deterministic");
    }

    #[test]
    fn test_derive_different_passwords() {
        let key1 = derive_key(&SecretString::from("password-a"));
        let key2 = derive_key(&SecretString::from("password-b"));

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_derive_known_vector() {
        // sha256("pw")
        let key = derive_key(&SecretString::from("pw"));
        assert_eq!(
            key.as_bytes()[..4],
            [0x30, 0xc9, 0x52, 0xfa],
            "derived key must be the plain SHA-256 of the password"
        );
    }

    #[test]
    fn test_ct_eq() {
        let a = SymmetricKey::from_bytes([7u8; 32]);
        let mut other = [7u8; 32];
        assert!(bool::from(a.ct_eq(&SymmetricKey::from_bytes(other))));

        other[31] ^= 1;
        let b = SymmetricKey::from_bytes(other);
        assert!(!bool::from(a.ct_eq(&b)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts() {
        let key = derive_key(&SecretString::from("secret"));
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
    }
}

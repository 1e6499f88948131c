//! ccfs-crypto: client-side sealing for ccfs objects
//!
//! Every value that leaves the client (payload and filename) is an envelope:
//!
//! ```text
//! password ──SHA-256──▶ SymmetricKey (32 bytes, per invocation)
//!
//! Envelope = [24 bytes: random nonce][16 bytes: Poly1305 tag][N bytes: ciphertext]
//! ```
//!
//! The broker and the blob store only ever see envelopes (the filename one
//! base64 encoded).

pub mod envelope;
pub mod kdf;
pub mod names;

pub use envelope::{decrypt, encrypt, Envelope};
pub use kdf::{derive_key, SymmetricKey};
pub use names::{open_filename, seal_filename};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Smallest well-formed envelope (sealed empty plaintext)
pub const MIN_ENVELOPE_SIZE: usize = NONCE_SIZE + TAG_SIZE;

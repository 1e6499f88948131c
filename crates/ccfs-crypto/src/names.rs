//! Filename sealing
//!
//! Filenames get the same randomized envelope as payloads, then base64 so the
//! result can ride in a query parameter and an `x-amz-meta-filename` header.
//! Two uploads of the same name produce unrelated strings.

use ccfs_core::{CcfsError, CcfsResult};

use crate::envelope::{decrypt, encrypt, Envelope};
use crate::kdf::SymmetricKey;

/// Encrypt a filename and return it as base64 text.
pub fn seal_filename(name: &str, key: &SymmetricKey) -> CcfsResult<String> {
    Ok(encrypt(name.as_bytes(), key)?.to_base64())
}

/// Reverse of [`seal_filename`].
///
/// Base64 or tag failures are `Authentication`; a plaintext that is not UTF-8
/// is `UnsafeFilename`.
pub fn open_filename(encoded: &str, key: &SymmetricKey) -> CcfsResult<String> {
    let envelope = Envelope::from_base64(encoded)?;
    let plaintext = decrypt(envelope.as_bytes(), key)
        .map_err(|_| CcfsError::Authentication("filename metadata did not verify".into()))?;
    String::from_utf8(plaintext)
        .map_err(|e| CcfsError::UnsafeFilename(format!("decrypted name is not UTF-8: {e}")))
}

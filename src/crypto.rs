//! Sealing searchable content for storage at rest.
//!
//! The actual cipher belongs to the host application (it owns the per-user
//! search key). This module only defines the seam and the envelope format:
//!
//! ```text
//! DecryptedContent ──bincode──▶ bytes ──ContentCipher::seal──▶ (nonce, ciphertext)
//!                                                   ──base64──▶ EncryptedContent
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{IndexError, Result};
use crate::model::{DecryptedContent, EncryptedContent};

/// Output of [`ContentCipher::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Authenticated encryption supplied by the host's crypto service.
///
/// Implementations must be usable from any thread: cache builds decrypt on a
/// background thread while the caller keeps indexing.
pub trait ContentCipher: Send + Sync {
    /// Encrypt `plaintext` under a fresh nonce.
    fn seal(&self, plaintext: &[u8]) -> Result<Sealed>;

    /// Decrypt and authenticate `ciphertext`.
    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Serialize and seal searchable content.
pub fn encrypt_content(
    cipher: &dyn ContentCipher,
    content: &DecryptedContent,
) -> Result<EncryptedContent> {
    let plaintext =
        bincode::serialize(content).map_err(|e| IndexError::Crypto(format!("encode: {e}")))?;
    let sealed = cipher.seal(&plaintext)?;
    Ok(EncryptedContent {
        iv: BASE64.encode(&sealed.nonce),
        ciphertext: BASE64.encode(&sealed.ciphertext),
        size: sealed.ciphertext.len(),
    })
}

/// Open and deserialize searchable content.
///
/// `message_id` is only used to label decode errors.
pub fn decrypt_content(
    cipher: &dyn ContentCipher,
    message_id: &str,
    content: &EncryptedContent,
) -> Result<DecryptedContent> {
    let nonce = BASE64
        .decode(&content.iv)
        .map_err(|e| IndexError::decode(message_id, format!("IV is not base64: {e}")))?;
    let ciphertext = BASE64
        .decode(&content.ciphertext)
        .map_err(|e| IndexError::decode(message_id, format!("content is not base64: {e}")))?;
    let plaintext = cipher.open(&nonce, &ciphertext)?;
    bincode::deserialize(&plaintext)
        .map_err(|e| IndexError::decode(message_id, format!("payload: {e}")))
}

/// Rebuild an [`EncryptedContent`] from its stored base64 columns.
pub fn encrypted_from_columns(
    message_id: &str,
    iv: String,
    ciphertext: String,
) -> Result<EncryptedContent> {
    let size = BASE64
        .decode(&ciphertext)
        .map_err(|e| IndexError::decode(message_id, format!("content is not base64: {e}")))?
        .len();
    Ok(EncryptedContent {
        iv,
        ciphertext,
        size,
    })
}

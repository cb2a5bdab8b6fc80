//! # Secret Sealing with AES-256-GCM
//!
//! Small secrets that must come back out in plaintext (TOTP seeds) cannot be
//! hashed like bearer tokens. They are sealed with AES-256-GCM under a key
//! derived from the process master key, and stored as
//! `base64(nonce || ciphertext)`.
//!
//! A fresh 96-bit nonce is drawn per encryption, so sealing the same secret
//! twice produces different ciphertexts.

use crate::crypto::random::sha256_bytes;
use crate::errors::ApiError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Symmetric cipher for at-rest secrets.
///
/// The 256-bit key is `SHA-256(master_key)`; the master key itself is free
/// text of arbitrary length.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Creates a cipher from the process master key.
    pub fn new(master_key: &str) -> Self {
        let key_bytes = sha256_bytes(master_key.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Seals a plaintext secret. Returns `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ApiError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|_| ApiError::Internal {
                    message: "Secret encryption failed".to_string(),
                })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Opens a sealed secret produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails on truncated input, a wrong key, or any bit flip in the
    /// ciphertext (GCM authenticates).
    pub fn decrypt(&self, sealed: &str) -> Result<String, ApiError> {
        let raw = STANDARD.decode(sealed).map_err(|_| ApiError::Internal {
            message: "Sealed secret is not valid base64".to_string(),
        })?;

        if raw.len() <= NONCE_LEN {
            return Err(ApiError::Internal {
                message: "Sealed secret is truncated".to_string(),
            });
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ApiError::Internal {
                message: "Secret decryption failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| ApiError::Internal {
            message: "Decrypted secret is not valid UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = SecretCipher::new("master-key");
        let sealed = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();

        assert_ne!(sealed, "JBSWY3DPEHPK3PXP");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let cipher = SecretCipher::new("master-key");
        let a = cipher.encrypt("secret").unwrap();
        let b = cipher.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretCipher::new("master-key").encrypt("secret").unwrap();
        assert!(SecretCipher::new("other-key").decrypt(&sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = SecretCipher::new("master-key");
        let sealed = cipher.encrypt("secret").unwrap();

        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let cipher = SecretCipher::new("master-key");
        assert!(cipher.decrypt("AAAA").is_err());
        assert!(cipher.decrypt("not base64 !!!").is_err());
    }
}

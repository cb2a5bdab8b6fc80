//! # Secure Random Tokens and Token Indexing
//!
//! All bearer secrets in the system follow the same pattern: a 256-bit
//! random value travels to the client, and the database stores only its
//! SHA-256 hash. Lookups hash the presented value and match on the digest,
//! so a database dump never yields a usable token.

use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Number of random bytes in a bearer secret (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generates a 256-bit random token, base64url-encoded without padding.
///
/// The result is 43 characters of URL- and cookie-safe text. Used for
/// session tokens, refresh tokens, authorization codes, device codes,
/// MFA challenges, and verification tokens.
pub fn secure_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes a token with SHA-256 and returns the lowercase hex digest.
///
/// This is the storage/lookup form of every bearer secret.
pub fn sha256_hex(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Raw SHA-256 digest of arbitrary bytes.
///
/// Needed where the digest itself is input to further encoding, like the
/// OIDC `at_hash` claim (base64url of the left half of the digest).
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Generates a random string from the given alphabet.
///
/// Used for human-facing secrets like recovery codes and device user codes,
/// where the alphabet is restricted for readability.
pub fn random_from_alphabet(alphabet: &[u8], len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_token_length_and_alphabet() {
        let token = secure_token();
        // 32 bytes -> 43 base64url chars, unpadded
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_secure_token_unique() {
        assert_ne!(secure_token(), secure_token());
    }

    #[test]
    fn test_sha256_hex_deterministic() {
        let a = sha256_hex("token-value");
        let b = sha256_hex("token-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_from_alphabet_respects_alphabet() {
        let code = random_from_alphabet(b"ABC123", 24);
        assert_eq!(code.len(), 24);
        assert!(code.chars().all(|c| "ABC123".contains(c)));
    }
}

//! # Realm Signing Keys
//!
//! Generation, at-rest protection, and JWK export of the per-realm RSA
//! keypairs that sign every issued JWT.
//!
//! ## Lifecycle
//!
//! ```text
//! generate_signing_key(master_key)
//!         │
//!         ├── 2048-bit RSA keypair
//!         ├── public half  -> SPKI PEM, stored as-is, published via JWKS
//!         └── private half -> PKCS#8 encrypted PEM (scrypt + AES-256-CBC),
//!                             decrypted only in memory at signing time
//! ```
//!
//! The encryption password is the process master key. A database dump
//! without that key yields no usable signing material.

use crate::errors::ApiError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RSA modulus size for realm signing keys.
const KEY_BITS: usize = 2048;

// =============================================================================
// Key Generation
// =============================================================================

/// A freshly generated signing key, ready for persistence.
///
/// `private_key_pem` is already encrypted; nothing in this struct is
/// sensitive on its own.
#[derive(Debug, Clone)]
pub struct GeneratedSigningKey {
    /// Key id, carried in the `kid` header of every JWT signed with this key
    pub kid: String,
    /// Public key, SPKI PEM
    pub public_key_pem: String,
    /// Private key, PKCS#8 encrypted PEM
    pub private_key_pem: String,
}

/// Generates a new RSA signing keypair with the private half encrypted
/// under `master_key`.
///
/// Key generation takes noticeable CPU time (hundreds of milliseconds);
/// callers run it at realm creation or rotation, never on a request path.
pub fn generate_signing_key(master_key: &str) -> Result<GeneratedSigningKey, ApiError> {
    let mut rng = OsRng;

    let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| ApiError::Internal {
        message: format!("RSA key generation failed: {}", e),
    })?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_encrypted_pem(&mut rng, master_key.as_bytes(), LineEnding::LF)
        .map_err(|e| ApiError::Internal {
            message: format!("Private key encryption failed: {}", e),
        })?
        .to_string();

    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| ApiError::Internal {
            message: format!("Public key encoding failed: {}", e),
        })?;

    Ok(GeneratedSigningKey {
        kid: Uuid::new_v4().to_string(),
        public_key_pem,
        private_key_pem,
    })
}

/// Decrypts a stored private key back to plain PKCS#8 PEM for signing.
///
/// The result lives only in memory; callers hand it to the JWT encoder and
/// drop it.
pub fn decrypt_private_key_pem(encrypted_pem: &str, master_key: &str) -> Result<String, ApiError> {
    let private_key = RsaPrivateKey::from_pkcs8_encrypted_pem(encrypted_pem, master_key.as_bytes())
        .map_err(|e| ApiError::Internal {
            message: format!("Private key decryption failed: {}", e),
        })?;

    private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| ApiError::Internal {
            message: format!("Private key encoding failed: {}", e),
        })
}

// =============================================================================
// JWK Export
// =============================================================================

/// A single RSA public key in JWK form (RFC 7517).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA`
    pub kty: String,
    /// Intended use, always `sig`
    #[serde(rename = "use")]
    pub use_: String,
    /// Signature algorithm, always `RS256`
    pub alg: String,
    /// Key id matching the JWT `kid` header
    pub kid: String,
    /// Modulus, base64url-unpadded big-endian
    pub n: String,
    /// Public exponent, base64url-unpadded big-endian
    pub e: String,
}

/// JWKS document: the key set published at the `certs` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Builds the JWK representation of a stored public key.
pub fn jwk_from_public_pem(kid: &str, public_key_pem: &str) -> Result<Jwk, ApiError> {
    let public_key =
        RsaPublicKey::from_public_key_pem(public_key_pem).map_err(|e| ApiError::Internal {
            message: format!("Public key parsing failed: {}", e),
        })?;

    Ok(Jwk {
        kty: "RSA".to_string(),
        use_: "sig".to_string(),
        alg: "RS256".to_string(),
        kid: kid.to_string(),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_KEY: &str = "unit-test-master-key-32-characters!";

    #[test]
    fn test_generate_and_decrypt_round_trip() {
        let key = generate_signing_key(MASTER_KEY).unwrap();

        assert!(key.public_key_pem.contains("BEGIN PUBLIC KEY"));
        assert!(key.private_key_pem.contains("BEGIN ENCRYPTED PRIVATE KEY"));

        let plain_pem = decrypt_private_key_pem(&key.private_key_pem, MASTER_KEY).unwrap();
        assert!(plain_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let key = generate_signing_key(MASTER_KEY).unwrap();
        assert!(decrypt_private_key_pem(&key.private_key_pem, "wrong-key").is_err());
    }

    #[test]
    fn test_jwk_export_shape() {
        let key = generate_signing_key(MASTER_KEY).unwrap();
        let jwk = jwk_from_public_pem(&key.kid, &key.public_key_pem).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, key.kid);
        // 2048-bit modulus -> 256 bytes -> 342/343 base64url chars
        assert!(jwk.n.len() >= 340);
        // Standard exponent 65537 -> "AQAB"
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_signing_round_trip_through_jsonwebtoken() {
        use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize)]
        struct Claims {
            sub: String,
            exp: i64,
        }

        let key = generate_signing_key(MASTER_KEY).unwrap();
        let plain_pem = decrypt_private_key_pem(&key.private_key_pem, MASTER_KEY).unwrap();

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());

        let claims = Claims {
            sub: "user-1".to_string(),
            exp: chrono::Utc::now().timestamp() + 300,
        };

        let token = encode(
            &header,
            &claims,
            &EncodingKey::from_rsa_pem(plain_pem.as_bytes()).unwrap(),
        )
        .unwrap();

        // Verify against the JWK components, the same path relying parties use
        let jwk = jwk_from_public_pem(&key.kid, &key.public_key_pem).unwrap();
        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let decoded = decode::<Claims>(&token, &decoding_key, &validation).unwrap();
        assert_eq!(decoded.claims.sub, "user-1");
    }
}

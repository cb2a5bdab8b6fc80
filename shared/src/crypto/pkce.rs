//! # PKCE (RFC 7636), S256 Only
//!
//! Proof Key for Code Exchange binds an authorization code to the client
//! instance that requested it. The client sends
//! `code_challenge = base64url(SHA-256(code_verifier))` with the
//! authorization request and reveals `code_verifier` only at the token
//! endpoint. The `plain` method is not supported.

use super::random::sha256_bytes;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Allowed length range for a code verifier (RFC 7636 §4.1).
const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Computes the S256 challenge for a verifier.
pub fn challenge_from_verifier(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(sha256_bytes(verifier.as_bytes()))
}

/// Checks a verifier's shape: 43-128 characters from the unreserved set
/// `[A-Za-z0-9._~-]`.
pub fn verifier_is_well_formed(verifier: &str) -> bool {
    (VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Verifies a code verifier against the stored challenge.
///
/// Returns `false` for malformed verifiers; the caller maps that to
/// `invalid_grant` like any other mismatch.
pub fn verify(verifier: &str, code_challenge: &str) -> bool {
    if !verifier_is_well_formed(verifier) {
        return false;
    }
    challenge_from_verifier(verifier) == code_challenge
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = challenge_from_verifier(verifier);
        assert!(verify(verifier, &challenge));
    }

    #[test]
    fn test_rfc_7636_appendix_b_vector() {
        // Verifier and challenge from RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_from_verifier(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_wrong_verifier_fails() {
        let challenge = challenge_from_verifier(&"x".repeat(43));
        assert!(!verify(&"y".repeat(43), &challenge));
    }

    #[test]
    fn test_verifier_length_bounds() {
        assert!(!verifier_is_well_formed(&"a".repeat(42)));
        assert!(verifier_is_well_formed(&"a".repeat(43)));
        assert!(verifier_is_well_formed(&"a".repeat(128)));
        assert!(!verifier_is_well_formed(&"a".repeat(129)));
    }

    #[test]
    fn test_verifier_alphabet() {
        assert!(verifier_is_well_formed(&format!("{}-._~", "a".repeat(43))));
        assert!(!verifier_is_well_formed(&format!("{}+", "a".repeat(43))));
        assert!(!verifier_is_well_formed(&format!("{} ", "a".repeat(43))));
    }

    #[test]
    fn test_malformed_verifier_never_verifies() {
        let challenge = challenge_from_verifier("short");
        // Even a "matching" challenge fails when the verifier is malformed
        assert!(!verify("short", &challenge));
    }
}

//! # Crypto Primitives
//!
//! The low-level building blocks of the credential and token machinery.
//!
//! ## Module Structure
//!
//! ```text
//! crypto/
//! ├── password.rs - Argon2id password hashing and verification
//! ├── random.rs   - Secure random tokens + SHA-256 token indexing
//! ├── pkce.rs     - RFC 7636 S256 challenge/verifier math
//! ├── keys.rs     - Per-realm RSA signing keys, encrypted at rest, JWK export
//! └── cipher.rs   - AES-256-GCM sealing of small secrets (TOTP seeds)
//! ```
//!
//! ## Ground Rules
//!
//! - Bearer secrets (session tokens, refresh tokens, codes) are 256-bit
//!   random values; the database stores only their SHA-256 hash
//! - Passwords are Argon2id in PHC string format, never reversible
//! - Private key material and TOTP seeds are encrypted under the process
//!   master key before they touch the database

pub mod cipher;
pub mod keys;
pub mod password;
pub mod pkce;
pub mod random;

pub use cipher::SecretCipher;
pub use password::PasswordHasher;

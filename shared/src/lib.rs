//! # Authme - Shared Library
//!
//! Cross-cutting infrastructure for the Authme identity provider.
//!
//! This crate holds everything that is not identity-provider domain logic:
//! configuration loading, error types, the database pool, request validation
//! helpers, structured logging setup, the clock abstraction, and the crypto
//! primitives the token and credential machinery is built on.
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`crypto`] | Password hashing, tokens, PKCE, RSA keys | [`crypto::password::PasswordHasher`] |
//! | [`clock`] | Time source abstraction for expiry checks | [`clock::Clock`] |
//! | [`database`] | PostgreSQL connection pool | [`database::create_pool`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: shared types live here to prevent drift
//! 2. **No ambient time**: every expiry check goes through [`clock::Clock`]
//!    so tests can drive time forward deterministically
//! 3. **Security first**: crypto follows OWASP guidance (Argon2id, SHA-256
//!    token indexing, 256-bit secrets)
//! 4. **Observable by default**: structured logging and tracing built-in

pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};

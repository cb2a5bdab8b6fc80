//! # Realm Signing Key Entity
//!
//! Per-realm RSA keypairs. A realm can hold several active keys at once
//! (rotation keeps the old key active until the longest-lived token signed
//! with it has expired); JWKS publishes every active key and the `kid`
//! header routes verification.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored signing key row. `private_key_pem` is PKCS#8 encrypted PEM,
/// opened only in memory at signing time.
#[derive(Debug, Clone, FromRow)]
pub struct RealmSigningKey {
    pub id: Uuid,
    pub realm_id: Uuid,
    /// Key id carried in JWT headers and JWKS entries
    pub kid: String,
    /// Always `RS256`
    pub algorithm: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

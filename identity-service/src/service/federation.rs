//! # Federation Contract
//!
//! User federation (LDAP or otherwise) is an external collaborator. The
//! core consumes exactly two capabilities: verify credentials for a user
//! that already carries a `federation_link`, and bind an unknown username
//! so the user can be materialized locally on first login. Import and sync
//! live outside the core.

use async_trait::async_trait;
use shared::errors::ApiError;

use crate::domain::Realm;

/// Identity returned by a successful federation bind.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    /// Opaque external reference stored as `federation_link`
    pub external_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// External credential verification capability.
///
/// Implementations must apply their own timeouts (default 5 s) and map
/// directory outages to `ApiError::ServiceUnavailable`.
#[async_trait]
pub trait FederationProvider: Send + Sync {
    /// Whether this realm has federation configured at all. When false the
    /// other methods are never called.
    fn is_configured(&self, realm: &Realm) -> bool;

    /// Verifies credentials for an already-linked user.
    async fn verify_credentials(
        &self,
        realm: &Realm,
        federation_link: &str,
        password: &str,
    ) -> Result<bool, ApiError>;

    /// Attempts to bind an unknown username. A successful bind returns the
    /// external identity so the caller can materialize a local user.
    async fn bind(
        &self,
        realm: &Realm,
        username: &str,
        password: &str,
    ) -> Result<Option<FederatedIdentity>, ApiError>;
}

/// No federation anywhere. The default wiring.
pub struct NoFederation;

#[async_trait]
impl FederationProvider for NoFederation {
    fn is_configured(&self, _realm: &Realm) -> bool {
        false
    }

    async fn verify_credentials(
        &self,
        _realm: &Realm,
        _federation_link: &str,
        _password: &str,
    ) -> Result<bool, ApiError> {
        Ok(false)
    }

    async fn bind(
        &self,
        _realm: &Realm,
        _username: &str,
        _password: &str,
    ) -> Result<Option<FederatedIdentity>, ApiError> {
        Ok(None)
    }
}

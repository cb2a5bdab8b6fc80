//! # Service Layer
//!
//! Business logic of the identity provider. Each service owns one concern
//! and is composed by constructor injection in `main.rs`; tests substitute
//! fakes at the same seams.
//!
//! ## Module Structure
//!
//! ```text
//! service/
//! ├── realm_cache.rs         - Read-through cache for realms + signing keys
//! ├── credential_service.rs  - Password/federation credential verification
//! ├── brute_force.rs         - Failure counting and lockout derivation
//! ├── password_policy.rs     - Complexity, history, max-age enforcement
//! ├── mfa_service.rs         - TOTP enrolment/verification, challenges
//! ├── login_session.rs       - Browser SSO session store
//! ├── consent_service.rs     - Grants and transient consent requests
//! ├── authorize_service.rs   - Authorization endpoint + code issuance
//! ├── oauth_service.rs       - Token endpoint grants, introspect, revoke
//! ├── token_factory.rs       - Claim assembly and RS256 signing, JWKS
//! ├── session_service.rs     - Session/refresh lifecycle, logout
//! ├── device_service.rs      - Device flow verification
//! ├── verification_service.rs- One-shot verification tokens
//! ├── account_service.rs     - Registration, reset, email verification
//! ├── events_recorder.rs     - Fire-and-forget audit event queue
//! ├── backchannel.rs         - Backchannel logout delivery with retry
//! ├── mailer.rs              - Send-email contract + dispatcher
//! ├── federation.rs          - External credential verification contract
//! └── sweeper.rs             - Periodic expiry sweep
//! ```

pub mod account_service;
pub mod authorize_service;
pub mod backchannel;
pub mod brute_force;
pub mod consent_service;
pub mod credential_service;
pub mod device_service;
pub mod events_recorder;
pub mod federation;
pub mod login_session;
pub mod mailer;
pub mod mfa_service;
pub mod oauth_service;
pub mod password_policy;
pub mod provisioning;
pub mod realm_cache;
pub mod session_service;
pub mod sweeper;
pub mod token_factory;
pub mod verification_service;

pub use account_service::AccountService;
pub use authorize_service::AuthorizeService;
pub use backchannel::BackchannelNotifier;
pub use brute_force::BruteForceGuard;
pub use consent_service::ConsentService;
pub use credential_service::CredentialVerifier;
pub use device_service::DeviceService;
pub use events_recorder::EventRecorder;
pub use federation::{FederatedIdentity, FederationProvider, NoFederation};
pub use login_session::LoginSessionStore;
pub use mailer::{EmailRequest, LogMailer, MailDispatcher, Mailer};
pub use mfa_service::MfaService;
pub use oauth_service::OAuthService;
pub use password_policy::PasswordPolicyService;
pub use realm_cache::RealmCache;
pub use session_service::SessionLifecycle;
pub use token_factory::TokenFactory;
pub use verification_service::VerificationService;

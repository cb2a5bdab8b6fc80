//! # Domain Layer
//!
//! Persistent business objects of the identity provider. Entities map
//! directly to database tables; `New*` structs carry the fields required to
//! insert one.
//!
//! ## Module Structure
//!
//! ```text
//! domain/
//! ├── realm.rs        - Realm (tenant root) and its policies
//! ├── user.rs         - User, login failures, password history
//! ├── client.rs       - OAuth clients, roles, groups, scopes, mappers
//! ├── session.rs      - SSO sessions and refresh tokens
//! ├── oauth.rs        - Authorization codes, device codes, consent
//! ├── mfa.rs          - TOTP credentials, recovery codes, MFA challenges
//! ├── verification.rs - One-shot verification tokens
//! ├── key.rs          - Realm signing keys
//! └── event.rs        - Audit events
//! ```
//!
//! Everything here is realm-scoped. Entities carry their `realm_id` and the
//! repository layer always filters on it; nothing in the domain crosses a
//! realm boundary.

pub mod client;
pub mod event;
pub mod key;
pub mod mfa;
pub mod oauth;
pub mod realm;
pub mod session;
pub mod user;
pub mod verification;

pub use client::{Client, ClientScope, ClientType, Group, ProtocolMapper, Role, ScopeAssignment};
pub use event::{EventCategory, EventRecord, NewEvent};
pub use key::RealmSigningKey;
pub use mfa::{MfaChallenge, RecoveryCode, TotpCredential};
pub use oauth::{
    AuthorizationCode, ConsentRequest, DeviceCode, DeviceStatus, NewAuthorizationCode,
    NewDeviceCode, OAuthParams, UserConsent,
};
pub use realm::Realm;
pub use session::{NewRefreshToken, NewSsoSession, RefreshToken, SsoSession};
pub use user::{LoginFailure, NewUser, PasswordHistoryEntry, User, UserProfile};
pub use verification::{VerificationPurpose, VerificationToken};

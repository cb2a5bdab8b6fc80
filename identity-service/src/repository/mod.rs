//! # Repository Layer
//!
//! Data access for the identity provider. One repository per aggregate,
//! all backed by the shared `PgPool`.
//!
//! ## Query Patterns
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Query Patterns                                  │
//! ├──────────────────┬──────────────────────────────────────────────────────┤
//! │ Realm scoping    │ WHERE realm_id = $1 AND ...  (always)                │
//! │ Hashed lookup    │ WHERE token_hash = sha256(presented)                 │
//! │ Single-use CAS   │ UPDATE ... WHERE consumed = FALSE ... RETURNING *    │
//! │ Clock injection  │ expiry compared against a bound $now, never NOW()    │
//! │ Parameterized    │ Always $1, $2 (never string interpolation)           │
//! └──────────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! The four race-prone operations (code consumption, refresh rotation, MFA
//! attempt counting, brute-force counting) each use a conditional UPDATE or
//! a row-locked transaction so exactly one concurrent caller wins.

pub mod client_repository;
pub mod code_repository;
pub mod consent_repository;
pub mod device_repository;
pub mod event_repository;
pub mod guard_repository;
pub mod key_repository;
pub mod mfa_repository;
pub mod realm_repository;
pub mod role_repository;
pub mod session_repository;
pub mod user_repository;
pub mod verification_repository;

pub use client_repository::ClientRepository;
pub use code_repository::CodeRepository;
pub use consent_repository::ConsentRepository;
pub use device_repository::DeviceRepository;
pub use event_repository::EventRepository;
pub use guard_repository::GuardRepository;
pub use key_repository::KeyRepository;
pub use mfa_repository::MfaRepository;
pub use realm_repository::RealmRepository;
pub use role_repository::RoleRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
pub use verification_repository::VerificationRepository;

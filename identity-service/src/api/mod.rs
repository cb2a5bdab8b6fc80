//! # HTTP Layer
//!
//! Route configuration, request/response DTOs, and the handlers for both
//! faces of the provider:
//!
//! - the OAuth/OIDC protocol surface under
//!   `/realms/{realm}/protocol/openid-connect/*` (JSON, RFC error shapes)
//! - the browser login flow under `/realms/{realm}/*` (minimal HTML,
//!   query-string-preserved OAuth parameters)
//!
//! Handlers stay thin: extract, validate, call the service layer, convert
//! to a response. Realm resolution happens first in every handler via
//! `AppState::realm`.

pub mod account;
pub mod cookies;
pub mod dto;
pub mod login;
pub mod oidc;
pub mod pages;
pub mod routes;

//! # Application Error Types
//!
//! Unified error handling with automatic HTTP conversion.
//!
//! ## Design Philosophy
//!
//! Each error variant maps to a specific HTTP status code and a stable
//! machine-readable code, ensuring consistent API responses. Handlers return
//! `Result<HttpResponse, ApiError>` and let the `ResponseError` impl do the
//! rest.
//!
//! Protocol endpoints (the OAuth/OIDC surface) do NOT use this JSON shape;
//! they map internal errors onto RFC 6749 error responses in the service
//! crate. This type covers everything else: login pages, account endpoints,
//! health checks, and the places where an internal error has no protocol
//! equivalent.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ApiError Categories                            │
//! ├─────────────────────────┬───────────────────┬───────────────────────────┤
//! │ Authentication (401)    │ Authorization(403)│ Validation (400)          │
//! ├─────────────────────────┼───────────────────┼───────────────────────────┤
//! │ InvalidCredentials      │ Forbidden         │ ValidationError           │
//! │ AccountLocked           │                   │ BadRequest                │
//! │ AccountDisabled         │                   │ PolicyViolation           │
//! │ TokenExpired            │                   │                           │
//! │ InvalidToken            │                   │                           │
//! │ MissingAuth             │                   │                           │
//! ├─────────────────────────┴───────────────────┴───────────────────────────┤
//! │ Resources (404, 409)    │ Rate Limit (429)  │ Server (500, 503)         │
//! ├─────────────────────────┼───────────────────┼───────────────────────────┤
//! │ NotFound                │ RateLimited       │ Database (transient, 503) │
//! │ Conflict                │                   │ Internal                  │
//! │                         │                   │ ServiceUnavailable        │
//! └─────────────────────────┴───────────────────┴───────────────────────────┘
//! ```
//!
//! ## HTTP Response Format
//!
//! All errors are serialized to a consistent JSON format:
//!
//! ```json
//! {
//!   "code": "POLICY_VIOLATION",
//!   "message": "Password policy violation",
//!   "details": { ... },
//!   "timestamp": "2026-01-15T10:30:00Z"
//! }
//! ```

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
///
/// Each variant represents a specific error condition and maps to an
/// appropriate HTTP status code. The `#[error]` attribute defines the
/// error message format.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================

    /// Wrong username/password combination. The same variant is returned for
    /// unknown users so the response does not reveal which accounts exist.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account locked after repeated login failures.
    /// `until` is `None` for permanent lockouts (admin unlock required).
    #[error("Account locked")]
    AccountLocked {
        /// When the account unlocks on its own, if it does
        until: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// Account exists but is disabled.
    #[error("Account disabled")]
    AccountDisabled,

    /// Bearer token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Bearer token is malformed, has an invalid signature, or was revoked.
    #[error("Invalid token")]
    InvalidToken,

    /// Request doesn't include required authentication.
    #[error("Missing authentication")]
    MissingAuth,

    // =========================================================================
    // Authorization Errors (403 Forbidden)
    // =========================================================================

    /// The caller is authenticated but the action is not allowed.
    /// Also used for requests against a disabled realm.
    #[error("Forbidden: {reason}")]
    Forbidden {
        /// Short description of what was refused
        reason: String,
    },

    // =========================================================================
    // Validation Errors (400 Bad Request)
    // =========================================================================

    /// Request body failed validation rules.
    /// Contains field-level errors from the `validator` crate.
    #[error("Validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic bad request with custom message.
    #[error("Invalid input: {message}")]
    BadRequest {
        /// Human-readable description of what's wrong
        message: String,
    },

    /// A password failed the realm's password policy.
    /// Carries one message per violated rule.
    #[error("Password policy violation")]
    PolicyViolation {
        /// Violated rules, user-presentable
        errors: Vec<String>,
    },

    // =========================================================================
    // Resource Errors (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource identifier (e.g., "realm:acme", "user:123")
        resource: String,
    },

    /// Action would create a duplicate or violate a uniqueness constraint.
    #[error("Resource already exists: {resource}")]
    Conflict {
        /// Description of the conflict (e.g., "username already taken")
        resource: String,
    },

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// Client has exceeded request rate limits.
    #[error("Too many requests")]
    RateLimited {
        /// Seconds until the client can retry
        retry_after_seconds: u64,
    },

    // =========================================================================
    // Server Errors (500 Internal Server Error, 503 Service Unavailable)
    // =========================================================================
    // Logged as errors and monitored. Details are NOT exposed to clients.

    /// PostgreSQL operation failed. Treated as transient storage trouble:
    /// surfaces as 503 so clients retry instead of giving up.
    #[error("Storage temporarily unavailable")]
    Database(#[from] sqlx::Error),

    /// Unspecified internal error. Use as last resort.
    #[error("Internal server error")]
    Internal {
        /// Internal message for logging (not exposed to client)
        message: String,
    },

    /// External collaborator (federation directory, mail relay) is down.
    #[error("Service unavailable")]
    ServiceUnavailable {
        /// Name of the unavailable service
        service: String,
    },
}

// =============================================================================
// Error Methods
// =============================================================================

impl ApiError {
    /// Returns a machine-readable error code.
    ///
    /// These codes are stable and can be used by API clients for
    /// programmatic error handling (SCREAMING_SNAKE_CASE).
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::MissingAuth => "MISSING_AUTH",
            // Authorization
            Self::Forbidden { .. } => "FORBIDDEN",
            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::PolicyViolation { .. } => "POLICY_VIOLATION",
            // Resources
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            // Rate limiting
            Self::RateLimited { .. } => "RATE_LIMITED",
            // Server
            Self::Database(_) => "TRANSIENT_STORAGE",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized - Authentication required or failed
            Self::InvalidCredentials
            | Self::AccountLocked { .. }
            | Self::AccountDisabled
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::MissingAuth => StatusCode::UNAUTHORIZED,

            // 403 Forbidden - Authenticated but not authorized
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 400 Bad Request - Client sent invalid data
            Self::ValidationError(_) | Self::BadRequest { .. } | Self::PolicyViolation { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found - Resource doesn't exist
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict - Would violate uniqueness/business rules
            Self::Conflict { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests - Rate limit exceeded
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable - storage or dependency is down
            Self::Database(_) | Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level and never expose internal
    /// details to clients. Client errors (4xx) are logged at WARN level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Internal { .. } | Self::ServiceUnavailable { .. }
        )
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Standard error response body for the API.
///
/// All non-protocol errors are serialized to this format for consistency.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: String,

    /// Human-readable message (for debugging, not for user display)
    pub message: String,

    /// Additional error details (varies by error type).
    /// - ValidationError: field-level errors
    /// - PolicyViolation: violated rules
    /// - RateLimited: `retry_after_seconds`
    /// - AccountLocked: `locked_until`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// When the error occurred (ISO 8601 format)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    /// Creates a new error response from an `ApiError`.
    ///
    /// Automatically extracts relevant details based on error type.
    pub fn new(error: &ApiError) -> Self {
        let details = match error {
            ApiError::ValidationError(errors) => {
                Some(serde_json::to_value(errors).unwrap_or_default())
            }
            ApiError::PolicyViolation { errors } => {
                Some(serde_json::json!({ "violations": errors }))
            }
            ApiError::RateLimited {
                retry_after_seconds,
            } => Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ApiError::AccountLocked { until } => Some(serde_json::json!({ "locked_until": until })),
            // Server errors: don't expose internal details
            ApiError::Database(_) | ApiError::Internal { .. } | ApiError::ServiceUnavailable { .. } => {
                None
            }
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
            timestamp: chrono::Utc::now(),
        }
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Implements Actix-web's `ResponseError` trait.
///
/// This allows returning `ApiError` directly from handlers:
///
/// ```rust,ignore
/// async fn handler() -> Result<impl Responder, ApiError> {
///     Err(ApiError::NotFound { resource: "realm:acme".into() })
/// }
/// ```
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        // Delegate to our implementation
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let response = ErrorResponse::new(self);
        HttpResponse::build(self.status_code()).json(response)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_errors_return_401() {
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::AccountLocked { until: None }.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::AccountDisabled.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingAuth.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_policy_violation_returns_400_with_details() {
        let error = ApiError::PolicyViolation {
            errors: vec!["too short".to_string()],
        };
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let response = ErrorResponse::new(&error);
        assert_eq!(response.code, "POLICY_VIOLATION");
        assert!(response.details.is_some());
    }

    #[test]
    fn test_resource_errors() {
        assert_eq!(
            ApiError::NotFound {
                resource: "realm:acme".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict {
                resource: "username".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_transient_storage_maps_to_503() {
        let error = ApiError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.error_code(), "TRANSIENT_STORAGE");
        assert!(error.is_server_error());
    }

    #[test]
    fn test_error_codes_are_screaming_snake_case() {
        assert_eq!(
            ApiError::InvalidCredentials.error_code(),
            "INVALID_CREDENTIALS"
        );
        assert_eq!(
            ApiError::Forbidden {
                reason: "realm disabled".to_string()
            }
            .error_code(),
            "FORBIDDEN"
        );
        assert_eq!(
            ApiError::RateLimited {
                retry_after_seconds: 60
            }
            .error_code(),
            "RATE_LIMITED"
        );
    }

    #[test]
    fn test_server_errors_are_flagged() {
        assert!(ApiError::Internal {
            message: "test".to_string()
        }
        .is_server_error());
        assert!(ApiError::ServiceUnavailable {
            service: "ldap".to_string()
        }
        .is_server_error());
        assert!(!ApiError::InvalidCredentials.is_server_error());
    }
}

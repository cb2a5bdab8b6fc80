//! # Request Validation Helpers
//!
//! Utilities for validating incoming request data using the `validator` crate.
//!
//! DTOs derive `Validate` and handlers call [`validate_request`] before
//! touching the service layer. Failures surface as
//! [`ApiError::ValidationError`](crate::errors::ApiError) with field-level
//! details in the 400 response body.
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Validate)]
//! struct RegisterRequest {
//!     #[validate(custom(function = "validators::valid_username"))]
//!     username: String,
//!
//!     #[validate(email)]
//!     email: String,
//! }
//! ```

use crate::errors::ApiError;
use serde::de::DeserializeOwned;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details if validation
/// fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

/// Parses a JSON string and validates in a single step.
///
/// ## Errors
///
/// - `ApiError::BadRequest` if JSON parsing fails
/// - `ApiError::ValidationError` if validation fails
pub fn parse_and_validate<T: DeserializeOwned + Validate>(json: &str) -> Result<T, ApiError> {
    let data: T = serde_json::from_str(json).map_err(|e| ApiError::BadRequest {
        message: e.to_string(),
    })?;

    validate_request(&data)?;

    Ok(data)
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
///
/// These functions follow the validator crate's signature:
/// `fn(&T) -> Result<(), ValidationError>`
pub mod validators {
    use validator::ValidationError;

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates a realm name.
    ///
    /// Realm names appear in URLs (`/realms/{name}/...`) and in the issuer
    /// claim of every token, so they are restricted to a URL-safe alphabet:
    ///
    /// - lowercase letters, digits, hyphens
    /// - must not start or end with a hyphen
    /// - no consecutive hyphens
    /// - 1 to 64 characters
    pub fn valid_realm_name(value: &str) -> Result<(), ValidationError> {
        if value.is_empty() || value.len() > 64 {
            return Err(ValidationError::new("invalid_realm_name"));
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::new("invalid_realm_name"));
        }

        if value.starts_with('-') || value.ends_with('-') || value.contains("--") {
            return Err(ValidationError::new("invalid_realm_name"));
        }

        Ok(())
    }

    /// Validates a username.
    ///
    /// Usernames are login identifiers: printable ASCII without whitespace,
    /// 1 to 128 characters. Uniqueness is enforced per realm by the database.
    pub fn valid_username(value: &str) -> Result<(), ValidationError> {
        if value.is_empty() || value.len() > 128 {
            return Err(ValidationError::new("invalid_username"));
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::new("invalid_username"));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("  hello  ").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_valid_realm_name_accepts_url_safe_names() {
        assert!(valid_realm_name("acme").is_ok());
        assert!(valid_realm_name("acme-corp").is_ok());
        assert!(valid_realm_name("realm2").is_ok());
        assert!(valid_realm_name("a").is_ok());
    }

    #[test]
    fn test_valid_realm_name_rejects_bad_shapes() {
        assert!(valid_realm_name("").is_err());
        assert!(valid_realm_name("Acme").is_err());
        assert!(valid_realm_name("-acme").is_err());
        assert!(valid_realm_name("acme-").is_err());
        assert!(valid_realm_name("ac--me").is_err());
        assert!(valid_realm_name("ac me").is_err());
        assert!(valid_realm_name("acme/evil").is_err());
        assert!(valid_realm_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_valid_username() {
        assert!(valid_username("alice").is_ok());
        assert!(valid_username("alice.smith@example.com").is_ok());
        assert!(valid_username("").is_err());
        assert!(valid_username("with space").is_err());
        assert!(valid_username(&"x".repeat(129)).is_err());
    }
}

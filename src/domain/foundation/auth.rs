//! Authentication types for the domain layer.
//!
//! An `AuthenticatedUser` is produced by a `SessionValidator` when a
//! WebSocket client upgrades. Its user and organization ids are the
//! recipient context the hub routes events against.

use super::{OrganizationId, UserId};
use thiserror::Error;

/// Authenticated dashboard user extracted from a validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// The user the token was issued to.
    pub id: UserId,

    /// Organization the user acts on behalf of.
    pub organization_id: OrganizationId,

    /// Email address from the token claims, if present.
    pub email: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            id,
            organization_id,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Authentication errors that can occur during token validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied with the request.
    #[error("Missing token")]
    MissingToken,

    /// The token is malformed or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The authentication backend is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_unavailable_is_transient() {
        assert!(AuthError::service_unavailable("down").is_transient());
        assert!(!AuthError::InvalidToken.is_transient());
        assert!(!AuthError::TokenExpired.is_transient());
        assert!(!AuthError::MissingToken.is_transient());
    }

    #[test]
    fn with_email_sets_optional_claim() {
        let user = AuthenticatedUser::new(UserId::new(), OrganizationId::new())
            .with_email("agent@example.com");
        assert_eq!(user.email.as_deref(), Some("agent@example.com"));
    }
}

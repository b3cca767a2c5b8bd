//! Session validation port for bearer tokens presented at WebSocket upgrade.
//!
//! Tokens are issued elsewhere. This port only verifies them and extracts
//! the user and organization the connection will receive events for.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Validates access tokens and extracts user identity.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature and expiry
/// - Return `AuthError::InvalidToken` for malformed/bad signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a raw token (without "Bearer " prefix).
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{OrganizationId, UserId};

    struct FixedValidator(AuthenticatedUser);

    #[async_trait]
    impl SessionValidator for FixedValidator {
        async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
            if token == "good" {
                Ok(self.0.clone())
            } else {
                Err(AuthError::InvalidToken)
            }
        }
    }

    #[tokio::test]
    async fn validator_is_usable_as_trait_object() {
        let user = AuthenticatedUser::new(UserId::new(), OrganizationId::new());
        let validator: Box<dyn SessionValidator> = Box::new(FixedValidator(user.clone()));

        assert_eq!(validator.validate("good").await.unwrap(), user);
        assert_eq!(
            validator.validate("bad").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }
}

//! Mock session validator for testing.
//!
//! # Example
//!
//! ```ignore
//! use campaign_relay::adapters::auth::MockSessionValidator;
//! use campaign_relay::domain::foundation::{AuthenticatedUser, OrganizationId, UserId};
//!
//! let validator = MockSessionValidator::new()
//!     .with_user("valid-token", AuthenticatedUser::new(UserId::new(), OrganizationId::new()));
//!
//! assert!(validator.validate("valid-token").await.is_ok());
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, OrganizationId, UserId};
use crate::ports::SessionValidator;

/// Stores a map of tokens to users. Tokens not in the map return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    /// Returned for every validation when set
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid token that maps to a user.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.add_token(token, user);
        self
    }

    /// Adds a token for a fresh user in `organization_id` and returns that user.
    pub fn add_member(&self, token: impl Into<String>, organization_id: OrganizationId) -> AuthenticatedUser {
        let user = AuthenticatedUser::new(UserId::new(), organization_id);
        self.add_token(token, user.clone());
        user
    }

    /// Forces all validations to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self
            .force_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    pub fn clear_error(&self) {
        *self
            .force_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn add_token(&self, token: impl Into<String>, user: AuthenticatedUser) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
    }

    pub fn remove_token(&self, token: &str) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

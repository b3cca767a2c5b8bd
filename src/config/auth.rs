//! Authentication configuration for the WebSocket upgrade.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// HS256 bearer-token verification settings.
///
/// Tokens are issued by the CRUD tier; this service only verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret used to verify token signatures
    pub jwt_secret: SecretString,

    /// Expected `iss` claim, if the issuer sets one
    pub issuer: Option<String>,

    /// Expected `aud` claim, if the issuer sets one
    pub audience: Option<String>,
}

impl AuthConfig {
    /// Validate authentication configuration
    ///
    /// Production deployments require a secret of at least 32 bytes.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH_JWT_SECRET"));
        }
        if *environment == Environment::Production && secret.len() < 32 {
            return Err(ValidationError::JwtSecretTooShort);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: SecretString::new(secret.to_string()),
            issuer: None,
            audience: None,
        }
    }

    #[test]
    fn empty_secret_is_missing() {
        assert_eq!(
            config("").validate(&Environment::Development),
            Err(ValidationError::MissingRequired("AUTH_JWT_SECRET"))
        );
    }

    #[test]
    fn short_secret_is_fine_outside_production() {
        assert!(config("dev-secret").validate(&Environment::Development).is_ok());
        assert_eq!(
            config("dev-secret").validate(&Environment::Production),
            Err(ValidationError::JwtSecretTooShort)
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", config("super-secret-value"));
        assert!(!rendered.contains("super-secret-value"));
    }
}

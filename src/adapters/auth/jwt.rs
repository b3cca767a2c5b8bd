//! HS256 bearer-token validator.
//!
//! Dashboard tokens are signed by the CRUD tier with a shared secret.
//! Claims carry the user (`sub`) and the organization (`org`) the
//! connection routes events for.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::domain::foundation::{AuthError, AuthenticatedUser, OrganizationId, UserId};
use crate::ports::SessionValidator;

/// Claims the validator reads from a dashboard token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub org: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub exp: i64,
}

/// Verifies dashboard tokens against the shared HMAC secret.
pub struct JwtSessionValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtSessionValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // iss and aud are only compared when present, so a configured
        // value must also be a required claim.
        let mut required = vec!["exp", "sub"];
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        match &config.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required);

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

fn parse_uuid(value: &str, claim: &'static str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(value).map_err(|_| {
        tracing::warn!(claim, "Token claim is not a UUID");
        AuthError::InvalidToken
    })
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Token expired");
                    AuthError::TokenExpired
                }
                _ => {
                    tracing::warn!("Token validation failed: {}", e);
                    AuthError::InvalidToken
                }
            }
        })?;

        let claims = data.claims;
        let user = AuthenticatedUser::new(
            UserId::from_uuid(parse_uuid(&claims.sub, "sub")?),
            OrganizationId::from_uuid(parse_uuid(&claims.org, "org")?),
        );
        Ok(match claims.email {
            Some(email) => user.with_email(email),
            None => user,
        })
    }
}

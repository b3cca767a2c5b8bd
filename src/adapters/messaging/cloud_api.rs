//! Graph-style cloud messaging API client.
//!
//! Sends pre-approved templates with
//! `POST {base}/{version}/{phone_number_id}/messages` and a bearer token.
//! HTTP failures are mapped onto `MessagingApiError` so the sender can
//! tell retryable failures from permanent ones.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MessagingConfig;
use crate::domain::campaign::{AccountCredentials, TemplateMessage};
use crate::domain::foundation::ExternalMessageId;
use crate::ports::{MessagingApiClient, MessagingApiError, MessagingClientFactory};

// ════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    template: TemplatePayload<'a>,
    biz_opaque_callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplatePayload<'a> {
    name: &'a str,
    language: Language<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<Component<'a>>,
}

#[derive(Debug, Serialize)]
struct Language<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct Component<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: Vec<TextParameter<'a>>,
}

#[derive(Debug, Serialize)]
struct TextParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl<'a> SendRequest<'a> {
    fn new(phone_number: &'a str, message: &'a TemplateMessage) -> Self {
        let components = if message.variables.is_empty() {
            Vec::new()
        } else {
            vec![Component {
                kind: "body",
                parameters: message
                    .variables
                    .iter()
                    .map(|text| TextParameter { kind: "text", text })
                    .collect(),
            }]
        };

        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: phone_number,
            kind: "template",
            template: TemplatePayload {
                name: &message.template_name,
                language: Language {
                    code: &message.language,
                },
                components,
            },
            biz_opaque_callback_data: &message.client_reference,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Client
// ════════════════════════════════════════════════════════════════════════════

/// Client bound to one sender phone number.
pub struct CloudApiClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

impl CloudApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_version: &str,
        phone_number_id: &str,
        access_token: SecretString,
    ) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/{}/{}/messages",
                base_url.trim_end_matches('/'),
                api_version,
                phone_number_id
            ),
            access_token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MessagingApiClient for CloudApiClient {
    async fn send_template_message(
        &self,
        phone_number: &str,
        message: &TemplateMessage,
    ) -> Result<ExternalMessageId, MessagingApiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .json(&SendRequest::new(phone_number, message))
            .send()
            .await
            .map_err(|e| MessagingApiError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| MessagingApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body, retry_after));
        }

        let parsed: SendResponse = serde_json::from_str(&body).map_err(|e| {
            MessagingApiError::Server {
                status: status.as_u16(),
                message: format!("unreadable response: {}", e),
            }
        })?;

        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| ExternalMessageId::new(m.id))
            .ok_or_else(|| MessagingApiError::Server {
                status: status.as_u16(),
                message: "response carried no message id".to_string(),
            })
    }
}

/// Maps a non-success HTTP response onto the port's error taxonomy.
fn classify_failure(status: StatusCode, body: &str, retry_after: Option<u64>) -> MessagingApiError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        StatusCode::TOO_MANY_REQUESTS => MessagingApiError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MessagingApiError::Unauthorized(message),
        s if s.is_server_error() => MessagingApiError::Server {
            status: s.as_u16(),
            message,
        },
        s => MessagingApiError::Validation {
            status: s.as_u16(),
            message,
        },
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Factory
// ════════════════════════════════════════════════════════════════════════════

/// Builds `CloudApiClient`s sharing one connection pool.
#[derive(Clone)]
pub struct CloudApiClientFactory {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl CloudApiClientFactory {
    pub fn new(config: &MessagingConfig) -> Result<Self, MessagingApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| MessagingApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

impl MessagingClientFactory for CloudApiClientFactory {
    fn client_for(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Arc<dyn MessagingApiClient>, MessagingApiError> {
        if credentials.phone_number_id.trim().is_empty() {
            return Err(MessagingApiError::InvalidCredentials(format!(
                "account {} has no sender phone number",
                credentials.account_id
            )));
        }
        if credentials.access_token.expose_secret().trim().is_empty() {
            return Err(MessagingApiError::InvalidCredentials(format!(
                "account {} has no access token",
                credentials.account_id
            )));
        }

        let base_url = credentials.api_base_url.as_deref().unwrap_or(&self.base_url);
        Ok(Arc::new(CloudApiClient::new(
            self.http.clone(),
            base_url,
            &self.api_version,
            &credentials.phone_number_id,
            credentials.access_token.clone(),
        )))
    }
}

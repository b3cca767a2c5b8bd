//! MessageSender - one API call per dispatch unit, classified.

use std::sync::Arc;

use crate::domain::campaign::{DispatchUnit, SendOutcome};
use crate::ports::{MessagingApiClient, MessagingApiError};

/// Stateless wrapper around a messaging client.
///
/// Retries and persistence belong to the worker.
#[derive(Clone)]
pub struct MessageSender {
    client: Arc<dyn MessagingApiClient>,
}

impl MessageSender {
    pub fn new(client: Arc<dyn MessagingApiClient>) -> Self {
        Self { client }
    }

    pub async fn send(&self, unit: &DispatchUnit) -> SendOutcome {
        match self
            .client
            .send_template_message(&unit.contact.phone_number, &unit.message)
            .await
        {
            Ok(external_id) => SendOutcome::Sent(external_id),
            Err(e) => classify(&e),
        }
    }
}

fn classify(error: &MessagingApiError) -> SendOutcome {
    if error.is_transient() {
        SendOutcome::TransientFailure {
            reason: error.to_string(),
            retry_after: error.retry_after(),
        }
    } else {
        SendOutcome::PermanentFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::messaging::MockMessagingClient;
    use crate::domain::campaign::{Campaign, Contact, TemplateRef};
    use crate::domain::foundation::OrganizationId;

    fn unit(phone: &str) -> DispatchUnit {
        let campaign = Campaign::new(
            OrganizationId::new(),
            "spring sale",
            TemplateRef::new("promo", "en").with_parameters(["name"]),
            vec![1],
        );
        DispatchUnit::render(&campaign, Contact::new(7i64, phone).with_name("Ada"))
    }

    #[tokio::test]
    async fn success_carries_external_id() {
        let client = MockMessagingClient::new();
        let sender = MessageSender::new(Arc::new(client.clone()));

        let outcome = sender.send(&unit("+15550100")).await;

        assert!(matches!(outcome, SendOutcome::Sent(_)));
        let calls = client.calls();
        assert_eq!(calls[0].phone_number, "+15550100");
        assert_eq!(calls[0].message.variables, vec!["Ada".to_string()]);
    }

    #[tokio::test]
    async fn throttling_and_upstream_errors_are_transient() {
        for error in [
            MessagingApiError::RateLimited { retry_after_secs: Some(1) },
            MessagingApiError::Server { status: 503, message: "unavailable".into() },
            MessagingApiError::Transport("connection reset".into()),
        ] {
            let client = MockMessagingClient::new().always_fail(error);
            let outcome = MessageSender::new(Arc::new(client)).send(&unit("+1")).await;
            assert!(outcome.is_transient(), "{:?}", outcome);
        }
    }

    #[tokio::test]
    async fn throttling_keeps_the_requested_delay() {
        let client = MockMessagingClient::new()
            .always_fail(MessagingApiError::RateLimited { retry_after_secs: Some(30) });

        let outcome = MessageSender::new(Arc::new(client)).send(&unit("+1")).await;

        match outcome {
            SendOutcome::TransientFailure { retry_after, .. } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(30)));
            }
            other => panic!("expected transient failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn validation_and_auth_errors_are_permanent() {
        for error in [
            MessagingApiError::Validation { status: 400, message: "bad number".into() },
            MessagingApiError::Unauthorized("token revoked".into()),
        ] {
            let client = MockMessagingClient::new().always_fail(error);
            let outcome = MessageSender::new(Arc::new(client)).send(&unit("+1")).await;
            assert!(matches!(outcome, SendOutcome::PermanentFailure(_)), "{:?}", outcome);
        }
    }
}

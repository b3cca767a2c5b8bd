//! Mock messaging client for testing.
//!
//! Succeeds by default with generated message ids. Failures can be
//! scripted per phone number, and every call is recorded.
//!
//! # Example
//!
//! ```ignore
//! let client = MockMessagingClient::new()
//!     .fail_times("+15550101", 2, MessagingApiError::Transport("reset".into()));
//!
//! // First two sends to +15550101 fail, the third succeeds.
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::domain::campaign::{AccountCredentials, TemplateMessage};
use crate::domain::foundation::ExternalMessageId;
use crate::ports::{MessagingApiClient, MessagingApiError, MessagingClientFactory};

/// A recorded send attempt.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub phone_number: String,
    pub message: TemplateMessage,
    pub at: Instant,
}

/// Scriptable in-process messaging client.
#[derive(Debug, Clone, Default)]
pub struct MockMessagingClient {
    scripted: Arc<Mutex<HashMap<String, VecDeque<MessagingApiError>>>>,
    always: Arc<Mutex<Option<MessagingApiError>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<RecordedSend>>>,
    next_id: Arc<AtomicU64>,
}

impl MockMessagingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated latency per send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next `times` sends to `phone_number` fail with `error`.
    pub fn fail_times(self, phone_number: impl Into<String>, times: usize, error: MessagingApiError) -> Self {
        self.script_failures(phone_number, times, error);
        self
    }

    /// Every send fails with `error` until `clear_failures` is called.
    pub fn always_fail(self, error: MessagingApiError) -> Self {
        *self.always.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    pub fn script_failures(&self, phone_number: impl Into<String>, times: usize, error: MessagingApiError) {
        let mut scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = scripted.entry(phone_number.into()).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    pub fn clear_failures(&self) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.always.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // === Verification ===

    pub fn calls(&self) -> Vec<RecordedSend> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls_to(&self, phone_number: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.phone_number == phone_number)
            .count()
    }

    fn next_failure(&self, phone_number: &str) -> Option<MessagingApiError> {
        if let Some(error) = self
            .always
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Some(error);
        }
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(phone_number)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl MessagingApiClient for MockMessagingClient {
    async fn send_template_message(
        &self,
        phone_number: &str,
        message: &TemplateMessage,
    ) -> Result<ExternalMessageId, MessagingApiError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedSend {
                phone_number: phone_number.to_string(),
                message: message.clone(),
                at: Instant::now(),
            });

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self.next_failure(phone_number) {
            Some(error) => Err(error),
            None => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ExternalMessageId::new(format!("mock-{}", n)))
            }
        }
    }
}

/// Hands every account the same `MockMessagingClient`.
#[derive(Debug, Clone, Default)]
pub struct MockMessagingClientFactory {
    client: MockMessagingClient,
    reject: Arc<Mutex<Option<MessagingApiError>>>,
}

impl MockMessagingClientFactory {
    pub fn new(client: MockMessagingClient) -> Self {
        Self {
            client,
            reject: Arc::default(),
        }
    }

    /// Every `client_for` call fails with `error`.
    pub fn rejecting(self, error: MessagingApiError) -> Self {
        *self.reject.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    pub fn client(&self) -> &MockMessagingClient {
        &self.client
    }
}

impl MessagingClientFactory for MockMessagingClientFactory {
    fn client_for(
        &self,
        _credentials: &AccountCredentials,
    ) -> Result<Arc<dyn MessagingApiClient>, MessagingApiError> {
        if let Some(error) = self
            .reject
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }
        Ok(Arc::new(self.client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> TemplateMessage {
        TemplateMessage {
            template_name: "t".to_string(),
            language: "en".to_string(),
            variables: vec![],
            client_reference: "c:1".to_string(),
        }
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let client = MockMessagingClient::new().fail_times(
            "+1",
            2,
            MessagingApiError::Transport("reset".into()),
        );

        assert!(client.send_template_message("+1", &message()).await.is_err());
        assert!(client.send_template_message("+2", &message()).await.is_ok());
        assert!(client.send_template_message("+1", &message()).await.is_err());
        assert!(client.send_template_message("+1", &message()).await.is_ok());

        assert_eq!(client.calls_to("+1"), 3);
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn generated_ids_are_distinct() {
        let client = MockMessagingClient::new();
        let a = client.send_template_message("+1", &message()).await.unwrap();
        let b = client.send_template_message("+1", &message()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn factory_shares_the_client() {
        let factory = MockMessagingClientFactory::new(MockMessagingClient::new());
        let creds = AccountCredentials::new("acct", "1055", "token");

        let built = factory.client_for(&creds).ok().unwrap();
        built.send_template_message("+1", &message()).await.unwrap();

        assert_eq!(factory.client().call_count(), 1);
    }

    #[test]
    fn rejecting_factory_fails() {
        let factory = MockMessagingClientFactory::default()
            .rejecting(MessagingApiError::InvalidCredentials("revoked".into()));
        let creds = AccountCredentials::new("acct", "1055", "token");
        assert!(factory.client_for(&creds).is_err());
    }
}

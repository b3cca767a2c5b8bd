//! Campaign recipients.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::ContactId;

/// A recipient reachable through one of a campaign's contact lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub phone_number: String,
    pub name: Option<String>,
    /// Free-form values usable as template variables.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Contact {
    pub fn new(id: impl Into<ContactId>, phone_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phone_number: phone_number.into(),
            name: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Resolves a template parameter key against this contact.
    ///
    /// Unknown keys resolve to an empty string.
    pub fn variable(&self, key: &str) -> String {
        match key {
            "name" => self.name.clone().unwrap_or_default(),
            "phone_number" => self.phone_number.clone(),
            other => self.attributes.get(other).cloned().unwrap_or_default(),
        }
    }
}

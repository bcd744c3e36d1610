//! Minimal message model and the policy convenience surface over it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::policy::EncryptionPolicy;

/// Message property bag. Values are JSON so headers written by other
/// producers round-trip unchanged.
pub type Properties = HashMap<String, serde_json::Value>;

/// A message with an opaque body and application properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub body: Vec<u8>,
    pub properties: Properties,
}

impl Message {
    /// New message with a random id and no properties.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Encrypt/decrypt a message through an optional policy.
///
/// With `None` the message is returned unchanged, so callers can thread
/// an optional policy through without branching.
#[async_trait]
pub trait MessageExt: Sized + Send {
    async fn encrypt(
        self,
        policy: Option<&EncryptionPolicy>,
        cancel: &CancellationToken,
    ) -> Result<Self>;

    async fn decrypt(
        self,
        policy: Option<&EncryptionPolicy>,
        cancel: &CancellationToken,
    ) -> Result<Self>;
}

#[async_trait]
impl MessageExt for Message {
    async fn encrypt(
        self,
        policy: Option<&EncryptionPolicy>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        match policy {
            Some(policy) => policy.encrypt_message(self, cancel).await,
            None => Ok(self),
        }
    }

    async fn decrypt(
        self,
        policy: Option<&EncryptionPolicy>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        match policy {
            Some(policy) => policy.decrypt_message(self, cancel).await,
            None => Ok(self),
        }
    }
}

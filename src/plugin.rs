//! Message pipeline hooks.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Message;
use crate::policy::EncryptionPolicy;

// ============================================================================
// MessagePlugin — hook boundary for a messaging client
// ============================================================================

/// Hook invoked by a messaging client around send and receive.
#[async_trait]
pub trait MessagePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Transform an outgoing message before it is handed to the transport.
    async fn before_message_send(&self, message: Message) -> Result<Message>;

    /// Transform an incoming message before it is handed to the application.
    async fn after_message_receive(&self, message: Message) -> Result<Message>;
}

// ============================================================================
// MessageBodyEncryptionPlugin
// ============================================================================

/// Encrypts bodies on send and decrypts them on receive.
#[derive(Debug, Clone)]
pub struct MessageBodyEncryptionPlugin {
    policy: Arc<EncryptionPolicy>,
}

impl MessageBodyEncryptionPlugin {
    pub const NAME: &'static str = "Message body encryption plugin";

    pub fn new(policy: Arc<EncryptionPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Arc<EncryptionPolicy> {
        &self.policy
    }
}

#[async_trait]
impl MessagePlugin for MessageBodyEncryptionPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn before_message_send(&self, message: Message) -> Result<Message> {
        self.policy
            .encrypt_message(message, &CancellationToken::new())
            .await
    }

    async fn after_message_receive(&self, message: Message) -> Result<Message> {
        self.policy
            .decrypt_message(message, &CancellationToken::new())
            .await
    }
}

//! The encryption policy: key selection, envelope handling, and the
//! encrypt/decrypt pipelines.
//!
//! Encrypt: supplied key → fresh content key → wrap → envelope → AES-CBC
//! Decrypt: envelope → validate → resolve/match key → unwrap → AES-CBC

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::aes_cbc::{decrypt_cbc, ContentKey};
use crate::envelope::{
    deserialize_envelope, serialize_envelope, EncryptionAlgorithm, EncryptionEnvelope,
    ValidEnvelope, WrappedContentKey,
};
use crate::error::{EncryptionError, KeyProviderError, Result};
use crate::key::{KeyResolver, KeySupplier, ProtectingKey, StaticKeySupplier};
use crate::message::{Message, Properties};
use crate::options::EncryptionPolicyOptions;
use crate::types::ENCRYPTION_HEADER_DATA_KEY;

/// Race `fut` against cancellation. Dropping `fut` releases whatever it holds,
/// including the key cache's init permit.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EncryptionError::Cancelled),
        result = fut => result,
    }
}

/// Envelope encryption policy for message bodies.
///
/// A policy is bound to a single encryption key for its lifetime: the key
/// supplier runs at most once, even under concurrent use, and the result is
/// cached. Share it across tasks behind an `Arc`.
pub struct EncryptionPolicy {
    key_supplier: Option<Arc<dyn KeySupplier>>,
    key_resolver: Option<Arc<dyn KeyResolver>>,
    /// Write-once. Initialization is serialized by the cell's internal
    /// single-permit semaphore and re-checked after the permit is acquired.
    cached_encryption_key: OnceCell<Arc<dyn ProtectingKey>>,
}

impl EncryptionPolicy {
    /// Create a policy from validated options.
    pub fn new(options: EncryptionPolicyOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            key_supplier: options.key_supplier,
            key_resolver: options.key_resolver,
            cached_encryption_key: OnceCell::new(),
        })
    }

    /// Create a policy from a concrete key and/or a resolver.
    ///
    /// With a key, encryption uses it directly (pre-cached) and decryption
    /// falls back to it when no resolver is given.
    pub fn with_key(
        encryption_key: Option<Arc<dyn ProtectingKey>>,
        decryption_key_resolver: Option<Arc<dyn KeyResolver>>,
    ) -> Result<Self> {
        let options = EncryptionPolicyOptions {
            key_supplier: encryption_key.clone().map(|key| {
                Arc::new(StaticKeySupplier::new(key)) as Arc<dyn KeySupplier>
            }),
            key_resolver: decryption_key_resolver,
        };
        options.validate()?;
        Ok(Self {
            key_supplier: options.key_supplier,
            key_resolver: options.key_resolver,
            cached_encryption_key: OnceCell::new_with(encryption_key),
        })
    }

    /// The configured decryption key resolver, if any.
    pub fn decryption_key_resolver(&self) -> Option<&Arc<dyn KeyResolver>> {
        self.key_resolver.as_ref()
    }

    /// Whether a key supplier is configured.
    pub fn can_encrypt(&self) -> bool {
        self.key_supplier.is_some()
    }

    /// Whether the encryption key has been resolved and cached.
    pub fn is_encryption_key_cached(&self) -> bool {
        self.cached_encryption_key.initialized()
    }

    // ========================================================================
    // Key acquisition
    // ========================================================================

    /// Get the encryption key, invoking the supplier on first use only.
    async fn encryption_key(&self, cancel: &CancellationToken) -> Result<Arc<dyn ProtectingKey>> {
        let supplier = self.key_supplier.as_ref().ok_or_else(|| {
            EncryptionError::Configuration("No encryption key has been initialized".to_string())
        })?;

        let init = self.cached_encryption_key.get_or_try_init(|| async {
            supplier
                .supply_key(cancel)
                .await
                .map_err(EncryptionError::KeyProvider)?
                .ok_or_else(|| {
                    EncryptionError::KeyNotFound("Encryption key could not be resolved".to_string())
                })
        });

        cancellable(cancel, init).await.map(Arc::clone)
    }

    /// Pick the key that can unwrap this envelope's content key.
    async fn decryption_key(
        &self,
        envelope: &ValidEnvelope<'_>,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ProtectingKey>> {
        if let Some(resolver) = &self.key_resolver {
            debug!(key_id = envelope.key_id, "trying key resolver");
            let resolved = cancellable(cancel, async {
                resolver
                    .resolve_key(envelope.key_id, cancel)
                    .await
                    .map_err(EncryptionError::KeyProvider)
            })
            .await?;
            let key = resolved.ok_or_else(|| {
                EncryptionError::KeyNotFound(format!(
                    "No decryption key could be resolved for {:?}",
                    envelope.key_id
                ))
            })?;
            debug!(key_id = key.key_id(), "decryption key found");
            return Ok(key);
        }

        if self.key_supplier.is_some() {
            let key = self.encryption_key(cancel).await?;
            // Ordinal comparison: a policy's own key only opens its own messages.
            if key.key_id() != envelope.key_id {
                return Err(EncryptionError::KeyMismatch {
                    expected: envelope.key_id.to_string(),
                    actual: key.key_id().to_string(),
                });
            }
            debug!(key_id = key.key_id(), "using original encryption key");
            return Ok(key);
        }

        Err(EncryptionError::KeyNotFound(
            "Could not resolve a decryption key".to_string(),
        ))
    }

    // ========================================================================
    // Body pipelines
    // ========================================================================

    /// Encrypt `body`, writing the serialized envelope into `properties`
    /// under [`ENCRYPTION_HEADER_DATA_KEY`].
    pub async fn encrypt_body(
        &self,
        body: &[u8],
        properties: &mut Properties,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let key = self.encryption_key(cancel).await?;
        debug!(key_id = key.key_id(), "using key for encryption");

        let content_key =
            ContentKey::generate().map_err(|e| EncryptionError::EncryptionFailed(Box::new(e)))?;

        // The wrap algorithm is whatever the key reports; no hint is sent.
        let wrapped = cancellable(cancel, async {
            key.wrap_key(content_key.key(), None, cancel)
                .await
                .map_err(|e| EncryptionError::EncryptionFailed(Box::new(e)))
        })
        .await?;

        let envelope = EncryptionEnvelope::new(
            EncryptionAlgorithm::AesCbc256,
            content_key.iv().to_vec(),
            WrappedContentKey::new(key.key_id(), wrapped.wrapped_key, wrapped.algorithm),
        );
        let header = serialize_envelope(&envelope)?;

        let ciphertext = content_key
            .encrypt(body)
            .map_err(|e| EncryptionError::EncryptionFailed(Box::new(e)))?;

        properties.insert(ENCRYPTION_HEADER_DATA_KEY.to_string(), Value::String(header));
        Ok(ciphertext)
    }

    /// Decrypt `body` using the envelope found in `properties`.
    ///
    /// A missing (or `null`) envelope property means the message was never
    /// encrypted, and `body` is returned unchanged.
    pub async fn decrypt_body(
        &self,
        body: &[u8],
        properties: &Properties,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let data = match properties.get(ENCRYPTION_HEADER_DATA_KEY) {
            None | Some(Value::Null) => {
                warn!("no encryption data found, skipping body decryption");
                return Ok(body.to_vec());
            }
            Some(Value::String(data)) => data,
            Some(other) => {
                return Err(EncryptionError::Parse(format!(
                    "Encryption metadata must be a string, found {}",
                    json_kind(other)
                )))
            }
        };

        let envelope = deserialize_envelope(data)?;
        self.decrypt_with_envelope(body, &envelope, cancel)
            .await
            .map_err(|e| {
                if e.is_distinguished() {
                    e
                } else {
                    EncryptionError::DecryptionFailed(Box::new(e))
                }
            })
    }

    async fn decrypt_with_envelope(
        &self,
        body: &[u8],
        envelope: &EncryptionEnvelope,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let envelope = envelope.validate().map_err(|e| {
            warn!(error = %e, "invalid encryption metadata");
            e
        })?;
        let key = self.decryption_key(&envelope, cancel).await?;

        let content_key = Zeroizing::new(
            cancellable(cancel, async {
                key.unwrap_key(envelope.encrypted_key, envelope.wrap_algorithm, cancel)
                    .await
                    .map_err(EncryptionError::KeyProvider)
            })
            .await?,
        );
        if content_key.is_empty() {
            return Err(EncryptionError::DecryptionFailed(Box::new(
                KeyProviderError::EmptyKey,
            )));
        }

        debug!(algorithm = %envelope.algorithm, "detected encryption algorithm");
        match envelope.algorithm {
            EncryptionAlgorithm::AesCbc256 => decrypt_cbc(body, &content_key, envelope.iv)
                .map_err(|e| EncryptionError::DecryptionFailed(Box::new(e))),
            EncryptionAlgorithm::Unsupported(name) => {
                warn!(algorithm = %name, "unsupported encryption algorithm");
                Err(EncryptionError::UnsupportedAlgorithm(name.clone()))
            }
        }
    }

    // ========================================================================
    // Message pipelines
    // ========================================================================

    /// Encrypt a message's body in place and attach its envelope.
    pub async fn encrypt_message(
        &self,
        mut message: Message,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        if !self.can_encrypt() {
            return Err(EncryptionError::Configuration(
                "No encryption key has been initialized".to_string(),
            ));
        }

        info!(message_id = %message.message_id, "encrypting message");
        message.body = self
            .encrypt_body(&message.body, &mut message.properties, cancel)
            .await?;
        info!(message_id = %message.message_id, "encrypting message finished");
        Ok(message)
    }

    /// Decrypt a message's body in place. Unencrypted messages pass through.
    pub async fn decrypt_message(
        &self,
        mut message: Message,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        info!(message_id = %message.message_id, "decrypting message");
        message.body = self
            .decrypt_body(&message.body, &message.properties, cancel)
            .await?;
        info!(message_id = %message.message_id, "decrypting message finished");
        Ok(message)
    }
}

impl fmt::Debug for EncryptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionPolicy")
            .field("key_supplier", &self.key_supplier.is_some())
            .field("key_resolver", &self.key_resolver.is_some())
            .field(
                "cached_key_id",
                &self.cached_encryption_key.get().map(|k| k.key_id().to_string()),
            )
            .finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

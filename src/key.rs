//! Key provider capabilities: protecting keys, suppliers, and resolvers.
//!
//! These are the seams to the external key-management service. The policy
//! only ever talks to keys through these traits.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::KeyProviderError;

// ============================================================================
// ProtectingKey — wraps / unwraps content keys
// ============================================================================

/// Output of [`ProtectingKey::wrap_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapResult {
    /// Opaque wrapped key blob.
    pub wrapped_key: Vec<u8>,
    /// Algorithm the key actually used; recorded verbatim in the envelope.
    pub algorithm: String,
}

/// A long-lived key that protects per-message content keys.
#[async_trait]
pub trait ProtectingKey: Send + Sync {
    /// Stable key identifier, recorded in every envelope this key wraps.
    fn key_id(&self) -> &str;

    /// Wrap `key`. `algorithm` is a hint; implementations may pick their own
    /// default when it is `None`.
    async fn wrap_key(
        &self,
        key: &[u8],
        algorithm: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<WrapResult, KeyProviderError>;

    /// Unwrap a blob produced by [`ProtectingKey::wrap_key`] with `algorithm`.
    async fn unwrap_key(
        &self,
        wrapped_key: &[u8],
        algorithm: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, KeyProviderError>;
}

// ============================================================================
// KeySupplier — the policy's own encryption key
// ============================================================================

/// Supplies the policy's encryption key. Called at most once per policy.
#[async_trait]
pub trait KeySupplier: Send + Sync {
    async fn supply_key(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError>;
}

/// Supplier that always hands out the same concrete key.
#[derive(Clone)]
pub struct StaticKeySupplier {
    key: Arc<dyn ProtectingKey>,
}

impl StaticKeySupplier {
    pub fn new(key: Arc<dyn ProtectingKey>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl KeySupplier for StaticKeySupplier {
    async fn supply_key(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError> {
        Ok(Some(Arc::clone(&self.key)))
    }
}

/// Any `Fn(CancellationToken) -> Future` works as a supplier, e.g. a closure
/// fetching the key from a remote vault.
#[async_trait]
impl<F, Fut> KeySupplier for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError>>
        + Send
        + 'static,
{
    async fn supply_key(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError> {
        (self)(cancel.clone()).await
    }
}

// ============================================================================
// KeyResolver — look up a key by identifier
// ============================================================================

/// Resolves protecting keys by the identifier recorded in an envelope.
///
/// The policy calls this once per decryption and never caches the result;
/// implementations are free to cache internally.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// `Ok(None)` means no key is known under `key_id`.
    async fn resolve_key(
        &self,
        key_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError>;
}

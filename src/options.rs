//! Encryption policy configuration.

use std::sync::Arc;

use crate::error::{EncryptionError, Result};
use crate::key::{KeyResolver, KeySupplier, ProtectingKey, StaticKeySupplier};

/// Configuration for [`EncryptionPolicy`](crate::EncryptionPolicy).
///
/// `key_supplier` is required for encryption. `key_resolver` is used for
/// decryption; without one, decryption falls back to the supplied key and
/// requires its identifier to match the message's.
#[derive(Clone, Default)]
pub struct EncryptionPolicyOptions {
    /// Supplies the encryption key. Invoked at most once per policy.
    pub key_supplier: Option<Arc<dyn KeySupplier>>,
    /// Resolves decryption keys by the identifier recorded in the envelope.
    pub key_resolver: Option<Arc<dyn KeyResolver>>,
}

impl EncryptionPolicyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_supplier(mut self, supplier: Arc<dyn KeySupplier>) -> Self {
        self.key_supplier = Some(supplier);
        self
    }

    /// Shorthand for a supplier that always returns `key`.
    pub fn with_encryption_key(self, key: Arc<dyn ProtectingKey>) -> Self {
        self.with_key_supplier(Arc::new(StaticKeySupplier::new(key)))
    }

    pub fn with_key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = Some(resolver);
        self
    }

    /// At least one of supplier and resolver must be set.
    pub fn validate(&self) -> Result<()> {
        if self.key_supplier.is_none() && self.key_resolver.is_none() {
            return Err(EncryptionError::Configuration(
                "Neither key_supplier nor key_resolver has been set".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncryptionPolicyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionPolicyOptions")
            .field("key_supplier", &self.key_supplier.is_some())
            .field("key_resolver", &self.key_resolver.is_some())
            .finish()
    }
}

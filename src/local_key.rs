//! In-process key provider implementations.
//!
//! `SymmetricKey` wraps content keys with AES-256 key wrap (RFC 3394, JWA
//! name `A256KW`). `InMemoryKeyResolver` maps key identifiers to keys.
//!
//! Wrapped content key wire format: AES-KW(KEK, key) = key length + 8 bytes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aes_kw::KekAes256;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::error::KeyProviderError;
use crate::key::{KeyResolver, ProtectingKey, WrapResult};
use crate::types::{A256KW, AES_KEY_LENGTH};

/// AES-KW integrity check block size.
const AES_KW_OVERHEAD: usize = 8;

// ============================================================================
// SymmetricKey
// ============================================================================

/// A 256-bit key-encryption key held in process memory.
pub struct SymmetricKey {
    key_id: String,
    key: Zeroizing<[u8; AES_KEY_LENGTH]>,
}

impl SymmetricKey {
    /// Build a key from 32 bytes of raw key material.
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self, KeyProviderError> {
        let bytes: [u8; AES_KEY_LENGTH] =
            key.try_into()
                .map_err(|_| KeyProviderError::InvalidKeyLength {
                    expected: AES_KEY_LENGTH,
                    got: key.len(),
                })?;
        Ok(Self {
            key_id: key_id.into(),
            key: Zeroizing::new(bytes),
        })
    }

    /// Generate a fresh random key.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, KeyProviderError> {
        let mut bytes = Zeroizing::new([0u8; AES_KEY_LENGTH]);
        getrandom::getrandom(&mut bytes[..])
            .map_err(|e| KeyProviderError::RngFailed(e.to_string()))?;
        Ok(Self {
            key_id: key_id.into(),
            key: bytes,
        })
    }

    fn kek(&self) -> KekAes256 {
        KekAes256::from(*self.key)
    }

    fn check_algorithm(algorithm: &str) -> Result<(), KeyProviderError> {
        if algorithm == A256KW {
            Ok(())
        } else {
            Err(KeyProviderError::UnsupportedAlgorithm(algorithm.to_string()))
        }
    }

    /// Synchronous AES-KW wrap.
    pub fn wrap_bytes(&self, key: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        if key.is_empty() || key.len() % AES_KW_OVERHEAD != 0 {
            return Err(KeyProviderError::InvalidKeyLength {
                expected: AES_KEY_LENGTH,
                got: key.len(),
            });
        }
        let mut wrapped = vec![0u8; key.len() + AES_KW_OVERHEAD];
        self.kek()
            .wrap(key, &mut wrapped)
            .map_err(|e| KeyProviderError::WrapFailed(format!("{:?}", e)))?;
        Ok(wrapped)
    }

    /// Synchronous AES-KW unwrap.
    pub fn unwrap_bytes(&self, wrapped_key: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        if wrapped_key.len() < 2 * AES_KW_OVERHEAD || wrapped_key.len() % AES_KW_OVERHEAD != 0 {
            return Err(KeyProviderError::InvalidWrappedKeyLength(wrapped_key.len()));
        }
        let mut key = vec![0u8; wrapped_key.len() - AES_KW_OVERHEAD];
        self.kek()
            .unwrap(wrapped_key, &mut key)
            .map_err(|e| KeyProviderError::UnwrapFailed(format!("{:?}", e)))?;
        Ok(key)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProtectingKey for SymmetricKey {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn wrap_key(
        &self,
        key: &[u8],
        algorithm: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<WrapResult, KeyProviderError> {
        let algorithm = algorithm.unwrap_or(A256KW);
        Self::check_algorithm(algorithm)?;
        Ok(WrapResult {
            wrapped_key: self.wrap_bytes(key)?,
            algorithm: algorithm.to_string(),
        })
    }

    async fn unwrap_key(
        &self,
        wrapped_key: &[u8],
        algorithm: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, KeyProviderError> {
        Self::check_algorithm(algorithm)?;
        self.unwrap_bytes(wrapped_key)
    }
}

// ============================================================================
// InMemoryKeyResolver
// ============================================================================

/// Resolver backed by an in-memory map of key id → key.
///
/// Interior mutability via `parking_lot::RwLock` so keys can be registered
/// while the resolver is shared with running policies.
#[derive(Default)]
pub struct InMemoryKeyResolver {
    keys: RwLock<HashMap<String, Arc<dyn ProtectingKey>>>,
}

impl InMemoryKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under its own identifier, replacing any previous entry.
    pub fn add(&self, key: Arc<dyn ProtectingKey>) {
        self.keys.write().insert(key.key_id().to_string(), key);
    }

    /// Register `key` under an explicit identifier.
    pub fn add_as(&self, key_id: impl Into<String>, key: Arc<dyn ProtectingKey>) {
        self.keys.write().insert(key_id.into(), key);
    }

    pub fn remove(&self, key_id: &str) -> Option<Arc<dyn ProtectingKey>> {
        self.keys.write().remove(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl FromIterator<Arc<dyn ProtectingKey>> for InMemoryKeyResolver {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ProtectingKey>>>(keys: I) -> Self {
        let resolver = Self::new();
        for key in keys {
            resolver.add(key);
        }
        resolver
    }
}

#[async_trait]
impl KeyResolver for InMemoryKeyResolver {
    async fn resolve_key(
        &self,
        key_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError> {
        Ok(self.keys.read().get(key_id).cloned())
    }
}

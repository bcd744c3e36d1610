use thiserror::Error;

/// Boxed cause carried by the catch-all encrypt/decrypt failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Failures surfaced by the encryption policy.
///
/// `Parse` and the distinguished decryption kinds (`MalformedEnvelope`,
/// `KeyNotFound`, `KeyMismatch`, `UnsupportedAlgorithm`) are never folded into
/// `DecryptionFailed`, so callers can tell "not our ciphertext" apart from
/// "corrupted encryption".
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not produced by the policy: borrowed bodies and property bags cannot
    /// be missing. Available to adapters that accept optional inputs.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Error while de-serializing the encryption metadata: {0}")]
    Parse(String),

    #[error("Malformed encryption metadata: {0}")]
    MalformedEnvelope(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key mismatch: message was encrypted with key {expected:?}, policy key is {actual:?}")]
    KeyMismatch { expected: String, actual: String },

    #[error("Unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key provider failed: {0}")]
    KeyProvider(#[source] KeyProviderError),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(#[source] BoxError),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(#[source] BoxError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl EncryptionError {
    /// Whether this kind keeps its identity when raised inside the decrypt
    /// pipeline instead of being wrapped into `DecryptionFailed`.
    pub(crate) fn is_distinguished(&self) -> bool {
        matches!(
            self,
            EncryptionError::Parse(_)
                | EncryptionError::MalformedEnvelope(_)
                | EncryptionError::KeyNotFound(_)
                | EncryptionError::KeyMismatch { .. }
                | EncryptionError::UnsupportedAlgorithm(_)
                | EncryptionError::Cancelled
                | EncryptionError::DecryptionFailed(_)
        )
    }
}

/// Errors reported by key providers (protecting keys, suppliers, resolvers).
#[derive(Debug, Error)]
pub enum KeyProviderError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid wrapped key length: {0} bytes")]
    InvalidWrappedKeyLength(usize),

    #[error("Unsupported key wrap algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key wrap failed: {0}")]
    WrapFailed(String),

    #[error("Key unwrap failed: {0}")]
    UnwrapFailed(String),

    #[error("Unwrapped content key is empty")]
    EmptyKey,

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("Key provider error: {0}")]
    Backend(#[source] BoxError),
}

impl KeyProviderError {
    /// Wrap an arbitrary backend error (network, SDK, ...).
    pub fn backend(err: impl Into<BoxError>) -> Self {
        KeyProviderError::Backend(err.into())
    }
}

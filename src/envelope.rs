//! Envelope metadata: everything needed to reverse a message encryption
//! except access to the protecting key.
//!
//! Wire format (JSON, stored as a string in the `encryptiondata` property):
//!
//! ```text
//! {
//!   "ContentEncryptionIV": "<base64>",
//!   "EncryptionAgent": { "EncryptionAlgorithm": "AES_CBC_256", "Protocol": "1.0" },
//!   "WrappedContentKey": { "Algorithm": "A256KW", "EncryptedKey": "<base64>", "KeyId": "..." }
//! }
//! ```
//!
//! Parsing is purely structural. Missing fields come back as `None` and are
//! reported by [`EncryptionEnvelope::validate`], keeping parse errors and
//! validation errors apart.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EncryptionError, Result};
use crate::types::PROTOCOL_VERSION;

// ============================================================================
// EncryptionAlgorithm
// ============================================================================

/// Symmetric algorithm used for the message body.
///
/// Travels as its symbolic name. Names this build does not know decode into
/// `Unsupported` rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    /// AES-256 in CBC mode with PKCS#7 padding.
    #[default]
    AesCbc256,
    Unsupported(String),
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            EncryptionAlgorithm::AesCbc256 => "AES_CBC_256",
            EncryptionAlgorithm::Unsupported(name) => name,
        }
    }

    /// Names match case-insensitively, as other producers write them.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("AES_CBC_256") {
            EncryptionAlgorithm::AesCbc256
        } else {
            EncryptionAlgorithm::Unsupported(name.to_string())
        }
    }

    /// Older producers may write the enum's ordinal instead of its name.
    fn from_code(code: u64) -> Self {
        match code {
            0 => EncryptionAlgorithm::AesCbc256,
            other => EncryptionAlgorithm::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EncryptionAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EncryptionAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Code(u64),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) => EncryptionAlgorithm::from_name(&name),
            Repr::Code(code) => EncryptionAlgorithm::from_code(code),
        })
    }
}

// ============================================================================
// Envelope structures
// ============================================================================

/// Protocol version and body algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionAgent {
    #[serde(rename = "EncryptionAlgorithm", default)]
    encryption_algorithm: EncryptionAlgorithm,
    #[serde(rename = "Protocol", default)]
    protocol: Option<String>,
}

impl EncryptionAgent {
    pub fn new(protocol: impl Into<String>, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            encryption_algorithm: algorithm,
            protocol: Some(protocol.into()),
        }
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn encryption_algorithm(&self) -> &EncryptionAlgorithm {
        &self.encryption_algorithm
    }
}

/// The content key as wrapped by a protecting key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedContentKey {
    #[serde(rename = "Algorithm", default)]
    algorithm: Option<String>,
    #[serde(rename = "EncryptedKey", default, with = "base64_opt")]
    encrypted_key: Option<Vec<u8>>,
    #[serde(rename = "KeyId", default)]
    key_id: Option<String>,
}

impl WrappedContentKey {
    pub fn new(
        key_id: impl Into<String>,
        encrypted_key: Vec<u8>,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: Some(algorithm.into()),
            encrypted_key: Some(encrypted_key),
            key_id: Some(key_id.into()),
        }
    }

    pub fn key_id(&self) -> &str {
        self.key_id.as_deref().unwrap_or_default()
    }

    pub fn encrypted_key(&self) -> Option<&[u8]> {
        self.encrypted_key.as_deref()
    }

    /// Wrap algorithm reported by the protecting key at encryption time.
    pub fn algorithm(&self) -> &str {
        self.algorithm.as_deref().unwrap_or_default()
    }
}

/// Envelope metadata. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    #[serde(rename = "ContentEncryptionIV", default, with = "base64_opt")]
    content_encryption_iv: Option<Vec<u8>>,
    #[serde(rename = "EncryptionAgent", default)]
    encryption_agent: Option<EncryptionAgent>,
    #[serde(rename = "WrappedContentKey", default)]
    wrapped_content_key: Option<WrappedContentKey>,
}

/// Borrowed view of an envelope that passed [`EncryptionEnvelope::validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidEnvelope<'a> {
    pub iv: &'a [u8],
    pub algorithm: &'a EncryptionAlgorithm,
    pub key_id: &'a str,
    pub encrypted_key: &'a [u8],
    pub wrap_algorithm: &'a str,
}

impl EncryptionEnvelope {
    /// Build a current-protocol envelope.
    pub fn new(
        algorithm: EncryptionAlgorithm,
        content_encryption_iv: Vec<u8>,
        wrapped_content_key: WrappedContentKey,
    ) -> Self {
        Self {
            content_encryption_iv: Some(content_encryption_iv),
            encryption_agent: Some(EncryptionAgent::new(PROTOCOL_VERSION, algorithm)),
            wrapped_content_key: Some(wrapped_content_key),
        }
    }

    pub fn content_encryption_iv(&self) -> Option<&[u8]> {
        self.content_encryption_iv.as_deref()
    }

    pub fn encryption_agent(&self) -> Option<&EncryptionAgent> {
        self.encryption_agent.as_ref()
    }

    pub fn wrapped_content_key(&self) -> Option<&WrappedContentKey> {
        self.wrapped_content_key.as_ref()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.encryption_agent.as_ref().and_then(|a| a.protocol())
    }

    /// Check the envelope is complete and speaks a protocol this build
    /// understands. The algorithm is not checked here; dispatch happens after
    /// the content key is unwrapped.
    pub fn validate(&self) -> Result<ValidEnvelope<'_>> {
        let iv = self
            .content_encryption_iv()
            .filter(|iv| !iv.is_empty())
            .ok_or_else(|| EncryptionError::MalformedEnvelope("IV not found".to_string()))?;

        let wrapped = self.wrapped_content_key().ok_or_else(|| {
            EncryptionError::MalformedEnvelope("Wrapped content key not found".to_string())
        })?;
        let encrypted_key = wrapped
            .encrypted_key()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                EncryptionError::MalformedEnvelope("Encryption key not found".to_string())
            })?;

        let agent = self
            .encryption_agent()
            .filter(|a| a.protocol() == Some(PROTOCOL_VERSION))
            .ok_or_else(|| {
                EncryptionError::MalformedEnvelope(format!(
                    "Invalid encryption agent protocol {:?}, expected {:?}",
                    self.protocol().unwrap_or_default(),
                    PROTOCOL_VERSION
                ))
            })?;

        Ok(ValidEnvelope {
            iv,
            algorithm: agent.encryption_algorithm(),
            key_id: wrapped.key_id(),
            encrypted_key,
            wrap_algorithm: wrapped.algorithm(),
        })
    }
}

// ============================================================================
// (De)serialization
// ============================================================================

/// Serialize an envelope to its JSON wire form.
pub fn serialize_envelope(envelope: &EncryptionEnvelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| EncryptionError::EncryptionFailed(Box::new(e)))
}

/// Parse the JSON wire form. No semantic validation.
pub fn deserialize_envelope(data: &str) -> Result<EncryptionEnvelope> {
    serde_json::from_str(data).map_err(|e| EncryptionError::Parse(e.to_string()))
}

/// Standard padded base64 for optional byte fields; `null` maps to `None`.
mod base64_opt {
    use base64ct::{Base64, Encoding};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&Base64::encode_string(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| Base64::decode_vec(&s).map_err(de::Error::custom))
            .transpose()
    }
}

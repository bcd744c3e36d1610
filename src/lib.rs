//! Client-side envelope encryption for message bodies.
//!
//! Each message body is encrypted with a fresh AES-256-CBC content key, which
//! is wrapped by a caller-provided protecting key. The wrapped key, IV and
//! protocol metadata travel with the message as a JSON envelope under the
//! `encryptiondata` property.

pub mod aes_cbc;
pub mod envelope;
pub mod error;
pub mod key;
pub mod local_key;
pub mod message;
pub mod options;
pub mod plugin;
pub mod policy;
pub mod types;

pub use aes_cbc::{decrypt_cbc, encrypt_cbc, CipherError, ContentKey};
pub use envelope::{
    deserialize_envelope, serialize_envelope, EncryptionAgent, EncryptionAlgorithm,
    EncryptionEnvelope, ValidEnvelope, WrappedContentKey,
};
pub use error::{BoxError, EncryptionError, KeyProviderError, Result};
pub use key::{KeyResolver, KeySupplier, ProtectingKey, StaticKeySupplier, WrapResult};
pub use local_key::{InMemoryKeyResolver, SymmetricKey};
pub use message::{Message, MessageExt, Properties};
pub use options::EncryptionPolicyOptions;
pub use plugin::{MessageBodyEncryptionPlugin, MessagePlugin};
pub use policy::EncryptionPolicy;
pub use types::{
    A256KW, AES_BLOCK_SIZE, AES_CBC_IV_LENGTH, AES_KEY_LENGTH, ENCRYPTION_HEADER_DATA_KEY,
    PROTOCOL_VERSION,
};

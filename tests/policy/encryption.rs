//! Integration tests for the encrypt side of `EncryptionPolicy`.

use std::sync::Arc;

use envelope_policy::{
    deserialize_envelope, EncryptionError, EncryptionPolicy, EncryptionPolicyOptions,
    InMemoryKeyResolver, Message, MessageExt, ProtectingKey, SymmetricKey,
    ENCRYPTION_HEADER_DATA_KEY, PROTOCOL_VERSION,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

fn key(id: &str) -> Arc<dyn ProtectingKey> {
    Arc::new(SymmetricKey::generate(id).expect("generate key"))
}

fn header(message: &Message) -> &str {
    message.properties[ENCRYPTION_HEADER_DATA_KEY]
        .as_str()
        .expect("header is a string")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn encrypt_attaches_header_and_changes_body() {
    let policy = EncryptionPolicy::with_key(Some(key("Test Key")), None).unwrap();
    let message = Message::new("Fake Message");
    assert!(!message.properties.contains_key(ENCRYPTION_HEADER_DATA_KEY));

    let encrypted = message
        .clone()
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();

    assert_ne!(encrypted.body, message.body);
    assert_eq!(encrypted.body.len() % 16, 0);
    let envelope = deserialize_envelope(header(&encrypted)).unwrap();
    assert_eq!(envelope.protocol(), Some(PROTOCOL_VERSION));
    assert_eq!(envelope.content_encryption_iv().unwrap().len(), 16);
    assert_eq!(envelope.wrapped_content_key().unwrap().key_id(), "Test Key");
    assert_eq!(
        envelope.wrapped_content_key().unwrap().encrypted_key().unwrap().len(),
        40
    );
}

#[tokio::test]
async fn header_is_a_json_string_property() {
    let policy = EncryptionPolicy::with_key(Some(key("k")), None).unwrap();
    let encrypted = Message::new("x")
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();
    let json: Value = serde_json::from_str(header(&encrypted)).unwrap();
    assert!(json.get("ContentEncryptionIV").is_some());
    assert!(json.get("EncryptionAgent").is_some());
    assert!(json.get("WrappedContentKey").is_some());
}

#[tokio::test]
async fn empty_body_encrypts_to_one_block() {
    let policy = EncryptionPolicy::with_key(Some(key("k")), None).unwrap();
    let encrypted = Message::new(Vec::<u8>::new())
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(encrypted.body.len(), 16);
    let decrypted = encrypted
        .decrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();
    assert!(decrypted.body.is_empty());
}

#[tokio::test]
async fn existing_header_is_replaced() {
    let policy = EncryptionPolicy::with_key(Some(key("k")), None).unwrap();
    let token = CancellationToken::new();
    let once = Message::new("body").encrypt(Some(&policy), &token).await.unwrap();
    let first = header(&once).to_string();
    let twice = once.encrypt(Some(&policy), &token).await.unwrap();
    assert_ne!(header(&twice), first);

    // Decryption removes only the outer layer.
    let peeled = twice.decrypt(Some(&policy), &token).await.unwrap();
    assert_ne!(peeled.body, b"body");
}

#[tokio::test]
async fn resolver_only_policy_cannot_encrypt() {
    let policy = EncryptionPolicy::new(
        EncryptionPolicyOptions::new().with_key_resolver(Arc::new(InMemoryKeyResolver::new())),
    )
    .unwrap();
    assert!(!policy.can_encrypt());
    let err = Message::new("x")
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EncryptionError::Configuration(_)));
}

#[tokio::test]
async fn options_with_encryption_key() {
    let policy =
        EncryptionPolicy::new(EncryptionPolicyOptions::new().with_encryption_key(key("opt")))
            .unwrap();
    assert!(!policy.is_encryption_key_cached());
    let encrypted = Message::new("x")
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();
    assert!(policy.is_encryption_key_cached());
    let envelope = deserialize_envelope(header(&encrypted)).unwrap();
    assert_eq!(envelope.wrapped_content_key().unwrap().key_id(), "opt");
}

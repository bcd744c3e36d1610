//! Concurrent use of a shared `EncryptionPolicy`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use envelope_policy::{
    EncryptionError, EncryptionPolicy, EncryptionPolicyOptions, KeyProviderError, KeySupplier,
    Message, MessageExt, ProtectingKey, SymmetricKey,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

/// Slow supplier that counts how often it is asked for the key.
struct SlowSupplier {
    key: Arc<dyn ProtectingKey>,
    calls: AtomicUsize,
    fail_first: bool,
}

impl SlowSupplier {
    fn new(fail_first: bool) -> Arc<Self> {
        Arc::new(Self {
            key: Arc::new(SymmetricKey::generate("slow").expect("generate key")),
            calls: AtomicUsize::new(0),
            fail_first,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySupplier for SlowSupplier {
    async fn supply_key(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ProtectingKey>>, KeyProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail_first && call == 0 {
            return Err(KeyProviderError::backend("transient vault outage"));
        }
        Ok(Some(Arc::clone(&self.key)))
    }
}

fn policy(supplier: Arc<SlowSupplier>) -> Arc<EncryptionPolicy> {
    Arc::new(
        EncryptionPolicy::new(EncryptionPolicyOptions::new().with_key_supplier(supplier))
            .expect("policy"),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_encrypts_invoke_supplier_once() {
    let supplier = SlowSupplier::new(false);
    let policy = policy(supplier.clone());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let policy = Arc::clone(&policy);
            tokio::spawn(async move {
                Message::new(format!("message {i}"))
                    .encrypt(Some(&policy), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut encrypted = Vec::new();
    for handle in handles {
        encrypted.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(supplier.calls(), 1);

    for (i, message) in encrypted.into_iter().enumerate() {
        let decrypted = message
            .decrypt(Some(&policy), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(decrypted.body, format!("message {i}").into_bytes());
    }
    assert_eq!(supplier.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_operations_share_one_key() {
    let supplier = SlowSupplier::new(false);
    let policy = policy(supplier.clone());
    let seed = Message::new("seed")
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let policy = Arc::clone(&policy);
        let seed = seed.clone();
        handles.push(tokio::spawn(async move {
            let token = CancellationToken::new();
            if i % 2 == 0 {
                let out = seed.decrypt(Some(&policy), &token).await?;
                assert_eq!(out.body, b"seed");
            } else {
                Message::new("fresh").encrypt(Some(&policy), &token).await?;
            }
            Ok::<_, EncryptionError>(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(supplier.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_initialization_is_retried() {
    let supplier = SlowSupplier::new(true);
    let policy = policy(supplier.clone());

    let err = Message::new("first")
        .encrypt(Some(&policy), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EncryptionError::KeyProvider(_)));
    assert!(!policy.is_encryption_key_cached());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let policy = Arc::clone(&policy);
            tokio::spawn(async move {
                Message::new("retry")
                    .encrypt(Some(&policy), &CancellationToken::new())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(supplier.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_waiter_does_not_disturb_others() {
    let supplier = SlowSupplier::new(false);
    let policy = policy(supplier.clone());

    let cancelled = CancellationToken::new();
    let waiter = {
        let policy = Arc::clone(&policy);
        let token = cancelled.clone();
        tokio::spawn(async move { Message::new("a").encrypt(Some(&policy), &token).await })
    };
    let survivor = {
        let policy = Arc::clone(&policy);
        tokio::spawn(async move {
            Message::new("b")
                .encrypt(Some(&policy), &CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancelled.cancel();

    assert!(matches!(
        waiter.await.unwrap().unwrap_err(),
        EncryptionError::Cancelled
    ));
    survivor.await.unwrap().unwrap();
    assert!(policy.is_encryption_key_cached());
    assert!(supplier.calls() <= 2);
}

//! AES-256-CBC content encryption with PKCS#7 padding.
//!
//! Every message gets its own random 256-bit content key and 16-byte IV.
//! Ciphertext is the bare CBC output; the IV travels in the envelope.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyProviderError;
use crate::types::{AES_BLOCK_SIZE, AES_CBC_IV_LENGTH, AES_KEY_LENGTH};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Errors from the symmetric transform.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid IV length: expected {expected} bytes, got {got}")]
    InvalidIvLength { expected: usize, got: usize },

    #[error("Ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertextLength(usize),

    #[error("Invalid padding")]
    InvalidPadding,
}

/// Ephemeral per-message key material. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    key: [u8; AES_KEY_LENGTH],
    iv: [u8; AES_CBC_IV_LENGTH],
}

impl ContentKey {
    /// Generate a fresh random key and IV.
    pub fn generate() -> Result<Self, KeyProviderError> {
        let mut content_key = ContentKey {
            key: [0u8; AES_KEY_LENGTH],
            iv: [0u8; AES_CBC_IV_LENGTH],
        };
        getrandom::getrandom(&mut content_key.key)
            .map_err(|e| KeyProviderError::RngFailed(e.to_string()))?;
        getrandom::getrandom(&mut content_key.iv)
            .map_err(|e| KeyProviderError::RngFailed(e.to_string()))?;
        Ok(content_key)
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Encrypt `data` under this key and IV.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        encrypt_cbc(data, &self.key, &self.iv)
    }
}

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<(), CipherError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CipherError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    if iv.len() != AES_CBC_IV_LENGTH {
        return Err(CipherError::InvalidIvLength {
            expected: AES_CBC_IV_LENGTH,
            got: iv.len(),
        });
    }
    Ok(())
}

/// Encrypt with AES-256-CBC and PKCS#7 padding.
pub fn encrypt_cbc(data: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_lengths(key, iv)?;
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| {
        CipherError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        }
    })?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
}

/// Decrypt AES-256-CBC ciphertext and strip PKCS#7 padding.
///
/// Decryption happens in a zeroizing scratch buffer; only the unpadded
/// plaintext is copied out.
pub fn decrypt_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_lengths(key, iv)?;
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidCiphertextLength(ciphertext.len()));
    }
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| {
        CipherError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        }
    })?;

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf[..])
        .map_err(|_| CipherError::InvalidPadding)?
        .len();
    Ok(buf[..plaintext_len].to_vec())
}

//! Cryptographic envelope.
//!
//! [`CryptoProvider`] is the message encryption capability the core consumes;
//! [`AesGcmProvider`] is the bundled implementation. [`Envelope`] layers the
//! share-aware operations (key rotation lookup, content decoding) on top.
//!
//! # Message format
//!
//! | Offset | Size | Field                         |
//! |--------|------|-------------------------------|
//! | 0      | 12   | Random nonce                  |
//! | 12     | n    | AES-256-GCM ciphertext        |
//! | 12 + n | 16   | GCM tag                       |
//!
//! The [`SigningContext`] is bound as associated data, so a payload sealed for
//! one purpose never verifies under another.

mod envelope;
mod keys;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub use envelope::{EncryptedBlob, Envelope};
pub use keys::{CacheKey, SecretKey, ShareKey, ShareKeyRing, UserKey, KEY_LEN};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Purpose a message was sealed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningContext {
    ShareKey,
    VaultContent,
    ItemContent,
    Cache,
}

impl SigningContext {
    const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::ShareKey => b"pass.share-key",
            Self::VaultContent => b"pass.vault-content",
            Self::ItemContent => b"pass.item-content",
            Self::Cache => b"pass.cache",
        }
    }
}

pub struct DecryptMessageParams<'a> {
    pub message: &'a [u8],
    pub key: &'a SecretKey,
    pub context: SigningContext,
}

/// Output of a decryption: the plaintext plus whether it verified.
///
/// `data` is empty whenever `verified` is false.
pub struct DecryptedMessage {
    pub data: Zeroizing<Vec<u8>>,
    pub verified: bool,
}

pub struct EncryptMessageParams<'a> {
    pub data: &'a [u8],
    pub key: &'a SecretKey,
    pub context: SigningContext,
}

pub struct EncryptedMessage {
    pub message: Vec<u8>,
}

/// Message encryption capability.
///
/// Pure transforms: implementations receive every key from the caller and
/// must not keep them.
pub trait CryptoProvider: Send + Sync {
    fn decrypt_message(&self, params: DecryptMessageParams<'_>) -> Result<DecryptedMessage>;

    fn encrypt_message(&self, params: EncryptMessageParams<'_>) -> Result<EncryptedMessage>;
}

/// AES-256-GCM message crypto
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmProvider;

impl CryptoProvider for AesGcmProvider {
    fn decrypt_message(&self, params: DecryptMessageParams<'_>) -> Result<DecryptedMessage> {
        if params.message.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Decryption(format!(
                "message too short: {} bytes",
                params.message.len()
            )));
        }

        let (nonce, ciphertext) = params.message.split_at(NONCE_LEN);
        let key: &Key<Aes256Gcm> = params.key.as_bytes().into();
        let cipher = Aes256Gcm::new(key);

        match cipher.decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: params.context.as_bytes(),
            },
        ) {
            Ok(plaintext) => Ok(DecryptedMessage {
                data: Zeroizing::new(plaintext),
                verified: true,
            }),
            Err(_) => {
                warn!(context = ?params.context, "Message authentication failed");
                Ok(DecryptedMessage {
                    data: Zeroizing::new(Vec::new()),
                    verified: false,
                })
            }
        }
    }

    fn encrypt_message(&self, params: EncryptMessageParams<'_>) -> Result<EncryptedMessage> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let key: &Key<Aes256Gcm> = params.key.as_bytes().into();
        let cipher = Aes256Gcm::new(key);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: params.data,
                    aad: params.context.as_bytes(),
                },
            )
            .map_err(|error| Error::InvalidInput(format!("encryption failed: {error}")))?;

        let mut message = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        message.extend_from_slice(&nonce);
        message.extend_from_slice(&ciphertext);
        Ok(EncryptedMessage { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seal(key: &SecretKey, data: &[u8], context: SigningContext) -> Vec<u8> {
        AesGcmProvider
            .encrypt_message(EncryptMessageParams { data, key, context })
            .unwrap()
            .message
    }

    #[test]
    fn sealed_message_opens_with_same_key_and_context() {
        let key = SecretKey::generate();
        let message = seal(&key, b"secret note", SigningContext::ItemContent);
        assert_eq!(message.len(), NONCE_LEN + b"secret note".len() + TAG_LEN);

        let opened = AesGcmProvider
            .decrypt_message(DecryptMessageParams {
                message: &message,
                key: &key,
                context: SigningContext::ItemContent,
            })
            .unwrap();
        assert!(opened.verified);
        assert_eq!(opened.data.as_slice(), b"secret note");
    }

    #[test]
    fn wrong_context_or_key_does_not_verify() {
        let key = SecretKey::generate();
        let message = seal(&key, b"vault", SigningContext::VaultContent);

        let wrong_context = AesGcmProvider
            .decrypt_message(DecryptMessageParams {
                message: &message,
                key: &key,
                context: SigningContext::ItemContent,
            })
            .unwrap();
        assert!(!wrong_context.verified);
        assert!(wrong_context.data.is_empty());

        let wrong_key = AesGcmProvider
            .decrypt_message(DecryptMessageParams {
                message: &message,
                key: &SecretKey::generate(),
                context: SigningContext::VaultContent,
            })
            .unwrap();
        assert!(!wrong_key.verified);
    }

    #[test]
    fn truncated_message_is_rejected() {
        let result = AesGcmProvider.decrypt_message(DecryptMessageParams {
            message: &[0u8; 20],
            key: &SecretKey::generate(),
            context: SigningContext::Cache,
        });
        assert!(matches!(result, Err(Error::Decryption(_))));
    }
}

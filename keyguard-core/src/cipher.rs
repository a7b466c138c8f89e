//! Single-use cipher transforms and the encrypt/decrypt service.
//!
//! Ciphertext crosses the public boundary as standard, padded base64 of the
//! raw RSA output. Encryption uses the public half and is never gated;
//! decryption uses the private half and is subject to the key's policy.

use std::sync::{Arc, Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{AuthenticationPrompt, AuthenticationRequirement, PromptOutcome};
use crate::config::{PKCS1_PADDING_OVERHEAD, TRANSFORMATION};
use crate::error::{KeyguardError, KeyguardResult, KeystoreError};
use crate::keystore::{KeyPair, KeyStoreService, PlatformCipher};

/// Direction of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CipherMode {
    /// Public-half encryption.
    Encrypt,
    /// Private-half decryption.
    Decrypt,
}

/// Lifecycle of a [`CipherTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum TransformState {
    /// Created, not yet bound to a key half.
    Uninitialized,
    /// Bound to a key half and ready for one input.
    Bound,
    /// Produced its single result.
    Finalized,
    /// Failed; cannot be used again.
    Failed,
}

enum Slot {
    Uninitialized,
    Bound(Arc<dyn PlatformCipher>),
    Finalized,
    Failed,
}

/// A single-use encrypt or decrypt operation bound to one key half.
#[derive(uniffi::Object)]
pub struct CipherTransform {
    alias: String,
    mode: CipherMode,
    block_len: usize,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for CipherTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherTransform")
            .field("alias", &self.alias)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

impl CipherTransform {
    fn new(key: &KeyPair, mode: CipherMode) -> Self {
        Self {
            alias: key.alias().to_string(),
            mode,
            block_len: key.block_len(),
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Creates a transform and binds it to the half of `key` matching `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::KeyInvalidated`] if the platform invalidated the
    /// key, or another cipher error if initialisation fails.
    pub fn bind(key: &KeyPair, mode: CipherMode) -> KeyguardResult<Arc<Self>> {
        let transform = Self::new(key, mode);
        transform.init(key)?;
        Ok(Arc::new(transform))
    }

    fn init(&self, key: &KeyPair) -> KeyguardResult<()> {
        let mut slot = self.lock()?;
        if !matches!(*slot, Slot::Uninitialized) {
            return Err(KeyguardError::TransformAlreadyUsed);
        }
        let cipher = match self.mode {
            CipherMode::Encrypt => key.handle().init_public_cipher(),
            CipherMode::Decrypt => key.handle().init_private_cipher(),
        };
        match cipher {
            Ok(cipher) => {
                *slot = Slot::Bound(cipher);
                Ok(())
            }
            Err(e) => {
                *slot = Slot::Failed;
                Err(self.cipher_error(e))
            }
        }
    }

    /// Runs the transform over `input`. Succeeds at most once.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::TransformAlreadyUsed`] on a second call
    /// - [`KeyguardError::CiphertextTooLarge`] if an encrypt input exceeds one
    ///   block
    /// - [`KeyguardError::InvalidCiphertext`] if a decrypt input is not one
    ///   block or fails the padding check
    /// - [`KeyguardError::AuthenticationRequired`] if the key's authentication
    ///   requirement is not met
    /// - [`KeyguardError::CryptoOperationFailed`] for other cipher failures
    pub fn finalize(&self, input: &[u8]) -> KeyguardResult<Vec<u8>> {
        let mut slot = self.lock()?;
        let cipher = match &*slot {
            Slot::Bound(cipher) => Arc::clone(cipher),
            Slot::Uninitialized => {
                return Err(KeyguardError::CryptoOperationFailed(
                    "transform is not bound to a key".to_string(),
                ))
            }
            Slot::Finalized | Slot::Failed => return Err(KeyguardError::TransformAlreadyUsed),
        };

        let result = self.check_input(input).and_then(|()| {
            cipher
                .do_final(input.to_vec())
                .map_err(|e| self.cipher_error(e))
        });
        *slot = if result.is_ok() {
            Slot::Finalized
        } else {
            Slot::Failed
        };
        result
    }

    fn check_input(&self, input: &[u8]) -> KeyguardResult<()> {
        match self.mode {
            CipherMode::Encrypt => {
                let capacity = self.block_len.saturating_sub(PKCS1_PADDING_OVERHEAD);
                if input.len() > capacity {
                    return Err(KeyguardError::CiphertextTooLarge {
                        len: input.len() as u64,
                        capacity: capacity as u64,
                    });
                }
            }
            CipherMode::Decrypt => {
                if input.len() != self.block_len {
                    return Err(KeyguardError::InvalidCiphertext(format!(
                        "expected {} bytes, got {}",
                        self.block_len,
                        input.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn cipher_error(&self, error: KeystoreError) -> KeyguardError {
        match error {
            KeystoreError::UserNotAuthenticated => KeyguardError::AuthenticationRequired,
            KeystoreError::KeyInvalidated(_) => KeyguardError::KeyInvalidated {
                alias: self.alias.clone(),
            },
            KeystoreError::KeyNotFound(_) => KeyguardError::KeyNotFound {
                alias: self.alias.clone(),
            },
            KeystoreError::BadCiphertext(message) if self.mode == CipherMode::Decrypt => {
                KeyguardError::InvalidCiphertext(message)
            }
            other => KeyguardError::CryptoOperationFailed(other.to_string()),
        }
    }

    fn lock(&self) -> KeyguardResult<MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| KeyguardError::CryptoOperationFailed("transform mutex poisoned".to_string()))
    }
}

#[uniffi::export]
impl CipherTransform {
    /// Alias of the key the transform is bound to.
    #[must_use]
    pub fn alias(&self) -> String {
        self.alias.clone()
    }

    /// Direction of the transform.
    #[must_use]
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Cipher transformation string.
    #[must_use]
    pub fn transformation(&self) -> String {
        TRANSFORMATION.to_string()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransformState {
        match self.slot.lock() {
            Ok(slot) => match *slot {
                Slot::Uninitialized => TransformState::Uninitialized,
                Slot::Bound(_) => TransformState::Bound,
                Slot::Finalized => TransformState::Finalized,
                Slot::Failed => TransformState::Failed,
            },
            Err(_) => TransformState::Failed,
        }
    }

    /// Platform operation id of the bound cipher, used to tie an
    /// authentication prompt to this transform. `None` unless bound.
    #[must_use]
    pub fn operation_id(&self) -> Option<u64> {
        match &*self.slot.lock().ok()? {
            Slot::Bound(cipher) => Some(cipher.operation_id()),
            _ => None,
        }
    }
}

/// Encrypts and decrypts against named key pairs.
///
/// Key pairs are fetched fresh for every call.
#[derive(Clone)]
pub struct CipherService {
    key_store: KeyStoreService,
    prompt: Option<Arc<dyn AuthenticationPrompt>>,
}

impl std::fmt::Debug for CipherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherService")
            .field("key_store", &self.key_store)
            .field("has_prompt", &self.prompt.is_some())
            .finish()
    }
}

impl CipherService {
    /// Creates a service without a prompt collaborator. Authentication
    /// failures are surfaced as reported by the keystore.
    #[must_use]
    pub const fn new(key_store: KeyStoreService) -> Self {
        Self {
            key_store,
            prompt: None,
        }
    }

    /// Creates a service that prompts before decrypting with every-use keys.
    #[must_use]
    pub fn with_prompt(key_store: KeyStoreService, prompt: Arc<dyn AuthenticationPrompt>) -> Self {
        Self {
            key_store,
            prompt: Some(prompt),
        }
    }

    /// Encrypts `plaintext` with the public half of `alias`.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::KeyNotFound`] if `alias` does not exist
    /// - [`KeyguardError::CiphertextTooLarge`] if `plaintext` exceeds one block
    /// - [`KeyguardError::CryptoOperationFailed`] for cipher failures
    pub fn encrypt(&self, alias: &str, plaintext: &[u8]) -> KeyguardResult<String> {
        let key = self.key_store.fetch(alias)?;
        let transform = CipherTransform::bind(&key, CipherMode::Encrypt)?;
        let ciphertext = transform.finalize(plaintext)?;
        debug!("{} with '{alias}' produced {} bytes", transform.mode(), ciphertext.len());
        Ok(STANDARD.encode(ciphertext))
    }

    /// Encrypts UTF-8 text.
    ///
    /// # Errors
    ///
    /// See [`CipherService::encrypt`].
    pub fn encrypt_text(&self, alias: &str, plaintext: &str) -> KeyguardResult<String> {
        self.encrypt(alias, plaintext.as_bytes())
    }

    /// Decrypts base64 `ciphertext` with the private half of `alias`.
    ///
    /// For keys that require authentication, a configured prompt collaborator
    /// is shown for the bound transform before finalizing.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::KeyNotFound`] if `alias` does not exist
    /// - [`KeyguardError::InvalidCiphertext`] if the input is not valid
    ///   ciphertext for this key
    /// - [`KeyguardError::AuthenticationRequired`] if authentication is not
    ///   satisfied or the prompt timed out
    /// - [`KeyguardError::AuthenticationDenied`] if the prompt was denied
    /// - [`KeyguardError::KeyInvalidated`] if the platform invalidated the key
    pub fn decrypt(&self, alias: &str, ciphertext: &str) -> KeyguardResult<Zeroizing<Vec<u8>>> {
        let key = self.key_store.fetch(alias)?;
        let ciphertext = decode_ciphertext(ciphertext)?;
        let transform = CipherTransform::bind(&key, CipherMode::Decrypt)?;
        self.authorize(&key, &transform)?;
        let plaintext = Zeroizing::new(transform.finalize(&ciphertext)?);
        debug!("{} with '{alias}' succeeded", transform.mode());
        Ok(plaintext)
    }

    /// Decrypts to UTF-8 text.
    ///
    /// # Errors
    ///
    /// See [`CipherService::decrypt`]; additionally
    /// [`KeyguardError::InvalidInput`] if the plaintext is not UTF-8.
    pub fn decrypt_text(&self, alias: &str, ciphertext: &str) -> KeyguardResult<String> {
        utf8(&self.decrypt(alias, ciphertext)?)
    }

    /// Returns a decrypt transform bound to the private half of `alias`, for
    /// callers that drive their own authentication prompt.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::KeyNotFound`] if `alias` does not exist
    /// - [`KeyguardError::KeyInvalidated`] if the platform invalidated the key
    pub fn get_decrypt_transform(&self, alias: &str) -> KeyguardResult<Arc<CipherTransform>> {
        let key = self.key_store.fetch(alias)?;
        CipherTransform::bind(&key, CipherMode::Decrypt)
    }

    /// Finishes a decrypt with a transform from
    /// [`CipherService::get_decrypt_transform`].
    ///
    /// # Errors
    ///
    /// [`KeyguardError::InvalidInput`] if `transform` is an encrypt transform,
    /// otherwise see [`CipherTransform::finalize`].
    pub fn decrypt_with_transform(
        &self,
        transform: &CipherTransform,
        ciphertext: &str,
    ) -> KeyguardResult<Zeroizing<Vec<u8>>> {
        if transform.mode() != CipherMode::Decrypt {
            return Err(KeyguardError::InvalidInput(
                "transform is not a decrypt transform".to_string(),
            ));
        }
        let ciphertext = decode_ciphertext(ciphertext)?;
        transform.finalize(&ciphertext).map(Zeroizing::new)
    }

    fn authorize(&self, key: &KeyPair, transform: &Arc<CipherTransform>) -> KeyguardResult<()> {
        let (Some(prompt), Some(validity_seconds)) = (&self.prompt, key.auth_validity_seconds())
        else {
            return Ok(());
        };
        let requirement = AuthenticationRequirement {
            alias: key.alias().to_string(),
            validity_seconds,
        };
        match prompt.authenticate(Arc::clone(transform), requirement) {
            PromptOutcome::Granted => Ok(()),
            PromptOutcome::Denied => {
                warn!("authentication denied for '{}'", key.alias());
                Err(KeyguardError::AuthenticationDenied)
            }
            PromptOutcome::TimedOut => {
                warn!("authentication prompt timed out for '{}'", key.alias());
                Err(KeyguardError::AuthenticationRequired)
            }
        }
    }
}

/// Decodes framed ciphertext. Line breaks from wrapping encoders are ignored.
fn decode_ciphertext(text: &str) -> KeyguardResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(KeyguardError::InvalidCiphertext(
            "ciphertext is empty".to_string(),
        ));
    }
    STANDARD
        .decode(compact)
        .map_err(|e| KeyguardError::InvalidCiphertext(e.to_string()))
}

pub(crate) fn utf8(bytes: &[u8]) -> KeyguardResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| KeyguardError::InvalidInput(format!("plaintext is not UTF-8: {e}")))
}

use std::sync::Arc;

use log::debug;

use crate::auth::AuthenticationPrompt;
use crate::capability::{CapabilityProbe, CapabilityProvider, SecurityCapabilityTier};
use crate::cipher::{utf8, CipherService, CipherTransform};
use crate::config::KeyguardConfig;
use crate::error::KeyguardResult;
use crate::keystore::{KeyPair, KeyStoreService, SecureKeystore};
use crate::policy::{KeyPolicy, ProtectionMode};

/// Public summary of a stored key pair.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeyPairInfo {
    /// Alias the pair is stored under.
    pub alias: String,
    /// Whether decrypting requires user authentication.
    pub requires_authentication: bool,
    /// Authentication window of the private half; `0` means every use.
    pub auth_validity_seconds: Option<u32>,
    /// Largest plaintext, in bytes, that one encryption accepts.
    pub max_plaintext_len: u64,
}

impl From<&KeyPair> for KeyPairInfo {
    fn from(key: &KeyPair) -> Self {
        Self {
            alias: key.alias().to_string(),
            requires_authentication: key.requires_authentication(),
            auth_validity_seconds: key.auth_validity_seconds(),
            max_plaintext_len: key.max_plaintext_len() as u64,
        }
    }
}

/// Device-bound key management and encryption.
///
/// Wires the capability probe, the key policy, the key store and the cipher
/// service over host-provided platform implementations. Every call is
/// synchronous and blocks on the platform.
#[derive(Debug, uniffi::Object)]
pub struct Keyguard {
    config: KeyguardConfig,
    probe: CapabilityProbe,
    policy: KeyPolicy,
    key_store: KeyStoreService,
    ciphers: CipherService,
}

impl Keyguard {
    fn build(
        keystore: Arc<dyn SecureKeystore>,
        capabilities: Arc<dyn CapabilityProvider>,
        prompt: Option<Arc<dyn AuthenticationPrompt>>,
        config: KeyguardConfig,
    ) -> KeyguardResult<Self> {
        config.validate()?;
        let key_store = KeyStoreService::new(keystore, config.alias_conflict);
        let ciphers = match prompt {
            Some(prompt) => CipherService::with_prompt(key_store.clone(), prompt),
            None => CipherService::new(key_store.clone()),
        };
        Ok(Self {
            policy: KeyPolicy::new(&config),
            probe: CapabilityProbe::new(capabilities),
            key_store,
            ciphers,
            config,
        })
    }
}

#[uniffi::export]
impl Keyguard {
    /// Creates an instance without a prompt collaborator. Decrypting with an
    /// authentication-gated key then requires a prior device unlock, or
    /// [`Keyguard::decrypt_transform`] and an externally driven prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KeyguardError::InvalidInput`] if `config` is invalid.
    #[uniffi::constructor]
    pub fn new(
        keystore: Arc<dyn SecureKeystore>,
        capabilities: Arc<dyn CapabilityProvider>,
        config: KeyguardConfig,
    ) -> KeyguardResult<Self> {
        Self::build(keystore, capabilities, None, config)
    }

    /// Creates an instance that shows `prompt` before decrypting with an
    /// authentication-gated key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KeyguardError::InvalidInput`] if `config` is invalid.
    #[uniffi::constructor]
    pub fn with_authentication_prompt(
        keystore: Arc<dyn SecureKeystore>,
        capabilities: Arc<dyn CapabilityProvider>,
        prompt: Arc<dyn AuthenticationPrompt>,
        config: KeyguardConfig,
    ) -> KeyguardResult<Self> {
        Self::build(keystore, capabilities, Some(prompt), config)
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> KeyguardConfig {
        self.config.clone()
    }

    /// Current device capability snapshot.
    #[must_use]
    pub fn capability_tier(&self) -> SecurityCapabilityTier {
        self.probe.tier()
    }

    /// Whether biometric-gated keys can be created on this device.
    #[must_use]
    pub fn can_enable_biometric_protection(&self) -> bool {
        self.probe.can_enable_biometric_protection()
    }

    /// Whether PIN-gated keys can be created on this device.
    #[must_use]
    pub fn is_pin_protection_supported(&self) -> bool {
        self.probe.is_pin_protection_supported()
    }

    /// Whether a secure lock screen is configured.
    #[must_use]
    pub fn is_system_auth_supported(&self) -> bool {
        self.probe.has_secure_lock_screen()
    }

    /// Whether usable biometric hardware is present.
    #[must_use]
    pub fn has_biometric_hardware(&self) -> bool {
        self.probe.has_biometric_hardware()
    }

    /// Creates a key pair under `alias` protected by `mode`.
    ///
    /// On legacy devices the mode is not enforceable and the key is created
    /// without authentication.
    ///
    /// # Errors
    ///
    /// See [`KeyStoreService::create_key_pair`]. Also
    /// [`crate::KeyguardError::InvalidInput`] for an empty alias or a zero PIN
    /// window.
    pub fn create_key_pair(&self, alias: &str, mode: ProtectionMode) -> KeyguardResult<KeyPairInfo> {
        let tier = self.probe.tier();
        let spec = self.policy.derive(alias, mode, &tier)?;
        debug!("creating '{alias}' with {mode:?} on {:?}", tier.os_security_level);
        let key = self.key_store.create_key_pair(&spec)?;
        Ok(KeyPairInfo::from(&key))
    }

    /// Creates a key pair from independent protection flags. Biometric wins
    /// when both are set; PIN uses the configured window.
    ///
    /// # Errors
    ///
    /// See [`Keyguard::create_key_pair`].
    pub fn create_key_pair_with_flags(
        &self,
        alias: &str,
        biometric: bool,
        system_pin: bool,
    ) -> KeyguardResult<KeyPairInfo> {
        let mode = ProtectionMode::from_flags(biometric, system_pin, &self.config);
        self.create_key_pair(alias, mode)
    }

    /// Summary of the pair stored under `alias`.
    ///
    /// # Errors
    ///
    /// See [`KeyStoreService::fetch`].
    pub fn key_pair_info(&self, alias: &str) -> KeyguardResult<KeyPairInfo> {
        Ok(KeyPairInfo::from(&self.key_store.fetch(alias)?))
    }

    /// Whether a pair exists under `alias`.
    ///
    /// # Errors
    ///
    /// See [`KeyStoreService::contains`].
    pub fn has_key_pair(&self, alias: &str) -> KeyguardResult<bool> {
        self.key_store.contains(alias)
    }

    /// Deletes the pair under `alias`. Missing aliases are not an error.
    ///
    /// # Errors
    ///
    /// See [`KeyStoreService::delete`].
    pub fn delete_key_pair(&self, alias: &str) -> KeyguardResult<()> {
        self.key_store.delete(alias)
    }

    /// Encrypts UTF-8 text, returning base64 ciphertext.
    ///
    /// # Errors
    ///
    /// See [`CipherService::encrypt`].
    pub fn encrypt(&self, alias: &str, plaintext: &str) -> KeyguardResult<String> {
        self.ciphers.encrypt_text(alias, plaintext)
    }

    /// Encrypts raw bytes, returning base64 ciphertext.
    ///
    /// # Errors
    ///
    /// See [`CipherService::encrypt`].
    pub fn encrypt_bytes(&self, alias: &str, plaintext: &[u8]) -> KeyguardResult<String> {
        self.ciphers.encrypt(alias, plaintext)
    }

    /// Decrypts base64 ciphertext to UTF-8 text.
    ///
    /// # Errors
    ///
    /// See [`CipherService::decrypt_text`].
    pub fn decrypt(&self, alias: &str, ciphertext: &str) -> KeyguardResult<String> {
        self.ciphers.decrypt_text(alias, ciphertext)
    }

    /// Decrypts base64 ciphertext to raw bytes.
    ///
    /// # Errors
    ///
    /// See [`CipherService::decrypt`].
    pub fn decrypt_bytes(&self, alias: &str, ciphertext: &str) -> KeyguardResult<Vec<u8>> {
        // the wiped buffer stays here; the caller owns the copy
        Ok(self.ciphers.decrypt(alias, ciphertext)?.to_vec())
    }

    /// Decrypt transform bound to the private half of `alias`, to be handed
    /// to a platform prompt and then to [`Keyguard::decrypt_with_transform`].
    ///
    /// # Errors
    ///
    /// See [`CipherService::get_decrypt_transform`].
    pub fn decrypt_transform(&self, alias: &str) -> KeyguardResult<Arc<CipherTransform>> {
        self.ciphers.get_decrypt_transform(alias)
    }

    /// Finishes a decrypt to UTF-8 text with an authorized transform.
    ///
    /// # Errors
    ///
    /// See [`CipherService::decrypt_with_transform`]; also
    /// [`crate::KeyguardError::InvalidInput`] if the plaintext is not UTF-8.
    #[allow(clippy::needless_pass_by_value)]
    pub fn decrypt_with_transform(
        &self,
        transform: Arc<CipherTransform>,
        ciphertext: &str,
    ) -> KeyguardResult<String> {
        utf8(&self.ciphers.decrypt_with_transform(&transform, ciphertext)?)
    }
}

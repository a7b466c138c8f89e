//! In-memory implementations of the platform traits for testing.
//!
//! These implementations are NOT secure for production use. Keys are real RSA
//! keys (so ciphertext and padding behave like a hardware keystore), but they
//! live in process memory and authentication is simulated.

#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::auth::{AuthenticationPrompt, AuthenticationRequirement, PromptOutcome};
use crate::capability::{CapabilityProvider, OsSecurityLevel};
use crate::cipher::CipherTransform;
use crate::config::{BLOCK_MODE, ENCRYPTION_PADDING, KEY_ALGORITHM};
use crate::error::KeystoreError;
use crate::keystore::{KeyPairHandle, KeystoreSession, PlatformCipher, SecureKeystore};
use crate::policy::KeyGenerationSpec;

/// Modulus size that keeps key generation fast in tests.
pub const TEST_KEY_SIZE_BITS: u32 = 1024;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

const CLOCK_START: u64 = 1_700_000_000;

// =============================================================================
// Memory Keystore
// =============================================================================

/// In-memory keystore backed by a `HashMap` of RSA key pairs.
///
/// Cloning shares the underlying store, so a test can keep a clone to drive
/// the simulated device state while the service under test owns another.
///
/// # Simulated authentication
///
/// - Every-use keys (window 0) decrypt only after
///   [`MemoryKeystore::authorize_operation`] was called for that cipher's
///   operation id.
/// - Time-bound keys decrypt while the manual clock is within the window of
///   the last [`MemoryKeystore::record_device_unlock`].
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    inner: Arc<MemoryBackend>,
}

/// Certificate bookkeeping for keys generated with a legacy spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCertificate {
    /// X.500 subject.
    pub subject: String,
    /// Serial number.
    pub serial_number: u64,
    /// Start of validity, in clock seconds.
    pub not_before: u64,
    /// End of validity, in clock seconds.
    pub not_after: u64,
}

struct MemoryBackend {
    entries: Mutex<HashMap<String, Arc<MemoryKeyPair>>>,
    available: AtomicBool,
    credential_enrolled: AtomicBool,
    clock: AtomicU64,
    last_unlock: Mutex<Option<u64>>,
    authorized_operations: Mutex<HashSet<u64>>,
    next_operation_id: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            credential_enrolled: AtomicBool::new(true),
            clock: AtomicU64::new(CLOCK_START),
            last_unlock: Mutex::new(None),
            authorized_operations: Mutex::new(HashSet::new()),
            next_operation_id: AtomicU64::new(1),
        }
    }
}

impl MemoryBackend {
    fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<MemoryKeyPair>>>, KeystoreError>
    {
        self.entries
            .lock()
            .map_err(|_| KeystoreError::Failure("mutex poisoned".to_string()))
    }

    fn take_authorization(&self, operation_id: u64) -> bool {
        self.authorized_operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&operation_id)
    }

    fn unlocked_within(&self, window_seconds: u32) -> bool {
        let last_unlock = *self
            .last_unlock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last_unlock.is_some_and(|at| self.now().saturating_sub(at) <= u64::from(window_seconds))
    }
}

impl MemoryKeystore {
    /// Creates an empty, available keystore with an enrolled device credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes [`SecureKeystore::open`] fail with [`KeystoreError::Unavailable`]
    /// while `false`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Controls whether authentication-gated keys can be generated.
    pub fn set_credential_enrolled(&self, enrolled: bool) {
        self.inner
            .credential_enrolled
            .store(enrolled, Ordering::SeqCst);
    }

    /// Simulates the user unlocking the device now.
    pub fn record_device_unlock(&self) {
        *self
            .inner
            .last_unlock
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.inner.now());
    }

    /// Simulates a successful prompt bound to one cipher operation.
    pub fn authorize_operation(&self, operation_id: u64) {
        self.inner
            .authorized_operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation_id);
        self.record_device_unlock();
    }

    /// Advances the manual clock.
    pub fn advance_clock(&self, seconds: u64) {
        self.inner.clock.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Current manual clock value, in seconds.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.inner.now()
    }

    /// Simulates the user removing the secure lock screen: the credential is
    /// gone and every authentication-gated key is permanently invalidated.
    pub fn remove_secure_lock(&self) {
        self.set_credential_enrolled(false);
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for pair in entries.values() {
            if pair.auth_validity_seconds.is_some() {
                pair.invalidated.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Certificate recorded for a key generated from a legacy spec.
    #[must_use]
    pub fn certificate(&self, alias: &str) -> Option<MemoryCertificate> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .and_then(|pair| pair.certificate.clone())
    }
}

impl SecureKeystore for MemoryKeystore {
    fn open(&self) -> Result<Arc<dyn KeystoreSession>, KeystoreError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(KeystoreError::Unavailable(
                "memory keystore is offline".to_string(),
            ));
        }
        Ok(Arc::new(MemorySession {
            backend: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    backend: Arc<MemoryBackend>,
}

impl MemorySession {
    fn handle(&self, pair: Arc<MemoryKeyPair>) -> Arc<dyn KeyPairHandle> {
        Arc::new(MemoryHandle {
            pair,
            backend: Arc::clone(&self.backend),
        })
    }
}

impl KeystoreSession for MemorySession {
    fn generate(&self, spec: KeyGenerationSpec) -> Result<Arc<dyn KeyPairHandle>, KeystoreError> {
        if spec.algorithm != KEY_ALGORITHM
            || spec.block_mode != BLOCK_MODE
            || spec.padding != ENCRYPTION_PADDING
        {
            return Err(KeystoreError::Failure(format!(
                "unsupported transformation {}/{}/{}",
                spec.algorithm, spec.block_mode, spec.padding
            )));
        }
        if spec.requires_auth && !self.backend.credential_enrolled.load(Ordering::SeqCst) {
            return Err(KeystoreError::PolicyRejected(
                "secure lock screen is not set up".to_string(),
            ));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, spec.key_size_bits as usize)
            .map_err(|e| KeystoreError::Failure(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let now = self.backend.now();
        let certificate = spec.legacy_certificate.map(|cert| MemoryCertificate {
            subject: cert.subject,
            serial_number: cert.serial_number,
            not_before: now,
            not_after: now.saturating_add(u64::from(cert.validity_years) * SECONDS_PER_YEAR),
        });

        // requires_auth without a window means every use
        let auth_validity_seconds = spec
            .requires_auth
            .then(|| spec.auth_validity_seconds.unwrap_or(0));

        let pair = Arc::new(MemoryKeyPair {
            alias: spec.alias.clone(),
            private_key,
            public_key,
            auth_validity_seconds,
            certificate,
            invalidated: AtomicBool::new(false),
        });
        self.backend
            .entries()?
            .insert(spec.alias, Arc::clone(&pair));
        Ok(self.handle(pair))
    }

    fn get(&self, alias: String) -> Result<Option<Arc<dyn KeyPairHandle>>, KeystoreError> {
        let pair = self.backend.entries()?.get(&alias).cloned();
        Ok(pair.map(|pair| self.handle(pair)))
    }

    fn contains_alias(&self, alias: String) -> Result<bool, KeystoreError> {
        Ok(self.backend.entries()?.contains_key(&alias))
    }

    fn delete(&self, alias: String) -> Result<(), KeystoreError> {
        self.backend.entries()?.remove(&alias);
        Ok(())
    }
}

struct MemoryKeyPair {
    alias: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    auth_validity_seconds: Option<u32>,
    certificate: Option<MemoryCertificate>,
    invalidated: AtomicBool,
}

struct MemoryHandle {
    pair: Arc<MemoryKeyPair>,
    backend: Arc<MemoryBackend>,
}

impl MemoryHandle {
    fn cipher(&self, half: KeyHalf) -> Arc<dyn PlatformCipher> {
        Arc::new(MemoryCipher {
            operation_id: self
                .backend
                .next_operation_id
                .fetch_add(1, Ordering::SeqCst),
            pair: Arc::clone(&self.pair),
            backend: Arc::clone(&self.backend),
            half,
        })
    }

    fn ensure_valid(&self) -> Result<(), KeystoreError> {
        if self.pair.invalidated.load(Ordering::SeqCst) {
            return Err(KeystoreError::KeyInvalidated(self.pair.alias.clone()));
        }
        Ok(())
    }
}

impl KeyPairHandle for MemoryHandle {
    fn alias(&self) -> String {
        self.pair.alias.clone()
    }

    fn modulus_bits(&self) -> u32 {
        u32::try_from(rsa::traits::PublicKeyParts::size(&self.pair.public_key) * 8)
            .unwrap_or(u32::MAX)
    }

    fn auth_validity_seconds(&self) -> Option<u32> {
        self.pair.auth_validity_seconds
    }

    fn init_public_cipher(&self) -> Result<Arc<dyn PlatformCipher>, KeystoreError> {
        Ok(self.cipher(KeyHalf::Public))
    }

    fn init_private_cipher(&self) -> Result<Arc<dyn PlatformCipher>, KeystoreError> {
        self.ensure_valid()?;
        Ok(self.cipher(KeyHalf::Private))
    }
}

#[derive(Clone, Copy)]
enum KeyHalf {
    Public,
    Private,
}

struct MemoryCipher {
    operation_id: u64,
    pair: Arc<MemoryKeyPair>,
    backend: Arc<MemoryBackend>,
    half: KeyHalf,
}

impl MemoryCipher {
    fn check_authentication(&self) -> Result<(), KeystoreError> {
        if self.pair.invalidated.load(Ordering::SeqCst) {
            return Err(KeystoreError::KeyInvalidated(self.pair.alias.clone()));
        }
        let authenticated = match self.pair.auth_validity_seconds {
            None => true,
            Some(0) => self.backend.take_authorization(self.operation_id),
            Some(window) => {
                self.backend.take_authorization(self.operation_id)
                    || self.backend.unlocked_within(window)
            }
        };
        if authenticated {
            Ok(())
        } else {
            Err(KeystoreError::UserNotAuthenticated)
        }
    }
}

impl PlatformCipher for MemoryCipher {
    fn operation_id(&self) -> u64 {
        self.operation_id
    }

    fn do_final(&self, input: Vec<u8>) -> Result<Vec<u8>, KeystoreError> {
        match self.half {
            KeyHalf::Public => self
                .pair
                .public_key
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, &input)
                .map_err(|e| KeystoreError::Failure(e.to_string())),
            KeyHalf::Private => {
                self.check_authentication()?;
                self.pair
                    .private_key
                    .decrypt(Pkcs1v15Encrypt, &input)
                    .map_err(|e| KeystoreError::BadCiphertext(e.to_string()))
            }
        }
    }
}

// =============================================================================
// Static Capabilities
// =============================================================================

/// Capability provider returning fixed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCapabilities {
    /// Reported OS security level.
    pub os_security_level: OsSecurityLevel,
    /// Reported by [`CapabilityProvider::is_device_secure`].
    pub device_secure: bool,
    /// Reported by [`CapabilityProvider::is_keyguard_secure`].
    pub keyguard_secure: bool,
    /// Reported by [`CapabilityProvider::is_biometric_hardware_detected`].
    pub biometric_hardware: bool,
    /// Reported by [`CapabilityProvider::has_enrolled_biometrics`].
    pub enrolled_biometrics: bool,
}

impl StaticCapabilities {
    /// A modern device with a lock screen and an enrolled biometric.
    #[must_use]
    pub const fn modern_with_biometrics() -> Self {
        Self {
            os_security_level: OsSecurityLevel::Modern,
            device_secure: true,
            keyguard_secure: true,
            biometric_hardware: true,
            enrolled_biometrics: true,
        }
    }

    /// A legacy device with a secure keyguard and no biometric hardware.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            os_security_level: OsSecurityLevel::Legacy,
            device_secure: false,
            keyguard_secure: true,
            biometric_hardware: false,
            enrolled_biometrics: false,
        }
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn os_security_level(&self) -> OsSecurityLevel {
        self.os_security_level
    }

    fn is_device_secure(&self) -> bool {
        self.device_secure
    }

    fn is_keyguard_secure(&self) -> bool {
        self.keyguard_secure
    }

    fn is_biometric_hardware_detected(&self) -> bool {
        self.biometric_hardware
    }

    fn has_enrolled_biometrics(&self) -> bool {
        self.enrolled_biometrics
    }
}

// =============================================================================
// Scripted Prompt
// =============================================================================

/// Authentication prompt that answers with a preset outcome.
///
/// A granted prompt authorizes the transform's operation in the
/// [`MemoryKeystore`] and records a device unlock, so both every-use and
/// time-bound keys accept the following operation.
pub struct ScriptedPrompt {
    keystore: MemoryKeystore,
    outcome: Mutex<PromptOutcome>,
    requests: Mutex<Vec<AuthenticationRequirement>>,
}

impl ScriptedPrompt {
    /// Creates a prompt bound to `keystore` that answers `outcome`.
    #[must_use]
    pub fn new(keystore: &MemoryKeystore, outcome: PromptOutcome) -> Self {
        Self {
            keystore: keystore.clone(),
            outcome: Mutex::new(outcome),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Changes the outcome of subsequent prompts.
    pub fn set_outcome(&self, outcome: PromptOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    /// Requirements the prompt was shown for, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<AuthenticationRequirement> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuthenticationPrompt for ScriptedPrompt {
    fn authenticate(
        &self,
        transform: Arc<CipherTransform>,
        requirement: AuthenticationRequirement,
    ) -> PromptOutcome {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(requirement);
        let outcome = *self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if outcome == PromptOutcome::Granted {
            if let Some(operation_id) = transform.operation_id() {
                self.keystore.authorize_operation(operation_id);
            }
        }
        outcome
    }
}

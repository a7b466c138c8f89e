//! Create/fetch/delete lifecycle of named key pairs.

use std::sync::Arc;

use log::{debug, warn};

use super::traits::{KeyPairHandle, KeystoreSession, SecureKeystore};
use crate::config::{AliasConflictPolicy, PKCS1_PADDING_OVERHEAD};
use crate::error::{KeyguardError, KeyguardResult, KeystoreError};
use crate::policy::{validate_alias, KeyGenerationSpec};

/// A key pair fetched from the keystore for one operation.
#[derive(Clone)]
pub struct KeyPair {
    alias: String,
    handle: Arc<dyn KeyPairHandle>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    fn new(alias: &str, handle: Arc<dyn KeyPairHandle>) -> Self {
        Self {
            alias: alias.to_string(),
            handle,
        }
    }

    /// Alias the pair is stored under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Backend handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<dyn KeyPairHandle> {
        &self.handle
    }

    /// Authentication window of the private half, see
    /// [`KeyPairHandle::auth_validity_seconds`].
    #[must_use]
    pub fn auth_validity_seconds(&self) -> Option<u32> {
        self.handle.auth_validity_seconds()
    }

    /// Whether decrypting requires user authentication.
    #[must_use]
    pub fn requires_authentication(&self) -> bool {
        self.auth_validity_seconds().is_some()
    }

    /// Length of one RSA block (and of every ciphertext) in bytes.
    #[must_use]
    pub fn block_len(&self) -> usize {
        (self.handle.modulus_bits() as usize).div_ceil(8)
    }

    /// Largest plaintext that fits in one PKCS#1 v1.5 block.
    #[must_use]
    pub fn max_plaintext_len(&self) -> usize {
        self.block_len().saturating_sub(PKCS1_PADDING_OVERHEAD)
    }
}

/// Owns key pair lifecycle against a [`SecureKeystore`].
///
/// Holds no session or handle cache; every call opens a fresh session.
#[derive(Clone)]
pub struct KeyStoreService {
    backend: Arc<dyn SecureKeystore>,
    alias_conflict: AliasConflictPolicy,
}

impl std::fmt::Debug for KeyStoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreService")
            .field("alias_conflict", &self.alias_conflict)
            .finish_non_exhaustive()
    }
}

impl KeyStoreService {
    /// Creates a service over a keystore backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SecureKeystore>, alias_conflict: AliasConflictPolicy) -> Self {
        Self {
            backend,
            alias_conflict,
        }
    }

    fn session(&self) -> KeyguardResult<Arc<dyn KeystoreSession>> {
        self.backend
            .open()
            .map_err(|e| KeyguardError::BackendUnavailable(e.to_string()))
    }

    /// Generates a key pair under `spec`.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::BackendUnavailable`] if the keystore cannot be opened
    /// - [`KeyguardError::AliasAlreadyExists`] if the alias is taken and the
    ///   conflict policy is [`AliasConflictPolicy::Reject`]
    /// - [`KeyguardError::UnsupportedPolicy`] if the keystore rejects the
    ///   authentication parameters
    /// - [`KeyguardError::GenerationFailed`] for any other failure
    pub fn create_key_pair(&self, spec: &KeyGenerationSpec) -> KeyguardResult<KeyPair> {
        validate_alias(&spec.alias)?;
        let session = self.session()?;

        let exists = session
            .contains_alias(spec.alias.clone())
            .map_err(generation_error)?;
        if exists {
            match self.alias_conflict {
                AliasConflictPolicy::Reject => {
                    return Err(KeyguardError::AliasAlreadyExists {
                        alias: spec.alias.clone(),
                    });
                }
                AliasConflictPolicy::Overwrite => {
                    warn!("overwriting existing key pair '{}'", spec.alias);
                }
            }
        }

        let handle = session.generate(spec.clone()).map_err(generation_error)?;
        debug!(
            "generated key pair '{}' (requires_auth: {}, window: {:?})",
            spec.alias, spec.requires_auth, spec.auth_validity_seconds
        );
        Ok(KeyPair::new(&spec.alias, handle))
    }

    /// Fetches the key pair stored under `alias`.
    ///
    /// # Errors
    ///
    /// - [`KeyguardError::KeyNotFound`] if no pair exists under `alias`
    /// - [`KeyguardError::BackendUnavailable`] if the keystore cannot be opened,
    ///   the lookup fails or it returns a handle stored under another alias
    pub fn fetch(&self, alias: &str) -> KeyguardResult<KeyPair> {
        validate_alias(alias)?;
        match self.session()?.get(alias.to_string()) {
            Ok(Some(handle)) => {
                let stored = handle.alias();
                if stored != alias {
                    return Err(KeyguardError::BackendUnavailable(format!(
                        "keystore returned '{stored}' for '{alias}'"
                    )));
                }
                Ok(KeyPair::new(alias, handle))
            }
            Ok(None) | Err(KeystoreError::KeyNotFound(_)) => Err(KeyguardError::KeyNotFound {
                alias: alias.to_string(),
            }),
            Err(e) => Err(KeyguardError::BackendUnavailable(e.to_string())),
        }
    }

    /// Whether a pair exists under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::BackendUnavailable`] if the keystore cannot be
    /// opened or queried.
    pub fn contains(&self, alias: &str) -> KeyguardResult<bool> {
        validate_alias(alias)?;
        self.session()?
            .contains_alias(alias.to_string())
            .map_err(|e| KeyguardError::BackendUnavailable(e.to_string()))
    }

    /// Deletes the pair under `alias`. Deleting a missing alias succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::BackendUnavailable`] if the keystore cannot be
    /// opened or the removal fails.
    pub fn delete(&self, alias: &str) -> KeyguardResult<()> {
        validate_alias(alias)?;
        match self.session()?.delete(alias.to_string()) {
            Ok(()) | Err(KeystoreError::KeyNotFound(_)) => {
                debug!("deleted key pair '{alias}'");
                Ok(())
            }
            Err(e) => Err(KeyguardError::BackendUnavailable(e.to_string())),
        }
    }
}

fn generation_error(error: KeystoreError) -> KeyguardError {
    match error {
        KeystoreError::Unavailable(message) => KeyguardError::BackendUnavailable(message),
        KeystoreError::PolicyRejected(message) => KeyguardError::UnsupportedPolicy(message),
        other => KeyguardError::GenerationFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{OsSecurityLevel, SecurityCapabilityTier};
    use crate::config::KeyguardConfig;
    use crate::memory::{MemoryKeystore, TEST_KEY_SIZE_BITS};
    use crate::policy::{KeyPolicy, ProtectionMode};

    const MODERN: SecurityCapabilityTier = SecurityCapabilityTier {
        has_secure_lock: true,
        has_biometric_hardware: true,
        has_enrolled_biometric: true,
        os_security_level: OsSecurityLevel::Modern,
    };

    fn spec(alias: &str, mode: ProtectionMode) -> KeyGenerationSpec {
        let config = KeyguardConfig {
            key_size_bits: TEST_KEY_SIZE_BITS,
            ..KeyguardConfig::default()
        };
        KeyPolicy::new(&config)
            .derive(alias, mode, &MODERN)
            .expect("derive")
    }

    fn service(keystore: &MemoryKeystore, conflict: AliasConflictPolicy) -> KeyStoreService {
        KeyStoreService::new(Arc::new(keystore.clone()), conflict)
    }

    #[test]
    fn test_create_fetch_delete() {
        let keystore = MemoryKeystore::new();
        let service = service(&keystore, AliasConflictPolicy::Reject);

        let created = service
            .create_key_pair(&spec("wallet-1", ProtectionMode::None))
            .expect("create");
        assert_eq!(created.alias(), "wallet-1");
        assert_eq!(created.block_len(), 128);
        assert_eq!(created.max_plaintext_len(), 117);
        assert!(!created.requires_authentication());

        let fetched = service.fetch("wallet-1").expect("fetch");
        assert_eq!(fetched.alias(), "wallet-1");
        assert!(service.contains("wallet-1").expect("contains"));

        service.delete("wallet-1").expect("delete");
        assert!(matches!(
            service.fetch("wallet-1"),
            Err(KeyguardError::KeyNotFound { alias }) if alias == "wallet-1"
        ));
    }

    #[test]
    fn test_delete_missing_alias_is_noop() {
        let keystore = MemoryKeystore::new();
        let service = service(&keystore, AliasConflictPolicy::Reject);
        service.delete("never-created").expect("delete");
        assert!(matches!(
            service.fetch("never-created"),
            Err(KeyguardError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_backend_unavailable() {
        let keystore = MemoryKeystore::new();
        let service = service(&keystore, AliasConflictPolicy::Reject);
        keystore.set_available(false);

        assert!(matches!(
            service.create_key_pair(&spec("k", ProtectionMode::None)),
            Err(KeyguardError::BackendUnavailable(_))
        ));
        assert!(matches!(
            service.fetch("k"),
            Err(KeyguardError::BackendUnavailable(_))
        ));
        assert!(matches!(
            service.delete("k"),
            Err(KeyguardError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_auth_policy_rejected_without_credential() {
        let keystore = MemoryKeystore::new();
        keystore.set_credential_enrolled(false);
        let service = service(&keystore, AliasConflictPolicy::Reject);

        assert!(matches!(
            service.create_key_pair(&spec("k", ProtectionMode::BiometricEveryUse)),
            Err(KeyguardError::UnsupportedPolicy(_))
        ));
        service
            .create_key_pair(&spec("k", ProtectionMode::None))
            .expect("ungated key needs no credential");
    }

    #[test]
    fn test_generation_failure() {
        let keystore = MemoryKeystore::new();
        let service = service(&keystore, AliasConflictPolicy::Reject);
        let mut bad = spec("k", ProtectionMode::None);
        bad.algorithm = "EC".to_string();
        assert!(matches!(
            service.create_key_pair(&bad),
            Err(KeyguardError::GenerationFailed(_))
        ));
    }

    #[test]
    fn test_alias_conflict_policies() {
        let keystore = MemoryKeystore::new();
        let reject = service(&keystore, AliasConflictPolicy::Reject);
        reject
            .create_key_pair(&spec("k", ProtectionMode::None))
            .expect("create");
        assert!(matches!(
            reject.create_key_pair(&spec("k", ProtectionMode::None)),
            Err(KeyguardError::AliasAlreadyExists { alias }) if alias == "k"
        ));

        let overwrite = service(&keystore, AliasConflictPolicy::Overwrite);
        let replaced = overwrite
            .create_key_pair(&spec("k", ProtectionMode::PinWithTimeout { window_seconds: 4 }))
            .expect("overwrite");
        assert_eq!(replaced.auth_validity_seconds(), Some(4));
        assert_eq!(
            overwrite.fetch("k").expect("fetch").auth_validity_seconds(),
            Some(4)
        );
    }

    /// Answers every lookup with the entry stored under `target`.
    struct MisroutedKeystore {
        inner: MemoryKeystore,
        target: String,
    }

    impl SecureKeystore for MisroutedKeystore {
        fn open(&self) -> Result<Arc<dyn KeystoreSession>, KeystoreError> {
            Ok(Arc::new(MisroutedSession {
                inner: self.inner.open()?,
                target: self.target.clone(),
            }))
        }
    }

    struct MisroutedSession {
        inner: Arc<dyn KeystoreSession>,
        target: String,
    }

    impl KeystoreSession for MisroutedSession {
        fn generate(
            &self,
            spec: KeyGenerationSpec,
        ) -> Result<Arc<dyn KeyPairHandle>, KeystoreError> {
            self.inner.generate(spec)
        }

        fn get(&self, _alias: String) -> Result<Option<Arc<dyn KeyPairHandle>>, KeystoreError> {
            self.inner.get(self.target.clone())
        }

        fn contains_alias(&self, alias: String) -> Result<bool, KeystoreError> {
            self.inner.contains_alias(alias)
        }

        fn delete(&self, alias: String) -> Result<(), KeystoreError> {
            self.inner.delete(alias)
        }
    }

    #[test]
    fn test_fetch_rejects_handle_for_other_alias() {
        let keystore = MemoryKeystore::new();
        service(&keystore, AliasConflictPolicy::Reject)
            .create_key_pair(&spec("other", ProtectionMode::None))
            .expect("create");

        let misrouted = KeyStoreService::new(
            Arc::new(MisroutedKeystore {
                inner: keystore,
                target: "other".to_string(),
            }),
            AliasConflictPolicy::Reject,
        );
        assert!(matches!(
            misrouted.fetch("wanted"),
            Err(KeyguardError::BackendUnavailable(message)) if message.contains("'other'")
        ));
        assert_eq!(misrouted.fetch("other").expect("fetch").alias(), "other");
    }

    #[test]
    fn test_empty_alias_rejected() {
        let keystore = MemoryKeystore::new();
        let service = service(&keystore, AliasConflictPolicy::Reject);
        assert!(matches!(
            service.fetch(""),
            Err(KeyguardError::InvalidInput(_))
        ));
    }
}

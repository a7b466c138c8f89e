//! Platform interfaces for the secure keystore.
//!
//! Private key material never crosses these traits. The core only sees opaque
//! handles and asks them for bound cipher operations.

use std::sync::Arc;

use crate::error::KeystoreError;
use crate::policy::KeyGenerationSpec;

/// Entry point to the platform keystore (e.g. `AndroidKeyStore`).
#[uniffi::export(with_foreign)]
pub trait SecureKeystore: Send + Sync {
    /// Opens and loads a keystore session.
    ///
    /// Called once per operation so that external changes (credential reset,
    /// lock screen removal) are always observed.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Unavailable`] if the keystore cannot be loaded.
    fn open(&self) -> Result<Arc<dyn KeystoreSession>, KeystoreError>;
}

/// A loaded keystore.
#[uniffi::export(with_foreign)]
pub trait KeystoreSession: Send + Sync {
    /// Generates and persists a key pair under `spec.alias`, replacing any
    /// existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::PolicyRejected`] if the authentication
    /// parameters cannot be honoured, or another error if generation fails.
    fn generate(&self, spec: KeyGenerationSpec) -> Result<Arc<dyn KeyPairHandle>, KeystoreError>;

    /// Looks up the key pair stored under `alias`.
    ///
    /// Returns `Ok(None)` (or [`KeystoreError::KeyNotFound`]) when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn get(&self, alias: String) -> Result<Option<Arc<dyn KeyPairHandle>>, KeystoreError>;

    /// Whether an entry exists under `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn contains_alias(&self, alias: String) -> Result<bool, KeystoreError>;

    /// Removes the entry under `alias`. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn delete(&self, alias: String) -> Result<(), KeystoreError>;
}

/// Opaque reference to a keystore-resident key pair.
#[uniffi::export(with_foreign)]
pub trait KeyPairHandle: Send + Sync {
    /// Alias the pair is stored under. Lookups reject a handle whose alias
    /// differs from the one requested.
    fn alias(&self) -> String;

    /// RSA modulus size of the pair.
    fn modulus_bits(&self) -> u32;

    /// Authentication window of the private half. `None` if ungated, `Some(0)`
    /// if every use must be authenticated.
    fn auth_validity_seconds(&self) -> Option<u32>;

    /// Initialises an encrypt cipher over the public half.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher cannot be initialised.
    fn init_public_cipher(&self) -> Result<Arc<dyn PlatformCipher>, KeystoreError>;

    /// Initialises a decrypt cipher over the private half.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::KeyInvalidated`] if the platform invalidated the
    /// key, or another error if the cipher cannot be initialised.
    fn init_private_cipher(&self) -> Result<Arc<dyn PlatformCipher>, KeystoreError>;
}

/// An initialised platform cipher (`javax.crypto.Cipher` on Android).
#[uniffi::export(with_foreign)]
pub trait PlatformCipher: Send + Sync {
    /// Identifier the platform uses to bind an authentication prompt to this
    /// operation.
    fn operation_id(&self) -> u64;

    /// Runs the cipher over a single block.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::UserNotAuthenticated`] if the key's
    /// authentication requirement is not met and
    /// [`KeystoreError::BadCiphertext`] if the input is rejected.
    fn do_final(&self, input: Vec<u8>) -> Result<Vec<u8>, KeystoreError>;
}

//! Immutable configuration and the fixed cipher constants.
//!
//! RSA/ECB/PKCS1 is the only transformation available on every keystore
//! generation this crate targets, so it is a constant rather than a setting.

use serde::{Deserialize, Serialize};

use crate::error::{KeyguardError, KeyguardResult};

/// Key algorithm requested from the keystore.
pub const KEY_ALGORITHM: &str = "RSA";

/// Block mode requested from the keystore.
pub const BLOCK_MODE: &str = "ECB";

/// Encryption padding requested from the keystore.
pub const ENCRYPTION_PADDING: &str = "PKCS1Padding";

/// Full cipher transformation string.
pub const TRANSFORMATION: &str = "RSA/ECB/PKCS1Padding";

/// Bytes of every RSA block consumed by PKCS#1 v1.5 encryption padding.
pub const PKCS1_PADDING_OVERHEAD: usize = 11;

/// Default re-authentication window after a device unlock, in seconds.
pub const DEFAULT_PIN_AUTH_VALIDITY_SECONDS: u32 = 4;

/// Default lifetime of the self-signed certificate on legacy keystores.
pub const DEFAULT_LEGACY_CERTIFICATE_VALIDITY_YEARS: u32 = 1000;

/// Default RSA modulus size.
pub const DEFAULT_KEY_SIZE_BITS: u32 = 2048;

const SUPPORTED_KEY_SIZES: [u32; 4] = [1024, 2048, 3072, 4096];

/// What to do when a key pair is created under an alias that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum AliasConflictPolicy {
    /// Fail with [`KeyguardError::AliasAlreadyExists`].
    #[default]
    Reject,
    /// Replace the existing pair. The previous private key is lost.
    Overwrite,
}

/// Keyguard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct KeyguardConfig {
    /// RSA modulus size requested at generation time.
    pub key_size_bits: u32,
    /// Re-authentication window used for PIN protection when the caller does
    /// not specify one.
    pub pin_auth_validity_seconds: u32,
    /// Lifetime of the self-signed certificate wrapped around legacy keys.
    pub legacy_certificate_validity_years: u32,
    /// Behaviour when creating a key under an existing alias.
    pub alias_conflict: AliasConflictPolicy,
}

impl Default for KeyguardConfig {
    fn default() -> Self {
        Self {
            key_size_bits: DEFAULT_KEY_SIZE_BITS,
            pin_auth_validity_seconds: DEFAULT_PIN_AUTH_VALIDITY_SECONDS,
            legacy_certificate_validity_years: DEFAULT_LEGACY_CERTIFICATE_VALIDITY_YEARS,
            alias_conflict: AliasConflictPolicy::default(),
        }
    }
}

impl KeyguardConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::InvalidInput`] if the JSON is malformed or the
    /// resulting configuration fails [`KeyguardConfig::validate`].
    pub fn from_json(json: &str) -> KeyguardResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KeyguardError::InvalidInput(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field is within its supported range.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> KeyguardResult<()> {
        if !SUPPORTED_KEY_SIZES.contains(&self.key_size_bits) {
            return Err(KeyguardError::InvalidInput(format!(
                "key_size_bits must be one of {SUPPORTED_KEY_SIZES:?}, got {}",
                self.key_size_bits
            )));
        }
        // zero is reserved for "authenticate on every use"
        if self.pin_auth_validity_seconds == 0 {
            return Err(KeyguardError::InvalidInput(
                "pin_auth_validity_seconds must be positive".to_string(),
            ));
        }
        if self.legacy_certificate_validity_years == 0 {
            return Err(KeyguardError::InvalidInput(
                "legacy_certificate_validity_years must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default configuration.
#[uniffi::export]
#[must_use]
pub fn default_keyguard_config() -> KeyguardConfig {
    KeyguardConfig::default()
}

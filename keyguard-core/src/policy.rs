//! Maps a requested protection mode and the device tier to key parameters.

use crate::capability::{OsSecurityLevel, SecurityCapabilityTier};
use crate::config::{
    KeyguardConfig, BLOCK_MODE, ENCRYPTION_PADDING, KEY_ALGORITHM,
};
use crate::error::{KeyguardError, KeyguardResult};

/// Validity window meaning "authenticate on every private-key use".
pub const EVERY_USE_VALIDITY_SECONDS: u32 = 0;

/// Serial number of the self-signed certificate on legacy keys.
pub const LEGACY_CERTIFICATE_SERIAL: u64 = 1;

/// Authentication gating requested for a key's private half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum ProtectionMode {
    /// No authentication.
    None,
    /// Biometric authentication on every private-key use.
    BiometricEveryUse,
    /// Device credential, valid for `window_seconds` after unlocking.
    PinWithTimeout {
        /// Grace window after a successful device unlock. Must be positive.
        window_seconds: u32,
    },
}

impl ProtectionMode {
    /// PIN protection with the configured default window.
    #[must_use]
    pub const fn pin_with_default_timeout(config: &KeyguardConfig) -> Self {
        Self::PinWithTimeout {
            window_seconds: config.pin_auth_validity_seconds,
        }
    }

    /// Builds a mode from independent biometric / system PIN flags.
    ///
    /// When both are set the stricter biometric policy wins.
    #[must_use]
    pub const fn from_flags(biometric: bool, system_pin: bool, config: &KeyguardConfig) -> Self {
        if biometric {
            Self::BiometricEveryUse
        } else if system_pin {
            Self::pin_with_default_timeout(config)
        } else {
            Self::None
        }
    }

    /// Whether this mode gates the private half behind authentication.
    #[must_use]
    pub const fn requires_authentication(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Self-signed certificate descriptor required by legacy keystores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, uniffi::Record)]
pub struct LegacyCertificate {
    /// X.500 subject, `CN=<alias> CA Certificate`.
    pub subject: String,
    /// Certificate serial number.
    pub serial_number: u64,
    /// Years from generation time until expiry.
    pub validity_years: u32,
}

/// Parameters handed to the keystore for one key generation.
///
/// Built fresh per creation call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, uniffi::Record)]
pub struct KeyGenerationSpec {
    /// Alias the pair is stored under.
    pub alias: String,
    /// Always [`KEY_ALGORITHM`].
    pub algorithm: String,
    /// Always [`BLOCK_MODE`].
    pub block_mode: String,
    /// Always [`ENCRYPTION_PADDING`].
    pub padding: String,
    /// RSA modulus size.
    pub key_size_bits: u32,
    /// Whether private-key use requires user authentication.
    pub requires_auth: bool,
    /// Re-authentication window; [`EVERY_USE_VALIDITY_SECONDS`] means every
    /// use. `None` when no authentication is required.
    pub auth_validity_seconds: Option<u32>,
    /// Present only for legacy keystores.
    pub legacy_certificate: Option<LegacyCertificate>,
}

/// Derives [`KeyGenerationSpec`]s. Pure: no I/O and no clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    key_size_bits: u32,
    legacy_certificate_validity_years: u32,
}

impl KeyPolicy {
    /// Creates a policy from the configuration.
    #[must_use]
    pub const fn new(config: &KeyguardConfig) -> Self {
        Self {
            key_size_bits: config.key_size_bits,
            legacy_certificate_validity_years: config.legacy_certificate_validity_years,
        }
    }

    /// Reconciles the requested mode with what the tier can express.
    ///
    /// # Errors
    ///
    /// Returns [`KeyguardError::InvalidInput`] for an empty alias or a PIN
    /// window of zero, which would collide with the every-use sentinel.
    pub fn derive(
        &self,
        alias: &str,
        mode: ProtectionMode,
        tier: &SecurityCapabilityTier,
    ) -> KeyguardResult<KeyGenerationSpec> {
        validate_alias(alias)?;
        if let ProtectionMode::PinWithTimeout { window_seconds: 0 } = mode {
            return Err(KeyguardError::InvalidInput(
                "PIN validity window must be positive".to_string(),
            ));
        }

        let mut spec = KeyGenerationSpec {
            alias: alias.to_string(),
            algorithm: KEY_ALGORITHM.to_string(),
            block_mode: BLOCK_MODE.to_string(),
            padding: ENCRYPTION_PADDING.to_string(),
            key_size_bits: self.key_size_bits,
            requires_auth: false,
            auth_validity_seconds: None,
            legacy_certificate: None,
        };

        match tier.os_security_level {
            OsSecurityLevel::Legacy => {
                spec.legacy_certificate = Some(LegacyCertificate {
                    subject: format!("CN={alias} CA Certificate"),
                    serial_number: LEGACY_CERTIFICATE_SERIAL,
                    validity_years: self.legacy_certificate_validity_years,
                });
            }
            OsSecurityLevel::Modern => {
                spec.auth_validity_seconds = match mode {
                    ProtectionMode::None => None,
                    ProtectionMode::BiometricEveryUse => Some(EVERY_USE_VALIDITY_SECONDS),
                    ProtectionMode::PinWithTimeout { window_seconds } => Some(window_seconds),
                };
                spec.requires_auth = spec.auth_validity_seconds.is_some();
            }
        }

        Ok(spec)
    }
}

/// Rejects empty aliases.
///
/// # Errors
///
/// Returns [`KeyguardError::InvalidInput`] if `alias` is empty.
pub fn validate_alias(alias: &str) -> KeyguardResult<()> {
    if alias.is_empty() {
        return Err(KeyguardError::InvalidInput(
            "key alias must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    const MODERN: SecurityCapabilityTier = SecurityCapabilityTier {
        has_secure_lock: true,
        has_biometric_hardware: true,
        has_enrolled_biometric: true,
        os_security_level: OsSecurityLevel::Modern,
    };

    const LEGACY: SecurityCapabilityTier = SecurityCapabilityTier {
        has_secure_lock: true,
        has_biometric_hardware: false,
        has_enrolled_biometric: false,
        os_security_level: OsSecurityLevel::Legacy,
    };

    fn policy() -> KeyPolicy {
        KeyPolicy::new(&KeyguardConfig::default())
    }

    #[test_case(ProtectionMode::None => (false, None) ; "no protection")]
    #[test_case(ProtectionMode::BiometricEveryUse => (true, Some(0)) ; "biometric")]
    #[test_case(ProtectionMode::PinWithTimeout { window_seconds: 4 } => (true, Some(4)) ; "pin")]
    #[test_case(ProtectionMode::PinWithTimeout { window_seconds: 30 } => (true, Some(30)) ; "long pin window")]
    fn test_modern_auth_fields(mode: ProtectionMode) -> (bool, Option<u32>) {
        let spec = policy().derive("wallet-1", mode, &MODERN).expect("derive");
        assert!(spec.legacy_certificate.is_none());
        (spec.requires_auth, spec.auth_validity_seconds)
    }

    #[test]
    fn test_wallet_pin_on_modern() {
        let spec = policy()
            .derive(
                "wallet-1",
                ProtectionMode::PinWithTimeout { window_seconds: 4 },
                &MODERN,
            )
            .expect("derive");
        assert_eq!(
            spec,
            KeyGenerationSpec {
                alias: "wallet-1".to_string(),
                algorithm: "RSA".to_string(),
                block_mode: "ECB".to_string(),
                padding: "PKCS1Padding".to_string(),
                key_size_bits: 2048,
                requires_auth: true,
                auth_validity_seconds: Some(4),
                legacy_certificate: None,
            }
        );
    }

    #[test_case(ProtectionMode::None ; "no protection")]
    #[test_case(ProtectionMode::BiometricEveryUse ; "biometric")]
    #[test_case(ProtectionMode::PinWithTimeout { window_seconds: 4 } ; "pin")]
    fn test_legacy_ignores_auth(mode: ProtectionMode) {
        let spec = policy().derive("wallet-1", mode, &LEGACY).expect("derive");
        assert!(!spec.requires_auth);
        assert_eq!(spec.auth_validity_seconds, None);
        assert_eq!(
            spec.legacy_certificate,
            Some(LegacyCertificate {
                subject: "CN=wallet-1 CA Certificate".to_string(),
                serial_number: 1,
                validity_years: 1000,
            })
        );
    }

    #[test]
    fn test_biometric_wins_over_pin() {
        let config = KeyguardConfig::default();
        let mode = ProtectionMode::from_flags(true, true, &config);
        assert_eq!(mode, ProtectionMode::BiometricEveryUse);
        let spec = policy().derive("a", mode, &MODERN).expect("derive");
        assert_eq!(spec.auth_validity_seconds, Some(EVERY_USE_VALIDITY_SECONDS));

        assert_eq!(
            ProtectionMode::from_flags(false, true, &config),
            ProtectionMode::PinWithTimeout { window_seconds: 4 }
        );
        assert_eq!(
            ProtectionMode::from_flags(false, false, &config),
            ProtectionMode::None
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let modes = [
            ProtectionMode::None,
            ProtectionMode::BiometricEveryUse,
            ProtectionMode::PinWithTimeout { window_seconds: 4 },
        ];
        for tier in [MODERN, LEGACY] {
            for mode in modes {
                let first = policy().derive("k", mode, &tier).expect("derive");
                let second = policy().derive("k", mode, &tier).expect("derive");
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(
            policy().derive("", ProtectionMode::None, &MODERN),
            Err(KeyguardError::InvalidInput(_))
        ));
        assert!(matches!(
            policy().derive(
                "k",
                ProtectionMode::PinWithTimeout { window_seconds: 0 },
                &MODERN
            ),
            Err(KeyguardError::InvalidInput(_))
        ));
    }
}

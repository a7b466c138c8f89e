//! Device security capability queries.

use std::sync::Arc;

/// Generation of the platform's secure-hardware API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum OsSecurityLevel {
    /// Keystore cannot bind authentication requirements to a key at
    /// generation time.
    Legacy,
    /// Keystore supports per-key authentication policy.
    Modern,
}

/// Raw platform queries implemented by the host.
///
/// On Android these map to `KeyguardManager` and the fingerprint/biometric
/// manager; on iOS to `LAContext`.
#[uniffi::export(with_foreign)]
pub trait CapabilityProvider: Send + Sync {
    /// Returns the secure-hardware API generation of the running OS.
    fn os_security_level(&self) -> OsSecurityLevel;

    /// Whether the device has an active unlock credential (PIN, pattern or
    /// password). Only meaningful on [`OsSecurityLevel::Modern`].
    fn is_device_secure(&self) -> bool;

    /// Whether the keyguard subsystem reports any secure keyguard. Used on
    /// [`OsSecurityLevel::Legacy`], where it is the only available signal.
    fn is_keyguard_secure(&self) -> bool;

    /// Whether biometric hardware is present.
    fn is_biometric_hardware_detected(&self) -> bool;

    /// Whether at least one biometric is enrolled.
    fn has_enrolled_biometrics(&self) -> bool;
}

/// Snapshot of what the device can provide for key protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Record)]
pub struct SecurityCapabilityTier {
    /// A secure lock screen is configured.
    pub has_secure_lock: bool,
    /// Biometric hardware is present and usable for key binding.
    pub has_biometric_hardware: bool,
    /// At least one biometric is enrolled.
    pub has_enrolled_biometric: bool,
    /// Secure-hardware API generation.
    pub os_security_level: OsSecurityLevel,
}

impl SecurityCapabilityTier {
    /// True iff the tier is modern, a secure lock is set, biometric hardware is
    /// present and a biometric is enrolled.
    #[must_use]
    pub const fn can_enable_biometric_protection(&self) -> bool {
        matches!(self.os_security_level, OsSecurityLevel::Modern)
            && self.has_secure_lock
            && self.has_biometric_hardware
            && self.has_enrolled_biometric
    }

    /// True iff the tier is modern and the device has an unlock credential.
    ///
    /// Any configured credential counts, not only a PIN.
    #[must_use]
    pub const fn can_enable_pin_protection(&self) -> bool {
        matches!(self.os_security_level, OsSecurityLevel::Modern) && self.has_secure_lock
    }
}

/// Interprets [`CapabilityProvider`] answers according to the OS tier.
#[derive(Clone)]
pub struct CapabilityProbe {
    provider: Arc<dyn CapabilityProvider>,
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe").finish_non_exhaustive()
    }
}

impl CapabilityProbe {
    /// Creates a probe over a platform provider.
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    /// Secure-hardware API generation.
    #[must_use]
    pub fn os_security_level(&self) -> OsSecurityLevel {
        self.provider.os_security_level()
    }

    /// Whether a secure lock screen is configured.
    ///
    /// Modern devices answer "an unlock credential is active"; legacy devices
    /// fall back to the weaker "a secure keyguard is configured".
    #[must_use]
    pub fn has_secure_lock_screen(&self) -> bool {
        self.secure_lock_at(self.os_security_level())
    }

    /// Whether biometric hardware can back a key. Always false on legacy.
    #[must_use]
    pub fn has_biometric_hardware(&self) -> bool {
        self.biometric_hardware_at(self.os_security_level())
    }

    /// Whether a biometric is enrolled. Always false on legacy.
    #[must_use]
    pub fn has_enrolled_biometric(&self) -> bool {
        self.enrolled_biometric_at(self.os_security_level())
    }

    /// See [`SecurityCapabilityTier::can_enable_biometric_protection`].
    #[must_use]
    pub fn can_enable_biometric_protection(&self) -> bool {
        self.tier().can_enable_biometric_protection()
    }

    /// See [`SecurityCapabilityTier::can_enable_pin_protection`].
    #[must_use]
    pub fn is_pin_protection_supported(&self) -> bool {
        self.tier().can_enable_pin_protection()
    }

    /// Takes a snapshot of all capability predicates.
    ///
    /// The OS level is read once and every predicate is evaluated against it.
    #[must_use]
    pub fn tier(&self) -> SecurityCapabilityTier {
        let level = self.os_security_level();
        SecurityCapabilityTier {
            has_secure_lock: self.secure_lock_at(level),
            has_biometric_hardware: self.biometric_hardware_at(level),
            has_enrolled_biometric: self.enrolled_biometric_at(level),
            os_security_level: level,
        }
    }

    fn secure_lock_at(&self, level: OsSecurityLevel) -> bool {
        match level {
            OsSecurityLevel::Modern => self.provider.is_device_secure(),
            OsSecurityLevel::Legacy => self.provider.is_keyguard_secure(),
        }
    }

    fn biometric_hardware_at(&self, level: OsSecurityLevel) -> bool {
        match level {
            OsSecurityLevel::Modern => self.provider.is_biometric_hardware_detected(),
            OsSecurityLevel::Legacy => false,
        }
    }

    fn enrolled_biometric_at(&self, level: OsSecurityLevel) -> bool {
        match level {
            OsSecurityLevel::Modern => self.provider.has_enrolled_biometrics(),
            OsSecurityLevel::Legacy => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use test_case::test_case;

    use super::*;
    use crate::memory::StaticCapabilities;

    fn probe(capabilities: StaticCapabilities) -> CapabilityProbe {
        CapabilityProbe::new(Arc::new(capabilities))
    }

    #[test]
    fn test_secure_lock_depends_on_tier() {
        let modern = StaticCapabilities {
            device_secure: false,
            keyguard_secure: true,
            ..StaticCapabilities::modern_with_biometrics()
        };
        assert!(!probe(modern).has_secure_lock_screen());

        let legacy = StaticCapabilities {
            device_secure: false,
            keyguard_secure: true,
            ..StaticCapabilities::legacy()
        };
        assert!(probe(legacy).has_secure_lock_screen());
    }

    #[test]
    fn test_legacy_never_reports_biometrics() {
        let legacy = StaticCapabilities {
            biometric_hardware: true,
            enrolled_biometrics: true,
            ..StaticCapabilities::legacy()
        };
        let probe = probe(legacy);
        assert!(!probe.has_biometric_hardware());
        assert!(!probe.has_enrolled_biometric());
        assert!(!probe.can_enable_biometric_protection());
        assert!(!probe.is_pin_protection_supported());
    }

    #[test_case(OsSecurityLevel::Modern, true, true, true => true ; "all conditions hold")]
    #[test_case(OsSecurityLevel::Legacy, true, true, true => false ; "legacy tier")]
    #[test_case(OsSecurityLevel::Modern, false, true, true => false ; "no secure lock")]
    #[test_case(OsSecurityLevel::Modern, true, false, true => false ; "no biometric hardware")]
    #[test_case(OsSecurityLevel::Modern, true, true, false => false ; "nothing enrolled")]
    fn test_can_enable_biometric_protection(
        os_security_level: OsSecurityLevel,
        secure_lock: bool,
        hardware: bool,
        enrolled: bool,
    ) -> bool {
        probe(StaticCapabilities {
            os_security_level,
            device_secure: secure_lock,
            keyguard_secure: secure_lock,
            biometric_hardware: hardware,
            enrolled_biometrics: enrolled,
        })
        .can_enable_biometric_protection()
    }

    /// Reports Modern on the first level query and Legacy afterwards.
    #[derive(Default)]
    struct DowngradingProvider {
        level_queries: AtomicUsize,
    }

    impl CapabilityProvider for DowngradingProvider {
        fn os_security_level(&self) -> OsSecurityLevel {
            if self.level_queries.fetch_add(1, Ordering::SeqCst) == 0 {
                OsSecurityLevel::Modern
            } else {
                OsSecurityLevel::Legacy
            }
        }

        fn is_device_secure(&self) -> bool {
            true
        }

        fn is_keyguard_secure(&self) -> bool {
            false
        }

        fn is_biometric_hardware_detected(&self) -> bool {
            true
        }

        fn has_enrolled_biometrics(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_tier_reads_level_once() {
        let provider = Arc::new(DowngradingProvider::default());
        let tier = CapabilityProbe::new(provider.clone()).tier();

        assert_eq!(provider.level_queries.load(Ordering::SeqCst), 1);
        assert_eq!(tier.os_security_level, OsSecurityLevel::Modern);
        assert!(tier.has_secure_lock);
        assert!(tier.can_enable_biometric_protection());
    }

    #[test]
    fn test_tier_snapshot() {
        let tier = probe(StaticCapabilities::modern_with_biometrics()).tier();
        assert_eq!(
            tier,
            SecurityCapabilityTier {
                has_secure_lock: true,
                has_biometric_hardware: true,
                has_enrolled_biometric: true,
                os_security_level: OsSecurityLevel::Modern,
            }
        );
        assert!(tier.can_enable_pin_protection());
    }
}

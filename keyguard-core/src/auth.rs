//! Authentication prompt boundary.
//!
//! The platform binds a biometric prompt to a cipher instance, not to a bare
//! key, so the prompt receives the bound [`CipherTransform`].

use std::sync::Arc;

use crate::cipher::CipherTransform;

/// Result of showing an authentication prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum PromptOutcome {
    /// The user authenticated; the transform may be finalized.
    Granted,
    /// The user declined or failed authentication.
    Denied,
    /// The prompt was dismissed by the platform's own timeout.
    TimedOut,
}

/// What the prompt is asked to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct AuthenticationRequirement {
    /// Alias of the key being unlocked.
    pub alias: String,
    /// Validity window of the key; `0` means this single operation.
    pub validity_seconds: u32,
}

/// Host-implemented prompt (e.g. `BiometricPrompt` with a `CryptoObject`).
///
/// The call blocks until the user resolves the prompt or it times out. There
/// is no cancellation from this side.
#[uniffi::export(with_foreign)]
pub trait AuthenticationPrompt: Send + Sync {
    /// Shows the prompt for `transform` and reports the outcome.
    fn authenticate(
        &self,
        transform: Arc<CipherTransform>,
        requirement: AuthenticationRequirement,
    ) -> PromptOutcome;
}

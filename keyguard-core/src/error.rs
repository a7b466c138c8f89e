use thiserror::Error;

/// Result type for keyguard operations.
pub type KeyguardResult<T> = Result<T, KeyguardError>;

/// Error outputs from `Keyguard`.
///
/// Every failure is surfaced as a distinct kind. Nothing is retried
/// internally; callers decide whether to re-prompt, retry or abort.
#[derive(Debug, Error, uniffi::Error)]
pub enum KeyguardError {
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    /// The secure storage could not be opened or loaded.
    #[error("backend_unavailable: {0}")]
    BackendUnavailable(String),
    /// No key pair exists under the requested alias.
    #[error("key_not_found: {alias}")]
    KeyNotFound {
        /// Alias that was looked up.
        alias: String,
    },
    /// A key pair already exists under the alias and the configuration
    /// forbids replacing it.
    #[error("alias_already_exists: {alias}")]
    AliasAlreadyExists {
        /// Alias that is already taken.
        alias: String,
    },
    /// The backend rejected the authentication parameters of the key spec.
    #[error("unsupported_policy: {0}")]
    UnsupportedPolicy(String),
    /// Key generation failed for any other backend-reported reason.
    #[error("generation_failed: {0}")]
    GenerationFailed(String),
    /// The plaintext does not fit in a single RSA block.
    #[error("ciphertext_too_large: {len} bytes exceeds the block capacity of {capacity} bytes")]
    CiphertextTooLarge {
        /// Length of the rejected input.
        len: u64,
        /// Largest input the bound key accepts.
        capacity: u64,
    },
    /// The input is not valid framed ciphertext for this key.
    #[error("invalid_ciphertext: {0}")]
    InvalidCiphertext(String),
    /// The backend failed while running the cipher.
    #[error("crypto_operation_failed: {0}")]
    CryptoOperationFailed(String),
    /// The key demands user authentication that has not been satisfied
    /// within its validity window.
    #[error("authentication_required")]
    AuthenticationRequired,
    /// The user declined the authentication prompt.
    #[error("authentication_denied")]
    AuthenticationDenied,
    /// The backend permanently invalidated the key, e.g. after the secure
    /// lock screen was removed.
    #[error("key_invalidated: {alias}")]
    KeyInvalidated {
        /// Alias of the invalidated key.
        alias: String,
    },
    /// A single-use transform was used a second time.
    #[error("transform_already_used")]
    TransformAlreadyUsed,
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KeyguardError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Errors reported by a secure keystore adapter.
///
/// This is the vocabulary host implementations speak. The core translates it
/// into [`KeyguardError`] depending on which operation was running.
#[derive(Debug, Error, uniffi::Error)]
pub enum KeystoreError {
    /// The keystore could not be opened or loaded.
    #[error("keystore unavailable: {0}")]
    Unavailable(String),
    /// No entry exists for the alias.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// The keystore refused the requested key parameters.
    #[error("policy rejected: {0}")]
    PolicyRejected(String),
    /// The key requires user authentication that has not been satisfied.
    #[error("user not authenticated")]
    UserNotAuthenticated,
    /// The key was permanently invalidated by the platform.
    #[error("key permanently invalidated: {0}")]
    KeyInvalidated(String),
    /// The cipher rejected its input (bad padding, wrong length).
    #[error("bad ciphertext: {0}")]
    BadCiphertext(String),
    /// Any other keystore failure.
    #[error("keystore failure: {0}")]
    Failure(String),
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KeystoreError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

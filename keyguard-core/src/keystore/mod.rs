//! Secure keystore boundary and the key pair lifecycle built on top of it.

mod service;
pub mod traits;

pub use service::{KeyPair, KeyStoreService};
pub use traits::{KeyPairHandle, KeystoreSession, PlatformCipher, SecureKeystore};

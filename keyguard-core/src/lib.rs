//! `keyguard-core` manages device-bound RSA key pairs whose private half is
//! gated by user authentication, and encrypts/decrypts against them.
//!
//! The platform keystore, capability queries and authentication prompt are
//! host-implemented traits (see [`keystore`], [`capability`] and [`auth`]).
//! [`Keyguard`] wires them together. The [`memory`] module provides
//! in-process implementations for tests.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod error;
pub use error::*;

pub mod auth;
pub mod capability;
pub mod cipher;
pub mod config;
pub mod keystore;
pub mod logger;
pub mod memory;
pub mod policy;

mod keyguard;
pub use keyguard::{KeyPairInfo, Keyguard};

uniffi::setup_scaffolding!("keyguard_core");

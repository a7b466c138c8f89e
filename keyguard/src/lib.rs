//! Mobile entry point for keyguard.
//!
//! Re-exports `keyguard_core` so the generated Kotlin and Swift bindings are
//! built from a single `cdylib` / `staticlib`.

pub use keyguard_core::*;

//! Concrete document persistence with encryption at rest.
//! AES-256-CBC envelopes on disk, with keys sourced from the environment,
//! the OS keyring, or test doubles.

pub mod cipher;
pub mod encrypted_store;
pub mod key_provider;

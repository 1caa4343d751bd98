//! Audit Storage Adapters
//!
//! - `EncryptedFileStorage`: one authenticated-encrypted file per event
//! - `InMemoryStorage`: process-local store for tests and ephemeral runs

pub mod encrypted_file;
pub mod memory;

pub use encrypted_file::{EncryptedFileStorage, MIN_KEY_LEN};
pub use memory::InMemoryStorage;

// src/core/mod.rs
pub mod crypto;
pub mod kdf;
pub mod util;
pub mod verifier;

pub use crypto::*;
pub use kdf::*;
pub use util::*;
pub use verifier::*;

pub type Result<T> = std::result::Result<T, crate::error::CoreError>;

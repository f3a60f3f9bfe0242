//! # CTR Core
//!
//! Shared types for the CTR access-control tooling.
//!
//! This crate holds the pieces every other crate in the workspace leans on:
//!
//! - The error hierarchy for structural (parse/encode) failures
//! - SHA-256 hashing and RSA-2048 signing for access descriptors
//! - Logging utilities built on `tracing`
//!
//! The capability models themselves live in `ctr_access`.

pub mod crypto;
pub mod error;
pub mod utils;

// Re-export key items for convenience
pub use crypto::{
    sha256, DescriptorSigner, Rsa2048PublicKey, Rsa2048Signature, RsaDescriptorSigner,
    RsaPrivateKey, RsaSignatureVerifier, Sha256Digest, SignatureVerifier, RSA2048_SIZE,
    RSA_PUBLIC_EXPONENT, SHA256_DIGEST_SIZE,
};
pub use error::{Arm9Error, DescriptorError, Error, KernelCapsError, LocalCapsError, SettingsError};

/// A type alias for Result with our error types
pub type Result<T, E = error::Error> = std::result::Result<T, E>;

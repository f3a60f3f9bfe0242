//! Hashing and signing.
//!
//! Access descriptors are hashed with SHA-256 and signed with RSA-2048
//! (PKCS#1 v1.5). Signing and verification sit behind [`DescriptorSigner`]
//! and [`SignatureVerifier`]; [`RsaDescriptorSigner`] and
//! [`RsaSignatureVerifier`] implement them with the `rsa` crate.

use rsa::rand_core::CryptoRngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::DescriptorError;
use crate::Result;

pub use rsa::RsaPrivateKey;

/// Public exponent used by CTR container keys.
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

const RSA2048_BITS: usize = RSA2048_SIZE * 8;

/// Size of a SHA-256 digest.
pub const SHA256_DIGEST_SIZE: usize = 0x20;

/// Size of an RSA-2048 modulus or signature.
pub const RSA2048_SIZE: usize = 0x100;

/// A SHA-256 digest.
pub type Sha256Digest = [u8; SHA256_DIGEST_SIZE];

/// An RSA-2048 signature.
pub type Rsa2048Signature = [u8; RSA2048_SIZE];

/// An RSA-2048 public key, stored as its big-endian modulus.
pub type Rsa2048PublicKey = [u8; RSA2048_SIZE];

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut digest = [0u8; SHA256_DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Produces RSA-2048 signatures over SHA-256 digests.
pub trait DescriptorSigner {
    /// Sign `digest` with the signer's private key.
    ///
    /// # Returns
    ///
    /// * `Ok(Rsa2048Signature)` - The signature.
    /// * `Err` - If the key is unusable or the backend failed.
    fn sign(&self, digest: &Sha256Digest) -> Result<Rsa2048Signature>;
}

/// Verifies RSA-2048 signatures over SHA-256 digests.
pub trait SignatureVerifier {
    /// Check `signature` over `digest` against `public_key`.
    ///
    /// Implementations report a bad signature as `false` and never panic.
    fn verify(
        &self,
        public_key: &Rsa2048PublicKey,
        digest: &Sha256Digest,
        signature: &Rsa2048Signature,
    ) -> bool;
}

/// RSA-2048 PKCS#1 v1.5 signer over SHA-256 digests.
#[derive(Debug, Clone)]
pub struct RsaDescriptorSigner {
    key: RsaPrivateKey,
}

impl RsaDescriptorSigner {
    /// Wrap a private key.
    ///
    /// # Arguments
    ///
    /// * `key` - An RSA private key with a 2048-bit modulus.
    ///
    /// # Returns
    ///
    /// * `Ok(RsaDescriptorSigner)` - The signer.
    /// * `Err` - If the modulus is not 2048 bits.
    pub fn new(key: RsaPrivateKey) -> Result<Self> {
        if key.size() != RSA2048_SIZE {
            return Err(DescriptorError::InvalidPublicKey(key.size()).into());
        }
        Ok(Self { key })
    }

    /// Generate a fresh 2048-bit key pair.
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        let key = RsaPrivateKey::new(rng, RSA2048_BITS)
            .map_err(|err| DescriptorError::SigningFailed(err.to_string()))?;
        debug!("Generated RSA-2048 key pair");
        Self::new(key)
    }

    /// The big-endian modulus of the public half, as carried in a descriptor.
    pub fn public_key(&self) -> Rsa2048PublicKey {
        modulus_bytes(&self.key.to_public_key())
    }
}

impl DescriptorSigner for RsaDescriptorSigner {
    fn sign(&self, digest: &Sha256Digest) -> Result<Rsa2048Signature> {
        let signature = self
            .key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
            .map_err(|err| DescriptorError::SigningFailed(err.to_string()))?;
        signature.as_slice().try_into().map_err(|_| {
            DescriptorError::SigningFailed(format!("signature has {} bytes", signature.len()))
                .into()
        })
    }
}

/// RSA-2048 PKCS#1 v1.5 verifier over SHA-256 digests.
#[derive(Debug, Clone, Copy)]
pub struct RsaSignatureVerifier {
    exponent: u32,
}

impl Default for RsaSignatureVerifier {
    fn default() -> Self {
        Self {
            exponent: RSA_PUBLIC_EXPONENT,
        }
    }
}

impl RsaSignatureVerifier {
    /// A verifier for keys with the standard exponent, 65537.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier for keys with a non-standard public exponent.
    pub fn with_exponent(exponent: u32) -> Self {
        Self { exponent }
    }
}

impl SignatureVerifier for RsaSignatureVerifier {
    fn verify(
        &self,
        public_key: &Rsa2048PublicKey,
        digest: &Sha256Digest,
        signature: &Rsa2048Signature,
    ) -> bool {
        let key = match RsaPublicKey::new(
            BigUint::from_bytes_be(public_key),
            BigUint::from(self.exponent),
        ) {
            Ok(key) => key,
            Err(err) => {
                warn!("Rejecting unusable RSA public key: {}", err);
                return false;
            }
        };

        key.verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature)
            .is_ok()
    }
}

/// Left-pad the modulus to the full key width.
fn modulus_bytes(key: &RsaPublicKey) -> Rsa2048PublicKey {
    let modulus = key.n().to_bytes_be();
    let mut out = [0u8; RSA2048_SIZE];
    let offset = RSA2048_SIZE.saturating_sub(modulus.len());
    out[offset..].copy_from_slice(&modulus[modulus.len().saturating_sub(RSA2048_SIZE)..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            &digest[..4],
            &[0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") starts with ba7816bf"
        );
        assert_eq!(digest[31], 0xad);
    }

    #[test]
    fn test_sha256_differs_per_input() {
        assert_ne!(sha256(b"body-a"), sha256(b"body-b"));
        assert_eq!(sha256(b""), sha256(&[]));
    }

    fn test_signer() -> RsaDescriptorSigner {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(0x3D5);
        RsaDescriptorSigner::generate(&mut rng).unwrap()
    }

    #[test]
    fn test_rsa_sign_and_verify() {
        let signer = test_signer();
        let public_key = signer.public_key();
        assert_ne!(public_key[0], 0, "2048-bit modulus fills the top byte");

        let digest = sha256(b"descriptor body");
        let signature = signer.sign(&digest).unwrap();
        let verifier = RsaSignatureVerifier::new();
        assert!(verifier.verify(&public_key, &digest, &signature));

        let other_digest = sha256(b"another body");
        assert!(!verifier.verify(&public_key, &other_digest, &signature));

        let mut tampered = signature;
        tampered[0x80] ^= 0x01;
        assert!(!verifier.verify(&public_key, &digest, &tampered));
    }

    #[test]
    fn test_unusable_public_key_is_rejected() {
        let verifier = RsaSignatureVerifier::new();
        let digest = sha256(b"body");
        assert!(!verifier.verify(&[0u8; RSA2048_SIZE], &digest, &[0u8; RSA2048_SIZE]));
    }
}

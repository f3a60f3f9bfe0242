//! Access Descriptor.
//!
//! An access descriptor is the signed grant that bounds what a program may
//! request. Its record is `signature ∥ body`, where the body is
//! `public key ∥ local caps ∥ kernel caps ∥ ARM9 access control` and the
//! signature covers the SHA-256 digest of the body.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use ctr_core::error::DescriptorError;
use ctr_core::{
    sha256, DescriptorSigner, Result, Rsa2048PublicKey, Rsa2048Signature, Sha256Digest,
    SignatureVerifier, RSA2048_SIZE,
};

use crate::check::{ExtendedHeaderChecker, RequestedCapabilities, ValidationReport};
use crate::model::{Arm11KernelCaps, Arm11LocalCaps, Arm9AccessControl};

/// Size of the signed body.
pub const BODY_SIZE: usize =
    RSA2048_SIZE + Arm11LocalCaps::SIZE + Arm11KernelCaps::SIZE + Arm9AccessControl::SIZE;

/// Unsigned access descriptor contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDescriptorBuilder {
    public_key: Rsa2048PublicKey,
    local: Arm11LocalCaps,
    kernel: Arm11KernelCaps,
    arm9: Arm9AccessControl,
}

impl AccessDescriptorBuilder {
    /// Collect the granted sets and the container public key.
    ///
    /// # Arguments
    ///
    /// * `public_key` - The RSA-2048 modulus of the container key.
    /// * `local` - The granted local capabilities.
    /// * `kernel` - The granted kernel capabilities.
    /// * `arm9` - The granted ARM9 access control.
    ///
    /// # Returns
    ///
    /// * `Ok(AccessDescriptorBuilder)` - The builder.
    /// * `Err` - If the key is not 0x100 bytes long.
    pub fn new(
        public_key: &[u8],
        local: Arm11LocalCaps,
        kernel: Arm11KernelCaps,
        arm9: Arm9AccessControl,
    ) -> Result<Self> {
        let public_key: Rsa2048PublicKey = public_key
            .try_into()
            .map_err(|_| DescriptorError::InvalidPublicKey(public_key.len()))?;
        Ok(Self {
            public_key,
            local,
            kernel,
            arm9,
        })
    }

    /// Encode the body, hash it and sign the digest.
    pub fn sign(self, signer: &dyn DescriptorSigner) -> Result<AccessDescriptor> {
        let mut body = BytesMut::with_capacity(BODY_SIZE);
        body.put_slice(&self.public_key);
        body.put(self.local.to_bytes());
        body.put(self.kernel.to_bytes()?);
        body.put(self.arm9.to_bytes());
        let body = body.freeze();

        let digest = sha256(&body);
        let signature = signer.sign(&digest)?;
        debug!(
            "Signed access descriptor for program {:#018x}",
            self.local.program_id()
        );

        Ok(AccessDescriptor {
            signature,
            public_key: self.public_key,
            local: self.local,
            kernel: self.kernel,
            arm9: self.arm9,
            body,
        })
    }
}

/// A signed access descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDescriptor {
    signature: Rsa2048Signature,
    public_key: Rsa2048PublicKey,
    local: Arm11LocalCaps,
    kernel: Arm11KernelCaps,
    arm9: Arm9AccessControl,
    /// The body exactly as signed or as read.
    body: Bytes,
}

impl AccessDescriptor {
    /// Size of the serialized record.
    pub const SIZE: usize = RSA2048_SIZE + BODY_SIZE;

    /// Parse a signed record. The signature is not checked here.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(DescriptorError::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            }
            .into());
        }

        let mut signature = [0u8; RSA2048_SIZE];
        signature.copy_from_slice(&data[..RSA2048_SIZE]);
        let body = Bytes::copy_from_slice(&data[RSA2048_SIZE..Self::SIZE]);

        let mut public_key = [0u8; RSA2048_SIZE];
        public_key.copy_from_slice(&body[..RSA2048_SIZE]);

        let local_start = RSA2048_SIZE;
        let kernel_start = local_start + Arm11LocalCaps::SIZE;
        let arm9_start = kernel_start + Arm11KernelCaps::SIZE;

        let local = Arm11LocalCaps::from_bytes(&body[local_start..kernel_start])?;
        let kernel = Arm11KernelCaps::from_bytes(&body[kernel_start..arm9_start])?;
        let arm9 = Arm9AccessControl::from_bytes(&body[arm9_start..])?;

        Ok(Self {
            signature,
            public_key,
            local,
            kernel,
            arm9,
            body,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&self.signature);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// The signed body bytes.
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn body_hash(&self) -> Sha256Digest {
        sha256(&self.body)
    }

    pub fn signature(&self) -> &Rsa2048Signature {
        &self.signature
    }

    /// The container public key carried in the body.
    pub fn public_key(&self) -> &Rsa2048PublicKey {
        &self.public_key
    }

    pub fn local_caps(&self) -> &Arm11LocalCaps {
        &self.local
    }

    pub fn kernel_caps(&self) -> &Arm11KernelCaps {
        &self.kernel
    }

    pub fn arm9_access_control(&self) -> &Arm9AccessControl {
        &self.arm9
    }

    /// Verify the signature over the body against `public_key`.
    ///
    /// A bad signature is reported as `false`, never as an error.
    pub fn validate_signature(
        &self,
        verifier: &dyn SignatureVerifier,
        public_key: &Rsa2048PublicKey,
    ) -> bool {
        let valid = verifier.verify(public_key, &self.body_hash(), &self.signature);
        if !valid {
            warn!(
                "Access descriptor signature rejected for program {:#018x}",
                self.local.program_id()
            );
        }
        valid
    }

    /// Check a program's requested capabilities against this grant.
    pub fn validate_extended_header<R>(&self, requested: &R) -> ValidationReport
    where
        R: RequestedCapabilities + ?Sized,
    {
        ExtendedHeaderChecker::new(&self.local, &self.kernel, &self.arm9).check(requested)
    }
}

//! Access Control Info.
//!
//! The block a program carries in its extended header to declare the
//! capabilities it wants: local caps, then kernel caps, then ARM9 access
//! control. It is the usual source of requested capabilities for
//! [`AccessDescriptor::validate_extended_header`](crate::AccessDescriptor::validate_extended_header).

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use ctr_core::Result;

use crate::check::RequestedCapabilities;
use crate::model::{Arm11KernelCaps, Arm11LocalCaps, Arm9AccessControl};

/// Declared capabilities of one program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlInfo {
    local: Arm11LocalCaps,
    kernel: Arm11KernelCaps,
    arm9: Arm9AccessControl,
}

impl AccessControlInfo {
    /// Size of the serialized block.
    pub const SIZE: usize = Arm11LocalCaps::SIZE + Arm11KernelCaps::SIZE + Arm9AccessControl::SIZE;

    pub fn new(local: Arm11LocalCaps, kernel: Arm11KernelCaps, arm9: Arm9AccessControl) -> Self {
        Self { local, kernel, arm9 }
    }

    pub fn local_caps_mut(&mut self) -> &mut Arm11LocalCaps {
        &mut self.local
    }

    pub fn kernel_caps_mut(&mut self) -> &mut Arm11KernelCaps {
        &mut self.kernel
    }

    pub fn arm9_access_control_mut(&mut self) -> &mut Arm9AccessControl {
        &mut self.arm9
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put(self.local.to_bytes());
        buf.put(self.kernel.to_bytes()?);
        buf.put(self.arm9.to_bytes());
        Ok(buf.freeze())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (local, rest) = data.split_at(data.len().min(Arm11LocalCaps::SIZE));
        let local = Arm11LocalCaps::from_bytes(local)?;
        let (kernel, rest) = rest.split_at(rest.len().min(Arm11KernelCaps::SIZE));
        let kernel = Arm11KernelCaps::from_bytes(kernel)?;
        let arm9 = Arm9AccessControl::from_bytes(rest)?;
        Ok(Self { local, kernel, arm9 })
    }
}

impl RequestedCapabilities for AccessControlInfo {
    fn local_caps(&self) -> &Arm11LocalCaps {
        &self.local
    }

    fn kernel_caps(&self) -> &Arm11KernelCaps {
        &self.kernel
    }

    fn arm9_access_control(&self) -> &Arm9AccessControl {
        &self.arm9
    }
}

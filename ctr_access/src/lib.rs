//! # CTR Access
//!
//! `ctr_access` encodes, decodes and authorizes the access control data of
//! CTR executables.
//!
//! Key concepts:
//!
//! 1. **Capability sets**: The ARM11 local capabilities, the ARM11 kernel
//!    capabilities and the ARM9 access control, each with a fixed binary block.
//!
//! 2. **Access Control Info**: The capability sets a program declares for
//!    itself in its extended header.
//!
//! 3. **Access Descriptor**: A signed grant of capability sets. A program's
//!    declared sets must stay within the grant.
//!
//! Authorization never fails with an error. Every field is checked and the
//! outcome is returned as a [`ValidationReport`].

pub mod aci;
pub mod check;
pub mod descriptor;
pub mod model;
pub mod settings;

// Re-export key types for convenience
pub use aci::AccessControlInfo;
pub use check::{ExtendedHeaderChecker, ReportField, RequestedCapabilities, ValidationReport};
pub use descriptor::{AccessDescriptor, AccessDescriptorBuilder};
pub use model::{
    Arm11KernelCaps, Arm11LocalCaps, Arm9AccessControl, Arm9Right, CapabilityTag,
    CapabilityWord, CpuSpeed, FsRight, KernelFlags, KernelVersion, MemoryMapping, MemoryType,
    ResourceLimitCategory, SaveDataAccess, SystemMode, SystemModeExt,
};
pub use settings::AccessControlSettings;

//! Capability set models and their binary codecs.

pub mod arm9;
pub mod flags;
pub mod kernel;
pub mod local;
pub mod savedata;
pub mod word;

pub use arm9::{Arm9AccessControl, Arm9Right};
pub use flags::{CpuSpeed, LocalFlags, SystemMode, SystemModeExt};
pub use kernel::{Arm11KernelCaps, KernelFlags, MemoryMapping, MemoryType};
pub use local::{Arm11LocalCaps, FsRight, ResourceLimitCategory};
pub use savedata::SaveDataAccess;
pub use word::{CapabilityTag, CapabilityWord, KernelVersion};

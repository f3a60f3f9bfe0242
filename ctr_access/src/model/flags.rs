//! Packed ARM11 local capability flags.
//!
//! The four flag bytes of the local capability block are handled as one
//! little-endian `u32`. Every field has a fixed shift and width so the
//! layout never depends on how a compiler packs bitfields.

use serde::{Deserialize, Serialize};

use ctr_core::error::LocalCapsError;

const L2_CACHE_SHIFT: u32 = 0;
const CPU_SPEED_SHIFT: u32 = 1;
const SYSTEM_MODE_EXT_SHIFT: u32 = 8;
const IDEAL_PROCESSOR_SHIFT: u32 = 16;
const AFFINITY_MASK_SHIFT: u32 = 18;
const SYSTEM_MODE_SHIFT: u32 = 20;
const THREAD_PRIORITY_SHIFT: u32 = 24;

const ONE_BIT: u32 = 0x1;
const TWO_BITS: u32 = 0x3;
const FOUR_BITS: u32 = 0xF;
const EIGHT_BITS: u32 = 0xFF;

const fn get(raw: u32, shift: u32, mask: u32) -> u32 {
    (raw >> shift) & mask
}

const fn set(raw: u32, shift: u32, mask: u32, value: u32) -> u32 {
    (raw & !(mask << shift)) | ((value & mask) << shift)
}

/// CPU clock a program runs at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CpuSpeed {
    #[default]
    Mhz268 = 0,
    Mhz804 = 1,
}

impl From<bool> for CpuSpeed {
    fn from(fast: bool) -> Self {
        if fast {
            Self::Mhz804
        } else {
            Self::Mhz268
        }
    }
}

/// Memory layout requested on the original hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemMode {
    #[default]
    Prod = 0,
    Dev1 = 2,
    Dev2 = 3,
    Dev3 = 4,
    Dev4 = 5,
}

impl TryFrom<u8> for SystemMode {
    type Error = LocalCapsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Prod),
            2 => Ok(Self::Dev1),
            3 => Ok(Self::Dev2),
            4 => Ok(Self::Dev3),
            5 => Ok(Self::Dev4),
            other => Err(LocalCapsError::FieldOutOfRange {
                field: "system mode",
                value: u32::from(other),
            }),
        }
    }
}

/// Memory layout requested on the extended hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemModeExt {
    /// Use the layout selected by [`SystemMode`].
    #[default]
    Legacy = 0,
    Prod = 1,
    Dev1 = 2,
    Dev2 = 3,
}

impl TryFrom<u8> for SystemModeExt {
    type Error = LocalCapsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Prod),
            2 => Ok(Self::Dev1),
            3 => Ok(Self::Dev2),
            other => Err(LocalCapsError::FieldOutOfRange {
                field: "extended system mode",
                value: u32::from(other),
            }),
        }
    }
}

/// The packed flag word of the local capability block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFlags(u32);

impl LocalFlags {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn l2_cache(self) -> bool {
        get(self.0, L2_CACHE_SHIFT, ONE_BIT) != 0
    }

    pub const fn with_l2_cache(self, enabled: bool) -> Self {
        Self(set(self.0, L2_CACHE_SHIFT, ONE_BIT, enabled as u32))
    }

    pub const fn cpu_speed(self) -> CpuSpeed {
        if get(self.0, CPU_SPEED_SHIFT, ONE_BIT) != 0 {
            CpuSpeed::Mhz804
        } else {
            CpuSpeed::Mhz268
        }
    }

    pub const fn with_cpu_speed(self, speed: CpuSpeed) -> Self {
        Self(set(self.0, CPU_SPEED_SHIFT, ONE_BIT, speed as u32))
    }

    pub const fn system_mode_ext_raw(self) -> u8 {
        get(self.0, SYSTEM_MODE_EXT_SHIFT, FOUR_BITS) as u8
    }

    pub const fn with_system_mode_ext(self, mode: SystemModeExt) -> Self {
        Self(set(self.0, SYSTEM_MODE_EXT_SHIFT, FOUR_BITS, mode as u32))
    }

    /// Ideal processor; an index in a request, a bitmap in a grant.
    pub const fn ideal_processor(self) -> u8 {
        get(self.0, IDEAL_PROCESSOR_SHIFT, TWO_BITS) as u8
    }

    pub const fn with_ideal_processor(self, value: u8) -> Self {
        Self(set(self.0, IDEAL_PROCESSOR_SHIFT, TWO_BITS, value as u32))
    }

    pub const fn affinity_mask(self) -> u8 {
        get(self.0, AFFINITY_MASK_SHIFT, TWO_BITS) as u8
    }

    pub const fn with_affinity_mask(self, mask: u8) -> Self {
        Self(set(self.0, AFFINITY_MASK_SHIFT, TWO_BITS, mask as u32))
    }

    pub const fn system_mode_raw(self) -> u8 {
        get(self.0, SYSTEM_MODE_SHIFT, FOUR_BITS) as u8
    }

    pub const fn with_system_mode(self, mode: SystemMode) -> Self {
        Self(set(self.0, SYSTEM_MODE_SHIFT, FOUR_BITS, mode as u32))
    }

    pub const fn thread_priority(self) -> i8 {
        get(self.0, THREAD_PRIORITY_SHIFT, EIGHT_BITS) as u8 as i8
    }

    pub const fn with_thread_priority(self, priority: i8) -> Self {
        Self(set(self.0, THREAD_PRIORITY_SHIFT, EIGHT_BITS, priority as u8 as u32))
    }

    /// Whether a two-bit field value fits.
    pub const fn fits_two_bits(value: u8) -> bool {
        value as u32 <= TWO_BITS
    }
}

//! ARM9 access control model.
//!
//! A 15-byte bitmap of low-level I/O rights followed by the descriptor
//! format version.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ctr_core::error::Arm9Error;
use ctr_core::Result;

/// Size of the rights bitmap.
pub const RIGHTS_SIZE: usize = 15;

/// Number of addressable right bits.
pub const MAX_RIGHTS: u32 = (RIGHTS_SIZE * 8) as u32;

/// Descriptor version written by current firmware.
pub const DEFAULT_DESC_VERSION: u8 = 2;

/// Named ARM9 I/O rights. The value is the bit index in the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Arm9Right {
    MountNand = 0,
    MountNandRoWrite = 1,
    MountTwln = 2,
    MountWnand = 3,
    MountCardSpi = 4,
    UseSdif3 = 5,
    CreateSeed = 6,
    UseCardSpi = 7,
    SdApplication = 8,
    MountSdmcWrite = 9,
}

impl Arm9Right {
    /// Every named right, in bit order.
    pub const ALL: [Arm9Right; 10] = [
        Self::MountNand,
        Self::MountNandRoWrite,
        Self::MountTwln,
        Self::MountWnand,
        Self::MountCardSpi,
        Self::UseSdif3,
        Self::CreateSeed,
        Self::UseCardSpi,
        Self::SdApplication,
        Self::MountSdmcWrite,
    ];

    /// Bit index of the right in the bitmap.
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Settings name of the right.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MountNand => "mount_nand",
            Self::MountNandRoWrite => "mount_nand_ro_write",
            Self::MountTwln => "mount_twln",
            Self::MountWnand => "mount_wnand",
            Self::MountCardSpi => "mount_card_spi",
            Self::UseSdif3 => "use_sdif3",
            Self::CreateSeed => "create_seed",
            Self::UseCardSpi => "use_card_spi",
            Self::SdApplication => "sd_application",
            Self::MountSdmcWrite => "mount_sdmc_write",
        }
    }

    /// Look up a right by its settings name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|right| right.name() == name)
    }
}

/// ARM9 access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arm9AccessControl {
    rights: [u8; RIGHTS_SIZE],
    desc_version: u8,
}

impl Default for Arm9AccessControl {
    fn default() -> Self {
        Self {
            rights: [0; RIGHTS_SIZE],
            desc_version: DEFAULT_DESC_VERSION,
        }
    }
}

impl Arm9AccessControl {
    /// Size of the serialized block.
    pub const SIZE: usize = 0x10;

    /// An empty rights bitmap at [`DEFAULT_DESC_VERSION`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a named right.
    pub fn add_right(&mut self, right: Arm9Right) {
        self.set_bit(right.bit());
    }

    /// Grant a right by bit index.
    pub fn add_raw_right(&mut self, bit: u32) -> Result<()> {
        if bit >= MAX_RIGHTS {
            return Err(Arm9Error::RightOutOfRange(bit).into());
        }
        self.set_bit(bit);
        Ok(())
    }

    /// Whether the right at `bit` is granted.
    pub fn has_right(&self, bit: u32) -> bool {
        bit < MAX_RIGHTS && self.rights[(bit / 8) as usize] & (1 << (bit % 8)) != 0
    }

    /// Granted right bit indices, in ascending order.
    pub fn rights(&self) -> Vec<u32> {
        (0..MAX_RIGHTS).filter(|bit| self.has_right(*bit)).collect()
    }

    /// Descriptor version byte. Grants and requests must agree on it.
    pub fn desc_version(&self) -> u8 {
        self.desc_version
    }

    /// Set the descriptor version byte.
    pub fn set_desc_version(&mut self, version: u8) {
        self.desc_version = version;
    }

    fn set_bit(&mut self, bit: u32) {
        self.rights[(bit / 8) as usize] |= 1 << (bit % 8);
    }

    /// Encode the 0x10-byte block: rights bitmap, then the version byte.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&self.rights);
        buf.put_u8(self.desc_version);
        buf.freeze()
    }

    /// Decode a 0x10-byte block.
    ///
    /// # Returns
    ///
    /// * `Ok(Arm9AccessControl)` - The decoded block; trailing bytes are ignored.
    /// * `Err` - If `data` is shorter than [`Self::SIZE`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Arm9Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            }
            .into());
        }

        let mut rights = [0u8; RIGHTS_SIZE];
        rights.copy_from_slice(&data[..RIGHTS_SIZE]);
        let control = Self {
            rights,
            desc_version: data[RIGHTS_SIZE],
        };
        debug!(
            "Decoded ARM9 access control: version {}, rights {:?}",
            control.desc_version,
            control.rights()
        );
        Ok(control)
    }
}

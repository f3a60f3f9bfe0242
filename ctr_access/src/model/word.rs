//! Kernel capability word codec.
//!
//! Every ARM11 kernel capability is a 32-bit word whose run of leading one
//! bits (the prefix) selects its meaning. The bit after the prefix is always
//! zero; the remaining low bits carry the payload.

use serde::{Deserialize, Serialize};
use tracing::trace;

use ctr_core::error::KernelCapsError;

/// Number of 7-bit interrupt slots in one interrupt word.
pub const INTERRUPTS_PER_WORD: usize = 4;

/// Interrupt slot value meaning "no interrupt".
pub const INTERRUPT_SENTINEL: u8 = 0x7F;

/// Number of syscalls described by one syscall word.
pub const SYSCALLS_PER_WORD: u32 = 24;

/// Highest syscall group index a syscall word can carry.
pub const MAX_SYSCALL_GROUP: u32 = 7;

/// Shift between a mapped address and its page number.
pub const PAGE_SHIFT: u32 = 12;

/// Mask of the page number inside a mapping word.
pub const PAGE_NUMBER_MASK: u32 = 0x000F_FFFF;

/// Flag bit inside a mapping-range word.
pub const MAPPING_FLAG_BIT: u32 = 1 << 20;

/// Memory type field inside a kernel flag word.
pub const MEMORY_TYPE_SHIFT: u32 = 8;
pub const MEMORY_TYPE_MASK: u32 = 0xF << MEMORY_TYPE_SHIFT;

const SYSCALL_GROUP_SHIFT: u32 = 24;
const SYSCALL_MASK: u32 = 0x00FF_FFFF;
const INTERRUPT_BITS: u32 = 7;
const INTERRUPT_MASK: u32 = 0x7F;

/// The meaning of a capability word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityTag {
    Interrupt,
    SystemCall,
    ReleaseKernelVersion,
    HandleTableSize,
    KernelFlag,
    MappingRange,
    MappingPage,
    Unused,
}

/// Prefix length to tag. Prefix lengths not listed here are invalid.
const PREFIX_TABLE: [(u32, CapabilityTag); 8] = [
    (3, CapabilityTag::Interrupt),
    (4, CapabilityTag::SystemCall),
    (6, CapabilityTag::ReleaseKernelVersion),
    (7, CapabilityTag::HandleTableSize),
    (8, CapabilityTag::KernelFlag),
    (9, CapabilityTag::MappingRange),
    (11, CapabilityTag::MappingPage),
    (32, CapabilityTag::Unused),
];

impl CapabilityTag {
    /// Number of leading one bits identifying this tag.
    pub const fn prefix_bits(self) -> u32 {
        match self {
            Self::Interrupt => 3,
            Self::SystemCall => 4,
            Self::ReleaseKernelVersion => 6,
            Self::HandleTableSize => 7,
            Self::KernelFlag => 8,
            Self::MappingRange => 9,
            Self::MappingPage => 11,
            Self::Unused => 32,
        }
    }

    /// Look up the tag for a prefix length.
    pub fn from_prefix_bits(prefix_bits: u32) -> Option<Self> {
        PREFIX_TABLE
            .iter()
            .find(|(bits, _)| *bits == prefix_bits)
            .map(|(_, tag)| *tag)
    }

    /// Mask of the payload bits available to this tag.
    pub const fn payload_mask(self) -> u32 {
        payload_mask(self.prefix_bits())
    }
}

/// The all-ones prefix of `prefix_bits` length.
pub const fn prefix_mask(prefix_bits: u32) -> u32 {
    if prefix_bits == 0 {
        0
    } else if prefix_bits >= 32 {
        u32::MAX
    } else {
        !(u32::MAX >> prefix_bits)
    }
}

/// The bits left for the payload after the prefix and its terminating zero.
pub const fn payload_mask(prefix_bits: u32) -> u32 {
    if prefix_bits >= 31 {
        0
    } else {
        u32::MAX >> (prefix_bits + 1)
    }
}

/// Build a raw word from a tag and its payload. Payload bits that do not
/// fit are discarded.
pub const fn make(tag: CapabilityTag, data: u32) -> u32 {
    let prefix_bits = tag.prefix_bits();
    prefix_mask(prefix_bits) | (data & payload_mask(prefix_bits))
}

/// ARM11 kernel release version required by a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KernelVersion {
    pub major: u8,
    pub minor: u8,
}

impl KernelVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    const fn to_payload(self) -> u32 {
        ((self.major as u32) << 8) | self.minor as u32
    }

    const fn from_payload(payload: u32) -> Self {
        Self {
            major: (payload >> 8) as u8,
            minor: payload as u8,
        }
    }
}

/// A decoded kernel capability word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityWord {
    /// Four interrupt slots, first slot in the most significant position.
    /// Empty slots hold [`INTERRUPT_SENTINEL`].
    Interrupt([u8; INTERRUPTS_PER_WORD]),

    /// 24 permitted syscalls starting at `group * 24`.
    SystemCall { group: u8, mask: u32 },

    ReleaseKernelVersion(KernelVersion),

    HandleTableSize(u32),

    /// Kernel flag bits with the memory type field cleared, and the memory
    /// type value itself.
    KernelFlag { flags: u32, memory_type: u8 },

    /// One half of a mapped address range. `flag` is the read-only bit on the
    /// start word and the static-mapping marker on the end word.
    MappingRange { page: u32, flag: bool },

    /// A single I/O page.
    MappingPage { page: u32 },

    Unused,
}

impl CapabilityWord {
    /// An interrupt word holding up to four interrupts; missing slots are
    /// filled with the sentinel.
    pub fn interrupts(values: &[u8]) -> Self {
        let mut slots = [INTERRUPT_SENTINEL; INTERRUPTS_PER_WORD];
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = *value & INTERRUPT_SENTINEL;
        }
        Self::Interrupt(slots)
    }

    /// The tag of this word.
    pub fn tag(&self) -> CapabilityTag {
        match self {
            Self::Interrupt(_) => CapabilityTag::Interrupt,
            Self::SystemCall { .. } => CapabilityTag::SystemCall,
            Self::ReleaseKernelVersion(_) => CapabilityTag::ReleaseKernelVersion,
            Self::HandleTableSize(_) => CapabilityTag::HandleTableSize,
            Self::KernelFlag { .. } => CapabilityTag::KernelFlag,
            Self::MappingRange { .. } => CapabilityTag::MappingRange,
            Self::MappingPage { .. } => CapabilityTag::MappingPage,
            Self::Unused => CapabilityTag::Unused,
        }
    }

    /// The payload bits of this word, before the prefix is applied.
    pub fn payload(&self) -> u32 {
        match *self {
            Self::Interrupt(slots) => slots.iter().fold(0u32, |acc, slot| {
                (acc << INTERRUPT_BITS) | (u32::from(*slot) & INTERRUPT_MASK)
            }),
            Self::SystemCall { group, mask } => {
                (u32::from(group) << SYSCALL_GROUP_SHIFT) | (mask & SYSCALL_MASK)
            }
            Self::ReleaseKernelVersion(version) => version.to_payload(),
            Self::HandleTableSize(size) => size,
            Self::KernelFlag { flags, memory_type } => {
                (flags & !MEMORY_TYPE_MASK)
                    | ((u32::from(memory_type) << MEMORY_TYPE_SHIFT) & MEMORY_TYPE_MASK)
            }
            Self::MappingRange { page, flag } => {
                let flag = if flag { MAPPING_FLAG_BIT } else { 0 };
                (page & PAGE_NUMBER_MASK) | flag
            }
            Self::MappingPage { page } => page & PAGE_NUMBER_MASK,
            Self::Unused => 0,
        }
    }

    /// Encode this word.
    pub fn raw(&self) -> u32 {
        make(self.tag(), self.payload())
    }

    /// Decode a raw word by its prefix length.
    pub fn decode(raw: u32) -> Result<Self, KernelCapsError> {
        let prefix_bits = raw.leading_ones();
        let tag = CapabilityTag::from_prefix_bits(prefix_bits)
            .ok_or(KernelCapsError::UnknownTag(raw))?;
        let payload = raw & tag.payload_mask();

        let word = match tag {
            CapabilityTag::Interrupt => {
                let mut slots = [INTERRUPT_SENTINEL; INTERRUPTS_PER_WORD];
                for (index, slot) in slots.iter_mut().enumerate() {
                    let shift = INTERRUPT_BITS * (INTERRUPTS_PER_WORD - 1 - index) as u32;
                    *slot = ((payload >> shift) & INTERRUPT_MASK) as u8;
                }
                Self::Interrupt(slots)
            }
            CapabilityTag::SystemCall => Self::SystemCall {
                group: (payload >> SYSCALL_GROUP_SHIFT) as u8,
                mask: payload & SYSCALL_MASK,
            },
            CapabilityTag::ReleaseKernelVersion => {
                Self::ReleaseKernelVersion(KernelVersion::from_payload(payload))
            }
            CapabilityTag::HandleTableSize => Self::HandleTableSize(payload),
            CapabilityTag::KernelFlag => Self::KernelFlag {
                flags: payload & !MEMORY_TYPE_MASK,
                memory_type: ((payload & MEMORY_TYPE_MASK) >> MEMORY_TYPE_SHIFT) as u8,
            },
            CapabilityTag::MappingRange => Self::MappingRange {
                page: payload & PAGE_NUMBER_MASK,
                flag: payload & MAPPING_FLAG_BIT != 0,
            },
            CapabilityTag::MappingPage => Self::MappingPage {
                page: payload & PAGE_NUMBER_MASK,
            },
            CapabilityTag::Unused => Self::Unused,
        };

        trace!("decoded capability word {:#010x} as {:?}", raw, word);
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_table_matches_tags() {
        for (bits, tag) in PREFIX_TABLE {
            assert_eq!(tag.prefix_bits(), bits);
            assert_eq!(CapabilityTag::from_prefix_bits(bits), Some(tag));
        }
        assert_eq!(CapabilityTag::from_prefix_bits(5), None);
        assert_eq!(CapabilityTag::from_prefix_bits(10), None);
    }

    #[test]
    fn test_make_keeps_separator_clear() {
        assert_eq!(make(CapabilityTag::Interrupt, u32::MAX), 0xEFFF_FFFF);
        assert_eq!(make(CapabilityTag::SystemCall, 0), 0xF000_0000);
        assert_eq!(make(CapabilityTag::KernelFlag, 0), 0xFF00_0000);
        assert_eq!(make(CapabilityTag::MappingPage, u32::MAX), 0xFFE0_0000 | 0x000F_FFFF);
        assert_eq!(make(CapabilityTag::Unused, 0), u32::MAX);
    }

    #[test]
    fn test_decode_each_tag() {
        let word = CapabilityWord::decode(0xF200_0001).unwrap();
        assert_eq!(word, CapabilityWord::SystemCall { group: 2, mask: 1 });

        let word = CapabilityWord::decode(make(CapabilityTag::ReleaseKernelVersion, 0x0233)).unwrap();
        assert_eq!(word, CapabilityWord::ReleaseKernelVersion(KernelVersion::new(2, 0x33)));

        let word = CapabilityWord::decode(0xFE00_0200).unwrap();
        assert_eq!(word, CapabilityWord::HandleTableSize(0x200));

        let word = CapabilityWord::decode(0xFF00_02A3).unwrap();
        assert_eq!(word, CapabilityWord::KernelFlag { flags: 0xA3, memory_type: 2 });

        let word = CapabilityWord::decode(make(CapabilityTag::MappingRange, 0x10 | MAPPING_FLAG_BIT)).unwrap();
        assert_eq!(word, CapabilityWord::MappingRange { page: 0x10, flag: true });

        let word = CapabilityWord::decode(0xFFE1_EC00).unwrap();
        assert_eq!(word, CapabilityWord::MappingPage { page: 0x1EC00 });

        assert_eq!(CapabilityWord::decode(u32::MAX).unwrap(), CapabilityWord::Unused);
    }

    #[test]
    fn test_decode_rejects_unknown_prefix() {
        // Five leading ones.
        assert_eq!(
            CapabilityWord::decode(0xF800_0000),
            Err(KernelCapsError::UnknownTag(0xF800_0000))
        );
        // Ten leading ones.
        assert!(CapabilityWord::decode(0xFFC0_0000).is_err());
        // No prefix at all.
        assert!(CapabilityWord::decode(0x0000_0001).is_err());
    }

    #[test]
    fn test_interrupt_slots_are_msb_first() {
        let word = CapabilityWord::interrupts(&[0x01, 0x02]);
        let raw = word.raw();
        assert_eq!(raw >> 29, 0b111);
        assert_eq!((raw >> 21) & 0x7F, 0x01);
        assert_eq!((raw >> 14) & 0x7F, 0x02);
        assert_eq!((raw >> 7) & 0x7F, 0x7F);
        assert_eq!(raw & 0x7F, 0x7F);

        let decoded = CapabilityWord::decode(raw).unwrap();
        assert_eq!(decoded, CapabilityWord::Interrupt([0x01, 0x02, 0x7F, 0x7F]));
    }

    #[test]
    fn test_memory_type_does_not_leak_into_flags() {
        let word = CapabilityWord::KernelFlag { flags: 0xFFFF_FFFF, memory_type: 3 };
        let decoded = CapabilityWord::decode(word.raw()).unwrap();
        match decoded {
            CapabilityWord::KernelFlag { flags, memory_type } => {
                assert_eq!(memory_type, 3);
                assert_eq!(flags & MEMORY_TYPE_MASK, 0);
            }
            other => panic!("unexpected word {other:?}"),
        }
    }
}

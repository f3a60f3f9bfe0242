//! ARM11 kernel capability model.
//!
//! This module defines the kernel capability set: permitted syscalls and
//! interrupts, static and I/O memory mappings, kernel flags, memory type,
//! handle table ceiling and the minimum kernel version. On disk the set is a
//! 0x80-byte block of 28 tagged words followed by 16 reserved bytes.

use std::collections::BTreeSet;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ctr_core::error::KernelCapsError;
use ctr_core::Result;

use super::word::{
    CapabilityWord, KernelVersion, INTERRUPTS_PER_WORD, INTERRUPT_SENTINEL, MAX_SYSCALL_GROUP,
    PAGE_SHIFT, SYSCALLS_PER_WORD,
};

bitflags! {
    /// Kernel flags carried by the kernel flag word, excluding the memory
    /// type field. Unnamed bits are preserved as-is.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct KernelFlags: u32 {
        const ALLOW_DEBUG = 1 << 0;
        const FORCE_DEBUG = 1 << 1;
        const ALLOW_NON_ALPHANUM = 1 << 2;
        const SHARED_PAGE_WRITING = 1 << 3;
        const PRIVILEGE_PRIORITY = 1 << 4;
        const ALLOW_MAIN_ARGS = 1 << 5;
        const SHARED_DEVICE_MEMORY = 1 << 6;
        const RUNNABLE_ON_SLEEP = 1 << 7;
        const SPECIAL_MEMORY = 1 << 12;
        const ACCESS_CORE2 = 1 << 13;
    }
}

/// Memory region a program is loaded into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoryType {
    #[default]
    Application = 1,
    System = 2,
    Base = 3,
}

impl TryFrom<u8> for MemoryType {
    type Error = KernelCapsError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Application),
            2 => Ok(Self::System),
            3 => Ok(Self::Base),
            other => Err(KernelCapsError::UnknownMemoryType(u32::from(other))),
        }
    }
}

/// A memory mapping request or grant.
///
/// `end` is exclusive; an `end` of zero describes a single page at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryMapping {
    pub start: u32,
    pub end: u32,
    pub read_only: bool,
}

impl MemoryMapping {
    /// A mapping of `start..end`.
    pub const fn new(start: u32, end: u32, read_only: bool) -> Self {
        Self { start, end, read_only }
    }

    /// A single-page mapping at `start`.
    pub const fn page(start: u32, read_only: bool) -> Self {
        Self { start, end: 0, read_only }
    }

    /// Whether this mapping covers one page rather than a range.
    pub const fn is_single_page(&self) -> bool {
        self.end == 0
    }

    /// Whether this (requested) mapping is covered by `granted`.
    ///
    /// Two single-page mappings must agree exactly; otherwise both ends of
    /// this mapping must fall inside the granted range. The read-only flag
    /// always has to match.
    pub fn is_contained_in(&self, granted: &MemoryMapping) -> bool {
        if self.read_only != granted.read_only {
            return false;
        }

        if self.is_single_page() && granted.is_single_page() {
            return self.start == granted.start;
        }

        self.start >= granted.start
            && self.start < granted.end
            && self.end <= granted.end
            && self.end > granted.start
    }

    fn validate(&self) -> Result<()> {
        if !self.is_single_page() && self.end <= self.start {
            return Err(KernelCapsError::InvalidMappingRange {
                start: self.start,
                end: self.end,
            }
            .into());
        }
        Ok(())
    }
}

/// ARM11 kernel capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arm11KernelCaps {
    /// Permitted interrupts, in insertion order.
    interrupts: Vec<u8>,

    /// Permitted syscalls.
    syscalls: BTreeSet<u8>,

    memory_type: MemoryType,

    kernel_flags: KernelFlags,

    handle_table_size: Option<u32>,

    release_kernel_version: Option<KernelVersion>,

    static_mappings: Vec<MemoryMapping>,

    io_mappings: Vec<MemoryMapping>,
}

impl Arm11KernelCaps {
    /// Size of the serialized block.
    pub const SIZE: usize = 0x80;

    /// Number of capability word slots in the block.
    pub const SLOT_COUNT: usize = 28;

    /// Reserved bytes after the word slots.
    pub const RESERVED_SIZE: usize = 0x10;

    /// Most interrupts a set can hold.
    pub const MAX_INTERRUPTS: usize = 32;

    /// Highest syscall number that can be granted.
    pub const MAX_SYSCALL: u32 = 125;

    /// Largest handle table size the field can hold.
    pub const MAX_HANDLE_TABLE_SIZE: u32 = 0x7_FFFF;

    /// Create an empty kernel capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit a syscall. Syscall numbers above [`Self::MAX_SYSCALL`] are
    /// dropped.
    pub fn add_syscall(&mut self, syscall: u32) {
        if syscall > Self::MAX_SYSCALL {
            warn!("Dropping out-of-range syscall {:#x}", syscall);
            return;
        }
        self.syscalls.insert(syscall as u8);
    }

    /// Permit several syscalls.
    pub fn add_syscalls(&mut self, syscalls: impl IntoIterator<Item = u32>) {
        for syscall in syscalls {
            self.add_syscall(syscall);
        }
    }

    /// The permitted syscalls.
    pub fn syscalls(&self) -> &BTreeSet<u8> {
        &self.syscalls
    }

    /// Permit an interrupt.
    ///
    /// Interrupt numbers of 0x7F and above collide with the slot sentinel and
    /// are dropped. Adding an interrupt that is already present is a no-op.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the interrupt was added, dropped, or already present.
    /// * `Err` - If the set already holds the maximum number of interrupts.
    pub fn add_interrupt(&mut self, interrupt: u32) -> Result<()> {
        if interrupt >= u32::from(INTERRUPT_SENTINEL) {
            warn!("Dropping out-of-range interrupt {:#x}", interrupt);
            return Ok(());
        }

        let interrupt = interrupt as u8;
        if self.interrupts.contains(&interrupt) {
            return Ok(());
        }

        if self.interrupts.len() >= Self::MAX_INTERRUPTS {
            return Err(KernelCapsError::TooManyInterrupts {
                count: self.interrupts.len() + 1,
                max: Self::MAX_INTERRUPTS,
            }
            .into());
        }

        self.interrupts.push(interrupt);
        Ok(())
    }

    /// Permit several interrupts.
    pub fn add_interrupts(&mut self, interrupts: impl IntoIterator<Item = u32>) -> Result<()> {
        for interrupt in interrupts {
            self.add_interrupt(interrupt)?;
        }
        Ok(())
    }

    /// The permitted interrupts, in insertion order.
    pub fn interrupts(&self) -> &[u8] {
        &self.interrupts
    }

    /// Add a static memory mapping.
    pub fn add_static_mapping(&mut self, mapping: MemoryMapping) -> Result<()> {
        mapping.validate()?;
        self.static_mappings.push(mapping);
        Ok(())
    }

    /// Static mappings, in insertion order.
    pub fn static_mappings(&self) -> &[MemoryMapping] {
        &self.static_mappings
    }

    /// Add an I/O register mapping.
    pub fn add_io_mapping(&mut self, mapping: MemoryMapping) -> Result<()> {
        mapping.validate()?;
        self.io_mappings.push(mapping);
        Ok(())
    }

    /// I/O register mappings, in insertion order.
    pub fn io_mappings(&self) -> &[MemoryMapping] {
        &self.io_mappings
    }

    /// Replace the kernel flags.
    ///
    /// The memory type shares the flags word but is set separately with
    /// [`Self::set_memory_type`].
    ///
    /// # Arguments
    ///
    /// * `flags` - The complete flag set; previous flags are discarded.
    pub fn set_kernel_flags(&mut self, flags: KernelFlags) {
        self.kernel_flags = flags;
    }

    /// The kernel flags, without the memory type bits.
    pub fn kernel_flags(&self) -> KernelFlags {
        self.kernel_flags
    }

    /// Set the memory region the program is loaded into.
    pub fn set_memory_type(&mut self, memory_type: MemoryType) {
        self.memory_type = memory_type;
    }

    /// The memory type. Defaults to [`MemoryType::Application`].
    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    /// Set the handle table size ceiling.
    ///
    /// # Arguments
    ///
    /// * `size` - Number of handles, at most [`Self::MAX_HANDLE_TABLE_SIZE`].
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the size fits the 19-bit field.
    /// * `Err` - If the size is too large; the previous value is kept.
    pub fn set_handle_table_size(&mut self, size: u32) -> Result<()> {
        if size > Self::MAX_HANDLE_TABLE_SIZE {
            return Err(KernelCapsError::HandleTableSizeOutOfRange(size).into());
        }
        self.handle_table_size = Some(size);
        Ok(())
    }

    /// The handle table size, or `None` if no size word is present.
    ///
    /// Authorization treats an absent size as 0.
    pub fn handle_table_size(&self) -> Option<u32> {
        self.handle_table_size
    }

    /// Set the minimum kernel release the program expects.
    pub fn set_release_kernel_version(&mut self, version: KernelVersion) {
        self.release_kernel_version = Some(version);
    }

    /// The kernel release version, if one was set or decoded.
    pub fn release_kernel_version(&self) -> Option<KernelVersion> {
        self.release_kernel_version
    }

    /// Encode this set into capability words, without padding.
    ///
    /// The word order is fixed: syscalls, interrupts, I/O mappings, static
    /// mappings, kernel flags, handle table size, release kernel version.
    pub fn to_words(&self) -> Result<Vec<CapabilityWord>> {
        let mut words = Vec::with_capacity(Self::SLOT_COUNT);

        for group in 0..=MAX_SYSCALL_GROUP {
            let base = group * SYSCALLS_PER_WORD;
            let mask = self
                .syscalls
                .iter()
                .map(|syscall| u32::from(*syscall))
                .filter(|syscall| (base..base + SYSCALLS_PER_WORD).contains(syscall))
                .fold(0u32, |mask, syscall| mask | (1 << (syscall - base)));
            if mask != 0 {
                words.push(CapabilityWord::SystemCall { group: group as u8, mask });
            }
        }

        for chunk in self.interrupts.chunks(INTERRUPTS_PER_WORD) {
            words.push(CapabilityWord::interrupts(chunk));
        }

        for mapping in &self.io_mappings {
            push_mapping(&mut words, mapping, false)?;
        }
        for mapping in &self.static_mappings {
            push_mapping(&mut words, mapping, true)?;
        }

        words.push(CapabilityWord::KernelFlag {
            flags: self.kernel_flags.bits(),
            memory_type: self.memory_type as u8,
        });

        if let Some(size) = self.handle_table_size {
            words.push(CapabilityWord::HandleTableSize(size));
        }

        if let Some(version) = self.release_kernel_version {
            words.push(CapabilityWord::ReleaseKernelVersion(version));
        }

        if words.len() > Self::SLOT_COUNT {
            return Err(KernelCapsError::TooManyWords {
                count: words.len(),
                max: Self::SLOT_COUNT,
            }
            .into());
        }

        Ok(words)
    }

    /// Encode this set into the raw slot array, padded with unused words.
    pub fn to_raw_words(&self) -> Result<[u32; Self::SLOT_COUNT]> {
        let mut raw = [CapabilityWord::Unused.raw(); Self::SLOT_COUNT];
        for (slot, word) in raw.iter_mut().zip(self.to_words()?) {
            *slot = word.raw();
        }
        Ok(raw)
    }

    /// Decode a set from raw capability words.
    ///
    /// Decoding stops at the first unused word or after
    /// [`Self::SLOT_COUNT`] words.
    pub fn from_raw_words(raw: &[u32]) -> Result<Self> {
        let mut caps = Self::new();
        let limit = raw.len().min(Self::SLOT_COUNT);
        let mut index = 0;

        while index < limit {
            match CapabilityWord::decode(raw[index])? {
                CapabilityWord::Unused => break,
                CapabilityWord::Interrupt(slots) => {
                    for slot in slots.into_iter().filter(|slot| *slot != INTERRUPT_SENTINEL) {
                        caps.add_interrupt(u32::from(slot))?;
                    }
                }
                CapabilityWord::SystemCall { group, mask } => {
                    let base = u32::from(group) * SYSCALLS_PER_WORD;
                    for bit in (0..SYSCALLS_PER_WORD).filter(|bit| mask & (1 << bit) != 0) {
                        caps.add_syscall(base + bit);
                    }
                }
                CapabilityWord::ReleaseKernelVersion(version) => {
                    caps.release_kernel_version = Some(version);
                }
                CapabilityWord::HandleTableSize(size) => {
                    caps.handle_table_size = Some(size);
                }
                CapabilityWord::KernelFlag { flags, memory_type } => {
                    caps.kernel_flags = KernelFlags::from_bits_retain(flags);
                    caps.memory_type = MemoryType::try_from(memory_type)?;
                }
                CapabilityWord::MappingRange { page, flag: read_only } => {
                    let end_word = if index + 1 < limit {
                        CapabilityWord::decode(raw[index + 1]).ok()
                    } else {
                        None
                    };
                    let (end_page, is_static) = match end_word {
                        Some(CapabilityWord::MappingRange { page, flag }) => (page, flag),
                        _ => {
                            return Err(KernelCapsError::UnclosedMappedRange(raw[index]).into());
                        }
                    };

                    let mapping = MemoryMapping::new(
                        page << PAGE_SHIFT,
                        end_page << PAGE_SHIFT,
                        read_only,
                    );
                    if is_static {
                        caps.static_mappings.push(mapping);
                    } else {
                        caps.io_mappings.push(mapping);
                    }
                    index += 1;
                }
                CapabilityWord::MappingPage { page } => {
                    caps.io_mappings.push(MemoryMapping::page(page << PAGE_SHIFT, false));
                }
            }
            index += 1;
        }

        debug!(
            "Decoded kernel capabilities: {} syscalls, {} interrupts, {} static and {} I/O mappings",
            caps.syscalls.len(),
            caps.interrupts.len(),
            caps.static_mappings.len(),
            caps.io_mappings.len()
        );

        Ok(caps)
    }

    /// Serialize this set into its 0x80-byte block.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        for word in self.to_raw_words()? {
            buf.put_u32_le(word);
        }
        buf.put_bytes(0, Self::RESERVED_SIZE);
        Ok(buf.freeze())
    }

    /// Deserialize a set from its block. Extra trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KernelCapsError::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            }
            .into());
        }

        let mut cursor = &data[..Self::SLOT_COUNT * 4];
        let mut raw = [0u32; Self::SLOT_COUNT];
        for slot in raw.iter_mut() {
            *slot = cursor.get_u32_le();
        }

        Self::from_raw_words(&raw)
    }
}

/// Encode one mapping. I/O pages that are not read-only use the compact
/// single-page word; everything else is a range pair whose end word marks
/// whether the mapping is static.
fn push_mapping(
    words: &mut Vec<CapabilityWord>,
    mapping: &MemoryMapping,
    is_static: bool,
) -> Result<()> {
    for address in [mapping.start, mapping.end] {
        if address & ((1 << PAGE_SHIFT) - 1) != 0 {
            return Err(KernelCapsError::UnalignedMapping(address).into());
        }
    }

    let start_page = mapping.start >> PAGE_SHIFT;
    if !is_static && mapping.is_single_page() && !mapping.read_only {
        words.push(CapabilityWord::MappingPage { page: start_page });
        return Ok(());
    }

    words.push(CapabilityWord::MappingRange {
        page: start_page,
        flag: mapping.read_only,
    });
    words.push(CapabilityWord::MappingRange {
        page: mapping.end >> PAGE_SHIFT,
        flag: is_static,
    });
    Ok(())
}

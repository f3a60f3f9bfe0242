//! Error types for the CTR access-control tooling.
//!
//! Structural failures (truncated blocks, unknown capability tags, unclosed
//! mapping pairs, values that do not fit their field) are reported through
//! this hierarchy. Authorization outcomes are not errors; they are returned
//! as plain validation reports by the access descriptor.

use thiserror::Error;

/// Root error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Kernel capability error: {0}")]
    KernelCaps(#[from] KernelCapsError),

    #[error("Local capability error: {0}")]
    LocalCaps(#[from] LocalCapsError),

    #[error("ARM9 access control error: {0}")]
    Arm9(#[from] Arm9Error),

    #[error("Access descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Errors raised while encoding or decoding ARM11 kernel capabilities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelCapsError {
    #[error("Kernel capability block too small: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unrecognised capability word {0:#010x}")]
    UnknownTag(u32),

    #[error("Unclosed mapped range starting with word {0:#010x}")]
    UnclosedMappedRange(u32),

    #[error("Too many capability words: {count} (maximum {max})")]
    TooManyWords { count: usize, max: usize },

    #[error("Too many interrupts: {count} (maximum {max})")]
    TooManyInterrupts { count: usize, max: usize },

    #[error("Mapping address {0:#x} is not page aligned")]
    UnalignedMapping(u32),

    #[error("Mapping range {start:#x}-{end:#x} is empty or inverted")]
    InvalidMappingRange { start: u32, end: u32 },

    #[error("Handle table size {0:#x} does not fit in its field")]
    HandleTableSizeOutOfRange(u32),

    #[error("Unknown memory type {0}")]
    UnknownMemoryType(u32),
}

/// Errors raised while encoding or decoding ARM11 local capabilities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocalCapsError {
    #[error("Local capability block too small: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Too many services: maximum is {0}")]
    TooManyServices(usize),

    #[error("Invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("FS right bit {0} is out of range")]
    FsRightOutOfRange(u32),

    #[error("Save data id {0:#x} does not fit in 20 bits")]
    SaveIdOutOfRange(u32),

    #[error("Too many {kind} save ids: {count} (maximum {max})")]
    TooManySaveIds {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    #[error("Thread priority {0} is out of range")]
    ThreadPriorityOutOfRange(i32),

    #[error("{field} value {value} does not fit in its field")]
    FieldOutOfRange { field: &'static str, value: u32 },
}

/// Errors raised by the ARM9 access control block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Arm9Error {
    #[error("ARM9 access control block too small: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("ARM9 right bit {0} is out of range")]
    RightOutOfRange(u32),
}

/// Errors raised while building, signing or parsing an access descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Access descriptor too small: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Key modulus has {0} bytes, expected an RSA-2048 modulus")]
    InvalidPublicKey(usize),

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Errors raised while turning declarative settings into capability sets.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Unknown name {name:?} for {field}")]
    UnknownName { field: &'static str, name: String },
}

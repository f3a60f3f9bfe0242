//! Capability checking.
//!
//! This module validates requested capabilities against a grant.

mod engine;
mod report;

pub use engine::{
    cpu_speed_allowed, ideal_processor_allowed, is_mask_subset, mappings_contained,
    program_id_matches, thread_priority_allowed, ExtendedHeaderChecker, RequestedCapabilities,
    THREAD_PRIORITY_CEILING,
};
pub use report::{ReportField, ValidationReport};

//! Extended header checking engine.
//!
//! This module compares the capabilities a program requests against the
//! capabilities its access descriptor grants. Every field is checked on every
//! run; the result is a fresh [`ValidationReport`].

use tracing::debug;

use crate::model::{Arm11KernelCaps, Arm11LocalCaps, Arm9AccessControl, CpuSpeed, MemoryMapping};

use super::report::{ReportField, ValidationReport};

/// Thread priorities at or above this value are never accepted.
pub const THREAD_PRIORITY_CEILING: i8 = 127;

const PROGRAM_ID_NIBBLES: u32 = 16;
const WILDCARD_NIBBLE: u64 = 0xF;

/// Source of the capabilities a program asks for.
pub trait RequestedCapabilities {
    fn local_caps(&self) -> &Arm11LocalCaps;

    fn kernel_caps(&self) -> &Arm11KernelCaps;

    fn arm9_access_control(&self) -> &Arm9AccessControl;
}

/// Extended header checker.
///
/// Holds the granted capability sets and checks requests against them.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedHeaderChecker<'a> {
    local: &'a Arm11LocalCaps,
    kernel: &'a Arm11KernelCaps,
    arm9: &'a Arm9AccessControl,
}

impl<'a> ExtendedHeaderChecker<'a> {
    /// Create a checker over the granted sets.
    ///
    /// # Arguments
    ///
    /// * `local` - The granted local capabilities.
    /// * `kernel` - The granted kernel capabilities.
    /// * `arm9` - The granted ARM9 access control.
    pub fn new(
        local: &'a Arm11LocalCaps,
        kernel: &'a Arm11KernelCaps,
        arm9: &'a Arm9AccessControl,
    ) -> Self {
        Self { local, kernel, arm9 }
    }

    /// Check every requested field against the grant.
    ///
    /// # Arguments
    ///
    /// * `requested` - The program's own capability sets.
    ///
    /// # Returns
    ///
    /// A report with one verdict per field. No check is skipped when an
    /// earlier one fails.
    pub fn check<R>(&self, requested: &R) -> ValidationReport
    where
        R: RequestedCapabilities + ?Sized,
    {
        let req_local = requested.local_caps();
        let req_kernel = requested.kernel_caps();
        let req_arm9 = requested.arm9_access_control();
        let granted_local = self.local;
        let granted_kernel = self.kernel;
        let granted_arm9 = self.arm9;

        let [req_save1, req_save2] = req_local.system_save_ids();
        let [granted_save1, granted_save2] = granted_local.system_save_ids();

        let report = ValidationReport {
            program_id: verdict(
                ReportField::ProgramId,
                program_id_matches(req_local.program_id(), granted_local.program_id()),
            ),
            firm_title_id: verdict(
                ReportField::FirmTitleId,
                req_local.firm_title_id_low() == granted_local.firm_title_id_low(),
            ),
            l2_cache: verdict(
                ReportField::L2Cache,
                !req_local.l2_cache_enabled() || granted_local.l2_cache_enabled(),
            ),
            cpu_speed: verdict(
                ReportField::CpuSpeed,
                cpu_speed_allowed(req_local.cpu_speed(), granted_local.cpu_speed()),
            ),
            system_mode: verdict(
                ReportField::SystemMode,
                req_local.system_mode() == granted_local.system_mode(),
            ),
            system_mode_ext: verdict(
                ReportField::SystemModeExt,
                req_local.system_mode_ext() == granted_local.system_mode_ext(),
            ),
            ideal_processor: verdict(
                ReportField::IdealProcessor,
                ideal_processor_allowed(req_local.ideal_processor(), granted_local.ideal_processor()),
            ),
            affinity_mask: verdict(
                ReportField::AffinityMask,
                is_mask_subset(
                    u64::from(req_local.affinity_mask()),
                    u64::from(granted_local.affinity_mask()),
                ),
            ),
            thread_priority: verdict(
                ReportField::ThreadPriority,
                thread_priority_allowed(req_local.thread_priority(), granted_local.thread_priority()),
            ),
            system_save_id1: verdict(
                ReportField::SystemSaveId1,
                is_mask_subset(u64::from(req_save1), u64::from(granted_save1)),
            ),
            system_save_id2: verdict(
                ReportField::SystemSaveId2,
                is_mask_subset(u64::from(req_save2), u64::from(granted_save2)),
            ),
            fs_rights: verdict(
                ReportField::FsRights,
                req_local
                    .fs_rights_whitelist()
                    .iter()
                    .all(|bit| granted_local.has_fs_right(*bit)),
            ),
            services: verdict(
                ReportField::Services,
                req_local
                    .services()
                    .iter()
                    .all(|name| granted_local.has_service(name)),
            ),
            static_mappings: verdict(
                ReportField::StaticMappings,
                mappings_contained(req_kernel.static_mappings(), granted_kernel.static_mappings()),
            ),
            io_mappings: verdict(
                ReportField::IoMappings,
                mappings_contained(req_kernel.io_mappings(), granted_kernel.io_mappings()),
            ),
            interrupts: verdict(
                ReportField::Interrupts,
                req_kernel
                    .interrupts()
                    .iter()
                    .all(|interrupt| granted_kernel.interrupts().contains(interrupt)),
            ),
            syscalls: verdict(
                ReportField::Syscalls,
                req_kernel.syscalls().is_subset(granted_kernel.syscalls()),
            ),
            handle_table_size: verdict(
                ReportField::HandleTableSize,
                req_kernel.handle_table_size().unwrap_or_default()
                    <= granted_kernel.handle_table_size().unwrap_or_default(),
            ),
            memory_type: verdict(
                ReportField::MemoryType,
                req_kernel.memory_type() == granted_kernel.memory_type(),
            ),
            kernel_flags: verdict(
                ReportField::KernelFlags,
                granted_kernel.kernel_flags().contains(req_kernel.kernel_flags()),
            ),
            arm9_rights: verdict(
                ReportField::Arm9Rights,
                req_arm9.rights().iter().all(|bit| granted_arm9.has_right(*bit)),
            ),
            arm9_desc_version: verdict(
                ReportField::Arm9DescVersion,
                req_arm9.desc_version() == granted_arm9.desc_version(),
            ),
        };

        debug!(
            "Checked extended header for program {:#018x}: valid={}",
            req_local.program_id(),
            report.is_valid()
        );

        report
    }
}

fn verdict(field: ReportField, ok: bool) -> bool {
    if !ok {
        debug!("Capability check failed for {}", field);
    }
    ok
}

/// Compare two program ids nibble by nibble. A granted nibble of 0xF matches
/// anything.
pub fn program_id_matches(requested: u64, granted: u64) -> bool {
    (0..PROGRAM_ID_NIBBLES).all(|index| {
        let shift = index * 4;
        let granted_nibble = (granted >> shift) & WILDCARD_NIBBLE;
        granted_nibble == WILDCARD_NIBBLE
            || granted_nibble == (requested >> shift) & WILDCARD_NIBBLE
    })
}

pub fn cpu_speed_allowed(requested: CpuSpeed, granted: CpuSpeed) -> bool {
    requested <= granted
}

/// `requested` is a core index, `granted` a bitmap of allowed cores.
pub fn ideal_processor_allowed(requested: u8, granted: u8) -> bool {
    requested < 8 && (1u8 << requested) & granted != 0
}

pub fn thread_priority_allowed(requested: i8, granted: i8) -> bool {
    requested >= granted && requested < THREAD_PRIORITY_CEILING
}

pub fn is_mask_subset(requested: u64, granted: u64) -> bool {
    requested & granted == requested
}

/// Whether every requested mapping is contained in some granted mapping.
pub fn mappings_contained(requested: &[MemoryMapping], granted: &[MemoryMapping]) -> bool {
    requested
        .iter()
        .all(|mapping| granted.iter().any(|grant| mapping.is_contained_in(grant)))
}

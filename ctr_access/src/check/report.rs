//! Validation report.
//!
//! A report holds one verdict per checked field. Reports are plain values:
//! every validation run builds a new one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A field checked by the access descriptor, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportField {
    ProgramId,
    FirmTitleId,
    L2Cache,
    CpuSpeed,
    SystemMode,
    SystemModeExt,
    IdealProcessor,
    AffinityMask,
    ThreadPriority,
    SystemSaveId1,
    SystemSaveId2,
    FsRights,
    Services,
    StaticMappings,
    IoMappings,
    Interrupts,
    Syscalls,
    HandleTableSize,
    MemoryType,
    KernelFlags,
    Arm9Rights,
    Arm9DescVersion,
}

impl ReportField {
    pub const ALL: [ReportField; 22] = [
        Self::ProgramId,
        Self::FirmTitleId,
        Self::L2Cache,
        Self::CpuSpeed,
        Self::SystemMode,
        Self::SystemModeExt,
        Self::IdealProcessor,
        Self::AffinityMask,
        Self::ThreadPriority,
        Self::SystemSaveId1,
        Self::SystemSaveId2,
        Self::FsRights,
        Self::Services,
        Self::StaticMappings,
        Self::IoMappings,
        Self::Interrupts,
        Self::Syscalls,
        Self::HandleTableSize,
        Self::MemoryType,
        Self::KernelFlags,
        Self::Arm9Rights,
        Self::Arm9DescVersion,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProgramId => "program_id",
            Self::FirmTitleId => "firm_title_id",
            Self::L2Cache => "l2_cache",
            Self::CpuSpeed => "cpu_speed",
            Self::SystemMode => "system_mode",
            Self::SystemModeExt => "system_mode_ext",
            Self::IdealProcessor => "ideal_processor",
            Self::AffinityMask => "affinity_mask",
            Self::ThreadPriority => "thread_priority",
            Self::SystemSaveId1 => "system_save_id1",
            Self::SystemSaveId2 => "system_save_id2",
            Self::FsRights => "fs_rights",
            Self::Services => "services",
            Self::StaticMappings => "static_mappings",
            Self::IoMappings => "io_mappings",
            Self::Interrupts => "interrupts",
            Self::Syscalls => "syscalls",
            Self::HandleTableSize => "handle_table_size",
            Self::MemoryType => "memory_type",
            Self::KernelFlags => "kernel_flags",
            Self::Arm9Rights => "arm9_rights",
            Self::Arm9DescVersion => "arm9_desc_version",
        }
    }
}

impl fmt::Display for ReportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a requested capability set against a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub(crate) program_id: bool,
    pub(crate) firm_title_id: bool,
    pub(crate) l2_cache: bool,
    pub(crate) cpu_speed: bool,
    pub(crate) system_mode: bool,
    pub(crate) system_mode_ext: bool,
    pub(crate) ideal_processor: bool,
    pub(crate) affinity_mask: bool,
    pub(crate) thread_priority: bool,
    pub(crate) system_save_id1: bool,
    pub(crate) system_save_id2: bool,
    pub(crate) fs_rights: bool,
    pub(crate) services: bool,
    pub(crate) static_mappings: bool,
    pub(crate) io_mappings: bool,
    pub(crate) interrupts: bool,
    pub(crate) syscalls: bool,
    pub(crate) handle_table_size: bool,
    pub(crate) memory_type: bool,
    pub(crate) kernel_flags: bool,
    pub(crate) arm9_rights: bool,
    pub(crate) arm9_desc_version: bool,
}

impl ValidationReport {
    /// The verdict for one field.
    pub fn field(&self, field: ReportField) -> bool {
        match field {
            ReportField::ProgramId => self.program_id,
            ReportField::FirmTitleId => self.firm_title_id,
            ReportField::L2Cache => self.l2_cache,
            ReportField::CpuSpeed => self.cpu_speed,
            ReportField::SystemMode => self.system_mode,
            ReportField::SystemModeExt => self.system_mode_ext,
            ReportField::IdealProcessor => self.ideal_processor,
            ReportField::AffinityMask => self.affinity_mask,
            ReportField::ThreadPriority => self.thread_priority,
            ReportField::SystemSaveId1 => self.system_save_id1,
            ReportField::SystemSaveId2 => self.system_save_id2,
            ReportField::FsRights => self.fs_rights,
            ReportField::Services => self.services,
            ReportField::StaticMappings => self.static_mappings,
            ReportField::IoMappings => self.io_mappings,
            ReportField::Interrupts => self.interrupts,
            ReportField::Syscalls => self.syscalls,
            ReportField::HandleTableSize => self.handle_table_size,
            ReportField::MemoryType => self.memory_type,
            ReportField::KernelFlags => self.kernel_flags,
            ReportField::Arm9Rights => self.arm9_rights,
            ReportField::Arm9DescVersion => self.arm9_desc_version,
        }
    }

    /// Whether every field passed.
    pub fn is_valid(&self) -> bool {
        ReportField::ALL.iter().all(|field| self.field(*field))
    }

    /// Every failed field, in check order.
    pub fn failures(&self) -> Vec<ReportField> {
        ReportField::ALL
            .iter()
            .copied()
            .filter(|field| !self.field(*field))
            .collect()
    }

    pub fn program_id(&self) -> bool {
        self.program_id
    }

    pub fn firm_title_id(&self) -> bool {
        self.firm_title_id
    }

    pub fn l2_cache(&self) -> bool {
        self.l2_cache
    }

    pub fn cpu_speed(&self) -> bool {
        self.cpu_speed
    }

    pub fn system_mode(&self) -> bool {
        self.system_mode
    }

    pub fn system_mode_ext(&self) -> bool {
        self.system_mode_ext
    }

    pub fn ideal_processor(&self) -> bool {
        self.ideal_processor
    }

    pub fn affinity_mask(&self) -> bool {
        self.affinity_mask
    }

    pub fn thread_priority(&self) -> bool {
        self.thread_priority
    }

    pub fn system_save_id1(&self) -> bool {
        self.system_save_id1
    }

    pub fn system_save_id2(&self) -> bool {
        self.system_save_id2
    }

    pub fn fs_rights(&self) -> bool {
        self.fs_rights
    }

    pub fn services(&self) -> bool {
        self.services
    }

    pub fn static_mappings(&self) -> bool {
        self.static_mappings
    }

    pub fn io_mappings(&self) -> bool {
        self.io_mappings
    }

    pub fn interrupts(&self) -> bool {
        self.interrupts
    }

    pub fn syscalls(&self) -> bool {
        self.syscalls
    }

    pub fn handle_table_size(&self) -> bool {
        self.handle_table_size
    }

    pub fn memory_type(&self) -> bool {
        self.memory_type
    }

    pub fn kernel_flags(&self) -> bool {
        self.kernel_flags
    }

    pub fn arm9_rights(&self) -> bool {
        self.arm9_rights
    }

    pub fn arm9_desc_version(&self) -> bool {
        self.arm9_desc_version
    }
}

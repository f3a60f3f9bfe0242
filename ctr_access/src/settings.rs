//! Declarative access control settings.
//!
//! This module turns the access control section of a build description into
//! capability sets. The section is plain TOML; reading it from disk is left
//! to the caller.
//!
//! ```toml
//! program_id = "0x0004000000123400"
//! cpu_speed = "804mhz"
//! thread_priority = 48
//! services = ["fs:USER", "APT:U"]
//! fs_rights = ["debug", "seed_db"]
//! syscalls = [1, 2, 0x24]
//! kernel_flags = ["allow_debug"]
//! io_mappings = ["0x1EC00000-0x1EC40000", "0x1FF80000:r"]
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use ctr_core::error::SettingsError;
use ctr_core::Result;

use crate::aci::AccessControlInfo;
use crate::model::{
    Arm11KernelCaps, Arm11LocalCaps, Arm9AccessControl, Arm9Right, CpuSpeed, FsRight,
    KernelFlags, KernelVersion, MemoryMapping, MemoryType, ResourceLimitCategory, SystemMode,
    SystemModeExt,
};

/// Access control settings of one program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessControlSettings {
    /// Program id as a hex string, so ids above `i64::MAX` can be written.
    pub program_id: Option<String>,
    pub firm_title_id_low: u32,
    pub l2_cache: bool,
    pub cpu_speed: Option<String>,
    pub system_mode: Option<String>,
    pub system_mode_ext: Option<String>,
    pub ideal_processor: u8,
    pub affinity_mask: u8,
    pub thread_priority: i32,
    pub max_cpu_time: u16,
    pub resource_limit_category: Option<String>,

    pub extdata_id: Option<String>,
    pub other_user_save_ids: Vec<u32>,
    pub use_other_variation_save_data: bool,
    /// When non-empty, selects the extended save data encoding.
    pub accessible_save_ids: Vec<u32>,
    pub system_save_ids: Vec<u32>,

    pub fs_rights: Vec<String>,
    pub raw_fs_rights: Vec<u32>,
    pub disable_romfs: bool,
    pub services: Vec<String>,

    pub memory_type: Option<String>,
    pub kernel_flags: Vec<String>,
    pub handle_table_size: Option<u32>,
    /// `"major.minor"`.
    pub release_kernel_version: Option<String>,
    pub syscalls: Vec<u32>,
    pub interrupts: Vec<u32>,
    pub static_mappings: Vec<String>,
    pub io_mappings: Vec<String>,

    pub arm9_rights: Vec<String>,
    pub raw_arm9_rights: Vec<u32>,
    pub desc_version: Option<u8>,
}

impl AccessControlSettings {
    /// Parse settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(SettingsError::from)?;
        Ok(settings)
    }

    /// Build the local capability set.
    pub fn build_local_caps(&self) -> Result<Arm11LocalCaps> {
        let mut caps = Arm11LocalCaps::new();

        if let Some(program_id) = &self.program_id {
            caps.set_program_id(parse_u64("program_id", program_id)?);
        }
        caps.set_firm_title_id_low(self.firm_title_id_low);
        caps.set_l2_cache_enabled(self.l2_cache);
        if let Some(speed) = &self.cpu_speed {
            caps.set_cpu_speed(parse_cpu_speed(speed)?);
        }
        if let Some(mode) = &self.system_mode {
            caps.set_system_mode(parse_system_mode(mode)?);
        }
        if let Some(mode) = &self.system_mode_ext {
            caps.set_system_mode_ext(parse_system_mode_ext(mode)?);
        }
        caps.set_ideal_processor(self.ideal_processor)?;
        caps.set_affinity_mask(self.affinity_mask)?;
        caps.set_thread_priority(self.thread_priority)?;
        caps.set_max_cpu_time(self.max_cpu_time);
        if let Some(category) = &self.resource_limit_category {
            caps.set_resource_limit_category(parse_resource_limit_category(category)?);
        }

        if self.accessible_save_ids.is_empty() {
            if let Some(extdata_id) = &self.extdata_id {
                caps.set_extdata_id(parse_u64("extdata_id", extdata_id)?);
            }
            caps.set_other_user_save_ids(
                &self.other_user_save_ids,
                self.use_other_variation_save_data,
            )?;
        } else {
            caps.set_accessible_save_ids(&self.accessible_save_ids)?;
        }

        match self.system_save_ids.as_slice() {
            [] => {}
            [first] => caps.set_system_save_ids([*first, 0]),
            [first, second] => caps.set_system_save_ids([*first, *second]),
            _ => {
                return Err(SettingsError::InvalidValue {
                    field: "system_save_ids",
                    value: format!("{:?}", self.system_save_ids),
                }
                .into())
            }
        }

        for name in &self.fs_rights {
            let right = FsRight::from_name(name).ok_or_else(|| SettingsError::UnknownName {
                field: "fs_rights",
                name: name.clone(),
            })?;
            caps.add_fs_right(right);
        }
        for bit in &self.raw_fs_rights {
            caps.add_raw_fs_right(*bit)?;
        }
        caps.set_can_mount_romfs(!self.disable_romfs);

        for service in &self.services {
            caps.add_service(service)?;
        }

        debug!(
            "Built local capabilities for program {:#018x} with {} services",
            caps.program_id(),
            caps.services().len()
        );
        Ok(caps)
    }

    /// Build the kernel capability set.
    pub fn build_kernel_caps(&self) -> Result<Arm11KernelCaps> {
        let mut caps = Arm11KernelCaps::new();

        if let Some(memory_type) = &self.memory_type {
            caps.set_memory_type(parse_memory_type(memory_type)?);
        }

        let mut flags = KernelFlags::empty();
        for name in &self.kernel_flags {
            let flag = KernelFlags::from_name(&name.to_ascii_uppercase()).ok_or_else(|| {
                SettingsError::UnknownName {
                    field: "kernel_flags",
                    name: name.clone(),
                }
            })?;
            flags |= flag;
        }
        caps.set_kernel_flags(flags);

        if let Some(size) = self.handle_table_size {
            caps.set_handle_table_size(size)?;
        }
        if let Some(version) = &self.release_kernel_version {
            caps.set_release_kernel_version(parse_kernel_version(version)?);
        }

        caps.add_syscalls(self.syscalls.iter().copied());
        caps.add_interrupts(self.interrupts.iter().copied())?;

        for mapping in &self.static_mappings {
            caps.add_static_mapping(parse_mapping("static_mappings", mapping)?)?;
        }
        for mapping in &self.io_mappings {
            caps.add_io_mapping(parse_mapping("io_mappings", mapping)?)?;
        }

        Ok(caps)
    }

    /// Build the ARM9 access control block.
    pub fn build_arm9(&self) -> Result<Arm9AccessControl> {
        let mut control = Arm9AccessControl::new();
        for name in &self.arm9_rights {
            let right = Arm9Right::from_name(name).ok_or_else(|| SettingsError::UnknownName {
                field: "arm9_rights",
                name: name.clone(),
            })?;
            control.add_right(right);
        }
        for bit in &self.raw_arm9_rights {
            control.add_raw_right(*bit)?;
        }
        if let Some(version) = self.desc_version {
            control.set_desc_version(version);
        }
        Ok(control)
    }

    /// Build the complete access control info block.
    pub fn build_access_control_info(&self) -> Result<AccessControlInfo> {
        Ok(AccessControlInfo::new(
            self.build_local_caps()?,
            self.build_kernel_caps()?,
            self.build_arm9()?,
        ))
    }
}

fn invalid(field: &'static str, value: &str) -> SettingsError {
    SettingsError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn unknown(field: &'static str, name: &str) -> SettingsError {
    SettingsError::UnknownName {
        field,
        name: name.to_string(),
    }
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, SettingsError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.replace('_', "").parse(),
    };
    parsed.map_err(|_| invalid(field, value))
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, SettingsError> {
    let parsed = parse_u64(field, value)?;
    u32::try_from(parsed).map_err(|_| invalid(field, value))
}

fn parse_cpu_speed(value: &str) -> Result<CpuSpeed, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "268mhz" | "268" => Ok(CpuSpeed::Mhz268),
        "804mhz" | "804" => Ok(CpuSpeed::Mhz804),
        _ => Err(unknown("cpu_speed", value)),
    }
}

fn parse_system_mode(value: &str) -> Result<SystemMode, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "prod" => Ok(SystemMode::Prod),
        "dev1" => Ok(SystemMode::Dev1),
        "dev2" => Ok(SystemMode::Dev2),
        "dev3" => Ok(SystemMode::Dev3),
        "dev4" => Ok(SystemMode::Dev4),
        _ => Err(unknown("system_mode", value)),
    }
}

fn parse_system_mode_ext(value: &str) -> Result<SystemModeExt, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "legacy" => Ok(SystemModeExt::Legacy),
        "prod" => Ok(SystemModeExt::Prod),
        "dev1" => Ok(SystemModeExt::Dev1),
        "dev2" => Ok(SystemModeExt::Dev2),
        _ => Err(unknown("system_mode_ext", value)),
    }
}

fn parse_resource_limit_category(value: &str) -> Result<ResourceLimitCategory, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "application" => Ok(ResourceLimitCategory::Application),
        "sys_applet" => Ok(ResourceLimitCategory::SysApplet),
        "lib_applet" => Ok(ResourceLimitCategory::LibApplet),
        "other" => Ok(ResourceLimitCategory::Other),
        _ => Err(unknown("resource_limit_category", value)),
    }
}

fn parse_memory_type(value: &str) -> Result<MemoryType, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "application" => Ok(MemoryType::Application),
        "system" => Ok(MemoryType::System),
        "base" => Ok(MemoryType::Base),
        _ => Err(unknown("memory_type", value)),
    }
}

fn parse_kernel_version(value: &str) -> Result<KernelVersion, SettingsError> {
    let (major, minor) = value
        .split_once('.')
        .ok_or_else(|| invalid("release_kernel_version", value))?;
    let major = major.trim().parse().map_err(|_| invalid("release_kernel_version", value))?;
    let minor = minor.trim().parse().map_err(|_| invalid("release_kernel_version", value))?;
    Ok(KernelVersion::new(major, minor))
}

/// Parse `START[-END][:r]`. Without an end the mapping is a single page.
fn parse_mapping(field: &'static str, value: &str) -> Result<MemoryMapping, SettingsError> {
    let (range, read_only) = match value.rsplit_once(':') {
        Some((range, "r")) => (range, true),
        Some(_) => return Err(invalid(field, value)),
        None => (value, false),
    };

    let mapping = match range.split_once('-') {
        Some((start, end)) => {
            MemoryMapping::new(parse_u32(field, start)?, parse_u32(field, end)?, read_only)
        }
        None => MemoryMapping::page(parse_u32(field, range)?, read_only),
    };
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_core::Error;

    const SAMPLE: &str = r#"
        program_id = "0x0004000000123400"
        firm_title_id_low = 2
        l2_cache = true
        cpu_speed = "804MHz"
        system_mode = "dev1"
        system_mode_ext = "prod"
        ideal_processor = 1
        affinity_mask = 2
        thread_priority = 48
        max_cpu_time = 25
        resource_limit_category = "sys_applet"
        extdata_id = "0x1234"
        other_user_save_ids = [0x11, 0x22]
        use_other_variation_save_data = true
        system_save_ids = [0x10000]
        fs_rights = ["debug", "seed_db"]
        raw_fs_rights = [40]
        disable_romfs = true
        services = ["fs:USER", "APT:U"]
        memory_type = "system"
        kernel_flags = ["allow_debug", "RUNNABLE_ON_SLEEP"]
        handle_table_size = 512
        release_kernel_version = "2.35"
        syscalls = [1, 2, 0x24]
        interrupts = [0x20, 0x21]
        static_mappings = ["0x1FF00000-0x1FF80000:r"]
        io_mappings = ["0x1EC00000-0x1EC40000", "0x1FF80000:r", "0x1FF81000"]
        arm9_rights = ["sd_application"]
        raw_arm9_rights = [100]
        desc_version = 2
    "#;

    #[test]
    fn test_build_local_caps() {
        let settings = AccessControlSettings::from_toml_str(SAMPLE).unwrap();
        let caps = settings.build_local_caps().unwrap();

        assert_eq!(caps.program_id(), 0x0004_0000_0012_3400);
        assert_eq!(caps.cpu_speed(), CpuSpeed::Mhz804);
        assert_eq!(caps.system_mode(), SystemMode::Dev1);
        assert_eq!(caps.thread_priority(), 48);
        assert_eq!(caps.max_cpu_time(), 25);
        assert_eq!(caps.extdata_id(), Some(0x1234));
        assert_eq!(caps.other_user_save_ids(), &[0x11, 0x22]);
        assert!(caps.use_other_variation_save_data());
        assert_eq!(caps.system_save_ids(), [0x10000, 0]);
        assert_eq!(caps.fs_rights_whitelist(), vec![3, 21, 40]);
        assert!(!caps.can_mount_romfs());
        assert_eq!(caps.services(), &["fs:USER".to_string(), "APT:U".to_string()]);
        assert_eq!(caps.resource_limit_category(), ResourceLimitCategory::SysApplet);
    }

    #[test]
    fn test_build_kernel_caps() {
        let settings = AccessControlSettings::from_toml_str(SAMPLE).unwrap();
        let caps = settings.build_kernel_caps().unwrap();

        assert_eq!(caps.memory_type(), MemoryType::System);
        assert_eq!(
            caps.kernel_flags(),
            KernelFlags::ALLOW_DEBUG | KernelFlags::RUNNABLE_ON_SLEEP
        );
        assert_eq!(caps.handle_table_size(), Some(512));
        assert_eq!(caps.release_kernel_version(), Some(KernelVersion::new(2, 35)));
        assert_eq!(caps.syscalls().iter().copied().collect::<Vec<_>>(), vec![1, 2, 0x24]);
        assert_eq!(caps.interrupts(), &[0x20, 0x21]);
        assert_eq!(
            caps.static_mappings(),
            &[MemoryMapping::new(0x1FF0_0000, 0x1FF8_0000, true)]
        );
        assert_eq!(
            caps.io_mappings(),
            &[
                MemoryMapping::new(0x1EC0_0000, 0x1EC4_0000, false),
                MemoryMapping::page(0x1FF8_0000, true),
                MemoryMapping::page(0x1FF8_1000, false),
            ]
        );
    }

    #[test]
    fn test_build_access_control_info() {
        let settings = AccessControlSettings::from_toml_str(SAMPLE).unwrap();
        let aci = settings.build_access_control_info().unwrap();
        let bytes = aci.to_bytes().unwrap();
        assert_eq!(AccessControlInfo::from_bytes(&bytes).unwrap(), aci);

        let arm9 = settings.build_arm9().unwrap();
        assert_eq!(arm9.rights(), vec![8, 100]);
    }

    #[test]
    fn test_extended_save_data_from_settings() {
        let settings = AccessControlSettings::from_toml_str(
            "accessible_save_ids = [0x12345, 0xABC]\nother_user_save_ids = [1]",
        )
        .unwrap();
        let caps = settings.build_local_caps().unwrap();
        assert!(caps.uses_extended_savedata_access());
        assert_eq!(caps.accessible_save_ids(), &[0x12345, 0xABC]);
    }

    #[test]
    fn test_wildcard_program_id() {
        let settings =
            AccessControlSettings::from_toml_str("program_id = \"0xFFFFFFFFFFFFFFFF\"").unwrap();
        assert_eq!(settings.build_local_caps().unwrap().program_id(), u64::MAX);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let settings = AccessControlSettings::from_toml_str("fs_rights = [\"teleport\"]").unwrap();
        assert!(matches!(
            settings.build_local_caps().unwrap_err(),
            Error::Settings(SettingsError::UnknownName { field: "fs_rights", .. })
        ));

        let settings = AccessControlSettings::from_toml_str("kernel_flags = [\"fly\"]").unwrap();
        assert!(settings.build_kernel_caps().is_err());

        let settings = AccessControlSettings::from_toml_str("cpu_speed = \"1GHz\"").unwrap();
        assert!(settings.build_local_caps().is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            AccessControlSettings::from_toml_str("unknown_key = 1").unwrap_err(),
            Error::Settings(SettingsError::Parse(_))
        ));
        assert!(parse_mapping("io_mappings", "0x1000-0x2000:w").is_err());
        assert!(parse_mapping("io_mappings", "zzz").is_err());
        assert!(parse_kernel_version("2").is_err());
        assert!(parse_u32("field", "0x1_0000_0000").is_err());
    }
}

//! ARM11 local capability model.
//!
//! This module defines the 0x170-byte local capability record: program
//! identity, scheduling limits, save data and filesystem access, and the list
//! of services a program may connect to.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ctr_core::error::LocalCapsError;
use ctr_core::Result;

use super::flags::{CpuSpeed, LocalFlags, SystemMode, SystemModeExt};
use super::savedata::SaveDataAccess;

/// Number of FS right bits; the bits above them are attributes.
pub const FS_RIGHT_BITS: u32 = 56;

/// Number of resource limit descriptors.
pub const RESOURCE_LIMIT_COUNT: usize = 16;

const FS_RIGHTS_MASK: u64 = (1 << FS_RIGHT_BITS) - 1;
const ATTRIBUTE_NOT_USE_ROMFS: u8 = 1 << 0;
const ATTRIBUTE_EXTENDED_SAVEDATA_ACCESS: u8 = 1 << 1;

/// Named filesystem rights. The value is the bit index in the FS rights field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FsRight {
    CategorySystemApplication = 0,
    CategoryHardwareCheck = 1,
    CategoryFileSystemTool = 2,
    Debug = 3,
    TwlCardBackup = 4,
    TwlNandData = 5,
    Boss = 6,
    DirectSdmc = 7,
    Core = 8,
    CtrNandRo = 9,
    CtrNandRw = 10,
    CtrNandRoWrite = 11,
    CategorySystemSettings = 12,
    CardBoard = 13,
    ExportImportIvs = 14,
    DirectSdmcWrite = 15,
    SwitchCleanup = 16,
    SaveDataMove = 17,
    Shop = 18,
    Shell = 19,
    CategoryHomeMenu = 20,
    SeedDb = 21,
}

impl FsRight {
    pub const ALL: [FsRight; 22] = [
        Self::CategorySystemApplication,
        Self::CategoryHardwareCheck,
        Self::CategoryFileSystemTool,
        Self::Debug,
        Self::TwlCardBackup,
        Self::TwlNandData,
        Self::Boss,
        Self::DirectSdmc,
        Self::Core,
        Self::CtrNandRo,
        Self::CtrNandRw,
        Self::CtrNandRoWrite,
        Self::CategorySystemSettings,
        Self::CardBoard,
        Self::ExportImportIvs,
        Self::DirectSdmcWrite,
        Self::SwitchCleanup,
        Self::SaveDataMove,
        Self::Shop,
        Self::Shell,
        Self::CategoryHomeMenu,
        Self::SeedDb,
    ];

    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Settings name of the right.
    pub const fn name(self) -> &'static str {
        match self {
            Self::CategorySystemApplication => "category_system_application",
            Self::CategoryHardwareCheck => "category_hardware_check",
            Self::CategoryFileSystemTool => "category_file_system_tool",
            Self::Debug => "debug",
            Self::TwlCardBackup => "twl_card_backup",
            Self::TwlNandData => "twl_nand_data",
            Self::Boss => "boss",
            Self::DirectSdmc => "direct_sdmc",
            Self::Core => "core",
            Self::CtrNandRo => "ctr_nand_ro",
            Self::CtrNandRw => "ctr_nand_rw",
            Self::CtrNandRoWrite => "ctr_nand_ro_write",
            Self::CategorySystemSettings => "category_system_settings",
            Self::CardBoard => "card_board",
            Self::ExportImportIvs => "export_import_ivs",
            Self::DirectSdmcWrite => "direct_sdmc_write",
            Self::SwitchCleanup => "switch_cleanup",
            Self::SaveDataMove => "save_data_move",
            Self::Shop => "shop",
            Self::Shell => "shell",
            Self::CategoryHomeMenu => "category_home_menu",
            Self::SeedDb => "seed_db",
        }
    }

    /// Look up a right by its settings name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|right| right.name() == name)
    }
}

/// Resource limit set a program is accounted against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceLimitCategory {
    #[default]
    Application = 0,
    SysApplet = 1,
    LibApplet = 2,
    Other = 3,
}

impl TryFrom<u8> for ResourceLimitCategory {
    type Error = LocalCapsError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Application),
            1 => Ok(Self::SysApplet),
            2 => Ok(Self::LibApplet),
            3 => Ok(Self::Other),
            other => Err(LocalCapsError::FieldOutOfRange {
                field: "resource limit category",
                value: u32::from(other),
            }),
        }
    }
}

/// ARM11 local capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arm11LocalCaps {
    program_id: u64,
    firm_title_id_low: u32,
    l2_cache_enabled: bool,
    cpu_speed: CpuSpeed,
    system_mode_ext: SystemModeExt,
    ideal_processor: u8,
    affinity_mask: u8,
    system_mode: SystemMode,
    thread_priority: i8,
    resource_limit_descriptors: [u16; RESOURCE_LIMIT_COUNT],
    save_data: SaveDataAccess,
    system_save_ids: [u32; 2],
    fs_rights: u64,
    /// Attribute bits other than extended savedata access, which is owned by
    /// `save_data`.
    attributes: u8,
    services: Vec<String>,
    resource_limit_category: ResourceLimitCategory,
}

impl Arm11LocalCaps {
    /// Size of the serialized record.
    pub const SIZE: usize = 0x170;

    pub const MAX_SERVICES: usize = 34;

    /// Width of one service name slot.
    pub const SERVICE_NAME_SIZE: usize = 8;

    /// Highest thread priority that can be stored.
    pub const MAX_THREAD_PRIORITY: i32 = 127;

    const RESERVED_SIZE: usize = 0xF;

    /// Create an empty local capability record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Program id. In a grant, an all-ones low word admits any unique id
    /// under the same high word.
    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    /// Set the program id.
    pub fn set_program_id(&mut self, program_id: u64) {
        self.program_id = program_id;
    }

    /// Low word of the firmware title this program requires.
    pub fn firm_title_id_low(&self) -> u32 {
        self.firm_title_id_low
    }

    /// Set the low word of the required firmware title id.
    pub fn set_firm_title_id_low(&mut self, firm_title_id_low: u32) {
        self.firm_title_id_low = firm_title_id_low;
    }

    /// Whether the New 3DS L2 cache is enabled.
    pub fn l2_cache_enabled(&self) -> bool {
        self.l2_cache_enabled
    }

    /// Enable or disable the L2 cache.
    pub fn set_l2_cache_enabled(&mut self, enabled: bool) {
        self.l2_cache_enabled = enabled;
    }

    /// CPU clock the program runs at. Grants are compared by ordinal.
    pub fn cpu_speed(&self) -> CpuSpeed {
        self.cpu_speed
    }

    /// Set the CPU clock.
    pub fn set_cpu_speed(&mut self, speed: CpuSpeed) {
        self.cpu_speed = speed;
    }

    /// Memory layout mode on Old 3DS hardware.
    pub fn system_mode(&self) -> SystemMode {
        self.system_mode
    }

    /// Set the Old 3DS memory layout mode.
    pub fn set_system_mode(&mut self, mode: SystemMode) {
        self.system_mode = mode;
    }

    /// Memory layout mode on New 3DS hardware.
    pub fn system_mode_ext(&self) -> SystemModeExt {
        self.system_mode_ext
    }

    /// Set the New 3DS memory layout mode.
    pub fn set_system_mode_ext(&mut self, mode: SystemModeExt) {
        self.system_mode_ext = mode;
    }

    /// Ideal processor. A requested record holds a core index; a granted
    /// record holds a bitmap of allowed cores.
    pub fn ideal_processor(&self) -> u8 {
        self.ideal_processor
    }

    /// Set the ideal processor. Values above 3 are rejected.
    pub fn set_ideal_processor(&mut self, value: u8) -> Result<()> {
        if !LocalFlags::fits_two_bits(value) {
            return Err(LocalCapsError::FieldOutOfRange {
                field: "ideal processor",
                value: u32::from(value),
            }
            .into());
        }
        self.ideal_processor = value;
        Ok(())
    }

    /// Bitmap of cores the main thread may run on.
    pub fn affinity_mask(&self) -> u8 {
        self.affinity_mask
    }

    /// Set the core affinity bitmap.
    ///
    /// # Arguments
    ///
    /// * `mask` - Core bitmap; only the low two bits are representable.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the mask fits.
    /// * `Err` - If any bit above bit 1 is set.
    pub fn set_affinity_mask(&mut self, mask: u8) -> Result<()> {
        if !LocalFlags::fits_two_bits(mask) {
            return Err(LocalCapsError::FieldOutOfRange {
                field: "affinity mask",
                value: u32::from(mask),
            }
            .into());
        }
        self.affinity_mask = mask;
        Ok(())
    }

    /// Main thread priority. Lower values run first.
    pub fn thread_priority(&self) -> i8 {
        self.thread_priority
    }

    /// Set the main thread priority. Negative priorities are rejected.
    pub fn set_thread_priority(&mut self, priority: i32) -> Result<()> {
        if !(0..=Self::MAX_THREAD_PRIORITY).contains(&priority) {
            return Err(LocalCapsError::ThreadPriorityOutOfRange(priority).into());
        }
        self.thread_priority = priority as i8;
        Ok(())
    }

    /// Maximum CPU time, stored as resource limit descriptor 0.
    pub fn max_cpu_time(&self) -> u16 {
        self.resource_limit_descriptors[0]
    }

    /// Set the maximum CPU time (resource limit descriptor 0).
    pub fn set_max_cpu_time(&mut self, max_cpu_time: u16) {
        self.resource_limit_descriptors[0] = max_cpu_time;
    }

    /// All sixteen resource limit descriptors.
    pub fn resource_limit_descriptors(&self) -> &[u16; RESOURCE_LIMIT_COUNT] {
        &self.resource_limit_descriptors
    }

    /// Set one resource limit descriptor.
    ///
    /// # Arguments
    ///
    /// * `index` - Descriptor slot; slot 0 is the maximum CPU time.
    /// * `value` - New descriptor value.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the slot exists.
    /// * `Err` - If `index` is past the last slot.
    pub fn set_resource_limit_descriptor(&mut self, index: usize, value: u16) -> Result<()> {
        let slot = self.resource_limit_descriptors.get_mut(index).ok_or(
            LocalCapsError::FieldOutOfRange {
                field: "resource limit descriptor index",
                value: index as u32,
            },
        )?;
        *slot = value;
        Ok(())
    }

    /// Resource limit category the program is placed in.
    pub fn resource_limit_category(&self) -> ResourceLimitCategory {
        self.resource_limit_category
    }

    /// Set the resource limit category.
    pub fn set_resource_limit_category(&mut self, category: ResourceLimitCategory) {
        self.resource_limit_category = category;
    }

    /// The save data access fields, in whichever encoding is active.
    pub fn save_data_access(&self) -> &SaveDataAccess {
        &self.save_data
    }

    /// Replace the save data access fields wholesale.
    pub fn set_save_data_access(&mut self, access: SaveDataAccess) {
        self.save_data = access;
    }

    /// The extdata id, if the standard save data encoding is in use.
    pub fn extdata_id(&self) -> Option<u64> {
        match &self.save_data {
            SaveDataAccess::Standard { extdata_id, .. } => Some(*extdata_id),
            SaveDataAccess::Extended { .. } => None,
        }
    }

    /// Set the extdata id, switching to the standard encoding if needed.
    pub fn set_extdata_id(&mut self, id: u64) {
        match &mut self.save_data {
            SaveDataAccess::Standard { extdata_id, .. } => *extdata_id = id,
            SaveDataAccess::Extended { .. } => {
                self.save_data = SaveDataAccess::Standard {
                    extdata_id: id,
                    other_user_save_ids: Vec::new(),
                    use_other_variation: false,
                };
            }
        }
    }

    /// Other-user save ids; empty when the extended encoding is in use.
    pub fn other_user_save_ids(&self) -> &[u32] {
        match &self.save_data {
            SaveDataAccess::Standard { other_user_save_ids, .. } => other_user_save_ids,
            SaveDataAccess::Extended { .. } => &[],
        }
    }

    /// The "use other variation save data" bit of the standard encoding.
    pub fn use_other_variation_save_data(&self) -> bool {
        matches!(
            self.save_data,
            SaveDataAccess::Standard { use_other_variation: true, .. }
        )
    }

    /// Set the other-user save ids, keeping the current extdata id.
    pub fn set_other_user_save_ids(&mut self, ids: &[u32], use_other_variation: bool) -> Result<()> {
        let extdata_id = self.extdata_id().unwrap_or_default();
        self.save_data = SaveDataAccess::standard(extdata_id, ids, use_other_variation)?;
        Ok(())
    }

    /// Switch to the extended encoding with up to six accessible save ids.
    pub fn set_accessible_save_ids(&mut self, ids: &[u32]) -> Result<()> {
        self.save_data = SaveDataAccess::extended(ids)?;
        Ok(())
    }

    /// Accessible save ids; empty when the standard encoding is in use.
    pub fn accessible_save_ids(&self) -> &[u32] {
        match &self.save_data {
            SaveDataAccess::Extended { accessible_save_ids } => accessible_save_ids,
            SaveDataAccess::Standard { .. } => &[],
        }
    }

    /// The six accessible save id slots, zero-filled.
    ///
    /// Slots 0 to 2 travel in the other-user field and slots 3 to 5 in the
    /// extdata field.
    pub fn accessible_save_id_slots(&self) -> [u32; 6] {
        self.save_data.accessible_save_id_slots()
    }

    /// Whether the extended save data encoding is active.
    pub fn uses_extended_savedata_access(&self) -> bool {
        self.save_data.is_extended()
    }

    /// The two system save data ids.
    ///
    /// In a grant, each id acts as an allow mask over the requested id.
    pub fn system_save_ids(&self) -> [u32; 2] {
        self.system_save_ids
    }

    /// Set both system save data ids.
    pub fn set_system_save_ids(&mut self, ids: [u32; 2]) {
        self.system_save_ids = ids;
    }

    /// Grant a named filesystem right.
    pub fn add_fs_right(&mut self, right: FsRight) {
        self.fs_rights |= 1 << right.bit();
    }

    /// Grant a filesystem right by bit index.
    pub fn add_raw_fs_right(&mut self, bit: u32) -> Result<()> {
        if bit >= FS_RIGHT_BITS {
            return Err(LocalCapsError::FsRightOutOfRange(bit).into());
        }
        self.fs_rights |= 1 << bit;
        Ok(())
    }

    /// Whether the FS right at `bit` is granted. Out-of-range bits are not.
    pub fn has_fs_right(&self, bit: u32) -> bool {
        bit < FS_RIGHT_BITS && self.fs_rights & (1 << bit) != 0
    }

    /// The raw 56-bit FS rights mask.
    pub fn fs_rights(&self) -> u64 {
        self.fs_rights
    }

    /// The granted FS right bit indices, in ascending order.
    pub fn fs_rights_whitelist(&self) -> Vec<u32> {
        (0..FS_RIGHT_BITS).filter(|bit| self.has_fs_right(*bit)).collect()
    }

    /// Whether the program may mount its RomFS.
    pub fn can_mount_romfs(&self) -> bool {
        self.attributes & ATTRIBUTE_NOT_USE_ROMFS == 0
    }

    /// Allow or forbid mounting the RomFS.
    pub fn set_can_mount_romfs(&mut self, can_mount: bool) {
        if can_mount {
            self.attributes &= !ATTRIBUTE_NOT_USE_ROMFS;
        } else {
            self.attributes |= ATTRIBUTE_NOT_USE_ROMFS;
        }
    }

    /// Permit access to a service.
    ///
    /// Names must be 1 to 8 ASCII bytes without NUL. Adding a name that is
    /// already listed is a no-op.
    pub fn add_service(&mut self, name: &str) -> Result<()> {
        if name.is_empty()
            || name.len() > Self::SERVICE_NAME_SIZE
            || !name.is_ascii()
            || name.contains('\0')
        {
            return Err(LocalCapsError::InvalidServiceName(name.to_string()).into());
        }

        if self.services.iter().any(|service| service == name) {
            return Ok(());
        }

        if self.services.len() >= Self::MAX_SERVICES {
            return Err(LocalCapsError::TooManyServices(Self::MAX_SERVICES).into());
        }

        self.services.push(name.to_string());
        Ok(())
    }

    /// Permitted service names, in insertion order.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Whether `name` is in the service list.
    pub fn has_service(&self, name: &str) -> bool {
        self.services.iter().any(|service| service == name)
    }

    fn packed_flags(&self) -> LocalFlags {
        LocalFlags::default()
            .with_l2_cache(self.l2_cache_enabled)
            .with_cpu_speed(self.cpu_speed)
            .with_system_mode_ext(self.system_mode_ext)
            .with_ideal_processor(self.ideal_processor)
            .with_affinity_mask(self.affinity_mask)
            .with_system_mode(self.system_mode)
            .with_thread_priority(self.thread_priority)
    }

    /// Serialize this record into its 0x170-byte block.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        let (extdata_field, other_field) = self.save_data.encode();

        let mut attributes = self.attributes & !ATTRIBUTE_EXTENDED_SAVEDATA_ACCESS;
        if self.save_data.is_extended() {
            attributes |= ATTRIBUTE_EXTENDED_SAVEDATA_ACCESS;
        }

        buf.put_u64_le(self.program_id);
        buf.put_u32_le(self.firm_title_id_low);
        buf.put_u32_le(self.packed_flags().raw());
        for descriptor in self.resource_limit_descriptors {
            buf.put_u16_le(descriptor);
        }
        buf.put_u64_le(extdata_field);
        for id in self.system_save_ids {
            buf.put_u32_le(id);
        }
        buf.put_u64_le(other_field);
        buf.put_u64_le((self.fs_rights & FS_RIGHTS_MASK) | (u64::from(attributes) << FS_RIGHT_BITS));

        for index in 0..Self::MAX_SERVICES {
            let mut slot = [0u8; Self::SERVICE_NAME_SIZE];
            if let Some(name) = self.services.get(index) {
                slot[..name.len()].copy_from_slice(name.as_bytes());
            }
            buf.put_slice(&slot);
        }

        buf.put_bytes(0, Self::RESERVED_SIZE);
        buf.put_u8(self.resource_limit_category as u8);

        buf.freeze()
    }

    /// Deserialize a record from its block. Extra trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(LocalCapsError::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            }
            .into());
        }

        let mut cursor = &data[..Self::SIZE];
        let program_id = cursor.get_u64_le();
        let firm_title_id_low = cursor.get_u32_le();
        let flags = LocalFlags::from_raw(cursor.get_u32_le());

        let mut resource_limit_descriptors = [0u16; RESOURCE_LIMIT_COUNT];
        for descriptor in resource_limit_descriptors.iter_mut() {
            *descriptor = cursor.get_u16_le();
        }

        let extdata_field = cursor.get_u64_le();
        let system_save_ids = [cursor.get_u32_le(), cursor.get_u32_le()];
        let other_field = cursor.get_u64_le();
        let fs_field = cursor.get_u64_le();

        let mut services = Vec::new();
        for _ in 0..Self::MAX_SERVICES {
            let mut slot = [0u8; Self::SERVICE_NAME_SIZE];
            cursor.copy_to_slice(&mut slot);
            let len = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
            if len == 0 {
                continue;
            }
            let name = std::str::from_utf8(&slot[..len])
                .ok()
                .filter(|name| name.is_ascii())
                .ok_or_else(|| {
                    LocalCapsError::InvalidServiceName(String::from_utf8_lossy(&slot[..len]).into_owned())
                })?;
            services.push(name.to_string());
        }

        cursor.advance(Self::RESERVED_SIZE);
        let resource_limit_category = ResourceLimitCategory::try_from(cursor.get_u8())?;

        let attributes = (fs_field >> FS_RIGHT_BITS) as u8;
        let extended = attributes & ATTRIBUTE_EXTENDED_SAVEDATA_ACCESS != 0;

        let caps = Self {
            program_id,
            firm_title_id_low,
            l2_cache_enabled: flags.l2_cache(),
            cpu_speed: flags.cpu_speed(),
            system_mode_ext: SystemModeExt::try_from(flags.system_mode_ext_raw())?,
            ideal_processor: flags.ideal_processor(),
            affinity_mask: flags.affinity_mask(),
            system_mode: SystemMode::try_from(flags.system_mode_raw())?,
            thread_priority: flags.thread_priority(),
            resource_limit_descriptors,
            save_data: SaveDataAccess::decode(extdata_field, other_field, extended),
            system_save_ids,
            fs_rights: fs_field & FS_RIGHTS_MASK,
            attributes: attributes & !ATTRIBUTE_EXTENDED_SAVEDATA_ACCESS,
            services,
            resource_limit_category,
        };

        debug!(
            "Decoded local capabilities for program {:#018x}: {} services, fs rights {:#x}",
            caps.program_id,
            caps.services.len(),
            caps.fs_rights
        );

        Ok(caps)
    }
}

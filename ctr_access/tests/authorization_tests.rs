// Authorization tests against a signed access descriptor.
use std::sync::OnceLock;

use ctr_access::{
    AccessControlInfo, AccessDescriptor, AccessDescriptorBuilder, Arm11KernelCaps,
    Arm11LocalCaps, Arm9AccessControl, Arm9Right, CpuSpeed, FsRight, KernelFlags, MemoryMapping,
    MemoryType, ReportField, SystemMode, SystemModeExt, ValidationReport,
};
use ctr_core::utils::{init_test_tracing, LogLevel};
use ctr_core::{RsaDescriptorSigner, RsaSignatureVerifier, RSA2048_SIZE};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn generate_key(seed: u64) -> RsaDescriptorSigner {
    let mut rng = StdRng::seed_from_u64(seed);
    RsaDescriptorSigner::generate(&mut rng).unwrap()
}

/// The key pair that signs the grants under test.
fn grant_key() -> &'static RsaDescriptorSigner {
    static KEY: OnceLock<RsaDescriptorSigner> = OnceLock::new();
    KEY.get_or_init(|| generate_key(0x0001))
}

/// An unrelated key pair.
fn other_key() -> &'static RsaDescriptorSigner {
    static KEY: OnceLock<RsaDescriptorSigner> = OnceLock::new();
    KEY.get_or_init(|| generate_key(0x0002))
}

fn granted_local() -> Arm11LocalCaps {
    let mut local = Arm11LocalCaps::new();
    local.set_program_id(0x0004_0000_FFFF_FFFF);
    local.set_l2_cache_enabled(true);
    local.set_cpu_speed(CpuSpeed::Mhz804);
    local.set_ideal_processor(0b0001).unwrap();
    local.set_affinity_mask(0b0011).unwrap();
    local.set_thread_priority(0x18).unwrap();
    local.set_system_save_ids([u32::MAX, u32::MAX]);
    for bit in [0, 5, 9] {
        local.add_raw_fs_right(bit).unwrap();
    }
    local.add_service("fs:USER").unwrap();
    local.add_service("APT:U").unwrap();
    local.add_service("hid:USER").unwrap();
    local
}

fn granted_kernel() -> Arm11KernelCaps {
    let mut kernel = Arm11KernelCaps::new();
    kernel.add_syscalls(0x01..=0x7D);
    kernel.add_interrupts([0x20, 0x21, 0x22]).unwrap();
    kernel
        .add_static_mapping(MemoryMapping::new(0x1000, 0x2000, true))
        .unwrap();
    kernel
        .add_io_mapping(MemoryMapping::page(0x1FF8_0000, false))
        .unwrap();
    kernel.set_handle_table_size(0x200).unwrap();
    kernel
}

fn granted_arm9() -> Arm9AccessControl {
    let mut arm9 = Arm9AccessControl::new();
    arm9.add_right(Arm9Right::SdApplication);
    arm9.add_right(Arm9Right::MountSdmcWrite);
    arm9
}

fn sign_grant(
    key: &RsaDescriptorSigner,
    local: Arm11LocalCaps,
    kernel: Arm11KernelCaps,
    arm9: Arm9AccessControl,
) -> AccessDescriptor {
    AccessDescriptorBuilder::new(&key.public_key(), local, kernel, arm9)
        .unwrap()
        .sign(key)
        .unwrap()
}

fn descriptor() -> AccessDescriptor {
    sign_grant(grant_key(), granted_local(), granted_kernel(), granted_arm9())
}

fn descriptor_with_local(local: Arm11LocalCaps) -> AccessDescriptor {
    sign_grant(grant_key(), local, granted_kernel(), granted_arm9())
}

fn descriptor_with_kernel(kernel: Arm11KernelCaps) -> AccessDescriptor {
    sign_grant(grant_key(), granted_local(), kernel, granted_arm9())
}

fn valid_request() -> AccessControlInfo {
    let mut local = Arm11LocalCaps::new();
    local.set_program_id(0x0004_0000_0012_3400);
    local.set_cpu_speed(CpuSpeed::Mhz268);
    local.set_thread_priority(0x30).unwrap();
    local.set_system_save_ids([0x0002_0000, 0]);
    local.add_raw_fs_right(0).unwrap();
    local.add_raw_fs_right(5).unwrap();
    local.add_service("fs:USER").unwrap();

    let mut kernel = Arm11KernelCaps::new();
    kernel.add_syscalls([0x01, 0x02, 0x24]);
    kernel.add_interrupt(0x21).unwrap();
    kernel
        .add_static_mapping(MemoryMapping::new(0x1000, 0x1800, true))
        .unwrap();
    kernel
        .add_io_mapping(MemoryMapping::page(0x1FF8_0000, false))
        .unwrap();
    kernel.set_handle_table_size(0x100).unwrap();

    let mut arm9 = Arm9AccessControl::new();
    arm9.add_right(Arm9Right::SdApplication);

    AccessControlInfo::new(local, kernel, arm9)
}

fn only_failure(report: &ValidationReport, field: ReportField) {
    assert!(!report.is_valid());
    assert_eq!(report.failures(), vec![field]);
}

#[test]
fn test_valid_request_passes_every_check() {
    init_test_tracing(LogLevel::Debug);
    let report = descriptor().validate_extended_header(&valid_request());
    assert!(report.is_valid(), "failures: {:?}", report.failures());
}

#[test]
fn test_ideal_processor_scenario() {
    let descriptor = descriptor();
    let mut request = valid_request();

    request.local_caps_mut().set_ideal_processor(0).unwrap();
    assert!(descriptor.validate_extended_header(&request).ideal_processor());

    request.local_caps_mut().set_ideal_processor(1).unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::IdealProcessor,
    );
}

#[test]
fn test_fs_rights_whitelist_scenario() {
    let descriptor = descriptor();
    let mut request = valid_request();
    assert!(descriptor.validate_extended_header(&request).fs_rights());

    request.local_caps_mut().add_fs_right(FsRight::CategorySystemSettings);
    let report = descriptor.validate_extended_header(&request);
    assert!(!report.fs_rights());
    assert!(!report.is_valid());
}

#[test]
fn test_mapping_containment_scenario() {
    let descriptor = descriptor();
    let mut request = valid_request();
    assert!(descriptor.validate_extended_header(&request).static_mappings());

    request
        .kernel_caps_mut()
        .add_static_mapping(MemoryMapping::new(0x1000, 0x3000, true))
        .unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::StaticMappings,
    );
}

#[test]
fn test_signature_scenario() {
    let key = grant_key();
    let descriptor = descriptor();
    let verifier = RsaSignatureVerifier::new();

    assert!(descriptor.validate_signature(&verifier, &key.public_key()));
    assert!(!descriptor.validate_signature(&verifier, &other_key().public_key()));

    // The signature survives a trip through the binary record.
    let parsed = AccessDescriptor::from_bytes(&descriptor.to_bytes()).unwrap();
    assert!(parsed.validate_signature(&verifier, &key.public_key()));
    assert_eq!(parsed.public_key(), &key.public_key());
}

#[test]
fn test_signature_from_other_key_is_rejected() {
    // A grant carrying the victim's public key but signed by someone else.
    let victim = grant_key();
    let forged = AccessDescriptorBuilder::new(
        &victim.public_key(),
        granted_local(),
        granted_kernel(),
        granted_arm9(),
    )
    .unwrap()
    .sign(other_key())
    .unwrap();

    let verifier = RsaSignatureVerifier::new();
    assert!(!forged.validate_signature(&verifier, &victim.public_key()));
    assert!(forged.validate_signature(&verifier, &other_key().public_key()));
}

#[test]
fn test_tampered_body_is_rejected() {
    let key = grant_key();
    let mut bytes = descriptor().to_bytes().to_vec();
    // Firmware title id of the granted local caps.
    bytes[RSA2048_SIZE + RSA2048_SIZE + 0x08] ^= 0x01;

    let tampered = AccessDescriptor::from_bytes(&bytes).unwrap();
    assert!(!tampered.validate_signature(&RsaSignatureVerifier::new(), &key.public_key()));
}

#[test]
fn test_validation_is_idempotent() {
    let descriptor = descriptor();
    let mut request = valid_request();
    request.kernel_caps_mut().add_interrupt(0x40).unwrap();

    let first = descriptor.validate_extended_header(&request);
    let second = descriptor.validate_extended_header(&request);
    assert_eq!(first, second);
    assert_eq!(first.failures(), vec![ReportField::Interrupts]);

    // A failing run leaves nothing behind for the next request.
    assert!(descriptor.validate_extended_header(&valid_request()).is_valid());
}

#[test]
fn test_all_wildcard_program_id() {
    let mut local = granted_local();
    local.set_program_id(u64::MAX);
    let descriptor = descriptor_with_local(local);

    let mut request = valid_request();
    for program_id in [0, 0x0004_0010_0002_0000, u64::MAX] {
        request.local_caps_mut().set_program_id(program_id);
        assert!(descriptor.validate_extended_header(&request).program_id());
    }
}

#[test]
fn test_program_id_outside_grant() {
    let mut request = valid_request();
    request.local_caps_mut().set_program_id(0x0004_0001_0012_3400);
    only_failure(
        &descriptor().validate_extended_header(&request),
        ReportField::ProgramId,
    );
}

#[test]
fn test_cpu_speed_and_l2_cache() {
    let mut local = granted_local();
    local.set_cpu_speed(CpuSpeed::Mhz268);
    local.set_l2_cache_enabled(false);
    let descriptor = descriptor_with_local(local);

    let mut request = valid_request();
    assert!(descriptor.validate_extended_header(&request).is_valid());

    request.local_caps_mut().set_cpu_speed(CpuSpeed::Mhz804);
    request.local_caps_mut().set_l2_cache_enabled(true);
    let report = descriptor.validate_extended_header(&request);
    assert_eq!(report.failures(), vec![ReportField::L2Cache, ReportField::CpuSpeed]);
}

#[test]
fn test_thread_priority_127_always_fails() {
    let descriptor = descriptor();
    let mut request = valid_request();
    request.local_caps_mut().set_thread_priority(127).unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::ThreadPriority,
    );

    request.local_caps_mut().set_thread_priority(0x10).unwrap();
    assert!(!descriptor.validate_extended_header(&request).thread_priority());
}

#[test]
fn test_system_save_id_allow_mask() {
    let mut local = granted_local();
    local.set_system_save_ids([0x0000_FFFF, u32::MAX]);
    let descriptor = descriptor_with_local(local);

    let report = descriptor.validate_extended_header(&valid_request());
    assert_eq!(report.failures(), vec![ReportField::SystemSaveId1]);
}

#[test]
fn test_out_of_range_interrupts_are_dropped() {
    let mut kernel = Arm11KernelCaps::new();
    kernel.add_interrupts([0x10, 0x7F, 0x80, 0x11]).unwrap();
    assert_eq!(kernel.interrupts(), &[0x10, 0x11]);

    let decoded = Arm11KernelCaps::from_bytes(&kernel.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded.interrupts(), &[0x10, 0x11]);
}

#[test]
fn test_report_serializes_to_json() {
    let mut request = valid_request();
    request.arm9_access_control_mut().add_right(Arm9Right::MountNand);
    let report = descriptor().validate_extended_header(&request);

    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["arm9_rights"], serde_json::Value::Bool(false));
    assert_eq!(json["program_id"], serde_json::Value::Bool(true));

    let failures = serde_json::to_string(&report.failures()).unwrap();
    assert_eq!(failures, "[\"arm9_rights\"]");
}

#[test]
fn test_firm_title_id_must_match() {
    let mut request = valid_request();
    request.local_caps_mut().set_firm_title_id_low(0x0000_0002);
    only_failure(
        &descriptor().validate_extended_header(&request),
        ReportField::FirmTitleId,
    );
}

#[test]
fn test_system_modes_must_match() {
    let descriptor = descriptor();

    let mut request = valid_request();
    request.local_caps_mut().set_system_mode(SystemMode::Dev1);
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::SystemMode,
    );

    let mut request = valid_request();
    request.local_caps_mut().set_system_mode_ext(SystemModeExt::Prod);
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::SystemModeExt,
    );
}

#[test]
fn test_affinity_mask_outside_grant() {
    let mut local = granted_local();
    local.set_affinity_mask(0b0001).unwrap();
    let descriptor = descriptor_with_local(local);

    let mut request = valid_request();
    request.local_caps_mut().set_affinity_mask(0b0001).unwrap();
    assert!(descriptor.validate_extended_header(&request).is_valid());

    request.local_caps_mut().set_affinity_mask(0b0011).unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::AffinityMask,
    );
}

#[test]
fn test_handle_table_size_above_grant() {
    let descriptor = descriptor();
    let mut request = valid_request();

    request.kernel_caps_mut().set_handle_table_size(0x200).unwrap();
    assert!(descriptor.validate_extended_header(&request).handle_table_size());

    request.kernel_caps_mut().set_handle_table_size(0x201).unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::HandleTableSize,
    );
}

#[test]
fn test_memory_type_must_match() {
    let mut request = valid_request();
    request.kernel_caps_mut().set_memory_type(MemoryType::System);
    only_failure(
        &descriptor().validate_extended_header(&request),
        ReportField::MemoryType,
    );
}

#[test]
fn test_kernel_flag_not_granted() {
    let mut kernel = granted_kernel();
    kernel.set_kernel_flags(KernelFlags::ALLOW_DEBUG | KernelFlags::SHARED_PAGE_WRITING);
    let descriptor = descriptor_with_kernel(kernel);

    let mut request = valid_request();
    request.kernel_caps_mut().set_kernel_flags(KernelFlags::ALLOW_DEBUG);
    assert!(descriptor.validate_extended_header(&request).is_valid());

    request
        .kernel_caps_mut()
        .set_kernel_flags(KernelFlags::ALLOW_DEBUG | KernelFlags::FORCE_DEBUG);
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::KernelFlags,
    );
}

#[test]
fn test_io_mapping_outside_grant() {
    let mut request = valid_request();
    request
        .kernel_caps_mut()
        .add_io_mapping(MemoryMapping::page(0x1FF8_1000, false))
        .unwrap();
    only_failure(
        &descriptor().validate_extended_header(&request),
        ReportField::IoMappings,
    );
}

#[test]
fn test_single_page_request_against_range_grant() {
    let descriptor = descriptor();

    // end == 0 on the request only: the range test still applies, and a
    // zero end never lies above the granted start.
    let mut request = valid_request();
    request
        .kernel_caps_mut()
        .add_static_mapping(MemoryMapping::page(0x1000, true))
        .unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::StaticMappings,
    );

    // Same shape on the I/O side, against a granted range.
    let mut kernel = granted_kernel();
    kernel
        .add_io_mapping(MemoryMapping::new(0x1EC0_0000, 0x1EC4_0000, false))
        .unwrap();
    let descriptor = descriptor_with_kernel(kernel);
    let mut request = valid_request();
    request
        .kernel_caps_mut()
        .add_io_mapping(MemoryMapping::page(0x1EC0_0000, false))
        .unwrap();
    only_failure(
        &descriptor.validate_extended_header(&request),
        ReportField::IoMappings,
    );
}

use std::fs;

use object::{elf, Architecture, File, Object, ObjectSection, ObjectSymbol, RelocationFlags};

use mkoffload::debuginfo::{extract_debug_bundle, ExtractError};

mod common;

#[test]
fn round_trip_preserves_payload_and_retargets_relocations() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("kernel.o");
    let output = dir.path().join("kernel.dbg.o");

    let host_types = [
        elf::R_X86_64_64,
        elf::R_X86_64_32,
        elf::R_X86_64_32S,
        elf::R_X86_64_PC32,
        elf::R_X86_64_RELATIVE,
    ];
    fs::write(
        &input,
        common::debug_object(Architecture::X86_64, &host_types),
    )
    .unwrap();

    let summary = extract_debug_bundle(&input, &output).unwrap();
    assert_eq!(
        summary.debug_bytes,
        (common::INFO_PAYLOAD.len() + common::ABBREV_PAYLOAD.len()) as u64
    );
    assert_eq!(summary.relocations, host_types.len());

    let data = fs::read(&output).unwrap();
    let bundle = File::parse(&*data).unwrap();

    // Payload bytes are untouched; sections are renamed out of the
    // embedded-IR namespace.
    let info = bundle.section_by_name(".debug_info").unwrap();
    assert_eq!(info.data().unwrap(), common::INFO_PAYLOAD);
    let abbrev = bundle.section_by_name(".debug_abbrev").unwrap();
    assert_eq!(abbrev.data().unwrap(), common::ABBREV_PAYLOAD);
    assert!(bundle.section_by_name(".gnu.debuglto_.debug_info").is_none());
    assert!(bundle.section_by_name(".text").is_none());

    // Only the relocation types differ: offsets, order, and addends are
    // carried over, and each type maps through the fixed table.
    let device_types = [
        elf::R_RISCV_64,
        elf::R_RISCV_32,
        elf::R_RISCV_32,
        elf::R_RISCV_32_PCREL,
        elf::R_RISCV_RELATIVE,
    ];
    let relocations: Vec<_> = info.relocations().collect();
    assert_eq!(relocations.len(), device_types.len());
    for (index, ((offset, relocation), expected)) in
        relocations.iter().zip(device_types).enumerate()
    {
        assert_eq!(*offset, (index * 8) as u64);
        assert_eq!(relocation.addend(), index as i64);
        assert_eq!(relocation.flags(), RelocationFlags::Elf { r_type: expected });
    }

    // The anchor the relocations referenced travels as an undefined symbol.
    let anchor = bundle.symbol_by_name("payload_anchor").unwrap();
    assert!(anchor.is_undefined());
}

#[test]
fn absent_payload_is_benign_and_creates_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.o");
    let output = dir.path().join("plain.dbg.o");
    fs::write(&input, common::plain_object()).unwrap();

    let err = extract_debug_bundle(&input, &output).unwrap_err();
    assert!(matches!(err, ExtractError::DebugAbsent { .. }));
    assert!(err.is_benign());
    assert!(!output.exists());
}

#[test]
fn unrecognizable_container_is_benign() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("noise.o");
    let output = dir.path().join("noise.dbg.o");
    fs::write(&input, b"this is not an object file").unwrap();

    let err = extract_debug_bundle(&input, &output).unwrap_err();
    assert!(matches!(err, ExtractError::NotAnObject { .. }));
    assert!(err.is_benign());
    assert!(!output.exists());
}

#[test]
fn missing_input_is_benign() {
    let dir = tempfile::tempdir().unwrap();
    let err = extract_debug_bundle(
        &dir.path().join("absent.o"),
        &dir.path().join("absent.dbg.o"),
    )
    .unwrap_err();
    assert!(matches!(err, ExtractError::Unreadable { .. }));
    assert!(err.is_benign());
}

#[test]
fn unmapped_relocation_type_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("got.o");
    let output = dir.path().join("got.dbg.o");
    fs::write(
        &input,
        common::debug_object(Architecture::X86_64, &[elf::R_X86_64_GOTPCREL]),
    )
    .unwrap();

    let err = extract_debug_bundle(&input, &output).unwrap_err();
    match err {
        ExtractError::UnsupportedRelocation { r_type, .. } => {
            assert_eq!(r_type, elf::R_X86_64_GOTPCREL);
        }
        other => panic!("expected UnsupportedRelocation, got {other}"),
    }
}

#[test]
fn unmapped_relocation_is_not_benign() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plt.o");
    let output = dir.path().join("plt.dbg.o");
    fs::write(
        &input,
        common::debug_object(Architecture::X86_64, &[elf::R_X86_64_PLT32]),
    )
    .unwrap();

    let err = extract_debug_bundle(&input, &output).unwrap_err();
    assert!(!err.is_benign());
}

#[test]
fn wrong_source_architecture_violates_the_copy_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("arm.o");
    let output = dir.path().join("arm.dbg.o");
    fs::write(&input, common::debug_object(Architecture::Aarch64, &[])).unwrap();

    let err = extract_debug_bundle(&input, &output).unwrap_err();
    assert!(matches!(err, ExtractError::Invariant { .. }));
    assert!(!err.is_benign());
}

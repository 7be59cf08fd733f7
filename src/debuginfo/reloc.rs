//! Relocation-type translation from the host space to the device space.
//!
//! Debug bundles are copied out of host x86-64 objects but travel with a
//! RISC-V device image, so every relocation record in the bundle has its
//! type rewritten through this fixed table. There is no silent default:
//! a type outside the table must surface as an error at the call site.

use object::elf;

/// Map an x86-64 relocation type to its RISC-V equivalent.
///
/// Returns `None` for any type the table does not cover.
pub fn retarget(r_type: u32) -> Option<u32> {
    match r_type {
        elf::R_X86_64_NONE => Some(elf::R_RISCV_NONE),
        // Absolute 32-bit, signed or zero-extended.
        elf::R_X86_64_32 | elf::R_X86_64_32S => Some(elf::R_RISCV_32),
        elf::R_X86_64_PC32 => Some(elf::R_RISCV_32_PCREL),
        elf::R_X86_64_64 => Some(elf::R_RISCV_64),
        elf::R_X86_64_RELATIVE => Some(elf::R_RISCV_RELATIVE),
        _ => None,
    }
}

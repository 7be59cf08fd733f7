//! Synthetic ELF builders shared by the integration tests.

#![allow(dead_code)]

use object::write::{Object, Relocation, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, RelocationFlags, SectionKind, SymbolFlags, SymbolKind,
    SymbolScope,
};

/// Recognizable payload for byte-for-byte comparisons.
pub const INFO_PAYLOAD: &[u8] = &[0xD1; 48];
pub const ABBREV_PAYLOAD: &[u8] = &[0xA2; 16];

/// A host object with code but no embedded debug payload.
pub fn plain_object() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.set_section_data(text, vec![0xC3], 1);
    obj.write().unwrap()
}

/// A host object carrying the embedded-IR debug payload, with one
/// relocation of each given type on the info section (offset `i * 8`,
/// addend `i`), all against a named anchor symbol.
pub fn debug_object(arch: Architecture, reloc_types: &[u32]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, arch, Endianness::Little);

    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.set_section_data(text, vec![0xC3], 1);

    let info = obj.add_section(
        Vec::new(),
        b".gnu.debuglto_.debug_info".to_vec(),
        SectionKind::Debug,
    );
    obj.set_section_data(info, INFO_PAYLOAD.to_vec(), 1);

    let abbrev = obj.add_section(
        Vec::new(),
        b".gnu.debuglto_.debug_abbrev".to_vec(),
        SectionKind::Debug,
    );
    obj.set_section_data(abbrev, ABBREV_PAYLOAD.to_vec(), 1);

    let anchor = obj.add_symbol(Symbol {
        name: b"payload_anchor".to_vec(),
        value: 0,
        size: 0,
        kind: SymbolKind::Data,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Undefined,
        flags: SymbolFlags::None,
    });

    for (index, &r_type) in reloc_types.iter().enumerate() {
        obj.add_relocation(
            info,
            Relocation {
                offset: (index * 8) as u64,
                symbol: anchor,
                addend: index as i64,
                flags: RelocationFlags::Elf { r_type },
            },
        )
        .unwrap();
    }

    obj.write().unwrap()
}

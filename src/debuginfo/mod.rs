//! Debug payload extraction.
//!
//! Host objects compiled for offload carry their early debug information
//! in sections prefixed with the embedded-IR marker. Extraction copies
//! those sections byte-for-byte into a standalone bundle object, then
//! re-opens the bundle and rewrites every relocation record from the host
//! relocation space into the device space (see [`reloc`]).
//!
//! Absence of the payload is an expected outcome and reports as a benign
//! error; a bundle that turns out structurally inconsistent after the
//! copy, or a relocation type with no device equivalent, is not.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use object::elf;
use object::read::elf::FileHeader as _;
use object::write;
use object::{
    BinaryFormat, File, LittleEndian, Object, ObjectSection, ObjectSymbol, RelocationFlags,
    RelocationTarget, SectionIndex, SectionKind, SymbolFlags, SymbolIndex, SymbolKind,
    SymbolScope,
};
use thiserror::Error;

pub mod reloc;

/// Marker section that must be present for an object to carry a payload.
pub const PAYLOAD_MARKER_SECTION: &str = ".gnu.debuglto_.debug_info";

/// Prefix selecting the debug-info-bearing sections of the payload.
const PAYLOAD_SECTION_PREFIX: &str = ".gnu.debuglto_.debug";

/// Prefix stripped from section names when they move into the bundle.
const PAYLOAD_NAME_PREFIX: &str = ".gnu.debuglto_";

/// Errors from debug bundle extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot read '{path}': {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("'{path}' is not a recognizable object container: {source}")]
    NotAnObject {
        path: PathBuf,
        source: object::read::Error,
    },

    #[error("no debug payload in '{path}'")]
    DebugAbsent { path: PathBuf },

    #[error("inconsistent debug payload in '{path}': {detail}")]
    Malformed { path: PathBuf, detail: String },

    #[error("cannot write debug bundle '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("debug bundle '{path}' failed validation after the copy: {reason}")]
    Invariant { path: PathBuf, reason: String },

    #[error(
        "relocation type {r_type:#x} at {section}+{offset:#x} has no device equivalent"
    )]
    UnsupportedRelocation {
        r_type: u32,
        section: String,
        offset: u64,
    },
}

impl ExtractError {
    /// Benign failures mean "this object contributes no bundle" and the
    /// pipeline moves on. The rest indicate a tooling bug and abort the
    /// run.
    pub fn is_benign(&self) -> bool {
        !matches!(
            self,
            ExtractError::Invariant { .. } | ExtractError::UnsupportedRelocation { .. }
        )
    }
}

/// What a successful extraction produced, for logging.
#[derive(Debug, Clone, Copy)]
pub struct ExtractSummary {
    pub debug_bytes: u64,
    pub rela_sections: usize,
    pub relocations: usize,
}

/// Extract the debug payload of `input_path` into a standalone bundle at
/// `output_path` and retarget its relocations.
///
/// Exactly one output file is created, and only on success; every
/// failure path leaves no file behind. Paths are not registered anywhere
/// here, the caller owns that.
pub fn extract_debug_bundle(
    input_path: &Path,
    output_path: &Path,
) -> Result<ExtractSummary, ExtractError> {
    let data = fs::read(input_path).map_err(|source| ExtractError::Unreadable {
        path: input_path.to_path_buf(),
        source,
    })?;
    let input = File::parse(&*data).map_err(|source| ExtractError::NotAnObject {
        path: input_path.to_path_buf(),
        source,
    })?;

    if input.section_by_name(PAYLOAD_MARKER_SECTION).is_none() {
        return Err(ExtractError::DebugAbsent {
            path: input_path.to_path_buf(),
        });
    }

    let (bundle, debug_bytes) = build_bundle(input_path, &input)?;
    fs::write(output_path, &bundle).map_err(|source| {
        // A partially written bundle must not survive.
        let _ = fs::remove_file(output_path);
        ExtractError::Write {
            path: output_path.to_path_buf(),
            source,
        }
    })?;

    let (rela_sections, relocations) = match retarget_relocations(output_path) {
        Ok(counts) => counts,
        Err(err) => {
            // The bundle failed validation; nothing downstream may use it.
            let _ = fs::remove_file(output_path);
            return Err(err);
        }
    };
    Ok(ExtractSummary {
        debug_bytes,
        rela_sections,
        relocations,
    })
}

fn malformed(path: &Path, detail: impl Into<String>) -> ExtractError {
    ExtractError::Malformed {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn invariant(path: &Path, reason: impl Into<String>) -> ExtractError {
    ExtractError::Invariant {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Copy the payload sections and their relocation records into a fresh
/// container, preserving the input's architecture so the validation pass
/// can check it. Returns the serialized bundle and the payload byte count.
fn build_bundle(input_path: &Path, input: &File) -> Result<(Vec<u8>, u64), ExtractError> {
    let mut out = write::Object::new(BinaryFormat::Elf, input.architecture(), input.endianness());
    let mut section_map: HashMap<SectionIndex, write::SectionId> = HashMap::new();
    let mut debug_bytes = 0u64;

    for section in input.sections() {
        let name = section
            .name()
            .map_err(|err| malformed(input_path, format!("unreadable section name: {err}")))?;
        if !name.starts_with(PAYLOAD_SECTION_PREFIX) {
            continue;
        }
        let bundle_name = name.strip_prefix(PAYLOAD_NAME_PREFIX).unwrap_or(name);
        let data = section
            .data()
            .map_err(|err| malformed(input_path, format!("unreadable section '{name}': {err}")))?;
        let id = out.add_section(
            Vec::new(),
            bundle_name.as_bytes().to_vec(),
            SectionKind::Debug,
        );
        out.set_section_data(id, data.to_vec(), section.align().max(1));
        debug_bytes += data.len() as u64;
        section_map.insert(section.index(), id);
    }

    let mut symbol_map: HashMap<SymbolIndex, write::SymbolId> = HashMap::new();
    for (&in_index, &out_section) in &section_map {
        let section = input
            .section_by_index(in_index)
            .map_err(|err| malformed(input_path, format!("lost section {in_index:?}: {err}")))?;
        for (offset, relocation) in section.relocations() {
            let r_type = match relocation.flags() {
                RelocationFlags::Elf { r_type } => r_type,
                other => {
                    return Err(malformed(
                        input_path,
                        format!("unexpected relocation flavor {other:?}"),
                    ))
                }
            };
            let symbol = map_relocation_target(
                input_path,
                input,
                &mut out,
                &section_map,
                &mut symbol_map,
                relocation.target(),
            )?;
            out.add_relocation(
                out_section,
                write::Relocation {
                    offset,
                    symbol,
                    addend: relocation.addend(),
                    flags: RelocationFlags::Elf { r_type },
                },
            )
            .map_err(|err| malformed(input_path, format!("cannot carry relocation: {err}")))?;
        }
    }

    let bundle = out
        .write()
        .map_err(|err| malformed(input_path, format!("cannot serialize bundle: {err}")))?;
    Ok((bundle, debug_bytes))
}

/// Map the symbol a relocation refers to into the bundle's symbol table.
///
/// Section symbols of copied sections stay section symbols; every other
/// reference becomes an undefined symbol of the same name, since the
/// defining sections do not travel with the bundle.
fn map_relocation_target(
    input_path: &Path,
    input: &File,
    out: &mut write::Object,
    section_map: &HashMap<SectionIndex, write::SectionId>,
    symbol_map: &mut HashMap<SymbolIndex, write::SymbolId>,
    target: RelocationTarget,
) -> Result<write::SymbolId, ExtractError> {
    match target {
        RelocationTarget::Symbol(index) => {
            if let Some(&id) = symbol_map.get(&index) {
                return Ok(id);
            }
            let symbol = input
                .symbol_by_index(index)
                .map_err(|err| malformed(input_path, format!("dangling symbol: {err}")))?;
            let id = if symbol.kind() == SymbolKind::Section {
                match symbol
                    .section_index()
                    .and_then(|section| section_map.get(&section).copied())
                {
                    Some(out_section) => out.section_symbol(out_section),
                    None => undefined_anchor(out),
                }
            } else {
                out.add_symbol(write::Symbol {
                    name: symbol
                        .name_bytes()
                        .map_err(|err| malformed(input_path, format!("unnamed symbol: {err}")))?
                        .to_vec(),
                    value: 0,
                    size: 0,
                    kind: symbol.kind(),
                    scope: SymbolScope::Linkage,
                    weak: symbol.is_weak(),
                    section: write::SymbolSection::Undefined,
                    flags: SymbolFlags::None,
                })
            };
            symbol_map.insert(index, id);
            Ok(id)
        }
        RelocationTarget::Section(section) => Ok(match section_map.get(&section).copied() {
            Some(out_section) => out.section_symbol(out_section),
            None => undefined_anchor(out),
        }),
        _ => Ok(undefined_anchor(out)),
    }
}

/// Nameless undefined placeholder for references the bundle cannot carry.
fn undefined_anchor(out: &mut write::Object) -> write::SymbolId {
    out.add_symbol(write::Symbol {
        name: Vec::new(),
        value: 0,
        size: 0,
        kind: SymbolKind::Unknown,
        scope: SymbolScope::Linkage,
        weak: false,
        section: write::SymbolSection::Undefined,
        flags: SymbolFlags::None,
    })
}

/// Re-open the freshly written bundle, check the recorded machine against
/// the expected host architecture, and rewrite every relocation record in
/// every RELA section through the device mapping table.
fn retarget_relocations(path: &Path) -> Result<(usize, usize), ExtractError> {
    let mut data = fs::read(path)
        .map_err(|source| invariant(path, format!("cannot reopen bundle: {source}")))?;

    let mut patches: Vec<(usize, u64)> = Vec::new();
    let mut rela_sections = 0usize;
    {
        let header = elf::FileHeader64::<LittleEndian>::parse(&*data)
            .map_err(|err| invariant(path, format!("unparsable container: {err}")))?;
        let endian = header
            .endian()
            .map_err(|err| invariant(path, format!("{err}")))?;
        let machine = header.e_machine.get(endian);
        if machine != elf::EM_X86_64 {
            return Err(invariant(
                path,
                format!("machine {machine:#06x} is not the expected host architecture"),
            ));
        }

        let sections = header
            .sections(endian, &*data)
            .map_err(|err| invariant(path, format!("unreadable section table: {err}")))?;
        for (index, section) in sections.iter().enumerate() {
            if section.sh_type.get(endian) != elf::SHT_RELA {
                continue;
            }
            rela_sections += 1;

            let offset = section.sh_offset.get(endian) as usize;
            let size = section.sh_size.get(endian) as usize;
            let entsize = section.sh_entsize.get(endian) as usize;
            if entsize != mem::size_of::<elf::Rela64<LittleEndian>>() {
                return Err(invariant(
                    path,
                    format!("relocation entry size {entsize} in section {index}"),
                ));
            }
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    invariant(path, format!("relocation section {index} exceeds the container"))
                })?;
            let name = sections
                .section_name(endian, section)
                .map(|raw| String::from_utf8_lossy(raw).into_owned())
                .unwrap_or_else(|_| format!("#{index}"));

            let mut at = offset;
            while at + entsize <= end {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[at + 8..at + 16]);
                let info = u64::from_le_bytes(raw);
                let r_sym = info >> 32;
                let r_type = info as u32;
                let device_type =
                    reloc::retarget(r_type).ok_or(ExtractError::UnsupportedRelocation {
                        r_type,
                        section: name.clone(),
                        offset: (at - offset) as u64,
                    })?;
                patches.push((at + 8, (r_sym << 32) | u64::from(device_type)));
                at += entsize;
            }
        }
    }

    let relocations = patches.len();
    for (at, info) in patches {
        data[at..at + 8].copy_from_slice(&info.to_le_bytes());
    }
    fs::write(path, &data)
        .map_err(|source| invariant(path, format!("cannot rewrite bundle: {source}")))?;

    Ok((rela_sections, relocations))
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::section_header::SHT_NOBITS;
use goblin::elf::{Elf, Sym};
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};
use ulpboot_core::{Granularity, ProgramImage};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Symbols tried, in order, for the co-processor entry point.
pub const ENTRY_SYMBOLS: [&str; 2] = ["entry", "ulp_entry"];

/// Largest span of loadable segments accepted as one program image.
const MAX_IMAGE_SPAN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub symbol: String,
    /// Byte offset from the base of co-processor memory.
    pub byte_offset: u64,
}

impl EntryPoint {
    /// Offset expressed in the co-processor's addressing units.
    pub fn offset_for(&self, granularity: Granularity) -> u32 {
        let units = self.byte_offset / granularity.unit_bytes() as u64;
        u32::try_from(units).unwrap_or(u32::MAX)
    }

    /// Entry relative to the base of co-processor memory once the program is
    /// loaded at `load_slot`. Byte-addressed programs always sit at slot 0.
    pub fn offset_at(&self, granularity: Granularity, load_slot: u32) -> u32 {
        let base = match granularity {
            Granularity::Word => load_slot,
            Granularity::Byte => 0,
        };
        self.offset_for(granularity).saturating_add(base)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: ProgramImage,
    pub entry: Option<EntryPoint>,
}

pub fn is_elf(buffer: &[u8]) -> bool {
    buffer.starts_with(ELF_MAGIC)
}

/// Reads a program image: a co-processor ELF, or anything else as raw bytes.
pub fn load_image(path: &Path) -> Result<LoadedImage> {
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read program image: {:?}", path))?;
    load_image_bytes(buffer)
}

pub fn load_image_bytes(buffer: Vec<u8>) -> Result<LoadedImage> {
    if is_elf(&buffer) {
        return load_elf_bytes(&buffer);
    }
    info!("Raw program image: {} bytes", buffer.len());
    Ok(LoadedImage {
        image: ProgramImage::from_bytes(buffer),
        entry: None,
    })
}

/// Flattens the loadable segments of a co-processor ELF into one contiguous
/// image starting at the lowest load address. Gaps are zero-filled.
pub fn load_elf_bytes(buffer: &[u8]) -> Result<LoadedImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    let mut segments = Vec::new();
    for ph in &elf.program_headers {
        if ph.p_type != PT_LOAD || ph.p_filesz == 0 {
            continue;
        }
        let offset = ph.p_offset as usize;
        let size = ph.p_filesz as usize;
        debug!(
            "Found Loadable Segment: Addr={:#x}, Size={} bytes, Offset={:#x}",
            ph.p_paddr, size, offset
        );
        let data = offset
            .checked_add(size)
            .and_then(|end| buffer.get(offset..end))
            .ok_or_else(|| anyhow!("Segment out of bounds in ELF file"))?;
        segments.push((ph.p_paddr, segment_end(ph.p_paddr, size)?, data));
    }

    if segments.is_empty() {
        bail!("No loadable segments found in ELF file");
    }
    segments.sort_by_key(|(addr, _, _)| *addr);

    let start = segments[0].0;
    let end = segments
        .iter()
        .map(|(_, end, _)| *end)
        .max()
        .unwrap_or(start);
    if end - start > MAX_IMAGE_SPAN {
        bail!(
            "Loadable segments span {:#x}..{:#x}, too wide for a co-processor image",
            start,
            end
        );
    }

    let mut data = vec![0u8; (end - start) as usize];
    let mut cursor = start;
    for (addr, seg_end, bytes) in &segments {
        if *addr < cursor {
            warn!("Segment at {:#x} overlaps the previous one", addr);
        }
        let at = (addr - start) as usize;
        data[at..at + bytes.len()].copy_from_slice(bytes);
        cursor = cursor.max(*seg_end);
    }

    let image = ProgramImage::new(start, end, data)?;
    let entry = resolve_entry(&elf);
    match &entry {
        Some(e) => info!("ULP entry '{}' at byte offset {:#x}", e.symbol, e.byte_offset),
        None => warn!("No entry symbol ({}) in ELF", ENTRY_SYMBOLS.join(", ")),
    }
    Ok(LoadedImage { image, entry })
}

/// Address one past the last byte of a segment loaded at `addr`.
fn segment_end(addr: u64, len: usize) -> Result<u64> {
    addr.checked_add(len as u64)
        .ok_or_else(|| anyhow!("Segment at {:#x} wraps the address space", addr))
}

/// File range backing `start..end` inside a section mapped at `sh_addr`
/// whose `sh_size` bytes start at file offset `sh_offset`.
fn blob_file_range(
    start: u64,
    end: u64,
    sh_addr: u64,
    sh_size: u64,
    sh_offset: u64,
) -> Result<Range<usize>> {
    let section_end = sh_addr
        .checked_add(sh_size)
        .ok_or_else(|| anyhow!("Section at {:#x} wraps the address space", sh_addr))?;
    if start < sh_addr || end < start || end > section_end {
        bail!(
            "Blob {:#x}..{:#x} is outside its section {:#x}..{:#x}",
            start,
            end,
            sh_addr,
            section_end
        );
    }
    let file_start = sh_offset
        .checked_add(start - sh_addr)
        .ok_or_else(|| anyhow!("Blob file offset overflows"))?;
    let file_end = file_start
        .checked_add(end - start)
        .ok_or_else(|| anyhow!("Blob file offset overflows"))?;
    Ok(usize::try_from(file_start)?..usize::try_from(file_end)?)
}

fn find_symbol(elf: &Elf, name: &str) -> Option<Sym> {
    elf.syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
}

fn resolve_entry(elf: &Elf) -> Option<EntryPoint> {
    ENTRY_SYMBOLS.iter().find_map(|name| {
        find_symbol(elf, name).map(|sym| EntryPoint {
            symbol: name.to_string(),
            byte_offset: sym.st_value,
        })
    })
}

/// Returns the bytes between `_binary_<stem>_start` and `_binary_<stem>_end`
/// in a host ELF, the markers a linker emits for an embedded binary file.
pub fn extract_linked_blob(buffer: &[u8], stem: &str) -> Result<ProgramImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    let start_name = format!("_binary_{}_start", stem);
    let end_name = format!("_binary_{}_end", stem);
    let start = find_symbol(&elf, &start_name)
        .ok_or_else(|| anyhow!("Symbol '{}' not found", start_name))?;
    let end =
        find_symbol(&elf, &end_name).ok_or_else(|| anyhow!("Symbol '{}' not found", end_name))?;

    if end.st_value < start.st_value {
        bail!(
            "'{}' ({:#x}) lies before '{}' ({:#x})",
            end_name,
            end.st_value,
            start_name,
            start.st_value
        );
    }

    let section = elf
        .section_headers
        .get(start.st_shndx)
        .ok_or_else(|| anyhow!("'{}' has no containing section", start_name))?;
    if section.sh_type == SHT_NOBITS {
        bail!("'{}' points into a section without file data", start_name);
    }

    let range = blob_file_range(
        start.st_value,
        end.st_value,
        section.sh_addr,
        section.sh_size,
        section.sh_offset,
    )?;
    let len = range.len();
    let bytes = buffer
        .get(range)
        .ok_or_else(|| anyhow!("Blob '{}' is out of bounds in ELF file", stem))?;

    info!("Linked blob '{}': {} bytes at {:#x}", stem, len, start.st_value);
    Ok(ProgramImage::new(start.st_value, end.st_value, bytes.to_vec())?)
}

pub fn load_linked_blob(path: &Path, stem: &str) -> Result<LoadedImage> {
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read host ELF: {:?}", path))?;
    let image = extract_linked_blob(&buffer, stem)?;
    Ok(LoadedImage { image, entry: None })
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fs;
use ulpboot_core::Granularity;
use ulpboot_loader::{extract_linked_blob, load_image, load_image_bytes, load_linked_blob};

/// Minimal little-endian ELF32 writer: one PT_LOAD segment and one PROGBITS
/// section per chunk, plus symtab, strtab and shstrtab.
struct ElfBuilder {
    chunks: Vec<(u32, Vec<u8>)>,
    symbols: Vec<(String, u32, u16)>,
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn add_name(table: &mut Vec<u8>, name: &str) -> u32 {
    let at = table.len() as u32;
    table.extend_from_slice(name.as_bytes());
    table.push(0);
    at
}

fn align4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

#[allow(clippy::too_many_arguments)]
fn section_header(
    out: &mut Vec<u8>,
    name: u32,
    kind: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
    info: u32,
    entsize: u32,
) {
    put32(out, name);
    put32(out, kind);
    put32(out, if kind == 1 { 0x3 } else { 0 }); // SHF_WRITE | SHF_ALLOC
    put32(out, addr);
    put32(out, offset);
    put32(out, size);
    put32(out, link);
    put32(out, info);
    put32(out, 4);
    put32(out, entsize);
}

impl ElfBuilder {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            symbols: Vec::new(),
        }
    }

    fn chunk(mut self, addr: u32, data: &[u8]) -> Self {
        self.chunks.push((addr, data.to_vec()));
        self
    }

    /// `section` is the 1-based index of the chunk the symbol lives in.
    fn symbol(mut self, name: &str, value: u32, section: u16) -> Self {
        self.symbols.push((name.to_string(), value, section));
        self
    }

    fn build(&self) -> Vec<u8> {
        const EHDR: usize = 52;
        const PHDR: usize = 32;
        let n = self.chunks.len();

        let mut body = Vec::new();
        let data_base = EHDR + PHDR * n;
        let mut chunk_offsets = Vec::new();
        for (_, data) in &self.chunks {
            chunk_offsets.push((data_base + body.len()) as u32);
            body.extend_from_slice(data);
            align4(&mut body);
        }

        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; 16];
        for (name, value, shndx) in &self.symbols {
            let name_at = add_name(&mut strtab, name);
            put32(&mut symtab, name_at);
            put32(&mut symtab, *value);
            put32(&mut symtab, 0);
            symtab.push(0x10); // STB_GLOBAL, STT_NOTYPE
            symtab.push(0);
            put16(&mut symtab, *shndx);
        }

        let mut shstrtab = vec![0u8];
        let data_name = add_name(&mut shstrtab, ".data");
        let symtab_name = add_name(&mut shstrtab, ".symtab");
        let strtab_name = add_name(&mut shstrtab, ".strtab");
        let shstrtab_name = add_name(&mut shstrtab, ".shstrtab");

        let symtab_off = (data_base + body.len()) as u32;
        body.extend_from_slice(&symtab);
        let strtab_off = (data_base + body.len()) as u32;
        body.extend_from_slice(&strtab);
        let shstrtab_off = (data_base + body.len()) as u32;
        body.extend_from_slice(&shstrtab);
        align4(&mut body);
        let shoff = (data_base + body.len()) as u32;

        let symtab_idx = n as u32 + 1;
        let strtab_idx = symtab_idx + 1;
        let shstrtab_idx = strtab_idx + 1;
        let shnum = shstrtab_idx + 1;

        let mut out = Vec::new();
        out.extend_from_slice(b"\x7fELF");
        out.extend_from_slice(&[1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        put16(&mut out, 2); // ET_EXEC
        put16(&mut out, 0xf3); // EM_RISCV
        put32(&mut out, 1);
        put32(&mut out, 0);
        put32(&mut out, EHDR as u32);
        put32(&mut out, shoff);
        put32(&mut out, 0);
        put16(&mut out, EHDR as u16);
        put16(&mut out, PHDR as u16);
        put16(&mut out, n as u16);
        put16(&mut out, 40);
        put16(&mut out, shnum as u16);
        put16(&mut out, shstrtab_idx as u16);

        for ((addr, data), offset) in self.chunks.iter().zip(&chunk_offsets) {
            put32(&mut out, 1); // PT_LOAD
            put32(&mut out, *offset);
            put32(&mut out, *addr);
            put32(&mut out, *addr);
            put32(&mut out, data.len() as u32);
            put32(&mut out, data.len() as u32);
            put32(&mut out, 0x6);
            put32(&mut out, 4);
        }

        out.extend_from_slice(&body);

        out.extend_from_slice(&[0u8; 40]);
        for ((addr, data), offset) in self.chunks.iter().zip(&chunk_offsets) {
            section_header(&mut out, data_name, 1, *addr, *offset, data.len() as u32, 0, 0, 0);
        }
        section_header(
            &mut out,
            symtab_name,
            2,
            0,
            symtab_off,
            symtab.len() as u32,
            strtab_idx,
            1,
            16,
        );
        section_header(&mut out, strtab_name, 3, 0, strtab_off, strtab.len() as u32, 0, 0, 0);
        section_header(
            &mut out,
            shstrtab_name,
            3,
            0,
            shstrtab_off,
            shstrtab.len() as u32,
            0,
            0,
            0,
        );
        out
    }
}

#[test]
fn test_elf_segments_flattened_with_gap() {
    let elf = ElfBuilder::new()
        .chunk(0x0, &[1, 2, 3, 4])
        .chunk(0x8, &[9, 9, 9, 9])
        .build();

    let loaded = load_image_bytes(elf).unwrap();
    assert_eq!(loaded.image.start_addr(), 0);
    assert_eq!(loaded.image.end_addr(), 0xc);
    assert_eq!(loaded.image.bytes(), &[1, 2, 3, 4, 0, 0, 0, 0, 9, 9, 9, 9]);
    assert!(loaded.entry.is_none());
}

#[test]
fn test_entry_symbol_preferred_over_fallback() {
    let elf = ElfBuilder::new()
        .chunk(0x0, &[0u8; 32])
        .symbol("ulp_entry", 0x10, 1)
        .symbol("entry", 0x18, 1)
        .build();

    let entry = load_image_bytes(elf).unwrap().entry.unwrap();
    assert_eq!(entry.symbol, "entry");
    assert_eq!(entry.byte_offset, 0x18);
    assert_eq!(entry.offset_for(Granularity::Word), 6);
}

#[test]
fn test_ulp_entry_fallback() {
    let elf = ElfBuilder::new()
        .chunk(0x0, &[0u8; 16])
        .symbol("ulp_entry", 0x8, 1)
        .build();

    let entry = load_image_bytes(elf).unwrap().entry.unwrap();
    assert_eq!(entry.symbol, "ulp_entry");
    assert_eq!(entry.offset_for(Granularity::Word), 2);
}

#[test]
fn test_extract_linked_blob() {
    let mut data = vec![0xee; 4];
    data.extend_from_slice(&[0x75, 0x6c, 0x70, 0x00, 0x0c, 0x00]);
    data.extend_from_slice(&[0xee; 2]);
    let host = ElfBuilder::new()
        .chunk(0x3f40_0000, &data)
        .symbol("_binary_asm_main_bin_start", 0x3f40_0004, 1)
        .symbol("_binary_asm_main_bin_end", 0x3f40_000a, 1)
        .build();

    let blob = extract_linked_blob(&host, "asm_main_bin").unwrap();
    assert_eq!(blob.bytes(), &[0x75, 0x6c, 0x70, 0x00, 0x0c, 0x00]);
    assert_eq!(blob.start_addr(), 0x3f40_0004);
    assert_eq!(blob.len(), 6);
}

#[test]
fn test_linked_blob_may_be_empty() {
    let host = ElfBuilder::new()
        .chunk(0x1000, &[0u8; 8])
        .symbol("_binary_ulp_bin_start", 0x1004, 1)
        .symbol("_binary_ulp_bin_end", 0x1004, 1)
        .build();

    let blob = extract_linked_blob(&host, "ulp_bin").unwrap();
    assert!(blob.is_empty());
}

#[test]
fn test_linked_blob_missing_marker() {
    let host = ElfBuilder::new()
        .chunk(0x1000, &[0u8; 8])
        .symbol("_binary_ulp_bin_start", 0x1000, 1)
        .build();

    let err = extract_linked_blob(&host, "ulp_bin").unwrap_err();
    assert!(err.to_string().contains("_binary_ulp_bin_end"));
}

#[test]
fn test_linked_blob_inverted_markers() {
    let host = ElfBuilder::new()
        .chunk(0x1000, &[0u8; 8])
        .symbol("_binary_ulp_bin_start", 0x1006, 1)
        .symbol("_binary_ulp_bin_end", 0x1002, 1)
        .build();

    let err = extract_linked_blob(&host, "ulp_bin").unwrap_err();
    assert!(err.to_string().contains("lies before"));
}

#[test]
fn test_linked_blob_outside_section() {
    let host = ElfBuilder::new()
        .chunk(0x1000, &[0u8; 8])
        .symbol("_binary_ulp_bin_start", 0x1004, 1)
        .symbol("_binary_ulp_bin_end", 0x1010, 1)
        .build();

    assert!(extract_linked_blob(&host, "ulp_bin").is_err());
}

#[test]
fn test_load_from_files() {
    let dir = std::env::temp_dir().join(format!("ulpboot_loader_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let raw = dir.join("ulp.bin");
    fs::write(&raw, [0x13, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(load_image(&raw).unwrap().image.len(), 4);

    let host = dir.join("app.elf");
    fs::write(
        &host,
        ElfBuilder::new()
            .chunk(0x400, &[7u8; 8])
            .symbol("_binary_ulp_bin_start", 0x400, 1)
            .symbol("_binary_ulp_bin_end", 0x408, 1)
            .build(),
    )
    .unwrap();
    let loaded = load_linked_blob(&host, "ulp_bin").unwrap();
    assert_eq!(loaded.image.bytes(), &[7u8; 8]);

    assert!(load_image(&dir.join("missing.bin")).is_err());
    fs::remove_dir_all(&dir).ok();
}

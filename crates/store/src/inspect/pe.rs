//! PE header, section and import extraction.

use std::ops::Range;

use litterbox_core::target::{ChecksumInfo, ImportedLibrary, PeInfo, SectionInfo, SuspiciousImport};
use object::pe::{self, ImageDosHeader, ImageNtHeaders32, ImageNtHeaders64};
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile};
use object::{FileKind, LittleEndian as LE, Object};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::apis;
use super::entropy::{round2, shannon};

const STANDARD_SECTIONS: &[&str] = &[
    ".text", ".data", ".bss", ".rdata", ".edata", ".idata", ".pdata", ".reloc", ".rsrc", ".tls",
    ".debug",
];

const GO_SECTIONS: &[&str] = &[".go.buildinfo", ".go.plt"];

const GO_MARKERS: &[&[u8]] = &[b"runtime.main", b"go.buildid", b"Go build ID:", b"runtime.gopanic"];

/// Offset of `CheckSum` inside the optional header, the same for PE32 and PE32+.
const CHECKSUM_FIELD_OFFSET: usize = 64;

/// Start of the data directories inside the optional header.
const DATA_DIRECTORIES_PE32: usize = 96;
const DATA_DIRECTORIES_PE64: usize = 112;

/// Parse PE metadata, or `None` if `data` is not a well-formed PE image.
pub fn inspect(data: &[u8]) -> Option<PeInfo> {
    let parsed = match FileKind::parse(data) {
        Ok(FileKind::Pe32) => parse_image::<ImageNtHeaders32>(data, "PE32"),
        Ok(FileKind::Pe64) => parse_image::<ImageNtHeaders64>(data, "PE32+"),
        _ => return None,
    };
    parsed
        .map_err(|e| debug!(error = %e, "PE header parse failed"))
        .ok()
}

fn parse_image<Pe: ImageNtHeaders>(data: &[u8], format: &str) -> object::Result<PeInfo> {
    let file = PeFile::<Pe, &[u8]>::parse(data)?;
    let header = file.nt_headers().file_header();
    let optional = file.nt_headers().optional_header();

    let characteristics = header.characteristics.get(LE);
    let subsystem = optional.subsystem();
    let is_driver = matches!(
        subsystem,
        pe::IMAGE_SUBSYSTEM_NATIVE
            | pe::IMAGE_SUBSYSTEM_EFI_BOOT_SERVICE_DRIVER
            | pe::IMAGE_SUBSYSTEM_EFI_RUNTIME_DRIVER
    ) || characteristics & pe::IMAGE_FILE_SYSTEM != 0;

    let sections: Vec<SectionInfo> = file
        .section_table()
        .iter()
        .map(|section| {
            let name = section_name(&section.name);
            let entropy = section.pe_data(data).map(shannon).unwrap_or(0.0);
            SectionInfo {
                is_standard: STANDARD_SECTIONS.contains(&name.as_str()),
                name,
                virtual_size: u64::from(section.virtual_size.get(LE)),
                raw_size: u64::from(section.size_of_raw_data.get(LE)),
                entropy: round2(entropy),
                characteristics: section.characteristics.get(LE),
            }
        })
        .collect();

    let is_go_binary = sections.iter().any(|s| GO_SECTIONS.contains(&s.name.as_str()))
        || GO_MARKERS.iter().any(|m| contains(data, m));

    let imports = group_imports(&file).unwrap_or_else(|e| {
        warn!(error = %e, "malformed import table, keeping headers and sections only");
        Vec::new()
    });
    let suspicious_imports = imports
        .iter()
        .flat_map(|lib| {
            lib.functions.iter().filter_map(|function| {
                apis::category(function).map(|category| SuspiciousImport {
                    library: lib.name.clone(),
                    function: function.clone(),
                    category: category.to_owned(),
                })
            })
        })
        .collect();

    let stored = optional.check_sum();
    let nt_offset = ImageDosHeader::parse(data)?.nt_headers_offset() as usize;
    // "PE\0\0" signature plus the COFF file header precede the optional header.
    let optional_offset = nt_offset + 4 + 20;
    let checksum_offset = optional_offset + CHECKSUM_FIELD_OFFSET;
    let calculated = checksum(data, checksum_offset);

    let mut excluded = vec![checksum_offset..checksum_offset + 4];
    if optional.number_of_rva_and_sizes() as usize > pe::IMAGE_DIRECTORY_ENTRY_SECURITY {
        let directories = if file.is_64() {
            DATA_DIRECTORIES_PE64
        } else {
            DATA_DIRECTORIES_PE32
        };
        let entry = optional_offset + directories + 8 * pe::IMAGE_DIRECTORY_ENTRY_SECURITY;
        excluded.push(entry..entry + 8);
    }
    // The security directory holds a file offset, not an RVA.
    if let Some(dir) = file.data_directory(pe::IMAGE_DIRECTORY_ENTRY_SECURITY) {
        let start = dir.virtual_address.get(LE) as usize;
        let size = dir.size.get(LE) as usize;
        if size > 0 && start < data.len() {
            excluded.push(start..start.saturating_add(size));
        }
    }

    Ok(PeInfo {
        format: format.to_owned(),
        machine: machine_name(header.machine.get(LE)),
        subsystem,
        is_dll: characteristics & pe::IMAGE_FILE_DLL != 0,
        is_driver,
        is_go_binary,
        sections,
        imports,
        suspicious_imports,
        checksum: ChecksumInfo {
            stored,
            calculated,
            is_valid: stored == calculated,
        },
        authentihash: Some(authenticode_sha256(data, &excluded)),
    })
}

fn group_imports<'a, Pe: ImageNtHeaders>(
    file: &PeFile<'a, Pe, &'a [u8]>,
) -> object::Result<Vec<ImportedLibrary>> {
    let mut libraries: Vec<ImportedLibrary> = Vec::new();
    for import in file.imports()? {
        let library = String::from_utf8_lossy(import.library()).into_owned();
        let function = String::from_utf8_lossy(import.name()).into_owned();
        match libraries
            .iter_mut()
            .find(|l| l.name.eq_ignore_ascii_case(&library))
        {
            Some(entry) => entry.functions.push(function),
            None => libraries.push(ImportedLibrary {
                name: library,
                functions: vec![function],
            }),
        }
    }
    Ok(libraries)
}

fn section_name(raw: &[u8; 8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn machine_name(machine: u16) -> String {
    match machine {
        pe::IMAGE_FILE_MACHINE_I386 => "x86".to_owned(),
        pe::IMAGE_FILE_MACHINE_AMD64 => "x64".to_owned(),
        pe::IMAGE_FILE_MACHINE_ARMNT => "ARM".to_owned(),
        pe::IMAGE_FILE_MACHINE_ARM64 => "ARM64".to_owned(),
        other => format!("0x{other:x}"),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// SHA-256 over `data` with the `excluded` byte ranges left out.
///
/// With the CheckSum field, the certificate table directory entry and the
/// certificate data excluded this is the Authenticode image hash, which stays
/// the same when a file is signed or re-signed.
pub fn authenticode_sha256(data: &[u8], excluded: &[Range<usize>]) -> String {
    let mut ranges: Vec<Range<usize>> = excluded
        .iter()
        .map(|r| r.start.min(data.len())..r.end.min(data.len()))
        .collect();
    ranges.sort_by_key(|r| r.start);

    let mut hasher = Sha256::new();
    let mut pos = 0;
    for range in ranges {
        if range.start > pos {
            hasher.update(&data[pos..range.start]);
        }
        pos = pos.max(range.end);
    }
    if pos < data.len() {
        hasher.update(&data[pos..]);
    }
    hex::encode(hasher.finalize())
}

/// The PE image checksum: a 16-bit folded sum of the file's dwords, with the
/// checksum field itself skipped, plus the file length.
pub fn checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;
    for (i, chunk) in data.chunks(4).enumerate() {
        if i * 4 == checksum_offset {
            continue;
        }
        let mut dword = [0u8; 4];
        dword[..chunk.len()].copy_from_slice(chunk);
        sum += u64::from(u32::from_le_bytes(dword));
        sum = (sum & 0xffff_ffff) + (sum >> 32);
    }
    sum = (sum & 0xffff) + (sum >> 16);
    sum += sum >> 16;
    sum &= 0xffff;
    (sum + data.len() as u64) as u32
}

#[cfg(test)]
pub(crate) mod test_image {
    //! Hand-assembled PE32+ images for tests.

    pub const NT_OFFSET: usize = 0x40;
    pub const CHECKSUM_AT: usize = NT_OFFSET + 4 + 20 + 64;
    pub const SECURITY_ENTRY_AT: usize = NT_OFFSET + 4 + 20 + 112 + 8 * 4;
    const OPTIONAL_SIZE: usize = 240;
    const FILE_ALIGN: usize = 0x200;

    fn put16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put32(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// A PE32+ image with the given sections and no imports.
    pub fn build(characteristics: u16, subsystem: u16, sections: &[(&str, &[u8])]) -> Vec<u8> {
        let table_at = NT_OFFSET + 4 + 20 + OPTIONAL_SIZE;
        let headers_end = table_at + 40 * sections.len();
        let mut raw_at = headers_end.div_ceil(FILE_ALIGN) * FILE_ALIGN;

        let mut buf = vec![0u8; raw_at];
        buf[0..2].copy_from_slice(b"MZ");
        put32(&mut buf, 0x3C, NT_OFFSET as u32);
        buf[NT_OFFSET..NT_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let fh = NT_OFFSET + 4;
        put16(&mut buf, fh, 0x8664);
        put16(&mut buf, fh + 2, sections.len() as u16);
        put16(&mut buf, fh + 16, OPTIONAL_SIZE as u16);
        put16(&mut buf, fh + 18, characteristics | 0x0002);

        let oh = fh + 20;
        put16(&mut buf, oh, 0x20b);
        put32(&mut buf, oh + 32, 0x1000);
        put32(&mut buf, oh + 36, FILE_ALIGN as u32);
        put32(&mut buf, oh + 56, 0x1000 * (sections.len() as u32 + 1));
        put32(&mut buf, oh + 60, raw_at as u32);
        put16(&mut buf, oh + 68, subsystem);
        put32(&mut buf, oh + 108, 16);

        for (i, (name, data)) in sections.iter().enumerate() {
            let sh = table_at + 40 * i;
            let raw_size = data.len().div_ceil(FILE_ALIGN) * FILE_ALIGN;
            let name_bytes = name.as_bytes();
            buf[sh..sh + name_bytes.len().min(8)].copy_from_slice(&name_bytes[..name_bytes.len().min(8)]);
            put32(&mut buf, sh + 8, data.len() as u32);
            put32(&mut buf, sh + 12, 0x1000 * (i as u32 + 1));
            put32(&mut buf, sh + 16, raw_size as u32);
            put32(&mut buf, sh + 20, raw_at as u32);
            put32(&mut buf, sh + 36, 0x6000_0020);

            buf.extend_from_slice(data);
            buf.resize(raw_at + raw_size, 0);
            raw_at += raw_size;
        }
        buf
    }

    pub fn set_checksum(buf: &mut [u8], value: u32) {
        put32(buf, CHECKSUM_AT, value);
    }

    /// Append `certificate` as the attribute certificate table.
    pub fn sign(buf: &mut Vec<u8>, certificate: &[u8]) {
        let at = buf.len();
        buf.extend_from_slice(certificate);
        put32(buf, SECURITY_ENTRY_AT, at as u32);
        put32(buf, SECURITY_ENTRY_AT + 4, certificate.len() as u32);
    }

    /// Point the import directory (entry 1) at `rva` with `size` bytes.
    pub fn set_import_directory(buf: &mut [u8], rva: u32, size: u32) {
        let entry = NT_OFFSET + 4 + 20 + 112 + 8;
        put32(buf, entry, rva);
        put32(buf, entry + 4, size);
    }
}

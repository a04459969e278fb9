//! Analysis targets and the metadata captured when they are registered.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TargetId, TargetKind};

/// Coarse file family detected from magic bytes and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    PeExecutable,
    PeDll,
    Driver,
    Shortcut,
    OfficeDocument,
    Pdf,
    Script,
    Archive,
    Unknown,
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PeExecutable => "PE executable",
            Self::PeDll => "PE DLL",
            Self::Driver => "kernel driver",
            Self::Shortcut => "LNK shortcut",
            Self::OfficeDocument => "Office document",
            Self::Pdf => "PDF document",
            Self::Script => "script",
            Self::Archive => "archive",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One PE section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub name: String,
    pub virtual_size: u64,
    pub raw_size: u64,
    pub entropy: f64,
    pub characteristics: u32,
    /// Whether the name belongs to the set compilers normally emit.
    pub is_standard: bool,
}

/// Functions imported from one DLL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedLibrary {
    pub name: String,
    pub functions: Vec<String>,
}

/// An import that appears in the suspicious API table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousImport {
    pub library: String,
    pub function: String,
    pub category: String,
}

/// Stored versus recomputed PE checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    pub stored: u32,
    pub calculated: u32,
    pub is_valid: bool,
}

/// PE metadata extracted at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeInfo {
    /// "PE32" or "PE32+".
    pub format: String,
    pub machine: String,
    pub subsystem: u16,
    pub is_dll: bool,
    pub is_driver: bool,
    /// Built with the Go toolchain, whose linker leaves the checksum unset or stale.
    pub is_go_binary: bool,
    pub sections: Vec<SectionInfo>,
    pub imports: Vec<ImportedLibrary>,
    pub suspicious_imports: Vec<SuspiciousImport>,
    pub checksum: ChecksumInfo,
    /// Authenticode SHA-256, the hash driver block policies and LOLDrivers
    /// `Authentihash` entries are keyed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentihash: Option<String>,
}

impl PeInfo {
    /// Every imported function name across all libraries.
    pub fn imported_functions(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .flat_map(|lib| lib.functions.iter().map(String::as_str))
    }

    /// Whether a checksum mismatch should count against the binary.
    pub fn checksum_penalized(&self) -> bool {
        !self.checksum.is_valid && !self.is_go_binary
    }
}

/// A registered analysis target.
///
/// Immutable once created; removed only by an explicit delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTarget {
    pub id: TargetId,
    pub kind: TargetKind,
    /// Original filename, or the process image name.
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub category: FileCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Shannon entropy in bits per byte, rounded to two decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_info: Option<PeInfo>,
    /// Stored artifact file name relative to the upload directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisTarget {
    pub fn is_process(&self) -> bool {
        self.kind == TargetKind::Process
    }

    /// Whether a checksum mismatch on this target's PE image is penalized.
    pub fn checksum_penalized(&self) -> bool {
        self.pe_info
            .as_ref()
            .is_some_and(PeInfo::checksum_penalized)
    }
}

impl fmt::Display for AnalysisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.kind, self.id)
    }
}

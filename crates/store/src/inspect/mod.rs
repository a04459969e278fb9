//! Static metadata extracted from an artifact at registration time.

mod apis;
pub mod entropy;
pub mod filetype;
pub mod pe;

use litterbox_core::target::{FileCategory, PeInfo};
use sha2::{Digest, Sha256};

/// Everything [`inspect`] learns about an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub md5: String,
    pub sha256: String,
    pub entropy: f64,
    pub category: FileCategory,
    pub mime: &'static str,
    pub pe_info: Option<PeInfo>,
}

impl Inspection {
    /// Native kernel driver by header, or by a `.sys` name when the headers
    /// are unreadable.
    pub fn is_driver(&self) -> bool {
        self.category == FileCategory::Driver
    }
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash, sniff and (for PE files) parse `data`.
pub fn inspect(data: &[u8], filename: &str) -> Inspection {
    let (mut category, mime) = filetype::sniff(data, filename);
    let pe_info = if category == FileCategory::PeExecutable {
        pe::inspect(data)
    } else {
        None
    };

    if category == FileCategory::PeExecutable {
        category = match &pe_info {
            Some(info) if info.is_driver => FileCategory::Driver,
            Some(info) if info.is_dll => FileCategory::PeDll,
            _ if filetype::extension(filename) == "sys" => FileCategory::Driver,
            _ => FileCategory::PeExecutable,
        };
    }

    Inspection {
        md5: md5_hex(data),
        sha256: sha256_hex(data),
        entropy: entropy::round2(entropy::shannon(data)),
        category,
        mime,
        pe_info,
    }
}

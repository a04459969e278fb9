//! File family detection from magic bytes, falling back to the extension.

use litterbox_core::target::FileCategory;

const MZ: &[u8] = b"MZ";
const PDF: &[u8] = b"%PDF-";
const ZIP: &[u8] = b"PK\x03\x04";
const OLE: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";
const SEVEN_ZIP: &[u8] = b"7z\xBC\xAF\x27\x1C";
const RAR: &[u8] = b"Rar!\x1A\x07";
const GZIP: &[u8] = b"\x1F\x8B";
/// HeaderSize (0x4C) followed by the shell link CLSID.
const LNK: &[u8] = b"\x4C\x00\x00\x00\x01\x14\x02\x00\x00\x00\x00\x00\xC0\x00\x00\x00\x00\x00\x00\x46";

pub const MIME_PE: &str = "application/x-dosexec";
const MIME_UNKNOWN: &str = "application/octet-stream";

/// Category and mime type of an artifact. PE files come back as
/// [`FileCategory::PeExecutable`]; DLL and driver refinement needs the
/// parsed headers.
pub fn sniff(data: &[u8], filename: &str) -> (FileCategory, &'static str) {
    let ext = extension(filename);

    if data.starts_with(MZ) {
        return (FileCategory::PeExecutable, MIME_PE);
    }
    if data.starts_with(PDF) {
        return (FileCategory::Pdf, "application/pdf");
    }
    if data.starts_with(LNK) {
        return (FileCategory::Shortcut, "application/x-ms-shortcut");
    }
    if data.starts_with(OLE) {
        let mime = match ext.as_str() {
            "doc" | "dot" => "application/msword",
            "xls" | "xlt" => "application/vnd.ms-excel",
            "ppt" | "pot" => "application/vnd.ms-powerpoint",
            _ => "application/x-ole-storage",
        };
        return (FileCategory::OfficeDocument, mime);
    }
    if data.starts_with(ZIP) {
        return match ext.as_str() {
            "docx" | "docm" | "dotx" | "dotm" => (
                FileCategory::OfficeDocument,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ),
            "xlsx" | "xlsm" | "xltx" | "xltm" => (
                FileCategory::OfficeDocument,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            "pptx" | "pptm" | "potx" => (
                FileCategory::OfficeDocument,
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ),
            _ => (FileCategory::Archive, "application/zip"),
        };
    }
    if data.starts_with(SEVEN_ZIP) {
        return (FileCategory::Archive, "application/x-7z-compressed");
    }
    if data.starts_with(RAR) {
        return (FileCategory::Archive, "application/vnd.rar");
    }
    if data.starts_with(GZIP) {
        return (FileCategory::Archive, "application/gzip");
    }

    match ext.as_str() {
        "ps1" | "psm1" => (FileCategory::Script, "text/x-powershell"),
        "js" | "jse" => (FileCategory::Script, "application/javascript"),
        "vbs" | "vbe" => (FileCategory::Script, "text/vbscript"),
        "bat" | "cmd" => (FileCategory::Script, "text/x-msdos-batch"),
        "hta" => (FileCategory::Script, "application/hta"),
        "wsf" => (FileCategory::Script, "text/xml"),
        _ => (FileCategory::Unknown, MIME_UNKNOWN),
    }
}

/// Lowercased extension without the dot; empty when there is none.
pub fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

//! Tool output parsers.
//!
//! Each parser turns one tool's raw output into normalized [`Detection`]s plus
//! the tool-specific [`ScanFindings`] that risk scoring reads. Parsers are
//! total over empty input: a tool that printed nothing found nothing.
//!
//! # Formats
//! - YARA: `rule [meta] target` lines followed by `0xOFFSET:$id: data` lines
//! - CheckPlz, Stringnalyzer, PE-sieve, Hunt-Sleeping-Beacons: JSON reports
//! - Moneta: indented text report
//! - Patriot: `Level: .. | Type: .. | PID: .. | Details: ..` lines
//! - RedEdr: JSON lines of ETW events

pub mod checkplz;
pub mod hsb;
pub mod json;
pub mod moneta;
pub mod patriot;
pub mod pe_sieve;
pub mod rededr;
pub mod stringnalyzer;
pub mod yara;

use litterbox_core::findings::ScanFindings;
use litterbox_core::types::{Detection, RawOutput};

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub detections: Vec<Detection>,
    pub findings: ScanFindings,
}

/// Output that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// The text a report parser should read: the designated output file when the
/// tool wrote one, stdout otherwise.
pub fn report_text(raw: &RawOutput) -> &str {
    match raw.output_file.as_deref() {
        Some(file) if !file.trim().is_empty() => file,
        _ => &raw.stdout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_text_prefers_output_file() {
        let raw = RawOutput {
            stdout: "banner".to_owned(),
            stderr: String::new(),
            output_file: Some("{\"a\":1}".to_owned()),
        };
        assert_eq!(report_text(&raw), "{\"a\":1}");
    }

    #[test]
    fn report_text_falls_back_to_stdout_when_file_blank() {
        let raw = RawOutput {
            stdout: "{}".to_owned(),
            stderr: String::new(),
            output_file: Some("  \n".to_owned()),
        };
        assert_eq!(report_text(&raw), "{}");
    }
}

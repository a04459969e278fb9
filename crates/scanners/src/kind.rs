//! The closed set of wrapped tools.

use std::fmt;

use litterbox_core::config::{ScannersConfig, ToolConfig};
use litterbox_core::types::RawOutput;

use crate::parser::{self, ParseError, Parsed, report_text};

/// Every external tool LitterBox knows how to drive and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScannerKind {
    Yara,
    CheckPlz,
    Stringnalyzer,
    PeSieve,
    Moneta,
    Patriot,
    HuntSleepingBeacons,
    RedEdr,
}

impl ScannerKind {
    /// Scanners run against an artifact on disk, in parallel.
    pub const STATIC: [ScannerKind; 3] = [Self::Yara, Self::CheckPlz, Self::Stringnalyzer];

    /// Scanners run against a live process, in this order.
    pub const DYNAMIC: [ScannerKind; 5] = [
        Self::Yara,
        Self::PeSieve,
        Self::Moneta,
        Self::Patriot,
        Self::HuntSleepingBeacons,
    ];

    /// Key used for this scanner in stored results.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yara => "yara",
            Self::CheckPlz => "checkplz",
            Self::Stringnalyzer => "stringnalyzer",
            Self::PeSieve => "pe_sieve",
            Self::Moneta => "moneta",
            Self::Patriot => "patriot",
            Self::HuntSleepingBeacons => "hsb",
            Self::RedEdr => "rededr",
        }
    }

    /// Configuration for this scanner. `live` selects the process variant of
    /// YARA; the other tools only have one mode.
    pub fn tool_config<'a>(&self, scanners: &'a ScannersConfig, live: bool) -> &'a ToolConfig {
        match self {
            Self::Yara if live => &scanners.yara_process,
            Self::Yara => &scanners.yara,
            Self::CheckPlz => &scanners.checkplz,
            Self::Stringnalyzer => &scanners.stringnalyzer,
            Self::PeSieve => &scanners.pe_sieve,
            Self::Moneta => &scanners.moneta,
            Self::Patriot => &scanners.patriot,
            Self::HuntSleepingBeacons => &scanners.hunt_sleeping_beacons,
            Self::RedEdr => &scanners.rededr,
        }
    }

    /// Whether the scanner needs a live pid rather than a file.
    pub fn needs_process(&self, live: bool) -> bool {
        match self {
            Self::Yara => live,
            Self::CheckPlz | Self::Stringnalyzer | Self::RedEdr => false,
            Self::PeSieve | Self::Moneta | Self::Patriot | Self::HuntSleepingBeacons => true,
        }
    }

    /// Parse captured output with this scanner's parser.
    pub fn parse(&self, raw: &RawOutput) -> Result<Parsed, ParseError> {
        let text = report_text(raw);
        match self {
            Self::Yara => parser::yara::parse(text),
            Self::CheckPlz => parser::checkplz::parse(text),
            Self::Stringnalyzer => parser::stringnalyzer::parse(text),
            Self::PeSieve => parser::pe_sieve::parse(text),
            Self::Moneta => parser::moneta::parse(text),
            Self::Patriot => parser::patriot::parse(text),
            Self::HuntSleepingBeacons => parser::hsb::parse(text),
            Self::RedEdr => parser::rededr::parse(text),
        }
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litterbox_core::findings::ScanFindings;

    #[test]
    fn result_keys() {
        let statics: Vec<&str> = ScannerKind::STATIC.iter().map(ScannerKind::name).collect();
        assert_eq!(statics, vec!["yara", "checkplz", "stringnalyzer"]);
        let dynamics: Vec<&str> = ScannerKind::DYNAMIC.iter().map(ScannerKind::name).collect();
        assert_eq!(dynamics, vec!["yara", "pe_sieve", "moneta", "patriot", "hsb"]);
    }

    #[test]
    fn live_yara_uses_process_config() {
        let scanners = ScannersConfig::default();
        assert!(ScannerKind::Yara.tool_config(&scanners, true).command.contains("{pid}"));
        assert!(
            ScannerKind::Yara
                .tool_config(&scanners, false)
                .command
                .contains("{target_path}")
        );
    }

    #[test]
    fn process_requirements() {
        assert!(ScannerKind::Moneta.needs_process(false));
        assert!(!ScannerKind::Yara.needs_process(false));
        assert!(ScannerKind::Yara.needs_process(true));
        assert!(!ScannerKind::RedEdr.needs_process(true));
    }

    #[test]
    fn parse_dispatch_reads_output_file_first() {
        let raw = RawOutput {
            stdout: "PE-sieve v0.3.9\nscanning...".to_owned(),
            stderr: String::new(),
            output_file: Some(r#"{"scanned": {"total": 3, "modified": {"total": 1, "patched": 1}}}"#.to_owned()),
        };
        let parsed = ScannerKind::PeSieve.parse(&raw).unwrap();
        assert!(matches!(parsed.findings, ScanFindings::PeSieve(ref f) if f.total_suspicious == 1));
    }
}

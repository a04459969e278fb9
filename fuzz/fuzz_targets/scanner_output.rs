#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use litterbox_core::types::RawOutput;
use litterbox_scanners::ScannerKind;

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Yara,
    CheckPlz,
    Stringnalyzer,
    PeSieve,
    Moneta,
    Patriot,
    HuntSleepingBeacons,
    RedEdr,
}

impl From<FuzzKind> for ScannerKind {
    fn from(kind: FuzzKind) -> Self {
        match kind {
            FuzzKind::Yara => ScannerKind::Yara,
            FuzzKind::CheckPlz => ScannerKind::CheckPlz,
            FuzzKind::Stringnalyzer => ScannerKind::Stringnalyzer,
            FuzzKind::PeSieve => ScannerKind::PeSieve,
            FuzzKind::Moneta => ScannerKind::Moneta,
            FuzzKind::Patriot => ScannerKind::Patriot,
            FuzzKind::HuntSleepingBeacons => ScannerKind::HuntSleepingBeacons,
            FuzzKind::RedEdr => ScannerKind::RedEdr,
        }
    }
}

/// Captured tool output as the runner would hand it to a parser.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    kind: FuzzKind,
    stdout: String,
    stderr: String,
    output_file: Option<String>,
}

fuzz_target!(|input: FuzzInput| {
    let kind = ScannerKind::from(input.kind);
    let raw = RawOutput {
        stdout: input.stdout,
        stderr: input.stderr,
        output_file: input.output_file,
    };
    // Parsers must reject garbage with an error, never panic.
    let _ = kind.parse(&raw);
});

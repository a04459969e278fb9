//! Moneta memory scanner text report parser.
//!
//! The report is a hierarchy encoded by indentation:
//!
//! ```text
//! payload.exe : 4242 : x64 : C:\samples\payload.exe
//!   0x00007FF6A0000000:0x00008000   | EXE Image           | C:\samples\payload.exe | Unsigned module
//!     0x00007FF6A0001000:0x00001000 | RX    | .text | Modified code
//!   0x000001F2A0000000:0x00001000   | Private
//!     0x000001F2A0000000:0x00001000 | RWX   | 0x00000000 | Abnormal private executable memory
//!       Thread 0x000001F2A0000100 [TID 0x00001A2C]
//! ... scan completed (0.312000 second duration)
//! ```

use std::sync::LazyLock;

use litterbox_core::findings::{
    MonetaCounters, MonetaFindings, MonetaProcess, MonetaRegion, ScanFindings,
};
use litterbox_core::types::{Detection, Severity};
use regex::Regex;

use super::{ParseError, Parsed};

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+) second").expect("valid duration regex"));

static PROCESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.+\.exe)\s*:\s*(\d+)\s*:\s*(x64|Wow64)\s*:\s*(.+)").expect("valid process regex")
});

static THREAD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[TID\s*(0x[0-9A-Fa-f]+)\]").expect("valid tid regex"));

/// Parse a Moneta `-m ioc` report. Never fails: unknown lines are skipped.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let findings = parse_report(text);
    let detections = detections(&findings.counters);
    Ok(Parsed {
        detections,
        findings: ScanFindings::Moneta(findings),
    })
}

fn parse_report(text: &str) -> MonetaFindings {
    let mut findings = MonetaFindings::default();
    let c = &mut findings.counters;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.contains("Moneta v1.0") || line.contains("_____") {
            continue;
        }

        if line.contains("scan completed") {
            if let Some(caps) = DURATION.captures(line) {
                findings.scan_duration_secs = caps[1].parse().ok();
            }
            continue;
        }

        if line.contains(".exe :") {
            if let Some(caps) = PROCESS_LINE.captures(line.trim_start()) {
                if let Ok(pid) = caps[2].parse() {
                    findings.process = Some(MonetaProcess {
                        name: caps[1].trim().to_owned(),
                        pid,
                        arch: caps[3].to_owned(),
                        path: caps[4].trim().to_owned(),
                    });
                }
            }
            continue;
        }

        if !line.contains('|') && !line.contains("Thread") && !line.contains("[TID") {
            continue;
        }

        let indent = line.len() - line.trim_start().len();

        if indent >= 6 && line.contains("[TID") {
            if let Some(caps) = THREAD_ID.captures(line) {
                let tid = caps[1].to_owned();
                if !findings.threads.contains(&tid) {
                    findings.threads.push(tid);
                }
            }
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();

        if indent == 2 {
            c.total_regions += 1;
            let rest = parts.get(2..).unwrap_or_default().join("|");
            if rest.contains("Unsigned module") {
                c.unsigned_modules += 1;
            }
            if rest.contains("Missing PEB module") {
                c.missing_peb += 1;
            }
            if rest.contains("Mismatching PEB module") {
                c.mismatching_peb += 1;
            }
        } else if indent == 4 && parts.len() >= 2 {
            let perms = parts[1];
            let flags = parts[2..].join(" ");
            let executable = perms.contains("RWX") || perms.contains("RX");

            if flags.contains("Abnormal private executable memory") {
                c.abnormal_private_exec += 1;
                if perms.contains("RWX") {
                    c.private_rwx += 1;
                } else if perms.contains("RX") {
                    c.private_rx += 1;
                }
            }
            if flags.contains("Heap") && executable {
                c.heap_executable += 1;
            }
            if flags.contains("Modified code") {
                c.modified_code += 1;
            }
            if flags.contains("Modified PE header") {
                c.modified_pe_header += 1;
            }
            if flags.contains("Inconsistent +x between disk and memory") {
                c.inconsistent_x += 1;
            }

            let region_flags: Vec<String> = parts[2..]
                .iter()
                .filter(|f| !f.is_empty() && !f.starts_with("0x"))
                .map(|f| (*f).to_owned())
                .collect();
            if !region_flags.is_empty() {
                findings.regions.push(MonetaRegion {
                    description: format!("{} {}", parts[0], perms),
                    flags: region_flags,
                });
            }
        }
    }

    findings
}

fn detections(c: &MonetaCounters) -> Vec<Detection> {
    [
        ("private_rwx", c.private_rwx, Severity::Critical, "private RWX region(s)"),
        ("modified_pe_header", c.modified_pe_header, Severity::Critical, "modified PE header(s)"),
        ("private_rx", c.private_rx, Severity::High, "private RX region(s)"),
        ("heap_executable", c.heap_executable, Severity::High, "executable heap region(s)"),
        ("modified_code", c.modified_code, Severity::High, "modified code region(s)"),
        ("missing_peb", c.missing_peb, Severity::High, "module(s) missing from PEB"),
        ("mismatching_peb", c.mismatching_peb, Severity::High, "module(s) mismatching PEB"),
        ("inconsistent_x", c.inconsistent_x, Severity::Medium, "region(s) with inconsistent +x"),
    ]
    .into_iter()
    .filter(|(_, count, _, _)| *count > 0)
    .map(|(rule, count, sev, what)| Detection::new(format!("moneta_{rule}"), sev, format!("{count} {what}")))
    .collect()
}

//! RedEdr ETW event stream parser.
//!
//! RedEdr emits one JSON object per line for every event it traced from the
//! target. Only a small table of injection and evasion primitives count as
//! suspicious; everything else contributes to the event total.

use litterbox_core::findings::{RedEdrEvent, RedEdrFindings, ScanFindings};
use litterbox_core::types::{Detection, Severity};
use serde_json::Value;

use super::json::as_text;
use super::{ParseError, Parsed};

/// Memory protection constants that grant execute.
const PAGE_EXECUTE_READ: u64 = 0x20;
const PAGE_EXECUTE_READWRITE: u64 = 0x40;
const PAGE_EXECUTE_WRITECOPY: u64 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// Suspicious only with an RWX protection argument.
    AllocRwx,
    /// Suspicious only when the new protection is executable.
    ProtectExec,
    Always,
}

const SUSPICIOUS: &[(&str, Rule, Severity)] = &[
    ("VirtualAlloc", Rule::AllocRwx, Severity::High),
    ("VirtualAllocEx", Rule::AllocRwx, Severity::High),
    ("NtAllocateVirtualMemory", Rule::AllocRwx, Severity::High),
    ("VirtualProtect", Rule::ProtectExec, Severity::High),
    ("VirtualProtectEx", Rule::ProtectExec, Severity::High),
    ("NtProtectVirtualMemory", Rule::ProtectExec, Severity::High),
    ("CreateRemoteThread", Rule::Always, Severity::Critical),
    ("NtCreateThreadEx", Rule::Always, Severity::High),
    ("WriteProcessMemory", Rule::Always, Severity::High),
    ("NtWriteVirtualMemory", Rule::Always, Severity::High),
    ("QueueUserAPC", Rule::Always, Severity::High),
    ("NtQueueApcThread", Rule::Always, Severity::High),
    ("SetThreadContext", Rule::Always, Severity::High),
    ("OpenProcess", Rule::Always, Severity::Medium),
    ("LoadLibrary", Rule::Always, Severity::Low),
    ("LoadLibraryA", Rule::Always, Severity::Low),
    ("LoadLibraryW", Rule::Always, Severity::Low),
    ("LoadLibraryExA", Rule::Always, Severity::Low),
    ("LoadLibraryExW", Rule::Always, Severity::Low),
];

/// Parse RedEdr JSON lines. Lines that are not JSON objects are log noise and
/// do not count as events.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let mut findings = RedEdrFindings::default();
    let mut detections = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        let Ok(event @ Value::Object(_)) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        findings.total_events += 1;

        let Some(func) = event_name(&event) else {
            continue;
        };
        let Some((name, _, severity)) = SUSPICIOUS
            .iter()
            .find(|(name, rule, _)| *name == func && applies(*rule, &event))
        else {
            continue;
        };

        let detail = event_detail(&event);
        detections.push(Detection::new(format!("etw_{name}"), *severity, detail.clone()));
        findings.suspicious.push(RedEdrEvent {
            kind: (*name).to_owned(),
            detail,
        });
    }

    Ok(Parsed {
        detections,
        findings: ScanFindings::RedEdr(findings),
    })
}

fn event_name(event: &Value) -> Option<&str> {
    ["func", "type", "event"]
        .iter()
        .find_map(|key| event.get(*key).and_then(Value::as_str))
}

fn applies(rule: Rule, event: &Value) -> bool {
    match rule {
        Rule::Always => true,
        Rule::AllocRwx => protection(event).is_some_and(|p| p & PAGE_EXECUTE_READWRITE != 0),
        Rule::ProtectExec => protection(event).is_some_and(|p| {
            p & (PAGE_EXECUTE_READ | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY) != 0
        }),
    }
}

/// Protection argument as a number, accepting `"0x40"`, `"64"`,
/// `"PAGE_EXECUTE_READWRITE"` or a JSON number.
fn protection(event: &Value) -> Option<u64> {
    let value = ["protect", "new_protect", "protection"]
        .iter()
        .find_map(|key| event.get(*key))?;
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else if let Ok(n) = s.parse() {
                Some(n)
            } else {
                match s.to_ascii_uppercase().as_str() {
                    "PAGE_EXECUTE_READ" | "RX" => Some(PAGE_EXECUTE_READ),
                    "PAGE_EXECUTE_READWRITE" | "RWX" => Some(PAGE_EXECUTE_READWRITE),
                    "PAGE_EXECUTE_WRITECOPY" => Some(PAGE_EXECUTE_WRITECOPY),
                    _ => None,
                }
            }
        }
        _ => None,
    }
}

fn event_detail(event: &Value) -> String {
    let Value::Object(map) = event else {
        return String::new();
    };
    map.iter()
        .filter(|(k, _)| !matches!(k.as_str(), "func" | "type" | "event"))
        .map(|(k, v)| format!("{k}={}", as_text(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

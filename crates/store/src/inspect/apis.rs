//! Built-in table of Windows APIs commonly abused by malware.
//!
//! Matching is on the exact function name, case-insensitive, so `A`/`W`
//! variants are listed separately.

const TABLE: &[(&str, &str)] = &[
    // process injection
    ("CreateRemoteThread", "Injection"),
    ("CreateRemoteThreadEx", "Injection"),
    ("NtCreateThreadEx", "Injection"),
    ("RtlCreateUserThread", "Injection"),
    ("VirtualAllocEx", "Injection"),
    ("VirtualAllocExNuma", "Injection"),
    ("WriteProcessMemory", "Injection"),
    ("NtWriteVirtualMemory", "Injection"),
    ("NtMapViewOfSection", "Injection"),
    ("ZwMapViewOfSection", "Injection"),
    ("NtUnmapViewOfSection", "Injection"),
    ("ZwUnmapViewOfSection", "Injection"),
    ("QueueUserAPC", "Injection"),
    ("NtQueueApcThread", "Injection"),
    ("SetThreadContext", "Injection"),
    ("GetThreadContext", "Injection"),
    ("ResumeThread", "Injection"),
    ("SuspendThread", "Injection"),
    ("OpenProcess", "Injection"),
    ("ReadProcessMemory", "Injection"),
    // memory manipulation
    ("VirtualAlloc", "Memory"),
    ("VirtualProtect", "Memory"),
    ("VirtualProtectEx", "Memory"),
    ("NtAllocateVirtualMemory", "Memory"),
    ("NtProtectVirtualMemory", "Memory"),
    ("HeapCreate", "Memory"),
    // dynamic resolution
    ("LoadLibraryA", "Evasion"),
    ("LoadLibraryW", "Evasion"),
    ("LoadLibraryExA", "Evasion"),
    ("LoadLibraryExW", "Evasion"),
    ("GetProcAddress", "Evasion"),
    ("LdrLoadDll", "Evasion"),
    ("LdrGetProcedureAddress", "Evasion"),
    // anti-debugging
    ("IsDebuggerPresent", "Anti-Debugging"),
    ("CheckRemoteDebuggerPresent", "Anti-Debugging"),
    ("NtQueryInformationProcess", "Anti-Debugging"),
    ("OutputDebugStringA", "Anti-Debugging"),
    ("NtSetInformationThread", "Anti-Debugging"),
    // spying
    ("SetWindowsHookExA", "Spying"),
    ("SetWindowsHookExW", "Spying"),
    ("GetAsyncKeyState", "Spying"),
    ("GetKeyState", "Spying"),
    ("GetClipboardData", "Spying"),
    ("BitBlt", "Spying"),
    // internet
    ("InternetOpenA", "Internet"),
    ("InternetOpenW", "Internet"),
    ("InternetOpenUrlA", "Internet"),
    ("InternetOpenUrlW", "Internet"),
    ("InternetReadFile", "Internet"),
    ("HttpSendRequestA", "Internet"),
    ("HttpSendRequestW", "Internet"),
    ("WinHttpOpen", "Internet"),
    ("WinHttpSendRequest", "Internet"),
    ("URLDownloadToFileA", "Internet"),
    ("URLDownloadToFileW", "Internet"),
    ("WSAStartup", "Internet"),
    // ransomware / crypto
    ("CryptEncrypt", "Ransomware"),
    ("CryptDecrypt", "Ransomware"),
    ("CryptGenKey", "Ransomware"),
    ("CryptAcquireContextA", "Ransomware"),
    ("CryptAcquireContextW", "Ransomware"),
    ("BCryptEncrypt", "Ransomware"),
    // execution
    ("CreateProcessA", "Execution"),
    ("CreateProcessW", "Execution"),
    ("ShellExecuteA", "Execution"),
    ("ShellExecuteW", "Execution"),
    ("ShellExecuteExW", "Execution"),
    ("WinExec", "Execution"),
    // persistence
    ("RegSetValueExA", "Persistence"),
    ("RegSetValueExW", "Persistence"),
    ("RegCreateKeyExA", "Persistence"),
    ("RegCreateKeyExW", "Persistence"),
    ("CreateServiceA", "Persistence"),
    ("CreateServiceW", "Persistence"),
    // privilege
    ("AdjustTokenPrivileges", "Privilege"),
    ("OpenProcessToken", "Privilege"),
    ("LookupPrivilegeValueA", "Privilege"),
    ("LookupPrivilegeValueW", "Privilege"),
    ("ImpersonateLoggedOnUser", "Privilege"),
];

/// Category of a suspicious API, or `None` if the name is not in the table.
pub fn category(function: &str) -> Option<&'static str> {
    TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(function))
        .map(|(_, category)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(category("createremotethread"), Some("Injection"));
        assert_eq!(category("GETPROCADDRESS"), Some("Evasion"));
        assert_eq!(category("Sleep"), None);
    }

    #[test]
    fn weighted_import_names_are_all_listed() {
        for name in [
            "CreateRemoteThread",
            "VirtualAllocEx",
            "WriteProcessMemory",
            "NtMapViewOfSection",
            "ZwMapViewOfSection",
            "LoadLibraryA",
            "LoadLibraryW",
            "GetProcAddress",
            "OpenProcess",
            "VirtualAllocExNuma",
        ] {
            assert!(category(name).is_some(), "{name} should be in the table");
        }
    }

    #[test]
    fn no_duplicate_entries() {
        let mut names: Vec<String> = TABLE.iter().map(|(n, _)| n.to_lowercase()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }
}

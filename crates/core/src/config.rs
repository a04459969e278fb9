//! Configuration: `litterbox.toml` loading, environment overrides, validation.
//!
//! # Load order
//!
//! 1. Parse the TOML file (missing sections fall back to defaults)
//! 2. Apply `LITTERBOX_{SECTION}_{FIELD}` environment overrides
//! 3. Validate
//!
//! Per-scanner overrides use `LITTERBOX_SCANNERS_{NAME}_{FIELD}`, for example
//! `LITTERBOX_SCANNERS_MONETA_TIMEOUT_SECS=90`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LitterboxError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LitterboxConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scanners: ScannersConfig,
    #[serde(default)]
    pub holygrail: HolyGrailConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
}

impl LitterboxConfig {
    /// Load a config file, apply env overrides and validate.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LitterboxError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a config file without env overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LitterboxError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LitterboxError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LitterboxError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, LitterboxError> {
        toml::from_str(toml_str).map_err(|e| {
            LitterboxError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Apply `LITTERBOX_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LITTERBOX_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LITTERBOX_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LITTERBOX_GENERAL_DATA_DIR");

        // Storage
        override_string(&mut self.storage.upload_dir, "LITTERBOX_STORAGE_UPLOAD_DIR");
        override_string(&mut self.storage.result_dir, "LITTERBOX_STORAGE_RESULT_DIR");
        override_csv(
            &mut self.storage.allowed_extensions,
            "LITTERBOX_STORAGE_ALLOWED_EXTENSIONS",
        );
        override_u64(
            &mut self.storage.max_upload_bytes,
            "LITTERBOX_STORAGE_MAX_UPLOAD_BYTES",
        );

        // Analysis
        override_usize(
            &mut self.analysis.max_parallel_scanners,
            "LITTERBOX_ANALYSIS_MAX_PARALLEL_SCANNERS",
        );
        override_u64(
            &mut self.analysis.job_timeout_secs,
            "LITTERBOX_ANALYSIS_JOB_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.analysis.process.init_wait_secs,
            "LITTERBOX_PROCESS_INIT_WAIT_SECS",
        );
        override_u64(
            &mut self.analysis.process.etw_wait_secs,
            "LITTERBOX_PROCESS_ETW_WAIT_SECS",
        );
        override_u64(
            &mut self.analysis.process.execution_timeout_secs,
            "LITTERBOX_PROCESS_EXECUTION_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.analysis.process.max_output_bytes,
            "LITTERBOX_PROCESS_MAX_OUTPUT_BYTES",
        );

        // Scanners
        for (name, tool) in self.scanners.iter_mut() {
            let prefix = format!("LITTERBOX_SCANNERS_{}", name.to_uppercase());
            override_bool(&mut tool.enabled, &format!("{prefix}_ENABLED"));
            override_string(&mut tool.tool_path, &format!("{prefix}_TOOL_PATH"));
            override_string(&mut tool.rules_path, &format!("{prefix}_RULES_PATH"));
            override_u64(&mut tool.timeout_secs, &format!("{prefix}_TIMEOUT_SECS"));
        }

        // HolyGrail
        override_bool(&mut self.holygrail.enabled, "LITTERBOX_HOLYGRAIL_ENABLED");
        override_string(
            &mut self.holygrail.loldrivers_path,
            "LITTERBOX_HOLYGRAIL_LOLDRIVERS_PATH",
        );
        override_string(
            &mut self.holygrail.win10_policy_path,
            "LITTERBOX_HOLYGRAIL_WIN10_POLICY_PATH",
        );
        override_string(
            &mut self.holygrail.win11_policy_path,
            "LITTERBOX_HOLYGRAIL_WIN11_POLICY_PATH",
        );

        // Fuzzy
        override_string(&mut self.fuzzy.db_path, "LITTERBOX_FUZZY_DB_PATH");
        override_usize(&mut self.fuzzy.block_size, "LITTERBOX_FUZZY_BLOCK_SIZE");
        override_f64(&mut self.fuzzy.threshold, "LITTERBOX_FUZZY_THRESHOLD");
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), LitterboxError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.storage.allowed_extensions.is_empty() {
            return Err(invalid(
                "storage.allowed_extensions",
                "at least one extension must be allowed",
            ));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(invalid(
                "storage.max_upload_bytes",
                "must be greater than 0",
            ));
        }

        if self.analysis.max_parallel_scanners == 0 {
            return Err(invalid(
                "analysis.max_parallel_scanners",
                "must be greater than 0",
            ));
        }

        if self.analysis.job_timeout_secs == 0 {
            return Err(invalid("analysis.job_timeout_secs", "must be greater than 0"));
        }

        if self.analysis.process.execution_timeout_secs == 0 {
            return Err(invalid(
                "analysis.process.execution_timeout_secs",
                "must be greater than 0",
            ));
        }

        for (name, tool) in self.scanners.iter() {
            if !tool.enabled {
                continue;
            }
            if tool.tool_path.trim().is_empty() {
                return Err(invalid(
                    &format!("scanners.{name}.tool_path"),
                    "must not be empty when the scanner is enabled",
                ));
            }
            if tool.command.trim().is_empty() {
                return Err(invalid(
                    &format!("scanners.{name}.command"),
                    "must not be empty when the scanner is enabled",
                ));
            }
            if tool.timeout_secs == 0 {
                return Err(invalid(
                    &format!("scanners.{name}.timeout_secs"),
                    "must be greater than 0",
                ));
            }
        }

        if self.fuzzy.block_size == 0 {
            return Err(invalid("fuzzy.block_size", "must be greater than 0"));
        }

        if !(0.0..=100.0).contains(&self.fuzzy.threshold) {
            return Err(invalid("fuzzy.threshold", "must be between 0 and 100"));
        }

        Ok(())
    }

    /// Directory holding uploaded artifacts.
    pub fn upload_dir(&self) -> PathBuf {
        resolve(&self.general.data_dir, &self.storage.upload_dir)
    }

    /// Directory holding per-target result records.
    pub fn result_dir(&self) -> PathBuf {
        resolve(&self.general.data_dir, &self.storage.result_dir)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LitterboxError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// Relative storage paths live under `data_dir`.
fn resolve(data_dir: &str, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        Path::new(data_dir).join(p)
    }
}

/// `[general]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json or pretty
    pub log_format: String,
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: "./litterbox-data".to_owned(),
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Uploaded artifacts, relative to `general.data_dir` unless absolute.
    pub upload_dir: String,
    /// Per-target records, relative to `general.data_dir` unless absolute.
    pub result_dir: String,
    /// Lower-case extensions without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_owned(),
            result_dir: "results".to_owned(),
            allowed_extensions: [
                "exe", "dll", "sys", "bin", "lnk", "doc", "docx", "docm", "xls", "xlsx", "xlsm",
                "ppt", "pptx", "pdf", "js", "vbs", "ps1", "bat", "hta", "zip",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// `[analysis]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Static scanners that may run at once, across all jobs.
    pub max_parallel_scanners: usize,
    /// Upper bound for a whole static or driver job.
    pub job_timeout_secs: u64,
    pub process: ProcessConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_parallel_scanners: 4,
            job_timeout_secs: 600,
            process: ProcessConfig::default(),
        }
    }
}

/// `[analysis.process]`: live payload handling for dynamic analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How long the payload runs before memory scanners attach.
    pub init_wait_secs: u64,
    /// How long ETW collectors warm up before the payload starts.
    pub etw_wait_secs: u64,
    /// Budget for the scanner phase of a dynamic job.
    pub execution_timeout_secs: u64,
    /// Cap on captured payload stdout and stderr, each.
    pub max_output_bytes: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            init_wait_secs: 5,
            etw_wait_secs: 5,
            execution_timeout_secs: 300,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// One wrapped tool.
///
/// `command` is a template. Placeholders: `{tool_path}`, `{target_path}`,
/// `{output_path}`, `{extra_args}`, `{pid}`, `{rules_path}`, `{target_name}`.
/// `{output_path}` is a scratch directory created for each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    pub tool_path: String,
    pub command: String,
    pub timeout_secs: u64,
    pub rules_path: String,
    pub extra_args: Vec<String>,
    /// Report file the tool writes, relative to `{output_path}`. Placeholders
    /// are substituted. Empty when the tool reports on stdout only.
    pub output_file: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tool_path: String::new(),
            command: "{tool_path} {target_path} {extra_args}".to_owned(),
            timeout_secs: 120,
            rules_path: String::new(),
            extra_args: Vec::new(),
            output_file: String::new(),
        }
    }
}

impl ToolConfig {
    fn tool(tool_path: &str, command: &str, timeout_secs: u64) -> Self {
        Self {
            enabled: true,
            tool_path: tool_path.to_owned(),
            command: command.to_owned(),
            timeout_secs,
            ..Self::default()
        }
    }

    fn with_rules(mut self, rules_path: &str) -> Self {
        self.rules_path = rules_path.to_owned();
        self
    }

    fn with_output_file(mut self, output_file: &str) -> Self {
        self.output_file = output_file.to_owned();
        self
    }
}

/// `[scanners.*]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannersConfig {
    /// YARA against the artifact on disk.
    pub yara: ToolConfig,
    /// YARA against a live process.
    pub yara_process: ToolConfig,
    pub checkplz: ToolConfig,
    pub stringnalyzer: ToolConfig,
    pub pe_sieve: ToolConfig,
    pub moneta: ToolConfig,
    pub patriot: ToolConfig,
    pub hunt_sleeping_beacons: ToolConfig,
    pub rededr: ToolConfig,
}

impl Default for ScannersConfig {
    fn default() -> Self {
        Self {
            yara: ToolConfig::tool(
                r".\Scanners\Yara\yara64.exe",
                "{tool_path} -w -s -m {extra_args} {rules_path} {target_path}",
                120,
            )
            .with_rules(r".\Scanners\Yara\rules\index.yar"),
            yara_process: ToolConfig::tool(
                r".\Scanners\Yara\yara64.exe",
                "{tool_path} -w -s -m {extra_args} {rules_path} {pid}",
                120,
            )
            .with_rules(r".\Scanners\Yara\rules\index.yar"),
            checkplz: ToolConfig::tool(
                r".\Scanners\CheckPlz\checkplz.exe",
                "{tool_path} --file {target_path} --json {extra_args}",
                180,
            ),
            stringnalyzer: ToolConfig::tool(
                r".\Scanners\Stringnalyzer\stringnalyzer.exe",
                "{tool_path} --json {extra_args} {target_path}",
                120,
            ),
            pe_sieve: ToolConfig::tool(
                r".\Scanners\PE-Sieve\pe-sieve64.exe",
                "{tool_path} /pid {pid} /json /quiet /dir {output_path} {extra_args}",
                120,
            )
            .with_output_file("process_{pid}/scan_report.json"),
            moneta: ToolConfig::tool(
                r".\Scanners\Moneta\moneta64.exe",
                "{tool_path} -m ioc -p {pid} {extra_args}",
                120,
            ),
            patriot: ToolConfig::tool(
                r".\Scanners\Patriot\patriot.exe",
                "{tool_path} -p {pid} {extra_args}",
                120,
            ),
            hunt_sleeping_beacons: ToolConfig::tool(
                r".\Scanners\HuntSleepingBeacons\hsb.exe",
                "{tool_path} --pid {pid} --json {extra_args}",
                120,
            ),
            rededr: ToolConfig::tool(
                r".\Scanners\RedEdr\RedEdr.exe",
                "{tool_path} --etw --trace {target_name} {extra_args}",
                600,
            ),
        }
    }
}

impl ScannersConfig {
    /// All tool sections with their config key.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ToolConfig)> {
        [
            ("yara", &self.yara),
            ("yara_process", &self.yara_process),
            ("checkplz", &self.checkplz),
            ("stringnalyzer", &self.stringnalyzer),
            ("pe_sieve", &self.pe_sieve),
            ("moneta", &self.moneta),
            ("patriot", &self.patriot),
            ("hunt_sleeping_beacons", &self.hunt_sleeping_beacons),
            ("rededr", &self.rededr),
        ]
        .into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut ToolConfig)> {
        [
            ("yara", &mut self.yara),
            ("yara_process", &mut self.yara_process),
            ("checkplz", &mut self.checkplz),
            ("stringnalyzer", &mut self.stringnalyzer),
            ("pe_sieve", &mut self.pe_sieve),
            ("moneta", &mut self.moneta),
            ("patriot", &mut self.patriot),
            ("hunt_sleeping_beacons", &mut self.hunt_sleeping_beacons),
            ("rededr", &mut self.rededr),
        ]
        .into_iter()
    }
}

/// `[holygrail]`: BYOVD driver assessment reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HolyGrailConfig {
    pub enabled: bool,
    /// LOLDrivers JSON export.
    pub loldrivers_path: String,
    /// Windows 10 driver block policy (XML or one hash per line).
    pub win10_policy_path: String,
    /// Windows 11 driver block policy (XML or one hash per line).
    pub win11_policy_path: String,
    /// Kernel imports that make a driver useful as an exploitation primitive.
    pub dangerous_imports: Vec<String>,
}

impl Default for HolyGrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            loldrivers_path: r".\Scanners\HolyGrail\loldrivers.json".to_owned(),
            win10_policy_path: r".\Scanners\HolyGrail\policies\win10_driver_block.xml"
                .to_owned(),
            win11_policy_path: r".\Scanners\HolyGrail\policies\win11_driver_block.xml"
                .to_owned(),
            dangerous_imports: [
                "MmMapIoSpace",
                "MmMapIoSpaceEx",
                "MmCopyMemory",
                "MmCopyVirtualMemory",
                "MmGetPhysicalAddress",
                "ZwMapViewOfSection",
                "ZwOpenSection",
                "ZwTerminateProcess",
                "ZwOpenProcess",
                "PsLookupProcessByProcessId",
                "KeStackAttachProcess",
                "ObOpenObjectByPointer",
                "IoAllocateMdl",
                "MmProbeAndLockPages",
                "ZwSetInformationProcess",
                "HalGetBusDataByOffset",
                "HalSetBusDataByOffset",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// `[fuzzy]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Block-hash database, relative to `general.data_dir` unless absolute.
    pub db_path: String,
    pub block_size: usize,
    /// Minimum similarity percentage to report.
    pub threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            db_path: "fuzzy_db.json".to_owned(),
            block_size: 4096,
            threshold: 50.0,
        }
    }
}

impl LitterboxConfig {
    /// Fuzzy database path resolved against `data_dir`.
    pub fn fuzzy_db_path(&self) -> PathBuf {
        resolve(&self.general.data_dir, &self.fuzzy.db_path)
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

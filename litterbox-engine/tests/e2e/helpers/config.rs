//! Test configuration builder.
//!
//! Every scanner starts **disabled** and HolyGrail is off; data lives in a
//! fresh temp directory. Scenarios switch on exactly what they exercise.

use std::path::{Path, PathBuf};

use litterbox_core::config::{LitterboxConfig, ToolConfig};
use litterbox_engine::{ExecutionSlot, Orchestrator, OrchestratorBuilder};
use litterbox_store::JsonFileRepository;
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestConfigBuilder {
    dir: TempDir,
    config: LitterboxConfig,
}

#[allow(dead_code)]
impl TestConfigBuilder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = LitterboxConfig::default();
        config.general.data_dir = dir.path().display().to_string();
        config.storage.allowed_extensions = ["exe", "sys", "sh", "bin", "pdf"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        for (_, tool) in config.scanners.iter_mut() {
            tool.enabled = false;
        }
        config.holygrail.enabled = false;
        config.analysis.process.etw_wait_secs = 0;
        config.analysis.process.init_wait_secs = 1;
        config.analysis.process.execution_timeout_secs = 10;
        Self { dir, config }
    }

    /// Enable scanner `key` as an `sh -c` script. The script sees the target
    /// path (file scanners) or the pid (memory scanners) as `$0`.
    pub fn tool(self, key: &str, script: &str) -> Self {
        self.tool_with_timeout(key, script, 10)
    }

    pub fn tool_with_timeout(mut self, key: &str, script: &str, timeout_secs: u64) -> Self {
        let live = matches!(
            key,
            "yara_process" | "pe_sieve" | "moneta" | "patriot" | "hunt_sleeping_beacons"
        );
        let subject = if live { "{pid}" } else { "{target_path}" };
        let tool = ToolConfig {
            enabled: true,
            tool_path: "sh".to_owned(),
            command: format!("{{tool_path}} -c {{extra_args}} {subject}"),
            timeout_secs,
            extra_args: vec![script.to_owned()],
            ..ToolConfig::default()
        };
        if let Some((_, slot)) = self.config.scanners.iter_mut().find(|(k, _)| *k == key) {
            *slot = tool;
        } else {
            panic!("unknown scanner key {key}");
        }
        self
    }

    pub fn job_timeout(mut self, secs: u64) -> Self {
        self.config.analysis.job_timeout_secs = secs;
        self
    }

    pub fn fuzzy_block_size(mut self, block_size: usize) -> Self {
        self.config.fuzzy.block_size = block_size;
        self
    }

    pub fn init_wait(mut self, secs: u64) -> Self {
        self.config.analysis.process.init_wait_secs = secs;
        self
    }

    /// Enable HolyGrail with reference files written into the data dir.
    pub fn holygrail(mut self, loldrivers_json: &str, win10: &str, win11: &str) -> Self {
        let write = |name: &str, body: &str| -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, body).expect("failed to write reference file");
            path.display().to_string()
        };
        let loldrivers_path = write("loldrivers.json", loldrivers_json);
        let win10_policy_path = write("win10.xml", win10);
        let win11_policy_path = write("win11.txt", win11);
        self.config.holygrail.enabled = true;
        self.config.holygrail.loldrivers_path = loldrivers_path;
        self.config.holygrail.win10_policy_path = win10_policy_path;
        self.config.holygrail.win11_policy_path = win11_policy_path;
        self
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> &LitterboxConfig {
        &self.config
    }

    /// Write the config as `litterbox.toml` and return its path.
    pub fn write_toml(&self) -> PathBuf {
        let path = self.dir.path().join("litterbox.toml");
        let text = toml::to_string(&self.config).expect("config should serialize");
        std::fs::write(&path, text).expect("failed to write config");
        path
    }

    pub fn build(self) -> (TempDir, LitterboxConfig) {
        (self.dir, self.config)
    }
}

/// Orchestrator over the file-backed store in `config`'s data dir.
#[allow(dead_code)]
pub async fn orchestrator(config: LitterboxConfig) -> Orchestrator<JsonFileRepository> {
    OrchestratorBuilder::new(config)
        .build()
        .await
        .expect("orchestrator should build")
}

/// Same, sharing `slot` with the caller.
#[allow(dead_code)]
pub async fn orchestrator_with_slot(
    config: LitterboxConfig,
    slot: ExecutionSlot,
) -> Orchestrator<JsonFileRepository> {
    OrchestratorBuilder::new(config)
        .execution_slot(slot)
        .build()
        .await
        .expect("orchestrator should build")
}

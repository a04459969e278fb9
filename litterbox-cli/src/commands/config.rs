//! `litterbox config` command handler
//!
//! `validate` loads the file through the same path the engine uses and then
//! checks that every enabled scanner binary and HolyGrail reference list is
//! present. Missing files are warnings: the engine still starts and the
//! affected analyses fail when run. `show` prints the effective settings with
//! a per-scanner overview.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};

use litterbox_core::config::{LitterboxConfig, ToolConfig};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// A top-level table of `litterbox.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    General,
    Storage,
    Analysis,
    Scanners,
    HolyGrail,
    Fuzzy,
}

impl ConfigSection {
    const ALL: [Self; 6] = [
        Self::General,
        Self::Storage,
        Self::Analysis,
        Self::Scanners,
        Self::HolyGrail,
        Self::Fuzzy,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Storage => "storage",
            Self::Analysis => "analysis",
            Self::Scanners => "scanners",
            Self::HolyGrail => "holygrail",
            Self::Fuzzy => "fuzzy",
        }
    }

    fn to_toml(self, config: &LitterboxConfig) -> Result<String, toml::ser::Error> {
        match self {
            Self::General => toml::to_string_pretty(&config.general),
            Self::Storage => toml::to_string_pretty(&config.storage),
            Self::Analysis => toml::to_string_pretty(&config.analysis),
            Self::Scanners => toml::to_string_pretty(&config.scanners),
            Self::HolyGrail => toml::to_string_pretty(&config.holygrail),
            Self::Fuzzy => toml::to_string_pretty(&config.fuzzy),
        }
    }
}

impl FromStr for ConfigSection {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let expected: Vec<&str> = Self::ALL.iter().map(|s| s.key()).collect();
                CliError::Command(format!(
                    "unknown section: {s} (expected: {})",
                    expected.join(", ")
                ))
            })
    }
}

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => validate(config_path, writer).await,
        ConfigAction::Show { section } => {
            let section = section.as_deref().map(ConfigSection::from_str).transpose()?;
            show(config_path, section, writer).await
        }
    }
}

/// Load the file and check the external files it points at.
///
/// # Errors
///
/// Returns `CliError::Config` if the file does not load or fails validation.
async fn validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");
    let source = config_path.display().to_string();

    let report = match LitterboxConfig::load(config_path).await {
        Ok(config) => ValidationReport {
            source,
            valid: true,
            errors: Vec::new(),
            warnings: missing_files(&config).await,
        },
        Err(e) => ValidationReport {
            source,
            valid: false,
            errors: vec![e.to_string()],
            warnings: Vec::new(),
        },
    };
    for warning in &report.warnings {
        warn!(%warning, "configuration references a missing file");
    }

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// One warning per enabled scanner binary or HolyGrail list not on disk.
pub async fn missing_files(config: &LitterboxConfig) -> Vec<String> {
    let mut checks: Vec<(String, &str)> = config
        .scanners
        .iter()
        .filter(|(_, tool)| tool.enabled)
        .flat_map(|(name, tool)| {
            let rules = (!tool.rules_path.is_empty())
                .then(|| (format!("scanners.{name}.rules_path"), tool.rules_path.as_str()));
            [Some((format!("scanners.{name}.tool_path"), tool.tool_path.as_str())), rules]
        })
        .flatten()
        .collect();
    if config.holygrail.enabled {
        let holygrail = &config.holygrail;
        checks.push(("holygrail.loldrivers_path".to_owned(), holygrail.loldrivers_path.as_str()));
        checks.push(("holygrail.win10_policy_path".to_owned(), holygrail.win10_policy_path.as_str()));
        checks.push(("holygrail.win11_policy_path".to_owned(), holygrail.win11_policy_path.as_str()));
    }

    let mut warnings = Vec::new();
    for (key, path) in checks {
        let present = !path.is_empty() && tokio::fs::try_exists(path).await.unwrap_or(false);
        if !present {
            warnings.push(format!("{key}: '{path}' not found"));
        }
    }
    warnings
}

/// Show the effective configuration (file + env overrides + defaults).
async fn show(
    config_path: &Path,
    section: Option<ConfigSection>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), section = section.map(ConfigSection::key), "loading configuration");

    let config = LitterboxConfig::load(config_path).await?;
    let report = ShowReport::build(&config, config_path, section)?;
    writer.render(&report)
}

/// Effective settings, one section or all of them.
#[derive(Serialize)]
pub struct ShowReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<&'static str>,
    /// Present when the scanners table is shown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scanners: Vec<ScannerOverview>,
    #[serde(skip)]
    pub toml: String,
}

impl ShowReport {
    pub fn build(
        config: &LitterboxConfig,
        source: &Path,
        section: Option<ConfigSection>,
    ) -> Result<Self, CliError> {
        let toml = match section {
            Some(section) => section.to_toml(config),
            None => toml::to_string_pretty(config),
        }
        .map_err(|e| CliError::Command(format!("failed to serialize configuration: {e}")))?;

        let scanners = match section {
            None | Some(ConfigSection::Scanners) => config
                .scanners
                .iter()
                .map(|(name, tool)| ScannerOverview::new(name, tool))
                .collect(),
            Some(_) => Vec::new(),
        };

        Ok(Self {
            source: source.display().to_string(),
            section: section.map(ConfigSection::key),
            scanners,
            toml,
        })
    }
}

/// The fields of a scanner table an operator checks first.
#[derive(Debug, Serialize)]
pub struct ScannerOverview {
    pub name: &'static str,
    pub enabled: bool,
    pub tool_path: String,
    pub timeout_secs: u64,
}

impl ScannerOverview {
    fn new(name: &'static str, tool: &ToolConfig) -> Self {
        Self {
            name,
            enabled: tool.enabled,
            tool_path: tool.tool_path.clone(),
            timeout_secs: tool.timeout_secs,
        }
    }
}

impl Render for ShowReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match self.section {
            Some(section) => writeln!(w, "[{}] from {}", section.bold(), self.source)?,
            None => writeln!(w, "Configuration from {}", self.source.bold())?,
        }

        if !self.scanners.is_empty() {
            writeln!(w)?;
            for scanner in &self.scanners {
                let state = if scanner.enabled {
                    "on ".green()
                } else {
                    "off".dimmed()
                };
                writeln!(
                    w,
                    "  {state} {:<22} {:>4}s  {}",
                    scanner.name, scanner.timeout_secs, scanner.tool_path
                )?;
            }
        }

        writeln!(w)?;
        write!(w, "{}", self.toml)
    }
}

/// Load result plus missing-file warnings.
#[derive(Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Render for ValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let result = if self.valid {
            "VALID".green().bold()
        } else {
            "INVALID".red().bold()
        };
        writeln!(w, "{}: {result}", self.source.bold())?;
        for err in &self.errors {
            writeln!(w, "  error: {}", err.red())?;
        }
        for warning in &self.warnings {
            writeln!(w, "  warning: {}", warning.yellow())?;
        }
        Ok(())
    }
}

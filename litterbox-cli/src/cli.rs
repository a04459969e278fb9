//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use litterbox_core::types::RiskLevel;

/// LitterBox -- malware analysis sandbox.
///
/// Use `litterbox <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "litterbox", version, about, long_about = None)]
pub struct Cli {
    /// Path to the litterbox.toml configuration file.
    #[arg(short, long, default_value = "litterbox.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store an artifact and print its target record.
    Upload(UploadArgs),

    /// Register a running process as an analysis target.
    RegisterProcess(RegisterProcessArgs),

    /// Run one analysis to completion.
    Analyze(AnalyzeArgs),

    /// Show stored results for a target.
    Results(ResultsArgs),

    /// List all targets with their latest risk.
    List,

    /// Delete a target's artifact and results.
    Delete(DeleteArgs),

    /// Delete every target.
    Cleanup,

    /// Check scanner tools and reference data.
    Health,

    /// Manage the fuzzy similarity database.
    FuzzyDb(FuzzyDbArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- upload ----

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File to upload.
    pub path: PathBuf,
}

// ---- register-process ----

#[derive(Args, Debug)]
pub struct RegisterProcessArgs {
    /// Process id.
    pub pid: u32,
}

// ---- analyze ----

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Target id (hash prefix for files, pid for processes).
    pub target: String,

    /// Analysis type (static, dynamic, holygrail, fuzzy).
    pub analysis_type: String,

    /// Arguments passed to the payload of a dynamic run.
    #[arg(long = "args", num_args = 1.., allow_hyphen_values = true)]
    pub cmd_args: Vec<String>,

    /// Exit with code 5 when the resulting risk reaches this level.
    #[arg(long)]
    pub fail_on: Option<FailOn>,
}

/// Risk threshold for `--fail-on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailOn {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOn> for RiskLevel {
    fn from(level: FailOn) -> Self {
        match level {
            FailOn::Low => RiskLevel::Low,
            FailOn::Medium => RiskLevel::Medium,
            FailOn::High => RiskLevel::High,
            FailOn::Critical => RiskLevel::Critical,
        }
    }
}

// ---- results ----

#[derive(Args, Debug)]
pub struct ResultsArgs {
    /// Target id.
    pub target: String,

    /// Show only one analysis type.
    #[arg(long = "type")]
    pub analysis_type: Option<String>,
}

// ---- delete ----

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Target id.
    pub target: String,
}

// ---- fuzzy-db ----

#[derive(Args, Debug)]
pub struct FuzzyDbArgs {
    #[command(subcommand)]
    pub action: FuzzyDbAction,
}

#[derive(Subcommand, Debug)]
pub enum FuzzyDbAction {
    /// Hash every file under a reference directory into the database.
    Build {
        /// Directory of reference samples.
        dir: PathBuf,
    },
}

// ---- config ----

/// Manage litterbox configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, storage, analysis, scanners, holygrail, fuzzy).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_upload() {
        let cli = Cli::try_parse_from(["litterbox", "upload", "/tmp/sample.exe"])
            .expect("should parse 'upload'");
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.path, PathBuf::from("/tmp/sample.exe"));
            }
            _ => panic!("expected Upload command"),
        }
    }

    #[test]
    fn test_cli_parse_analyze_with_payload_args() {
        let cli = Cli::try_parse_from([
            "litterbox",
            "analyze",
            "abc123",
            "dynamic",
            "--args",
            "-k",
            "netsvcs",
        ])
        .expect("should parse analyze with payload args");
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.target, "abc123");
                assert_eq!(args.analysis_type, "dynamic");
                assert_eq!(args.cmd_args, vec!["-k", "netsvcs"]);
                assert!(args.fail_on.is_none(), "fail_on should default to None");
            }
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_parse_analyze_fail_on() {
        let cli = Cli::try_parse_from(["litterbox", "analyze", "abc", "static", "--fail-on", "high"])
            .expect("should parse --fail-on");
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.fail_on, Some(FailOn::High));
                assert!(args.cmd_args.is_empty());
            }
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_parse_analyze_bad_fail_on_fails() {
        let args = Cli::try_parse_from(["litterbox", "analyze", "abc", "static", "--fail-on", "severe"]);
        assert!(args.is_err(), "unknown level should be rejected");
    }

    #[test]
    fn test_cli_parse_results_with_type() {
        let cli = Cli::try_parse_from(["litterbox", "results", "abc", "--type", "holygrail"])
            .expect("should parse results with type");
        match cli.command {
            Commands::Results(args) => {
                assert_eq!(args.target, "abc");
                assert_eq!(args.analysis_type.as_deref(), Some("holygrail"));
            }
            _ => panic!("expected Results command"),
        }
    }

    #[test]
    fn test_cli_parse_register_process() {
        let cli = Cli::try_parse_from(["litterbox", "register-process", "4242"])
            .expect("should parse register-process");
        match cli.command {
            Commands::RegisterProcess(args) => assert_eq!(args.pid, 4242),
            _ => panic!("expected RegisterProcess command"),
        }
        assert!(
            Cli::try_parse_from(["litterbox", "register-process", "notapid"]).is_err(),
            "pid must be numeric"
        );
    }

    #[test]
    fn test_cli_parse_fuzzy_db_build() {
        let cli = Cli::try_parse_from(["litterbox", "fuzzy-db", "build", "/refs"])
            .expect("should parse fuzzy-db build");
        match cli.command {
            Commands::FuzzyDb(args) => match args.action {
                FuzzyDbAction::Build { dir } => assert_eq!(dir, PathBuf::from("/refs")),
            },
            _ => panic!("expected FuzzyDb command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["litterbox", "config", "show", "--section", "fuzzy"])
            .expect("should parse config show with section");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("fuzzy".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "litterbox",
            "-c",
            "/etc/litterbox.toml",
            "list",
            "--output",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after the subcommand");
        assert_eq!(cli.config, PathBuf::from("/etc/litterbox.toml"));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        let args = Cli::try_parse_from(["litterbox"]);
        assert!(args.is_err(), "should fail when no command provided");
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "litterbox");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in [
            "upload",
            "register-process",
            "analyze",
            "results",
            "list",
            "delete",
            "cleanup",
            "health",
            "fuzzy-db",
            "config",
        ] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}

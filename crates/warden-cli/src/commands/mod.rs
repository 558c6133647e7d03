use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use warden_config::{ConfigLoader, WardenConfig, WarningSeverity};
use warden_core::WardenError;

mod evaluate;
mod serve;
mod verify_log;

/// Warden: action governance for autonomous agents
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run the HTTP API against the configured upstream
    Serve {
        /// Address to listen on (overrides server.listen)
        #[arg(short = 'L', long)]
        listen: Option<String>,
    },
    /// Run one plan file through the full pipeline and print the disposition
    Evaluate {
        /// JSON file holding the inbound request
        plan: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the configuration and print every warning
    Validate,
    /// Read the audit log, rotated segments included, and verify its hash chain
    VerifyLog {
        /// Log file (defaults to audit.path)
        path: Option<PathBuf>,
    },
    /// Show version and build info
    Version,
}

/// Logging flags, kept apart from the subcommand so each arm can own it.
struct LogFlags {
    log_level: Option<String>,
    verbose: bool,
    quiet: bool,
}

impl LogFlags {
    /// RUST_LOG wins, then --verbose > --quiet > --log-level > logging.level.
    fn init_tracing(&self, config: &WardenConfig) {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

        match config.logging.format.as_str() {
            "json" => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .init(),
            "compact" => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_target(false)
                .init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init(),
        }
    }

    /// Load config first so we can use it for log format.
    fn load(&self, path: Option<&Path>) -> warden_core::Result<(ConfigLoader, WardenConfig)> {
        let loader = ConfigLoader::load(path)?;
        let config = loader.get();
        self.init_tracing(&config);
        Ok((loader, config))
    }
}

impl Cli {
    pub async fn run(self) -> warden_core::Result<()> {
        let Cli {
            config: config_path,
            log_level,
            verbose,
            quiet,
            command,
        } = self;
        let flags = LogFlags {
            log_level,
            verbose,
            quiet,
        };
        let path = config_path.as_deref();

        match command {
            // Validation reports problems itself instead of refusing to load.
            Commands::Validate => Self::cmd_validate(path),
            Commands::Serve { listen } => {
                let (loader, config) = flags.load(path)?;
                serve::cmd_serve(config, listen, loader).await
            }
            Commands::Evaluate { plan, json } => {
                let (_, config) = flags.load(path)?;
                evaluate::cmd_evaluate(config, &plan, json).await
            }
            Commands::Config { json } => {
                let (_, config) = flags.load(path)?;
                Self::cmd_config(&config, json)
            }
            Commands::VerifyLog { path: log_path } => {
                let (_, config) = flags.load(path)?;
                verify_log::cmd_verify_log(log_path.unwrap_or(config.audit.path))
            }
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_version() -> warden_core::Result<()> {
        println!("warden {}", env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    fn cmd_config(config: &WardenConfig, json: bool) -> warden_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config)
                    .map_err(|e| WardenError::Config(format!("failed to render config: {e}")))?
            );
        }
        Ok(())
    }

    fn cmd_validate(path: Option<&Path>) -> warden_core::Result<()> {
        let (config_path, config) = ConfigLoader::read_unvalidated(path)?;
        println!("Validating {}", config_path.display());

        // Errors abort `validate()`, so list every finding first.
        let findings = config.findings();
        for finding in &findings {
            println!("  {finding}");
        }

        let errors = findings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .count();
        if errors > 0 {
            return Err(WardenError::ConfigValidation {
                field: config_path.display().to_string(),
                reason: format!("{errors} error(s) found"),
            });
        }
        if findings.is_empty() {
            println!("  no problems found");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["warden", "--verbose", "-c", "w.toml", "config", "--json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("w.toml")));
        assert_eq!(cli.command, Commands::Config { json: true });
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["warden", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["warden", "evaluate", "plan.json", "--json"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Evaluate {
                plan: PathBuf::from("plan.json"),
                json: true
            }
        );
        let cli = Cli::try_parse_from(["warden", "verify-log"]).unwrap();
        assert_eq!(cli.command, Commands::VerifyLog { path: None });
        let cli = Cli::try_parse_from(["warden", "serve", "-L", "0.0.0.0:9000"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Serve {
                listen: Some("0.0.0.0:9000".into())
            }
        );
    }

    #[test]
    fn test_validate_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[breaker]\nfailure_threshold = 0\n").unwrap();
        let err = Cli::cmd_validate(Some(&path)).unwrap_err();
        assert!(matches!(err, WardenError::ConfigValidation { .. }));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[server]\napi_key = \"k\"\n").unwrap();
        assert!(Cli::cmd_validate(Some(&path)).is_ok());
    }
}

//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Settings left unset fall through to the
//! configuration file.

use clap::Parser;
use std::path::PathBuf;

/// SheetQuery - ask questions about your spreadsheets and reports
///
/// Picks the right file from a catalog of data folders, answers with a
/// local Ollama model, and keeps a short per-session conversation so
/// follow-up questions work.
///
/// Examples:
///   sheetquery --query "How many people are on the bench?"
///   sheetquery --session alice --catalog-dir ./data
///   sheetquery --query "Utilization for Acme" --format json
///   sheetquery --dry-run
///   sheetquery --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Question to answer; omit for an interactive prompt
    #[arg(short, long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Session id for conversational context
    #[arg(short, long, value_name = "ID")]
    pub session: Option<String>,

    /// Ollama chat model
    ///
    /// Can also be set via SHEETQUERY_MODEL env var or .sheetquery.toml config.
    #[arg(short, long, env = "SHEETQUERY_MODEL")]
    pub model: Option<String>,

    /// Ollama vision model used for images in Word documents
    #[arg(long, value_name = "MODEL")]
    pub vision_model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Directory containing the catalog folders
    #[arg(long, value_name = "DIR")]
    pub catalog_dir: Option<PathBuf>,

    /// JSON file describing the catalog folders
    #[arg(long, value_name = "FILE")]
    pub details: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .sheetquery.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(long)]
    pub quiet: bool,

    /// Dry run: list the catalog without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .sheetquery.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for answers and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text (default)
    #[default]
    Text,
    /// JSON envelopes
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref query) = self.query {
            if query.trim().is_empty() {
                return Err("Query must not be empty".to_string());
            }
        }

        if let Some(ref session) = self.session {
            if session.trim().is_empty() {
                return Err("Session id must not be empty".to_string());
            }
        }

        // Validate Ollama URL format (not needed for dry-run)
        if !self.dry_run {
            if let Some(ref url) = self.ollama_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        // Validate temperature range
        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate catalog directory if provided
        if let Some(ref dir) = self.catalog_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Catalog directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        if let Some(ref details) = self.details {
            if !details.is_file() {
                return Err(format!("Details file does not exist: {}", details.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_args() -> Args {
        Args {
            query: Some("How many people are on the bench?".to_string()),
            session: None,
            model: None,
            vision_model: None,
            ollama_url: Some("http://localhost:11434".to_string()),
            catalog_dir: None,
            details: None,
            config: None,
            format: None,
            temperature: None,
            timeout: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "sheetquery",
            "-q",
            "who is active",
            "-s",
            "alice",
            "--format",
            "json",
            "--temperature",
            "0.3",
        ])
        .unwrap();

        assert_eq!(args.query.as_deref(), Some("who is active"));
        assert_eq!(args.session.as_deref(), Some("alice"));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.temperature, Some(0.3));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        args.dry_run = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.query = Some("   ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_paths() {
        let dir = TempDir::new().unwrap();

        let mut args = make_args();
        args.catalog_dir = Some(dir.path().to_path_buf());
        assert!(args.validate().is_ok());

        args.details = Some(dir.path().join("missing.json"));
        let err = args.validate().unwrap_err();
        assert!(err.contains("Details file does not exist"));
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}

//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.sheetquery.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".sheetquery.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Data catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Session retention settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Spreadsheet analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Session id used when none is given.
    #[serde(default = "default_session")]
    pub session: String,

    /// Output format ("text" or "json").
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            session: default_session(),
            format: default_format(),
        }
    }
}

fn default_session() -> String {
    crate::routing::DEFAULT_SESSION.to_string()
}

fn default_format() -> String {
    "text".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat model used for selection, analysis and follow-ups.
    #[serde(default = "default_model")]
    pub name: String,

    /// Vision model used to read images in documents.
    #[serde(default = "default_vision_model")]
    pub vision_name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            vision_name: default_vision_model(),
            ollama_url: default_ollama_url(),
            temperature: 0.0,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_vision_model() -> String {
    "llava:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Data catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding the catalog folders.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// JSON file describing each folder.
    #[serde(default = "default_details_file")]
    pub details_file: PathBuf,

    /// File extensions offered to the selector.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// How deep to list files inside each folder.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            details_file: default_details_file(),
            extensions: default_extensions(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_details_file() -> PathBuf {
    PathBuf::from("helpers/detail.json")
}

fn default_extensions() -> Vec<String> {
    vec!["xlsx", "xls", "csv", "docx"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_depth() -> usize {
    1
}

/// Session retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for this long are evicted.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// How often the sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

/// Spreadsheet analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Rows shown to the model per table.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_sample_rows(),
        }
    }
}

fn default_sample_rows() -> usize {
    50
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or via their env vars)
    /// override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref vision) = args.vision_model {
            self.model.vision_name = vision.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref dir) = args.catalog_dir {
            self.catalog.base_path = dir.clone();
        }
        if let Some(ref details) = args.details {
            self.catalog.details_file = details.clone();
        }

        if let Some(ref session) = args.session {
            self.general.session = session.clone();
        }
        if let Some(format) = args.format {
            self.general.format = format.as_str().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Output format after merging; unknown values fall back to text.
    pub fn output_format(&self) -> crate::cli::OutputFormat {
        if self.general.format.eq_ignore_ascii_case("json") {
            crate::cli::OutputFormat::Json
        } else {
            crate::cli::OutputFormat::Text
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, OutputFormat};
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.model.vision_name, "llava:latest");
        assert_eq!(config.general.session, "default");
        assert_eq!(config.analysis.sample_rows, 50);
        assert!(config.catalog.extensions.contains(&"docx".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true
format = "json"

[model]
name = "qwen2.5:14b"
temperature = 0.2

[catalog]
base_path = "/srv/ops"
extensions = ["xlsx"]

[session]
idle_timeout_seconds = 60
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.timeout_seconds, 300);
        assert_eq!(config.catalog.base_path, PathBuf::from("/srv/ops"));
        assert_eq!(config.catalog.extensions, vec!["xlsx"]);
        assert_eq!(config.session.idle_timeout_seconds, 60);
        assert_eq!(config.session.sweep_interval_seconds, 300);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[catalog]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[analysis]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.catalog.details_file, PathBuf::from("helpers/detail.json"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[model\nname = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_merge_only_overrides_given_flags() {
        let mut config: Config = toml::from_str("[model]\nname = \"from-file\"\ntimeout_seconds = 10").unwrap();
        let args = Args::try_parse_from([
            "sheetquery",
            "--catalog-dir",
            "/data/ops",
            "--format",
            "json",
            "--session",
            "alice",
        ])
        .unwrap();

        config.merge_with_args(&args);

        assert_eq!(config.catalog.base_path, PathBuf::from("/data/ops"));
        assert_eq!(config.general.session, "alice");
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.model.timeout_seconds, 10);
        if std::env::var_os("SHEETQUERY_MODEL").is_none() {
            assert_eq!(config.model.name, "from-file");
        }
    }
}

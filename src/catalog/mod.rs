//! Catalog-driven file selection.
//!
//! The catalog is a JSON description of the data folders:
//!
//! ```json
//! { "accounts": { "foldername": "Account Details", "Detail": "...", "sheets": {...} } }
//! ```
//!
//! For each query the selector lists the files currently in every folder,
//! shows the model the folder descriptions, and parses the
//! `FOLDER:` / `FILE:` / `sheet:` lines it answers with.

pub mod scanner;

pub use scanner::{CatalogScanner, ScanConfig};

use crate::error::SelectionError;
use crate::llm::LanguageModel;
use crate::models::Selection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chooses the file (and sheet) best suited to answer a query.
#[async_trait]
pub trait FileSelector: Send + Sync {
    async fn select_file(&self, query: &str) -> Result<Option<Selection>, SelectionError>;
}

/// One folder described in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "foldername")]
    pub folder_name: String,
    #[serde(rename = "Detail", default)]
    pub detail: String,
    #[serde(default)]
    pub sheets: Value,
}

/// Folder catalog loaded from the details file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Loads the catalog JSON from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, CatalogEntry> = serde_json::from_str(content)?;
        Ok(Self { entries })
    }
}

/// Parsed model answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prediction {
    pub folder: Option<String>,
    pub file: Option<String>,
    pub sheet: Option<String>,
}

/// Selects files by asking the language model to pick from the catalog.
pub struct CatalogSelector {
    catalog: Catalog,
    scanner: CatalogScanner,
    model: Arc<dyn LanguageModel>,
}

impl CatalogSelector {
    pub fn new(catalog: Catalog, scanner: CatalogScanner, model: Arc<dyn LanguageModel>) -> Self {
        info!(
            "Catalog loaded with {} folders under {}",
            catalog.entries.len(),
            scanner.base_path().display()
        );
        Self {
            catalog,
            scanner,
            model,
        }
    }

    /// Renders the folder listing shown to the model.
    pub fn describe(&self) -> String {
        let mut context = String::new();

        for entry in self.catalog.entries.values() {
            let files = self.scanner.list_folder(&entry.folder_name);
            let sheets = match &entry.sheets {
                Value::Null => "{}".to_string(),
                other => other.to_string(),
            };

            context.push_str(&format!("Folder: {}\n", entry.folder_name));
            context.push_str(&format!("Description: {}\n", entry.detail));
            context.push_str(&format!("Files: {:?}\n", files));
            context.push_str(&format!("Sheets: {}\n\n", sheets));
        }

        context
    }

    fn build_prompt(&self, query: &str) -> String {
        format!(
            "Based on the user query and folder descriptions, predict the most relevant folder and file.\n\n\
             User Query: {}\n\n\
             Available Folders and Files:\n{}\n\
             Return only the folder name and most probable filename in this format:\n\
             FOLDER: [folder_name]\n\
             FILE: [filename]\n\
             sheet: [sheetname of the excel if any or return none]",
            query,
            self.describe()
        )
    }

    /// Resolves a prediction to a path under the catalog root. Only a
    /// catalog folder and a file currently listed in it are accepted;
    /// names match exactly first, then ignoring case.
    pub fn resolve(&self, prediction: Prediction) -> Option<Selection> {
        let folder = prediction.folder?;
        let file = prediction.file?;

        let Some(folder_name) = find_name(
            self.catalog.entries.values().map(|e| e.folder_name.as_str()),
            &folder,
        ) else {
            warn!("Predicted folder is not in the catalog: {}", folder);
            return None;
        };

        let listed = self.scanner.list_folder(folder_name);
        let Some(file_name) = find_name(listed.iter().map(String::as_str), &file) else {
            warn!("Predicted file is not in {}: {}", folder_name, file);
            return None;
        };

        Some(Selection {
            path: self.scanner.base_path().join(folder_name).join(file_name),
            sheet: prediction.sheet,
        })
    }
}

#[async_trait]
impl FileSelector for CatalogSelector {
    async fn select_file(&self, query: &str) -> Result<Option<Selection>, SelectionError> {
        if self.catalog.entries.is_empty() {
            return Err(SelectionError::Catalog("catalog has no folders".to_string()));
        }

        let prompt = self.build_prompt(query);
        debug!("Selection prompt is {} chars", prompt.len());

        let reply = self.model.generate(&prompt).await?;
        let prediction = parse_prediction(&reply);
        debug!("Predicted {:?}", prediction);

        Ok(self.resolve(prediction))
    }
}

fn find_name<'a>(names: impl Iterator<Item = &'a str> + Clone, wanted: &str) -> Option<&'a str> {
    names
        .clone()
        .find(|name| *name == wanted)
        .or_else(|| names.into_iter().find(|name| name.eq_ignore_ascii_case(wanted)))
}

/// Parses `FOLDER:` / `FILE:` / `sheet:` lines. Keys are case-insensitive;
/// surrounding brackets, quotes and Markdown emphasis are removed.
pub fn parse_prediction(reply: &str) -> Prediction {
    let mut prediction = Prediction::default();

    for line in reply.lines() {
        let line = line.trim().trim_start_matches(['*', '-', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        let value = clean_value(value);
        if value.is_empty() {
            continue;
        }

        match key.trim().trim_matches('*').to_ascii_lowercase().as_str() {
            "folder" => prediction.folder = Some(value),
            "file" => prediction.file = Some(value),
            "sheet" => prediction.sheet = Some(value),
            _ => {}
        }
    }

    prediction
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| matches!(c, '[' | ']' | '"' | '\'' | '`' | '*'))
        .trim()
        .to_string()
}

/// Absolute form of the catalog root, for display.
pub fn display_root(base: &Path) -> PathBuf {
    std::fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::fakes::ScriptedModel;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{
        "accounts": {"foldername": "Account Details", "Detail": "Per-account headcount", "sheets": {"Platform.xlsx": ["Q1", "Q2"]}},
        "util": {"foldername": "Utilisation", "Detail": "Monthly utilisation reports"}
    }"#;

    fn selector(dir: &TempDir, replies: Vec<&str>) -> (CatalogSelector, Arc<ScriptedModel>) {
        std::fs::create_dir_all(dir.path().join("Account Details")).unwrap();
        std::fs::write(dir.path().join("Account Details/Platform.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("Account Details/notes.txt"), b"x").unwrap();

        let model = Arc::new(ScriptedModel::new(
            replies.into_iter().map(|r| Ok(r.to_string())).collect(),
        ));
        let scanner = CatalogScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let selector = CatalogSelector::new(Catalog::parse(CATALOG).unwrap(), scanner, model.clone());
        (selector, model)
    }

    #[test]
    fn test_parse_prediction() {
        let reply = "FOLDER: Account Details\nFILE: [Platform.xlsx]\nsheet: Q1\n";
        assert_eq!(
            parse_prediction(reply),
            Prediction {
                folder: Some("Account Details".to_string()),
                file: Some("Platform.xlsx".to_string()),
                sheet: Some("Q1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_prediction_tolerates_markdown() {
        let reply = "Here you go:\n**FOLDER:** Utilisation\n- File: \"Sept.docx\"\nSHEET: none";
        let prediction = parse_prediction(reply);
        assert_eq!(prediction.folder.as_deref(), Some("Utilisation"));
        assert_eq!(prediction.file.as_deref(), Some("Sept.docx"));
        assert_eq!(prediction.sheet.as_deref(), Some("none"));
    }

    #[test]
    fn test_parse_prediction_missing_file() {
        let prediction = parse_prediction("FOLDER: Utilisation\nFILE:\n");
        assert!(prediction.file.is_none());
    }

    #[test]
    fn test_describe_lists_matching_files() {
        let dir = TempDir::new().unwrap();
        let (selector, _) = selector(&dir, vec![]);

        let description = selector.describe();
        assert!(description.contains("Folder: Account Details"));
        assert!(description.contains("Platform.xlsx"));
        assert!(!description.contains("notes.txt"));
        assert!(description.contains("Folder: Utilisation\nDescription: Monthly utilisation reports\nFiles: []"));
    }

    #[tokio::test]
    async fn test_select_file_resolves_path() {
        let dir = TempDir::new().unwrap();
        let (selector, model) = selector(
            &dir,
            vec!["FOLDER: Account Details\nFILE: Platform.xlsx\nsheet: Q2"],
        );

        let selection = selector.select_file("headcount for Q2").await.unwrap().unwrap();
        assert_eq!(selection.path, dir.path().join("Account Details").join("Platform.xlsx"));
        assert_eq!(selection.sheet.as_deref(), Some("Q2"));
        assert!(model.prompts()[0].contains("User Query: headcount for Q2"));
    }

    #[tokio::test]
    async fn test_select_file_without_answer() {
        let dir = TempDir::new().unwrap();
        let (selector, _) = selector(&dir, vec!["I am not sure."]);
        assert!(selector.select_file("weather").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_file_matches_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let (selector, _) = selector(&dir, vec!["FOLDER: account details\nFILE: platform.XLSX"]);

        let selection = selector.select_file("headcount").await.unwrap().unwrap();
        assert_eq!(selection.path, dir.path().join("Account Details").join("Platform.xlsx"));
    }

    #[tokio::test]
    async fn test_select_file_rejects_paths_outside_catalog() {
        let dir = TempDir::new().unwrap();
        let (selector, _) = selector(
            &dir,
            vec![
                "FOLDER: Account Details\nFILE: /etc/passwd.xlsx",
                "FOLDER: Account Details\nFILE: ../../secret.xlsx",
                "FOLDER: ../..\nFILE: Platform.xlsx",
                "FOLDER: /etc\nFILE: passwd",
                "FOLDER: Account Details\nFILE: Missing.xlsx",
                "FOLDER: Utilisation\nFILE: Platform.xlsx",
            ],
        );

        for _ in 0..6 {
            assert!(selector.select_file("headcount").await.unwrap().is_none());
        }
    }

    #[test]
    fn test_resolve_requires_listed_file() {
        let dir = TempDir::new().unwrap();
        let (selector, _) = selector(&dir, vec![]);
        let prediction = |folder: &str, file: &str| Prediction {
            folder: Some(folder.to_string()),
            file: Some(file.to_string()),
            sheet: None,
        };

        assert!(selector.resolve(prediction("Account Details", "Platform.xlsx")).is_some());
        assert!(selector.resolve(prediction("Account Details", "notes.txt")).is_none());
        assert!(selector.resolve(prediction("Account Details/..", "Platform.xlsx")).is_none());
    }

    #[test]
    fn test_catalog_parse_error() {
        assert!(Catalog::parse("{\"a\": {\"Detail\": \"no folder\"}}").is_err());
    }
}

//! Folder scanner for the data catalog.
//!
//! Lists the data files available in each catalog folder, respecting the
//! configured extensions and depth.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Configuration for folder scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["xlsx", "docx"])
    pub extensions: Vec<String>,
    /// How deep to descend inside each catalog folder (1 = direct children)
    pub max_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["xlsx", "xls", "csv", "docx"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_depth: 1,
        }
    }
}

impl From<&crate::config::CatalogConfig> for ScanConfig {
    fn from(config: &crate::config::CatalogConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            max_depth: config.max_depth.max(1),
        }
    }
}

/// Lists data files under the catalog root.
#[derive(Debug, Clone)]
pub struct CatalogScanner {
    config: ScanConfig,
    base_path: PathBuf,
}

impl CatalogScanner {
    pub fn new(base_path: PathBuf, config: ScanConfig) -> Self {
        Self { config, base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Files in a catalog folder, as sorted paths relative to that folder.
    /// A missing folder yields an empty list.
    pub fn list_folder(&self, folder: &str) -> Vec<String> {
        let root = self.base_path.join(folder);
        if !root.is_dir() {
            debug!("Catalog folder not found: {}", root.display());
            return Vec::new();
        }

        let mut files: Vec<String> = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(self.config.max_depth)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name().to_str().unwrap_or("")))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.matches(e.path()))
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&root)
                    .ok()
                    .map(|p| p.to_string_lossy().to_string())
            })
            .collect();

        files.sort();
        files
    }

    /// Check if a file has one of the configured extensions.
    pub fn matches(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    }
}

/// Hidden entries and Office lock files (`~$Book.xlsx`).
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("~$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_folder_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("Reports");
        std::fs::create_dir_all(folder.join("archive")).unwrap();
        for name in ["b.xlsx", "a.DOCX", "c.pdf", "~$b.xlsx", ".hidden.xlsx"] {
            std::fs::write(folder.join(name), b"x").unwrap();
        }
        std::fs::write(folder.join("archive/old.xlsx"), b"x").unwrap();

        let scanner = CatalogScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        assert_eq!(scanner.list_folder("Reports"), vec!["a.DOCX", "b.xlsx"]);

        let deep = CatalogScanner::new(
            dir.path().to_path_buf(),
            ScanConfig {
                max_depth: 2,
                ..ScanConfig::default()
            },
        );
        let files = deep.list_folder("Reports");
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.ends_with("old.xlsx")));
    }

    #[test]
    fn test_missing_folder_is_empty() {
        let dir = TempDir::new().unwrap();
        let scanner = CatalogScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        assert!(scanner.list_folder("Nope").is_empty());
    }

    #[test]
    fn test_matches_extension() {
        let scanner = CatalogScanner::new(PathBuf::from("."), ScanConfig::default());
        assert!(scanner.matches(Path::new("x/Report.XLSX")));
        assert!(!scanner.matches(Path::new("x/report.pdf")));
        assert!(!scanner.matches(Path::new("Makefile")));
    }
}

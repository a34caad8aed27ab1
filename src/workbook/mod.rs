//! Tabular data loading.
//!
//! A [`Table`] is one worksheet with its first row taken as the header. The
//! [`TableLoader`] trait is what the new-query resolver depends on.

pub mod xlsx;

pub use xlsx::XlsxLoader;

use crate::error::LoadError;
use async_trait::async_trait;
use std::path::Path;

/// Loads a worksheet from a file.
#[async_trait]
pub trait TableLoader: Send + Sync {
    /// Loads the named sheet, or the first sheet when `sheet` is `None`.
    async fn load_table(&self, path: &Path, sheet: Option<&str>) -> Result<Table, LoadError>;
}

/// One worksheet of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from a dense cell grid. The first row becomes the
    /// header; blank header cells are named `Unnamed: <index>`.
    pub fn from_grid(sheet_name: impl Into<String>, mut grid: Vec<Vec<String>>) -> Self {
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut grid {
            row.resize(width, String::new());
        }

        let mut rows = grid.into_iter();
        let headers = rows
            .next()
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.trim().to_string();
                if h.is_empty() {
                    format!("Unnamed: {}", i)
                } else {
                    h
                }
            })
            .collect();

        Self {
            sheet_name: sheet_name.into(),
            headers,
            rows: rows.collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Renders the first `max_rows` rows as an aligned text grid with a
    /// leading row index.
    pub fn render(&self, max_rows: usize) -> String {
        let shown: Vec<&Vec<String>> = self.rows.iter().take(max_rows).collect();
        let index_width = shown.len().saturating_sub(1).to_string().len();

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &shown {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let format_line = |index: &str, cells: &[String]| {
            let mut line = format!("{:<width$}", index, width = index_width);
            for (cell, width) in cells.iter().zip(&widths) {
                line.push_str("  ");
                line.push_str(&format!("{:<width$}", cell, width = *width));
            }
            line.trim_end().to_string()
        };

        let mut lines = vec![format_line("", &self.headers)];
        for (i, row) in shown.iter().enumerate() {
            lines.push(format_line(&i.to_string(), row));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_from_grid_pads_and_names_headers() {
        let table = Table::from_grid(
            "Sheet1",
            grid(&[&["Name", ""], &["Ann", "3", "extra"], &["Bob"]]),
        );

        assert_eq!(table.headers, vec!["Name", "Unnamed: 1", "Unnamed: 2"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1], vec!["Bob", "", ""]);
    }

    #[test]
    fn test_from_empty_grid() {
        let table = Table::from_grid("Empty", Vec::new());
        assert_eq!(table.column_count(), 0);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_render_limits_rows() {
        let table = Table::from_grid(
            "S",
            grid(&[&["Name", "Score"], &["Ann", "10"], &["Bartholomew", "7"], &["Cy", "1"]]),
        );

        let rendered = table.render(2);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Name") && lines[0].contains("Score"));
        assert!(lines[2].starts_with("1  Bartholomew  7"));
        assert!(!rendered.contains("Cy"));
    }
}

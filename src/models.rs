//! Data models for the query service.
//!
//! This module contains the core data structures shared by the session
//! store, the classifier and the resolvers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Returned when no catalog file matches a query.
pub const NO_FILE_FOUND: &str = "No suitable file found for the query.";

/// Answer produced by a resolver.
///
/// Analysis of a spreadsheet yields plain text, document extraction yields a
/// structured record. Both are stored in history as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Text(String),
    Structured(Map<String, Value>),
}

impl Response {
    /// Coerces the response to plain text.
    ///
    /// Structured records prefer a non-empty `output` field, then a non-empty
    /// `text` field, and otherwise serialize the whole record. Serialization
    /// failure yields an empty string.
    pub fn to_text(&self) -> String {
        match self {
            Response::Text(text) => text.clone(),
            Response::Structured(map) => ["output", "text"]
                .iter()
                .find_map(|key| map.get(*key).and_then(field_text))
                .unwrap_or_else(|| serde_json::to_string(map).unwrap_or_default()),
        }
    }

    /// Builds a structured `{"success": false, "error": ...}` record.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(false));
        map.insert("error".to_string(), Value::String(message.into()));
        Response::Structured(map)
    }
}

impl From<String> for Response {
    fn from(text: String) -> Self {
        Response::Text(text)
    }
}

impl From<&str> for Response {
    fn from(text: &str) -> Self {
        Response::Text(text.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Text of a field, or `None` when the field is empty or falsy.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// One question/answer pair in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// The user's query as typed.
    pub query: String,
    /// The answer recorded for it.
    pub response: Response,
    /// When the exchange was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(query: impl Into<String>, response: Response) -> Self {
        Self {
            query: query.into(),
            response,
            recorded_at: Utc::now(),
        }
    }
}

/// A file (and optionally a sheet) chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub path: PathBuf,
    pub sheet: Option<String>,
}

impl Selection {
    /// The requested sheet, ignoring blank values and the `none` sentinel.
    pub fn requested_sheet(&self) -> Option<&str> {
        self.sheet
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
    }
}

/// How a selected file is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.xlsx` / `.xls`
    Spreadsheet,
    /// `.docx` with embedded images
    Document,
    Unsupported,
}

impl FileKind {
    /// Classifies a path by its extension (case-insensitive).
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xls" => FileKind::Spreadsheet,
            "docx" => FileKind::Document,
            _ => FileKind::Unsupported,
        }
    }
}

/// Display name of a path (its file name, or the whole path as a fallback).
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

//! In-memory collaborators for router tests.

use crate::analysis::TableAnalyzer;
use crate::catalog::FileSelector;
use crate::document::DocumentExtractor;
use crate::error::{ExtractionError, LoadError, ModelError, SelectionError};
use crate::llm::LanguageModel;
use crate::models::{Response, Selection};
use crate::workbook::{Table, TableLoader};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Language model that replays scripted replies in order and records every
/// prompt it receives. Running out of replies is a request error.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
    image_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    /// Prompts received so far, text and image calls alike.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    fn next(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("no scripted reply left".to_string())))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.next(prompt)
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        _image_base64: &str,
    ) -> Result<String, ModelError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.next(prompt)
    }
}

/// Selector returning a fixed outcome.
pub enum FakeSelector {
    Picks(Selection),
    Nothing,
    Fails,
}

impl FakeSelector {
    pub fn picks(path: &str, sheet: Option<&str>) -> Self {
        FakeSelector::Picks(Selection {
            path: PathBuf::from(path),
            sheet: sheet.map(String::from),
        })
    }
}

#[async_trait]
impl FileSelector for FakeSelector {
    async fn select_file(&self, _query: &str) -> Result<Option<Selection>, SelectionError> {
        match self {
            FakeSelector::Picks(selection) => Ok(Some(selection.clone())),
            FakeSelector::Nothing => Ok(None),
            FakeSelector::Fails => Err(SelectionError::Model(ModelError::Timeout(30))),
        }
    }
}

/// Loader serving tables by sheet name. `None` requests use the `""` key.
/// Sheets without an entry fail with `SheetNotFound`.
#[derive(Default)]
pub struct FakeLoader {
    tables: HashMap<String, Table>,
    calls: Mutex<Vec<Option<String>>>,
}

impl FakeLoader {
    pub fn with_sheet(mut self, key: &str, table: Table) -> Self {
        self.tables.insert(key.to_string(), table);
        self
    }

    /// Sheet arguments of every load call, in order.
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableLoader for FakeLoader {
    async fn load_table(&self, _path: &Path, sheet: Option<&str>) -> Result<Table, LoadError> {
        self.calls.lock().unwrap().push(sheet.map(String::from));
        let key = sheet.unwrap_or("");
        self.tables
            .get(key)
            .cloned()
            .ok_or_else(|| LoadError::SheetNotFound(key.to_string()))
    }
}

/// Analyzer that echoes the sheet it was given, or fails.
pub struct FakeAnalyzer {
    pub fail: bool,
}

#[async_trait]
impl TableAnalyzer for FakeAnalyzer {
    async fn analyze(&self, table: &Table, query: &str) -> Result<Response, ModelError> {
        if self.fail {
            return Err(ModelError::Timeout(300));
        }
        Ok(Response::Text(format!(
            "{} rows in {} for '{}'",
            table.row_count(),
            table.sheet_name,
            query
        )))
    }
}

/// Extractor returning a fixed outcome.
pub struct FakeExtractor {
    pub result: Option<Response>,
}

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract(&self, path: &Path, _query: &str) -> Result<Response, ExtractionError> {
        self.result.clone().ok_or_else(|| {
            ExtractionError::NoImages(crate::models::display_name(path))
        })
    }
}

/// A two-row table named after its sheet.
pub fn sample_table(sheet: &str) -> Table {
    Table::from_grid(
        sheet,
        vec![
            vec!["Name".to_string(), "Status".to_string()],
            vec!["John Smith".to_string(), "Active".to_string()],
            vec!["Ann Lee".to_string(), "Bench".to_string()],
        ],
    )
}

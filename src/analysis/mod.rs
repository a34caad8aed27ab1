//! Model-backed analysis of a loaded table.

use crate::error::ModelError;
use crate::llm::LanguageModel;
use crate::models::Response;
use crate::workbook::Table;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Answers a question about one table.
#[async_trait]
pub trait TableAnalyzer: Send + Sync {
    async fn analyze(&self, table: &Table, query: &str) -> Result<Response, ModelError>;
}

/// Sends a data summary plus a row sample to the language model.
pub struct ModelTableAnalyzer {
    model: Arc<dyn LanguageModel>,
    sample_rows: usize,
}

impl ModelTableAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, sample_rows: usize) -> Self {
        Self { model, sample_rows }
    }

    fn build_prompt(&self, table: &Table, query: &str) -> String {
        let sample_size = self.sample_rows.min(table.row_count());

        let mut prompt = String::new();
        prompt.push_str("You are analyzing spreadsheet data. Here's the context:\n\n");
        prompt.push_str(&format!(
            "Data Summary: {} total rows, showing first {}\n",
            table.row_count(),
            sample_size
        ));
        prompt.push_str(&format!("Columns: {}\n", table.headers.join(", ")));
        prompt.push_str(&format!("Sheet: {}\n", table.sheet_name));
        prompt.push_str(&format!("\nSample Data:\n{}\n\n", table.render(sample_size)));
        prompt.push_str(&format!("Current User Question: {}\n\n", query));
        prompt.push_str(ANALYSIS_INSTRUCTIONS);
        prompt
    }
}

#[async_trait]
impl TableAnalyzer for ModelTableAnalyzer {
    async fn analyze(&self, table: &Table, query: &str) -> Result<Response, ModelError> {
        let prompt = self.build_prompt(table, query);
        debug!(
            "Analyzing sheet '{}' ({} rows x {} columns), prompt {} chars",
            table.sheet_name,
            table.row_count(),
            table.column_count(),
            prompt.len()
        );

        let reply = self.model.generate(&prompt).await?;
        Ok(Response::Text(reply.trim().to_string()))
    }
}

const ANALYSIS_INSTRUCTIONS: &str = r#"Please provide a comprehensive answer based on the data. Include:
1. Direct answer to the question
2. Relevant statistics or insights
3. Any notable patterns or observations

Format your response clearly and concisely."#;

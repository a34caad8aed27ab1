//! Table extraction from images embedded in Word documents.
//!
//! The first image under `word/media/` is sent to a vision model, which
//! transcribes the table as JSON; a second text-model call narrows that
//! table down to the rows relevant to the query.

use crate::error::ExtractionError;
use crate::llm::{strip_code_fence, LanguageModel};
use crate::models::{display_name, Response};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Extracts structured data from a document for a query.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, path: &Path, query: &str) -> Result<Response, ExtractionError>;
}

/// An image pulled out of a `.docx` archive.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Reads every `word/media/*` entry from a `.docx` file, in archive order.
pub fn extract_images(path: &Path) -> Result<Vec<EmbeddedImage>, ExtractionError> {
    let file = File::open(path).map_err(|e| ExtractionError::Archive(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractionError::Archive(e.to_string()))?;

    let mut images = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;

        let name = entry.name().to_string();
        if !name.starts_with("word/media/") || entry.is_dir() {
            continue;
        }

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;

        let filename = name.rsplit('/').next().unwrap_or(&name).to_string();
        images.push(EmbeddedImage { filename, data });
    }

    Ok(images)
}

/// Vision-model extractor for utilization-report tables.
pub struct DocxImageExtractor {
    model: Arc<dyn LanguageModel>,
}

impl DocxImageExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Asks the vision model to transcribe the table in an image.
    async fn transcribe(&self, image: &EmbeddedImage) -> Result<Value, ExtractionError> {
        let encoded = STANDARD.encode(&image.data);
        let reply = self
            .model
            .generate_with_image(TRANSCRIBE_PROMPT, &encoded)
            .await?;
        debug!("Vision reply for {}: {}", image.filename, reply);

        Ok(parse_json_reply(&reply))
    }

    /// Asks the text model to keep only the rows relevant to the query.
    async fn filter_for_query(&self, table: &Value, query: &str) -> Result<Value, ExtractionError> {
        let table_json = serde_json::to_string_pretty(table).unwrap_or_default();
        let prompt = format!(
            "Given the following table data extracted from a utilization report:\n{}\n\n\
             User Query: {}\n\n\
             Extract the relevant information from the table data based on the user query.\n\
             Return the answer as a JSON array:\n\
             [{{\"Account\": \"Name\", \"HC\": \"Number\", \"Utilization\": \"Percentage\"}}]\n",
            table_json, query
        );

        let reply = self.model.generate(&prompt).await?;
        debug!("Filter reply: {}", reply);

        Ok(parse_json_reply(&reply))
    }
}

#[async_trait]
impl DocumentExtractor for DocxImageExtractor {
    async fn extract(&self, path: &Path, query: &str) -> Result<Response, ExtractionError> {
        let owned: PathBuf = path.to_path_buf();
        let images = tokio::task::spawn_blocking(move || extract_images(&owned))
            .await
            .map_err(|e| ExtractionError::Archive(e.to_string()))??;

        let filename = display_name(path);
        let Some(first) = images.first() else {
            return Err(ExtractionError::NoImages(filename));
        };
        info!(
            "Found {} images in {}, extracting from {}",
            images.len(),
            filename,
            first.filename
        );

        let transcribed = self.transcribe(first).await?;
        let table_data = if transcribed.as_array().is_some_and(|rows| !rows.is_empty()) {
            self.filter_for_query(&transcribed, query).await?
        } else {
            warn!("No table rows recognised in {}", first.filename);
            Value::Array(Vec::new())
        };

        let mut result = Map::new();
        result.insert(
            "text".to_string(),
            Value::String(format!("Data extracted from {} utilization report:", filename)),
        );
        result.insert("tableData".to_string(), table_data);

        let mut record = Map::new();
        record.insert("success".to_string(), Value::Bool(true));
        record.insert("result".to_string(), Value::Object(result));

        Ok(Response::Structured(record))
    }
}

/// Parses a model reply as JSON after removing code fences. Unparsable
/// replies become an empty array.
fn parse_json_reply(reply: &str) -> Value {
    match serde_json::from_str::<Value>(strip_code_fence(reply)) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse JSON from model reply: {}", e);
            Value::Array(Vec::new())
        }
    }
}

const TRANSCRIBE_PROMPT: &str = r#"Analyze this utilization report image and extract table data.

Return ONLY a JSON array of objects with this exact format:
[{"Account": "AccountName", "HC": "Number", "Utilization": "XX%"}, ...]

Extract all visible account names, HC (head count) numbers, and utilization percentages from the table.

Do not include any explanation, just the JSON array."#;

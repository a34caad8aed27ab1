//! Resolvers for new queries and follow-ups.
//!
//! Neither resolver returns an error: collaborator failures are recovered
//! (default-sheet retry, follow-up fallback) or turned into sentinel
//! responses that are not recorded to history.

use super::classifier::proper_names;
use crate::analysis::TableAnalyzer;
use crate::catalog::FileSelector;
use crate::document::DocumentExtractor;
use crate::llm::LanguageModel;
use crate::models::{display_name, Exchange, FileKind, Response, Selection, NO_FILE_FOUND};
use crate::session::SessionStore;
use crate::workbook::{Table, TableLoader};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest answer text carried into the follow-up prompt, in characters.
pub const MAX_CONTEXT_CHARS: usize = 8000;

const NOT_FOUND_PHRASES: &[&str] = &[
    "could not find",
    "couldn't find",
    "not found",
    "no information",
    "not listed",
    "not available",
    "sorry",
    "apologize",
];

/// Answers a fresh query by selecting a file and analyzing it.
pub struct NewQueryResolver {
    store: Arc<SessionStore>,
    selector: Arc<dyn FileSelector>,
    loader: Arc<dyn TableLoader>,
    analyzer: Arc<dyn TableAnalyzer>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl NewQueryResolver {
    pub fn new(
        store: Arc<SessionStore>,
        selector: Arc<dyn FileSelector>,
        loader: Arc<dyn TableLoader>,
        analyzer: Arc<dyn TableAnalyzer>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        Self {
            store,
            selector,
            loader,
            analyzer,
            extractor,
        }
    }

    pub async fn resolve(&self, query: &str, session_id: &str) -> Response {
        let selection = match self.selector.select_file(query).await {
            Ok(Some(selection)) => selection,
            Ok(None) => {
                info!("No file selected for query");
                return Response::from(NO_FILE_FOUND);
            }
            Err(e) => {
                warn!("File selection failed: {}", e);
                return Response::from(NO_FILE_FOUND);
            }
        };

        info!(
            "Selected file: {} (sheet: {})",
            selection.path.display(),
            selection.sheet.as_deref().unwrap_or("none")
        );

        match FileKind::of(&selection.path) {
            FileKind::Spreadsheet => self.resolve_spreadsheet(&selection, query, session_id).await,
            FileKind::Document => self.resolve_document(&selection, query, session_id).await,
            FileKind::Unsupported => {
                warn!("Unsupported file type: {}", selection.path.display());
                Response::Text(format!(
                    "Unsupported file type: {}",
                    display_name(&selection.path)
                ))
            }
        }
    }

    async fn resolve_spreadsheet(
        &self,
        selection: &Selection,
        query: &str,
        session_id: &str,
    ) -> Response {
        let table = match self.load_table(selection).await {
            Ok(table) => table,
            Err(message) => return Response::Text(message),
        };

        match self.analyzer.analyze(&table, query).await {
            Ok(response) => {
                self.store.append(session_id, query, response.clone());
                response
            }
            Err(e) => {
                warn!("Analysis failed: {}", e);
                Response::Text(format!("Error processing query: {}", e))
            }
        }
    }

    /// Loads the requested sheet, retrying with the first sheet on failure.
    async fn load_table(&self, selection: &Selection) -> Result<Table, String> {
        let path = selection.path.as_path();

        if let Some(sheet) = selection.requested_sheet() {
            match self.loader.load_table(path, Some(sheet)).await {
                Ok(table) => return Ok(table),
                Err(e) => warn!("Error reading sheet '{}': {}, using first sheet", sheet, e),
            }
        }

        self.loader.load_table(path, None).await.map_err(|e| {
            warn!("Failed to load {}: {}", path.display(), e);
            format!("Failed to load data from {}: {}", display_name(path), e)
        })
    }

    async fn resolve_document(
        &self,
        selection: &Selection,
        query: &str,
        session_id: &str,
    ) -> Response {
        match self.extractor.extract(&selection.path, query).await {
            Ok(response) => {
                self.store.append(session_id, query, response.clone());
                response
            }
            Err(e) => {
                warn!("Document extraction failed: {}", e);
                Response::failure(e.to_string())
            }
        }
    }
}

/// Answers a follow-up from the session's conversation, falling back to a
/// fresh query when the model cannot.
pub struct FollowUpResolver {
    store: Arc<SessionStore>,
    model: Arc<dyn LanguageModel>,
    fallback: Arc<NewQueryResolver>,
}

impl FollowUpResolver {
    pub fn new(
        store: Arc<SessionStore>,
        model: Arc<dyn LanguageModel>,
        fallback: Arc<NewQueryResolver>,
    ) -> Self {
        Self {
            store,
            model,
            fallback,
        }
    }

    pub async fn resolve(&self, query: &str, session_id: &str) -> Response {
        let history = self.store.get_history(session_id);
        let context = render_context(&history);
        let target = proper_names(query).join(" ");
        debug!(
            "Follow-up context is {} chars, target '{}'",
            context.chars().count(),
            target
        );

        let prompt = build_prompt(&context, query, &target);
        let reply = match self.model.generate(&prompt).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!("Follow-up failed ({}), falling back to new query", e);
                return self.fallback.resolve(query, session_id).await;
            }
        };

        if indicates_not_found(&reply) {
            warn!(
                "Answer for '{}' not in conversation, falling back to new query",
                target
            );
            return self.fallback.resolve(query, session_id).await;
        }

        let response = Response::Text(reply);
        self.store.append(session_id, query, response.clone());
        response
    }
}

/// Renders history as numbered `Q`/`A` pairs with long answers cut.
pub fn render_context(history: &[Exchange]) -> String {
    let mut context = String::new();
    for (i, exchange) in history.iter().enumerate() {
        let n = i + 1;
        context.push_str(&format!("Q{}: {}\n", n, exchange.query));
        context.push_str(&format!(
            "A{}: {}\n\n",
            n,
            truncate_chars(&exchange.response.to_text(), MAX_CONTEXT_CHARS)
        ));
    }
    context
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn indicates_not_found(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|p| lower.contains(p))
}

fn build_prompt(context: &str, query: &str, target: &str) -> String {
    format!(
        "Previous conversation history (COMPLETE):\n{context}\n\
         User's follow-up question: {query}\n\
         Target person: {target}\n\n\
         INSTRUCTIONS:\n\
         - Search through the ENTIRE conversation history above for \"{target}\"\n\
         - The data might be in HTML table format or plain text\n\
         - Look carefully through all the data - the person might be listed anywhere in the response\n\
         - Extract ALL available information about this specific person\n\
         - If you find the person's information, provide it in a clear, formatted way\n\
         - Include all details available (Employee ID, certifications, dates, status, etc.)\n\
         - Focus specifically on: {target}\n\n\
         Search the complete conversation history and extract all information about {target}.\n"
    )
}

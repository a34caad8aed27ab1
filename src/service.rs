//! The query service: the surface the CLI drives.
//!
//! Built once at startup. Owns the session store and the router wired to
//! the concrete collaborators.

use crate::analysis::{ModelTableAnalyzer, TableAnalyzer};
use crate::catalog::{Catalog, CatalogScanner, CatalogSelector, FileSelector, ScanConfig};
use crate::config::Config;
use crate::document::{DocumentExtractor, DocxImageExtractor};
use crate::llm::{LanguageModel, OllamaClient, OllamaConfig};
use crate::models::{Exchange, Response};
use crate::routing::{FollowUpClassifier, FollowUpResolver, NewQueryResolver, QueryRouter};
use crate::session::{spawn_sweeper, SessionStore};
use crate::workbook::{TableLoader, XlsxLoader};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Collaborators the router dispatches to.
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub selector: Arc<dyn FileSelector>,
    pub loader: Arc<dyn TableLoader>,
    pub analyzer: Arc<dyn TableAnalyzer>,
    pub extractor: Arc<dyn DocumentExtractor>,
}

pub struct QueryService {
    store: Arc<SessionStore>,
    router: QueryRouter,
}

impl QueryService {
    pub fn new(store: Arc<SessionStore>, collaborators: Collaborators) -> Self {
        let new_query = Arc::new(NewQueryResolver::new(
            Arc::clone(&store),
            collaborators.selector,
            collaborators.loader,
            collaborators.analyzer,
            collaborators.extractor,
        ));
        let follow_up = FollowUpResolver::new(
            Arc::clone(&store),
            collaborators.model,
            Arc::clone(&new_query),
        );
        let router = QueryRouter::new(
            FollowUpClassifier::new(Arc::clone(&store)),
            follow_up,
            new_query,
        );

        Self { store, router }
    }

    /// Wires the Ollama-backed collaborators from configuration.
    pub fn build(config: &Config) -> Result<Self> {
        let model = ollama_model(config)?;
        let selector = catalog_selector(config, Arc::clone(&model))?;

        let collaborators = Collaborators {
            selector: Arc::new(selector),
            loader: Arc::new(XlsxLoader),
            analyzer: Arc::new(ModelTableAnalyzer::new(
                Arc::clone(&model),
                config.analysis.sample_rows,
            )),
            extractor: Arc::new(DocxImageExtractor::new(Arc::clone(&model))),
            model,
        };

        Ok(Self::new(Arc::new(SessionStore::new()), collaborators))
    }

    /// Answers a query in a session. Never fails.
    pub async fn submit_query(&self, query: &str, session_id: &str) -> Response {
        self.router.route(query, session_id).await
    }

    pub fn read_history(&self, session_id: &str) -> Vec<Exchange> {
        self.store.get_history(session_id)
    }

    pub fn clear_history(&self, session_id: &str) {
        self.store.clear(session_id);
    }

    pub fn active_sessions(&self) -> usize {
        self.store.session_count()
    }

    /// Starts idle-session eviction using the configured timings.
    pub fn start_sweeper(&self, config: &Config) -> JoinHandle<()> {
        let max_idle = Duration::from_secs(config.session.idle_timeout_seconds);
        let every = Duration::from_secs(config.session.sweep_interval_seconds.max(1));
        info!(
            "Evicting sessions idle for {}s (every {}s)",
            max_idle.as_secs(),
            every.as_secs()
        );
        spawn_sweeper(Arc::clone(&self.store), max_idle, every)
    }
}

fn ollama_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let client = OllamaClient::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        vision_model_name: config.model.vision_name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
    })
    .context("Failed to create Ollama client")?;

    Ok(Arc::new(client))
}

/// Loads the catalog and builds the model-backed selector.
pub fn catalog_selector(config: &Config, model: Arc<dyn LanguageModel>) -> Result<CatalogSelector> {
    let catalog = Catalog::load(&config.catalog.details_file)?;
    let scanner = CatalogScanner::new(
        config.catalog.base_path.clone(),
        ScanConfig::from(&config.catalog),
    );
    Ok(CatalogSelector::new(catalog, scanner, model))
}

/// Builds the selector for listing only; its model is never called.
pub fn offline_selector(config: &Config) -> Result<CatalogSelector> {
    catalog_selector(config, ollama_model(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::fakes::{
        sample_table, FakeAnalyzer, FakeExtractor, FakeLoader, FakeSelector, ScriptedModel,
    };
    use tempfile::TempDir;

    fn service(selector: FakeSelector, model: ScriptedModel) -> QueryService {
        QueryService::new(
            Arc::new(SessionStore::new()),
            Collaborators {
                model: Arc::new(model),
                selector: Arc::new(selector),
                loader: Arc::new(FakeLoader::default().with_sheet("", sample_table("Sheet1"))),
                analyzer: Arc::new(FakeAnalyzer { fail: false }),
                extractor: Arc::new(FakeExtractor { result: None }),
            },
        )
    }

    #[tokio::test]
    async fn test_submit_read_clear() {
        let service = service(
            FakeSelector::picks("d/Staff.xlsx", None),
            ScriptedModel::new(vec![]),
        );

        let response = service.submit_query("who is active", "alice").await;
        assert_eq!(response.to_text(), "2 rows in Sheet1 for 'who is active'");

        let history = service.read_history("alice");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "who is active");
        assert!(service.read_history("bob").is_empty());

        service.clear_history("alice");
        assert!(service.read_history("alice").is_empty());
        service.clear_history("never-seen");
    }

    #[tokio::test]
    async fn test_history_bounded_through_service() {
        let service = service(
            FakeSelector::picks("d/Staff.xlsx", None),
            ScriptedModel::new(vec![]),
        );

        for i in 0..7 {
            service.submit_query(&format!("count rows {}", i), "s").await;
        }

        let history = service.read_history("s");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].query, "count rows 2");
    }

    #[test]
    fn test_build_from_config() {
        let dir = TempDir::new().unwrap();
        let details = dir.path().join("detail.json");
        std::fs::write(&details, r#"{"a": {"foldername": "A", "Detail": "d"}}"#).unwrap();

        let mut config = Config::default();
        config.catalog.base_path = dir.path().to_path_buf();
        config.catalog.details_file = details;

        assert!(QueryService::build(&config).is_ok());
        let description = offline_selector(&config).unwrap().describe();
        assert!(description.contains("Folder: A"));
    }

    #[test]
    fn test_build_missing_catalog() {
        let mut config = Config::default();
        config.catalog.details_file = "/nonexistent/detail.json".into();

        let err = QueryService::build(&config).err().unwrap();
        assert!(err.to_string().contains("Failed to read catalog file"));
    }
}

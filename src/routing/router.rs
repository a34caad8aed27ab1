//! Entry point: classify a query, then dispatch it.

use super::classifier::FollowUpClassifier;
use super::resolver::{FollowUpResolver, NewQueryResolver};
use crate::models::Response;
use std::sync::Arc;
use tracing::info;

/// Session id used when the caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

pub struct QueryRouter {
    classifier: FollowUpClassifier,
    follow_up: FollowUpResolver,
    new_query: Arc<NewQueryResolver>,
}

impl QueryRouter {
    pub fn new(
        classifier: FollowUpClassifier,
        follow_up: FollowUpResolver,
        new_query: Arc<NewQueryResolver>,
    ) -> Self {
        Self {
            classifier,
            follow_up,
            new_query,
        }
    }

    pub async fn route(&self, query: &str, session_id: &str) -> Response {
        if self.classifier.classify(query, session_id) {
            info!("Processing as follow-up (session {})", session_id);
            self.follow_up.resolve(query, session_id).await
        } else {
            info!("Processing as new query (session {})", session_id);
            self.new_query.resolve(query, session_id).await
        }
    }
}

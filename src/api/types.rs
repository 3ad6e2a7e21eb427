use std::sync::Arc;

use crate::pipeline::extraction::orchestrator::DocumentPipeline;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<DocumentPipeline>,
    /// Maximum request body in bytes.
    pub body_limit: usize,
}

impl ApiContext {
    pub fn new(pipeline: DocumentPipeline, body_limit: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            body_limit,
        }
    }
}

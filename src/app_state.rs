use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::generation::GenerationService;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<GenerationService>,
    pub api_key: Option<Arc<str>>,
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(generation: Arc<GenerationService>, api_key: Option<String>) -> Self {
        Self {
            generation,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(Arc::new(handle));
        self
    }
}

use crate::service::ProductService;
use common_observability::ProductMetrics;
use std::sync::Arc;

/// Shared application state used by handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ProductService,
    pub metrics: Arc<ProductMetrics>,
}

impl AppState {
    pub fn new(service: ProductService, metrics: Arc<ProductMetrics>) -> Self {
        Self { service, metrics }
    }
}

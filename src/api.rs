//! HTTP API for Conductor

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::runtime::ProductionThreads;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub threads: Arc<ProductionThreads>,
}

impl AppState {
    pub fn new(threads: ProductionThreads) -> Self {
        Self {
            threads: Arc::new(threads),
        }
    }
}

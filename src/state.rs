//! Application state management
//!
//! This module contains the shared application state that is passed
//! to all request handlers via Axum's State extractor.

use std::sync::Arc;

use crate::{config::JudgeConfig, store::ServerRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Judge server registry
    registry: Arc<dyn ServerRegistry>,

    /// Token, liveness window and timings
    judge: JudgeConfig,
}

impl AppState {
    /// Create a new application state
    pub fn new(registry: Arc<dyn ServerRegistry>, judge: JudgeConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner { registry, judge }),
        }
    }

    pub fn registry(&self) -> &dyn ServerRegistry {
        self.inner.registry.as_ref()
    }

    pub fn judge_config(&self) -> &JudgeConfig {
        &self.inner.judge
    }
}

//! Backend router — builds the configured backend set and selects the
//! active one by name.
//!
//! Both backends are constructed when configured so a session can switch
//! between remote and local without rebuilding the world.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quill_config::AppConfig;
use quill_core::ModelBackend;
use tracing::debug;

use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use crate::retry::RetryBackend;

/// A named set of backends with a default selection.
pub struct BackendRouter {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
    default_name: String,
}

impl BackendRouter {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_name: default_name.into(),
        }
    }

    /// Register a backend under its name.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(name).cloned()
    }

    /// The configured default backend.
    pub fn default_backend(&self) -> Option<Arc<dyn ModelBackend>> {
        self.get(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Registered backend names.
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }
}

/// Build the backend set from configuration, each wrapped in the retry
/// decorator.
pub fn build_from_config(config: &AppConfig) -> BackendRouter {
    let mut router = BackendRouter::new(&config.backend);
    let attempts = config.retry.max_attempts;
    let delay = Duration::from_millis(config.retry.base_delay_ms);

    if let Some(api_key) = &config.remote.api_key {
        let remote = RemoteBackend::new("remote", &config.remote.base_url, api_key);
        router.register(Arc::new(RetryBackend::new(
            Arc::new(remote),
            attempts,
            delay,
        )));
        debug!(base_url = %config.remote.base_url, "Registered remote backend");
    }

    let local = LocalBackend::new(Some(&config.local.base_url));
    router.register(Arc::new(RetryBackend::new(Arc::new(local), attempts, delay)));
    debug!(base_url = %config.local.base_url, "Registered local backend");

    router
}

//! Provider registry: which adapters exist and which are usable.
//!
//! Built once at startup. The cloud-credential check runs at build
//! time against the loaded configuration, not per call, so the enabled
//! set is stable for the lifetime of a run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::adapter::ProviderAdapter;
use super::providers::{ClaudeProvider, GeminiProvider, OllamaProvider, OpenAiProvider};
use crate::config::ReviewConfig;

/// Lookup table from provider id to adapter, plus the enabled subset.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    enabled: BTreeSet<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the default registry from configuration.
    ///
    /// All known adapters are registered so an explicit request by
    /// name always resolves; only providers whose credentials are
    /// present in the config (or that run locally) are enabled.
    pub fn from_config(config: &ReviewConfig) -> Self {
        let mut registry = Self::new();
        registry.register_with_enabled(
            Arc::new(ClaudeProvider::from_config(config)),
            config.anthropic_api_key.is_some(),
        );
        registry.register_with_enabled(
            Arc::new(GeminiProvider::from_config(config)),
            config.gemini_api_key.is_some(),
        );
        registry.register_with_enabled(
            Arc::new(OpenAiProvider::from_config(config)),
            config.openai_api_key.is_some(),
        );
        registry.register_with_enabled(Arc::new(OllamaProvider::from_config(config)), true);

        tracing::debug!(
            enabled = ?registry.enabled,
            registered = registry.adapters.len(),
            "Provider registry built"
        );
        registry
    }

    /// Register an adapter and mark it enabled. Idempotent: registering
    /// the same id again replaces the previous adapter.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.register_with_enabled(adapter, true);
    }

    fn register_with_enabled(&mut self, adapter: Arc<dyn ProviderAdapter>, enabled: bool) {
        let id = adapter.id().to_string();
        if enabled {
            self.enabled.insert(id.clone());
        } else {
            self.enabled.remove(&id);
        }
        self.adapters.insert(id, adapter);
    }

    /// Provider ids usable for this run, sorted by name.
    pub fn enabled(&self) -> Vec<String> {
        self.enabled.iter().cloned().collect()
    }

    /// Resolve a provider id to its adapter, enabled or not.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────

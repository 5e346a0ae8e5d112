//! Model registry
//!
//! Process-wide mapping from model id to backend adapter plus its static
//! configuration. Reads run concurrently; registration, removal and reload
//! take the write lock. The registry is passed explicitly to the agent and
//! pipeline, there is no global instance.

use crate::config::BackendConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info};
use veritas_kernel::{BackendAdapter, InferenceError, InferenceResult, ModelTarget};

/// Whether `register` may overwrite an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterMode {
    /// Fail with `DuplicateModel` if the id is taken.
    #[default]
    Insert,
    /// Replace an existing entry in place.
    Replace,
}

/// A resolved registration, cheap to clone and independent of later
/// registry mutations.
#[derive(Clone)]
pub struct ResolvedBackend {
    pub model_id: String,
    pub adapter: Arc<dyn BackendAdapter>,
    pub config: Arc<BackendConfig>,
    /// Per-backend concurrency limit from `rate_limit.max_concurrent`.
    pub limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("model_id", &self.model_id)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

struct Entry {
    backend: ResolvedBackend,
    /// Registration order; higher is more recent.
    order: u64,
}

/// Summary row returned by [`ModelRegistry::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInfo {
    pub model_id: String,
    pub provider: String,
    pub capabilities: Vec<(String, f64)>,
    pub max_concurrent: usize,
    pub default: bool,
}

#[derive(Default)]
pub struct ModelRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    counter: AtomicU64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_entry(&self, adapter: Arc<dyn BackendAdapter>, config: BackendConfig) -> Entry {
        let limiter = Arc::new(Semaphore::new(config.rate_limit.max_concurrent.max(1)));
        Entry {
            backend: ResolvedBackend {
                model_id: config.model_id.clone(),
                adapter,
                config: Arc::new(config),
                limiter,
            },
            order: self.counter.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Register `adapter` under `config.model_id`.
    pub fn register(
        &self,
        adapter: Arc<dyn BackendAdapter>,
        config: BackendConfig,
        mode: RegisterMode,
    ) -> InferenceResult<()> {
        let model_id = config.model_id.clone();
        if model_id.trim().is_empty() {
            return Err(InferenceError::InvalidRequest(
                "model id must not be empty".to_string(),
            ));
        }

        let mut entries = self.entries.write();
        if mode == RegisterMode::Insert && entries.contains_key(&model_id) {
            return Err(InferenceError::DuplicateModel(model_id));
        }
        let entry = self.make_entry(adapter, config);
        let replaced = entries.insert(model_id.clone(), entry).is_some();
        info!(model_id = %model_id, replaced, "Registered backend");
        Ok(())
    }

    /// Remove a registration. Absent ids are ignored.
    pub fn unregister(&self, model_id: &str) -> bool {
        let removed = self.entries.write().remove(model_id).is_some();
        if removed {
            info!(model_id = %model_id, "Unregistered backend");
        }
        removed
    }

    /// Resolve the single best registration for `target`.
    pub fn resolve(&self, target: &ModelTarget) -> InferenceResult<ResolvedBackend> {
        self.resolve_ranked(target)?
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::ModelNotFound(target.to_string()))
    }

    /// All registrations matching `target`, best first.
    ///
    /// Capability matches rank by declared score, ties going to the most
    /// recently registered entry. Exact and default targets yield one entry.
    pub fn resolve_ranked(&self, target: &ModelTarget) -> InferenceResult<Vec<ResolvedBackend>> {
        let entries = self.entries.read();
        let ranked = match target {
            ModelTarget::Model(id) => entries
                .get(id)
                .map(|e| vec![e.backend.clone()])
                .unwrap_or_default(),
            ModelTarget::Capability(tag) => {
                let mut matches: Vec<(f64, u64, &ResolvedBackend)> = entries
                    .values()
                    .filter_map(|e| {
                        e.backend
                            .config
                            .capability_score(tag)
                            .map(|score| (score, e.order, &e.backend))
                    })
                    .collect();
                matches.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
                matches.into_iter().map(|(_, _, b)| b.clone()).collect()
            }
            ModelTarget::Default => default_entry(&entries)
                .map(|e| vec![e.backend.clone()])
                .unwrap_or_default(),
        };

        if ranked.is_empty() {
            debug!(model_target = %target, "No registration matches");
            return Err(InferenceError::ModelNotFound(target.to_string()));
        }
        Ok(ranked)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.read().contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered ids in registration order.
    pub fn model_ids(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut ids: Vec<(u64, String)> = entries
            .iter()
            .map(|(id, e)| (e.order, id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Id that `ModelTarget::Default` currently resolves to.
    pub fn default_model(&self) -> Option<String> {
        default_entry(&self.entries.read()).map(|e| e.backend.model_id.clone())
    }

    pub fn list(&self) -> Vec<RegistrationInfo> {
        let entries = self.entries.read();
        let mut rows: Vec<(u64, RegistrationInfo)> = entries
            .values()
            .map(|e| {
                let cfg = &e.backend.config;
                (
                    e.order,
                    RegistrationInfo {
                        model_id: e.backend.model_id.clone(),
                        provider: e.backend.adapter.name().to_string(),
                        capabilities: cfg
                            .capabilities
                            .iter()
                            .map(|c| (c.tag.clone(), c.score))
                            .collect(),
                        max_concurrent: cfg.rate_limit.max_concurrent,
                        default: cfg.default,
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(order, _)| *order);
        rows.into_iter().map(|(_, info)| info).collect()
    }

    /// Atomically replace the whole registration set.
    ///
    /// Calls already holding a [`ResolvedBackend`] finish against the old
    /// adapter. Duplicate ids in `registrations` fail the reload and leave the
    /// registry untouched.
    pub fn reload(
        &self,
        registrations: Vec<(Arc<dyn BackendAdapter>, BackendConfig)>,
    ) -> InferenceResult<()> {
        let mut fresh = HashMap::with_capacity(registrations.len());
        for (adapter, config) in registrations {
            let model_id = config.model_id.clone();
            if fresh.contains_key(&model_id) {
                return Err(InferenceError::DuplicateModel(model_id));
            }
            fresh.insert(model_id, self.make_entry(adapter, config));
        }
        let count = fresh.len();
        *self.entries.write() = fresh;
        info!(models = count, "Registry reloaded");
        Ok(())
    }
}

/// Entry flagged `default` (most recent wins), else the earliest registered.
fn default_entry(entries: &HashMap<String, Entry>) -> Option<&Entry> {
    entries
        .values()
        .filter(|e| e.backend.config.default)
        .max_by_key(|e| e.order)
        .or_else(|| entries.values().min_by_key(|e| e.order))
}

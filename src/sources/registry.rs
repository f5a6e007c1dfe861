//! Owner of all data sources and their execution order.

use crate::error::{BlockFlowError, Result};
use crate::sources::params::ConfigValue;
use crate::sources::source::{DataSource, DataSourceConfig, SourcePlugin};
use crate::sources::{SourceError, SourceId, SourceResult, SourceValue};
use crate::types::{SourceStatistics, DEFAULT_MAX_HISTORY};
use std::collections::HashMap;

/// Output of one `execute_all_sources()` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTickResult {
    /// Values in execution order
    pub values: Vec<(SourceId, SourceValue)>,
    /// Sources whose generator failed this pass
    pub errors: Vec<(SourceId, SourceError)>,
}

impl SourceTickResult {
    pub fn value(&self, id: &SourceId) -> Option<SourceValue> {
        self.values
            .iter()
            .find(|(source, _)| source == id)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug)]
pub struct DataSourceRegistry {
    sources: HashMap<SourceId, DataSource>,
    execution_order: Vec<SourceId>,
    /// Refreshed for every source after each execution pass
    statistics: HashMap<SourceId, SourceStatistics>,
    next_id: u64,
    /// History length for configs that do not set one
    default_max_history: usize,
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_history(default_max_history: usize) -> Self {
        Self {
            sources: HashMap::new(),
            execution_order: Vec::new(),
            statistics: HashMap::new(),
            next_id: 0,
            default_max_history: default_max_history.max(1),
        }
    }

    /// Next free `source-<n>` id
    fn generate_id(&mut self) -> SourceId {
        loop {
            self.next_id += 1;
            let id = SourceId::new(format!("source-{}", self.next_id));
            if !self.sources.contains_key(&id) {
                return id;
            }
        }
    }

    /// Build and register a source from its config. Returns the assigned id.
    pub fn add_source(&mut self, mut config: DataSourceConfig) -> SourceResult<SourceId> {
        config.max_history.get_or_insert(self.default_max_history);
        let id = match config.id.clone() {
            Some(id) => id,
            None => self.generate_id(),
        };
        let source = DataSource::from_config(id, config);
        self.insert(source)
    }

    /// Register a plugin-backed source
    pub fn add_plugin(&mut self, seed: i64, plugin: Box<dyn SourcePlugin>) -> SourceResult<SourceId> {
        let id = self.generate_id();
        self.insert(DataSource::plugin(id, seed, plugin))
    }

    pub fn insert(&mut self, source: DataSource) -> SourceResult<SourceId> {
        let id = source.id().clone();
        if self.sources.contains_key(&id) {
            return Err(SourceError::DuplicateSource(id.to_string()));
        }
        tracing::debug!("Registered {} source {} ({})", source.kind(), id, source.name());
        self.execution_order.push(id.clone());
        self.statistics.insert(id.clone(), source.statistics());
        self.sources.insert(id.clone(), source);
        Ok(id)
    }

    pub fn remove_source(&mut self, id: &SourceId) -> SourceResult<DataSource> {
        let source = self
            .sources
            .remove(id)
            .ok_or_else(|| SourceError::UnknownSource(id.to_string()))?;
        self.execution_order.retain(|s| s != id);
        self.statistics.remove(id);
        tracing::debug!("Removed source {}", id);
        Ok(source)
    }

    pub fn get(&self, id: &SourceId) -> Option<&DataSource> {
        self.sources.get(id)
    }

    pub fn get_mut(&mut self, id: &SourceId) -> Option<&mut DataSource> {
        self.sources.get_mut(id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn execution_order(&self) -> &[SourceId] {
        &self.execution_order
    }

    /// Replace the execution order. Must name every source exactly once.
    pub fn set_execution_order(&mut self, order: Vec<SourceId>) -> SourceResult<()> {
        let mut sorted_new = order.clone();
        sorted_new.sort();
        let mut sorted_current = self.execution_order.clone();
        sorted_current.sort();
        if sorted_new != sorted_current {
            return Err(SourceError::InvalidExecutionOrder);
        }
        self.execution_order = order;
        Ok(())
    }

    /// Sources in execution order
    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.execution_order
            .iter()
            .filter_map(move |id| self.sources.get(id))
    }

    /// Execute every enabled source once.
    ///
    /// A failing source is logged and reported; the rest of the pass still
    /// runs. Statistics are refreshed for all sources afterwards.
    pub fn execute_all_sources(&mut self) -> SourceTickResult {
        let mut result = SourceTickResult::default();

        for id in &self.execution_order {
            let Some(source) = self.sources.get_mut(id) else {
                continue;
            };
            if !source.is_enabled() {
                continue;
            }
            match source.execute() {
                Ok(Some(value)) => result.values.push((id.clone(), value)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Source {} failed at step {}: {}", id, source.step() + 1, e);
                    result.errors.push((id.clone(), e));
                }
            }
        }

        self.refresh_statistics();
        result
    }

    fn refresh_statistics(&mut self) {
        for (id, source) in &self.sources {
            self.statistics.insert(id.clone(), source.statistics());
        }
    }

    /// Statistics snapshot from the last execution pass
    pub fn statistics(&self) -> &HashMap<SourceId, SourceStatistics> {
        &self.statistics
    }

    pub fn reset_all(&mut self) {
        for source in self.sources.values_mut() {
            source.reset();
        }
        self.refresh_statistics();
        tracing::debug!("Reset {} sources", self.sources.len());
    }

    pub fn set_enabled(&mut self, id: &SourceId, enabled: bool) -> SourceResult<()> {
        self.sources
            .get_mut(id)
            .ok_or_else(|| SourceError::UnknownSource(id.to_string()))?
            .set_enabled(enabled);
        Ok(())
    }

    /// Apply a parameter patch to one source. Returns whether it re-initialized.
    pub fn update_params(&mut self, id: &SourceId, patch: &[(String, ConfigValue)]) -> Result<bool> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| SourceError::UnknownSource(id.to_string()))?;
        let reinit = source.update_params(patch).map_err(BlockFlowError::from)?;
        if reinit {
            self.statistics.insert(id.clone(), SourceStatistics::default());
        }
        Ok(reinit)
    }

    /// Persistable configs in execution order. Plugin sources are skipped.
    pub fn to_configs(&self) -> Vec<DataSourceConfig> {
        self.iter()
            .filter_map(|source| match source.to_config() {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!("Not saving source {}: {}", source.id(), e);
                    None
                }
            })
            .collect()
    }

    /// Replace every source with freshly built ones from `configs`
    pub fn load_configs(&mut self, configs: Vec<DataSourceConfig>) -> SourceResult<()> {
        let mut next = DataSourceRegistry::with_max_history(self.default_max_history);
        for config in configs {
            next.add_source(config)?;
        }
        *self = next;
        Ok(())
    }
}

//! A single deterministic data source.
//!
//! A [`DataSource`] owns its random stream, step counter and bounded history.
//! Two sources built from the same config (including the seed) produce
//! identical sequences for the same number of `execute()` calls.

use crate::sources::discrete::{DiscreteGenerator, DiscreteParams, DISCRETE_PARAMS};
use crate::sources::params::{find_spec, ConfigValue, ParamSpec, COMMON_PARAMS};
use crate::sources::scalar::{ScalarGenerator, ScalarParams, SCALAR_PARAMS};
use crate::sources::{
    PseudoRandomStream, SourceError, SourceId, SourceKind, SourceResult, SourceValue, ValidationError,
};
use crate::types::{RingBuffer, SourceStatistics, DEFAULT_MAX_HISTORY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Out-of-tree generator.
///
/// Plugins share the source's random stream so they stay reproducible, but
/// have no editable parameters beyond the common ones and cannot be persisted.
pub trait SourcePlugin: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Called on `init()`/`reset()` after the stream has been reseeded
    fn init(&mut self, _stream: &mut PseudoRandomStream) {}

    fn generate_next(&mut self, t: u64, stream: &mut PseudoRandomStream) -> SourceResult<SourceValue>;
}

/// The per-kind generator behind a source
pub enum SourceGenerator {
    Scalar(ScalarGenerator),
    Discrete(DiscreteGenerator),
    Plugin(Box<dyn SourcePlugin>),
}

impl std::fmt::Debug for SourceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceGenerator::Scalar(g) => f.debug_tuple("Scalar").field(g).finish(),
            SourceGenerator::Discrete(g) => f.debug_tuple("Discrete").field(g).finish(),
            SourceGenerator::Plugin(p) => f.debug_tuple("Plugin").field(&p.name()).finish(),
        }
    }
}

impl SourceGenerator {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceGenerator::Scalar(_) => SourceKind::Scalar,
            SourceGenerator::Discrete(_) => SourceKind::Discrete,
            SourceGenerator::Plugin(p) => p.kind(),
        }
    }

    fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            SourceGenerator::Scalar(_) => SCALAR_PARAMS,
            SourceGenerator::Discrete(_) => DISCRETE_PARAMS,
            SourceGenerator::Plugin(_) => &[],
        }
    }

    fn init(&mut self, stream: &mut PseudoRandomStream) {
        match self {
            SourceGenerator::Scalar(g) => g.init(),
            SourceGenerator::Discrete(g) => g.init(),
            SourceGenerator::Plugin(p) => p.init(stream),
        }
    }

    fn generate_next(&mut self, t: u64, stream: &mut PseudoRandomStream) -> SourceResult<SourceValue> {
        match self {
            SourceGenerator::Scalar(g) => g.generate_next(t, stream).map(SourceValue::Scalar),
            SourceGenerator::Discrete(g) => g.generate_next(t, stream).map(SourceValue::Discrete),
            SourceGenerator::Plugin(p) => p.generate_next(t, stream),
        }
    }

    fn set_param(&mut self, key: &str, value: &ConfigValue) -> Result<(), ValidationError> {
        match self {
            SourceGenerator::Scalar(g) => g.params_mut().set(key, value),
            SourceGenerator::Discrete(g) => g.params_mut().set(key, value),
            SourceGenerator::Plugin(_) => Err(ValidationError::UnknownParam(key.to_string())),
        }
    }

    fn get_param(&self, key: &str) -> Option<ConfigValue> {
        match self {
            SourceGenerator::Scalar(g) => g.params().get(key),
            SourceGenerator::Discrete(g) => g.params().get(key),
            SourceGenerator::Plugin(_) => None,
        }
    }

    /// Generator parameters for persistence; plugins have none
    pub fn params(&self) -> Option<SourceParams> {
        match self {
            SourceGenerator::Scalar(g) => Some(SourceParams::Scalar(g.params().clone())),
            SourceGenerator::Discrete(g) => Some(SourceParams::Discrete(g.params().clone())),
            SourceGenerator::Plugin(_) => None,
        }
    }
}

impl From<SourceParams> for SourceGenerator {
    fn from(params: SourceParams) -> Self {
        match params {
            SourceParams::Scalar(p) => SourceGenerator::Scalar(ScalarGenerator::new(p)),
            SourceParams::Discrete(p) => SourceGenerator::Discrete(DiscreteGenerator::new(p)),
        }
    }
}

/// Kind-specific parameters, tagged by `"type"` in the persisted form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceParams {
    Scalar(ScalarParams),
    Discrete(DiscreteParams),
}

impl SourceParams {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceParams::Scalar(_) => SourceKind::Scalar,
            SourceParams::Discrete(_) => SourceKind::Discrete,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Persisted form of a source.
///
/// Carries the seed, so reloading reproduces the same sequence. `id` is
/// optional so hand-written network files can let the registry assign one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SourceId>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Missing seeds are filled from the wall clock when the source is built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Missing values take the registry's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history: Option<usize>,
    #[serde(flatten)]
    pub params: SourceParams,
}

impl DataSourceConfig {
    pub fn scalar(name: impl Into<String>, params: ScalarParams) -> Self {
        Self::new(name, SourceParams::Scalar(params))
    }

    pub fn discrete(name: impl Into<String>, params: DiscreteParams) -> Self {
        Self::new(name, SourceParams::Discrete(params))
    }

    fn new(name: impl Into<String>, params: SourceParams) -> Self {
        Self {
            id: None,
            name: name.into(),
            enabled: true,
            seed: None,
            max_history: None,
            params,
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = Some(max_history);
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.params.kind()
    }
}

/// Seed derived from the wall clock, used when none is supplied
pub fn fresh_seed() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug)]
pub struct DataSource {
    id: SourceId,
    name: String,
    enabled: bool,
    seed: i64,
    /// Executions since the last init; the next execute sees `step + 1`
    step: u64,
    current_value: Option<SourceValue>,
    history: RingBuffer<SourceValue>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    stream: PseudoRandomStream,
    generator: SourceGenerator,
}

impl DataSource {
    /// Build an initialized source
    pub fn new(
        id: SourceId,
        name: impl Into<String>,
        seed: i64,
        generator: SourceGenerator,
        max_history: usize,
    ) -> Self {
        let now = Utc::now();
        let mut source = Self {
            id,
            name: name.into(),
            enabled: true,
            seed,
            step: 0,
            current_value: None,
            history: RingBuffer::new(max_history),
            created_at: now,
            last_updated: now,
            stream: PseudoRandomStream::new(seed),
            generator,
        };
        source.init();
        source
    }

    pub fn from_config(id: SourceId, config: DataSourceConfig) -> Self {
        let seed = config.seed.unwrap_or_else(fresh_seed);
        let mut source = Self::new(
            id,
            config.name,
            seed,
            config.params.into(),
            config.max_history.unwrap_or(DEFAULT_MAX_HISTORY),
        );
        source.enabled = config.enabled;
        source
    }

    /// Wrap a plugin generator
    pub fn plugin(id: SourceId, seed: i64, plugin: Box<dyn SourcePlugin>) -> Self {
        let name = plugin.name().to_string();
        Self::new(
            id,
            name,
            seed,
            SourceGenerator::Plugin(plugin),
            DEFAULT_MAX_HISTORY,
        )
    }

    pub fn to_config(&self) -> SourceResult<DataSourceConfig> {
        let params = self.generator.params().ok_or(SourceError::NotPersistable)?;
        Ok(DataSourceConfig {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            enabled: self.enabled,
            seed: Some(self.seed),
            max_history: Some(self.history.capacity()),
            params,
        })
    }

    /// Reseed the stream and clear all run state
    pub fn init(&mut self) {
        self.stream = PseudoRandomStream::new(self.seed);
        self.step = 0;
        self.current_value = None;
        self.history.clear();
        self.generator.init(&mut self.stream);
        self.last_updated = Utc::now();
    }

    pub fn reset(&mut self) {
        self.init();
    }

    /// Produce the next value.
    ///
    /// Disabled sources return their frozen value without advancing. On
    /// error the step, value and history are left untouched.
    pub fn execute(&mut self) -> SourceResult<Option<SourceValue>> {
        if !self.enabled {
            return Ok(self.current_value);
        }

        let t = self.step + 1;
        let value = self.generator.generate_next(t, &mut self.stream)?;
        let expected = self.generator.kind();
        if value.kind() != expected {
            return Err(SourceError::KindMismatch {
                expected,
                actual: value.kind(),
            });
        }
        if !value.as_f64().is_finite() {
            return Err(SourceError::NonFinite { step: t });
        }

        self.step = t;
        self.current_value = Some(value);
        self.history.push(value);
        self.last_updated = Utc::now();
        Ok(Some(value))
    }

    /// Apply a parameter patch.
    ///
    /// Every entry is validated first; if any fails nothing is applied.
    /// Returns `true` when a re-init-triggering key changed and the source
    /// was re-initialized.
    pub fn update_params(&mut self, patch: &[(String, ConfigValue)]) -> Result<bool, ValidationError> {
        let generator_specs = self.generator.param_specs();
        let mut sanitized = Vec::with_capacity(patch.len());
        for (key, value) in patch {
            let spec = find_spec(COMMON_PARAMS, key).or_else(|_| find_spec(generator_specs, key))?;
            sanitized.push((spec, spec.sanitize(value)?));
        }

        let mut reinit = false;
        for (spec, value) in sanitized {
            match spec.key {
                "name" => self.name = value.as_str().unwrap_or_default().to_string(),
                "enabled" => self.enabled = value.as_bool().unwrap_or(self.enabled),
                "seed" => self.seed = value.as_int().unwrap_or(self.seed),
                "maxHistory" => {
                    let capacity = value.as_int().unwrap_or(DEFAULT_MAX_HISTORY as i64);
                    self.history.resize(capacity.max(1) as usize);
                }
                key => self.generator.set_param(key, &value)?,
            }
            reinit |= spec.reinit;
        }

        if reinit {
            self.init();
        } else {
            self.last_updated = Utc::now();
        }
        Ok(reinit)
    }

    /// Current value of a common or generator parameter
    pub fn param(&self, key: &str) -> Option<ConfigValue> {
        match key {
            "name" => Some(ConfigValue::String(self.name.clone())),
            "enabled" => Some(ConfigValue::Bool(self.enabled)),
            "seed" => Some(ConfigValue::Int(self.seed)),
            "maxHistory" => Some(ConfigValue::Int(self.history.capacity() as i64)),
            key => self.generator.get_param(key),
        }
    }

    pub fn statistics(&self) -> SourceStatistics {
        SourceStatistics::from_values(self.history.iter().map(SourceValue::as_f64))
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.generator.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.last_updated = Utc::now();
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn current_value(&self) -> Option<SourceValue> {
        self.current_value
    }

    pub fn history(&self) -> &RingBuffer<SourceValue> {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn generator(&self) -> &SourceGenerator {
        &self.generator
    }
}

//! Categorical generator.
//!
//! Values are category indices in `[0, numCategories - 1]`. A new base value is
//! produced only when the dwell counter reaches `changeEvery`; in between the
//! previous category is held. Noise is applied on top of the held value and
//! never advances the pattern.

use crate::sources::params::{ConfigValue, ParamSpec, ParamType};
use crate::sources::{PseudoRandomStream, SourceResult, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DiscretePattern {
    /// 0, 1, …, n−1, 0, …
    #[default]
    Sequential,
    /// Bounce: 0, 1, …, n−1, n−2, …, 1, 0, 1, …
    Cyclic,
    /// Uniform draw on every change
    Random,
    /// Draw proportional to `weights`
    Weighted,
    /// Replay `customSequence`
    Custom,
}

pub static DISCRETE_PATTERN_NAMES: &[&str] = &["sequential", "cyclic", "random", "weighted", "custom"];

impl DiscretePattern {
    pub fn all() -> &'static [DiscretePattern] {
        &[
            DiscretePattern::Sequential,
            DiscretePattern::Cyclic,
            DiscretePattern::Random,
            DiscretePattern::Weighted,
            DiscretePattern::Custom,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiscretePattern::Sequential => "sequential",
            DiscretePattern::Cyclic => "cyclic",
            DiscretePattern::Random => "random",
            DiscretePattern::Weighted => "weighted",
            DiscretePattern::Custom => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for DiscretePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Largest category count accepted from an edit
pub const MAX_CATEGORIES: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscreteParams {
    pub num_categories: u32,
    pub pattern: DiscretePattern,
    /// Ticks between base-value changes
    pub change_every: u64,
    /// Probability of replacing the held value with a uniform draw
    pub noise: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_sequence: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

impl Default for DiscreteParams {
    fn default() -> Self {
        Self {
            num_categories: 4,
            pattern: DiscretePattern::Sequential,
            change_every: 1,
            noise: 0.0,
            custom_sequence: None,
            weights: None,
        }
    }
}

pub static DISCRETE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("numCategories", ParamType::Int)
        .range(1.0, MAX_CATEGORIES as f64)
        .reinit(),
    ParamSpec::new("pattern", ParamType::Choice(DISCRETE_PATTERN_NAMES)).reinit(),
    ParamSpec::new("changeEvery", ParamType::Int).range(1.0, 1.0e6),
    ParamSpec::new("noise", ParamType::Float).range(0.0, 1.0).step(0.01),
    ParamSpec::new("customSequence", ParamType::IntList)
        .range(0.0, (MAX_CATEGORIES - 1) as f64)
        .optional()
        .reinit(),
    ParamSpec::new("weights", ParamType::FloatList)
        .range(0.0, 1.0e6)
        .optional(),
];

impl DiscreteParams {
    /// Apply an already-sanitized value
    pub fn set(&mut self, key: &str, value: &ConfigValue) -> Result<(), ValidationError> {
        match key {
            "numCategories" => self.num_categories = value.as_int().unwrap_or(1).max(1) as u32,
            "pattern" => {
                self.pattern = value.as_str().and_then(DiscretePattern::from_name).ok_or_else(|| {
                    ValidationError::InvalidChoice {
                        key: key.to_string(),
                        value: format!("{:?}", value),
                    }
                })?
            }
            "changeEvery" => self.change_every = value.as_int().unwrap_or(1).max(1) as u64,
            "noise" => self.noise = value.as_float().unwrap_or_default(),
            "customSequence" => {
                self.custom_sequence = value
                    .as_list()
                    .map(|list| list.iter().map(|&v| v.max(0.0) as u32).collect())
            }
            "weights" => self.weights = value.as_list().map(<[f64]>::to_vec),
            _ => return Err(ValidationError::UnknownParam(key.to_string())),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        Some(match key {
            "numCategories" => ConfigValue::Int(self.num_categories as i64),
            "pattern" => ConfigValue::String(self.pattern.name().to_string()),
            "changeEvery" => ConfigValue::Int(self.change_every as i64),
            "noise" => ConfigValue::Float(self.noise),
            "customSequence" => match &self.custom_sequence {
                Some(seq) => ConfigValue::List(seq.iter().map(|&v| v as f64).collect()),
                None => ConfigValue::Null,
            },
            "weights" => match &self.weights {
                Some(w) => ConfigValue::List(w.clone()),
                None => ConfigValue::Null,
            },
            _ => return None,
        })
    }

    fn categories(&self) -> u32 {
        self.num_categories.max(1)
    }

    /// Weights usable for sampling: one per category, non-negative, positive sum
    fn usable_weights(&self) -> Option<&[f64]> {
        let weights = self.weights.as_deref()?;
        let valid = weights.len() == self.categories() as usize
            && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && weights.iter().sum::<f64>() > 0.0;
        valid.then_some(weights)
    }

    fn usable_sequence(&self) -> Option<&[u32]> {
        self.custom_sequence.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct DiscreteGenerator {
    params: DiscreteParams,
    /// Position in the sequential/cyclic/custom walk
    sequence_index: usize,
    /// Ticks since the base value last changed
    steps_since_change: u64,
    /// Held base value
    current: u32,
}

impl DiscreteGenerator {
    pub fn new(params: DiscreteParams) -> Self {
        let mut gen = Self {
            params,
            sequence_index: 0,
            steps_since_change: 0,
            current: 0,
        };
        gen.init();
        gen
    }

    pub fn params(&self) -> &DiscreteParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut DiscreteParams {
        &mut self.params
    }

    /// The held base value (category 0 right after init, for walk patterns
    /// the first element of the walk)
    pub fn current_category(&self) -> u32 {
        self.current
    }

    /// Rewind to position 0 without touching the random stream
    pub fn init(&mut self) {
        self.sequence_index = 0;
        self.steps_since_change = 0;
        self.current = self.value_at_index();
    }

    pub fn generate_next(&mut self, _t: u64, stream: &mut PseudoRandomStream) -> SourceResult<u32> {
        let n = self.params.categories();

        self.steps_since_change += 1;
        if self.steps_since_change >= self.params.change_every.max(1) {
            self.steps_since_change = 0;
            self.current = self.advance(stream);
        }

        let mut value = self.current;
        if self.params.noise > 0.0 && stream.random() < self.params.noise {
            value = stream.random_int(0, n as i64) as u32;
        }
        Ok(value.min(n - 1))
    }

    fn advance(&mut self, stream: &mut PseudoRandomStream) -> u32 {
        let n = self.params.categories();
        match self.params.pattern {
            DiscretePattern::Sequential | DiscretePattern::Cyclic | DiscretePattern::Custom => {
                self.sequence_index = (self.sequence_index + 1) % self.walk_period();
                self.value_at_index()
            }
            DiscretePattern::Random => stream.random_int(0, n as i64) as u32,
            DiscretePattern::Weighted => match self.params.usable_weights() {
                Some(weights) => sample_weighted(weights, stream),
                None => stream.random_int(0, n as i64) as u32,
            },
        }
    }

    /// Number of distinct positions before a walk repeats
    fn walk_period(&self) -> usize {
        let n = self.params.categories() as usize;
        match self.params.pattern {
            DiscretePattern::Cyclic if n > 1 => 2 * n - 2,
            DiscretePattern::Custom => self.params.usable_sequence().map_or(n, <[u32]>::len),
            _ => n,
        }
    }

    fn value_at_index(&self) -> u32 {
        let n = self.params.categories();
        let idx = self.sequence_index;
        let value = match self.params.pattern {
            DiscretePattern::Cyclic => {
                let period = self.walk_period();
                if n <= 1 {
                    0
                } else if idx < n as usize {
                    idx
                } else {
                    period - idx
                }
            }
            DiscretePattern::Custom => match self.params.usable_sequence() {
                Some(seq) => seq[idx % seq.len()] as usize,
                None => idx,
            },
            _ => idx,
        };
        (value as u32).min(n - 1)
    }
}

/// Cumulative sampling; zero-weight categories are never chosen
fn sample_weighted(weights: &[f64], stream: &mut PseudoRandomStream) -> u32 {
    let total: f64 = weights.iter().sum();
    let target = stream.random() * total;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = i;
        if target < cumulative {
            return i as u32;
        }
    }
    last_positive as u32
}

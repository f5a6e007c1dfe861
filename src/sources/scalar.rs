//! Continuous-valued generator.
//!
//! # Patterns
//!
//! With `t` the source step at the time of the call (already incremented, so
//! the first execute after `init()` sees `t = 1`) and
//! `θ = 2π·t·frequency + phase`:
//!
//! - [`ScalarPattern::Sine`] - `offset + amplitude·sin θ`
//! - [`ScalarPattern::Square`] - `offset + amplitude·sign(sin θ)`, `sign(0) = +1`
//! - [`ScalarPattern::Sawtooth`] - ramp from −1 to 1 over each period
//! - [`ScalarPattern::Triangle`] - piecewise-linear wave in [−1, 1], starting at 0
//! - [`ScalarPattern::RandomWalk`] - accumulator += N(drift, amplitude)
//! - [`ScalarPattern::Gaussian`] - N(offset, amplitude), independent per tick
//! - [`ScalarPattern::Step`] - ±1 alternating every `stepWidth` ticks, scaled by
//!   `stepHeight·amplitude`
//! - [`ScalarPattern::Linear`] - `offset + amplitude·t`
//! - [`ScalarPattern::Constant`] - `offset`
//!
//! Every pattern except random walk and gaussian adds N(0, noise) afterwards.
//! All results are clamped into `[min, max]` when bounds are set.

use crate::sources::params::{ConfigValue, ParamSpec, ParamType};
use crate::sources::{PseudoRandomStream, SourceError, SourceResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScalarPattern {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
    RandomWalk,
    Gaussian,
    Step,
    Linear,
    Constant,
}

/// Persisted names, in declaration order
pub static SCALAR_PATTERN_NAMES: &[&str] = &[
    "sine",
    "square",
    "sawtooth",
    "triangle",
    "randomWalk",
    "gaussian",
    "step",
    "linear",
    "constant",
];

impl ScalarPattern {
    pub fn all() -> &'static [ScalarPattern] {
        &[
            ScalarPattern::Sine,
            ScalarPattern::Square,
            ScalarPattern::Sawtooth,
            ScalarPattern::Triangle,
            ScalarPattern::RandomWalk,
            ScalarPattern::Gaussian,
            ScalarPattern::Step,
            ScalarPattern::Linear,
            ScalarPattern::Constant,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarPattern::Sine => "sine",
            ScalarPattern::Square => "square",
            ScalarPattern::Sawtooth => "sawtooth",
            ScalarPattern::Triangle => "triangle",
            ScalarPattern::RandomWalk => "randomWalk",
            ScalarPattern::Gaussian => "gaussian",
            ScalarPattern::Step => "step",
            ScalarPattern::Linear => "linear",
            ScalarPattern::Constant => "constant",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.name() == name)
    }

    /// Random walk and gaussian already carry their own randomness
    fn adds_noise(&self) -> bool {
        !matches!(self, ScalarPattern::RandomWalk | ScalarPattern::Gaussian)
    }
}

impl std::fmt::Display for ScalarPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Editable parameters of a scalar source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScalarParams {
    pub pattern: ScalarPattern,
    pub amplitude: f64,
    /// Cycles per tick
    pub frequency: f64,
    pub offset: f64,
    /// Standard deviation of additive noise
    pub noise: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub phase: f64,
    pub drift: f64,
    pub step_height: f64,
    pub step_width: u64,
}

impl Default for ScalarParams {
    fn default() -> Self {
        Self {
            pattern: ScalarPattern::Sine,
            amplitude: 1.0,
            frequency: 0.05,
            offset: 0.0,
            noise: 0.0,
            min: None,
            max: None,
            phase: 0.0,
            drift: 0.0,
            step_height: 1.0,
            step_width: 10,
        }
    }
}

pub static SCALAR_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("pattern", ParamType::Choice(SCALAR_PATTERN_NAMES)).reinit(),
    ParamSpec::new("amplitude", ParamType::Float).range(-1.0e6, 1.0e6),
    ParamSpec::new("frequency", ParamType::Float).range(0.0, 1.0).step(0.0001),
    ParamSpec::new("offset", ParamType::Float).range(-1.0e6, 1.0e6).reinit(),
    ParamSpec::new("noise", ParamType::Float).range(0.0, 1.0e6),
    ParamSpec::new("min", ParamType::Float).optional(),
    ParamSpec::new("max", ParamType::Float).optional(),
    ParamSpec::new("phase", ParamType::Float).range(-TAU, TAU),
    ParamSpec::new("drift", ParamType::Float).range(-1.0e3, 1.0e3),
    ParamSpec::new("stepHeight", ParamType::Float).range(-1.0e6, 1.0e6),
    ParamSpec::new("stepWidth", ParamType::Int).range(1.0, 1.0e6),
];

impl ScalarParams {
    /// Apply an already-sanitized value
    pub fn set(&mut self, key: &str, value: &ConfigValue) -> Result<(), ValidationError> {
        let float = || value.as_float().unwrap_or_default();
        match key {
            "pattern" => {
                self.pattern = value.as_str().and_then(ScalarPattern::from_name).ok_or_else(|| {
                    ValidationError::InvalidChoice {
                        key: key.to_string(),
                        value: format!("{:?}", value),
                    }
                })?
            }
            "amplitude" => self.amplitude = float(),
            "frequency" => self.frequency = float(),
            "offset" => self.offset = float(),
            "noise" => self.noise = float(),
            "min" => self.min = value.as_float(),
            "max" => self.max = value.as_float(),
            "phase" => self.phase = float(),
            "drift" => self.drift = float(),
            "stepHeight" => self.step_height = float(),
            "stepWidth" => self.step_width = value.as_int().unwrap_or(1).max(1) as u64,
            _ => return Err(ValidationError::UnknownParam(key.to_string())),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let opt = |v: Option<f64>| v.map(ConfigValue::Float).unwrap_or(ConfigValue::Null);
        Some(match key {
            "pattern" => ConfigValue::String(self.pattern.name().to_string()),
            "amplitude" => ConfigValue::Float(self.amplitude),
            "frequency" => ConfigValue::Float(self.frequency),
            "offset" => ConfigValue::Float(self.offset),
            "noise" => ConfigValue::Float(self.noise),
            "min" => opt(self.min),
            "max" => opt(self.max),
            "phase" => ConfigValue::Float(self.phase),
            "drift" => ConfigValue::Float(self.drift),
            "stepHeight" => ConfigValue::Float(self.step_height),
            "stepWidth" => ConfigValue::Int(self.step_width as i64),
            _ => return None,
        })
    }

    fn clamp(&self, mut value: f64) -> f64 {
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }
}

/// Triangle wave over a phase fraction in [0, 1): 0 → 1 → −1 → 0
fn triangle(frac: f64) -> f64 {
    if frac < 0.25 {
        4.0 * frac
    } else if frac < 0.75 {
        2.0 - 4.0 * frac
    } else {
        4.0 * frac - 4.0
    }
}

#[derive(Debug, Clone)]
pub struct ScalarGenerator {
    params: ScalarParams,
    /// Random-walk state, persists across ticks
    accumulated_value: f64,
}

impl ScalarGenerator {
    pub fn new(params: ScalarParams) -> Self {
        let accumulated_value = params.offset;
        Self {
            params,
            accumulated_value,
        }
    }

    pub fn params(&self) -> &ScalarParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ScalarParams {
        &mut self.params
    }

    pub fn accumulated_value(&self) -> f64 {
        self.accumulated_value
    }

    pub fn init(&mut self) {
        self.accumulated_value = self.params.offset;
    }

    pub fn generate_next(&mut self, t: u64, stream: &mut PseudoRandomStream) -> SourceResult<f64> {
        let p = &self.params;
        let tf = t as f64;
        let theta = 2.0 * PI * tf * p.frequency + p.phase;
        let frac = theta.rem_euclid(TAU) / TAU;

        let mut value = match p.pattern {
            ScalarPattern::Sine => p.offset + p.amplitude * theta.sin(),
            ScalarPattern::Square => {
                let sign = if theta.sin() >= 0.0 { 1.0 } else { -1.0 };
                p.offset + p.amplitude * sign
            }
            ScalarPattern::Sawtooth => p.offset + p.amplitude * (2.0 * frac - 1.0),
            ScalarPattern::Triangle => p.offset + p.amplitude * triangle(frac),
            ScalarPattern::RandomWalk => {
                let next = self.accumulated_value + stream.gaussian(p.drift, p.amplitude);
                self.accumulated_value = p.clamp(next);
                self.accumulated_value
            }
            ScalarPattern::Gaussian => stream.gaussian(p.offset, p.amplitude),
            ScalarPattern::Step => {
                let width = p.step_width.max(1);
                let sign = if (t / width) % 2 == 0 { 1.0 } else { -1.0 };
                p.offset + sign * p.step_height * p.amplitude
            }
            ScalarPattern::Linear => p.offset + p.amplitude * tf,
            ScalarPattern::Constant => p.offset,
        };

        if p.pattern.adds_noise() && p.noise > 0.0 {
            value += stream.gaussian(0.0, p.noise);
        }

        let value = p.clamp(value);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SourceError::NonFinite { step: t })
        }
    }
}

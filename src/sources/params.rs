//! Parameter schema for data sources.
//!
//! Edits arrive from the editor as `(key, ConfigValue)` pairs. Each key has a
//! [`ParamSpec`] declaring its type, range and granularity. Out-of-range values
//! are clamped and rounded instead of rejected; only a missing required value,
//! an unknown key or a wrong type blocks the edit.

use crate::sources::ValidationError;
use serde::{Deserialize, Serialize};

/// A loosely typed parameter value as sent by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<f64>),
    Null,
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            ConfigValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<Vec<f64>> for ConfigValue {
    fn from(v: Vec<f64>) -> Self {
        ConfigValue::List(v)
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
    Text,
    Choice(&'static [&'static str]),
    IntList,
    FloatList,
}

impl ParamType {
    fn expected(&self) -> &'static str {
        match self {
            ParamType::Float => "a finite number",
            ParamType::Int => "an integer",
            ParamType::Bool => "a boolean",
            ParamType::Text => "a string",
            ParamType::Choice(_) => "one of the listed names",
            ParamType::IntList => "a list of integers",
            ParamType::FloatList => "a list of numbers",
        }
    }
}

/// Declaration of one editable parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub ty: ParamType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub required: bool,
    /// Changing this parameter re-runs the source's `init()`
    pub reinit: bool,
}

impl ParamSpec {
    pub const fn new(key: &'static str, ty: ParamType) -> Self {
        Self {
            key,
            ty,
            min: None,
            max: None,
            step: None,
            required: true,
            reinit: false,
        }
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub const fn reinit(mut self) -> Self {
        self.reinit = true;
        self
    }

    fn wrong_type(&self) -> ValidationError {
        ValidationError::WrongType {
            key: self.key.to_string(),
            expected: self.ty.expected(),
        }
    }

    fn clamp_number(&self, v: f64) -> f64 {
        let mut v = v;
        if let Some(step) = self.step.filter(|s| *s > 0.0) {
            v = (v / step).round() * step;
        }
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }

    /// Integer-domain clamp; never passes through `f64` for in-range values
    fn clamp_int(&self, v: i64) -> i64 {
        let mut v = v;
        if let Some(step) = self.step.filter(|s| *s >= 1.0 && s.fract() == 0.0) {
            let step = step as i128;
            let rounded = (v as i128 + step / 2).div_euclid(step) * step;
            v = rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        }
        if let Some(min) = self.min {
            if (v as f64) < min {
                v = min.ceil() as i64;
            }
        }
        if let Some(max) = self.max {
            if (v as f64) > max {
                v = max.floor() as i64;
            }
        }
        v
    }

    fn finite(&self, value: &ConfigValue) -> Result<f64, ValidationError> {
        value
            .as_float()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.wrong_type())
    }

    /// Coerce a raw edit into a valid value for this parameter.
    pub fn sanitize(&self, value: &ConfigValue) -> Result<ConfigValue, ValidationError> {
        if value.is_null() {
            return if self.required {
                Err(ValidationError::Required(self.key.to_string()))
            } else {
                Ok(ConfigValue::Null)
            };
        }

        match self.ty {
            ParamType::Float => Ok(ConfigValue::Float(self.clamp_number(self.finite(value)?))),
            ParamType::Int => match value {
                ConfigValue::Int(v) => Ok(ConfigValue::Int(self.clamp_int(*v))),
                _ => {
                    let v = self.clamp_number(self.finite(value)?.round());
                    Ok(ConfigValue::Int(v.round() as i64))
                }
            },
            ParamType::Bool => value
                .as_bool()
                .map(ConfigValue::Bool)
                .ok_or_else(|| self.wrong_type()),
            ParamType::Text => value
                .as_str()
                .map(|s| ConfigValue::String(s.to_string()))
                .ok_or_else(|| self.wrong_type()),
            ParamType::Choice(choices) => {
                let name = value.as_str().ok_or_else(|| self.wrong_type())?;
                if choices.contains(&name) {
                    Ok(ConfigValue::String(name.to_string()))
                } else {
                    Err(ValidationError::InvalidChoice {
                        key: self.key.to_string(),
                        value: name.to_string(),
                    })
                }
            }
            ParamType::IntList | ParamType::FloatList => {
                let list = value.as_list().ok_or_else(|| self.wrong_type())?;
                if list.iter().any(|v| !v.is_finite()) {
                    return Err(self.wrong_type());
                }
                let round = matches!(self.ty, ParamType::IntList);
                Ok(ConfigValue::List(
                    list.iter()
                        .map(|&v| self.clamp_number(if round { v.round() } else { v }))
                        .collect(),
                ))
            }
        }
    }
}

/// Find the spec for `key` in a table
pub fn find_spec<'a>(specs: &'a [ParamSpec], key: &str) -> Result<&'a ParamSpec, ValidationError> {
    specs
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| ValidationError::UnknownParam(key.to_string()))
}

/// Parameters shared by every source kind
pub static COMMON_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("name", ParamType::Text),
    ParamSpec::new("enabled", ParamType::Bool),
    ParamSpec::new("seed", ParamType::Int).reinit(),
    ParamSpec::new("maxHistory", ParamType::Int).range(1.0, 100_000.0),
];

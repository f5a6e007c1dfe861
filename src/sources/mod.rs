//! Deterministic synthetic data sources.
//!
//! # Main Types
//!
//! - [`PseudoRandomStream`] - Park–Miller stream every generator draws from
//! - [`DataSource`] - Stateful generator with bounded history
//! - [`ScalarGenerator`] / [`DiscreteGenerator`] - Built-in pattern families
//! - [`SourcePlugin`] - Extension point for custom generators
//! - [`DataSourceRegistry`] - Owns the sources and runs them once per tick

pub mod discrete;
pub mod error;
pub mod params;
pub mod registry;
pub mod scalar;
pub mod source;
pub mod stream;

pub use discrete::{DiscreteGenerator, DiscreteParams, DiscretePattern};
pub use error::{SourceError, SourceResult, ValidationError};
pub use params::{ConfigValue, ParamSpec, ParamType};
pub use registry::{DataSourceRegistry, SourceTickResult};
pub use scalar::{ScalarGenerator, ScalarParams, ScalarPattern};
pub use source::{DataSource, DataSourceConfig, SourceGenerator, SourceParams, SourcePlugin};
pub use stream::PseudoRandomStream;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a data source
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Value family produced by a source and accepted by a consumer block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Scalar,
    Discrete,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Scalar => write!(f, "scalar"),
            SourceKind::Discrete => write!(f, "discrete"),
        }
    }
}

/// One generated value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceValue {
    Scalar(f64),
    /// Category index
    Discrete(u32),
}

impl SourceValue {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceValue::Scalar(_) => SourceKind::Scalar,
            SourceValue::Discrete(_) => SourceKind::Discrete,
        }
    }

    /// Numeric view used for statistics and charting
    pub fn as_f64(&self) -> f64 {
        match self {
            SourceValue::Scalar(v) => *v,
            SourceValue::Discrete(v) => *v as f64,
        }
    }
}

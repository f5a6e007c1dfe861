//! Error handling for blockflow-rs
//!
//! This module defines the crate-level error type and a Result alias. Each
//! subsystem keeps its own narrower error enum (`SourceError`, `EngineError`,
//! `GraphError`, `ValidationError`) which converts into [`BlockFlowError`].

use crate::engine::EngineError;
use crate::graph::GraphError;
use crate::sources::{SourceError, ValidationError};
use thiserror::Error;

/// Stage of a tick in which an engine-level failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStage {
    /// Recompiling the network after a topology change
    Compile,
    /// Forwarding source values into the engine
    Dispatch,
    /// Advancing the engine by one step
    Execute,
    /// Pulling state and readouts back out of the engine
    Extract,
}

impl std::fmt::Display for TickStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickStage::Compile => write!(f, "compile"),
            TickStage::Dispatch => write!(f, "dispatch"),
            TickStage::Execute => write!(f, "execute"),
            TickStage::Extract => write!(f, "extract"),
        }
    }
}

/// Main error type for blockflow-rs operations
#[derive(Error, Debug)]
pub enum BlockFlowError {
    /// A data source failed to generate or was misconfigured
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A parameter edit was rejected
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A graph edit could not be applied
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// The external engine rejected a call outside of a tick
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The external engine failed during a tick (fatal for the run)
    #[error("Engine failure during {stage}: {source}")]
    EngineStep {
        stage: TickStage,
        #[source]
        source: EngineError,
    },

    /// A tick was requested without an attached engine
    #[error("No engine attached")]
    EngineNotAttached,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BlockFlowError>,
    },
}

impl BlockFlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BlockFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap an engine error raised at a given tick stage
    pub fn engine_step(stage: TickStage, source: EngineError) -> Self {
        BlockFlowError::EngineStep { stage, source }
    }

    /// True if this error must stop the scheduler
    pub fn is_fatal(&self) -> bool {
        match self {
            BlockFlowError::EngineStep { .. } | BlockFlowError::EngineNotAttached => true,
            BlockFlowError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for BlockFlowError {
    fn from(err: serde_json::Error) -> Self {
        BlockFlowError::Serialization(err.to_string())
    }
}

/// Result type alias for blockflow-rs operations
pub type Result<T> = std::result::Result<T, BlockFlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BlockFlowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

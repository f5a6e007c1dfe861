//! Plugin sources with scripted behavior

use blockflow_rs::sources::{PseudoRandomStream, SourceError, SourceKind, SourcePlugin, SourceResult, SourceValue};

/// Fails on the calls listed in `fail_at` (1-based), otherwise emits the step
pub struct FlakyPlugin {
    fail_at: Vec<u64>,
    calls: u64,
}

impl FlakyPlugin {
    pub fn new(fail_at: Vec<u64>) -> Self {
        Self { fail_at, calls: 0 }
    }
}

impl SourcePlugin for FlakyPlugin {
    fn name(&self) -> &str {
        "flaky"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Scalar
    }

    fn generate_next(&mut self, t: u64, _stream: &mut PseudoRandomStream) -> SourceResult<SourceValue> {
        self.calls += 1;
        if self.fail_at.contains(&self.calls) {
            return Err(SourceError::Generator(format!("scripted failure on call {}", self.calls)));
        }
        Ok(SourceValue::Scalar(t as f64))
    }
}

/// Always fails
pub struct BrokenPlugin;

impl SourcePlugin for BrokenPlugin {
    fn name(&self) -> &str {
        "broken"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Discrete
    }

    fn generate_next(&mut self, _t: u64, _stream: &mut PseudoRandomStream) -> SourceResult<SourceValue> {
        Err(SourceError::Generator("sensor unplugged".to_string()))
    }
}

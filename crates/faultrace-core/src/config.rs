//! Configuration types for the instrumentation passes.

use serde::{Deserialize, Serialize};

/// Options consumed by the trace-injection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// File the runtime tracer writes trace records to
    pub output_filename: String,
    /// Emit per-instruction diagnostics while the pass runs
    pub verbose: bool,
    /// Maximum number of trace records the runtime tracer will emit
    /// after a triggering fault (-1 = unbounded). Passed through to
    /// every call site; the tracer enforces it.
    pub trace_budget: i32,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            output_filename: "traceOutput".to_string(),
            verbose: false,
            trace_budget: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TraceConfig::default();
        assert_eq!(config.output_filename, "traceOutput");
        assert!(!config.verbose);
        assert_eq!(config.trace_budget, -1);
    }

    #[test]
    fn test_config_serialization() {
        let config = TraceConfig {
            output_filename: "trace.bin".to_string(),
            verbose: true,
            trace_budget: 1000,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: TraceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.output_filename, deserialized.output_filename);
        assert_eq!(config.trace_budget, deserialized.trace_budget);
    }
}

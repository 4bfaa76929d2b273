//! Instrumentation passes for the faultrace fault-injection framework.
//!
//! Two tightly coupled pieces live here: a registry of pluggable
//! selectors that decide which instructions are fault-injection/trace
//! targets, and the trace injector that rewrites functions to call an
//! external runtime tracer after every selected instruction.

pub mod injector;
pub mod selector;
pub mod selectors;

pub use injector::{TraceInjector, TRACER_SYMBOL};
pub use selector::{select_targets, ClassificationLog, Selector, SelectorRegistry};
pub use selectors::MemCopyOverflowSelector;

//! Core types and utilities for the faultrace instrumentation engine.

pub mod config;
pub mod error;

pub use config::TraceConfig;
pub use error::{Error, Result};

//! CEL (Common Expression Language) expression engine for policy evaluation
//!
//! Conditions are compiled and executed by `cel-interpreter`. This module
//! adds the request context, the authorization helper functions, a compiled
//! program cache, and the fail-closed boundary the decision path relies on.

pub mod context;
pub mod convert;
pub mod engine;
pub mod error;
pub mod functions;

pub use cel_interpreter::Program;
pub use context::EvalContext;
pub use engine::{compile, CacheStats, Engine, MAX_EXPRESSION_LENGTH, MAX_NESTING_DEPTH};
pub use error::{CelError, Result};

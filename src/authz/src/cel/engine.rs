//! CEL expression engine with compiled program caching

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, ExecutionError, Program};
use dashmap::DashMap;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cel::{
    context::EvalContext,
    convert::{cel_to_json, json_to_cel},
    error::{CelError, Result},
    functions,
};

/// Longest accepted expression, in bytes
pub const MAX_EXPRESSION_LENGTH: usize = 8 * 1024;

/// Deepest accepted bracket nesting
pub const MAX_NESTING_DEPTH: usize = 128;

/// Compile an expression without touching any cache
///
/// Used by policy validation, which has no engine at hand.
pub fn compile(expr: &str) -> Result<Program> {
    check_limits(expr)?;
    // the parser can panic on some malformed literals
    match panic::catch_unwind(|| Program::compile(expr)) {
        Ok(compiled) => compiled.map_err(|e| CelError::CompilationError(format!("{:?}", e))),
        Err(_) => Err(CelError::CompilationError(
            "parser panicked on expression".to_string(),
        )),
    }
}

fn check_limits(expr: &str) -> Result<()> {
    if expr.len() > MAX_EXPRESSION_LENGTH {
        return Err(CelError::LimitExceeded(format!(
            "expression length ({} bytes) exceeds maximum ({} bytes)",
            expr.len(),
            MAX_EXPRESSION_LENGTH
        )));
    }

    let mut depth = 0usize;
    for c in expr.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(CelError::LimitExceeded(format!(
                        "nesting deeper than {}",
                        MAX_NESTING_DEPTH
                    )));
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(())
}

/// CEL engine for compiling and evaluating expressions
///
/// Cheap to clone; clones share their cache.
#[derive(Clone, Default)]
pub struct Engine {
    /// Compiled program cache (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,
}

impl Engine {
    /// Create a new CEL engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a CEL expression and cache the result
    ///
    /// # Errors
    /// Returns error if expression cannot be compiled. Failures are not cached.
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Arc::new(compile(expr)?);
        self.program_cache.insert(expr.to_string(), program.clone());

        Ok(program)
    }

    /// Evaluate a compiled program with the given context
    ///
    /// An expression that reads an absent field evaluates to `false`.
    ///
    /// # Errors
    /// Returns error if evaluation fails or result is not boolean
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext) -> Result<bool> {
        match Self::execute(program, ctx)? {
            Some(CelValue::Bool(b)) => Ok(b),
            Some(_) => Err(CelError::NonBooleanResult),
            None => Ok(false),
        }
    }

    /// Compile and evaluate an expression in one call
    pub fn evaluate_expression(&self, expr: &str, ctx: &EvalContext) -> Result<bool> {
        let program = self.compile(expr)?;
        self.evaluate(&program, ctx)
    }

    /// Evaluate an expression to an arbitrary value
    ///
    /// Absent paths evaluate to `null`.
    pub fn evaluate_value(&self, expr: &str, ctx: &EvalContext) -> Result<Value> {
        let program = self.compile(expr)?;
        Ok(Self::execute(&program, ctx)?
            .map(|value| cel_to_json(&value))
            .unwrap_or(Value::Null))
    }

    /// Fail-closed boolean evaluation
    ///
    /// Any compile error, runtime error in any evaluated operand, or
    /// non-boolean result yields `false`.
    pub fn evaluate_boolean(&self, expr: &str, ctx: &EvalContext) -> bool {
        match self.evaluate_expression(expr, ctx) {
            Ok(result) => result,
            Err(error) => {
                warn!(expression = %expr, error = %error, "Condition evaluation failed, denying");
                false
            }
        }
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.program_cache.len(),
        }
    }

    /// Run a program; `None` means the expression read an absent field
    fn execute(program: &Program, ctx: &EvalContext) -> Result<Option<CelValue>> {
        let mut cel_context = Context::default();
        for (name, value) in ctx.to_variables() {
            let _ = cel_context.add_variable(name, json_to_cel(&value));
        }
        functions::register(&mut cel_context);

        // the interpreter is not guaranteed panic-free on hostile input
        match panic::catch_unwind(AssertUnwindSafe(|| program.execute(&cel_context))) {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(ExecutionError::NoSuchKey(key))) => {
                debug!(key = ?key, "Expression read an absent field");
                Ok(None)
            }
            Ok(Err(e)) => Err(CelError::EvaluationError(e.to_string())),
            Err(_) => Err(CelError::EvaluationError(
                "expression execution panicked".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cached_programs", &self.program_cache.len())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached programs
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Principal, Resource};
    use serde_json::json;

    fn editor_context() -> EvalContext {
        EvalContext::for_request(
            &Principal::new("user123")
                .with_roles(["admin", "editor"])
                .with_attribute("department", "legal")
                .with_attribute("clearance", "secret"),
            &Resource::new("document", "doc123").with_attribute("ownerId", "user123"),
            None,
        )
    }

    #[test]
    fn test_new_engine_has_empty_caches() {
        let engine = Engine::default();
        assert_eq!(engine.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_literals_and_paths() {
        let engine = Engine::new();
        let ctx = editor_context();

        assert!(engine.evaluate_expression("true && !false", &ctx).unwrap());
        assert!(engine
            .evaluate_expression("principal.attributes.department == 'legal'", &ctx)
            .unwrap());
        assert!(engine.evaluate_expression("P.attr.department == 'legal'", &ctx).unwrap());
        assert!(engine.evaluate_expression("'editor' in P.roles", &ctx).unwrap());
        assert!(engine
            .evaluate_expression("request.resource.kind == 'document'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_helper_functions_in_conditions() {
        let engine = Engine::new();
        let ctx = editor_context();

        assert!(engine
            .evaluate_expression("hasRole(principal, 'viewer') || isOwner(principal, resource)", &ctx)
            .unwrap());
        assert!(engine
            .evaluate_expression("inList(principal.id, ['user123', 'user456'])", &ctx)
            .unwrap());
        assert!(engine
            .evaluate_expression("principal.attributes.department.startsWith('le')", &ctx)
            .unwrap());
        assert!(matches!(
            engine.evaluate_expression("hasRole('user123', 'admin')", &ctx),
            Err(CelError::EvaluationError(_))
        ));
    }

    #[test]
    fn test_programs_are_compiled_once() {
        let engine = Engine::new();
        let ctx = editor_context();

        let first = engine.compile("R.kind == 'document'").unwrap();
        let second = engine.compile("R.kind == 'document'").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(engine.evaluate(&first, &ctx).unwrap());

        engine.evaluate_expression("R.id == 'doc123'", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 2);

        // clones share the cache
        assert_eq!(engine.clone().cache_stats().size, 2);

        engine.clear_cache();
        assert_eq!(engine.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_compile_errors_are_not_cached() {
        let engine = Engine::new();

        assert!(matches!(engine.compile("principal.id == @"), Err(CelError::CompilationError(_))));
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_limits_are_enforced_before_parsing() {
        let too_long = format!("'{}' == ''", "a".repeat(MAX_EXPRESSION_LENGTH));
        assert!(matches!(compile(&too_long), Err(CelError::LimitExceeded(_))));

        let too_deep = format!("{}true{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(compile(&too_deep), Err(CelError::LimitExceeded(_))));

        assert!(compile("((true))").is_ok());
    }

    #[test]
    fn test_string_result_is_not_a_decision() {
        let engine = Engine::new();
        let result = engine.evaluate_expression("principal.id", &editor_context());
        assert!(matches!(result, Err(CelError::NonBooleanResult)));
    }

    #[test]
    fn test_absent_fields_evaluate_false() {
        let engine = Engine::new();
        let ctx = editor_context();

        assert!(!engine.evaluate_expression("resource.attributes.missing == 'x'", &ctx).unwrap());
        assert!(!engine.evaluate_expression("resource.attributes.a.b.c == 'x'", &ctx).unwrap());
        assert!(engine.evaluate_expression("has(resource.attributes.ownerId)", &ctx).unwrap());
        assert!(!engine.evaluate_expression("has(resource.attributes.missing)", &ctx).unwrap());
    }

    #[test]
    fn test_evaluate_boolean_fails_closed() {
        let engine = Engine::new();
        let ctx = editor_context();

        assert!(engine.evaluate_boolean("principal.id == 'user123'", &ctx));
        assert!(!engine.evaluate_boolean("principal.id ==", &ctx));
        assert!(!engine.evaluate_boolean("resource.attributes.a.b.c == 'x'", &ctx));
        assert!(!engine.evaluate_boolean("size(1) == 1", &ctx));
        assert!(!engine.evaluate_boolean("principal.id", &ctx));
        assert!(!engine.evaluate_boolean("principal.id.matches('[')", &ctx));
    }

    #[test]
    fn test_erroring_operand_never_yields_true() {
        let engine = Engine::new();
        let ctx = editor_context();

        // absent operand on the left of `||`
        assert!(!engine.evaluate_boolean("resource.attributes.level > 5 || true", &ctx));
        // runtime error on the left of `||`
        assert!(!engine.evaluate_boolean(
            "principal.attributes.clearance.matches('[') || principal.id == 'user123'",
            &ctx
        ));
        // runtime error on the right, reached because the left is false
        assert!(!engine.evaluate_boolean(
            "principal.id == 'bob' || hasRole(principal.id, 'admin')",
            &ctx
        ));
        // negating a failed conjunction
        assert!(!engine.evaluate_boolean("!(hasRole(principal.id, 'admin') && false)", &ctx));
        assert!(!engine.evaluate_boolean("!(resource.attributes.missing == 'x' && false)", &ctx));

        assert!(!matches!(
            engine.evaluate_expression("hasRole(principal.id, 'admin') || true", &ctx),
            Ok(true)
        ));
    }

    #[test]
    fn test_evaluate_value() {
        let engine = Engine::new();
        let ctx = editor_context();

        assert_eq!(engine.evaluate_value("P.roles", &ctx).unwrap(), json!(["admin", "editor"]));
        assert_eq!(engine.evaluate_value("size(P.roles)", &ctx).unwrap(), json!(2));
        assert_eq!(engine.evaluate_value("R.attr.missing", &ctx).unwrap(), Value::Null);
    }
}

//! Predicate-driven conditional field rules (C11).
//!
//! The predicate language itself is out of scope (spec §1 lists it as an
//! external collaborator); this module only defines the boundary a host
//! plugs an interpreter into and the small amount of logic that combines
//! the interpreter's answers into a field's effective required/omit/bounds
//! state.

use std::sync::Arc;

use crate::value::MessageView;

/// A read-only view of the message tree a predicate is evaluated against:
/// the closest enclosing message (`this`), the top-level message (`root`),
/// and, for fields inside a repeated element, that element's index.
pub struct PredicateScope<'a> {
    pub this: &'a dyn MessageView,
    pub root: &'a dyn MessageView,
    pub this_index: Option<usize>,
}

/// Pluggable predicate evaluator. A host wires in whatever expression
/// language it likes (Lua, a small hand-rolled grammar, a jq-style path
/// language); this crate only needs yes/no and numeric answers back.
pub trait PredicateEvaluator: Send + Sync {
    fn eval_bool(&self, expr: &str, scope: &PredicateScope) -> bool;
    fn eval_double(&self, expr: &str, scope: &PredicateScope) -> f64;
}

/// Evaluator used when no predicate interpreter is wired in: every
/// predicate is treated as false and every numeric query returns `NaN`,
/// so fields fall back to their static bounds exactly as if no
/// `dynamic_conditions` had been declared.
#[derive(Debug, Default)]
pub struct NoopEvaluator;

impl PredicateEvaluator for NoopEvaluator {
    fn eval_bool(&self, _expr: &str, _scope: &PredicateScope) -> bool {
        false
    }

    fn eval_double(&self, _expr: &str, _scope: &PredicateScope) -> f64 {
        f64::NAN
    }
}

/// The outcome of evaluating a field's dynamic conditions: whether it's
/// forced required, forced omitted, and any bound overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicOutcome {
    pub required: bool,
    pub omit: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DynamicOutcome {
    /// Per spec §4.9, `required` wins over `omit` when a field's
    /// conditions fire both (a pathological but possible schema).
    pub fn effectively_omitted(&self) -> bool {
        self.omit && !self.required
    }
}

/// Thin wrapper gluing a [`PredicateEvaluator`] to the four condition
/// kinds a field option bag can carry. Only invoked when a field actually
/// declares a condition; fields without one never touch this wrapper.
#[derive(Clone)]
pub struct DynamicConditions {
    evaluator: Arc<dyn PredicateEvaluator>,
}

impl DynamicConditions {
    pub fn new(evaluator: Arc<dyn PredicateEvaluator>) -> Self {
        Self { evaluator }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopEvaluator))
    }

    pub fn evaluate(
        &self,
        required_if: Option<&str>,
        omit_if: Option<&str>,
        only_if: Option<&str>,
        min_expr: Option<&str>,
        max_expr: Option<&str>,
        scope: &PredicateScope,
    ) -> DynamicOutcome {
        let mut out = DynamicOutcome::default();
        if let Some(expr) = required_if {
            out.required = self.evaluator.eval_bool(expr, scope);
        }
        if let Some(expr) = omit_if {
            out.omit = self.evaluator.eval_bool(expr, scope);
        }
        if let Some(expr) = only_if {
            if !self.evaluator.eval_bool(expr, scope) {
                out.omit = true;
            }
        }
        if let Some(expr) = min_expr {
            let v = self.evaluator.eval_double(expr, scope);
            if !v.is_nan() {
                out.min = Some(v);
            }
        }
        if let Some(expr) = max_expr {
            let v = self.evaluator.eval_double(expr, scope);
            if !v.is_nan() {
                out.max = Some(v);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MessageDescriptor;
    use crate::value::DynamicMessage;
    use std::sync::Arc as StdArc;

    #[test]
    fn noop_evaluator_never_fires() {
        let dc = DynamicConditions::noop();
        let desc = StdArc::new(MessageDescriptor::new("test.Root"));
        let msg = DynamicMessage::new(desc);
        let scope = PredicateScope { this: &msg, root: &msg, this_index: None };
        let outcome = dc.evaluate(Some("x"), Some("y"), None, None, None, &scope);
        assert!(!outcome.required);
        assert!(!outcome.omit);
    }

    #[test]
    fn required_wins_over_omit() {
        struct AlwaysTrue;
        impl PredicateEvaluator for AlwaysTrue {
            fn eval_bool(&self, _expr: &str, _scope: &PredicateScope) -> bool {
                true
            }
            fn eval_double(&self, _expr: &str, _scope: &PredicateScope) -> f64 {
                f64::NAN
            }
        }
        let dc = DynamicConditions::new(Arc::new(AlwaysTrue));
        let desc = StdArc::new(MessageDescriptor::new("test.Root"));
        let msg = DynamicMessage::new(desc);
        let scope = PredicateScope { this: &msg, root: &msg, this_index: None };
        let outcome = dc.evaluate(Some("req"), Some("omit"), None, None, None, &scope);
        assert!(outcome.required);
        assert!(outcome.omit);
        assert!(!outcome.effectively_omitted());
    }
}

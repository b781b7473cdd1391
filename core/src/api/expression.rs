//! Compiled expressions ready for evaluation.

use std::sync::Arc;

use crate::environment::ActivityContext;
use crate::eval::{EvalError, EvalOptions, EvalOptionsOverride, Evaluator, write_place};
use crate::tree::{BoundExpression, BoundLocation, RewritePath};
use crate::types::{CallableSignature, Type};
use crate::values::Value;

/// An expression bound to one environment.
///
/// Evaluating it reads the current values of the environment's locations
/// from the [`ActivityContext`] passed in. Cheap to clone and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct CompiledCallable {
    bound: Arc<BoundExpression>,
    options: EvalOptions,
}

impl CompiledCallable {
    pub(crate) fn new(bound: BoundExpression, options: EvalOptions) -> Self {
        Self {
            bound: Arc::new(bound),
            options,
        }
    }

    pub fn invoke(&self, ctx: &ActivityContext) -> Result<Value, EvalError> {
        self.run(ctx, &self.options)
    }

    /// Like [`invoke`](Self::invoke), with some evaluation options replaced.
    pub fn invoke_with(
        &self,
        ctx: &ActivityContext,
        overrides: &EvalOptionsOverride,
    ) -> Result<Value, EvalError> {
        let mut options = self.options.clone();
        options.override_with(overrides);
        self.run(ctx, &options)
    }

    fn run(&self, ctx: &ActivityContext, options: &EvalOptions) -> Result<Value, EvalError> {
        Evaluator::new(options, Some(ctx), &[], self.bound.local_count).eval(&self.bound.body)
    }

    pub fn result_type(&self) -> &Type {
        &self.bound.result_type
    }

    /// Whether the expression was rebound from a cached tree or freshly
    /// compiled.
    pub fn rewrite_path(&self) -> RewritePath {
        self.bound.path
    }

    /// The callable type of the underlying raw tree: the runtime context
    /// followed by one parameter per free identifier.
    pub fn signature(&self) -> &CallableSignature {
        &self.bound.signature
    }

    /// Environment locations the expression reads, in first-use order.
    pub fn locations(&self) -> &[BoundLocation] {
        &self.bound.locations
    }

    pub fn expression(&self) -> &BoundExpression {
        &self.bound
    }
}

/// An assignable expression: a location, a field reached from one, or an
/// element of an array or indexed collection.
#[derive(Debug, Clone)]
pub struct CompiledLocation {
    callable: CompiledCallable,
}

impl CompiledLocation {
    pub(crate) fn new(callable: CompiledCallable) -> Self {
        Self { callable }
    }

    pub fn get(&self, ctx: &ActivityContext) -> Result<Value, EvalError> {
        self.callable.invoke(ctx)
    }

    /// Stores `value`. Struct fields reached from an environment location
    /// are written in place.
    pub fn set(&self, ctx: &mut ActivityContext, value: Value) -> Result<(), EvalError> {
        let bound = &self.callable.bound;
        let value = match (&bound.result_type, value) {
            (Type::Float, Value::Int(i)) => Value::Float(i as f64),
            (ty, value) if value.conforms_to(ty) => value,
            (ty, value) => {
                return Err(EvalError::TypeMismatch {
                    expected: ty.to_string(),
                    found: value.runtime_type().to_string(),
                });
            }
        };
        let place = {
            let mut evaluator =
                Evaluator::new(&self.callable.options, Some(&*ctx), &[], bound.local_count);
            evaluator.place(&bound.body)?
        };
        let mut locals = vec![Value::Null; bound.local_count as usize];
        write_place(place, value, &mut locals, Some(ctx))
    }

    pub fn result_type(&self) -> &Type {
        self.callable.result_type()
    }

    pub fn locations(&self) -> &[BoundLocation] {
        self.callable.locations()
    }

    pub fn rewrite_path(&self) -> RewritePath {
        self.callable.rewrite_path()
    }
}

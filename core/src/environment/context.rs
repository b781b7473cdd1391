use hashbrown::HashMap;

use super::{LocationId, LocationReference};
use crate::eval::EvalError;
use crate::types::Type;
use crate::values::Value;

/// Runtime store holding the current value of each location reference.
#[derive(Debug, Clone, Default)]
pub struct ActivityContext {
    values: HashMap<LocationId, Value>,
}

impl ActivityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` in `location`. Integers widen into float locations;
    /// any other mismatch is rejected.
    pub fn set(&mut self, location: &LocationReference, value: Value) -> Result<(), EvalError> {
        let value = match (location.ty(), value) {
            (Type::Float, Value::Int(i)) => Value::Float(i as f64),
            (ty, value) if value.conforms_to(ty) => value,
            (ty, value) => {
                return Err(EvalError::TypeMismatch {
                    expected: ty.to_string(),
                    found: value.runtime_type().to_string(),
                });
            }
        };
        self.values.insert(location.id(), value);
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, location: &LocationReference, value: Value) -> Result<Self, EvalError> {
        self.set(location, value)?;
        Ok(self)
    }

    pub fn get(&self, location: &LocationReference) -> Option<&Value> {
        self.values.get(&location.id())
    }

    pub(crate) fn value(&self, id: LocationId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub(crate) fn value_mut(&mut self, id: LocationId) -> Option<&mut Value> {
        self.values.get_mut(&id)
    }

    pub(crate) fn store(&mut self, id: LocationId, value: Value) {
        self.values.insert(id, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_checks_types() {
        let x = LocationReference::new("x", Type::Float);
        let mut ctx = ActivityContext::new();
        ctx.set(&x, Value::Int(2)).unwrap();
        assert_eq!(ctx.get(&x), Some(&Value::Float(2.0)));
        assert_eq!(
            ctx.set(&x, Value::str("no")),
            Err(EvalError::TypeMismatch {
                expected: "float".to_string(),
                found: "string".to_string(),
            })
        );
    }
}

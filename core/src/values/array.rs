use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use super::{Value, lock};
use crate::eval::EvalError;
use crate::types::Type;

/// Rectangular array of any rank, stored row-major.
#[derive(Debug, Clone)]
pub struct ArrayRef {
    pub ty: Type,
    pub dims: SmallVec<[usize; 2]>,
    pub items: Arc<Mutex<Vec<Value>>>,
}

impl ArrayRef {
    pub fn new(element: Type, dims: SmallVec<[usize; 2]>, items: Vec<Value>) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), items.len());
        Self {
            ty: Type::array(element, dims.len() as u8),
            dims,
            items: Arc::new(Mutex::new(items)),
        }
    }

    /// An array of the given lengths filled with the element type's default.
    pub fn with_bounds(element: Type, dims: SmallVec<[usize; 2]>) -> Self {
        let len = dims.iter().product();
        let items = vec![Value::default_for(&element); len];
        Self::new(element, dims, items)
    }

    pub fn element_type(&self) -> Type {
        match &self.ty {
            Type::Array { element, .. } => element.as_ref().clone(),
            _ => Type::Object,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn length(&self, dimension: i64) -> Result<usize, EvalError> {
        usize::try_from(dimension)
            .ok()
            .and_then(|d| self.dims.get(d).copied())
            .ok_or(EvalError::IndexOutOfRange {
                index: dimension,
                len: self.dims.len(),
            })
    }

    fn offset(&self, indices: &[i64]) -> Result<usize, EvalError> {
        if indices.len() != self.dims.len() {
            return Err(EvalError::Internal(format!(
                "array of rank {} indexed with {} indices",
                self.dims.len(),
                indices.len()
            )));
        }
        let mut offset = 0usize;
        for (&index, &len) in indices.iter().zip(self.dims.iter()) {
            let i = usize::try_from(index)
                .ok()
                .filter(|i| *i < len)
                .ok_or(EvalError::IndexOutOfRange { index, len })?;
            offset = offset * len + i;
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[i64]) -> Result<Value, EvalError> {
        let offset = self.offset(indices)?;
        Ok(lock(&self.items)[offset].clone())
    }

    pub fn set(&self, indices: &[i64], value: Value) -> Result<(), EvalError> {
        let offset = self.offset(indices)?;
        lock(&self.items)[offset] = value;
        Ok(())
    }

    /// Runs `f` on the stored element in place, so struct elements can be
    /// updated without copying them out.
    pub fn update<R>(
        &self,
        indices: &[i64],
        f: impl FnOnce(&mut Value) -> Result<R, EvalError>,
    ) -> Result<R, EvalError> {
        let offset = self.offset(indices)?;
        let mut items = lock(&self.items);
        f(&mut items[offset])
    }
}

//! Tree-walking evaluator for typed expression trees.
//!
//! The evaluator reads environment locations from an [`ActivityContext`],
//! placeholder parameters from an argument slice (for raw trees invoked
//! directly) and compiler temporaries from its own local frame.

use smallvec::SmallVec;

use crate::environment::ActivityContext;
use crate::syntax::{BinaryOp, UnaryOp};
use crate::tree::{
    BoundLocation, CtorRef, ElementInit, Expr, ExprKind, FieldRef, IndexAccess, LocationAccess,
    MemberBinding, MethodRef,
};
use crate::types::{CtorInit, FieldDef, FieldStorage, Type};
use crate::values::{ArrayRef, ObjectRef, Value};

mod error;
mod place;


pub use error::EvalError;
pub(crate) use place::{Place, write_place};

/// Default maximum evaluation depth.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Options controlling evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    /// Maximum nesting depth of node evaluation.
    pub max_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl EvalOptions {
    /// Applies the fields set in `overrides`.
    pub fn override_with(&mut self, overrides: &EvalOptionsOverride) {
        if let Some(max_depth) = overrides.max_depth {
            self.max_depth = max_depth;
        }
    }
}

/// Per-call overrides for [`EvalOptions`]; `None` keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOptionsOverride {
    pub max_depth: Option<usize>,
}

pub struct Evaluator<'a> {
    options: &'a EvalOptions,
    context: Option<&'a ActivityContext>,
    params: &'a [Value],
    locals: Vec<Value>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        options: &'a EvalOptions,
        context: Option<&'a ActivityContext>,
        params: &'a [Value],
        local_count: u32,
    ) -> Self {
        Self {
            options,
            context,
            params,
            locals: vec![Value::Null; local_count as usize],
            depth: 0,
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        if self.depth >= self.options.max_depth {
            return Err(EvalError::DepthExceeded(self.options.max_depth));
        }
        self.depth += 1;
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Parameter(id) => self.params.get(id.0 as usize).cloned().ok_or_else(|| {
                EvalError::Internal(format!("no argument for placeholder parameter {}", id.0))
            }),
            ExprKind::Local(id) => self.locals.get(id.0 as usize).cloned().ok_or_else(|| {
                EvalError::Internal(format!("undeclared compiler temporary {}", id.0))
            }),
            ExprKind::Location(location) => self.read_location(location).cloned(),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond)?.as_bool()? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            ExprKind::Call {
                target,
                method,
                args,
            } => self.eval_call(target.as_deref(), method, args),
            ExprKind::New { ctor, args } => {
                let args = self.eval_all(args)?;
                construct(&expr.ty, ctor.as_ref(), &args)
            }
            ExprKind::Member { target, field } => self.eval_member(target.as_deref(), field),
            ExprKind::Index {
                target,
                access,
                indices,
            } => {
                let target = self.eval(target)?;
                let indices = self.eval_all(indices)?;
                index_get(&target, access, &indices)
            }
            ExprKind::MemberInit { new, bindings } => {
                let mut value = self.eval(new)?;
                self.apply_bindings(&mut value, bindings)?;
                Ok(value)
            }
            ExprKind::ListInit { new, elements } => {
                let value = self.eval(new)?;
                self.add_elements(&value, elements)?;
                Ok(value)
            }
            ExprKind::NewArrayInit {
                element,
                dims,
                items,
            } => {
                let items = self.eval_all(items)?.into_vec();
                Ok(Value::Array(ArrayRef::new(element.clone(), dims.clone(), items)))
            }
            ExprKind::NewArrayBounds {
                element,
                bounds,
                upper,
            } => {
                let mut dims = SmallVec::new();
                for bound in bounds {
                    let bound = self.eval(bound)?.as_int()?;
                    let len = if *upper { bound.checked_add(1) } else { Some(bound) };
                    let len = len.and_then(|l| usize::try_from(l).ok()).ok_or_else(|| {
                        EvalError::Native(format!("array dimension {} is out of range", bound))
                    })?;
                    dims.push(len);
                }
                Ok(Value::Array(ArrayRef::with_bounds(element.clone(), dims)))
            }
            ExprKind::TypeIs { operand, target } => {
                let value = self.eval(operand)?;
                Ok(Value::Bool(!value.is_null() && value.conforms_to(target)))
            }
            ExprKind::Convert { operand, round } => {
                let value = self.eval(operand)?;
                convert(value, &expr.ty, *round)
            }
            ExprKind::TypeAs { operand } => {
                let value = self.eval(operand)?;
                if !value.is_null() && value.conforms_to(&expr.ty) {
                    Ok(value)
                } else {
                    Ok(Value::Null)
                }
            }
            ExprKind::Block { locals, body } => {
                for local in locals {
                    let slot = self.locals.get_mut(local.id.0 as usize).ok_or_else(|| {
                        EvalError::Internal(format!("undeclared compiler temporary {}", local.name))
                    })?;
                    *slot = Value::default_for(&local.ty);
                }
                let mut last = Value::Null;
                for item in body {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
            ExprKind::Assign { target, value } => {
                let place = self.place(target)?;
                let value = self.eval(value)?;
                write_place(place, value.clone(), &mut self.locals, None)?;
                Ok(value)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<SmallVec<[Value; 4]>, EvalError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn read_location(&self, location: &BoundLocation) -> Result<&'a Value, EvalError> {
        self.context
            .and_then(|ctx| ctx.value(location.id))
            .ok_or_else(|| EvalError::UnboundLocation(location.name.to_string()))
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And => {
                if !self.eval(left)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right)?.as_bool()?))
            }
            BinaryOp::Or => {
                if self.eval(left)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right)?.as_bool()?))
            }
            _ => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(op, &left, &right)
            }
        }
    }

    fn eval_call(
        &mut self,
        target: Option<&Expr>,
        method: &MethodRef,
        args: &[Expr],
    ) -> Result<Value, EvalError> {
        let Some(def) = method.def() else {
            // ToString
            let receiver = match target {
                Some(target) => self.eval(target)?,
                None => return Err(EvalError::Internal("ToString without a receiver".into())),
            };
            if receiver.is_null() {
                return Err(EvalError::NullReference("ToString".to_string()));
            }
            return Ok(Value::str(&receiver.to_text()));
        };
        let mut all: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
        if !def.is_static {
            let target = target.ok_or_else(|| {
                EvalError::Internal(format!("instance method {} without a receiver", def.name))
            })?;
            let receiver = self.eval(target)?;
            if receiver.is_null() {
                return Err(EvalError::NullReference(def.name.clone()));
            }
            all.push(receiver);
        }
        for arg in args {
            all.push(self.eval(arg)?);
        }
        (def.native)(&all)
    }

    fn eval_member(&mut self, target: Option<&Expr>, field: &FieldRef) -> Result<Value, EvalError> {
        let def = field_def(field)?;
        let Some(target) = target else {
            return match def.storage {
                FieldStorage::Computed(getter) => getter(&[]),
                FieldStorage::Slot(_) => Err(EvalError::Internal(format!(
                    "stored field {} read without a receiver",
                    def.name
                ))),
            };
        };
        // Value-type containers bound by reference are read in place.
        if let ExprKind::Location(location) = &target.kind {
            if location.access == LocationAccess::Reference {
                let receiver = self.read_location(location)?;
                return read_field(receiver, def);
            }
        }
        let receiver = self.eval(target)?;
        read_field(&receiver, def)
    }

    fn apply_bindings(
        &mut self,
        target: &mut Value,
        bindings: &[MemberBinding],
    ) -> Result<(), EvalError> {
        for binding in bindings {
            match binding {
                MemberBinding::Assign { field, value } => {
                    let value = self.eval(value)?;
                    set_field(target, field_def(field)?, value)?;
                }
                MemberBinding::Nested { field, bindings } => {
                    let def = field_def(field)?;
                    let mut inner = read_field(target, def)?;
                    self.apply_bindings(&mut inner, bindings)?;
                    set_field(target, def, inner)?;
                }
                MemberBinding::List { field, elements } => {
                    let collection = read_field(target, field_def(field)?)?;
                    self.add_elements(&collection, elements)?;
                }
            }
        }
        Ok(())
    }

    fn add_elements(
        &mut self,
        collection: &Value,
        elements: &[ElementInit],
    ) -> Result<(), EvalError> {
        if collection.is_null() {
            return Err(EvalError::NullReference("collection initializer".to_string()));
        }
        for element in elements {
            let add = element.add.def().ok_or_else(|| {
                EvalError::Internal("collection initializer without an Add method".to_string())
            })?;
            let mut all: SmallVec<[Value; 4]> = SmallVec::new();
            all.push(collection.clone());
            for arg in &element.args {
                all.push(self.eval(arg)?);
            }
            (add.native)(&all)?;
        }
        Ok(())
    }

    /// Resolves an assignable expression to the storage it denotes.
    pub(crate) fn place(&mut self, expr: &Expr) -> Result<Place, EvalError> {
        place::resolve(self, expr)
    }
}

fn field_def(field: &FieldRef) -> Result<&FieldDef, EvalError> {
    field.field().ok_or_else(|| {
        EvalError::Internal(format!(
            "field {} is not declared by {}",
            field.index,
            field.def.full_name()
        ))
    })
}

fn slot_of(def: &FieldDef) -> Result<usize, EvalError> {
    match def.storage {
        FieldStorage::Slot(slot) => Ok(slot),
        FieldStorage::Computed(_) => Err(EvalError::Internal(format!(
            "{} is computed and cannot be stored",
            def.name
        ))),
    }
}

fn read_field(receiver: &Value, def: &FieldDef) -> Result<Value, EvalError> {
    if receiver.is_null() {
        return Err(EvalError::NullReference(def.name.clone()));
    }
    match def.storage {
        FieldStorage::Computed(getter) => getter(core::slice::from_ref(receiver)),
        FieldStorage::Slot(slot) => match receiver {
            Value::Struct(s) => s.fields.get(slot).cloned().ok_or_else(|| {
                EvalError::Internal(format!("no field slot {} on {}", slot, s.ty))
            }),
            Value::Object(o) => o.get(slot),
            other => Err(EvalError::TypeMismatch {
                expected: format!("instance declaring {}", def.name),
                found: other.runtime_type().to_string(),
            }),
        },
    }
}

fn set_field(target: &mut Value, def: &FieldDef, value: Value) -> Result<(), EvalError> {
    let slot = slot_of(def)?;
    match target {
        Value::Struct(s) => {
            let ty = s.ty.clone();
            let field = s
                .fields
                .get_mut(slot)
                .ok_or_else(|| EvalError::Internal(format!("no field slot {} on {}", slot, ty)))?;
            *field = value;
            Ok(())
        }
        Value::Object(o) => o.set(slot, value),
        Value::Null => Err(EvalError::NullReference(def.name.clone())),
        other => Err(EvalError::TypeMismatch {
            expected: format!("instance declaring {}", def.name),
            found: other.runtime_type().to_string(),
        }),
    }
}

/// A fresh instance of `ty` with every stored field at its default.
fn default_instance(ty: &Type) -> Result<Value, EvalError> {
    match ty {
        Type::Named { def, args } if ty.is_reference_type() => {
            let fields = def
                .fields
                .iter()
                .filter(|f| matches!(f.storage, FieldStorage::Slot(_)))
                .map(|f| Value::default_for(&f.ty.substitute(args)))
                .collect();
            Ok(Value::Object(ObjectRef::new(ty.clone(), fields)))
        }
        ty if ty.is_struct() => Ok(Value::default_for(ty)),
        other => Err(EvalError::Internal(format!("cannot instantiate {}", other))),
    }
}

fn construct(ty: &Type, ctor: Option<&CtorRef>, args: &[Value]) -> Result<Value, EvalError> {
    let Some(ctor) = ctor else {
        return default_instance(ty);
    };
    let def = ctor.ctor().ok_or_else(|| {
        EvalError::Internal(format!("constructor {} is not declared by {}", ctor.index, ty))
    })?;
    match def.init {
        CtorInit::Native(native) => native(ty, args),
        CtorInit::Fields => {
            let mut value = default_instance(ty)?;
            let slots = ctor
                .def
                .fields
                .iter()
                .filter(|f| matches!(f.storage, FieldStorage::Slot(_)));
            for (field, arg) in slots.zip(args) {
                set_field(&mut value, field, arg.clone())?;
            }
            Ok(value)
        }
    }
}

fn index_get(target: &Value, access: &IndexAccess, indices: &[Value]) -> Result<Value, EvalError> {
    if target.is_null() {
        return Err(EvalError::NullReference("indexer".to_string()));
    }
    match access {
        IndexAccess::Array => {
            let Value::Array(array) = target else {
                return Err(EvalError::TypeMismatch {
                    expected: "array".to_string(),
                    found: target.runtime_type().to_string(),
                });
            };
            let indices = int_indices(indices)?;
            array.get(&indices)
        }
        IndexAccess::Defined(def) => {
            let indexer = access.indexer().ok_or_else(|| {
                EvalError::Internal(format!("{} declares no indexer", def.full_name()))
            })?;
            let mut all: SmallVec<[Value; 4]> = SmallVec::new();
            all.push(target.clone());
            all.extend(indices.iter().cloned());
            (indexer.get)(&all)
        }
    }
}

pub(crate) fn int_indices(indices: &[Value]) -> Result<SmallVec<[i64; 2]>, EvalError> {
    indices.iter().map(Value::as_int).collect()
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
        (op, Value::Null) => Err(EvalError::NullReference(format!("operand of {:?}", op))),
        (op, other) => Err(EvalError::TypeMismatch {
            expected: format!("operand of {:?}", op),
            found: other.runtime_type().to_string(),
        }),
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::IntDiv
        | BinaryOp::Rem => arithmetic(op, left, right),
        BinaryOp::RealDiv => Ok(Value::Float(left.as_float()? / right.as_float()?)),
        BinaryOp::Concat => {
            let mut out = left.to_text();
            out.push_str(&right.to_text());
            Ok(Value::str(&out))
        }
        BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            use core::cmp::Ordering;
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Some(Ordering::Less),
                BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                BinaryOp::Gt => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            }))
        }
        BinaryOp::And | BinaryOp::BitAnd => logical(op, left, right, |a, b| a & b, |a, b| a & b),
        BinaryOp::Or | BinaryOp::BitOr => logical(op, left, right, |a, b| a | b, |a, b| a | b),
        BinaryOp::Xor => logical(op, left, right, |a, b| a ^ b, |a, b| a ^ b),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        return Ok(Value::Int(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Rem if b == 0 => return Err(EvalError::DivideByZero),
            BinaryOp::Rem => a.wrapping_rem(b),
            _ if b == 0 => return Err(EvalError::DivideByZero),
            _ => a.wrapping_div(b),
        }));
    }
    let (a, b) = (left.as_float()?, right.as_float()?);
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Rem => a % b,
        BinaryOp::IntDiv => (a / b).trunc(),
        _ => a / b,
    }))
}

fn compare(left: &Value, right: &Value) -> Result<Option<core::cmp::Ordering>, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Null, _) | (_, Value::Null) => {
            Err(EvalError::NullReference("comparison operand".to_string()))
        }
        _ => Ok(left.as_float()?.partial_cmp(&right.as_float()?)),
    }
}

fn logical(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    on_bool: fn(bool, bool) -> bool,
    on_int: fn(i64, i64) -> i64,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(on_bool(*a, *b))),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(on_int(*a, *b))),
        (l, r) => Err(EvalError::TypeMismatch {
            expected: format!("operands of `{}`", op.symbol()),
            found: format!("{} and {}", l.runtime_type(), r.runtime_type()),
        }),
    }
}

/// Explicit conversion of `value` to `target`.
pub(crate) fn convert(value: Value, target: &Type, round: bool) -> Result<Value, EvalError> {
    let invalid = |value: &Value| EvalError::InvalidCast {
        from: value.runtime_type().to_string(),
        to: target.to_string(),
    };
    match (target, value) {
        (Type::Object, value) => Ok(value),
        (Type::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (Type::Int, Value::Float(f)) => {
            let f = if round { f.round_ties_even() } else { f.trunc() };
            if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Ok(Value::Int(f as i64))
            } else {
                Err(invalid(&Value::Float(f)))
            }
        }
        (Type::Int, Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid(&Value::Str(s))),
        (Type::Float, Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid(&Value::Str(s))),
        (Type::Bool, Value::Str(s)) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            t if t.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(invalid(&Value::Str(s.clone()))),
        },
        (Type::String, value @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
            Ok(Value::str(&value.to_text()))
        }
        (ty, Value::Null) if ty.is_reference_type() => Ok(Value::Null),
        (ty, Value::Null) => Err(EvalError::NullReference(format!("conversion to {}", ty))),
        (ty, value) if value.conforms_to(ty) => Ok(value),
        (_, value) => Err(invalid(&value)),
    }
}

use smallvec::SmallVec;

use super::{EvalError, Evaluator, int_indices, slot_of};
use crate::environment::{ActivityContext, LocationId};
use crate::tree::{Expr, ExprKind, IndexAccess, LocalId, LocationAccess};
use crate::types::NativeFn;
use crate::values::{ArrayRef, ObjectRef, Value, lock};

/// Storage an assignable expression denotes.
///
/// `path` lists the struct field slots to descend through from the root, so
/// `p.Start.X = 1` on a struct location writes into the stored value rather
/// than a copy of it.
#[derive(Debug)]
pub(crate) struct Place {
    root: Root,
    path: SmallVec<[usize; 4]>,
}

#[derive(Debug)]
enum Root {
    Location {
        id: LocationId,
        name: String,
        access: LocationAccess,
    },
    Local(LocalId),
    Field {
        object: ObjectRef,
        slot: usize,
    },
    Element {
        array: ArrayRef,
        indices: SmallVec<[i64; 2]>,
    },
    Indexer {
        get: NativeFn,
        set: NativeFn,
        receiver: Value,
        args: SmallVec<[Value; 2]>,
    },
}

pub(super) fn resolve(eval: &mut Evaluator<'_>, expr: &Expr) -> Result<Place, EvalError> {
    let root = match &expr.kind {
        ExprKind::Location(location) => Root::Location {
            id: location.id,
            name: location.name.to_string(),
            access: location.access,
        },
        ExprKind::Local(id) => Root::Local(*id),
        ExprKind::Member {
            target: Some(target),
            field,
        } => {
            let def = field
                .field()
                .ok_or_else(|| EvalError::Internal(format!("unknown field {}", field.index)))?;
            let slot = slot_of(def)?;
            if target.ty.is_struct() {
                let mut place = resolve(eval, target)?;
                place.path.push(slot);
                return Ok(place);
            }
            match eval.eval(target)? {
                Value::Object(object) => Root::Field { object, slot },
                Value::Null => return Err(EvalError::NullReference(def.name.clone())),
                other => {
                    return Err(EvalError::TypeMismatch {
                        expected: format!("instance declaring {}", def.name),
                        found: other.runtime_type().to_string(),
                    });
                }
            }
        }
        ExprKind::Index {
            target,
            access,
            indices,
        } => {
            let receiver = eval.eval(target)?;
            let mut args: SmallVec<[Value; 2]> = SmallVec::new();
            for index in indices {
                args.push(eval.eval(index)?);
            }
            match (access, receiver) {
                (_, Value::Null) => return Err(EvalError::NullReference("indexer".to_string())),
                (IndexAccess::Array, Value::Array(array)) => Root::Element {
                    array,
                    indices: int_indices(&args)?,
                },
                (IndexAccess::Defined(def), receiver) => {
                    let indexer = access.indexer().ok_or_else(|| {
                        EvalError::Internal(format!("{} declares no indexer", def.full_name()))
                    })?;
                    let set = indexer.set.ok_or_else(|| {
                        EvalError::Internal(format!("indexer of {} is read-only", def.full_name()))
                    })?;
                    Root::Indexer {
                        get: indexer.get,
                        set,
                        receiver,
                        args,
                    }
                }
                (IndexAccess::Array, other) => {
                    return Err(EvalError::TypeMismatch {
                        expected: "array".to_string(),
                        found: other.runtime_type().to_string(),
                    });
                }
            }
        }
        _ => {
            return Err(EvalError::Internal(
                "expression does not denote assignable storage".to_string(),
            ));
        }
    };
    Ok(Place {
        root,
        path: SmallVec::new(),
    })
}

/// Writes `value` into `place`. Environment locations are only writable when
/// `context` is supplied.
pub(crate) fn write_place(
    place: Place,
    value: Value,
    locals: &mut [Value],
    context: Option<&mut ActivityContext>,
) -> Result<(), EvalError> {
    let Place { root, path } = place;
    match root {
        Root::Location { id, name, access } => {
            let Some(context) = context else {
                return Err(EvalError::Internal(format!(
                    "location '{}' is not writable here",
                    name
                )));
            };
            if path.is_empty() {
                context.store(id, value);
                return Ok(());
            }
            if access != LocationAccess::Reference {
                return Err(EvalError::Internal(format!(
                    "value-type location '{}' is bound by value",
                    name
                )));
            }
            let slot = context
                .value_mut(id)
                .ok_or(EvalError::UnboundLocation(name))?;
            write_path(slot, &path, value)
        }
        Root::Local(id) => {
            let slot = locals.get_mut(id.0 as usize).ok_or_else(|| {
                EvalError::Internal(format!("undeclared compiler temporary {}", id.0))
            })?;
            write_path(slot, &path, value)
        }
        Root::Field { object, slot } => {
            let mut fields = lock(&object.fields);
            let len = fields.len();
            let field = fields.get_mut(slot).ok_or_else(|| {
                EvalError::Internal(format!("no field slot {} of {} on {}", slot, len, object.ty))
            })?;
            write_path(field, &path, value)
        }
        Root::Element { array, indices } => {
            array.update(&indices, |slot| write_path(slot, &path, value))
        }
        Root::Indexer {
            get,
            set,
            receiver,
            args,
        } => {
            let mut all: SmallVec<[Value; 4]> = SmallVec::new();
            all.push(receiver);
            all.extend(args);
            let value = if path.is_empty() {
                value
            } else {
                let mut current = get(&all)?;
                write_path(&mut current, &path, value)?;
                current
            };
            all.push(value);
            set(&all).map(|_| ())
        }
    }
}

fn write_path(slot: &mut Value, path: &[usize], value: Value) -> Result<(), EvalError> {
    let Some((&first, rest)) = path.split_first() else {
        *slot = value;
        return Ok(());
    };
    match slot {
        Value::Struct(s) => {
            let ty = s.ty.clone();
            let field = s
                .fields
                .get_mut(first)
                .ok_or_else(|| EvalError::Internal(format!("no field slot {} on {}", first, ty)))?;
            write_path(field, rest, value)
        }
        Value::Null => Err(EvalError::NullReference("struct field".to_string())),
        other => Err(EvalError::TypeMismatch {
            expected: "struct".to_string(),
            found: other.runtime_type().to_string(),
        }),
    }
}

use std::sync::Arc;

use smallvec::SmallVec;

use super::{Candidate, CheckResult, Checker, error, field_type};
use crate::backend::codes;
use crate::syntax::{self, ArrayItem, InitValue, Initializer, MemberInit, Node, Span, TypeName};
use crate::tree::{CtorRef, ElementInit, Expr, ExprKind, MemberBinding, MethodRef};
use crate::types::{FieldStorage, Type, TypeDef, TypeDefKind};
use crate::values::Value;

impl Checker<'_> {
    pub(super) fn new_object(
        &mut self,
        name: &TypeName,
        args: &[Node],
        init: Option<&Initializer>,
        span: Span,
    ) -> CheckResult<Expr> {
        let ty = self.resolve_type(name)?;
        let def = match &ty {
            Type::Named { def, .. } if def.is_instantiable() => def.clone(),
            _ => {
                return Err(error(
                    codes::UNKNOWN_TYPE,
                    format!("cannot create an instance of type '{}'", ty),
                    name.span,
                ));
            }
        };
        let args = self.check_all(args)?;

        // Structs always have an implicit parameterless constructor.
        let implicit = def.constructors.is_empty()
            || (args.is_empty()
                && def.kind == TypeDefKind::Struct
                && !def.constructors.iter().any(|c| c.params.is_empty()));
        let (ctor, args) = if implicit {
            if !args.is_empty() {
                return Err(error(
                    codes::NO_OVERLOAD,
                    format!("type '{}' has no constructor taking {} arguments", ty, args.len()),
                    span,
                ));
            }
            (None, args)
        } else {
            let candidates = def
                .constructors
                .iter()
                .enumerate()
                .map(|(index, ctor)| Candidate {
                    def: def.clone(),
                    index,
                    params: ctor.params.iter().map(|p| p.substitute(ty.type_args())).collect(),
                    ret: Type::Void,
                })
                .collect();
            let what = format!("the constructor of '{}'", ty);
            let (chosen, args) = self.pick_overload(candidates, args, span, &what)?;
            let ctor = CtorRef {
                def: chosen.def,
                index: chosen.index,
            };
            (Some(ctor), args)
        };

        let new = Expr::new(ty.clone(), ExprKind::New { ctor, args }, span);
        let kind = match init {
            None => return Ok(new),
            Some(Initializer::Object(members)) => ExprKind::MemberInit {
                new: Box::new(new),
                bindings: self.member_bindings(&ty, members)?,
            },
            Some(Initializer::Collection(items)) => ExprKind::ListInit {
                new: Box::new(new),
                elements: self.element_inits(&ty, items, span)?,
            },
        };
        Ok(Expr::new(ty, kind, span))
    }

    fn member_bindings(
        &mut self,
        owner: &Type,
        members: &[MemberInit],
    ) -> CheckResult<Vec<MemberBinding>> {
        let mut bindings = Vec::with_capacity(members.len());
        for member in members {
            let field = self.find_field(owner, &member.name, false).ok_or_else(|| {
                error(
                    codes::UNKNOWN_MEMBER,
                    format!("type '{}' has no member named '{}'", owner, member.name),
                    member.span,
                )
            })?;
            let (stored, readonly) = field
                .field()
                .map(|f| (matches!(f.storage, FieldStorage::Slot(_)), f.readonly))
                .unwrap_or((false, true));
            let field_ty = field_type(&field, owner);
            let binding = match &member.value {
                InitValue::Expr(node) => {
                    if !stored || readonly {
                        return Err(error(
                            codes::NOT_ASSIGNABLE,
                            format!("member '{}' of '{}' cannot be assigned", member.name, owner),
                            member.span,
                        ));
                    }
                    let value = self.check_expr(node)?;
                    if !field_ty.is_assignable_from(&value.ty) {
                        return Err(error(
                            codes::TYPE_MISMATCH,
                            format!(
                                "cannot implicitly convert type '{}' to '{}'",
                                value.ty, field_ty
                            ),
                            node.span,
                        ));
                    }
                    MemberBinding::Assign {
                        field,
                        value: value.convert_to(&field_ty),
                    }
                }
                InitValue::Nested(Initializer::Object(inner)) => {
                    if !stored {
                        return Err(error(
                            codes::NOT_ASSIGNABLE,
                            format!("member '{}' of '{}' cannot be initialized", member.name, owner),
                            member.span,
                        ));
                    }
                    MemberBinding::Nested {
                        field,
                        bindings: self.member_bindings(&field_ty, inner)?,
                    }
                }
                InitValue::Nested(Initializer::Collection(items)) => MemberBinding::List {
                    field,
                    elements: self.element_inits(&field_ty, items, member.span)?,
                },
            };
            bindings.push(binding);
        }
        Ok(bindings)
    }

    /// Each element becomes a call to the collection's `Add` overload.
    fn element_inits(
        &mut self,
        collection: &Type,
        items: &[syntax::ElementInit],
        span: Span,
    ) -> CheckResult<Vec<ElementInit>> {
        let type_args = collection.type_args();
        let adds: Vec<(Arc<TypeDef>, usize, Vec<Type>)> = self
            .registry
            .members_of(collection)
            .into_iter()
            .flat_map(|def| {
                def.methods
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| !m.is_static && self.language.names_equal(&m.name, "Add"))
                    .map(|(index, m)| {
                        let params = m.params.iter().map(|p| p.substitute(type_args)).collect();
                        (def.clone(), index, params)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        if adds.is_empty() {
            return Err(error(
                codes::UNKNOWN_MEMBER,
                format!(
                    "type '{}' has no 'Add' method and cannot be initialized as a collection",
                    collection
                ),
                span,
            ));
        }
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            let args = self.check_all(&item.args)?;
            let candidates = adds
                .iter()
                .map(|(def, index, params)| Candidate {
                    def: def.clone(),
                    index: *index,
                    params: params.clone(),
                    ret: Type::Void,
                })
                .collect();
            let (chosen, args) = self.pick_overload(candidates, args, item.span, "'Add'")?;
            elements.push(ElementInit {
                add: MethodRef::Defined {
                    def: chosen.def,
                    index: chosen.index,
                },
                args,
            });
        }
        Ok(elements)
    }

    pub(super) fn new_array(
        &mut self,
        element: &TypeName,
        rank: u8,
        bounds: &[Node],
        upper: bool,
        items: Option<&[ArrayItem]>,
        span: Span,
    ) -> CheckResult<Expr> {
        let element_ty = self.resolve_type(element)?;
        let array_ty = Type::array(element_ty.clone(), rank);
        let bounds = self.check_all(bounds)?;
        if let Some(bound) = bounds.iter().find(|b| b.ty != Type::Int) {
            return Err(error(
                codes::TYPE_MISMATCH,
                format!("array size must be of type 'int', found '{}'", bound.ty),
                bound.span,
            ));
        }

        let Some(items) = items else {
            if bounds.len() != usize::from(rank) {
                return Err(error(
                    codes::INVALID_OPERATOR,
                    "array creation needs a size for every dimension or an initializer",
                    span,
                ));
            }
            return Ok(Expr::new(
                array_ty,
                ExprKind::NewArrayBounds {
                    element: element_ty,
                    bounds,
                    upper,
                },
                span,
            ));
        };

        let rank = usize::from(rank);
        let mut dims = SmallVec::new();
        let mut flat = Vec::new();
        self.flatten_items(items, rank, 0, &mut dims, &mut flat, &element_ty)?;
        while dims.len() < rank {
            dims.push(0);
        }
        for (bound, &len) in bounds.iter().zip(dims.iter()) {
            let ExprKind::Constant(Value::Int(n)) = &bound.kind else {
                return Err(error(
                    codes::TYPE_MISMATCH,
                    "array size must be a constant when an initializer is given",
                    bound.span,
                ));
            };
            let expected = if upper { n.checked_add(1) } else { Some(*n) };
            if expected != i64::try_from(len).ok() {
                return Err(error(
                    codes::TYPE_MISMATCH,
                    format!("array initializer has {} elements, expected {}", len, n),
                    bound.span,
                ));
            }
        }
        Ok(Expr::new(
            array_ty,
            ExprKind::NewArrayInit {
                element: element_ty,
                dims,
                items: flat,
            },
            span,
        ))
    }

    /// Flattens a rectangular initializer row-major, recording the length
    /// of each dimension.
    fn flatten_items(
        &mut self,
        items: &[ArrayItem],
        rank: usize,
        level: usize,
        dims: &mut SmallVec<[usize; 2]>,
        out: &mut Vec<Expr>,
        element: &Type,
    ) -> CheckResult<()> {
        match dims.get(level) {
            None => dims.push(items.len()),
            Some(&len) if len != items.len() => {
                let span = items
                    .first()
                    .map(item_span)
                    .unwrap_or_default();
                return Err(error(
                    codes::TYPE_MISMATCH,
                    format!("array initializer of length {} expected, found {}", len, items.len()),
                    span,
                ));
            }
            Some(_) => {}
        }
        for item in items {
            match item {
                ArrayItem::Nested(inner, _) if level + 1 < rank => {
                    self.flatten_items(inner, rank, level + 1, dims, out, element)?;
                }
                ArrayItem::Expr(node) if level + 1 == rank => {
                    let value = self.check_expr(node)?;
                    if !element.is_assignable_from(&value.ty) {
                        return Err(error(
                            codes::TYPE_MISMATCH,
                            format!("cannot implicitly convert type '{}' to '{}'", value.ty, element),
                            node.span,
                        ));
                    }
                    out.push(value.convert_to(element));
                }
                ArrayItem::Nested(_, span) => {
                    return Err(error(
                        codes::TYPE_MISMATCH,
                        "nested array initializer not expected here",
                        *span,
                    ));
                }
                ArrayItem::Expr(node) => {
                    return Err(error(
                        codes::TYPE_MISMATCH,
                        "a nested array initializer is expected",
                        node.span,
                    ));
                }
            }
        }
        Ok(())
    }
}

fn item_span(item: &ArrayItem) -> Span {
    match item {
        ArrayItem::Expr(node) => node.span,
        ArrayItem::Nested(_, span) => *span,
    }
}

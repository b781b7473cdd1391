//! Type checker shared by both dialects.
//!
//! Lowers an untyped [`Node`] into a typed [`Expr`]. Free identifiers are
//! typed through the request's lookup and become placeholder parameters;
//! every other name must resolve to a type or namespace of the loaded
//! assemblies. The checker stops at the first error; warnings accumulate.

use std::sync::Arc;

use tracing::trace;

use super::codes;
use super::registry::TypeRegistry;
use super::{BackendDiagnostic, TypeLookup};
use crate::assembly::NamespaceSet;
use crate::syntax::{CastKind, Language, Literal, Node, NodeKind, Span, TypeName};
use crate::tree::{Expr, ExprKind, FieldRef, IndexAccess, MethodRef, ParamDecl, ParamId};
use crate::types::{Type, TypeDef, TypeDefKind};
use crate::values::Value;

mod creation;
mod operators;

#[cfg(test)]
mod checker_test;

pub(super) type CheckResult<T> = Result<T, BackendDiagnostic>;

fn error(code: &'static str, message: impl Into<String>, span: Span) -> BackendDiagnostic {
    BackendDiagnostic::error(code, message, span)
}

/// What a name or member path denotes.
enum Resolved {
    Value(Expr),
    Type(Type, Span),
    Namespace(String, Span),
}

/// A method or constructor considered during overload resolution.
struct Candidate {
    def: Arc<TypeDef>,
    index: usize,
    params: Vec<Type>,
    ret: Type,
}

pub(super) struct Checker<'a> {
    language: Language,
    registry: &'a TypeRegistry,
    namespaces: &'a NamespaceSet,
    lookup: TypeLookup<'a>,
    free: Vec<ParamDecl>,
    next_local: u32,
    warnings: Vec<BackendDiagnostic>,
}

impl<'a> Checker<'a> {
    pub(super) fn new(
        language: Language,
        registry: &'a TypeRegistry,
        namespaces: &'a NamespaceSet,
        lookup: TypeLookup<'a>,
    ) -> Self {
        Self {
            language,
            registry,
            namespaces,
            lookup,
            free: Vec::new(),
            next_local: 0,
            warnings: Vec::new(),
        }
    }

    /// Checks `root` and, with a target type, converts the result to it.
    pub(super) fn check(&mut self, root: &Node, target: Option<&Type>) -> CheckResult<Expr> {
        let body = self.check_expr(root)?;
        match target {
            Some(target) if target.is_assignable_from(&body.ty) => Ok(body.convert_to(target)),
            Some(target) => Err(error(
                codes::TYPE_MISMATCH,
                format!("cannot implicitly convert type '{}' to '{}'", body.ty, target),
                root.span,
            )),
            None => Ok(body),
        }
    }

    /// Free identifiers in declaration order, the number of temporaries and
    /// the warnings reported so far.
    pub(super) fn finish(self) -> (Vec<ParamDecl>, u32, Vec<BackendDiagnostic>) {
        (self.free, self.next_local, self.warnings)
    }

    fn warn(&mut self, code: &'static str, message: String, span: Span) {
        self.warnings
            .push(BackendDiagnostic::warning(code, message, span));
    }

    fn check_expr(&mut self, node: &Node) -> CheckResult<Expr> {
        match self.check_node(node)? {
            Resolved::Value(expr) => Ok(expr),
            Resolved::Type(ty, span) => Err(error(
                codes::UNDEFINED_IDENTIFIER,
                format!("'{}' is a type and cannot be used as a value", ty),
                span,
            )),
            Resolved::Namespace(ns, span) => Err(error(
                codes::UNDEFINED_IDENTIFIER,
                format!("'{}' is a namespace and cannot be used as a value", ns),
                span,
            )),
        }
    }

    fn check_all(&mut self, nodes: &[Node]) -> CheckResult<Vec<Expr>> {
        nodes.iter().map(|n| self.check_expr(n)).collect()
    }

    fn check_node(&mut self, node: &Node) -> CheckResult<Resolved> {
        let span = node.span;
        let expr = match &node.kind {
            NodeKind::Literal(literal) => literal_expr(literal, span),
            NodeKind::Ident(name) => return self.identifier(name, span),
            NodeKind::Unary { op, operand } => {
                let operand = self.check_expr(operand)?;
                self.unary(*op, operand, span)?
            }
            NodeKind::Binary { op, left, right } => {
                let left = self.check_expr(left)?;
                let right = self.check_expr(right)?;
                self.binary(*op, left, right, span)?
            }
            NodeKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => self.conditional(cond, then_branch, else_branch, span)?,
            NodeKind::Coalesce { left, right } => self.coalesce(left, right, span)?,
            NodeKind::Member {
                target,
                name,
                name_span,
            } => return self.member(target, name, *name_span, span),
            NodeKind::Call { target, args } => self.call(target, args, span)?,
            NodeKind::Index { target, args } => {
                let target = self.check_expr(target)?;
                let args = self.check_all(args)?;
                self.index(target, args, span)?
            }
            NodeKind::New { ty, args, init } => self.new_object(ty, args, init.as_ref(), span)?,
            NodeKind::NewArray {
                element,
                rank,
                bounds,
                upper_bounds,
                items,
            } => self.new_array(element, *rank, bounds, *upper_bounds, items.as_deref(), span)?,
            NodeKind::TypeIs { operand, ty } => {
                let operand = self.check_expr(operand)?;
                let target = self.resolve_type(ty)?;
                Expr::new(
                    Type::Bool,
                    ExprKind::TypeIs {
                        operand: Box::new(operand),
                        target,
                    },
                    span,
                )
            }
            NodeKind::Cast { operand, ty, kind } => {
                let operand = self.check_expr(operand)?;
                let target = self.resolve_type(ty)?;
                self.cast(operand, target, *kind, span)?
            }
        };
        Ok(Resolved::Value(expr))
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Resolution order: free identifier, type, namespace.
    fn identifier(&mut self, name: &str, span: Span) -> CheckResult<Resolved> {
        if let Some(expr) = self.free_identifier(name, span) {
            return Ok(Resolved::Value(expr));
        }
        if let Some(ty) = self.language.primitive_keyword(name) {
            return Ok(Resolved::Type(ty, span));
        }
        let defs = self.find_type(name, 0);
        match defs.as_slice() {
            [] => {}
            [def] => {
                if let Some(ty) = def_to_type(def, Vec::new()) {
                    return Ok(Resolved::Type(ty, span));
                }
            }
            _ => return Err(ambiguous_type(name, &defs, span)),
        }
        if self.registry.is_namespace(name) {
            return Ok(Resolved::Namespace(name.to_string(), span));
        }
        Err(error(
            codes::UNDEFINED_IDENTIFIER,
            format!("the name '{}' does not exist in the current context", name),
            span,
        ))
    }

    /// Looks `name` up as a free identifier, declaring a placeholder for it
    /// on first use.
    fn free_identifier(&mut self, name: &str, span: Span) -> Option<Expr> {
        let language = self.language;
        if let Some(param) = self.free.iter().find(|p| language.names_equal(&p.name, name)) {
            return Some(Expr::new(param.ty.clone(), ExprKind::Parameter(param.id), span));
        }
        let ty = (self.lookup)(name)?;
        let id = ParamId(self.free.len() as u32);
        trace!(name, %ty, "declaring free identifier");
        self.free.push(ParamDecl {
            id,
            name: Arc::from(name),
            ty: ty.clone(),
        });
        Some(Expr::new(ty, ExprKind::Parameter(id), span))
    }

    /// Definitions named `path`, either fully qualified or relative to an
    /// imported namespace, with the given generic arity.
    fn find_type(&self, path: &str, arity: usize) -> Vec<Arc<TypeDef>> {
        let mut found: Vec<Arc<TypeDef>> = Vec::new();
        let qualified = self
            .namespaces
            .iter()
            .map(|ns| format!("{}.{}", ns, path))
            .collect::<Vec<_>>();
        let candidates = core::iter::once(path).chain(qualified.iter().map(String::as_str));
        for name in candidates {
            for def in self.registry.find(name) {
                if usize::from(def.generic_arity) == arity
                    && !found.iter().any(|f| f.same_definition(def))
                {
                    found.push(def.clone());
                }
            }
        }
        found
    }

    pub(super) fn resolve_type(&mut self, name: &TypeName) -> CheckResult<Type> {
        let keyword = match name.path.as_slice() {
            [single] if name.args.is_empty() => self.language.primitive_keyword(single),
            _ => None,
        };
        let mut ty = match keyword {
            Some(ty) => ty,
            None => {
                let args = name
                    .args
                    .iter()
                    .map(|a| self.resolve_type(a))
                    .collect::<CheckResult<Vec<_>>>()?;
                let path = name.path.join(".");
                let defs = self.find_type(&path, args.len());
                match defs.as_slice() {
                    [] => {
                        let message = if self.find_type(&path, 0).is_empty() && args.is_empty() {
                            format!("the type '{}' could not be found", name)
                        } else {
                            format!("no type '{}' takes {} type argument(s)", path, args.len())
                        };
                        return Err(error(codes::UNKNOWN_TYPE, message, name.span));
                    }
                    [def] => def_to_type(def, args).ok_or_else(|| {
                        error(
                            codes::UNKNOWN_TYPE,
                            format!("'{}' cannot be used as a type", name),
                            name.span,
                        )
                    })?,
                    _ => return Err(ambiguous_type(&path, &defs, name.span)),
                }
            }
        };
        for &rank in name.ranks.iter().rev() {
            ty = Type::array(ty, rank);
        }
        Ok(ty)
    }

    // ========================================================================
    // Members, calls and indexing
    // ========================================================================

    fn member(
        &mut self,
        target: &Node,
        name: &str,
        name_span: Span,
        span: Span,
    ) -> CheckResult<Resolved> {
        match self.check_node(target)? {
            Resolved::Namespace(ns, _) => {
                let full = format!("{}.{}", ns, name);
                let defs = self
                    .registry
                    .find(&full)
                    .iter()
                    .filter(|d| d.generic_arity == 0)
                    .cloned()
                    .collect::<Vec<_>>();
                match defs.as_slice() {
                    [def] => {
                        if let Some(ty) = def_to_type(def, Vec::new()) {
                            return Ok(Resolved::Type(ty, span));
                        }
                    }
                    [] => {}
                    _ => return Err(ambiguous_type(&full, &defs, span)),
                }
                if self.registry.is_namespace(&full) {
                    return Ok(Resolved::Namespace(full, span));
                }
                Err(error(
                    codes::UNKNOWN_MEMBER,
                    format!("namespace '{}' has no type or namespace named '{}'", ns, name),
                    name_span,
                ))
            }
            Resolved::Type(ty, _) => {
                if let Some(field) = self.find_field(&ty, name, true) {
                    let field_ty = field_type(&field, &ty);
                    return Ok(Resolved::Value(Expr::new(
                        field_ty,
                        ExprKind::Member {
                            target: None,
                            field,
                        },
                        span,
                    )));
                }
                if self.language == Language::Basic && self.has_method(&ty, name, true) {
                    let call = self.invoke(None, &ty, name, Vec::new(), name_span, span)?;
                    return Ok(Resolved::Value(call));
                }
                Err(error(
                    codes::UNKNOWN_MEMBER,
                    format!("type '{}' has no static member named '{}'", ty, name),
                    name_span,
                ))
            }
            Resolved::Value(target) => Ok(Resolved::Value(
                self.instance_member(target, name, name_span, span)?,
            )),
        }
    }

    fn instance_member(
        &mut self,
        target: Expr,
        name: &str,
        name_span: Span,
        span: Span,
    ) -> CheckResult<Expr> {
        if let Some(field) = self.find_field(&target.ty, name, false) {
            let ty = field_type(&field, &target.ty);
            return Ok(Expr::new(
                ty,
                ExprKind::Member {
                    target: Some(Box::new(target)),
                    field,
                },
                span,
            ));
        }
        // Basic calls parameterless methods without parentheses.
        if self.language == Language::Basic
            && (self.has_method(&target.ty, name, false)
                || self.language.names_equal(name, "ToString"))
        {
            let owner = target.ty.clone();
            return self.invoke(Some(target), &owner, name, Vec::new(), name_span, span);
        }
        Err(error(
            codes::UNKNOWN_MEMBER,
            format!("type '{}' has no member named '{}'", target.ty, name),
            name_span,
        ))
    }

    fn find_field(&self, owner: &Type, name: &str, is_static: bool) -> Option<FieldRef> {
        self.registry.members_of(owner).into_iter().find_map(|def| {
            let index = def
                .fields
                .iter()
                .position(|f| f.is_static == is_static && self.language.names_equal(&f.name, name))?;
            Some(FieldRef { def, index })
        })
    }

    fn has_method(&self, owner: &Type, name: &str, is_static: bool) -> bool {
        self.registry.members_of(owner).iter().any(|def| {
            def.methods
                .iter()
                .any(|m| m.is_static == is_static && self.language.names_equal(&m.name, name))
        })
    }

    fn call(&mut self, target: &Node, args: &[Node], span: Span) -> CheckResult<Expr> {
        if let NodeKind::Member {
            target: receiver,
            name,
            name_span,
        } = &target.kind
        {
            return match self.check_node(receiver)? {
                Resolved::Namespace(ns, _) => Err(error(
                    codes::UNKNOWN_MEMBER,
                    format!("'{}.{}' is not a method", ns, name),
                    *name_span,
                )),
                Resolved::Type(ty, _) => {
                    let args = self.check_all(args)?;
                    self.invoke(None, &ty, name, args, *name_span, span)
                }
                Resolved::Value(receiver) => {
                    let args = self.check_all(args)?;
                    let owner = receiver.ty.clone();
                    let is_method = self.has_method(&owner, name, false)
                        || self.language.names_equal(name, "ToString");
                    if is_method || self.language != Language::Basic {
                        return self.invoke(Some(receiver), &owner, name, args, *name_span, span);
                    }
                    // `obj.Items(0)` indexes a property.
                    let member_span = receiver.span.combine(*name_span);
                    let member = self.instance_member(receiver, name, *name_span, member_span)?;
                    self.index(member, args, span)
                }
            };
        }
        let callee = self.check_expr(target)?;
        let args = self.check_all(args)?;
        if self.language == Language::Basic {
            return self.index(callee, args, span);
        }
        Err(error(
            codes::INVALID_OPERATOR,
            format!("a value of type '{}' cannot be called", callee.ty),
            target.span,
        ))
    }

    /// Resolves and checks a method call. `receiver` is `None` for static
    /// methods of `owner`.
    fn invoke(
        &mut self,
        receiver: Option<Expr>,
        owner: &Type,
        name: &str,
        args: Vec<Expr>,
        name_span: Span,
        span: Span,
    ) -> CheckResult<Expr> {
        let is_static = receiver.is_none();
        let type_args = owner.type_args();
        let mut candidates = Vec::new();
        for def in self.registry.members_of(owner) {
            for (index, method) in def.methods.iter().enumerate() {
                if method.is_static == is_static && self.language.names_equal(&method.name, name)
                {
                    candidates.push(Candidate {
                        def: def.clone(),
                        index,
                        params: method.params.iter().map(|p| p.substitute(type_args)).collect(),
                        ret: method.ret.substitute(type_args),
                    });
                }
            }
        }
        if candidates.is_empty() {
            if !is_static && args.is_empty() && self.language.names_equal(name, "ToString") {
                return Ok(Expr::new(
                    Type::String,
                    ExprKind::Call {
                        target: receiver.map(Box::new),
                        method: MethodRef::ToString,
                        args,
                    },
                    span,
                ));
            }
            let kind = if is_static { "static method" } else { "method" };
            return Err(error(
                codes::UNKNOWN_MEMBER,
                format!("type '{}' has no {} named '{}'", owner, kind, name),
                name_span,
            ));
        }
        let (chosen, args) = self.pick_overload(candidates, args, span, &format!("'{}'", name))?;
        Ok(Expr::new(
            chosen.ret,
            ExprKind::Call {
                target: receiver.map(Box::new),
                method: MethodRef::Defined {
                    def: chosen.def,
                    index: chosen.index,
                },
                args,
            },
            span,
        ))
    }

    /// Picks the single best candidate for `args`: an exact match over one
    /// requiring implicit conversions. Arguments are converted to the chosen
    /// parameter types.
    fn pick_overload(
        &mut self,
        candidates: Vec<Candidate>,
        args: Vec<Expr>,
        span: Span,
        what: &str,
    ) -> CheckResult<(Candidate, Vec<Expr>)> {
        let mut candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.params.len() == args.len())
            .collect();
        let matching = |exact: bool| -> Vec<usize> {
            candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.params.iter().zip(&args).all(|(param, arg)| {
                        if exact {
                            param == &arg.ty
                        } else {
                            param.is_assignable_from(&arg.ty)
                        }
                    })
                })
                .map(|(i, _)| i)
                .collect()
        };
        let exact = matching(true);
        let chosen = match exact.as_slice() {
            [only] => *only,
            [] => match matching(false).as_slice() {
                [only] => *only,
                [] => {
                    let types = args
                        .iter()
                        .map(|a| a.ty.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(error(
                        codes::NO_OVERLOAD,
                        format!("no overload of {} takes arguments ({})", what, types),
                        span,
                    ));
                }
                many => {
                    return Err(error(
                        codes::NO_OVERLOAD,
                        format!("call to {} is ambiguous between {} overloads", what, many.len()),
                        span,
                    ));
                }
            },
            many => {
                return Err(error(
                    codes::NO_OVERLOAD,
                    format!("call to {} is ambiguous between {} overloads", what, many.len()),
                    span,
                ));
            }
        };
        let candidate = candidates.swap_remove(chosen);
        let args = args
            .into_iter()
            .zip(&candidate.params)
            .map(|(arg, param)| arg.convert_to(param))
            .collect();
        Ok((candidate, args))
    }

    fn index(&mut self, target: Expr, args: Vec<Expr>, span: Span) -> CheckResult<Expr> {
        let ty = target.ty.clone();
        if let Type::Array { element, rank } = &ty {
            if args.len() != usize::from(*rank) {
                return Err(error(
                    codes::TYPE_MISMATCH,
                    format!("array of rank {} indexed with {} indices", rank, args.len()),
                    span,
                ));
            }
            if let Some(arg) = args.iter().find(|a| a.ty != Type::Int) {
                return Err(error(
                    codes::TYPE_MISMATCH,
                    format!("array index must be of type 'int', found '{}'", arg.ty),
                    arg.span,
                ));
            }
            return Ok(Expr::new(
                element.as_ref().clone(),
                ExprKind::Index {
                    target: Box::new(target),
                    access: IndexAccess::Array,
                    indices: args,
                },
                span,
            ));
        }
        let indexed = self
            .registry
            .members_of(&ty)
            .into_iter()
            .find(|def| def.indexer.is_some());
        let Some(def) = indexed else {
            return Err(error(
                codes::INVALID_OPERATOR,
                format!("cannot apply indexing to a value of type '{}'", ty),
                span,
            ));
        };
        let Some(indexer) = def.indexer.as_ref() else {
            return Err(error(codes::INVALID_OPERATOR, "indexer disappeared", span));
        };
        let candidate = Candidate {
            def: def.clone(),
            index: 0,
            params: indexer
                .params
                .iter()
                .map(|p| p.substitute(ty.type_args()))
                .collect(),
            ret: indexer.ty.substitute(ty.type_args()),
        };
        let (chosen, args) = self.pick_overload(vec![candidate], args, span, "the indexer")?;
        Ok(Expr::new(
            chosen.ret,
            ExprKind::Index {
                target: Box::new(target),
                access: IndexAccess::Defined(chosen.def),
                indices: args,
            },
            span,
        ))
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    fn cast(&mut self, operand: Expr, target: Type, kind: CastKind, span: Span) -> CheckResult<Expr> {
        match kind {
            CastKind::TryAs => {
                if !target.is_reference_type() {
                    return Err(error(
                        codes::INVALID_CAST,
                        format!(
                            "the 'as' conversion requires a reference type, but '{}' is a value type",
                            target
                        ),
                        span,
                    ));
                }
                if !target.is_castable_from(&operand.ty) && !operand.ty.is_castable_from(&target)
                {
                    return Err(error(
                        codes::INVALID_CAST,
                        format!("cannot convert type '{}' to '{}'", operand.ty, target),
                        span,
                    ));
                }
                Ok(Expr::new(
                    target,
                    ExprKind::TypeAs {
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            CastKind::Convert => {
                if operand.ty == target {
                    self.warn(
                        codes::REDUNDANT_CAST,
                        format!("redundant conversion to '{}'", target),
                        span,
                    );
                    return Ok(operand);
                }
                let basic = self.language == Language::Basic;
                let allowed = target.is_castable_from(&operand.ty)
                    || (basic && is_text_conversion(&operand.ty, &target));
                if !allowed {
                    return Err(error(
                        codes::INVALID_CAST,
                        format!("cannot convert type '{}' to '{}'", operand.ty, target),
                        span,
                    ));
                }
                Ok(Expr::new(
                    target,
                    ExprKind::Convert {
                        operand: Box::new(operand),
                        round: basic,
                    },
                    span,
                ))
            }
        }
    }
}

fn literal_expr(literal: &Literal, span: Span) -> Expr {
    match literal {
        Literal::Null => Expr::constant(Value::Null, Type::Null, span),
        Literal::Bool(b) => Expr::constant(Value::Bool(*b), Type::Bool, span),
        Literal::Int(i) => Expr::constant(Value::Int(*i), Type::Int, span),
        Literal::Float(f) => Expr::constant(Value::Float(*f), Type::Float, span),
        Literal::Str(s) => Expr::constant(Value::str(s), Type::String, span),
    }
}

/// The type a definition denotes; primitive member holders map to the
/// built-in type they describe.
fn def_to_type(def: &Arc<TypeDef>, args: Vec<Type>) -> Option<Type> {
    match def.kind {
        TypeDefKind::Primitive(p) => p.to_type(),
        _ => Some(Type::generic_instance(def.clone(), args)),
    }
}

fn field_type(field: &FieldRef, owner: &Type) -> Type {
    field
        .field()
        .map(|f| f.ty.substitute(owner.type_args()))
        .unwrap_or(Type::Object)
}

fn ambiguous_type(name: &str, defs: &[Arc<TypeDef>], span: Span) -> BackendDiagnostic {
    let names = defs
        .iter()
        .map(|d| format!("{} ({})", d.full_name(), d.assembly))
        .collect::<Vec<_>>()
        .join(", ");
    error(
        codes::UNKNOWN_TYPE,
        format!("'{}' is ambiguous between {}", name, names),
        span,
    )
}

/// Conversions between text and scalars that only Basic allows.
fn is_text_conversion(from: &Type, to: &Type) -> bool {
    let scalar = |t: &Type| matches!(t, Type::Int | Type::Float | Type::Bool);
    (scalar(from) && to == &Type::String) || (from == &Type::String && scalar(to))
}

//! Binds raw trees to environments.
//!
//! A raw tree refers to free identifiers through placeholder parameters.
//! Rewriting produces a new tree in which each placeholder is replaced by a
//! direct reference to the environment location of the same name. The input
//! is never modified, so an aborted rewrite leaves nothing behind.
//!
//! The fast path runs against a cached tree compiled for some other
//! environment and gives up at the first sign that the tree does not fit
//! this one. The full path runs right after the backend compiled the tree
//! against this environment, so every name is expected to resolve.

use hashbrown::HashMap;
use tracing::trace;

use crate::api::Error;
use crate::environment::{self, Environment, Lookup};
use crate::tree::{
    BoundExpression, BoundLocation, ElementInit, Expr, ExprKind, LocationAccess, MemberBinding,
    ParamId, RawExpressionTree, RewritePath,
};

#[cfg(test)]
mod rewriter_test;

/// Why a rewrite stopped.
enum Stop {
    /// The fast path does not apply; not an error.
    Abort(String),
    Error(Error),
}

impl From<Error> for Stop {
    fn from(error: Error) -> Self {
        Stop::Error(error)
    }
}

type RewriteResult<T> = Result<T, Stop>;

/// Rebinds a cached tree to `env`.
///
/// Returns `Ok(None)` when the tree does not fit: a free identifier is
/// declared here with a different type, is ambiguous, or is not declared.
pub fn rewrite_fast(
    tree: &RawExpressionTree,
    env: &dyn Environment,
) -> Result<Option<BoundExpression>, Error> {
    match Rewriter::new(tree, env, RewritePath::Fast).run() {
        Ok(bound) => Ok(Some(bound)),
        Err(Stop::Abort(reason)) => {
            trace!(%reason, "fast path aborted");
            Ok(None)
        }
        Err(Stop::Error(error)) => Err(error),
    }
}

/// Binds a freshly compiled tree to the environment it was compiled
/// against. Names resolve by name alone; every free identifier must resolve.
pub fn rewrite_full(
    tree: &RawExpressionTree,
    env: &dyn Environment,
) -> Result<BoundExpression, Error> {
    match Rewriter::new(tree, env, RewritePath::Full).run() {
        Ok(bound) => Ok(bound),
        Err(Stop::Error(error)) => Err(error),
        Err(Stop::Abort(reason)) => Err(Error::Internal(reason)),
    }
}

struct Rewriter<'a> {
    tree: &'a RawExpressionTree,
    env: &'a dyn Environment,
    path: RewritePath,
    /// Placeholder resolutions, with value access.
    resolved: HashMap<ParamId, BoundLocation>,
    /// Distinct locations in first-use order.
    locations: Vec<BoundLocation>,
}

impl<'a> Rewriter<'a> {
    fn new(tree: &'a RawExpressionTree, env: &'a dyn Environment, path: RewritePath) -> Self {
        Self {
            tree,
            env,
            path,
            resolved: HashMap::new(),
            locations: Vec::new(),
        }
    }

    fn run(mut self) -> RewriteResult<BoundExpression> {
        let tree = self.tree;
        let body = self.rewrite(&tree.body, false)?;
        if let Some(unbound) = tree
            .free_identifiers
            .iter()
            .find(|p| !self.resolved.contains_key(&p.id))
        {
            return Err(Stop::Abort(format!(
                "free identifier '{}' is not declared in the environment",
                unbound.name
            )));
        }
        Ok(BoundExpression {
            body,
            result_type: tree.result_type.clone(),
            locations: self.locations,
            path: self.path,
            local_count: tree.local_count,
            signature: tree.signature.clone(),
        })
    }

    /// Resolves a placeholder, or `None` when the fast path should leave it
    /// in place.
    fn resolve(&mut self, id: ParamId, by_ref: bool) -> RewriteResult<Option<BoundLocation>> {
        let access = if by_ref {
            LocationAccess::Reference
        } else {
            LocationAccess::Value
        };
        if let Some(found) = self.resolved.get(&id) {
            let bound = BoundLocation {
                access,
                ..found.clone()
            };
            self.note_use(&bound);
            return Ok(Some(bound));
        }

        let (tree, env) = (self.tree, self.env);
        let decl = tree.free_identifier(id).ok_or_else(|| {
            Error::Internal(format!("placeholder parameter {} is not declared", id.0))
        })?;
        let location = match (self.path, environment::lookup(env, &decl.name, tree.language)) {
            (RewritePath::Fast, Lookup::Found(location)) if location.ty() != &decl.ty => {
                return Err(Stop::Abort(format!(
                    "'{}' is declared as '{}' but the tree was compiled for '{}'",
                    decl.name,
                    location.ty(),
                    decl.ty
                )));
            }
            (_, Lookup::Found(location)) => location,
            (RewritePath::Fast, Lookup::Ambiguous(_, count)) => {
                return Err(Stop::Abort(format!(
                    "'{}' is declared {} times in one scope",
                    decl.name, count
                )));
            }
            (RewritePath::Full, Lookup::Ambiguous(_, count)) => {
                return Err(Stop::Error(Error::AmbiguousIdentifier {
                    name: decl.name.to_string(),
                    count,
                }));
            }
            (RewritePath::Fast, Lookup::Unresolved) => return Ok(None),
            (RewritePath::Full, Lookup::Unresolved) => {
                return Err(Stop::Error(Error::Internal(format!(
                    "free identifier '{}' resolved at compile time but not when binding",
                    decl.name
                ))));
            }
        };

        let bound = BoundLocation {
            id: location.id(),
            name: decl.name.clone(),
            ty: location.ty().clone(),
            access: LocationAccess::Value,
        };
        self.resolved.insert(id, bound.clone());
        let bound = BoundLocation { access, ..bound };
        self.note_use(&bound);
        Ok(Some(bound))
    }

    fn note_use(&mut self, bound: &BoundLocation) {
        match self.locations.iter_mut().find(|l| l.id == bound.id) {
            Some(existing) => {
                if bound.access == LocationAccess::Reference {
                    existing.access = LocationAccess::Reference;
                }
            }
            None => self.locations.push(bound.clone()),
        }
    }

    fn boxed(&mut self, expr: &Expr) -> RewriteResult<Box<Expr>> {
        Ok(Box::new(self.rewrite(expr, false)?))
    }

    fn all(&mut self, exprs: &[Expr]) -> RewriteResult<Vec<Expr>> {
        exprs.iter().map(|e| self.rewrite(e, false)).collect()
    }

    /// `by_ref` is set for the target of a member access on a value-type
    /// container, which must be reached in place rather than copied.
    fn rewrite(&mut self, expr: &Expr, by_ref: bool) -> RewriteResult<Expr> {
        let kind = match &expr.kind {
            ExprKind::Parameter(id) => match self.resolve(*id, by_ref)? {
                Some(location) => ExprKind::Location(location),
                None => ExprKind::Parameter(*id),
            },
            ExprKind::Location(location) => {
                return Err(Stop::Error(Error::Internal(format!(
                    "raw tree already references location '{}'",
                    location.name
                ))));
            }
            ExprKind::Constant(value) => ExprKind::Constant(value.clone()),
            ExprKind::Local(id) => ExprKind::Local(*id),
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: self.boxed(operand)?,
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => ExprKind::Conditional {
                cond: self.boxed(cond)?,
                then_branch: self.boxed(then_branch)?,
                else_branch: self.boxed(else_branch)?,
            },
            ExprKind::Call {
                target,
                method,
                args,
            } => ExprKind::Call {
                target: match target {
                    Some(target) => Some(self.boxed(target)?),
                    None => None,
                },
                method: method.clone(),
                args: self.all(args)?,
            },
            ExprKind::New { ctor, args } => ExprKind::New {
                ctor: ctor.clone(),
                args: self.all(args)?,
            },
            ExprKind::Member { target, field } => ExprKind::Member {
                target: match target {
                    Some(target) => {
                        let in_place = target.ty.is_struct();
                        Some(Box::new(self.rewrite(target, in_place)?))
                    }
                    None => None,
                },
                field: field.clone(),
            },
            ExprKind::Index {
                target,
                access,
                indices,
            } => ExprKind::Index {
                target: self.boxed(target)?,
                access: access.clone(),
                indices: self.all(indices)?,
            },
            ExprKind::MemberInit { new, bindings } => ExprKind::MemberInit {
                new: self.boxed(new)?,
                bindings: self.bindings(bindings)?,
            },
            ExprKind::ListInit { new, elements } => ExprKind::ListInit {
                new: self.boxed(new)?,
                elements: self.elements(elements)?,
            },
            ExprKind::NewArrayInit {
                element,
                dims,
                items,
            } => ExprKind::NewArrayInit {
                element: element.clone(),
                dims: dims.clone(),
                items: self.all(items)?,
            },
            ExprKind::NewArrayBounds {
                element,
                bounds,
                upper,
            } => ExprKind::NewArrayBounds {
                element: element.clone(),
                bounds: self.all(bounds)?,
                upper: *upper,
            },
            ExprKind::TypeIs { operand, target } => ExprKind::TypeIs {
                operand: self.boxed(operand)?,
                target: target.clone(),
            },
            ExprKind::Convert { operand, round } => ExprKind::Convert {
                operand: self.boxed(operand)?,
                round: *round,
            },
            ExprKind::TypeAs { operand } => ExprKind::TypeAs {
                operand: self.boxed(operand)?,
            },
            ExprKind::Block { locals, body } => ExprKind::Block {
                locals: locals.clone(),
                body: self.all(body)?,
            },
            ExprKind::Assign { target, value } => ExprKind::Assign {
                target: self.boxed(target)?,
                value: self.boxed(value)?,
            },
        };
        Ok(Expr::new(expr.ty.clone(), kind, expr.span))
    }

    fn bindings(&mut self, bindings: &[MemberBinding]) -> RewriteResult<Vec<MemberBinding>> {
        bindings
            .iter()
            .map(|binding| {
                Ok(match binding {
                    MemberBinding::Assign { field, value } => MemberBinding::Assign {
                        field: field.clone(),
                        value: self.rewrite(value, false)?,
                    },
                    MemberBinding::Nested { field, bindings } => MemberBinding::Nested {
                        field: field.clone(),
                        bindings: self.bindings(bindings)?,
                    },
                    MemberBinding::List { field, elements } => MemberBinding::List {
                        field: field.clone(),
                        elements: self.elements(elements)?,
                    },
                })
            })
            .collect()
    }

    fn elements(&mut self, elements: &[ElementInit]) -> RewriteResult<Vec<ElementInit>> {
        elements
            .iter()
            .map(|element| {
                Ok(ElementInit {
                    add: element.add.clone(),
                    args: self.all(&element.args)?,
                })
            })
            .collect()
    }
}

//! Typed expression trees.
//!
//! The type checker lowers a parsed [`Node`](crate::syntax::Node) into an
//! [`Expr`]. Every node carries its static type and the span of the source
//! text it was checked from. The node set is closed: the rewriter and the
//! evaluator match on [`ExprKind`] exhaustively.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::syntax::{BinaryOp, Span, UnaryOp};
use crate::types::{CtorDef, FieldDef, FieldStorage, IndexerDef, MethodDef, Type, TypeDef};
use crate::values::Value;

mod bound;
mod raw;

pub use bound::{BoundExpression, BoundLocation, LocationAccess, RewritePath};
pub use raw::{CONTEXT_PARAMETER, ParamDecl, RawExpressionTree};

#[derive(Debug, Clone)]
pub struct Expr {
    pub ty: Type,
    pub kind: ExprKind,
    pub span: Span,
}

/// Index of a free-identifier placeholder in its tree's parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

/// Compiler temporary declared by a [`ExprKind::Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub id: LocalId,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Constant(Value),
    /// Free-identifier placeholder. Only present in raw trees.
    Parameter(ParamId),
    Local(LocalId),
    /// Direct reference to an environment location. Only present in bound
    /// trees.
    Location(BoundLocation),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Method call. `target` is `None` for static methods.
    Call {
        target: Option<Box<Expr>>,
        method: MethodRef,
        args: Vec<Expr>,
    },
    /// Object creation. A missing constructor creates the default instance.
    New {
        ctor: Option<CtorRef>,
        args: Vec<Expr>,
    },
    /// Field or property read. `target` is `None` for static members.
    Member {
        target: Option<Box<Expr>>,
        field: FieldRef,
    },
    Index {
        target: Box<Expr>,
        access: IndexAccess,
        indices: Vec<Expr>,
    },
    /// `new T { A = 1, B = { ... } }`
    MemberInit {
        new: Box<Expr>,
        bindings: Vec<MemberBinding>,
    },
    /// `new List<int> { 1, 2 }`
    ListInit {
        new: Box<Expr>,
        elements: Vec<ElementInit>,
    },
    /// Array built from element values, stored row-major.
    NewArrayInit {
        element: Type,
        dims: SmallVec<[usize; 2]>,
        items: Vec<Expr>,
    },
    /// Array built from dimension sizes; `upper` means the sizes are upper
    /// bounds (length is bound + 1).
    NewArrayBounds {
        element: Type,
        bounds: Vec<Expr>,
        upper: bool,
    },
    TypeIs {
        operand: Box<Expr>,
        target: Type,
    },
    /// Conversion to the node's type. `round` selects rounding instead of
    /// truncation for float-to-int conversions.
    Convert {
        operand: Box<Expr>,
        round: bool,
    },
    /// Conversion to the node's type yielding null on failure.
    TypeAs {
        operand: Box<Expr>,
    },
    /// Evaluates `body` in order with fresh `locals`; yields the last value.
    Block {
        locals: Vec<LocalDecl>,
        body: Vec<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum MethodRef {
    Defined { def: Arc<TypeDef>, index: usize },
    /// `ToString()`, available on every value.
    ToString,
}

impl MethodRef {
    pub fn def(&self) -> Option<&MethodDef> {
        match self {
            MethodRef::Defined { def, index } => def.methods.get(*index),
            MethodRef::ToString => None,
        }
    }

    pub fn name(&self) -> &str {
        match self.def() {
            Some(method) => &method.name,
            None => "ToString",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CtorRef {
    pub def: Arc<TypeDef>,
    pub index: usize,
}

impl CtorRef {
    pub fn ctor(&self) -> Option<&CtorDef> {
        self.def.constructors.get(self.index)
    }
}

#[derive(Debug, Clone)]
pub struct FieldRef {
    pub def: Arc<TypeDef>,
    pub index: usize,
}

impl FieldRef {
    pub fn field(&self) -> Option<&FieldDef> {
        self.def.fields.get(self.index)
    }

    pub fn name(&self) -> &str {
        self.field().map(|f| f.name.as_str()).unwrap_or("?")
    }
}

#[derive(Debug, Clone)]
pub enum IndexAccess {
    Array,
    /// Indexer declared by the target's type definition.
    Defined(Arc<TypeDef>),
}

impl IndexAccess {
    pub fn indexer(&self) -> Option<&IndexerDef> {
        match self {
            IndexAccess::Array => None,
            IndexAccess::Defined(def) => def.indexer.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MemberBinding {
    /// `Field = value`
    Assign { field: FieldRef, value: Expr },
    /// `Field = { Inner = value }`: initializes members of the existing
    /// field value.
    Nested {
        field: FieldRef,
        bindings: Vec<MemberBinding>,
    },
    /// `Field = { 1, 2 }`: adds elements to the existing collection.
    List {
        field: FieldRef,
        elements: Vec<ElementInit>,
    },
}

#[derive(Debug, Clone)]
pub struct ElementInit {
    pub add: MethodRef,
    pub args: Vec<Expr>,
}

impl Expr {
    pub fn new(ty: Type, kind: ExprKind, span: Span) -> Self {
        Self { ty, kind, span }
    }

    pub fn constant(value: Value, ty: Type, span: Span) -> Self {
        Self::new(ty, ExprKind::Constant(value), span)
    }

    /// Wraps `self` in a conversion to `ty` unless it already has that type.
    pub fn convert_to(self, ty: &Type) -> Expr {
        if &self.ty == ty {
            return self;
        }
        let span = self.span;
        Expr::new(
            ty.clone(),
            ExprKind::Convert {
                operand: Box::new(self),
                round: false,
            },
            span,
        )
    }

    /// Whether the expression denotes storage that can be written: a
    /// placeholder or location, a writable field of a class instance or of
    /// an assignable struct, an array element, or an element of a type with
    /// a settable indexer.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Parameter(_) | ExprKind::Local(_) | ExprKind::Location(_) => true,
            ExprKind::Member {
                target: Some(target),
                field,
            } => {
                let writable = field.field().is_some_and(|f| {
                    !f.readonly && !f.is_static && matches!(f.storage, FieldStorage::Slot(_))
                });
                writable && (!target.ty.is_struct() || target.is_assignable())
            }
            ExprKind::Index { access, .. } => match access {
                IndexAccess::Array => true,
                IndexAccess::Defined(_) => access.indexer().is_some_and(|i| i.set.is_some()),
            },
            _ => false,
        }
    }

    /// Pre-order walk over this node and its children.
    pub fn for_each(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::Parameter(_)
            | ExprKind::Local(_)
            | ExprKind::Location(_) => {}
            ExprKind::Unary { operand, .. }
            | ExprKind::TypeIs { operand, .. }
            | ExprKind::Convert { operand, .. }
            | ExprKind::TypeAs { operand } => operand.for_each(f),
            ExprKind::Binary { left, right, .. } => {
                left.for_each(f);
                right.for_each(f);
            }
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.for_each(f);
                then_branch.for_each(f);
                else_branch.for_each(f);
            }
            ExprKind::Call { target, args, .. } => {
                if let Some(target) = target {
                    target.for_each(f);
                }
                args.iter().for_each(|a| a.for_each(f));
            }
            ExprKind::New { args, .. } => args.iter().for_each(|a| a.for_each(f)),
            ExprKind::Member { target, .. } => {
                if let Some(target) = target {
                    target.for_each(f);
                }
            }
            ExprKind::Index {
                target, indices, ..
            } => {
                target.for_each(f);
                indices.iter().for_each(|i| i.for_each(f));
            }
            ExprKind::MemberInit { new, bindings } => {
                new.for_each(f);
                bindings.iter().for_each(|b| b.for_each(f));
            }
            ExprKind::ListInit { new, elements } => {
                new.for_each(f);
                elements
                    .iter()
                    .flat_map(|e| e.args.iter())
                    .for_each(|a| a.for_each(f));
            }
            ExprKind::NewArrayInit { items, .. } => items.iter().for_each(|i| i.for_each(f)),
            ExprKind::NewArrayBounds { bounds, .. } => bounds.iter().for_each(|b| b.for_each(f)),
            ExprKind::Block { body, .. } => body.iter().for_each(|e| e.for_each(f)),
            ExprKind::Assign { target, value } => {
                target.for_each(f);
                value.for_each(f);
            }
        }
    }
}

impl MemberBinding {
    pub fn field(&self) -> &FieldRef {
        match self {
            MemberBinding::Assign { field, .. }
            | MemberBinding::Nested { field, .. }
            | MemberBinding::List { field, .. } => field,
        }
    }

    fn for_each(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            MemberBinding::Assign { value, .. } => value.for_each(f),
            MemberBinding::Nested { bindings, .. } => bindings.iter().for_each(|b| b.for_each(f)),
            MemberBinding::List { elements, .. } => elements
                .iter()
                .flat_map(|e| e.args.iter())
                .for_each(|a| a.for_each(f)),
        }
    }
}

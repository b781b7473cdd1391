//! Untyped syntax tree shared by both dialects.

use super::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Height of the tree rooted here; a leaf is 1.
    pub depth: usize,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        let depth = 1 + kind.child_depth();
        Self { kind, span, depth }
    }
}

fn max_depth(nodes: &[Node]) -> usize {
    nodes.iter().map(|n| n.depth).max().unwrap_or(0)
}

fn items_depth(items: &[ArrayItem]) -> usize {
    items
        .iter()
        .map(|item| match item {
            ArrayItem::Expr(node) => node.depth,
            ArrayItem::Nested(inner, _) => 1 + items_depth(inner),
        })
        .max()
        .unwrap_or(0)
}

impl NodeKind {
    /// Deepest direct child, from the depths the children already carry.
    fn child_depth(&self) -> usize {
        match self {
            NodeKind::Literal(_) | NodeKind::Ident(_) => 0,
            NodeKind::Unary { operand, .. }
            | NodeKind::TypeIs { operand, .. }
            | NodeKind::Cast { operand, .. } => operand.depth,
            NodeKind::Member { target, .. } => target.depth,
            NodeKind::Binary { left, right, .. } | NodeKind::Coalesce { left, right } => {
                left.depth.max(right.depth)
            }
            NodeKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => cond.depth.max(then_branch.depth).max(else_branch.depth),
            NodeKind::Call { target, args } | NodeKind::Index { target, args } => {
                target.depth.max(max_depth(args))
            }
            NodeKind::New { args, init, .. } => {
                max_depth(args).max(init.as_ref().map_or(0, Initializer::depth))
            }
            NodeKind::NewArray { bounds, items, .. } => {
                max_depth(bounds).max(items.as_deref().map_or(0, items_depth))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Conditional {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
    /// `a ?? b` / `If(a, b)`.
    Coalesce {
        left: Box<Node>,
        right: Box<Node>,
    },
    Member {
        target: Box<Node>,
        name: String,
        name_span: Span,
    },
    /// A call. In the Basic dialect this is also the indexing syntax; the
    /// type checker tells them apart.
    Call {
        target: Box<Node>,
        args: Vec<Node>,
    },
    Index {
        target: Box<Node>,
        args: Vec<Node>,
    },
    New {
        ty: TypeName,
        args: Vec<Node>,
        init: Option<Initializer>,
    },
    NewArray {
        element: TypeName,
        rank: u8,
        /// Dimension sizes, or upper bounds when `upper_bounds` is set.
        bounds: Vec<Node>,
        upper_bounds: bool,
        items: Option<Vec<ArrayItem>>,
    },
    TypeIs {
        operand: Box<Node>,
        ty: TypeName,
    },
    Cast {
        operand: Box<Node>,
        ty: TypeName,
        kind: CastKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Integer division for integer operands.
    Div,
    /// Division that always produces a float.
    RealDiv,
    IntDiv,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Short-circuiting.
    And,
    /// Short-circuiting.
    Or,
    BitAnd,
    BitOr,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div | BinaryOp::RealDiv => "/",
            BinaryOp::IntDiv => "\\",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::Xor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// Fails at run time when the conversion is invalid.
    Convert,
    /// Produces null when the conversion is invalid.
    TryAs,
}

/// A type as written in source: `Std.Collections.List<int>[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub path: Vec<String>,
    pub args: Vec<TypeName>,
    /// Array rank suffixes, outermost first.
    pub ranks: Vec<u8>,
    pub span: Span,
}

impl TypeName {
    pub fn simple(name: &str, span: Span) -> Self {
        Self {
            path: vec![name.to_string()],
            args: Vec::new(),
            ranks: Vec::new(),
            span,
        }
    }
}

impl core::fmt::Display for TypeName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.path.join("."))?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        for rank in &self.ranks {
            write!(f, "[{}]", ",".repeat(usize::from(*rank).saturating_sub(1)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// `{ X = 1, Y = 2 }`
    Object(Vec<MemberInit>),
    /// `{ 1, 2 }` or `{ { "a", 1 } }`
    Collection(Vec<ElementInit>),
}

impl Initializer {
    fn depth(&self) -> usize {
        match self {
            Initializer::Object(members) => members
                .iter()
                .map(|member| match &member.value {
                    InitValue::Expr(node) => node.depth,
                    InitValue::Nested(init) => 1 + init.depth(),
                })
                .max()
                .unwrap_or(0),
            Initializer::Collection(elements) => elements
                .iter()
                .map(|element| max_depth(&element.args))
                .max()
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInit {
    pub name: String,
    pub span: Span,
    pub value: InitValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitValue {
    Expr(Node),
    /// Initializes the members of the existing member value in place.
    Nested(Initializer),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementInit {
    pub args: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Expr(Node),
    Nested(Vec<ArrayItem>, Span),
}

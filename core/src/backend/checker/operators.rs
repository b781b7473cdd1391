use super::{CheckResult, Checker, error};
use crate::backend::codes;
use crate::syntax::{BinaryOp, Language, Node, Span, UnaryOp};
use crate::tree::{Expr, ExprKind, LocalDecl, LocalId};
use crate::types::Type;
use crate::values::Value;

/// Common type two operands or branches convert to implicitly.
fn unify(a: &Type, b: &Type) -> Option<Type> {
    if a.is_assignable_from(b) {
        Some(a.clone())
    } else if b.is_assignable_from(a) {
        Some(b.clone())
    } else {
        None
    }
}

fn numeric_result(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (Type::Int, Type::Int) => Some(Type::Int),
        _ if a.is_numeric() && b.is_numeric() => Some(Type::Float),
        _ => None,
    }
}

fn binary_expr(ty: Type, op: BinaryOp, left: Expr, right: Expr, span: Span) -> Expr {
    Expr::new(
        ty,
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

impl Checker<'_> {
    pub(super) fn unary(&mut self, op: UnaryOp, operand: Expr, span: Span) -> CheckResult<Expr> {
        let op = match (op, &operand.ty) {
            (UnaryOp::Neg | UnaryOp::Plus, ty) if ty.is_numeric() => op,
            (UnaryOp::Not, Type::Bool) => op,
            // Basic spells bitwise complement `Not`.
            (UnaryOp::Not, Type::Int) if self.language == Language::Basic => UnaryOp::BitNot,
            (UnaryOp::BitNot, Type::Int) => op,
            _ => {
                return Err(error(
                    codes::INVALID_OPERATOR,
                    format!(
                        "operator '{}' cannot be applied to an operand of type '{}'",
                        unary_symbol(op),
                        operand.ty
                    ),
                    span,
                ));
            }
        };
        Ok(Expr::new(
            operand.ty.clone(),
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    pub(super) fn binary(
        &mut self,
        op: BinaryOp,
        left: Expr,
        right: Expr,
        span: Span,
    ) -> CheckResult<Expr> {
        let invalid = |left: &Expr, right: &Expr| {
            error(
                codes::INVALID_OPERATOR,
                format!(
                    "operator '{}' cannot be applied to operands of type '{}' and '{}'",
                    op.symbol(),
                    left.ty,
                    right.ty
                ),
                span,
            )
        };
        match op {
            BinaryOp::Add if left.ty == Type::String || right.ty == Type::String => {
                self.concat(left, right, span)
            }
            BinaryOp::Concat => self.concat(left, right, span),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
            | BinaryOp::IntDiv => {
                let ty = numeric_result(&left.ty, &right.ty).ok_or_else(|| invalid(&left, &right))?;
                Ok(binary_expr(
                    ty.clone(),
                    op,
                    left.convert_to(&ty),
                    right.convert_to(&ty),
                    span,
                ))
            }
            BinaryOp::RealDiv => {
                if numeric_result(&left.ty, &right.ty).is_none() {
                    return Err(invalid(&left, &right));
                }
                Ok(binary_expr(
                    Type::Float,
                    op,
                    left.convert_to(&Type::Float),
                    right.convert_to(&Type::Float),
                    span,
                ))
            }
            BinaryOp::Eq | BinaryOp::Ne => self.equality(op, left, right, span),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let operand_ty = match numeric_result(&left.ty, &right.ty) {
                    Some(ty) => ty,
                    None if left.ty == Type::String && right.ty == Type::String => Type::String,
                    None => return Err(invalid(&left, &right)),
                };
                Ok(binary_expr(
                    Type::Bool,
                    op,
                    left.convert_to(&operand_ty),
                    right.convert_to(&operand_ty),
                    span,
                ))
            }
            BinaryOp::And | BinaryOp::Or => {
                if left.ty != Type::Bool || right.ty != Type::Bool {
                    return Err(invalid(&left, &right));
                }
                Ok(binary_expr(Type::Bool, op, left, right, span))
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::Xor => {
                let ty = match (&left.ty, &right.ty) {
                    (Type::Bool, Type::Bool) => Type::Bool,
                    (Type::Int, Type::Int) => Type::Int,
                    _ => return Err(invalid(&left, &right)),
                };
                Ok(binary_expr(ty, op, left, right, span))
            }
        }
    }

    fn concat(&mut self, left: Expr, right: Expr, span: Span) -> CheckResult<Expr> {
        if left.ty == Type::Void || right.ty == Type::Void {
            return Err(error(
                codes::INVALID_OPERATOR,
                "cannot concatenate a value of type 'void'",
                span,
            ));
        }
        Ok(binary_expr(Type::String, BinaryOp::Concat, left, right, span))
    }

    fn equality(&mut self, op: BinaryOp, left: Expr, right: Expr, span: Span) -> CheckResult<Expr> {
        let null_vs_value = |a: &Type, b: &Type| a == &Type::Null && b.is_value_type();
        if null_vs_value(&left.ty, &right.ty) || null_vs_value(&right.ty, &left.ty) {
            let value_ty = if left.ty == Type::Null { &right.ty } else { &left.ty };
            self.warn(
                codes::NULL_COMPARISON,
                format!(
                    "comparing a value of type '{}' with null always yields {}",
                    value_ty,
                    op == BinaryOp::Ne
                ),
                span,
            );
            return Ok(binary_expr(Type::Bool, op, left, right, span));
        }
        if let Some(ty) = numeric_result(&left.ty, &right.ty) {
            return Ok(binary_expr(
                Type::Bool,
                op,
                left.convert_to(&ty),
                right.convert_to(&ty),
                span,
            ));
        }
        if unify(&left.ty, &right.ty).is_none() || left.ty == Type::Void {
            return Err(error(
                codes::INVALID_OPERATOR,
                format!(
                    "operator '{}' cannot be applied to operands of type '{}' and '{}'",
                    op.symbol(),
                    left.ty,
                    right.ty
                ),
                span,
            ));
        }
        Ok(binary_expr(Type::Bool, op, left, right, span))
    }

    pub(super) fn conditional(
        &mut self,
        cond: &Node,
        then_branch: &Node,
        else_branch: &Node,
        span: Span,
    ) -> CheckResult<Expr> {
        let cond = self.check_expr(cond)?;
        if cond.ty != Type::Bool {
            return Err(error(
                codes::TYPE_MISMATCH,
                format!("condition must be of type 'bool', found '{}'", cond.ty),
                cond.span,
            ));
        }
        let then_branch = self.check_expr(then_branch)?;
        let else_branch = self.check_expr(else_branch)?;
        let ty = unify(&then_branch.ty, &else_branch.ty).ok_or_else(|| {
            error(
                codes::TYPE_MISMATCH,
                format!(
                    "no implicit conversion between '{}' and '{}'",
                    then_branch.ty, else_branch.ty
                ),
                span,
            )
        })?;
        Ok(Expr::new(
            ty.clone(),
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch.convert_to(&ty)),
                else_branch: Box::new(else_branch.convert_to(&ty)),
            },
            span,
        ))
    }

    /// `left ?? right`, lowered so `left` is evaluated once:
    /// `{ tmp = left; tmp != null ? tmp : right }`.
    pub(super) fn coalesce(&mut self, left: &Node, right: &Node, span: Span) -> CheckResult<Expr> {
        let left = self.check_expr(left)?;
        let right = self.check_expr(right)?;
        if !left.ty.is_reference_type() {
            return Err(error(
                codes::INVALID_OPERATOR,
                format!(
                    "the left operand of a null-coalescing expression must be a reference type, found '{}'",
                    left.ty
                ),
                left.span,
            ));
        }
        let ty = if left.ty == Type::Null {
            right.ty.clone()
        } else {
            unify(&left.ty, &right.ty).ok_or_else(|| {
                error(
                    codes::TYPE_MISMATCH,
                    format!(
                        "no implicit conversion between '{}' and '{}'",
                        left.ty, right.ty
                    ),
                    span,
                )
            })?
        };

        let id = LocalId(self.next_local);
        self.next_local += 1;
        let local_ty = left.ty.clone();
        let local = |span| Expr::new(local_ty.clone(), ExprKind::Local(id), span);
        let left_span = left.span;
        let store = Expr::new(
            local_ty.clone(),
            ExprKind::Assign {
                target: Box::new(local(left_span)),
                value: Box::new(left),
            },
            left_span,
        );
        let not_null = binary_expr(
            Type::Bool,
            BinaryOp::Ne,
            local(left_span),
            Expr::constant(Value::Null, Type::Null, left_span),
            left_span,
        );
        let select = Expr::new(
            ty.clone(),
            ExprKind::Conditional {
                cond: Box::new(not_null),
                then_branch: Box::new(local(left_span).convert_to(&ty)),
                else_branch: Box::new(right.convert_to(&ty)),
            },
            span,
        );
        Ok(Expr::new(
            ty,
            ExprKind::Block {
                locals: vec![LocalDecl {
                    id,
                    name: format!("$tmp{}", id.0),
                    ty: local_ty,
                }],
                body: vec![store, select],
            },
            span,
        ))
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
        UnaryOp::Not => "!",
        UnaryOp::BitNot => "~",
    }
}

use core::cell::Cell;

use lazy_static::lazy_static;
use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use super::{
    ArrayItem, BinaryOp, CastKind, ElementInit, InitValue, Initializer, Literal, MAX_NESTING_DEPTH,
    MAX_OPERATORS, MemberInit, Node, NodeKind, Span, SyntaxError, TypeName, UnaryOp,
    convert_pest_error, unescape,
};

lazy_static! {
    // Note: precedence is defined lowest to highest.
    static ref PRATT_PARSER: PrattParser<Rule> = PrattParser::new()
        // (lowest precedence)
        .op(Op::infix(Rule::cond_op, Assoc::Right))     // `c ? a : b`
        .op(Op::infix(Rule::coalesce, Assoc::Right))    // `??`
        .op(Op::infix(Rule::or, Assoc::Left))           // `||`
        .op(Op::infix(Rule::and, Assoc::Left))          // `&&`
        .op(Op::infix(Rule::bit_or, Assoc::Left))       // `|`
        .op(Op::infix(Rule::bit_xor, Assoc::Left))      // `^`
        .op(Op::infix(Rule::bit_and, Assoc::Left))      // `&`
        .op(
            Op::infix(Rule::eq, Assoc::Left) |
            Op::infix(Rule::ne, Assoc::Left)
        )                                               // `==`, `!=`
        .op(
            Op::infix(Rule::lt, Assoc::Left) |
            Op::infix(Rule::gt, Assoc::Left) |
            Op::infix(Rule::le, Assoc::Left) |
            Op::infix(Rule::ge, Assoc::Left) |
            Op::postfix(Rule::is_op) |
            Op::postfix(Rule::as_op)
        )                                               // `<`, `>`, `<=`, `>=`, `is`, `as`
        .op(
            Op::infix(Rule::add, Assoc::Left) |
            Op::infix(Rule::sub, Assoc::Left)
        )                                               // `+`, `-`
        .op(
            Op::infix(Rule::mul, Assoc::Left) |
            Op::infix(Rule::div, Assoc::Left) |
            Op::infix(Rule::rem, Assoc::Left)
        )                                               // `*`, `/`, `%`
        .op(
            Op::prefix(Rule::neg) |
            Op::prefix(Rule::plus) |
            Op::prefix(Rule::not) |
            Op::prefix(Rule::bit_not) |
            Op::prefix(Rule::cast_op)
        )                                               // `-`, `+`, `!`, `~`, `(T)`
        .op(
            Op::postfix(Rule::member_op) |
            Op::postfix(Rule::call_op) |
            Op::postfix(Rule::index_op)
        )                                               // `.`, `()`, `[]`
        // (highest precedence)
        ;
}

#[derive(Parser)]
#[grammar = "syntax/c_style.pest"]
struct CStyleParser;

type ParseResult<T> = Result<T, pest::error::Error<Rule>>;

pub(super) fn parse(text: &str) -> Result<Node, SyntaxError> {
    let mut pairs = CStyleParser::parse(Rule::unit, text)
        .map_err(|e| convert_pest_error(e, describe))?;
    let ctx = ParseContext {
        depth: Cell::new(0),
    };
    let unit = pairs.next().ok_or_else(|| SyntaxError {
        message: "empty input".to_string(),
        span: Span::default(),
    })?;
    ctx.parse_unit(unit)
        .map_err(|e| convert_pest_error(e, describe))
}

fn describe(rule: &Rule) -> String {
    let name = match rule {
        Rule::expression => "expression",
        Rule::ident => "identifier",
        Rule::member_name | Rule::qualified_name => "name",
        Rule::type_name | Rule::type_base => "type",
        Rule::int_lit | Rule::float_lit => "number",
        Rule::string_lit => "string",
        Rule::null_lit | Rule::bool_lit => "literal",
        Rule::EOI => "end of input",
        Rule::coalesce => "`??`",
        Rule::cond_op => "`?`",
        Rule::or => "`||`",
        Rule::and => "`&&`",
        Rule::bit_or => "`|`",
        Rule::bit_xor => "`^`",
        Rule::bit_and => "`&`",
        Rule::eq => "`==`",
        Rule::ne => "`!=`",
        Rule::le => "`<=`",
        Rule::ge => "`>=`",
        Rule::lt => "`<`",
        Rule::gt => "`>`",
        Rule::add => "`+`",
        Rule::sub => "`-`",
        Rule::mul => "`*`",
        Rule::div => "`/`",
        Rule::rem => "`%`",
        Rule::member_op => "`.`",
        Rule::call_op => "`(`",
        Rule::index_op => "`[`",
        Rule::is_op => "`is`",
        Rule::as_op => "`as`",
        other => return format!("{:?}", other),
    };
    name.to_string()
}

fn custom(span: pest::Span<'_>, message: impl Into<String>) -> pest::error::Error<Rule> {
    pest::error::Error::new_from_span(
        pest::error::ErrorVariant::CustomError {
            message: message.into(),
        },
        span,
    )
}

fn too_deep(span: pest::Span<'_>) -> pest::error::Error<Rule> {
    custom(
        span,
        format!(
            "expression nesting depth exceeds maximum of {} levels",
            MAX_NESTING_DEPTH
        ),
    )
}

fn is_primary(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::expression
            | Rule::grouped
            | Rule::null_lit
            | Rule::bool_lit
            | Rule::int_lit
            | Rule::float_lit
            | Rule::string_lit
            | Rule::ident
            | Rule::new_expr
    )
}

fn boxed(node: Node) -> Box<Node> {
    Box::new(node)
}

struct ParseContext {
    depth: Cell<usize>,
}

impl ParseContext {
    fn enter(&self, pair: &Pair<Rule>) -> ParseResult<()> {
        let current = self.depth.get();
        if current >= MAX_NESTING_DEPTH {
            return Err(too_deep(pair.as_span()));
        }
        self.depth.set(current + 1);
        Ok(())
    }

    /// An operator application, unless it makes the tree too deep.
    fn operator(&self, kind: NodeKind, span: Span, op: pest::Span<'_>) -> ParseResult<Node> {
        let node = Node::new(kind, span);
        if node.depth > MAX_NESTING_DEPTH {
            return Err(too_deep(op));
        }
        Ok(node)
    }

    fn leave(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    fn parse_unit(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let span = pair.as_span();
        let expr = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::expression)
            .ok_or_else(|| custom(span, "missing expression"))?;
        self.parse_expression(expr)
    }

    fn parse_expression(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let operators = pair
            .clone()
            .into_inner()
            .filter(|p| !is_primary(p.as_rule()))
            .count();
        if operators > MAX_OPERATORS {
            return Err(custom(
                pair.as_span(),
                format!("expression has more than {} operators", MAX_OPERATORS),
            ));
        }
        self.enter(&pair)?;
        let result = PRATT_PARSER
            .map_primary(|primary| self.parse_primary(primary))
            .map_prefix(|op, rhs| {
                let operand = rhs?;
                let op_span = op.as_span();
                let span = Span::from(op_span).combine(operand.span);
                let kind = match op.as_rule() {
                    Rule::neg => unary(UnaryOp::Neg, operand),
                    Rule::plus => unary(UnaryOp::Plus, operand),
                    Rule::not => unary(UnaryOp::Not, operand),
                    Rule::bit_not => unary(UnaryOp::BitNot, operand),
                    Rule::cast_op => NodeKind::Cast {
                        ty: self.parse_type_name(single_inner(op)?)?,
                        operand: boxed(operand),
                        kind: CastKind::Convert,
                    },
                    rule => return Err(custom(op_span, format!("unknown prefix {:?}", rule))),
                };
                self.operator(kind, span, op_span)
            })
            .map_infix(|lhs, op, rhs| {
                let left = lhs?;
                let right = rhs?;
                let op_span = op.as_span();
                let span = left.span.combine(right.span);
                let op_enum = match op.as_rule() {
                    Rule::cond_op => {
                        let then_branch = self.parse_expression(single_inner(op)?)?;
                        return self.operator(
                            NodeKind::Conditional {
                                cond: boxed(left),
                                then_branch: boxed(then_branch),
                                else_branch: boxed(right),
                            },
                            span,
                            op_span,
                        );
                    }
                    Rule::coalesce => {
                        return self.operator(
                            NodeKind::Coalesce {
                                left: boxed(left),
                                right: boxed(right),
                            },
                            span,
                            op_span,
                        );
                    }
                    Rule::or => BinaryOp::Or,
                    Rule::and => BinaryOp::And,
                    Rule::bit_or => BinaryOp::BitOr,
                    Rule::bit_xor => BinaryOp::Xor,
                    Rule::bit_and => BinaryOp::BitAnd,
                    Rule::eq => BinaryOp::Eq,
                    Rule::ne => BinaryOp::Ne,
                    Rule::lt => BinaryOp::Lt,
                    Rule::le => BinaryOp::Le,
                    Rule::gt => BinaryOp::Gt,
                    Rule::ge => BinaryOp::Ge,
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    Rule::div => BinaryOp::Div,
                    Rule::rem => BinaryOp::Rem,
                    rule => return Err(custom(op_span, format!("unknown operator {:?}", rule))),
                };
                self.operator(
                    NodeKind::Binary {
                        op: op_enum,
                        left: boxed(left),
                        right: boxed(right),
                    },
                    span,
                    op_span,
                )
            })
            .map_postfix(|lhs, op| {
                let target = lhs?;
                let op_span = op.as_span();
                let span = target.span.combine(op_span.into());
                let kind = match op.as_rule() {
                    Rule::member_op => {
                        let name = single_inner(op)?;
                        NodeKind::Member {
                            target: boxed(target),
                            name: name.as_str().to_string(),
                            name_span: name.as_span().into(),
                        }
                    }
                    Rule::call_op => NodeKind::Call {
                        target: boxed(target),
                        args: self.parse_list(op)?,
                    },
                    Rule::index_op => NodeKind::Index {
                        target: boxed(target),
                        args: self.parse_list(op)?,
                    },
                    Rule::is_op => NodeKind::TypeIs {
                        operand: boxed(target),
                        ty: self.parse_type_name(find_inner(op, Rule::type_name)?)?,
                    },
                    Rule::as_op => NodeKind::Cast {
                        operand: boxed(target),
                        ty: self.parse_type_name(find_inner(op, Rule::type_name)?)?,
                        kind: CastKind::TryAs,
                    },
                    rule => return Err(custom(op_span, format!("unknown postfix {:?}", rule))),
                };
                self.operator(kind, span, op_span)
            })
            .parse(pair.into_inner());
        self.leave();
        result
    }

    fn parse_primary(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let span: Span = pair.as_span().into();
        let kind = match pair.as_rule() {
            Rule::expression => return self.parse_expression(pair),
            Rule::grouped => return self.parse_expression(single_inner(pair)?),
            Rule::null_lit => NodeKind::Literal(Literal::Null),
            Rule::bool_lit => NodeKind::Literal(Literal::Bool(pair.as_str() == "true")),
            Rule::int_lit => {
                let value = pair
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| custom(pair.as_span(), "integer literal is too large"))?;
                NodeKind::Literal(Literal::Int(value))
            }
            Rule::float_lit => {
                let value = pair
                    .as_str()
                    .parse::<f64>()
                    .map_err(|e| custom(pair.as_span(), format!("invalid number: {}", e)))?;
                NodeKind::Literal(Literal::Float(value))
            }
            Rule::string_lit => {
                let quoted = pair.as_str();
                let body = &quoted[1..quoted.len() - 1];
                let value = unescape(body).map_err(|msg| custom(pair.as_span(), msg))?;
                NodeKind::Literal(Literal::Str(value))
            }
            Rule::ident => NodeKind::Ident(pair.as_str().to_string()),
            Rule::new_expr => return self.parse_new(pair),
            rule => return Err(custom(pair.as_span(), format!("unexpected {:?}", rule))),
        };
        Ok(Node::new(kind, span))
    }

    /// Expressions directly inside `pair`.
    fn parse_list(&self, pair: Pair<Rule>) -> ParseResult<Vec<Node>> {
        pair.into_inner()
            .filter(|p| p.as_rule() == Rule::expression)
            .map(|p| self.parse_expression(p))
            .collect()
    }

    fn parse_new(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let pest_span = pair.as_span();
        let span: Span = pest_span.into();
        let mut ty = None;
        let mut bounds = None;
        let mut ranks = Vec::new();
        let mut items = None;
        let mut args = None;
        let mut init = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::new_kw => {}
                Rule::type_base => ty = Some(self.parse_type_name(part)?),
                Rule::array_bounds => bounds = Some(self.parse_list(part)?),
                Rule::rank_spec => ranks.push(rank_of(part)),
                Rule::array_init => items = Some(self.parse_array_items(part)?),
                Rule::ctor_args => args = Some(self.parse_list(part)?),
                Rule::object_init => init = Some(self.parse_initializer(part)?),
                rule => return Err(custom(part.as_span(), format!("unexpected {:?}", rule))),
            }
        }
        let Some(ty) = ty else {
            return Err(custom(pest_span, "missing type in new expression"));
        };

        let kind = if bounds.is_some() || !ranks.is_empty() {
            // `new T[n]...` or `new T[]...`: the first bracket is the array
            // itself, any further rank specifiers belong to the element type.
            let (rank, bounds, element_ranks) = match bounds {
                Some(bounds) => (bounds.len() as u8, bounds, ranks),
                None => {
                    let mut ranks = ranks.into_iter();
                    let rank = ranks.next().unwrap_or(1);
                    (rank, Vec::new(), ranks.collect())
                }
            };
            let mut element = ty;
            element.ranks = element_ranks;
            NodeKind::NewArray {
                element,
                rank,
                bounds,
                upper_bounds: false,
                items,
            }
        } else {
            NodeKind::New {
                ty,
                args: args.unwrap_or_default(),
                init,
            }
        };
        Ok(Node::new(kind, span))
    }

    fn parse_array_items(&self, pair: Pair<Rule>) -> ParseResult<Vec<ArrayItem>> {
        self.enter(&pair)?;
        let items = pair
            .into_inner()
            .map(|item| match item.as_rule() {
                Rule::array_init => {
                    let span = item.as_span().into();
                    Ok(ArrayItem::Nested(self.parse_array_items(item)?, span))
                }
                _ => Ok(ArrayItem::Expr(self.parse_expression(item)?)),
            })
            .collect();
        self.leave();
        items
    }

    fn parse_initializer(&self, pair: Pair<Rule>) -> ParseResult<Initializer> {
        self.enter(&pair)?;
        let init = self.parse_initializer_entries(pair);
        self.leave();
        init
    }

    fn parse_initializer_entries(&self, pair: Pair<Rule>) -> ParseResult<Initializer> {
        let span = pair.as_span();
        let mut members = Vec::new();
        let mut elements = Vec::new();
        for entry in pair.into_inner() {
            let entry_span: Span = entry.as_span().into();
            match entry.as_rule() {
                Rule::member_init => {
                    let mut inner = entry.into_inner();
                    let name = inner
                        .next()
                        .ok_or_else(|| custom(span, "missing member name"))?;
                    let value = inner
                        .next()
                        .ok_or_else(|| custom(span, "missing member value"))?;
                    let value = match value.as_rule() {
                        Rule::object_init => InitValue::Nested(self.parse_initializer(value)?),
                        _ => InitValue::Expr(self.parse_expression(value)?),
                    };
                    members.push(MemberInit {
                        name: name.as_str().to_string(),
                        span: entry_span,
                        value,
                    });
                }
                Rule::element_init => elements.push(ElementInit {
                    args: self.parse_list(entry)?,
                    span: entry_span,
                }),
                _ => elements.push(ElementInit {
                    args: vec![self.parse_expression(entry)?],
                    span: entry_span,
                }),
            }
        }
        match (members.is_empty(), elements.is_empty()) {
            (_, true) => Ok(Initializer::Object(members)),
            (true, false) => Ok(Initializer::Collection(elements)),
            (false, false) => Err(custom(
                span,
                "an initializer cannot mix member assignments and collection elements",
            )),
        }
    }

    fn parse_type_name(&self, pair: Pair<Rule>) -> ParseResult<TypeName> {
        let span: Span = pair.as_span().into();
        let mut name = TypeName {
            path: Vec::new(),
            args: Vec::new(),
            ranks: Vec::new(),
            span,
        };
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::qualified_name => {
                    name.path = part.into_inner().map(|p| p.as_str().to_string()).collect();
                }
                Rule::type_args => {
                    name.args = part
                        .into_inner()
                        .map(|p| self.parse_type_name(p))
                        .collect::<ParseResult<_>>()?;
                }
                Rule::rank_spec => name.ranks.push(rank_of(part)),
                rule => return Err(custom(part.as_span(), format!("unexpected {:?}", rule))),
            }
        }
        Ok(name)
    }
}

fn unary(op: UnaryOp, operand: Node) -> NodeKind {
    NodeKind::Unary {
        op,
        operand: boxed(operand),
    }
}

fn rank_of(pair: Pair<Rule>) -> u8 {
    1 + pair.into_inner().count() as u8
}

fn single_inner(pair: Pair<Rule>) -> ParseResult<Pair<Rule>> {
    let span = pair.as_span();
    pair.into_inner()
        .next()
        .ok_or_else(|| custom(span, "missing expected pair in rule"))
}

fn find_inner(pair: Pair<Rule>, rule: Rule) -> ParseResult<Pair<Rule>> {
    let span = pair.as_span();
    pair.into_inner()
        .find(|p| p.as_rule() == rule)
        .ok_or_else(|| custom(span, format!("missing {:?}", rule)))
}

use core::cell::Cell;

use lazy_static::lazy_static;
use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use super::{
    ArrayItem, BinaryOp, CastKind, ElementInit, InitValue, Initializer, Literal, MAX_NESTING_DEPTH,
    MAX_OPERATORS, MemberInit, Node, NodeKind, Span, SyntaxError, TypeName, UnaryOp,
    convert_pest_error,
};

lazy_static! {
    // Note: precedence is defined lowest to highest.
    static ref PRATT_PARSER: PrattParser<Rule> = PrattParser::new()
        // (lowest precedence)
        .op(Op::infix(Rule::xor, Assoc::Left))          // `Xor`
        .op(
            Op::infix(Rule::or, Assoc::Left) |
            Op::infix(Rule::or_else, Assoc::Left)
        )                                               // `Or`, `OrElse`
        .op(
            Op::infix(Rule::and, Assoc::Left) |
            Op::infix(Rule::and_also, Assoc::Left)
        )                                               // `And`, `AndAlso`
        .op(Op::prefix(Rule::not))                      // `Not`
        .op(
            Op::infix(Rule::eq, Assoc::Left) |
            Op::infix(Rule::ne, Assoc::Left) |
            Op::infix(Rule::lt, Assoc::Left) |
            Op::infix(Rule::gt, Assoc::Left) |
            Op::infix(Rule::le, Assoc::Left) |
            Op::infix(Rule::ge, Assoc::Left) |
            Op::infix(Rule::is, Assoc::Left) |
            Op::infix(Rule::is_not, Assoc::Left)
        )                                               // `=`, `<>`, `<`, `>`, `<=`, `>=`, `Is`, `IsNot`
        .op(Op::infix(Rule::concat, Assoc::Left))       // `&`
        .op(
            Op::infix(Rule::add, Assoc::Left) |
            Op::infix(Rule::sub, Assoc::Left)
        )                                               // `+`, `-`
        .op(Op::infix(Rule::rem, Assoc::Left))          // `Mod`
        .op(Op::infix(Rule::int_div, Assoc::Left))      // `\`
        .op(
            Op::infix(Rule::mul, Assoc::Left) |
            Op::infix(Rule::real_div, Assoc::Left)
        )                                               // `*`, `/`
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::plus)) // `-`, `+`
        .op(Op::postfix(Rule::member_op) | Op::postfix(Rule::call_op)) // `.`, `()`
        // (highest precedence)
        ;
}

#[derive(Parser)]
#[grammar = "syntax/basic.pest"]
struct BasicParser;

type ParseResult<T> = Result<T, pest::error::Error<Rule>>;

pub(super) fn parse(text: &str) -> Result<Node, SyntaxError> {
    let mut pairs =
        BasicParser::parse(Rule::unit, text).map_err(|e| convert_pest_error(e, describe))?;
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
        Rule::nothing_lit | Rule::bool_lit => "literal",
        Rule::EOI => "end of input",
        Rule::or_else => "`OrElse`",
        Rule::and_also => "`AndAlso`",
        Rule::xor => "`Xor`",
        Rule::or => "`Or`",
        Rule::and => "`And`",
        Rule::is_not => "`IsNot`",
        Rule::is => "`Is`",
        Rule::ne => "`<>`",
        Rule::le => "`<=`",
        Rule::ge => "`>=`",
        Rule::eq => "`=`",
        Rule::lt => "`<`",
        Rule::gt => "`>`",
        Rule::concat => "`&`",
        Rule::add => "`+`",
        Rule::sub => "`-`",
        Rule::mul => "`*`",
        Rule::real_div => "`/`",
        Rule::int_div => "`\\`",
        Rule::rem => "`Mod`",
        Rule::member_op => "`.`",
        Rule::call_op => "`(`",
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
        Rule::grouped
            | Rule::nothing_lit
            | Rule::bool_lit
            | Rule::int_lit
            | Rule::float_lit
            | Rule::string_lit
            | Rule::ident
            | Rule::if_expr
            | Rule::typeof_expr
            | Rule::cast_expr
            | Rule::conv_expr
            | Rule::new_expr
    )
}

fn boxed(node: Node) -> Box<Node> {
    Box::new(node)
}

/// Target type of the `CInt`-style conversion functions.
fn conversion_target(keyword: &str) -> &'static str {
    match keyword.to_ascii_lowercase().as_str() {
        "cint" => "Integer",
        "clng" => "Long",
        "cdbl" => "Double",
        "cstr" => "String",
        "cbool" => "Boolean",
        _ => "Object",
    }
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

    /// Runs the Pratt parser over an `expression` or `typeof_operand`.
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
                let op_enum = match op.as_rule() {
                    Rule::not => UnaryOp::Not,
                    Rule::neg => UnaryOp::Neg,
                    Rule::plus => UnaryOp::Plus,
                    rule => return Err(custom(op_span, format!("unknown prefix {:?}", rule))),
                };
                self.operator(
                    NodeKind::Unary {
                        op: op_enum,
                        operand: boxed(operand),
                    },
                    span,
                    op_span,
                )
            })
            .map_infix(|lhs, op, rhs| {
                let left = lhs?;
                let right = rhs?;
                let op_span = op.as_span();
                let span = left.span.combine(right.span);
                let op_enum = match op.as_rule() {
                    Rule::or_else => BinaryOp::Or,
                    Rule::and_also => BinaryOp::And,
                    Rule::or => BinaryOp::BitOr,
                    Rule::and => BinaryOp::BitAnd,
                    Rule::xor => BinaryOp::Xor,
                    Rule::eq | Rule::is => BinaryOp::Eq,
                    Rule::ne | Rule::is_not => BinaryOp::Ne,
                    Rule::lt => BinaryOp::Lt,
                    Rule::le => BinaryOp::Le,
                    Rule::gt => BinaryOp::Gt,
                    Rule::ge => BinaryOp::Ge,
                    Rule::concat => BinaryOp::Concat,
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    Rule::real_div => BinaryOp::RealDiv,
                    Rule::int_div => BinaryOp::IntDiv,
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
                    rule => return Err(custom(op_span, format!("unknown postfix {:?}", rule))),
                };
                self.operator(kind, span, op_span)
            })
            .parse(pair.into_inner());
        self.leave();
        result
    }

    fn parse_primary(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let pest_span = pair.as_span();
        let span: Span = pest_span.into();
        let kind = match pair.as_rule() {
            Rule::grouped => return self.parse_expression(single_inner(pair)?),
            Rule::nothing_lit => NodeKind::Literal(Literal::Null),
            Rule::bool_lit => {
                NodeKind::Literal(Literal::Bool(pair.as_str().eq_ignore_ascii_case("true")))
            }
            Rule::int_lit => {
                let value = pair
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| custom(pest_span, "integer literal is too large"))?;
                NodeKind::Literal(Literal::Int(value))
            }
            Rule::float_lit => {
                let value = pair
                    .as_str()
                    .parse::<f64>()
                    .map_err(|e| custom(pest_span, format!("invalid number: {}", e)))?;
                NodeKind::Literal(Literal::Float(value))
            }
            Rule::string_lit => {
                let quoted = pair.as_str();
                let body = &quoted[1..quoted.len() - 1];
                NodeKind::Literal(Literal::Str(body.replace("\"\"", "\"")))
            }
            Rule::ident => NodeKind::Ident(pair.as_str().to_string()),
            Rule::if_expr => {
                let mut args = self.parse_list(pair)?;
                match (args.pop(), args.pop(), args.pop()) {
                    (Some(else_branch), Some(then_branch), Some(cond)) => NodeKind::Conditional {
                        cond: boxed(cond),
                        then_branch: boxed(then_branch),
                        else_branch: boxed(else_branch),
                    },
                    (Some(right), Some(left), None) => NodeKind::Coalesce {
                        left: boxed(left),
                        right: boxed(right),
                    },
                    _ => return Err(custom(pest_span, "If takes two or three arguments")),
                }
            }
            Rule::typeof_expr => {
                let operand = self.parse_expression(find_inner(pair.clone(), Rule::typeof_operand)?)?;
                NodeKind::TypeIs {
                    operand: boxed(operand),
                    ty: self.parse_type_name(find_inner(pair, Rule::type_name)?)?,
                }
            }
            Rule::cast_expr => {
                let keyword = find_inner(pair.clone(), Rule::cast_kw)?;
                let kind = if keyword.as_str().eq_ignore_ascii_case("trycast") {
                    CastKind::TryAs
                } else {
                    CastKind::Convert
                };
                let operand = self.parse_expression(find_inner(pair.clone(), Rule::expression)?)?;
                NodeKind::Cast {
                    operand: boxed(operand),
                    ty: self.parse_type_name(find_inner(pair, Rule::type_name)?)?,
                    kind,
                }
            }
            Rule::conv_expr => {
                let keyword = find_inner(pair.clone(), Rule::conv_kw)?;
                let operand = self.parse_expression(find_inner(pair, Rule::expression)?)?;
                NodeKind::Cast {
                    operand: boxed(operand),
                    ty: TypeName::simple(conversion_target(keyword.as_str()), keyword.as_span().into()),
                    kind: CastKind::Convert,
                }
            }
            Rule::new_expr => return self.parse_new(pair),
            rule => return Err(custom(pest_span, format!("unexpected {:?}", rule))),
        };
        Ok(Node::new(kind, span))
    }

    fn parse_list(&self, pair: Pair<Rule>) -> ParseResult<Vec<Node>> {
        pair.into_inner()
            .filter(|p| p.as_rule() == Rule::expression)
            .map(|p| self.parse_expression(p))
            .collect()
    }

    fn parse_new(&self, pair: Pair<Rule>) -> ParseResult<Node> {
        let pest_span = pair.as_span();
        let span: Span = pest_span.into();
        let ty = self.parse_type_name(find_inner(pair.clone(), Rule::type_base)?)?;

        if let Ok(creation) = find_inner(pair.clone(), Rule::array_creation) {
            // `New T(n) {...}` sizes by upper bound; `New T() {...}` and
            // `New T(,) {...}` take their shape from the initializer.
            let mut bounds = Vec::new();
            let mut commas = 0u8;
            let mut items = Vec::new();
            for part in creation.into_inner() {
                match part.as_rule() {
                    Rule::array_bounds => bounds = self.parse_list(part)?,
                    Rule::rank_comma => commas += 1,
                    Rule::array_init => items = self.parse_array_items(part)?,
                    rule => return Err(custom(part.as_span(), format!("unexpected {:?}", rule))),
                }
            }
            let rank = if bounds.is_empty() {
                commas + 1
            } else {
                bounds.len() as u8
            };
            // Basic writes `New Integer(2) {}` for an array of three zeroes;
            // an empty initializer means "no element values".
            let items = if !bounds.is_empty() && items.is_empty() {
                None
            } else {
                Some(items)
            };
            return Ok(Node::new(
                NodeKind::NewArray {
                    element: ty,
                    rank,
                    bounds,
                    upper_bounds: true,
                    items,
                },
                span,
            ));
        }

        let creation = find_inner(pair, Rule::object_creation)?;
        let mut args = Vec::new();
        let mut init = None;
        for part in creation.into_inner() {
            match part.as_rule() {
                Rule::ctor_args => args = self.parse_list(part)?,
                Rule::with_init => {
                    let members = part
                        .into_inner()
                        .filter(|p| p.as_rule() == Rule::member_init)
                        .map(|m| self.parse_member_init(m))
                        .collect::<ParseResult<_>>()?;
                    init = Some(Initializer::Object(members));
                }
                Rule::from_init => {
                    let elements = part
                        .into_inner()
                        .filter(|p| p.as_rule() != Rule::from_kw)
                        .map(|e| self.parse_element(e))
                        .collect::<ParseResult<_>>()?;
                    init = Some(Initializer::Collection(elements));
                }
                rule => return Err(custom(part.as_span(), format!("unexpected {:?}", rule))),
            }
        }
        Ok(Node::new(NodeKind::New { ty, args, init }, span))
    }

    fn parse_member_init(&self, pair: Pair<Rule>) -> ParseResult<MemberInit> {
        let span: Span = pair.as_span().into();
        let name = find_inner(pair.clone(), Rule::member_name)?;
        let value = self.parse_expression(find_inner(pair, Rule::expression)?)?;
        Ok(MemberInit {
            name: name.as_str().to_string(),
            span,
            value: InitValue::Expr(value),
        })
    }

    fn parse_element(&self, pair: Pair<Rule>) -> ParseResult<ElementInit> {
        let span: Span = pair.as_span().into();
        let args = match pair.as_rule() {
            Rule::element_init => self.parse_list(pair)?,
            _ => vec![self.parse_expression(pair)?],
        };
        Ok(ElementInit { args, span })
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
                Rule::generic_args => {
                    name.args = part
                        .into_inner()
                        .filter(|p| p.as_rule() == Rule::type_name)
                        .map(|p| self.parse_type_name(p))
                        .collect::<ParseResult<_>>()?;
                }
                Rule::rank_spec => name.ranks.push(1 + part.into_inner().count() as u8),
                rule => return Err(custom(part.as_span(), format!("unexpected {:?}", rule))),
            }
        }
        Ok(name)
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(text: &str) -> Node {
        parse(&format!("({}\n)", text)).unwrap_or_else(|e| panic!("{}: {}", text, e))
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let node = parse_ok("a ANDALSO Not b");
        let NodeKind::Binary { op, right, .. } = node.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(right.kind, NodeKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let node = parse_ok("Not a = b");
        let NodeKind::Unary { operand, .. } = node.kind else {
            panic!("expected unary");
        };
        assert!(matches!(operand.kind, NodeKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_identifiers_starting_with_keywords() {
        assert_eq!(parse_ok("Order").kind, NodeKind::Ident("Order".to_string()));
        assert_eq!(parse_ok("Island").kind, NodeKind::Ident("Island".to_string()));
    }

    #[test]
    fn test_if_forms() {
        assert!(matches!(parse_ok("If(a, 1, 2)").kind, NodeKind::Conditional { .. }));
        assert!(matches!(parse_ok("If(a, b)").kind, NodeKind::Coalesce { .. }));
    }

    #[test]
    fn test_typeof_and_casts() {
        assert!(matches!(parse_ok("TypeOf x Is String").kind, NodeKind::TypeIs { .. }));
        assert!(matches!(
            parse_ok("TryCast(x, String)").kind,
            NodeKind::Cast { kind: CastKind::TryAs, .. }
        ));
        let NodeKind::Cast { ty, kind, .. } = parse_ok("CInt(x)").kind else {
            panic!("expected cast");
        };
        assert_eq!(kind, CastKind::Convert);
        assert_eq!(ty.path, vec!["Integer".to_string()]);
    }

    #[test]
    fn test_new_forms() {
        let NodeKind::New { ty, init, .. } = parse_ok("New List(Of Integer) From {1, 2}").kind
        else {
            panic!("expected new");
        };
        assert_eq!(ty.args.len(), 1);
        assert!(matches!(init, Some(Initializer::Collection(ref e)) if e.len() == 2));

        let NodeKind::New { args, init, .. } = parse_ok("New Point(1) With {.Y = 2}").kind else {
            panic!("expected new");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(init, Some(Initializer::Object(ref m)) if m[0].name == "Y"));
    }

    #[test]
    fn test_array_forms() {
        assert!(matches!(
            parse_ok("New Integer() {1, 2}").kind,
            NodeKind::NewArray { rank: 1, upper_bounds: true, items: Some(ref i), .. } if i.len() == 2
        ));
        assert!(matches!(
            parse_ok("New Integer(1, 2) {}").kind,
            NodeKind::NewArray { rank: 2, items: None, .. }
        ));
        assert!(matches!(
            parse_ok("New Integer(,) {{1, 2}, {3, 4}}").kind,
            NodeKind::NewArray { rank: 2, items: Some(_), .. }
        ));
    }

    #[test]
    fn test_call_syntax_is_also_indexing() {
        assert!(matches!(parse_ok("a(1, 2)").kind, NodeKind::Call { ref args, .. } if args.len() == 2));
    }

    #[test]
    fn test_doubled_quotes() {
        assert_eq!(
            parse_ok(r#""say ""hi""""#).kind,
            NodeKind::Literal(Literal::Str("say \"hi\"".to_string()))
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("(x +\n)").is_err());
        assert!(parse("(If(a)\n)").is_err());
    }

    #[test]
    fn test_operator_chain_limits() {
        let terms = |n: usize| vec!["x"; n].join(" & ");
        assert_eq!(parse_ok(&terms(40)).depth, 40);

        let err = parse(&format!("({}\n)", terms(100))).unwrap_err();
        assert!(err.message.contains("nesting depth"));

        let err = parse(&format!("({}\n)", terms(5000))).unwrap_err();
        assert!(err.message.contains("operators"), "{}", err.message);

        let err = parse(&format!("({}x\n)", "Not ".repeat(300))).unwrap_err();
        assert!(err.message.contains("operators"), "{}", err.message);
    }
}

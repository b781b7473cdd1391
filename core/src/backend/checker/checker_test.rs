use pretty_assertions::assert_eq;

use crate::assembly::{AssemblyResolver, BuiltinResolver, NamespaceSet, STD, STD_COLLECTIONS};
use crate::backend::{
    BackendDiagnostic, BackendRequest, CompilerBackend, HostedBackend, Severity, codes,
};
use crate::syntax::{Language, Span};
use crate::tree::RawExpressionTree;
use crate::types::Type;
use crate::values::Value;

fn backend(language: Language) -> HostedBackend {
    let resolver = BuiltinResolver::new();
    let assemblies = [STD, STD_COLLECTIONS]
        .iter()
        .map(|name| resolver.resolve(name).unwrap())
        .collect::<Vec<_>>();
    HostedBackend::new(language, &assemblies)
}

fn variables() -> Vec<(&'static str, Type)> {
    vec![
        ("x", Type::Int),
        ("y", Type::Float),
        ("s", Type::String),
        ("o", Type::Object),
        ("flag", Type::Bool),
        ("items", Type::array(Type::Int, 1)),
    ]
}

fn run(
    language: Language,
    source: &str,
    target: Option<&Type>,
    diagnose: bool,
) -> Result<RawExpressionTree, Vec<BackendDiagnostic>> {
    let namespaces: NamespaceSet = ["Std", "Std.Collections"].into_iter().collect();
    let vars = variables();
    let lookup = |name: &str| {
        vars.iter()
            .find(|(n, _)| language.names_equal(n, name))
            .map(|(_, ty)| ty.clone())
    };
    let request = BackendRequest {
        source,
        namespaces: &namespaces,
        lookup: &lookup,
        target_type: target,
    };
    let mut backend = backend(language);
    if diagnose {
        Err(backend.diagnose(&request))
    } else {
        backend.compile(&request)
    }
}

fn compile(language: Language, source: &str) -> RawExpressionTree {
    run(language, source, None, false)
        .unwrap_or_else(|d| panic!("{} failed to compile: {:?}", source, d))
}

fn errors(language: Language, source: &str) -> Vec<BackendDiagnostic> {
    match run(language, source, None, false) {
        Ok(_) => panic!("{} compiled", source),
        Err(diagnostics) => diagnostics,
    }
}

fn diagnose(language: Language, source: &str) -> Vec<BackendDiagnostic> {
    run(language, source, None, true).unwrap_err()
}

fn eval(language: Language, source: &str, args: &[Value]) -> Value {
    compile(language, source)
        .invoke(args)
        .unwrap_or_else(|e| panic!("{} failed: {}", source, e))
}

fn free_names(tree: &RawExpressionTree) -> Vec<String> {
    tree.free_identifiers
        .iter()
        .map(|p| p.name.to_string())
        .collect()
}

#[test]
fn test_free_identifiers_in_first_use_order() {
    let tree = compile(Language::CStyle, "y + x * x");
    assert_eq!(free_names(&tree), vec!["y", "x"]);
    assert_eq!(tree.result_type, Type::Float);
    assert_eq!(tree.signature.params().len(), 3);
}

#[test]
fn test_basic_names_are_case_insensitive() {
    let tree = compile(Language::Basic, "X + x");
    assert_eq!(free_names(&tree), vec!["X"]);
    assert_eq!(tree.invoke(&[Value::Int(2)]).unwrap(), Value::Int(4));
}

#[test]
fn test_c_style_names_are_case_sensitive() {
    let diagnostics = errors(Language::CStyle, "X + 1");
    assert_eq!(diagnostics[0].code, codes::UNDEFINED_IDENTIFIER);
    assert_eq!(diagnostics[0].span, Span::new(0, 1));
}

#[test]
fn test_undefined_identifier_span_is_relative_to_source() {
    let diagnostics = errors(Language::CStyle, "x + nope");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::UNDEFINED_IDENTIFIER);
    assert_eq!(diagnostics[0].span, Span::new(4, 8));
}

#[test]
fn test_syntax_error() {
    let diagnostics = errors(Language::CStyle, "x +");
    assert_eq!(diagnostics[0].code, codes::SYNTAX);
    assert!(diagnostics[0].span.end <= 3);
}

#[test]
fn test_division_by_dialect() {
    assert_eq!(eval(Language::CStyle, "x / 2", &[Value::Int(7)]), Value::Int(3));
    assert_eq!(eval(Language::Basic, "x / 2", &[Value::Int(7)]), Value::Float(3.5));
    assert_eq!(eval(Language::Basic, "x \\ 2", &[Value::Int(7)]), Value::Int(3));
}

#[test]
fn test_string_concatenation() {
    let args = [Value::str("a"), Value::Int(1)];
    assert_eq!(eval(Language::CStyle, "s + x", &args), Value::str("a1"));
    assert_eq!(eval(Language::Basic, "s & x", &args), Value::str("a1"));
}

#[test]
fn test_coalesce_evaluates_left_once() {
    let tree = compile(Language::CStyle, "s ?? \"none\"");
    assert_eq!(tree.local_count, 1);
    assert_eq!(tree.result_type, Type::String);
    assert_eq!(tree.invoke(&[Value::Null]).unwrap(), Value::str("none"));
    assert_eq!(tree.invoke(&[Value::str("a")]).unwrap(), Value::str("a"));

    let tree = compile(Language::Basic, "If(s, \"none\")");
    assert_eq!(tree.invoke(&[Value::Null]).unwrap(), Value::str("none"));
}

#[test]
fn test_coalesce_requires_reference_type() {
    let diagnostics = errors(Language::CStyle, "x ?? 1");
    assert_eq!(diagnostics[0].code, codes::INVALID_OPERATOR);
}

#[test]
fn test_overload_resolution() {
    assert_eq!(eval(Language::CStyle, "Math.Max(1, 2)", &[]), Value::Int(2));
    assert_eq!(
        eval(Language::CStyle, "Math.Max(x, 2.5)", &[Value::Int(3)]),
        Value::Float(3.0)
    );
    let diagnostics = errors(Language::CStyle, "Math.Sqrt(\"a\")");
    assert_eq!(diagnostics[0].code, codes::NO_OVERLOAD);
}

#[test]
fn test_qualified_static_member() {
    let value = eval(Language::CStyle, "Std.Math.PI > 3.0", &[]);
    assert_eq!(value, Value::Bool(true));
    assert_eq!(eval(Language::CStyle, "int.MaxValue", &[]), Value::Int(i64::MAX));
}

#[test]
fn test_unknown_member() {
    let diagnostics = errors(Language::CStyle, "s.Nope");
    assert_eq!(diagnostics[0].code, codes::UNKNOWN_MEMBER);
    assert_eq!(diagnostics[0].span, Span::new(2, 6));
}

#[test]
fn test_type_used_as_value() {
    let diagnostics = errors(Language::CStyle, "Math");
    assert_eq!(diagnostics[0].code, codes::UNDEFINED_IDENTIFIER);
}

#[test]
fn test_redundant_cast_is_a_warning() {
    let tree = compile(Language::CStyle, "(int)x");
    assert_eq!(tree.result_type, Type::Int);

    let diagnostics = diagnose(Language::CStyle, "(int)x");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::REDUNDANT_CAST);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
}

#[test]
fn test_null_comparison_warning() {
    let diagnostics = diagnose(Language::CStyle, "x == null");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::NULL_COMPARISON);
}

#[test]
fn test_diagnose_reports_error_and_warnings() {
    let diagnostics = diagnose(Language::CStyle, "(int)x + nope");
    let codes: Vec<_> = diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![codes::REDUNDANT_CAST, codes::UNDEFINED_IDENTIFIER]);
}

#[test]
fn test_target_type() {
    let tree = run(Language::CStyle, "x", Some(&Type::Float), false).unwrap();
    assert_eq!(tree.result_type, Type::Float);
    assert_eq!(tree.invoke(&[Value::Int(2)]).unwrap(), Value::Float(2.0));

    let diagnostics = run(Language::CStyle, "s", Some(&Type::Int), false).unwrap_err();
    assert_eq!(diagnostics[0].code, codes::TYPE_MISMATCH);
}

#[test]
fn test_casts() {
    assert_eq!(eval(Language::CStyle, "(int)y", &[Value::Float(2.7)]), Value::Int(2));
    assert_eq!(eval(Language::Basic, "CInt(y)", &[Value::Float(2.7)]), Value::Int(3));
    assert_eq!(eval(Language::CStyle, "o as string", &[Value::Int(1)]), Value::Null);
    assert_eq!(eval(Language::CStyle, "o is string", &[Value::str("a")]), Value::Bool(true));

    let diagnostics = errors(Language::CStyle, "o as int");
    assert_eq!(diagnostics[0].code, codes::INVALID_CAST);
    let diagnostics = errors(Language::CStyle, "(int)s");
    assert_eq!(diagnostics[0].code, codes::INVALID_CAST);
}

#[test]
fn test_basic_calls_parameterless_methods_without_parentheses() {
    assert_eq!(eval(Language::Basic, "s.ToUpper", &[Value::str("abc")]), Value::str("ABC"));
    assert_eq!(eval(Language::Basic, "x.ToString", &[Value::Int(5)]), Value::str("5"));
}

#[test]
fn test_basic_call_syntax_indexes() {
    let items = crate::values::ArrayRef::new(
        Type::Int,
        smallvec::smallvec![3],
        vec![Value::Int(10), Value::Int(20), Value::Int(30)],
    );
    let value = eval(Language::Basic, "items(1)", &[Value::Array(items)]);
    assert_eq!(value, Value::Int(20));
}

#[test]
fn test_basic_not_on_integer_is_bitwise() {
    assert_eq!(eval(Language::Basic, "Not 0", &[]), Value::Int(-1));
    assert_eq!(eval(Language::Basic, "Not flag", &[Value::Bool(true)]), Value::Bool(false));
}

#[test]
fn test_rectangular_array_initializer() {
    let value = eval(Language::CStyle, "new int[,] { {1, 2}, {3, 4} }[1, 0]", &[]);
    assert_eq!(value, Value::Int(3));

    let diagnostics = errors(Language::CStyle, "new int[,] { {1, 2}, {3} }");
    assert_eq!(diagnostics[0].code, codes::TYPE_MISMATCH);
}

#[test]
fn test_collection_initializer() {
    let value = eval(Language::CStyle, "(new List<int> { 1, 2, 3 }).Count", &[]);
    assert_eq!(value, Value::Int(3));
    let value = eval(Language::CStyle, "(new Map<string, int> { { \"a\", 1 } })[\"a\"]", &[]);
    assert_eq!(value, Value::Int(1));
}

#[test]
fn test_generic_arity_is_checked() {
    let diagnostics = errors(Language::CStyle, "new List<int, int>()");
    assert_eq!(diagnostics[0].code, codes::UNKNOWN_TYPE);
}

#[test]
fn test_conditional_requires_bool() {
    let diagnostics = errors(Language::CStyle, "x ? 1 : 2");
    assert_eq!(diagnostics[0].code, codes::TYPE_MISMATCH);
    assert_eq!(
        eval(Language::CStyle, "flag ? 1 : 2.5", &[Value::Bool(true)]),
        Value::Float(1.0)
    );
}

#[test]
fn test_disposed_backend_refuses_work() {
    let mut backend = backend(Language::CStyle);
    backend.dispose();
    let namespaces = NamespaceSet::new();
    let lookup = |_: &str| None;
    let request = BackendRequest {
        source: "1",
        namespaces: &namespaces,
        lookup: &lookup,
        target_type: None,
    };
    let diagnostics = backend.compile(&request).unwrap_err();
    assert_eq!(diagnostics[0].code, codes::INTERNAL);
    assert!(backend.is_disposed());
}

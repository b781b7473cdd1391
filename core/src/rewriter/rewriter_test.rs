use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::assembly::{Assembly, AssemblyResolver, BuiltinResolver, NamespaceSet, STD};
use crate::backend::{BackendRequest, CompilerBackend, HostedBackend};
use crate::environment::{LocationReference, Scope};
use crate::syntax::{Language, Span};
use crate::types::{Type, TypeDef};
use crate::values::Value;

fn geometry() -> Arc<Assembly> {
    Assembly::builder("geometry")
        .with_type(TypeDef::structure("Geo", "Point").field("X", Type::Int))
        .build()
        .unwrap()
}

fn point_type() -> Type {
    Type::named(geometry().types[0].clone())
}

/// Compiles `source` against `env` the way the compiler does on a miss.
fn compile(language: Language, source: &str, env: &dyn Environment) -> RawExpressionTree {
    let assemblies = vec![BuiltinResolver::new().resolve(STD).unwrap(), geometry()];
    let mut backend = HostedBackend::new(language, &assemblies);
    let namespaces: NamespaceSet = ["Std", "Geo"].into_iter().collect();
    let lookup = |name: &str| match environment::lookup(env, name, language) {
        Lookup::Found(location) | Lookup::Ambiguous(location, _) => Some(location.ty().clone()),
        Lookup::Unresolved => None,
    };
    let request = BackendRequest {
        source,
        namespaces: &namespaces,
        lookup: &lookup,
        target_type: None,
    };
    backend.compile(&request).unwrap()
}

#[test]
fn test_fast_path_binds_at_any_depth() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x + 1", original.as_ref());

    let outer = Scope::builder().variable("x", Type::Int).build();
    let middle = Scope::child(&outer).variable("y", Type::String).build();
    let inner = Scope::child(&middle).build();
    let bound = rewrite_fast(&tree, inner.as_ref()).unwrap().unwrap();

    let x = outer.find("x").unwrap();
    assert_eq!(bound.path, RewritePath::Fast);
    assert_eq!(bound.locations.len(), 1);
    assert_eq!(bound.locations[0].id, x.id());
    assert_eq!(bound.locations[0].access, LocationAccess::Value);
}

#[test]
fn test_fast_path_aborts_on_type_change() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x + 1", original.as_ref());
    let env = Scope::builder().variable("x", Type::String).build();
    assert!(rewrite_fast(&tree, env.as_ref()).unwrap().is_none());
}

#[test]
fn test_fast_path_aborts_on_missing_name() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x + 1", original.as_ref());
    let env = Scope::builder().variable("z", Type::Int).build();
    assert!(rewrite_fast(&tree, env.as_ref()).unwrap().is_none());
}

#[test]
fn test_fast_path_aborts_on_ambiguity() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x + 1", original.as_ref());
    let env = Scope::builder()
        .variable("x", Type::Int)
        .variable("x", Type::Int)
        .build();
    assert!(rewrite_fast(&tree, env.as_ref()).unwrap().is_none());
}

#[test]
fn test_full_path_reports_ambiguity() {
    let env = Scope::builder()
        .variable("x", Type::Int)
        .variable("x", Type::Int)
        .build();
    let tree = compile(Language::CStyle, "x + 1", env.as_ref());
    let err = rewrite_full(&tree, env.as_ref()).unwrap_err();
    assert_eq!(
        err,
        Error::AmbiguousIdentifier {
            name: "x".to_string(),
            count: 2,
        }
    );
}

#[test]
fn test_full_path_requires_every_name() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x + 1", original.as_ref());
    let empty = Scope::builder().build();
    assert!(matches!(
        rewrite_full(&tree, empty.as_ref()),
        Err(Error::Internal(_))
    ));
}

#[test]
fn test_full_path_ignores_types() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x", original.as_ref());
    let env = Scope::builder().variable("x", Type::Object).build();
    let bound = rewrite_full(&tree, env.as_ref()).unwrap();
    assert_eq!(bound.path, RewritePath::Full);
    assert_eq!(bound.locations[0].ty, Type::Object);
}

#[test]
fn test_locations_are_distinct_in_first_use_order() {
    let env = Scope::builder()
        .variable("a", Type::Int)
        .variable("b", Type::Int)
        .build();
    let tree = compile(Language::CStyle, "b + a * b", env.as_ref());
    let bound = rewrite_full(&tree, env.as_ref()).unwrap();
    let names: Vec<_> = bound.locations.iter().map(|l| l.name.to_string()).collect();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn test_basic_rebinds_case_insensitively() {
    let original = Scope::builder().variable("Total", Type::Int).build();
    let tree = compile(Language::Basic, "total + 1", original.as_ref());
    let env = Scope::builder().variable("TOTAL", Type::Int).build();
    assert!(rewrite_fast(&tree, env.as_ref()).unwrap().is_some());
}

#[test]
fn test_struct_container_is_bound_by_reference() {
    let env = Scope::builder().variable("p", point_type()).build();
    let tree = compile(Language::CStyle, "p.X + 1", env.as_ref());
    let bound = rewrite_full(&tree, env.as_ref()).unwrap();
    assert_eq!(bound.locations[0].access, LocationAccess::Reference);

    let ExprKind::Binary { left, .. } = &bound.body.kind else {
        panic!("expected binary, got {:?}", bound.body.kind);
    };
    let ExprKind::Member { target: Some(target), .. } = &left.kind else {
        panic!("expected member access");
    };
    assert!(matches!(
        &target.kind,
        ExprKind::Location(BoundLocation { access: LocationAccess::Reference, .. })
    ));
}

#[test]
fn test_location_in_raw_tree_is_internal_error() {
    let x = LocationReference::new("x", Type::Int);
    let body = Expr::new(
        Type::Int,
        ExprKind::Location(BoundLocation {
            id: x.id(),
            name: Arc::from("x"),
            ty: Type::Int,
            access: LocationAccess::Value,
        }),
        Span::default(),
    );
    let tree = RawExpressionTree::new(body, Vec::new(), Language::CStyle, 0);
    let env = Scope::builder().location(x).build();
    assert!(matches!(rewrite_fast(&tree, env.as_ref()), Err(Error::Internal(_))));
    assert!(matches!(rewrite_full(&tree, env.as_ref()), Err(Error::Internal(_))));
}

#[test]
fn test_rewrite_leaves_raw_tree_untouched() {
    let original = Scope::builder().variable("x", Type::Int).build();
    let tree = compile(Language::CStyle, "x * 2", original.as_ref());
    let env = Scope::builder().variable("x", Type::Int).build();
    let _ = rewrite_fast(&tree, env.as_ref()).unwrap();
    assert!(matches!(
        &tree.body.kind,
        ExprKind::Binary { left, .. } if matches!(left.kind, ExprKind::Parameter(_))
    ));
    assert_eq!(tree.invoke(&[Value::Int(4)]).unwrap(), Value::Int(8));
}

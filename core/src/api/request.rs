use core::fmt;
use std::sync::Arc;

use crate::assembly::{AssemblySet, NamespaceSet};
use crate::environment::Environment;
use crate::types::Type;

/// One expression to compile against one environment.
///
/// ```
/// use flowexpr_core::api::CompileRequest;
/// use flowexpr_core::environment::Scope;
/// use flowexpr_core::types::Type;
///
/// let env = Scope::builder().variable("x", Type::Int).build();
/// let request = CompileRequest::new("Math.Abs(x)", env)
///     .target_type(Type::Float)
///     .namespace("Std");
/// assert_eq!(request.source(), "Math.Abs(x)");
/// ```
#[derive(Clone)]
pub struct CompileRequest {
    source: String,
    target_type: Option<Type>,
    namespaces: NamespaceSet,
    assemblies: AssemblySet,
    environment: Arc<dyn Environment>,
}

impl CompileRequest {
    pub fn new(source: impl Into<String>, environment: Arc<dyn Environment>) -> Self {
        Self {
            source: source.into(),
            target_type: None,
            namespaces: NamespaceSet::new(),
            assemblies: AssemblySet::new(),
            environment,
        }
    }

    /// Requires the result to convert implicitly to `ty`.
    pub fn target_type(mut self, ty: Type) -> Self {
        self.target_type = Some(ty);
        self
    }

    pub fn namespace(mut self, name: impl Into<String>) -> Self {
        self.namespaces.insert(name);
        self
    }

    pub fn namespaces(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for name in names {
            self.namespaces.insert(name);
        }
        self
    }

    pub fn assembly(mut self, name: impl Into<String>) -> Self {
        self.assemblies.insert(name);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> Option<&Type> {
        self.target_type.as_ref()
    }

    pub fn imported_namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    pub fn referenced_assemblies(&self) -> &AssemblySet {
        &self.assemblies
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    pub(crate) fn untargeted(&self) -> Self {
        Self {
            target_type: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for CompileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileRequest")
            .field("source", &self.source)
            .field("target_type", &self.target_type)
            .field("namespaces", &self.namespaces)
            .field("assemblies", &self.assemblies)
            .finish_non_exhaustive()
    }
}

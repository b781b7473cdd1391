use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::assembly::Assembly;
use crate::syntax::Language;
use crate::types::{Primitive, Type, TypeDef, TypeDefKind};

/// Type definitions of a backend's loaded assemblies, indexed by full name.
///
/// Keys are folded to lower case for case-insensitive languages.
#[derive(Debug)]
pub(crate) struct TypeRegistry {
    language: Language,
    types: HashMap<String, Vec<Arc<TypeDef>>>,
    namespaces: HashSet<String>,
    primitives: HashMap<Primitive, Vec<Arc<TypeDef>>>,
}

impl TypeRegistry {
    pub(crate) fn new(language: Language, assemblies: &[Arc<Assembly>]) -> Self {
        let mut registry = Self {
            language,
            types: HashMap::new(),
            namespaces: HashSet::new(),
            primitives: HashMap::new(),
        };
        for assembly in assemblies {
            for ns in assembly.namespaces() {
                let key = registry.fold(&ns);
                registry.namespaces.insert(key);
            }
            for def in &assembly.types {
                let key = registry.fold(&def.full_name());
                registry.types.entry(key).or_default().push(def.clone());
                if let TypeDefKind::Primitive(p) = def.kind {
                    registry.primitives.entry(p).or_default().push(def.clone());
                }
            }
        }
        registry
    }

    fn fold(&self, name: &str) -> String {
        if self.language.is_case_sensitive() {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// Definitions declared under `full_name`.
    pub(crate) fn find(&self, full_name: &str) -> &[Arc<TypeDef>] {
        self.types
            .get(&self.fold(full_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(&self.fold(name))
    }

    /// Definitions declaring the members of `ty`.
    pub(crate) fn members_of(&self, ty: &Type) -> Vec<Arc<TypeDef>> {
        match ty {
            Type::Named { def, .. } => vec![def.clone()],
            other => other
                .primitive()
                .and_then(|p| self.primitives.get(&p))
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(language: Language) -> TypeRegistry {
        let assembly = Assembly::builder("geometry")
            .with_type(TypeDef::structure("Geometry.Shapes", "Point").field("X", Type::Int))
            .build()
            .unwrap();
        TypeRegistry::new(language, &[assembly])
    }

    #[test]
    fn test_lookup_respects_case_sensitivity() {
        assert_eq!(registry(Language::CStyle).find("Geometry.Shapes.Point").len(), 1);
        assert!(registry(Language::CStyle).find("geometry.shapes.point").is_empty());
        assert_eq!(registry(Language::Basic).find("geometry.shapes.POINT").len(), 1);
    }

    #[test]
    fn test_parent_namespaces_are_known() {
        let registry = registry(Language::CStyle);
        assert!(registry.is_namespace("Geometry"));
        assert!(registry.is_namespace("Geometry.Shapes"));
        assert!(!registry.is_namespace("Shapes"));
    }
}

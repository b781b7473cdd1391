//! Configuration for [`ExpressionCompiler`](super::ExpressionCompiler).

use crate::assembly::{AssemblySet, NamespaceSet, STD, STD_COLLECTIONS};

pub use crate::eval::{EvalOptions, EvalOptionsOverride};

/// Default number of raw trees kept by the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default number of idle backends kept by the pool.
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// Options fixed when the compiler is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Maximum cached raw trees; zero disables the cache.
    pub cache_capacity: usize,
    /// Maximum pooled backends; zero constructs a backend per compile.
    pub pool_capacity: usize,
    /// Imported into every compile, in addition to the request's own.
    pub namespaces: NamespaceSet,
    /// Referenced by every compile, in addition to the request's own.
    pub assemblies: AssemblySet,
    /// Try rebinding cached trees before compiling.
    pub fast_path: bool,
    /// Evaluation options of compiled callables.
    pub eval: EvalOptions,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            namespaces: ["Std"].into_iter().collect(),
            assemblies: [STD, STD_COLLECTIONS].into_iter().collect(),
            fast_path: true,
            eval: EvalOptions::default(),
        }
    }
}

impl CompilerOptions {
    /// Applies the fields set in `overrides`.
    pub fn override_with(&mut self, overrides: &CompilerOptionsOverride) {
        if let Some(cache_capacity) = overrides.cache_capacity {
            self.cache_capacity = cache_capacity;
        }
        if let Some(pool_capacity) = overrides.pool_capacity {
            self.pool_capacity = pool_capacity;
        }
        if let Some(fast_path) = overrides.fast_path {
            self.fast_path = fast_path;
        }
        if let Some(eval) = &overrides.eval {
            self.eval.override_with(eval);
        }
    }
}

/// Partial [`CompilerOptions`]; `None` keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptionsOverride {
    pub cache_capacity: Option<usize>,
    pub pool_capacity: Option<usize>,
    pub fast_path: Option<bool>,
    pub eval: Option<EvalOptionsOverride>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_keeps_unset_fields() {
        let mut options = CompilerOptions::default();
        options.override_with(&CompilerOptionsOverride {
            pool_capacity: Some(2),
            eval: Some(EvalOptionsOverride {
                max_depth: Some(50),
            }),
            ..Default::default()
        });
        assert_eq!(options.pool_capacity, 2);
        assert_eq!(options.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(options.eval.max_depth, 50);
        assert!(options.fast_path);
        assert!(options.assemblies.contains(STD));
    }
}

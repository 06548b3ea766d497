//! Lexically scoped registry of common table expressions.

use std::sync::Arc;

use crate::parser::ast::CommonTableExpr;

/// Name -> CTE mapping visible at one point of a statement.
///
/// The registry is a persistent list: defining a CTE returns a new registry and
/// leaves the old one untouched, so a nested scope can extend what it inherited
/// without affecting its parent. Lookups walk from the innermost definition
/// outwards, which makes inner definitions shadow outer ones.
#[derive(Debug, Clone, Default)]
pub struct CteRegistry {
    head: Option<Arc<CteNode>>,
}

#[derive(Debug)]
struct CteNode {
    name: String,
    cte: Arc<CommonTableExpr>,
    /// Registry in force where this CTE was defined.
    parent: CteRegistry,
}

impl CteRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registry with `cte` defined on top of this one.
    #[must_use]
    pub fn define(&self, cte: CommonTableExpr) -> Self {
        CteRegistry {
            head: Some(Arc::new(CteNode {
                name: cte.name.clone(),
                cte: Arc::new(cte),
                parent: self.clone(),
            })),
        }
    }

    /// Finds the innermost CTE named `name`.
    ///
    /// Also returns the registry that was visible where the CTE was defined;
    /// the CTE body must be bound against that registry, so it sees earlier
    /// definitions but never itself.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<(Arc<CommonTableExpr>, CteRegistry)> {
        let mut current = self.head.as_ref();
        while let Some(node) = current {
            if node.name == name {
                return Some((Arc::clone(&node.cte), node.parent.clone()));
            }
            current = node.parent.head.as_ref();
        }
        None
    }

    /// Returns true if no CTE is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the visible CTE names, innermost first. Shadowed names appear
    /// once per definition.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = self.head.as_ref();
        while let Some(node) = current {
            names.push(node.name.as_str());
            current = node.parent.head.as_ref();
        }
        names
    }
}

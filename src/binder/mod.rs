//! Binder module for semantic analysis.
//!
//! The binder turns parsed statements into bound ones, resolving:
//! - Table references against CTEs, views and base tables
//! - Column references against the sources visible in each scope
//! - Parameter placeholders and expression types
//!
//! The output is a bound statement ready for planning.

mod bind_context;
mod cte;
mod expression;
mod semantic;
mod table_ref;

pub use bind_context::{BindContext, Binding, ColumnBinding};
pub use cte::CteRegistry;
pub use expression::{BoundExpression, ParameterSlot};
pub use semantic::{BindError, Binder, BoundSelect, BoundStatement};
pub use table_ref::{BoundBaseTableRef, BoundSubqueryRef, BoundTableRef};

use crate::catalog::DEFAULT_SCHEMA;

/// Default maximum nesting of subquery, view and CTE binding.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Binder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    /// Schema used for table references without an explicit schema.
    pub default_schema: String,
    /// Maximum nesting of subquery, view and CTE binding.
    pub max_depth: usize,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_SCHEMA.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BinderConfig {
    /// Creates a new binder configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default schema.
    #[must_use]
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Sets the maximum binding depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

//! Logical plan definitions.

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};

use crate::binder::BoundExpression;
use crate::catalog::TableCatalogEntry;
use crate::types::DataType;

/// Logical query plan (what to compute).
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    // === Scan Operators ===
    /// Read a base table.
    Get {
        table: Arc<TableCatalogEntry>,
        table_index: usize,
        alias: String,
    },

    /// Produce a single row with no columns (SELECT without FROM).
    DummyScan,

    // === Relational Operators ===
    /// Expose a nested plan's output under a scope index and column names.
    Subquery {
        input: Box<LogicalPlan>,
        table_index: usize,
        alias: String,
        names: Vec<String>,
    },

    /// Cartesian product.
    CrossProduct {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },

    /// Filter rows.
    Filter {
        input: Box<LogicalPlan>,
        predicate: BoundExpression,
    },

    /// Project columns/expressions.
    Projection {
        input: Box<LogicalPlan>,
        /// (`output_name`, expression).
        expressions: Vec<(String, BoundExpression)>,
    },

    // === Statement Operators ===
    /// Run a prepared plan whose parameters have been assigned.
    Execute {
        name: String,
        /// The prepared statement's plan itself, not a copy.
        plan: Arc<LogicalPlan>,
    },
}

impl LogicalPlan {
    /// Creates a filter plan.
    #[must_use]
    pub fn filter(input: LogicalPlan, predicate: BoundExpression) -> Self {
        LogicalPlan::Filter {
            input: Box::new(input),
            predicate,
        }
    }

    /// Creates a projection plan.
    #[must_use]
    pub fn projection(input: LogicalPlan, expressions: Vec<(String, BoundExpression)>) -> Self {
        LogicalPlan::Projection {
            input: Box::new(input),
            expressions,
        }
    }

    /// Creates a cross product plan.
    #[must_use]
    pub fn cross_product(left: LogicalPlan, right: LogicalPlan) -> Self {
        LogicalPlan::CrossProduct {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Returns the output schema of this plan as (name, type) pairs.
    #[must_use]
    pub fn output_schema(&self) -> Vec<(String, DataType)> {
        match self {
            LogicalPlan::Get { table, .. } => table
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type))
                .collect(),
            LogicalPlan::DummyScan => Vec::new(),
            LogicalPlan::Subquery { input, names, .. } => names
                .iter()
                .cloned()
                .zip(input.output_schema().into_iter().map(|(_, ty)| ty))
                .collect(),
            LogicalPlan::CrossProduct { left, right } => {
                let mut schema = left.output_schema();
                schema.extend(right.output_schema());
                schema
            }
            LogicalPlan::Filter { input, .. } => input.output_schema(),
            LogicalPlan::Projection { expressions, .. } => expressions
                .iter()
                .map(|(name, expr)| (name.clone(), expr.data_type()))
                .collect(),
            LogicalPlan::Execute { plan, .. } => plan.output_schema(),
        }
    }

    /// Returns the output column names.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.output_schema().into_iter().map(|(name, _)| name).collect()
    }

    /// Returns the output column types.
    #[must_use]
    pub fn output_types(&self) -> Vec<DataType> {
        self.output_schema().into_iter().map(|(_, ty)| ty).collect()
    }

    /// Returns the output schema as an Arrow schema.
    #[must_use]
    pub fn arrow_schema(&self) -> Schema {
        Schema::new(
            self.output_schema()
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty.to_arrow(), true))
                .collect::<Vec<_>>(),
        )
    }

    /// Returns the child plans.
    #[must_use]
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Get { .. } | LogicalPlan::DummyScan => vec![],
            LogicalPlan::Subquery { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Projection { input, .. } => vec![input.as_ref()],
            LogicalPlan::CrossProduct { left, right } => vec![left.as_ref(), right.as_ref()],
            LogicalPlan::Execute { plan, .. } => vec![plan.as_ref()],
        }
    }

    /// Returns the plan as an indented tree, one operator per line.
    #[must_use]
    pub fn explain(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_plan(f, 0)
    }
}

impl LogicalPlan {
    /// Formats the plan as a tree with indentation.
    fn format_plan(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        match self {
            LogicalPlan::Get {
                table,
                table_index,
                alias,
            } => {
                writeln!(f, "{prefix}Get: {}.{} as {alias} (#{table_index})", table.schema, table.name)?;
            }
            LogicalPlan::DummyScan => writeln!(f, "{prefix}DummyScan")?,
            LogicalPlan::Subquery {
                input,
                table_index,
                alias,
                names,
            } => {
                writeln!(f, "{prefix}Subquery: {alias} (#{table_index}) [{}]", names.join(", "))?;
                input.format_plan(f, indent + 1)?;
            }
            LogicalPlan::CrossProduct { left, right } => {
                writeln!(f, "{prefix}CrossProduct")?;
                left.format_plan(f, indent + 1)?;
                right.format_plan(f, indent + 1)?;
            }
            LogicalPlan::Filter { predicate, input } => {
                writeln!(f, "{prefix}Filter: {predicate}")?;
                input.format_plan(f, indent + 1)?;
            }
            LogicalPlan::Projection { expressions, input } => {
                let exprs: Vec<_> = expressions
                    .iter()
                    .map(|(name, expr)| format!("{expr} AS {name}"))
                    .collect();
                writeln!(f, "{prefix}Projection: [{}]", exprs.join(", "))?;
                input.format_plan(f, indent + 1)?;
            }
            LogicalPlan::Execute { name, plan } => {
                writeln!(f, "{prefix}Execute: {name}")?;
                plan.format_plan(f, indent + 1)?;
            }
        }
        Ok(())
    }
}

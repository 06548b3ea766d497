//! Query planner module.
//!
//! The planner turns bound SELECTs into logical plans, stores them as
//! prepared statements, and binds EXECUTE arguments against those.

mod execute;
pub mod logical_plan;
mod prepared;

pub use execute::{bind_execute, try_bind_execute};
pub use logical_plan::LogicalPlan;
pub use prepared::{ExecutePlan, PreparedStatement};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::binder::{BoundSelect, BoundTableRef, ParameterSlot};
use crate::error::{Result, RuduError};

/// Query planner.
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub fn new() -> Self {
        Planner
    }

    /// Generates a logical plan from a bound SELECT.
    ///
    /// # Errors
    ///
    /// Returns an error if the SELECT projects no columns.
    pub fn plan_select(&self, select: BoundSelect) -> Result<LogicalPlan> {
        if select.select_list.is_empty() {
            return Err(RuduError::PlanError("SELECT list is empty".into()));
        }

        let mut plan = match select.from {
            Some(from) => self.plan_table_ref(from)?,
            None => LogicalPlan::DummyScan,
        };

        if let Some(predicate) = select.where_clause {
            plan = LogicalPlan::filter(plan, predicate);
        }

        let expressions = select.names.into_iter().zip(select.select_list).collect();
        Ok(LogicalPlan::projection(plan, expressions))
    }

    fn plan_table_ref(&self, table_ref: BoundTableRef) -> Result<LogicalPlan> {
        match table_ref {
            BoundTableRef::BaseTable(base) => Ok(LogicalPlan::Get {
                table: base.table,
                table_index: base.table_index,
                alias: base.alias,
            }),
            BoundTableRef::Subquery(sub) => Ok(LogicalPlan::Subquery {
                input: Box::new(self.plan_select(*sub.subquery)?),
                table_index: sub.table_index,
                alias: sub.alias,
                names: sub.column_names,
            }),
            BoundTableRef::CrossProduct { left, right } => Ok(LogicalPlan::cross_product(
                self.plan_table_ref(*left)?,
                self.plan_table_ref(*right)?,
            )),
        }
    }

    /// Plans a bound PREPARE body into a prepared statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be planned.
    pub fn plan_prepare(
        &self,
        name: &str,
        select: BoundSelect,
        parameters: BTreeMap<usize, Arc<ParameterSlot>>,
    ) -> Result<PreparedStatement> {
        let plan = self.plan_select(select)?;
        Ok(PreparedStatement::new(name, plan, parameters))
    }
}

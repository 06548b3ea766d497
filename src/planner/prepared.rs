//! Prepared statements and the execution plans bound from them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::binder::ParameterSlot;
use crate::error::Result;
use crate::types::{DataType, Value};

use super::execute;
use super::LogicalPlan;

/// A planned statement with placeholder parameters, reusable across EXECUTEs.
#[derive(Debug)]
pub struct PreparedStatement {
    name: String,
    plan: Arc<LogicalPlan>,
    /// Index -> placeholder, for the indices the body uses.
    parameters: BTreeMap<usize, Arc<ParameterSlot>>,
    /// Held by an [`ExecutePlan`] from argument binding until it is dropped.
    exec_lock: Mutex<()>,
}

impl PreparedStatement {
    /// Creates a prepared statement from a plan and the placeholders its body
    /// declares.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        plan: LogicalPlan,
        declared: BTreeMap<usize, Arc<ParameterSlot>>,
    ) -> Self {
        PreparedStatement {
            name: name.into(),
            plan: Arc::new(plan),
            parameters: declared,
            exec_lock: Mutex::new(()),
        }
    }

    /// Returns the statement name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the prepared plan.
    #[must_use]
    pub fn plan(&self) -> &Arc<LogicalPlan> {
        &self.plan
    }

    /// Returns the placeholder at `index`, if the body uses that index.
    #[must_use]
    pub fn parameter(&self, index: usize) -> Option<&Arc<ParameterSlot>> {
        self.parameters.get(&index)
    }

    /// Returns the highest parameter index, or 0 without parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.keys().next_back().copied().unwrap_or(0)
    }

    /// Returns `(index, type)` for each placeholder the body uses, in index
    /// order.
    #[must_use]
    pub fn parameter_types(&self) -> Vec<(usize, DataType)> {
        self.parameters
            .iter()
            .map(|(&index, slot)| (index, slot.data_type()))
            .collect()
    }

    /// Assigns `values` to the placeholders and returns the plan to run.
    ///
    /// # Errors
    ///
    /// See [`execute::bind_execute`].
    pub fn bind_execute(&self, values: &[Value]) -> Result<ExecutePlan<'_>> {
        execute::bind_execute(self, values)
    }

    /// Like [`PreparedStatement::bind_execute`], but fails instead of waiting
    /// when another [`ExecutePlan`] of this statement is alive.
    ///
    /// # Errors
    ///
    /// See [`execute::try_bind_execute`].
    pub fn try_bind_execute(&self, values: &[Value]) -> Result<ExecutePlan<'_>> {
        execute::try_bind_execute(self, values)
    }

    pub(super) fn lock_execution(&self) -> MutexGuard<'_, ()> {
        self.exec_lock.lock()
    }

    pub(super) fn try_lock_execution(&self) -> Option<MutexGuard<'_, ()>> {
        self.exec_lock.try_lock()
    }
}

/// A prepared plan with its parameters assigned.
///
/// Holds the prepared statement's execution lock: other executions of the same
/// statement wait until this plan is dropped, so the parameter values it was
/// bound with stay in place while it runs.
pub struct ExecutePlan<'a> {
    _guard: MutexGuard<'a, ()>,
    plan: LogicalPlan,
}

impl<'a> ExecutePlan<'a> {
    pub(super) fn new(guard: MutexGuard<'a, ()>, plan: LogicalPlan) -> Self {
        ExecutePlan {
            _guard: guard,
            plan,
        }
    }

    /// Returns the `Execute` plan node.
    #[must_use]
    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Returns the prepared plan the `Execute` node refers to.
    #[must_use]
    pub fn prepared_plan(&self) -> Option<&Arc<LogicalPlan>> {
        match &self.plan {
            LogicalPlan::Execute { plan, .. } => Some(plan),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ExecutePlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutePlan").field("plan", &self.plan).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_parameters_are_not_materialized() {
        let index = 4_000_000_000;
        let mut declared = BTreeMap::new();
        declared.insert(index, Arc::new(ParameterSlot::new(index, DataType::Int64)));
        let stmt = PreparedStatement::new("q", LogicalPlan::DummyScan, declared);

        assert_eq!(stmt.parameter_count(), index);
        assert_eq!(stmt.parameter_types(), vec![(index, DataType::Int64)]);
        assert!(stmt.parameter(index).is_some());
        assert!(stmt.parameter(1).is_none());
        assert!(stmt.parameter(index - 1).is_none());
    }

    #[test]
    fn test_no_parameters() {
        let stmt = PreparedStatement::new("q", LogicalPlan::DummyScan, BTreeMap::new());
        assert_eq!(stmt.parameter_count(), 0);
        assert!(stmt.parameter_types().is_empty());
    }

    #[test]
    fn test_try_lock_fails_while_plan_is_alive() {
        let stmt = PreparedStatement::new("q", LogicalPlan::DummyScan, BTreeMap::new());
        let plan = stmt.bind_execute(&[]).unwrap();
        assert!(stmt.try_lock_execution().is_none());
        drop(plan);
        assert!(stmt.try_lock_execution().is_some());
    }
}

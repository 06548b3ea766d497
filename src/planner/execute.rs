//! EXECUTE argument binding.

use std::sync::Arc;

use parking_lot::MutexGuard;
use tracing::trace;

use crate::error::{Result, RuduError};
use crate::types::Value;

use super::prepared::{ExecutePlan, PreparedStatement};
use super::LogicalPlan;

/// Assigns `values` to the placeholders of `prepared`, casting where the value
/// type differs from the parameter type, and returns an `Execute` plan over the
/// prepared plan.
///
/// The value at position `i` goes to parameter `$i+1`. Fewer values than
/// parameters is allowed; the remaining placeholders keep their previous
/// values. Assignment is not atomic: on error, placeholders before the failing
/// position keep the values just assigned.
///
/// Blocks while another [`ExecutePlan`] of the same statement is alive.
///
/// # Errors
///
/// Returns [`RuduError::ParameterNotFound`] if a position has no placeholder,
/// or [`RuduError::ParameterCast`] if a value cannot be cast to its
/// parameter's type.
pub fn bind_execute<'a>(prepared: &'a PreparedStatement, values: &[Value]) -> Result<ExecutePlan<'a>> {
    let guard = prepared.lock_execution();
    assign(prepared, guard, values)
}

/// Like [`bind_execute`], but fails immediately when another [`ExecutePlan`]
/// of the same statement is alive instead of waiting for it to be dropped.
///
/// # Errors
///
/// Returns [`RuduError::BindError`] if the statement is already executing,
/// otherwise the errors of [`bind_execute`].
pub fn try_bind_execute<'a>(
    prepared: &'a PreparedStatement,
    values: &[Value],
) -> Result<ExecutePlan<'a>> {
    let guard = prepared.try_lock_execution().ok_or_else(|| {
        RuduError::BindError(format!(
            "Prepared statement \"{}\" is already executing",
            prepared.name()
        ))
    })?;
    assign(prepared, guard, values)
}

fn assign<'a>(
    prepared: &'a PreparedStatement,
    guard: MutexGuard<'a, ()>,
    values: &[Value],
) -> Result<ExecutePlan<'a>> {
    for (position, value) in values.iter().enumerate() {
        let index = position + 1;
        let slot = prepared
            .parameter(index)
            .ok_or(RuduError::ParameterNotFound { index })?;

        let value = if value.is_null() || value.data_type() == Some(slot.data_type()) {
            value.clone()
        } else {
            trace!(index, from = ?value.data_type(), to = %slot.data_type(), "casting parameter");
            value
                .cast_to(slot.data_type())
                .map_err(|e| RuduError::ParameterCast {
                    index,
                    message: e.to_string(),
                })?
        };
        trace!(index, value = %value, "assigning parameter");
        slot.set_value(value);
    }

    Ok(ExecutePlan::new(
        guard,
        LogicalPlan::Execute {
            name: prepared.name().to_string(),
            plan: Arc::clone(prepared.plan()),
        },
    ))
}

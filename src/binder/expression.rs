//! Bound expression definitions.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::parser::ast::{ComparisonOp, LogicalOp};
use crate::types::{DataType, Value};

/// Bound expression after semantic analysis.
#[derive(Debug, Clone)]
pub enum BoundExpression {
    /// Literal value (constant).
    Literal { value: Value, data_type: DataType },

    /// Reference to a column of a source registered in the bind context.
    ColumnRef {
        table_index: usize,
        column_index: usize,
        name: String,
        data_type: DataType,
    },

    /// Placeholder whose value is supplied at EXECUTE time.
    Parameter(Arc<ParameterSlot>),

    /// Explicit conversion.
    Cast {
        expr: Box<BoundExpression>,
        data_type: DataType,
    },

    /// Binary comparison.
    Comparison {
        left: Box<BoundExpression>,
        op: ComparisonOp,
        right: Box<BoundExpression>,
    },

    /// Logical AND/OR/NOT.
    Logical {
        op: LogicalOp,
        operands: Vec<BoundExpression>,
    },
}

impl BoundExpression {
    /// Returns the data type of this expression.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            BoundExpression::Literal { data_type, .. }
            | BoundExpression::ColumnRef { data_type, .. }
            | BoundExpression::Cast { data_type, .. } => *data_type,
            BoundExpression::Parameter(slot) => slot.data_type(),
            BoundExpression::Comparison { .. } | BoundExpression::Logical { .. } => DataType::Bool,
        }
    }

    /// Creates a literal expression. NULL literals are typed STRING.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type().unwrap_or(DataType::String);
        BoundExpression::Literal { value, data_type }
    }

    /// Returns true for a NULL literal.
    #[must_use]
    pub fn is_null_literal(&self) -> bool {
        matches!(self, BoundExpression::Literal { value: Value::Null, .. })
    }

    /// Creates a comparison expression.
    #[must_use]
    pub fn comparison(left: BoundExpression, op: ComparisonOp, right: BoundExpression) -> Self {
        BoundExpression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }
}

impl fmt::Display for BoundExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpression::Literal {
                value: Value::String(s),
                ..
            } => write!(f, "'{s}'"),
            BoundExpression::Literal { value, .. } => write!(f, "{value}"),
            BoundExpression::ColumnRef {
                table_index,
                column_index,
                name,
                ..
            } => write!(f, "{name}#{table_index}.{column_index}"),
            BoundExpression::Parameter(slot) => write!(f, "${}", slot.index()),
            BoundExpression::Cast { expr, data_type } => write!(f, "CAST({expr} AS {data_type})"),
            BoundExpression::Comparison { left, op, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            BoundExpression::Logical {
                op: LogicalOp::Not,
                operands,
            } => match operands.first() {
                Some(operand) => write!(f, "(NOT {operand})"),
                None => f.write_str("NOT"),
            },
            BoundExpression::Logical { op, operands } => {
                let sep = format!(" {} ", op.as_str());
                let parts: Vec<String> = operands.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(&sep))
            }
        }
    }
}

/// Storage behind a parameter placeholder.
///
/// The same slot is referenced from the bound plan and from the prepared
/// statement's parameter map; EXECUTE writes through the map and the plan
/// observes the new value.
#[derive(Debug)]
pub struct ParameterSlot {
    index: usize,
    data_type: DataType,
    value: RwLock<Value>,
}

impl ParameterSlot {
    /// Creates a slot holding NULL.
    #[must_use]
    pub fn new(index: usize, data_type: DataType) -> Self {
        ParameterSlot {
            index,
            data_type,
            value: RwLock::new(Value::Null),
        }
    }

    /// 1-based parameter index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Declared type of the parameter.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns a copy of the current value.
    #[must_use]
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Replaces the current value.
    pub fn set_value(&self, value: Value) {
        *self.value.write() = value;
    }
}

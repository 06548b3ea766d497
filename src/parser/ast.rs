//! Abstract Syntax Tree definitions for SQL statements.
//!
//! AST nodes are plain owned values: cloning a node deep-copies the whole
//! subtree, which is what CTE and view expansion rely on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT query, possibly with a WITH clause.
    Select(Box<SelectStatement>),
    /// CREATE TABLE statement.
    CreateTable {
        schema: Option<String>,
        table_name: String,
        columns: Vec<(String, DataType)>,
    },
    /// CREATE VIEW statement.
    CreateView {
        schema: Option<String>,
        view_name: String,
        aliases: Vec<String>,
        query: Box<SelectStatement>,
    },
    /// CREATE INDEX statement.
    CreateIndex {
        index_name: String,
        schema: Option<String>,
        table_name: String,
        columns: Vec<String>,
    },
    /// DROP TABLE / VIEW / INDEX statement.
    Drop {
        kind: DropKind,
        schema: Option<String>,
        name: String,
        if_exists: bool,
    },
    /// PREPARE name AS query.
    Prepare {
        name: String,
        statement: Box<SelectStatement>,
    },
    /// EXECUTE name(arg, ...).
    Execute {
        name: String,
        arguments: Vec<Expression>,
    },
    /// DEALLOCATE [PREPARE] name.
    Deallocate { name: String },
}

/// Object kind targeted by a DROP statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropKind {
    Table,
    View,
    Index,
}

impl DropKind {
    /// Returns the SQL keyword for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DropKind::Table => "TABLE",
            DropKind::View => "VIEW",
            DropKind::Index => "INDEX",
        }
    }
}

/// A SELECT query with its WITH clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Common table expressions, in definition order.
    pub ctes: Vec<CommonTableExpr>,
    /// Projection list.
    pub select_list: Vec<SelectItem>,
    /// FROM clause (None for `SELECT 1`).
    pub from: Option<TableRef>,
    /// WHERE clause.
    pub where_clause: Option<Expression>,
}

impl SelectStatement {
    /// Creates a SELECT with the given projections and no FROM clause.
    #[must_use]
    pub fn new(select_list: Vec<SelectItem>) -> Self {
        SelectStatement {
            ctes: Vec::new(),
            select_list,
            from: None,
            where_clause: None,
        }
    }

    /// Sets the FROM clause.
    #[must_use]
    pub fn with_from(mut self, from: TableRef) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn with_where(mut self, predicate: Expression) -> Self {
        self.where_clause = Some(predicate);
        self
    }

    /// Appends a common table expression.
    #[must_use]
    pub fn with_cte(mut self, cte: CommonTableExpr) -> Self {
        self.ctes.push(cte);
        self
    }
}

/// A named query usable as a table within its statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTableExpr {
    pub name: String,
    /// Optional column renames (`WITH t(a, b) AS ...`).
    pub column_aliases: Vec<String>,
    pub query: Box<SelectStatement>,
}

impl CommonTableExpr {
    #[must_use]
    pub fn new(name: impl Into<String>, query: SelectStatement) -> Self {
        CommonTableExpr {
            name: name.into(),
            column_aliases: Vec::new(),
            query: Box::new(query),
        }
    }
}

/// One entry of the projection list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `alias.*`
    QualifiedWildcard(String),
    /// `expr [AS alias]`
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Creates an unaliased projection.
    #[must_use]
    pub fn expr(expr: Expression) -> Self {
        SelectItem::Expression { expr, alias: None }
    }

    /// Creates an aliased projection.
    #[must_use]
    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        SelectItem::Expression {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A table reference in a FROM clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableRef {
    /// Named table, view or CTE.
    Base(BaseTableRef),
    /// Parenthesised subquery.
    Subquery(SubqueryRef),
    /// Comma-separated FROM list entries.
    CrossProduct {
        left: Box<TableRef>,
        right: Box<TableRef>,
    },
}

impl TableRef {
    /// Creates an unaliased reference to `name` in the default schema.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        TableRef::Base(BaseTableRef {
            schema: None,
            name: name.into(),
            alias: None,
        })
    }

    /// Creates an aliased reference to `name` in the default schema.
    #[must_use]
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Base(BaseTableRef {
            schema: None,
            name: name.into(),
            alias: Some(alias.into()),
        })
    }
}

/// `[schema.]name [AS alias]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

/// `(query) [AS alias [(col, ...)]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryRef {
    pub query: Box<SelectStatement>,
    pub alias: Option<String>,
    /// Positional output column renames; may be shorter than the output.
    pub column_aliases: Vec<String>,
}

/// Scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Column reference, optionally qualified by a table alias.
    ColumnRef {
        table: Option<String>,
        column: String,
    },
    /// Literal value.
    Literal(Literal),
    /// Positional parameter (`$n`, or `?` numbered by appearance).
    Parameter(usize),
    /// CAST(expr AS type).
    Cast {
        expr: Box<Expression>,
        data_type: DataType,
    },
    /// Binary comparison.
    Comparison {
        left: Box<Expression>,
        op: ComparisonOp,
        right: Box<Expression>,
    },
    /// AND / OR over operands, or NOT over a single operand.
    Logical {
        op: LogicalOp,
        operands: Vec<Expression>,
    },
}

impl Expression {
    /// Creates an unqualified column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Expression::ColumnRef {
            table: None,
            column: name.into(),
        }
    }

    /// Creates a qualified column reference.
    #[must_use]
    pub fn qualified_column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::ColumnRef {
            table: Some(table.into()),
            column: name.into(),
        }
    }

    /// Creates a comparison.
    #[must_use]
    pub fn compare(left: Expression, op: ComparisonOp, right: Expression) -> Self {
        Expression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Returns the name a projection of this expression gets when unaliased.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Expression::ColumnRef { column, .. } => column.clone(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::ColumnRef {
                table: Some(table),
                column,
            } => write!(f, "{table}.{column}"),
            Expression::ColumnRef { table: None, column } => f.write_str(column),
            Expression::Literal(lit) => write!(f, "{lit}"),
            Expression::Parameter(index) => write!(f, "${index}"),
            Expression::Cast { expr, data_type } => write!(f, "CAST({expr} AS {data_type})"),
            Expression::Comparison { left, op, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            Expression::Logical {
                op: LogicalOp::Not,
                operands,
            } => match operands.first() {
                Some(operand) => write!(f, "(NOT {operand})"),
                None => f.write_str("NOT"),
            },
            Expression::Logical { op, operands } => {
                let sep = format!(" {} ", op.as_str());
                let parts: Vec<String> = operands.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(&sep))
            }
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Equal (=).
    Eq,
    /// Not equal (<>).
    Neq,
    /// Less than (<).
    Lt,
    /// Less than or equal (<=).
    Lte,
    /// Greater than (>).
    Gt,
    /// Greater than or equal (>=).
    Gte,
}

impl ComparisonOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    /// Parses an operator token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" => Some(ComparisonOp::Eq),
            "<>" | "!=" => Some(ComparisonOp::Neq),
            "<" => Some(ComparisonOp::Lt),
            "<=" => Some(ComparisonOp::Lte),
            ">" => Some(ComparisonOp::Gt),
            ">=" => Some(ComparisonOp::Gte),
            _ => None,
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    /// Returns the SQL keyword for this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Not => "NOT",
        }
    }
}

//! Pest parser integration for the SQL grammar.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::{Result, RuduError};
use crate::parser::ast::{
    BaseTableRef, CommonTableExpr, ComparisonOp, DropKind, Expression, Literal, LogicalOp,
    SelectItem, SelectStatement, Statement, SubqueryRef, TableRef,
};
use crate::types::DataType;

#[derive(Parser)]
#[grammar = "parser/grammar.pest"]
struct SqlParser;

/// Parses a SQL string into a Statement AST.
///
/// # Errors
///
/// Returns a `ParseError` if the query is syntactically invalid.
pub fn parse_query(query: &str) -> Result<Statement> {
    let pairs = SqlParser::parse(Rule::sql_query, query).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c))
            | pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        RuduError::ParseError {
            line,
            col,
            message: e.variant.message().to_string(),
        }
    })?;

    let mut builder = AstBuilder::default();
    for pair in pairs {
        if pair.as_rule() == Rule::sql_query {
            for inner in pair.into_inner() {
                if inner.as_rule() == Rule::statement {
                    return builder.build_statement(inner);
                }
            }
        }
    }
    Err(parse_error("No statement found"))
}

fn parse_error(message: impl Into<String>) -> RuduError {
    RuduError::ParseError {
        line: 0,
        col: 0,
        message: message.into(),
    }
}

/// Normalizes an identifier: quoted identifiers keep their case, bare ones are
/// lowercased.
fn build_identifier(pair: &Pair<Rule>) -> String {
    let s = pair.as_str();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_lowercase()
    }
}

fn build_identifier_list(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| build_identifier(&p))
        .collect()
}

fn build_column_alias_list(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::identifier_list)
        .map(build_identifier_list)
        .unwrap_or_default()
}

/// Splits `[schema.]name` into its parts.
fn build_qualified_name(pair: Pair<Rule>) -> (Option<String>, String) {
    let mut parts: Vec<String> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| build_identifier(&p))
        .collect();
    let name = parts.pop().unwrap_or_default();
    (parts.pop(), name)
}

fn build_data_type(pair: &Pair<Rule>) -> Result<DataType> {
    DataType::from_sql_name(pair.as_str())
        .ok_or_else(|| parse_error(format!("Unknown data type '{}'", pair.as_str())))
}

/// Stateful AST construction; numbers `?` parameters in order of appearance.
#[derive(Default)]
struct AstBuilder {
    next_parameter: usize,
}

impl AstBuilder {
    fn build_statement(&mut self, pair: Pair<Rule>) -> Result<Statement> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::create_table => return self.build_create_table(inner),
                Rule::create_view => return self.build_create_view(inner),
                Rule::create_index => return Ok(Self::build_create_index(inner)),
                Rule::drop_stmt => return Self::build_drop(inner),
                Rule::prepare_stmt => return self.build_prepare(inner),
                Rule::execute_stmt => return self.build_execute(inner),
                Rule::deallocate_stmt => return Ok(Self::build_deallocate(inner)),
                Rule::select_stmt => {
                    return Ok(Statement::Select(Box::new(self.build_select(inner)?)))
                }
                _ => {}
            }
        }
        Err(parse_error("Unknown statement type"))
    }

    fn build_create_table(&mut self, pair: Pair<Rule>) -> Result<Statement> {
        let mut schema = None;
        let mut table_name = String::new();
        let mut columns = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::qualified_name => {
                    (schema, table_name) = build_qualified_name(inner);
                }
                Rule::column_def => {
                    let mut name = String::new();
                    let mut data_type = None;
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::identifier => name = build_identifier(&part),
                            Rule::data_type => data_type = Some(build_data_type(&part)?),
                            _ => {}
                        }
                    }
                    let data_type = data_type
                        .ok_or_else(|| parse_error(format!("Column '{name}' has no type")))?;
                    columns.push((name, data_type));
                }
                _ => {}
            }
        }

        Ok(Statement::CreateTable {
            schema,
            table_name,
            columns,
        })
    }

    fn build_create_view(&mut self, pair: Pair<Rule>) -> Result<Statement> {
        let mut schema = None;
        let mut view_name = String::new();
        let mut aliases = Vec::new();
        let mut query = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::qualified_name => (schema, view_name) = build_qualified_name(inner),
                Rule::column_alias_list => aliases = build_column_alias_list(inner),
                Rule::select_stmt => query = Some(self.build_select(inner)?),
                _ => {}
            }
        }

        let query = query.ok_or_else(|| parse_error("CREATE VIEW requires a query"))?;
        Ok(Statement::CreateView {
            schema,
            view_name,
            aliases,
            query: Box::new(query),
        })
    }

    fn build_create_index(pair: Pair<Rule>) -> Statement {
        let mut index_name = String::new();
        let mut schema = None;
        let mut table_name = String::new();
        let mut columns = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::identifier => index_name = build_identifier(&inner),
                Rule::qualified_name => (schema, table_name) = build_qualified_name(inner),
                Rule::identifier_list => columns = build_identifier_list(inner),
                _ => {}
            }
        }

        Statement::CreateIndex {
            index_name,
            schema,
            table_name,
            columns,
        }
    }

    fn build_drop(pair: Pair<Rule>) -> Result<Statement> {
        let mut kind = None;
        let mut if_exists = false;
        let mut schema = None;
        let mut name = String::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::drop_kind => {
                    kind = match inner.as_str().to_ascii_uppercase().as_str() {
                        "TABLE" => Some(DropKind::Table),
                        "VIEW" => Some(DropKind::View),
                        "INDEX" => Some(DropKind::Index),
                        _ => None,
                    };
                }
                Rule::if_exists => if_exists = true,
                Rule::qualified_name => (schema, name) = build_qualified_name(inner),
                _ => {}
            }
        }

        let kind = kind.ok_or_else(|| parse_error("DROP requires TABLE, VIEW or INDEX"))?;
        Ok(Statement::Drop {
            kind,
            schema,
            name,
            if_exists,
        })
    }

    fn build_prepare(&mut self, pair: Pair<Rule>) -> Result<Statement> {
        let mut name = String::new();
        let mut statement = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::identifier => name = build_identifier(&inner),
                Rule::select_stmt => statement = Some(self.build_select(inner)?),
                _ => {}
            }
        }

        let statement = statement.ok_or_else(|| parse_error("PREPARE requires a query"))?;
        Ok(Statement::Prepare {
            name,
            statement: Box::new(statement),
        })
    }

    fn build_execute(&mut self, pair: Pair<Rule>) -> Result<Statement> {
        let mut name = String::new();
        let mut arguments = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::identifier => name = build_identifier(&inner),
                Rule::expression => arguments.push(self.build_expression(inner)?),
                _ => {}
            }
        }

        Ok(Statement::Execute { name, arguments })
    }

    fn build_deallocate(pair: Pair<Rule>) -> Statement {
        let name = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::identifier)
            .map(|p| build_identifier(&p))
            .unwrap_or_default();
        Statement::Deallocate { name }
    }

    fn build_select(&mut self, pair: Pair<Rule>) -> Result<SelectStatement> {
        let mut select = SelectStatement::new(Vec::new());

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::with_clause => {
                    for cte in inner.into_inner() {
                        if cte.as_rule() == Rule::cte {
                            select.ctes.push(self.build_cte(cte)?);
                        }
                    }
                }
                Rule::select_list => {
                    for item in inner.into_inner() {
                        if item.as_rule() == Rule::select_item {
                            select.select_list.push(self.build_select_item(item)?);
                        }
                    }
                }
                Rule::from_clause => select.from = self.build_from(inner)?,
                Rule::where_clause => {
                    for expr in inner.into_inner() {
                        if expr.as_rule() == Rule::expression {
                            select.where_clause = Some(self.build_expression(expr)?);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(select)
    }

    fn build_cte(&mut self, pair: Pair<Rule>) -> Result<CommonTableExpr> {
        let mut name = String::new();
        let mut column_aliases = Vec::new();
        let mut query = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::identifier => name = build_identifier(&inner),
                Rule::column_alias_list => column_aliases = build_column_alias_list(inner),
                Rule::select_stmt => query = Some(self.build_select(inner)?),
                _ => {}
            }
        }

        let query = query.ok_or_else(|| parse_error(format!("CTE '{name}' has no query")))?;
        Ok(CommonTableExpr {
            name,
            column_aliases,
            query: Box::new(query),
        })
    }

    fn build_select_item(&mut self, pair: Pair<Rule>) -> Result<SelectItem> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::wildcard => return Ok(SelectItem::Wildcard),
                Rule::qualified_wildcard => {
                    let table = inner
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::identifier)
                        .map(|p| build_identifier(&p))
                        .unwrap_or_default();
                    return Ok(SelectItem::QualifiedWildcard(table));
                }
                Rule::aliased_expr => {
                    let mut expr = None;
                    let mut alias = None;
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::expression => expr = Some(self.build_expression(part)?),
                            Rule::identifier => alias = Some(build_identifier(&part)),
                            _ => {}
                        }
                    }
                    let expr = expr.ok_or_else(|| parse_error("Empty select item"))?;
                    return Ok(SelectItem::Expression { expr, alias });
                }
                _ => {}
            }
        }
        Err(parse_error("Invalid select item"))
    }

    fn build_from(&mut self, pair: Pair<Rule>) -> Result<Option<TableRef>> {
        let mut from: Option<TableRef> = None;
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::table_ref {
                let table_ref = self.build_table_ref(inner)?;
                from = Some(match from {
                    None => table_ref,
                    Some(left) => TableRef::CrossProduct {
                        left: Box::new(left),
                        right: Box::new(table_ref),
                    },
                });
            }
        }
        Ok(from)
    }

    fn build_table_ref(&mut self, pair: Pair<Rule>) -> Result<TableRef> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::base_table_ref => {
                    let mut schema = None;
                    let mut name = String::new();
                    let mut alias = None;
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::qualified_name => (schema, name) = build_qualified_name(part),
                            Rule::identifier => alias = Some(build_identifier(&part)),
                            _ => {}
                        }
                    }
                    return Ok(TableRef::Base(BaseTableRef {
                        schema,
                        name,
                        alias,
                    }));
                }
                Rule::subquery_ref => {
                    let mut query = None;
                    let mut alias = None;
                    let mut column_aliases = Vec::new();
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::select_stmt => query = Some(self.build_select(part)?),
                            Rule::subquery_alias => {
                                for alias_part in part.into_inner() {
                                    match alias_part.as_rule() {
                                        Rule::identifier => {
                                            alias = Some(build_identifier(&alias_part));
                                        }
                                        Rule::column_alias_list => {
                                            column_aliases = build_column_alias_list(alias_part);
                                        }
                                        _ => {}
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    let query = query.ok_or_else(|| parse_error("Empty subquery"))?;
                    return Ok(TableRef::Subquery(SubqueryRef {
                        query: Box::new(query),
                        alias,
                        column_aliases,
                    }));
                }
                _ => {}
            }
        }
        Err(parse_error("Invalid table reference"))
    }

    fn build_expression(&mut self, pair: Pair<Rule>) -> Result<Expression> {
        match pair.as_rule() {
            Rule::expression => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| parse_error("Empty expression"))?;
                self.build_expression(inner)
            }
            Rule::or_expr => self.build_logical(pair, Rule::and_expr, LogicalOp::Or),
            Rule::and_expr => self.build_logical(pair, Rule::not_expr, LogicalOp::And),
            Rule::not_expr => {
                let mut negated = false;
                let mut operand = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::kw_not => negated = true,
                        Rule::not_expr | Rule::comparison => {
                            operand = Some(self.build_expression(inner)?);
                        }
                        _ => {}
                    }
                }
                let operand = operand.ok_or_else(|| parse_error("NOT requires an operand"))?;
                if negated {
                    Ok(Expression::Logical {
                        op: LogicalOp::Not,
                        operands: vec![operand],
                    })
                } else {
                    Ok(operand)
                }
            }
            Rule::comparison => {
                let mut operands = Vec::new();
                let mut op = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::primary => operands.push(self.build_expression(inner)?),
                        Rule::comparison_op => op = ComparisonOp::from_token(inner.as_str()),
                        _ => {}
                    }
                }
                let right = operands.pop();
                match (operands.pop(), op, right) {
                    (Some(left), Some(op), Some(right)) => {
                        Ok(Expression::compare(left, op, right))
                    }
                    (None, None, Some(single)) => Ok(single),
                    _ => Err(parse_error("Malformed comparison")),
                }
            }
            Rule::primary => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| parse_error("Empty expression"))?;
                self.build_expression(inner)
            }
            Rule::cast_expr => {
                let mut expr = None;
                let mut data_type = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::expression => expr = Some(self.build_expression(inner)?),
                        Rule::data_type => data_type = Some(build_data_type(&inner)?),
                        _ => {}
                    }
                }
                match (expr, data_type) {
                    (Some(expr), Some(data_type)) => Ok(Expression::Cast {
                        expr: Box::new(expr),
                        data_type,
                    }),
                    _ => Err(parse_error("Malformed CAST")),
                }
            }
            Rule::column_ref => {
                let mut parts: Vec<String> = pair
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::identifier)
                    .map(|p| build_identifier(&p))
                    .collect();
                let column = parts.pop().unwrap_or_default();
                Ok(Expression::ColumnRef {
                    table: parts.pop(),
                    column,
                })
            }
            Rule::parameter => self.build_parameter(pair.as_str()),
            Rule::literal => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| parse_error("Empty literal"))?;
                Ok(Expression::Literal(build_literal(&inner)?))
            }
            rule => Err(parse_error(format!("Unexpected expression rule {rule:?}"))),
        }
    }

    fn build_logical(
        &mut self,
        pair: Pair<Rule>,
        operand_rule: Rule,
        op: LogicalOp,
    ) -> Result<Expression> {
        let mut operands = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == operand_rule {
                operands.push(self.build_expression(inner)?);
            }
        }
        if operands.len() == 1 {
            return operands.pop().ok_or_else(|| parse_error("Empty expression"));
        }
        Ok(Expression::Logical { op, operands })
    }

    fn build_parameter(&mut self, token: &str) -> Result<Expression> {
        let index = if token == "?" {
            self.next_parameter + 1
        } else {
            token[1..]
                .parse::<usize>()
                .map_err(|e| parse_error(format!("Invalid parameter '{token}': {e}")))?
        };
        if index == 0 {
            return Err(parse_error("Parameter indices start at $1"));
        }
        self.next_parameter = self.next_parameter.max(index);
        Ok(Expression::Parameter(index))
    }
}

fn build_literal(pair: &Pair<Rule>) -> Result<Literal> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::null_literal => Ok(Literal::Null),
        Rule::bool_literal => Ok(Literal::Bool(text.eq_ignore_ascii_case("true"))),
        Rule::integer_literal => text
            .parse::<i64>()
            .map(Literal::Integer)
            .map_err(|e| parse_error(format!("Invalid integer '{text}': {e}"))),
        Rule::float_literal => text
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|e| parse_error(format!("Invalid float '{text}': {e}"))),
        Rule::string_literal => Ok(Literal::String(
            text[1..text.len() - 1].replace("''", "'"),
        )),
        rule => Err(parse_error(format!("Unexpected literal rule {rule:?}"))),
    }
}

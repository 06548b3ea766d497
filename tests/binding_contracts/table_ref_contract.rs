//! Contract tests for table-reference binding.
//!
//! These tests verify:
//! - Each base reference gets a unique scope index and exactly one binding
//! - CTEs shadow catalog relations without touching the catalog
//! - View aliases rename only the leading output columns
//! - CTE and view bodies are copied per reference site

use std::cell::RefCell;
use std::collections::HashSet;

use proptest::prelude::*;
use rudu::binder::{Binder, BinderConfig, BoundStatement, BoundTableRef, CteRegistry};
use rudu::catalog::{
    Catalog, CatalogEntry, CatalogLookup, ColumnDef, IndexCatalogEntry, TableCatalogEntry,
    Transaction, ViewCatalogEntry, DEFAULT_SCHEMA,
};
use rudu::error::{Result, RuduError};
use rudu::parser::ast::{
    CommonTableExpr, Expression, Literal, SelectItem, SelectStatement, Statement, TableRef,
};
use rudu::parser::parse_query;
use rudu::types::DataType;

/// Catalog wrapper that records every lookup.
struct RecordingCatalog {
    inner: Catalog,
    lookups: RefCell<Vec<String>>,
}

impl RecordingCatalog {
    fn new(inner: Catalog) -> Self {
        RecordingCatalog {
            inner,
            lookups: RefCell::new(Vec::new()),
        }
    }
}

impl CatalogLookup for RecordingCatalog {
    fn get_table_or_view(
        &self,
        transaction: &Transaction,
        schema: &str,
        name: &str,
    ) -> Result<CatalogEntry> {
        self.lookups.borrow_mut().push(name.to_string());
        self.inner.get_table_or_view(transaction, schema, name)
    }
}

fn table(name: &str, columns: &[(&str, DataType)]) -> TableCatalogEntry {
    TableCatalogEntry::new(
        DEFAULT_SCHEMA.to_string(),
        name.to_string(),
        columns
            .iter()
            .map(|(c, ty)| ColumnDef::new((*c).to_string(), *ty).unwrap())
            .collect(),
    )
    .unwrap()
}

fn select_of(sql: &str) -> SelectStatement {
    match parse_query(sql).unwrap() {
        Statement::Select(select) => *select,
        other => panic!("expected SELECT, got {other:?}"),
    }
}

/// Creates a catalog with `t(a INT64)`, `s(col1 INT64, col2 STRING)` and view
/// `v(p) AS SELECT col1, col2 FROM s`.
fn create_test_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .create_table(table("t", &[("a", DataType::Int64)]), 1)
        .unwrap();
    catalog
        .create_table(
            table("s", &[("col1", DataType::Int64), ("col2", DataType::String)]),
            2,
        )
        .unwrap();
    catalog
        .create_view(
            ViewCatalogEntry::new(
                DEFAULT_SCHEMA.into(),
                "v".into(),
                select_of("SELECT col1, col2 FROM s"),
                vec!["p".into()],
            ),
            3,
        )
        .unwrap();
    catalog
}

fn latest(catalog: &Catalog) -> Transaction {
    Transaction::new(0, catalog.last_commit_ts())
}

/// Collects every scope index allocated within a bound reference, including
/// those inside nested subqueries.
fn collect_indices(table_ref: &BoundTableRef, out: &mut Vec<usize>) {
    match table_ref {
        BoundTableRef::BaseTable(base) => out.push(base.table_index),
        BoundTableRef::Subquery(sub) => {
            out.push(sub.table_index);
            if let Some(from) = &sub.subquery.from {
                collect_indices(from, out);
            }
        }
        BoundTableRef::CrossProduct { left, right } => {
            collect_indices(left, out);
            collect_indices(right, out);
        }
    }
}

#[test]
fn test_base_table_registers_one_binding() {
    // Contract: a base table reference adds exactly one binding keyed by alias
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let bound = binder.bind_table_ref(&TableRef::aliased("t", "x")).unwrap();
    let BoundTableRef::BaseTable(base) = bound else {
        panic!("expected base table");
    };
    assert_eq!(base.alias, "x");
    assert_eq!(base.table.name, "t");
    assert_eq!(binder.bind_context().len(), 1);
    let binding = binder.bind_context().get_binding("x").unwrap();
    assert_eq!(binding.table_index, base.table_index);
    assert_eq!(binding.column_names, vec!["a"]);
}

#[test]
fn test_unaliased_reference_uses_table_name() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    binder.bind_table_ref(&TableRef::table("t")).unwrap();
    assert!(binder.bind_context().get_binding("t").is_some());
}

#[test]
fn test_duplicate_alias_rejected() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    binder.bind_table_ref(&TableRef::table("t")).unwrap();
    let err = binder.bind_table_ref(&TableRef::table("t")).unwrap_err();
    assert!(err.to_string().contains("Duplicate alias"));
}

#[test]
fn test_cte_takes_precedence_over_table() {
    // Scenario: table t(a) exists and CTE t = SELECT 1 AS a; reference t AS x
    let catalog = RecordingCatalog::new(create_test_catalog());
    let txn = latest(&catalog.inner);
    let config = BinderConfig::default();
    let ctes = CteRegistry::new().define(CommonTableExpr::new(
        "t",
        SelectStatement::new(vec![SelectItem::aliased(
            Expression::Literal(Literal::Integer(1)),
            "a",
        )]),
    ));
    let mut binder = Binder::new(&catalog, &txn, &config).with_ctes(ctes);

    let bound = binder.bind_table_ref(&TableRef::aliased("t", "x")).unwrap();
    let BoundTableRef::Subquery(sub) = bound else {
        panic!("expected CTE to bind as a subquery");
    };
    assert_eq!(sub.alias, "x");
    assert_eq!(sub.column_names, vec!["a"]);
    assert_eq!(sub.subquery.types, vec![DataType::Int64]);
    assert!(binder.bind_context().get_binding("x").is_some());
    assert!(catalog.lookups.borrow().is_empty());
}

#[test]
fn test_cte_column_aliases_propagate() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut cte = CommonTableExpr::new("c", select_of("SELECT col1, col2 FROM s"));
    cte.column_aliases = vec!["first".into()];
    let mut binder = Binder::new(&catalog, &txn, &config).with_ctes(CteRegistry::new().define(cte));

    let BoundTableRef::Subquery(sub) = binder.bind_table_ref(&TableRef::table("c")).unwrap() else {
        panic!("expected subquery");
    };
    assert_eq!(sub.column_names, vec!["first", "col2"]);
}

#[test]
fn test_view_aliases_rename_leading_columns() {
    // Scenario: view v declares ["p"] over [col1, col2]
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let BoundTableRef::Subquery(sub) = binder.bind_table_ref(&TableRef::table("v")).unwrap() else {
        panic!("expected view to bind as a subquery");
    };
    assert_eq!(sub.alias, "v");
    assert_eq!(sub.column_names, vec!["p", "col2"]);
    // The view body keeps its own inferred names.
    assert_eq!(sub.subquery.names, vec!["col1", "col2"]);
    assert_eq!(
        binder.bind_context().get_binding("v").unwrap().column_names,
        vec!["p", "col2"]
    );
}

#[test]
fn test_cte_referencing_own_name_uses_catalog() {
    let catalog = RecordingCatalog::new(create_test_catalog());
    let txn = latest(&catalog.inner);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let bound = binder
        .bind_statement(&parse_query("WITH t AS (SELECT a FROM t) SELECT * FROM t").unwrap())
        .unwrap();
    let BoundStatement::Select(select) = bound else {
        panic!("expected SELECT");
    };
    assert_eq!(select.names, vec!["a"]);
    assert_eq!(*catalog.lookups.borrow(), vec!["t".to_string()]);
}

#[test]
fn test_inner_cte_shadows_outer() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let statement = parse_query(
        "WITH c AS (SELECT 1 AS one) \
         SELECT * FROM (WITH c AS (SELECT 2 AS two) SELECT * FROM c) s, c",
    )
    .unwrap();
    let BoundStatement::Select(select) = binder.bind_statement(&statement).unwrap() else {
        panic!("expected SELECT");
    };
    assert_eq!(select.names, vec!["two", "one"]);
}

#[test]
fn test_later_cte_sees_earlier_sibling() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let statement =
        parse_query("WITH a1 AS (SELECT a FROM t), a2 AS (SELECT a AS b FROM a1) SELECT b FROM a2")
            .unwrap();
    let BoundStatement::Select(select) = binder.bind_statement(&statement).unwrap() else {
        panic!("expected SELECT");
    };
    assert_eq!(select.names, vec!["b"]);
    assert_eq!(select.types, vec![DataType::Int64]);
}

#[test]
fn test_cte_references_are_independent_copies() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let statement = parse_query("WITH c AS (SELECT a FROM t) SELECT * FROM c x, c y").unwrap();
    let BoundStatement::Select(select) = binder.bind_statement(&statement).unwrap() else {
        panic!("expected SELECT");
    };
    let Some(BoundTableRef::CrossProduct { mut left, right }) = select.from else {
        panic!("expected cross product");
    };
    let (BoundTableRef::Subquery(x), BoundTableRef::Subquery(y)) = (left.as_mut(), right.as_ref())
    else {
        panic!("expected two subqueries");
    };

    // Each copy scanned t under its own scope index.
    let mut x_indices = Vec::new();
    let mut y_indices = Vec::new();
    collect_indices(x.subquery.from.as_ref().unwrap(), &mut x_indices);
    collect_indices(y.subquery.from.as_ref().unwrap(), &mut y_indices);
    assert_ne!(x_indices, y_indices);

    x.subquery.names[0] = "changed".into();
    assert_eq!(y.subquery.names, vec!["a"]);
}

#[test]
fn test_index_entry_is_unsupported() {
    let mut catalog = create_test_catalog();
    catalog
        .create_index(
            IndexCatalogEntry::new(DEFAULT_SCHEMA.into(), "t_a".into(), "t".into(), vec!["a".into()]),
            10,
        )
        .unwrap();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let err = binder.bind_table_ref(&TableRef::table("t_a")).unwrap_err();
    assert!(matches!(err, RuduError::Internal(_)));
    assert!(binder.bind_context().is_empty());
}

#[test]
fn test_missing_relation_and_schema() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let err = binder.bind_table_ref(&TableRef::table("missing")).unwrap_err();
    assert!(matches!(err, RuduError::BindError(ref m) if m.contains("missing")));

    let statement = parse_query("SELECT * FROM other.t").unwrap();
    let err = binder.bind_statement(&statement).unwrap_err();
    assert!(err.to_string().contains("Schema with name other does not exist"));
}

#[test]
fn test_relation_created_after_snapshot_is_invisible() {
    let mut catalog = create_test_catalog();
    let old = latest(&catalog);
    catalog
        .create_table(table("late", &[("z", DataType::Bool)]), 20)
        .unwrap();
    let config = BinderConfig::default();

    let mut binder = Binder::new(&catalog, &old, &config);
    assert!(binder.bind_table_ref(&TableRef::table("late")).is_err());

    let new = latest(&catalog);
    let mut binder = Binder::new(&catalog, &new, &config);
    assert!(binder.bind_table_ref(&TableRef::table("late")).is_ok());
}

#[test]
fn test_subquery_alias_generated_when_missing() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let BoundStatement::Select(select) = binder
        .bind_statement(&parse_query("SELECT * FROM (SELECT a FROM t)").unwrap())
        .unwrap()
    else {
        panic!("expected SELECT");
    };
    let Some(BoundTableRef::Subquery(sub)) = select.from else {
        panic!("expected subquery");
    };
    assert_eq!(sub.alias, format!("subquery_{}", sub.table_index));
}

#[test]
fn test_generated_subquery_alias_avoids_user_alias() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    // t takes index 0 and the inner t index 1, so the subquery gets index 2.
    let BoundStatement::Select(select) = binder
        .bind_statement(
            &parse_query("SELECT * FROM t AS subquery_2, (SELECT a FROM t)").unwrap(),
        )
        .unwrap()
    else {
        panic!("expected SELECT");
    };
    let Some(BoundTableRef::CrossProduct { left, right }) = select.from else {
        panic!("expected cross product");
    };
    let BoundTableRef::BaseTable(base) = *left else {
        panic!("expected base table");
    };
    let BoundTableRef::Subquery(sub) = *right else {
        panic!("expected subquery");
    };
    assert_eq!(base.alias, "subquery_2");
    assert_eq!(sub.table_index, 2);
    assert_eq!(sub.alias, "subquery_2_1");
}

#[test]
fn test_too_many_subquery_aliases() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default();
    let mut binder = Binder::new(&catalog, &txn, &config);

    let err = binder
        .bind_statement(&parse_query("SELECT * FROM (SELECT a FROM t) s(x, y)").unwrap())
        .unwrap_err();
    assert!(err.to_string().contains("1 columns available but 2 column aliases"));
}

#[test]
fn test_max_depth_limits_nesting() {
    let catalog = create_test_catalog();
    let txn = latest(&catalog);
    let config = BinderConfig::default().with_max_depth(2);
    let mut binder = Binder::new(&catalog, &txn, &config);

    let nested = "SELECT * FROM (SELECT * FROM (SELECT a FROM t) i) o";
    let err = binder.bind_statement(&parse_query(nested).unwrap()).unwrap_err();
    assert!(err.to_string().contains("Maximum binding depth of 2"));

    let config = BinderConfig::default().with_max_depth(3);
    let mut binder = Binder::new(&catalog, &txn, &config);
    assert!(binder.bind_statement(&parse_query(nested).unwrap()).is_ok());
}

fn cross_product(refs: Vec<TableRef>) -> TableRef {
    refs.into_iter()
        .reduce(|left, right| TableRef::CrossProduct {
            left: Box::new(left),
            right: Box::new(right),
        })
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_scope_indices_unique_and_one_binding_per_reference(
        use_view in proptest::collection::vec(any::<bool>(), 1..10)
    ) {
        let catalog = create_test_catalog();
        let txn = latest(&catalog);
        let config = BinderConfig::default();
        let mut binder = Binder::new(&catalog, &txn, &config);

        let refs: Vec<TableRef> = use_view
            .iter()
            .enumerate()
            .map(|(i, &view)| TableRef::aliased(if view { "v" } else { "t" }, format!("r{i}")))
            .collect();
        let bound = binder.bind_table_ref(&cross_product(refs)).unwrap();

        let mut indices = Vec::new();
        collect_indices(&bound, &mut indices);
        let unique: HashSet<usize> = indices.iter().copied().collect();
        prop_assert_eq!(unique.len(), indices.len());

        prop_assert_eq!(binder.bind_context().len(), use_view.len());
        for i in 0..use_view.len() {
            let alias = format!("r{i}");
            prop_assert!(binder.bind_context().get_binding(&alias).is_some());
        }
        prop_assert_eq!(bound.table_indices().len(), use_view.len());
    }

    #[test]
    fn prop_view_aliases_prefix_inferred_names(
        (n, k) in (1usize..8).prop_flat_map(|n| (Just(n), 0..=n))
    ) {
        let mut catalog = Catalog::new();
        let columns: Vec<(String, DataType)> =
            (0..n).map(|i| (format!("c{i}"), DataType::Int64)).collect();
        let column_refs: Vec<(&str, DataType)> =
            columns.iter().map(|(c, ty)| (c.as_str(), *ty)).collect();
        catalog.create_table(table("wide", &column_refs), 1).unwrap();

        let aliases: Vec<String> = (0..k).map(|i| format!("alias{i}")).collect();
        catalog
            .create_view(
                ViewCatalogEntry::new(
                    DEFAULT_SCHEMA.into(),
                    "wv".into(),
                    select_of("SELECT * FROM wide"),
                    aliases.clone(),
                ),
                2,
            )
            .unwrap();

        let txn = latest(&catalog);
        let config = BinderConfig::default();
        let mut binder = Binder::new(&catalog, &txn, &config);
        let BoundTableRef::Subquery(sub) = binder.bind_table_ref(&TableRef::table("wv")).unwrap() else {
            panic!("expected subquery");
        };

        let mut expected = aliases;
        expected.extend((k..n).map(|i| format!("c{i}")));
        prop_assert_eq!(sub.column_names, expected);
    }
}

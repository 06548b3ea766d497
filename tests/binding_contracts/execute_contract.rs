//! Contract tests for EXECUTE parameter binding.
//!
//! These tests verify:
//! - Values are assigned by position and cast to the declared parameter type
//! - A position without a placeholder fails and keeps earlier assignments
//! - Concurrent executions of one statement never observe each other's values
//! - Integer arguments only convert to floats when the value is exact

use std::sync::Arc;

use proptest::prelude::*;
use rudu::{Connection, Database, DataType, RuduError, StatementOutcome, Value};

fn setup(db: &Database) -> Connection<'_> {
    let mut conn = db.connect();
    conn.run("CREATE TABLE t (a INT64, b STRING, f FLOAT64, d DATE)")
        .unwrap();
    conn
}

fn slot_value(conn: &Connection<'_>, name: &str, index: usize) -> Value {
    conn.prepared(name)
        .unwrap()
        .parameter(index)
        .unwrap()
        .value()
}

#[test]
fn test_extra_argument_fails_after_partial_assignment() {
    // Scenario: placeholders {1, 2}, EXECUTE with three values
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1 AND b = $2")
        .unwrap();

    let err = conn.run("EXECUTE q(1, 'x', 3)").unwrap_err();
    assert!(matches!(err, RuduError::ParameterNotFound { index: 3 }));
    assert_eq!(err.to_string(), "Could not find parameter with index 3");

    assert_eq!(slot_value(&conn, "q", 1), Value::Int64(1));
    assert_eq!(slot_value(&conn, "q", 2), Value::String("x".into()));
}

#[test]
fn test_values_cast_to_parameter_types() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE f = $1 AND d = $2")
        .unwrap();

    let expected_date = Value::String("2024-01-02".into())
        .cast_to(DataType::Date)
        .unwrap();
    assert!(matches!(
        conn.run("EXECUTE q(3, '2024-01-02')").unwrap(),
        StatementOutcome::Execute(_)
    ));
    assert_eq!(slot_value(&conn, "q", 1), Value::Float64(3.0));
    assert_eq!(slot_value(&conn, "q", 2), expected_date);
}

#[test]
fn test_failed_cast_reports_index() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE b = $1 AND a = $2")
        .unwrap();

    let err = conn.run("EXECUTE q('ok', 'not a number')").unwrap_err();
    assert!(matches!(err, RuduError::ParameterCast { index: 2, .. }));
    assert!(err.to_string().starts_with("Parameter $2: Cast error"));
    assert_eq!(slot_value(&conn, "q", 1), Value::String("ok".into()));
    assert!(slot_value(&conn, "q", 2).is_null());
}

#[test]
fn test_fewer_values_keep_previous_assignments() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1 AND b = $2")
        .unwrap();

    conn.run("EXECUTE q(1, 'first')").unwrap();
    conn.run("EXECUTE q(2)").unwrap();
    assert_eq!(slot_value(&conn, "q", 1), Value::Int64(2));
    assert_eq!(slot_value(&conn, "q", 2), Value::String("first".into()));
}

#[test]
fn test_execute_plan_shares_prepared_plan() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1").unwrap();

    let plan = conn.execute("q", &[Value::Int64(7)]).unwrap();
    let prepared = conn.prepared("q").unwrap();
    assert!(Arc::ptr_eq(plan.prepared_plan().unwrap(), prepared.plan()));
    assert!(plan.plan().explain().starts_with("Execute: q"));
}

#[test]
fn test_constant_cast_argument_is_folded() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1").unwrap();

    conn.run("EXECUTE q(CAST('42' AS INT64))").unwrap();
    assert_eq!(slot_value(&conn, "q", 1), Value::Int64(42));

    let err = conn.run("EXECUTE q(a)").unwrap_err();
    assert!(err.to_string().contains("EXECUTE arguments must be constants"));
}

#[test]
fn test_unknown_statement() {
    let db = Database::new();
    let mut conn = setup(&db);
    let err = conn.run("EXECUTE missing(1)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bind error: Prepared statement \"missing\" does not exist"
    );
    assert!(conn.execute("missing", &[]).is_err());
    assert!(conn.run("DEALLOCATE missing").is_err());
}

#[test]
fn test_parameter_typing_errors() {
    let db = Database::new();
    let mut conn = setup(&db);

    let err = conn.run("SELECT a FROM t WHERE a = $1").unwrap_err();
    assert!(err.to_string().contains("only allowed in PREPARE"));

    let err = conn.run("PREPARE q AS SELECT a FROM t WHERE $1 = $2").unwrap_err();
    assert!(err.to_string().contains("Could not determine the type of parameter"));

    let err = conn
        .run("PREPARE q AS SELECT a FROM t WHERE a = $1 AND b = $1")
        .unwrap_err();
    assert!(err.to_string().contains("used as both"));
    assert!(conn.prepared("q").is_none());
}

#[test]
fn test_prepare_replaces_existing() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1").unwrap();
    conn.run("PREPARE q AS SELECT a FROM t WHERE b = $1").unwrap();
    assert_eq!(
        conn.prepared("q").unwrap().parameter_types(),
        vec![(1, DataType::String)]
    );
}

#[test]
fn test_large_sparse_parameter_index() {
    let db = Database::new();
    let mut conn = setup(&db);
    let outcome = conn
        .run("PREPARE q AS SELECT a FROM t WHERE a = $5000000")
        .unwrap();
    assert!(matches!(
        outcome,
        StatementOutcome::Prepared { parameter_count: 5_000_000, .. }
    ));
    drop(outcome);

    let prepared = conn.prepared("q").unwrap();
    assert_eq!(prepared.parameter_types(), vec![(5_000_000, DataType::Int64)]);
    assert!(prepared.parameter(5_000_000).is_some());

    let err = conn.run("EXECUTE q(1)").unwrap_err();
    assert!(matches!(err, RuduError::ParameterNotFound { index: 1 }));
}

#[test]
fn test_execute_while_plan_alive_fails() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1").unwrap();

    let first = conn.execute("q", &[Value::Int64(1)]).unwrap();
    let err = conn.execute("q", &[Value::Int64(2)]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bind error: Prepared statement \"q\" is already executing"
    );
    assert_eq!(slot_value(&conn, "q", 1), Value::Int64(1));

    drop(first);
    conn.execute("q", &[Value::Int64(2)]).unwrap();
    assert_eq!(slot_value(&conn, "q", 1), Value::Int64(2));
}

#[test]
fn test_inexact_float_argument_fails() {
    let db = Database::new();
    let mut conn = db.connect();
    conn.run("CREATE TABLE m (r FLOAT32, f FLOAT64)").unwrap();
    conn.run("PREPARE q AS SELECT r FROM m WHERE r = $1 AND f = $2")
        .unwrap();

    let err = conn.run("EXECUTE q(16777217)").unwrap_err();
    assert!(matches!(err, RuduError::ParameterCast { index: 1, .. }));

    let err = conn.run("EXECUTE q(16777216, 9007199254740993)").unwrap_err();
    assert!(matches!(err, RuduError::ParameterCast { index: 2, .. }));
    assert_eq!(slot_value(&conn, "q", 1), Value::Float32(16_777_216.0));
}

#[test]
fn test_concurrent_executions_do_not_interleave() {
    let db = Database::new();
    let mut conn = setup(&db);
    conn.run("PREPARE q AS SELECT a FROM t WHERE a = $1").unwrap();
    let prepared = conn.prepared("q").unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4_i64 {
            scope.spawn(move || {
                for round in 0..200_i64 {
                    let value = worker * 1_000 + round;
                    let plan = prepared.bind_execute(&[Value::Int64(value)]).unwrap();
                    // While our plan is alive no other execution can rebind $1.
                    std::thread::yield_now();
                    assert_eq!(prepared.parameter(1).unwrap().value(), Value::Int64(value));
                    drop(plan);
                }
            });
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_integer_argument_cast_to_float(v in -(1_i64 << 53)..=(1_i64 << 53)) {
        let db = Database::new();
        let mut conn = setup(&db);
        conn.run("PREPARE q AS SELECT a FROM t WHERE f = $1").unwrap();
        conn.execute("q", &[Value::Int64(v)]).unwrap();
        let Value::Float64(stored) = slot_value(&conn, "q", 1) else {
            panic!("expected FLOAT64");
        };
        #[allow(clippy::cast_possible_truncation)]
        let back = stored as i64;
        prop_assert_eq!(back, v);
    }

    #[test]
    fn prop_any_value_cast_to_string(v in any::<i64>(), b in any::<bool>()) {
        let db = Database::new();
        let mut conn = setup(&db);
        conn.run("PREPARE q AS SELECT a FROM t WHERE b = $1").unwrap();

        conn.execute("q", &[Value::Int64(v)]).unwrap();
        prop_assert_eq!(slot_value(&conn, "q", 1), Value::String(v.to_string()));

        conn.execute("q", &[Value::Bool(b)]).unwrap();
        prop_assert_eq!(slot_value(&conn, "q", 1), Value::String(b.to_string()));
    }
}

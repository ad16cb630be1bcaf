//! The six end-to-end scenarios (§8) run as integration tests against the
//! public [`q`] entry point, the way a caller outside this crate would use
//! it — parse, validate, plan and executor are exercised together, not
//! individually.

use std::collections::HashMap;
use std::rc::Rc;

use iqlc::{q, EngineError, Gpm, Relation, Row, Value};

struct FixedGpm {
    logpdf: f64,
    sample: Row,
}

impl Gpm for FixedGpm {
    fn logpdf(&self, _targets: &Row, _constraints: &Row) -> Result<f64, EngineError> {
        Ok(self.logpdf)
    }

    fn simulate(&self, _targets: &[String], _constraints: &Row) -> Result<Row, EngineError> {
        Ok(self.sample.clone())
    }
}

fn data_relation() -> Relation {
    let mut r1 = Row::new();
    r1.insert("x", Value::Int(1));
    r1.insert("y", Value::Int(2));
    let mut r2 = Row::new();
    r2.insert("x", Value::Int(3));
    r2.insert("y", Value::NoValue);
    Relation::new(vec![r1, r2], vec!["x".to_string(), "y".to_string()])
}

#[test]
fn select_star_yields_every_row_and_column() {
    let result = q("SELECT * FROM data", data_relation(), HashMap::new()).unwrap();
    assert_eq!(result.columns, vec!["x".to_string(), "y".to_string()]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get("x"), Some(&Value::Int(1)));
    assert_eq!(result.rows[0].get("y"), Some(&Value::Int(2)));
    assert_eq!(result.rows[1].get("x"), Some(&Value::Int(3)));
    assert_eq!(result.rows[1].get("y"), None);
}

#[test]
fn where_is_not_null_filters_missing_values() {
    let result = q("SELECT x FROM data WHERE y IS NOT NULL", data_relation(), HashMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("x"), Some(&Value::Int(1)));
}

#[test]
fn where_is_null_keeps_missing_values() {
    let result = q("SELECT x FROM data WHERE y IS NULL", data_relation(), HashMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("x"), Some(&Value::Int(3)));
}

#[test]
fn or_condition_matches_rows_from_either_branch() {
    let result = q("SELECT x FROM data WHERE x = 1 OR x = 3", data_relation(), HashMap::new()).unwrap();
    let mut xs: Vec<i64> = result
        .rows
        .iter()
        .map(|r| match r.get("x") {
            Some(Value::Int(n)) => *n,
            other => panic!("expected an int, got {other:?}"),
        })
        .collect();
    xs.sort();
    assert_eq!(xs, vec![1, 3]);
}

#[test]
fn order_by_desc_limit_picks_the_largest() {
    let result = q("SELECT x FROM data ORDER BY x DESC LIMIT 1", data_relation(), HashMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("x"), Some(&Value::Int(3)));
}

#[test]
fn probability_of_applies_exp_to_logpdf() {
    let mut models: HashMap<String, Rc<dyn Gpm>> = HashMap::new();
    models.insert("model".to_string(), Rc::new(FixedGpm { logpdf: 0.5_f64.ln(), sample: Row::new() }));
    let result =
        q("SELECT PROBABILITY OF x=1 UNDER model AS p FROM data LIMIT 1", data_relation(), models).unwrap();
    assert_eq!(result.columns, vec!["p".to_string()]);
    assert_eq!(result.rows.len(), 1);
    match result.rows[0].get("p") {
        Some(Value::Float(p)) => assert!((p - 0.5).abs() < 1e-9),
        other => panic!("expected a float probability, got {other:?}"),
    }
}

#[test]
fn generated_table_limit_draws_exactly_n_rows() {
    let mut sample = Row::new();
    sample.insert("x", Value::Int(7));
    let mut models: HashMap<String, Rc<dyn Gpm>> = HashMap::new();
    models.insert("model".to_string(), Rc::new(FixedGpm { logpdf: 0.0, sample }));
    let result = q("SELECT * FROM (GENERATE x UNDER model) LIMIT 2", Relation::empty(), models).unwrap();
    assert_eq!(result.rows.len(), 2);
    for row in &result.rows {
        assert_eq!(row.get("x"), Some(&Value::Int(7)));
    }
}

//! # iqlc
//!
//! Query compiler and executor for InferenceQL's IQL-SQL dialect: takes a
//! [`Node`] parse tree from `iqlc-parser`, runs it through the literal
//! reader, validator, expression evaluator, clause compiler, and planner,
//! and executes the resulting plan against an in-memory row database.
//!
//! The public entry point is [`q`], which mirrors the driver the
//! specification describes: parse, fill placeholders, build an
//! environment, evaluate.
//!
//! ```
//! use std::collections::HashMap;
//! use iqlc::{q, Relation, Row, Value};
//!
//! let mut row = Row::new();
//! row.insert("x", Value::Int(1));
//! let data = Relation::new(vec![row], vec!["x".to_string()]);
//!
//! let result = q("SELECT * FROM data", data, HashMap::new()).unwrap();
//! assert_eq!(result.rows[0].get("x"), Some(&Value::Int(1)));
//! ```

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::rc::Rc;

use iqlc_parser::Tag;
use log::debug;

mod compiler;
mod env;
mod error;
mod eval;
mod executor;
mod gpm;
mod ir;
mod literal;
mod planner;
mod validator;
mod value;

pub use env::Environment;
pub use error::{EngineError, Reason, WithErrorInfo};
pub use gpm::{ConstrainedGpm, Gpm};
pub use value::{Relation, Row, Value};

/// Driver `q(query, rows, models)` (§4.8).
///
/// 1. Parse `query`; a malformed query surfaces as an `incorrect_input`
///    [`EngineError`] carrying the parser's structured failure.
/// 2. Fill `rows` to a uniform schema (`add_placeholders`).
/// 3. Build the environment: built-ins ⊕ `models` ⊕ `{data: rows}`.
/// 4. Validate, then evaluate the parse tree in that environment.
pub fn q(query: &str, rows: Relation, models: HashMap<String, Rc<dyn Gpm>>) -> Result<Relation, EngineError> {
    debug!("parsing query ({} bytes)", query.len());
    let tree = iqlc_parser::parse(query).map_err(EngineError::parse_failure)?;

    let rows = rows.add_placeholders();
    let environment = Environment::new(rows, models);

    validator::validate(&tree)?;

    match tree.tag {
        Tag::SelectExpr => {
            let plan = planner::plan(&tree, &environment)?;
            debug!("executing plan with {} where-clauses", plan.query.where_clauses.len());
            executor::run(&plan, &environment)
        }
        Tag::InsertExpr => match eval::eval_insert(&tree, &environment)? {
            Value::Relation(relation) => Ok(relation),
            other => Err(EngineError::clause_compilation(format!("insert_expr evaluated to `{other:?}`"))),
        },
        other => Err(EngineError::clause_compilation(format!("`{other:?}` is not a statement"))),
    }
}

/// Renders a [`Relation`] as a JSON array of objects, one per row, in
/// `columns` order. `Gpm`/`Comparator` cells (which never legitimately
/// appear in a result relation) serialize to `null` rather than erroring,
/// since this is a best-effort external rendering, not a core operation.
pub fn to_json(relation: &Relation) -> serde_json::Value {
    let rows = relation
        .rows
        .iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = relation
                .columns
                .iter()
                .map(|col| (col.clone(), value_to_json(&row.get_else(col, Value::NoValue))))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NoValue => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::String(s) | Value::Symbol(s) => serde_json::Value::String(s.clone()),
        Value::Row(row) => {
            let map: serde_json::Map<String, serde_json::Value> =
                row.iter().map(|(k, v)| (k.to_string(), value_to_json(v))).collect();
            serde_json::Value::Object(map)
        }
        Value::Relation(relation) => to_json(relation),
        Value::List(values) => serde_json::Value::Array(values.iter().map(value_to_json).collect()),
        Value::Comparator(_) | Value::Gpm(_) => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn data_relation() -> Relation {
        let mut r1 = Row::new();
        r1.insert("x", Value::Int(1));
        r1.insert("y", Value::Int(2));
        let mut r2 = Row::new();
        r2.insert("x", Value::Int(3));
        Relation::new(vec![r1, r2], vec!["x".to_string(), "y".to_string()])
    }

    #[test]
    fn select_star_round_trips_through_q() {
        let result = q("SELECT * FROM data", data_relation(), HashMap::new()).unwrap();
        assert_eq!(result.columns, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn insert_expr_appends_rows() {
        let result = q("INSERT INTO data VALUES (5, 6)", data_relation(), HashMap::new()).unwrap();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[2].get("x"), Some(&Value::Int(5)));
    }

    #[test]
    fn generated_table_without_limit_is_rejected() {
        let err = q("SELECT * FROM (GENERATE x UNDER model)", Relation::empty(), HashMap::new()).unwrap_err();
        assert!(err.is_incorrect_input());
    }

    #[test]
    fn non_data_table_reference_is_rejected() {
        let err = q("SELECT * FROM other", data_relation(), HashMap::new()).unwrap_err();
        assert!(err.is_incorrect_input());
    }

    #[test]
    fn to_json_renders_rows_in_column_order() {
        let result = q("SELECT * FROM data", data_relation(), HashMap::new()).unwrap();
        let json = to_json(&result);
        assert_eq!(json[0]["x"], serde_json::json!(1));
        assert_eq!(json[0]["y"], serde_json::json!(2));
        assert_eq!(json[1]["y"], serde_json::Value::Null);
    }
}

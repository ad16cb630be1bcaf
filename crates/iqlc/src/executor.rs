//! Executor (§4.7): materializes the row database, runs the IR query, and
//! applies the post-processing transducer pipeline.
//!
//! This engine never builds a general join: every fragment the clause
//! compiler emits shares one entity variable bound to the single row under
//! consideration, so the executor evaluates each `where` clause list once
//! per candidate row rather than unifying across a relation of entities.
//! `WhereClause::Pattern`'s `entity` is therefore read, never joined on —
//! see `DESIGN.md`.

use std::collections::{HashMap, HashSet};

use iqlc_parser::Tag;
use itertools::Itertools;

use crate::compiler::TableSource;
use crate::env::{self, Environment};
use crate::error::EngineError;
use crate::eval;
use crate::ir::{Arg, PullSpec, Query, Var, WhereClause};
use crate::planner::Plan;
use crate::value::{Relation, Row, Value};

const DB_ID: &str = "db_id";
const IQL_TYPE: &str = "iql_type";

/// Runs a compiled [`Plan`] to completion, producing the final result
/// relation (§4.7 steps 3–5).
pub fn run(plan: &Plan, env: &Environment) -> Result<Relation, EngineError> {
    let source_rows = materialize_source(&plan.table_source, env, &plan.adding, plan.limit)?;
    let facts = tag_rows(source_rows);

    let bindings = run_query(&plan.query, &facts)?;
    let mut rows = bindings
        .into_iter()
        .map(|b| to_result_row(&plan.query, b))
        .collect::<Result<Vec<Row>, _>>()?;

    for row in &mut rows {
        strip_no_value(row);
    }

    if let Some((column, descending)) = &plan.order_by {
        rows.sort_by(|a, b| {
            let ord = a.get_else(column, Value::NoValue).compare(&b.get_else(column, Value::NoValue));
            if *descending { ord.reverse() } else { ord }
        });
    }

    if let Some(n) = plan.limit {
        rows.truncate(n);
    }

    for row in &mut rows {
        row.remove(DB_ID);
        row.remove(IQL_TYPE);
    }

    let columns = result_columns(&plan.query, &rows);
    Ok(Relation::new(rows, columns))
}

/// §4.7 step 5: `query.keys` if present, else the union of keys across
/// result rows, in first-seen order — always with private attributes
/// removed.
fn result_columns(query: &Query, rows: &[Row]) -> Vec<String> {
    let raw: Vec<String> = match &query.keys {
        Some(keys) => keys.clone(),
        None => rows.iter().flat_map(|r| r.keys()).map(str::to_string).unique().collect(),
    };
    raw.into_iter().filter(|c| c != DB_ID && c != IQL_TYPE).collect()
}

fn strip_no_value(row: &mut Row) {
    let keys: Vec<String> = row.iter().filter(|(_, v)| **v == Value::NoValue).map(|(k, _)| k.to_string()).collect();
    for key in keys {
        row.remove(&key);
    }
}

/// Resolves a `from_clause`'s table to a concrete sequence of rows,
/// applying the ADDING row-transform and, for a generated table, the
/// pre-execution LIMIT cap the validator guarantees is present (§4.7 step 2,
/// §9 Infinite lazy sequences). A cap is applied here only for a generated
/// source: capping an already-finite table before `WHERE`/`ORDER BY` run
/// would silently discard candidate rows those clauses are entitled to see
/// (see `DESIGN.md`).
fn materialize_source(
    source: &TableSource,
    env: &Environment,
    adding: &Option<String>,
    limit: Option<usize>,
) -> Result<Vec<Row>, EngineError> {
    let mut rows = match source {
        TableSource::Named(name) => match env.get(name)? {
            Value::Relation(r) => r.rows.clone(),
            other => return Err(EngineError::clause_compilation(format!("`{name}` is `{other:?}`, not a relation"))),
        },
        TableSource::Literal(relation) => relation.rows.clone(),
        TableSource::Generated(node) => {
            let n = limit.ok_or_else(|| EngineError::clause_compilation("generated table requires a LIMIT"))?;
            generated_rows(node, env, n)?
        }
    };

    if let Some(alias) = adding {
        for row in &mut rows {
            if !row.contains_key(alias) {
                row.insert(alias.clone(), Value::NoValue);
            }
        }
    }

    Ok(rows)
}

/// `generated_table_expr`: `simulate(model, targets, {})` called `limit`
/// times on the `ConstrainedGPM` the wrapped `generate_expr` evaluates to
/// (§4.4). Never runs unbounded — the validator rejects a generated table
/// with no `LIMIT` before the executor is ever reached.
fn generated_rows(node: &iqlc_parser::Node, env: &Environment, limit: usize) -> Result<Vec<Row>, EngineError> {
    let gpm = eval::eval_model(node, env)?;
    let targets_node = node
        .get(Tag::VariableList)
        .ok_or_else(|| EngineError::clause_compilation("generate_expr missing var_list"))?;
    let targets = eval::variable_list(targets_node)?;

    let mut rows = Vec::with_capacity(limit);
    for _ in 0..limit {
        rows.push(gpm.simulate(&targets, &Row::new())?);
    }
    Ok(rows)
}

fn tag_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            row.insert(DB_ID, Value::Int(i as i64));
            row.insert(IQL_TYPE, Value::Symbol("row".to_string()));
            row
        })
        .collect()
}

fn public_row(fact: &Row) -> Row {
    let mut row = fact.clone();
    row.remove(DB_ID);
    row.remove(IQL_TYPE);
    row
}

/// Runs `query.where_clauses` once per fact, keeping every fact whose
/// clauses all succeed, and returns each surviving run's variable bindings.
fn run_query(query: &Query, facts: &[Row]) -> Result<Vec<HashMap<Var, Value>>, EngineError> {
    let mut results = Vec::new();
    for fact in facts {
        let mut bindings = HashMap::new();
        if eval_clauses(&query.where_clauses, fact, &mut bindings)? {
            results.push(bindings);
        }
    }
    Ok(results)
}

fn eval_clauses(clauses: &[WhereClause], fact: &Row, bindings: &mut HashMap<Var, Value>) -> Result<bool, EngineError> {
    for clause in clauses {
        if !eval_clause(clause, fact, bindings)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_clause(clause: &WhereClause, fact: &Row, bindings: &mut HashMap<Var, Value>) -> Result<bool, EngineError> {
    match clause {
        WhereClause::Pattern { entity, attr, value } => {
            if fact.get_else(attr, Value::NoValue) != *value {
                return Ok(false);
            }
            bindings.insert(entity.clone(), fact.get_else(DB_ID, Value::NoValue));
            Ok(true)
        }
        WhereClause::GetElse { result, entity: _, attr, default } => {
            bindings.insert(result.clone(), fact.get_else(attr, default.clone()));
            Ok(true)
        }
        WhereClause::Ground { result, value } => {
            bindings.insert(result.clone(), value.clone());
            Ok(true)
        }
        WhereClause::Pull { result, entity: _, spec } => {
            let row = match spec {
                PullSpec::All => public_row(fact),
                PullSpec::Columns(cols) => {
                    let source = public_row(fact);
                    cols.iter().map(|c| (c.clone(), source.get_else(c, Value::NoValue))).collect()
                }
            };
            bindings.insert(result.clone(), Value::Row(row));
            Ok(true)
        }
        WhereClause::Merge { result, a, b } => {
            let ra = resolve_row(bindings, a)?;
            let rb = resolve_row(bindings, b)?;
            bindings.insert(result.clone(), Value::Row(ra.merge(&rb)));
            Ok(true)
        }
        WhereClause::Predicate { op, args, result } => eval_predicate(op, args, result, bindings),
        WhereClause::OrJoin { bound, branches } => {
            // Only `bound` (plus whatever was already bound coming in) may
            // cross back out of the winning branch — a branch-local binding
            // that escaped nothing else references is dropped here, which is
            // what actually enforces the closure the planner computed.
            let prior_keys: HashSet<Var> = bindings.keys().cloned().collect();
            for branch in branches {
                let mut trial = bindings.clone();
                if eval_clauses(branch, fact, &mut trial)? {
                    for (var, value) in trial {
                        if bound.contains(&var) || prior_keys.contains(&var) {
                            bindings.insert(var, value);
                        }
                    }
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn resolve_arg(arg: &Arg, bindings: &HashMap<Var, Value>) -> Result<Value, EngineError> {
    match arg {
        Arg::Var(v) => bindings
            .get(v)
            .cloned()
            .ok_or_else(|| EngineError::clause_compilation(format!("unbound IR variable `{v}`"))),
        Arg::Const(c) => Ok(c.clone()),
    }
}

fn resolve_row(bindings: &HashMap<Var, Value>, var: &Var) -> Result<Row, EngineError> {
    match bindings.get(var) {
        Some(Value::Row(row)) => Ok(row.clone()),
        _ => Err(EngineError::clause_compilation(format!("`{var}` is not bound to a row"))),
    }
}

/// `[(fn args…) result]` (§4.6): built-in comparators are naked filters when
/// `result` is `None`, otherwise bind their boolean outcome; `exp`/`logpdf`
/// always bind.
fn eval_predicate(
    op: &str,
    args: &[Arg],
    result: &Option<Var>,
    bindings: &mut HashMap<Var, Value>,
) -> Result<bool, EngineError> {
    match op {
        "=" | "!=" | "<" | "<=" | ">" | ">=" => {
            let a = resolve_arg(&args[0], bindings)?;
            let b = resolve_arg(&args[1], bindings)?;
            let truth = env::apply_predicate(op, &a, &b)?;
            match result {
                Some(var) => {
                    bindings.insert(var.clone(), Value::Bool(truth));
                    Ok(true)
                }
                None => Ok(truth),
            }
        }
        "exp" => {
            let x = resolve_arg(&args[0], bindings)?;
            let x = x.as_f64().ok_or_else(|| EngineError::clause_compilation("`exp` argument is not numeric"))?;
            let var = result.as_ref().ok_or_else(|| EngineError::clause_compilation("`exp` without a result variable"))?;
            bindings.insert(var.clone(), Value::Float(env::exp(x)));
            Ok(true)
        }
        "logpdf" => {
            let gpm = match resolve_arg(&args[0], bindings)? {
                Value::Gpm(g) => g,
                _ => return Err(EngineError::clause_compilation("`logpdf` first argument is not a model")),
            };
            let targets = resolve_arg(&args[1], bindings).and_then(|v| as_row(v))?;
            let constraints = resolve_arg(&args[2], bindings).and_then(|v| as_row(v))?;
            let density = gpm.logpdf(&targets, &constraints)?;
            let var = result.as_ref().ok_or_else(|| EngineError::clause_compilation("`logpdf` without a result variable"))?;
            bindings.insert(var.clone(), Value::Float(density));
            Ok(true)
        }
        other => Err(EngineError::clause_compilation(format!("predicate `{other}`"))),
    }
}

fn as_row(value: Value) -> Result<Row, EngineError> {
    match value {
        Value::Row(row) => Ok(row),
        other => Err(EngineError::clause_compilation(format!("`{other:?}` is not a row"))),
    }
}

/// Assembles one query-run's bindings into a result row, per `query.keys`'s
/// convention: `None` means `find` has exactly one variable already bound
/// to a pulled `Row` (the `SELECT *` case); `Some(keys)` zips `find` with
/// `keys` to build the row.
fn to_result_row(query: &Query, bindings: HashMap<Var, Value>) -> Result<Row, EngineError> {
    match &query.keys {
        None => {
            let var = query
                .find
                .first()
                .ok_or_else(|| EngineError::clause_compilation("query.find empty with no keys"))?;
            match bindings.get(var) {
                Some(Value::Row(row)) => Ok(row.clone()),
                _ => Err(EngineError::clause_compilation("expected a pulled row result")),
            }
        }
        Some(keys) => {
            let mut row = Row::new();
            for (var, key) in query.find.iter().zip(keys.iter()) {
                row.insert(key.clone(), bindings.get(var).cloned().unwrap_or(Value::NoValue));
            }
            Ok(row)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// The six end-to-end §8 scenarios now live in `crates/iqlc/tests/` as
    /// integration tests against the public `q()` entry point. This module
    /// keeps the executor's own unit tests — ones that poke at `eval_clause`
    /// directly rather than going through the whole pipeline.
    #[test]
    fn or_join_drops_branch_local_bindings_but_keeps_bound_and_prior() {
        let fact = Row::new();
        let mut bindings: HashMap<Var, Value> = HashMap::new();
        let entity = Var("?e".to_string());
        bindings.insert(entity.clone(), Value::Int(0));

        let local = Var("?local".to_string());
        let shared = Var("?shared".to_string());
        let clause = WhereClause::OrJoin {
            bound: vec![shared.clone()],
            branches: vec![vec![
                WhereClause::Ground { result: local.clone(), value: Value::Int(1) },
                WhereClause::Ground { result: shared.clone(), value: Value::Int(2) },
            ]],
        };

        assert!(eval_clause(&clause, &fact, &mut bindings).unwrap());
        assert_eq!(bindings.get(&shared), Some(&Value::Int(2)));
        assert_eq!(bindings.get(&local), None);
        assert_eq!(bindings.get(&entity), Some(&Value::Int(0)));
    }

    #[test]
    fn or_join_tries_every_branch_until_one_succeeds() {
        let fact = Row::new();
        let mut bindings: HashMap<Var, Value> = HashMap::new();
        let clause = WhereClause::OrJoin {
            bound: Vec::new(),
            branches: vec![
                vec![WhereClause::Predicate {
                    op: "=".to_string(),
                    args: vec![Arg::Const(Value::Int(1)), Arg::Const(Value::Int(2))],
                    result: None,
                }],
                vec![WhereClause::Predicate {
                    op: "=".to_string(),
                    args: vec![Arg::Const(Value::Int(2)), Arg::Const(Value::Int(2))],
                    result: None,
                }],
            ],
        };
        assert!(eval_clause(&clause, &fact, &mut bindings).unwrap());
    }
}

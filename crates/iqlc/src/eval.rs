//! Expression evaluator (§4.4): node-tag-dispatched evaluation of every
//! non-SELECT expression form. `select_expr` itself is evaluated by
//! [`crate::executor::execute`], hooked in here as the terminal case.

use std::rc::Rc;

use iqlc_parser::{Child, Node, Tag};

use crate::env::Environment;
use crate::error::EngineError;
use crate::gpm::{ConstrainedGpm, Gpm};
use crate::literal;
use crate::value::{Relation, Row, Value};

/// Reads a `name` leaf as a bare keyword string (§4.4: `name` → keyword).
pub fn name(node: &Node) -> Result<String, EngineError> {
    node.only_leaf()
        .map(str::to_string)
        .ok_or_else(|| EngineError::clause_compilation("name node without leaf text"))
}

/// `ref` → `env[name]`, hard error if the key is absent.
pub fn eval_ref(node: &Node, env: &Environment) -> Result<Value, EngineError> {
    let key = name(node)?;
    env.get(&key).cloned()
}

/// `variable_list` → ordered list of symbol names.
pub fn variable_list(node: &Node) -> Result<Vec<String>, EngineError> {
    node.child_nodes().map(name).collect()
}

/// `map_entry_expr`/`map_expr` → an ordinary `Row` of literal values.
pub fn eval_map(node: &Node) -> Result<Row, EngineError> {
    let mut row = Row::new();
    for entry in node.child_nodes() {
        let key_node = entry
            .get(Tag::Name)
            .ok_or_else(|| EngineError::clause_compilation("map_entry_expr missing key"))?;
        let key = name(key_node)?;
        let value_node = entry
            .child_nodes()
            .find(|n| n.tag != Tag::Name)
            .ok_or_else(|| EngineError::clause_compilation("map_entry_expr missing value"))?;
        row.insert(key, literal::read(value_node)?);
    }
    Ok(row)
}

/// Evaluates a `model_expr` tree to a `Value::Gpm` handle (§4.4:
/// `conditioned_by_expr`, `constrained_by_expr`/`generate_expr`).
pub fn eval_model(node: &Node, env: &Environment) -> Result<Rc<dyn Gpm>, EngineError> {
    match node.tag {
        Tag::Ref => match eval_ref(node, env)? {
            Value::Gpm(gpm) => Ok(gpm),
            other => {
                Err(EngineError::clause_compilation(format!("`{other:?}` is not a model")))
            }
        },
        Tag::ConditionedByExpr => {
            let model_node = node
                .child_nodes()
                .find(|n| n.tag != Tag::EventList)
                .ok_or_else(|| EngineError::clause_compilation("conditioned_by_expr missing model"))?;
            let model = eval_model(model_node, env)?;
            let events = node
                .child_nodes()
                .find(|n| n.tag == Tag::EventList)
                .ok_or_else(|| EngineError::clause_compilation("conditioned_by_expr missing events"))?;
            let constraints = eval_event_list_as_row(events)?;
            // Any event mapping to NO_VALUE is dropped (§4.4).
            let mut filtered = Row::new();
            for (k, v) in constraints.iter() {
                if *v != Value::NoValue {
                    filtered.insert(k.to_string(), v.clone());
                }
            }
            Ok(Rc::new(ConstrainedGpm::new(model, Vec::new(), filtered)))
        }
        Tag::ConstrainedByExpr => {
            let children: Vec<&Node> = node.child_nodes().collect();
            let model_node = children
                .first()
                .ok_or_else(|| EngineError::clause_compilation("constrained_by_expr missing model"))?;
            let model = eval_model(model_node, env)?;
            let targets_node = node
                .get(Tag::VariableList)
                .ok_or_else(|| EngineError::clause_compilation("constrained_by_expr missing targets"))?;
            let targets = variable_list(targets_node)?;
            let constraints = match node.get(Tag::MapExpr) {
                Some(m) => eval_map(m)?,
                None => Row::new(),
            };
            Ok(Rc::new(ConstrainedGpm::new(model, targets, constraints)))
        }
        Tag::GenerateExpr => {
            let vars_node = node
                .get(Tag::VariableList)
                .ok_or_else(|| EngineError::clause_compilation("generate_expr missing var_list"))?;
            let targets = variable_list(vars_node)?;
            let model_node = node
                .child_nodes()
                .find(|n| n.tag != Tag::VariableList && n.tag != Tag::MapExpr)
                .ok_or_else(|| EngineError::clause_compilation("generate_expr missing model"))?;
            let model = eval_model(model_node, env)?;
            let constraints = match node.get(Tag::MapExpr) {
                Some(m) => eval_map(m)?,
                None => Row::new(),
            };
            Ok(Rc::new(ConstrainedGpm::new(model, targets, constraints)))
        }
        other => Err(EngineError::clause_compilation(format!("{other:?} is not a model_expr"))),
    }
}

/// The row-event protocol's binding map (§4.5.1, binding clause): every
/// named event in an `event_list`, read to a `sym → value` row. Events are
/// literal (no row lookup performed here) under the grammar this compiler
/// accepts — see `DESIGN.md` for why that is the correct reading of §4.1.
pub fn eval_event_list_as_row(node: &Node) -> Result<Row, EngineError> {
    let mut row = Row::new();
    for event in node.child_nodes() {
        match event.tag {
            Tag::EqualityEvent | Tag::BinopEvent => {
                let sym_node = event
                    .get(Tag::Name)
                    .ok_or_else(|| EngineError::clause_compilation("event missing symbol"))?;
                let sym = name(sym_node)?;
                let value_node = event
                    .child_nodes()
                    .find(|n| n.tag != Tag::Name && n.tag != Tag::PredicateExpr)
                    .ok_or_else(|| EngineError::clause_compilation("event missing value"))?;
                row.insert(sym, literal::read(value_node)?);
            }
            _ => {}
        }
    }
    Ok(row)
}

/// Whether an `event_list` contains the `*` marker.
pub fn event_list_has_star(node: &Node) -> bool {
    node.children().iter().any(|c| matches!(c, Child::Leaf(s) if s == "*"))
}

/// `insert_expr` → relation obtained by appending the literal rows of
/// `VALUES …` to the relation denoted by `INTO table` (§4.4).
pub fn eval_insert(node: &Node, env: &Environment) -> Result<Value, EngineError> {
    let table_node = node
        .get(Tag::Ref)
        .ok_or_else(|| EngineError::clause_compilation("insert_expr missing table"))?;
    let table_name = name(table_node)?;
    let base = match env.get(&table_name) {
        Ok(Value::Relation(r)) => r.clone(),
        Ok(_) => return Err(EngineError::clause_compilation("INTO target is not a relation")),
        Err(_) => Relation::empty(),
    };

    let values_node = node
        .child_nodes()
        .find(|n| matches!(n.tag, Tag::ValueListsFull | Tag::ValueListsSparse))
        .ok_or_else(|| EngineError::clause_compilation("insert_expr missing VALUES"))?;
    let lists = match literal::read(values_node)? {
        Value::List(lists) => lists,
        _ => unreachable!("ValueListsFull/ValueListsSparse always read to Value::List"),
    };

    let columns = if base.columns.is_empty() {
        // No declared schema yet: number positionally. A query that inserts
        // into an empty/unknown table without a preceding relation literal
        // establishing column names has no names to assign.
        Vec::new()
    } else {
        base.columns.clone()
    };

    let mut rows = base.rows;
    for list in lists {
        let values = match list {
            Value::List(values) => values,
            other => vec![other],
        };
        let row: Row = columns.iter().cloned().zip(values).collect();
        rows.push(row);
    }

    Ok(Value::Relation(Relation::new(rows, columns)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpm::test_support::FixedGpm;
    use iqlc_parser::parse;
    use std::collections::HashMap;

    fn env_with_model() -> Environment {
        let gpm = FixedGpm {
            logpdf_fn: |_t: &Row, _c: &Row| Ok(0.5_f64.ln()),
            simulate_fn: |_t: &[String], _c: &Row| Ok(Row::new()),
        };
        let mut models: HashMap<String, Rc<dyn Gpm>> = HashMap::new();
        models.insert("model".to_string(), Rc::new(gpm));
        Environment::new(Relation::empty(), models)
    }

    #[test]
    fn evaluates_conditioned_by_expr_dropping_no_value_events() {
        let tree = parse("SELECT PROBABILITY OF x=1 UNDER model GIVEN y=2 FROM data LIMIT 1").unwrap();
        let model_node = tree
            .get(Tag::SelectList)
            .unwrap()
            .get(Tag::ProbabilityClause)
            .unwrap()
            .get(Tag::ConditionedByExpr)
            .unwrap();
        let env = env_with_model();
        let gpm = eval_model(model_node, &env).unwrap();
        let mut targets = Row::new();
        targets.insert("x", Value::Int(1));
        let density = gpm.logpdf(&targets, &Row::new()).unwrap();
        assert!((density - 0.5_f64.ln()).abs() < 1e-9);
    }
}

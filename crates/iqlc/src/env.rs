use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{EngineError, Reason};
use crate::gpm::Gpm;
use crate::value::{Relation, Row, Value};

/// Names of the built-in comparators and functions the planner recognizes
/// during input lifting (§4.7). Kept alongside `default_table`/`default_model`
/// as "process-wide configuration", not mutable globals (§9 Global-ish
/// defaults).
pub const DEFAULT_TABLE: &str = "data";
pub const DEFAULT_MODEL: &str = "model";

/// A mapping from symbol → value (§3 Environment).
#[derive(Clone)]
pub struct Environment {
    values: HashMap<String, Value>,
}

impl Environment {
    /// Built the environment built-ins ⊕ models ⊕ `{data: rows}` (§4.8 step 3).
    pub fn new(rows: Relation, models: HashMap<String, Rc<dyn Gpm>>) -> Self {
        let mut values = builtins();
        values.insert(DEFAULT_TABLE.to_string(), Value::Relation(rows));
        for (name, gpm) in models {
            let is_default = name == DEFAULT_MODEL;
            values.insert(name, Value::Gpm(gpm.clone()));
            if is_default {
                values.insert(DEFAULT_MODEL.to_string(), Value::Gpm(gpm));
            }
        }
        Environment { values }
    }

    pub fn get(&self, name: &str) -> Result<&Value, EngineError> {
        self.values.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.values.keys().cloned().collect();
            available.sort();
            EngineError::new(Reason::UnboundName { name: name.to_string(), available })
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

fn builtins() -> HashMap<String, Value> {
    let mut m = HashMap::new();
    m.insert(
        "ascending".to_string(),
        Value::Comparator(Rc::new(|a: &Value, b: &Value| a.compare(b))),
    );
    m.insert(
        "descending".to_string(),
        Value::Comparator(Rc::new(|a: &Value, b: &Value| a.compare(b).reverse())),
    );
    m
}

/// Applies a named built-in predicate symbol (§4.4 `predicate_expr` →
/// built-in comparison) to two values.
pub fn apply_predicate(op: &str, a: &Value, b: &Value) -> Result<bool, EngineError> {
    let ord = a.compare(b);
    let result = match op {
        "=" => a == b,
        "!=" => a != b,
        "<" => ord == Ordering::Less,
        "<=" => ord != Ordering::Greater,
        ">" => ord == Ordering::Greater,
        ">=" => ord != Ordering::Less,
        other => {
            return Err(EngineError::clause_compilation(format!("predicate `{other}`")));
        }
    };
    Ok(result)
}

/// `exp`, a built-in named in §3's environment and used by the density
/// clause compiler (logpdf → exp) to turn a log-density into a probability.
pub fn exp(x: f64) -> f64 {
    x.exp()
}

/// `merge`, the structural built-in backing the row-event protocol's merge
/// clause (§4.5.1) and re-exposed here for `Row::merge` callers that reach
/// it by name.
pub fn merge(a: &Row, b: &Row) -> Row {
    a.merge(b)
}

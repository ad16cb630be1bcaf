use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::gpm::Gpm;

/// A comparator over two values, used by `ORDER BY` and by the `ascending`
/// / `descending` built-ins.
pub type Comparator = Rc<dyn Fn(&Value, &Value) -> Ordering>;

/// The runtime value universe (§3 Value).
///
/// `NoValue` is the sentinel written `NO_VALUE` in the specification prose;
/// it is kept distinct from `Null` because a parsed `NULL`/`NA` literal and
/// an absent cell are the same sentinel at the value level but arrive via
/// different productions (`null_node` vs. placeholder insertion).
#[derive(Clone)]
pub enum Value {
    NoValue,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Row(Row),
    Relation(Relation),
    /// An ordered sequence of values — the literal reader's intermediate
    /// shape for `value_list`/`value_lists_full`/`value_lists_sparse`
    /// (§4.2). Never appears in a final result relation's cells.
    List(Vec<Value>),
    Comparator(Comparator),
    Gpm(Rc<dyn Gpm>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NoValue => write!(f, "NO_VALUE"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Row(r) => write!(f, "{r:?}"),
            Value::Relation(rel) => write!(f, "{rel:?}"),
            Value::List(vs) => write!(f, "{vs:?}"),
            Value::Comparator(_) => write!(f, "<comparator>"),
            Value::Gpm(_) => write!(f, "<gpm>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::NoValue, Value::NoValue) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Row(a), Value::Row(b)) => a == b,
            (Value::Relation(a), Value::Relation(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Datalog-style ordering used by the built-in comparators and by the
    /// default `db_id` sort key. `NO_VALUE` sorts before every other value.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::NoValue, Value::NoValue) => Ordering::Equal,
            (Value::NoValue, _) => Ordering::Less,
            (_, Value::NoValue) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Symbol(a), Value::Symbol(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }
}

/// An ordered attribute→value map (§3 Value: "a row").
///
/// Kept as an insertion-ordered `Vec` of pairs rather than a hash map:
/// attribute order drives the `columns` projection order, and rows rarely
/// carry more than a handful of keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_else(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Inserts, or overwrites in place if the key already exists so that
    /// repeated merges do not reorder previously-seen attributes.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `merge(a, b)`: union of keys, `b`'s value wins on collision. Grounds
    /// the row-event protocol's merge clause (§4.5.1) and the built-in
    /// `merge` function (§3 Environment).
    pub fn merge(&self, other: &Row) -> Row {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k.to_string(), v.clone());
        }
        out
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// An ordered sequence of rows plus a `columns` attribute (§3 Relation).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
}

impl Relation {
    pub fn new(rows: Vec<Row>, columns: Vec<String>) -> Self {
        Relation { rows, columns }
    }

    pub fn empty() -> Self {
        Relation::default()
    }

    /// Unions every row's keys with the declared `columns`, inserting
    /// `NO_VALUE` for any missing cell (§3 Placeholders, invariant 1).
    /// Idempotent: a relation that has already been placeholder-filled is
    /// unchanged by a second pass, since `columns` is recomputed as a
    /// superset and `Row::insert` is a no-op overwrite for existing keys
    /// only when absent (it never replaces a present, non-placeholder cell
    /// because we only call it when the key is missing).
    pub fn add_placeholders(mut self) -> Relation {
        let mut columns = self.columns.clone();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }
        for row in &mut self.rows {
            for col in &columns {
                if !row.contains_key(col) {
                    row.insert(col.clone(), Value::NoValue);
                }
            }
        }
        self.columns = columns;
        self
    }
}

//! The Datalog-style IR (§4.6): an abstract conjunctive-query interface.
//! This module gives it a concrete, idiomatic shape — a small tree of
//! [`WhereClause`]s interpreted directly by the executor — rather than
//! embedding a general Datalog engine, per §4.6's "implementers may ...
//! implement a minimal one honoring the above operators".

use std::fmt;

use crate::value::Value;

/// A logic variable. Every `Var` in this engine is machine-generated (there
/// is no surface syntax that names one directly — user-facing names live in
/// `Fragment`/`Query`'s separate `keys` list), so `"?"` is just a readable
/// naming convention, not a marker distinguishing variable kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub String);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Var {
    pub fn generated(kind: &str, counter: usize) -> Var {
        Var(format!("?{kind}{counter}"))
    }
}

/// The row database variable; always the first `in` parameter (§3 IR query
/// plan invariant).
pub fn db_var() -> Var {
    Var("$".to_string())
}

/// An argument to a pattern or predicate clause: either a bound variable or
/// a literal constant.
#[derive(Clone, Debug)]
pub enum Arg {
    Var(Var),
    Const(Value),
}

impl From<Var> for Arg {
    fn from(v: Var) -> Self {
        Arg::Var(v)
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Const(v)
    }
}

#[derive(Clone, Debug)]
pub enum PullSpec {
    All,
    Columns(Vec<String>),
}

/// One `where`-clause production (§4.6).
#[derive(Clone, Debug)]
pub enum WhereClause {
    /// `[?e attr value]`: restricts `entity` to facts bound to the given
    /// attribute/value pair. The compiler only ever emits this to bind the
    /// database's row entities (`[?e iql_type row]`).
    Pattern { entity: Var, attr: String, value: Value },
    /// `get_else($, entity, attr, default)`: attribute lookup with a default.
    GetElse { result: Var, entity: Var, attr: String, default: Value },
    /// `ground(value)`: binds a constant.
    Ground { result: Var, value: Value },
    /// `pull($, spec, entity)`: materializes a row by attribute projection.
    Pull { result: Var, entity: Var, spec: PullSpec },
    /// `merge(a, b)`, right-biased.
    Merge { result: Var, a: Var, b: Var },
    /// `[(fn args…) result]`. `result: None` means the call is a naked
    /// boolean filter, e.g. `[(not= sym NO_VALUE)]`.
    Predicate { op: String, args: Vec<Arg>, result: Option<Var> },
    /// `(or_join [bound…] sub₁ sub₂ …)`: disjunction with explicit
    /// bound-variable list (§4.5.2).
    OrJoin { bound: Vec<Var>, branches: Vec<Vec<WhereClause>> },
}

/// `{find, keys, in, where}` (§3 IR query plan), after merging and input
/// lifting — the form the executor runs directly.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub find: Vec<Var>,
    pub keys: Option<Vec<String>>,
    pub in_vars: Vec<Var>,
    pub where_clauses: Vec<WhereClause>,
}

/// A partial IR contribution from one clause-compiler rule (§4.5). Fragments
/// merge with set-union on `find`/`in` (by `Var` identity) and list-concat
/// on `where`, preserving order so that `from_clause`'s contribution (which
/// fixes input position 0) is always merged first.
#[derive(Clone, Debug, Default)]
pub struct Fragment {
    pub find: Vec<Var>,
    pub keys: Vec<String>,
    pub in_vars: Vec<Var>,
    pub inputs: Vec<Value>,
    pub where_clauses: Vec<WhereClause>,
}

impl Fragment {
    pub fn merge(mut self, other: Fragment) -> Fragment {
        for v in other.find {
            if !self.find.contains(&v) {
                self.find.push(v);
            }
        }
        self.keys.extend(other.keys);
        for (var, input) in other.in_vars.into_iter().zip(other.inputs) {
            if !self.in_vars.contains(&var) {
                self.in_vars.push(var);
                self.inputs.push(input);
            }
        }
        self.where_clauses.extend(other.where_clauses);
        self
    }

    pub fn merge_all(fragments: impl IntoIterator<Item = Fragment>) -> Fragment {
        fragments.into_iter().fold(Fragment::default(), Fragment::merge)
    }
}

/// Every variable `clauses` exposes to its surrounding context: for most
/// clauses, every variable it mentions; for an `or_join`, only its already
/// -computed `bound` list, since anything else inside a branch is scoped to
/// that branch and cannot be referenced once the `or_join` clause finishes
/// (§4.5.2). Used by the planner to decide what a sibling clause or the
/// query's own `find` list can still see.
pub fn visible_vars(clauses: &[WhereClause]) -> Vec<Var> {
    let mut out = Vec::new();
    for clause in clauses {
        match clause {
            WhereClause::OrJoin { bound, .. } => out.extend(bound.iter().cloned()),
            other => collect_vars(std::slice::from_ref(other), &mut out),
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Every variable referenced anywhere in `clauses`, recursing fully into
/// nested `or_join` branches. Unlike `visible_vars`, this looks *inside* a
/// branch rather than at what it exposes — used to ask "does this branch
/// reference variable X at all", not "can X be read after this clause".
pub fn all_vars(clauses: &[WhereClause]) -> Vec<Var> {
    let mut out = Vec::new();
    collect_vars(clauses, &mut out);
    out.sort();
    out.dedup();
    out
}

fn collect_vars(clauses: &[WhereClause], out: &mut Vec<Var>) {
    for clause in clauses {
        match clause {
            WhereClause::Pattern { entity, .. } => out.push(entity.clone()),
            WhereClause::GetElse { result, entity, .. } => {
                out.push(result.clone());
                out.push(entity.clone());
            }
            WhereClause::Ground { result, .. } => out.push(result.clone()),
            WhereClause::Pull { result, entity, .. } => {
                out.push(result.clone());
                out.push(entity.clone());
            }
            WhereClause::Merge { result, a, b } => {
                out.push(result.clone());
                out.push(a.clone());
                out.push(b.clone());
            }
            WhereClause::Predicate { args, result, .. } => {
                for arg in args {
                    if let Arg::Var(v) = arg {
                        out.push(v.clone());
                    }
                }
                if let Some(r) = result {
                    out.push(r.clone());
                }
            }
            WhereClause::OrJoin { bound, branches } => {
                out.extend(bound.iter().cloned());
                for branch in branches {
                    collect_vars(branch, out);
                }
            }
        }
    }
}

//! Planner (§4.7 Plan assembly): merges clause-compiler fragments for one
//! SELECT into a single [`ir::Query`] plus its source/ordering/limit
//! metadata, and performs input lifting.

use iqlc_parser::{Node, Tag};

use crate::compiler::{self, Counter, TableSource};
use crate::env::Environment;
use crate::error::EngineError;
use crate::eval;
use crate::ir::{self, Fragment, Query, Var, WhereClause};
use crate::value::Value;

pub struct Plan {
    pub query: Query,
    pub inputs: Vec<Value>,
    pub table_source: TableSource,
    pub adding: Option<String>,
    pub limit: Option<usize>,
    pub order_by: Option<(String, bool)>,
}

/// `plan(select_expr, env)` (§4.7).
pub fn plan(select_expr: &Node, env: &Environment) -> Result<Plan, EngineError> {
    let counter = Counter::default();
    let entity = compiler::entity_var();

    let table_source = compiler::resolve_table_source(select_expr.get(Tag::FromClause))?;

    let list_node = select_expr
        .get(Tag::SelectList)
        .ok_or_else(|| EngineError::clause_compilation("select_expr missing select_list"))?;
    let select_fragment = compiler::compile_select_list(list_node, env, &counter)?;

    let where_fragment = match select_expr.get(Tag::WhereClause) {
        Some(w) => compiler::compile_condition(w, &entity, &counter)?,
        None => Fragment::default(),
    };

    let merged = Fragment::merge_all([select_fragment, where_fragment]);
    let (query, inputs) = inputize(merged, env)?;

    let adding = select_expr
        .get(Tag::AddingClause)
        .map(|a| {
            let name_node = a
                .only_child()
                .ok_or_else(|| EngineError::clause_compilation("adding_clause missing name"))?;
            eval::name(name_node)
        })
        .transpose()?;

    let limit = select_expr
        .get(Tag::LimitClause)
        .map(|l| {
            let n = l
                .only_child()
                .ok_or_else(|| EngineError::clause_compilation("limit_clause missing nat"))?;
            let text = n
                .only_leaf()
                .ok_or_else(|| EngineError::clause_compilation("nat missing leaf text"))?;
            text.parse::<usize>()
                .map_err(|_| EngineError::clause_compilation(format!("malformed LIMIT `{text}`")))
        })
        .transpose()?;

    let order_by = select_expr
        .get(Tag::OrderByClause)
        .map(|o| {
            let col_node = o.get(Tag::Name).ok_or_else(|| EngineError::clause_compilation("order_by missing column"))?;
            let column = eval::name(col_node)?;
            let descending = o.get(Tag::Descending).is_some();
            Ok::<_, EngineError>((column, descending))
        })
        .transpose()?;

    Ok(Plan { query, inputs, table_source, adding, limit, order_by })
}

/// Input lifting (`inputize`, §4.7): for every built-in symbol referenced
/// (comparator, `exp`, `merge`, `pull`, `logpdf`) the query's predicates
/// already name it directly as an `op` string, and every GPM handle a
/// density clause needs is resolved to a concrete environment value at
/// compile time by `compile_density_selection`'s `eval::eval_model` call,
/// embedded straight into an `Arg::Const` — so there is no symbol left for
/// this closed-IR realization (§4.9) to hoist out of the environment. What
/// remains of lifting is closing every `or_join` over its free variables
/// (§4.5.2), which `close_or_joins` does.
fn inputize(fragment: Fragment, _env: &Environment) -> Result<(Query, Vec<Value>), EngineError> {
    let where_clauses = close_or_joins(&fragment.find, &fragment.where_clauses);
    let keys = if fragment.keys.is_empty() { None } else { Some(fragment.keys) };
    let query = Query { find: fragment.find, keys, in_vars: fragment.in_vars, where_clauses };
    Ok((query, fragment.inputs))
}

/// Closes every `or_join`'s `bound` list over the variables its branches
/// reference that also appear outside it — in the query's own `find` list,
/// or in a sibling clause at the same nesting level (§4.5.2). A variable a
/// branch introduces and nothing else ever reads does not need to be
/// declared: it cannot be observed once the `or_join` clause finishes.
fn close_or_joins(find: &[Var], clauses: &[WhereClause]) -> Vec<WhereClause> {
    clauses
        .iter()
        .enumerate()
        .map(|(i, clause)| match clause {
            WhereClause::OrJoin { bound, branches } => {
                let branches: Vec<Vec<WhereClause>> =
                    branches.iter().map(|b| close_or_joins(find, b)).collect();

                let mut context = find.to_vec();
                for (j, other) in clauses.iter().enumerate() {
                    if j != i {
                        context.extend(ir::visible_vars(std::slice::from_ref(other)));
                    }
                }

                let mut full_bound = bound.clone();
                for var in branches.iter().flat_map(|b| ir::all_vars(b)) {
                    if context.contains(&var) && !full_bound.contains(&var) {
                        full_bound.push(var);
                    }
                }
                WhereClause::OrJoin { bound: full_bound, branches }
            }
            other => other.clone(),
        })
        .collect()
}


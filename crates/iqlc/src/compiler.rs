//! Clause compiler (§4.5): translates SELECT sub-nodes to IR fragments.

use std::cell::Cell;

use iqlc_parser::{Node, Tag};

use crate::env::Environment;
use crate::error::EngineError;
use crate::eval;
use crate::ir::{Arg, Fragment, PullSpec, Var, WhereClause};
use crate::literal;
use crate::value::Value;

/// Generates fresh, recognizably machine-generated variable names
/// (`is_generated`, §4.5.2).
#[derive(Default)]
pub struct Counter(Cell<usize>);

impl Counter {
    pub fn fresh(&self, kind: &str) -> Var {
        let n = self.0.get();
        self.0.set(n + 1);
        Var::generated(kind, n)
    }
}

/// The table a `from_clause` resolves to (§4.5 `from_clause` row, kept as
/// plan-level metadata rather than a generic IR input — see `DESIGN.md`).
pub enum TableSource {
    Named(String),
    Generated(Node),
    Literal(crate::value::Relation),
}

/// Resolves `from_clause` to its table source. Default is the `data`
/// identifier when no `FROM` is present.
pub fn resolve_table_source(from_clause: Option<&Node>) -> Result<TableSource, EngineError> {
    let table = match from_clause {
        None => return Ok(TableSource::Named(crate::env::DEFAULT_TABLE.to_string())),
        Some(fc) => fc
            .only_child()
            .ok_or_else(|| EngineError::clause_compilation("from_clause missing table"))?,
    };
    match table.tag {
        Tag::Ref => {
            let name = table
                .only_leaf()
                .ok_or_else(|| EngineError::clause_compilation("ref missing name"))?;
            Ok(TableSource::Named(name.to_string()))
        }
        Tag::GeneratedTableExpr => {
            let inner = table
                .only_child()
                .ok_or_else(|| EngineError::clause_compilation("generated_table_expr missing generate_expr"))?;
            Ok(TableSource::Generated(inner.clone()))
        }
        Tag::RelationValue => match literal::read(table)? {
            Value::Relation(relation) => Ok(TableSource::Literal(relation)),
            _ => unreachable!("relation_value always reads to Value::Relation"),
        },
        other => Err(EngineError::clause_compilation(format!("{other:?} is not a table_expr"))),
    }
}

/// The shared row-entity variable every fragment for one SELECT binds
/// against.
pub fn entity_var() -> Var {
    Var("?e".to_string())
}

fn row_pattern(entity: &Var) -> WhereClause {
    WhereClause::Pattern {
        entity: entity.clone(),
        attr: "iql_type".to_string(),
        value: Value::Symbol("row".to_string()),
    }
}

/// `select_clause *` and `select_clause <list>` (§4.5 table).
pub fn compile_select_list(
    list_node: &Node,
    env: &Environment,
    counter: &Counter,
) -> Result<Fragment, EngineError> {
    let entity = entity_var();

    if list_node.only_leaf() == Some("*") {
        let pulled = counter.fresh("pulled");
        return Ok(Fragment {
            find: vec![pulled.clone()],
            keys: Vec::new(),
            in_vars: Vec::new(),
            inputs: Vec::new(),
            where_clauses: vec![
                row_pattern(&entity),
                WhereClause::Pull { result: pulled, entity, spec: PullSpec::All },
            ],
        });
    }

    let dbid = counter.fresh("dbid");
    let base = Fragment {
        find: vec![dbid.clone()],
        keys: vec!["db_id".to_string()],
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![
            row_pattern(&entity),
            WhereClause::GetElse {
                result: dbid,
                entity: entity.clone(),
                attr: "db_id".to_string(),
                default: Value::NoValue,
            },
        ],
    };

    let mut fragments = vec![base];
    for selection in list_node.child_nodes() {
        fragments.push(compile_selection(selection, &entity, env, counter)?);
    }
    Ok(Fragment::merge_all(fragments))
}

fn compile_selection(
    node: &Node,
    entity: &Var,
    env: &Environment,
    counter: &Counter,
) -> Result<Fragment, EngineError> {
    match node.tag {
        Tag::ColumnSelection => compile_column_selection(node, entity, counter),
        Tag::RowidSelection => compile_rowid_selection(node, entity, counter),
        Tag::ProbabilityClause | Tag::LogpdfClause => {
            compile_density_selection(node, entity, env, counter)
        }
        other => Err(EngineError::clause_compilation(format!("{other:?} is not a selection"))),
    }
}

/// `column_selection`: binds a generated variable via
/// `get_else($, ?e, column, NO_VALUE)`; key = column (or alias).
fn compile_column_selection(node: &Node, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    let mut names = node.child_nodes();
    let column_node = names.next().ok_or_else(|| EngineError::clause_compilation("column_selection missing name"))?;
    let column = eval::name(column_node)?;
    let alias = names.next().map(eval::name).transpose()?.unwrap_or_else(|| column.clone());

    let var = counter.fresh("col");
    Ok(Fragment {
        find: vec![var.clone()],
        keys: vec![alias],
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![WhereClause::GetElse {
            result: var,
            entity: entity.clone(),
            attr: column,
            default: Value::NoValue,
        }],
    })
}

/// `rowid_selection`: surfaces the row's synthetic `db_id` identity under
/// the `rowid` key (or its alias).
fn compile_rowid_selection(node: &Node, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    let alias = node.get(Tag::Name).map(eval::name).transpose()?.unwrap_or_else(|| "rowid".to_string());
    let var = counter.fresh("rowid");
    Ok(Fragment {
        find: vec![var.clone()],
        keys: vec![alias],
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![WhereClause::GetElse {
            result: var,
            entity: entity.clone(),
            attr: "db_id".to_string(),
            default: Value::NoValue,
        }],
    })
}

/// `logpdf_clause`/`probability_clause`: the row-event protocol (§4.5.1)
/// plus a `logpdf` (and, for `PROBABILITY`, `exp`) predicate call.
fn compile_density_selection(
    node: &Node,
    entity: &Var,
    env: &Environment,
    counter: &Counter,
) -> Result<Fragment, EngineError> {
    let events = node
        .get(Tag::EventList)
        .ok_or_else(|| EngineError::clause_compilation("density clause missing event_list"))?;
    let model_node = node.child_nodes().find(|n| {
        !matches!(n.tag, Tag::EventList | Tag::Name)
    });
    let gpm = match model_node {
        Some(m) => eval::eval_model(m, env)?,
        None => match env.get(crate::env::DEFAULT_MODEL)? {
            Value::Gpm(g) => g.clone(),
            _ => return Err(EngineError::clause_compilation("default model is not a GPM")),
        },
    };

    let (target_var, mut where_clauses) = compile_event_list(events, entity, counter)?;
    let constraints_var = counter.fresh("empty");
    where_clauses.push(WhereClause::Ground { result: constraints_var.clone(), value: Value::Row(Default::default()) });

    let density_var = counter.fresh("density");
    where_clauses.push(WhereClause::Predicate {
        op: "logpdf".to_string(),
        args: vec![Arg::Const(Value::Gpm(gpm)), Arg::Var(target_var), Arg::Var(constraints_var)],
        result: Some(density_var.clone()),
    });

    let result_var = if node.tag == Tag::ProbabilityClause {
        let prob_var = counter.fresh("prob");
        where_clauses.push(WhereClause::Predicate {
            op: "exp".to_string(),
            args: vec![Arg::Var(density_var)],
            result: Some(prob_var.clone()),
        });
        prob_var
    } else {
        density_var
    };

    let alias = node.get(Tag::Name).map(eval::name).transpose()?.unwrap_or_else(|| {
        if node.tag == Tag::ProbabilityClause { "probability".to_string() } else { "density".to_string() }
    });

    Ok(Fragment {
        find: vec![result_var],
        keys: vec![alias],
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses,
    })
}

/// The row-event protocol (§4.5.1): compiles an `event_list` into the three
/// `where` entries that bind a single merged row variable. Under this
/// grammar (§4.1: only equality and binop events, no bare column-name
/// events) the "row clause" reduces to `pull($,[*],?e)` when the list opens
/// with `*`, and to `ground {}` otherwise — see `DESIGN.md`.
pub fn compile_event_list(node: &Node, entity: &Var, counter: &Counter) -> Result<(Var, Vec<WhereClause>), EngineError> {
    let mut clauses = Vec::new();

    let row_var = counter.fresh("row");
    if eval::event_list_has_star(node) {
        clauses.push(WhereClause::Pull { result: row_var.clone(), entity: entity.clone(), spec: PullSpec::All });
    } else {
        clauses.push(WhereClause::Ground { result: row_var.clone(), value: Value::Row(Default::default()) });
    }

    let binding_row = eval::eval_event_list_as_row(node)?;
    let binding_var = counter.fresh("binding");
    clauses.push(WhereClause::Ground { result: binding_var.clone(), value: Value::Row(binding_row) });

    let merged_var = counter.fresh("merged");
    clauses.push(WhereClause::Merge { result: merged_var.clone(), a: row_var, b: binding_var });

    Ok((merged_var, clauses))
}

/// `where_clause` / `and_condition`: merge of children.
pub fn compile_condition(node: &Node, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    match node.tag {
        Tag::WhereClause => {
            let inner = node.only_child().ok_or_else(|| EngineError::clause_compilation("where_clause empty"))?;
            compile_condition(inner, entity, counter)
        }
        Tag::AndCondition => {
            let parts = node
                .child_nodes()
                .map(|c| compile_condition(c, entity, counter))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Fragment::merge_all(parts))
        }
        Tag::OrCondition => {
            let mut branches = Vec::new();
            for child in node.child_nodes() {
                branches.push(compile_condition(child, entity, counter)?.where_clauses);
            }
            let bound = vec![entity.clone()];
            Ok(Fragment {
                find: Vec::new(),
                keys: Vec::new(),
                in_vars: Vec::new(),
                inputs: Vec::new(),
                where_clauses: vec![WhereClause::OrJoin { bound, branches }],
            })
        }
        Tag::PresenceCondition | Tag::AbsenceCondition => {
            let col_node = node.only_child().ok_or_else(|| EngineError::clause_compilation("presence/absence missing column"))?;
            let column = eval::name(col_node)?;
            compile_presence_absence(node.tag == Tag::PresenceCondition, column, entity, counter)
        }
        Tag::EqualityCondition => {
            let mut children = node.child_nodes();
            let col_node = children.next().ok_or_else(|| EngineError::clause_compilation("equality_condition missing column"))?;
            let value_node = children.next().ok_or_else(|| EngineError::clause_compilation("equality_condition missing value"))?;
            let column = eval::name(col_node)?;
            let value = literal::read(value_node)?;
            compile_equality(column, value, entity, counter)
        }
        Tag::PredicateCondition => {
            let mut children = node.child_nodes();
            let col_node = children.next().ok_or_else(|| EngineError::clause_compilation("predicate_condition missing column"))?;
            let op_node = children.next().ok_or_else(|| EngineError::clause_compilation("predicate_condition missing op"))?;
            let value_node = children.next().ok_or_else(|| EngineError::clause_compilation("predicate_condition missing value"))?;
            let column = eval::name(col_node)?;
            let op = op_node.only_leaf().ok_or_else(|| EngineError::clause_compilation("predicate_expr missing op text"))?.to_string();
            let value = literal::read(value_node)?;
            compile_predicate(column, op, value, entity, counter)
        }
        other => Err(EngineError::clause_compilation(format!("{other:?} is not a condition"))),
    }
}

fn compile_presence_absence(present: bool, column: String, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    let var = counter.fresh("v");
    let op = if present { "!=" } else { "=" };
    Ok(Fragment {
        find: Vec::new(),
        keys: Vec::new(),
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![
            WhereClause::GetElse { result: var.clone(), entity: entity.clone(), attr: column, default: Value::NoValue },
            WhereClause::Predicate {
                op: op.to_string(),
                args: vec![Arg::Var(var), Arg::Const(Value::NoValue)],
                result: None,
            },
        ],
    })
}

fn compile_equality(column: String, value: Value, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    let var = counter.fresh("v");
    Ok(Fragment {
        find: Vec::new(),
        keys: Vec::new(),
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![
            WhereClause::GetElse { result: var.clone(), entity: entity.clone(), attr: column, default: Value::NoValue },
            WhereClause::Predicate { op: "=".to_string(), args: vec![Arg::Var(var), Arg::Const(value)], result: None },
        ],
    })
}

fn compile_predicate(column: String, op: String, value: Value, entity: &Var, counter: &Counter) -> Result<Fragment, EngineError> {
    let var = counter.fresh("v");
    Ok(Fragment {
        find: Vec::new(),
        keys: Vec::new(),
        in_vars: Vec::new(),
        inputs: Vec::new(),
        where_clauses: vec![
            WhereClause::GetElse { result: var.clone(), entity: entity.clone(), attr: column, default: Value::NoValue },
            WhereClause::Predicate {
                op: "!=".to_string(),
                args: vec![Arg::Var(var.clone()), Arg::Const(Value::NoValue)],
                result: None,
            },
            WhereClause::Predicate { op, args: vec![Arg::Var(var), Arg::Const(value)], result: None },
        ],
    })
}


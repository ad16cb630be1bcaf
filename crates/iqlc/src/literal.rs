//! Literal reader (§4.2): maps literal parse-tree sub-trees to runtime
//! [`Value`]s.

use iqlc_parser::{Node, Tag};

use crate::error::EngineError;
use crate::value::{Relation, Row, Value};

/// Reads a literal sub-tree. Callers that need a specific shape (a symbol
/// name, a variable list) should prefer the narrower helpers in `eval`;
/// this is the general entry point used wherever §4.2 applies.
pub fn read(node: &Node) -> Result<Value, EngineError> {
    match node.tag {
        Tag::Bool => Ok(Value::Bool(leaf(node)? == "true")),
        Tag::Int | Tag::Nat => {
            let text = leaf(node)?;
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EngineError::clause_compilation(format!("malformed int `{text}`")))
        }
        Tag::Float => {
            let text = leaf(node)?;
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| EngineError::clause_compilation(format!("malformed float `{text}`")))
        }
        Tag::String => Ok(Value::String(leaf(node)?.to_string())),
        Tag::SimpleSymbol => Ok(Value::Symbol(leaf(node)?.to_string())),
        Tag::Null => Ok(Value::NoValue),
        Tag::ValueList => {
            let values = node.child_nodes().map(read).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Tag::ValueListsFull => {
            let lists = node.child_nodes().map(read).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(lists))
        }
        Tag::ValueListsSparse => Ok(Value::List(read_sparse(node)?)),
        Tag::RelationValue => read_relation(node),
        other => Err(EngineError::clause_compilation(format!("{:?}", other))),
    }
}

fn leaf(node: &Node) -> Result<&str, EngineError> {
    node.only_leaf()
        .ok_or_else(|| EngineError::clause_compilation(format!("{:?} has no leaf text", node.tag)))
}

/// `value_lists_sparse`: `(index, value_list)` pairs → a dense sequence of
/// length `max(index)+1`; positions not listed read back as the empty
/// sequence (§8 invariant 2).
fn read_sparse(node: &Node) -> Result<Vec<Value>, EngineError> {
    let mut entries = Vec::new();
    for entry in node.child_nodes() {
        let idx_node = entry
            .get(Tag::Nat)
            .ok_or_else(|| EngineError::clause_compilation("sparse_entry missing index"))?;
        let idx: usize = leaf(idx_node)?
            .parse()
            .map_err(|_| EngineError::clause_compilation("sparse_entry index not a nat"))?;
        let list_node = entry
            .get(Tag::ValueList)
            .ok_or_else(|| EngineError::clause_compilation("sparse_entry missing value_list"))?;
        entries.push((idx, read(list_node)?));
    }
    let max_index = entries.iter().map(|(i, _)| *i).max().unwrap_or(0);
    let mut dense = vec![Value::List(Vec::new()); max_index + 1];
    for (idx, value) in entries {
        dense[idx] = value;
    }
    Ok(dense)
}

/// `relation_value`: `(col₁, …) VALUES …` → rows are `zip(cols, values)`,
/// carrying `columns = cols`.
fn read_relation(node: &Node) -> Result<Value, EngineError> {
    let columns_node = node
        .get(Tag::VariableList)
        .ok_or_else(|| EngineError::clause_compilation("relation_value missing columns"))?;
    let columns: Vec<String> = columns_node
        .child_nodes()
        .map(|n| leaf(n).map(str::to_string))
        .collect::<Result<_, _>>()?;

    let values_node = node
        .child_nodes()
        .find(|n| matches!(n.tag, Tag::ValueListsFull | Tag::ValueListsSparse))
        .ok_or_else(|| EngineError::clause_compilation("relation_value missing VALUES"))?;
    let value_lists = match read(values_node)? {
        Value::List(lists) => lists,
        _ => unreachable!("ValueListsFull/ValueListsSparse always read to Value::List"),
    };

    let rows = value_lists
        .into_iter()
        .map(|list| {
            let values = match list {
                Value::List(values) => values,
                other => vec![other],
            };
            columns
                .iter()
                .cloned()
                .zip(values)
                .collect::<Row>()
        })
        .collect();

    Ok(Value::Relation(Relation::new(rows, columns)))
}

#[cfg(test)]
mod test {
    use super::*;
    use iqlc_parser::parse;

    fn values_node(query: &str, path: &[Tag]) -> Node {
        let tree = parse(query).unwrap();
        tree.get_in(path).unwrap().clone()
    }

    #[test]
    fn reads_scalars() {
        let tree = parse("SELECT x FROM data WHERE y = 1").unwrap();
        let cond = tree.get(Tag::WhereClause).unwrap().only_child().unwrap();
        let val = cond.get(Tag::Int).unwrap();
        assert_eq!(read(val).unwrap(), Value::Int(1));
    }

    #[test]
    fn reads_sparse_value_lists_with_gaps() {
        let node = values_node(
            "INSERT INTO data VALUES 0: (1, 2), 3: (4, 5)",
            &[Tag::ValueListsSparse],
        );
        let Value::List(dense) = read(&node).unwrap() else { panic!("expected list") };
        assert_eq!(dense.len(), 4);
        assert_eq!(dense[0], Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(dense[1], Value::List(vec![]));
        assert_eq!(dense[2], Value::List(vec![]));
        assert_eq!(dense[3], Value::List(vec![Value::Int(4), Value::Int(5)]));
    }

    #[test]
    fn reads_relation_value_into_rows() {
        let node = values_node(
            "SELECT * FROM (x, y) VALUES (1, 2), (3, 4)",
            &[Tag::FromClause],
        );
        let table = node.only_child().unwrap();
        let Value::Relation(relation) = read_relation(table).unwrap() else {
            panic!("expected relation")
        };
        assert_eq!(relation.columns, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(relation.rows.len(), 2);
        assert_eq!(relation.rows[0].get("x"), Some(&Value::Int(1)));
        assert_eq!(relation.rows[1].get("y"), Some(&Value::Int(4)));
    }
}

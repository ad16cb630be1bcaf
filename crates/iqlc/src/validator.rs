//! Validator (§4.3): whole-tree semantic checks that run before planning.
//! Returns the first error encountered in document order.

use iqlc_parser::{unparse, Node, Tag};

use crate::env::DEFAULT_TABLE;
use crate::error::{EngineError, WithErrorInfo};

pub fn validate(tree: &Node) -> Result<(), EngineError> {
    generated_table_without_limit(tree)?;
    non_data_table_reference(tree)?;
    Ok(())
}

/// If a top-level SELECT's `from_clause` resolves to a `generated_table_expr`
/// and no `limit_clause` is present, fail: an infinite simulated stream
/// would not terminate.
fn generated_table_without_limit(tree: &Node) -> Result<(), EngineError> {
    if tree.tag != Tag::SelectExpr {
        return Ok(());
    }
    let is_generated = tree
        .get(Tag::FromClause)
        .and_then(|f| f.only_child())
        .map(|t| t.tag == Tag::GeneratedTableExpr)
        .unwrap_or(false);
    if is_generated && tree.get(Tag::LimitClause).is_none() {
        let offending = tree.get(Tag::FromClause).and_then(|f| f.only_child()).unwrap_or(tree);
        return Err(EngineError::validation("generated_table_without_limit").with_node(unparse(offending)));
    }
    Ok(())
}

/// Any SELECT whose `from_clause` references a named table other than
/// `data` fails — searched over the entire tree, including nested SELECTs
/// (§4.3, §9 Open Questions: the planner only honors this at the top
/// level, so this walk is what actually enforces the restriction on nested
/// queries).
fn non_data_table_reference(tree: &Node) -> Result<(), EngineError> {
    for node in preorder(tree) {
        if node.tag == Tag::FromClause {
            if let Some(table) = node.only_child() {
                if table.tag == Tag::Ref {
                    if let Some(name) = table.only_leaf() {
                        if name != DEFAULT_TABLE {
                            return Err(EngineError::validation("non_data_table_reference")
                                .with_node(unparse(table)));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn preorder(node: &Node) -> Vec<&Node> {
    let mut out = vec![node];
    for child in node.child_nodes() {
        out.extend(preorder(child));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use iqlc_parser::parse;

    #[test]
    fn rejects_generated_table_without_limit() {
        let tree = parse("SELECT * FROM (GENERATE x UNDER model)").unwrap();
        assert!(validate(&tree).is_err());
    }

    #[test]
    fn accepts_generated_table_with_limit() {
        let tree = parse("SELECT * FROM (GENERATE x UNDER model) LIMIT 2").unwrap();
        assert!(validate(&tree).is_ok());
    }

    #[test]
    fn rejects_non_data_table() {
        let tree = parse("SELECT * FROM other_table").unwrap();
        assert!(validate(&tree).is_err());
    }

    #[test]
    fn accepts_plain_data_query() {
        let tree = parse("SELECT * FROM data WHERE x = 1").unwrap();
        assert!(validate(&tree).is_ok());
    }
}

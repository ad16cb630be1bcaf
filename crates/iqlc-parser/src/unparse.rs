use crate::node::{Child, Node};

/// Canonical string rendering of a parse tree: the concatenation of every
/// leaf's raw text, in source order, single-space separated.
///
/// Used to produce readable error messages that reference the offending
/// sub-expression without needing to re-slice the original source string.
pub fn unparse(node: &Node) -> String {
    let mut out = Vec::new();
    collect_leaves(node, &mut out);
    out.join(" ")
}

fn collect_leaves<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    for child in node.children() {
        match child {
            Child::Leaf(text) => out.push(text.as_str()),
            Child::Node(n) => collect_leaves(n, out),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse;

    #[test]
    fn unparses_a_simple_select() {
        let tree = parse("SELECT x FROM data WHERE y = 1").unwrap();
        assert_eq!(unparse(&tree), "x data y 1");
    }

    #[test]
    fn unparses_a_select_star() {
        let tree = parse("SELECT * FROM data").unwrap();
        assert_eq!(unparse(&tree), "* data");
    }
}

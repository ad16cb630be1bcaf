//! # iqlc-parser
//!
//! Lexer and grammar for the IQL-SQL query language: turns a query string
//! into a [`Node`], the generic "tag + children" parse tree that the rest
//! of the compiler (literal reader, validator, evaluator, clause compiler)
//! dispatches on by [`Tag`].
//!
//! ```
//! use iqlc_parser::parse;
//!
//! let tree = parse("select x from data where y is not null").unwrap();
//! assert_eq!(tree.tag, iqlc_parser::Tag::SelectExpr);
//! ```

#![forbid(unsafe_code)]

use std::ops::Range;

use chumsky::Parser;
use chumsky::Stream;

pub mod error;
mod grammar;
mod lexer;
mod node;
pub mod span;
mod token;
mod unparse;

pub use error::{ParseFailure, ParseFailures};
pub use node::{Child, Node, Tag};
pub use span::Span;
pub use token::{Token, TokenKind};
pub use unparse::unparse;

/// Parse a single IQL-SQL query (or insert statement) into its parse tree.
///
/// On failure, returns every [`ParseFailure`] chumsky collected, each
/// carrying the byte position it occurred at and the set of productions
/// that would have been accepted there.
pub fn parse(source: &str) -> Result<Node, ParseFailures> {
    let tokens = lexer::lex(source).map_err(lex_errors_to_failures)?;
    log::trace!("lexed {} tokens", tokens.len());
    let eoi = tokens.last().map(|t| t.span.end).unwrap_or(0);

    let stream = token_stream(tokens, eoi);
    grammar::statement()
        .then_ignore(chumsky::primitive::end())
        .parse(stream)
        .map_err(parse_errors_to_failures)
}

fn token_stream(
    tokens: Vec<Token>,
    eoi: usize,
) -> Stream<'static, TokenKind, Range<usize>, std::vec::IntoIter<(TokenKind, Range<usize>)>> {
    let items: Vec<(TokenKind, Range<usize>)> = tokens
        .into_iter()
        .map(|t| (t.kind, t.span.into()))
        .collect();
    Stream::from_iter(eoi..eoi, items.into_iter())
}

fn lex_errors_to_failures(errs: Vec<chumsky::error::Simple<char>>) -> ParseFailures {
    errs.into_iter()
        .map(|e| {
            let span: Range<usize> = e.span();
            let expected = e
                .expected()
                .map(|o| match o {
                    Some(c) => c.to_string(),
                    None => "end of input".to_string(),
                })
                .collect();
            let found = e.found().map(|c| c.to_string());
            ParseFailure::new(span.into(), expected, found)
        })
        .collect()
}

fn parse_errors_to_failures(errs: Vec<chumsky::error::Simple<TokenKind>>) -> ParseFailures {
    errs.into_iter()
        .map(|e| {
            let span: Range<usize> = e.span();
            let expected = e
                .expected()
                .map(|o| match o {
                    Some(t) => format!("{t:?}"),
                    None => "end of input".to_string(),
                })
                .collect();
            let found = e.found().map(|t| format!("{t:?}"));
            ParseFailure::new(span.into(), expected, found)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_select_star() {
        let tree = parse("SELECT * FROM data").unwrap();
        assert_eq!(tree.tag, Tag::SelectExpr);
        assert!(tree.get(Tag::SelectList).is_some());
        assert!(tree.get(Tag::FromClause).is_some());
    }

    #[test]
    fn parses_order_by_and_limit() {
        let tree = parse("SELECT x FROM data ORDER BY x DESC LIMIT 1").unwrap();
        let order = tree.get(Tag::OrderByClause).unwrap();
        assert!(order.get(Tag::Descending).is_some());
        let limit = tree.get(Tag::LimitClause).unwrap();
        assert_eq!(limit.get_in(&[]).is_none(), true);
        assert_eq!(limit.only_child().unwrap().tag, Tag::Nat);
    }

    #[test]
    fn parses_probability_clause() {
        let tree = parse("SELECT PROBABILITY OF x=1 UNDER model AS p FROM data LIMIT 1").unwrap();
        let list = tree.get(Tag::SelectList).unwrap();
        let clause = list.get(Tag::ProbabilityClause).unwrap();
        assert!(clause.get(Tag::EventList).is_some());
        assert_eq!(clause.get(Tag::Name).unwrap().only_leaf(), Some("p"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("SELECT FROM WHERE").is_err());
    }

    #[test]
    fn parses_relation_literal_as_table_source() {
        let tree = parse("SELECT * FROM (x, y) VALUES (1, 2), (3, 4)").unwrap();
        let table = tree.get_in(&[Tag::FromClause]).unwrap().only_child().unwrap();
        assert_eq!(table.tag, Tag::RelationValue);
        assert_eq!(table.get(Tag::VariableList).unwrap().child_nodes().count(), 2);
    }

    #[test]
    fn parses_sparse_insert() {
        let tree = parse("INSERT INTO data VALUES 0: (1, 2), 3: (4, 5)").unwrap();
        let values = tree.get(Tag::ValueListsSparse).unwrap();
        assert_eq!(values.child_nodes().count(), 2);
    }
}

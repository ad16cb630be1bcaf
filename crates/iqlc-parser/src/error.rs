use std::fmt::Debug;

use itertools::Itertools;

use crate::span::Span;

/// A parse failure: the position it was detected at, plus the set of
/// productions the parser would have accepted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub span: Span,
    pub expected: Vec<String>,
    pub found: Option<String>,
}

impl ParseFailure {
    pub fn new(span: Span, expected: Vec<String>, found: Option<String>) -> Self {
        ParseFailure {
            span,
            expected,
            found,
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let found = self.found.as_deref().unwrap_or("end of input");
        if self.expected.is_empty() {
            write!(f, "unexpected {found} at {:?}", self.span)
        } else {
            write!(
                f,
                "expected one of {}, found {found} at {:?}",
                self.expected.iter().unique().join(", "),
                self.span
            )
        }
    }
}

impl std::error::Error for ParseFailure {}

pub type ParseFailures = Vec<ParseFailure>;

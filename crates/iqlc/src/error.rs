//! Error handling (§7), in the same `Error { reason, .. }` shape the parser
//! crate's [`iqlc_parser::ParseFailure`] follows: one error type, one reason
//! enum naming the kind, `WithErrorInfo` to attach context as the error
//! travels back up the call stack.

use std::fmt;

use iqlc_parser::ParseFailures;

#[derive(Debug, Clone)]
pub struct EngineError {
    pub reason: Reason,
    pub node: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Reason {
    /// Malformed input; carries the parser's failure positions/expected sets.
    ParseFailure(ParseFailures),
    /// A §4.3 validator rule was violated.
    Validation { rule: &'static str },
    /// An `env` lookup missed.
    UnboundName { name: String, available: Vec<String> },
    /// An unrecognized node tag appeared in a context requiring one.
    ClauseCompilation { tag: String },
    /// A GPM implementation raised an error; propagated unchanged.
    Provider(String),
}

impl EngineError {
    pub fn new(reason: Reason) -> Self {
        EngineError { reason, node: None }
    }

    pub fn parse_failure(failures: ParseFailures) -> Self {
        EngineError::new(Reason::ParseFailure(failures))
    }

    pub fn validation(rule: &'static str) -> Self {
        EngineError::new(Reason::Validation { rule })
    }

    pub fn unbound_name(name: impl Into<String>, available: Vec<String>) -> Self {
        EngineError::new(Reason::UnboundName { name: name.into(), available })
    }

    pub fn clause_compilation(tag: impl Into<String>) -> Self {
        EngineError::new(Reason::ClauseCompilation { tag: tag.into() })
    }

    pub fn provider(message: impl Into<String>) -> Self {
        EngineError::new(Reason::Provider(message.into()))
    }

    /// Is this an `incorrect_input` error (§6 Error envelopes): parse
    /// failures and validation failures are user errors; the rest are not.
    pub fn is_incorrect_input(&self) -> bool {
        matches!(self.reason, Reason::ParseFailure(_) | Reason::Validation { .. })
    }
}

pub trait WithErrorInfo: Sized {
    fn with_node(self, node: impl Into<String>) -> Self;
}

impl WithErrorInfo for EngineError {
    fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

impl<T> WithErrorInfo for Result<T, EngineError> {
    fn with_node(self, node: impl Into<String>) -> Self {
        self.map_err(|e| e.with_node(node))
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ParseFailure(failures) => {
                write!(f, "parse failure: ")?;
                for (i, failure) in failures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{failure}")?;
                }
                Ok(())
            }
            Reason::Validation { rule } => write!(f, "incorrect input: rule `{rule}` violated"),
            Reason::UnboundName { name, available } => {
                write!(f, "unbound name `{name}`, available: {}", available.join(", "))
            }
            Reason::ClauseCompilation { tag } => {
                write!(f, "unsupported tag `{tag}` in this context")
            }
            Reason::Provider(message) => write!(f, "provider error: {message}"),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(node) = &self.node {
            write!(f, " (in `{node}`)")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

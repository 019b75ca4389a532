//! Error types returned at the crate's public boundary.
//!
//! Small, hand-written error structs with their own [`Display`] impls rather
//! than a `thiserror`-generated mega-enum: [`GrammarError`] is a `what` +
//! `message` pair describing a malformed grammar, [`ParserError`] is a
//! position-carrying runtime fault, and [`CoreError`] is the thin `Result`
//! wrapper the six public entry points return.

use std::fmt::{Display, Formatter};

use crate::util::Position;

/// A structural defect in a grammar: an unresolved reference, a malformed
/// `CharSet`, or a recursion/precedence combination the invariants of
/// [the module doc][crate] forbid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    /// The group or definition the error concerns, e.g. `"expression"`.
    pub what: String,
    pub message: String,
}

impl GrammarError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn unknown_reference(referencing_group: &str, target: &str) -> Self {
        Self::new(
            referencing_group,
            format!("reference to undefined group '{}'", target),
        )
    }

    pub fn cross_grammar_reference(referencing_group: &str, target: &str) -> Self {
        Self::new(
            referencing_group,
            format!(
                "cross-grammar reference '{}' is reserved syntax and is not supported",
                target
            ),
        )
    }

    pub fn recursion_precedence_violation(group: &str, message: impl Into<String>) -> Self {
        Self::new(group, message.into())
    }

    pub fn malformed_char_set(group: &str) -> Self {
        Self::new(
            group,
            "a CharSet cannot specify both `All` and explicit entries",
        )
    }

    pub fn missing_attribute(what: &str, attribute: &'static str) -> Self {
        Self::new(what, format!("missing required attribute '{}'", attribute))
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GrammarError: {} - {}", self.what, self.message)
    }
}

impl std::error::Error for GrammarError {}

/// A fault inside the parser's own bookkeeping, e.g. a cache entry that was
/// never marked "evaluating" before being finalized. Carries the stream
/// position and, once a [`Position`] can be derived, line/column detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub position: usize,
    pub message: String,
    pub location: Option<Position>,
}

impl ParserError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Position) -> Self {
        self.location = Some(location);
        self
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "ParserError at {}: {}", loc, self.message),
            None => write!(f, "ParserError at offset {}: {}", self.position, self.message),
        }
    }
}

impl std::error::Error for ParserError {}

/// Error surface shared by the six public entry points (§6.1). A failed
/// *match attempt* is never represented here — it is `Ok(None)`/`Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    Grammar(GrammarError),
    Parser(ParserError),
    /// Reserved for argument-validation entry points that Rust's type system
    /// cannot already make unrepresentable (see SPEC_FULL.md §6.1).
    EmptyInput,
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Grammar(e) => Display::fmt(e, f),
            CoreError::Parser(e) => Display::fmt(e, f),
            CoreError::EmptyInput => write!(f, "ArgumentError: input must not be empty"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<GrammarError> for CoreError {
    fn from(e: GrammarError) -> Self {
        CoreError::Grammar(e)
    }
}

impl From<ParserError> for CoreError {
    fn from(e: ParserError) -> Self {
        CoreError::Parser(e)
    }
}

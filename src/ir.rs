//! Grammar intermediate representation (§3.2, §3.3).
//!
//! Per Design Note §9 the ~16 IR node kinds are a closed Rust enum
//! (`ExprKind`) rather than the dynamically-typed "Node whose sole attribute
//! key names its kind" trick the distilled spec describes — that
//! representation is a consequence of the source's dynamic typing, not
//! something worth reproducing in a statically typed language. `Item`
//! (`item.rs`) remains the universal tree for parsed *input*; `Expr` is the
//! separate, strongly typed tree for the *grammar* itself.
//!
//! Back-edges for left recursion are keyed by [`ExprId`], a stable arena-style
//! identifier assigned once per `Expr` node at construction time, rather than
//! by pointer/object identity (Design Note §9) — `Expr` values are ordinary
//! owned trees, freely cloned by the optimizer's rewrite passes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::charset::CharSet;

/// A process-wide monotonically increasing counter. Grammars are built once
/// (§3.6), so a simple atomic counter is sufficient — no reuse or recycling
/// of ids is required within a grammar's lifetime.
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn fresh() -> Self {
        ExprId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A single char or inclusive range, as written inside a `{…}` set literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharSetEntry {
    Char(char),
    Range(char, char),
}

/// The payload of a `CharSet` expression (§3.3, §6.3): either the
/// wildcard `{?}` (`All`) or an explicit, optionally negated, entry list.
#[derive(Debug, Clone, PartialEq)]
pub enum CharSetSpec {
    All,
    Entries(Vec<CharSetEntry>),
}

/// One of the ~16 grammar IR node kinds (§3.3).
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A whitespace-tolerant quoted literal, expanded by `QuoteExpander`
    /// (§4.6) before the parser ever sees it.
    Quote(String),
    /// An exact string literal (`'...'`).
    StringLit(String),
    Char(char),
    Range(char, char),
    CharSet { spec: CharSetSpec, negate: bool },
    Reference(String),
    Group(Box<Expr>),
    Optional(Box<Expr>),
    Or(Vec<Expr>),
    Sequence(Vec<Expr>),
    Repeat {
        expr: Box<Expr>,
        from: u32,
        to: Option<u32>,
    },
    Separated {
        expr: Box<Expr>,
        separator: Box<Expr>,
    },
    AndNot {
        expr: Box<Expr>,
        not_expr: Box<Expr>,
    },
    As {
        expr: Box<Expr>,
        value: String,
    },
    Declaration {
        name: String,
        expr: Box<Expr>,
    },
    Capture(Box<Expr>),
}

/// A grammar IR node: its kind plus a stable identity used for back-edge
/// bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: ExprId::fresh(),
            kind,
        }
    }

    pub fn group(inner: Expr) -> Expr {
        Expr::new(ExprKind::Group(Box::new(inner)))
    }

    pub fn optional(inner: Expr) -> Expr {
        Expr::new(ExprKind::Optional(Box::new(inner)))
    }

    pub fn sequence(items: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Sequence(items))
    }

    pub fn or(alts: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Or(alts))
    }

    pub fn reference(name: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Reference(name.into()))
    }

    pub fn capture(inner: Expr) -> Expr {
        Expr::new(ExprKind::Capture(Box::new(inner)))
    }

    pub fn declaration(name: impl Into<String>, inner: Expr) -> Expr {
        Expr::new(ExprKind::Declaration {
            name: name.into(),
            expr: Box::new(inner),
        })
    }

    pub fn quote(text: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Quote(text.into()))
    }

    pub fn string(text: impl Into<String>) -> Expr {
        Expr::new(ExprKind::StringLit(text.into()))
    }

    pub fn char(c: char) -> Expr {
        Expr::new(ExprKind::Char(c))
    }

    pub fn range(low: char, high: char) -> Expr {
        Expr::new(ExprKind::Range(low, high))
    }

    pub fn charset(entries: Vec<CharSetEntry>, negate: bool) -> Expr {
        Expr::new(ExprKind::CharSet {
            spec: CharSetSpec::Entries(entries),
            negate,
        })
    }

    pub fn charset_all() -> Expr {
        Expr::new(ExprKind::CharSet {
            spec: CharSetSpec::All,
            negate: false,
        })
    }

    pub fn repeat(inner: Expr, from: u32, to: Option<u32>) -> Expr {
        Expr::new(ExprKind::Repeat {
            expr: Box::new(inner),
            from,
            to,
        })
    }

    pub fn separated(inner: Expr, separator: Expr) -> Expr {
        Expr::new(ExprKind::Separated {
            expr: Box::new(inner),
            separator: Box::new(separator),
        })
    }

    pub fn and_not(inner: Expr, not_expr: Expr) -> Expr {
        Expr::new(ExprKind::AndNot {
            expr: Box::new(inner),
            not_expr: Box::new(not_expr),
        })
    }

    pub fn as_value(inner: Expr, value: impl Into<String>) -> Expr {
        Expr::new(ExprKind::As {
            expr: Box::new(inner),
            value: value.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::Left
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionType {
    /// `:=` — introduces an AST node wrapping the parsed result.
    Declaration,
    /// `=` — a helper rule whose result passes through unchanged.
    Helper,
}

/// Recursion classification bits, computed by the recursion analyzer
/// (§4.4). Represented as a plain bitmask (`u8`) rather than pulling in a
/// `bitflags` dependency for something this narrow.
pub type RecFlags = u8;

pub const REC_NON: RecFlags = 0b0_0000;
pub const REC_LEFT: RecFlags = 0b0_0001;
pub const REC_RIGHT: RecFlags = 0b0_0010;
pub const REC_FULL: RecFlags = 0b0_0100;
pub const REC_EXCLUSIVE: RecFlags = 0b0_1000;

pub fn is_recursive(flags: RecFlags) -> bool {
    flags & (REC_LEFT | REC_RIGHT | REC_FULL) != 0
}

pub fn is_left_recursive(flags: RecFlags) -> bool {
    flags & (REC_LEFT | REC_FULL) != 0
}

/// A per-group first-character approximation (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub char_set: CharSet,
    pub exclusive: bool,
}

impl Filter {
    pub fn new(char_set: CharSet, exclusive: bool) -> Self {
        Self { char_set, exclusive }
    }

    pub fn union(&self, other: &Filter) -> Filter {
        Filter {
            char_set: self.char_set.clone().unioned(&other.char_set),
            exclusive: self.exclusive && other.exclusive,
        }
    }
}

/// A single alternative of a named rule (§3.2).
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    /// `None` represents the distilled spec's `+∞` default: an
    /// unprecedented, necessarily non-recursive, "base case" alternative.
    pub precedence: Option<u32>,
    pub associativity: Associativity,
    pub def_type: DefinitionType,
    pub instance: Expr,
    pub recursiveness: RecFlags,
    pub filter: Option<Filter>,
}

impl Definition {
    pub fn is_left_recursive(&self) -> bool {
        is_left_recursive(self.recursiveness)
    }

    pub fn is_recursive(&self) -> bool {
        is_recursive(self.recursiveness)
    }

    /// Build a `:=` (AST-node-introducing) definition with default
    /// precedence (`None`, i.e. +∞) and `Left` associativity.
    pub fn declaration(name: impl Into<String>, instance: Expr) -> Definition {
        Definition {
            name: name.into(),
            precedence: None,
            associativity: Associativity::Left,
            def_type: DefinitionType::Declaration,
            instance,
            recursiveness: REC_NON,
            filter: None,
        }
    }

    /// Build a `=` (transparent helper) definition with default precedence.
    pub fn helper(name: impl Into<String>, instance: Expr) -> Definition {
        Definition {
            name: name.into(),
            precedence: None,
            associativity: Associativity::Left,
            def_type: DefinitionType::Helper,
            instance,
            recursiveness: REC_NON,
            filter: None,
        }
    }

    pub fn with_precedence(mut self, precedence: u32, associativity: Associativity) -> Definition {
        self.precedence = Some(precedence);
        self.associativity = associativity;
        self
    }
}

/// All definitions sharing a name (§3.2).
#[derive(Debug, Clone)]
pub struct DefinitionGroup {
    pub name: String,
    pub definitions: Vec<Definition>,
    /// Maps a back-reference `Expr`'s id to the minimum precedence at which
    /// that referencing alternative is allowed to recurse (§4.4).
    pub reference_min_precedents: HashMap<ExprId, u32>,
    pub recursiveness: RecFlags,
    pub filter: Option<Filter>,
}

impl DefinitionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
            reference_min_precedents: HashMap::new(),
            recursiveness: REC_NON,
            filter: None,
        }
    }

    pub fn is_left_recursive(&self) -> bool {
        is_left_recursive(self.recursiveness)
    }

    pub fn with_definitions(name: impl Into<String>, definitions: Vec<Definition>) -> Self {
        let mut group = DefinitionGroup::new(name);
        group.definitions = definitions;
        group
    }
}

#[derive(Debug, Clone)]
pub struct GrammarOptions {
    pub whitespace_rule: Option<String>,
    pub case_sensitive: bool,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        Self {
            whitespace_rule: None,
            case_sensitive: true,
        }
    }
}

/// A grammar as built from source, before optimization/analysis (§3.2).
#[derive(Debug, Clone)]
pub struct Grammar {
    pub groups: HashMap<String, DefinitionGroup>,
    pub root: String,
    pub options: GrammarOptions,
}

impl Grammar {
    pub fn group(&self, name: &str) -> Option<&DefinitionGroup> {
        self.groups.get(name)
    }

    pub fn from_groups(root: impl Into<String>, groups: Vec<DefinitionGroup>, options: GrammarOptions) -> Self {
        Self {
            groups: groups.into_iter().map(|g| (g.name.clone(), g)).collect(),
            root: root.into(),
            options,
        }
    }
}

/// A [`Grammar`] that has been through the recursion analyzer, the
/// first-set analyzer and the optimizer, and is safe to hand to the parser
/// (§3.2, §4.6). Construction is only possible via
/// [`crate::optimizer::optimize`].
#[derive(Debug, Clone)]
pub struct OptimizedGrammar(pub(crate) Grammar);

impl std::ops::Deref for OptimizedGrammar {
    type Target = Grammar;
    fn deref(&self) -> &Grammar {
        &self.0
    }
}

impl OptimizedGrammar {
    pub fn into_inner(self) -> Grammar {
        self.0
    }
}

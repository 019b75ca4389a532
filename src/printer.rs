//! Re-serializing an [`OptimizedGrammar`] back to grammar source text, and
//! [`std::fmt::Display`] for [`Item`] via the same `ptree` rendering
//! [`Item::print`] uses.
//!
//! The printed text is a round trip through the IR, not through the
//! original source bytes: the grammar's own declared name isn't retained
//! anywhere in [`Grammar`](crate::ir::Grammar), quote-literals have already
//! been expanded away by the optimizer by the time an `OptimizedGrammar`
//! exists, and every sub-expression is defensively parenthesized rather than
//! reproduced with its original, possibly parenthesis-free, spelling. Parsing
//! the output again with [`crate::parse_grammar_text`] yields a grammar
//! equivalent to the one that was printed.

use std::fmt::Write as _;

use crate::ir::{Associativity, CharSetEntry, CharSetSpec, DefinitionType, Expr, ExprKind, OptimizedGrammar};
use crate::item::{Item, ItemTree};

/// Re-serialize `grammar`'s definitions as grammar source text.
pub fn build_grammar_text(grammar: &OptimizedGrammar) -> String {
    let mut out = String::new();
    writeln!(out, "grammar Grammar").unwrap();
    if !grammar.options.case_sensitive {
        writeln!(out, "comparer: insensitive").unwrap();
    }
    if let Some(ws) = &grammar.options.whitespace_rule {
        writeln!(out, "whitespace: {}", ws).unwrap();
    }

    let mut names: Vec<&String> = grammar.groups.keys().collect();
    names.sort();
    names.sort_by_key(|n| *n != &grammar.root);
    for name in names {
        let group = grammar.groups.get(name).unwrap();
        for def in &group.definitions {
            let op = match def.def_type {
                DefinitionType::Declaration => ":=",
                DefinitionType::Helper => "=",
            };
            match def.precedence {
                Some(p) => {
                    let assoc = match def.associativity {
                        Associativity::Left => "L",
                        Associativity::Right => "R",
                    };
                    write!(out, "{} {} {} {} ", def.name, p, assoc, op).unwrap();
                }
                None => write!(out, "{} {} ", def.name, op).unwrap(),
            }
            write_expr(&mut out, &def.instance);
            writeln!(out).unwrap();
        }
    }
    out
}

fn escape_literal(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn write_char_entry(out: &mut String, entry: &CharSetEntry) {
    match entry {
        CharSetEntry::Char(c) => write!(out, "'{}'", escape_literal(&c.to_string(), '\'')).unwrap(),
        CharSetEntry::Range(lo, hi) => {
            write!(
                out,
                "'{}'..'{}'",
                escape_literal(&lo.to_string(), '\''),
                escape_literal(&hi.to_string(), '\'')
            )
            .unwrap();
        }
    }
}

/// Write `expr` as a self-contained atom, parenthesizing it if it wouldn't
/// otherwise parse back as one.
fn write_atom(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::StringLit(_)
        | ExprKind::Char(_)
        | ExprKind::Range(..)
        | ExprKind::CharSet { .. }
        | ExprKind::Reference(_)
        | ExprKind::Group(_) => write_expr(out, expr),
        _ => {
            out.push('(');
            write_expr(out, expr);
            out.push(')');
        }
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Quote(s) => write!(out, "\"{}\"", escape_literal(s, '"')).unwrap(),
        ExprKind::StringLit(s) => write!(out, "'{}'", escape_literal(s, '\'')).unwrap(),
        ExprKind::Char(c) => write!(out, "'{}'", escape_literal(&c.to_string(), '\'')).unwrap(),
        ExprKind::Range(lo, hi) => {
            write!(
                out,
                "'{}'..'{}'",
                escape_literal(&lo.to_string(), '\''),
                escape_literal(&hi.to_string(), '\'')
            )
            .unwrap();
        }
        ExprKind::CharSet { spec, negate } => {
            if *negate {
                out.push('!');
            }
            match spec {
                CharSetSpec::All => out.push_str("{?}"),
                CharSetSpec::Entries(entries) => {
                    out.push('{');
                    for (i, e) in entries.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        write_char_entry(out, e);
                    }
                    out.push('}');
                }
            }
        }
        ExprKind::Reference(name) => out.push_str(name),
        ExprKind::Group(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push(')');
        }
        ExprKind::Optional(inner) => {
            out.push('[');
            write_expr(out, inner);
            out.push(']');
        }
        ExprKind::Or(alts) => {
            for (i, alt) in alts.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                write_atom(out, alt);
            }
        }
        ExprKind::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_atom(out, item);
            }
        }
        ExprKind::Repeat { expr: inner, from, to } => {
            write_atom(out, inner);
            out.push('*');
            match (from, to) {
                (0, None) => {}
                (n, None) => write!(out, "{}..", n).unwrap(),
                (0, Some(m)) => write!(out, "0..{}", m).unwrap(),
                (n, Some(m)) if n == m => write!(out, "{}", n).unwrap(),
                (n, Some(m)) => write!(out, "{}..{}", n, m).unwrap(),
            }
        }
        ExprKind::Separated { expr: inner, separator } => {
            write_atom(out, inner);
            out.push_str(" ^ ");
            write_atom(out, separator);
        }
        ExprKind::AndNot { expr: inner, not_expr } => {
            write_atom(out, inner);
            out.push_str(" &! ");
            write_atom(out, not_expr);
        }
        ExprKind::As { expr: inner, value } => {
            write_atom(out, inner);
            write!(out, " as '{}'", escape_literal(value, '\'')).unwrap();
        }
        ExprKind::Declaration { name, expr: inner } => {
            write!(out, "{}: ", name).unwrap();
            write_atom(out, inner);
        }
        ExprKind::Capture(inner) => {
            write_atom(out, inner);
            out.push('+');
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buf = Vec::new();
        ptree::write_tree(&ItemTree::from(self), &mut buf).map_err(|_| std::fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl std::fmt::Display for OptimizedGrammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&build_grammar_text(self))
    }
}

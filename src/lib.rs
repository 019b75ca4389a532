//! A self-describing grammar language and packrat parser generator.
//!
//! A grammar is itself written in the language this crate parses first: one
//! small bootstrap grammar (`bootstrap.rs`) describes the surface syntax of
//! *all* grammars, including itself, and every user grammar is built by
//! running that bootstrap grammar's own parser over the user's grammar text.
//! The result is an [`ir::Grammar`] — a set of named [`ir::DefinitionGroup`]s,
//! each a set of [`ir::Definition`] alternatives built from the closed
//! [`ir::ExprKind`] node set — which is then analyzed for left recursion
//! (`recursion.rs`), optimized (`optimizer.rs`) and handed to the packrat
//! parser (`parser.rs`) to run against arbitrary input.
//!
//! # Example
//!
//! ```
//! let grammar = gramscript::parse_grammar_text(
//!     "grammar Csv\nRow := field ^ ','\nfield = !{','}*+\n",
//! ).expect("grammar should be well formed");
//! let row = gramscript::parse_text(&grammar, "a,b,c")
//!     .expect("input should parse without error")
//!     .expect("input should match the grammar");
//! assert!(row.is_node());
//! ```
//!
//! # Design
//!
//! - [`item::Item`] is the one tree shape used both for a grammar's own
//!   structure while it is still text, and for everything a parse produces:
//!   a `Text` leaf, an ordered `List`, or an attribute-bearing `Node` (§3.1).
//! - [`ir::ExprKind`] is the grammar's own intermediate representation, kept
//!   as a closed Rust enum rather than reusing `Item` as the IR too — see the
//!   module doc on `ir` for why.
//! - Left recursion is eliminated at parse time, not at grammar-build time,
//!   by growing a memoized "seed" result for a left-recursive group until a
//!   round fails to extend it further (`parser.rs`, §4.7.3), the approach
//!   commonly credited to Warth et al.
//! - Errors follow a three-way split (§7): an ordinary failed match is never
//!   an error — it surfaces as `Ok(None)`/`Ok(false)` — while a malformed
//!   grammar is a [`error::GrammarError`] and a genuine internal parser fault
//!   is a [`error::ParserError`]; [`error::CoreError`] unifies the latter two
//!   at the six public entry points below.

pub mod charset;
pub mod error;
pub mod filter;
pub mod ir;
pub mod item;
pub mod recursion;
pub mod stream;
pub mod util;

mod bootstrap;
mod builder;
mod optimizer;
mod parser;
mod printer;

pub use error::{CoreError, GrammarError, ParserError};
pub use ir::{DefinitionGroup, Grammar, OptimizedGrammar};
pub use item::Item;
pub use printer::build_grammar_text;
pub use stream::{StrStream, TokenStream};

/// Build a grammar from its textual definition (§4.1, §6.1).
///
/// Runs the bootstrap grammar's own parser over `text`, then the recursion
/// analyzer and the optimizer, returning a grammar ready to parse other
/// input with. A malformed grammar — an unresolved reference, a recursion
/// that violates the precedence invariants of §3.4, text that does not
/// parse as a grammar at all — is a [`GrammarError`]; this call never fails
/// with [`ParserError`] or [`CoreError::EmptyInput`].
pub fn parse_grammar_text(text: &str) -> Result<OptimizedGrammar, GrammarError> {
    let mut grammar = builder::build_grammar(text)?;
    recursion::analyze(&mut grammar)?;
    Ok(optimizer::optimize(grammar))
}

/// Build a grammar from a [`TokenStream`] (§6.1), for callers that already
/// hold their grammar source as something other than an in-memory `&str`.
pub fn parse_grammar(stream: &mut dyn TokenStream) -> Result<OptimizedGrammar, GrammarError> {
    let mut grammar = builder::build_grammar_stream(stream)?;
    recursion::analyze(&mut grammar)?;
    Ok(optimizer::optimize(grammar))
}

/// Parse `text` against `grammar`'s root group, requiring the entire input
/// to be consumed (§4.7.1, §6.1). `Ok(None)` means `text` does not match —
/// an ordinary outcome, never an error (§7).
pub fn parse_text(grammar: &OptimizedGrammar, text: &str) -> Result<Option<Item>, CoreError> {
    parser::parse_text(grammar, text)
}

/// Parse a [`TokenStream`] against `grammar`'s root group, requiring the
/// entire stream to be consumed (§6.1).
pub fn parse_stream(grammar: &OptimizedGrammar, stream: &mut dyn TokenStream) -> Result<Option<Item>, CoreError> {
    parser::parse_stream(grammar, stream)
}

/// Whether `text` matches `grammar`'s root group in its entirety, without
/// building the parse tree (§6.1).
pub fn matches_text(grammar: &OptimizedGrammar, text: &str) -> Result<bool, CoreError> {
    parser::matches_text(grammar, text)
}

/// Whether a [`TokenStream`] matches `grammar`'s root group in its entirety
/// (§6.1).
pub fn matches_stream(grammar: &OptimizedGrammar, stream: &mut dyn TokenStream) -> Result<bool, CoreError> {
    parser::matches_stream(grammar, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_grammar_captures_fields() {
        let grammar = parse_grammar_text(
            "grammar Csv\nRow := field ^ ','\nfield = !{','}*+\n",
        )
        .expect("grammar should be well formed");
        let row = parse_text(&grammar, "a,bb,ccc")
            .expect("should parse without error")
            .expect("should match");
        let fields = row.get_child("Row").unwrap().as_list().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].as_text(), Some("bb"));
    }

    /// The two operands of a parsed `expr` node, as found under its `List`.
    fn operands(item: &Item) -> (&Item, &Item) {
        let list = item
            .get_child("expr")
            .expect("expr node")
            .as_list()
            .expect("binary expr should merge its operands into a List");
        assert_eq!(list.len(), 2, "expected exactly two operands");
        (&list[0], &list[1])
    }

    #[test]
    fn arithmetic_grammar_resolves_precedence_and_associativity() {
        let grammar = parse_grammar_text(concat!(
            "grammar Arith\n",
            "expr 0 L := expr '+' expr | term\n",
            "expr 1 L := expr '*' expr | term\n",
            "term = {'0'..'9'}*1..+\n",
        ))
        .expect("grammar should be well formed");
        assert!(matches_text(&grammar, "1+2*3").unwrap());
        assert!(matches_text(&grammar, "1*2+3*4").unwrap());
        assert!(!matches_text(&grammar, "1+").unwrap());

        // 5+5+5 -> (5+5)+5: left operand is a compound `expr`, right is a leaf.
        let sum = parse_text(&grammar, "5+5+5").unwrap().unwrap();
        let (left, right) = operands(&sum);
        assert!(left.is_node(), "left-associative '+' should nest on the left: {:?}", sum);
        assert!(right.as_text().is_some(), "rightmost '+5' should stay a leaf: {:?}", sum);
        let (inner_left, inner_right) = operands(left);
        assert_eq!(inner_left.as_text(), Some("5"));
        assert_eq!(inner_right.as_text(), Some("5"));

        // '*' is left-associative too: 5*5*5 -> (5*5)*5, same nesting shape.
        let product = parse_text(&grammar, "5*5*5").unwrap().unwrap();
        let (left, right) = operands(&product);
        assert!(left.is_node(), "left-associative '*' should nest on the left: {:?}", product);
        assert!(right.as_text().is_some(), "rightmost '*5' should stay a leaf: {:?}", product);

        // 5+5*3 -> 5+(5*3): '*' binds tighter, so it nests on the right of '+'.
        let mixed = parse_text(&grammar, "5+5*3").unwrap().unwrap();
        let (left, right) = operands(&mixed);
        assert_eq!(left.as_text(), Some("5"), "'+' left operand should stay a leaf: {:?}", mixed);
        assert!(right.is_node(), "'5*3' should nest under the '+' as a compound expr: {:?}", mixed);
        let (inner_left, inner_right) = operands(right);
        assert_eq!(inner_left.as_text(), Some("5"));
        assert_eq!(inner_right.as_text(), Some("3"));
    }

    #[test]
    fn string_literal_grammar_captures_escaped_content() {
        let grammar = parse_grammar_text(concat!(
            "grammar Strings\n",
            "Str := '\"' (('\\\\' {?}) | !{'\"'})*+ '\"'\n",
        ))
        .expect("grammar should be well formed");
        let item = parse_text(&grammar, "\"a\\\"b\"")
            .expect("should parse without error")
            .expect("should match");
        assert_eq!(item.get_child("Str").and_then(Item::as_text), Some("a\\\"b"));
    }

    #[test]
    fn block_comments_nest() {
        let grammar = parse_grammar_text(concat!(
            "grammar Comments\n",
            "comment := '/*' (comment | {?} &! '*/')* '*/'\n",
        ))
        .expect("grammar should be well formed");
        assert!(matches_text(&grammar, "/* outer /* inner */ still outer */").unwrap());
        assert!(!matches_text(&grammar, "/* unterminated").unwrap());
    }

    #[test]
    fn case_insensitive_comparer_matches_either_case() {
        let grammar = parse_grammar_text(concat!(
            "grammar Keyword\n",
            "comparer: insensitive\n",
            "Kw := 'select'\n",
        ))
        .expect("grammar should be well formed");
        assert!(matches_text(&grammar, "SELECT").unwrap());
        assert!(matches_text(&grammar, "Select").unwrap());
    }

    #[test]
    fn left_recursive_expression_terminates_and_nests() {
        let grammar = parse_grammar_text(concat!(
            "grammar Sum\n",
            "expr 1 L := expr '+' term | term\n",
            "term = {'0'..'9'}*1..+\n",
        ))
        .expect("grammar should be well formed");
        let item = parse_text(&grammar, "1+2+3")
            .expect("should parse without error")
            .expect("should match");
        assert!(item.is_node());
    }

    #[test]
    fn malformed_grammar_reference_is_reported() {
        match parse_grammar_text("grammar Broken\nRoot := Missing\n") {
            Err(GrammarError { .. }) => {}
            Ok(_) => panic!("expected a GrammarError for an unresolved reference"),
        }
    }

    #[test]
    fn unmatched_input_is_not_an_error() {
        let grammar = parse_grammar_text("grammar Lit\nRoot := 'a'\n").unwrap();
        assert_eq!(parse_text(&grammar, "b").unwrap(), None);
    }
}

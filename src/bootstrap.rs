//! The grammar that parses grammar source text (§4.2).
//!
//! Built by hand, once, as plain [`ir::Expr`] trees — there is no meta-meta
//! grammar to bootstrap this one from. The one place it leans on the engine
//! itself rather than hand-rolled logic is `postfix`: suffix operators
//! (`*`, `^`, `&!`, `as`, trailing `+`) chain onto a preceding expression, so
//! `postfix` is written as a genuinely left-recursive [`DefinitionGroup`] and
//! left to the parser's own seed-growing loop (`parser::parse_definition_group`)
//! rather than folded by hand in `builder.rs`.

use once_cell::sync::Lazy;

use crate::ir::{
    CharSetEntry, Definition, DefinitionGroup, Expr, Grammar, GrammarOptions, OptimizedGrammar,
};

/// Join `items` with `_` (the whitespace/comment rule) spliced between every
/// pair. Redundant whitespace references (e.g. either side of a `token`,
/// which already sandwiches itself) cost nothing: `_` can match zero width.
fn seq_ws(items: Vec<Expr>) -> Expr {
    let mut out = Vec::with_capacity(items.len() * 2);
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(Expr::reference("_"));
        }
        out.push(item);
    }
    Expr::sequence(out)
}

/// An uncaptured literal, sandwiched in whitespace on both sides. Used for
/// this grammar's own punctuation (`:=`, `|`, `*`, …) — distinct from
/// [`Expr::quote`], which is reserved for literals a *user's* grammar text
/// writes, and which the optimizer's `QuoteExpander` captures automatically.
fn token(lit: &str) -> Expr {
    let literal = if lit.chars().count() == 1 {
        Expr::char(lit.chars().next().unwrap())
    } else {
        Expr::string(lit)
    };
    Expr::group(Expr::sequence(vec![
        Expr::reference("_"),
        literal,
        Expr::reference("_"),
    ]))
}

fn ident_continue_charset() -> Expr {
    Expr::charset(
        vec![
            CharSetEntry::Range('a', 'z'),
            CharSetEntry::Range('A', 'Z'),
            CharSetEntry::Range('0', '9'),
            CharSetEntry::Char('_'),
        ],
        false,
    )
}

/// A word-shaped literal (`grammar`, `as`, …), rejected if immediately
/// followed by another identifier character — otherwise `grammarFoo` would
/// silently parse as the keyword `grammar` followed by identifier `Foo`.
fn keyword(lit: &str) -> Expr {
    Expr::group(Expr::sequence(vec![
        Expr::reference("_"),
        Expr::string(lit),
        Expr::and_not(Expr::sequence(vec![]), ident_continue_charset()),
        Expr::reference("_"),
    ]))
}

/// One escaped (`\` + any char) or plain (anything but `delim`) unit inside a
/// quoted literal. Deliberately free of `Reference`/`Declaration` nodes so it
/// stays "primitive shaped" — not that it matters here, since the result is
/// always consumed by an enclosing `Capture`, which slices raw source text
/// rather than using the inner parse value.
fn escape_or_char(delim: char) -> Expr {
    Expr::or(vec![
        Expr::sequence(vec![Expr::char('\\'), Expr::charset_all()]),
        Expr::and_not(Expr::charset_all(), Expr::char(delim)),
    ])
}

/// `delim ... delim`, exact (no whitespace tolerance), with the inner text —
/// escapes included, unresolved — captured as one `Item::Text`.
fn quoted(delim: char) -> Expr {
    Expr::group(Expr::sequence(vec![
        Expr::char(delim),
        Expr::capture(Expr::repeat(escape_or_char(delim), 0, None)),
        Expr::char(delim),
    ]))
}

fn literal_atom() -> Expr {
    Expr::declaration("Literal", quoted('\''))
}

fn codepoint_atom() -> Expr {
    Expr::declaration(
        "CodePoint",
        seq_ws(vec![
            Expr::char('#'),
            Expr::declaration("Value", Expr::reference("integer")),
        ]),
    )
}

/// A single character, written either as a one-char quoted literal or as a
/// `#codepoint`. Shared between `Range`'s bounds and `CharSet`'s entries.
fn char_atom() -> Expr {
    Expr::or(vec![literal_atom(), codepoint_atom()])
}

fn range_entry() -> Expr {
    Expr::declaration(
        "Range",
        seq_ws(vec![
            Expr::declaration("Low", char_atom()),
            token(".."),
            Expr::declaration("High", char_atom()),
        ]),
    )
}

/// The optional repeat-count suffix following `*` (§6.3): `e*`, `e*N`,
/// `e*N..M`, `e*N..`. Tried longest-form first so a trailing `..M` isn't
/// missed.
fn repeat_count_tail() -> Expr {
    Expr::or(vec![
        seq_ws(vec![
            Expr::declaration("From", Expr::reference("integer")),
            token(".."),
            Expr::declaration("To", Expr::reference("integer")),
        ]),
        seq_ws(vec![
            Expr::declaration("From", Expr::reference("integer")),
            token(".."),
        ]),
        Expr::declaration("Exact", Expr::reference("integer")),
    ])
}

fn primary_group() -> DefinitionGroup {
    let instance = Expr::or(vec![
        // Quote: whitespace-tolerant, captured, expanded by the optimizer.
        Expr::declaration("Quote", quoted('"')),
        // Range must be tried before a bare Literal swallows just its
        // first bound and leaves `..high` dangling.
        range_entry(),
        literal_atom(),
        codepoint_atom(),
        Expr::declaration(
            "CharSet",
            seq_ws(vec![
                Expr::optional(Expr::declaration("Not", Expr::capture(Expr::char('!')))),
                token("{"),
                Expr::or(vec![
                    Expr::declaration("All", Expr::capture(Expr::char('?'))),
                    Expr::declaration(
                        "Entries",
                        Expr::separated(
                            Expr::or(vec![range_entry(), char_atom()]),
                            token(","),
                        ),
                    ),
                ]),
                token("}"),
            ]),
        ),
        Expr::declaration(
            "Reference",
            seq_ws(vec![
                Expr::declaration("Name", Expr::reference("identifier")),
                Expr::optional(Expr::declaration(
                    "Qualifier",
                    seq_ws(vec![token("."), Expr::reference("identifier")]),
                )),
            ]),
        ),
        Expr::declaration(
            "Group",
            seq_ws(vec![
                token("("),
                Expr::declaration("Expression", Expr::reference("expression")),
                token(")"),
            ]),
        ),
        Expr::declaration(
            "Optional",
            seq_ws(vec![
                token("["),
                Expr::declaration("Expression", Expr::reference("expression")),
                token("]"),
            ]),
        ),
    ]);
    DefinitionGroup::with_definitions("primary", vec![Definition::helper("primary", instance)])
}

/// Postfix suffix chaining, left-recursive by construction (§4.7.1's
/// seed-growing loop handles it; nothing special is required here beyond
/// giving each suffix a precedence and `Left` associativity, exactly as the
/// parser's own `left_recursive_sum_parses_and_terminates` test does for
/// ordinary arithmetic).
fn postfix_group() -> DefinitionGroup {
    let base = Definition::helper("postfix", Expr::reference("primary"));

    let repeat_op = Definition::helper(
        "postfix",
        Expr::declaration(
            "Repeat",
            seq_ws(vec![
                Expr::declaration("Expression", Expr::reference("postfix")),
                token("*"),
                Expr::optional(repeat_count_tail()),
            ]),
        ),
    )
    .with_precedence(0, crate::ir::Associativity::Left);

    let separated_op = Definition::helper(
        "postfix",
        Expr::declaration(
            "Separated",
            seq_ws(vec![
                Expr::declaration("Expression", Expr::reference("postfix")),
                token("^"),
                Expr::declaration("Separator", Expr::reference("primary")),
            ]),
        ),
    )
    .with_precedence(0, crate::ir::Associativity::Left);

    let and_not_op = Definition::helper(
        "postfix",
        Expr::declaration(
            "AndNot",
            seq_ws(vec![
                Expr::declaration("Expression", Expr::reference("postfix")),
                token("&!"),
                Expr::declaration("Not", Expr::reference("primary")),
            ]),
        ),
    )
    .with_precedence(0, crate::ir::Associativity::Left);

    let as_op = Definition::helper(
        "postfix",
        Expr::declaration(
            "As",
            seq_ws(vec![
                Expr::declaration("Expression", Expr::reference("postfix")),
                keyword("as"),
                Expr::declaration("Value", quoted('\'')),
            ]),
        ),
    )
    .with_precedence(0, crate::ir::Associativity::Left);

    let capture_op = Definition::helper(
        "postfix",
        Expr::declaration(
            "Capture",
            seq_ws(vec![
                Expr::declaration("Expression", Expr::reference("postfix")),
                token("+"),
            ]),
        ),
    )
    .with_precedence(0, crate::ir::Associativity::Left);

    DefinitionGroup::with_definitions(
        "postfix",
        vec![base, repeat_op, separated_op, and_not_op, as_op, capture_op],
    )
}

fn sequence_level() -> Expr {
    Expr::declaration(
        "Sequence",
        Expr::declaration("Items", Expr::repeat(Expr::reference("postfix"), 1, None)),
    )
}

fn or_level() -> Expr {
    Expr::declaration(
        "Or",
        Expr::declaration(
            "Expressions",
            Expr::separated(sequence_level(), token("|")),
        ),
    )
}

fn expression_group() -> DefinitionGroup {
    let declaration_alt = Expr::declaration(
        "Declaration",
        seq_ws(vec![
            Expr::declaration("Name", Expr::reference("identifier")),
            token(":"),
            Expr::declaration("Expression", or_level()),
        ]),
    );
    let instance = Expr::or(vec![declaration_alt, or_level()]);
    DefinitionGroup::with_definitions("expression", vec![Definition::helper("expression", instance)])
}

fn definition_group() -> DefinitionGroup {
    let instance = seq_ws(vec![
        Expr::declaration("Name", Expr::reference("identifier")),
        Expr::optional(Expr::declaration("Precedence", Expr::reference("integer"))),
        Expr::optional(Expr::declaration(
            "Associativity",
            Expr::capture(Expr::or(vec![Expr::char('L'), Expr::char('R')])),
        )),
        Expr::declaration(
            "Type",
            Expr::or(vec![
                Expr::as_value(token(":="), "Declaration"),
                Expr::as_value(token("="), "Helper"),
            ]),
        ),
        Expr::declaration("Body", Expr::reference("expression")),
    ]);
    DefinitionGroup::with_definitions("Definition", vec![Definition::declaration("Definition", instance)])
}

fn unit_group() -> DefinitionGroup {
    let comparer_clause = seq_ws(vec![
        keyword("comparer"),
        token(":"),
        Expr::declaration(
            "Comparer",
            Expr::capture(Expr::or(vec![
                Expr::string("sensitive"),
                Expr::string("insensitive"),
            ])),
        ),
    ]);
    let whitespace_clause = seq_ws(vec![
        keyword("whitespace"),
        token(":"),
        Expr::declaration("Whitespace", Expr::reference("identifier")),
    ]);
    let instance = seq_ws(vec![
        keyword("grammar"),
        Expr::declaration("Name", Expr::reference("identifier")),
        Expr::optional(comparer_clause),
        Expr::optional(whitespace_clause),
        Expr::declaration(
            "Definitions",
            Expr::repeat(Expr::reference("Definition"), 1, None),
        ),
    ]);
    DefinitionGroup::with_definitions("Unit", vec![Definition::declaration("Unit", instance)])
}

fn digit_group() -> DefinitionGroup {
    DefinitionGroup::with_definitions(
        "digit",
        vec![Definition::helper(
            "digit",
            Expr::charset(vec![CharSetEntry::Range('0', '9')], false),
        )],
    )
}

fn letter_group() -> DefinitionGroup {
    DefinitionGroup::with_definitions(
        "letter",
        vec![Definition::helper(
            "letter",
            Expr::charset(
                vec![CharSetEntry::Range('a', 'z'), CharSetEntry::Range('A', 'Z')],
                false,
            ),
        )],
    )
}

fn identifier_group() -> DefinitionGroup {
    let head = Expr::or(vec![Expr::reference("letter"), Expr::char('_')]);
    let tail = Expr::or(vec![
        Expr::reference("letter"),
        Expr::reference("digit"),
        Expr::char('_'),
    ]);
    let instance = Expr::capture(Expr::sequence(vec![head, Expr::repeat(tail, 0, None)]));
    DefinitionGroup::with_definitions("identifier", vec![Definition::helper("identifier", instance)])
}

fn integer_group() -> DefinitionGroup {
    let instance = Expr::capture(Expr::repeat(Expr::reference("digit"), 1, None));
    DefinitionGroup::with_definitions("integer", vec![Definition::helper("integer", instance)])
}

fn line_comment_group() -> DefinitionGroup {
    let instance = Expr::sequence(vec![
        Expr::string("//"),
        Expr::repeat(
            Expr::and_not(Expr::charset_all(), Expr::char('\n')),
            0,
            None,
        ),
        Expr::optional(Expr::char('\n')),
    ]);
    DefinitionGroup::with_definitions(
        "lineComment",
        vec![Definition::helper("lineComment", instance)],
    )
}

fn block_comment_group() -> DefinitionGroup {
    let instance = Expr::sequence(vec![
        Expr::string("/*"),
        Expr::repeat(
            Expr::and_not(Expr::charset_all(), Expr::string("*/")),
            0,
            None,
        ),
        Expr::string("*/"),
    ]);
    DefinitionGroup::with_definitions(
        "blockComment",
        vec![Definition::helper("blockComment", instance)],
    )
}

/// Whitespace and comments. Deliberately inlines the line/block comment
/// bodies rather than referencing the `lineComment`/`blockComment` groups
/// above: a `Reference` inside this rule's `Repeat` would make it fail
/// `parser::is_primitive_shape`, so the rule would stop collapsing into a
/// single plain `Item::Text` and start producing an `Item::List` instead —
/// harmless in isolation, but it would then pollute every `merge()` this
/// rule participates in (it is spliced between nearly every other token via
/// `seq_ws`/`token`). `lineComment`/`blockComment` are kept as their own
/// named, independently usable rules for anyone parsing comments directly.
fn whitespace_group() -> DefinitionGroup {
    let unit = Expr::or(vec![
        Expr::charset(
            vec![
                CharSetEntry::Char(' '),
                CharSetEntry::Char('\t'),
                CharSetEntry::Char('\r'),
                CharSetEntry::Char('\n'),
            ],
            false,
        ),
        Expr::sequence(vec![
            Expr::string("//"),
            Expr::repeat(
                Expr::and_not(Expr::charset_all(), Expr::char('\n')),
                0,
                None,
            ),
            Expr::optional(Expr::char('\n')),
        ]),
        Expr::sequence(vec![
            Expr::string("/*"),
            Expr::repeat(
                Expr::and_not(Expr::charset_all(), Expr::string("*/")),
                0,
                None,
            ),
            Expr::string("*/"),
        ]),
    ]);
    DefinitionGroup::with_definitions("_", vec![Definition::helper("_", Expr::repeat(unit, 0, None))])
}

fn build_bootstrap() -> OptimizedGrammar {
    let groups = vec![
        unit_group(),
        definition_group(),
        expression_group(),
        postfix_group(),
        primary_group(),
        identifier_group(),
        integer_group(),
        letter_group(),
        digit_group(),
        whitespace_group(),
        line_comment_group(),
        block_comment_group(),
    ];
    let mut grammar = Grammar::from_groups(
        "Unit",
        groups,
        GrammarOptions {
            whitespace_rule: Some("_".to_string()),
            case_sensitive: true,
        },
    );
    crate::recursion::analyze(&mut grammar)
        .expect("bootstrap grammar satisfies its own recursion/precedence invariants");
    crate::optimizer::optimize(grammar)
}

/// The grammar that parses grammar source text, built once on first use.
pub static BOOTSTRAP: Lazy<OptimizedGrammar> = Lazy::new(build_bootstrap);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn bootstrap_builds_without_panicking() {
        Lazy::force(&BOOTSTRAP);
    }

    #[test]
    fn bootstrap_parses_a_trivial_grammar() {
        let text = "grammar Mini\nRoot := 'a'\n";
        let item = parser::parse_text(&BOOTSTRAP, text)
            .expect("trivial grammar should parse without error")
            .expect("trivial grammar should be recognized");
        assert!(item.get_child("Unit").is_some());
    }

    #[test]
    fn bootstrap_parses_postfix_chains() {
        let text = "grammar Mini\nRoot := 'a'*1..3 &! 'b' as 'x'\n";
        parser::parse_text(&BOOTSTRAP, text)
            .expect("chained postfix operators should parse without error")
            .expect("chained postfix operators should be recognized");
    }
}

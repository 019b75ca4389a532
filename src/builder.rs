//! Converts a parsed grammar-text [`Item`] tree (shaped by `bootstrap.rs`'s
//! `Unit` production) into an [`ir::Grammar`] (§4.3).
//!
//! Each of the ~16 IR node kinds (§3.3) appears here as one match arm in
//! [`item_to_expr`], keyed by the `Node`'s sole attribute name — the same
//! "kind tag" convention the bootstrap grammar itself produces.

use std::collections::HashMap;

use crate::error::{CoreError, GrammarError};
use crate::ir::{
    Associativity, CharSetEntry, Definition, DefinitionGroup, DefinitionType, Expr, Grammar,
    GrammarOptions,
};
use crate::item::Item;
use crate::stream::TokenStream;

fn core_to_grammar_error(e: CoreError) -> GrammarError {
    match e {
        CoreError::Grammar(g) => g,
        CoreError::Parser(p) => GrammarError::new("Unit", p.message),
        CoreError::EmptyInput => GrammarError::new("Unit", "input must not be empty"),
    }
}

/// Parse `text` against the bootstrap grammar and build an [`ir::Grammar`]
/// from the result. The returned grammar has not yet been through
/// [`crate::recursion::analyze`] or [`crate::optimizer::optimize`].
pub fn build_grammar(text: &str) -> Result<Grammar, GrammarError> {
    let item = crate::parser::parse_text(&crate::bootstrap::BOOTSTRAP, text)
        .map_err(core_to_grammar_error)?
        .ok_or_else(|| GrammarError::new("Unit", "input does not parse as a grammar"))?;
    build_grammar_from_item(&item)
}

/// Parse a [`TokenStream`] against the bootstrap grammar and build an
/// [`ir::Grammar`] from the result (§6.1's `parse_grammar` entry point).
pub fn build_grammar_stream<S: TokenStream + ?Sized>(stream: &mut S) -> Result<Grammar, GrammarError> {
    let item = crate::parser::parse_stream(&crate::bootstrap::BOOTSTRAP, stream)
        .map_err(core_to_grammar_error)?
        .ok_or_else(|| GrammarError::new("Unit", "input does not parse as a grammar"))?;
    build_grammar_from_item(&item)
}

fn build_grammar_from_item(item: &Item) -> Result<Grammar, GrammarError> {
    let unit = item
        .get_child("Unit")
        .ok_or_else(|| GrammarError::new("Unit", "parsed result is not a Unit"))?;

    let definitions_item = unit
        .get_child("Definitions")
        .ok_or_else(|| GrammarError::new("Unit", "grammar has no definitions"))?;
    let definition_items = definitions_item
        .as_list()
        .ok_or_else(|| GrammarError::new("Unit", "Definitions is not a list"))?;

    let mut by_name: HashMap<String, Vec<Definition>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for def_item in definition_items {
        let (name, def) = build_definition(def_item)?;
        if !by_name.contains_key(&name) {
            order.push(name.clone());
        }
        by_name.entry(name).or_default().push(def);
    }

    let root = order
        .first()
        .cloned()
        .ok_or_else(|| GrammarError::new("Unit", "grammar has no definitions"))?;

    let whitespace_rule = match unit.get_child("Whitespace") {
        Some(name_item) => Some(
            name_item
                .as_text()
                .ok_or_else(|| GrammarError::new("Unit", "Whitespace is not an identifier"))?
                .to_string(),
        ),
        None if by_name.contains_key("_") => Some("_".to_string()),
        None => None,
    };
    let case_sensitive = match unit.get_child("Comparer") {
        Some(c) => c.as_text() != Some("insensitive"),
        None => true,
    };

    let groups: Vec<DefinitionGroup> = by_name
        .into_iter()
        .map(|(name, definitions)| DefinitionGroup::with_definitions(name, definitions))
        .collect();

    let grammar = Grammar::from_groups(
        root,
        groups,
        GrammarOptions {
            whitespace_rule: whitespace_rule.clone(),
            case_sensitive,
        },
    );

    if let Some(name) = &whitespace_rule {
        if grammar.group(name).is_none() {
            return Err(GrammarError::new(
                "Unit",
                format!("whitespace rule '{}' is not defined", name),
            ));
        }
    }
    validate_references(&grammar)?;
    Ok(grammar)
}

fn build_definition(item: &Item) -> Result<(String, Definition), GrammarError> {
    let def = item
        .get_child("Definition")
        .ok_or_else(|| GrammarError::new("Definition", "expected a Definition node"))?;

    let name = def
        .get_child("Name")
        .and_then(Item::as_text)
        .ok_or_else(|| GrammarError::new("Definition", "definition is missing a Name"))?
        .to_string();

    let precedence = def
        .get_child("Precedence")
        .and_then(Item::as_text)
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| GrammarError::new(&name, format!("invalid precedence '{}'", s)))
        })
        .transpose()?;

    let associativity = match def.get_child("Associativity").and_then(Item::as_text) {
        Some("R") => Associativity::Right,
        _ => Associativity::Left,
    };

    let def_type = match def.get_child("Type").and_then(Item::as_text) {
        Some("Declaration") => DefinitionType::Declaration,
        _ => DefinitionType::Helper,
    };

    let body = def
        .get_child("Body")
        .ok_or_else(|| GrammarError::new(&name, "definition is missing a body"))?;
    let instance = item_to_expr(body, &name)?;

    let mut definition = match def_type {
        DefinitionType::Declaration => Definition::declaration(&name, instance),
        DefinitionType::Helper => Definition::helper(&name, instance),
    };
    if let Some(p) = precedence {
        definition = definition.with_precedence(p, associativity);
    }
    Ok((name, definition))
}

/// Dispatch on a parsed expression `Node`'s sole kind tag, mirroring
/// `bootstrap.rs`'s own alternatives one for one.
fn item_to_expr(item: &Item, group: &str) -> Result<Expr, GrammarError> {
    if let Some(quote) = item.get_child("Quote") {
        let text = quote
            .as_text()
            .ok_or_else(|| GrammarError::new(group, "Quote has no text"))?;
        return Ok(Expr::quote(unescape(text)));
    }
    if let Some(lit) = item.get_child("Literal") {
        let text = lit
            .as_text()
            .ok_or_else(|| GrammarError::new(group, "Literal has no text"))?;
        let unescaped = unescape(text);
        let mut chars = unescaped.chars();
        let first = chars.next();
        return Ok(match (first, chars.next()) {
            (Some(c), None) => Expr::char(c),
            _ => Expr::string(unescaped),
        });
    }
    if let Some(cp) = item.get_child("CodePoint") {
        return Ok(Expr::char(resolve_codepoint(cp, group)?));
    }
    if let Some(range) = item.get_child("Range") {
        let low = range
            .get_child("Low")
            .ok_or_else(|| GrammarError::new(group, "Range is missing Low"))?;
        let high = range
            .get_child("High")
            .ok_or_else(|| GrammarError::new(group, "Range is missing High"))?;
        return Ok(Expr::range(
            resolve_char_atom(low, group)?,
            resolve_char_atom(high, group)?,
        ));
    }
    if let Some(charset) = item.get_child("CharSet") {
        let negate = charset.get_child("Not").is_some();
        if charset.get_child("All").is_some() {
            return Ok(Expr::new(crate::ir::ExprKind::CharSet {
                spec: crate::ir::CharSetSpec::All,
                negate,
            }));
        }
        let entries_item = charset
            .get_child("Entries")
            .ok_or_else(|| GrammarError::new(group, "CharSet has neither {?} nor entries"))?;
        let entries = entries_item
            .as_list()
            .ok_or_else(|| GrammarError::new(group, "CharSet entries is not a list"))?;
        let mut built = Vec::with_capacity(entries.len());
        for entry in entries {
            built.push(charset_entry_to_entry(entry, group)?);
        }
        return Ok(Expr::charset(built, negate));
    }
    if let Some(reference) = item.get_child("Reference") {
        let name = reference
            .get_child("Name")
            .and_then(Item::as_text)
            .ok_or_else(|| GrammarError::new(group, "Reference is missing a Name"))?;
        if let Some(qualifier) = reference.get_child("Qualifier") {
            let other = qualifier.as_text().unwrap_or("");
            return Err(GrammarError::cross_grammar_reference(group, &format!("{}.{}", name, other)));
        }
        return Ok(Expr::reference(name));
    }
    if let Some(group_node) = item.get_child("Group") {
        let inner = group_node
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Group is missing an Expression"))?;
        return Ok(Expr::group(item_to_expr(inner, group)?));
    }
    if let Some(optional) = item.get_child("Optional") {
        let inner = optional
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Optional is missing an Expression"))?;
        return Ok(Expr::optional(item_to_expr(inner, group)?));
    }
    if let Some(declaration) = item.get_child("Declaration") {
        let name = declaration
            .get_child("Name")
            .and_then(Item::as_text)
            .ok_or_else(|| GrammarError::new(group, "Declaration is missing a Name"))?;
        let inner = declaration
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Declaration is missing an Expression"))?;
        return Ok(Expr::declaration(name, item_to_expr(inner, group)?));
    }
    if let Some(or_node) = item.get_child("Or") {
        let alts_item = or_node
            .get_child("Expressions")
            .ok_or_else(|| GrammarError::new(group, "Or is missing Expressions"))?;
        let alts = alts_item
            .as_list()
            .ok_or_else(|| GrammarError::new(group, "Or Expressions is not a list"))?;
        let mut built = Vec::with_capacity(alts.len());
        for alt in alts {
            built.push(item_to_expr(alt, group)?);
        }
        return Ok(if built.len() == 1 {
            built.into_iter().next().unwrap()
        } else {
            Expr::or(built)
        });
    }
    if let Some(seq_node) = item.get_child("Sequence") {
        let items_item = seq_node
            .get_child("Items")
            .ok_or_else(|| GrammarError::new(group, "Sequence is missing Items"))?;
        let items = items_item
            .as_list()
            .ok_or_else(|| GrammarError::new(group, "Sequence Items is not a list"))?;
        let mut built = Vec::with_capacity(items.len());
        for it in items {
            built.push(item_to_expr(it, group)?);
        }
        return Ok(if built.len() == 1 {
            built.into_iter().next().unwrap()
        } else {
            Expr::sequence(built)
        });
    }
    if let Some(repeat) = item.get_child("Repeat") {
        let inner = repeat
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Repeat is missing an Expression"))?;
        let expr = item_to_expr(inner, group)?;
        let (from, to) = if let Some(exact) = repeat.get_child("Exact") {
            let n = parse_u32(exact, group)?;
            (n, Some(n))
        } else if let Some(from_item) = repeat.get_child("From") {
            let from = parse_u32(from_item, group)?;
            let to = repeat.get_child("To").map(|t| parse_u32(t, group)).transpose()?;
            (from, to)
        } else {
            (0, None)
        };
        return Ok(Expr::repeat(expr, from, to));
    }
    if let Some(separated) = item.get_child("Separated") {
        let inner = separated
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Separated is missing an Expression"))?;
        let separator = separated
            .get_child("Separator")
            .ok_or_else(|| GrammarError::new(group, "Separated is missing a Separator"))?;
        return Ok(Expr::separated(
            item_to_expr(inner, group)?,
            item_to_expr(separator, group)?,
        ));
    }
    if let Some(and_not) = item.get_child("AndNot") {
        let inner = and_not
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "AndNot is missing an Expression"))?;
        let not_expr = and_not
            .get_child("Not")
            .ok_or_else(|| GrammarError::new(group, "AndNot is missing a Not clause"))?;
        return Ok(Expr::and_not(
            item_to_expr(inner, group)?,
            item_to_expr(not_expr, group)?,
        ));
    }
    if let Some(as_node) = item.get_child("As") {
        let inner = as_node
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "As is missing an Expression"))?;
        let value = as_node
            .get_child("Value")
            .and_then(Item::as_text)
            .ok_or_else(|| GrammarError::new(group, "As is missing a Value"))?;
        return Ok(Expr::as_value(item_to_expr(inner, group)?, unescape(value)));
    }
    if let Some(capture) = item.get_child("Capture") {
        let inner = capture
            .get_child("Expression")
            .ok_or_else(|| GrammarError::new(group, "Capture is missing an Expression"))?;
        return Ok(Expr::capture(item_to_expr(inner, group)?));
    }
    Err(GrammarError::new(
        group,
        "unrecognized expression node while building grammar",
    ))
}

fn parse_u32(item: &Item, group: &str) -> Result<u32, GrammarError> {
    let text = item
        .as_text()
        .ok_or_else(|| GrammarError::new(group, "expected an integer"))?;
    text.parse::<u32>()
        .map_err(|_| GrammarError::new(group, format!("invalid integer '{}'", text)))
}

fn resolve_codepoint(cp: &Item, group: &str) -> Result<char, GrammarError> {
    let value = cp
        .get_child("Value")
        .and_then(Item::as_text)
        .ok_or_else(|| GrammarError::new(group, "CodePoint is missing a Value"))?;
    let n: u32 = value
        .parse()
        .map_err(|_| GrammarError::new(group, format!("invalid codepoint '{}'", value)))?;
    char::from_u32(n).ok_or_else(|| GrammarError::new(group, format!("codepoint {} is not a valid character", n)))
}

/// Resolve a `Literal` or `CodePoint` node (§6.3's char-atom forms, shared by
/// `Range` bounds and `CharSet` entries) to exactly one character.
fn resolve_char_atom(item: &Item, group: &str) -> Result<char, GrammarError> {
    if let Some(lit) = item.get_child("Literal") {
        let text = lit
            .as_text()
            .ok_or_else(|| GrammarError::new(group, "Literal has no text"))?;
        let unescaped = unescape(text);
        let mut chars = unescaped.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(GrammarError::new(
                group,
                format!("'{}' is not a single character", unescaped),
            )),
        };
    }
    if let Some(cp) = item.get_child("CodePoint") {
        return resolve_codepoint(cp, group);
    }
    Err(GrammarError::new(group, "expected a single character or codepoint"))
}

fn charset_entry_to_entry(item: &Item, group: &str) -> Result<CharSetEntry, GrammarError> {
    if let Some(range) = item.get_child("Range") {
        let low = range
            .get_child("Low")
            .ok_or_else(|| GrammarError::new(group, "Range is missing Low"))?;
        let high = range
            .get_child("High")
            .ok_or_else(|| GrammarError::new(group, "Range is missing High"))?;
        return Ok(CharSetEntry::Range(
            resolve_char_atom(low, group)?,
            resolve_char_atom(high, group)?,
        ));
    }
    Ok(CharSetEntry::Char(resolve_char_atom(item, group)?))
}

/// Walk every built `Expr` and check that each `Reference` resolves to a
/// defined group (§7, `GrammarError::unknown_reference`).
fn validate_references(grammar: &Grammar) -> Result<(), GrammarError> {
    for group in grammar.groups.values() {
        for def in &group.definitions {
            check_references(&def.instance, grammar, &group.name)?;
        }
    }
    Ok(())
}

fn check_references(expr: &Expr, grammar: &Grammar, group: &str) -> Result<(), GrammarError> {
    use crate::ir::ExprKind::*;
    match &expr.kind {
        Reference(name) => {
            if grammar.group(name).is_none() {
                return Err(GrammarError::unknown_reference(group, name));
            }
            Ok(())
        }
        Group(inner) | Optional(inner) | Capture(inner) => check_references(inner, grammar, group),
        Or(items) | Sequence(items) => {
            for item in items {
                check_references(item, grammar, group)?;
            }
            Ok(())
        }
        Repeat { expr, .. } => check_references(expr, grammar, group),
        Separated { expr, separator } => {
            check_references(expr, grammar, group)?;
            check_references(separator, grammar, group)
        }
        AndNot { expr, not_expr } => {
            check_references(expr, grammar, group)?;
            check_references(not_expr, grammar, group)
        }
        As { expr, .. } => check_references(expr, grammar, group),
        Declaration { expr, .. } => check_references(expr, grammar, group),
        Quote(_) | StringLit(_) | Char(_) | Range(..) | CharSet { .. } => Ok(()),
    }
}

/// Interpret `\n`, `\t`, `\r`, `\\`, `\'`, `\"`, `\0` and `\u{XXXX}` escapes in
/// raw quoted literal text. This set mirrors Rust's own char/string escape
/// grammar, the nearest familiar convention available to someone writing
/// this grammar's literals.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('u') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut digits = String::new();
                    for d in chars.by_ref() {
                        if d == '}' {
                            break;
                        }
                        digits.push(d);
                    }
                    if let Ok(n) = u32::from_str_radix(&digits, 16) {
                        if let Some(ch) = char::from_u32(n) {
                            out.push(ch);
                        }
                    }
                } else {
                    out.push('u');
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_interprets_common_escapes() {
        assert_eq!(unescape(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(unescape(r#"\"quoted\""#), "\"quoted\"");
    }

    #[test]
    fn unescape_interprets_unicode_escape() {
        assert_eq!(unescape(r"\u{41}"), "A");
    }

    #[test]
    fn builds_a_trivial_single_rule_grammar() {
        let grammar = build_grammar("grammar Mini\nRoot := 'a'\n").expect("should build");
        assert_eq!(grammar.root, "Root");
        assert!(grammar.group("Root").is_some());
    }

    #[test]
    fn rejects_unknown_references() {
        let err = build_grammar("grammar Mini\nRoot := Missing\n").unwrap_err();
        assert!(err.message.contains("Missing") || err.what.contains("Root"));
    }

    #[test]
    fn rejects_cross_grammar_references() {
        let err = build_grammar("grammar Mini\nRoot := Other.Thing\n").unwrap_err();
        assert!(err.message.to_lowercase().contains("cross") || err.message.contains("Other"));
    }
}

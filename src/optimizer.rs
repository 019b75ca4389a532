//! Optimizer (§4.6): local AST rewrites plus a push-up pass that inlines
//! trivial single-definition wrapper rules, followed by the first-character
//! filter analyzer. Produces the [`OptimizedGrammar`] the parser consumes.
//!
//! The distilled spec allows either "repeatedly until fixpoint" or "two
//! ordered passes — canonicalization then push-up"; this module takes the
//! latter, since every canonicalization rule below only ever shrinks or
//! reshapes a node using its already-canonicalized children, so a single
//! bottom-up sweep already leaves nothing further for the same rule set to
//! do.

use std::collections::HashMap;
use std::mem;

use crate::ir::{Definition, Expr, ExprKind, Grammar, OptimizedGrammar};

/// Run the optimizer over a freshly built, recursion-analyzed [`Grammar`],
/// producing the immutable [`OptimizedGrammar`] the parser operates on.
pub fn optimize(mut grammar: Grammar) -> OptimizedGrammar {
    let whitespace = grammar.options.whitespace_rule.clone();
    let names: Vec<String> = grammar.groups.keys().cloned().collect();
    for name in &names {
        let mut group = grammar.groups.remove(name).unwrap();
        for def in group.definitions.iter_mut() {
            let instance = mem::replace(&mut def.instance, Expr::sequence(vec![]));
            def.instance = canonicalize(instance, whitespace.as_deref());
        }
        grammar.groups.insert(name.clone(), group);
    }

    push_up(&mut grammar);
    crate::filter::analyze(&mut grammar);
    OptimizedGrammar(grammar)
}

// ---------------------------------------------------------------------
// Canonicalization: QuoteExpander, GroupSimplifier, OptionalSimplifier,
// OrFlattener, SequenceFlattener, CaptureSimplifier.
// ---------------------------------------------------------------------

fn canonicalize(expr: Expr, whitespace: Option<&str>) -> Expr {
    let Expr { id, kind } = expr;
    if let ExprKind::Quote(text) = kind {
        return expand_quote(text, whitespace);
    }

    let rebuilt_kind = match kind {
        ExprKind::Group(inner) => ExprKind::Group(Box::new(canonicalize(*inner, whitespace))),
        ExprKind::Optional(inner) => ExprKind::Optional(Box::new(canonicalize(*inner, whitespace))),
        ExprKind::Or(alts) => ExprKind::Or(alts.into_iter().map(|a| canonicalize(a, whitespace)).collect()),
        ExprKind::Sequence(items) => {
            ExprKind::Sequence(items.into_iter().map(|i| canonicalize(i, whitespace)).collect())
        }
        ExprKind::Repeat { expr, from, to } => ExprKind::Repeat {
            expr: Box::new(canonicalize(*expr, whitespace)),
            from,
            to,
        },
        ExprKind::Separated { expr, separator } => ExprKind::Separated {
            expr: Box::new(canonicalize(*expr, whitespace)),
            separator: Box::new(canonicalize(*separator, whitespace)),
        },
        ExprKind::AndNot { expr, not_expr } => ExprKind::AndNot {
            expr: Box::new(canonicalize(*expr, whitespace)),
            not_expr: Box::new(canonicalize(*not_expr, whitespace)),
        },
        ExprKind::As { expr, value } => ExprKind::As {
            expr: Box::new(canonicalize(*expr, whitespace)),
            value,
        },
        ExprKind::Declaration { name, expr } => ExprKind::Declaration {
            name,
            expr: Box::new(canonicalize(*expr, whitespace)),
        },
        ExprKind::Capture(inner) => ExprKind::Capture(Box::new(canonicalize(*inner, whitespace))),
        other => other,
    };

    simplify(Expr { id, kind: rebuilt_kind })
}

fn expand_quote(text: String, whitespace: Option<&str>) -> Expr {
    let mut chars = text.chars();
    let first = chars.next();
    let literal = match (first, chars.next()) {
        (Some(c), None) => Expr::new(ExprKind::Char(c)),
        _ => Expr::new(ExprKind::StringLit(text)),
    };
    let captured = Expr::capture(literal);
    match whitespace {
        Some(w) => Expr::group(Expr::sequence(vec![Expr::reference(w), captured, Expr::reference(w)])),
        None => captured,
    }
}

fn simplify(expr: Expr) -> Expr {
    let Expr { id, kind } = expr;
    match kind {
        // Group(Sequence[x]) with one child -> x.
        ExprKind::Group(inner) => {
            let Expr { id: inner_id, kind: inner_kind } = *inner;
            if let ExprKind::Sequence(mut items) = inner_kind {
                if items.len() == 1 {
                    return items.pop().unwrap();
                }
                Expr {
                    id,
                    kind: ExprKind::Group(Box::new(Expr {
                        id: inner_id,
                        kind: ExprKind::Sequence(items),
                    })),
                }
            } else {
                Expr {
                    id,
                    kind: ExprKind::Group(Box::new(Expr { id: inner_id, kind: inner_kind })),
                }
            }
        }

        // Optional(Sequence[Optional(s)]) -> Optional(s); an Optional whose
        // sequence elements are all themselves Optional -> Group (drops one
        // layer of nullability without changing what can match).
        ExprKind::Optional(inner) => {
            let Expr { id: inner_id, kind: inner_kind } = *inner;
            if let ExprKind::Sequence(mut items) = inner_kind {
                if items.len() == 1 && matches!(items[0].kind, ExprKind::Optional(_)) {
                    return items.pop().unwrap();
                }
                if !items.is_empty() && items.iter().all(|it| matches!(it.kind, ExprKind::Optional(_))) {
                    return Expr {
                        id,
                        kind: ExprKind::Group(Box::new(Expr {
                            id: inner_id,
                            kind: ExprKind::Sequence(items),
                        })),
                    };
                }
                Expr {
                    id,
                    kind: ExprKind::Optional(Box::new(Expr {
                        id: inner_id,
                        kind: ExprKind::Sequence(items),
                    })),
                }
            } else {
                Expr {
                    id,
                    kind: ExprKind::Optional(Box::new(Expr { id: inner_id, kind: inner_kind })),
                }
            }
        }

        // Or(..., Or(a, b), ...) -> flatten nested Or.
        ExprKind::Or(alts) => {
            let mut flat = Vec::with_capacity(alts.len());
            for alt in alts {
                if let ExprKind::Or(inner_alts) = alt.kind {
                    flat.extend(inner_alts);
                } else {
                    flat.push(alt);
                }
            }
            Expr { id, kind: ExprKind::Or(flat) }
        }

        // Sequence(..., Group(Sequence(a, b)), ...) -> inline the inner sequence.
        ExprKind::Sequence(items) => {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                if let ExprKind::Group(boxed) = item.kind {
                    if let ExprKind::Sequence(inner_items) = boxed.kind {
                        flat.extend(inner_items);
                        continue;
                    }
                    flat.push(Expr {
                        id: item.id,
                        kind: ExprKind::Group(boxed),
                    });
                    continue;
                }
                flat.push(item);
            }
            Expr { id, kind: ExprKind::Sequence(flat) }
        }

        // Capture(Capture(x)) -> Capture(x).
        ExprKind::Capture(inner) => {
            let Expr { id: inner_id, kind: inner_kind } = *inner;
            if let ExprKind::Capture(nested) = inner_kind {
                Expr { id, kind: ExprKind::Capture(nested) }
            } else {
                Expr {
                    id,
                    kind: ExprKind::Capture(Box::new(Expr { id: inner_id, kind: inner_kind })),
                }
            }
        }

        other => Expr { id, kind: other },
    }
}

// ---------------------------------------------------------------------
// Push-up: eliminate trivial single-definition wrapper rules.
// ---------------------------------------------------------------------

fn contains_declaration(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Declaration { .. } => true,
        ExprKind::Group(inner)
        | ExprKind::Optional(inner)
        | ExprKind::Capture(inner)
        | ExprKind::As { expr: inner, .. }
        | ExprKind::Repeat { expr: inner, .. }
        | ExprKind::Separated { expr: inner, .. } => contains_declaration(inner),
        ExprKind::AndNot { expr, not_expr } => contains_declaration(expr) || contains_declaration(not_expr),
        ExprKind::Or(items) | ExprKind::Sequence(items) => items.iter().any(contains_declaration),
        _ => false,
    }
}

fn find_boundary(items: &[Expr]) -> Option<usize> {
    items
        .iter()
        .position(|e| matches!(e.kind, ExprKind::Optional(_)) || contains_declaration(e))
}

fn sequence_items(def: &Definition) -> Option<Vec<Expr>> {
    match &def.instance.kind {
        ExprKind::Sequence(items) => Some(items.clone()),
        ExprKind::Group(inner) => match &inner.kind {
            ExprKind::Sequence(items) => Some(items.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Deep-clone `expr`, assigning every node a fresh [`crate::ir::ExprId`] so
/// that inlining the same wrapper rule at several reference sites never
/// makes two unrelated nodes share an id (ids are the back-edge currency of
/// the recursion analyzer).
fn reid(expr: &Expr) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Group(inner) => ExprKind::Group(Box::new(reid(inner))),
        ExprKind::Optional(inner) => ExprKind::Optional(Box::new(reid(inner))),
        ExprKind::Or(alts) => ExprKind::Or(alts.iter().map(reid).collect()),
        ExprKind::Sequence(items) => ExprKind::Sequence(items.iter().map(reid).collect()),
        ExprKind::Repeat { expr, from, to } => ExprKind::Repeat {
            expr: Box::new(reid(expr)),
            from: *from,
            to: *to,
        },
        ExprKind::Separated { expr, separator } => ExprKind::Separated {
            expr: Box::new(reid(expr)),
            separator: Box::new(reid(separator)),
        },
        ExprKind::AndNot { expr, not_expr } => ExprKind::AndNot {
            expr: Box::new(reid(expr)),
            not_expr: Box::new(reid(not_expr)),
        },
        ExprKind::As { expr, value } => ExprKind::As {
            expr: Box::new(reid(expr)),
            value: value.clone(),
        },
        ExprKind::Declaration { name, expr } => ExprKind::Declaration {
            name: name.clone(),
            expr: Box::new(reid(expr)),
        },
        ExprKind::Capture(inner) => ExprKind::Capture(Box::new(reid(inner))),
        other => other.clone(),
    };
    Expr::new(kind)
}

fn inline_references(expr: Expr, lookup: &HashMap<String, Vec<Expr>>) -> Expr {
    let Expr { id, kind } = expr;
    match kind {
        ExprKind::Reference(name) => {
            if let Some(prefix) = lookup.get(&name) {
                let mut items: Vec<Expr> = prefix.iter().map(reid).collect();
                items.push(Expr::new(ExprKind::Reference(name)));
                Expr { id, kind: ExprKind::Sequence(items) }
            } else {
                Expr { id, kind: ExprKind::Reference(name) }
            }
        }
        ExprKind::Group(inner) => Expr {
            id,
            kind: ExprKind::Group(Box::new(inline_references(*inner, lookup))),
        },
        ExprKind::Optional(inner) => Expr {
            id,
            kind: ExprKind::Optional(Box::new(inline_references(*inner, lookup))),
        },
        ExprKind::Or(alts) => Expr {
            id,
            kind: ExprKind::Or(alts.into_iter().map(|a| inline_references(a, lookup)).collect()),
        },
        ExprKind::Sequence(items) => Expr {
            id,
            kind: ExprKind::Sequence(items.into_iter().map(|i| inline_references(i, lookup)).collect()),
        },
        ExprKind::Repeat { expr, from, to } => Expr {
            id,
            kind: ExprKind::Repeat {
                expr: Box::new(inline_references(*expr, lookup)),
                from,
                to,
            },
        },
        ExprKind::Separated { expr, separator } => Expr {
            id,
            kind: ExprKind::Separated {
                expr: Box::new(inline_references(*expr, lookup)),
                separator: Box::new(inline_references(*separator, lookup)),
            },
        },
        ExprKind::AndNot { expr, not_expr } => Expr {
            id,
            kind: ExprKind::AndNot {
                expr: Box::new(inline_references(*expr, lookup)),
                not_expr: Box::new(inline_references(*not_expr, lookup)),
            },
        },
        ExprKind::As { expr, value } => Expr {
            id,
            kind: ExprKind::As {
                expr: Box::new(inline_references(*expr, lookup)),
                value,
            },
        },
        ExprKind::Declaration { name, expr } => Expr {
            id,
            kind: ExprKind::Declaration {
                name,
                expr: Box::new(inline_references(*expr, lookup)),
            },
        },
        ExprKind::Capture(inner) => Expr {
            id,
            kind: ExprKind::Capture(Box::new(inline_references(*inner, lookup))),
        },
        other => Expr { id, kind: other },
    }
}

/// Only non-root, single-definition, non-recursive groups whose body is a
/// sequence are candidates — exactly the "trivial wrapping rule" shape the
/// distilled spec describes. Recursive groups are skipped even if they
/// otherwise qualify, so push-up can never disturb a back-edge id recorded
/// by the recursion analyzer.
fn push_up(grammar: &mut Grammar) {
    let names: Vec<String> = grammar.groups.keys().cloned().collect();
    let mut splits: Vec<(String, Vec<Expr>, Vec<Expr>)> = Vec::new();

    for name in &names {
        if name == &grammar.root {
            continue;
        }
        let group = &grammar.groups[name];
        if group.definitions.len() != 1 {
            continue;
        }
        let def = &group.definitions[0];
        if def.is_recursive() {
            continue;
        }
        let items = match sequence_items(def) {
            Some(items) => items,
            None => continue,
        };
        if let Some(boundary) = find_boundary(&items) {
            if boundary > 0 && boundary < items.len() {
                let prefix = items[..boundary].to_vec();
                let tail = items[boundary..].to_vec();
                splits.push((name.clone(), prefix, tail));
            }
        }
    }

    if splits.is_empty() {
        return;
    }

    for (name, _, tail) in &splits {
        let new_instance = if tail.len() == 1 {
            tail[0].clone()
        } else {
            Expr::sequence(tail.clone())
        };
        if let Some(group) = grammar.groups.get_mut(name) {
            group.definitions[0].instance = new_instance;
        }
    }

    let lookup: HashMap<String, Vec<Expr>> = splits.into_iter().map(|(n, p, _)| (n, p)).collect();
    for (gname, group) in grammar.groups.iter_mut() {
        if lookup.contains_key(gname) {
            continue;
        }
        for def in group.definitions.iter_mut() {
            let instance = mem::replace(&mut def.instance, Expr::sequence(vec![]));
            def.instance = inline_references(instance, &lookup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn quote_expands_to_captured_char_without_whitespace() {
        let expanded = expand_quote("+".to_string(), None);
        match expanded.kind {
            ExprKind::Capture(inner) => assert!(matches!(inner.kind, ExprKind::Char('+'))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn quote_wraps_with_whitespace_rule() {
        let expanded = expand_quote("abc".to_string(), Some("_"));
        match expanded.kind {
            ExprKind::Group(inner) => match inner.kind {
                ExprKind::Sequence(items) => {
                    assert_eq!(items.len(), 3);
                    assert!(matches!(items[0].kind, ExprKind::Reference(ref n) if n == "_"));
                    assert!(matches!(items[1].kind, ExprKind::Capture(_)));
                    assert!(matches!(items[2].kind, ExprKind::Reference(ref n) if n == "_"));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn group_of_single_item_sequence_collapses() {
        let inner = Expr::new(ExprKind::Char('a'));
        let wrapped = Expr::group(Expr::sequence(vec![inner]));
        let simplified = canonicalize(wrapped, None);
        assert!(matches!(simplified.kind, ExprKind::Char('a')));
    }

    #[test]
    fn nested_or_flattens() {
        let a = Expr::new(ExprKind::Char('a'));
        let b = Expr::new(ExprKind::Char('b'));
        let c = Expr::new(ExprKind::Char('c'));
        let nested = Expr::or(vec![a, Expr::or(vec![b, c])]);
        let flat = canonicalize(nested, None);
        match flat.kind {
            ExprKind::Or(alts) => assert_eq!(alts.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn push_up_inlines_trivial_prefix() {
        // wrapper := "(" body ; used := wrapper sometimes
        let mut grammar = Grammar {
            groups: Default::default(),
            root: "used".into(),
            options: GrammarOptions::default(),
        };
        let mut wrapper = DefinitionGroup::new("wrapper");
        wrapper.definitions.push(Definition {
            name: "wrapper".into(),
            precedence: None,
            associativity: Associativity::Left,
            def_type: DefinitionType::Helper,
            instance: Expr::sequence(vec![
                Expr::new(ExprKind::Char('(')),
                Expr::optional(Expr::new(ExprKind::Char('x'))),
            ]),
            recursiveness: REC_NON,
            filter: None,
        });
        grammar.groups.insert("wrapper".into(), wrapper);

        let mut used = DefinitionGroup::new("used");
        used.definitions.push(Definition {
            name: "used".into(),
            precedence: None,
            associativity: Associativity::Left,
            def_type: DefinitionType::Declaration,
            instance: Expr::reference("wrapper"),
            recursiveness: REC_NON,
            filter: None,
        });
        grammar.groups.insert("used".into(), used);

        push_up(&mut grammar);

        let used_instance = &grammar.groups["used"].definitions[0].instance;
        match &used_instance.kind {
            ExprKind::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].kind, ExprKind::Char('(')));
                assert!(matches!(items[1].kind, ExprKind::Reference(ref n) if n == "wrapper"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let wrapper_instance = &grammar.groups["wrapper"].definitions[0].instance;
        assert!(matches!(wrapper_instance.kind, ExprKind::Optional(_)));
    }
}

//! Recursion analyzer (§4.4): classifies every definition as non-, left-,
//! right- or full-recursive and rejects invalid recursion/precedence
//! combinations.
//!
//! The "two-dimensional walk" of the distilled spec — probing a sequence
//! left-to-right and right-to-left with a notion of "exclusive" blocking
//! further propagation — collapses to two independent single-direction
//! passes per definition ([`Side::Left`], [`Side::Right`]); `Full` is simply
//! the case where both passes report a hit, rather than a third masked pass,
//! since a single expression's standalone "guarantees progress" answer never
//! depends on which side is being probed.

use std::collections::HashSet;

use crate::error::GrammarError;
use crate::ir::{
    is_left_recursive, Definition, Expr, ExprId, ExprKind, Grammar, RecFlags, REC_EXCLUSIVE,
    REC_FULL, REC_LEFT, REC_NON, REC_RIGHT,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn bit(self) -> RecFlags {
        match self {
            Side::Left => REC_LEFT,
            Side::Right => REC_RIGHT,
        }
    }
}

struct Walk<'g> {
    grammar: &'g Grammar,
    group_name: &'g str,
    back_edges: Vec<ExprId>,
}

impl<'g> Walk<'g> {
    fn classify(&mut self, expr: &Expr, side: Side, visited: &mut HashSet<String>) -> RecFlags {
        match &expr.kind {
            ExprKind::Quote(_)
            | ExprKind::StringLit(_)
            | ExprKind::Char(_)
            | ExprKind::Range(_, _)
            | ExprKind::CharSet { .. } => REC_EXCLUSIVE,

            ExprKind::Reference(name) if name == self.group_name => {
                self.back_edges.push(expr.id);
                side.bit() | REC_EXCLUSIVE
            }

            ExprKind::Reference(name) => {
                if visited.contains(name) {
                    // Already descending through this name on this path:
                    // treat as an opaque terminal rather than loop forever.
                    return REC_EXCLUSIVE;
                }
                let mut flags = REC_NON;
                let mut exclusive = true;
                if let Some(group) = self.grammar.groups.get(name) {
                    visited.insert(name.clone());
                    for def in group.definitions.iter().filter(|d| d.precedence.is_none()) {
                        let f = self.classify(&def.instance, side, visited);
                        flags |= f & side.bit();
                        exclusive &= f & REC_EXCLUSIVE != 0;
                    }
                    visited.remove(name);
                }
                if exclusive {
                    flags |= REC_EXCLUSIVE;
                }
                flags
            }

            ExprKind::Group(inner) => self.classify(inner, side, visited),

            ExprKind::Optional(inner) => self.classify(inner, side, visited) & !REC_EXCLUSIVE,

            ExprKind::Repeat { expr, .. } => self.classify(expr, side, visited),
            ExprKind::Separated { expr, .. } => self.classify(expr, side, visited),
            ExprKind::AndNot { expr, .. } => self.classify(expr, side, visited),
            ExprKind::As { expr, .. } => self.classify(expr, side, visited),
            ExprKind::Declaration { expr, .. } => self.classify(expr, side, visited),
            ExprKind::Capture(expr) => self.classify(expr, side, visited),

            ExprKind::Or(alts) => {
                let mut flags = REC_NON;
                let mut exclusive = true;
                for alt in alts {
                    let f = self.classify(alt, side, visited);
                    flags |= f & side.bit();
                    exclusive &= f & REC_EXCLUSIVE != 0;
                }
                if exclusive {
                    flags |= REC_EXCLUSIVE;
                }
                flags
            }

            ExprKind::Sequence(items) => {
                let mut flags = REC_NON;
                let indices: Box<dyn Iterator<Item = &Expr>> = if side == Side::Left {
                    Box::new(items.iter())
                } else {
                    Box::new(items.iter().rev())
                };
                for item in indices {
                    let f = self.classify(item, side, visited);
                    flags |= f & side.bit();
                    if f & REC_EXCLUSIVE != 0 {
                        flags |= REC_EXCLUSIVE;
                        break;
                    }
                }
                flags
            }
        }
    }
}

fn classify_definition(def: &Definition, group_name: &str, grammar: &Grammar) -> (RecFlags, Vec<ExprId>) {
    let mut walk = Walk {
        grammar,
        group_name,
        back_edges: Vec::new(),
    };
    let left = walk.classify(&def.instance, Side::Left, &mut HashSet::new());
    let right = walk.classify(&def.instance, Side::Right, &mut HashSet::new());

    let mut flags = (left & REC_LEFT) | (right & REC_RIGHT);
    if (left & REC_EXCLUSIVE != 0) && (right & REC_EXCLUSIVE != 0) {
        flags |= REC_EXCLUSIVE;
    }
    if flags & REC_LEFT != 0 && flags & REC_RIGHT != 0 {
        flags |= REC_FULL;
    }
    (flags, walk.back_edges)
}

/// Run the recursion analyzer over every group in `grammar`, filling in
/// each `Definition::recursiveness`, each `DefinitionGroup::recursiveness`
/// and each `DefinitionGroup::reference_min_precedents`, and validating the
/// recursion/precedence invariants of §3.4.
pub fn analyze(grammar: &mut Grammar) -> Result<(), GrammarError> {
    let names: Vec<String> = grammar.groups.keys().cloned().collect();

    for name in &names {
        let group_snapshot = grammar.groups.get(name).unwrap().clone();
        let mut per_def = Vec::with_capacity(group_snapshot.definitions.len());
        for def in &group_snapshot.definitions {
            per_def.push(classify_definition(def, name, grammar));
        }

        let group = grammar.groups.get_mut(name).unwrap();
        let mut group_flags = REC_NON;
        for (def, (flags, _)) in group.definitions.iter_mut().zip(per_def.iter()) {
            def.recursiveness = *flags;
            group_flags |= *flags;
        }
        group.recursiveness = group_flags;

        for (def, (flags, back_edges)) in group.definitions.iter().zip(per_def.iter()) {
            if let Some(prec) = def.precedence {
                let tie_bumps_left = group
                    .definitions
                    .iter()
                    .any(|other| other.precedence == Some(prec) && other.associativity == crate::ir::Associativity::Left);
                let min_prec = prec + if tie_bumps_left { 1 } else { 0 };
                for id in back_edges {
                    group.reference_min_precedents.insert(*id, min_prec);
                }
            }
            let _ = flags;
        }
    }

    for name in &names {
        let group = grammar.groups.get(name).unwrap();
        for def in &group.definitions {
            match def.precedence {
                None => {
                    if def.recursiveness & (REC_LEFT | REC_RIGHT | REC_FULL) != 0 {
                        return Err(GrammarError::recursion_precedence_violation(
                            name,
                            "a definition without an explicit precedence must be non-recursive",
                        ));
                    }
                }
                Some(_) => {
                    if group.recursiveness & (REC_LEFT | REC_RIGHT | REC_FULL) == 0 {
                        return Err(GrammarError::recursion_precedence_violation(
                            name,
                            "a definition with an explicit precedence must belong to a group containing at least one recursive alternative",
                        ));
                    }
                }
            }
        }
    }

    let _ = is_left_recursive;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn seq(items: Vec<Expr>) -> Expr {
        Expr::sequence(items)
    }

    fn lit(s: &str) -> Expr {
        Expr::new(ExprKind::StringLit(s.to_string()))
    }

    fn def(name: &str, prec: Option<u32>, assoc: Associativity, instance: Expr) -> Definition {
        Definition {
            name: name.to_string(),
            precedence: prec,
            associativity: assoc,
            def_type: DefinitionType::Declaration,
            instance,
            recursiveness: REC_NON,
            filter: None,
        }
    }

    #[test]
    fn left_recursive_operator_classified_left_and_full_absent() {
        // expr := expr "+" term   (left recursive, single side)
        let mut grammar = Grammar {
            groups: Default::default(),
            root: "expr".into(),
            options: GrammarOptions::default(),
        };
        let mut group = DefinitionGroup::new("expr");
        group.definitions.push(def(
            "expr",
            Some(0),
            Associativity::Left,
            seq(vec![Expr::reference("expr"), lit("+"), Expr::reference("term")]),
        ));
        group.definitions.push(def("expr", None, Associativity::Left, Expr::reference("term")));
        grammar.groups.insert("expr".into(), group);

        let mut term_group = DefinitionGroup::new("term");
        term_group
            .definitions
            .push(def("term", None, Associativity::Left, lit("x")));
        grammar.groups.insert("term".into(), term_group);

        analyze(&mut grammar).unwrap();
        let expr_group = grammar.groups.get("expr").unwrap();
        assert!(expr_group.definitions[0].recursiveness & REC_LEFT != 0);
        assert!(expr_group.definitions[0].recursiveness & REC_FULL == 0);
        assert_eq!(expr_group.definitions[1].recursiveness, REC_EXCLUSIVE);
    }

    #[test]
    fn unprecedented_recursive_definition_is_rejected() {
        let mut grammar = Grammar {
            groups: Default::default(),
            root: "expr".into(),
            options: GrammarOptions::default(),
        };
        let mut group = DefinitionGroup::new("expr");
        group.definitions.push(def(
            "expr",
            None,
            Associativity::Left,
            seq(vec![Expr::reference("expr"), lit("+")]),
        ));
        grammar.groups.insert("expr".into(), group);
        assert!(analyze(&mut grammar).is_err());
    }
}

//! First-character filter analyzer (§4.5): for each group, approximate the
//! set of characters it can start with and whether it is guaranteed to
//! consume at least one of them. The parser consults this before attempting
//! a definition so that hopeless alternatives fail without transacting.
//!
//! Runs after the optimizer's rewrite passes (see `optimizer::optimize`), so
//! by the time this analyzer sees a tree, `Quote` has already been expanded
//! into `String`/`Char` — there is no separate quote-handling case here.

use std::collections::{HashMap, HashSet};

use crate::charset::CharSet;
use crate::ir::{CharSetSpec, Expr, ExprKind, Filter, Grammar};

struct Analyzer<'g> {
    grammar: &'g Grammar,
    computed: HashMap<String, Filter>,
    visiting: HashSet<String>,
    /// (depender, dependency): depender's set is missing dependency's
    /// contribution because dependency was mid-evaluation when referenced.
    fixups: Vec<(String, String)>,
    def_filters: HashMap<String, Vec<Filter>>,
}

impl<'g> Analyzer<'g> {
    fn compute_group(&mut self, name: &str) -> Filter {
        if let Some(f) = self.computed.get(name) {
            return f.clone();
        }
        let group = match self.grammar.groups.get(name) {
            Some(g) => g,
            None => return Filter::new(CharSet::new(), false),
        };

        self.visiting.insert(name.to_string());
        let mut set = CharSet::new();
        let mut exclusive = true;
        let mut per_def = Vec::with_capacity(group.definitions.len());
        for def in &group.definitions {
            let f = self.compute_expr(&def.instance, name);
            set.union_set(&f.char_set);
            exclusive &= f.exclusive;
            per_def.push(f);
        }
        self.visiting.remove(name);

        let filter = Filter::new(set, exclusive);
        self.computed.insert(name.to_string(), filter.clone());
        self.def_filters.insert(name.to_string(), per_def);
        filter
    }

    fn compute_expr(&mut self, expr: &Expr, current_group: &str) -> Filter {
        match &expr.kind {
            ExprKind::Char(c) => Filter::new(CharSet::single(*c), true),
            ExprKind::Range(a, b) => Filter::new(CharSet::range(*a, *b), true),
            ExprKind::Quote(s) | ExprKind::StringLit(s) => match s.chars().next() {
                Some(c) => Filter::new(CharSet::single(c), true),
                None => Filter::new(CharSet::new(), false),
            },
            ExprKind::CharSet { spec, negate } => {
                let base = match spec {
                    CharSetSpec::All => CharSet::full(),
                    CharSetSpec::Entries(entries) => {
                        let mut set = CharSet::new();
                        for entry in entries {
                            match entry {
                                crate::ir::CharSetEntry::Char(c) => set.union_range(*c as u32, *c as u32),
                                crate::ir::CharSetEntry::Range(a, b) => set.union_range(*a as u32, *b as u32),
                            }
                        }
                        set
                    }
                };
                let set = if *negate { base.inverted() } else { base };
                Filter::new(set, true)
            }
            ExprKind::Or(alts) => {
                let mut set = CharSet::new();
                let mut exclusive = true;
                for alt in alts {
                    let f = self.compute_expr(alt, current_group);
                    set.union_set(&f.char_set);
                    exclusive &= f.exclusive;
                }
                Filter::new(set, exclusive)
            }
            ExprKind::Group(inner) => self.compute_expr(inner, current_group),
            ExprKind::Optional(inner) => {
                let f = self.compute_expr(inner, current_group);
                Filter::new(f.char_set, false)
            }
            ExprKind::Sequence(items) => {
                let mut set = CharSet::new();
                let mut exclusive = false;
                for item in items {
                    let f = self.compute_expr(item, current_group);
                    set.union_set(&f.char_set);
                    if f.exclusive {
                        exclusive = true;
                        break;
                    }
                }
                Filter::new(set, exclusive)
            }
            ExprKind::Repeat { expr, from, .. } => {
                let inner = self.compute_expr(expr, current_group);
                if *from == 0 {
                    Filter::new(inner.char_set, false)
                } else {
                    inner
                }
            }
            ExprKind::Separated { expr, .. } => self.compute_expr(expr, current_group),
            ExprKind::AndNot { expr, .. } => self.compute_expr(expr, current_group),
            ExprKind::As { expr, .. } => self.compute_expr(expr, current_group),
            ExprKind::Declaration { expr, .. } => self.compute_expr(expr, current_group),
            ExprKind::Capture(expr) => self.compute_expr(expr, current_group),
            ExprKind::Reference(name) => {
                if name == current_group || self.visiting.contains(name) {
                    self.fixups.push((current_group.to_string(), name.clone()));
                    Filter::new(CharSet::new(), false)
                } else if let Some(f) = self.computed.get(name) {
                    f.clone()
                } else {
                    self.compute_group(name)
                }
            }
        }
    }
}

/// Run the first-character filter analyzer over every group in `grammar`,
/// filling in each `DefinitionGroup::filter` and each `Definition::filter`.
pub fn analyze(grammar: &mut Grammar) {
    let names: Vec<String> = grammar.groups.keys().cloned().collect();
    let mut analyzer = Analyzer {
        grammar,
        computed: HashMap::new(),
        visiting: HashSet::new(),
        fixups: Vec::new(),
        def_filters: HashMap::new(),
    };
    for name in &names {
        analyzer.compute_group(name);
    }

    let Analyzer {
        mut computed,
        fixups,
        mut def_filters,
        ..
    } = analyzer;

    // Monotone fixed point: each round, pull every dependency's current set
    // into its depender's. Sets only grow, so this terminates; bounded by
    // the number of groups to be safe against longer fixup chains than the
    // "one extra pass" common case.
    for _ in 0..=names.len() {
        let mut changed = false;
        for (depender, dependency) in &fixups {
            let addition = computed.get(dependency).cloned();
            if let (Some(addition), Some(current)) = (addition, computed.get(depender).cloned()) {
                let merged = current.union(&addition);
                if merged != current {
                    computed.insert(depender.clone(), merged.clone());
                    if let Some(defs) = def_filters.get_mut(depender) {
                        for f in defs.iter_mut() {
                            *f = f.union(&addition);
                        }
                    }
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    for name in &names {
        if let Some(filter) = computed.remove(name) {
            if let Some(group) = grammar.groups.get_mut(name) {
                group.filter = Some(filter);
            }
        }
        if let Some(defs) = def_filters.remove(name) {
            if let Some(group) = grammar.groups.get_mut(name) {
                for (def, filter) in group.definitions.iter_mut().zip(defs.into_iter()) {
                    def.filter = Some(filter);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn group_with(name: &str, instance: Expr) -> DefinitionGroup {
        let mut group = DefinitionGroup::new(name);
        group.definitions.push(Definition {
            name: name.to_string(),
            precedence: None,
            associativity: Associativity::Left,
            def_type: DefinitionType::Helper,
            instance,
            recursiveness: REC_NON,
            filter: None,
        });
        group
    }

    #[test]
    fn literal_filter_is_exclusive_singleton() {
        let mut grammar = Grammar {
            groups: Default::default(),
            root: "a".into(),
            options: GrammarOptions::default(),
        };
        grammar
            .groups
            .insert("a".into(), group_with("a", Expr::new(ExprKind::StringLit("foo".into()))));
        analyze(&mut grammar);
        let filter = grammar.groups["a"].filter.clone().unwrap();
        assert!(filter.exclusive);
        assert!(filter.char_set.contains('f'));
        assert!(!filter.char_set.contains('o'));
    }

    #[test]
    fn mutually_recursive_groups_converge_via_fixup() {
        let mut grammar = Grammar {
            groups: Default::default(),
            root: "a".into(),
            options: GrammarOptions::default(),
        };
        grammar.groups.insert(
            "a".into(),
            group_with(
                "a",
                Expr::or(vec![
                    Expr::new(ExprKind::StringLit("x".into())),
                    Expr::reference("b"),
                ]),
            ),
        );
        grammar.groups.insert(
            "b".into(),
            group_with(
                "b",
                Expr::or(vec![
                    Expr::new(ExprKind::StringLit("y".into())),
                    Expr::reference("a"),
                ]),
            ),
        );
        analyze(&mut grammar);
        let fa = grammar.groups["a"].filter.clone().unwrap();
        let fb = grammar.groups["b"].filter.clone().unwrap();
        assert!(fa.char_set.contains('x'));
        assert!(fa.char_set.contains('y'));
        assert!(fb.char_set.contains('x'));
        assert!(fb.char_set.contains('y'));
    }
}

//! Packrat parser (§4.7): memoized recursive-descent evaluation of an
//! [`OptimizedGrammar`] against a [`TokenStream`], including Warth-style
//! seed growing for left-recursive groups (§4.7.3).
//!
//! Memoization works by looking up a cached entry keyed by stream position,
//! reusing it on a hit, computing and inserting it on a miss; dispatch among
//! a named rule's several alternatives filters by a precomputed first
//! character before committing to a full parse attempt.
//!
//! Internally every combinator returns [`PResult`], which keeps an ordinary
//! parse miss (§7: "never an error") distinct from the two real error kinds.
//! Only [`parse_text`]/[`parse_stream`] collapse that three-way outcome down
//! to the public `Result<Option<Item>, CoreError>` shape.

use std::collections::HashMap;

use crate::charset::CharSet;
use crate::error::{CoreError, GrammarError, ParserError};
use crate::ir::{
    Associativity, CharSetSpec, Definition, DefinitionType, Expr, ExprId, ExprKind, OptimizedGrammar,
};
use crate::item::{merge, Item, Node, Span};
use crate::stream::{StrStream, TokenStream};
use crate::util::Log;

/// The three-way outcome of attempting one combinator (§7). `NoMatch` is the
/// ordinary "this alternative doesn't apply here" result and must never be
/// reported to a caller as an error; `Grammar`/`Parser` are the two real
/// error kinds and abort the parse in progress (§7: "No error-recovery
/// attempt: a single error ends parsing").
enum Fail {
    NoMatch,
    Grammar(GrammarError),
    Parser(ParserError),
}

impl From<ParserError> for Fail {
    fn from(e: ParserError) -> Self {
        Fail::Parser(e)
    }
}

type PResult = Result<Item, Fail>;

/// A memoized attempt at a named group, keyed by `(stream position, group
/// name)` (§4.7.2). `Evaluating` marks a group currently being attempted at
/// this position — re-entering it here is the left-recursion signal the
/// seed-growing loop watches for, and is an ordinary `NoMatch`, not a fault:
/// it is exactly how the base case of a left-recursive alternative fails
/// until a shorter alternative has grown a seed to recurse into.
#[derive(Clone)]
enum MemoState {
    Evaluating,
    Done { end: usize, item: Item },
    Failed,
}

struct ParserContext<'g, 's, S: TokenStream + ?Sized> {
    grammar: &'g OptimizedGrammar,
    stream: &'s mut S,
    memo: HashMap<(usize, String), MemoState>,
    log: Log<&'static str>,
}

impl<'g, 's, S: TokenStream + ?Sized> ParserContext<'g, 's, S> {
    fn new(grammar: &'g OptimizedGrammar, stream: &'s mut S) -> Self {
        Self {
            grammar,
            stream,
            memo: HashMap::new(),
            log: Log::None,
        }
    }

    fn peek(&mut self) -> Option<char> {
        if self.stream.eof() {
            return None;
        }
        let pos = self.stream.position();
        let c = self.stream.read().ok();
        self.stream.set_position(pos);
        c
    }

    fn char_matches(&self, wanted: char, got: char) -> bool {
        if self.grammar.options.case_sensitive {
            wanted == got
        } else {
            wanted.to_lowercase().eq(got.to_lowercase())
        }
    }

    fn match_one(&mut self, wanted: char) -> PResult {
        let pos = self.stream.position();
        if self.stream.eof() {
            return Err(Fail::NoMatch);
        }
        let got = self.stream.read()?;
        if self.char_matches(wanted, got) {
            self.stream.next();
            Ok(Item::text(got.to_string(), Some(Span::new(pos, pos + 1))))
        } else {
            self.stream.set_position(pos);
            Err(Fail::NoMatch)
        }
    }

    fn match_literal(&mut self, s: &str) -> PResult {
        let start = self.stream.position();
        for c in s.chars() {
            if self.match_one(c).is_err() {
                self.stream.set_position(start);
                return Err(Fail::NoMatch);
            }
        }
        Ok(Item::text(s.to_string(), Some(Span::new(start, start + s.chars().count()))))
    }

    fn match_range(&mut self, low: char, high: char) -> PResult {
        let pos = self.stream.position();
        if self.stream.eof() {
            return Err(Fail::NoMatch);
        }
        let got = self.stream.read()?;
        let ok = if self.grammar.options.case_sensitive {
            low <= got && got <= high
        } else {
            let lower = got.to_ascii_lowercase();
            let upper = got.to_ascii_uppercase();
            (low <= lower && lower <= high) || (low <= upper && upper <= high)
        };
        if ok {
            self.stream.next();
            Ok(Item::text(got.to_string(), Some(Span::new(pos, pos + 1))))
        } else {
            self.stream.set_position(pos);
            Err(Fail::NoMatch)
        }
    }

    fn match_charset(&mut self, spec: &CharSetSpec, negate: bool) -> PResult {
        let pos = self.stream.position();
        if self.stream.eof() {
            return Err(Fail::NoMatch);
        }
        let got = self.stream.read()?;
        let set = charset_from_spec(spec);
        let mut hit = set.contains(got);
        if !self.grammar.options.case_sensitive {
            hit = hit
                || got
                    .to_lowercase()
                    .chain(got.to_uppercase())
                    .any(|c| set.contains(c));
        }
        let ok = hit != negate;
        if ok {
            self.stream.next();
            Ok(Item::text(got.to_string(), Some(Span::new(pos, pos + 1))))
        } else {
            self.stream.set_position(pos);
            Err(Fail::NoMatch)
        }
    }

    /// Whether `expr` is built purely from leaf-like constructs (no
    /// `Reference`/`Declaration`), i.e. whether a `Repeat` over it is
    /// accumulating pieces of one token rather than a list of records
    /// (§4.7.5, and see the repeat-accumulation note in DESIGN.md).
    fn is_primitive_shape(expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Quote(_)
            | ExprKind::StringLit(_)
            | ExprKind::Char(_)
            | ExprKind::Range(_, _)
            | ExprKind::CharSet { .. } => true,
            ExprKind::Reference(_) | ExprKind::Declaration { .. } => false,
            ExprKind::Group(inner) | ExprKind::Optional(inner) | ExprKind::Capture(inner) => {
                Self::is_primitive_shape(inner)
            }
            ExprKind::Repeat { expr, .. } => Self::is_primitive_shape(expr),
            ExprKind::Separated { expr, separator } => {
                Self::is_primitive_shape(expr) && Self::is_primitive_shape(separator)
            }
            ExprKind::AndNot { expr, not_expr } => {
                Self::is_primitive_shape(expr) && Self::is_primitive_shape(not_expr)
            }
            ExprKind::As { .. } => true,
            ExprKind::Or(alts) => alts.iter().all(Self::is_primitive_shape),
            ExprKind::Sequence(items) => items.iter().all(Self::is_primitive_shape),
        }
    }

    fn parse_expr(&mut self, expr: &Expr) -> PResult {
        match &expr.kind {
            ExprKind::Quote(_) => unreachable!("Quote is expanded by the optimizer before parsing ever runs"),
            ExprKind::StringLit(s) => self.match_literal(s),
            ExprKind::Char(c) => self.match_one(*c),
            ExprKind::Range(a, b) => self.match_range(*a, *b),
            ExprKind::CharSet { spec, negate } => self.match_charset(spec, *negate),

            ExprKind::Reference(name) => self.parse_definition_group(name, Some(expr.id)),

            ExprKind::Group(inner) => self.parse_expr(inner),

            ExprKind::Optional(inner) => {
                let pos = self.stream.position();
                match self.parse_expr(inner) {
                    Ok(item) => Ok(item),
                    Err(Fail::NoMatch) => {
                        self.stream.set_position(pos);
                        Ok(Item::text("", Some(Span::new(pos, pos))))
                    }
                    Err(other) => Err(other),
                }
            }

            ExprKind::Or(alts) => {
                let start = self.stream.position();
                for alt in alts {
                    self.stream.set_position(start);
                    match self.parse_expr(alt) {
                        Ok(item) => return Ok(item),
                        Err(Fail::NoMatch) => continue,
                        Err(other) => return Err(other),
                    }
                }
                self.stream.set_position(start);
                Err(Fail::NoMatch)
            }

            ExprKind::Sequence(items) => {
                let start = self.stream.position();
                let mut acc: Option<Item> = None;
                for item in items {
                    match self.parse_expr(item) {
                        Ok(r) => acc = Some(merge(acc, r)),
                        Err(e) => {
                            self.stream.set_position(start);
                            return Err(e);
                        }
                    }
                }
                Ok(acc.unwrap_or_else(|| Item::empty_list(Some(Span::new(start, start)))))
            }

            ExprKind::Repeat { expr: inner, from, to } => self.parse_repeat(inner, *from, *to),

            ExprKind::Separated { expr: inner, separator } => self.parse_separated(inner, separator),

            ExprKind::AndNot { expr: inner, not_expr } => {
                let pos = self.stream.position();
                let lookahead = self.parse_expr(not_expr);
                self.stream.set_position(pos);
                match lookahead {
                    Ok(_) => Err(Fail::NoMatch),
                    Err(Fail::NoMatch) => self.parse_expr(inner),
                    Err(other) => Err(other),
                }
            }

            ExprKind::As { expr: inner, value } => {
                let start = self.stream.position();
                match self.parse_expr(inner) {
                    Ok(_) => Ok(Item::captured_text(value.clone(), Some(Span::new(start, self.stream.position())))),
                    Err(e) => {
                        self.stream.set_position(start);
                        Err(e)
                    }
                }
            }

            ExprKind::Declaration { name, expr: inner } => {
                let start = self.stream.position();
                let item = self.parse_expr(inner)?;
                let span = Span::new(start, self.stream.position());
                Ok(Item::node(Node::single(name.clone(), item, Some(span))))
            }

            ExprKind::Capture(inner) => {
                let start = self.stream.position();
                match self.parse_expr(inner) {
                    Ok(_) => {
                        let end = self.stream.position();
                        let text = self.stream.get_segment(start, end - start);
                        Ok(Item::captured_text(text, Some(Span::new(start, end))))
                    }
                    Err(e) => {
                        self.stream.set_position(start);
                        Err(e)
                    }
                }
            }
        }
    }

    fn parse_repeat(&mut self, inner: &Expr, from: u32, to: Option<u32>) -> PResult {
        let start = self.stream.position();
        let mut items = Vec::new();
        loop {
            if let Some(to) = to {
                if items.len() as u32 >= to {
                    break;
                }
            }
            let pos = self.stream.position();
            match self.parse_expr(inner) {
                Ok(item) => {
                    if self.stream.position() == pos {
                        // Zero-width match: stop rather than loop forever.
                        break;
                    }
                    items.push(item);
                }
                Err(Fail::NoMatch) => {
                    self.stream.set_position(pos);
                    break;
                }
                Err(other) => return Err(other),
            }
        }
        if (items.len() as u32) < from {
            self.stream.set_position(start);
            return Err(Fail::NoMatch);
        }
        let end = self.stream.position();
        let span = Some(Span::new(start, end));
        if items.is_empty() {
            // Nothing matched: a plain empty Text merges away cleanly against
            // whatever sibling is next, unlike an empty List (see DESIGN.md).
            return Ok(Item::text("", span));
        }
        if Self::is_primitive_shape(inner) && items.iter().all(Item::is_text) {
            let mut acc: Option<Item> = None;
            for item in items {
                acc = Some(merge(acc, item));
            }
            return Ok(acc.unwrap());
        }
        Ok(Item::list(items, span))
    }

    fn parse_separated(&mut self, inner: &Expr, separator: &Expr) -> PResult {
        let start = self.stream.position();
        let first = self.parse_expr(inner)?;
        let mut items = vec![first];
        loop {
            let pos = self.stream.position();
            match self.parse_expr(separator) {
                Ok(_) => {}
                Err(Fail::NoMatch) => {
                    self.stream.set_position(pos);
                    break;
                }
                Err(other) => return Err(other),
            }
            match self.parse_expr(inner) {
                Ok(item) => items.push(item),
                Err(Fail::NoMatch) => {
                    self.stream.set_position(pos);
                    break;
                }
                Err(other) => return Err(other),
            }
        }
        let end = self.stream.position();
        Ok(Item::list(items, Some(Span::new(start, end))))
    }

    fn ordered_definitions(defs: &[Definition]) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..defs.len()).collect();
        idx.sort_by(|&a, &b| {
            let pa = defs[a].precedence.unwrap_or(u32::MAX);
            let pb = defs[b].precedence.unwrap_or(u32::MAX);
            pb.cmp(&pa)
                .then_with(|| match (defs[a].associativity, defs[b].associativity) {
                    (Associativity::Right, Associativity::Left) => std::cmp::Ordering::Less,
                    (Associativity::Left, Associativity::Right) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.cmp(&b))
        });
        idx
    }

    /// Try every definition in `order` at `start`, keeping the one that
    /// advances farthest (§4.7.3). Returns `Ok(None)` when every alternative
    /// was an ordinary miss; a `Grammar`/`Parser` error from any alternative
    /// aborts the whole dispatch immediately rather than being treated as
    /// "that alternative didn't match" (§7: no error recovery).
    fn attempt_round(
        &mut self,
        group_name: &str,
        start: usize,
        min_prec: u32,
        order: &[usize],
    ) -> Result<Option<(usize, Item, DefinitionType)>, Fail> {
        let defs = self.grammar.group(group_name).unwrap().definitions.clone();
        let mut best: Option<(usize, Item, DefinitionType)> = None;
        for &i in order {
            let def = &defs[i];
            if let Some(p) = def.precedence {
                if p < min_prec && def.is_left_recursive() {
                    continue;
                }
            }
            self.stream.set_position(start);
            match self.parse_expr(&def.instance) {
                Ok(item) => {
                    let end = self.stream.position();
                    let better = match &best {
                        None => true,
                        Some((best_end, _, _)) => end > *best_end,
                    };
                    if better {
                        best = Some((end, item, def.def_type));
                    }
                }
                Err(Fail::NoMatch) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(best)
    }

    fn parse_definition_group(&mut self, name: &str, ref_id: Option<ExprId>) -> PResult {
        let start = self.stream.position();
        let key = (start, name.to_string());

        if let Some(group) = self.grammar.group(name) {
            if let Some(filter) = &group.filter {
                if filter.exclusive && !self.stream.eof() {
                    if let Some(c) = self.peek() {
                        if !filter.char_set.contains(c) {
                            return Err(Fail::NoMatch);
                        }
                    }
                }
            }
        } else {
            return Err(Fail::Grammar(GrammarError::unknown_reference("<parser>", name)));
        }

        match self.memo.get(&key) {
            Some(MemoState::Evaluating) => return Err(Fail::NoMatch),
            Some(MemoState::Done { end, item }) => {
                let end = *end;
                let item = item.clone();
                self.log.log_cache_hit(name, start);
                self.stream.set_position(end);
                return Ok(item);
            }
            Some(MemoState::Failed) => return Err(Fail::NoMatch),
            None => {}
        }

        self.log.log_group_entry(name, start);
        self.memo.insert(key.clone(), MemoState::Evaluating);

        let group = self.grammar.group(name).unwrap().clone();
        let min_prec = ref_id
            .and_then(|id| group.reference_min_precedents.get(&id).copied())
            .unwrap_or(0);
        let order = Self::ordered_definitions(&group.definitions);

        let mut best = match self.attempt_round(name, start, min_prec, &order) {
            Ok(best) => best,
            Err(e) => {
                self.memo.remove(&key);
                return Err(e);
            }
        };

        if group.is_left_recursive() {
            loop {
                match &best {
                    None => break,
                    Some((end, item, def_type)) => {
                        let seed = wrap(name, item.clone(), *def_type, Span::new(start, *end));
                        self.memo.insert(key.clone(), MemoState::Done { end: *end, item: seed });
                    }
                }
                let round = match self.attempt_round(name, start, min_prec, &order) {
                    Ok(round) => round,
                    Err(e) => {
                        self.memo.remove(&key);
                        return Err(e);
                    }
                };
                match (&best, &round) {
                    (Some((best_end, _, _)), Some((round_end, _, _))) if round_end > best_end => {
                        self.log.log_grow(name, start, round_end - start);
                        best = round;
                    }
                    _ => break,
                }
            }
        }

        match best {
            None => {
                self.memo.insert(key, MemoState::Failed);
                self.stream.set_position(start);
                self.log.log_group_miss(name, start);
                Err(Fail::NoMatch)
            }
            Some((end, item, def_type)) => {
                let wrapped = wrap(name, item, def_type, Span::new(start, end));
                self.memo.insert(key, MemoState::Done { end, item: wrapped.clone() });
                self.stream.set_position(end);
                self.log.log_group_commit(name, start, end - start);
                Ok(wrapped)
            }
        }
    }
}

fn wrap(name: &str, item: Item, def_type: DefinitionType, span: Span) -> Item {
    match def_type {
        DefinitionType::Declaration => Item::node(Node::single(name.to_string(), item, Some(span))),
        DefinitionType::Helper => item,
    }
}

fn charset_from_spec(spec: &CharSetSpec) -> CharSet {
    match spec {
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
    }
}

fn fail_to_core(e: Fail) -> CoreError {
    match e {
        Fail::NoMatch => unreachable!("NoMatch must be intercepted before it reaches a public boundary"),
        Fail::Grammar(g) => CoreError::Grammar(g),
        Fail::Parser(p) => CoreError::Parser(p),
    }
}

/// Parse `text` against `grammar`'s root group, requiring the whole input to
/// be consumed. A parse miss is `Ok(None)`, never an error (§6.1, §7).
pub fn parse_text(grammar: &OptimizedGrammar, text: &str) -> Result<Option<Item>, CoreError> {
    let mut stream = StrStream::new(text);
    parse_stream(grammar, &mut stream)
}

/// Parse a [`TokenStream`] against `grammar`'s root group, requiring the
/// whole stream to be consumed (§4.7.1, §6.1).
pub fn parse_stream<S: TokenStream + ?Sized>(
    grammar: &OptimizedGrammar,
    stream: &mut S,
) -> Result<Option<Item>, CoreError> {
    let mut ctx = ParserContext::new(grammar, stream);
    let root = grammar.root.clone();
    match ctx.parse_definition_group(&root, None) {
        Ok(item) => {
            if ctx.stream.eof() {
                Ok(Some(item.strip_captured()))
            } else {
                Ok(None)
            }
        }
        Err(Fail::NoMatch) => Ok(None),
        Err(other) => Err(fail_to_core(other)),
    }
}

/// Whether `text` matches `grammar`'s root group in its entirety, discarding
/// the parsed tree (§6.1).
pub fn matches_text(grammar: &OptimizedGrammar, text: &str) -> Result<bool, CoreError> {
    Ok(parse_text(grammar, text)?.is_some())
}

/// Whether a [`TokenStream`] matches `grammar`'s root group in its entirety
/// (§6.1).
pub fn matches_stream<S: TokenStream + ?Sized>(grammar: &OptimizedGrammar, stream: &mut S) -> Result<bool, CoreError> {
    Ok(parse_stream(grammar, stream)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;
    use crate::optimizer::optimize;

    fn opt(root: &str, groups: Vec<DefinitionGroup>) -> OptimizedGrammar {
        let grammar = Grammar::from_groups(root, groups, GrammarOptions::default());
        optimize(grammar)
    }

    #[test]
    fn matches_a_literal_string() {
        let g = opt("root", vec![DefinitionGroup::with_definitions("root", vec![Definition::declaration("root", Expr::string("hello"))])]);
        assert!(matches_text(&g, "hello").unwrap());
        assert!(!matches_text(&g, "world").unwrap());
    }

    #[test]
    fn left_recursive_sum_parses_and_terminates() {
        // expr := expr "+" digit | digit
        let mut group = DefinitionGroup::new("expr");
        group.definitions.push(Definition::declaration(
            "expr",
            Expr::sequence(vec![Expr::reference("expr"), Expr::string("+"), Expr::reference("digit")]),
        ).with_precedence(0, Associativity::Left));
        group.definitions.push(Definition::declaration("expr", Expr::reference("digit")));
        let digit_group = DefinitionGroup::with_definitions(
            "digit",
            vec![Definition::helper("digit", Expr::capture(Expr::range('0', '9')))],
        );
        let g = opt("expr", vec![group, digit_group]);
        assert!(matches_text(&g, "1+2+3").unwrap());
        let result = parse_text(&g, "1+2+3").unwrap().unwrap();
        assert!(result.is_node());
    }

    #[test]
    fn repeat_over_captured_chars_collapses_to_one_token() {
        let group = DefinitionGroup::with_definitions(
            "word",
            vec![Definition::helper(
                "word",
                Expr::capture(Expr::repeat(Expr::range('a', 'z'), 1, None)),
            )],
        );
        let g = opt("word", vec![group]);
        let result = parse_text(&g, "hello").unwrap().unwrap();
        assert_eq!(result.as_text(), Some("hello"));
    }

    #[test]
    fn separated_list_stays_itemized() {
        // list := digit ^ ","
        let digit = DefinitionGroup::with_definitions(
            "digit",
            vec![Definition::helper("digit", Expr::capture(Expr::range('0', '9')))],
        );
        let list = DefinitionGroup::with_definitions(
            "list",
            vec![Definition::declaration("list", Expr::separated(Expr::reference("digit"), Expr::string(",")))],
        );
        let g = opt("list", vec![list, digit]);
        let result = parse_text(&g, "1,2,3").unwrap().unwrap();
        let items = result.get_child("list").unwrap().as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_text(), Some("1"));
        assert_eq!(items[2].as_text(), Some("3"));
    }

    #[test]
    fn trailing_input_is_a_miss_not_an_error() {
        let g = opt("root", vec![DefinitionGroup::with_definitions("root", vec![Definition::declaration("root", Expr::string("hi"))])]);
        assert_eq!(parse_text(&g, "hitrailing").unwrap(), None);
    }

    #[test]
    fn unknown_group_is_a_grammar_error() {
        let g = opt("root", vec![DefinitionGroup::with_definitions("root", vec![Definition::declaration("root", Expr::reference("missing"))])]);
        match parse_text(&g, "x") {
            Err(CoreError::Grammar(_)) => {}
            other => panic!("expected a GrammarError, got {:?}", other.is_ok()),
        }
    }
}

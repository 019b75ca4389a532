//! The universal tree value (§3.1): every grammar IR, intermediate parse
//! result and final parser output is an [`Item`] — a `Text` leaf, an ordered
//! `List`, or a `Node` record. The tree-walking helpers below (`find_tree`,
//! `list_tree`, `get_child`, `contains`) operate on this untyped
//! three-variant sum rather than a generic payload type (see Design Note
//! §9).

use std::fmt::{Debug, Formatter};

/// A half-open-by-convention `[start, end)` offset range into the source
/// text an `Item` was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub value: String,
    pub span: Option<Span>,
    pub origin: Option<String>,
    pub(crate) captured: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub items: Vec<Item>,
    pub span: Option<Span>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    attributes: Vec<(String, Item)>,
    pub span: Option<Span>,
    pub origin: Option<String>,
}

impl Node {
    pub fn new(span: Option<Span>) -> Self {
        Self {
            attributes: Vec::new(),
            span,
            origin: None,
        }
    }

    pub fn single(name: impl Into<String>, value: Item, span: Option<Span>) -> Self {
        let mut node = Node::new(span);
        node.insert(name, value);
        node
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Item) {
        let name = name.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn disjoint_with(&self, other: &Node) -> bool {
        self.attributes
            .iter()
            .all(|(k, _)| other.get(k).is_none())
    }
}

/// The three-variant universal tree described by §3.1.
#[derive(Clone, PartialEq)]
pub enum Item {
    Text(Text),
    List(List),
    Node(Node),
}

impl Debug for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Text(t) => f.debug_tuple("Text").field(&t.value).finish(),
            Item::List(l) => f.debug_tuple("List").field(&l.items).finish(),
            Item::Node(n) => {
                let mut s = f.debug_struct("Node");
                for (k, v) in n.iter() {
                    s.field(k, v);
                }
                s.finish()
            }
        }
    }
}

impl Item {
    pub fn text(value: impl Into<String>, span: Option<Span>) -> Item {
        Item::Text(Text {
            value: value.into(),
            span,
            origin: None,
            captured: false,
        })
    }

    pub fn captured_text(value: impl Into<String>, span: Option<Span>) -> Item {
        Item::Text(Text {
            value: value.into(),
            span,
            origin: None,
            captured: true,
        })
    }

    pub fn list(items: Vec<Item>, span: Option<Span>) -> Item {
        Item::List(List {
            items,
            span,
            origin: None,
        })
    }

    pub fn empty_list(span: Option<Span>) -> Item {
        Item::list(Vec::new(), span)
    }

    pub fn node(node: Node) -> Item {
        Item::Node(node)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Item::Text(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Item::List(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Item::Text(t) => Some(&t.value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Item::List(l) => Some(&l.items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Item::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Item::Text(t) => t.span,
            Item::List(l) => l.span,
            Item::Node(n) => n.span,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Item {
        let origin = Some(origin.into());
        match &mut self {
            Item::Text(t) => t.origin = origin,
            Item::List(l) => l.origin = origin,
            Item::Node(n) => n.origin = origin,
        }
        self
    }

    pub(crate) fn is_captured_text(&self) -> bool {
        matches!(self, Item::Text(t) if t.captured)
    }

    pub(crate) fn is_plain_text(&self) -> bool {
        matches!(self, Item::Text(t) if !t.captured)
    }

    /// Strip the transient `captured` bit, if any. A no-op on `List`/`Node`.
    pub(crate) fn uncaptured(self) -> Item {
        match self {
            Item::Text(mut t) => {
                t.captured = false;
                Item::Text(t)
            }
            other => other,
        }
    }

    /// Clear `captured` recursively. Called once, at the top of a public
    /// parse call, before the result is handed back to the caller (§3.1).
    pub fn strip_captured(self) -> Item {
        match self {
            Item::Text(mut t) => {
                t.captured = false;
                Item::Text(t)
            }
            Item::List(l) => Item::List(List {
                items: l.items.into_iter().map(Item::strip_captured).collect(),
                span: l.span,
                origin: l.origin,
            }),
            Item::Node(mut n) => {
                n.attributes = n
                    .attributes
                    .into_iter()
                    .map(|(k, v)| (k, v.strip_captured()))
                    .collect();
                Item::Node(n)
            }
        }
    }

    /// Search through all nested children and return the first match, ported
    /// from `ASTNode::find_tree`.
    pub fn find_tree<F: Fn(&Item) -> bool>(&self, p: &F) -> Option<&Item> {
        if p(self) {
            return Some(self);
        }
        match self {
            Item::List(l) => l.items.iter().find_map(|c| c.find_tree(p)),
            Item::Node(n) => n.iter().find_map(|(_, c)| c.find_tree(p)),
            Item::Text(_) => None,
        }
    }

    /// Return every matching node found while walking the whole tree, ported
    /// from `ASTNode::list_tree`.
    pub fn list_tree<'a, F: Fn(&Item) -> bool>(&'a self, p: &F) -> Vec<&'a Item> {
        let mut out = Vec::new();
        self.walk_tree(&mut out, p);
        out
    }

    fn walk_tree<'a, F: Fn(&Item) -> bool>(&'a self, out: &mut Vec<&'a Item>, p: &F) {
        if p(self) {
            out.push(self);
        }
        match self {
            Item::List(l) => l.items.iter().for_each(|c| c.walk_tree(out, p)),
            Item::Node(n) => n.iter().for_each(|(_, c)| c.walk_tree(out, p)),
            Item::Text(_) => {}
        }
    }

    /// Direct child attribute lookup, ported from `ASTNode::get_child`.
    pub fn get_child(&self, name: &str) -> Option<&Item> {
        self.as_node().and_then(|n| n.get(name))
    }

    /// Whether any node in the tree (including `self`) matches `p`, ported
    /// from `ASTNode::contains`.
    pub fn contains<F: Fn(&Item) -> bool>(&self, p: &F) -> bool {
        self.find_tree(p).is_some()
    }
}

/// One printable line for a single `Item`, paired with its already-collected
/// children, for `ptree`'s `TreeItem` (ported from `ASTNode`'s own impl in
/// `ast_node.rs`, which pairs a debug-printed node with its `children` field
/// the same way).
#[derive(Clone)]
pub struct ItemTree {
    label: String,
    children: Vec<ItemTree>,
}

impl From<&Item> for ItemTree {
    fn from(item: &Item) -> Self {
        let children = match item {
            Item::List(l) => l.items.iter().map(ItemTree::from).collect(),
            Item::Node(n) => n.iter().map(|(k, v)| {
                let mut child = ItemTree::from(v);
                child.label = format!("{}: {}", k, child.label);
                child
            }).collect(),
            Item::Text(_) => Vec::new(),
        };
        let label = match item {
            Item::Text(t) => format!("{:?}", t.value),
            Item::List(_) => "[]".to_string(),
            Item::Node(_) => "{}".to_string(),
        };
        ItemTree { label, children }
    }
}

impl ptree::TreeItem for ItemTree {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

impl Item {
    /// Pretty-print the tree to stdout, for debugging a grammar or a parse
    /// result by eye (mirrors `ASTNode::print`).
    pub fn print(&self) -> std::io::Result<()> {
        ptree::print_tree(&ItemTree::from(self))
    }
}

/// Apply the merge rules of §4.7.6 to accumulate two sibling sequence
/// results. `a` is the accumulator so far (`None` before the first element).
pub fn merge(a: Option<Item>, b: Item) -> Item {
    let a = match a {
        None => return b,
        Some(a) => a,
    };

    // Rule 2: both Nodes.
    if let (Item::Node(na), Item::Node(nb)) = (&a, &b) {
        if na.disjoint_with(nb) {
            let span = match (na.span, nb.span) {
                (Some(sa), Some(sb)) => Some(sa.merge(sb)),
                (Some(s), None) | (None, Some(s)) => Some(s),
                (None, None) => None,
            };
            let mut merged = Node::new(span);
            for (k, v) in na.iter() {
                merged.insert(k, v.clone());
            }
            for (k, v) in nb.iter() {
                merged.insert(k, v.clone());
            }
            return Item::Node(merged);
        } else {
            return Item::list(vec![a, b], None);
        }
    }

    // Rule 3: b is a Node (a, by rule 2's exhaustiveness, is not).
    if b.is_node() {
        if a.is_list() {
            // a is already an accumulation of siblings: append, don't nest.
            let mut items = a.as_list().unwrap().to_vec();
            items.push(b);
            return Item::list(items, None);
        }
        if a.is_captured_text() {
            return Item::list(vec![a.uncaptured(), b], None);
        }
        // a is ordinary text: drop it, keep b.
        return b;
    }

    // Rule 4: b is a List or captured Text.
    if b.is_list() || b.is_captured_text() {
        if a.is_node() {
            if b.is_list() {
                let mut items = vec![a];
                items.extend(b.as_list().unwrap().iter().cloned());
                return Item::list(items, None);
            }
            return Item::list(vec![a, b.uncaptured()], None);
        }
        if a.is_captured_text() && b.is_captured_text() {
            return concat_text(a, b, true);
        }
        if a.is_captured_text() && b.is_list() {
            let mut items = vec![a.uncaptured()];
            items.extend(b.as_list().unwrap().iter().cloned());
            return Item::list(items, None);
        }
        if a.is_list() && b.is_captured_text() {
            let mut items = a.as_list().unwrap().to_vec();
            items.push(b.uncaptured());
            return Item::list(items, None);
        }
        if a.is_list() && b.is_list() {
            let mut items = a.as_list().unwrap().to_vec();
            items.extend(b.as_list().unwrap().iter().cloned());
            return Item::list(items, None);
        }
        // a is plain, uncaptured text: an unspecified combination in §4.7.6 —
        // resolved in DESIGN.md by treating plain text the same as in rule 3,
        // dropping it in favour of the more structured `b`.
        return b;
    }

    // Rule 5: both plain text.
    if a.is_plain_text() && b.is_plain_text() {
        return concat_text(a, b, false);
    }

    // Rule 6: otherwise keep `a` (b is plain text here).
    a
}

fn concat_text(a: Item, b: Item, captured: bool) -> Item {
    let (av, aspan, aorigin) = match a {
        Item::Text(t) => (t.value, t.span, t.origin),
        _ => unreachable!("concat_text called with non-Text operand"),
    };
    let (bv, bspan) = match b {
        Item::Text(t) => (t.value, t.span),
        _ => unreachable!("concat_text called with non-Text operand"),
    };
    let span = match (aspan, bspan) {
        (Some(sa), Some(sb)) => Some(sa.merge(sb)),
        (Some(s), None) | (None, Some(s)) => Some(s),
        (None, None) => None,
    };
    let text = format!("{}{}", av, bv);
    let mut item = if captured {
        Item::captured_text(text, span)
    } else {
        Item::text(text, span)
    };
    if let Item::Text(t) = &mut item {
        t.origin = aorigin;
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_disjoint_nodes_combines_attributes() {
        let a = Item::node(Node::single("L", Item::text("1", None), None));
        let b = Item::node(Node::single("R", Item::text("2", None), None));
        let merged = merge(Some(a), b);
        let node = merged.as_node().unwrap();
        assert_eq!(node.get("L").unwrap().as_text(), Some("1"));
        assert_eq!(node.get("R").unwrap().as_text(), Some("2"));
    }

    #[test]
    fn merge_overlapping_nodes_becomes_list() {
        let a = Item::node(Node::single("L", Item::text("1", None), None));
        let b = Item::node(Node::single("L", Item::text("2", None), None));
        let merged = merge(Some(a), b);
        assert!(merged.is_list());
    }

    #[test]
    fn merge_captured_text_concatenates() {
        let a = Item::captured_text("he", None);
        let b = Item::captured_text("llo", None);
        let merged = merge(Some(a), b);
        assert_eq!(merged.as_text(), Some("hello"));
    }

    #[test]
    fn merge_plain_text_is_dropped_against_node() {
        let a = Item::text(" ", None);
        let b = Item::node(Node::single("X", Item::text("1", None), None));
        let merged = merge(Some(a), b);
        assert!(merged.is_node());
    }
}

// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # The Backtracking Matcher
//!
//! Walks an external tree with a compiled [`Pattern`] and lazily enumerates
//! every way the pattern fits, one shaped result per way.
//!
//! ## How matching works
//!
//! The engine keeps a cursor: on the depth axis it is a current element, on
//! the breadth axis it is a position in the ordered child list of some
//! parent. Sequence items move the cursor through their preceding edge
//! (child/descendant or adjacent/following); `{ … }` blocks push one axis
//! and pop back when they finish.
//!
//! Matching is continuation-passing: each construct matches what it can and
//! calls its continuation once per way to proceed. Captured values live in a
//! shared slot accumulator; every function restores the accumulator to its
//! entry length before trying the next alternative, which is all the trail
//! the backtracker needs. Repetitions are greedy and give back one
//! occurrence at a time; alternation arms run in source order; every
//! candidate enumeration is in document order, so the overall yield order is
//! stable (pre-order by match root, then by choice order).
//!
//! ## Laziness
//!
//! [`Matches`] walks candidate roots in pre-order and buffers the result
//! tuples of one candidate at a time. Dropping the iterator cancels the
//! enumeration; there is nothing else to release.

use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{self, Edge, ExtractKind, Postfix, Pred, RepeatKind, Seq, Term, TermKind};
use crate::filter::{self, FilterSet};
use crate::node::TreeNode;
use crate::pattern::Pattern;
use crate::shape::Shape;

/// A captured value. Scalars are strings or node handles; groups yield
/// tuples, repetitions lists, `?` either an inner value or [`Value::Absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N> {
    Str(String),
    Node(N),
    Tuple(Vec<Value<N>>),
    List(Vec<Value<N>>),
    Absent,
}

impl<N> Value<N> {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&N> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Whether this value has the given static shape. Every value yielded
    /// by a pattern conforms to that pattern's [`Pattern::shape`].
    #[must_use]
    pub fn conforms(&self, shape: &Shape) -> bool {
        match (self, shape) {
            (Self::Str(_) | Self::Node(_), Shape::Scalar) => true,
            (Self::Tuple(values), Shape::Tuple(shapes)) => {
                values.len() == shapes.len()
                    && values.iter().zip(shapes).all(|(v, s)| v.conforms(s))
            }
            (Self::List(values), Shape::List(inner)) => {
                values.iter().all(|v| v.conforms(inner))
            }
            (Self::Absent, Shape::Optional(_)) => true,
            (value, Shape::Optional(inner)) => value.conforms(inner),
            _ => false,
        }
    }
}

/// One successful match: the element the pattern was rooted at, plus the
/// top-level result tuple.
#[derive(Debug, Clone)]
pub struct Match<N> {
    node: N,
    values: Vec<Value<N>>,
}

impl<N> Match<N> {
    /// The element at which the pattern matched.
    #[must_use]
    pub const fn node(&self) -> &N {
        &self.node
    }

    /// The fields of the top-level result tuple.
    #[must_use]
    pub fn values(&self) -> &[Value<N>] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value<N>> {
        self.values
    }
}

/// Errors raised before enumeration begins.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    /// A `$name` in a filter has no entry in the caller's [`FilterSet`].
    #[error("unknown filter function `${0}`")]
    UnknownFilter(String),
}

impl Pattern {
    /// Lazily enumerate every match of this pattern under `root`.
    ///
    /// The pattern is tried at every element of the subtree in document
    /// order, `root` included — or at `root` alone when the pattern is
    /// anchored with a leading `$`. All `$name` references must be present
    /// in `filters` or the call fails before anything is enumerated.
    pub fn matches<'p, 'f, N: TreeNode>(
        &'p self,
        root: N,
        filters: &'f FilterSet<N>,
    ) -> Result<Matches<'p, 'f, N>, MatchError> {
        for name in self.filter_fns() {
            if !filters.contains(name) {
                return Err(MatchError::UnknownFilter(name.clone()));
            }
        }
        // Without extractors every assignment of choice points produces the
        // same empty tuple, so one result per matching position suffices.
        let single_result = matches!(self.shape(), Shape::Tuple(slots) if slots.is_empty());
        Ok(Matches {
            pattern: self,
            filters,
            stack: vec![root],
            anchored: self.is_anchored(),
            first: true,
            single_result,
            buf: VecDeque::new(),
        })
    }

    /// Collect every match, with no filter functions registered.
    pub fn match_all<N: TreeNode>(&self, root: N) -> Result<Vec<Match<N>>, MatchError> {
        let filters = FilterSet::new();
        Ok(self.matches(root, &filters)?.collect())
    }

    /// The first match in document order, with no filter functions
    /// registered.
    pub fn first_match<N: TreeNode>(&self, root: N) -> Result<Option<Match<N>>, MatchError> {
        let filters = FilterSet::new();
        Ok(self.matches(root, &filters)?.next())
    }
}

/// Lazy match enumeration. See [`Pattern::matches`].
pub struct Matches<'p, 'f, N: TreeNode> {
    pattern: &'p Pattern,
    filters: &'f FilterSet<N>,
    stack: Vec<N>,
    anchored: bool,
    first: bool,
    single_result: bool,
    buf: VecDeque<Match<N>>,
}

impl<N: TreeNode> Iterator for Matches<'_, '_, N> {
    type Item = Match<N>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(m) = self.buf.pop_front() {
                return Some(m);
            }
            let candidate = self.stack.pop()?;
            if !self.anchored {
                let kids: Vec<N> = candidate.children().collect();
                self.stack.extend(kids.into_iter().rev());
            }
            let at_root = mem::take(&mut self.first);
            if self.pattern.admits_tag(candidate.tag_name()) {
                let engine = Engine {
                    top: self.pattern.seq(),
                    pattern: self.pattern,
                    filters: self.filters,
                    at_root,
                    single_result: self.single_result,
                };
                engine.run(candidate, &mut self.buf);
            }
        }
    }
}

/// Backtracking position: an element on the depth axis, or a slot in a
/// parent's ordered child list on the breadth axis. `pos` is the index of
/// the next child to be consumed and may equal `kids.len()` once the run
/// has consumed the last child.
#[derive(Clone)]
enum Cursor<N> {
    Node(N),
    Siblings { kids: Rc<Vec<N>>, pos: usize },
}

impl<N: TreeNode> Cursor<N> {
    /// The element an element-term at this position would be matched
    /// against.
    fn elem(&self) -> Option<N> {
        match self {
            Self::Node(n) => Some(n.clone()),
            Self::Siblings { kids, pos } => kids.get(*pos).cloned(),
        }
    }

    /// The position after consuming the current element. Depth terms do not
    /// consume; breadth terms consume one sibling.
    fn advanced(self) -> Self {
        match self {
            Self::Node(n) => Self::Node(n),
            Self::Siblings { kids, pos } => Self::Siblings { kids, pos: pos + 1 },
        }
    }

    fn breadth_pos(&self) -> Option<usize> {
        match self {
            Self::Node(_) => None,
            Self::Siblings { pos, .. } => Some(*pos),
        }
    }
}

/// Per-candidate matching state. `at_root` is true when the candidate is
/// the node `matches` was called with, which is what a leading `$` asserts.
struct Engine<'p, 'f, N: TreeNode> {
    top: &'p Seq,
    pattern: &'p Pattern,
    filters: &'f FilterSet<N>,
    at_root: bool,
    single_result: bool,
}

impl<N: TreeNode> Engine<'_, '_, N> {
    fn run(&self, start: N, results: &mut VecDeque<Match<N>>) {
        let origin = start.clone();
        let single = self.single_result;
        let mut done = false;
        let mut out: Vec<Value<N>> = Vec::new();
        self.match_items(self.top, 0, Cursor::Node(start), &mut out, &mut |_, values| {
            if single && done {
                return;
            }
            done = true;
            results.push_back(Match {
                node: origin.clone(),
                values: values.clone(),
            });
        });
    }

    /// Match `seq.items[idx..]`, starting from `cur`.
    fn match_items(
        &self,
        seq: &Seq,
        idx: usize,
        cur: Cursor<N>,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Cursor<N>, &mut Vec<Value<N>>),
    ) {
        let Some(item) = seq.items.get(idx) else {
            k(cur, out);
            return;
        };
        match &item.term.kind {
            TermKind::Boundary => {
                let top_first = idx == 0 && std::ptr::eq(seq, self.top);
                // The edge before a depth-axis `$` is not consumed (a leaf
                // assertion is zero-width); on the breadth axis the edge is
                // honored so `a :: $` can skip trailing siblings.
                let targets = match &cur {
                    Cursor::Node(_) => vec![cur.clone()],
                    Cursor::Siblings { .. } => self.edge_targets(item.pre_edge, &cur),
                };
                for target in targets {
                    if self.boundary_holds(idx == 0, top_first, &target) {
                        self.match_items(seq, idx + 1, target, out, &mut *k);
                    }
                }
            }
            TermKind::Repeat { term, kind } => {
                let shaped = ast::term_has_extract(term);
                let mark = out.len();
                self.repeat_from(
                    term,
                    *kind,
                    shaped,
                    0,
                    item.pre_edge,
                    cur,
                    mark,
                    out,
                    &mut |cur2, out| self.match_items(seq, idx + 1, cur2, out, &mut *k),
                );
            }
            _ => {
                for target in self.edge_targets(item.pre_edge, &cur) {
                    self.match_term(&item.term, target, out, &mut |cur2, out| {
                        self.match_items(seq, idx + 1, cur2, out, &mut *k);
                    });
                }
            }
        }
    }

    /// All positions reachable from `cur` through `edge`, in document
    /// order. `None` means "stay put" (the first item of a sequence).
    fn edge_targets(&self, edge: Option<Edge>, cur: &Cursor<N>) -> Vec<Cursor<N>> {
        match (edge, cur) {
            (None, _) => vec![cur.clone()],
            (Some(Edge::Child), Cursor::Node(n)) => n.children().map(Cursor::Node).collect(),
            (Some(Edge::Descendant), Cursor::Node(n)) => {
                n.dfs().skip(1).map(Cursor::Node).collect()
            }
            (Some(Edge::Adjacent), Cursor::Siblings { .. }) => vec![cur.clone()],
            (Some(Edge::Following), Cursor::Siblings { kids, pos }) => (*pos..=kids.len())
                .map(|p| Cursor::Siblings { kids: Rc::clone(kids), pos: p })
                .collect(),
            // Edges are tied to their axis at parse time; a mismatch cannot
            // be reached from a parsed query.
            (Some(_), _) => Vec::new(),
        }
    }

    fn boundary_holds(&self, is_first: bool, top_first: bool, cur: &Cursor<N>) -> bool {
        match cur {
            Cursor::Node(n) => {
                if top_first {
                    self.at_root
                } else {
                    // a leaf position: no element children
                    n.is_leaf()
                }
            }
            Cursor::Siblings { kids, pos } => {
                if is_first {
                    *pos == 0
                } else {
                    *pos == kids.len()
                }
            }
        }
    }

    /// Match a single non-quantified term at `cur` (the preceding edge has
    /// already been applied).
    fn match_term(
        &self,
        term: &Term,
        cur: Cursor<N>,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Cursor<N>, &mut Vec<Value<N>>),
    ) {
        match &term.kind {
            TermKind::Element { pred, post } => {
                let Some(elem) = cur.elem() else { return };
                if !pred_holds(pred, &elem) {
                    return;
                }
                let mark = out.len();
                if self.apply_post(post, &elem, out) {
                    k(cur.advanced(), out);
                }
                out.truncate(mark);
            }
            TermKind::Group { arms, post } => {
                self.match_group(arms, post, cur, out, &mut |_, cur2, out| k(cur2, out));
            }
            TermKind::Brace { seq, post } => self.match_brace(seq, post, cur, out, k),
            // Boundaries and quantifiers are sequence-level constructs,
            // handled by match_items and repeat_from.
            TermKind::Boundary | TermKind::Repeat { .. } => {}
        }
    }

    /// Match a group: each arm in source order, collapsing the arm's
    /// captures into the group's slot and reporting the arm's trailing edge
    /// to the continuation (repetition uses it to join iterations).
    fn match_group(
        &self,
        arms: &[Seq],
        post: &Postfix,
        cur: Cursor<N>,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Option<Edge>, Cursor<N>, &mut Vec<Value<N>>),
    ) {
        let Some(start) = cur.elem() else { return };
        let mark = out.len();
        for arm in arms {
            self.match_items(arm, 0, cur.clone(), out, &mut |cur2, out| {
                let vals = out.split_off(mark);
                extend_collapsed(out, vals.clone());
                if self.apply_post(post, &start, out) {
                    k(arm.trailing_edge, cur2, out);
                }
                out.truncate(mark);
                out.extend(vals);
            });
        }
    }

    /// Match a `{ … }` block: toggle the axis at the current position and
    /// resume the enclosing axis afterwards.
    fn match_brace(
        &self,
        inner: &Seq,
        post: &Postfix,
        cur: Cursor<N>,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Cursor<N>, &mut Vec<Value<N>>),
    ) {
        match cur {
            // Depth → breadth: the block describes the children of the
            // current element. Without a leading `$` the run may start at
            // any child.
            Cursor::Node(ref elem) => {
                let kids: Rc<Vec<N>> = Rc::new(elem.children().collect());
                let count = kids.len();
                let last_start = count.saturating_sub(1);
                for start in 0..=last_start {
                    self.match_items(
                        inner,
                        0,
                        Cursor::Siblings { kids: Rc::clone(&kids), pos: start },
                        out,
                        &mut |_, out| {
                            let mark = out.len();
                            if self.apply_post(post, elem, out) {
                                k(Cursor::Node(elem.clone()), out);
                            }
                            out.truncate(mark);
                        },
                    );
                }
            }
            // Breadth → depth: the block is rooted at the current sibling
            // and consumes it.
            Cursor::Siblings { ref kids, pos } => {
                let Some(elem) = kids.get(pos) else { return };
                let resumed = Cursor::Siblings { kids: Rc::clone(kids), pos: pos + 1 };
                self.match_items(inner, 0, Cursor::Node(elem.clone()), out, &mut |_, out| {
                    let mark = out.len();
                    if self.apply_post(post, elem, out) {
                        k(resumed.clone(), out);
                    }
                    out.truncate(mark);
                });
            }
        }
    }

    /// One occurrence of a repetition body. Reports the trailing edge that
    /// joins this occurrence to the next.
    fn match_body_once(
        &self,
        body: &Term,
        cur: Cursor<N>,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Option<Edge>, Cursor<N>, &mut Vec<Value<N>>),
    ) {
        match &body.kind {
            TermKind::Group { arms, post } => self.match_group(arms, post, cur, out, k),
            TermKind::Boundary | TermKind::Repeat { .. } => {}
            _ => self.match_term(body, cur, out, &mut |cur2, out| k(None, cur2, out)),
        }
    }

    /// Greedy repetition with give-back. `pending` is the edge that enters
    /// the next occurrence: the item's own preceding edge for the first,
    /// the body's trailing edge afterwards. Occurrences that cannot move
    /// the cursor end the loop, which bounds it.
    #[allow(clippy::too_many_arguments)]
    fn repeat_from(
        &self,
        body: &Term,
        kind: RepeatKind,
        shaped: bool,
        count: usize,
        pending: Option<Edge>,
        cur: Cursor<N>,
        mark: usize,
        out: &mut Vec<Value<N>>,
        k: &mut dyn FnMut(Cursor<N>, &mut Vec<Value<N>>),
    ) {
        let depth_stalled =
            count > 0 && pending.is_none() && matches!(cur, Cursor::Node(_));
        let may_iterate = kind.max().is_none_or(|max| count < max) && !depth_stalled;
        if may_iterate {
            let start_pos = cur.breadth_pos();
            for target in self.edge_targets(pending, &cur) {
                let m2 = out.len();
                self.match_body_once(body, target, out, &mut |trailing, cur2, out| {
                    if cur2.breadth_pos() == start_pos && start_pos.is_some() {
                        // zero-width occurrence; repeating it would never
                        // terminate
                        return;
                    }
                    let vals = out.split_off(m2);
                    extend_collapsed(out, vals.clone());
                    self.repeat_from(
                        body,
                        kind,
                        shaped,
                        count + 1,
                        trailing,
                        cur2.clone(),
                        mark,
                        out,
                        &mut *k,
                    );
                    out.truncate(m2);
                    out.extend(vals);
                });
            }
        }
        if count >= kind.min() {
            let vals = out.split_off(mark);
            if shaped {
                match kind {
                    RepeatKind::Star | RepeatKind::Plus => {
                        out.push(Value::List(vals.clone()));
                    }
                    RepeatKind::Optional => {
                        if count == 1 {
                            out.extend(vals.clone());
                        } else {
                            out.push(Value::Absent);
                        }
                    }
                }
            }
            k(cur, out);
            out.truncate(mark);
            out.extend(vals);
        }
    }

    /// Record the term's extractors for the element and evaluate its
    /// filter. Extractors always succeed; a failing filter reports false
    /// and the caller unwinds whatever was pushed.
    fn apply_post(&self, post: &Postfix, elem: &N, out: &mut Vec<Value<N>>) -> bool {
        for extract in &post.extracts {
            out.push(match &extract.kind {
                ExtractKind::Text => Value::Str(elem.text().into_owned()),
                ExtractKind::Node => Value::Node(elem.clone()),
                // absent and empty both read back as "": extraction never
                // fails, and a scalar slot is always a string
                ExtractKind::Attr(name) => {
                    Value::Str(elem.attr(name).unwrap_or_default().to_string())
                }
            });
        }
        match &post.filter {
            None => true,
            Some(f) => filter::eval(f, elem, self.pattern.regexes(), self.filters),
        }
    }
}

fn pred_holds<N: TreeNode>(pred: &Pred, elem: &N) -> bool {
    match pred {
        Pred::Any => true,
        Pred::Tag(tag) => elem.tag_name() == tag,
        Pred::Class(class) => elem.has_class(class),
        Pred::Id(id) => elem.id() == Some(id.as_str()),
        Pred::Not(inner) => !pred_holds(inner, elem),
        Pred::All(preds) => preds.iter().all(|p| pred_holds(p, elem)),
    }
}

/// Push a construct's captures as one slot: nothing, the single value, or a
/// tuple. Mirrors the collapse rule of shape analysis.
fn extend_collapsed<N>(out: &mut Vec<Value<N>>, mut vals: Vec<Value<N>>) {
    match vals.len() {
        0 => {}
        1 => out.extend(vals.pop()),
        _ => out.push(Value::Tuple(vals)),
    }
}

#[cfg(all(test, feature = "simple"))]
mod test {
    use super::*;
    use crate::pattern::compile;
    use crate::simple::{SimpleNode, SimpleTree};

    fn doc(fragment: &str) -> SimpleTree {
        SimpleTree::parse(fragment).expect("should parse fragment")
    }

    /// Run a query and flatten each result tuple's scalar strings.
    fn strings(query: &str, fragment: &str) -> Vec<Vec<String>> {
        let tree = doc(fragment);
        let pattern = compile(query).expect("should compile");
        pattern
            .match_all(tree.root())
            .expect("should match")
            .iter()
            .map(|m| {
                m.values()
                    .iter()
                    .map(|v| v.as_str().expect("expected a string slot").to_string())
                    .collect()
            })
            .collect()
    }

    fn rows(expected: &[&[&str]]) -> Vec<Vec<String>> {
        expected
            .iter()
            .map(|row| row.iter().map(|s| (*s).to_string()).collect())
            .collect()
    }

    #[test]
    fn test_scalar_extractors() {
        assert_eq!(
            strings(
                "div#find-me[txt, .data-attr]",
                "<div id=\"find-me\" data-attr=\"world\">hello</div>"
            ),
            rows(&[&["hello", "world"]])
        );
    }

    #[test]
    fn test_direct_child_edge() {
        assert_eq!(
            strings("div > a[txt]", "<div><a>x</a><a>y</a></div>"),
            rows(&[&["x"], &["y"]])
        );
    }

    #[test]
    fn test_descendant_edge() {
        assert_eq!(
            strings("div >> a[txt]", "<div><p><a>x</a></p></div>"),
            rows(&[&["x"]])
        );
        assert_eq!(
            strings("div >> a[txt]", "<div><a>1</a><p><a>2</a></p></div>"),
            rows(&[&["1"], &["2"]])
        );
    }

    #[test]
    fn test_breadth_run_with_anchors() {
        let query = "{ $ : a[txt] : b[txt] : $ }";
        assert_eq!(
            strings(query, "<p><a>1</a><b>2</b></p>"),
            rows(&[&["1", "2"]])
        );
        assert_eq!(strings(query, "<p><a>1</a><b>2</b><c></c></p>"), rows(&[]));
    }

    #[test]
    fn test_repeated_descent() {
        assert_eq!(
            strings(
                "div > (span >)* > a[txt]",
                "<div><span><span><a>x</a></span></span></div>"
            ),
            rows(&[&["x"]])
        );
        // zero repetitions: the direct edge survives
        assert_eq!(
            strings("div > (span >)* > a[txt]", "<div><a>y</a></div>"),
            rows(&[&["y"]])
        );
    }

    #[test]
    fn test_attribute_filter() {
        assert_eq!(
            strings(
                "div~(.k == 'v')[txt]",
                "<div k=\"v\">hi</div><div k=\"w\">bye</div>"
            ),
            rows(&[&["hi"]])
        );
    }

    #[test]
    fn test_negated_class() {
        assert_eq!(
            strings("div!.hidden[txt]", "<div>a</div><div class=\"hidden\">b</div>"),
            rows(&[&["a"]])
        );
    }

    #[test]
    fn test_alternation() {
        assert_eq!(
            strings("(a | b)[txt]", "<a>1</a><b>2</b><c>3</c>"),
            rows(&[&["1"], &["2"]])
        );
    }

    #[test]
    fn test_anchored_matches_once() {
        let tree = doc("<a></a><b></b>");
        let pattern = compile("$").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].values().is_empty());
        assert_eq!(matches[0].node().tag_name(), "root");

        // anchored plus a child step
        assert_eq!(
            strings("$ > div[txt]", "<div>x</div>"),
            rows(&[&["x"]])
        );
    }

    #[test]
    fn test_leaf_boundary() {
        assert_eq!(
            strings("a[txt] > $", "<a>x</a><a><b></b></a>"),
            rows(&[&["x"]])
        );
    }

    #[test]
    fn test_following_edge() {
        let fragment = "<p><a>1</a><c></c><b>2</b></p>";
        assert_eq!(strings("{ a[txt] : b[txt] }", fragment), rows(&[]));
        assert_eq!(
            strings("{ a[txt] :: b[txt] }", fragment),
            rows(&[&["1", "2"]])
        );
        // `::` before a closing `$` may skip trailing siblings
        assert_eq!(strings("{ a[txt] :: $ }", fragment), rows(&[&["1"]]));
        assert_eq!(strings("{ a[txt] : $ }", fragment), rows(&[]));
    }

    #[test]
    fn test_floating_breadth_start() {
        assert_eq!(
            strings("{ b[txt] }", "<p><a></a><b>x</b></p>"),
            rows(&[&["x"]])
        );
    }

    #[test]
    fn test_optional_enumerates_both_ways() {
        let tree = doc("<div><a>x</a></div>");
        let pattern = compile("div > a[txt]?").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        let values: Vec<_> = matches.iter().map(Match::values).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], &[Value::Str("x".to_string())]);
        assert_eq!(values[1], &[Value::Absent]);
    }

    #[test]
    fn test_star_is_greedy_and_gives_back() {
        let tree = doc("<p><a>1</a><a>2</a><b>3</b></p>");
        let pattern = compile("{ a[txt]* : b[txt] }").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        let lists: Vec<Vec<_>> = matches.iter().map(|m| m.values().to_vec()).collect();
        let s = |s: &str| Value::Str(s.to_string());
        assert_eq!(
            lists,
            vec![
                vec![Value::List(vec![s("1"), s("2")]), s("3")],
                vec![Value::List(vec![s("2")]), s("3")],
                vec![Value::List(vec![]), s("3")],
            ]
        );
    }

    #[test]
    fn test_plus_requires_one() {
        assert_eq!(strings("{ a[txt]+ : b }", "<p><b></b></p>"), rows(&[]));

        let tree = doc("<p><a>1</a><a>2</a></p>");
        let pattern = compile("{ (a[txt] :)+ : $ }").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        let s = |v: &str| Value::Str(v.to_string());
        // greedy full run first, then the give-back starting at the second a
        assert_eq!(matches[0].values(), &[Value::List(vec![s("1"), s("2")])]);
        assert_eq!(matches[1].values(), &[Value::List(vec![s("2")])]);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_adjacent_sibling_run() {
        // the canonical "exactly these children" query
        let query = "{ $ : (a[txt] :)* : $ }";
        let pattern = compile(query).expect("should compile");

        let tree = doc("<p><a>1</a><a>2</a></p>");
        let matches = pattern.match_all(tree.root()).expect("should match");
        let s = |v: &str| Value::Str(v.to_string());
        // the whole child list is a run of `a`s
        assert_eq!(matches[0].node().tag_name(), "p");
        assert_eq!(matches[0].values(), &[Value::List(vec![s("1"), s("2")])]);
        // childless descendants hold an empty run
        assert_eq!(matches.len(), 3);

        // a stray sibling breaks the run
        let tree = doc("<p><a>1</a><b>2</b></p>");
        let matches = pattern.match_all(tree.root()).expect("should match");
        assert!(matches.iter().all(|m| m.node().tag_name() != "p"));
    }

    #[test]
    fn test_nested_axis_toggle() {
        assert_eq!(
            strings(
                "{ a : { b > c[txt] } : d }",
                "<p><a></a><b><c>x</c></b><d></d></p>"
            ),
            rows(&[&["x"]])
        );
    }

    #[test]
    fn test_brace_postfix_reads_the_parent() {
        assert_eq!(
            strings("{ a : b }[txt]", "<p>t<a></a><b></b></p>"),
            rows(&[&["t"]])
        );
    }

    #[test]
    fn test_filter_functions() {
        let tree = doc("<a k=\"1\">yes</a><a>no</a>");
        let pattern = compile("a~($marked)[txt]").expect("should compile");
        let mut filters = FilterSet::new();
        filters.insert("marked", |n: &SimpleNode<'_>| n.attr("k").is_some());
        let found: Vec<String> = pattern
            .matches(tree.root(), &filters)
            .expect("should start")
            .map(|m| m.values()[0].as_str().expect("string").to_string())
            .collect();
        assert_eq!(found, vec!["yes"]);
    }

    #[test]
    fn test_unknown_filter_function_fails_before_enumeration() {
        let tree = doc("<a></a>");
        let pattern = compile("a~($nope)").expect("should compile");
        let filters = FilterSet::new();
        assert_eq!(
            pattern.matches(tree.root(), &filters).err(),
            Some(MatchError::UnknownFilter("nope".to_string()))
        );
    }

    #[test]
    fn test_node_extractor_hands_back_the_element() {
        let tree = doc("<div><a k=\"v\">x</a></div>");
        let pattern = compile("div > a[node]").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        let node = matches[0].values()[0].as_node().expect("node");
        assert_eq!(node.tag_name(), "a");
        assert_eq!(node.attr("k"), Some("v"));
    }

    #[test]
    fn test_every_result_conforms_to_the_shape() {
        let cases = [
            ("div > a[txt]?", "<div><a>x</a></div>"),
            ("{ a[txt]* : b[txt] }", "<p><a>1</a><a>2</a><b>3</b></p>"),
            ("(a[txt] > b[node] | c[txt] > d[node])", "<a><b></b></a><c><d></d></c>"),
            ("div > (span[txt] >)* > a[txt]", "<div><span>s<a>x</a></span></div>"),
        ];
        for (query, fragment) in cases {
            let tree = doc(fragment);
            let pattern = compile(query).expect("should compile");
            for m in pattern.match_all(tree.root()).expect("should match") {
                let tuple = Value::Tuple(m.values().to_vec());
                assert!(
                    tuple.conforms(pattern.shape()),
                    "{query}: {:?} should conform to {}",
                    m.values(),
                    pattern.shape()
                );
            }
        }
    }

    #[test]
    fn test_no_extractors_one_result_per_position() {
        let tree = doc("<div><a></a><a></a></div>");
        let pattern = compile("div > a").expect("should compile");
        let matches = pattern.match_all(tree.root()).expect("should match");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].values().is_empty());

        let pattern = compile("a").expect("should compile");
        assert_eq!(pattern.match_all(tree.root()).expect("should match").len(), 2);
    }

    #[test]
    fn test_enumeration_is_stable() {
        let fragment = "<div><span>s<a>1</a></span><a>2</a></div>";
        let query = "div >> a[txt]";
        assert_eq!(strings(query, fragment), strings(query, fragment));
        assert_eq!(strings(query, fragment), rows(&[&["1"], &["2"]]));
    }

    #[test]
    fn test_all_choice_assignments_are_yielded() {
        // both arms fit; both assignments surface, leftmost arm first
        assert_eq!(
            strings("(a[txt] | a.x[txt] | a[txt])", "<a class=\"x\">1</a>"),
            rows(&[&["1"], &["1"], &["1"]])
        );
    }

    #[test]
    fn test_lazy_first_match() {
        let tree = doc("<div><a>x</a><a>y</a></div>");
        let pattern = compile("div > a[txt]").expect("should compile");
        let first = pattern
            .first_match(tree.root())
            .expect("should match")
            .expect("should find one");
        assert_eq!(first.values()[0].as_str(), Some("x"));
        assert_eq!(first.node().tag_name(), "div");
    }
}

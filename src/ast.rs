// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Query AST
//!
//! The tree the parser produces and the matcher walks. Every node carries a
//! source [`Span`] for error reporting and a stable id assigned in parse
//! order.
//!
//! The shape of the AST mirrors the language: a query is a [`Seq`] on one
//! axis; each non-initial item records the edge that connects it to its
//! predecessor; a sequence may end in a dangling edge (only meaningful when
//! the sequence is the body of a quantified group, where it connects
//! consecutive iterations).

use crate::lexer::Span;

/// The two traversal axes. `{ … }` toggles between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Parent to child.
    Depth,
    /// Sibling to sibling under a common parent.
    Breadth,
}

impl Axis {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Depth => Self::Breadth,
            Self::Breadth => Self::Depth,
        }
    }
}

/// The edge between two consecutive sequence items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// `>` — direct child.
    Child,
    /// `>>` — descendant at any depth ≥ 1.
    Descendant,
    /// `:` — immediately following sibling.
    Adjacent,
    /// `::` — following sibling with zero or more siblings in between.
    Following,
}

impl Edge {
    #[must_use]
    pub const fn axis(self) -> Axis {
        match self {
            Self::Child | Self::Descendant => Axis::Depth,
            Self::Adjacent | Self::Following => Axis::Breadth,
        }
    }
}

/// An element predicate. Conjunctions are flattened into [`Pred::All`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
    /// `@` — any element.
    Any,
    /// Bare identifier — tag name equality.
    Tag(String),
    /// `.name` — requires the CSS class.
    Class(String),
    /// `#name` — requires the id.
    Id(String),
    /// `!p` — negation.
    Not(Box<Pred>),
    /// Dotted chain — all must hold on the same element.
    All(Vec<Pred>),
}

/// What a scalar extractor records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractKind {
    /// `txt` — the element's text.
    Text,
    /// `node` — an opaque handle to the element itself.
    Node,
    /// `.name` — the value of the attribute.
    Attr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    pub kind: ExtractKind,
    pub span: Span,
}

/// Comparison operators usable inside `~( … )`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,       // ==
    Ne,       // !=
    Regex,    // ~~
    NotRegex, // !~
}

/// A filter expression, evaluated against a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// `.name` — truthy iff the attribute is present and non-empty.
    Attr { name: String, span: Span },
    /// `$name` — truthy iff the caller-supplied function returns true.
    FnRef { name: String, span: Span },
    /// `.name op 'literal'`. For regex operators, `regex` is the index of
    /// the compiled regex in the pattern's regex table (assigned at compile).
    Cmp {
        attr: String,
        op: CmpOp,
        lit: String,
        regex: Option<usize>,
        span: Span,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

/// Extractors and filters suffixed to a term, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Postfix {
    pub extracts: Vec<Extract>,
    pub filter: Option<FilterExpr>,
}

impl Postfix {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extracts.is_empty() && self.filter.is_none()
    }
}

/// Quantifier attached to a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// `?` — zero or one.
    Optional,
    /// `*` — zero or more, greedy.
    Star,
    /// `+` — one or more, greedy.
    Plus,
}

impl RepeatKind {
    #[must_use]
    pub const fn min(self) -> usize {
        match self {
            Self::Optional | Self::Star => 0,
            Self::Plus => 1,
        }
    }

    #[must_use]
    pub const fn max(self) -> Option<usize> {
        match self {
            Self::Optional => Some(1),
            Self::Star | Self::Plus => None,
        }
    }
}

/// Stable node identifier assigned in parse order.
pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub id: NodeId,
    pub span: Span,
    pub kind: TermKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKind {
    /// A single element: predicates plus optional extractors and filter.
    Element { pred: Pred, post: Postfix },
    /// `( arm | arm | … )` — one arm is a plain group.
    Group { arms: Vec<Seq>, post: Postfix },
    /// `{ … }` — axis-toggled block.
    Brace { seq: Seq, post: Postfix },
    /// `$` — edge-of-axis assertion.
    Boundary,
    /// Quantified term.
    Repeat { term: Box<Term>, kind: RepeatKind },
}

/// One sequence step: the edge from the previous item, then the term.
/// The first item of a sequence has no edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqItem {
    pub pre_edge: Option<Edge>,
    pub term: Term,
}

/// A sequence of terms along one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seq {
    pub axis: Axis,
    pub items: Vec<SeqItem>,
    /// A dangling edge at the end of the sequence, as in `(span >)*`.
    /// Connects consecutive iterations when the sequence is the body of a
    /// quantified group; inert otherwise.
    pub trailing_edge: Option<Edge>,
    pub span: Span,
}

/// Whether any extractor is reachable inside `term`. A repetition whose
/// body has no extractors contributes nothing to the result shape.
#[must_use]
pub fn term_has_extract(term: &Term) -> bool {
    match &term.kind {
        TermKind::Element { post, .. } => !post.extracts.is_empty(),
        TermKind::Group { arms, post } => {
            !post.extracts.is_empty() || arms.iter().any(seq_has_extract)
        }
        TermKind::Brace { seq, post } => !post.extracts.is_empty() || seq_has_extract(seq),
        TermKind::Boundary => false,
        TermKind::Repeat { term, .. } => term_has_extract(term),
    }
}

/// Whether any extractor is reachable inside `seq`.
#[must_use]
pub fn seq_has_extract(seq: &Seq) -> bool {
    seq.items.iter().any(|item| term_has_extract(&item.term))
}

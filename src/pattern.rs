// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Compiled Patterns
//!
//! [`compile`] runs the whole front half of the pipeline — tokenize, parse,
//! shape analysis, regex compilation, tag interning — and produces a
//! [`Pattern`]: a deeply immutable object that can be matched against any
//! number of trees, from any number of threads, with no interior mutation.
//!
//! Compilation also derives a conservative set of tag names the first term
//! of the pattern can possibly match. When the set is known, `matches` can
//! skip candidate roots by tag without touching the backtracking engine at
//! all; when the pattern starts with `@`, a class test or anything else
//! tag-agnostic, the set is `None` and every candidate is tried.

use bit_set::BitSet;
use thiserror::Error;

use regex::Regex;

use crate::ast::{FilterExpr, Pred, Seq, Term, TermKind};
use crate::lexer::{self, LexError, Span};
use crate::parser::{ParseError, Parser};
use crate::shape::{self, Shape, ShapeError};

/// A compilation failure, wrapping the stage that raised it.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// A `~~` / `!~` literal that is not a valid regex.
    #[error("invalid regex literal at {span}: {source}")]
    Regex {
        span: Span,
        source: regex::Error,
    },
}

impl CompileError {
    /// The span of the offending construct.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Lex(e) => e.span(),
            Self::Parse(e) => e.span,
            Self::Shape(ShapeError::AltShapeMismatch { span }) => *span,
            Self::Regex { span, .. } => *span,
        }
    }
}

/// A compiled, reusable query.
#[derive(Debug)]
pub struct Pattern {
    seq: Seq,
    shape: Shape,
    regexes: Vec<Regex>,
    filter_fns: Vec<String>,
    tags: Vec<String>,
    first_tags: Option<BitSet>,
}

/// Compile a query source into a reusable [`Pattern`].
pub fn compile(source: &str) -> Result<Pattern, CompileError> {
    Pattern::compile(source)
}

impl Pattern {
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let tokens = lexer::tokenize(source)?;
        let mut seq = Parser::new(tokens, source.len()).parse_query()?;
        let shape = shape::analyze(&seq)?;
        let mut regexes = Vec::new();
        compile_regexes_in_seq(&mut seq, &mut regexes)?;
        let mut filter_fns = Vec::new();
        collect_fns_in_seq(&seq, &mut filter_fns);
        filter_fns.sort();
        filter_fns.dedup();
        let mut tags = Vec::new();
        collect_tags_in_seq(&seq, &mut tags);
        tags.sort();
        tags.dedup();
        let first_tags = first_tags(&seq, &tags);
        Ok(Self { seq, shape, regexes, filter_fns, tags, first_tags })
    }

    /// The static result shape shared by every match of this pattern.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Whether the pattern is anchored at the match root by a leading `$`.
    #[must_use]
    pub fn is_anchored(&self) -> bool {
        matches!(
            self.seq.items.first().map(|i| &i.term.kind),
            Some(TermKind::Boundary)
        )
    }

    /// Can an element with this tag possibly begin a match?
    #[must_use]
    pub fn admits_tag(&self, tag: &str) -> bool {
        let Some(set) = &self.first_tags else { return true };
        self.tags
            .iter()
            .position(|t| t == tag)
            .is_some_and(|i| set.contains(i))
    }

    pub(crate) fn seq(&self) -> &Seq {
        &self.seq
    }

    pub(crate) fn regexes(&self) -> &[Regex] {
        &self.regexes
    }

    pub(crate) fn filter_fns(&self) -> &[String] {
        &self.filter_fns
    }
}

fn compile_regexes_in_seq(seq: &mut Seq, out: &mut Vec<Regex>) -> Result<(), CompileError> {
    for item in &mut seq.items {
        compile_regexes_in_term(&mut item.term, out)?;
    }
    Ok(())
}

fn compile_regexes_in_term(term: &mut Term, out: &mut Vec<Regex>) -> Result<(), CompileError> {
    match &mut term.kind {
        TermKind::Element { post, .. } => {
            if let Some(filter) = &mut post.filter {
                compile_regexes_in_filter(filter, out)?;
            }
        }
        TermKind::Group { arms, post } => {
            for arm in arms {
                compile_regexes_in_seq(arm, out)?;
            }
            if let Some(filter) = &mut post.filter {
                compile_regexes_in_filter(filter, out)?;
            }
        }
        TermKind::Brace { seq, post } => {
            compile_regexes_in_seq(seq, out)?;
            if let Some(filter) = &mut post.filter {
                compile_regexes_in_filter(filter, out)?;
            }
        }
        TermKind::Boundary => {}
        TermKind::Repeat { term, .. } => compile_regexes_in_term(term, out)?,
    }
    Ok(())
}

fn compile_regexes_in_filter(
    filter: &mut FilterExpr,
    out: &mut Vec<Regex>,
) -> Result<(), CompileError> {
    match filter {
        FilterExpr::Cmp { op, lit, regex, span, .. } => {
            use crate::ast::CmpOp;
            if matches!(op, CmpOp::Regex | CmpOp::NotRegex) {
                let compiled = Regex::new(lit).map_err(|source| CompileError::Regex {
                    span: *span,
                    source,
                })?;
                *regex = Some(out.len());
                out.push(compiled);
            }
            Ok(())
        }
        FilterExpr::And(arms) | FilterExpr::Or(arms) => {
            for arm in arms {
                compile_regexes_in_filter(arm, out)?;
            }
            Ok(())
        }
        FilterExpr::Attr { .. } | FilterExpr::FnRef { .. } => Ok(()),
    }
}

fn collect_fns_in_seq(seq: &Seq, out: &mut Vec<String>) {
    for item in &seq.items {
        collect_fns_in_term(&item.term, out);
    }
}

fn collect_fns_in_term(term: &Term, out: &mut Vec<String>) {
    let post_filter = match &term.kind {
        TermKind::Element { post, .. } => post.filter.as_ref(),
        TermKind::Group { arms, post } => {
            for arm in arms {
                collect_fns_in_seq(arm, out);
            }
            post.filter.as_ref()
        }
        TermKind::Brace { seq, post } => {
            collect_fns_in_seq(seq, out);
            post.filter.as_ref()
        }
        TermKind::Boundary => None,
        TermKind::Repeat { term, .. } => {
            collect_fns_in_term(term, out);
            None
        }
    };
    if let Some(filter) = post_filter {
        collect_fns_in_filter(filter, out);
    }
}

fn collect_fns_in_filter(filter: &FilterExpr, out: &mut Vec<String>) {
    match filter {
        FilterExpr::FnRef { name, .. } => out.push(name.clone()),
        FilterExpr::And(arms) | FilterExpr::Or(arms) => {
            for arm in arms {
                collect_fns_in_filter(arm, out);
            }
        }
        FilterExpr::Attr { .. } | FilterExpr::Cmp { .. } => {}
    }
}

fn collect_tags_in_seq(seq: &Seq, out: &mut Vec<String>) {
    for item in &seq.items {
        collect_tags_in_term(&item.term, out);
    }
}

fn collect_tags_in_term(term: &Term, out: &mut Vec<String>) {
    match &term.kind {
        TermKind::Element { pred, .. } => collect_tags_in_pred(pred, out),
        TermKind::Group { arms, .. } => {
            for arm in arms {
                collect_tags_in_seq(arm, out);
            }
        }
        TermKind::Brace { seq, .. } => collect_tags_in_seq(seq, out),
        TermKind::Boundary => {}
        TermKind::Repeat { term, .. } => collect_tags_in_term(term, out),
    }
}

fn collect_tags_in_pred(pred: &Pred, out: &mut Vec<String>) {
    match pred {
        Pred::Tag(tag) => out.push(tag.clone()),
        Pred::Not(inner) => collect_tags_in_pred(inner, out),
        Pred::All(preds) => {
            for p in preds {
                collect_tags_in_pred(p, out);
            }
        }
        Pred::Any | Pred::Class(_) | Pred::Id(_) => {}
    }
}

/// The tags the first matched element can have, or `None` when unknown.
/// Deliberately conservative: anything but a plain element head gives up.
fn first_tags(seq: &Seq, interned: &[String]) -> Option<BitSet> {
    let mut names = Vec::new();
    if !term_first_tags(&seq.items.first()?.term, &mut names) {
        return None;
    }
    let mut set = BitSet::new();
    for name in names {
        set.insert(interned.iter().position(|t| *t == name)?);
    }
    Some(set)
}

/// Collect the tag names `term` can match as the first element of a match.
/// Returns false when the set cannot be known statically.
fn term_first_tags(term: &Term, out: &mut Vec<String>) -> bool {
    match &term.kind {
        TermKind::Element { pred, .. } => pred_first_tags(pred, out),
        TermKind::Group { arms, .. } => arms.iter().all(|arm| {
            arm.items
                .first()
                .is_some_and(|item| term_first_tags(&item.term, out))
        }),
        // A brace block, a boundary, or a skippable repetition says nothing
        // about the tag of the element the match starts at.
        TermKind::Brace { .. } | TermKind::Boundary | TermKind::Repeat { .. } => false,
    }
}

fn pred_first_tags(pred: &Pred, out: &mut Vec<String>) -> bool {
    match pred {
        Pred::Tag(tag) => {
            out.push(tag.clone());
            true
        }
        Pred::All(preds) => preds.iter().any(|p| pred_first_tags(p, &mut *out)),
        Pred::Any | Pred::Class(_) | Pred::Id(_) | Pred::Not(_) => false,
    }
}

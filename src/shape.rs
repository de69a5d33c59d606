// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Result Shape Analysis
//!
//! One pass over the query AST that derives the static structure of every
//! result tuple before any tree is seen. The matcher only fills slots; it
//! never discovers shape dynamically, which is what makes alternation-arm
//! mismatches a compile error rather than a runtime surprise.
//!
//! The rules:
//! - an extractor contributes one [`Shape::Scalar`];
//! - a group wraps its slots in a [`Shape::Tuple`], except that a group with
//!   a single slot collapses to that slot (so `(a[txt])*` is a list of
//!   scalars, not a list of one-tuples);
//! - `*`/`+` wrap their body's collapsed slots in a [`Shape::List`], `?` in
//!   a [`Shape::Optional`]; bodies without extractors contribute nothing;
//! - a `{ … }` block is transparent: its slots flow into the enclosing
//!   tuple;
//! - the top level is always a tuple, even for a single extractor.

use std::fmt;

use thiserror::Error;

use crate::ast::{RepeatKind, Seq, Term, TermKind};
use crate::lexer::Span;

/// The static, data-independent structure of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// One extractor: a string or an opaque node handle.
    Scalar,
    /// Fixed-arity tuple from a group or the implicit top-level grouping.
    Tuple(Vec<Shape>),
    /// Ordered sequence from `*` / `+`.
    List(Box<Shape>),
    /// Present-or-absent from `?`.
    Optional(Box<Shape>),
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "_"),
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

/// Errors found during shape analysis.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// The arms of an alternation would produce differently shaped results.
    #[error("alternation arms produce different result shapes at {span}")]
    AltShapeMismatch { span: Span },
}

/// Derive the top-level result shape of a parsed query.
pub(crate) fn analyze(seq: &Seq) -> Result<Shape, ShapeError> {
    Ok(Shape::Tuple(seq_slots(seq)?))
}

/// Collapse a slot list into the single shape a boundary construct yields.
/// `None` means the construct contributes nothing.
fn collapse(mut slots: Vec<Shape>) -> Option<Shape> {
    match slots.len() {
        0 => None,
        1 => slots.pop(),
        _ => Some(Shape::Tuple(slots)),
    }
}

fn seq_slots(seq: &Seq) -> Result<Vec<Shape>, ShapeError> {
    let mut slots = Vec::new();
    for item in &seq.items {
        slots.extend(term_slots(&item.term)?);
    }
    Ok(slots)
}

fn term_slots(term: &Term) -> Result<Vec<Shape>, ShapeError> {
    match &term.kind {
        TermKind::Boundary => Ok(Vec::new()),
        TermKind::Element { post, .. } => {
            Ok(post.extracts.iter().map(|_| Shape::Scalar).collect())
        }
        TermKind::Brace { seq, post } => {
            let mut slots = seq_slots(seq)?;
            slots.extend(post.extracts.iter().map(|_| Shape::Scalar));
            Ok(slots)
        }
        TermKind::Group { arms, post } => {
            let first = match arms.first() {
                Some(arm) => seq_slots(arm)?,
                None => Vec::new(),
            };
            for arm in arms.iter().skip(1) {
                if seq_slots(arm)? != first {
                    return Err(ShapeError::AltShapeMismatch { span: term.span });
                }
            }
            let mut slots: Vec<Shape> = collapse(first).into_iter().collect();
            slots.extend(post.extracts.iter().map(|_| Shape::Scalar));
            Ok(slots)
        }
        TermKind::Repeat { term: body, kind } => {
            let Some(inner) = collapse(term_slots(body)?) else {
                return Ok(Vec::new());
            };
            let shape = match kind {
                RepeatKind::Optional => Shape::Optional(Box::new(inner)),
                RepeatKind::Star | RepeatKind::Plus => Shape::List(Box::new(inner)),
            };
            Ok(vec![shape])
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse;

    fn shape_of(src: &str) -> Shape {
        analyze(&parse(src).expect("should parse")).expect("should analyze")
    }

    #[test]
    fn test_flat_scalars() {
        assert_eq!(
            shape_of("div#find-me[txt, .data-attr]"),
            Shape::Tuple(vec![Shape::Scalar, Shape::Scalar])
        );
        assert_eq!(shape_of("div > a[txt]"), Shape::Tuple(vec![Shape::Scalar]));
    }

    #[test]
    fn test_no_extractors_is_an_empty_tuple() {
        assert_eq!(shape_of("div > a"), Shape::Tuple(vec![]));
    }

    #[test]
    fn test_brace_is_transparent() {
        assert_eq!(
            shape_of("{ $ : a[txt] : b[txt] : $ }"),
            Shape::Tuple(vec![Shape::Scalar, Shape::Scalar])
        );
    }

    #[test]
    fn test_single_slot_group_collapses() {
        assert_eq!(
            shape_of("(a[txt])*"),
            Shape::Tuple(vec![Shape::List(Box::new(Shape::Scalar))])
        );
    }

    #[test]
    fn test_multi_slot_repeat_body_becomes_tuple() {
        assert_eq!(
            shape_of("(a[txt] > b[txt])+"),
            Shape::Tuple(vec![Shape::List(Box::new(Shape::Tuple(vec![
                Shape::Scalar,
                Shape::Scalar
            ])))])
        );
    }

    #[test]
    fn test_optional() {
        assert_eq!(
            shape_of("div > a[txt]?"),
            Shape::Tuple(vec![Shape::Optional(Box::new(Shape::Scalar))])
        );
    }

    #[test]
    fn test_shapeless_repetition_contributes_nothing() {
        assert_eq!(
            shape_of("div > (span >)* > a[txt]"),
            Shape::Tuple(vec![Shape::Scalar])
        );
    }

    #[test]
    fn test_alt_arms_must_agree() {
        assert_eq!(
            shape_of("(a[txt] | b[txt])"),
            Shape::Tuple(vec![Shape::Scalar])
        );
        let seq = parse("(a[txt] | b)").expect("should parse");
        assert!(matches!(
            analyze(&seq),
            Err(ShapeError::AltShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(shape_of("a[txt] > (b[txt])* > c[txt]?").to_string(), "(_, [_], _?)");
    }
}

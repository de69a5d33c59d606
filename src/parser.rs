// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Query Parser
//!
//! Recursive descent over the token stream, producing a [`Seq`] AST.
//!
//! The parser keeps the current axis on an explicit stack: a query starts on
//! the depth axis and every `{` toggles, so edges are resolved to
//! child/descendant or adjacent/following purely at parse time. The matcher
//! never sees a brace.
//!
//! Deviations from a strict reading of the surface grammar, all needed by
//! real queries:
//! - `[extractors]` and `~(filter)` suffixes are accepted in either order,
//!   and also after `( … )` and `{ … }` atoms.
//! - A tag expression may start with `.class`, `#id` or `!` (an implied
//!   `@` head).
//! - `!` negates the single following simple predicate.
//! - A sequence may end in a dangling edge, as in `(span >)*`; the edge
//!   joins consecutive iterations of a quantified group.

use thiserror::Error;

use crate::ast::{
    Axis, CmpOp, Edge, Extract, ExtractKind, FilterExpr, NodeId, Postfix, Pred, RepeatKind, Seq,
    SeqItem, Term, TermKind,
};
use crate::lexer::{Span, Token, TokenKind};

/// A token mismatch: what the parser wanted, what it found, and where.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected {expected}, found {found} at {span}")]
pub struct ParseError {
    pub span: Span,
    pub expected: String,
    pub found: String,
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    src_len: usize,
    next_id: NodeId,
    axis: Vec<Axis>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>, src_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            src_len,
            next_id: 0,
            axis: vec![Axis::Depth],
        }
    }

    /// Parse a whole query. The top level is a depth-axis sequence.
    pub(crate) fn parse_query(mut self) -> Result<Seq, ParseError> {
        let seq = self.parse_seq()?;
        if seq.trailing_edge.is_some() {
            // `div >` with nothing after it is only meaningful inside a
            // quantified group.
            return Err(self.err("a term after the trailing edge"));
        }
        if self.peek().is_some() {
            return Err(self.err("end of input"));
        }
        Ok(seq)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == *kind => {
                let token = token.clone();
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.err(expected)),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), ParseError> {
        match self.tokens.get(self.pos) {
            Some(Token { kind: TokenKind::Ident(name), span }) => {
                let out = (name.clone(), *span);
                self.pos += 1;
                Ok(out)
            }
            _ => Err(self.err(expected)),
        }
    }

    fn err(&self, expected: impl Into<String>) -> ParseError {
        let (span, found) = match self.peek() {
            Some(token) => (token.span, token.kind.describe()),
            None => (Span::point(self.src_len), "end of input".to_string()),
        };
        ParseError {
            span,
            expected: expected.into(),
            found,
        }
    }

    fn here(&self) -> Span {
        self.peek().map_or(Span::point(self.src_len), |t| t.span)
    }

    /// Span of the most recently consumed token.
    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map_or(Span::point(0), |t| t.span)
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn current_axis(&self) -> Axis {
        self.axis.last().copied().unwrap_or(Axis::Depth)
    }

    /// Is the edge token valid on the current axis, and which edge is it?
    fn peek_edge(&self) -> Option<Edge> {
        let edge = match self.peek_kind()? {
            TokenKind::Gt => Edge::Child,
            TokenKind::GtGt => Edge::Descendant,
            TokenKind::Colon => Edge::Adjacent,
            TokenKind::ColonColon => Edge::Following,
            _ => return None,
        };
        (edge.axis() == self.current_axis()).then_some(edge)
    }

    fn starts_term(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Ident(_)
                    | TokenKind::At
                    | TokenKind::Dot
                    | TokenKind::Hash
                    | TokenKind::Bang
                    | TokenKind::Dollar
                    | TokenKind::LParen
                    | TokenKind::LBrace
            )
        )
    }

    fn parse_seq(&mut self) -> Result<Seq, ParseError> {
        let axis = self.current_axis();
        let start = self.here();
        let first = self.parse_term()?;
        let mut span = start.cover(first.span);
        let mut items = vec![SeqItem { pre_edge: None, term: first }];
        let mut trailing_edge = None;
        while let Some(edge) = self.peek_edge() {
            self.pos += 1;
            if self.starts_term() {
                let term = self.parse_term()?;
                span = span.cover(term.span);
                items.push(SeqItem { pre_edge: Some(edge), term });
            } else {
                trailing_edge = Some(edge);
                break;
            }
        }
        Ok(Seq { axis, items, trailing_edge, span })
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        let term = self.parse_atom()?;
        let quantifier = match self.peek_kind() {
            Some(TokenKind::Question) => Some(RepeatKind::Optional),
            Some(TokenKind::Star) => Some(RepeatKind::Star),
            Some(TokenKind::Plus) => Some(RepeatKind::Plus),
            _ => None,
        };
        let Some(kind) = quantifier else { return Ok(term) };
        if matches!(term.kind, TermKind::Boundary) {
            return Err(self.err("no quantifier after `$`"));
        }
        let quant_span = self.here();
        self.pos += 1;
        if matches!(
            self.peek_kind(),
            Some(TokenKind::Question | TokenKind::Star | TokenKind::Plus)
        ) {
            return Err(self.err("a single quantifier"));
        }
        let span = term.span.cover(quant_span);
        Ok(Term {
            id: self.fresh_id(),
            span,
            kind: TermKind::Repeat { term: Box::new(term), kind },
        })
    }

    fn parse_atom(&mut self) -> Result<Term, ParseError> {
        let start = self.here();
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let mut arms = vec![self.parse_seq()?];
                while self.eat(&TokenKind::Pipe) {
                    arms.push(self.parse_seq()?);
                }
                let close = self.expect(&TokenKind::RParen, "`)` or `|`")?;
                let post = self.parse_postfix()?;
                Ok(Term {
                    id: self.fresh_id(),
                    span: start.cover(close.span),
                    kind: TermKind::Group { arms, post },
                })
            }
            Some(TokenKind::LBrace) => {
                self.pos += 1;
                self.axis.push(self.current_axis().toggled());
                let seq = self.parse_seq()?;
                self.axis.pop();
                let close = self.expect(&TokenKind::RBrace, "`}`")?;
                let post = self.parse_postfix()?;
                Ok(Term {
                    id: self.fresh_id(),
                    span: start.cover(close.span),
                    kind: TermKind::Brace { seq, post },
                })
            }
            Some(TokenKind::Dollar) => {
                self.pos += 1;
                Ok(Term {
                    id: self.fresh_id(),
                    span: start,
                    kind: TermKind::Boundary,
                })
            }
            _ => {
                let pred = self.parse_tag_expr()?;
                let post = self.parse_postfix()?;
                let span = start.cover(self.prev_span());
                Ok(Term {
                    id: self.fresh_id(),
                    span,
                    kind: TermKind::Element { pred, post },
                })
            }
        }
    }

    /// `tagExpr` — a conjunction chain such as `div.note#main!.hidden`.
    fn parse_tag_expr(&mut self) -> Result<Pred, ParseError> {
        let mut preds = Vec::new();
        while let Some(pred) = self.parse_tag_component()? {
            preds.push(pred);
        }
        match preds.len() {
            0 => Err(self.err("a tag expression")),
            1 => Ok(preds.swap_remove(0)),
            _ => Ok(Pred::All(preds)),
        }
    }

    fn parse_tag_component(&mut self) -> Result<Option<Pred>, ParseError> {
        let pred = match self.peek_kind() {
            Some(TokenKind::At) => {
                self.pos += 1;
                Pred::Any
            }
            Some(TokenKind::Ident(_)) => {
                let (name, _) = self.expect_ident("a tag name")?;
                Pred::Tag(name)
            }
            Some(TokenKind::Dot) => {
                self.pos += 1;
                let (name, _) = self.expect_ident("a class name after `.`")?;
                Pred::Class(name)
            }
            Some(TokenKind::Hash) => {
                self.pos += 1;
                let (name, _) = self.expect_ident("an id after `#`")?;
                Pred::Id(name)
            }
            Some(TokenKind::Bang) => {
                self.pos += 1;
                match self.parse_tag_component()? {
                    Some(inner) => Pred::Not(Box::new(inner)),
                    None => return Err(self.err("a predicate after `!`")),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(pred))
    }

    /// Zero or more `[extractors]` / `~(filter)` suffixes, any order.
    fn parse_postfix(&mut self) -> Result<Postfix, ParseError> {
        let mut post = Postfix::default();
        loop {
            match self.peek_kind() {
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    loop {
                        post.extracts.push(self.parse_extractor()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "`]` or `,`")?;
                }
                Some(TokenKind::Tilde) => {
                    self.pos += 1;
                    self.expect(&TokenKind::LParen, "`(` after `~`")?;
                    let filter = self.parse_filter_or()?;
                    self.expect(&TokenKind::RParen, "`)`")?;
                    post.filter = Some(match post.filter.take() {
                        None => filter,
                        Some(prev) => FilterExpr::And(vec![prev, filter]),
                    });
                }
                _ => break,
            }
        }
        Ok(post)
    }

    fn parse_extractor(&mut self) -> Result<Extract, ParseError> {
        let start = self.here();
        match self.peek_kind() {
            Some(TokenKind::Dot) => {
                self.pos += 1;
                let (name, span) = self.expect_ident("an attribute name after `.`")?;
                Ok(Extract {
                    kind: ExtractKind::Attr(name),
                    span: start.cover(span),
                })
            }
            Some(TokenKind::Ident(name)) if name == "txt" => {
                self.pos += 1;
                Ok(Extract { kind: ExtractKind::Text, span: start })
            }
            Some(TokenKind::Ident(name)) if name == "node" => {
                self.pos += 1;
                Ok(Extract { kind: ExtractKind::Node, span: start })
            }
            _ => Err(self.err("`txt`, `node` or `.attr`")),
        }
    }

    fn parse_filter_or(&mut self) -> Result<FilterExpr, ParseError> {
        let mut arms = vec![self.parse_filter_and()?];
        while self.eat(&TokenKind::OrOr) {
            arms.push(self.parse_filter_and()?);
        }
        if arms.len() == 1 {
            Ok(arms.swap_remove(0))
        } else {
            Ok(FilterExpr::Or(arms))
        }
    }

    fn parse_filter_and(&mut self) -> Result<FilterExpr, ParseError> {
        let mut arms = vec![self.parse_filter_cmp()?];
        while self.eat(&TokenKind::AndAnd) {
            arms.push(self.parse_filter_cmp()?);
        }
        if arms.len() == 1 {
            Ok(arms.swap_remove(0))
        } else {
            Ok(FilterExpr::And(arms))
        }
    }

    fn parse_filter_cmp(&mut self) -> Result<FilterExpr, ParseError> {
        let start = self.here();
        match self.peek_kind() {
            Some(TokenKind::Dot) => {
                self.pos += 1;
                let (attr, span) = self.expect_ident("an attribute name after `.`")?;
                let op = match self.peek_kind() {
                    Some(TokenKind::EqEq) => Some(CmpOp::Eq),
                    Some(TokenKind::NotEq) => Some(CmpOp::Ne),
                    Some(TokenKind::Match) => Some(CmpOp::Regex),
                    Some(TokenKind::NotMatch) => Some(CmpOp::NotRegex),
                    _ => None,
                };
                let Some(op) = op else {
                    return Ok(FilterExpr::Attr { name: attr, span: start.cover(span) });
                };
                self.pos += 1;
                let lit = match self.tokens.get(self.pos) {
                    Some(Token { kind: TokenKind::Str(lit), span }) => {
                        let lit = (lit.clone(), *span);
                        self.pos += 1;
                        lit
                    }
                    _ => return Err(self.err("a string literal")),
                };
                Ok(FilterExpr::Cmp {
                    attr,
                    op,
                    lit: lit.0,
                    regex: None,
                    span: start.cover(lit.1),
                })
            }
            Some(TokenKind::Dollar) => {
                self.pos += 1;
                let (name, span) = self.expect_ident("a filter function name after `$`")?;
                Ok(FilterExpr::FnRef { name, span: start.cover(span) })
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let inner = self.parse_filter_or()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            _ => Err(self.err("`.attr`, `$fn` or `(`")),
        }
    }
}

/// Tokenize and parse a query source into its AST.
pub(crate) fn parse(src: &str) -> Result<Seq, ParseError> {
    // Lexing is the caller's concern when it wants the LexError; this
    // helper exists for tests and internal tools that only care about
    // structure.
    let tokens = crate::lexer::tokenize(src).map_err(|e| ParseError {
        span: e.span(),
        expected: "a token".to_string(),
        found: e.to_string(),
    })?;
    Parser::new(tokens, src.len()).parse_query()
}

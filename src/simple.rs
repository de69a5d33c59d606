// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # The Simple Backend
//!
//! An arena-backed element tree plus a small fragment parser, gated behind
//! the `simple` feature. The engine never depends on this module; it exists
//! so tests, docs and small programs have a [`TreeNode`] implementation
//! without pulling in a real HTML parser.
//!
//! [`SimpleTree::parse`] accepts an HTML-like fragment syntax: elements,
//! attributes (quoted either way, or bare), text, and self-closing tags.
//! It is deliberately not an HTML parser — no entities, no comments, no
//! implied closes. Fragments are wrapped in a synthetic `root` element so a
//! fragment may have several top-level siblings.
//!
//! ```
//! use tql::TreeNode;
//! use tql::simple::SimpleTree;
//!
//! let tree = SimpleTree::parse("<ul><li>one</li><li>two</li></ul>")?;
//! let ul = tree.root().children().next().unwrap();
//! assert_eq!(ul.tag_name(), "ul");
//! assert_eq!(ul.children().len(), 2);
//! # Ok::<(), tql::simple::FragmentError>(())
//! ```

use std::borrow::Cow;

use thiserror::Error;

use crate::node::TreeNode;

/// Errors from [`SimpleTree::parse`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragmentError {
    /// An element was still open when the fragment ended.
    #[error("unclosed element `<{0}>`")]
    Unclosed(String),
    /// A closing tag did not match the innermost open element.
    #[error("mismatched closing tag `</{found}>`, expected `</{expected}>`")]
    MismatchedClose { expected: String, found: String },
    /// A tag that could not be read (bad name, missing `>`, stray `</`).
    #[error("malformed tag at byte {0}")]
    Malformed(usize),
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    classes: Vec<String>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// An owned element tree. Nodes are handles into the tree's arena.
#[derive(Debug, Clone)]
pub struct SimpleTree {
    nodes: Vec<NodeData>,
}

/// A cheap handle to one element of a [`SimpleTree`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleNode<'t> {
    tree: &'t SimpleTree,
    idx: usize,
}

impl PartialEq for SimpleNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.idx == other.idx
    }
}

impl Eq for SimpleNode<'_> {}

impl SimpleTree {
    /// Parse a fragment into a tree rooted at a synthetic `root` element.
    pub fn parse(fragment: &str) -> Result<Self, FragmentError> {
        Parser { src: fragment.as_bytes(), pos: 0 }.run()
    }

    /// The synthetic `root` element wrapping the fragment.
    #[must_use]
    pub fn root(&self) -> SimpleNode<'_> {
        SimpleNode { tree: self, idx: 0 }
    }
}

impl<'t> SimpleNode<'t> {
    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.idx]
    }
}

impl TreeNode for SimpleNode<'_> {
    fn tag_name(&self) -> &str {
        &self.data().tag
    }

    fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    fn classes(&self) -> impl Iterator<Item = &str> {
        self.data().classes.iter().map(String::as_str)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.data()
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.data().text)
    }

    fn children(&self) -> impl ExactSizeIterator<Item = Self> {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&idx| SimpleNode { tree, idx })
    }

    fn parent(&self) -> Option<Self> {
        let parent = self.data().parent?;
        Some(SimpleNode { tree: self.tree, idx: parent })
    }
}

struct Parser<'s> {
    src: &'s [u8],
    pos: usize,
}

const fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

impl Parser<'_> {
    fn run(mut self) -> Result<SimpleTree, FragmentError> {
        let mut nodes = vec![NodeData {
            tag: "root".to_string(),
            attrs: Vec::new(),
            classes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }];
        let mut open = vec![0usize];

        while self.pos < self.src.len() {
            let text_start = self.pos;
            while self.pos < self.src.len() && self.src[self.pos] != b'<' {
                self.pos += 1;
            }
            if self.pos > text_start {
                let chunk = self.slice(text_start, self.pos);
                if !chunk.trim().is_empty() {
                    if let Some(&top) = open.last() {
                        nodes[top].text.push_str(chunk);
                    }
                }
            }
            if self.pos >= self.src.len() {
                break;
            }
            // at '<'
            if self.src.get(self.pos + 1) == Some(&b'/') {
                let at = self.pos;
                self.pos += 2;
                let name = self.read_name().ok_or(FragmentError::Malformed(at))?;
                self.skip_ws();
                if self.src.get(self.pos) != Some(&b'>') {
                    return Err(FragmentError::Malformed(at));
                }
                self.pos += 1;
                let Some(&top) = open.last() else {
                    return Err(FragmentError::Malformed(at));
                };
                if top == 0 {
                    return Err(FragmentError::MismatchedClose {
                        expected: "root".to_string(),
                        found: name,
                    });
                }
                if nodes[top].tag != name {
                    return Err(FragmentError::MismatchedClose {
                        expected: nodes[top].tag.clone(),
                        found: name,
                    });
                }
                open.pop();
            } else {
                let at = self.pos;
                self.pos += 1;
                let tag = self.read_name().ok_or(FragmentError::Malformed(at))?;
                let mut attrs: Vec<(String, String)> = Vec::new();
                let self_closing = loop {
                    self.skip_ws();
                    match self.src.get(self.pos) {
                        Some(&b'>') => {
                            self.pos += 1;
                            break false;
                        }
                        Some(&b'/') => {
                            self.pos += 1;
                            if self.src.get(self.pos) != Some(&b'>') {
                                return Err(FragmentError::Malformed(at));
                            }
                            self.pos += 1;
                            break true;
                        }
                        Some(_) => {
                            let name =
                                self.read_name().ok_or(FragmentError::Malformed(at))?;
                            let value = if self.src.get(self.pos) == Some(&b'=') {
                                self.pos += 1;
                                self.read_attr_value(at)?
                            } else {
                                // bare attribute: present and empty
                                String::new()
                            };
                            attrs.push((name, value));
                        }
                        None => return Err(FragmentError::Unclosed(tag)),
                    }
                };
                let classes = attrs
                    .iter()
                    .find(|(k, _)| k == "class")
                    .map(|(_, v)| v.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                let idx = nodes.len();
                let parent = open.last().copied().unwrap_or(0);
                nodes.push(NodeData {
                    tag,
                    attrs,
                    classes,
                    text: String::new(),
                    parent: Some(parent),
                    children: Vec::new(),
                });
                nodes[parent].children.push(idx);
                if !self_closing {
                    open.push(idx);
                }
            }
        }
        if open.len() > 1 {
            let top = open[open.len() - 1];
            return Err(FragmentError::Unclosed(nodes[top].tag.clone()));
        }
        Ok(SimpleTree { nodes })
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        std::str::from_utf8(&self.src[start..end]).unwrap_or("")
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn read_name(&mut self) -> Option<String> {
        let start = self.pos;
        while self.pos < self.src.len() && is_name_byte(self.src[self.pos]) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.slice(start, self.pos).to_string())
    }

    fn read_attr_value(&mut self, at: usize) -> Result<String, FragmentError> {
        match self.src.get(self.pos) {
            Some(&q) if q == b'"' || q == b'\'' => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.src.len() && self.src[self.pos] != q {
                    self.pos += 1;
                }
                if self.pos >= self.src.len() {
                    return Err(FragmentError::Malformed(at));
                }
                let value = self.slice(start, self.pos).to_string();
                self.pos += 1;
                Ok(value)
            }
            _ => {
                let start = self.pos;
                while self
                    .src
                    .get(self.pos)
                    .is_some_and(|&b| !b.is_ascii_whitespace() && b != b'>' && b != b'/')
                {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(FragmentError::Malformed(at));
                }
                Ok(self.slice(start, self.pos).to_string())
            }
        }
    }
}

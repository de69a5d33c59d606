// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # The Tree Adapter
//!
//! The narrow boundary through which the matcher inspects an external tree.
//! The engine performs no HTML parsing and no HTML-specific logic beyond
//! tag/class/id/attribute/text reads through this trait; any DOM-like
//! structure can implement it (the crate's own `simple` backend is one
//! example).
//!
//! ## Contract
//!
//! - All operations are side-effect-free and must return stable answers for
//!   the duration of one `matches` call.
//! - `children` yields *element* children only, in document order.
//! - `attr` distinguishes an absent attribute (`None`) from one that is
//!   present and empty (`Some("")`).
//! - Implementations are expected to be cheap handles (an index or
//!   reference pair), since the matcher clones nodes freely while
//!   backtracking.

use std::borrow::Cow;

/// An element of an HTML-like tree.
pub trait TreeNode: Clone {
    /// The element's tag name.
    fn tag_name(&self) -> &str;

    /// The element's id, if it has one.
    fn id(&self) -> Option<&str>;

    /// The element's CSS classes.
    fn classes(&self) -> impl Iterator<Item = &str>;

    /// An attribute value. `None` when absent; `Some("")` when present but
    /// empty.
    fn attr(&self, name: &str) -> Option<&str>;

    /// The concatenation of the element's direct text children (or a
    /// domain-defined aggregate).
    fn text(&self) -> Cow<'_, str>;

    /// Element children in document order.
    fn children(&self) -> impl ExactSizeIterator<Item = Self>;

    /// The parent element, if any.
    fn parent(&self) -> Option<Self>;

    fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Whether the element has no element children. Text-only elements are
    /// leaves.
    fn is_leaf(&self) -> bool {
        self.children().len() == 0
    }

    /// Pre-order traversal of the subtree rooted at `self`, including
    /// `self`.
    fn dfs(&self) -> impl Iterator<Item = Self> {
        let mut stack = vec![self.clone()];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev());
            Some(node)
        })
    }
}

#[cfg(all(test, feature = "simple"))]
mod test {
    use super::*;
    use crate::simple::SimpleTree;

    #[test]
    fn test_dfs_is_preorder() {
        let tree = SimpleTree::parse("<a><b><c></c></b><d></d></a>").expect("should parse");
        let tags: Vec<String> = tree
            .root()
            .dfs()
            .map(|n| n.tag_name().to_string())
            .collect();
        assert_eq!(tags, vec!["root", "a", "b", "c", "d"]);
    }

    #[test]
    fn test_leaves() {
        let tree = SimpleTree::parse("<a>text only</a>").expect("should parse");
        let a = tree.root().children().next().expect("should have a child");
        assert!(a.is_leaf());
        assert!(!tree.root().is_leaf());
    }
}

// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Filter Evaluation
//!
//! Evaluates `~( … )` guards against a matched element, and holds the
//! registry of caller-supplied filter functions that `$name` references
//! resolve against.
//!
//! Semantics:
//! - `.attr` alone is truthy iff the attribute is present and non-empty;
//! - `==` / `~~` on an absent attribute are false, `!=` / `!~` are true;
//! - `$name` calls the registered function; names are validated before
//!   enumeration starts, so an unregistered name never reaches evaluation;
//! - regexes are compiled once at `compile()` time and looked up by index.
//!
//! Filter functions are untrusted with respect to purity: the engine may
//! invoke one several times per element while backtracking, and it never
//! catches panics from them.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::ast::{CmpOp, FilterExpr};
use crate::node::TreeNode;

/// Named filter functions, resolved at `matches` time.
pub struct FilterSet<N> {
    map: HashMap<String, Box<dyn Fn(&N) -> bool>>,
}

impl<N> FilterSet<N> {
    #[must_use]
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Register a function under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, f: impl Fn(&N) -> bool + 'static) {
        self.map.insert(name.into(), Box::new(f));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&(dyn Fn(&N) -> bool)> {
        self.map.get(name).map(|f| &**f)
    }
}

impl<N> Default for FilterSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for FilterSet<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// Evaluate a filter expression against one element.
pub(crate) fn eval<N: TreeNode>(
    expr: &FilterExpr,
    node: &N,
    regexes: &[Regex],
    filters: &FilterSet<N>,
) -> bool {
    match expr {
        FilterExpr::Attr { name, .. } => node.attr(name).is_some_and(|v| !v.is_empty()),
        FilterExpr::FnRef { name, .. } => filters.get(name).is_some_and(|f| f(node)),
        FilterExpr::Cmp { attr, op, lit, regex, .. } => {
            let value = node.attr(attr);
            match op {
                CmpOp::Eq => value == Some(lit.as_str()),
                CmpOp::Ne => value != Some(lit.as_str()),
                CmpOp::Regex => regex_holds(value, *regex, regexes),
                CmpOp::NotRegex => !regex_holds(value, *regex, regexes),
            }
        }
        FilterExpr::And(arms) => arms.iter().all(|a| eval(a, node, regexes, filters)),
        FilterExpr::Or(arms) => arms.iter().any(|a| eval(a, node, regexes, filters)),
    }
}

fn regex_holds(value: Option<&str>, slot: Option<usize>, regexes: &[Regex]) -> bool {
    match (value, slot.and_then(|i| regexes.get(i))) {
        (Some(value), Some(re)) => re.is_match(value),
        _ => false,
    }
}

#[cfg(all(test, feature = "simple"))]
mod test {
    use super::*;
    use crate::node::TreeNode as _;
    use crate::simple::SimpleTree;

    fn first_el(tree: &SimpleTree) -> crate::simple::SimpleNode<'_> {
        tree.root().children().next().expect("should have a child")
    }

    #[test]
    fn test_attr_truthiness() {
        let tree = SimpleTree::parse("<a k=\"v\" empty=\"\"></a>").expect("should parse");
        let regexes = [];
        let filters = FilterSet::new();
        let el = first_el(&tree);
        let truthy = |name: &str| {
            let expr = FilterExpr::Attr {
                name: name.to_string(),
                span: crate::lexer::Span::point(0),
            };
            eval(&expr, &el, &regexes, &filters)
        };
        assert!(truthy("k"));
        assert!(!truthy("empty"));
        assert!(!truthy("missing"));
    }

    #[test]
    fn test_absent_attribute_comparisons() {
        let tree = SimpleTree::parse("<a></a>").expect("should parse");
        let el = first_el(&tree);
        let regexes = [Regex::new("x").expect("should compile")];
        let filters = FilterSet::new();
        let cmp = |op: CmpOp, regex: Option<usize>| FilterExpr::Cmp {
            attr: "k".to_string(),
            op,
            lit: "x".to_string(),
            regex,
            span: crate::lexer::Span::point(0),
        };
        assert!(!eval(&cmp(CmpOp::Eq, None), &el, &regexes, &filters));
        assert!(eval(&cmp(CmpOp::Ne, None), &el, &regexes, &filters));
        assert!(!eval(&cmp(CmpOp::Regex, Some(0)), &el, &regexes, &filters));
        assert!(eval(&cmp(CmpOp::NotRegex, Some(0)), &el, &regexes, &filters));
    }

    #[test]
    fn test_filter_set_debug_lists_names() {
        let mut filters: FilterSet<()> = FilterSet::new();
        filters.insert("visible", |_: &()| true);
        assert_eq!(format!("{filters:?}"), "{\"visible\"}");
        assert!(filters.contains("visible"));
        assert!(!filters.contains("hidden"));
    }
}

// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

/*!
TQL is a small language for querying HTML-like trees.

A query string compiles once into a reusable [`Pattern`]; applying the
pattern to a tree yields zero or more result tuples whose structure is
derived from the query itself. The language combines CSS-selector-style
predicates (tag, `.class`, `#id`, `!` negation) with regex-style
combinators (`|`, `?`, `*`, `+`, grouping) over two traversal axes: depth
(`>` direct child, `>>` descendant) and breadth (`:` adjacent sibling,
`::` following sibling, inside `{ … }`).

```
use tql::simple::SimpleTree;

let pattern = tql::compile("div#find-me[txt, .data-attr]")?;
let tree = SimpleTree::parse("<div id=\"find-me\" data-attr=\"world\">hello</div>")?;

let found = pattern.match_all(tree.root())?;
assert_eq!(found[0].values()[0].as_str(), Some("hello"));
assert_eq!(found[0].values()[1].as_str(), Some("world"));
# Ok::<(), Box<dyn std::error::Error>>(())
```

The pipeline: [`lexer`] turns source into tokens, [`parser`] builds the
query AST with axes resolved, [`shape`] derives the static result shape
(so alternation-arm mismatches fail at compile time), and [`matcher`]
backtracks over any tree that implements the [`TreeNode`] adapter. The
`simple` feature (on by default) ships an in-memory tree for tests and
small programs; real documents plug in by implementing [`TreeNode`].

A compiled [`Pattern`] is deeply immutable and can be shared across
threads; each [`Pattern::matches`] call keeps its own cursor and yields
results lazily in document order.
*/

pub mod ast;
pub mod filter;
pub mod lexer;
pub mod matcher;
pub mod node;
pub mod parser;
pub mod pattern;
pub mod shape;

#[cfg(feature = "simple")]
pub mod simple;

// Re-exports
pub use filter::FilterSet;
pub use lexer::{LexError, Span};
pub use matcher::{Match, MatchError, Matches, Value};
pub use node::TreeNode;
pub use parser::ParseError;
pub use pattern::{CompileError, Pattern, compile};
pub use shape::{Shape, ShapeError};

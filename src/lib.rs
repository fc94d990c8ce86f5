//! An in-memory B+ tree map, keyed by a user-chosen order and an optional
//! key transform separating the caller-facing key from the stored,
//! compared key.
//!
//! ```
//! use bptreemap::BTree;
//!
//! let mut tree = BTree::builder().order(4).build().unwrap();
//! tree.insert(3, "c").unwrap();
//! tree.insert(1, "a").unwrap();
//! tree.insert(2, "b").unwrap();
//!
//! let collected: Vec<_> = tree.iter_items().collect();
//! assert_eq!(collected, vec![(&1, &"a"), (&2, &"b"), (&3, &"c")]);
//! ```

mod error;
mod node;
mod range;
mod tree;

pub use error::Error;
pub use range::{Items, Keys, Range, Values};
pub use tree::{BTree, BTreeBuilder};

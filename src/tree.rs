/*
 * Tree-level operations: search, insert, delete, and range scans over the
 * node structures defined in `node.rs`.
 *
 * Mutating operations are written as associative functions taking
 * `&mut Box<Node<K, V>>` rather than `&mut self` methods, so a caller can
 * hold `&mut self.root` for the recursive call while still updating
 * `self.len` afterwards without a double mutable borrow of `self`.
 */

use std::fmt;
use std::ptr::NonNull;

use crate::error::Error;
use crate::node::{
    self, min_inner_separators, min_leaf_entries, merge_pair, split_inner, split_leaf,
    InnerNode, LeafNode, Node,
};
use crate::range::{Items, Keys, Range, Values};

/// Result of a recursive insert: either the subtree absorbed the new entry,
/// or it outgrew `order` and split, handing a `(separator, right sibling)`
/// pair back up to the caller.
enum InsertResult<K, V> {
    Absorbed,
    Split(K, Box<Node<K, V>>),
}

/// Result of a recursive delete: whether the child the caller descended
/// into is now underflowing and needs repair.
enum DeleteOutcome {
    Ok,
    Underflow,
}

/// An in-memory B+ tree mapping keys to values, ordered by `K`.
///
/// `RK` is the type callers pass to lookup and mutation methods; `K` is the
/// type actually stored and compared in the tree. They are usually the same
/// type, but [`BTreeBuilder::key_transform`] lets a caller store a derived
/// key (for example, a case-folded string) while still looking entries up
/// by the original value.
pub struct BTree<RK, K, V> {
    root: Box<Node<K, V>>,
    head: NonNull<LeafNode<K, V>>,
    len: usize,
    order: usize,
    key_transform: Box<dyn Fn(&RK) -> K>,
}

impl<K: Ord + Clone, V> BTree<K, K, V> {
    /// Starts building a tree with the default order (`4`) and an identity
    /// key transform. For a tree whose stored key differs from the key
    /// callers look entries up by, use [`BTreeBuilder::with_key_transform`].
    pub fn builder() -> BTreeBuilder<K, K, V> {
        BTreeBuilder::new()
    }
}

impl<RK, K: Ord + Clone, V> BTree<RK, K, V> {
    fn new_empty(order: usize, key_transform: Box<dyn Fn(&RK) -> K>) -> Self {
        let mut root = Box::new(Node::Leaf(LeafNode::new()));
        let head = match root.as_mut() {
            Node::Leaf(leaf) => NonNull::from(leaf),
            Node::Inner(_) => unreachable!(),
        };
        BTree {
            root,
            head,
            len: 0,
            order,
            key_transform,
        }
    }

    /// Maximum number of children an inner node may hold, and the maximum
    /// number of entries a leaf may hold, before it must split.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of key/value pairs currently stored.
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree, counted in edges from root to leaf. A tree with
    /// a single leaf node (the root itself) has depth `0`.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.root.as_ref();
        while let Node::Inner(inner) = node {
            depth += 1;
            node = inner.children[0].as_ref();
        }
        depth
    }

    /// Removes every entry, resetting the tree to a single empty leaf.
    pub fn clear(&mut self) {
        let mut root = Box::new(Node::Leaf(LeafNode::new()));
        self.head = match root.as_mut() {
            Node::Leaf(leaf) => NonNull::from(leaf),
            Node::Inner(_) => unreachable!(),
        };
        self.root = root;
        self.len = 0;
    }

    fn transform(&self, raw: &RK) -> K {
        (self.key_transform)(raw)
    }

    pub fn contains(&self, key: &RK) -> bool {
        self.search(key).is_some()
    }

    pub fn search(&self, key: &RK) -> Option<&V> {
        let key = self.transform(key);
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Inner(inner) => {
                    let idx = inner.child_index(&key);
                    node = inner.children[idx].as_ref();
                }
                Node::Leaf(leaf) => {
                    return leaf.search_index(&key).ok().map(|i| &leaf.entries[i].1);
                }
            }
        }
    }

    /// Inserts `key` mapped to `value`. Returns [`Error::DuplicateKey`]
    /// without modifying the tree if `key` is already present.
    pub fn insert(&mut self, key: RK, value: V) -> Result<(), Error> {
        let key = self.transform(&key);
        if self.contains_transformed(&key) {
            return Err(Error::DuplicateKey);
        }
        self.insert_transformed(key, value);
        Ok(())
    }

    /// Inserts `key` mapped to `value`, overwriting any existing value for
    /// that key and returning it.
    pub fn upsert(&mut self, key: RK, value: V) -> Option<V> {
        let key = self.transform(&key);
        if let Some(existing) = self.find_mut(&key) {
            return Some(std::mem::replace(existing, value));
        }
        self.insert_transformed(key, value);
        None
    }

    fn contains_transformed(&self, key: &K) -> bool {
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Inner(inner) => {
                    let idx = inner.child_index(key);
                    node = inner.children[idx].as_ref();
                }
                Node::Leaf(leaf) => return leaf.search_index(key).is_ok(),
            }
        }
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut node = self.root.as_mut();
        loop {
            match node {
                Node::Inner(inner) => {
                    let idx = inner.child_index(key);
                    node = inner.children[idx].as_mut();
                }
                Node::Leaf(leaf) => {
                    return leaf.search_index(key).ok().map(move |i| &mut leaf.entries[i].1);
                }
            }
        }
    }

    fn insert_transformed(&mut self, key: K, value: V) {
        match Self::insert_rec(&mut self.root, self.order, key, value) {
            InsertResult::Absorbed => {}
            InsertResult::Split(separator, right) => {
                let old_root = std::mem::replace(
                    &mut self.root,
                    Box::new(Node::Leaf(LeafNode::new())),
                );
                self.root = Box::new(Node::Inner(InnerNode {
                    separators: vec![separator],
                    children: vec![old_root, right],
                }));
            }
        }
        self.len += 1;
    }

    fn insert_rec(
        node_box: &mut Box<Node<K, V>>,
        order: usize,
        key: K,
        value: V,
    ) -> InsertResult<K, V> {
        match node_box.as_mut() {
            Node::Leaf(leaf) => {
                let idx = leaf.search_index(&key).unwrap_or_else(|i| i);
                leaf.entries.insert(idx, (key, value));
                if leaf.entries.len() > order {
                    let (separator, right) = split_leaf(node_box);
                    InsertResult::Split(separator, right)
                } else {
                    InsertResult::Absorbed
                }
            }
            Node::Inner(inner) => {
                let idx = inner.child_index(&key);
                let result = Self::insert_rec(&mut inner.children[idx], order, key, value);
                match result {
                    InsertResult::Absorbed => InsertResult::Absorbed,
                    InsertResult::Split(separator, right) => {
                        inner.separators.insert(idx, separator);
                        inner.children.insert(idx + 1, right);
                        if inner.separators.len() > order - 1 {
                            let (lifted, right_sibling) = split_inner(inner);
                            InsertResult::Split(lifted, right_sibling)
                        } else {
                            InsertResult::Absorbed
                        }
                    }
                }
            }
        }
    }

    /// Removes `key`, returning its value. Returns [`Error::NotFound`]
    /// without modifying the tree if `key` is absent.
    pub fn delete(&mut self, key: &RK) -> Result<V, Error> {
        let key = self.transform(key);
        let (value, _) = Self::delete_rec(&mut self.root, self.order, &key).ok_or(Error::NotFound)?;

        if let Node::Inner(inner) = self.root.as_mut() {
            if inner.separators.is_empty() {
                let only_child = inner.children.pop().unwrap();
                self.root = only_child;
            }
        }
        self.len -= 1;
        Ok(value)
    }

    /// Returns the removed value and whether the node we removed it from
    /// (now possibly repaired by a borrow or merge at this level) still
    /// satisfies the order bound, i.e. `DeleteOutcome::Ok`.
    fn delete_rec(
        node_box: &mut Box<Node<K, V>>,
        order: usize,
        key: &K,
    ) -> Option<(V, DeleteOutcome)> {
        match node_box.as_mut() {
            Node::Leaf(leaf) => {
                let idx = leaf.search_index(key).ok()?;
                let (_, value) = leaf.entries.remove(idx);
                let outcome = if leaf.entries.len() < min_leaf_entries(order) {
                    DeleteOutcome::Underflow
                } else {
                    DeleteOutcome::Ok
                };
                Some((value, outcome))
            }
            Node::Inner(inner) => {
                let idx = inner.child_index(key);
                let (value, child_outcome) = Self::delete_rec(&mut inner.children[idx], order, key)?;
                let outcome = match child_outcome {
                    DeleteOutcome::Ok => DeleteOutcome::Ok,
                    DeleteOutcome::Underflow => Self::repair_child(inner, order, idx),
                };
                Some((value, outcome))
            }
        }
    }

    /// Restores the order bound for `children[idx]`, which has just
    /// underflowed. Prefers borrowing from the right sibling when one
    /// exists, falling back to the left sibling, and only merges when
    /// neither sibling has a spare entry to lend.
    fn repair_child(inner: &mut InnerNode<K, V>, order: usize, idx: usize) -> DeleteOutcome {
        let has_right = idx + 1 < inner.children.len();
        let has_left = idx > 0;

        if has_right && Self::can_lend(&inner.children[idx + 1], order) {
            node::borrow_from_right(inner, idx);
            return DeleteOutcome::Ok;
        }
        if has_left && Self::can_lend(&inner.children[idx - 1], order) {
            node::borrow_from_left(inner, idx);
            return DeleteOutcome::Ok;
        }
        if has_right {
            merge_pair(inner, idx);
        } else {
            merge_pair(inner, idx - 1);
        }

        if inner.separators.len() < min_inner_separators(order) {
            DeleteOutcome::Underflow
        } else {
            DeleteOutcome::Ok
        }
    }

    fn can_lend(sibling: &Box<Node<K, V>>, order: usize) -> bool {
        match sibling.as_ref() {
            Node::Leaf(leaf) => leaf.entries.len() > min_leaf_entries(order),
            Node::Inner(inner) => inner.separators.len() > min_inner_separators(order),
        }
    }

    fn leftmost_leaf(&self) -> &LeafNode<K, V> {
        // Safety: `head` always points at a `LeafNode` owned by this tree's
        // node graph, kept up to date by insert/delete/clear; the tree
        // outlives every borrow handed out through `&self`.
        unsafe { self.head.as_ref() }
    }

    /// An iterator over `(&K, &V)` pairs in ascending key order.
    pub fn iter_items(&self) -> Items<'_, K, V> {
        Items::new(self.leftmost_leaf())
    }

    pub fn iter_keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.leftmost_leaf())
    }

    pub fn iter_values(&self) -> Values<'_, K, V> {
        Values::new(self.leftmost_leaf())
    }

    /// An iterator over `(&K, &V)` pairs with `lo <= k < hi`. Either bound
    /// may be omitted to mean unbounded on that side.
    pub fn range(&self, lo: Option<&RK>, hi: Option<&RK>) -> Range<'_, K, V> {
        let lo = lo.map(|k| self.transform(k));
        let hi = hi.map(|k| self.transform(k));
        let leaf = match &lo {
            Some(lo) => self.leaf_containing_or_after(lo),
            None => Some(self.leftmost_leaf()),
        };
        Range::new(leaf, lo, hi)
    }

    fn leaf_containing_or_after(&self, key: &K) -> Option<&LeafNode<K, V>> {
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Inner(inner) => {
                    let idx = inner.child_index(key);
                    node = inner.children[idx].as_ref();
                }
                Node::Leaf(leaf) => return Some(leaf),
            }
        }
    }

    /// Walks every invariant from the data model by hand: order bounds,
    /// key ordering within and across nodes, uniform leaf depth, leaf
    /// chain completeness, and size consistency. Intended for tests and
    /// debugging, not the hot path.
    pub fn debug_assert_invariants(&self) {
        let leaf_depth = Self::check_node(self.root.as_ref(), self.order, true, None, None);
        let _ = leaf_depth;

        let mut count = 0usize;
        let mut seen_keys: Vec<&K> = Vec::new();
        let mut cursor = Some(self.leftmost_leaf());
        while let Some(leaf) = cursor {
            for (k, _) in &leaf.entries {
                if let Some(last) = seen_keys.last() {
                    assert!(*last < k, "leaf chain keys out of order");
                }
                seen_keys.push(k);
                count += 1;
            }
            cursor = leaf.next.map(|ptr| unsafe { ptr.as_ref() });
        }
        assert_eq!(count, self.len, "leaf chain length disagrees with tree length");
    }

    /// Returns the leaf depth of the subtree rooted at `node`, after
    /// asserting its own invariants; panics on any violation.
    fn check_node<'a>(
        node: &'a Node<K, V>,
        order: usize,
        is_root: bool,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> usize {
        match node {
            Node::Leaf(leaf) => {
                if !is_root {
                    assert!(
                        leaf.entries.len() >= min_leaf_entries(order),
                        "leaf underflow"
                    );
                }
                assert!(leaf.entries.len() <= order, "leaf overflow");
                for pair in leaf.entries.windows(2) {
                    assert!(pair[0].0 < pair[1].0, "leaf keys out of order");
                }
                if let (Some(first), Some(lower)) = (leaf.entries.first(), lower) {
                    assert!(&first.0 >= lower, "leaf key below lower routing bound");
                }
                if let (Some(last), Some(upper)) = (leaf.entries.last(), upper) {
                    assert!(&last.0 < upper, "leaf key at or above upper routing bound");
                }
                0
            }
            Node::Inner(inner) => {
                assert!(!inner.children.is_empty(), "inner node with no children");
                assert_eq!(
                    inner.children.len(),
                    inner.separators.len() + 1,
                    "inner node child/separator count mismatch"
                );
                if !is_root {
                    assert!(
                        inner.separators.len() >= min_inner_separators(order),
                        "inner node underflow"
                    );
                } else {
                    assert!(!inner.separators.is_empty() || inner.children[0].is_leaf());
                }
                assert!(inner.separators.len() <= order - 1, "inner node overflow");
                for pair in inner.separators.windows(2) {
                    assert!(pair[0] < pair[1], "inner separators out of order");
                }

                let mut depths = Vec::with_capacity(inner.children.len());
                for (i, child) in inner.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&inner.separators[i - 1]) };
                    let child_upper = if i == inner.separators.len() {
                        upper
                    } else {
                        Some(&inner.separators[i])
                    };
                    depths.push(Self::check_node(
                        child.as_ref(),
                        order,
                        false,
                        child_lower,
                        child_upper,
                    ));
                }
                assert!(
                    depths.windows(2).all(|w| w[0] == w[1]),
                    "leaf depth not uniform across subtree"
                );
                depths[0] + 1
            }
        }
    }
}

impl<RK, K: Ord + Clone + PartialEq, V: PartialEq> PartialEq for BTree<RK, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.order == other.order
            && self.iter_items().eq(other.iter_items())
    }
}

impl<RK, K: fmt::Debug, V: fmt::Debug> fmt::Debug for BTree<RK, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("len", &self.len)
            .field("order", &self.order)
            .field("root", &self.root)
            .finish()
    }
}

/// Validated construction of a [`BTree`]. The default order is `4`.
///
/// `key_transform` is always set by one of the two constructors below, so
/// `build` never needs to fabricate one generically: [`new`](Self::new)
/// sets the identity transform (requiring `RK == K`), and
/// [`with_key_transform`](Self::with_key_transform) sets a caller-supplied
/// one for any `RK`.
pub struct BTreeBuilder<RK, K, V> {
    order: usize,
    key_transform: Box<dyn Fn(&RK) -> K>,
    _marker: std::marker::PhantomData<V>,
}

impl<K: Ord + Clone, V> BTreeBuilder<K, K, V> {
    pub fn new() -> Self {
        BTreeBuilder {
            order: 4,
            key_transform: Box::new(|k: &K| k.clone()),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K: Ord + Clone, V> Default for BTreeBuilder<K, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<RK, K: Ord + Clone, V> BTreeBuilder<RK, K, V> {
    /// Starts a builder whose stored key `K` is derived from the
    /// caller-facing key `RK` by `transform`.
    pub fn with_key_transform<F>(transform: F) -> Self
    where
        F: Fn(&RK) -> K + 'static,
    {
        BTreeBuilder {
            order: 4,
            key_transform: Box::new(transform),
            _marker: std::marker::PhantomData,
        }
    }

    /// Sets the maximum fan-out of inner nodes and maximum entries per
    /// leaf. Must be at least `3`; lower orders cannot satisfy the
    /// `ceil(order / 2)` minimum-occupancy bound without degenerating.
    pub fn order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn build(self) -> Result<BTree<RK, K, V>, Error> {
        if self.order < 3 {
            return Err(Error::InvalidConfiguration(format!(
                "order must be at least 3, got {}",
                self.order
            )));
        }
        Ok(BTree::new_empty(self.order, self.key_transform))
    }
}

use bptreemap::{BTree, Error};
use rand::seq::SliceRandom;
use rand::thread_rng;

fn build_tree(order: usize) -> BTree<i32, i32, i32> {
    BTree::builder().order(order).build().unwrap()
}

#[test]
fn test_delete_missing_key_returns_not_found() {
    let mut tree = build_tree(4);
    tree.insert(1, 1).unwrap();

    assert_eq!(tree.delete(&99), Err(Error::NotFound));
    assert_eq!(tree.size(), 1);
}

#[test]
fn test_delete_requires_borrow_and_merge() {
    let mut tree = build_tree(4);
    for key in 1..20 {
        tree.insert(key, key * 2).unwrap();
    }
    tree.debug_assert_invariants();

    for key in 1..10 {
        let removed = tree.delete(&key).unwrap();
        assert_eq!(removed, key * 2);
        tree.debug_assert_invariants();
    }

    for key in 1..10 {
        assert_eq!(tree.search(&key), None);
    }
    for key in 10..20 {
        assert_eq!(tree.search(&key), Some(&(key * 2)));
    }
    assert_eq!(tree.size(), 10);
}

#[test]
fn test_delete_is_inverse_of_insert() {
    let mut tree = build_tree(5);
    let keys: Vec<i32> = (0..80).collect();
    for &key in &keys {
        tree.insert(key, key).unwrap();
    }

    for &key in &keys {
        tree.delete(&key).unwrap();
        tree.debug_assert_invariants();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.size(), 0);
    assert_eq!(tree.depth(), 0);
}

#[test]
fn test_delete_half_then_reinsert_restores_tree() {
    let mut tree = build_tree(6);
    for key in 0..100 {
        tree.insert(key, key).unwrap();
    }

    for key in (0..100).step_by(2) {
        tree.delete(&key).unwrap();
    }
    tree.debug_assert_invariants();

    for key in (0..100).step_by(2) {
        tree.insert(key, key).unwrap();
        tree.debug_assert_invariants();
    }

    assert_eq!(tree.size(), 100);
    for key in 0..100 {
        assert_eq!(tree.search(&key), Some(&key));
    }
}

#[test]
fn test_large_random_insert_delete() {
    let mut tree = build_tree(8);
    let mut keys: Vec<i32> = (0..10_000).collect();
    let mut rng = thread_rng();
    keys.shuffle(&mut rng);

    for &key in &keys {
        tree.insert(key, key).unwrap();
    }
    tree.debug_assert_invariants();

    for &key in &keys {
        assert_eq!(tree.search(&key), Some(&key));
    }

    keys.shuffle(&mut rng);
    for &key in &keys {
        tree.delete(&key).unwrap();
    }
    tree.debug_assert_invariants();

    for &key in &keys {
        assert_eq!(tree.search(&key), None);
    }
    assert!(tree.is_empty());
}

#[test]
fn test_clear_resets_tree() {
    let mut tree = build_tree(4);
    for key in 0..30 {
        tree.insert(key, key).unwrap();
    }

    tree.clear();
    tree.debug_assert_invariants();

    assert!(tree.is_empty());
    assert_eq!(tree.size(), 0);
    assert_eq!(tree.search(&0), None);

    tree.insert(42, 42).unwrap();
    assert_eq!(tree.search(&42), Some(&42));
}

//! Pairwise merge primitives for resource specifications.
//!
//! Every specification field is combined with `combine(old, new)` semantics:
//! newer scalars win when present, collections concatenate in application
//! order, dictionaries shallow-merge with newer entries overwriting, and
//! snapshot fields (wait strategies, callbacks, registry auth) take the first
//! present value in (new, old) order as a whole.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Single-valued optional field: the newer value wins when present.
pub fn scalar<T>(old: Option<T>, new: Option<T>) -> Option<T> {
    new.or(old)
}

/// Ordered collection field: old elements first, then new ones.
pub fn collection<T>(mut old: Vec<T>, new: Vec<T>) -> Vec<T> {
    old.extend(new);
    old
}

/// Dictionary field: shallow merge, newer entries overwrite same-key old
/// entries.
pub fn map<K: Eq + Hash, V>(mut old: HashMap<K, V>, new: HashMap<K, V>) -> HashMap<K, V> {
    old.extend(new);
    old
}

/// Set field: union. Equivalent to a dictionary whose values are markers.
pub fn set<T: Eq + Hash>(mut old: HashSet<T>, new: HashSet<T>) -> HashSet<T> {
    old.extend(new);
    old
}

/// Snapshot field: a single logical value replaced as a whole, never merged
/// elementwise. First present in (new, old) order wins.
pub fn snapshot<T>(old: Option<T>, new: Option<T>) -> Option<T> {
    new.or(old)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_prefers_new() {
        assert_eq!(scalar(Some(1), Some(2)), Some(2));
        assert_eq!(scalar(Some(1), None), Some(1));
        assert_eq!(scalar::<i32>(None, None), None);
    }

    #[test]
    fn collection_preserves_order() {
        assert_eq!(collection(vec![1, 2], vec![3]), vec![1, 2, 3]);
        assert_eq!(collection(Vec::new(), vec![3]), vec![3]);
    }

    #[test]
    fn map_overwrites_same_key() {
        let old: HashMap<_, _> = [("x", "1"), ("y", "3")].into_iter().collect();
        let new: HashMap<_, _> = [("x", "2")].into_iter().collect();
        let merged = map(old, new);
        assert_eq!(merged["x"], "2");
        assert_eq!(merged["y"], "3");
    }

    #[test]
    fn merge_is_associative_for_maps() {
        let a: HashMap<_, _> = [("x", "1")].into_iter().collect();
        let b: HashMap<_, _> = [("x", "2")].into_iter().collect();
        let c: HashMap<_, _> = [("y", "3")].into_iter().collect();

        let left = map(map(a.clone(), b.clone()), c.clone());
        let right = map(a, map(b, c));
        assert_eq!(left, right);
    }
}

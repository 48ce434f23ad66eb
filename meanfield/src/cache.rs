//! Keyed store for intermediate operators and scalars.
//!
//! Every quantity that is derived from the density matrices (Coulomb and
//! exchange operators, grid densities and potentials, energy terms) lives in
//! one [`OperatorCache`] owned by the effective Hamiltonian. Entries carry a
//! [`CacheTag`] that decides which `clear` calls remove them. The cache does
//! no dependency tracking of its own: a consumer must namespace its keys by
//! term label and spin channel and recompute whenever its key is absent, and
//! the solver must call `clear` after every density-matrix update and before
//! the next energy or Fock build.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

/// Lifecycle class of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// Depends only on basis and geometry; survives `clear(None)`.
    Permanent,
    /// Depends on the density matrices; removed by `clear(None)`.
    Derived,
    /// Depends on the registered delta density matrices (response work);
    /// removed by `clear(None)` and by `clear(Some(CacheTag::Delta))`.
    Delta,
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    Scalar(f64),
    Vector(DVector<f64>),
    Matrix(DMatrix<f64>),
}

/// A keyed store of intermediate results with tag-based invalidation.
#[derive(Debug, Default)]
pub struct OperatorCache {
    entries: HashMap<String, (CacheTag, CacheValue)>,
}

impl OperatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn store_scalar(&mut self, key: &str, tag: CacheTag, value: f64) {
        self.entries
            .insert(key.to_owned(), (tag, CacheValue::Scalar(value)));
    }

    pub fn store_vector(&mut self, key: &str, tag: CacheTag, value: DVector<f64>) {
        self.entries
            .insert(key.to_owned(), (tag, CacheValue::Vector(value)));
    }

    pub fn store_matrix(&mut self, key: &str, tag: CacheTag, value: DMatrix<f64>) {
        self.entries
            .insert(key.to_owned(), (tag, CacheValue::Matrix(value)));
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some((_, CacheValue::Scalar(value))) => Some(*value),
            _ => None,
        }
    }

    pub fn vector(&self, key: &str) -> Option<&DVector<f64>> {
        match self.entries.get(key) {
            Some((_, CacheValue::Vector(value))) => Some(value),
            _ => None,
        }
    }

    pub fn matrix(&self, key: &str) -> Option<&DMatrix<f64>> {
        match self.entries.get(key) {
            Some((_, CacheValue::Matrix(value))) => Some(value),
            _ => None,
        }
    }

    /// Load the matrix under `key`, allocating it with `alloc` when absent.
    ///
    /// Returns the entry and whether it was newly allocated; a consumer that
    /// sees `true` must fill the entry before anyone reads it. An entry of
    /// the wrong kind counts as absent and is replaced.
    pub fn load_matrix_with(
        &mut self,
        key: &str,
        tag: CacheTag,
        alloc: impl FnOnce() -> DMatrix<f64>,
    ) -> (&mut DMatrix<f64>, bool) {
        let fresh = !matches!(self.entries.get(key), Some((_, CacheValue::Matrix(_))));
        if fresh {
            self.entries
                .insert(key.to_owned(), (tag, CacheValue::Matrix(alloc())));
        }
        match self.entries.get_mut(key) {
            Some((_, CacheValue::Matrix(value))) => (value, fresh),
            _ => unreachable!("matrix entry was just inserted"),
        }
    }

    /// Vector counterpart of [`OperatorCache::load_matrix_with`].
    pub fn load_vector_with(
        &mut self,
        key: &str,
        tag: CacheTag,
        alloc: impl FnOnce() -> DVector<f64>,
    ) -> (&mut DVector<f64>, bool) {
        let fresh = !matches!(self.entries.get(key), Some((_, CacheValue::Vector(_))));
        if fresh {
            self.entries
                .insert(key.to_owned(), (tag, CacheValue::Vector(alloc())));
        }
        match self.entries.get_mut(key) {
            Some((_, CacheValue::Vector(value))) => (value, fresh),
            _ => unreachable!("vector entry was just inserted"),
        }
    }

    /// Remove entries by tag: all entries carrying `tag` when given, all
    /// non-[`CacheTag::Permanent`] entries otherwise.
    pub fn clear(&mut self, tag: Option<CacheTag>) {
        match tag {
            Some(tag) => self.entries.retain(|_, (t, _)| *t != tag),
            None => self.entries.retain(|_, (t, _)| *t == CacheTag::Permanent),
        }
    }

    /// Remove a single entry unconditionally, regardless of its tag.
    pub fn clear_item(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load_by_kind() {
        let mut cache = OperatorCache::new();
        cache.store_scalar("energy", CacheTag::Derived, -1.5);
        cache.store_matrix("op", CacheTag::Derived, DMatrix::identity(2, 2));

        assert_eq!(cache.scalar("energy"), Some(-1.5));
        assert!(cache.matrix("op").is_some());
        // kind mismatch reads as absent
        assert!(cache.matrix("energy").is_none());
        assert_eq!(cache.scalar("op"), None);
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn load_with_allocates_once() {
        let mut cache = OperatorCache::new();
        let (m, fresh) = cache.load_matrix_with("j", CacheTag::Derived, || DMatrix::zeros(3, 3));
        assert!(fresh);
        m[(0, 0)] = 4.0;

        let (m, fresh) = cache.load_matrix_with("j", CacheTag::Derived, || DMatrix::zeros(3, 3));
        assert!(!fresh);
        assert_eq!(m[(0, 0)], 4.0);
    }

    #[test]
    fn clear_respects_tags() {
        let mut cache = OperatorCache::new();
        cache.store_scalar("perm", CacheTag::Permanent, 1.0);
        cache.store_scalar("derived", CacheTag::Derived, 2.0);
        cache.store_scalar("delta", CacheTag::Delta, 3.0);

        cache.clear(Some(CacheTag::Delta));
        assert!(cache.contains("perm"));
        assert!(cache.contains("derived"));
        assert!(!cache.contains("delta"));

        cache.store_scalar("delta", CacheTag::Delta, 3.0);
        cache.clear(None);
        assert!(cache.contains("perm"));
        assert!(!cache.contains("derived"));
        assert!(!cache.contains("delta"));
    }

    #[test]
    fn clear_item_ignores_tags() {
        let mut cache = OperatorCache::new();
        cache.store_scalar("perm", CacheTag::Permanent, 1.0);
        cache.clear_item("perm");
        assert!(cache.is_empty());
    }
}

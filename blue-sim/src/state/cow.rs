//! Copy-on-write keyed collections.
//!
//! Cloning a [`CowMap`] only bumps a reference count. The first write after a clone copies the
//! index, and each modified entry is copied individually, so snapshots retained by a stepwise run
//! share every entry that later actions did not touch.

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Entities that carry their own key.
pub trait Keyed {
    type Key: Eq + Hash + Clone + Debug;

    fn key(&self) -> Self::Key;
}

pub struct CowMap<V: Keyed>(Arc<HashMap<V::Key, Arc<V>>>);

impl<V: Keyed> CowMap<V> {
    pub fn new() -> Self {
        Self(Arc::new(HashMap::new()))
    }

    pub fn get(&self, key: &V::Key) -> Option<&V> {
        self.0.get(key).map(Arc::as_ref)
    }

    pub fn contains_key(&self, key: &V::Key) -> bool {
        self.0.contains_key(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inserts `value` under its own key, replacing any previous entry.
    pub fn insert(&mut self, value: V) {
        Arc::make_mut(&mut self.0).insert(value.key(), Arc::new(value));
    }

    /// Whether both maps point at the same underlying index.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<V: Keyed + Clone> CowMap<V> {
    pub fn get_mut(&mut self, key: &V::Key) -> Option<&mut V> {
        Arc::make_mut(&mut self.0)
            .get_mut(key)
            .map(Arc::make_mut)
    }
}

impl<V: Keyed> Default for CowMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Keyed> Clone for CowMap<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V: Keyed + Debug> Debug for CowMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter())
            .finish()
    }
}

impl<V: Keyed + PartialEq> PartialEq for CowMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage_with(other) || self.0 == other.0
    }
}

impl<V: Keyed> FromIterator<V> for CowMap<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|value| (value.key(), Arc::new(value)))
                .collect(),
        ))
    }
}

impl<V: Keyed + Serialize> Serialize for CowMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values())
    }
}

impl<'de, V: Keyed + Deserialize<'de>> Deserialize<'de> for CowMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<V>::deserialize(deserializer).map(|values| values.into_iter().collect())
    }
}

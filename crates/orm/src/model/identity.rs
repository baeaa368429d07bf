//! Entity identity
//!
//! Two instances are the same entity when they are the same instance or
//! both carry the same persistent record id. Unsaved instances are only
//! ever equal to themselves.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};

use crate::identity::RecordId;
use crate::model::core_trait::Model;

/// Identity helpers available on every model
pub trait ModelIdentity: Model {
    /// Persistent record id, if stored
    fn key(&self) -> Option<RecordId> {
        self.record_id().filter(RecordId::is_persistent)
    }

    /// Record id, or `#-1:-1` before the first save
    fn identity(&self) -> RecordId {
        self.key().unwrap_or(RecordId::NEW)
    }

    fn identity_eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        matches!((self.key(), other.key()), (Some(a), Some(b)) if a == b)
    }

    fn identity_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hash_key(self.key(), &mut hasher);
        hasher.finish()
    }

    /// `ClassName[#cluster:position]`
    fn describe(&self) -> String {
        format!("{}[{}]", Self::class_name(), self.identity())
    }
}

impl<T: Model> ModelIdentity for T {}

fn hash_key<H: Hasher>(key: Option<RecordId>, state: &mut H) {
    match key {
        Some(rid) => rid.hash(state),
        None => 0i32.hash(state),
    }
}

/// Wrapper that compares, hashes and prints a model by identity
#[derive(Debug, Clone)]
pub struct Keyed<M>(pub M);

impl<M> Keyed<M> {
    pub fn into_inner(self) -> M {
        self.0
    }
}

impl<M: Model> PartialEq for Keyed<M> {
    fn eq(&self, other: &Self) -> bool {
        self.0.identity_eq(&other.0)
    }
}

impl<M: Model> Eq for Keyed<M> {}

impl<M: Model> Hash for Keyed<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(self.0.key(), state);
    }
}

impl<M: Model> fmt::Display for Keyed<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.describe())
    }
}

impl<M> Deref for Keyed<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.0
    }
}

impl<M> DerefMut for Keyed<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.0
    }
}

impl<M> From<M> for Keyed<M> {
    fn from(model: M) -> Self {
        Keyed(model)
    }
}

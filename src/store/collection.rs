// src/store/collection.rs
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// One typed document collection with conditional ("test-and-set") updates.
///
/// This is the in-process adapter for the persistent-store interface the
/// engine is written against: `update_if` applies a patch iff the predicate
/// holds on the current document, atomically with respect to every other
/// mutation of that document. All correctness-critical transitions (call
/// status, wallet debits, referral activation) go through it; nothing in the
/// engine does a read followed by an unconditional write.
pub struct Collection<T> {
    name: &'static str,
    docs: DashMap<String, T>,
}

impl<T: Clone> Collection<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            docs: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert a new document. Returns false (and leaves the existing document
    /// untouched) if the id is already taken.
    pub fn insert(&self, id: &str, doc: T) -> bool {
        match self.docs.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(doc);
                true
            }
        }
    }

    /// Unconditional upsert.
    pub fn put(&self, id: &str, doc: T) {
        self.docs.insert(id.to_string(), doc);
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.docs.get(id).map(|doc| doc.clone())
    }

    /// Unconditional patch of an existing document. Returns false if missing.
    pub fn update(&self, id: &str, patch: impl FnOnce(&mut T)) -> bool {
        match self.docs.get_mut(id) {
            Some(mut doc) => {
                patch(&mut doc);
                true
            }
            None => false,
        }
    }

    /// The CAS primitive: apply the patch iff the predicate holds on the
    /// current document. Returns whether the patch was applied.
    pub fn update_if(
        &self,
        id: &str,
        predicate: impl FnOnce(&T) -> bool,
        patch: impl FnOnce(&mut T),
    ) -> bool {
        match self.docs.get_mut(id) {
            Some(mut doc) => {
                if predicate(&doc) {
                    patch(&mut doc);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Atomic read-modify for counter-style documents, inserting a default
    /// when absent. The closure runs under the document lock.
    pub fn mutate<R>(&self, id: &str, default: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut entry = self.docs.entry(id.to_string()).or_insert_with(default);
        f(&mut entry)
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.docs
            .iter()
            .filter(|doc| predicate(doc.value()))
            .map(|doc| doc.value().clone())
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.docs.iter().filter(|doc| predicate(doc.value())).count()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

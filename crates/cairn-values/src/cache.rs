//! Per-handle record of what a value store has seen.
//!
//! For every hash observed through a [`ValueStore`](crate::ValueStore) the
//! cache remembers whether the chunk is present, the type of the value it
//! holds, and optionally a *hint*: the hash of an already-validated chunk
//! whose presence implies this one's. Entries are only dropped when the
//! store forgets writes that failed to land; a hinted entry is never
//! replaced by [`HintCache::check_and_set`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use cairn_types::{Hash, Type};

/// What the cache knows about one hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEntry {
    /// Looked up and known not to exist.
    Absent,
    /// Exists and holds a value of type `ty`. `hint` is empty when the
    /// presence was learned directly.
    Present { ty: Type, hint: Hash },
}

impl CacheEntry {
    pub fn present(ty: Type) -> Self {
        Self::Present {
            ty,
            hint: Hash::empty(),
        }
    }

    pub fn hinted(ty: Type, hint: Hash) -> Self {
        Self::Present { ty, hint }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// The hint, or the empty hash if there is none.
    pub fn hint(&self) -> Hash {
        match self {
            Self::Present { hint, .. } => *hint,
            Self::Absent => Hash::empty(),
        }
    }

    pub fn ty(&self) -> Option<&Type> {
        match self {
            Self::Present { ty, .. } => Some(ty),
            Self::Absent => None,
        }
    }
}

/// A flat, mutex-guarded map from hash to [`CacheEntry`].
#[derive(Debug, Default)]
pub struct HintCache {
    entries: Mutex<HashMap<Hash, CacheEntry>>,
}

impl HintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, hash: &Hash) -> Option<CacheEntry> {
        self.lock().get(hash).cloned()
    }

    pub fn set(&self, hash: Hash, entry: CacheEntry) {
        self.lock().insert(hash, entry);
    }

    /// Set `entry` unless the existing entry already carries a hint.
    /// Returns `true` if the entry was written.
    pub fn check_and_set(&self, hash: Hash, entry: CacheEntry) -> bool {
        let mut entries = self.lock();
        match entries.get(&hash) {
            Some(existing) if !existing.hint().is_empty() => false,
            _ => {
                entries.insert(hash, entry);
                true
            }
        }
    }

    /// Drop whatever is known about `hash`.
    pub fn forget(&self, hash: &Hash) {
        self.lock().remove(hash);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Hash, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_on_unknown_hash_is_none() {
        let cache = HintCache::new();
        assert_eq!(cache.check(&Hash::of(b"x")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        cache.set(h, CacheEntry::hinted(Type::Number, Hash::of(b"p")));
        cache.set(h, CacheEntry::Absent);
        assert_eq!(cache.check(&h), Some(CacheEntry::Absent));
    }

    #[test]
    fn check_and_set_fills_missing_entry() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        assert!(cache.check_and_set(h, CacheEntry::present(Type::String)));
        assert_eq!(cache.check(&h), Some(CacheEntry::present(Type::String)));
    }

    #[test]
    fn check_and_set_upgrades_hintless_entry() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        let hint = Hash::of(b"parent");
        cache.set(h, CacheEntry::present(Type::String));
        assert!(cache.check_and_set(h, CacheEntry::hinted(Type::String, hint)));
        assert_eq!(cache.check(&h).map(|e| e.hint()), Some(hint));
    }

    #[test]
    fn check_and_set_never_downgrades_hinted_entry() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        let hint = Hash::of(b"parent");
        cache.set(h, CacheEntry::hinted(Type::Blob, hint));
        assert!(!cache.check_and_set(h, CacheEntry::present(Type::Blob)));
        assert!(!cache.check_and_set(h, CacheEntry::hinted(Type::Blob, Hash::of(b"other"))));
        assert_eq!(cache.check(&h).map(|e| e.hint()), Some(hint));
    }

    #[test]
    fn forget_drops_entry() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        cache.set(h, CacheEntry::present(Type::Bool));
        cache.forget(&h);
        assert_eq!(cache.check(&h), None);
    }

    #[test]
    fn absent_entry_is_replaced() {
        let cache = HintCache::new();
        let h = Hash::of(b"x");
        cache.set(h, CacheEntry::Absent);
        assert!(cache.check_and_set(h, CacheEntry::present(Type::Bool)));
        assert!(cache.check(&h).is_some_and(|e| e.is_present()));
    }
}

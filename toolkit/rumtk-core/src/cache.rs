use std::hash::Hash;
use std::sync::Mutex;
use once_cell::sync::OnceCell;

pub use ahash::AHashMap;

/**************************** Constants**************************************/

/**************************** Types *****************************************/

///
/// Generic Cache store object. One use case will be to use a search string as the key and store
/// the search parsing object here.
///
pub type RUMCache<K, V> = AHashMap<K, V>;

///
/// A cache that initializes itself on first use instead of at static-init time.
///
/// Backed by a [OnceCell] so it can live in a `static` without `static mut`; the inner map is
/// guarded by a [Mutex] so concurrent callers racing to populate the same key block on each
/// other rather than racing.
///
pub struct LazyRUMCache<K, V> {
    cell: OnceCell<Mutex<RUMCache<K, V>>>,
}

impl<K, V> LazyRUMCache<K, V>
where
    K: Eq + Hash,
{
    pub const fn new() -> Self {
        LazyRUMCache {
            cell: OnceCell::new(),
        }
    }

    fn inner(&self) -> &Mutex<RUMCache<K, V>> {
        self.cell.get_or_init(|| Mutex::new(RUMCache::default()))
    }

    ///
    /// Returns the cached value for `key`, computing and storing it via `init` if absent.
    ///
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
    where
        K: Clone,
        V: Clone,
        F: FnOnce(&K) -> V,
    {
        let mut guard = self.inner().lock().expect("LazyRUMCache mutex poisoned");
        if let Some(existing) = guard.get(&key) {
            return existing.clone();
        }
        let value = init(&key);
        guard.insert(key, value.clone());
        value
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner()
            .lock()
            .expect("LazyRUMCache mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner()
            .lock()
            .expect("LazyRUMCache mutex poisoned")
            .insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner().lock().expect("LazyRUMCache mutex poisoned").len()
    }
}

impl<K: Eq + Hash, V> Default for LazyRUMCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

///
/// Const-constructible factory so a [LazyRUMCache] can be assigned directly to a `static`.
///
pub const fn new_cache<K, V>() -> LazyRUMCache<K, V> {
    LazyRUMCache::new()
}

/**************************** Traits ****************************************/

/**************************** Helpers ***************************************/

///
/// Fetches `key` from a [LazyRUMCache], populating it via `init` on first miss.
///
/// `init` must have the signature `fn(&K) -> V` (or a closure matching it) — this matches the
/// shape of functions like a runtime builder that take the key as their sole argument.
///
#[macro_export]
macro_rules! rumtk_cache_fetch {
    ( $cache:expr, $key:expr, $init:expr ) => {{
        $cache.get_or_insert_with(*$key, $init)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rumcache_insertion() {
        let mut cache: RUMCache<&str, i32> = RUMCache::with_capacity(5);
        cache.insert("hello", 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lazy_cache_initializes_once() {
        let cache: LazyRUMCache<usize, i32> = new_cache();
        let mut calls = 0;
        let first = cache.get_or_insert_with(1, |_| {
            calls += 1;
            42
        });
        let second = cache.get_or_insert_with(1, |_| {
            calls += 1;
            99
        });
        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls, 1, "initializer should only run once per key");
    }
}

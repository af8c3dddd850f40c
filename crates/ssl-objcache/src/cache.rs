//! Configuration and connection caches
//!
//! One structure serves two disciplines. The configuration cache is
//! unbounded (`max == 0`), populated while a configuration generation
//! loads, and may adopt still-fresh objects from the previous generation's
//! cache instead of reparsing them. The connection cache is bounded and
//! lives on the accept path: entries idle past `inactive` are pruned on
//! access, entries older than `valid` are re-checked against the backing
//! file, and insert overflow evicts from the recency tail.
//!
//! The cache is confined to one event loop; fetches are totally ordered by
//! the caller and no operation yields, so there is no locking anywhere.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error};

use crate::engine::EngineRegistry;
use crate::error::CacheError;
use crate::key::{CacheKey, KeyKind};
use crate::loader::{self, LoaderData};
use crate::object::{Family, Object};
use crate::store::{CacheNode, EntryKey, FileInfo, Store};

/// Per-fetch environment: the path prefix for relative references, the
/// engine registry for `engine:` keys, and the clock reading for this
/// operation (the event loop's cached time; tests pin it with [`at`]).
///
/// [`at`]: FetchContext::at
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    prefix: &'a Path,
    engines: Option<&'a EngineRegistry>,
    now: u64,
}

impl<'a> FetchContext<'a> {
    pub fn new(prefix: &'a Path) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            prefix,
            engines: None,
            now,
        }
    }

    pub fn with_engines(mut self, engines: &'a EngineRegistry) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Pin the clock reading for this fetch.
    pub fn at(mut self, now: u64) -> Self {
        self.now = now;
        self
    }

    pub fn prefix(&self) -> &Path {
        self.prefix
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn engines(&self) -> Option<&EngineRegistry> {
        self.engines
    }
}

/// Cache counters and limits
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub current: usize,
    pub max: usize,
    pub valid: u64,
    pub inactive: u64,
}

/// Process-wide cache of parsed SSL objects
#[derive(Debug)]
pub struct SslObjectCache {
    store: Store,
    inherit: bool,
    current: usize,
    max: usize,
    valid: u64,
    inactive: u64,
}

impl SslObjectCache {
    /// Create a cache. `max == 0` means unbounded with no expiry, the
    /// configuration-load discipline. `max >= 1` bounds the cache and
    /// enables the `valid` (seconds before a freshness re-check) and
    /// `inactive` (idle seconds before eviction) limits.
    pub fn new(max: usize, valid: u64, inactive: u64) -> Self {
        Self {
            store: Store::new(),
            inherit: true,
            current: 0,
            max,
            valid,
            inactive,
        }
    }

    /// The configuration-load cache: unbounded, inheritance enabled.
    pub fn config_cache() -> Self {
        Self::new(0, 0, 0)
    }

    /// Whether a newer generation may adopt this cache's objects.
    pub fn inherit(&self) -> bool {
        self.inherit
    }

    pub fn set_inherit(&mut self, inherit: bool) {
        self.inherit = inherit;
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            current: self.current,
            max: self.max,
            valid: self.valid,
            inactive: self.inactive,
        }
    }

    /// Fetch during configuration load. On a miss the previous generation's
    /// cache (`old_cache`) is consulted first when it allows inheritance:
    /// a DATA entry is adopted outright, a PATH entry only when the backing
    /// file's recorded identity still matches the file on disk.
    ///
    /// A private key fetched with a non-empty password list bypasses the
    /// cache entirely: the same key file under different passwords must not
    /// collide, and passwords are not retained in cache keys.
    pub fn config_fetch(
        &mut self,
        old_cache: Option<&SslObjectCache>,
        family: Family,
        reference: &str,
        data: Option<&LoaderData>,
        ctx: &FetchContext<'_>,
    ) -> Result<Object, CacheError> {
        let key = CacheKey::classify(family, reference, ctx.prefix())?;

        if pkey_bypass(family, data) {
            return loader::create(family, &key, data, ctx);
        }

        let now = ctx.now();
        let ekey = EntryKey::new(family, &key);

        self.prune_idle(&ekey, now);

        if let Some(node) = self.store.get(&ekey) {
            return Ok(node.value.clone());
        }

        let file_info = match key.kind() {
            // a missing file is not an error at this point; the loader
            // reports it below if nothing is inherited
            KeyKind::Path => FileInfo::stat(key.path()).ok(),
            _ => None,
        };

        // try to reuse a reference from the previous generation
        let mut value = None;
        if let Some(old) = old_cache.filter(|old| old.inherit) {
            if let Some(old_node) = old.store.get(&ekey) {
                match key.kind() {
                    KeyKind::Data => value = Some(old_node.value.clone()),
                    KeyKind::Path
                        if file_info.is_some() && file_info == old_node.file_info =>
                    {
                        value = Some(old_node.value.clone());
                    }
                    _ => {}
                }
            }
        }

        let value = match value {
            Some(value) => value,
            None => loader::create(family, &key, data, ctx)?,
        };

        let node = CacheNode::new(key.kind(), value, now, file_info);
        let object = node.value.clone();
        self.store.insert(ekey, node);

        Ok(object)
    }

    /// Fetch on the connection hot path. `cache` may be `None` when the
    /// caller opted out of caching, in which case the object is loaded and
    /// returned without being retained.
    pub fn connection_fetch(
        cache: Option<&mut SslObjectCache>,
        family: Family,
        reference: &str,
        data: Option<&LoaderData>,
        ctx: &FetchContext<'_>,
    ) -> Result<Object, CacheError> {
        let key = CacheKey::classify(family, reference, ctx.prefix())?;

        if pkey_bypass(family, data) {
            return loader::create(family, &key, data, ctx);
        }

        let Some(cache) = cache else {
            return loader::create(family, &key, data, ctx);
        };

        cache.fetch_cached(family, &key, data, ctx)
    }

    fn fetch_cached(
        &mut self,
        family: Family,
        key: &CacheKey,
        data: Option<&LoaderData>,
        ctx: &FetchContext<'_>,
    ) -> Result<Object, CacheError> {
        let now = ctx.now();
        let ekey = EntryKey::new(family, key);

        self.prune_idle(&ekey, now);

        if self.store.get(&ekey).is_some() {
            self.store.detach(&ekey);
            self.revalidate(family, key, &ekey, data, ctx)?;

            if let Some(object) = self.store.touch(&ekey, now) {
                debug!(name = %String::from_utf8_lossy(ekey.bytes()), "cached ssl object");
                return Ok(object);
            }
        }

        let file_info = match key.kind() {
            KeyKind::Path => FileInfo::stat(key.path()).ok(),
            _ => None,
        };

        let value = loader::create(family, key, data, ctx)?;
        let object = value.clone();

        if self.current >= self.max {
            self.expire(now);
        }

        self.store
            .insert(ekey.clone(), CacheNode::new(key.kind(), value, now, file_info));
        self.current += 1;
        let _ = self.store.touch(&ekey, now);

        debug!(name = %String::from_utf8_lossy(ekey.bytes()), "cached ssl object");

        Ok(object)
    }

    /// Drop a bounded-cache entry that has been idle past `inactive`, so
    /// the caller sees a miss.
    fn prune_idle(&mut self, ekey: &EntryKey, now: u64) {
        if self.max == 0 {
            return;
        }
        let idle = match self.store.get(ekey) {
            Some(node) => now.saturating_sub(node.accessed),
            None => return,
        };
        if idle > self.inactive {
            debug!(name = %String::from_utf8_lossy(ekey.bytes()), "delete cached ssl object");
            self.store.remove(ekey);
            self.current = self.current.saturating_sub(1);
        }
    }

    /// Re-check a hit entry older than `valid` against its backing file and
    /// reparse it when the file changed or vanished. A failed reparse
    /// deletes the entry and surfaces the error.
    fn revalidate(
        &mut self,
        family: Family,
        key: &CacheKey,
        ekey: &EntryKey,
        data: Option<&LoaderData>,
        ctx: &FetchContext<'_>,
    ) -> Result<(), CacheError> {
        let now = ctx.now();

        let (kind, created, stored_info) = match self.store.get(ekey) {
            Some(node) => (node.kind, node.created, node.file_info),
            None => return Ok(()),
        };

        if now.saturating_sub(created) <= self.valid {
            return Ok(());
        }

        if kind == KeyKind::Path {
            let fresh = FileInfo::stat(key.path()).ok();

            if fresh.is_none() || fresh != stored_info {
                debug!(path = %key.path().display(), "cached ssl object changed");

                match loader::create(family, key, data, ctx) {
                    Ok(value) => {
                        let info = FileInfo::stat(key.path()).ok();
                        if let Some(node) = self.store.get_mut(ekey) {
                            node.value = value;
                            if info.is_some() {
                                node.file_info = info;
                            }
                        }
                    }
                    Err(err) => {
                        self.store.remove(ekey);
                        self.current = self.current.saturating_sub(1);
                        return Err(err);
                    }
                }
            }
        }

        if let Some(node) = self.store.get_mut(ekey) {
            node.created = now;
        }

        Ok(())
    }

    /// Make room before an insert: the least-recently-used entry always
    /// goes; up to two more follow only if idle past `inactive`.
    fn expire(&mut self, now: u64) {
        for n in 0..3 {
            let Some(tail) = self.store.lru_tail().cloned() else {
                return;
            };

            if n != 0 {
                let fresh = self
                    .store
                    .get(&tail)
                    .map_or(false, |node| now.saturating_sub(node.accessed) <= self.inactive);
                if fresh {
                    return;
                }
            }

            debug!(name = %String::from_utf8_lossy(tail.bytes()), "delete cached ssl object");
            self.store.remove(&tail);
            self.current = self.current.saturating_sub(1);
        }
    }

    /// Release the cache's reference on every entry. Callers' outstanding
    /// object references stay valid: each is an independent refcount.
    fn teardown(&mut self) {
        let mut drained = 0usize;
        while let Some((_key, node)) = self.store.drain_one() {
            drop(node);
            drained += 1;
        }

        let expected = if self.max != 0 { drained } else { 0 };
        if self.current != expected {
            error!(
                current = self.current,
                drained, "items still left in ssl object cache"
            );
        }
        self.current = 0;

        if self.store.recency_len() != 0 {
            error!("recency queue is not empty in ssl object cache");
        }
    }
}

impl Drop for SslObjectCache {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn pkey_bypass(family: Family, data: Option<&LoaderData>) -> bool {
    family == Family::Pkey
        && matches!(data, Some(LoaderData::Passwords(passwords)) if !passwords.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn cert_pem(name: &str) -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        params.self_signed(&key).unwrap().pem()
    }

    fn data_ref(name: &str) -> String {
        format!("data:{}", cert_pem(name))
    }

    fn ctx_at(now: u64) -> FetchContext<'static> {
        FetchContext::new(Path::new("/")).at(now)
    }

    fn leaf(object: &Object) -> &Rc<crate::object::ParsedCert> {
        object.as_cert_chain().unwrap().leaf()
    }

    #[test]
    fn test_fetched_entry_is_recency_head() {
        let mut cache = SslObjectCache::new(10, 100, 100);
        let (a, b) = (data_ref("a"), data_ref("b"));

        SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, &a, None, &ctx_at(0))
            .unwrap();
        SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, &b, None, &ctx_at(1))
            .unwrap();
        assert_eq!(
            cache.store.lru_head().map(|k| k.bytes().to_vec()),
            Some(b.as_bytes().to_vec())
        );

        // a hit splices the entry back to the head
        SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, &a, None, &ctx_at(2))
            .unwrap();
        assert_eq!(
            cache.store.lru_head().map(|k| k.bytes().to_vec()),
            Some(a.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_expire_stops_at_fresh_candidate() {
        let mut cache = SslObjectCache::new(3, 100, 100);
        let refs: Vec<String> = (0..4).map(|i| data_ref(&format!("c{i}"))).collect();

        for (i, r) in refs.iter().take(3).enumerate() {
            SslObjectCache::connection_fetch(
                Some(&mut cache),
                Family::Cert,
                r,
                None,
                &ctx_at(i as u64),
            )
            .unwrap();
        }
        assert_eq!(cache.stats().current, 3);

        // overflow: the tail goes unconditionally, the next candidate is
        // fresh, so eviction stops after one entry
        SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, &refs[3], None, &ctx_at(3))
            .unwrap();
        assert_eq!(cache.stats().current, 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_expire_sweeps_idle_candidates() {
        let mut cache = SslObjectCache::new(3, 100, 1);
        let refs: Vec<String> = (0..4).map(|i| data_ref(&format!("c{i}"))).collect();

        for r in refs.iter().take(3) {
            SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, r, None, &ctx_at(0))
                .unwrap();
        }

        // all three old entries are idle past `inactive`; the sweep takes
        // the full three candidates
        SslObjectCache::connection_fetch(Some(&mut cache), Family::Cert, &refs[3], None, &ctx_at(10))
            .unwrap();
        assert_eq!(cache.stats().current, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_teardown_keeps_caller_references_valid() {
        let mut cache = SslObjectCache::config_cache();
        let reference = data_ref("survivor");
        let object = cache
            .config_fetch(None, Family::Cert, &reference, None, &ctx_at(0))
            .unwrap();

        drop(cache);
        assert!(leaf(&object).subject().contains("survivor"));
        assert_eq!(Rc::strong_count(leaf(&object)), 1);
    }

    #[test]
    fn test_config_cache_never_expires() {
        let mut cache = SslObjectCache::config_cache();
        let reference = data_ref("immortal");

        let first = cache
            .config_fetch(None, Family::Cert, &reference, None, &ctx_at(0))
            .unwrap();
        // an unbounded cache ignores idle time entirely
        let second = cache
            .config_fetch(None, Family::Cert, &reference, None, &ctx_at(1_000_000))
            .unwrap();

        assert!(Rc::ptr_eq(leaf(&first), leaf(&second)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().current, 0);
    }
}

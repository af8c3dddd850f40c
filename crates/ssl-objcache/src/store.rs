//! Indexed entry store
//!
//! The index is an ordered map keyed by `(hash, family, key-bytes)`; the
//! byte comparator is length-then-lexicographic, so equal `(hash, family)`
//! pairs with different bytes still order deterministically. Bounded caches
//! additionally thread their entries through a recency structure keyed by a
//! monotone sequence number: the highest sequence is the most-recently-used
//! head, the lowest the tail. An entry's `lru` link is `None` while
//! detached, which makes detachment idempotent; entries of an unbounded
//! cache never join the structure.

use std::collections::BTreeMap;
use std::path::Path;

use crate::key::{CacheKey, KeyKind};
use crate::object::{Family, Object};

/// Index key: 32-bit key hash, then family, then key bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryKey {
    hash: u32,
    family: Family,
    bytes: Vec<u8>,
}

impl EntryKey {
    pub(crate) fn new(family: Family, key: &CacheKey) -> Self {
        Self {
            hash: key.hash(),
            family,
            bytes: key.bytes().to_vec(),
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Ord for EntryKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.family.discriminant().cmp(&other.family.discriminant()))
            .then_with(|| self.bytes.len().cmp(&other.bytes.len()))
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl PartialOrd for EntryKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Identity of a backing file: modification time plus device and inode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileInfo {
    pub mtime: i64,
    pub dev: u64,
    pub ino: u64,
}

impl FileInfo {
    #[cfg(unix)]
    pub(crate) fn stat(path: &Path) -> std::io::Result<FileInfo> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path)?;
        Ok(FileInfo {
            mtime: meta.mtime(),
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn stat(path: &Path) -> std::io::Result<FileInfo> {
        use std::time::UNIX_EPOCH;

        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileInfo {
            mtime,
            dev: 0,
            ino: meta.len(),
        })
    }
}

/// One cached entry
#[derive(Debug)]
pub(crate) struct CacheNode {
    pub kind: KeyKind,
    pub value: Object,
    pub created: u64,
    pub accessed: u64,
    pub file_info: Option<FileInfo>,
    lru: Option<u64>,
}

impl CacheNode {
    pub(crate) fn new(
        kind: KeyKind,
        value: Object,
        now: u64,
        file_info: Option<FileInfo>,
    ) -> Self {
        Self {
            kind,
            value,
            created: now,
            accessed: now,
            file_info,
            lru: None,
        }
    }
}

/// Ordered index plus recency structure
#[derive(Debug, Default)]
pub(crate) struct Store {
    tree: BTreeMap<EntryKey, CacheNode>,
    recency: BTreeMap<u64, EntryKey>,
    seq: u64,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }

    pub(crate) fn get(&self, key: &EntryKey) -> Option<&CacheNode> {
        self.tree.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &EntryKey) -> Option<&mut CacheNode> {
        self.tree.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: EntryKey, node: CacheNode) {
        self.tree.insert(key, node);
    }

    /// Remove an entry, detaching its recency link first.
    pub(crate) fn remove(&mut self, key: &EntryKey) -> Option<CacheNode> {
        let mut node = self.tree.remove(key)?;
        if let Some(seq) = node.lru.take() {
            self.recency.remove(&seq);
        }
        Some(node)
    }

    /// Detach an entry from the recency structure. No-op when already
    /// detached or absent.
    pub(crate) fn detach(&mut self, key: &EntryKey) {
        if let Some(node) = self.tree.get_mut(key) {
            if let Some(seq) = node.lru.take() {
                self.recency.remove(&seq);
            }
        }
    }

    /// Mark an entry most-recently-used, updating its access time.
    /// Returns a fresh reference to the cached object.
    pub(crate) fn touch(&mut self, key: &EntryKey, now: u64) -> Option<Object> {
        let node = self.tree.get_mut(key)?;
        node.accessed = now;
        if let Some(seq) = node.lru.take() {
            self.recency.remove(&seq);
        }
        self.seq += 1;
        node.lru = Some(self.seq);
        self.recency.insert(self.seq, key.clone());
        Some(node.value.clone())
    }

    /// Least-recently-used entry, if any.
    pub(crate) fn lru_tail(&self) -> Option<&EntryKey> {
        self.recency.first_key_value().map(|(_, key)| key)
    }

    /// Most-recently-used entry, if any.
    #[cfg(test)]
    pub(crate) fn lru_head(&self) -> Option<&EntryKey> {
        self.recency.last_key_value().map(|(_, key)| key)
    }

    pub(crate) fn recency_len(&self) -> usize {
        self.recency.len()
    }

    /// Pop entries in index order; used by teardown.
    pub(crate) fn drain_one(&mut self) -> Option<(EntryKey, CacheNode)> {
        let (key, mut node) = self.tree.pop_first()?;
        if let Some(seq) = node.lru.take() {
            self.recency.remove(&seq);
        }
        Some((key, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use pki_types::CertificateDer;

    use crate::object::{CertChain, ParsedCert};

    fn node(now: u64) -> CacheNode {
        let cert = ParsedCert::new(
            CertificateDer::from(vec![0x30, 0x00]),
            "CN=test".to_string(),
            "CN=test".to_string(),
            false,
        );
        CacheNode::new(
            KeyKind::Data,
            Object::Cert(CertChain::new(vec![Rc::new(cert)])),
            now,
            None,
        )
    }

    fn raw_key(hash: u32, family: Family, bytes: &[u8]) -> EntryKey {
        EntryKey {
            hash,
            family,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_order_hash_then_family_then_bytes() {
        let a = raw_key(1, Family::Ca, b"zzz");
        let b = raw_key(2, Family::Cert, b"aaa");
        assert!(a < b);

        let a = raw_key(1, Family::Cert, b"zzz");
        let b = raw_key(1, Family::Pkey, b"aaa");
        assert!(a < b);

        // shorter bytes order before longer ones with the same prefix
        let a = raw_key(1, Family::Cert, b"ab");
        let b = raw_key(1, Family::Cert, b"abc");
        assert!(a < b);

        let a = raw_key(1, Family::Cert, b"ab");
        let b = raw_key(1, Family::Cert, b"ac");
        assert!(a < b);
    }

    #[test]
    fn test_recency_promote_and_tail() {
        let mut store = Store::new();
        let (ka, kb) = (
            raw_key(1, Family::Cert, b"a"),
            raw_key(2, Family::Cert, b"b"),
        );

        store.insert(ka.clone(), node(0));
        store.insert(kb.clone(), node(0));
        store.touch(&ka, 1);
        store.touch(&kb, 2);

        assert_eq!(store.lru_tail(), Some(&ka));
        assert_eq!(store.lru_head(), Some(&kb));

        // re-touching the tail splices it to the head
        store.touch(&ka, 3);
        assert_eq!(store.lru_tail(), Some(&kb));
        assert_eq!(store.lru_head(), Some(&ka));
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut store = Store::new();
        let key = raw_key(1, Family::Cert, b"a");

        store.insert(key.clone(), node(0));
        store.touch(&key, 1);
        assert_eq!(store.recency_len(), 1);

        store.detach(&key);
        store.detach(&key);
        assert_eq!(store.recency_len(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_detaches_recency_link() {
        let mut store = Store::new();
        let key = raw_key(1, Family::Cert, b"a");

        store.insert(key.clone(), node(0));
        store.touch(&key, 1);
        assert!(store.remove(&key).is_some());

        assert_eq!(store.len(), 0);
        assert_eq!(store.recency_len(), 0);
        assert!(store.remove(&key).is_none());
    }
}

//! Cache key identity
//!
//! A user-supplied reference string is normalized into a typed key before it
//! touches the cache index. Three kinds exist:
//!
//! - `data:<pem>`: inline PEM material (certificates and private keys only)
//! - `engine:<engine-id>:<key-id>`: hardware-held private key
//! - anything else: a filesystem path, resolved against the configured
//!   prefix into an absolute normalized form
//!
//! The key bytes retain the `data:`/`engine:` prefix so that the same PEM
//! blob referenced two different ways never collides; the loader strips the
//! prefix when it feeds the parser.

use std::hash::Hasher;
use std::path::{Component, Path, PathBuf};

use rustc_hash::FxHasher;

use crate::error::CacheError;
use crate::object::Family;

const DATA_PREFIX: &str = "data:";
const ENGINE_PREFIX: &str = "engine:";

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = (1 << 30) - 1;

/// How a reference string was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Filesystem path, stored absolute and normalized
    Path,
    /// Inline PEM data
    Data,
    /// Hardware engine key URI
    Engine,
}

/// Normalized identity of a cached object
#[derive(Debug, Clone)]
pub struct CacheKey {
    kind: KeyKind,
    bytes: Vec<u8>,
}

impl CacheKey {
    /// Classify `reference` for `family`, resolving PATH references against
    /// `prefix`. Rules are applied in order: `data:` is recognized for
    /// certificates and private keys, `engine:` for private keys only, and
    /// everything else is a path.
    pub fn classify(
        family: Family,
        reference: &str,
        prefix: &Path,
    ) -> Result<CacheKey, CacheError> {
        if reference.len() > MAX_KEY_LEN {
            return Err(CacheError::ReferenceTooLong);
        }

        if matches!(family, Family::Cert | Family::Pkey) && reference.starts_with(DATA_PREFIX) {
            return Ok(CacheKey {
                kind: KeyKind::Data,
                bytes: reference.as_bytes().to_vec(),
            });
        }

        if family == Family::Pkey && reference.starts_with(ENGINE_PREFIX) {
            // The engine-id/key-id split is validated at load time.
            return Ok(CacheKey {
                kind: KeyKind::Engine,
                bytes: reference.as_bytes().to_vec(),
            });
        }

        let resolved = resolve_path(prefix, Path::new(reference));
        let bytes = resolved
            .into_os_string()
            .into_string()
            .map_err(|_| CacheError::InvalidSyntax)?
            .into_bytes();

        if bytes.len() > MAX_KEY_LEN {
            return Err(CacheError::ReferenceTooLong);
        }

        Ok(CacheKey {
            kind: KeyKind::Path,
            bytes,
        })
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 32-bit mixing hash over the key bytes. Deterministic for the lifetime
    /// of the process; collisions are resolved by the index comparator.
    pub fn hash(&self) -> u32 {
        let mut hasher = FxHasher::default();
        hasher.write(&self.bytes);
        hasher.finish() as u32
    }

    /// PEM bytes for the parser: the raw reference with the `data:` prefix
    /// stripped. Only meaningful for DATA keys.
    pub fn pem_bytes(&self) -> &[u8] {
        match self.kind {
            KeyKind::Data => &self.bytes[DATA_PREFIX.len()..],
            _ => &self.bytes,
        }
    }

    /// Backing file path. Only meaningful for PATH keys.
    pub fn path(&self) -> &Path {
        // PATH key bytes are validated UTF-8 at classification
        Path::new(std::str::from_utf8(&self.bytes).unwrap_or(""))
    }

    /// Split an ENGINE key into `(engine_id, key_id)`. A missing colon
    /// between the two ids is a syntax error.
    pub fn engine_ref(&self) -> Result<(&str, &str), CacheError> {
        let reference = std::str::from_utf8(&self.bytes).map_err(|_| CacheError::InvalidSyntax)?;
        let rest = reference
            .strip_prefix(ENGINE_PREFIX)
            .ok_or(CacheError::InvalidSyntax)?;
        rest.split_once(':').ok_or(CacheError::InvalidSyntax)
    }
}

/// Resolve `path` against `prefix` and normalize it lexically: `.` segments
/// are dropped and `..` segments pop their parent where one exists.
fn resolve_path(prefix: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() || prefix.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        prefix.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push(component.as_os_str());
                }
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

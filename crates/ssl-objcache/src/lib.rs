//! SSL Object Cache
//!
//! A process-wide cache that deduplicates and reuses expensively parsed
//! cryptographic objects (certificate chains, private keys, CRL chains,
//! and CA bundles) across the two lifecycles a network server goes
//! through: configuration load (startup and live reconfiguration) and the
//! per-connection hot path.
//!
//! # Features
//!
//! - Identity keying of references: inline `data:` PEM, `engine:` key URIs,
//!   and prefix-resolved file paths
//! - Ordered lookup by `(hash, family, key bytes)`
//! - An unbounded configuration cache that can adopt parsed objects from
//!   the previous configuration generation when the backing files are
//!   unchanged
//! - A bounded connection cache with inactivity eviction and file
//!   freshness re-checks
//! - Refcounted handoff: a fetched handle stays valid independently of the
//!   cache's own reference
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use ssl_objcache::{Family, FetchContext, SslObjectCache};
//!
//! # fn main() -> Result<(), ssl_objcache::CacheError> {
//! let mut cache = SslObjectCache::config_cache();
//! let ctx = FetchContext::new(Path::new("/etc/ssl"));
//!
//! // parsed once, shared by every later fetch of the same reference
//! let chain = cache.config_fetch(None, Family::Cert, "certs/server.pem", None, &ctx)?;
//! let key = cache.config_fetch(None, Family::Pkey, "certs/server.key", None, &ctx)?;
//! # let _ = (chain, key);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod loader;
pub mod object;

mod store;

pub use cache::{CacheStats, FetchContext, SslObjectCache};
pub use config::{CacheConfig, ConfigError};
pub use engine::{EngineError, EngineRegistry, KeyEngine};
pub use error::CacheError;
pub use key::{CacheKey, KeyKind, MAX_KEY_LEN};
pub use loader::LoaderData;
pub use object::{
    CertChain, CrlChain, Family, Object, ParsedCert, ParsedCrl, ParsedKey, PrivateKey,
};

//! Cache-specific error types
//!
//! This module defines the error type returned by every fetch and loader
//! operation of the SSL object cache.

use crate::engine::EngineError;

/// Errors that can occur while fetching or loading an SSL object
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Malformed reference string (e.g. `engine:` without a key id)
    #[error("invalid syntax")]
    InvalidSyntax,

    /// Reference string exceeds the maximum key length
    #[error("object reference is too long")]
    ReferenceTooLong,

    /// Failed to open the backing file of a PATH reference
    #[error("cannot open \"{path}\": {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PEM or DER decoding failed; the message identifies the failed step
    #[error("{0}")]
    Parse(&'static str),

    /// `engine:` reference named an engine that is not registered
    #[error("ssl engine \"{0}\" not found")]
    EngineNotFound(String),

    /// The engine was found but refused to load the key
    #[error("engine \"{engine}\" failed to load key \"{key_id}\": {source}")]
    EngineKey {
        engine: String,
        key_id: String,
        #[source]
        source: EngineError,
    },

    /// `engine:` reference used without an engine registry
    #[error("loading \"engine:...\" keys is not supported")]
    EngineUnsupported,
}

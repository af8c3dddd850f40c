//! Hardware key engine registry
//!
//! Private keys referenced as `engine:<engine-id>:<key-id>` are not parsed
//! from PEM; they are resolved by an engine driver registered here. The
//! driver owns the device session and hands back key material the cache can
//! hold like any other parsed key.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::object::ParsedKey;

/// Error reported by an engine driver while loading a key
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

/// Driver interface for hardware-held private keys
pub trait KeyEngine {
    /// Load the private key identified by `key_id` from the device.
    fn load_private_key(&self, key_id: &str) -> Result<ParsedKey, EngineError>;
}

/// Registry of engine drivers, looked up by engine id
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Rc<dyn KeyEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under `id`, replacing any previous driver.
    pub fn register(&mut self, id: impl Into<String>, engine: Rc<dyn KeyEngine>) {
        self.engines.insert(id.into(), engine);
    }

    /// Look up a driver by engine id.
    pub fn get(&self, id: &str) -> Option<Rc<dyn KeyEngine>> {
        self.engines.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

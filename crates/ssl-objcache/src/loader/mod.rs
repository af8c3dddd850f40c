//! Object loaders
//!
//! One loader per object family, dispatched by tag. Each loader parses a
//! cache key into a refcounted object; handing a reference to a caller is
//! `Clone` on the returned handle, releasing one is `Drop`. Loaders read
//! from a memory buffer for DATA keys and from the filesystem for PATH
//! keys; `engine:` private keys go through the engine registry instead.

mod cert;
mod crl;
mod pkey;

pub use pkey::{password_callback, CallbackDirection, PASSWORD_BUF_SIZE};

use std::borrow::Cow;

use crate::cache::FetchContext;
use crate::error::CacheError;
use crate::key::{CacheKey, KeyKind};
use crate::object::{Family, Object};

/// Family-specific loader input. Certificates, CRLs, and CA chains ignore
/// it; private keys take an ordered password candidate list.
#[derive(Debug, Clone)]
pub enum LoaderData {
    Passwords(Vec<String>),
}

/// Parse the object identified by `key`.
pub(crate) fn create(
    family: Family,
    key: &CacheKey,
    data: Option<&LoaderData>,
    ctx: &FetchContext<'_>,
) -> Result<Object, CacheError> {
    match family {
        Family::Cert => cert::load_cert_chain(key).map(Object::Cert),
        Family::Ca => cert::load_ca_chain(key).map(Object::Cert),
        Family::Crl => crl::load_crl_chain(key).map(Object::Crl),
        Family::Pkey => pkey::load_private_key(key, data, ctx).map(Object::PrivateKey),
    }
}

/// Open the PEM input behind a key: the inline bytes of a DATA key, or the
/// contents of a PATH key's backing file.
fn read_source(key: &CacheKey) -> Result<Cow<'_, [u8]>, CacheError> {
    match key.kind() {
        KeyKind::Data => Ok(Cow::Borrowed(key.pem_bytes())),
        KeyKind::Path => std::fs::read(key.path())
            .map(Cow::Owned)
            .map_err(|source| CacheError::Open {
                path: key.path().display().to_string(),
                source,
            }),
        // engine keys never reach a PEM reader
        KeyKind::Engine => Err(CacheError::InvalidSyntax),
    }
}

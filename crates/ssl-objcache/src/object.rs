//! Parsed object model
//!
//! Everything the cache stores is reference-counted: a certificate or CRL
//! chain is a `Vec` of `Rc`-held elements, a private key a single `Rc`.
//! Cloning a handle duplicates the container shell and bumps every
//! element's count, so a caller's clone stays valid after the cache drops
//! its own reference. The cache is single-threaded by design (it lives on
//! one event loop), hence `Rc` rather than `Arc`.

use std::rc::Rc;

use pki_types::{CertificateDer, PrivateKeyDer};

/// Object class cached
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    /// Server certificate chain; the first entry is the leaf
    Cert = 0,
    /// Private key
    Pkey = 1,
    /// Certificate revocation list chain
    Crl = 2,
    /// CA trust chain; no distinguished leaf
    Ca = 3,
}

impl Family {
    pub(crate) fn discriminant(self) -> u8 {
        self as u8
    }
}

/// A single parsed certificate
#[derive(Debug)]
pub struct ParsedCert {
    der: CertificateDer<'static>,
    subject: String,
    issuer: String,
    trusted: bool,
}

impl ParsedCert {
    pub(crate) fn new(
        der: CertificateDer<'static>,
        subject: String,
        issuer: String,
        trusted: bool,
    ) -> Self {
        Self {
            der,
            subject,
            issuer,
            trusted,
        }
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Whether the source PEM block carried trusted-certificate attributes
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }
}

/// An ordered, non-empty certificate chain
#[derive(Debug, Clone)]
pub struct CertChain {
    certs: Vec<Rc<ParsedCert>>,
}

impl CertChain {
    pub(crate) fn new(certs: Vec<Rc<ParsedCert>>) -> Self {
        Self { certs }
    }

    pub fn certs(&self) -> &[Rc<ParsedCert>] {
        &self.certs
    }

    /// The end-entity certificate. For CA chains this is simply the first
    /// entry read.
    pub fn leaf(&self) -> &Rc<ParsedCert> {
        &self.certs[0]
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// A parsed private key in one of the supported DER encodings
#[derive(Debug)]
pub struct ParsedKey {
    der: PrivateKeyDer<'static>,
}

impl ParsedKey {
    pub fn new(der: PrivateKeyDer<'static>) -> Self {
        Self { der }
    }

    pub fn der(&self) -> &PrivateKeyDer<'static> {
        &self.der
    }
}

/// Refcounted private key handle
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: Rc<ParsedKey>,
}

impl PrivateKey {
    pub(crate) fn new(key: ParsedKey) -> Self {
        Self { key: Rc::new(key) }
    }

    pub fn parsed(&self) -> &Rc<ParsedKey> {
        &self.key
    }
}

/// A single parsed certificate revocation list
#[derive(Debug)]
pub struct ParsedCrl {
    der: Vec<u8>,
    issuer: String,
    last_update: i64,
}

impl ParsedCrl {
    pub(crate) fn new(der: Vec<u8>, issuer: String, last_update: i64) -> Self {
        Self {
            der,
            issuer,
            last_update,
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// thisUpdate as UNIX seconds
    pub fn last_update(&self) -> i64 {
        self.last_update
    }
}

/// A non-empty CRL chain
#[derive(Debug, Clone)]
pub struct CrlChain {
    crls: Vec<Rc<ParsedCrl>>,
}

impl CrlChain {
    pub(crate) fn new(crls: Vec<Rc<ParsedCrl>>) -> Self {
        Self { crls }
    }

    pub fn crls(&self) -> &[Rc<ParsedCrl>] {
        &self.crls
    }

    pub fn len(&self) -> usize {
        self.crls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }
}

/// A cached object handle. Cloning yields a new caller-owned reference
/// whose release is independent of the cache's own reference.
#[derive(Debug, Clone)]
pub enum Object {
    Cert(CertChain),
    PrivateKey(PrivateKey),
    Crl(CrlChain),
}

impl Object {
    pub fn as_cert_chain(&self) -> Option<&CertChain> {
        match self {
            Object::Cert(chain) => Some(chain),
            _ => None,
        }
    }

    pub fn as_private_key(&self) -> Option<&PrivateKey> {
        match self {
            Object::PrivateKey(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_crl_chain(&self) -> Option<&CrlChain> {
        match self {
            Object::Crl(chain) => Some(chain),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pki_types::PrivatePkcs8KeyDer;

    fn test_cert(name: &str) -> ParsedCert {
        ParsedCert::new(
            CertificateDer::from(vec![0x30, 0x00]),
            format!("CN={name}"),
            "CN=issuer".to_string(),
            false,
        )
    }

    #[test]
    fn test_chain_clone_bumps_each_element() {
        let chain = CertChain::new(vec![Rc::new(test_cert("a")), Rc::new(test_cert("b"))]);
        assert_eq!(Rc::strong_count(&chain.certs()[0]), 1);

        let dup = chain.clone();
        assert_eq!(Rc::strong_count(&chain.certs()[0]), 2);
        assert_eq!(Rc::strong_count(&chain.certs()[1]), 2);
        assert!(Rc::ptr_eq(&chain.certs()[0], &dup.certs()[0]));

        drop(dup);
        assert_eq!(Rc::strong_count(&chain.certs()[0]), 1);
    }

    #[test]
    fn test_private_key_clone_is_refcounted() {
        let key = PrivateKey::new(ParsedKey::new(PrivateKeyDer::Pkcs8(
            PrivatePkcs8KeyDer::from(vec![1u8, 2, 3]),
        )));
        let dup = key.clone();

        assert_eq!(Rc::strong_count(key.parsed()), 2);
        assert!(Rc::ptr_eq(key.parsed(), dup.parsed()));
    }

    #[test]
    fn test_object_accessors() {
        let chain = Object::Cert(CertChain::new(vec![Rc::new(test_cert("a"))]));
        assert!(chain.as_cert_chain().is_some());
        assert!(chain.as_private_key().is_none());
        assert!(chain.as_crl_chain().is_none());
    }
}

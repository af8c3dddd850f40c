//! Certificate chain and CA bundle loaders
//!
//! Both read a sequence of PEM certificate blocks. The certificate loader
//! distinguishes the first block as the leaf, which may carry
//! trusted-certificate attributes, and requires it to exist; the CA loader
//! treats every block alike and only rejects an empty bundle. Blocks with
//! unrelated labels (a private key appended to the same file, say) are
//! skipped; a malformed block fails the load.

use std::rc::Rc;

use pki_types::CertificateDer;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use super::read_source;
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::object::{CertChain, ParsedCert};

const LABEL_CERT: &str = "CERTIFICATE";
const LABEL_TRUSTED: &str = "TRUSTED CERTIFICATE";

/// Load a server certificate chain: a leaf followed by zero or more
/// intermediates.
pub(super) fn load_cert_chain(key: &CacheKey) -> Result<CertChain, CacheError> {
    let buf = read_source(key)?;
    let mut iter = Pem::iter_from_buffer(&buf);
    let mut certs = Vec::new();

    // the certificate itself
    loop {
        match iter.next() {
            Some(Ok(pem)) if pem.label == LABEL_CERT || pem.label == LABEL_TRUSTED => {
                certs.push(Rc::new(parse_cert(pem, "failed to read certificate")?));
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Err(CacheError::Parse("failed to read certificate")),
        }
    }

    // rest of the chain; running out of input here is normal termination
    for pem in iter {
        let pem = pem.map_err(|_| CacheError::Parse("failed to read certificate chain"))?;
        if pem.label != LABEL_CERT {
            continue;
        }
        certs.push(Rc::new(parse_cert(
            pem,
            "failed to read certificate chain",
        )?));
    }

    Ok(CertChain::new(certs))
}

/// Load a CA bundle: every block is read alike, and an empty bundle is an
/// error.
pub(super) fn load_ca_chain(key: &CacheKey) -> Result<CertChain, CacheError> {
    let buf = read_source(key)?;
    let mut certs = Vec::new();

    for pem in Pem::iter_from_buffer(&buf) {
        let pem = pem.map_err(|_| CacheError::Parse("failed to read CA certificate"))?;
        if pem.label != LABEL_CERT && pem.label != LABEL_TRUSTED {
            continue;
        }
        certs.push(Rc::new(parse_cert(pem, "failed to read CA certificate")?));
    }

    if certs.is_empty() {
        return Err(CacheError::Parse("no certificate found"));
    }

    Ok(CertChain::new(certs))
}

/// Validate one PEM block as DER and extract its naming attributes. A
/// trusted-certificate block carries auxiliary data after the certificate;
/// only the certificate itself is kept as the DER handle.
fn parse_cert(pem: Pem, err: &'static str) -> Result<ParsedCert, CacheError> {
    let trusted = pem.label == LABEL_TRUSTED;

    let (rem, cert) =
        parse_x509_certificate(&pem.contents).map_err(|_| CacheError::Parse(err))?;
    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();

    let der_len = pem.contents.len() - rem.len();
    let mut contents = pem.contents;
    contents.truncate(der_len);

    Ok(ParsedCert::new(
        CertificateDer::from(contents),
        subject,
        issuer,
        trusted,
    ))
}

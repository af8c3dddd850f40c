//! CRL chain loader
//!
//! Reads a sequence of PEM `X509 CRL` blocks; unrelated blocks are skipped
//! and an input with no CRL at all is an error.

use std::rc::Rc;

use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use super::read_source;
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::object::{CrlChain, ParsedCrl};

const LABEL_CRL: &str = "X509 CRL";

pub(super) fn load_crl_chain(key: &CacheKey) -> Result<CrlChain, CacheError> {
    let buf = read_source(key)?;
    let mut crls = Vec::new();

    for pem in Pem::iter_from_buffer(&buf) {
        let pem = pem.map_err(|_| CacheError::Parse("failed to read CRL"))?;
        if pem.label != LABEL_CRL {
            continue;
        }

        let (_, crl) =
            parse_x509_crl(&pem.contents).map_err(|_| CacheError::Parse("failed to read CRL"))?;
        let issuer = crl.issuer().to_string();
        let last_update = crl.last_update().timestamp();

        crls.push(Rc::new(ParsedCrl::new(pem.contents, issuer, last_update)));
    }

    if crls.is_empty() {
        return Err(CacheError::Parse("no CRL found"));
    }

    Ok(CrlChain::new(crls))
}

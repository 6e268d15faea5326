// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate Revocation List handling.

use {
    crate::{
        asn1::rfc5280::{CertificateList, Name, OID_EXTENSION_DELTA_CRL_INDICATOR},
        TimeStampError,
    },
    bcder::Integer,
};

/// A parsed CRL together with its original encoding.
///
/// Fields beyond the delta indicator are interpreted on demand; a CRL
/// fetched for DSS embedding is usually never consulted for individual
/// serials.
#[derive(Clone, Debug)]
pub struct Crl {
    raw: Vec<u8>,
    list: CertificateList,
}

impl Crl {
    pub fn from_der(data: impl Into<Vec<u8>>) -> Result<Self, TimeStampError> {
        let raw = data.into();

        let list = CertificateList::from_der(raw.as_slice())
            .map_err(|e| TimeStampError::InvalidResponse(format!("CRL decode error: {}", e)))?;

        Ok(Self { raw, list })
    }

    /// The encoding this CRL was constructed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn issuer_name(&self) -> &Name {
        &self.list.tbs_cert_list.issuer
    }

    pub fn this_update(&self) -> chrono::DateTime<chrono::Utc> {
        self.list.tbs_cert_list.this_update.clone().into()
    }

    pub fn next_update(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.list
            .tbs_cert_list
            .next_update
            .clone()
            .map(Into::into)
    }

    /// Whether this is a delta CRL.
    pub fn is_delta(&self) -> bool {
        self.list
            .tbs_cert_list
            .crl_extensions
            .as_ref()
            .and_then(|exts| exts.find_by_oid(OID_EXTENSION_DELTA_CRL_INDICATOR))
            .is_some()
    }

    /// Whether the CRL lists the given serial as revoked.
    pub fn contains_serial(&self, serial: &Integer) -> bool {
        self.list
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .any(|entry| &entry.user_certificate == serial)
    }

    /// Number of revocation entries.
    pub fn revoked_count(&self) -> usize {
        self.list.tbs_cert_list.revoked_certificates.len()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate validation sessions.
//!
//! A session queues certificates, resolves their issuers, fetches
//! revocation data through the injected fetcher/cache collaborators,
//! and reports one result per certificate. A failing certificate never
//! aborts the batch; the per-certificate errors ride along in its
//! result.

use {
    crate::{
        certificate::Certificate,
        crl::Crl,
        ocsp::{create_ocsp_request, parse_ocsp_response, CertRevocationStatus},
        revocation::{RevocationCache, RevocationDataFetcher},
        TimeStampError,
    },
    log::{debug, warn},
};

/// Where a certificate's validity assertion came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSource {
    Ocsp,
    Crl,
    Trusted,
}

/// Outcome for one queued certificate.
#[derive(Clone, Debug)]
pub struct ValidationResult {
    pub certificate: Certificate,
    pub ocsp_status: Option<CertRevocationStatus>,
    pub is_valid: bool,
    pub sources: Vec<ValidationSource>,
    pub errors: Vec<String>,
}

/// DER artifacts collected during validation, in DSS-ready form.
#[derive(Clone, Debug, Default)]
pub struct RevocationData {
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

impl RevocationData {
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsps.is_empty()
    }

    /// Merge another collection into this one, skipping duplicates.
    pub fn merge(&mut self, other: RevocationData) {
        for cert in other.certificates {
            if !self.certificates.contains(&cert) {
                self.certificates.push(cert);
            }
        }

        for crl in other.crls {
            if !self.crls.contains(&crl) {
                self.crls.push(crl);
            }
        }

        for ocsp in other.ocsps {
            if !self.ocsps.contains(&ocsp) {
                self.ocsps.push(ocsp);
            }
        }
    }
}

/// Session tunables.
#[derive(Clone, Copy, Debug)]
pub struct ValidationOptions {
    /// Try OCSP before CRLs.
    pub prefer_ocsp: bool,

    /// Attach a nonce to OCSP requests.
    pub include_nonce: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            prefer_ocsp: true,
            include_nonce: true,
        }
    }
}

struct QueuedCertificate {
    cert: Certificate,
    issuer: Option<Certificate>,
}

/// A single-use certificate validation session.
///
/// Queue order equals result order. Once [ValidationSession::validate_all]
/// runs the session is consumed for queuing; both further queuing and a
/// second validation are errors.
pub struct ValidationSession<'a> {
    fetcher: &'a dyn RevocationDataFetcher,
    cache: &'a dyn RevocationCache,
    trust_store: &'a [Certificate],
    options: ValidationOptions,
    queued: Vec<QueuedCertificate>,
    started: bool,
    collected: RevocationData,
}

impl<'a> ValidationSession<'a> {
    pub fn new(
        fetcher: &'a dyn RevocationDataFetcher,
        cache: &'a dyn RevocationCache,
        trust_store: &'a [Certificate],
        options: ValidationOptions,
    ) -> Self {
        Self {
            fetcher,
            cache,
            trust_store,
            options,
            queued: Vec::new(),
            started: false,
            collected: RevocationData::default(),
        }
    }

    /// Queue a certificate, optionally with a known issuer.
    pub fn queue_certificate(
        &mut self,
        cert: Certificate,
        issuer: Option<Certificate>,
    ) -> Result<(), TimeStampError> {
        if self.started {
            return Err(TimeStampError::QueueAfterStart);
        }

        self.queued.push(QueuedCertificate { cert, issuer });

        Ok(())
    }

    /// Queue a chain of certificates, linking issuers automatically by
    /// subject/issuer name match within the chain.
    pub fn queue_chain(&mut self, chain: &[Certificate]) -> Result<(), TimeStampError> {
        for cert in chain {
            let issuer = chain
                .iter()
                .find(|candidate| *candidate != cert && cert.is_issued_by(candidate))
                .cloned();

            self.queue_certificate(cert.clone(), issuer)?;
        }

        Ok(())
    }

    /// Validate every queued certificate, in queue order.
    pub fn validate_all(&mut self) -> Result<Vec<ValidationResult>, TimeStampError> {
        if self.started {
            return Err(TimeStampError::QueueAfterStart);
        }

        self.started = true;

        let queued = std::mem::take(&mut self.queued);

        let mut results = Vec::with_capacity(queued.len());

        for entry in &queued {
            results.push(self.validate_one(entry));
        }

        Ok(results)
    }

    /// The DER artifacts accumulated across the validation run.
    pub fn revocation_data(&self) -> &RevocationData {
        &self.collected
    }

    pub fn into_revocation_data(self) -> RevocationData {
        self.collected
    }

    fn validate_one(&mut self, entry: &QueuedCertificate) -> ValidationResult {
        let cert = &entry.cert;

        let mut result = ValidationResult {
            certificate: cert.clone(),
            ocsp_status: None,
            is_valid: false,
            sources: Vec::new(),
            errors: Vec::new(),
        };

        self.collect_certificate(cert);

        // A certificate issued by a trust-store member passes outright.
        if let Some(trusted) = self
            .trust_store
            .iter()
            .find(|candidate| cert.is_issued_by(candidate))
        {
            debug!(
                "certificate {} issued by trusted {:?}",
                cert.serial_number_hex(),
                trusted.subject_name()
            );
            result.sources.push(ValidationSource::Trusted);
            result.is_valid = true;

            return result;
        }

        let mut checked = false;

        if self.options.prefer_ocsp {
            checked |= self.try_ocsp(entry, &mut result);
        }

        if !checked {
            checked |= self.try_crl(cert, &mut result);
        }

        if !self.options.prefer_ocsp && !checked {
            checked |= self.try_ocsp(entry, &mut result);
        }

        if !checked {
            result.errors.push(format!(
                "certificate {} advertises no reachable OCSP or CRL endpoint",
                cert.serial_number_hex()
            ));
        }

        result
    }

    fn try_ocsp(&mut self, entry: &QueuedCertificate, result: &mut ValidationResult) -> bool {
        let cert = &entry.cert;

        let issuer = match &entry.issuer {
            Some(issuer) => issuer,
            None => {
                result
                    .errors
                    .push("no issuer available to form an OCSP CertID".to_string());
                return false;
            }
        };

        let url = match cert.ocsp_responder_url() {
            Some(url) => url,
            None => return false,
        };

        let request = match create_ocsp_request(cert, issuer, self.options.include_nonce) {
            Ok(request) => request,
            Err(e) => {
                result.errors.push(format!("OCSP request build: {}", e));
                return false;
            }
        };

        let (raw, from_cache) = match self.cache.get_ocsp(&url, &request.der) {
            Some(raw) => (raw, true),
            None => match self.fetcher.fetch_ocsp(&url, &request.der) {
                Ok(raw) => (raw, false),
                Err(e) => {
                    result.errors.push(format!("OCSP fetch from {}: {}", url, e));
                    return false;
                }
            },
        };

        // A cached response cannot echo a fresh nonce; match on the
        // request without one.
        let request_for_parse = if from_cache {
            crate::ocsp::OcspRequestData {
                nonce: None,
                ..request.clone()
            }
        } else {
            request.clone()
        };

        match parse_ocsp_response(&raw, &request_for_parse) {
            Ok(info) => {
                if !from_cache {
                    self.cache.set_ocsp(&url, &request.der, &raw);
                }

                if info.nonce_matched == Some(false) {
                    warn!("OCSP response from {} carries a mismatched nonce", url);
                    result
                        .errors
                        .push(format!("OCSP nonce mismatch from {}", url));
                }

                result.is_valid = !matches!(info.status, CertRevocationStatus::Revoked { .. });
                result.ocsp_status = Some(info.status);
                result.sources.push(ValidationSource::Ocsp);

                self.collected.ocsps.push(info.raw);

                true
            }
            Err(e) => {
                result.errors.push(format!("OCSP parse from {}: {}", url, e));
                false
            }
        }
    }

    fn try_crl(&mut self, cert: &Certificate, result: &mut ValidationResult) -> bool {
        let urls = cert.crl_distribution_urls();

        if urls.is_empty() {
            return false;
        }

        for url in urls {
            let (raw, from_cache) = match self.cache.get_crl(&url) {
                Some(raw) => (raw, true),
                None => match self.fetcher.fetch_crl(&url) {
                    Ok(raw) => (raw, false),
                    Err(e) => {
                        result.errors.push(format!("CRL fetch from {}: {}", url, e));
                        continue;
                    }
                },
            };

            match Crl::from_der(raw.clone()) {
                Ok(crl) => {
                    if !from_cache {
                        self.cache.set_crl(&url, &raw);
                    }

                    result.is_valid = !crl.contains_serial(cert.serial_number());
                    result.sources.push(ValidationSource::Crl);

                    self.collected.crls.push(raw);

                    return true;
                }
                Err(e) => {
                    result.errors.push(format!("CRL parse from {}: {}", url, e));
                }
            }
        }

        false
    }

    fn collect_certificate(&mut self, cert: &Certificate) {
        let der = cert.encode_der().to_vec();

        if !self.collected.certificates.contains(&der) {
            self.collected.certificates.push(der);
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::revocation::MemoryRevocationCache, std::sync::Mutex};

    struct RecordingFetcher {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingFetcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl RevocationDataFetcher for RecordingFetcher {
        fn fetch_ocsp(&self, url: &str, _request: &[u8]) -> Result<Vec<u8>, TimeStampError> {
            self.calls.lock().unwrap().push(format!("ocsp:{}", url));
            Err(TimeStampError::Network {
                attempts: 1,
                message: "unreachable".to_string(),
            })
        }

        fn fetch_crl(&self, url: &str) -> Result<Vec<u8>, TimeStampError> {
            self.calls.lock().unwrap().push(format!("crl:{}", url));
            Err(TimeStampError::Network {
                attempts: 1,
                message: "unreachable".to_string(),
            })
        }
    }

    #[test]
    fn queue_after_start_is_rejected() {
        let fetcher = RecordingFetcher::new();
        let cache = MemoryRevocationCache::new();

        let mut session =
            ValidationSession::new(&fetcher, &cache, &[], ValidationOptions::default());

        session.validate_all().unwrap();

        // Both queueing and re-validation fail once started.
        assert!(matches!(
            session.validate_all(),
            Err(TimeStampError::QueueAfterStart)
        ));
    }

    #[test]
    fn empty_session_yields_empty_results() {
        let fetcher = RecordingFetcher::new();
        let cache = MemoryRevocationCache::new();

        let mut session =
            ValidationSession::new(&fetcher, &cache, &[], ValidationOptions::default());

        let results = session.validate_all().unwrap();
        assert!(results.is_empty());
        assert!(session.revocation_data().is_empty());
    }

    #[test]
    fn revocation_data_merge_deduplicates() {
        let mut a = RevocationData {
            certificates: vec![vec![1], vec![2]],
            crls: vec![vec![3]],
            ocsps: vec![],
        };

        let b = RevocationData {
            certificates: vec![vec![2], vec![4]],
            crls: vec![vec![3]],
            ocsps: vec![vec![5]],
        };

        a.merge(b);

        assert_eq!(a.certificates, vec![vec![1], vec![2], vec![4]]);
        assert_eq!(a.crls, vec![vec![3]]);
        assert_eq!(a.ocsps, vec![vec![5]]);
    }
}

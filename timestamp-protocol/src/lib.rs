// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RFC 3161 Time-Stamp Protocol in pure Rust.

This crate implements the protocol side of trusted timestamping:

* Hand-mapped ASN.1 for RFC 3161 (TSP), the `SignedData` branch of RFC
  5652 (CMS), the subset of RFC 5280 the protocol touches
  (certificates, CRLs, the relevant extensions), and RFC 6960 (OCSP).
* A blocking HTTP client for Time-Stamping Authorities with retry,
  exponential backoff, and deadline handling.
* Cryptographic verification of timestamp tokens: content digests and
  signatures, via `ring`.
* A revocation data engine: OCSP request/response handling, CRL
  fetching, endpoint discovery from certificate extensions, and a
  validation session with injectable fetcher/cache collaborators and
  per-URL circuit breaking.

Trust policy is out of scope: the crate verifies that bytes were signed
by an embedded certificate and reports revocation state, but deciding
whether to trust a TSA is the caller's job (a trust store hook is
provided for chain anchoring).

Serialization is `bcder`-based. Tokens arrive as BER and are re-encoded
to strict DER before they are embedded anywhere durable.
*/

pub mod algorithm;
pub mod asn1;
pub mod asn1time;
pub mod certificate;
pub mod crl;
pub mod ocsp;
pub mod revocation;
pub mod signed_data;
pub mod time_stamp;
pub mod validation;

pub use {
    algorithm::{DigestAlgorithm, SignatureAlgorithm},
    certificate::Certificate,
    crl::Crl,
    ocsp::{CertRevocationStatus, OcspRequestData, OcspResponseInfo},
    revocation::{
        CircuitBreaker, CircuitBreakerConfig, HttpRevocationFetcher, MemoryRevocationCache,
        RevocationCache, RevocationDataFetcher,
    },
    signed_data::{SignedData, SignerInfo},
    time_stamp::{
        create_time_stamp_request, parse_time_stamp_response, send_time_stamp_request,
        time_stamp_message, validate_response, TimeStampOptions, TimeStampResponse, TimestampInfo,
    },
    validation::{
        RevocationData, ValidationOptions, ValidationResult, ValidationSession, ValidationSource,
    },
};

use thiserror::Error;

/// Unified error type for timestamp protocol operations.
#[derive(Debug, Error)]
pub enum TimeStampError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request deadline expired")]
    Timeout,

    #[error("network failure after {attempts} attempts: {message}")]
    Network { attempts: u32, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("time-stamping authority refused the request: {0}")]
    TsaStatus(String),

    #[error("nonce mismatch between request and response")]
    NonceMismatch,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("error generating random data")]
    Random,

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("message digest mismatch")]
    DigestMismatch,

    #[error("signing certificate not found in token")]
    CertificateNotFound,

    #[error("SignedAttributes structure is missing")]
    NoSignedAttributes,

    #[error("content-type attribute missing from SignedAttributes")]
    MissingSignedAttributeContentType,

    #[error("message-digest attribute missing from SignedAttributes")]
    MissingSignedAttributeMessageDigest,

    #[error("{0} attribute in SignedAttributes is malformed")]
    MalformedSignedAttribute(&'static str),

    #[error("signer info using subject key identifier is not supported")]
    SubjectKeyIdentifierUnsupported,

    #[error("certificate decode error: {0}")]
    CertificateDecode(String),

    #[error("PEM error: {0}")]
    Pem(#[from] pem::PemError),

    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("validation session already started: queue after start")]
    QueueAfterStart,
}

impl From<bcder::decode::DecodeError<std::convert::Infallible>> for TimeStampError {
    fn from(e: bcder::decode::DecodeError<std::convert::Infallible>) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OCSP request construction and response interpretation.

use {
    crate::{
        algorithm::DigestAlgorithm,
        asn1::{
            rfc5280::Extension,
            rfc6960::{
                BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse,
                OcspResponseStatus, SingleResponse, TbsRequest, OID_OCSP_BASIC_RESPONSE,
                OID_OCSP_NONCE,
            },
        },
        certificate::Certificate,
        TimeStampError,
    },
    bcder::{
        decode::{Constructed, IntoSource},
        encode::Values,
        Mode, OctetString, Oid,
    },
    bytes::Bytes,
    log::debug,
    ring::rand::{SecureRandom, SystemRandom},
};

/// Size of the nonce attached to OCSP requests.
const NONCE_LEN: usize = 8;

/// The revocation state reported for one certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertRevocationStatus {
    Good,
    Revoked {
        revocation_time: chrono::DateTime<chrono::Utc>,
    },
    Unknown,
}

/// A built OCSP request, ready for transport.
#[derive(Clone, Debug)]
pub struct OcspRequestData {
    /// The DER bytes to POST.
    pub der: Vec<u8>,

    /// The nonce attached to the request, when one was generated.
    pub nonce: Option<Vec<u8>>,

    /// Identifies the certificate being asked about.
    pub cert_id: CertId,
}

/// The interpreted contents of a successful OCSP response.
#[derive(Clone, Debug)]
pub struct OcspResponseInfo {
    pub status: CertRevocationStatus,
    pub this_update: chrono::DateTime<chrono::Utc>,
    pub next_update: Option<chrono::DateTime<chrono::Utc>>,
    pub produced_at: chrono::DateTime<chrono::Utc>,

    /// Whether the responder echoed our nonce. `None` when we sent no
    /// nonce or the responder did not reply with one. A missing or
    /// mismatched nonce lowers trust in freshness but does not itself
    /// invalidate the response.
    pub nonce_matched: Option<bool>,

    /// The complete response DER, for embedding into a DSS.
    pub raw: Vec<u8>,
}

/// Compute the CertID for a certificate relative to its issuer.
///
/// Hashes are SHA-1 over the issuer's subject name DER and the issuer's
/// public key bits, per RFC 6960 §4.1.1.
pub fn build_cert_id(cert: &Certificate, issuer: &Certificate) -> CertId {
    let sha1 = DigestAlgorithm::Sha1;

    CertId {
        hash_algorithm: sha1.into(),
        issuer_name_hash: OctetString::new(Bytes::from(
            sha1.digest_data(issuer.subject_name().as_slice()),
        )),
        issuer_key_hash: OctetString::new(Bytes::from(
            sha1.digest_data(issuer.public_key_data().as_ref()),
        )),
        serial_number: cert.serial_number().clone(),
    }
}

/// Build a DER OCSP request for a certificate.
///
/// A nonce extension is included by default so replayed responses can
/// be detected.
pub fn create_ocsp_request(
    cert: &Certificate,
    issuer: &Certificate,
    include_nonce: bool,
) -> Result<OcspRequestData, TimeStampError> {
    let cert_id = build_cert_id(cert, issuer);

    let nonce = if include_nonce {
        let mut nonce = vec![0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|_| TimeStampError::Random)?;

        Some(nonce)
    } else {
        None
    };

    let request_extensions = nonce
        .as_ref()
        .map(|nonce| {
            // The extension payload is the DER encoding of an OCTET
            // STRING holding the nonce, itself wrapped in the extnValue
            // OCTET STRING.
            let mut inner = Vec::new();
            OctetString::new(Bytes::copy_from_slice(nonce))
                .encode_ref()
                .write_encoded(Mode::Der, &mut inner)?;

            Ok::<_, std::io::Error>(
                [Extension {
                    id: Oid(Bytes::copy_from_slice(OID_OCSP_NONCE.as_ref())),
                    critical: None,
                    value: OctetString::new(Bytes::from(inner)),
                }]
                .into_iter()
                .collect(),
            )
        })
        .transpose()?;

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: None,
            request_list: vec![crate::asn1::rfc6960::Request {
                req_cert: cert_id.clone(),
                single_request_extensions: None,
            }],
            request_extensions,
        },
    };

    Ok(OcspRequestData {
        der: request.encode_der()?,
        nonce,
        cert_id,
    })
}

/// Parse and interpret an OCSP response.
///
/// A non-successful responseStatus is a structural failure: the
/// response carries no certificate status at all in that case.
pub fn parse_ocsp_response(
    data: &[u8],
    request: &OcspRequestData,
) -> Result<OcspResponseInfo, TimeStampError> {
    let response = OcspResponse::from_der(data)
        .map_err(|e| TimeStampError::InvalidResponse(format!("OCSP decode error: {}", e)))?;

    if response.response_status != OcspResponseStatus::Successful {
        return Err(TimeStampError::InvalidResponse(format!(
            "OCSP responder error: {} (code: {})",
            response.response_status, response.response_status as u8
        )));
    }

    let response_bytes = response.response_bytes.ok_or_else(|| {
        TimeStampError::InvalidResponse("successful OCSP response without responseBytes".into())
    })?;

    if response_bytes.response_type != OID_OCSP_BASIC_RESPONSE {
        return Err(TimeStampError::InvalidResponse(format!(
            "unsupported OCSP response type: {}",
            response_bytes.response_type
        )));
    }

    let basic = BasicOcspResponse::from_der(response_bytes.response.to_bytes().as_ref())
        .map_err(|e| TimeStampError::InvalidResponse(format!("BasicOCSPResponse: {}", e)))?;

    let single = select_single_response(&basic, &request.cert_id)?;

    let status = match &single.cert_status {
        CertStatus::Good => CertRevocationStatus::Good,
        CertStatus::Revoked(info) => CertRevocationStatus::Revoked {
            revocation_time: info.revocation_time.clone().into(),
        },
        CertStatus::Unknown => CertRevocationStatus::Unknown,
    };

    let nonce_matched = match (&request.nonce, basic.tbs_response_data.nonce()) {
        (Some(sent), Some(echoed)) => Some(nonces_equal(sent, echoed.as_ref())),
        (Some(_), None) => {
            debug!("OCSP responder did not echo the request nonce");
            None
        }
        (None, _) => None,
    };

    Ok(OcspResponseInfo {
        status,
        this_update: single.this_update.clone().into(),
        next_update: single.next_update.clone().map(Into::into),
        produced_at: basic.tbs_response_data.produced_at.clone().into(),
        nonce_matched,
        raw: data.to_vec(),
    })
}

/// Pick the SingleResponse matching the request's CertID, falling back
/// to the first entry when the responder doesn't echo the ID exactly.
fn select_single_response<'a>(
    basic: &'a BasicOcspResponse,
    cert_id: &CertId,
) -> Result<&'a SingleResponse, TimeStampError> {
    let responses = &basic.tbs_response_data.responses;

    responses
        .iter()
        .find(|single| single.cert_id.matches(cert_id))
        .or_else(|| responses.first())
        .ok_or_else(|| {
            TimeStampError::InvalidResponse("OCSP response contains no certificate status".into())
        })
}

/// Compare a sent nonce with the echoed extension payload.
///
/// The echoed bytes are the extnValue content, which proper responders
/// encode as an OCTET STRING wrapping the nonce. Some strip the
/// wrapper; accept both.
fn nonces_equal(sent: &[u8], echoed: &[u8]) -> bool {
    if echoed == sent {
        return true;
    }

    Constructed::decode(Bytes::copy_from_slice(echoed).into_source(), Mode::Der, |cons| {
        OctetString::take_from(cons)
    })
    .map(|inner| inner.to_bytes().as_ref() == sent)
    .unwrap_or(false)
}

/// Certificates the responder embedded alongside its signature.
pub fn embedded_certificates(
    basic: &BasicOcspResponse,
) -> Result<Vec<Certificate>, TimeStampError> {
    basic
        .certs
        .iter()
        .map(|cert| Certificate::from_parsed_asn1(cert.clone()))
        .collect()
}

#[cfg(test)]
mod test {
    use {super::*, bcder::Integer};

    /// OCSPResponse with responseStatus internalError(2) and no body.
    const INTERNAL_ERROR_RESPONSE: &[u8] = &[0x30, 0x03, 0x0a, 0x01, 0x02];

    fn dummy_request() -> OcspRequestData {
        OcspRequestData {
            der: Vec::new(),
            nonce: None,
            cert_id: CertId {
                hash_algorithm: DigestAlgorithm::Sha1.into(),
                issuer_name_hash: OctetString::new(Bytes::from_static(&[0u8; 20])),
                issuer_key_hash: OctetString::new(Bytes::from_static(&[0u8; 20])),
                serial_number: Integer::from(1),
            },
        }
    }

    #[test]
    fn internal_error_is_invalid_response() {
        let err = parse_ocsp_response(INTERNAL_ERROR_RESPONSE, &dummy_request()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Internal Error"), "{}", message);
        assert!(message.contains("code: 2"), "{}", message);
    }

    #[test]
    fn cert_status_tag_disambiguation() {
        // good [0]: primitive, empty.
        let der = [0x30, 0x02, 0x80, 0x00];
        let status = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            cons.take_sequence(CertStatus::take_from)
        })
        .unwrap();
        assert_eq!(status, CertStatus::Good);

        // revoked [1]: GeneralizedTime 20220129133742Z.
        let mut der = vec![0x30, 0x13, 0xa1, 0x11, 0x18, 0x0f];
        der.extend_from_slice(b"20220129133742Z");
        let status = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            cons.take_sequence(CertStatus::take_from)
        })
        .unwrap();
        assert!(matches!(status, CertStatus::Revoked(_)));

        // unknown [2].
        let der = [0x30, 0x02, 0x82, 0x00];
        let status = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            cons.take_sequence(CertStatus::take_from)
        })
        .unwrap();
        assert_eq!(status, CertStatus::Unknown);

        // Any other tag degrades to unknown.
        let der = [0x30, 0x02, 0x85, 0x00];
        let status = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            cons.take_sequence(CertStatus::take_from)
        })
        .unwrap();
        assert_eq!(status, CertStatus::Unknown);
    }

    #[test]
    fn nonce_comparison_accepts_both_encodings() {
        let nonce = [1u8, 2, 3, 4, 5, 6, 7, 8];

        // Raw echo.
        assert!(nonces_equal(&nonce, &nonce));

        // OCTET STRING wrapped echo.
        let mut wrapped = vec![0x04, 0x08];
        wrapped.extend_from_slice(&nonce);
        assert!(nonces_equal(&nonce, &wrapped));

        assert!(!nonces_equal(&nonce, &[9u8; 8]));
    }
}

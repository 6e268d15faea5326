// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ASN.1 types defined by RFC 6960 (Online Certificate Status Protocol).

Requests are built and serialized to strict DER; responses are decoded.
The signed request form (`optionalSignature`) is never produced and is
ignored on decode.
*/

use {
    crate::{
        asn1::rfc5280::{
            AlgorithmIdentifier, Certificate, CertificateSerialNumber, Extensions, Name, Version,
        },
        asn1time::GeneralizedTime,
    },
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode,
        encode::{PrimitiveContent, Values},
        ConstOid, Integer, Mode, OctetString, Oid, Tag,
    },
    std::io::Write,
};

/// Helper for encoding a slice of [`Request`]s without requiring the
/// borrowed item's lifetime to escape into a generic `Values` type
/// parameter (as `encode::slice` would require).
struct RequestListValues<'a>(&'a [Request]);

impl Values for RequestListValues<'_> {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.0.iter().map(|r| r.encode_ref().encoded_len(mode)).sum()
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.0
            .iter()
            .try_for_each(|r| r.encode_ref().write_encoded(mode, target))
    }
}

/// id-pkix-ocsp-basic: the BasicOCSPResponse response type.
///
/// 1.3.6.1.5.5.7.48.1.1
pub const OID_OCSP_BASIC_RESPONSE: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 48, 1, 1]);

/// id-pkix-ocsp-nonce: the OCSP nonce extension.
///
/// Not to be confused with the OCSP *access method* OID
/// `1.3.6.1.5.5.7.48.1` in [crate::asn1::rfc5280], of which this is a
/// child arc.
///
/// 1.3.6.1.5.5.7.48.1.2
pub const OID_OCSP_NONCE: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 48, 1, 2]);

/// OCSP request.
///
/// ```ASN.1
/// OCSPRequest ::= SEQUENCE {
///     tbsRequest         TBSRequest,
///     optionalSignature  [0] EXPLICIT Signature OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OcspRequest {
    pub tbs_request: TbsRequest,
}

impl OcspRequest {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let tbs_request = TbsRequest::take_from(cons)?;

            // An optional signature over the request may trail. We never
            // produce signed requests and do not interpret them.
            cons.capture_all()?;

            Ok(Self { tbs_request })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(self.tbs_request.encode_ref())
    }

    /// Serialize to DER, the form sent over the wire.
    pub fn encode_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut der = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// TBS request.
///
/// ```ASN.1
/// TBSRequest ::= SEQUENCE {
///     version             [0] EXPLICIT Version DEFAULT v1,
///     requestorName       [1] EXPLICIT GeneralName OPTIONAL,
///     requestList         SEQUENCE OF Request,
///     requestExtensions   [2] EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TbsRequest {
    pub version: Option<Version>,
    pub request_list: Vec<Request>,
    pub request_extensions: Option<Extensions>,
}

impl TbsRequest {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = cons.take_opt_constructed_if(Tag::CTX_0, Version::take_from)?;

            // requestorName carries no information we act on.
            cons.take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?;

            let request_list = cons.take_sequence(|cons| {
                let mut requests = Vec::new();

                while let Some(request) = Request::take_opt_from(cons)? {
                    requests.push(request);
                }

                Ok(requests)
            })?;

            let request_extensions =
                cons.take_opt_constructed_if(Tag::CTX_2, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                version,
                request_list,
                request_extensions,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version
                .as_ref()
                .map(|v| encode::Constructed::new(Tag::CTX_0, v.encode())),
            encode::sequence(RequestListValues(&self.request_list)),
            self.request_extensions
                .as_ref()
                .map(|exts| encode::Constructed::new(Tag::CTX_2, exts.encode_ref())),
        ))
    }
}

/// A single certificate status request.
///
/// ```ASN.1
/// Request ::= SEQUENCE {
///     reqCert                     CertID,
///     singleRequestExtensions     [0] EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub req_cert: CertId,
    pub single_request_extensions: Option<Extensions>,
}

impl Request {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let req_cert = CertId::take_from(cons)?;
            let single_request_extensions =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                req_cert,
                single_request_extensions,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.req_cert.encode_ref(),
            self.single_request_extensions
                .as_ref()
                .map(|exts| encode::Constructed::new(Tag::CTX_0, exts.encode_ref())),
        ))
    }
}

/// Certificate identifier.
///
/// ```ASN.1
/// CertID ::= SEQUENCE {
///     hashAlgorithm       AlgorithmIdentifier,
///     issuerNameHash      OCTET STRING, -- Hash of issuer's DN
///     issuerKeyHash       OCTET STRING, -- Hash of issuer's public key
///     serialNumber        CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertId {
    pub hash_algorithm: AlgorithmIdentifier,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: CertificateSerialNumber,
}

impl CertId {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let hash_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let issuer_name_hash = OctetString::take_from(cons)?;
            let issuer_key_hash = OctetString::take_from(cons)?;
            let serial_number = CertificateSerialNumber::take_from(cons)?;

            Ok(Self {
                hash_algorithm,
                issuer_name_hash,
                issuer_key_hash,
                serial_number,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            &self.hash_algorithm,
            self.issuer_name_hash.encode_ref(),
            self.issuer_key_hash.encode_ref(),
            (&self.serial_number).encode(),
        ))
    }

    /// Whether two CertIDs identify the same certificate.
    pub fn matches(&self, other: &CertId) -> bool {
        self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

/// OCSP response.
///
/// ```ASN.1
/// OCSPResponse ::= SEQUENCE {
///    responseStatus         OCSPResponseStatus,
///    responseBytes          [0] EXPLICIT ResponseBytes OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OcspResponse {
    pub response_status: OcspResponseStatus,
    pub response_bytes: Option<ResponseBytes>,
}

impl OcspResponse {
    /// Decode an OCSP response from DER data.
    pub fn from_der(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let response_status = OcspResponseStatus::take_from(cons)?;
            let response_bytes =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| ResponseBytes::take_from(cons))?;

            Ok(Self {
                response_status,
                response_bytes,
            })
        })
    }
}

/// OCSP response status.
///
/// ```ASN.1
/// OCSPResponseStatus ::= ENUMERATED {
///     successful            (0),  -- Response has valid confirmations
///     malformedRequest      (1),  -- Illegal confirmation request
///     internalError         (2),  -- Internal error in issuer
///     tryLater              (3),  -- Try again later
///                                 -- (4) is not used
///     sigRequired           (5),  -- Must sign the request
///     unauthorized          (6)   -- Request unauthorized }
/// ```
///
/// Some responders encode the status as a plain INTEGER instead of an
/// ENUMERATED; both encodings are accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

impl OcspResponseStatus {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let value = cons.take_primitive(|tag, prim| match tag {
            Tag::ENUMERATED | Tag::INTEGER => Integer::i8_from_primitive(prim),
            _ => Err(prim.content_err("expected ENUMERATED OCSPResponseStatus")),
        })?;

        match value {
            0 => Ok(Self::Successful),
            1 => Ok(Self::MalformedRequest),
            2 => Ok(Self::InternalError),
            3 => Ok(Self::TryLater),
            5 => Ok(Self::SigRequired),
            6 => Ok(Self::Unauthorized),
            _ => Err(cons.content_err("unexpected OCSPResponseStatus value")),
        }
    }
}

impl std::fmt::Display for OcspResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Successful => "Successful",
            Self::MalformedRequest => "Malformed Request",
            Self::InternalError => "Internal Error",
            Self::TryLater => "Try Later",
            Self::SigRequired => "Sig Required",
            Self::Unauthorized => "Unauthorized",
        })
    }
}

/// Response bytes.
///
/// ```ASN.1
/// ResponseBytes ::= SEQUENCE {
///     responseType   OBJECT IDENTIFIER,
///     response       OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseBytes {
    pub response_type: Oid,
    pub response: OctetString,
}

impl ResponseBytes {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let response_type = Oid::take_from(cons)?;
            let response = OctetString::take_from(cons)?;

            Ok(Self {
                response_type,
                response,
            })
        })
    }
}

/// Basic OCSP response.
///
/// ```ASN.1
/// BasicOCSPResponse ::= SEQUENCE {
///    tbsResponseData      ResponseData,
///    signatureAlgorithm   AlgorithmIdentifier,
///    signature            BIT STRING,
///    certs            [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicOcspResponse {
    pub tbs_response_data: ResponseData,
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature: bcder::BitString,
    pub certs: Vec<Certificate>,
}

impl BasicOcspResponse {
    /// Decode a BasicOCSPResponse from DER data.
    pub fn from_der(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let tbs_response_data = ResponseData::take_from(cons)?;
            let signature_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let signature = bcder::BitString::take_from(cons)?;

            let mut certs = Vec::new();
            cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                cons.take_sequence(|cons| {
                    while let Some(cert) = Certificate::take_opt_from(cons)? {
                        certs.push(cert);
                    }

                    Ok(())
                })
            })?;

            Ok(Self {
                tbs_response_data,
                signature_algorithm,
                signature,
                certs,
            })
        })
    }
}

/// Response data.
///
/// ```ASN.1
/// ResponseData ::= SEQUENCE {
///    version              [0] EXPLICIT Version DEFAULT v1,
///    responderID              ResponderID,
///    producedAt               GeneralizedTime,
///    responses                SEQUENCE OF SingleResponse,
///    responseExtensions   [1] EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseData {
    pub version: Option<Version>,
    pub responder_id: ResponderId,
    pub produced_at: GeneralizedTime,
    pub responses: Vec<SingleResponse>,
    pub response_extensions: Option<Extensions>,
}

impl ResponseData {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = cons.take_opt_constructed_if(Tag::CTX_0, Version::take_from)?;
            let responder_id = ResponderId::take_from(cons)?;
            let produced_at = GeneralizedTime::take_from(cons)?;

            let responses = cons.take_sequence(|cons| {
                let mut responses = Vec::new();

                while let Some(response) = SingleResponse::take_opt_from(cons)? {
                    responses.push(response);
                }

                Ok(responses)
            })?;

            let response_extensions =
                cons.take_opt_constructed_if(Tag::CTX_1, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                version,
                responder_id,
                produced_at,
                responses,
                response_extensions,
            })
        })
    }

    /// Locate the nonce extension value, if present.
    pub fn nonce(&self) -> Option<bytes::Bytes> {
        self.response_extensions
            .as_ref()
            .and_then(|exts| exts.find_by_oid(OID_OCSP_NONCE))
            .map(|ext| ext.value.to_bytes())
    }
}

/// Responder identifier.
///
/// ```ASN.1
/// ResponderID ::= CHOICE {
///    byName               [1] Name,
///    byKey                [2] KeyHash }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResponderId {
    ByName(Name),
    ByKey(OctetString),
}

impl ResponderId {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        if let Some(name) = cons.take_opt_constructed_if(Tag::CTX_1, |cons| Name::take_from(cons))? {
            Ok(Self::ByName(name))
        } else if let Some(key_hash) =
            cons.take_opt_constructed_if(Tag::CTX_2, |cons| OctetString::take_from(cons))?
        {
            Ok(Self::ByKey(key_hash))
        } else {
            Err(cons.content_err("expected ResponderID choice"))
        }
    }
}

/// A single certificate status.
///
/// ```ASN.1
/// SingleResponse ::= SEQUENCE {
///    certID                       CertID,
///    certStatus                   CertStatus,
///    thisUpdate                   GeneralizedTime,
///    nextUpdate         [0]       EXPLICIT GeneralizedTime OPTIONAL,
///    singleExtensions   [1]       EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: CertStatus,
    pub this_update: GeneralizedTime,
    pub next_update: Option<GeneralizedTime>,
    pub single_extensions: Option<Extensions>,
}

impl SingleResponse {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let cert_id = CertId::take_from(cons)?;
            let cert_status = CertStatus::take_from(cons)?;
            let this_update = GeneralizedTime::take_from(cons)?;
            let next_update = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| GeneralizedTime::take_from(cons))?;
            let single_extensions =
                cons.take_opt_constructed_if(Tag::CTX_1, |cons| Extensions::take_from(cons))?;

            Ok(Self {
                cert_id,
                cert_status,
                this_update,
                next_update,
                single_extensions,
            })
        })
    }
}

/// Certificate status.
///
/// ```ASN.1
/// CertStatus ::= CHOICE {
///     good        [0]     IMPLICIT NULL,
///     revoked     [1]     IMPLICIT RevokedInfo,
///     unknown     [2]     IMPLICIT UnknownInfo }
/// ```
///
/// Disambiguation is by the implicit context tag number. Any tag other
/// than 0 or 1, and any structural surprise under tag 2, resolves to
/// `Unknown` rather than a decode failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertStatus {
    Good,
    Revoked(RevokedInfo),
    Unknown,
}

impl CertStatus {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        if cons
            .take_opt_primitive_if(Tag::CTX_0, |prim| prim.skip_all())?
            .is_some()
        {
            return Ok(Self::Good);
        }

        if let Some(revoked) =
            cons.take_opt_constructed_if(Tag::CTX_1, |cons| RevokedInfo::from_sequence(cons))?
        {
            return Ok(Self::Revoked(revoked));
        }

        // Tag 2 is unknown by definition; anything else degrades to
        // unknown as well. Consume the value either way.
        cons.capture_one()?;

        Ok(Self::Unknown)
    }
}

/// Revocation details for a revoked certificate.
///
/// ```ASN.1
/// RevokedInfo ::= SEQUENCE {
///     revocationTime              GeneralizedTime,
///     revocationReason    [0]     EXPLICIT CRLReason OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevokedInfo {
    pub revocation_time: GeneralizedTime,
    pub revocation_reason: Option<i8>,
}

impl RevokedInfo {
    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let revocation_time = GeneralizedTime::take_from(cons)?;
        let revocation_reason = cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
            cons.take_primitive(|_, prim| Integer::i8_from_primitive(prim))
        })?;

        Ok(Self {
            revocation_time,
            revocation_reason,
        })
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level X.509 certificate handling.

use {
    crate::{
        asn1::rfc5280::{
            self, Extension, OID_ACCESS_METHOD_CA_ISSUERS, OID_ACCESS_METHOD_OCSP,
            OID_AUTHORITY_INFO_ACCESS, OID_EXTENSION_AUTHORITY_KEY_ID,
            OID_EXTENSION_CRL_DISTRIBUTION_POINTS, OID_EXTENSION_SUBJECT_KEY_ID,
        },
        TimeStampError,
    },
    bcder::{
        decode::{Constructed, Source},
        Mode, OctetString, Oid, Tag,
    },
    bytes::Bytes,
    std::fmt::{Debug, Formatter},
};

/// An X.509 certificate together with the exact encoding it came from.
///
/// Certificates pass through this system unmodified: they are pulled
/// out of timestamp tokens, hashed into OCSP CertIDs, and re-embedded
/// into Document Security Stores. Keeping the original DER around makes
/// all of that lossless even when the source encoding was BER.
#[derive(Clone)]
pub struct Certificate {
    raw: Vec<u8>,
    inner: rfc5280::Certificate,
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Certificate");
        s.field("serial_number", &self.serial_number_hex());
        s.field("issuer", &self.inner.tbs_certificate.issuer);
        s.field("subject", &self.inner.tbs_certificate.subject);
        s.finish()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Construct an instance from DER (or BER) encoded data.
    pub fn from_der(data: impl Into<Vec<u8>>) -> Result<Self, TimeStampError> {
        let raw = data.into();

        let inner = Constructed::decode(raw.as_slice(), Mode::Ber, |cons| {
            rfc5280::Certificate::take_from(cons)
        })
        .map_err(|e| TimeStampError::CertificateDecode(e.to_string()))?;

        Ok(Self { raw, inner })
    }

    /// Construct an instance from PEM data with a `CERTIFICATE` tag.
    pub fn from_pem(data: impl AsRef<[u8]>) -> Result<Self, TimeStampError> {
        let pem = pem::parse(data.as_ref())?;

        if pem.tag == "CERTIFICATE" {
            Self::from_der(pem.contents)
        } else {
            Err(TimeStampError::CertificateDecode(format!(
                "unexpected PEM tag: {}",
                pem.tag
            )))
        }
    }

    /// Construct instances from PEM data possibly containing multiple
    /// certificates.
    pub fn from_pem_multiple(data: impl AsRef<[u8]>) -> Result<Vec<Self>, TimeStampError> {
        pem::parse_many(data.as_ref())?
            .into_iter()
            .filter(|pem| pem.tag == "CERTIFICATE")
            .map(|pem| Self::from_der(pem.contents))
            .collect()
    }

    /// Construct an instance from an already parsed ASN.1 certificate.
    ///
    /// The certificate is re-serialized to DER to obtain backing data.
    pub fn from_parsed_asn1(cert: rfc5280::Certificate) -> Result<Self, TimeStampError> {
        let mut raw = Vec::new();
        bcder::encode::Values::write_encoded(&cert.encode_ref(), Mode::Der, &mut raw)
            .map_err(|e| TimeStampError::CertificateDecode(e.to_string()))?;

        Ok(Self { raw, inner: cert })
    }

    /// The encoding this certificate was constructed from.
    pub fn encode_der(&self) -> &[u8] {
        &self.raw
    }

    pub fn as_asn1(&self) -> &rfc5280::Certificate {
        &self.inner
    }

    pub fn serial_number(&self) -> &bcder::Integer {
        &self.inner.tbs_certificate.serial_number
    }

    /// The serial number as lowercase hex of its big-endian bytes.
    pub fn serial_number_hex(&self) -> String {
        hex::encode(self.inner.tbs_certificate.serial_number.as_slice())
    }

    pub fn issuer_name(&self) -> &rfc5280::Name {
        &self.inner.tbs_certificate.issuer
    }

    pub fn subject_name(&self) -> &rfc5280::Name {
        &self.inner.tbs_certificate.subject
    }

    /// The DER bytes of the subject public key, as carried in the
    /// BIT STRING (without the unused-bits octet).
    pub fn public_key_data(&self) -> Bytes {
        self.inner
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .octet_bytes()
    }

    pub fn validity(&self) -> &rfc5280::Validity {
        &self.inner.tbs_certificate.validity
    }

    fn find_extension(&self, oid: bcder::ConstOid) -> Option<&Extension> {
        self.inner
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|exts| exts.find_by_oid(oid))
    }

    /// The OCSP responder URI from the Authority Information Access
    /// extension, if advertised.
    ///
    /// Matches the access-method OID 1.3.6.1.5.5.7.48.1.
    pub fn ocsp_responder_url(&self) -> Option<String> {
        self.access_descriptions()
            .into_iter()
            .find(|(method, _)| *method == OID_ACCESS_METHOD_OCSP)
            .map(|(_, uri)| uri)
    }

    /// All CA-issuers URIs from the Authority Information Access
    /// extension.
    pub fn ca_issuers_urls(&self) -> Vec<String> {
        self.access_descriptions()
            .into_iter()
            .filter(|(method, _)| *method == OID_ACCESS_METHOD_CA_ISSUERS)
            .map(|(_, uri)| uri)
            .collect()
    }

    fn access_descriptions(&self) -> Vec<(Oid, String)> {
        let ext = match self.find_extension(OID_AUTHORITY_INFO_ACCESS) {
            Some(ext) => ext,
            None => return Vec::new(),
        };

        ext.decode_value(|cons| {
            cons.take_sequence(|cons| {
                let mut descriptions = Vec::new();

                while let Some(entry) = cons.take_opt_sequence(|cons| {
                    let method = Oid::take_from(cons)?;
                    let uri = take_opt_uri(cons)?;

                    // A non-URI accessLocation remains unread; swallow
                    // it so the sequence closes cleanly.
                    cons.capture_all()?;

                    Ok((method, uri))
                })? {
                    if let (method, Some(uri)) = entry {
                        descriptions.push((method, uri));
                    }
                }

                Ok(descriptions)
            })
        })
        .unwrap_or_default()
    }

    /// All distribution URIs from the CRL Distribution Points extension.
    pub fn crl_distribution_urls(&self) -> Vec<String> {
        let ext = match self.find_extension(OID_EXTENSION_CRL_DISTRIBUTION_POINTS) {
            Some(ext) => ext,
            None => return Vec::new(),
        };

        ext.decode_value(|cons| {
            cons.take_sequence(|cons| {
                let mut urls = Vec::new();

                while cons
                    .take_opt_sequence(|cons| {
                        // distributionPoint [0], wrapping the
                        // DistributionPointName choice.
                        cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                            // fullName [0] IMPLICIT GeneralNames.
                            cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                                while let Some(uri) = take_opt_uri(cons)? {
                                    urls.push(uri);
                                }

                                Ok(())
                            })?;

                            // nameRelativeToCRLIssuer carries no URI.
                            cons.capture_all()?;

                            Ok(())
                        })?;

                        // reasons and cRLIssuer are not interpreted.
                        cons.capture_all()?;

                        Ok(())
                    })?
                    .is_some()
                {}

                Ok(urls)
            })
        })
        .unwrap_or_default()
    }

    /// The Subject Key Identifier extension payload, if present.
    pub fn subject_key_identifier(&self) -> Option<Bytes> {
        self.find_extension(OID_EXTENSION_SUBJECT_KEY_ID)?
            .decode_value(|cons| OctetString::take_from(cons))
            .ok()
            .map(|os| os.to_bytes())
    }

    /// The keyIdentifier field of the Authority Key Identifier
    /// extension, if present.
    pub fn authority_key_identifier(&self) -> Option<Bytes> {
        self.find_extension(OID_EXTENSION_AUTHORITY_KEY_ID)?
            .decode_value(|cons| {
                cons.take_sequence(|cons| {
                    let key_id =
                        cons.take_opt_primitive_if(Tag::CTX_0, |prim| prim.take_all())?;

                    // authorityCertIssuer / authorityCertSerialNumber.
                    cons.capture_all()?;

                    Ok(key_id)
                })
            })
            .ok()
            .flatten()
    }

    /// Whether `issuer` plausibly issued this certificate.
    ///
    /// The issuer DN must equal the candidate's subject DN. When both
    /// key identifier extensions are present they must agree as well,
    /// which disambiguates issuers that share a subject name.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        if self.issuer_name() != issuer.subject_name() {
            return false;
        }

        match (self.authority_key_identifier(), issuer.subject_key_identifier()) {
            (Some(aki), Some(ski)) => aki == ski,
            _ => true,
        }
    }

    /// Whether subject and issuer DN are identical.
    pub fn is_self_issued(&self) -> bool {
        self.issuer_name() == self.subject_name()
    }

    /// Verify this certificate's signature against an issuer's key.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<(), TimeStampError> {
        let algorithm = crate::algorithm::SignatureAlgorithm::try_from(
            &self.inner.signature_algorithm.algorithm,
        )?;

        let tbs = self
            .inner
            .tbs_certificate
            .raw_data
            .as_ref()
            .ok_or_else(|| {
                TimeStampError::CertificateDecode("certificate lacks raw TBS data".to_string())
            })?;

        ring::signature::UnparsedPublicKey::new(
            algorithm.as_verification_algorithm(),
            issuer.public_key_data().to_vec(),
        )
        .verify(tbs, self.inner.signature.octet_bytes().as_ref())
        .map_err(|_| TimeStampError::SignatureVerification)
    }
}

/// Read an optional uniformResourceIdentifier GeneralName alternative,
/// skipping over other alternatives until one is found or the content
/// is exhausted.
///
/// URIs are `[6] IMPLICIT IA5String`. The other GeneralName forms are
/// consumed tag-agnostically: rfc822Name, dNSName, iPAddress and
/// registeredID arrive primitive, the rest constructed.
fn take_opt_uri<S: Source>(
    cons: &mut Constructed<S>,
) -> Result<Option<String>, bcder::decode::DecodeError<S::Error>> {
    loop {
        if let Some(uri) = cons.take_opt_primitive_if(Tag::CTX_6, |prim| {
            let data = prim.take_all()?;

            String::from_utf8(data.to_vec()).map_err(|_| prim.content_err("non-ASCII URI"))
        })? {
            return Ok(Some(uri));
        }

        if cons
            .take_opt_primitive(|_, prim| prim.skip_all())?
            .is_some()
        {
            continue;
        }

        if cons
            .take_opt_constructed(|_, inner| inner.capture_all().map(|_| ()))?
            .is_some()
        {
            continue;
        }

        return Ok(None);
    }
}

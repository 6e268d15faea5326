// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long-term archival: re-cover an already timestamped document.
//!
//! The drill for extending a document's validity: verify what's there,
//! gather validation data for the existing tokens while their
//! certificates are still resolvable, write it into the Document
//! Security Store, then apply a fresh timestamp covering all of it.

use {
    crate::{
        dss,
        error::PdfTimestampError,
        extract::{extract_timestamps, verify_timestamp, SignatureState, VerifyOptions},
        timestamp::{timestamp_pdf, TimestampOptions, TimestampOutcome},
    },
    log::{info, warn},
    timestamp_protocol::{
        HttpRevocationFetcher, MemoryRevocationCache, RevocationData, ValidationOptions,
        ValidationSession,
    },
};

/// Inputs for an archival pass.
#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    /// Settings for the fresh covering timestamp.
    pub timestamp: TimestampOptions,

    /// Fetch current revocation data for the existing timestamps'
    /// certificates instead of embedding only what the tokens carry.
    pub refresh_revocation: bool,
}

/// A completed archival pass.
#[derive(Clone, Debug)]
pub struct ArchiveOutcome {
    pub pdf: Vec<u8>,

    /// How many existing timestamps were verified.
    pub existing_verified: usize,

    /// The covering timestamp that was applied.
    pub covering: TimestampOutcome,
}

/// Re-timestamp a document for long-term archival.
pub fn archive_pdf(pdf: &[u8], options: &ArchiveOptions) -> Result<ArchiveOutcome, PdfTimestampError> {
    // (a) Every existing timestamp must still verify; archiving a
    // broken document would only preserve the breakage.
    let records = extract_timestamps(pdf)?;

    if records.is_empty() {
        return Err(PdfTimestampError::VerificationFailed(
            "document carries no timestamp to archive".to_string(),
        ));
    }

    let mut collected = RevocationData::default();
    let mut verified = 0usize;

    for record in records {
        let field = record.field_name.clone().unwrap_or_default();
        let record = verify_timestamp(pdf, record, &VerifyOptions {
            check_document_hash: true,
            ..VerifyOptions::default()
        });

        if record.state != SignatureState::VerifiedOk {
            return Err(PdfTimestampError::VerificationFailed(format!(
                "existing timestamp {:?} does not verify: {}",
                field,
                record
                    .verification_error
                    .unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        verified += 1;

        // (b) Harvest the token's certificates, and current revocation
        // data for them when refreshing.
        if options.refresh_revocation {
            collected.merge(refresh_for(&record.certificates, options)?);
        } else {
            for cert in &record.certificates {
                collected.merge(RevocationData {
                    certificates: vec![cert.encode_der().to_vec()],
                    crls: Vec::new(),
                    ocsps: Vec::new(),
                });
            }
        }
    }

    info!(
        "archiving: {} existing timestamp(s) verified, {} certificates collected",
        verified,
        collected.certificates.len()
    );

    // (c) Merge into the Document Security Store.
    let with_dss = dss::embed_validation_data(pdf, &collected)?;

    // (d) Fresh covering timestamp, itself with validation data. At
    // the moment its token is embedded it covers every prior revision
    // including the store written above.
    let mut covering_options = options.timestamp.clone();
    covering_options.enable_ltv = true;

    let covering = timestamp_pdf(&with_dss, &covering_options)?;

    Ok(ArchiveOutcome {
        pdf: covering.pdf.clone(),
        existing_verified: verified,
        covering,
    })
}

/// Fetch current revocation data for a token's certificate chain.
fn refresh_for(
    certificates: &[timestamp_protocol::Certificate],
    options: &ArchiveOptions,
) -> Result<RevocationData, PdfTimestampError> {
    if certificates.is_empty() {
        return Ok(RevocationData::default());
    }

    let fetcher = HttpRevocationFetcher::new(options.timestamp.tsa.timeout)
        .map_err(PdfTimestampError::Protocol)?;
    let cache = MemoryRevocationCache::new();

    let mut session =
        ValidationSession::new(&fetcher, &cache, &[], ValidationOptions::default());

    session
        .queue_chain(certificates)
        .map_err(PdfTimestampError::Protocol)?;

    let results = session.validate_all().map_err(PdfTimestampError::Protocol)?;

    for result in &results {
        if !result.is_valid {
            warn!(
                "archival refresh left certificate {} unresolved: {}",
                result.certificate.serial_number_hex(),
                result.errors.join("; ")
            );
        }
    }

    Ok(session.into_revocation_data())
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::minimal_pdf};

    #[test]
    fn archiving_requires_an_existing_timestamp() {
        let options = ArchiveOptions {
            timestamp: TimestampOptions::default(),
            refresh_revocation: false,
        };

        let result = archive_pdf(&minimal_pdf(), &options);

        assert!(matches!(
            result,
            Err(PdfTimestampError::VerificationFailed(_))
        ));
    }
}

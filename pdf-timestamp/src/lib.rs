// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Trusted timestamps for PDF documents.

This crate adds, extracts, and verifies RFC 3161 timestamps inside PDF
files, producing output that stays valid under the PAdES B-T and LTA
long-term profiles:

* A timestamped document differs from its input only by appended
  incremental revisions; every original byte survives verbatim, so
  existing signatures keep verifying.
* Timestamping reserves a zero-filled `/Contents` placeholder, computes
  a byte-exact `/ByteRange`, obtains a token over the covered bytes
  from a TSA, and substitutes it without changing the file length.
* Long-term validation data (certificates, CRLs, OCSP responses) can be
  embedded as a Document Security Store with per-signature VRI entries,
  and whole documents can be re-covered for archival.

The protocol machinery (ASN.1, TSA client, revocation engine) lives in
the companion `timestamp-protocol` crate.
*/

pub mod archive;
pub mod dss;
pub mod embed;
pub mod error;
pub mod extract;
pub mod pdf;
pub mod prepare;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testutil;

pub use {
    archive::{archive_pdf, ArchiveOptions, ArchiveOutcome},
    dss::embed_validation_data,
    embed::embed_token,
    error::PdfTimestampError,
    extract::{
        extract_timestamps, parse_pdf_date, verify_timestamp, PdfTimestamp, SignatureState,
        VerifyOptions,
    },
    prepare::{prepare_timestamp_placeholder, PrepareOptions, PreparedPdf},
    timestamp::{
        timestamp_pdf, timestamp_pdf_multiple, TimestampOptions, TimestampOutcome,
        DEFAULT_SIGNATURE_SIZE, LTV_DEFAULT_SIGNATURE_SIZE, MAX_SIGNATURE_SIZE,
    },
};

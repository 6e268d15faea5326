// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction and verification of document timestamps.

use {
    crate::{
        error::PdfTimestampError,
        pdf::{Object, PdfDocument},
        prepare::extract_bytes_from_range,
    },
    chrono::TimeZone,
    log::{debug, warn},
    timestamp_protocol::{time_stamp::token_info, Certificate, SignedData, TimestampInfo},
};

type Result<T> = std::result::Result<T, PdfTimestampError>;

/// Lifecycle of one document timestamp.
///
/// Only `VerifiedOk` asserts cryptographic integrity; `Embedded` means
/// the token merely parses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureState {
    Embedded,
    VerifiedOk,
    VerifiedFail,
}

/// One `ETSI.RFC3161` signature pulled out of a document.
#[derive(Clone, Debug)]
pub struct PdfTimestamp {
    pub field_name: Option<String>,

    /// The token DER, trimmed of placeholder padding.
    pub token: Vec<u8>,

    /// The raw Contents value including padding, as covered by VRI
    /// keys.
    pub contents: Vec<u8>,

    pub byte_range: [usize; 4],
    pub covers_whole_document: bool,

    pub info: TimestampInfo,

    pub modification_time: Option<chrono::DateTime<chrono::Utc>>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,

    pub state: SignatureState,
    pub verification_error: Option<String>,
    pub certificates: Vec<Certificate>,
}

/// Verification tunables.
#[derive(Clone, Debug, Default)]
pub struct VerifyOptions {
    /// Anchors for an X.509 chain check. Empty disables chaining.
    pub trust_store: Vec<Certificate>,

    /// Require an ESS signing-certificate{,-v2} signed attribute.
    pub strict_ess: bool,

    /// Re-hash the ByteRange and compare against the imprint.
    pub check_document_hash: bool,
}

/// Walk the form fields and extract every RFC 3161 timestamp.
pub fn extract_timestamps(pdf: &[u8]) -> Result<Vec<PdfTimestamp>> {
    let doc = PdfDocument::load(pdf)?;

    let mut found = Vec::new();

    for (field_name, sig_dict) in signature_dictionaries(&doc) {
        let sub_filter = sig_dict
            .get("SubFilter")
            .map(|value| doc.resolve(value))
            .and_then(Object::as_name)
            .unwrap_or_default();

        if !sub_filter.contains("ETSI.RFC3161") {
            debug!("skipping non-timestamp signature ({})", sub_filter);
            continue;
        }

        let contents = match sig_dict
            .get("Contents")
            .map(|value| doc.resolve(value))
            .and_then(Object::as_string)
        {
            Some(string) => string.as_bytes().to_vec(),
            None => {
                warn!("timestamp field without /Contents");
                continue;
            }
        };

        if contents.iter().all(|b| *b == 0) {
            warn!("skipping unfilled signature placeholder");
            continue;
        }

        let byte_range = match read_byte_range(&doc, sig_dict.get("ByteRange")) {
            Some(byte_range) => byte_range,
            None => {
                warn!("timestamp field without a usable /ByteRange");
                continue;
            }
        };

        let token = trim_der(&contents).to_vec();

        let info = match token_info(&token) {
            Ok(info) => info,
            Err(e) => {
                warn!("unparseable timestamp token: {}", e);
                continue;
            }
        };

        let covers_whole_document = byte_range[2] + byte_range[3] == pdf.len();

        let date_of = |key: &str| {
            sig_dict
                .get(key)
                .map(|value| doc.resolve(value))
                .and_then(Object::as_string)
                .and_then(|s| parse_pdf_date(&String::from_utf8_lossy(s.as_bytes())))
        };
        let text_of = |key: &str| {
            sig_dict
                .get(key)
                .map(|value| doc.resolve(value))
                .and_then(Object::as_string)
                .map(|s| String::from_utf8_lossy(s.as_bytes()).into_owned())
        };

        found.push(PdfTimestamp {
            field_name,
            token,
            contents,
            byte_range,
            covers_whole_document,
            info,
            modification_time: date_of("M"),
            reason: text_of("Reason"),
            location: text_of("Location"),
            contact_info: text_of("ContactInfo"),
            state: SignatureState::Embedded,
            verification_error: None,
            certificates: Vec::new(),
        });
    }

    Ok(found)
}

/// All signature dictionaries reachable from the AcroForm, with field
/// names.
fn signature_dictionaries(doc: &PdfDocument) -> Vec<(Option<String>, crate::pdf::Dictionary)> {
    let mut found = Vec::new();

    let catalog = match doc.catalog() {
        Ok(catalog) => catalog,
        Err(_) => return found,
    };

    let fields = catalog
        .get("AcroForm")
        .map(|form| doc.resolve(form))
        .and_then(Object::as_dict)
        .and_then(|form| form.get("Fields"))
        .map(|fields| doc.resolve(fields))
        .and_then(Object::as_array);

    let fields = match fields {
        Some(fields) => fields,
        None => return found,
    };

    for field in fields {
        let field_dict = match doc.resolve(field).as_dict() {
            Some(dict) => dict,
            None => continue,
        };

        if field_dict
            .get("FT")
            .map(|ft| doc.resolve(ft))
            .and_then(Object::as_name)
            != Some("Sig")
        {
            continue;
        }

        let field_name = field_dict
            .get("T")
            .map(|t| doc.resolve(t))
            .and_then(Object::as_string)
            .map(|s| String::from_utf8_lossy(s.as_bytes()).into_owned());

        let value = match field_dict.get("V").map(|v| doc.resolve(v)).and_then(Object::as_dict)
        {
            Some(dict) => dict,
            None => continue,
        };

        found.push((field_name, value.clone()));
    }

    found
}

/// The raw Contents bytes of every timestamp signature, for VRI keying.
pub(crate) fn signature_contents(doc: &PdfDocument) -> Vec<Vec<u8>> {
    signature_dictionaries(doc)
        .into_iter()
        .filter(|(_, dict)| {
            dict.get("SubFilter")
                .map(|value| doc.resolve(value))
                .and_then(Object::as_name)
                .map(|name| name.contains("ETSI.RFC3161"))
                .unwrap_or(false)
        })
        .filter_map(|(_, dict)| {
            dict.get("Contents")
                .map(|value| doc.resolve(value))
                .and_then(Object::as_string)
                .map(|s| s.as_bytes().to_vec())
        })
        .filter(|contents| contents.iter().any(|b| *b != 0))
        .collect()
}

fn read_byte_range(doc: &PdfDocument, value: Option<&Object>) -> Option<[usize; 4]> {
    let array = value.map(|v| doc.resolve(v))?.as_array()?;

    if array.len() != 4 {
        return None;
    }

    let mut out = [0usize; 4];
    for (slot, object) in out.iter_mut().zip(array) {
        let value = doc.resolve(object).as_integer()?;
        if value < 0 {
            return None;
        }
        *slot = value as usize;
    }

    Some(out)
}

/// Cut DER padding: the placeholder is zero-filled beyond the token.
///
/// Reads the outer tag-length header and slices to the encoded length.
/// Indefinite or malformed headers fall back to the full input, which
/// the token parser will then reject with a precise error.
fn trim_der(data: &[u8]) -> &[u8] {
    if data.len() < 2 || data[0] != 0x30 {
        return data;
    }

    let first = data[1];

    let (header_len, content_len) = if first < 0x80 {
        (2usize, first as usize)
    } else {
        let length_bytes = (first & 0x7f) as usize;

        if length_bytes == 0 || length_bytes > 4 || data.len() < 2 + length_bytes {
            return data;
        }

        let content_len = data[2..2 + length_bytes]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));

        (2 + length_bytes, content_len)
    };

    match header_len.checked_add(content_len) {
        Some(total) if total <= data.len() => &data[..total],
        _ => data,
    }
}

/// Verify one extracted timestamp against the document bytes.
///
/// The record comes back with its state, certificates, and error
/// populated. A cryptographic failure is not an `Err`: it is a
/// `VerifiedFail` state carrying the reason.
pub fn verify_timestamp(
    pdf: &[u8],
    mut record: PdfTimestamp,
    options: &VerifyOptions,
) -> PdfTimestamp {
    match verify_inner(pdf, &mut record, options) {
        Ok(()) => {
            record.state = SignatureState::VerifiedOk;
            record.verification_error = None;
        }
        Err(e) => {
            record.state = SignatureState::VerifiedFail;
            record.verification_error = Some(e.to_string());
        }
    }

    record
}

fn verify_inner(
    pdf: &[u8],
    record: &mut PdfTimestamp,
    options: &VerifyOptions,
) -> Result<()> {
    // 1. The imprint must match the bytes the ByteRange covers.
    if options.check_document_hash {
        let [a, b, c, d] = record.byte_range;

        if c + d > pdf.len() {
            return Err(PdfTimestampError::VerificationFailed(
                "ByteRange exceeds document bounds".to_string(),
            ));
        }

        let hashed = record
            .info
            .hash_algorithm
            .digest_data(&extract_bytes_from_range(pdf, &[a, b, c, d]));

        if hex::encode(&hashed) != record.info.message_digest_hex.to_lowercase() {
            return Err(PdfTimestampError::VerificationFailed(
                "document hash mismatch against message imprint".to_string(),
            ));
        }
    }

    // 2. CMS-level verification of the token itself.
    let signed_data = SignedData::parse_ber(&record.token)
        .map_err(|e| PdfTimestampError::VerificationFailed(e.to_string()))?;

    record.certificates = signed_data.certificates().cloned().collect();

    let signer = signed_data.signers().next().ok_or_else(|| {
        PdfTimestampError::VerificationFailed("token carries no signer".to_string())
    })?;

    signer
        .verify_content_type_tst_info()
        .map_err(|e| PdfTimestampError::VerificationFailed(e.to_string()))?;

    signer
        .verify_message_digest_with_signed_data(&signed_data)
        .map_err(|e| PdfTimestampError::VerificationFailed(e.to_string()))?;

    signer
        .verify_signature_with_signed_data(&signed_data)
        .map_err(|e| PdfTimestampError::VerificationFailed(e.to_string()))?;

    // 3. Optional ESS attribute requirement.
    if options.strict_ess && !signer.has_signing_certificate_attribute() {
        return Err(PdfTimestampError::VerificationFailed(
            "signing-certificate attribute required but absent".to_string(),
        ));
    }

    // 4. Optional chain anchoring.
    if !options.trust_store.is_empty() {
        verify_chain(signer, &record.certificates, &options.trust_store)?;
    }

    Ok(())
}

/// Walk from the signing certificate toward a trust anchor, verifying
/// each issuer signature along the way.
fn verify_chain(
    signer: &timestamp_protocol::SignerInfo,
    certificates: &[Certificate],
    trust_store: &[Certificate],
) -> Result<()> {
    let (issuer_name, serial) = signer.certificate_issuer_and_serial();

    let mut current = certificates
        .iter()
        .find(|cert| cert.serial_number() == serial && cert.issuer_name() == issuer_name)
        .ok_or_else(|| {
            PdfTimestampError::VerificationFailed(
                "signing certificate not present in token".to_string(),
            )
        })?;

    for _ in 0..8 {
        // Anchored directly?
        if let Some(anchor) = trust_store
            .iter()
            .find(|anchor| current.is_issued_by(anchor))
        {
            return current.verify_signed_by(anchor).map_err(|_| {
                PdfTimestampError::VerificationFailed(
                    "signature by trust anchor does not verify".to_string(),
                )
            });
        }

        // Step to an intermediate within the token.
        let issuer = certificates
            .iter()
            .find(|candidate| *candidate != current && current.is_issued_by(candidate));

        match issuer {
            Some(issuer) => {
                current.verify_signed_by(issuer).map_err(|_| {
                    PdfTimestampError::VerificationFailed(
                        "intermediate certificate signature does not verify".to_string(),
                    )
                })?;
                current = issuer;
            }
            None => break,
        }
    }

    Err(PdfTimestampError::VerificationFailed(
        "certificate chain does not reach a trust anchor".to_string(),
    ))
}

/// Parse a PDF date string: `D:YYYYMMDDHHmmSS` followed by `Z`,
/// `+HH'mm'`, `-HH'mm'`, or nothing.
pub fn parse_pdf_date(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let text = text.strip_prefix("D:")?;

    if text.len() < 14 {
        return None;
    }

    let digits = &text[..14];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    let hour: u32 = digits[8..10].parse().ok()?;
    let minute: u32 = digits[10..12].parse().ok()?;
    let second: u32 = digits[12..14].parse().ok()?;

    let naive = chrono::NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?;

    let rest = &text[14..];

    let offset_seconds = match rest.as_bytes() {
        [] | [b'Z', ..] => 0i32,
        [sign @ (b'+' | b'-'), rest @ ..] => {
            let rest = std::str::from_utf8(rest).ok()?;

            // `HH'mm'`, with the minutes and quotes optional.
            let hours: i32 = rest.get(0..2)?.parse().ok()?;
            let minutes: i32 = match rest.get(3..5) {
                Some(minutes) if rest.as_bytes().get(2) == Some(&b'\'') => {
                    minutes.parse().ok()?
                }
                _ => 0,
            };

            let total = (hours * 60 + minutes) * 60;
            if *sign == b'+' {
                total
            } else {
                -total
            }
        }
        _ => return None,
    };

    let offset = chrono::FixedOffset::east_opt(offset_seconds)?;

    match offset.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&chrono::Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use {super::*, chrono::Timelike};

    #[test]
    fn pdf_date_utc_forms() {
        let parsed = parse_pdf_date("D:20240102030405Z").unwrap();
        assert_eq!(parsed.hour(), 3);

        let parsed = parse_pdf_date("D:20240102030405").unwrap();
        assert_eq!(parsed.minute(), 4);
    }

    #[test]
    fn pdf_date_offset_forms() {
        let parsed = parse_pdf_date("D:20240102030405+02'00'").unwrap();
        assert_eq!(parsed.hour(), 1);

        let parsed = parse_pdf_date("D:20240102030405-05'30'").unwrap();
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parsed.minute(), 34);
    }

    #[test]
    fn pdf_date_rejects_garbage() {
        assert!(parse_pdf_date("20240102030405Z").is_none());
        assert!(parse_pdf_date("D:2024").is_none());
        assert!(parse_pdf_date("D:2024010203040X").is_none());
    }

    #[test]
    fn trim_der_cuts_zero_padding() {
        // SEQUENCE of 3 content bytes, then placeholder padding.
        let mut data = vec![0x30, 0x03, 0x01, 0x02, 0x03];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(trim_der(&data), &data[..5]);

        // Long-form length.
        let mut data = vec![0x30, 0x82, 0x00, 0x03, 0x01, 0x02, 0x03];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(trim_der(&data), &data[..7]);

        // Truncated declarations fall back to the full slice.
        let data = vec![0x30, 0x05, 0x01];
        assert_eq!(trim_der(&data), &data[..]);
    }

    #[test]
    fn extract_skips_documents_without_forms() {
        let pdf = crate::testutil::minimal_pdf();
        assert!(extract_timestamps(&pdf).unwrap().is_empty());
    }
}

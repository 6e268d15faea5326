// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-place token embedding.

use {
    crate::{error::PdfTimestampError, prepare::PreparedPdf},
    log::debug,
};

/// Write the hex encoding of a DER token into a prepared placeholder.
///
/// The substitution touches only the hex interior of the Contents
/// literal and zero-pads the remainder, so the file length and every
/// byte covered by the ByteRange stay exactly as hashed. A token that
/// does not fit is reported as [PdfTimestampError::TokenTooLarge] so
/// the orchestrator can re-prepare with a larger placeholder.
pub fn embed_token(prepared: &PreparedPdf, token: &[u8]) -> Result<Vec<u8>, PdfTimestampError> {
    let token_hex = hex::encode(token);

    if token_hex.len() > prepared.placeholder_len {
        return Err(PdfTimestampError::TokenTooLarge {
            token_len: token.len(),
            placeholder_len: prepared.placeholder_len / 2,
        });
    }

    let mut bytes = prepared.bytes.clone();

    let start = prepared.contents_offset;
    bytes[start..start + token_hex.len()].copy_from_slice(token_hex.as_bytes());

    for byte in &mut bytes[start + token_hex.len()..start + prepared.placeholder_len] {
        *byte = b'0';
    }

    debug!(
        "embedded {} byte token into {} byte placeholder",
        token.len(),
        prepared.placeholder_len / 2
    );

    Ok(bytes)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            prepare::{prepare_timestamp_placeholder, PrepareOptions},
            testutil::minimal_pdf,
        },
    };

    #[test]
    fn embedding_preserves_length_and_hashed_bytes() {
        let pdf = minimal_pdf();
        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        let embedded = embed_token(&prepared, &[0xde, 0xad, 0xbe, 0xef]).unwrap();

        assert_eq!(embedded.len(), prepared.bytes.len());

        // The hex region carries the token followed by zero padding.
        let hex_region = &embedded
            [prepared.contents_offset..prepared.contents_offset + prepared.placeholder_len];
        assert!(hex_region.starts_with(b"deadbeef"));
        assert!(hex_region[8..].iter().all(|b| *b == b'0'));

        // Everything the ByteRange covers is untouched.
        assert_eq!(
            crate::prepare::extract_bytes_from_range(&embedded, &prepared.byte_range),
            prepared.bytes_to_hash()
        );
    }

    #[test]
    fn oversized_token_is_a_recoverable_kind() {
        let pdf = minimal_pdf();
        let prepared = prepare_timestamp_placeholder(
            &pdf,
            &PrepareOptions {
                signature_size: 16,
                ..PrepareOptions::default()
            },
        )
        .unwrap();

        let result = embed_token(&prepared, &[0xab; 17]);

        match result {
            Err(PdfTimestampError::TokenTooLarge {
                token_len,
                placeholder_len,
            }) => {
                assert_eq!(token_len, 17);
                assert_eq!(placeholder_len, 16);
            }
            other => panic!("expected TokenTooLarge, got {:?}", other.map(|_| ())),
        }
    }
}

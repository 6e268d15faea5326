// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Document Security Store writing.
//!
//! Validation data (certificates, CRLs, OCSP responses) is serialized
//! into one stream per DER artifact and installed as the catalog's
//! `/DSS` entry, with per-signature `/VRI` sub-dictionaries, via a
//! fresh incremental revision.

use {
    crate::{
        error::PdfTimestampError,
        extract,
        pdf::{Dictionary, Object, PdfDocument},
    },
    log::debug,
    timestamp_protocol::{DigestAlgorithm, RevocationData},
};

/// Append a DSS revision carrying `data` to `pdf`.
///
/// The document is always loaded fresh from the bytes passed in:
/// reusing a document instance across the timestamp revision and this
/// one desynchronizes the object counter and the `/Prev` chain, which
/// readers report as a damaged file. For the same reason the object
/// counter is lifted against the current bytes before anything is
/// registered.
pub fn embed_validation_data(
    pdf: &[u8],
    data: &RevocationData,
) -> Result<Vec<u8>, PdfTimestampError> {
    embed_inner(pdf, data).map_err(|e| match e {
        already @ PdfTimestampError::Ltv(_) => already,
        other => PdfTimestampError::Ltv(other.to_string()),
    })
}

fn embed_inner(pdf: &[u8], data: &RevocationData) -> Result<Vec<u8>, PdfTimestampError> {
    let mut doc = PdfDocument::load(pdf)?;
    doc.lift_object_counter(pdf);

    let cert_refs = register_streams(&mut doc, &data.certificates);
    let crl_refs = register_streams(&mut doc, &data.crls);
    let ocsp_refs = register_streams(&mut doc, &data.ocsps);

    debug!(
        "DSS carries {} certificates, {} CRLs, {} OCSP responses",
        cert_refs.len(),
        crl_refs.len(),
        ocsp_refs.len()
    );

    // One VRI entry per embedded timestamp, keyed by the hash of its
    // Contents bytes: SHA-1 by convention, SHA-256 for PDF 2.0.
    let vri_algorithm = if pdf.starts_with(b"%PDF-2") {
        DigestAlgorithm::Sha256
    } else {
        DigestAlgorithm::Sha1
    };

    let mut vri = Dictionary::new();

    for contents in extract::signature_contents(&doc) {
        let key = hex::encode(vri_algorithm.digest_data(&contents)).to_uppercase();

        let mut entry = Dictionary::new();
        entry.set("Cert", Object::Array(cert_refs.clone()));
        entry.set("CRL", Object::Array(crl_refs.clone()));
        entry.set("OCSP", Object::Array(ocsp_refs.clone()));
        entry.set(
            "TU",
            Object::literal_string(format!(
                "D:{}Z",
                chrono::Utc::now().format("%Y%m%d%H%M%S")
            )),
        );

        let entry_id = doc.register(Object::Dictionary(entry));
        vri.set(key, Object::reference(entry_id));
    }

    let vri_id = doc.register(Object::Dictionary(vri));

    let mut dss = Dictionary::new();
    dss.set("Certs", Object::Array(cert_refs));
    dss.set("CRLs", Object::Array(crl_refs));
    dss.set("OCSPs", Object::Array(ocsp_refs));
    dss.set("VRI", Object::reference(vri_id));

    let dss_id = doc.register(Object::Dictionary(dss));

    doc.catalog_mut()?.set("DSS", Object::reference(dss_id));
    let root_id = doc.root_id()?;
    doc.mark_for_save(root_id);

    doc.save_incremental(pdf)
}

fn register_streams(doc: &mut PdfDocument, artifacts: &[Vec<u8>]) -> Vec<Object> {
    artifacts
        .iter()
        .map(|der| Object::reference(doc.register_stream(der.clone())))
        .collect()
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            embed::embed_token,
            prepare::{prepare_timestamp_placeholder, PrepareOptions},
            testutil::minimal_pdf,
        },
    };

    fn revocation_fixture() -> RevocationData {
        RevocationData {
            certificates: vec![vec![0x30, 0x03, 0x02, 0x01, 0x01]],
            crls: vec![vec![0x30, 0x03, 0x02, 0x01, 0x02]],
            ocsps: vec![],
        }
    }

    #[test]
    fn dss_lands_in_catalog() {
        let pdf = minimal_pdf();

        let with_dss = embed_validation_data(&pdf, &revocation_fixture()).unwrap();

        assert!(with_dss.starts_with(&pdf));

        let doc = PdfDocument::load(&with_dss).unwrap();
        let catalog = doc.catalog().unwrap();
        let dss = doc
            .resolve(catalog.get("DSS").unwrap())
            .as_dict()
            .unwrap();

        for key in ["Certs", "CRLs", "OCSPs", "VRI"] {
            assert!(dss.has(key), "missing {}", key);
        }

        // The certificate stream carries the DER verbatim.
        let certs = doc
            .resolve(dss.get("Certs").unwrap())
            .as_array()
            .unwrap()
            .to_vec();
        assert_eq!(certs.len(), 1);
        match doc.resolve(&certs[0]) {
            Object::Stream(stream) => {
                assert_eq!(stream.data, vec![0x30, 0x03, 0x02, 0x01, 0x01])
            }
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn vri_keyed_by_contents_hash() {
        let pdf = minimal_pdf();

        let prepared = prepare_timestamp_placeholder(
            &pdf,
            &PrepareOptions {
                signature_size: 64,
                ..PrepareOptions::default()
            },
        )
        .unwrap();

        // A fake token is enough for keying: VRI hashes the whole
        // padded Contents value.
        let embedded = embed_token(&prepared, &[0x30, 0x03, 0x02, 0x01, 0x07]).unwrap();

        let with_dss = embed_validation_data(&embedded, &revocation_fixture()).unwrap();

        let doc = PdfDocument::load(&with_dss).unwrap();
        let contents_list = extract::signature_contents(&doc);
        assert_eq!(contents_list.len(), 1);

        let expected_key =
            hex::encode(DigestAlgorithm::Sha1.digest_data(&contents_list[0])).to_uppercase();

        let catalog = doc.catalog().unwrap();
        let dss = doc.resolve(catalog.get("DSS").unwrap()).as_dict().unwrap();
        let vri = doc.resolve(dss.get("VRI").unwrap()).as_dict().unwrap();

        assert!(vri.has(&expected_key), "missing VRI key {}", expected_key);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signature placeholder preparation.
//!
//! Timestamping a PDF happens in two phases: first a signature
//! dictionary with a zero-filled `/Contents` placeholder and an
//! oversized `/ByteRange` is appended as an incremental revision, then
//! the real values are patched into the emitted bytes in place. The
//! patches must preserve the file length exactly; the ByteRange and
//! the hash computed over it describe final byte positions.

use {
    crate::{
        error::PdfTimestampError,
        pdf::{Dictionary, Object, ObjectId, PdfDocument},
    },
    log::debug,
};

type Result<T> = std::result::Result<T, PdfTimestampError>;

/// Ten-digit stand-in for one ByteRange integer. Six of these reserve
/// comfortably more room than the four final integers need.
const BYTE_RANGE_PLACEHOLDER_INT: i64 = 1_111_111_111;

/// How many placeholder integers the provisional ByteRange carries.
const BYTE_RANGE_PLACEHOLDER_COUNT: usize = 6;

/// Minimum size of the tail window searched for the placeholder.
const PLACEHOLDER_SEARCH_TAIL: usize = 50 * 1024;

/// Inputs for placeholder preparation.
#[derive(Clone, Debug)]
pub struct PrepareOptions {
    /// Bytes reserved for the DER token.
    pub signature_size: usize,

    /// The signature field name.
    pub field_name: String,

    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,

    /// Leave out the `/M` (modification time) entry.
    pub omit_modification_time: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            signature_size: crate::timestamp::DEFAULT_SIGNATURE_SIZE,
            field_name: "Timestamp".to_string(),
            reason: None,
            location: None,
            contact_info: None,
            omit_modification_time: false,
        }
    }
}

/// A document ready to receive a timestamp token.
#[derive(Clone, Debug)]
pub struct PreparedPdf {
    /// The candidate bytes: the input image plus one incremental
    /// revision, ByteRange already patched to final values.
    pub bytes: Vec<u8>,

    /// `[0, b, c, d]`: the two signed regions. `b` is the offset of
    /// the `<` opening the Contents hex literal, `c` the offset just
    /// past the closing `>`.
    pub byte_range: [usize; 4],

    /// Offset of the first hex digit inside the Contents literal.
    pub contents_offset: usize,

    /// Hex characters reserved, i.e. twice the reserved byte count.
    pub placeholder_len: usize,
}

impl PreparedPdf {
    /// The concatenation of both ByteRange regions, the exact input to
    /// the message imprint hash.
    pub fn bytes_to_hash(&self) -> Vec<u8> {
        extract_bytes_from_range(&self.bytes, &self.byte_range)
    }
}

/// Slice the two regions a ByteRange describes out of an image.
pub fn extract_bytes_from_range(bytes: &[u8], byte_range: &[usize; 4]) -> Vec<u8> {
    let [a, b, c, d] = *byte_range;

    let mut out = Vec::with_capacity(b + d);
    out.extend_from_slice(&bytes[a..a + b]);
    out.extend_from_slice(&bytes[c..c + d]);

    out
}

/// Append a signature placeholder revision to `pdf`.
pub fn prepare_timestamp_placeholder(
    pdf: &[u8],
    options: &PrepareOptions,
) -> Result<PreparedPdf> {
    let signature_size = options.signature_size;

    let mut doc = PdfDocument::load(pdf)?;

    let sig_id = doc.register(Object::Dictionary(build_signature_dict(options)));
    let widget_id = register_widget(&mut doc, sig_id, &options.field_name)?;

    attach_to_acro_form(&mut doc, widget_id)?;
    attach_to_first_page(&mut doc, widget_id)?;

    // The catalog participates in every revision that changes the form.
    let root_id = doc.root_id()?;
    doc.mark_for_save(root_id);

    let mut bytes = doc.save_incremental(pdf)?;

    let placeholder_hex_len = signature_size * 2;

    let contents_open = locate_contents_placeholder(&bytes, placeholder_hex_len)
        .ok_or(PdfTimestampError::PlaceholderNotFound)?;

    let byte_range = [
        0,
        contents_open,
        contents_open + placeholder_hex_len + 2,
        bytes.len() - (contents_open + placeholder_hex_len + 2),
    ];

    patch_byte_range(&mut bytes, contents_open, &byte_range)?;

    debug!(
        "prepared placeholder: contents at {}, byte range {:?}",
        contents_open + 1,
        byte_range
    );

    Ok(PreparedPdf {
        bytes,
        byte_range,
        contents_offset: contents_open + 1,
        placeholder_len: placeholder_hex_len,
    })
}

/// The signature dictionary, in serialization-significant order:
/// ByteRange must precede Contents in the emitted bytes.
fn build_signature_dict(options: &PrepareOptions) -> Dictionary {
    let mut dict = Dictionary::new();

    dict.set("Type", Object::name("Sig"));
    dict.set("Filter", Object::name("Adobe.PPKLite"));
    dict.set("SubFilter", Object::name("ETSI.RFC3161"));
    dict.set(
        "ByteRange",
        Object::Array(
            std::iter::repeat(Object::Integer(BYTE_RANGE_PLACEHOLDER_INT))
                .take(BYTE_RANGE_PLACEHOLDER_COUNT)
                .collect(),
        ),
    );
    dict.set(
        "Contents",
        Object::hex_string(vec![0u8; options.signature_size]),
    );

    if !options.omit_modification_time {
        let now = chrono::Utc::now();
        dict.set(
            "M",
            Object::literal_string(format!("D:{}Z", now.format("%Y%m%d%H%M%S"))),
        );
    }

    if let Some(reason) = &options.reason {
        dict.set("Reason", Object::literal_string(reason.as_bytes()));
    }

    if let Some(location) = &options.location {
        dict.set("Location", Object::literal_string(location.as_bytes()));
    }

    if let Some(contact_info) = &options.contact_info {
        dict.set("ContactInfo", Object::literal_string(contact_info.as_bytes()));
    }

    dict
}

fn register_widget(
    doc: &mut PdfDocument,
    sig_id: ObjectId,
    field_name: &str,
) -> Result<ObjectId> {
    let page_id = doc.first_page_id()?;

    let mut widget = Dictionary::new();
    widget.set("Type", Object::name("Annot"));
    widget.set("Subtype", Object::name("Widget"));
    widget.set("FT", Object::name("Sig"));
    widget.set(
        "Rect",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );
    widget.set("V", Object::reference(sig_id));
    widget.set("T", Object::literal_string(field_name.as_bytes()));
    widget.set("F", Object::Integer(4));
    widget.set("P", Object::reference(page_id));

    Ok(doc.register(Object::Dictionary(widget)))
}

/// Ensure an AcroForm exists with document-signature flags and append
/// the widget to its fields.
fn attach_to_acro_form(doc: &mut PdfDocument, widget_id: ObjectId) -> Result<()> {
    let catalog = doc.catalog()?;

    match catalog.get("AcroForm").cloned() {
        Some(Object::Reference(form_id)) => {
            let mut form = doc.dict(form_id)?.clone();
            upgrade_acro_form(&mut form, widget_id);
            doc.set_object(form_id, Object::Dictionary(form));
        }
        Some(Object::Dictionary(mut form)) => {
            upgrade_acro_form(&mut form, widget_id);
            doc.catalog_mut()?
                .set("AcroForm", Object::Dictionary(form));
        }
        _ => {
            let mut form = Dictionary::new();
            upgrade_acro_form(&mut form, widget_id);
            let form_id = doc.register(Object::Dictionary(form));
            doc.catalog_mut()?
                .set("AcroForm", Object::reference(form_id));
        }
    }

    Ok(())
}

fn upgrade_acro_form(form: &mut Dictionary, widget_id: ObjectId) {
    // SigFlags 3: SignaturesExist | AppendOnly.
    form.set("SigFlags", Object::Integer(3));

    match form.get_mut("Fields").and_then(Object::as_array_mut) {
        Some(fields) => fields.push(Object::reference(widget_id)),
        None => form.set(
            "Fields",
            Object::Array(vec![Object::reference(widget_id)]),
        ),
    }
}

/// Append the widget to the first page's annotations.
fn attach_to_first_page(doc: &mut PdfDocument, widget_id: ObjectId) -> Result<()> {
    let page_id = doc.first_page_id()?;
    let page = doc.dict(page_id)?;

    match page.get("Annots").cloned() {
        Some(Object::Reference(annots_id)) => {
            let mut annots = doc
                .resolve(&Object::Reference(annots_id))
                .as_array()
                .map(<[Object]>::to_vec)
                .unwrap_or_default();
            annots.push(Object::reference(widget_id));
            doc.set_object(annots_id, Object::Array(annots));
            doc.mark_for_save(page_id);
        }
        Some(Object::Array(mut annots)) => {
            annots.push(Object::reference(widget_id));
            let mut page = page.clone();
            page.set("Annots", Object::Array(annots));
            doc.set_object(page_id, Object::Dictionary(page));
        }
        _ => {
            let mut page = page.clone();
            page.set(
                "Annots",
                Object::Array(vec![Object::reference(widget_id)]),
            );
            doc.set_object(page_id, Object::Dictionary(page));
        }
    }

    Ok(())
}

/// Locate the `<` of a `/Contents <000…0>` placeholder.
///
/// The placeholder lives in the revision just appended, so a window at
/// the end of the file is searched first and the whole image only as a
/// fallback. The last match wins: earlier signatures carry their own
/// (already substituted) Contents literals.
fn locate_contents_placeholder(bytes: &[u8], placeholder_hex_len: usize) -> Option<usize> {
    let window = PLACEHOLDER_SEARCH_TAIL.max(placeholder_hex_len + 4 * 1024);
    let tail_start = bytes.len().saturating_sub(window);

    find_last_placeholder(bytes, tail_start, placeholder_hex_len)
        .or_else(|| find_last_placeholder(bytes, 0, placeholder_hex_len))
}

fn find_last_placeholder(
    bytes: &[u8],
    from: usize,
    placeholder_hex_len: usize,
) -> Option<usize> {
    let needle = b"/Contents";
    let mut best = None;
    let mut search_from = from;

    while let Some(relative) = bytes[search_from..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        let name_at = search_from + relative;
        search_from = name_at + needle.len();

        let mut pos = name_at + needle.len();

        while bytes
            .get(pos)
            .map(|b| crate::pdf::object::is_whitespace(*b))
            .unwrap_or(false)
        {
            pos += 1;
        }

        if bytes.get(pos) != Some(&b'<') {
            continue;
        }

        let hex_start = pos + 1;
        let hex_end = hex_start + placeholder_hex_len;

        if bytes.len() <= hex_end || bytes[hex_start..hex_end].iter().any(|b| *b != b'0') {
            continue;
        }

        if bytes[hex_end] != b'>' {
            continue;
        }

        best = Some(pos);
    }

    best
}

/// Walk backward from `from`, balancing `<<`/`>>`, to the start of the
/// enclosing dictionary.
fn enclosing_dict_start(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut pos = from;

    while pos >= 2 {
        let pair = &bytes[pos - 2..pos];

        if pair == b">>" {
            depth += 1;
            pos -= 2;
        } else if pair == b"<<" {
            if depth == 0 {
                return Some(pos - 2);
            }
            depth -= 1;
            pos -= 2;
        } else {
            pos -= 1;
        }
    }

    None
}

/// Substitute the oversized ByteRange with the final compact values,
/// padded with spaces to exactly the original length.
fn patch_byte_range(
    bytes: &mut [u8],
    contents_open: usize,
    byte_range: &[usize; 4],
) -> Result<()> {
    let dict_start =
        enclosing_dict_start(bytes, contents_open).ok_or(PdfTimestampError::PlaceholderNotFound)?;

    let needle = b"/ByteRange";
    let name_at = bytes[dict_start..contents_open]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|relative| dict_start + relative)
        .ok_or(PdfTimestampError::PlaceholderNotFound)?;

    let open_bracket = bytes[name_at..contents_open]
        .iter()
        .position(|b| *b == b'[')
        .map(|relative| name_at + relative)
        .ok_or(PdfTimestampError::PlaceholderNotFound)?;

    let close_bracket = bytes[open_bracket..contents_open]
        .iter()
        .position(|b| *b == b']')
        .map(|relative| open_bracket + relative)
        .ok_or(PdfTimestampError::PlaceholderNotFound)?;

    let region_len = close_bracket + 1 - name_at;

    let compact = format!(
        "/ByteRange [0 {} {} {}]",
        byte_range[1], byte_range[2], byte_range[3]
    );

    if compact.len() > region_len {
        return Err(PdfTimestampError::ByteRangePlaceholderTooSmall);
    }

    let mut replacement = compact.into_bytes();
    replacement.resize(region_len, b' ');

    bytes[name_at..name_at + region_len].copy_from_slice(&replacement);

    Ok(())
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::testutil::{minimal_pdf, pdf_with_pages},
    };

    fn parse_emitted_byte_range(bytes: &[u8]) -> Vec<i64> {
        let text = String::from_utf8_lossy(bytes);
        let at = text.rfind("/ByteRange").unwrap();
        let open = text[at..].find('[').unwrap() + at;
        let close = text[open..].find(']').unwrap() + open;

        text[open + 1..close]
            .split_whitespace()
            .map(|token| token.parse().unwrap())
            .collect()
    }

    #[test]
    fn prepare_minimal_pdf() {
        let pdf = pdf_with_pages(3);
        let options = PrepareOptions::default();

        let prepared = prepare_timestamp_placeholder(&pdf, &options).unwrap();

        assert_eq!(prepared.byte_range[0], 0);
        assert!(prepared.byte_range[1] > 0);
        assert_eq!(prepared.placeholder_len, 16384);

        let text = String::from_utf8_lossy(&prepared.bytes);
        assert!(text.contains("/SubFilter /ETSI.RFC3161"));
        assert!(text.contains("/Filter /Adobe.PPKLite"));
        assert!(text.contains("/SigFlags 3"));
        assert!(text.contains("(Timestamp)"));
    }

    #[test]
    fn prepared_bytes_start_with_input() {
        let pdf = minimal_pdf();

        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        assert!(prepared.bytes.starts_with(&pdf));
    }

    #[test]
    fn byte_range_brackets_the_contents_hole() {
        let pdf = minimal_pdf();

        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        let [a, b, c, d] = prepared.byte_range;
        assert_eq!(a, 0);
        assert_eq!(prepared.bytes[b], b'<');
        assert_eq!(prepared.bytes[c - 1], b'>');
        assert_eq!(b + (c - b) + d, prepared.bytes.len());
        assert_eq!(c - b, prepared.placeholder_len + 2);
        assert_eq!(prepared.contents_offset, b + 1);
    }

    #[test]
    fn placeholder_integers_are_replaced() {
        let pdf = minimal_pdf();

        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        let ones = b"111111111111";
        assert!(!prepared
            .bytes
            .windows(ones.len())
            .any(|window| window == ones));
    }

    #[test]
    fn emitted_byte_range_matches_returned() {
        let pdf = minimal_pdf();

        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        let emitted = parse_emitted_byte_range(&prepared.bytes);
        assert_eq!(emitted.len(), 4);
        assert_eq!(
            emitted,
            prepared
                .byte_range
                .iter()
                .map(|v| *v as i64)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn bytes_to_hash_excludes_the_hole() {
        let pdf = minimal_pdf();

        let prepared =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        let hashed = prepared.bytes_to_hash();
        assert_eq!(
            hashed.len(),
            prepared.bytes.len() - (prepared.placeholder_len + 2)
        );

        // The hole is exactly the bracketed hex literal.
        assert!(hashed.starts_with(&prepared.bytes[..prepared.byte_range[1]]));
        assert!(hashed.ends_with(&prepared.bytes[prepared.byte_range[2]..]));
    }

    #[test]
    fn metadata_fields_are_emitted() {
        let pdf = minimal_pdf();
        let options = PrepareOptions {
            reason: Some("archival".to_string()),
            location: Some("Berlin".to_string()),
            contact_info: Some("ops@example.com".to_string()),
            omit_modification_time: true,
            ..PrepareOptions::default()
        };

        let prepared = prepare_timestamp_placeholder(&pdf, &options).unwrap();
        let text = String::from_utf8_lossy(&prepared.bytes);

        assert!(text.contains("/Reason (archival)"));
        assert!(text.contains("/Location (Berlin)"));
        assert!(text.contains("/ContactInfo (ops@example.com)"));

        let revision = &text[pdf.len()..];
        assert!(!revision.contains("/M (D:"));
    }

    #[test]
    fn second_signature_targets_new_placeholder() {
        let pdf = minimal_pdf();

        let first =
            prepare_timestamp_placeholder(&pdf, &PrepareOptions::default()).unwrap();

        // Fill the first placeholder so it is no longer all zeros.
        let mut signed = first.bytes.clone();
        for byte in
            &mut signed[first.contents_offset..first.contents_offset + first.placeholder_len]
        {
            *byte = b'a';
        }

        let second = prepare_timestamp_placeholder(
            &signed,
            &PrepareOptions {
                field_name: "Timestamp2".to_string(),
                ..PrepareOptions::default()
            },
        )
        .unwrap();

        assert!(second.bytes.starts_with(&signed));
        assert!(second.byte_range[1] > signed.len());
    }
}

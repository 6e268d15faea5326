// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A scanning PDF parser.
//!
//! Cross-reference tables in the wild are stale, truncated, or hybrid
//! often enough that this parser does not trust them at all: it scans
//! the whole byte image for `N G obj` definitions and parses each one.
//! Later definitions of an object number shadow earlier ones, which is
//! exactly the incremental-update semantics. Objects packed into
//! object streams (`/ObjStm`) are expanded after the scan.

use {
    super::object::{is_delimiter, is_whitespace, Dictionary, Object, ObjectId, PdfString, Stream},
    crate::error::PdfTimestampError,
    flate2::read::ZlibDecoder,
    log::{debug, warn},
    std::io::Read,
};

type Result<T> = std::result::Result<T, PdfTimestampError>;

pub struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn err(&self, message: impl Into<String>) -> PdfTimestampError {
        PdfTimestampError::Pdf(format!("{} at offset {}", message.into(), self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                // Comment until end of line.
                while let Some(byte) = self.peek() {
                    self.pos += 1;
                    if byte == b'\n' || byte == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn starts_with(&self, token: &[u8]) -> bool {
        self.data[self.pos..].starts_with(token)
    }

    /// Consume `token` if the input continues with it followed by a
    /// delimiter or end of input.
    fn eat_keyword(&mut self, token: &[u8]) -> bool {
        if !self.starts_with(token) {
            return false;
        }

        let after = self.pos + token.len();
        match self.data.get(after) {
            None => {}
            Some(&byte) if is_whitespace(byte) || is_delimiter(byte) => {}
            Some(_) => return false,
        }

        self.pos = after;
        true
    }

    /// Parse any object at the current position.
    pub fn parse_object(&mut self) -> Result<Object> {
        self.skip_whitespace();

        match self.peek().ok_or_else(|| self.err("unexpected end of data"))? {
            b'/' => self.parse_name().map(Object::Name),
            b'(' => self.parse_literal_string(),
            b'<' => {
                if self.starts_with(b"<<") {
                    let dict = self.parse_dictionary()?;
                    self.parse_stream_after_dict(dict)
                } else {
                    self.parse_hex_string()
                }
            }
            b'[' => self.parse_array(),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number_or_reference(),
            _ => {
                if self.eat_keyword(b"true") {
                    Ok(Object::Boolean(true))
                } else if self.eat_keyword(b"false") {
                    Ok(Object::Boolean(false))
                } else if self.eat_keyword(b"null") {
                    Ok(Object::Null)
                } else {
                    Err(self.err("unrecognized token"))
                }
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        // Leading '/'.
        self.bump();

        let mut name = Vec::new();

        while let Some(byte) = self.peek() {
            if is_whitespace(byte) || is_delimiter(byte) {
                break;
            }

            self.pos += 1;

            if byte == b'#' {
                let hex: Vec<u8> = self.data[self.pos..].iter().take(2).copied().collect();

                if hex.len() == 2 && hex.iter().all(u8::is_ascii_hexdigit) {
                    let value = u8::from_str_radix(std::str::from_utf8(&hex).unwrap(), 16)
                        .expect("checked hex digits");
                    name.push(value);
                    self.pos += 2;
                } else {
                    name.push(byte);
                }
            } else {
                name.push(byte);
            }
        }

        String::from_utf8(name).map_err(|_| self.err("non-UTF-8 name"))
    }

    fn parse_literal_string(&mut self) -> Result<Object> {
        // Leading '('.
        self.bump();

        let mut bytes = Vec::new();
        let mut depth = 1usize;

        loop {
            let byte = self.bump().ok_or_else(|| self.err("unterminated string"))?;

            match byte {
                b'\\' => {
                    let escaped = self.bump().ok_or_else(|| self.err("unterminated escape"))?;

                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0c),
                        b'(' | b')' | b'\\' => bytes.push(escaped),
                        b'\r' => {
                            // Line continuation; swallow a following \n.
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = u16::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(digit @ b'0'..=b'7') => {
                                        value = value * 8 + u16::from(digit - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push(value as u8);
                        }
                        other => bytes.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    bytes.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(byte);
                }
                _ => bytes.push(byte),
            }
        }

        Ok(Object::String(PdfString::Literal(bytes)))
    }

    fn parse_hex_string(&mut self) -> Result<Object> {
        // Leading '<'.
        self.bump();

        let mut digits = Vec::new();

        loop {
            let byte = self.bump().ok_or_else(|| self.err("unterminated hex string"))?;

            match byte {
                b'>' => break,
                byte if byte.is_ascii_hexdigit() => digits.push(byte),
                byte if is_whitespace(byte) => {}
                _ => return Err(self.err("invalid character in hex string")),
            }
        }

        // An odd final digit gets a trailing zero.
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }

        let bytes = digits
            .chunks(2)
            .map(|pair| {
                u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16)
                    .expect("checked hex digits")
            })
            .collect();

        Ok(Object::String(PdfString::Hex(bytes)))
    }

    fn parse_array(&mut self) -> Result<Object> {
        // Leading '['.
        self.bump();

        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => items.push(self.parse_object()?),
                None => return Err(self.err("unterminated array")),
            }
        }

        Ok(Object::Array(items))
    }

    pub fn parse_dictionary(&mut self) -> Result<Dictionary> {
        // Leading '<<'.
        self.pos += 2;

        let mut dict = Dictionary::new();

        loop {
            self.skip_whitespace();

            if self.starts_with(b">>") {
                self.pos += 2;
                break;
            }

            if self.peek() != Some(b'/') {
                return Err(self.err("expected name key in dictionary"));
            }

            let key = self.parse_name()?;
            let value = self.parse_object()?;
            dict.set(key, value);
        }

        Ok(dict)
    }

    fn parse_number_or_reference(&mut self) -> Result<Object> {
        let first = self.parse_number()?;

        // `N G R` is an indirect reference; detect by lookahead.
        if let Object::Integer(number) = first {
            if number >= 0 {
                let saved = self.pos;

                self.skip_whitespace();
                if let Ok(Object::Integer(generation)) = self.try_parse_plain_integer() {
                    if (0..=i64::from(u16::MAX)).contains(&generation) {
                        self.skip_whitespace();
                        if self.eat_keyword(b"R") {
                            return Ok(Object::Reference(ObjectId::new(
                                number as u32,
                                generation as u16,
                            )));
                        }
                    }
                }

                self.pos = saved;
            }
        }

        Ok(first)
    }

    fn try_parse_plain_integer(&mut self) -> Result<Object> {
        match self.peek() {
            Some(b'0'..=b'9') => self.parse_number(),
            _ => Err(self.err("not an integer")),
        }
    }

    fn parse_number(&mut self) -> Result<Object> {
        let start = self.pos;

        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }

        let mut is_real = false;

        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_real => {
                    is_real = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| self.err("invalid number"))?;

        if text.is_empty() || text == "+" || text == "-" || text == "." {
            return Err(self.err("invalid number"));
        }

        if is_real {
            text.parse::<f64>()
                .map(Object::Real)
                .map_err(|_| self.err("invalid real number"))
        } else {
            text.parse::<i64>()
                .map(Object::Integer)
                .map_err(|_| self.err("integer overflow"))
        }
    }

    /// After a dictionary, check for stream data.
    fn parse_stream_after_dict(&mut self, dict: Dictionary) -> Result<Object> {
        let saved = self.pos;
        self.skip_whitespace();

        if !self.eat_keyword(b"stream") {
            self.pos = saved;
            return Ok(Object::Dictionary(dict));
        }

        // The keyword is followed by CRLF or LF.
        if self.starts_with(b"\r\n") {
            self.pos += 2;
        } else if self.peek() == Some(b'\n') {
            self.pos += 1;
        }

        let start = self.pos;

        let length = dict.get("Length").and_then(Object::as_integer);

        let end = match length {
            Some(length) if length >= 0 && start + length as usize <= self.data.len() => {
                let end = start + length as usize;

                // Trust /Length only if endstream actually follows.
                let mut check = Parser::at(self.data, end);
                check.skip_whitespace();
                if check.starts_with(b"endstream") {
                    end
                } else {
                    self.find_endstream(start)?
                }
            }
            // An indirect or broken /Length falls back to searching.
            _ => self.find_endstream(start)?,
        };

        let data = self.data[start..end].to_vec();

        self.pos = end;
        self.skip_whitespace();
        self.eat_keyword(b"endstream");

        Ok(Object::Stream(Stream { dict, data }))
    }

    fn find_endstream(&self, start: usize) -> Result<usize> {
        let needle = b"endstream";

        self.data[start..]
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|offset| {
                let mut end = start + offset;

                // Back off the EOL that separates data from the keyword.
                if end > start && self.data[end - 1] == b'\n' {
                    end -= 1;
                    if end > start && self.data[end - 1] == b'\r' {
                        end -= 1;
                    }
                }

                end
            })
            .ok_or_else(|| self.err("endstream not found"))
    }
}

/// One definition discovered by the scan.
pub struct ScannedObject {
    pub offset: usize,
    pub id: ObjectId,
    pub object: Object,
}

/// Scan the whole image for `N G obj` definitions and parse each.
///
/// Definitions that fail to parse are skipped with a warning; a single
/// damaged object must not take down loading.
pub fn scan_objects(data: &[u8]) -> Vec<ScannedObject> {
    let mut found = Vec::new();
    let needle = b"obj";
    let mut search_from = 0usize;

    while let Some(relative) = data[search_from..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        let keyword_at = search_from + relative;
        search_from = keyword_at + 1;

        // The keyword must terminate at a delimiter or whitespace.
        match data.get(keyword_at + needle.len()) {
            None => {}
            Some(&byte) if is_whitespace(byte) || is_delimiter(byte) => {}
            Some(_) => continue,
        }

        // Walk backward over `N G ` immediately before the keyword.
        let Some((id, definition_start)) = read_object_header(data, keyword_at) else {
            continue;
        };

        let mut parser = Parser::at(data, keyword_at + needle.len());

        match parser.parse_object() {
            Ok(object) => {
                found.push(ScannedObject {
                    offset: definition_start,
                    id,
                    object,
                });
                search_from = parser.pos();
            }
            Err(e) => {
                warn!("skipping unparseable object {} {}: {}", id.number, id.generation, e);
            }
        }
    }

    found
}

/// Read the `N G ` prefix ending right before `obj` at `keyword_at`.
fn read_object_header(data: &[u8], keyword_at: usize) -> Option<(ObjectId, usize)> {
    let mut pos = keyword_at;

    // One or more whitespace before the keyword.
    let mut seen_space = false;
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
        seen_space = true;
    }
    if !seen_space {
        return None;
    }

    let generation_end = pos;
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    let generation: u16 = std::str::from_utf8(&data[pos..generation_end])
        .ok()?
        .parse()
        .ok()?;

    seen_space = false;
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
        seen_space = true;
    }
    if !seen_space {
        return None;
    }

    let number_end = pos;
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    if pos == number_end {
        return None;
    }
    let number: u32 = std::str::from_utf8(&data[pos..number_end])
        .ok()?
        .parse()
        .ok()?;

    Some((ObjectId::new(number, generation), pos))
}

/// Expand an object stream into its member objects.
pub fn expand_object_stream(stream: &Stream) -> Result<Vec<(u32, Object)>> {
    let data = decode_stream_data(stream)?;

    let count = stream
        .dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| PdfTimestampError::Pdf("object stream missing /N".into()))?;
    let first = stream
        .dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| PdfTimestampError::Pdf("object stream missing /First".into()))?
        as usize;

    let mut header = Parser::new(&data);
    let mut entries = Vec::new();

    for _ in 0..count {
        header.skip_whitespace();
        let number = header
            .parse_object()?
            .as_integer()
            .ok_or_else(|| PdfTimestampError::Pdf("malformed object stream header".into()))?;
        header.skip_whitespace();
        let offset = header
            .parse_object()?
            .as_integer()
            .ok_or_else(|| PdfTimestampError::Pdf("malformed object stream header".into()))?;

        entries.push((number as u32, offset as usize));
    }

    let mut objects = Vec::new();

    for (number, offset) in entries {
        let position = first + offset;

        if position >= data.len() {
            warn!("object stream member {} out of bounds", number);
            continue;
        }

        let mut parser = Parser::at(&data, position);
        objects.push((number, parser.parse_object()?));
    }

    Ok(objects)
}

/// Decode stream data, applying FlateDecode when declared.
pub fn decode_stream_data(stream: &Stream) -> Result<Vec<u8>> {
    let filter = stream.dict.get("Filter");

    let is_flate = match filter {
        None => false,
        Some(Object::Name(name)) => name == "FlateDecode",
        Some(Object::Array(filters)) => {
            filters.len() == 1 && filters[0].as_name() == Some("FlateDecode")
        }
        Some(_) => false,
    };

    if filter.is_some() && !is_flate {
        return Err(PdfTimestampError::Pdf(
            "unsupported stream filter chain".into(),
        ));
    }

    if !is_flate {
        return Ok(stream.data.clone());
    }

    if let Some(parms) = stream.dict.get("DecodeParms").and_then(Object::as_dict) {
        if let Some(predictor) = parms.get("Predictor").and_then(Object::as_integer) {
            if predictor > 1 {
                return Err(PdfTimestampError::Pdf(format!(
                    "unsupported stream predictor {}",
                    predictor
                )));
            }
        }
    }

    let mut decoded = Vec::new();
    ZlibDecoder::new(stream.data.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|e| PdfTimestampError::Pdf(format!("FlateDecode failure: {}", e)))?;

    Ok(decoded)
}

/// The largest object number with a `N G obj` definition in the image.
///
/// Cheaper than a full scan because object bodies are never parsed.
pub fn max_defined_object_number(data: &[u8]) -> u32 {
    let needle = b"obj";
    let mut max = 0u32;
    let mut search_from = 0usize;

    while let Some(relative) = data[search_from..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        let keyword_at = search_from + relative;
        search_from = keyword_at + 1;

        match data.get(keyword_at + needle.len()) {
            None => {}
            Some(&byte) if is_whitespace(byte) || is_delimiter(byte) => {}
            Some(_) => continue,
        }

        if let Some((id, _)) = read_object_header(data, keyword_at) {
            max = max.max(id.number);
        }
    }

    max
}

/// Find the last `startxref` value in the image.
pub fn last_startxref(data: &[u8]) -> Option<usize> {
    let needle = b"startxref";

    let position = data
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(i, _)| i)
        .last()?;

    let mut parser = Parser::at(data, position + needle.len());
    parser.skip_whitespace();

    match parser.parse_object().ok()? {
        Object::Integer(value) if value >= 0 => Some(value as usize),
        _ => None,
    }
}

/// Parse every classic `trailer` dictionary, in file order.
pub fn trailer_dictionaries(data: &[u8]) -> Vec<Dictionary> {
    let needle = b"trailer";
    let mut found = Vec::new();
    let mut search_from = 0usize;

    while let Some(relative) = data[search_from..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        let keyword_at = search_from + relative;
        search_from = keyword_at + needle.len();

        let mut parser = Parser::at(data, keyword_at + needle.len());
        parser.skip_whitespace();

        if parser.starts_with(b"<<") {
            match parser.parse_dictionary() {
                Ok(dict) => found.push(dict),
                Err(e) => debug!("skipping unparseable trailer: {}", e),
            }
        }
    }

    found
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(data: &[u8]) -> Object {
        Parser::new(data).parse_object().unwrap()
    }

    #[test]
    fn parse_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"42"), Object::Integer(42));
        assert_eq!(parse(b"-17"), Object::Integer(-17));
        assert_eq!(parse(b"3.5"), Object::Real(3.5));
        assert_eq!(parse(b"/ETSI.RFC3161"), Object::name("ETSI.RFC3161"));
        assert_eq!(parse(b"/A#20B"), Object::name("A B"));
    }

    #[test]
    fn parse_strings() {
        assert_eq!(
            parse(b"(hello (nested) \\(escaped\\))"),
            Object::literal_string(b"hello (nested) (escaped)".to_vec())
        );
        assert_eq!(
            parse(b"<DEAD beef>"),
            Object::hex_string(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(parse(b"<4>"), Object::hex_string(vec![0x40]));
        assert_eq!(parse(b"(\\101\\102)"), Object::literal_string(b"AB".to_vec()));
    }

    #[test]
    fn parse_containers() {
        let object = parse(b"[1 2 0 R /Name (str)]");
        let array = object.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[0], Object::Integer(1));
        assert_eq!(array[1], Object::Reference(ObjectId::new(2, 0)));

        let object = parse(b"<< /Type /Sig /ByteRange [0 1 2 3] /V 7 0 R >>");
        let dict = object.as_dict().unwrap();
        assert_eq!(dict.type_name(), Some("Sig"));
        assert_eq!(
            dict.get("V").unwrap().as_reference(),
            Some(ObjectId::new(7, 0))
        );
    }

    #[test]
    fn reference_lookahead_backtracks() {
        // Two integers not followed by R stay two integers.
        let object = parse(b"[1 2 3]");
        let array = object.as_array().unwrap();
        assert_eq!(
            array,
            &[Object::Integer(1), Object::Integer(2), Object::Integer(3)]
        );
    }

    #[test]
    fn parse_stream_with_length() {
        let data = b"<< /Length 5 >>\nstream\nhello\nendstream";
        let object = parse(data);

        match object {
            Object::Stream(stream) => assert_eq!(stream.data, b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn parse_stream_with_broken_length() {
        // An indirect /Length forces an endstream search.
        let data = b"<< /Length 9 0 R >>\nstream\nhello\nendstream";
        let object = parse(data);

        match object {
            Object::Stream(stream) => assert_eq!(stream.data, b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn scan_finds_definitions_and_shadows() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n2 0 obj\n(first)\nendobj\n2 0 obj\n(second)\nendobj\n";

        let scanned = scan_objects(data);
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[0].id, ObjectId::new(1, 0));
        assert_eq!(scanned[2].id, ObjectId::new(2, 0));
        assert_eq!(
            scanned[2].object,
            Object::literal_string(b"second".to_vec())
        );
    }

    #[test]
    fn scan_ignores_words_ending_in_obj() {
        let data = b"1 0 obj\n<< /Kind /blobj >>\nendobj\n";

        let scanned = scan_objects(data);
        assert_eq!(scanned.len(), 1);
    }

    #[test]
    fn startxref_and_trailer() {
        let data =
            b"xref\n0 1\ntrailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n1234\n%%EOF\n";

        assert_eq!(last_startxref(data), Some(1234));

        let trailers = trailer_dictionaries(data);
        assert_eq!(trailers.len(), 1);
        assert_eq!(
            trailers[0].get("Root").unwrap().as_reference(),
            Some(ObjectId::new(1, 0))
        );
    }
}

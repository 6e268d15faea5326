// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The PDF object model.
//!
//! Objects live in an arena keyed by object number; cross references
//! between them are [ObjectId] values resolved lazily by the document.
//! Dictionaries preserve insertion order because signature dictionary
//! serialization order is load-bearing: `/ByteRange` must precede
//! `/Contents` in the emitted bytes.

use std::fmt::{Debug, Formatter};

/// Identifies an indirect object: number and generation.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

/// A PDF string, preserving its source notation.
#[derive(Clone, Eq, PartialEq)]
pub enum PdfString {
    /// `(...)` literal notation.
    Literal(Vec<u8>),
    /// `<...>` hexadecimal notation.
    Hex(Vec<u8>),
}

impl PdfString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Literal(bytes) | Self::Hex(bytes) => bytes,
        }
    }
}

impl Debug for PdfString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(bytes) => {
                f.write_fmt(format_args!("({})", String::from_utf8_lossy(bytes)))
            }
            Self::Hex(bytes) => f.write_fmt(format_args!("<{}>", hex::encode(bytes))),
        }
    }
}

/// Any PDF object.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(String),
    String(PdfString),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

impl Object {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn literal_string(value: impl Into<Vec<u8>>) -> Self {
        Self::String(PdfString::Literal(value.into()))
    }

    pub fn hex_string(value: impl Into<Vec<u8>>) -> Self {
        Self::String(PdfString::Hex(value.into()))
    }

    pub fn reference(id: ObjectId) -> Self {
        Self::Reference(id)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(dict) => Some(dict),
            Self::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Self::Dictionary(dict) => Some(dict),
            Self::Stream(stream) => Some(&mut stream.dict),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Serialize this object into `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => out.extend_from_slice(b"null"),
            Self::Boolean(true) => out.extend_from_slice(b"true"),
            Self::Boolean(false) => out.extend_from_slice(b"false"),
            Self::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
            Self::Real(value) => {
                if value.fract() == 0.0 {
                    out.extend_from_slice(format!("{:.0}", value).as_bytes());
                } else {
                    out.extend_from_slice(value.to_string().as_bytes());
                }
            }
            Self::Name(name) => {
                out.push(b'/');
                for byte in name.bytes() {
                    // Delimiters and whitespace inside a name use the
                    // #xx escape.
                    if is_delimiter(byte) || is_whitespace(byte) || byte == b'#' {
                        out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
                    } else {
                        out.push(byte);
                    }
                }
            }
            Self::String(PdfString::Literal(bytes)) => {
                out.push(b'(');
                for byte in bytes {
                    match byte {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(*byte);
                        }
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\n' => out.extend_from_slice(b"\\n"),
                        _ => out.push(*byte),
                    }
                }
                out.push(b')');
            }
            Self::String(PdfString::Hex(bytes)) => {
                out.push(b'<');
                out.extend_from_slice(hex::encode(bytes).as_bytes());
                out.push(b'>');
            }
            Self::Array(array) => {
                out.push(b'[');
                for (i, item) in array.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write(out);
                }
                out.push(b']');
            }
            Self::Dictionary(dict) => dict.write(out),
            Self::Stream(stream) => stream.write(out),
            Self::Reference(id) => {
                out.extend_from_slice(format!("{} {} R", id.number, id.generation).as_bytes());
            }
        }
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// A dictionary with insertion-ordered entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(String, Object)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.entries
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. Replacement keeps the original position;
    /// insertion appends.
    pub fn set(&mut self, key: impl Into<String>, value: Object) {
        let key = key.into();

        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        let index = self.entries.iter().position(|(name, _)| name == key)?;

        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Object)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The name behind `/Type`, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.get("Type").and_then(Object::as_name)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");
        for (name, value) in &self.entries {
            Object::Name(name.clone()).write(out);
            out.push(b' ');
            value.write(out);
            out.push(b'\n');
        }
        out.extend_from_slice(b">>");
    }
}

impl FromIterator<(String, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Object)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A stream object: a dictionary plus raw data.
#[derive(Clone, Debug, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl Stream {
    /// Build an unfiltered stream over raw data, setting `/Length`.
    pub fn new(mut dict: Dictionary, data: Vec<u8>) -> Self {
        dict.set("Length", Object::Integer(data.len() as i64));

        Self { dict, data }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.dict.write(out);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(&self.data);
        out.extend_from_slice(b"\nendstream");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn serialized(object: &Object) -> String {
        let mut out = Vec::new();
        object.write(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Sig"));
        dict.set("ByteRange", Object::Array(vec![Object::Integer(0)]));
        dict.set("Contents", Object::hex_string(vec![0u8; 2]));

        let mut out = Vec::new();
        dict.write(&mut out);
        let text = String::from_utf8(out).unwrap();

        let byte_range = text.find("/ByteRange").unwrap();
        let contents = text.find("/Contents").unwrap();
        assert!(byte_range < contents);

        // Replacement keeps position.
        dict.set("ByteRange", Object::Array(vec![Object::Integer(1)]));
        let mut out = Vec::new();
        dict.write(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.find("/ByteRange").unwrap() < text.find("/Contents").unwrap());
    }

    #[test]
    fn serialize_primitives() {
        assert_eq!(serialized(&Object::Null), "null");
        assert_eq!(serialized(&Object::Boolean(true)), "true");
        assert_eq!(serialized(&Object::Integer(-42)), "-42");
        assert_eq!(serialized(&Object::name("ETSI.RFC3161")), "/ETSI.RFC3161");
        assert_eq!(
            serialized(&Object::reference(ObjectId::new(12, 0))),
            "12 0 R"
        );
    }

    #[test]
    fn serialize_strings() {
        assert_eq!(
            serialized(&Object::literal_string(b"a(b)c\\".to_vec())),
            "(a\\(b\\)c\\\\)"
        );
        assert_eq!(
            serialized(&Object::hex_string(vec![0xde, 0xad, 0xbe, 0xef])),
            "<deadbeef>"
        );
    }

    #[test]
    fn serialize_name_escapes() {
        assert_eq!(serialized(&Object::name("A B")), "/A#20B");
        assert_eq!(serialized(&Object::name("A#B")), "/A#23B");
    }

    #[test]
    fn stream_sets_length() {
        let stream = Stream::new(Dictionary::new(), b"hello".to_vec());
        assert_eq!(
            stream.dict.get("Length").and_then(Object::as_integer),
            Some(5)
        );

        let mut out = Vec::new();
        stream.write(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("stream\nhello\nendstream"));
    }
}

//! Font-aware string decoding for the text probe
//!
//! Label generators often embed text in composite (Type0) fonts where the
//! string bytes are glyph ids. The font's ToUnicode CMap maps those codes
//! back to characters; without it the text reads as control bytes.

use lazy_static::lazy_static;
use lopdf::{Dictionary, Document, Object};
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

use crate::document::resolve;

/// Longest bfrange expanded; larger ranges are malformed or hostile
const MAX_RANGE_LEN: u32 = 0x1_0000;

lazy_static! {
    static ref HEX: Regex = Regex::new(r"<([0-9A-Fa-f\s]*)>").unwrap();
    static ref BFCHAR: Regex = Regex::new(r"<([0-9A-Fa-f\s]+)>\s*<([0-9A-Fa-f\s]*)>").unwrap();
    static ref BFRANGE: Regex = Regex::new(
        r"<([0-9A-Fa-f\s]+)>\s*<([0-9A-Fa-f\s]+)>\s*(?:<([0-9A-Fa-f\s]*)>|\[([^\]]*)\])"
    )
    .unwrap();
}

/// Character codes to Unicode text, parsed from a ToUnicode CMap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeMap {
    /// Bytes per character code
    code_width: usize,
    map: HashMap<u32, String>,
}

impl ToUnicodeMap {
    /// Parse the `codespacerange`, `bfchar` and `bfrange` sections of a CMap.
    /// `default_width` applies when the CMap declares no code space.
    pub fn parse(data: &[u8], default_width: usize) -> Self {
        let text = String::from_utf8_lossy(data);

        let code_width = sections(&text, "begincodespacerange", "endcodespacerange")
            .into_iter()
            .find_map(|section| HEX.captures(section).map(|c| hex_bytes(&c[1]).len()))
            .filter(|w| (1..=4).contains(w))
            .unwrap_or(default_width);

        let mut map = HashMap::new();
        for section in sections(&text, "beginbfchar", "endbfchar") {
            for caps in BFCHAR.captures_iter(section) {
                if let Some(dst) = utf16_text(&hex_bytes(&caps[2])) {
                    map.insert(code(&hex_bytes(&caps[1])), dst);
                }
            }
        }
        for section in sections(&text, "beginbfrange", "endbfrange") {
            for caps in BFRANGE.captures_iter(section) {
                let start = code(&hex_bytes(&caps[1]));
                let end = code(&hex_bytes(&caps[2]));
                if end < start || end - start >= MAX_RANGE_LEN {
                    debug!("Ignoring bfrange {:X}..{:X}", start, end);
                    continue;
                }
                if let Some(base) = caps.get(3) {
                    insert_sequential(&mut map, start, end, &hex_bytes(base.as_str()));
                } else if let Some(list) = caps.get(4) {
                    let targets = HEX.captures_iter(list.as_str());
                    for (c, target) in (start..=end).zip(targets) {
                        if let Some(dst) = utf16_text(&hex_bytes(&target[1])) {
                            map.insert(c, dst);
                        }
                    }
                }
            }
        }

        Self { code_width, map }
    }

    pub fn code_width(&self) -> usize {
        self.code_width
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    /// Unmapped codes are dropped
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_width.max(1))
            .filter_map(|chunk| self.get(code(chunk)))
            .collect()
    }
}

/// How the strings shown with one font turn into text
#[derive(Debug, Clone, Default)]
pub struct FontDecoder {
    to_unicode: Option<ToUnicodeMap>,
}

impl FontDecoder {
    /// Decoder for the font dictionary `font`
    pub fn from_font(doc: &Document, font: &Dictionary) -> Self {
        let composite = matches!(
            font.get(b"Subtype"),
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Type0"
        );
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .map(|stream| {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                ToUnicodeMap::parse(&data, if composite { 2 } else { 1 })
            })
            .filter(|map| !map.is_empty());
        Self { to_unicode }
    }

    /// Look up font `name` in a resource dictionary
    pub fn lookup(doc: &Document, resources: Option<&Object>, name: &[u8]) -> Option<Self> {
        let resources = resolve(doc, resources?)?.as_dict().ok()?;
        let fonts = resolve(doc, resources.get(b"Font").ok()?)?.as_dict().ok()?;
        let font = resolve(doc, fonts.get(name).ok()?)?.as_dict().ok()?;
        Some(Self::from_font(doc, font))
    }

    pub fn to_unicode(&self) -> Option<&ToUnicodeMap> {
        self.to_unicode.as_ref()
    }

    /// Decode one string operand's bytes
    pub fn decode(&self, bytes: &[u8]) -> String {
        match &self.to_unicode {
            Some(map) => map.decode(bytes),
            None => decode_raw(bytes),
        }
    }
}

/// Fonts without a ToUnicode map: UTF-8, then UTF-16BE with BOM, then Latin-1
pub fn decode_raw(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        if let Some(s) = utf16_text(rest) {
            return s;
        }
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn sections<'a>(text: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let body = &rest[start + begin.len()..];
        let Some(stop) = body.find(end) else {
            break;
        };
        found.push(&body[..stop]);
        rest = &body[stop + end.len()..];
    }
    found
}

/// Hex digits to bytes; whitespace is ignored and an odd digit is padded
fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Big-endian character code
fn code(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// `<start> <end> <dst>`: each code maps to `dst` with its last unit advanced
fn insert_sequential(map: &mut HashMap<u32, String>, start: u32, end: u32, base: &[u8]) {
    if base.len() < 2 || base.len() % 2 != 0 {
        return;
    }
    let split = base.len() - 2;
    let last = u16::from_be_bytes([base[split], base[split + 1]]);
    for (offset, c) in (start..=end).enumerate() {
        let mut dst = base[..split].to_vec();
        dst.extend_from_slice(&last.wrapping_add(offset as u16).to_be_bytes());
        if let Some(text) = utf16_text(&dst) {
            map.insert(c, text);
        }
    }
}

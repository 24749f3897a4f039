//! Header cards and the ordered keyword map.
//!
//! A [`Header`] is an explicit ordered mapping from keyword to
//! (value, comment), looked up by name or position. The 80-byte card image
//! grammar lives here too; the codec consumes it when walking header blocks.

use std::fmt;
use std::str;

use crate::error::{Error, Result};

/// FITS block size in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// A header card value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Logical value (`T` or `F`).
    Logical(bool),
    Integer(i64),
    Float(f64),
    /// Character string (content between single quotes).
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Logical(true) => f.write_str("T"),
            Value::Logical(false) => f.write_str("F"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// One keyword record.
///
/// Commentary cards (COMMENT, HISTORY, blank) carry no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<Value>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: Value, comment: Option<&str>) -> Card {
        Card {
            keyword: keyword.to_ascii_uppercase(),
            value: Some(value),
            comment: comment.map(String::from),
        }
    }

    pub fn is_end(&self) -> bool {
        self.keyword == "END"
    }

    pub fn is_commentary(&self) -> bool {
        self.keyword == "COMMENT" || self.keyword == "HISTORY" || self.keyword.is_empty()
    }
}

/// Ordered keyword -> (value, comment) mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Header {
        Header { cards: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// The value of the first card carrying `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.get_card(keyword).and_then(|c| c.value.as_ref())
    }

    pub fn get_card(&self, keyword: &str) -> Option<&Card> {
        let kw = keyword.to_ascii_uppercase();
        self.cards.iter().find(|c| c.keyword == kw)
    }

    pub fn card_at(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    /// Update the first card carrying `keyword` in place, or append a new
    /// card if none exists. Order is preserved.
    pub fn set(&mut self, keyword: &str, value: Value, comment: Option<&str>) {
        let kw = keyword.to_ascii_uppercase();
        if let Some(card) = self.cards.iter_mut().find(|c| c.keyword == kw) {
            card.value = Some(value);
            if comment.is_some() {
                card.comment = comment.map(String::from);
            }
        } else {
            self.cards.push(Card::new(&kw, value, comment));
        }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Remove and return the first card carrying `keyword`.
    pub fn remove(&mut self, keyword: &str) -> Option<Card> {
        let kw = keyword.to_ascii_uppercase();
        let pos = self.cards.iter().position(|c| c.keyword == kw)?;
        Some(self.cards.remove(pos))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Card> {
        self.cards.iter()
    }

    /// Integer value of `keyword`, if present and integral.
    pub fn int(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword) {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// String value of `keyword`, if present.
    pub fn str_value(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ── Card image parsing ──

fn malformed(detail: &str) -> Error {
    Error::Data(format!("malformed header card: {detail}"))
}

/// Parse a single 80-byte card image.
pub(crate) fn parse_card(bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let keyword_field = &bytes[..8];
    for &b in keyword_field {
        match b {
            b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_' => {}
            _ => return Err(malformed("invalid keyword character")),
        }
    }
    let keyword = str::from_utf8(keyword_field)
        .map_err(|_| malformed("non-ASCII keyword"))?
        .trim_end()
        .to_string();

    if keyword == "END" {
        return Ok(Card {
            keyword,
            value: None,
            comment: None,
        });
    }

    let rest = str::from_utf8(&bytes[8..]).map_err(|_| malformed("non-ASCII card body"))?;

    if keyword == "COMMENT" || keyword == "HISTORY" || keyword.is_empty() {
        let text = rest.trim_end();
        return Ok(Card {
            keyword,
            value: None,
            comment: if text.is_empty() {
                None
            } else {
                Some(String::from(text))
            },
        });
    }

    if bytes[8] == b'=' && bytes[9] == b' ' {
        let (value, comment) = parse_value(&rest[2..]);
        Ok(Card {
            keyword,
            value,
            comment,
        })
    } else {
        let text = rest.trim_end();
        Ok(Card {
            keyword,
            value: None,
            comment: if text.is_empty() {
                None
            } else {
                Some(String::from(text))
            },
        })
    }
}

/// Parse the 70-byte value field into a value and trailing comment.
fn parse_value(field: &str) -> (Option<Value>, Option<String>) {
    let bytes = field.as_bytes();
    if bytes.first() == Some(&b'\'') {
        return parse_string_value(field);
    }

    // Non-string: the comment starts at the first ` /`. Files in the wild
    // omit the space after the slash, so only the leading space is required.
    let (value_part, comment) = match field.find(" /") {
        Some(i) => (&field[..i], extract_comment(&field[i + 2..])),
        None => (field, None),
    };

    let text = value_part.trim();
    if text.is_empty() {
        return (None, comment);
    }
    if text == "T" {
        return (Some(Value::Logical(true)), comment);
    }
    if text == "F" {
        return (Some(Value::Logical(false)), comment);
    }
    if !text.contains(['.', 'E', 'e', 'D', 'd']) {
        if let Ok(n) = text.parse::<i64>() {
            return (Some(Value::Integer(n)), comment);
        }
    }
    let normalized = text.replace(['D', 'd'], "E");
    if let Ok(v) = normalized.parse::<f64>() {
        return (Some(Value::Float(v)), comment);
    }
    (None, comment)
}

fn parse_string_value(field: &str) -> (Option<Value>, Option<String>) {
    let bytes = field.as_bytes();
    let mut value = String::new();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                value.push('\'');
                i += 2;
            } else {
                i += 1;
                break;
            }
        } else {
            value.push(bytes[i] as char);
            i += 1;
        }
    }
    let comment = field[i..]
        .find(" /")
        .and_then(|p| extract_comment(&field[i + p + 2..]));
    (
        Some(Value::Str(value.trim_end().to_string())),
        comment,
    )
}

fn extract_comment(after_slash: &str) -> Option<String> {
    let text = after_slash.strip_prefix(' ').unwrap_or(after_slash).trim_end();
    if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    }
}

// ── Card image formatting ──

/// Serialize a card into an 80-byte image. Oversized fields are truncated.
pub(crate) fn format_card(card: &Card) -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    let kw = card.keyword.as_bytes();
    let kw_len = kw.len().min(8);
    buf[..kw_len].copy_from_slice(&kw[..kw_len]);

    if let Some(value) = &card.value {
        buf[8] = b'=';
        buf[9] = b' ';
        let mut field = format_value_field(value);
        if let Some(comment) = &card.comment {
            insert_comment(&mut field, comment);
        }
        buf[10..CARD_SIZE].copy_from_slice(&field);
    } else if !card.keyword.is_empty() {
        if let Some(comment) = &card.comment {
            let bytes = comment.as_bytes();
            let len = bytes.len().min(CARD_SIZE - 8);
            buf[8..8 + len].copy_from_slice(&bytes[..len]);
        }
    }
    buf
}

fn format_value_field(value: &Value) -> [u8; 70] {
    let mut buf = [b' '; 70];
    match value {
        Value::Logical(b) => {
            // Column 30 of the card.
            buf[19] = if *b { b'T' } else { b'F' };
        }
        Value::Integer(n) => right_justify(format!("{n}").as_bytes(), &mut buf[..20]),
        Value::Float(v) => {
            let mut s = format!("{v:E}");
            if !s.contains('.') {
                // FITS floats always carry a decimal point.
                if let Some(epos) = s.find('E') {
                    s.insert_str(epos, ".0");
                }
            }
            right_justify(s.as_bytes(), &mut buf[..20]);
        }
        Value::Str(s) => {
            let mut pos = 0;
            buf[pos] = b'\'';
            pos += 1;
            for &ch in s.as_bytes() {
                if pos >= 68 {
                    break;
                }
                if ch == b'\'' {
                    buf[pos] = b'\'';
                    buf[pos + 1] = b'\'';
                    pos += 2;
                } else {
                    buf[pos] = ch;
                    pos += 1;
                }
            }
            // Minimum 8 characters between the quotes.
            while pos < 9 {
                buf[pos] = b' ';
                pos += 1;
            }
            buf[pos] = b'\'';
        }
    }
    buf
}

fn right_justify(src: &[u8], dest: &mut [u8]) {
    let len = src.len().min(dest.len());
    let start = dest.len() - len;
    dest[start..].copy_from_slice(&src[..len]);
}

fn insert_comment(field: &mut [u8; 70], comment: &str) {
    let content_end = if field[0] == b'\'' {
        match field.iter().skip(1).position(|&b| b == b'\'') {
            Some(p) => p + 2,
            None => return,
        }
    } else {
        20
    };
    let sep = content_end + 1;
    if sep + 3 >= 70 {
        return;
    }
    field[sep] = b'/';
    field[sep + 1] = b' ';
    let start = sep + 2;
    let bytes = comment.as_bytes();
    let len = bytes.len().min(70 - start);
    field[start..start + len].copy_from_slice(&bytes[..len]);
}

// ── Header blocks ──

/// Parse consecutive 2880-byte header blocks until the END card.
///
/// Returns the header and the number of bytes it occupies (always a multiple
/// of [`BLOCK_SIZE`]).
pub(crate) fn parse_header_blocks(data: &[u8]) -> Result<(Header, usize)> {
    if data.len() < BLOCK_SIZE {
        return Err(malformed("truncated header block"));
    }
    let mut header = Header::new();
    let num_blocks = data.len() / BLOCK_SIZE;
    for block_idx in 0..num_blocks {
        for card_idx in 0..CARDS_PER_BLOCK {
            let start = block_idx * BLOCK_SIZE + card_idx * CARD_SIZE;
            let card_bytes: &[u8; CARD_SIZE] = data[start..start + CARD_SIZE]
                .try_into()
                .map_err(|_| malformed("short card"))?;
            let card = parse_card(card_bytes)?;
            if card.is_end() {
                return Ok((header, (block_idx + 1) * BLOCK_SIZE));
            }
            header.push(card);
        }
    }
    Err(malformed("no END card"))
}

/// Serialize a header into complete blocks, appending the END card and
/// padding the final block with spaces.
pub(crate) fn serialize_header(header: &Header) -> Vec<u8> {
    let total_cards = header.len() + 1;
    let total_blocks = total_cards.div_ceil(CARDS_PER_BLOCK);
    let mut buf = vec![b' '; total_blocks * BLOCK_SIZE];

    for (i, card) in header.iter().enumerate() {
        let offset = i * CARD_SIZE;
        buf[offset..offset + CARD_SIZE].copy_from_slice(&format_card(card));
    }
    let end_offset = header.len() * CARD_SIZE;
    buf[end_offset..end_offset + 3].copy_from_slice(b"END");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(s: &str) -> [u8; CARD_SIZE] {
        let mut buf = [b' '; CARD_SIZE];
        let bytes = s.as_bytes();
        buf[..bytes.len().min(CARD_SIZE)].copy_from_slice(&bytes[..bytes.len().min(CARD_SIZE)]);
        buf
    }

    // ---- parsing ----

    #[test]
    fn parse_logical_card() {
        let c = parse_card(&image("SIMPLE  =                    T / conforms")).unwrap();
        assert_eq!(c.keyword, "SIMPLE");
        assert_eq!(c.value, Some(Value::Logical(true)));
        assert_eq!(c.comment.as_deref(), Some("conforms"));
    }

    #[test]
    fn parse_integer_card() {
        let c = parse_card(&image("BITPIX  =                   -32 / IEEE float")).unwrap();
        assert_eq!(c.value, Some(Value::Integer(-32)));
    }

    #[test]
    fn parse_float_card() {
        let c = parse_card(&image("EXPTIME =            2.7315E+02")).unwrap();
        match c.value {
            Some(Value::Float(v)) => assert!((v - 273.15).abs() < 1e-9),
            other => panic!("expected Float, got {other:?}"),
        }
    }

    #[test]
    fn parse_float_d_exponent() {
        let c = parse_card(&image("SCALE   =            1.5D+01")).unwrap();
        match c.value {
            Some(Value::Float(v)) => assert!((v - 15.0).abs() < 1e-12),
            other => panic!("expected Float, got {other:?}"),
        }
    }

    #[test]
    fn parse_string_card() {
        let c = parse_card(&image("OBJECT  = 'NGC 1234'           / target")).unwrap();
        assert_eq!(c.value, Some(Value::Str(String::from("NGC 1234"))));
        assert_eq!(c.comment.as_deref(), Some("target"));
    }

    #[test]
    fn parse_string_with_embedded_quote() {
        let c = parse_card(&image("NOTE    = 'it''s ok '")).unwrap();
        assert_eq!(c.value, Some(Value::Str(String::from("it's ok"))));
    }

    #[test]
    fn parse_comment_card() {
        let c = parse_card(&image("COMMENT free-form text here")).unwrap();
        assert!(c.is_commentary());
        assert!(c.value.is_none());
        assert_eq!(c.comment.as_deref(), Some("free-form text here"));
    }

    #[test]
    fn parse_end_card() {
        let c = parse_card(&image("END")).unwrap();
        assert!(c.is_end());
    }

    #[test]
    fn parse_lowercase_keyword_fails() {
        assert!(parse_card(&image("bitpix  =                   16")).is_err());
    }

    #[test]
    fn parse_comment_without_trailing_space_after_slash() {
        let c = parse_card(&image("BITPIX  =                  -32 /No. of bits")).unwrap();
        assert_eq!(c.value, Some(Value::Integer(-32)));
        assert_eq!(c.comment.as_deref(), Some("No. of bits"));
    }

    // ---- formatting ----

    #[test]
    fn format_card_is_80_bytes_with_value_indicator() {
        let card = Card::new("NAXIS", Value::Integer(2), Some("number of axes"));
        let buf = format_card(&card);
        assert_eq!(buf.len(), 80);
        assert_eq!(&buf[..8], b"NAXIS   ");
        assert_eq!(&buf[8..10], b"= ");
        let s = str::from_utf8(&buf).unwrap();
        assert!(s.contains("/ number of axes"));
    }

    #[test]
    fn format_logical_in_column_30() {
        let buf = format_card(&Card::new("SIMPLE", Value::Logical(true), None));
        assert_eq!(buf[29], b'T');
    }

    #[test]
    fn format_integer_right_justified() {
        let buf = format_card(&Card::new("NAXIS1", Value::Integer(512), None));
        assert_eq!(&buf[27..30], b"512");
    }

    #[test]
    fn roundtrip_cards() {
        let cards = vec![
            Card::new("SIMPLE", Value::Logical(true), Some("standard")),
            Card::new("BITPIX", Value::Integer(16), None),
            Card::new("OBJECT", Value::Str(String::from("M31")), Some("target")),
            Card::new("EXPTIME", Value::Float(12.5), None),
        ];
        for card in cards {
            let buf = format_card(&card);
            let parsed = parse_card(&buf).unwrap();
            assert_eq!(parsed.keyword, card.keyword);
            match (parsed.value, card.value) {
                (Some(Value::Float(a)), Some(Value::Float(b))) => {
                    assert!((a - b).abs() < 1e-9)
                }
                (a, b) => assert_eq!(a, b),
            }
        }
    }

    // ---- header map ----

    #[test]
    fn set_appends_then_updates_in_place() {
        let mut h = Header::new();
        h.set("BITPIX", Value::Integer(16), None);
        h.set("NAXIS", Value::Integer(2), None);
        h.set("BITPIX", Value::Integer(-32), None);
        assert_eq!(h.len(), 2);
        assert_eq!(h.int("BITPIX"), Some(-32));
        // Order preserved: BITPIX still first.
        assert_eq!(h.card_at(0).unwrap().keyword, "BITPIX");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = Header::new();
        h.set("object", Value::Str(String::from("M31")), None);
        assert_eq!(h.str_value("OBJECT"), Some("M31"));
    }

    #[test]
    fn remove_card() {
        let mut h = Header::new();
        h.set("A", Value::Integer(1), None);
        h.set("B", Value::Integer(2), None);
        assert!(h.remove("A").is_some());
        assert_eq!(h.len(), 1);
        assert!(h.get("A").is_none());
    }

    // ---- blocks ----

    #[test]
    fn serialize_then_parse_blocks() {
        let mut h = Header::new();
        h.set("SIMPLE", Value::Logical(true), None);
        h.set("BITPIX", Value::Integer(8), None);
        h.set("NAXIS", Value::Integer(0), None);

        let bytes = serialize_header(&h);
        assert_eq!(bytes.len(), BLOCK_SIZE);

        let (parsed, consumed) = parse_header_blocks(&bytes).unwrap();
        assert_eq!(consumed, BLOCK_SIZE);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.int("BITPIX"), Some(8));
    }

    #[test]
    fn header_spills_to_two_blocks() {
        let mut h = Header::new();
        for i in 0..CARDS_PER_BLOCK {
            h.set(&format!("KEY{i:05}"), Value::Integer(i as i64), None);
        }
        let bytes = serialize_header(&h);
        assert_eq!(bytes.len(), 2 * BLOCK_SIZE);
        let (parsed, consumed) = parse_header_blocks(&bytes).unwrap();
        assert_eq!(consumed, 2 * BLOCK_SIZE);
        assert_eq!(parsed.len(), CARDS_PER_BLOCK);
    }

    #[test]
    fn missing_end_card_is_an_error() {
        let bytes = vec![b' '; BLOCK_SIZE];
        // All-blank block parses as commentary cards and never finds END...
        // except blank cards are valid, so exhaust the block.
        assert!(parse_header_blocks(&bytes).is_err());
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert!(parse_header_blocks(&[b' '; 100]).is_err());
    }
}

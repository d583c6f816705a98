//! Text encodings used by length-prefixed AVB strings
//!
//! Strings are MacRoman unless the payload starts with two NUL bytes, in
//! which case the remainder is UTF-8.

use crate::{Error, Result};
use encoding_rs::MACINTOSH;

/// Lead-in marking a UTF-8 payload.
const UTF8_LEAD_IN: [u8; 2] = [0x00, 0x00];

/// Largest payload a `u16` length prefix can describe (`0xFFFF` is the absent sentinel).
pub const MAX_STRING_LEN: usize = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    MacRoman,
    Utf8,
}

/// Detects the encoding of a raw string payload.
pub fn detect(data: &[u8]) -> TextEncoding {
    if data.len() >= 2 && data[..2] == UTF8_LEAD_IN {
        TextEncoding::Utf8
    } else {
        TextEncoding::MacRoman
    }
}

/// Decodes a raw payload, stripping NUL padding from both ends.
pub fn decode(data: &[u8]) -> String {
    let encoding = detect(data);
    let start = data.iter().position(|&b| b != 0).unwrap_or(data.len());
    let end = data.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    let body = &data[start..end];

    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(body).into_owned(),
        TextEncoding::MacRoman => MACINTOSH.decode_without_bom_handling(body).0.into_owned(),
    }
}

/// Encodes a string, preferring MacRoman and falling back to NUL-prefixed UTF-8.
pub fn encode(s: &str) -> Result<Vec<u8>> {
    encode_as(s, TextEncoding::MacRoman)
}

/// Encodes a string in `encoding`; MacRoman falls back to UTF-8 when unmappable.
pub fn encode_as(s: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    let macroman = match encoding {
        TextEncoding::MacRoman => match MACINTOSH.encode(s) {
            (bytes, _, false) => Some(bytes.into_owned()),
            _ => None,
        },
        TextEncoding::Utf8 => None,
    };
    let data = macroman.unwrap_or_else(|| {
        let mut data = UTF8_LEAD_IN.to_vec();
        data.extend_from_slice(s.as_bytes());
        data
    });

    if data.len() > MAX_STRING_LEN {
        return Err(Error::UnsupportedTextValue(format!(
            "string of {} bytes exceeds the {MAX_STRING_LEN} byte limit",
            data.len()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_macroman_roundtrip() {
        let data = encode("Caf\u{e9}").unwrap();
        assert_eq!(data, vec![b'C', b'a', b'f', 0x8e]);
        assert_eq!(decode(&data), "Caf\u{e9}");
    }

    #[test]
    fn test_utf8_fallback() {
        let data = encode("\u{65e5}\u{672c}").unwrap();
        assert_eq!(&data[..2], &UTF8_LEAD_IN);
        assert_eq!(detect(&data), TextEncoding::Utf8);
        assert_eq!(decode(&data), "\u{65e5}\u{672c}");
    }

    #[test]
    fn test_forced_utf8_keeps_lead_in() {
        let data = encode_as("abc", TextEncoding::Utf8).unwrap();
        assert_eq!(data, [0, 0, b'a', b'b', b'c']);
        assert_eq!(detect(&data), TextEncoding::Utf8);
        assert_eq!(decode(&data), "abc");
        assert_eq!(encode_as("", TextEncoding::Utf8).unwrap(), UTF8_LEAD_IN);
    }

    #[test]
    fn test_nul_padding_is_stripped() {
        assert_eq!(decode(b"Clip1\0\0\0"), "Clip1");
        assert_eq!(decode(b"\0\0\0"), "");
    }

    #[test]
    fn test_oversized_string_rejected() {
        let long = "a".repeat(MAX_STRING_LEN + 1);
        assert!(matches!(encode(&long), Err(Error::UnsupportedTextValue(_))));
    }

    proptest! {
        #[test]
        fn prop_text_roundtrip(s in "[a-zA-Z0-9 _.\u{e0}-\u{ff}\u{4e00}-\u{4e20}]{0,64}") {
            let trimmed = s.trim_matches('\0');
            let data = encode(trimmed).unwrap();
            prop_assert_eq!(decode(&data), trimmed);
        }
    }
}

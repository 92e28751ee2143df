//! Charsets understood by request bodies and response decoding

use std::borrow::Cow;

use url::form_urlencoded;

use crate::{RequestError, RequestResult};

/// Charset used when none is declared
pub const CHARSET_UTF8: &str = "UTF-8";

/// Return `charset` if it is non-empty, UTF-8 otherwise
pub fn valid_charset(charset: Option<&str>) -> &str {
    match charset {
        Some(charset) if !charset.is_empty() => charset,
        _ => CHARSET_UTF8,
    }
}

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1
    Latin1,
    UsAscii,
}

impl Charset {
    /// Resolve a charset label (case-insensitive, common aliases accepted)
    pub fn for_label(label: &str) -> RequestResult<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::UsAscii),
            _ => Err(RequestError::Encoding(format!("unsupported charset: {label}"))),
        }
    }

    /// Resolve an optional label, defaulting to UTF-8 when absent or empty
    pub fn for_optional_label(label: Option<&str>) -> RequestResult<Self> {
        Self::for_label(valid_charset(label))
    }

    /// Canonical label
    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => CHARSET_UTF8,
            Charset::Latin1 => "ISO-8859-1",
            Charset::UsAscii => "US-ASCII",
        }
    }

    /// Encode text, failing on characters the charset cannot represent
    pub fn encode(self, text: &str) -> RequestResult<Cow<'_, [u8]>> {
        let limit = match self {
            Charset::Utf8 => return Ok(Cow::Borrowed(text.as_bytes())),
            Charset::Latin1 => 0xFF,
            Charset::UsAscii => 0x7F,
        };
        if text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        text.chars()
            .map(|c| {
                u8::try_from(u32::from(c))
                    .ok()
                    .filter(|b| u32::from(*b) <= limit)
                    .ok_or_else(|| {
                        RequestError::Encoding(format!("{c:?} is not representable in {}", self.label()))
                    })
            })
            .collect::<RequestResult<Vec<u8>>>()
            .map(Cow::Owned)
    }

    /// Decode bytes; malformed input is replaced rather than rejected
    pub fn decode(self, bytes: Vec<u8>) -> String {
        match self {
            Charset::Utf8 => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            },
            Charset::Latin1 => bytes.into_iter().map(char::from).collect(),
            Charset::UsAscii => bytes
                .into_iter()
                .map(|b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        }
    }

    /// Percent-encode a form component in this charset.
    ///
    /// Spaces become `+`; alphanumerics and `*-._` pass through.
    pub fn form_encode(self, component: &str) -> RequestResult<String> {
        let bytes = self.encode(component)?;
        Ok(form_urlencoded::byte_serialize(&bytes).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Charset::for_label("utf-8").unwrap(), Charset::Utf8);
        assert_eq!(Charset::for_label(" UTF8 ").unwrap(), Charset::Utf8);
        assert_eq!(Charset::for_label("ISO-8859-1").unwrap(), Charset::Latin1);
        assert_eq!(Charset::for_label("us-ascii").unwrap(), Charset::UsAscii);
        assert!(matches!(Charset::for_label("KOI8-R"), Err(RequestError::Encoding(_))));
    }

    #[test]
    fn test_default_charset() {
        assert_eq!(valid_charset(None), CHARSET_UTF8);
        assert_eq!(valid_charset(Some("")), CHARSET_UTF8);
        assert_eq!(valid_charset(Some("latin1")), "latin1");
        assert_eq!(Charset::for_optional_label(None).unwrap(), Charset::Utf8);
    }

    #[test]
    fn test_form_encode() {
        let utf8 = Charset::Utf8;
        assert_eq!(utf8.form_encode("a b&c=d").unwrap(), "a+b%26c%3Dd");
        assert_eq!(utf8.form_encode("*-._~").unwrap(), "*-._%7E");
        assert_eq!(utf8.form_encode("원").unwrap(), "%EC%9B%90");
        assert_eq!(Charset::Latin1.form_encode("café").unwrap(), "caf%E9");
    }

    #[test]
    fn test_unrepresentable_characters() {
        assert!(matches!(Charset::Latin1.encode("원"), Err(RequestError::Encoding(_))));
        assert!(matches!(Charset::UsAscii.encode("é"), Err(RequestError::Encoding(_))));
    }

    #[test]
    fn test_decode() {
        assert_eq!(Charset::Utf8.decode("héllo".as_bytes().to_vec()), "héllo");
        assert_eq!(Charset::Utf8.decode(vec![0x61, 0xFF]), "a\u{FFFD}");
        assert_eq!(Charset::Latin1.decode(vec![0x63, 0xE9]), "cé");
        assert_eq!(Charset::UsAscii.decode(vec![0x61, 0xE9]), "a\u{FFFD}");
    }
}

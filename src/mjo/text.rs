// Text operand encodings.
//
// Script strings are stored in the engine's legacy double-byte encoding
// (Shift_JIS for retail builds, GBK for some localized ones).  Decoding is
// lossless or it does not happen: a byte string that does not survive a
// decode/encode cycle is reported as `None` so the caller can keep the raw
// bytes instead.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, GBK, SHIFT_JIS, UTF_8};

/// Encoding used for text operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    ShiftJis,
    Gbk,
    Utf8,
}

impl TextEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            Self::ShiftJis => SHIFT_JIS,
            Self::Gbk => GBK,
            Self::Utf8 => UTF_8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ShiftJis => "shift_jis",
            Self::Gbk => "gbk",
            Self::Utf8 => "utf-8",
        }
    }

    /// Decode `bytes` only if re-encoding the result reproduces them exactly.
    pub fn decode_exact(self, bytes: &[u8]) -> Option<String> {
        let text = self
            .encoding()
            .decode_without_bom_handling_and_without_replacement(bytes)?;
        match self.encode(&text) {
            Some(round) if round.as_ref() == bytes => Some(text.into_owned()),
            _ => None,
        }
    }

    /// Encode `text`, or `None` if it contains unmappable characters.
    pub fn encode(self, text: &str) -> Option<Cow<'_, [u8]>> {
        let (bytes, _, had_errors) = self.encoding().encode(text);
        if had_errors { None } else { Some(bytes) }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sjis" | "shift_jis" | "shift-jis" | "cp932" => Ok(Self::ShiftJis),
            "gbk" | "cp936" => Ok(Self::Gbk),
            "utf8" | "utf-8" => Ok(Self::Utf8),
            other => Err(format!("unknown text encoding '{other}'")),
        }
    }
}

//! Text encodings used for generated scripts and for decoding process output.

use std::{fmt, str::FromStr};

use encoding_rs::{EncoderResult, Encoding};
use serde::{Deserialize, Serialize};

/// The text encoding a batch script is written in.
///
/// `cmd.exe` reads batch files in the active code page, so agents running on
/// Chinese Windows hosts typically need `Gbk`, while most modern setups use
/// `Utf8`. When nothing is selected the host's default encoding is used.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptEncoding {
    /// UTF-8 without a byte order mark
    #[value(name = "utf-8", alias = "utf8")]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// The GBK legacy multi-byte encoding
    Gbk,
    /// Whatever encoding the host system uses by default
    #[default]
    #[value(name = "default")]
    #[serde(rename = "default")]
    SystemDefault,
}

impl ScriptEncoding {
    /// Resolve to a concrete encoding.
    pub fn encoding(self) -> &'static Encoding {
        match self {
            ScriptEncoding::Utf8 => encoding_rs::UTF_8,
            ScriptEncoding::Gbk => encoding_rs::GBK,
            ScriptEncoding::SystemDefault => system_default_encoding(),
        }
    }
}

impl fmt::Display for ScriptEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptEncoding::Utf8 => write!(f, "utf-8"),
            ScriptEncoding::Gbk => write!(f, "gbk"),
            ScriptEncoding::SystemDefault => write!(f, "default"),
        }
    }
}

/// Error returned when parsing an unknown encoding name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown script encoding '{0}', expected one of: utf-8, gbk, default")]
pub struct ParseScriptEncodingError(String);

impl FromStr for ScriptEncoding {
    type Err = ParseScriptEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "utf_8" => Ok(ScriptEncoding::Utf8),
            "gbk" => Ok(ScriptEncoding::Gbk),
            "default" | "system" | "" => Ok(ScriptEncoding::SystemDefault),
            _ => Err(ParseScriptEncodingError(s.to_string())),
        }
    }
}

/// Encode `text`, replacing characters the encoding cannot represent with `?`.
/// Returns the bytes and whether any replacement happened.
pub fn encode_lossy(encoding: &'static Encoding, text: &str) -> (Vec<u8>, bool) {
    if encoding == encoding_rs::UTF_8 {
        return (text.as_bytes().to_vec(), false);
    }

    let mut encoder = encoding.new_encoder();
    let mut bytes = Vec::with_capacity(text.len() + 16);
    let mut remaining = text;
    let mut had_unmappable = false;
    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(remaining, &mut bytes, true);
        remaining = &remaining[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => bytes.reserve(remaining.len() + 16),
            EncoderResult::Unmappable(_) => {
                had_unmappable = true;
                bytes.push(b'?');
            }
        }
    }
    (bytes, had_unmappable)
}

/// The encoding of the active ANSI code page.
#[cfg(windows)]
pub fn system_default_encoding() -> &'static Encoding {
    // SAFETY: `GetACP` takes no arguments and has no preconditions.
    let code_page = unsafe { windows_sys::Win32::Globalization::GetACP() };
    encoding_for_code_page(code_page).unwrap_or(encoding_rs::UTF_8)
}

/// Non-Windows hosts are assumed to be UTF-8.
#[cfg(not(windows))]
pub fn system_default_encoding() -> &'static Encoding {
    encoding_rs::UTF_8
}

/// Map a Windows code page identifier to an encoding.
pub fn encoding_for_code_page(code_page: u32) -> Option<&'static Encoding> {
    let encoding = match code_page {
        65001 => encoding_rs::UTF_8,
        936 => encoding_rs::GBK,
        54936 => encoding_rs::GB18030,
        950 => encoding_rs::BIG5,
        932 => encoding_rs::SHIFT_JIS,
        949 => encoding_rs::EUC_KR,
        874 => encoding_rs::WINDOWS_874,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1252 => encoding_rs::WINDOWS_1252,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        866 => encoding_rs::IBM866,
        _ => return None,
    };
    Some(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("utf-8", ScriptEncoding::Utf8)]
    #[case("UTF8", ScriptEncoding::Utf8)]
    #[case("gbk", ScriptEncoding::Gbk)]
    #[case(" GBK ", ScriptEncoding::Gbk)]
    #[case("default", ScriptEncoding::SystemDefault)]
    #[case("", ScriptEncoding::SystemDefault)]
    fn parse_encoding(#[case] input: &str, #[case] expected: ScriptEncoding) {
        assert_eq!(input.parse::<ScriptEncoding>().unwrap(), expected);
    }

    #[test]
    fn parse_unknown_encoding() {
        let err = "latin-7".parse::<ScriptEncoding>().unwrap_err();
        assert!(err.to_string().contains("latin-7"));
    }

    #[test]
    fn resolves_explicit_encodings() {
        assert_eq!(ScriptEncoding::Utf8.encoding(), encoding_rs::UTF_8);
        assert_eq!(ScriptEncoding::Gbk.encoding(), encoding_rs::GBK);
    }

    #[cfg(not(windows))]
    #[test]
    fn system_default_is_utf8_off_windows() {
        assert_eq!(ScriptEncoding::SystemDefault.encoding(), encoding_rs::UTF_8);
    }

    #[test]
    fn code_page_mapping() {
        assert_eq!(encoding_for_code_page(936), Some(encoding_rs::GBK));
        assert_eq!(encoding_for_code_page(65001), Some(encoding_rs::UTF_8));
        assert_eq!(encoding_for_code_page(1), None);
    }

    #[test]
    fn encode_lossy_gbk() {
        let (bytes, replaced) = encode_lossy(encoding_rs::GBK, "echo 你好");
        assert!(!replaced);
        assert_eq!(bytes, b"echo \xc4\xe3\xba\xc3");
    }

    #[test]
    fn encode_lossy_replaces_unmappable() {
        let (bytes, replaced) = encode_lossy(encoding_rs::WINDOWS_1252, "a\u{4f60}&b");
        assert!(replaced);
        assert_eq!(bytes, b"a?&b");
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for encoding in [
            ScriptEncoding::Utf8,
            ScriptEncoding::Gbk,
            ScriptEncoding::SystemDefault,
        ] {
            assert_eq!(
                encoding.to_string().parse::<ScriptEncoding>().unwrap(),
                encoding
            );
        }
    }
}

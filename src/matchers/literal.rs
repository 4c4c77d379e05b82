//! Regex and decode-and-rescan matching on string literal contents.
//!
//! Decoding is best effort. Malformed base64 or hex is not an error, just a
//! literal that is not obfuscated.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    pattern: Regex,
}

impl LiteralMatcher {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// First matching fragment, for messages.
    pub fn find<'a>(&self, value: &'a str) -> Option<&'a str> {
        self.pattern.find(value).map(|m| m.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Rot13,
    Hex,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Rot13 => "rot13",
            Encoding::Hex => "hex",
        }
    }
}

/// Why a decoded literal was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hidden {
    NulByte,
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub encoding: Encoding,
    pub hidden: Hidden,
}

/// Shape regexes gate each decoder. Every decoder whose shape matches is
/// tried in order (base64, rot13, hex); the first that reveals something
/// wins.
#[derive(Debug, Clone)]
pub struct Deobfuscator {
    pub base64_shape: Regex,
    pub rot13_shape: Regex,
    pub hex_shape: Regex,
    pub rescan: LiteralMatcher,
}

impl Deobfuscator {
    pub fn inspect(&self, value: &str) -> Option<Decoded> {
        let candidates = [
            (Encoding::Base64, &self.base64_shape),
            (Encoding::Rot13, &self.rot13_shape),
            (Encoding::Hex, &self.hex_shape),
        ];
        candidates
            .into_iter()
            .filter(|(_, shape)| shape.is_match(value))
            .find_map(|(encoding, _)| {
                let bytes = decode(encoding, value)?;
                self.rescan_bytes(&bytes)
                    .map(|hidden| Decoded { encoding, hidden })
            })
    }

    fn rescan_bytes(&self, bytes: &[u8]) -> Option<Hidden> {
        if bytes.contains(&0) {
            return Some(Hidden::NulByte);
        }
        let text = std::str::from_utf8(bytes).ok()?;
        self.rescan.find(text).map(|m| Hidden::Pattern(m.to_owned()))
    }
}

fn decode(encoding: Encoding, value: &str) -> Option<Vec<u8>> {
    match encoding {
        Encoding::Base64 => decode_base64(value),
        Encoding::Rot13 => Some(rot13(value).into_bytes()),
        Encoding::Hex => decode_hex(value),
    }
}

pub fn decode_base64(value: &str) -> Option<Vec<u8>> {
    STANDARD.decode(value.trim_end()).ok()
}

/// ROT13 over ASCII letters, case preserving.
pub fn rot13(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

/// `0x41 0x42`, `\x41\x42` or bare `4142`.
pub fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits: String = value
        .replace("0x", "")
        .replace("\\x", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
fn deob() -> Deobfuscator {
    Deobfuscator {
        base64_shape: Regex::new(r"^[a-zA-Z0-9+/=]+\s*$").unwrap(),
        rot13_shape: Regex::new(r"^[a-zA-Z]+://[a-zA-Z0-9]+\s*$").unwrap(),
        hex_shape: Regex::new(r"^(?:0x[0-9a-fA-F]{2})+\s*$").unwrap(),
        rescan: LiteralMatcher::new(
            Regex::new(r"(?i)exec|eval|subprocess|shell|os\.|__import__").unwrap(),
        ),
    }
}

#[test]
fn base64_with_embedded_nul_is_flagged() {
    let encoded = STANDARD.encode(b"ab\0cd");
    let hit = deob().inspect(&encoded).unwrap();
    assert_eq!(hit.encoding, Encoding::Base64);
    assert_eq!(hit.hidden, Hidden::NulByte);
}

#[test]
fn clean_base64_sentence_is_not_flagged() {
    let encoded = STANDARD.encode("The quick brown fox jumps over the lazy dog");
    assert_eq!(deob().inspect(&encoded), None);
}

#[test]
fn malformed_base64_is_silently_ignored() {
    // matches the shape, fails to decode (bad length)
    assert_eq!(deob().inspect("abcde"), None);
}

#[test]
fn rot13_reveals_hidden_call() {
    // "rkrp" is rot13 for "exec"
    let hit = deob().inspect("rkrp://cnlybnq").unwrap();
    assert_eq!(hit.encoding, Encoding::Rot13);
    assert_eq!(hit.hidden, Hidden::Pattern("exec".into()));
}

#[test]
fn hex_bytes_are_decoded_and_rescanned() {
    let hit = deob().inspect("0x650x760x610x6c").unwrap();
    assert_eq!(hit.encoding, Encoding::Hex);
    assert_eq!(hit.hidden, Hidden::Pattern("eval".into()));

    assert_eq!(decode_hex("0x4"), None);
    assert_eq!(decode_hex("\\x41\\x42"), Some(b"AB".to_vec()));
}

#[test]
fn rot13_is_an_involution() {
    assert_eq!(rot13(&rot13("Hello, World")), "Hello, World");
}

//! Text cleanup between the completion API and the chat.
//!
//! The policy everywhere is to drop what cannot be represented and keep going:
//! a garbled byte in a completion must never cost the user their reply.

use std::borrow::Cow;

/// Marker appended to replies cut at the length limit.
pub const ELLIPSIS: &str = "...";

/// Decode UTF-8, silently dropping invalid sequences. Overlong forms, encoded
/// surrogates and code points past U+10FFFF are all invalid UTF-8, so none of
/// them survive.
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Remove `\uXXXX` escapes that encode an unpaired UTF-16 surrogate.
///
/// serde_json rejects those outright, while properly paired surrogates
/// (astral characters such as emoji) are left for it to decode.
pub fn strip_lone_surrogate_escapes(json: &str) -> Cow<'_, str> {
    if !json.contains("\\u") {
        return Cow::Borrowed(json);
    }

    let bytes = json.as_bytes();
    let mut out = String::with_capacity(json.len());
    let mut copied_from = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'u') => match hex_unit(bytes, i + 2) {
                Some(unit) if is_high_surrogate(unit) => {
                    let paired = bytes.get(i + 6) == Some(&b'\\')
                        && bytes.get(i + 7) == Some(&b'u')
                        && hex_unit(bytes, i + 8).is_some_and(is_low_surrogate);
                    if paired {
                        i += 12;
                    } else {
                        out.push_str(&json[copied_from..i]);
                        i += 6;
                        copied_from = i;
                    }
                }
                Some(unit) if is_low_surrogate(unit) => {
                    out.push_str(&json[copied_from..i]);
                    i += 6;
                    copied_from = i;
                }
                _ => i += 2,
            },
            Some(_) => i += 2,
            None => i += 1,
        }
    }

    out.push_str(&json[copied_from..]);
    Cow::Owned(out)
}

fn hex_unit(bytes: &[u8], start: usize) -> Option<u16> {
    let digits = bytes.get(start..start + 4)?;
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let digits = std::str::from_utf8(digits).ok()?;
    u16::from_str_radix(digits, 16).ok()
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Strip characters Telegram refuses or renders as garbage, then trim.
pub fn scrub(text: &str) -> String {
    let kept: String = text.chars().filter(|&c| is_sendable(c)).collect();
    kept.trim().to_string()
}

fn is_sendable(c: char) -> bool {
    match c {
        '\n' | '\r' | '\t' => true,
        '\u{FFFD}' => false,
        c if c.is_control() => false,
        c => !is_noncharacter(c),
    }
}

fn is_noncharacter(c: char) -> bool {
    let cp = c as u32;
    (0xFDD0..=0xFDEF).contains(&cp) || cp & 0xFFFE == 0xFFFE
}

/// Cut `text` to at most `max_chars` characters. Over-long text keeps
/// `max_chars - ELLIPSIS.len()` characters and gains the ellipsis, so the
/// result is exactly `max_chars` long. Returns whether a cut happened.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().nth(max_chars).is_none() {
        return (text.to_string(), false);
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    let mut out = String::with_capacity(cut + ELLIPSIS.len());
    out.push_str(&text[..cut]);
    out.push_str(ELLIPSIS);
    (out, true)
}

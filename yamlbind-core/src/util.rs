//! Scalar text helpers shared by load and save.

use yamlbind_types::Flags;

use crate::config::Config;

/// Spellings that decode to `false`, compared case-insensitively.
const FALSE_WORDS: [&str; 4] = ["false", "no", "disable", "0"];

/// Whether names are compared without regard to case. Value flags win over
/// the config default, and insensitive wins over sensitive.
pub fn case_insensitive(config: &Config, flags: &Flags) -> bool {
    if flags.case_insensitive {
        true
    } else if flags.case_sensitive {
        false
    } else {
        config.flags.case_insensitive
    }
}

pub fn names_match(config: &Config, flags: &Flags, a: &str, b: &str) -> bool {
    if case_insensitive(config, flags) {
        eq_ignore_case(a, b)
    } else {
        a == b
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

pub fn parse_bool(text: &str) -> bool {
    !FALSE_WORDS.iter().any(|word| eq_ignore_case(text, word))
}

/// Integer with C-style base detection: `0x` hex, leading `0` octal,
/// otherwise decimal. The whole text must be consumed. Magnitudes up to
/// `u64::MAX` are accepted so callers can range-check for any width.
pub fn parse_integer(text: &str) -> Option<i128> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (16, hex)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from(u64::from_str_radix(digits, radix).ok()?);
    Some(if negative { -magnitude } else { magnitude })
}

/// Unsigned integer; any leading `-` is rejected, even for zero.
pub fn parse_unsigned(text: &str) -> Option<u64> {
    if text.starts_with('-') {
        return None;
    }
    parse_integer(text).and_then(|value| u64::try_from(value).ok())
}

/// Largest value a `size` byte unsigned field holds.
pub fn unsigned_max(size: u32) -> u64 {
    match size {
        0 => 0,
        1..=7 => (1u64 << (size * 8)) - 1,
        _ => u64::MAX,
    }
}

/// Inclusive range of a `size` byte signed field.
pub fn signed_range(size: u32) -> (i128, i128) {
    let max = i128::from(unsigned_max(size) / 2);
    (-max - 1, max)
}

fn special_float(text: &str) -> Option<f64> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    match body.to_ascii_lowercase().as_str() {
        ".inf" | "inf" | "infinity" if negative => Some(f64::NEG_INFINITY),
        ".inf" | "inf" | "infinity" => Some(f64::INFINITY),
        ".nan" | "nan" => Some(f64::NAN),
        _ => None,
    }
}

/// Finite text that overflows is rejected.
pub fn parse_f64(text: &str) -> Option<f64> {
    if let Some(value) = special_float(text) {
        return Some(value);
    }
    let value: f64 = text.parse().ok()?;
    (!value.is_infinite()).then_some(value)
}

pub fn parse_f32(text: &str) -> Option<f32> {
    if let Some(value) = special_float(text) {
        return Some(value as f32);
    }
    let value: f32 = text.parse().ok()?;
    (!value.is_infinite()).then_some(value)
}

/// Shortest text that parses back to the same value.
pub fn format_f64(value: f64) -> String {
    if value.is_nan() {
        ".nan".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { ".inf" } else { "-.inf" };
        text.to_string()
    } else {
        format!("{:?}", value)
    }
}

pub fn format_f32(value: f32) -> String {
    if value.is_finite() {
        format!("{:?}", value)
    } else {
        format_f64(f64::from(value))
    }
}

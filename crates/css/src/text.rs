//! Escape handling and token-shape checks shared across the sanitizers.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `#rgb` / `#rrggbb` hash colors, checked against lowercased tokens.
    pub(crate) static ref HEX_COLOR: Regex =
        Regex::new(r"^#(?:[0-9a-f]{3}){1,2}$").unwrap();
    /// Bare words eligible for quoting/coalescing in content-string values.
    pub(crate) static ref UNRESERVED_WORD: Regex =
        Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    /// Identifier shape accepted in class/id selector parts. Escapes and
    /// non-ASCII are refused until browser handling is uniform.
    pub(crate) static ref SAFE_SELECTOR_IDENT: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
}

/// Decode CSS backslash escapes in a string or url body.
///
/// `\` followed by up to six hex digits (plus one optional delimiting
/// whitespace) decodes to the code point; `\` before a newline is a line
/// continuation and decodes to nothing; `\` before anything else decodes to
/// that character.
pub fn decode_css(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => {}
            Some(&next) if next.is_ascii_hexdigit() => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 6 {
                    match chars.peek() {
                        Some(&h) if h.is_ascii_hexdigit() => {
                            value = value * 16 + h.to_digit(16).unwrap_or(0);
                            chars.next();
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                // A single whitespace after the digits delimits the escape.
                if let Some(&ws) = chars.peek() {
                    if ws == ' ' || ws == '\t' || ws == '\n' || ws == '\r' || ws == '\u{c}' {
                        chars.next();
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            Some(&'\n') => {
                chars.next();
            }
            Some(&other) => {
                out.push(other);
                chars.next();
            }
        }
    }
    out
}

/// Re-encode decoded text as the body of a double-quoted CSS string.
pub fn escape_css_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\22 "),
            '\\' => out.push_str("\\5c "),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\{:x} ", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Wrap a policy-approved URI in `url("...")`, percent-escaping every
/// character that could terminate the quoted form or become a target for
/// CSS error recovery: newlines, quotes, parentheses, asterisks and angle
/// brackets.
pub fn normalize_url(uri: &str) -> String {
    let mut out = String::with_capacity(uri.len() + 7);
    out.push_str("url(\"");
    for c in uri.chars() {
        match c {
            '\n' => out.push_str("%0a"),
            '\u{c}' => out.push_str("%0c"),
            '\r' => out.push_str("%0d"),
            '"' => out.push_str("%22"),
            '\'' => out.push_str("%27"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '*' => out.push_str("%2a"),
            '<' => out.push_str("%3c"),
            '>' => out.push_str("%3e"),
            c => out.push(c),
        }
    }
    out.push_str("\")");
    out
}

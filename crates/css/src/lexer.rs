//! CSS tokenizer feeding the sanitizers.
//!
//! Produces the flat string-token stream the sanitizers rewrite in place:
//!
//! - runs of whitespace collapse to a single `" "` token, comments vanish;
//! - quoted strings are decoded and re-emitted in normalized `"..."` form
//!   (content re-escaped, see [`crate::text::escape_css_string`]);
//! - a whole `url(...)` span becomes one token `url("<decoded body>")`;
//! - an identifier directly followed by `(` becomes one token `name(`;
//! - numbers keep their sign and unit as one token (`-1.5em`, `50%`);
//! - `#name`, `@name` and the attribute operators `~= |= ^= $= *=` are
//!   single tokens; remaining punctuation is one token per character.
//!
//! Malformed spans (unterminated strings or `url(`) degrade to token
//! removal, never to errors.

use crate::text::{decode_css, escape_css_string};

/// Tokenize a CSS fragment.
pub fn lex(input: &str) -> Vec<String> {
    Lexer::new(input).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<String>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<String> {
        while let Some(c) = self.peek(0) {
            match c {
                c if c.is_whitespace() => {
                    while matches!(self.peek(0), Some(w) if w.is_whitespace()) {
                        self.pos += 1;
                    }
                    self.push_space();
                }
                '/' if self.peek(1) == Some('*') => self.skip_comment(),
                '"' | '\'' => self.read_string(c),
                '#' => self.read_hash(),
                '@' => self.read_at_keyword(),
                '~' | '|' | '^' | '$' if self.peek(1) == Some('=') => {
                    self.tokens.push(format!("{}=", c));
                    self.pos += 2;
                }
                '*' if self.peek(1) == Some('=') => {
                    self.tokens.push("*=".to_string());
                    self.pos += 2;
                }
                c if c.is_ascii_digit() => self.read_number(),
                '+' | '-' | '.' if self.starts_number() => self.read_number(),
                c if is_ident_start(c) => self.read_ident_or_function(),
                '-' if matches!(self.peek(1), Some(n) if is_ident_char(n)) => {
                    self.read_ident_or_function()
                }
                c => {
                    self.tokens.push(c.to_string());
                    self.pos += 1;
                }
            }
        }
        self.tokens
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn push_space(&mut self) {
        if !matches!(self.tokens.last(), Some(t) if t == " ") {
            self.tokens.push(" ".to_string());
        }
    }

    fn skip_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.chars.len() {
            if self.peek(0) == Some('*') && self.peek(1) == Some('/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    /// True if pos starts a numeric token: a digit, a sign followed by a
    /// digit or dot-digit, or a dot followed by a digit.
    fn starts_number(&self) -> bool {
        match self.peek(0) {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => matches!(self.peek(1), Some(d) if d.is_ascii_digit()),
            Some('+') | Some('-') => match self.peek(1) {
                Some(d) if d.is_ascii_digit() => true,
                Some('.') => matches!(self.peek(2), Some(d) if d.is_ascii_digit()),
                _ => false,
            },
            _ => false,
        }
    }

    fn read_number(&mut self) {
        let mut token = String::new();
        if matches!(self.peek(0), Some('+') | Some('-')) {
            token.push(self.chars[self.pos]);
            self.pos += 1;
        }
        let mut seen_dot = false;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                token.push(c);
                self.pos += 1;
            } else if c == '.' && !seen_dot {
                if !matches!(self.peek(1), Some(d) if d.is_ascii_digit()) {
                    break;
                }
                seen_dot = true;
                token.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        // Unit or percent sign rides along in the same token.
        if self.peek(0) == Some('%') {
            token.push('%');
            self.pos += 1;
        } else {
            while let Some(c) = self.peek(0) {
                if is_ident_char(c) {
                    token.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.tokens.push(token);
    }

    fn read_hash(&mut self) {
        self.pos += 1;
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if is_ident_char(c) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            self.tokens.push("#".to_string());
        } else {
            self.tokens.push(format!("#{}", name));
        }
    }

    fn read_at_keyword(&mut self) {
        self.pos += 1;
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if is_ident_char(c) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            self.tokens.push("@".to_string());
        } else {
            self.tokens.push(format!("@{}", name));
        }
    }

    fn read_ident_or_function(&mut self) {
        let mut ident = String::new();
        while let Some(c) = self.peek(0) {
            if is_ident_char(c) {
                ident.push(c);
                self.pos += 1;
            } else if c == '\\' {
                self.read_ident_escape(&mut ident);
            } else {
                break;
            }
        }
        if self.peek(0) == Some('(') {
            self.pos += 1;
            if ident.eq_ignore_ascii_case("url") {
                self.read_url_body();
            } else {
                self.tokens.push(format!("{}(", ident));
            }
        } else {
            self.tokens.push(ident);
        }
    }

    fn read_ident_escape(&mut self, ident: &mut String) {
        // Reuse the string decoder on the two-or-more character escape.
        let start = self.pos;
        self.pos += 1; // backslash
        let mut digits = 0;
        while digits < 6 {
            match self.peek(0) {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.pos += 1;
                    digits += 1;
                }
                _ => break,
            }
        }
        if digits > 0 {
            if matches!(self.peek(0), Some(c) if c.is_whitespace()) {
                self.pos += 1;
            }
        } else if self.peek(0).is_some() {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        ident.push_str(&decode_css(&raw));
    }

    fn read_string(&mut self, quote: char) {
        self.pos += 1;
        let mut decoded = String::new();
        let mut terminated = false;
        while let Some(c) = self.peek(0) {
            if c == quote {
                self.pos += 1;
                terminated = true;
                break;
            }
            if c == '\n' {
                // Unterminated string; the newline stays in the input.
                break;
            }
            if c == '\\' {
                let start = self.pos;
                self.pos += 1;
                match self.peek(0) {
                    None => break,
                    Some(e) if e.is_ascii_hexdigit() => {
                        let mut digits = 0;
                        while digits < 6 {
                            match self.peek(0) {
                                Some(h) if h.is_ascii_hexdigit() => {
                                    self.pos += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        if matches!(self.peek(0), Some(w) if w.is_whitespace()) {
                            self.pos += 1;
                        }
                    }
                    Some(_) => self.pos += 1,
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                decoded.push_str(&decode_css(&raw));
                continue;
            }
            decoded.push(c);
            self.pos += 1;
        }
        let _ = terminated; // either way the collected content is used
        self.tokens.push(format!("\"{}\"", escape_css_string(&decoded)));
    }

    /// Called with the cursor just past `url(`. Emits one normalized token
    /// or, on malformed input, nothing.
    fn read_url_body(&mut self) {
        self.skip_ws();
        let decoded = match self.peek(0) {
            None => return,
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut content = String::new();
                let mut ok = false;
                while let Some(c) = self.peek(0) {
                    if c == q {
                        self.pos += 1;
                        ok = true;
                        break;
                    }
                    if c == '\n' {
                        break;
                    }
                    if c == '\\' {
                        let start = self.pos;
                        self.pos += 1;
                        if self.peek(0).is_some() {
                            let mut digits = 0;
                            if matches!(self.peek(0), Some(h) if h.is_ascii_hexdigit()) {
                                while digits < 6 {
                                    match self.peek(0) {
                                        Some(h) if h.is_ascii_hexdigit() => {
                                            self.pos += 1;
                                            digits += 1;
                                        }
                                        _ => break,
                                    }
                                }
                                if matches!(self.peek(0), Some(w) if w.is_whitespace()) {
                                    self.pos += 1;
                                }
                            } else {
                                self.pos += 1;
                            }
                        }
                        let raw: String = self.chars[start..self.pos].iter().collect();
                        content.push_str(&decode_css(&raw));
                        continue;
                    }
                    content.push(c);
                    self.pos += 1;
                }
                if !ok {
                    self.recover_to_close_paren();
                    return;
                }
                content
            }
            Some(_) => {
                let mut content = String::new();
                loop {
                    match self.peek(0) {
                        None => {
                            self.pos = self.chars.len();
                            return;
                        }
                        Some(c2) if c2 == ')' || c2.is_whitespace() => break,
                        Some('"') | Some('\'') | Some('(') => {
                            self.recover_to_close_paren();
                            return;
                        }
                        Some('\\') => {
                            let start = self.pos;
                            self.pos += 1;
                            if self.peek(0).is_some() {
                                self.pos += 1;
                            }
                            let raw: String = self.chars[start..self.pos].iter().collect();
                            content.push_str(&decode_css(&raw));
                        }
                        Some(c2) => {
                            content.push(c2);
                            self.pos += 1;
                        }
                    }
                }
                content
            }
        };
        self.skip_ws();
        if self.peek(0) == Some(')') {
            self.pos += 1;
            self.tokens.push(format!("url(\"{}\")", decoded));
        } else {
            self.recover_to_close_paren();
        }
    }

    fn recover_to_close_paren(&mut self) {
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == ')' {
                return;
            }
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(0), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '\\' || c as u32 >= 0x80
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c as u32 >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(css: &str) -> Vec<String> {
        lex(css)
    }

    #[test]
    fn test_basic_declaration() {
        assert_eq!(
            toks("color: red"),
            vec!["color", ":", " ", "red"]
        );
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(toks("a   \t\n b"), vec!["a", " ", "b"]);
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(toks("a/*x*/b"), vec!["a", "b"]);
        // Unterminated comment swallows the rest.
        assert_eq!(toks("a /* no end"), vec!["a", " "]);
    }

    #[test]
    fn test_string_normalized_to_double_quotes() {
        assert_eq!(toks("'abc'"), vec!["\"abc\""]);
        assert_eq!(toks("\"abc\""), vec!["\"abc\""]);
        // An embedded double quote is re-escaped.
        assert_eq!(toks(r#"'a"b'"#), vec!["\"a\\22 b\""]);
    }

    #[test]
    fn test_url_token_forms() {
        assert_eq!(toks("url(foo.png)"), vec!["url(\"foo.png\")"]);
        assert_eq!(toks("url( 'foo.png' )"), vec!["url(\"foo.png\")"]);
        assert_eq!(toks("url(\"foo.png\")"), vec!["url(\"foo.png\")"]);
    }

    #[test]
    fn test_malformed_url_elided() {
        assert!(toks("url(").is_empty());
        // Unterminated quoted body swallows to the recovery point.
        assert!(toks("url('x ) red").is_empty());
        assert_eq!(toks("url('x' red) b"), vec![" ", "b"]);
    }

    #[test]
    fn test_function_token() {
        assert_eq!(
            toks("rgb(255, 0, 0)"),
            vec!["rgb(", "255", ",", " ", "0", ",", " ", "0", ")"]
        );
    }

    #[test]
    fn test_numbers_keep_sign_and_unit() {
        assert_eq!(toks("-1.5em"), vec!["-1.5em"]);
        assert_eq!(toks("+.5"), vec!["+.5"]);
        assert_eq!(toks("50%"), vec!["50%"]);
        assert_eq!(toks("1px solid"), vec!["1px", " ", "solid"]);
    }

    #[test]
    fn test_hash_and_at_tokens() {
        assert_eq!(toks("#AbC"), vec!["#AbC"]);
        assert_eq!(toks("@media screen"), vec!["@media", " ", "screen"]);
    }

    #[test]
    fn test_attribute_operators() {
        assert_eq!(
            toks("[href^=\"x\"]"),
            vec!["[", "href", "^=", "\"x\"", "]"]
        );
        assert_eq!(toks("a~=b"), vec!["a", "~=", "b"]);
    }

    #[test]
    fn test_selector_punctuation() {
        assert_eq!(
            toks("div.cls#id > p"),
            vec!["div", ".", "cls", "#id", " ", ">", " ", "p"]
        );
    }

    #[test]
    fn test_ident_escapes_decoded() {
        assert_eq!(toks(r"\62 ad"), vec!["bad"]);
    }

    #[test]
    fn test_important_tokens() {
        assert_eq!(
            toks("red !important"),
            vec!["red", " ", "!", "important"]
        );
    }
}

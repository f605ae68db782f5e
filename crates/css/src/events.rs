//! Structural event dispatch over the token stream.
//!
//! Walks a lexed stylesheet and drives a [`StylesheetHandler`] with
//! balanced start/end events. Parsing is forward-compatible in the CSS2.1
//! sense: a malformed construct is skipped to the next safe boundary and
//! never aborts the walk, and missing end events are synthesized at EOF so
//! handlers always see balanced pairs.

use crate::lexer::lex;

/// Receiver for the structural parse events of one stylesheet.
pub trait StylesheetHandler {
    fn start_stylesheet(&mut self) {}
    fn end_stylesheet(&mut self) {}
    /// `name` is the lowercased at-keyword including `@`; `header` holds
    /// the tokens between the keyword and the block or semicolon.
    fn start_atrule(&mut self, name: &str, header: &[String]);
    fn end_atrule(&mut self);
    fn start_block(&mut self);
    fn end_block(&mut self);
    fn start_ruleset(&mut self, selector_tokens: &mut Vec<String>);
    fn end_ruleset(&mut self);
    /// Raw value tokens, `!important` still attached if present.
    fn declaration(&mut self, property: &str, value: &mut Vec<String>);
}

/// Lex `css` and dispatch its structure to `handler`.
pub fn parse_stylesheet_text(css: &str, handler: &mut dyn StylesheetHandler) {
    let tokens = lex(css);
    let mut parser = EventParser { tokens, pos: 0 };
    handler.start_stylesheet();
    parser.parse_rules(handler, true);
    handler.end_stylesheet();
}

struct EventParser {
    tokens: Vec<String>,
    pos: usize,
}

impl EventParser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(" ") | Some(";")) {
            self.pos += 1;
        }
    }

    fn parse_rules(&mut self, handler: &mut dyn StylesheetHandler, top_level: bool) {
        loop {
            self.skip_space();
            match self.peek() {
                None => return,
                Some("}") => {
                    if top_level {
                        // Stray close brace; skip and continue.
                        self.pos += 1;
                    } else {
                        return;
                    }
                }
                Some(t) if t.starts_with('@') && t.len() > 1 => {
                    self.parse_atrule(handler);
                }
                _ => self.parse_ruleset(handler),
            }
        }
    }

    fn parse_atrule(&mut self, handler: &mut dyn StylesheetHandler) {
        let name = self.tokens[self.pos].to_lowercase();
        self.pos += 1;
        let mut header: Vec<String> = Vec::new();
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => {
                    handler.start_atrule(&name, &header);
                    handler.end_atrule();
                    return;
                }
                Some(";") if depth == 0 => {
                    self.pos += 1;
                    handler.start_atrule(&name, &header);
                    handler.end_atrule();
                    return;
                }
                Some("{") if depth == 0 => {
                    self.pos += 1;
                    handler.start_atrule(&name, &header);
                    handler.start_block();
                    self.parse_rules(handler, false);
                    if self.peek() == Some("}") {
                        self.pos += 1;
                    }
                    handler.end_block();
                    handler.end_atrule();
                    return;
                }
                Some(" ") => self.pos += 1,
                Some(t) => {
                    depth += nesting_delta(t);
                    header.push(t.to_string());
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_ruleset(&mut self, handler: &mut dyn StylesheetHandler) {
        let mut selector: Vec<String> = Vec::new();
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => return, // selector with no block: dropped
                Some("{") if depth <= 0 => {
                    self.pos += 1;
                    break;
                }
                Some("}") if depth <= 0 => {
                    // Malformed: let the caller decide what the brace ends.
                    return;
                }
                Some(t) => {
                    depth += nesting_delta(t);
                    selector.push(t.to_string());
                    self.pos += 1;
                }
            }
        }
        handler.start_ruleset(&mut selector);
        self.parse_declarations(handler);
        handler.end_ruleset();
    }

    fn parse_declarations(&mut self, handler: &mut dyn StylesheetHandler) {
        loop {
            self.skip_space();
            match self.peek() {
                None => return, // unbalanced input: end events are synthesized
                Some("}") => {
                    self.pos += 1;
                    return;
                }
                Some(_) => {
                    let property = self.tokens[self.pos].clone();
                    self.pos += 1;
                    while self.peek() == Some(" ") {
                        self.pos += 1;
                    }
                    if self.peek() != Some(":") {
                        self.recover_declaration();
                        continue;
                    }
                    self.pos += 1;
                    let mut value: Vec<String> = Vec::new();
                    let mut depth = 0i32;
                    loop {
                        match self.peek() {
                            None => break,
                            Some(";") if depth == 0 => {
                                self.pos += 1;
                                break;
                            }
                            // Brace matching wins over unbalanced parens so
                            // sibling rules after a broken value still parse.
                            Some("}") => break,
                            Some(t) => {
                                depth += nesting_delta(t);
                                value.push(t.to_string());
                                self.pos += 1;
                            }
                        }
                    }
                    while value.last().map(String::as_str) == Some(" ") {
                        value.pop();
                    }
                    while value.first().map(String::as_str) == Some(" ") {
                        value.remove(0);
                    }
                    handler.declaration(&property, &mut value);
                }
            }
        }
    }

    /// Skip a malformed declaration to the next `;` or the closing `}`.
    fn recover_declaration(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => return,
                Some(";") if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                Some("}") => return,
                Some(t) => {
                    depth += nesting_delta(t);
                    self.pos += 1;
                }
            }
        }
    }
}

fn nesting_delta(token: &str) -> i32 {
    if token == "[" || token == "(" || (token.ends_with('(') && !token.starts_with('"')) {
        1
    } else if token == "]" || token == ")" {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Records events as readable strings.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl StylesheetHandler for Recorder {
        fn start_stylesheet(&mut self) {
            self.events.push("start".into());
        }
        fn end_stylesheet(&mut self) {
            self.events.push("end".into());
        }
        fn start_atrule(&mut self, name: &str, header: &[String]) {
            self.events.push(format!("atrule {} [{}]", name, header.join("")));
        }
        fn end_atrule(&mut self) {
            self.events.push("end-atrule".into());
        }
        fn start_block(&mut self) {
            self.events.push("{".into());
        }
        fn end_block(&mut self) {
            self.events.push("}".into());
        }
        fn start_ruleset(&mut self, selector_tokens: &mut Vec<String>) {
            self.events.push(format!("ruleset {}", selector_tokens.join("")));
        }
        fn end_ruleset(&mut self) {
            self.events.push("end-ruleset".into());
        }
        fn declaration(&mut self, property: &str, value: &mut Vec<String>) {
            self.events.push(format!("decl {}={}", property, value.join(" ")));
        }
    }

    fn record(css: &str) -> Vec<String> {
        let mut recorder = Recorder::default();
        parse_stylesheet_text(css, &mut recorder);
        recorder.events
    }

    #[test]
    fn test_simple_ruleset() {
        assert_eq!(
            record("p { color: red; margin: 0 }"),
            vec![
                "start",
                "ruleset p",
                "decl color=red",
                "decl margin=0",
                "end-ruleset",
                "end",
            ]
        );
    }

    #[test]
    fn test_atrule_with_block() {
        assert_eq!(
            record("@media screen { p { color: red } }"),
            vec![
                "start",
                "atrule @media [screen]",
                "{",
                "ruleset p",
                "decl color=red",
                "end-ruleset",
                "}",
                "end-atrule",
                "end",
            ]
        );
    }

    #[test]
    fn test_atrule_without_block() {
        assert_eq!(
            record("@import url(x.css);"),
            vec!["start", "atrule @import [url(\"x.css\")]", "end-atrule", "end"]
        );
    }

    #[test]
    fn test_unbalanced_input_still_balanced_events() {
        assert_eq!(
            record("p { color: red"),
            vec!["start", "ruleset p", "decl color=red", "end-ruleset", "end"]
        );
        assert_eq!(
            record("@media screen { p { color: red"),
            vec![
                "start",
                "atrule @media [screen]",
                "{",
                "ruleset p",
                "decl color=red",
                "end-ruleset",
                "}",
                "end-atrule",
                "end",
            ]
        );
    }

    #[test]
    fn test_malformed_declaration_recovers() {
        assert_eq!(
            record("p { color red; margin: 0 }"),
            vec!["start", "ruleset p", "decl margin=0", "end-ruleset", "end"]
        );
    }

    #[test]
    fn test_stray_close_brace_skipped() {
        assert_eq!(
            record("} p { color: red }"),
            vec!["start", "ruleset p", "decl color=red", "end-ruleset", "end"]
        );
    }

    #[test]
    fn test_selector_without_block_dropped() {
        assert_eq!(record("p.foo"), vec!["start", "end"]);
    }

    #[test]
    fn test_semicolon_inside_function_not_a_terminator() {
        // The lexer folds url(...) into one token, so this exercises
        // unknown function tokens instead.
        assert_eq!(
            record("p { background: f(a;b); }"),
            vec![
                "start",
                "ruleset p",
                "decl background=f( a ; b )",
                "end-ruleset",
                "end"
            ]
        );
    }
}

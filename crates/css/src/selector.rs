//! Selector list sanitizer and rewriter.
//!
//! Splits a selector token stream into complex selectors, vets every
//! compound against the virtualization policies, rewrites ids with the
//! instance suffix, scopes the result under the container class, and
//! partitions the output into history-insensitive and history-sensitive
//! groups (`:link`/`:visited` selectors go to the latter, with their
//! element constraint forced to `a`).
//!
//! A failed compound invalidates its whole complex selector; other complex
//! selectors in the same list are unaffected.

use palisade_policy::{AttrKind, Virtualization};

use crate::text::{decode_css, escape_css_string, SAFE_SELECTOR_IDENT};

/// Pseudo-classes admitted in sanitized selectors. `link`/`visited` are
/// handled separately because they flip the compound into the
/// history-sensitive group.
const ALLOWED_PSEUDO_CLASSES: &[&str] = &[
    "active", "after", "before", "blank", "checked", "default", "disabled",
    "drop", "empty", "enabled", "first", "first-child", "first-letter",
    "first-line", "first-of-type", "focus", "fullscreen", "hover",
    "in-range", "indeterminate", "invalid", "last-child", "last-of-type",
    "left", "only-child", "only-of-type", "optional", "out-of-range",
    "placeholder-shown", "read-only", "read-write", "required", "right",
    "root", "scope", "user-error", "valid",
];

/// Sanitized selectors, partitioned by history sensitivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorGroups {
    pub history_insensitive: Vec<String>,
    pub history_sensitive: Vec<String>,
}

impl SelectorGroups {
    pub fn is_empty(&self) -> bool {
        self.history_insensitive.is_empty() && self.history_sensitive.is_empty()
    }
}

/// Sanitize a selector list.
///
/// Untranslatable complex selectors are silently dropped unless
/// `on_untranslatable` is supplied; if the callback returns `false` the
/// entire call aborts with `None` (all-or-nothing semantics).
pub fn sanitize_selector_tokens(
    tokens: &mut Vec<String>,
    virtualization: &Virtualization,
    mut on_untranslatable: Option<&mut dyn FnMut(&[String]) -> bool>,
) -> Option<SelectorGroups> {
    normalize_whitespace(tokens);

    let mut groups = SelectorGroups::default();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i <= tokens.len() {
        let at_comma = i < tokens.len() && tokens[i] == "," && depth == 0;
        if i == tokens.len() || at_comma {
            let complex = &tokens[start..i];
            match sanitize_complex(complex, virtualization) {
                Some((text, history_sensitive)) => {
                    if history_sensitive {
                        groups.history_sensitive.push(text);
                    } else {
                        groups.history_insensitive.push(text);
                    }
                }
                None => {
                    if !complex.is_empty() {
                        if let Some(callback) = on_untranslatable.as_mut() {
                            if !callback(complex) {
                                return None;
                            }
                        }
                    }
                }
            }
            start = i + 1;
        } else {
            depth += nesting_delta(&tokens[i]);
        }
        i += 1;
    }
    Some(groups)
}

/// Remove space tokens that are not descendant combinators: spaces inside
/// brackets or parens, and spaces that merely pad an explicit combinator or
/// comma.
fn normalize_whitespace(tokens: &mut Vec<String>) {
    let mut keep = vec![true; tokens.len()];
    let mut depth = 0i32;
    for i in 0..tokens.len() {
        if tokens[i] == " " {
            let prev = if i > 0 { Some(tokens[i - 1].as_str()) } else { None };
            let next = tokens.get(i + 1).map(String::as_str);
            let padding = |t: Option<&str>| {
                matches!(t, Some(">") | Some("+") | Some("~") | Some(","))
            };
            if depth > 0 || padding(prev) || padding(next) {
                keep[i] = false;
            }
        } else {
            depth += nesting_delta(&tokens[i]);
        }
    }
    let mut idx = 0;
    tokens.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
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

struct Compound {
    text: String,
    history_sensitive: bool,
    /// Lowercased element-type token as written, before policy mapping.
    element: Option<String>,
}

/// Sanitize one complex selector (a combinator chain). Returns the emitted
/// text and whether any compound was history-sensitive.
fn sanitize_complex(
    tokens: &[String],
    virtualization: &Virtualization,
) -> Option<(String, bool)> {
    let mut tokens = tokens;
    while tokens.first().map(String::as_str) == Some(" ") {
        tokens = &tokens[1..];
    }
    while tokens.last().map(String::as_str) == Some(" ") {
        tokens = &tokens[..tokens.len() - 1];
    }
    if tokens.is_empty() {
        return None;
    }

    // Split into compounds around combinator tokens at nesting depth zero.
    let mut parts: Vec<(&[String], Option<&str>)> = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if depth == 0 && matches!(token.as_str(), " " | ">" | "+" | "~") {
            parts.push((&tokens[start..i], Some(token.as_str())));
            start = i + 1;
        } else {
            depth += nesting_delta(token);
        }
    }
    parts.push((&tokens[start..], None));

    let mut out = String::new();
    let mut history_sensitive = false;
    let count = parts.len();
    for (idx, (compound_tokens, combinator)) in parts.iter().enumerate() {
        let last = idx + 1 == count;
        let compound = sanitize_compound(compound_tokens, virtualization)?;
        // An ancestor constraint on the document root would escape the
        // sandboxed subtree no matter what follows it.
        if !last && compound.element.as_deref() == Some("html") {
            return None;
        }
        history_sensitive |= compound.history_sensitive;
        out.push_str(&compound.text);
        match *combinator {
            Some(" ") => out.push(' '),
            Some(op) => {
                out.push(' ');
                out.push_str(op);
                out.push(' ');
            }
            None => {}
        }
    }

    if let Some(container) = virtualization.container_class() {
        let scope = format!(".{}", container);
        if out != scope && !out.starts_with(&format!("{} ", scope)) {
            out = format!("{} {}", scope, out);
        }
    }
    Some((out, history_sensitive))
}

/// Sanitize one compound selector:
/// `element? (#id | .class)* ([attr op value])* (:pseudo)?`.
fn sanitize_compound(
    tokens: &[String],
    virtualization: &Virtualization,
) -> Option<Compound> {
    let n = tokens.len();
    let mut i = 0;

    let mut element_written: Option<String> = None;
    let mut element = String::new();
    if i < n {
        let tok = tokens[i].to_lowercase();
        if tok == "*" {
            element_written = Some(tok.clone());
            element = tok;
            i += 1;
        } else if SAFE_SELECTOR_IDENT.is_match(&tok) {
            element = virtualization.tag_policy().rewrite_tag(&tok)?;
            element_written = Some(tok);
            i += 1;
        }
    }

    let mut class_id = String::new();
    while i < n {
        let tok = &tokens[i];
        if let Some(name) = tok.strip_prefix('#') {
            if !SAFE_SELECTOR_IDENT.is_match(name) || name.ends_with("__") {
                return None;
            }
            class_id.push('#');
            class_id.push_str(name);
            let suffix = virtualization.id_suffix();
            if !suffix.is_empty() && !name.ends_with(suffix) {
                class_id.push_str(suffix);
            }
            i += 1;
        } else if tok == "." {
            i += 1;
            let name = tokens.get(i)?;
            if !SAFE_SELECTOR_IDENT.is_match(name) || name.ends_with("__") {
                return None;
            }
            class_id.push('.');
            class_id.push_str(name);
            i += 1;
        } else {
            break;
        }
    }

    let mut attrs = String::new();
    while i < n && tokens[i] == "[" {
        i += 1;
        let (consumed, text) = sanitize_attribute(
            &tokens[i..],
            element_written.as_deref().unwrap_or("*"),
            virtualization,
        )?;
        attrs.push_str(&text);
        i += consumed;
    }

    let mut pseudo = String::new();
    let mut history_sensitive = false;
    if i < n && tokens[i] == ":" {
        i += 1;
        let name = tokens.get(i)?.to_lowercase();
        if name == "link" || name == "visited" {
            // History-sensitive selectors only ever match anchors.
            match element_written.as_deref() {
                None | Some("a") | Some("*") => {}
                _ => return None,
            }
            element = virtualization.tag_policy().rewrite_tag("a")?;
            history_sensitive = true;
            pseudo = format!(":{}", name);
        } else if ALLOWED_PSEUDO_CLASSES.contains(&name.as_str()) {
            pseudo = format!(":{}", name);
        } else {
            return None;
        }
        i += 1;
    }

    if i != n {
        return None;
    }
    let text = format!("{}{}{}{}", element, class_id, attrs, pseudo);
    if text.is_empty() {
        return None;
    }
    Some(Compound {
        text,
        history_sensitive,
        element: element_written,
    })
}

/// Sanitize one `attr op value]` tail (the opening `[` is already
/// consumed). Returns the number of tokens consumed and the emitted text.
fn sanitize_attribute(
    tokens: &[String],
    element: &str,
    virtualization: &Virtualization,
) -> Option<(usize, String)> {
    let mut i = 0;
    let attr = tokens.get(i)?.to_lowercase();
    if !SAFE_SELECTOR_IDENT.is_match(&attr) {
        return None;
    }
    let kind = virtualization.attributes().kind(element, &attr)?;
    i += 1;

    if tokens.get(i).map(String::as_str) == Some("]") {
        return Some((i + 1, format!("[{}]", attr)));
    }

    let op = tokens.get(i)?.as_str();
    if !matches!(op, "=" | "~=" | "|=" | "^=" | "$=" | "*=") {
        return None;
    }
    let op = op.to_string();
    i += 1;

    // URI attributes are rewritten wholesale; any value match would leak
    // or misfire on the rewritten content.
    if kind == AttrKind::Uri {
        return None;
    }

    let raw = tokens.get(i)?;
    let value = if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        decode_css(&raw[1..raw.len() - 1])
    } else if SAFE_SELECTOR_IDENT.is_match(raw) {
        raw.clone()
    } else {
        return None;
    };
    i += 1;

    // A case-insensitivity flag would defeat suffix scoping and is refused
    // outright.
    if tokens.get(i).map(String::as_str) != Some("]") {
        return None;
    }
    i += 1;

    let value = match kind {
        AttrKind::Id | AttrKind::IdRef => {
            let suffix = virtualization.id_suffix();
            match op.as_str() {
                // Exact and word-list matches stay correct with the suffix
                // appended to each id.
                "=" | "~=" => {
                    if suffix.is_empty() || value.ends_with(suffix) {
                        value
                    } else {
                        format!("{}{}", value, suffix)
                    }
                }
                // Prefix matching is unaffected by a suffix.
                "^=" => value,
                _ => return None,
            }
        }
        AttrKind::Plain => value,
        AttrKind::Uri => return None,
    };

    Some((i, format!("[{}{}\"{}\"]", attr, op, escape_css_string(&value))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use palisade_policy::{SafeTagPolicy, Virtualization};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn virt() -> Virtualization {
        Virtualization::new(Some("sfx"), "-sfx", Arc::new(SafeTagPolicy::default()))
            .unwrap()
    }

    fn run(css: &str, v: &Virtualization) -> SelectorGroups {
        let mut tokens = lex(css);
        sanitize_selector_tokens(&mut tokens, v, None).unwrap()
    }

    #[test]
    fn test_id_suffix_and_container_scope() {
        let groups = run("a#foo", &virt());
        assert_eq!(groups.history_insensitive, vec![".sfx a#foo-sfx"]);
        assert!(groups.history_sensitive.is_empty());
    }

    #[test]
    fn test_unscoped_passthrough() {
        let groups = run("p.note", &Virtualization::unscoped());
        assert_eq!(groups.history_insensitive, vec!["p.note"]);
    }

    #[test]
    fn test_combinators_preserved() {
        let groups = run("div > p, ul li", &virt());
        assert_eq!(
            groups.history_insensitive,
            vec![".sfx div > p", ".sfx ul li"]
        );
    }

    #[test]
    fn test_visited_goes_history_sensitive() {
        let groups = run("a:visited", &virt());
        assert!(groups.history_insensitive.is_empty());
        assert_eq!(groups.history_sensitive, vec![".sfx a:visited"]);
    }

    #[test]
    fn test_link_forces_anchor_element() {
        let groups = run("*:link", &virt());
        assert_eq!(groups.history_sensitive, vec![".sfx a:link"]);
        // Non-anchor elements cannot carry link pseudo-classes.
        assert!(run("div:visited", &virt()).is_empty());
    }

    #[test]
    fn test_rejected_element_drops_only_its_selector() {
        let groups = run("script, p", &virt());
        assert_eq!(groups.history_insensitive, vec![".sfx p"]);
    }

    #[test]
    fn test_html_ancestor_rejected() {
        let permissive = Virtualization::new(
            Some("sfx"),
            "-sfx",
            Arc::new(SafeTagPolicy::new(["html", "p", "a"])),
        )
        .unwrap();
        assert!(run("html > p", &permissive).is_empty());
        assert!(run("html p", &permissive).is_empty());
        // Terminal html is a policy call, not an ancestor escape.
        assert_eq!(run("p", &permissive).history_insensitive, vec![".sfx p"]);
    }

    #[test]
    fn test_pseudo_class_allowlist() {
        assert_eq!(
            run("a:hover", &virt()).history_insensitive,
            vec![".sfx a:hover"]
        );
        assert!(run("a:target", &virt()).is_empty());
        assert!(run("input:checked", &virt()).is_empty()); // input not allowed
    }

    #[test]
    fn test_reserved_identifiers_rejected() {
        assert!(run("#foo__", &virt()).is_empty());
        assert!(run(".bar__", &virt()).is_empty());
        assert!(run("#_x", &virt()).is_empty());
        assert!(run(".9lives", &virt()).is_empty());
    }

    #[test]
    fn test_attribute_selectors() {
        // Existence check on a URI attribute is the only URI form allowed.
        assert_eq!(
            run("a[href]", &virt()).history_insensitive,
            vec![".sfx a[href]"]
        );
        assert!(run("a[href=\"http://evil\"]", &virt()).is_empty());
        assert!(run("a[href^=\"https\"]", &virt()).is_empty());

        // Id attributes are suffixed on exact matches.
        assert_eq!(
            run("p[id=\"x\"]", &virt()).history_insensitive,
            vec![".sfx p[id=\"x-sfx\"]"]
        );
        // Prefix match survives unsuffixed; suffix/substring are refused.
        assert_eq!(
            run("p[id^=\"x\"]", &virt()).history_insensitive,
            vec![".sfx p[id^=\"x\"]"]
        );
        assert!(run("p[id$=\"x\"]", &virt()).is_empty());
        assert!(run("p[id*=\"x\"]", &virt()).is_empty());

        // Plain attributes take any operator.
        assert_eq!(
            run("td[title~=\"hi\"]", &virt()).history_insensitive,
            vec![".sfx td[title~=\"hi\"]"]
        );

        // Unknown attributes are refused.
        assert!(run("p[data-secret]", &virt()).is_empty());
    }

    #[test]
    fn test_malformed_compound_rejected() {
        assert!(run("p..x", &virt()).is_empty());
        assert!(run("p#", &virt()).is_empty());
        assert!(run("p[", &virt()).is_empty());
        assert!(run("p::", &virt()).is_empty());
    }

    #[test]
    fn test_untranslatable_callback_aborts() {
        let v = virt();
        let mut tokens = lex("script, p");
        let mut seen: Vec<Vec<String>> = Vec::new();
        let mut callback = |offending: &[String]| {
            seen.push(offending.to_vec());
            false
        };
        let result = sanitize_selector_tokens(&mut tokens, &v, Some(&mut callback));
        assert!(result.is_none());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec!["script".to_string()]);
    }

    #[test]
    fn test_untranslatable_callback_continue() {
        let v = virt();
        let mut tokens = lex("script, p");
        let mut callback = |_: &[String]| true;
        let result = sanitize_selector_tokens(&mut tokens, &v, Some(&mut callback)).unwrap();
        assert_eq!(result.history_insensitive, vec![".sfx p"]);
    }

    #[test]
    fn test_idempotent_rewrite() {
        let v = virt();
        let first = run("a#foo, a:visited", &v);
        let again_insensitive = run(&first.history_insensitive.join(", "), &v);
        assert_eq!(
            again_insensitive.history_insensitive,
            first.history_insensitive
        );
        let again_sensitive = run(&first.history_sensitive.join(", "), &v);
        assert_eq!(again_sensitive.history_sensitive, first.history_sensitive);
    }
}

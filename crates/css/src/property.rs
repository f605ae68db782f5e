//! Declaration-value sanitizer.
//!
//! Rewrites one declaration's value tokens in place against the property's
//! schema entry. Each token is classified by its own surface form; anything
//! the entry does not admit is deleted. Unknown properties lose their whole
//! value, and a URL rejected by policy elides the whole value rather than
//! leaving a partial one behind.

use url::Url;

use palisade_policy::UrlPolicy;

use crate::schema::{PropertyEntry, PropertySchema, ValueBits};
use crate::text::{decode_css, normalize_url, HEX_COLOR, UNRESERVED_WORD};

/// Internal marker for a URL the policy refused. Never emitted: the
/// post-pass elides any value containing it. The lexer cannot produce this
/// form (url tokens always carry a quoted body).
const REJECTED_URL: &str = "url()";

/// Sanitize `tokens` in place against `schema`'s entry for `property`.
pub fn sanitize_property_tokens(
    property: &str,
    tokens: &mut Vec<String>,
    url_policy: Option<&dyn UrlPolicy>,
    base_uri: Option<&Url>,
    schema: &PropertySchema,
    max_function_depth: usize,
) {
    let entry = match schema.get(property) {
        Some(entry) => entry,
        None => {
            tracing::debug!(property, "unknown property elided");
            tokens.clear();
            return;
        }
    };
    sanitize_value(
        property,
        entry,
        tokens,
        url_policy,
        base_uri,
        schema,
        max_function_depth,
    );
    // Fail closed: a refused URL poisons the whole value.
    if tokens.iter().any(|t| t == REJECTED_URL) {
        tokens.clear();
    }
}

fn sanitize_value(
    property: &str,
    entry: &PropertyEntry,
    tokens: &mut Vec<String>,
    url_policy: Option<&dyn UrlPolicy>,
    base_uri: Option<&Url>,
    schema: &PropertySchema,
    depth: usize,
) {
    let bits = entry.bits();
    let content_ok = bits.contains(ValueBits::QSTRING_CONTENT);
    let url_ok = bits.contains(ValueBits::QSTRING_URL);
    let quantity_ok = bits.contains(ValueBits::QUANTITY);
    let negative_ok = bits.contains(ValueBits::NEGATIVE_QUANTITY);

    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    // Index in `out` of the last quoted-keyword token, for coalescing
    // consecutive bare words into one quoted literal.
    let mut last_quoted: Option<usize> = None;

    let mut i = 0;
    while i < tokens.len() {
        let raw = tokens[i].clone();
        let token = raw.to_lowercase();
        let mut chars = token.chars();
        let c0 = chars.next();
        let c1 = chars.next();
        let c2 = chars.next();
        let digit1 = matches!(c1, Some(c) if c.is_ascii_digit());
        let digit2 = matches!(c2, Some(c) if c.is_ascii_digit());

        match c0 {
            None | Some(' ') => {}
            Some('"') => {
                if url_ok && !content_ok {
                    if let (Some(policy), Some(body)) = (url_policy, quoted_body(&raw)) {
                        out.push(checked_url(&decode_css(body), property, policy, base_uri));
                    }
                } else if content_ok && !url_ok {
                    out.push(token);
                }
                // Both bits (ambiguous) or neither: dropped.
            }
            Some('#') => {
                if HEX_COLOR.is_match(&token) && bits.contains(ValueBits::HASH_VALUE) {
                    out.push(token);
                }
            }
            Some(c) if c.is_ascii_digit() => {
                if quantity_ok {
                    out.push(token);
                }
            }
            // +.5 -> 0.5, +5 -> 5 when quantities are allowed.
            Some('+') if digit1 || (c1 == Some('.') && digit2) => {
                if quantity_ok {
                    if digit1 {
                        out.push(token[1..].to_string());
                    } else {
                        out.push(format!("0{}", &token[1..]));
                    }
                }
            }
            // -.5 -> -0.5 when negatives are allowed, else 0 when
            // quantities are, else nothing.
            Some('-') if digit1 || (c1 == Some('.') && digit2) => {
                if negative_ok {
                    if digit1 {
                        out.push(token);
                    } else {
                        out.push(format!("-0{}", &token[1..]));
                    }
                } else if quantity_ok {
                    out.push("0".to_string());
                }
            }
            // .5 -> 0.5
            Some('.') if digit1 => {
                if quantity_ok {
                    out.push(format!("0{}", token));
                }
            }
            _ if token.starts_with("url(") => {
                if url_ok {
                    if let (Some(policy), Some(body)) = (url_policy, url_body(&raw)) {
                        out.push(checked_url(body, property, policy, base_uri));
                    }
                }
            }
            _ if token.ends_with('(') => {
                // Function call: consume to the matching close paren.
                let (end, balanced) = scan_call(tokens, i);
                if balanced {
                    let name = &token[..token.len() - 1];
                    let nested = entry
                        .function_key(name)
                        .and_then(|key| schema.get(key));
                    match nested {
                        Some(nested_entry) if depth > 0 => {
                            let mut inner: Vec<String> = tokens[i + 1..end - 1].to_vec();
                            sanitize_value(
                                property,
                                nested_entry,
                                &mut inner,
                                url_policy,
                                base_uri,
                                schema,
                                depth - 1,
                            );
                            if inner.iter().any(|t| t == REJECTED_URL) {
                                out.push(REJECTED_URL.to_string());
                            } else {
                                out.push(format!("{}({})", name, inner.join(" ")));
                            }
                        }
                        // Unknown function or recursion too deep: the whole
                        // call is elided.
                        _ => {}
                    }
                }
                i = end;
                continue;
            }
            _ if entry.allows_literal(&token) => {
                out.push(token);
            }
            // Quote unrecognized bare words on content-string properties so
            // "Arial Black" and the keyword pair sanitize alike.
            _ if content_ok && !url_ok && UNRESERVED_WORD.is_match(&token) => {
                match last_quoted {
                    Some(lq) if lq + 1 == out.len() => {
                        let merged =
                            format!("{} {}\"", &out[lq][..out[lq].len() - 1], token);
                        out[lq] = merged;
                    }
                    _ => {
                        out.push(format!("\"{}\"", token));
                        last_quoted = Some(out.len() - 1);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    *tokens = out;
}

/// Content of a normalized `"..."` token, or None if malformed.
fn quoted_body(raw: &str) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

/// Content of a normalized `url("...")` token, or None if malformed.
fn url_body(raw: &str) -> Option<&str> {
    let prefix_ok = raw
        .get(..5)
        .map(|p| p.eq_ignore_ascii_case("url(\""))
        .unwrap_or(false);
    if prefix_ok && raw.len() >= 7 && raw.ends_with("\")") {
        Some(&raw[5..raw.len() - 2])
    } else {
        None
    }
}

/// Resolve and vet one URL. Returns the normalized `url("...")` token, or
/// the rejection marker.
fn checked_url(
    body: &str,
    property: &str,
    policy: &dyn UrlPolicy,
    base_uri: Option<&Url>,
) -> String {
    let resolved = match base_uri {
        Some(base) => base.join(body),
        None => Url::parse(body),
    };
    match resolved.ok().and_then(|uri| policy.rewrite(&uri, property)) {
        Some(safe) => normalize_url(&safe),
        None => {
            tracing::debug!(property, url = body, "URL rejected by policy");
            REJECTED_URL.to_string()
        }
    }
}

/// Exclusive end of the function call starting at `start` (whose token ends
/// with `(`), tracking nested parens. Second value is false when the call
/// never closes.
fn scan_call(tokens: &[String], start: usize) -> (usize, bool) {
    let mut depth = 1usize;
    let mut i = start + 1;
    while i < tokens.len() && depth > 0 {
        let t = &tokens[i];
        if t == ")" {
            depth -= 1;
        } else if t.ends_with('(') && !t.starts_with('"') {
            depth += 1;
        }
        i += 1;
    }
    (i, depth == 0)
}

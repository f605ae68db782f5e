//! Stylesheet driver.
//!
//! Consumes the structural event stream, routes declaration values through
//! the property sanitizer and ruleset headers through the selector
//! sanitizer, applies the history-sensitivity filter, handles `@media` and
//! `@import`, and assembles the final safe CSS text.
//!
//! Declarations are collected per ruleset and emitted in two passes: once
//! under the history-insensitive selectors, and once — filtered — under the
//! history-sensitive ones. Output braces always balance, whatever the
//! input looked like.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

use palisade_policy::{UrlPolicy, Virtualization};

use crate::events::{parse_stylesheet_text, StylesheetHandler};
use crate::history::filter_history_sensitive;
use crate::limits::Limits;
use crate::property::sanitize_property_tokens;
use crate::schema::{default_schema, PropertySchema};
use crate::selector::{sanitize_selector_tokens, SelectorGroups};

/// Media types that may appear in a kept `@media` header. Anything else —
/// including feature queries, which can probe the host environment —
/// elides the whole rule.
const MEDIA_TYPES: &[&str] = &[
    "all", "braille", "embossed", "handheld", "print", "projection",
    "screen", "speech", "tty", "tv",
];

/// Outcome of a sanitization that may still be resolving `@import`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationResult {
    pub text: String,
    /// True while any external import fetch is outstanding.
    pub more_to_come: bool,
}

/// Callback handed to a [`StyleFetcher`]; invoke with the fetched
/// stylesheet body, or `None` on failure.
pub type FetchCallback = Box<dyn FnOnce(Option<String>) + Send>;

/// Caller-supplied fetcher for `@import` targets. The engine never fetches
/// on its own; timeouts and scheduling are the fetcher's concern.
pub trait StyleFetcher: Send + Sync {
    fn fetch(&self, uri: &Url, on_result: FetchCallback);
}

/// Invoked exactly once per resolved import with that import's fully
/// sanitized text; the flag is false on the final invocation.
pub type ImportContinuation = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Sanitize a stylesheet. `@import` rules are elided (and logged), since
/// no fetcher is available on this path.
pub fn sanitize_stylesheet(
    base_uri: &Url,
    css_text: &str,
    virtualization: &Virtualization,
    url_policy: Option<&dyn UrlPolicy>,
) -> String {
    let schema = default_schema();
    sanitize_stylesheet_with_schema(
        base_uri,
        css_text,
        virtualization,
        url_policy,
        &schema,
        &Limits::default(),
    )
}

/// [`sanitize_stylesheet`] with an explicit schema and limits.
pub fn sanitize_stylesheet_with_schema(
    base_uri: &Url,
    css_text: &str,
    virtualization: &Virtualization,
    url_policy: Option<&dyn UrlPolicy>,
    schema: &PropertySchema,
    limits: &Limits,
) -> String {
    if css_text.len() > limits.max_css_bytes {
        tracing::warn!(bytes = css_text.len(), "stylesheet over size limit, elided");
        return String::new();
    }
    let mut driver = StylesheetDriver::new(
        schema,
        virtualization,
        url_policy,
        base_uri,
        limits,
        false,
    );
    parse_stylesheet_text(css_text, &mut driver);
    driver.out
}

/// Sanitize a stylesheet, resolving `@import` through `fetcher`.
///
/// Returns the synchronously sanitized text; each import's sanitized text
/// (nested imports included, resolved depth-first) is delivered through
/// `continuation` as its fetch completes. `more_to_come` stays true until
/// the final delivery.
pub fn sanitize_stylesheet_with_externals(
    base_uri: &Url,
    css_text: &str,
    virtualization: &Virtualization,
    url_policy: Option<Arc<dyn UrlPolicy>>,
    fetcher: Option<Arc<dyn StyleFetcher>>,
    continuation: ImportContinuation,
) -> SanitizationResult {
    let context = ExternalContext {
        schema: default_schema(),
        virtualization: virtualization.clone(),
        url_policy,
        fetcher,
        continuation,
        pending: Arc::new(AtomicUsize::new(0)),
        limits: Limits::default(),
        depth: Limits::default().max_import_depth,
    };
    sanitize_with_externals_inner(base_uri, css_text, &context)
}

#[derive(Clone)]
struct ExternalContext {
    schema: Arc<PropertySchema>,
    virtualization: Virtualization,
    url_policy: Option<Arc<dyn UrlPolicy>>,
    fetcher: Option<Arc<dyn StyleFetcher>>,
    continuation: ImportContinuation,
    pending: Arc<AtomicUsize>,
    limits: Limits,
    depth: usize,
}

fn sanitize_with_externals_inner(
    base_uri: &Url,
    css_text: &str,
    context: &ExternalContext,
) -> SanitizationResult {
    if css_text.len() > context.limits.max_css_bytes {
        tracing::warn!(bytes = css_text.len(), "stylesheet over size limit, elided");
        return SanitizationResult {
            text: String::new(),
            more_to_come: context.pending.load(Ordering::SeqCst) > 0,
        };
    }
    let collect_imports = context.fetcher.is_some() && context.depth > 0;
    let mut driver = StylesheetDriver::new(
        context.schema.as_ref(),
        &context.virtualization,
        context.url_policy.as_deref(),
        base_uri,
        &context.limits,
        collect_imports,
    );
    parse_stylesheet_text(css_text, &mut driver);
    let imports = std::mem::take(&mut driver.imports);
    let text = driver.out;
    for uri in imports {
        dispatch_import(uri, context.clone());
    }
    SanitizationResult {
        text,
        more_to_come: context.pending.load(Ordering::SeqCst) > 0,
    }
}

fn dispatch_import(uri: Url, context: ExternalContext) {
    let fetcher = match context.fetcher.as_ref() {
        Some(fetcher) => Arc::clone(fetcher),
        None => return,
    };
    context.pending.fetch_add(1, Ordering::SeqCst);
    let target = uri.clone();
    let callback_context = context;
    fetcher.fetch(
        &uri,
        Box::new(move |body| {
            let text = match body {
                Some(css) => {
                    let nested = ExternalContext {
                        depth: callback_context.depth - 1,
                        ..callback_context.clone()
                    };
                    sanitize_with_externals_inner(&target, &css, &nested).text
                }
                None => String::new(),
            };
            let remaining = callback_context.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            (callback_context.continuation)(&text, remaining > 0);
        }),
    );
}

/// One sanitized declaration, collected until its ruleset closes.
struct Declaration {
    property: String,
    value: Vec<String>,
    important: bool,
}

struct RulesetState {
    groups: SelectorGroups,
    declarations: Vec<Declaration>,
}

/// Marker for one open at-rule.
struct AtMark {
    kept: bool,
    had_block: bool,
}

struct StylesheetDriver<'a> {
    schema: &'a PropertySchema,
    virtualization: &'a Virtualization,
    url_policy: Option<&'a dyn UrlPolicy>,
    base_uri: &'a Url,
    limits: &'a Limits,
    collect_imports: bool,
    out: String,
    atrules: Vec<AtMark>,
    ruleset: Option<RulesetState>,
    imports: Vec<Url>,
}

impl<'a> StylesheetDriver<'a> {
    fn new(
        schema: &'a PropertySchema,
        virtualization: &'a Virtualization,
        url_policy: Option<&'a dyn UrlPolicy>,
        base_uri: &'a Url,
        limits: &'a Limits,
        collect_imports: bool,
    ) -> Self {
        Self {
            schema,
            virtualization,
            url_policy,
            base_uri,
            limits,
            collect_imports,
            out: String::new(),
            atrules: Vec::new(),
            ruleset: None,
            imports: Vec::new(),
        }
    }

    fn eliding(&self) -> bool {
        self.atrules.iter().any(|mark| !mark.kept)
    }

    /// Keep only whitelisted bare media types from an `@media` header.
    fn filter_media_header(header: &[String]) -> Vec<String> {
        let mut kept = Vec::new();
        for segment in header.split(|token| token == ",") {
            let significant: Vec<&str> = segment
                .iter()
                .map(String::as_str)
                .filter(|t| *t != " ")
                .collect();
            if let [media_type] = significant.as_slice() {
                let media_type = media_type.to_lowercase();
                if MEDIA_TYPES.contains(&media_type.as_str()) {
                    kept.push(media_type);
                }
            }
        }
        kept
    }

    fn handle_import(&mut self, header: &[String]) {
        let body = header.iter().find_map(|token| {
            if let Some(rest) = token.strip_prefix("url(\"") {
                rest.strip_suffix("\")").map(str::to_string)
            } else if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
                Some(crate::text::decode_css(&token[1..token.len() - 1]))
            } else {
                None
            }
        });
        let body = match body {
            Some(body) => body,
            None => return,
        };
        let policy = match self.url_policy {
            Some(policy) => policy,
            None => {
                tracing::debug!("@import without URL policy elided");
                return;
            }
        };
        let safe = self
            .base_uri
            .join(&body)
            .ok()
            .and_then(|uri| policy.rewrite(&uri, "@import"))
            .and_then(|safe| Url::parse(&safe).ok());
        match safe {
            Some(uri) if self.collect_imports => self.imports.push(uri),
            Some(uri) => {
                tracing::warn!(%uri, "@import elided: no fetcher supplied");
            }
            None => {
                tracing::debug!(url = %body, "@import target rejected by policy");
            }
        }
    }

    fn format_declaration(declaration: &Declaration) -> String {
        let mut text = String::new();
        text.push_str(&declaration.property);
        text.push(':');
        text.push_str(&declaration.value.join(" "));
        if declaration.important {
            text.push_str(" !important");
        }
        text.push(';');
        text
    }

    /// Flatten collected declarations back into the flat token convention
    /// the history filter consumes.
    fn flatten_declarations(declarations: &[Declaration]) -> Vec<String> {
        let mut tokens = Vec::new();
        for declaration in declarations {
            tokens.push(declaration.property.clone());
            tokens.push(":".to_string());
            tokens.extend(declaration.value.iter().cloned());
            if declaration.important {
                tokens.push("!important".to_string());
            }
            tokens.push(";".to_string());
        }
        tokens
    }

    /// Split a trailing `! important` off a raw value token list.
    fn strip_important(value: &mut Vec<String>) -> bool {
        while value.last().map(String::as_str) == Some(" ") {
            value.pop();
        }
        let n = value.len();
        if n < 2 {
            return false;
        }
        if !value[n - 1].eq_ignore_ascii_case("important") {
            return false;
        }
        let mut bang = n - 2;
        while bang > 0 && value[bang] == " " {
            bang -= 1;
        }
        if value[bang] != "!" {
            return false;
        }
        value.truncate(bang);
        while value.last().map(String::as_str) == Some(" ") {
            value.pop();
        }
        true
    }
}

impl<'a> StylesheetHandler for StylesheetDriver<'a> {
    fn start_atrule(&mut self, name: &str, header: &[String]) {
        if self.eliding() {
            self.atrules.push(AtMark { kept: false, had_block: false });
            return;
        }
        let kept = match name {
            "@media" => {
                let media_types = Self::filter_media_header(header);
                if media_types.is_empty() {
                    false
                } else {
                    self.out.push_str("@media ");
                    self.out.push_str(&media_types.join(","));
                    true
                }
            }
            "@import" => {
                self.handle_import(header);
                false
            }
            _ => {
                tracing::debug!(atrule = name, "unrecognized at-rule elided");
                false
            }
        };
        self.atrules.push(AtMark { kept, had_block: false });
    }

    fn end_atrule(&mut self) {
        if let Some(mark) = self.atrules.pop() {
            if mark.kept && !mark.had_block {
                self.out.push(';');
            }
        }
    }

    fn start_block(&mut self) {
        if let Some(mark) = self.atrules.last_mut() {
            mark.had_block = true;
            if mark.kept {
                self.out.push('{');
            }
        }
    }

    fn end_block(&mut self) {
        if let Some(mark) = self.atrules.last() {
            if mark.kept {
                self.out.push('}');
            }
        }
    }

    fn start_ruleset(&mut self, selector_tokens: &mut Vec<String>) {
        if self.eliding() {
            return;
        }
        let groups =
            sanitize_selector_tokens(selector_tokens, self.virtualization, None)
                .unwrap_or_default();
        if groups.is_empty() {
            // No surviving selector: the whole ruleset is elided.
            return;
        }
        self.ruleset = Some(RulesetState {
            groups,
            declarations: Vec::new(),
        });
    }

    fn end_ruleset(&mut self) {
        let state = match self.ruleset.take() {
            Some(state) => state,
            None => return,
        };
        if state.declarations.is_empty() {
            return;
        }
        if !state.groups.history_insensitive.is_empty() {
            self.out.push_str(&state.groups.history_insensitive.join(", "));
            self.out.push('{');
            for declaration in &state.declarations {
                self.out.push_str(&Self::format_declaration(declaration));
            }
            self.out.push('}');
        }
        if !state.groups.history_sensitive.is_empty() {
            let flat = Self::flatten_declarations(&state.declarations);
            let filtered = filter_history_sensitive(&flat, self.schema);
            if !filtered.is_empty() {
                self.out.push_str(&state.groups.history_sensitive.join(", "));
                self.out.push('{');
                self.out.push_str(&filtered);
                self.out.push('}');
            }
        }
    }

    fn declaration(&mut self, property: &str, value: &mut Vec<String>) {
        if self.ruleset.is_none() {
            return;
        }
        let important = Self::strip_important(value);
        sanitize_property_tokens(
            property,
            value,
            self.url_policy,
            Some(self.base_uri),
            self.schema,
            self.limits.max_function_depth,
        );
        if !value.is_empty() {
            if let Some(state) = self.ruleset.as_mut() {
                state.declarations.push(Declaration {
                    property: property.to_lowercase(),
                    value: std::mem::take(value),
                    important,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_policy::{SafeTagPolicy, SchemeUrlPolicy};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn virt() -> Virtualization {
        Virtualization::new(Some("sfx"), "-sfx", Arc::new(SafeTagPolicy::default()))
            .unwrap()
    }

    fn base() -> Url {
        Url::parse("https://example.com/styles/site.css").unwrap()
    }

    fn run(css: &str) -> String {
        let policy = SchemeUrlPolicy::http_and_https();
        sanitize_stylesheet(&base(), css, &virt(), Some(&policy))
    }

    fn run_unscoped(css: &str) -> String {
        let policy = SchemeUrlPolicy::http_and_https();
        sanitize_stylesheet(&base(), css, &Virtualization::unscoped(), Some(&policy))
    }

    #[test]
    fn test_basic_ruleset() {
        assert_eq!(
            run_unscoped("p { color: #ABCDEF; margin: 0 }"),
            "p{color:#abcdef;margin:0;}"
        );
    }

    #[test]
    fn test_scoped_selectors() {
        assert_eq!(run("a#foo { color: red }"), ".sfx a#foo-sfx{color:red;}");
    }

    #[test]
    fn test_script_url_declaration_dropped() {
        assert_eq!(
            run_unscoped("p { background: url(javascript:alert(1)); color: red }"),
            "p{color:red;}"
        );
    }

    #[test]
    fn test_accepted_url_resolved_against_base() {
        assert_eq!(
            run_unscoped("p { background-image: url(bg.png) }"),
            "p{background-image:url(\"https://example.com/styles/bg.png\");}"
        );
    }

    #[test]
    fn test_unknown_property_dropped() {
        assert_eq!(
            run_unscoped("p { behavior: url(evil.htc); color: red }"),
            "p{color:red;}"
        );
        assert_eq!(run_unscoped("p { -moz-binding: url(x) }"), "");
    }

    #[test]
    fn test_important_preserved() {
        assert_eq!(
            run_unscoped("p { color: red !important }"),
            "p{color:red !important;}"
        );
        // A bare bang is not an important marker; it drops, the value stays.
        assert_eq!(run_unscoped("p { color: red ! }"), "p{color:red;}");
    }

    #[test]
    fn test_media_filtering() {
        assert_eq!(run_unscoped("@media fax { a { color: red } }"), "");
        assert_eq!(
            run_unscoped("@media screen, fax { a { color: red } }"),
            "@media screen{a{color:red;}}"
        );
        // Feature queries probe the environment; the whole rule goes.
        assert_eq!(
            run_unscoped("@media (min-width: 100px) { a { color: red } }"),
            ""
        );
    }

    #[test]
    fn test_unknown_atrule_elided() {
        assert_eq!(
            run_unscoped("@font-face { src: url(https://x/f.woff) } p { color: red }"),
            "p{color:red;}"
        );
        assert_eq!(run_unscoped("@charset \"utf-8\"; p { color: red }"), "p{color:red;}");
    }

    #[test]
    fn test_import_without_fetcher_elided() {
        assert_eq!(
            run_unscoped("@import url(other.css); p { color: red }"),
            "p{color:red;}"
        );
    }

    #[test]
    fn test_history_sensitive_split() {
        let css = "a:visited, a:hover { background-color: blue; color: green }";
        assert_eq!(
            run_unscoped(css),
            "a:hover{background-color:blue;color:green;}a:visited{color:green;}"
        );
    }

    #[test]
    fn test_purely_history_sensitive_ruleset() {
        let css = "a:visited { background-color: blue; color: green }";
        assert_eq!(run_unscoped(css), "a:visited{color:green;}");
        // Nothing survives the link filter: no block at all.
        assert_eq!(run_unscoped("a:visited { display: none }"), "");
    }

    #[test]
    fn test_balanced_output_on_malformed_input() {
        assert_eq!(run_unscoped("p { width: calc(100% - "), "");
        assert_eq!(
            run_unscoped("p { width: calc(100% - ; color: red } q { color: blue }"),
            "q{color:blue;}"
        );
        assert_eq!(
            run_unscoped("@media screen { p { color: red "),
            "@media screen{p{color:red;}}"
        );
    }

    #[test]
    fn test_empty_rulesets_dropped() {
        assert_eq!(run_unscoped("p { }"), "");
        assert_eq!(run_unscoped("script { color: red }"), "");
        assert_eq!(run_unscoped("p { bogus: 1 }"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "p { color: #ABCDEF; margin: +1.5em } a#foo:visited { color: red; display: none }",
            "@media screen, fax { div > p { font-family: Arial Black, serif } }",
            "p { background: url(bg.png) no-repeat }",
        ];
        for css in inputs {
            let once = run(css);
            let twice = run(&once);
            assert_eq!(twice, once, "not idempotent for {}", css);
        }
    }

    #[test]
    fn test_oversized_input_elided() {
        let mut css = String::from("p { color: red }");
        css.push_str(&" ".repeat(600 * 1024));
        assert_eq!(run_unscoped(&css), "");
    }

    struct MapFetcher {
        responses: Vec<(&'static str, &'static str)>,
    }

    impl StyleFetcher for MapFetcher {
        fn fetch(&self, uri: &Url, on_result: FetchCallback) {
            let body = self
                .responses
                .iter()
                .find(|(known, _)| *known == uri.as_str())
                .map(|(_, css)| css.to_string());
            on_result(body);
        }
    }

    fn run_with_externals(
        css: &str,
        fetcher: Option<Arc<dyn StyleFetcher>>,
    ) -> (SanitizationResult, Vec<(String, bool)>) {
        let delivered: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let continuation: ImportContinuation = Arc::new(move |text: &str, more: bool| {
            sink.lock().unwrap().push((text.to_string(), more));
        });
        let policy: Arc<dyn UrlPolicy> = Arc::new(SchemeUrlPolicy::http_and_https());
        let result = sanitize_stylesheet_with_externals(
            &base(),
            css,
            &Virtualization::unscoped(),
            Some(policy),
            fetcher,
            continuation,
        );
        let delivered = delivered.lock().unwrap().clone();
        (result, delivered)
    }

    #[test]
    fn test_externals_import_resolved() {
        let fetcher = Arc::new(MapFetcher {
            responses: vec![(
                "https://example.com/styles/other.css",
                "q { color: blue }",
            )],
        });
        let (result, delivered) =
            run_with_externals("@import url(other.css); p { color: red }", Some(fetcher));
        assert_eq!(result.text, "p{color:red;}");
        // The synchronous fetcher resolved everything before we returned.
        assert!(!result.more_to_come);
        assert_eq!(delivered, vec![("q{color:blue;}".to_string(), false)]);
    }

    #[test]
    fn test_externals_nested_imports_depth_first() {
        let fetcher = Arc::new(MapFetcher {
            responses: vec![
                (
                    "https://example.com/styles/outer.css",
                    "@import url(inner.css); q { color: blue }",
                ),
                ("https://example.com/styles/inner.css", "em { color: lime }"),
            ],
        });
        let (result, delivered) =
            run_with_externals("@import url(outer.css);", Some(fetcher));
        assert_eq!(result.text, "");
        assert!(!result.more_to_come);
        assert_eq!(
            delivered,
            vec![
                ("em{color:lime;}".to_string(), true),
                ("q{color:blue;}".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_externals_rejected_import_never_fetched() {
        let fetcher = Arc::new(MapFetcher { responses: vec![] });
        let (result, delivered) =
            run_with_externals("@import url(ftp://evil/x.css); p { color: red }", Some(fetcher));
        assert_eq!(result.text, "p{color:red;}");
        assert!(!result.more_to_come);
        assert!(delivered.is_empty());
    }

    #[test]
    fn test_externals_failed_fetch_delivers_empty() {
        let fetcher = Arc::new(MapFetcher { responses: vec![] });
        let (result, delivered) =
            run_with_externals("@import url(missing.css);", Some(fetcher));
        assert_eq!(result.text, "");
        assert_eq!(delivered, vec![(String::new(), false)]);
    }
}

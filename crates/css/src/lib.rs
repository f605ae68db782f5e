//! Palisade's fail-closed CSS sanitization engine
//!
//! This crate turns untrusted CSS into provably-safe CSS for embedding in a
//! security-sensitive page. It strips or rewrites every construct that
//! could execute script, exfiltrate data through rogue `url(...)` targets,
//! sniff browsing history through `:visited` styling, or escape a styling
//! sandbox by targeting elements outside an assigned subtree.
//!
//! The engine is a single-pass, synchronous transformer: raw CSS text is
//! lexed into string tokens, structural events drive the stylesheet driver,
//! and every declaration value and selector list is vetted against a
//! declarative property schema and the caller's policies from
//! [`palisade_policy`]. Anything ambiguous is deleted, never passed
//! through, and malformed input degrades to local token removal — the
//! output is always balanced CSS and a second sanitization pass is a
//! no-op.
//!
//! ```
//! use palisade_css::sanitize_stylesheet;
//! use palisade_policy::{SchemeUrlPolicy, SafeTagPolicy, Virtualization};
//! use std::sync::Arc;
//! use url::Url;
//!
//! let base = Url::parse("https://example.com/site.css").unwrap();
//! let virt = Virtualization::new(
//!     Some("sandbox"), "-g1", Arc::new(SafeTagPolicy::default()),
//! ).unwrap();
//! let policy = SchemeUrlPolicy::default();
//!
//! let safe = sanitize_stylesheet(
//!     &base,
//!     "a#home { color: red; background: url(javascript:alert(1)) }",
//!     &virt,
//!     Some(&policy),
//! );
//! assert_eq!(safe, ".sandbox a#home-g1{color:red;}");
//! ```

use url::Url;

pub mod error;
pub mod events;
pub mod history;
pub mod lexer;
pub mod limits;
pub mod property;
pub mod schema;
pub mod selector;
pub mod stylesheet;
mod text;

/// Re-export common types
pub use error::{SchemaError, SchemaResult};
pub use events::{parse_stylesheet_text, StylesheetHandler};
pub use history::filter_history_sensitive;
pub use lexer::lex;
pub use limits::Limits;
pub use schema::{default_schema, PropertyEntry, PropertySchema, ValueBits};
pub use selector::SelectorGroups;
pub use stylesheet::{
    sanitize_stylesheet, sanitize_stylesheet_with_externals,
    sanitize_stylesheet_with_schema, FetchCallback, ImportContinuation,
    SanitizationResult, StyleFetcher,
};
pub use text::decode_css;

use palisade_policy::{UrlPolicy, Virtualization};

/// Sanitize one declaration's value tokens in place against the built-in
/// schema. Unknown properties lose their whole value.
pub fn sanitize_property(
    property: &str,
    tokens: &mut Vec<String>,
    url_policy: Option<&dyn UrlPolicy>,
    base_uri: Option<&Url>,
) {
    let schema = default_schema();
    property::sanitize_property_tokens(
        property,
        tokens,
        url_policy,
        base_uri,
        &schema,
        Limits::default().max_function_depth,
    );
}

/// Sanitize a selector list, partitioning the survivors into
/// history-insensitive and history-sensitive groups.
///
/// Returns `None` only when `on_untranslatable` was supplied and returned
/// `false` for some untranslatable complex selector.
pub fn sanitize_selectors(
    tokens: &mut Vec<String>,
    virtualization: &Virtualization,
    on_untranslatable: Option<&mut dyn FnMut(&[String]) -> bool>,
) -> Option<SelectorGroups> {
    selector::sanitize_selector_tokens(tokens, virtualization, on_untranslatable)
}

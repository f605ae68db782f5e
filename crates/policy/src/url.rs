//! URL admission policy.
//!
//! Every `url(...)` the sanitizer considers emitting is routed through a
//! [`UrlPolicy`] after being resolved against the stylesheet's base URI.
//! A `None` verdict elides the surrounding value.

use std::collections::HashSet;

use url::Url;

/// Decides whether an absolute URI may appear in sanitized output.
///
/// Implementations must be idempotent and side-effect free: the engine may
/// call `rewrite` any number of times for the same URI and expects the same
/// answer each time.
pub trait UrlPolicy: Send + Sync {
    /// Returns the safe URI text to embed, or `None` to reject.
    ///
    /// `context` names the CSS property (e.g. `background-image`) or the
    /// at-rule (e.g. `@import`) the URI appeared in.
    fn rewrite(&self, uri: &Url, context: &str) -> Option<String>;
}

/// Scheme-allowlist policy.
///
/// Rejects everything whose scheme is not explicitly listed. The default
/// set is `https` only; `javascript:`, `vbscript:` and `data:` can never be
/// admitted through this type.
#[derive(Debug, Clone)]
pub struct SchemeUrlPolicy {
    allowed_schemes: HashSet<String>,
}

impl SchemeUrlPolicy {
    /// Create a policy admitting exactly the given schemes.
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_schemes = schemes
            .into_iter()
            .map(|s| s.as_ref().to_lowercase())
            .filter(|s| !matches!(s.as_str(), "javascript" | "vbscript" | "data"))
            .collect();
        Self { allowed_schemes }
    }

    /// Policy admitting both `http` and `https`.
    pub fn http_and_https() -> Self {
        Self::new(["http", "https"])
    }

    /// Check if a URL scheme is allowed.
    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(&scheme.to_lowercase())
    }
}

impl Default for SchemeUrlPolicy {
    fn default() -> Self {
        Self::new(["https"])
    }
}

impl UrlPolicy for SchemeUrlPolicy {
    fn rewrite(&self, uri: &Url, context: &str) -> Option<String> {
        if self.is_scheme_allowed(uri.scheme()) {
            Some(uri.to_string())
        } else {
            log::debug!("rejected {} URI in {}", uri.scheme(), context);
            None
        }
    }
}

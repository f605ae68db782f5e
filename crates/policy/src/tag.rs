//! Element-type admission policy for selectors.
//!
//! The selector sanitizer asks the active [`TagPolicy`] about every
//! element-type token it meets. A policy may rename an element (to remap
//! guest markup onto host equivalents) or reject it outright.

use std::collections::HashSet;

/// Decides whether an element-type selector may appear in sanitized output.
pub trait TagPolicy: Send + Sync {
    /// Returns the (possibly renamed) element name, or `None` to reject.
    /// `tag` is always lowercase.
    fn rewrite_tag(&self, tag: &str) -> Option<String>;
}

/// Allowlist policy over benign content elements.
///
/// Structural and scriptable elements (`html`, `head`, `body`, `script`,
/// `style`, `iframe`, `object`, `embed`, `link`, `meta`, `base`, form
/// controls) are not in the set: selectors naming them address the host
/// page rather than the sandboxed subtree.
#[derive(Debug, Clone)]
pub struct SafeTagPolicy {
    allowed_elements: HashSet<String>,
}

impl SafeTagPolicy {
    /// Create a policy admitting exactly the given elements.
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_elements: elements
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Check if an element is allowed.
    pub fn is_element_allowed(&self, element: &str) -> bool {
        self.allowed_elements.contains(element)
    }
}

impl Default for SafeTagPolicy {
    fn default() -> Self {
        let mut allowed_elements = HashSet::new();
        allowed_elements.extend(
            [
                // Basic content elements
                "a", "abbr", "article", "aside", "b", "blockquote", "br",
                "caption", "code", "col", "colgroup", "dd", "del", "details",
                "div", "dl", "dt", "em", "figcaption", "figure", "footer",
                "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i",
                "img", "ins", "li", "main", "mark", "nav", "ol", "p", "pre",
                "q", "s", "section", "small", "span", "strong", "sub", "sup",
                "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr",
                "u", "ul",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        Self { allowed_elements }
    }
}

impl TagPolicy for SafeTagPolicy {
    fn rewrite_tag(&self, tag: &str) -> Option<String> {
        if self.is_element_allowed(tag) {
            Some(tag.to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_allowlist() {
        let policy = SafeTagPolicy::default();
        assert!(policy.is_element_allowed("div"));
        assert!(policy.is_element_allowed("p"));
        assert!(policy.is_element_allowed("a"));
        assert!(!policy.is_element_allowed("script"));
        assert!(!policy.is_element_allowed("iframe"));
        assert!(!policy.is_element_allowed("html"));
        assert!(!policy.is_element_allowed("body"));
    }

    #[test]
    fn test_rewrite_tag() {
        let policy = SafeTagPolicy::default();
        assert_eq!(policy.rewrite_tag("span"), Some("span".to_string()));
        assert_eq!(policy.rewrite_tag("object"), None);
    }

    #[test]
    fn test_custom_allowlist() {
        let policy = SafeTagPolicy::new(["div", "span"]);
        assert!(policy.is_element_allowed("div"));
        assert!(!policy.is_element_allowed("table"));
    }
}

//! Attribute schema consulted by attribute selectors.
//!
//! An `[attr op value]` selector is only kept when the attribute is known
//! here, and the permitted operators depend on the attribute's kind: id-like
//! attributes are subject to suffix rewriting, URI-valued attributes are
//! rewritten wholesale, so most match operators would leak or defeat the
//! rewriting and are refused.

use std::collections::HashMap;

/// Value kind of a known attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// A single element id, subject to suffix rewriting.
    Id,
    /// A whitespace-separated list of element ids, each suffix-rewritten.
    IdRef,
    /// A URI; rewritten by the URL policy, so only existence checks are safe.
    Uri,
    /// Plain text with no rewriting applied.
    Plain,
}

/// Registry of attributes that may appear in attribute selectors.
///
/// The default registry is element-agnostic; the element name is still part
/// of the lookup contract so a custom registry can scope attributes to
/// specific elements.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    kinds: HashMap<String, AttrKind>,
}

impl AttributeRegistry {
    /// Create an empty registry (every attribute selector is rejected).
    pub fn empty() -> Self {
        Self { kinds: HashMap::new() }
    }

    /// Register an attribute.
    pub fn insert(&mut self, attr: &str, kind: AttrKind) {
        self.kinds.insert(attr.to_lowercase(), kind);
    }

    /// Look up the kind of `attr` on `element`, or `None` if unknown.
    pub fn kind(&self, _element: &str, attr: &str) -> Option<AttrKind> {
        self.kinds.get(&attr.to_lowercase()).copied()
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.insert("id", AttrKind::Id);
        registry.insert("for", AttrKind::IdRef);
        registry.insert("headers", AttrKind::IdRef);
        registry.insert("href", AttrKind::Uri);
        registry.insert("src", AttrKind::Uri);
        for attr in [
            "alt", "class", "colspan", "datetime", "dir", "height", "lang",
            "rowspan", "title", "width",
        ] {
            registry.insert(attr, AttrKind::Plain);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = AttributeRegistry::default();
        assert_eq!(registry.kind("a", "id"), Some(AttrKind::Id));
        assert_eq!(registry.kind("a", "href"), Some(AttrKind::Uri));
        assert_eq!(registry.kind("label", "for"), Some(AttrKind::IdRef));
        assert_eq!(registry.kind("div", "title"), Some(AttrKind::Plain));
        assert_eq!(registry.kind("div", "onclick"), None);
        assert_eq!(registry.kind("div", "data-x"), None);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = AttributeRegistry::default();
        assert_eq!(registry.kind("a", "HREF"), Some(AttrKind::Uri));
    }
}

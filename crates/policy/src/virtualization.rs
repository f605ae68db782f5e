//! Subtree virtualization descriptor.
//!
//! Sanitized rules may be scoped to a marked subtree of the host document:
//! a container class is prepended to every emitted selector, and an
//! instance-unique suffix is appended to every id so multiple sandboxed
//! instances sharing one document cannot collide or target each other's
//! elements.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::attr::AttributeRegistry;
use crate::error::{PolicyError, PolicyResult};
use crate::tag::{SafeTagPolicy, TagPolicy};

lazy_static! {
    static ref CSS_CLASS: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
    static ref ID_SUFFIX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Scoping parameters for one sandboxed styling instance.
#[derive(Clone)]
pub struct Virtualization {
    container_class: Option<String>,
    id_suffix: String,
    tag_policy: Arc<dyn TagPolicy>,
    attributes: AttributeRegistry,
}

impl Virtualization {
    /// Build a descriptor, validating the identifier shapes.
    ///
    /// `container_class` must be a plain CSS class identifier;
    /// `id_suffix` must be identifier characters only. An empty suffix
    /// disables id rewriting. Invalid shapes are a caller contract
    /// violation and the only error this crate raises.
    pub fn new(
        container_class: Option<&str>,
        id_suffix: &str,
        tag_policy: Arc<dyn TagPolicy>,
    ) -> PolicyResult<Self> {
        if let Some(class) = container_class {
            if !CSS_CLASS.is_match(class) {
                return Err(PolicyError::InvalidContainerClass(class.to_string()));
            }
        }
        if !id_suffix.is_empty() && !ID_SUFFIX.is_match(id_suffix) {
            return Err(PolicyError::InvalidIdSuffix(id_suffix.to_string()));
        }
        Ok(Self {
            container_class: container_class.map(|s| s.to_string()),
            id_suffix: id_suffix.to_string(),
            tag_policy,
            attributes: AttributeRegistry::default(),
        })
    }

    /// Descriptor with the default tag policy and no container scoping.
    pub fn unscoped() -> Self {
        Self {
            container_class: None,
            id_suffix: String::new(),
            tag_policy: Arc::new(SafeTagPolicy::default()),
            attributes: AttributeRegistry::default(),
        }
    }

    /// Replace the attribute registry.
    pub fn with_attributes(mut self, attributes: AttributeRegistry) -> Self {
        self.attributes = attributes;
        self
    }

    /// Class prepended to every emitted selector, if any.
    pub fn container_class(&self) -> Option<&str> {
        self.container_class.as_deref()
    }

    /// Suffix appended to every id token; empty disables rewriting.
    pub fn id_suffix(&self) -> &str {
        &self.id_suffix
    }

    /// Element-type admission policy.
    pub fn tag_policy(&self) -> &dyn TagPolicy {
        self.tag_policy.as_ref()
    }

    /// Attribute schema for attribute selectors.
    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }
}

impl std::fmt::Debug for Virtualization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Virtualization")
            .field("container_class", &self.container_class)
            .field("id_suffix", &self.id_suffix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_tag_policy() -> Arc<dyn TagPolicy> {
        Arc::new(SafeTagPolicy::default())
    }

    #[test]
    fn test_valid_descriptor() {
        let virt = Virtualization::new(Some("sfx"), "-sfx", default_tag_policy()).unwrap();
        assert_eq!(virt.container_class(), Some("sfx"));
        assert_eq!(virt.id_suffix(), "-sfx");
    }

    #[test]
    fn test_invalid_container_class() {
        let result = Virtualization::new(Some("bad class"), "-sfx", default_tag_policy());
        assert!(matches!(result, Err(PolicyError::InvalidContainerClass(_))));

        let result = Virtualization::new(Some(".leading-dot"), "-sfx", default_tag_policy());
        assert!(matches!(result, Err(PolicyError::InvalidContainerClass(_))));
    }

    #[test]
    fn test_invalid_id_suffix() {
        let result = Virtualization::new(None, "bad suffix", default_tag_policy());
        assert!(matches!(result, Err(PolicyError::InvalidIdSuffix(_))));
    }

    #[test]
    fn test_empty_suffix_allowed() {
        let virt = Virtualization::new(None, "", default_tag_policy()).unwrap();
        assert_eq!(virt.id_suffix(), "");
    }
}

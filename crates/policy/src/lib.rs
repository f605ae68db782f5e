//! Palisade policy crate
//!
//! This crate holds the caller-supplied security policies the Palisade CSS
//! sanitization engine consults: URL admission, element-type admission, the
//! attribute schema for attribute selectors, and the virtualization
//! descriptor that scopes sanitized rules to a sandboxed subtree.
//!
//! All policies are deny-by-default: an unknown scheme, element or
//! attribute is rejected rather than passed through.

pub mod attr;
pub mod error;
pub mod tag;
pub mod url;
pub mod virtualization;

pub use attr::{AttrKind, AttributeRegistry};
pub use error::{PolicyError, PolicyResult};
pub use tag::{SafeTagPolicy, TagPolicy};
pub use url::{SchemeUrlPolicy, UrlPolicy};
pub use virtualization::Virtualization;

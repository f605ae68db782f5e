//! Resource-exhaustion guards.
//!
//! Hostile stylesheets can be arbitrarily large and arbitrarily nested;
//! these limits bound the work one sanitization call will do. Exceeding a
//! limit never errors: the offending construct (or the whole sheet) is
//! elided, consistent with the fail-closed policy everywhere else.

/// Limits applied during one sanitization call.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum input size in bytes; larger sheets sanitize to nothing.
    pub max_css_bytes: usize,
    /// Maximum nesting of function calls inside one declaration value.
    pub max_function_depth: usize,
    /// Maximum `@import` chain depth with externals enabled.
    pub max_import_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_css_bytes: 512 * 1024,
            max_function_depth: 16,
            max_import_depth: 8,
        }
    }
}

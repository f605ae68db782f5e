//! History-sensitivity filter.
//!
//! Styling that may vary between visited and unvisited links is a browsing
//! history side channel. This pass runs over the property block emitted for
//! selectors already identified as history-sensitive and keeps only the
//! properties whose schema entry carries the allowed-in-link bit; the value
//! of every other property is blanked through its terminating semicolon.

use crate::schema::{PropertySchema, ValueBits};

/// Filter a flat `property : value ;` token stream, returning the surviving
/// declarations as text.
pub fn filter_history_sensitive(tokens: &[String], schema: &PropertySchema) -> String {
    let mut out = String::new();
    let n = tokens.len();
    let mut i = 0;
    while i < n {
        while i < n && (tokens[i] == " " || tokens[i] == ";") {
            i += 1;
        }
        if i >= n {
            break;
        }
        let property = tokens[i].to_lowercase();
        i += 1;
        while i < n && tokens[i] == " " {
            i += 1;
        }
        if tokens.get(i).map(String::as_str) != Some(":") {
            // Malformed group; blank through the next terminator.
            while i < n && tokens[i] != ";" {
                i += 1;
            }
            continue;
        }
        i += 1;
        let mut value: Vec<&str> = Vec::new();
        while i < n && tokens[i] != ";" {
            if tokens[i] != " " {
                value.push(tokens[i].as_str());
            }
            i += 1;
        }
        let allowed = schema
            .get(&property)
            .map(|entry| entry.bits().contains(ValueBits::ALLOWED_IN_LINK))
            .unwrap_or(false);
        if allowed && !value.is_empty() {
            out.push_str(&property);
            out.push(':');
            out.push_str(&value.join(" "));
            out.push(';');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_schema;
    use pretty_assertions::assert_eq;

    fn toks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disallowed_property_blanked() {
        let schema = default_schema();
        let tokens = toks(&[
            "background-color", ":", "blue", ";", "color", ":", "green", ";",
        ]);
        assert_eq!(filter_history_sensitive(&tokens, &schema), "color:green;");
    }

    #[test]
    fn test_allowed_properties_survive() {
        let schema = default_schema();
        let tokens = toks(&[
            "color", ":", "#abc", ";",
            "border-top-color", ":", "red", ";",
            "text-decoration", ":", "underline", ";",
        ]);
        assert_eq!(
            filter_history_sensitive(&tokens, &schema),
            "color:#abc;border-top-color:red;text-decoration:underline;"
        );
    }

    #[test]
    fn test_unknown_property_blanked() {
        let schema = default_schema();
        let tokens = toks(&["behavior", ":", "x", ";"]);
        assert_eq!(filter_history_sensitive(&tokens, &schema), "");
    }

    #[test]
    fn test_layout_properties_blanked() {
        // Anything that shifts layout is observable through timing.
        let schema = default_schema();
        let tokens = toks(&["display", ":", "none", ";", "color", ":", "red", ";"]);
        assert_eq!(filter_history_sensitive(&tokens, &schema), "color:red;");
    }

    #[test]
    fn test_malformed_group_skipped() {
        let schema = default_schema();
        let tokens = toks(&["color", "green", ";", "color", ":", "red", ";"]);
        assert_eq!(filter_history_sensitive(&tokens, &schema), "color:red;");
    }
}

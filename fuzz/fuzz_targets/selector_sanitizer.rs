#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use palisade_css::{lex, sanitize_selectors};
use palisade_policy::{SafeTagPolicy, Virtualization};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if text.len() > 10_000 {
            return;
        }

        let virt = Virtualization::new(
            Some("fuzz"),
            "-fz",
            Arc::new(SafeTagPolicy::default()),
        )
        .unwrap();

        let mut tokens = lex(text);
        if let Some(groups) = sanitize_selectors(&mut tokens, &virt, None) {
            // Every surviving selector is scoped to the container.
            for selector in groups
                .history_insensitive
                .iter()
                .chain(groups.history_sensitive.iter())
            {
                assert!(selector == ".fuzz" || selector.starts_with(".fuzz "));
            }
            // History-sensitive selectors always constrain to anchors.
            for selector in &groups.history_sensitive {
                assert!(selector.contains(":link") || selector.contains(":visited"));
            }
        }
    }
});

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use palisade_css::sanitize_stylesheet;
use palisade_policy::{SafeTagPolicy, SchemeUrlPolicy, Virtualization};
use url::Url;

fuzz_target!(|data: &[u8]| {
    // Try to convert bytes to a UTF-8 string
    if let Ok(css) = std::str::from_utf8(data) {
        // Limit input size to prevent excessive resource usage
        if css.len() > 10_000 {
            return;
        }

        let base = Url::parse("https://fuzz.example/sheet.css").unwrap();
        let virt = Virtualization::new(
            Some("fuzz"),
            "-fz",
            Arc::new(SafeTagPolicy::default()),
        )
        .unwrap();
        let policy = SchemeUrlPolicy::http_and_https();

        let out = sanitize_stylesheet(&base, css, &virt, Some(&policy));

        // Output must always be balanced, and sanitization idempotent.
        assert_eq!(out.matches('{').count(), out.matches('}').count());
        let again = sanitize_stylesheet(&base, &out, &virt, Some(&policy));
        assert_eq!(again, out);
    }
});

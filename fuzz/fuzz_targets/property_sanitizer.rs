#![no_main]

use libfuzzer_sys::fuzz_target;
use palisade_css::{lex, sanitize_property};
use palisade_policy::SchemeUrlPolicy;
use url::Url;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if text.len() > 10_000 {
            return;
        }

        // First line picks the property, the rest is the value.
        let (property, value) = match text.split_once('\n') {
            Some(pair) => pair,
            None => ("background", text),
        };

        let base = Url::parse("https://fuzz.example/").unwrap();
        let policy = SchemeUrlPolicy::http_and_https();

        let mut tokens = lex(value);
        sanitize_property(property, &mut tokens, Some(&policy), Some(&base));

        // Any surviving url token passed the scheme policy.
        for token in &tokens {
            if let Some(rest) = token.strip_prefix("url(\"") {
                assert!(
                    rest.starts_with("http://") || rest.starts_with("https://"),
                    "unvetted url survived: {:?}",
                    token
                );
            }
        }
    }
});

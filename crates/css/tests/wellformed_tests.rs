//! Machine-checks that sanitized output is well-formed CSS.
//!
//! Every sanitized corpus entry is re-tokenized with `cssparser`; the
//! output must contain no bad-string/bad-url tokens and every nested block
//! must balance.

use std::sync::Arc;

use cssparser::{Parser, ParserInput, Token};
use palisade_css::sanitize_stylesheet;
use palisade_policy::{SafeTagPolicy, SchemeUrlPolicy, Virtualization};
use url::Url;

fn walk<'i, 't>(
    parser: &mut Parser<'i, 't>,
) -> Result<(), cssparser::ParseError<'i, ()>> {
    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => return Ok(()), // end of input or of the nested block
        };
        match token {
            Token::BadString(s) => panic!("bad string token in output: {:?}", s),
            Token::BadUrl(u) => panic!("bad url token in output: {:?}", u),
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                parser.parse_nested_block(|nested| walk(nested))?;
            }
            _ => {}
        }
    }
}

fn assert_well_formed(css: &str) {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    walk(&mut parser).expect("sanitized output failed to re-parse");
    assert_eq!(
        css.matches('{').count(),
        css.matches('}').count(),
        "unbalanced braces in {:?}",
        css
    );
}

#[test]
fn test_sanitized_corpus_is_well_formed() {
    let corpus = [
        "p { color: red; margin: 0 auto }",
        "a#foo, a:visited { color: green; background-color: blue }",
        "@media screen, fax { div > p { font-family: Arial Black, serif } }",
        "p { background: url(bg.png) no-repeat center }",
        "p { background: url(javascript:alert(1)); color: red }",
        "p { width: calc(100% - ",
        "p { color: rgb(255, 0, 0); border: 1px solid #ABC }",
        "p { content: \"he said \\\"hi\\\" (twice)\" }",
        "p { background-image: linear-gradient(to right, rgb(0,0,0), #fff) }",
        "ul li[title~=\"a b\"] { list-style-type: square }",
        "@import url(x.css); @font-face { src: url(https://e/f.woff) } q { color: blue }",
        "p { font: 12px/1.5 serif !important }",
        "broken { { } p { color: red }",
        "#a.b:hover { letter-spacing: -.5em; opacity: .5 }",
    ];

    let base = Url::parse("https://example.com/styles.css").unwrap();
    let virt = Virtualization::new(Some("sfx"), "-sfx", Arc::new(SafeTagPolicy::default()))
        .unwrap();
    let policy = SchemeUrlPolicy::http_and_https();

    for css in corpus {
        let out = sanitize_stylesheet(&base, css, &virt, Some(&policy));
        assert_well_formed(&out);
    }
}

#[test]
fn test_url_output_survives_reparsing_as_one_token() {
    // The normalized url("...") must re-lex as a single quoted-url token
    // even when the original URL carried breakout characters.
    let base = Url::parse("https://example.com/").unwrap();
    let virt = Virtualization::unscoped();
    let policy = SchemeUrlPolicy::http_and_https();
    let out = sanitize_stylesheet(
        &base,
        "p { background-image: url('weird(\"name\").png') }",
        &virt,
        Some(&policy),
    );
    assert_well_formed(&out);
    // Exactly one url token, with everything dangerous percent-escaped.
    assert_eq!(out.matches("url(").count(), 1);
    let start = out.find("url(\"").unwrap() + 5;
    let end = start + out[start..].find("\")").unwrap();
    let body = &out[start..end];
    for breakout in ['(', ')', '"', '\'', '*', '<', '>'] {
        assert!(!body.contains(breakout), "unescaped {:?} in {:?}", breakout, out);
    }
}

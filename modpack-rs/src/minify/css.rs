//! Stylesheet, rule and selector minifiers.

use anyhow::anyhow;
use futures::future::{FutureExt, LocalBoxFuture};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use regex::Regex;

use super::Minify;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref CSS_PUNCTUATION_RE: Regex = Regex::new(r"\s*([{};,>])\s*").unwrap();
    static ref SELECTOR_COMMA_RE: Regex = Regex::new(r"\s*,\s*").unwrap();
    static ref SELECTOR_COLON_RE: Regex = Regex::new(r":\s+").unwrap();
    // An unterminated string runs to the end of the text
    static ref QUOTED_RE: Regex =
        Regex::new(r#"(?s)"(?:[^"\\]|\\.)*(?:"|$)|'(?:[^'\\]|\\.)*(?:'|$)"#).unwrap();
}

/// Applies `minify` to the text between quoted strings. The strings
/// themselves are kept as written.
fn outside_quotes(code: &str, minify: impl Fn(&str) -> String) -> String {
    let mut result = String::with_capacity(code.len());
    let mut last = 0;
    for quoted in QUOTED_RE.find_iter(code) {
        result.push_str(&minify(&code[last..quoted.start()]));
        result.push_str(quoted.as_str());
        last = quoted.end();
    }
    result.push_str(&minify(&code[last..]));

    result
}

/// Parses, minifies and prints a stylesheet with lightningcss.
pub fn minify_stylesheet(code: &str) -> anyhow::Result<String> {
    let mut sheet = StyleSheet::parse(code, ParserOptions::default())
        .map_err(|e| anyhow!("Failed to parse stylesheet: {}", e))?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| anyhow!("Failed to minify stylesheet: {}", e))?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("Failed to print stylesheet: {}", e))?;

    Ok(printed.code)
}

/// Minifies a rule, falling back to whitespace stripping when lightningcss
/// rejects it.
pub fn minify_rule(code: &str) -> String {
    match minify_stylesheet(code) {
        Ok(minified) => minified,
        Err(err) => {
            log::debug!("Stripping whitespace only: {}", err);
            outside_quotes(code.trim(), |part| {
                let collapsed = WHITESPACE_RE.replace_all(part, " ");
                CSS_PUNCTUATION_RE
                    .replace_all(&collapsed, "$1")
                    .into_owned()
            })
        }
    }
}

/// Normalizes whitespace in a selector or media query.
pub fn minify_selector(code: &str) -> String {
    outside_quotes(code.trim(), |part| {
        let collapsed = WHITESPACE_RE.replace_all(part, " ");
        let collapsed = SELECTOR_COMMA_RE.replace_all(&collapsed, ",");
        SELECTOR_COLON_RE.replace_all(&collapsed, ":").into_owned()
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifier;

impl Minify for CssMinifier {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        async move { minify_stylesheet(&code) }.boxed_local()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CssRuleMinifier;

impl Minify for CssRuleMinifier {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        async move { Ok(minify_rule(&code)) }.boxed_local()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CssSelectorMinifier;

impl Minify for CssSelectorMinifier {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        async move { Ok(minify_selector(&code)) }.boxed_local()
    }
}

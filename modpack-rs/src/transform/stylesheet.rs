//! Stylesheet modules.
//!
//! Same-origin `url()` references are inlined as base64 data URIs, the
//! stylesheet is minified when a CSS minifier is configured, and the result
//! is exposed as a constructed `CSSStyleSheet`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::{Captures, Regex};

use super::Dependencies;
use crate::loader::{extension_of, LoadedSource};
use crate::minify::{self, Minifiers};
use crate::text::js_string;

lazy_static! {
    static ref URL_RE: Regex =
        Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]+))\s*\)"#).unwrap();
}

/// Whether a `url()` target points at something that has to stay a URL.
fn is_external(target: &str) -> bool {
    target.is_empty()
        || target.starts_with('#')
        || target.starts_with("//")
        || target.contains(':')
}

/// `url()` targets are relative to the stylesheet even without `./`.
fn asset_specifier(target: &str) -> String {
    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or(target);

    if path.starts_with("./") || path.starts_with("../") || path.starts_with('/') {
        path.to_string()
    } else {
        format!("./{}", path)
    }
}

/// Inlines every resolvable `url()` of `css` as a data URI.
pub async fn inline_urls(
    css: &str,
    deps: &mut dyn Dependencies,
    minifiers: &Minifiers,
) -> anyhow::Result<String> {
    let mut out = String::with_capacity(css.len());
    let mut last = 0;

    let captures: Vec<Captures> = URL_RE.captures_iter(css).collect();
    for capture in captures {
        let Some(whole) = capture.get(0) else {
            continue;
        };
        let Some(target) = (1..=3).find_map(|group| capture.get(group)) else {
            continue;
        };
        let target = target.as_str();
        if is_external(target) {
            continue;
        }

        let (path, bytes) = match deps.asset(&asset_specifier(target)).await {
            Ok(asset) => asset,
            Err(err) => {
                log::debug!("Leaving url({}) untouched: {:#}", target, err);
                continue;
            }
        };

        let mime_type = mime_guess::from_path(&path).first_or_octet_stream();
        let bytes = match &minifiers.xml {
            Some(xml) if extension_of(&path) == "svg" => match String::from_utf8(bytes) {
                Ok(text) => xml.minify(text).await?.into_bytes(),
                Err(err) => {
                    log::debug!("Inlining {} unminified: {}", path.display(), err);
                    err.into_bytes()
                }
            },
            _ => bytes,
        };

        out.push_str(&css[last..whole.start()]);
        out.push_str(&format!(
            "url(\"data:{};base64,{}\")",
            mime_type.essence_str(),
            BASE64.encode(bytes)
        ));
        last = whole.end();
    }
    out.push_str(&css[last..]);

    Ok(out)
}

/// Produces the module source exposing the stylesheet.
pub async fn synthesize(
    source: &LoadedSource,
    commonjs: bool,
    deps: &mut dyn Dependencies,
    minifiers: &Minifiers,
) -> anyhow::Result<String> {
    let css = inline_urls(&source.text, deps, minifiers).await?;
    let css = minify::apply(minifiers.css.as_ref(), css).await?;

    Ok(format!(
        "const stylesheet = new CSSStyleSheet();\nstylesheet.replaceSync({});\n{}",
        js_string(&css),
        if commonjs {
            "module.exports = stylesheet;"
        } else {
            "export default stylesheet;"
        }
    ))
}

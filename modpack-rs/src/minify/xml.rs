//! XML minifier used for SVG files inlined into stylesheets.
//!
//! The document is parsed with roxmltree and written back without comments,
//! processing instructions and whitespace-only text.

use std::collections::HashSet;

use anyhow::anyhow;
use futures::future::{FutureExt, LocalBoxFuture};
use roxmltree::{Document, Node, ParsingOptions};

use super::Minify;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

pub fn minify_xml(code: &str) -> anyhow::Result<String> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document =
        Document::parse_with_options(code, options).map_err(|e| anyhow!("Failed to parse XML: {}", e))?;

    let mut out = String::with_capacity(code.len());
    write_element(document.root_element(), &HashSet::new(), &mut out);

    Ok(out)
}

fn qualified_name(node: Node, namespace: Option<&str>, local: &str) -> String {
    let prefix = match namespace {
        Some(XML_NAMESPACE) => Some("xml"),
        Some(uri) => node.lookup_prefix(uri),
        None => None,
    };

    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
        _ => local.to_string(),
    }
}

fn write_element(node: Node, declared: &HashSet<(Option<String>, String)>, out: &mut String) {
    let name = qualified_name(node, node.tag_name().namespace(), node.tag_name().name());
    out.push('<');
    out.push_str(&name);

    let mut in_scope = declared.clone();
    for namespace in node.namespaces() {
        if namespace.uri() == XML_NAMESPACE {
            continue;
        }
        let key = (namespace.name().map(str::to_string), namespace.uri().to_string());
        if in_scope.insert(key) {
            match namespace.name() {
                Some(prefix) => out.push_str(&format!(" xmlns:{}=\"", prefix)),
                None => out.push_str(" xmlns=\""),
            }
            out.push_str(&escape(namespace.uri(), true));
            out.push('"');
        }
    }

    for attribute in node.attributes() {
        out.push(' ');
        out.push_str(&qualified_name(node, attribute.namespace(), attribute.name()));
        out.push_str("=\"");
        out.push_str(&escape(attribute.value(), true));
        out.push('"');
    }

    let children: Vec<Node> = node
        .children()
        .filter(|child| {
            child.is_element() || (child.is_text() && !child.text().unwrap_or("").trim().is_empty())
        })
        .collect();

    if children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in children {
        if child.is_element() {
            write_element(child, &in_scope, out);
        } else if let Some(text) = child.text() {
            out.push_str(&escape(text, false));
        }
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' if !attribute => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlMinifier;

impl Minify for XmlMinifier {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        async move { minify_xml(&code) }.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_svg() {
        let svg = r##"<?xml version="1.0" encoding="UTF-8"?>
<!-- icon -->
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 10 10">
    <title>A &amp; B</title>
    <use xlink:href="#shape" />
    <rect width="10" height="10" />
</svg>
"##;
        let minified = minify_xml(svg).unwrap();
        assert!(minified.starts_with("<svg "));
        assert!(minified.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(minified.contains(r#"xmlns:xlink="http://www.w3.org/1999/xlink""#));
        assert!(minified.contains(
            r##"<title>A &amp; B</title><use xlink:href="#shape"/><rect width="10" height="10"/></svg>"##
        ));
        assert!(!minified.contains("icon"));
        assert!(!minified.contains('\n'));
    }

    #[test]
    fn test_invalid_xml_fails() {
        assert!(minify_xml("<svg>").is_err());
    }
}

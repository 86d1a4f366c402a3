//! Text utilities shared by the loader, transformer and packager.
//!
//! Covers BOM stripping, line ending normalization, leading directive
//! handling and the JavaScript string/identifier helpers used when code is
//! generated from text.

use std::collections::HashSet;

use regex::Regex;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
        "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
        "null", "package", "private", "protected", "public", "return", "static", "super",
        "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
        "yield",
    ]
    .into_iter()
    .collect();
}

/// Strips the UTF-8 BOM (byte order mark) from the beginning of text if present.
///
/// The BOM is U+FEFF (0xEF 0xBB 0xBF in UTF-8) and is sometimes present at the
/// start of files.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{FEFF}').unwrap_or(text)
}

/// Converts `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits a leading `#!` directive line off the source.
///
/// Returns the directive (without its line break) and the remaining text.
pub fn split_directive(text: &str) -> (Option<String>, String) {
    if !text.starts_with("#!") {
        return (None, text.to_string());
    }

    match text.split_once('\n') {
        Some((directive, rest)) => (Some(directive.to_string()), rest.to_string()),
        None => (Some(text.to_string()), String::new()),
    }
}

/// Transforms JSON source code into JavaScript that exports the parsed JSON.
///
/// Declarative modules get `export default JSON.parse("...")`, imperative
/// modules get `module.exports = JSON.parse("...")`.
pub fn json_module_source(source: &str, commonjs: bool) -> String {
    // Escape the JSON string for embedding in a JavaScript string literal
    let escaped = escape_json_string(source);
    if commonjs {
        format!("module.exports = JSON.parse(\"{}\");", escaped)
    } else {
        format!("export default JSON.parse(\"{}\");", escaped)
    }
}

/// Escapes a string for safe embedding in a JavaScript string literal.
///
/// Handles special characters like quotes, backslashes, and control characters.
fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            // Control characters (U+0000 to U+001F)
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            '\u{2028}' => result.push_str("\\u2028"),
            '\u{2029}' => result.push_str("\\u2029"),
            c => result.push(c),
        }
    }
    result
}

/// Renders `value` as a double-quoted JavaScript string literal.
pub fn js_string(value: &str) -> String {
    format!("\"{}\"", escape_json_string(value))
}

/// Whether `key` can be written as a plain binding name.
pub fn is_identifier(key: &str) -> bool {
    IDENTIFIER_RE.is_match(key) && !RESERVED_WORDS.contains(key)
}

/// Renders a property access on `object`, using bracket syntax when `key` is
/// not a valid identifier.
pub fn member_access(object: &str, key: &str) -> String {
    if IDENTIFIER_RE.is_match(key) {
        format!("{}.{}", object, key)
    } else {
        format!("{}[{}]", object, js_string(key))
    }
}

/// Removes the quotes from a raw string literal and resolves its escapes.
///
/// Template literals and malformed escapes yield `None`.
pub fn unquote(raw: &str) -> Option<String> {
    let quote = raw.chars().next()?;
    if !matches!(quote, '"' | '\'') || raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }

    let inner = &raw[1..raw.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        match chars.next()? {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            'b' => result.push('\u{8}'),
            'f' => result.push('\u{c}'),
            'v' => result.push('\u{b}'),
            '0' => result.push('\0'),
            'u' => {
                let code = if chars.clone().next() == Some('{') {
                    chars.next();
                    let digits: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    u32::from_str_radix(&digits, 16).ok()?
                } else {
                    let digits: String = chars.by_ref().take(4).collect();
                    u32::from_str_radix(&digits, 16).ok()?
                };
                result.push(char::from_u32(code)?);
            }
            'x' => {
                let digits: String = chars.by_ref().take(2).collect();
                result.push(char::from_u32(u32::from_str_radix(&digits, 16).ok()?)?);
            }
            '\n' => {}
            other => result.push(other),
        }
    }

    Some(result)
}

//! JSON modules.

use anyhow::Context;

use crate::loader::LoadedSource;
use crate::text::json_module_source;

/// Validates the JSON file and produces the module source exposing it as the
/// default export (declarative) or as `module.exports` (imperative).
pub fn synthesize(source: &LoadedSource, commonjs: bool) -> anyhow::Result<String> {
    let text = source.text.trim();
    serde_json::from_str::<serde_json::Value>(text)
        .with_context(|| format!("Invalid JSON in {}", source.path.display()))?;

    Ok(json_module_source(text, commonjs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(text: &str) -> LoadedSource {
        LoadedSource {
            path: PathBuf::from("/data/config.json"),
            directive: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_declarative_and_imperative_forms() {
        let json = source("{\"a\": [1, 2]}\n");
        assert_eq!(
            synthesize(&json, false).unwrap(),
            r#"export default JSON.parse("{\"a\": [1, 2]}");"#
        );
        assert_eq!(
            synthesize(&json, true).unwrap(),
            r#"module.exports = JSON.parse("{\"a\": [1, 2]}");"#
        );
    }

    #[test]
    fn test_invalid_json_names_file() {
        let err = synthesize(&source("{oops}"), false).unwrap_err();
        assert!(err.to_string().contains("/data/config.json"));
    }
}

//! Runtime loader templates embedded in every artifact.
//!
//! Templates are valid JavaScript with `"%NAME%"` string placeholders, so
//! they can be read and linted as plain sources. Substitution is a single
//! pass: text inserted for one placeholder is never scanned again.

use std::collections::{HashMap, HashSet};

use anyhow::bail;
use itertools::Itertools;
use regex::{Captures, Regex};

use crate::graph::record::{BundleDescriptor, Classification};
use crate::text::{is_identifier, js_string, member_access};

const LOADER: &str = include_str!("loader.js");
const BUNDLE_ESM: &str = include_str!("bundle.mjs");
const BUNDLE_COMMONJS: &str = include_str!("bundle.cjs");
const MODULE_ESM: &str = include_str!("module.mjs");
const MODULE_COMMONJS: &str = include_str!("module.cjs");

/// Preferred name for the root namespace when the artifact re-exports several keys.
const BUNDLE_BINDING: &str = "__bundle";

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r#""%([A-Z_]+)%""#).unwrap();
}

/// Replaces every placeholder of `template` in one pass.
pub fn render(template: &str, values: &HashMap<&str, String>) -> anyhow::Result<String> {
    let missing: Vec<&str> = PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .filter(|name| !values.contains_key(name))
        .unique()
        .collect();
    if !missing.is_empty() {
        bail!("No value for template placeholders: {}", missing.join(", "));
    }

    Ok(PLACEHOLDER_RE
        .replace_all(template, |captures: &Captures| values[&captures[1]].clone())
        .into_owned())
}

/// Wraps a transformed module body in its classification's factory.
pub fn factory(classification: Classification, code: &str) -> anyhow::Result<String> {
    let template = match classification {
        Classification::Declarative => MODULE_ESM,
        Classification::Imperative => MODULE_COMMONJS,
    };
    render(
        template.trim_end(),
        &HashMap::from([("CODE", code.trim_end().to_string())]),
    )
}

/// Everything the loader invocation needs to know about the graph.
pub struct LoaderInput<'a> {
    pub es_modules: String,
    pub commonjs_modules: String,
    /// Empty literal matching the table shape (`[]` or `{}`).
    pub init_loaded_modules: &'a str,
    pub root: &'a BundleDescriptor,
}

/// Renders the loader invocation for the chosen output format.
///
/// The ESM flavor is an `await` expression evaluating to the root namespace;
/// the CommonJS flavor is a complete `module.exports = ...;` statement.
pub fn loader_invocation(input: &LoaderInput, output_commonjs: bool) -> anyhow::Result<String> {
    let template = if output_commonjs {
        BUNDLE_COMMONJS
    } else {
        BUNDLE_ESM
    };

    render(
        template.trim_end(),
        &HashMap::from([
            ("LOADER", LOADER.trim_end().to_string()),
            ("ES_MODULES", input.es_modules.clone()),
            ("COMMONJS_MODULES", input.commonjs_modules.clone()),
            ("INIT_LOADED_MODULES", input.init_loaded_modules.to_string()),
            ("ROOT_MODULE_ID", input.root.module_id.to_js()),
            (
                "ROOT_MODULE_IS_COMMONJS",
                input.root.is_commonjs.to_string(),
            ),
        ]),
    )
}

/// Re-exports the root namespace `invocation` evaluates to as the artifact's
/// own ES module exports.
pub fn export_wrapper(invocation: &str, exported_keys: &[String]) -> String {
    let has_default = exported_keys.iter().any(|key| key == "default");
    let named: Vec<&String> = exported_keys
        .iter()
        .filter(|key| key.as_str() != "default")
        .collect();

    if named.is_empty() {
        return if has_default {
            format!("export default ({}).default;\n", invocation)
        } else {
            format!("{};\n", invocation)
        };
    }

    if !has_default && named.iter().all(|key| is_identifier(key)) {
        return format!(
            "export const {{ {} }} = {};\n",
            named.iter().join(", "),
            invocation
        );
    }

    // Every plain key becomes a module-level binding of the artifact
    let mut taken: HashSet<String> = named
        .iter()
        .filter(|key| is_identifier(key))
        .map(|key| key.to_string())
        .collect();
    let binding = unused_name(BUNDLE_BINDING, &mut taken);

    let mut lines = vec![format!("const {} = {};", binding, invocation)];
    if has_default {
        lines.push(format!("export default {}.default;", binding));
    }

    let (plain, aliased): (Vec<&String>, Vec<&String>) =
        named.into_iter().partition(|key| is_identifier(key));
    if !plain.is_empty() {
        lines.push(format!(
            "export const {{ {} }} = {};",
            plain.iter().join(", "),
            binding
        ));
    }
    for (index, key) in aliased.iter().enumerate() {
        let alias = unused_name(&format!("__export_{}", index), &mut taken);
        lines.push(format!("const {} = {};", alias, member_access(&binding, key)));
        lines.push(format!("export {{ {} as {} }};", alias, js_string(key)));
    }

    lines.join("\n") + "\n"
}

/// `base`, or `base` with the first numeric suffix that is not taken yet.
fn unused_name(base: &str, taken: &mut HashSet<String>) -> String {
    let name = std::iter::once(base.to_string())
        .chain((1..).map(|suffix| format!("{}_{}", base, suffix)))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| base.to_string());
    taken.insert(name.clone());

    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::record::ModuleId;
    use std::path::PathBuf;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[test]
    fn test_render_is_single_pass() {
        let rendered = render(
            "f(\"%A%\", \"%B%\")",
            &HashMap::from([
                ("A", "\"%B%\"".to_string()),
                ("B", "$1".to_string()),
            ]),
        )
        .unwrap();
        assert_eq!(rendered, "f(\"%B%\", $1)");
    }

    #[test]
    fn test_render_reports_missing_values() {
        let err = render("\"%A%\" + \"%B%\"", &HashMap::from([("A", "1".to_string())]))
            .unwrap_err();
        assert!(err.to_string().contains("B"));
    }

    #[test]
    fn test_factories() {
        let esm = factory(Classification::Declarative, "__export_es_key(\"a\", () => a);\n")
            .unwrap();
        assert!(esm.starts_with("async (__load_es_module,"));
        assert!(esm.ends_with("__export_es_key(\"a\", () => a);\n}"));

        let commonjs = factory(Classification::Imperative, "module.exports = 1;").unwrap();
        assert!(commonjs.starts_with("function (__load_es_module,"));
        assert!(commonjs.contains("module, exports, require, __filename, __dirname"));
        assert!(commonjs.ends_with("module.exports = 1;\n}"));
    }

    #[test]
    fn test_loader_invocation() {
        let root = BundleDescriptor {
            module_id: ModuleId::Key("/src/main.js".to_string()),
            leading_directive: None,
            exported_keys: keys(&["default"]),
            identity: PathBuf::from("/src/main.js"),
            is_commonjs: true,
        };
        let input = LoaderInput {
            es_modules: "{}".to_string(),
            commonjs_modules: "{\n\"/src/main.js\": f\n}".to_string(),
            init_loaded_modules: "{}",
            root: &root,
        };

        let esm = loader_invocation(&input, false).unwrap();
        assert!(esm.starts_with("await ("));
        assert!(esm.contains("\"/src/main.js\",\n    true,\n    false,"));
        assert!(!esm.contains("\"%"));

        let commonjs = loader_invocation(&input, true).unwrap();
        assert!(commonjs.starts_with("module.exports = ("));
        assert!(commonjs.contains("{\n\"/src/main.js\": f\n}"));
        assert!(commonjs.ends_with(");"));
    }

    #[test]
    fn test_export_wrapper_shapes() {
        assert_eq!(export_wrapper("await f()", &[]), "await f();\n");
        assert_eq!(
            export_wrapper("await f()", &keys(&["default"])),
            "export default (await f()).default;\n"
        );
        assert_eq!(
            export_wrapper("await f()", &keys(&["a", "b"])),
            "export const { a, b } = await f();\n"
        );
        assert_eq!(
            export_wrapper("await f()", &keys(&["a", "default"])),
            "const __bundle = await f();\n\
             export default __bundle.default;\n\
             export const { a } = __bundle;\n"
        );
        assert_eq!(
            export_wrapper("await f()", &keys(&["a", "b-c"])),
            "const __bundle = await f();\n\
             export const { a } = __bundle;\n\
             const __export_0 = __bundle[\"b-c\"];\n\
             export { __export_0 as \"b-c\" };\n"
        );
    }

    #[test]
    fn test_export_wrapper_avoids_exported_names() {
        assert_eq!(
            export_wrapper("await f()", &keys(&["__bundle", "default", "__bundle_1"])),
            "const __bundle_2 = await f();\n\
             export default __bundle_2.default;\n\
             export const { __bundle, __bundle_1 } = __bundle_2;\n"
        );
        assert_eq!(
            export_wrapper("await f()", &keys(&["__export_0", "x-y"])),
            "const __bundle = await f();\n\
             export const { __export_0 } = __bundle;\n\
             const __export_0_1 = __bundle[\"x-y\"];\n\
             export { __export_0_1 as \"x-y\" };\n"
        );
    }
}

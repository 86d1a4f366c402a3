//! Imperative (CommonJS) modules.
//!
//! `require("<literal>")` becomes `__load_commonjs_module(<id>)`, builtins
//! stay native `require("node:...")` calls, and dynamic imports go through
//! the ES loaders. Such a module exposes a single export key, `default`.

use deno_ast::swc::ecma_visit::VisitMutWith;

use super::literals::minify_literals;
use super::parse::{emit_module, parse_script};
use super::requests::{CallSiteCollector, SpanReplacer};
use super::{call_site_hint, call_site_replacement, Dependencies, ModuleContext, Transformed};

pub async fn transform(
    context: &ModuleContext<'_>,
    text: String,
    deps: &mut dyn Dependencies,
) -> anyhow::Result<Transformed> {
    let mut module = parse_script(&context.source_map, Some(context.path), text)?;

    let mut replacer = SpanReplacer::default();
    for site in CallSiteCollector::collect(&module, true) {
        let hint = call_site_hint(&site, context.path);
        let dependency = deps.dependency(&site.specifier, hint).await?;
        replacer.insert(site.span, call_site_replacement(context, site.kind, &dependency)?);
    }

    if context.minify_literals {
        replacer.extend(minify_literals(&context.source_map, &module, context.minifiers).await?);
    }

    module.visit_mut_with(&mut replacer);

    Ok(Transformed {
        code: emit_module(&context.source_map, &module, false)?,
        exported_keys: vec!["default".to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::record::{AssetHint, Dependency};
    use crate::minify::Minifiers;
    use crate::transform::testing::FakeDependencies;
    use deno_ast::swc::common::sync::Lrc;
    use deno_ast::swc::common::SourceMap;
    use std::path::Path;

    async fn run(code: &str, deps: &mut FakeDependencies) -> anyhow::Result<Transformed> {
        let minifiers = Minifiers::none();
        let context = ModuleContext {
            source_map: Lrc::new(SourceMap::default()),
            path: Path::new("/src/main.cjs"),
            minifiers: &minifiers,
            minify_literals: true,
        };
        transform(&context, code.to_string(), deps).await
    }

    #[tokio::test]
    async fn test_requires_are_rewritten() {
        let mut deps = FakeDependencies::default()
            .commonjs("./util", 3)
            .with("fs", Dependency::Native("node:fs".to_string()))
            .es("./lazy.mjs", 1, &["default"]);

        let output = run(
            r#"
const util = require("./util");
const fs = require('fs');
exports.load = () => import("./lazy.mjs");
if (!util) return;
"#,
            &mut deps,
        )
        .await
        .unwrap();

        assert!(output.code.contains("const util = __load_commonjs_module(3);"));
        assert!(output.code.contains("const fs = require(\"node:fs\");"));
        assert!(output.code.contains("__load_es_module(1, true)"));
        assert!(!output.code.contains("import("));
        assert!(output.code.contains("return;"));
        assert_eq!(output.exported_keys, vec!["default".to_string()]);
        assert_eq!(
            deps.requested,
            vec![
                ("./util".to_string(), Some(AssetHint::CommonJs)),
                ("fs".to_string(), Some(AssetHint::CommonJs)),
                ("./lazy.mjs".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_dynamic_requires_are_left_alone() {
        let mut deps = FakeDependencies::default();
        let output = run("const m = require(name);\n", &mut deps).await.unwrap();
        assert!(output.code.contains("require(name)"));
        assert!(deps.requested.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_require_fails() {
        let mut deps = FakeDependencies::default();
        let err = run("require('./missing');", &mut deps).await.unwrap_err();
        assert!(err.to_string().contains("./missing"));
    }
}

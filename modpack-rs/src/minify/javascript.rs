//! JavaScript minifier built on swc's code generator.
//!
//! Only formatting is removed: whitespace, comments and optional
//! semicolons. Names and structure are left as they are.

use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::SourceMap;
use futures::future::{FutureExt, LocalBoxFuture};

use super::Minify;
use crate::text::split_directive;
use crate::transform::parse::{emit_module, parse_module, parse_script};

#[derive(Debug, Clone, Copy)]
pub struct JavaScriptMinifier {
    commonjs: bool,
}

impl JavaScriptMinifier {
    /// Minifier for ES module code (top-level `await` allowed).
    pub fn esm() -> Self {
        Self { commonjs: false }
    }

    /// Minifier for classic scripts.
    pub fn commonjs() -> Self {
        Self { commonjs: true }
    }
}

impl Minify for JavaScriptMinifier {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        let commonjs = self.commonjs;
        async move { minify_javascript(&code, commonjs) }.boxed_local()
    }
}

/// Re-emits `code` in minified form, keeping a leading `#!` line.
pub fn minify_javascript(code: &str, commonjs: bool) -> anyhow::Result<String> {
    let (directive, body) = split_directive(code);

    let source_map = Lrc::new(SourceMap::default());
    let module = if commonjs {
        parse_script(&source_map, None, body)?
    } else {
        parse_module(&source_map, None, body)?
    };
    let minified = emit_module(&source_map, &module, true)?;

    Ok(match directive {
        Some(directive) => format!("{}\n{}", directive, minified),
        None => minified,
    })
}

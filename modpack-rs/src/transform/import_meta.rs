//! `import.meta` rewriting.
//!
//! Bundled modules no longer have their own URL, so every `import.meta`
//! becomes the `__import_meta` object the runtime passes to each ES module
//! factory. It exposes `url`, `filename`, `dirname` and `resolve` for the
//! artifact itself, and `main` for the root module.

use deno_ast::swc::ast::{Expr, MetaPropKind};
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::SourceMap;
use deno_ast::swc::ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::parse::parse_expr;

pub const IMPORT_META: &str = "__import_meta";

/// Replaces `import.meta` with the runtime supplied object.
pub struct ImportMetaRewriter {
    replacement: Box<Expr>,
}

impl ImportMetaRewriter {
    pub fn new(source_map: &Lrc<SourceMap>) -> anyhow::Result<Self> {
        Ok(Self {
            replacement: parse_expr(source_map, IMPORT_META)?,
        })
    }
}

impl VisitMut for ImportMetaRewriter {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::MetaProp(meta) = expr {
            if meta.kind == MetaPropKind::ImportMeta {
                *expr = *self.replacement.clone();
                return;
            }
        }
        expr.visit_mut_children_with(self);
    }
}

/// Detects `import.meta` anywhere in a module.
#[derive(Default)]
pub struct ImportMetaFinder {
    pub found: bool,
}

impl ImportMetaFinder {
    pub fn find<N: VisitWith<Self>>(node: &N) -> bool {
        let mut finder = Self::default();
        node.visit_with(&mut finder);
        finder.found
    }
}

impl Visit for ImportMetaFinder {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::MetaProp(meta) = expr {
            if meta.kind == MetaPropKind::ImportMeta {
                self.found = true;
                return;
            }
        }
        if !self.found {
            expr.visit_children_with(self);
        }
    }
}

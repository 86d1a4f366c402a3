//! Call site discovery and span keyed rewriting.
//!
//! The transformer first collects every `require(...)` and `import(...)` with
//! a literal specifier, resolves them in source order, and then swaps the
//! call expressions for runtime loader calls through [`SpanReplacer`].

use std::collections::HashMap;

use deno_ast::swc::ast::{
    CallExpr, Callee, Expr, Lit, ModuleExportName, ObjectLit, Prop, PropName, PropOrSpread, Str,
};
use deno_ast::swc::common::{Span, Spanned};
use deno_ast::swc::ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::text::unquote;

/// Decoded value of a string literal.
pub fn str_value(lit: &Str) -> Option<String> {
    lit.raw.as_ref().and_then(|raw| unquote(raw))
}

/// Value of a string literal or of a template literal without substitutions.
pub fn expr_string(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(Lit::Str(lit)) => str_value(lit),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() && tpl.quasis.len() == 1 => {
            let raw: &str = &tpl.quasis[0].raw;
            (!raw.contains('\\')).then(|| raw.to_string())
        }
        Expr::Paren(paren) => expr_string(&paren.expr),
        _ => None,
    }
}

pub fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(lit) => str_value(lit),
        _ => None,
    }
}

pub fn export_name(name: &ModuleExportName) -> Option<String> {
    match name {
        ModuleExportName::Ident(ident) => Some(ident.sym.to_string()),
        ModuleExportName::Str(lit) => str_value(lit),
    }
}

fn object_prop<'a>(object: &'a ObjectLit, name: &str) -> Option<&'a Expr> {
    object.props.iter().find_map(|prop| match prop {
        PropOrSpread::Prop(prop) => match &**prop {
            Prop::KeyValue(kv) if prop_name(&kv.key).as_deref() == Some(name) => Some(&*kv.value),
            _ => None,
        },
        _ => None,
    })
}

/// `type` of an import attributes object such as `{ type: "css" }`.
pub fn import_type(attributes: &ObjectLit) -> Option<String> {
    object_prop(attributes, "type").and_then(expr_string)
}

/// `type` of a dynamic import options argument such as
/// `{ with: { type: "json" } }`.
pub fn dynamic_import_type(options: &Expr) -> Option<String> {
    match options {
        Expr::Object(options) => match object_prop(options, "with") {
            Some(Expr::Object(attributes)) => import_type(attributes),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Require,
    DynamicImport,
}

/// One `require("...")` or `import("...")` with a literal specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub span: Span,
    pub kind: CallKind,
    pub specifier: String,
    pub import_type: Option<String>,
}

/// Collects call sites in source order.
pub struct CallSiteCollector {
    include_require: bool,
    sites: Vec<CallSite>,
}

impl CallSiteCollector {
    /// Collects dynamic imports, plus `require()` calls when
    /// `include_require` is set.
    pub fn collect<N: VisitWith<Self>>(node: &N, include_require: bool) -> Vec<CallSite> {
        let mut collector = Self {
            include_require,
            sites: Vec::new(),
        };
        node.visit_with(&mut collector);
        collector.sites.sort_by_key(|site| site.span.lo);
        collector.sites
    }
}

impl Visit for CallSiteCollector {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        call.visit_children_with(self);

        let kind = match &call.callee {
            Callee::Import(_) => CallKind::DynamicImport,
            Callee::Expr(callee) if self.include_require => match &**callee {
                Expr::Ident(ident) if &*ident.sym == "require" && call.args.len() == 1 => {
                    CallKind::Require
                }
                _ => return,
            },
            _ => return,
        };

        let Some(first) = call.args.first() else {
            return;
        };
        if first.spread.is_some() {
            return;
        }
        let Some(specifier) = expr_string(&first.expr) else {
            return;
        };

        let import_type = match kind {
            CallKind::DynamicImport => call
                .args
                .get(1)
                .and_then(|options| dynamic_import_type(&options.expr)),
            CallKind::Require => None,
        };

        self.sites.push(CallSite {
            span: call.span,
            kind,
            specifier,
            import_type,
        });
    }
}

/// Replaces the expressions whose spans are keys of the map.
#[derive(Default)]
pub struct SpanReplacer {
    replacements: HashMap<Span, Box<Expr>>,
}

impl SpanReplacer {
    pub fn insert(&mut self, span: Span, replacement: Box<Expr>) {
        self.replacements.insert(span, replacement);
    }

    pub fn extend(&mut self, replacements: HashMap<Span, Box<Expr>>) {
        self.replacements.extend(replacements);
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

impl VisitMut for SpanReplacer {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Some(replacement) = self.replacements.remove(&expr.span()) {
            *expr = *replacement;
            return;
        }
        expr.visit_mut_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::parse::{emit_module, parse_expr, parse_module};
    use deno_ast::swc::common::sync::Lrc;
    use deno_ast::swc::common::SourceMap;

    fn sites(code: &str, include_require: bool) -> Vec<(CallKind, String, Option<String>)> {
        let source_map = Lrc::new(SourceMap::default());
        let module = parse_module(&source_map, None, code.to_string()).unwrap();
        CallSiteCollector::collect(&module, include_require)
            .into_iter()
            .map(|site| (site.kind, site.specifier, site.import_type))
            .collect()
    }

    #[test]
    fn test_collects_in_source_order() {
        let found = sites(
            r#"
            const a = require("./a");
            const b = await import('./b.json', { with: { type: "json" } });
            const c = require(`./c`);
            const d = require(name);
            const e = import(name);
            "#,
            true,
        );
        assert_eq!(
            found,
            vec![
                (CallKind::Require, "./a".to_string(), None),
                (
                    CallKind::DynamicImport,
                    "./b.json".to_string(),
                    Some("json".to_string())
                ),
                (CallKind::Require, "./c".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_require_is_optional() {
        let found = sites(r#"require("./a"); import("./b");"#, false);
        assert_eq!(found, vec![(CallKind::DynamicImport, "./b".to_string(), None)]);
    }

    #[test]
    fn test_span_replacer() {
        let source_map = Lrc::new(SourceMap::default());
        let mut module =
            parse_module(&source_map, None, r#"f(require("./a"), 1);"#.to_string()).unwrap();
        let site = CallSiteCollector::collect(&module, true).remove(0);

        let mut replacer = SpanReplacer::default();
        replacer.insert(site.span, parse_expr(&source_map, "__load(3)").unwrap());
        module.visit_mut_with(&mut replacer);

        let code = emit_module(&source_map, &module, false).unwrap();
        assert_eq!(code.trim(), "f(__load(3), 1);");
        assert!(replacer.is_empty());
    }
}

//! Minification of CSS embedded in string literals.
//!
//! Only literal first arguments of well known DOM calls are touched:
//! `<x>sheet.insertRule/replace/replaceSync` carry CSS rules,
//! `matchMedia` and `querySelector(All)` carry selectors and media queries.

use std::collections::HashMap;
use std::rc::Rc;

use deno_ast::swc::ast::{CallExpr, Callee, Expr, MemberProp, Module};
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::{SourceMap, Span, Spanned};
use deno_ast::swc::ecma_visit::{Visit, VisitWith};

use super::parse::parse_expr;
use super::requests::expr_string;
use crate::minify::{Minifiers, Minify};
use crate::text::js_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralKind {
    CssRule,
    CssSelector,
}

#[derive(Debug)]
struct LiteralSite {
    span: Span,
    kind: LiteralKind,
    text: String,
}

#[derive(Default)]
struct LiteralCollector {
    sites: Vec<LiteralSite>,
}

fn ends_with_sheet(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(ident) => ident.sym.ends_with("sheet"),
        Expr::Member(member) => match &member.prop {
            MemberProp::Ident(prop) => prop.sym.ends_with("sheet"),
            _ => false,
        },
        _ => false,
    }
}

fn literal_kind(callee: &Callee) -> Option<LiteralKind> {
    let Callee::Expr(callee) = callee else {
        return None;
    };

    match &**callee {
        Expr::Ident(ident) if &*ident.sym == "matchMedia" => Some(LiteralKind::CssSelector),
        Expr::Member(member) => {
            let MemberProp::Ident(prop) = &member.prop else {
                return None;
            };
            match &*prop.sym {
                "insertRule" | "replace" | "replaceSync" if ends_with_sheet(&member.obj) => {
                    Some(LiteralKind::CssRule)
                }
                "matchMedia" | "querySelector" | "querySelectorAll" => {
                    Some(LiteralKind::CssSelector)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

impl Visit for LiteralCollector {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        call.visit_children_with(self);

        let Some(kind) = literal_kind(&call.callee) else {
            return;
        };
        let Some(first) = call.args.first().filter(|arg| arg.spread.is_none()) else {
            return;
        };
        if let Some(text) = expr_string(&first.expr) {
            self.sites.push(LiteralSite {
                span: first.expr.span(),
                kind,
                text,
            });
        }
    }
}

/// Minifies the CSS literals of `module`, returning replacement literals
/// keyed by the span of the original argument.
pub async fn minify_literals(
    source_map: &Lrc<SourceMap>,
    module: &Module,
    minifiers: &Minifiers,
) -> anyhow::Result<HashMap<Span, Box<Expr>>> {
    if minifiers.css_rule.is_none() && minifiers.css_selector.is_none() {
        return Ok(HashMap::new());
    }

    let mut collector = LiteralCollector::default();
    module.visit_with(&mut collector);

    let mut replacements = HashMap::new();
    for site in collector.sites {
        let minifier: Option<&Rc<dyn Minify>> = match site.kind {
            LiteralKind::CssRule => minifiers.css_rule.as_ref(),
            LiteralKind::CssSelector => minifiers.css_selector.as_ref(),
        };
        let Some(minifier) = minifier else {
            continue;
        };

        let minified = minifier.minify(site.text).await?;
        replacements.insert(site.span, parse_expr(source_map, &js_string(&minified))?);
    }

    Ok(replacements)
}

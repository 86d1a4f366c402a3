//! Rewrites references to imported bindings into namespace member reads.
//!
//! `import { x } from "./a.js"` becomes a namespace object `__import_0`, and
//! every free reference to `x` becomes `__import_0.x`. Reading through the
//! namespace keeps bindings live across cycles. Declarations that shadow an
//! imported name (parameters, `var`s, block scoped declarations, catch
//! parameters, named function and class expressions) are tracked so the
//! shadowed references stay untouched.

use std::collections::{HashMap, HashSet};

use anyhow::bail;
use deno_ast::swc::ast::{
    ArrowExpr, BlockStmt, BlockStmtOrExpr, CatchClause, ClassExpr, Constructor, Decl, Expr, FnExpr,
    ForHead, ForInStmt, ForOfStmt, ForStmt, Function, GetterProp, ObjectPatProp, ParamOrTsParamProp,
    Pat, Prop, PropOrSpread, SetterProp, Stmt, SwitchStmt, VarDecl, VarDeclKind, VarDeclOrExpr,
};
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::SourceMap;
use deno_ast::swc::ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::parse::parse_expr;

/// Adds the names bound by `pat` to `names`.
pub fn pattern_names(pat: &Pat, names: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => names.push(binding.id.sym.to_string()),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                pattern_names(elem, names);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pattern_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => names.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pattern_names(&rest.arg, names),
                }
            }
        }
        Pat::Rest(rest) => pattern_names(&rest.arg, names),
        Pat::Assign(assign) => pattern_names(&assign.left, names),
        _ => {}
    }
}

fn var_decl_names(var: &VarDecl, names: &mut Vec<String>) {
    for decl in &var.decls {
        pattern_names(&decl.name, names);
    }
}

/// Names declared directly in a statement list with block scope.
fn lexical_names<'a>(stmts: impl IntoIterator<Item = &'a Stmt>) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in stmts {
        if let Stmt::Decl(decl) = stmt {
            match decl {
                Decl::Var(var) if var.kind != VarDeclKind::Var => var_decl_names(var, &mut names),
                Decl::Class(class) => names.push(class.ident.sym.to_string()),
                Decl::Fn(function) => names.push(function.ident.sym.to_string()),
                _ => {}
            }
        }
    }
    names
}

/// Collects `var` declarations of a function body, without entering nested
/// functions.
#[derive(Default)]
struct VarCollector {
    names: Vec<String>,
}

impl VarCollector {
    fn collect(body: &BlockStmt) -> Vec<String> {
        let mut collector = Self::default();
        body.visit_with(&mut collector);
        collector.names
    }
}

impl Visit for VarCollector {
    fn visit_var_decl(&mut self, var: &VarDecl) {
        if var.kind == VarDeclKind::Var {
            var_decl_names(var, &mut self.names);
        }
        var.visit_children_with(self);
    }

    fn visit_function(&mut self, _: &Function) {}

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}

    fn visit_constructor(&mut self, _: &Constructor) {}

    fn visit_getter_prop(&mut self, _: &GetterProp) {}

    fn visit_setter_prop(&mut self, _: &SetterProp) {}
}

struct Replacement {
    expr: Box<Expr>,
    shorthand: Box<Prop>,
}

pub struct BindingRewriter {
    replacements: HashMap<String, Replacement>,
    scopes: Vec<HashSet<String>>,
}

impl BindingRewriter {
    /// `bindings` maps local names to the expression text replacing them.
    pub fn new(
        source_map: &Lrc<SourceMap>,
        bindings: &HashMap<String, String>,
    ) -> anyhow::Result<Self> {
        let mut replacements = HashMap::new();
        for (name, access) in bindings {
            let expr = parse_expr(source_map, access)?;
            let shorthand = match *parse_expr(source_map, &format!("({{ {}: {} }})", name, access))? {
                Expr::Paren(paren) => match *paren.expr {
                    Expr::Object(mut object) if object.props.len() == 1 => {
                        match object.props.remove(0) {
                            PropOrSpread::Prop(prop) => prop,
                            PropOrSpread::Spread(_) => bail!("Unexpected spread for {}", name),
                        }
                    }
                    _ => bail!("Unexpected property shape for {}", name),
                },
                _ => bail!("Unexpected property shape for {}", name),
            };
            replacements.insert(name.clone(), Replacement { expr, shorthand });
        }

        Ok(Self {
            replacements,
            scopes: Vec::new(),
        })
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn replacement(&self, name: &str) -> Option<&Replacement> {
        if self.is_shadowed(name) {
            return None;
        }
        self.replacements.get(name)
    }

    fn scoped<N: VisitMutWith<Self>>(&mut self, names: Vec<String>, node: &mut N) {
        let scope: HashSet<String> = names
            .into_iter()
            .filter(|name| self.replacements.contains_key(name))
            .collect();

        if scope.is_empty() {
            node.visit_mut_children_with(self);
            return;
        }

        self.scopes.push(scope);
        node.visit_mut_children_with(self);
        self.scopes.pop();
    }
}

impl VisitMut for BindingRewriter {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Ident(ident) = expr {
            if let Some(replacement) = self.replacement(&ident.sym) {
                *expr = *replacement.expr.clone();
            }
            return;
        }
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        if let Prop::Shorthand(ident) = prop {
            if let Some(replacement) = self.replacement(&ident.sym) {
                *prop = *replacement.shorthand.clone();
            }
            return;
        }
        prop.visit_mut_children_with(self);
    }

    fn visit_mut_function(&mut self, function: &mut Function) {
        let mut names = Vec::new();
        for param in &function.params {
            pattern_names(&param.pat, &mut names);
        }
        if let Some(body) = &function.body {
            names.extend(VarCollector::collect(body));
        }
        self.scoped(names, function);
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        let mut names = Vec::new();
        for param in &arrow.params {
            pattern_names(param, &mut names);
        }
        if let BlockStmtOrExpr::BlockStmt(body) = &*arrow.body {
            names.extend(VarCollector::collect(body));
        }
        self.scoped(names, arrow);
    }

    fn visit_mut_constructor(&mut self, constructor: &mut Constructor) {
        let mut names = Vec::new();
        for param in &constructor.params {
            if let ParamOrTsParamProp::Param(param) = param {
                pattern_names(&param.pat, &mut names);
            }
        }
        if let Some(body) = &constructor.body {
            names.extend(VarCollector::collect(body));
        }
        self.scoped(names, constructor);
    }

    fn visit_mut_getter_prop(&mut self, getter: &mut GetterProp) {
        let names = getter
            .body
            .as_ref()
            .map(VarCollector::collect)
            .unwrap_or_default();
        self.scoped(names, getter);
    }

    fn visit_mut_setter_prop(&mut self, setter: &mut SetterProp) {
        let mut names = Vec::new();
        pattern_names(&setter.param, &mut names);
        if let Some(body) = &setter.body {
            names.extend(VarCollector::collect(body));
        }
        self.scoped(names, setter);
    }

    fn visit_mut_fn_expr(&mut self, fn_expr: &mut FnExpr) {
        let names = fn_expr
            .ident
            .iter()
            .map(|ident| ident.sym.to_string())
            .collect();
        self.scoped(names, fn_expr);
    }

    fn visit_mut_class_expr(&mut self, class_expr: &mut ClassExpr) {
        let names = class_expr
            .ident
            .iter()
            .map(|ident| ident.sym.to_string())
            .collect();
        self.scoped(names, class_expr);
    }

    fn visit_mut_block_stmt(&mut self, block: &mut BlockStmt) {
        let names = lexical_names(&block.stmts);
        self.scoped(names, block);
    }

    fn visit_mut_switch_stmt(&mut self, switch: &mut SwitchStmt) {
        let names = lexical_names(switch.cases.iter().flat_map(|case| case.cons.iter()));
        self.scoped(names, switch);
    }

    fn visit_mut_catch_clause(&mut self, clause: &mut CatchClause) {
        let mut names = Vec::new();
        if let Some(param) = &clause.param {
            pattern_names(param, &mut names);
        }
        self.scoped(names, clause);
    }

    fn visit_mut_for_stmt(&mut self, for_stmt: &mut ForStmt) {
        let mut names = Vec::new();
        if let Some(VarDeclOrExpr::VarDecl(var)) = &for_stmt.init {
            if var.kind != VarDeclKind::Var {
                var_decl_names(var, &mut names);
            }
        }
        self.scoped(names, for_stmt);
    }

    fn visit_mut_for_in_stmt(&mut self, for_in: &mut ForInStmt) {
        let names = for_head_names(&for_in.left);
        self.scoped(names, for_in);
    }

    fn visit_mut_for_of_stmt(&mut self, for_of: &mut ForOfStmt) {
        let names = for_head_names(&for_of.left);
        self.scoped(names, for_of);
    }
}

fn for_head_names(head: &ForHead) -> Vec<String> {
    let mut names = Vec::new();
    if let ForHead::VarDecl(var) = head {
        if var.kind != VarDeclKind::Var {
            var_decl_names(var, &mut names);
        }
    }
    names
}

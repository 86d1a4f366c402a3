//! Declarative (ES) modules.
//!
//! Static imports become hoisted namespace loads
//! (`const __import_N = await __load_es_module(<id>)`) and references to the
//! imported bindings read through that namespace. Exports become getter
//! registrations placed before any load, so the namespace has its complete
//! key set while the module is still evaluating:
//!
//! ```ignore
//! __export_es_key("value", () => value);
//! const __import_0 = await __load_es_module(2);
//! __export_es_object(__import_0);
//! let value = __import_0.other + 1;
//! ```

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use deno_ast::swc::ast::{
    Decl, DefaultDecl, ExportSpecifier, Expr, ImportSpecifier, ModuleDecl, ModuleItem, ObjectLit,
    Stmt, Str,
};
use deno_ast::swc::common::BytePos;
use deno_ast::swc::ecma_visit::VisitMutWith;

use super::import_meta::ImportMetaRewriter;
use super::literals::minify_literals;
use super::parse::{emit_module, parse_items, parse_module};
use super::requests::{export_name, import_type, str_value, CallSite, CallSiteCollector, SpanReplacer};
use super::scope::{pattern_names, BindingRewriter};
use super::{
    call_site_hint, call_site_replacement, import_type_hint, Dependencies, ModuleContext,
    Transformed,
};
use crate::graph::record::Dependency;
use crate::text::{js_string, member_access};

const DEFAULT_EXPORT: &str = "__default_export";

/// A static import or re-export source.
struct Load {
    specifier: String,
    import_type: Option<String>,
    position: BytePos,
    namespace: String,
    used: bool,
    star: bool,
}

enum ExportKey {
    Key(String),
    /// Keys re-exported by `export * from` the load at this index.
    Star(usize),
}

#[derive(Default)]
struct Analysis {
    loads: Vec<Load>,
    /// Local name of each imported binding mapped to its namespace read.
    bindings: HashMap<String, String>,
    /// Export key mapped to the expression its getter returns.
    registrations: Vec<(String, String)>,
    keys: Vec<ExportKey>,
    body: Vec<ModuleItem>,
}

impl Analysis {
    fn load(&mut self, src: &Str, attributes: Option<&ObjectLit>) -> anyhow::Result<usize> {
        let specifier =
            str_value(src).ok_or_else(|| anyhow!("Unsupported module specifier {:?}", src.raw))?;
        let import_type = attributes.and_then(import_type);

        if let Some(index) = self
            .loads
            .iter()
            .position(|load| load.specifier == specifier && load.import_type == import_type)
        {
            return Ok(index);
        }

        self.loads.push(Load {
            specifier,
            import_type,
            position: src.span.lo,
            namespace: format!("__import_{}", self.loads.len()),
            used: false,
            star: false,
        });
        Ok(self.loads.len() - 1)
    }

    /// Expression reading `key` from the namespace of load `index`.
    fn namespace_read(&mut self, index: usize, key: Option<&str>) -> String {
        let load = &mut self.loads[index];
        load.used = true;
        match key {
            Some(key) => member_access(&load.namespace, key),
            None => load.namespace.clone(),
        }
    }

    fn local_read(&self, local: &str) -> String {
        self.bindings
            .get(local)
            .cloned()
            .unwrap_or_else(|| local.to_string())
    }

    fn export(&mut self, key: String, read: String) {
        self.keys.push(ExportKey::Key(key.clone()));
        self.registrations.push((key, read));
    }

    fn import(&mut self, import: &deno_ast::swc::ast::ImportDecl) -> anyhow::Result<()> {
        let index = self.load(&import.src, import.with.as_deref())?;

        for specifier in &import.specifiers {
            let (local, read) = match specifier {
                ImportSpecifier::Named(named) => {
                    let imported = match &named.imported {
                        Some(imported) => export_name(imported)
                            .ok_or_else(|| anyhow!("Unsupported import name"))?,
                        None => named.local.sym.to_string(),
                    };
                    (&named.local, self.namespace_read(index, Some(&imported)))
                }
                ImportSpecifier::Default(default) => {
                    (&default.local, self.namespace_read(index, Some("default")))
                }
                ImportSpecifier::Namespace(namespace) => {
                    (&namespace.local, self.namespace_read(index, None))
                }
            };
            self.bindings.insert(local.sym.to_string(), read);
        }

        Ok(())
    }

    fn export_decl(&mut self, decl: Decl) {
        let mut names = Vec::new();
        match &decl {
            Decl::Var(var) => {
                for declarator in &var.decls {
                    pattern_names(&declarator.name, &mut names);
                }
            }
            Decl::Fn(function) => names.push(function.ident.sym.to_string()),
            Decl::Class(class) => names.push(class.ident.sym.to_string()),
            _ => {}
        }

        for name in names {
            self.export(name.clone(), name);
        }
        self.body.push(ModuleItem::Stmt(Stmt::Decl(decl)));
    }

    fn export_named(&mut self, named: &deno_ast::swc::ast::NamedExport) -> anyhow::Result<()> {
        let source = match &named.src {
            Some(src) => Some(self.load(src, named.with.as_deref())?),
            None => None,
        };

        for specifier in &named.specifiers {
            match (specifier, source) {
                (ExportSpecifier::Named(named), _) => {
                    let orig = export_name(&named.orig)
                        .ok_or_else(|| anyhow!("Unsupported export name"))?;
                    let key = match &named.exported {
                        Some(exported) => export_name(exported)
                            .ok_or_else(|| anyhow!("Unsupported export name"))?,
                        None => orig.clone(),
                    };
                    let read = match source {
                        Some(index) => self.namespace_read(index, Some(&orig)),
                        None => self.local_read(&orig),
                    };
                    self.export(key, read);
                }
                (ExportSpecifier::Namespace(namespace), Some(index)) => {
                    let key = export_name(&namespace.name)
                        .ok_or_else(|| anyhow!("Unsupported export name"))?;
                    let read = self.namespace_read(index, None);
                    self.export(key, read);
                }
                (ExportSpecifier::Default(default), Some(index)) => {
                    let read = self.namespace_read(index, Some("default"));
                    self.export(default.exported.sym.to_string(), read);
                }
                _ => bail!("Unsupported export specifier"),
            }
        }

        Ok(())
    }

    fn export_default(&mut self, context: &ModuleContext, decl: DefaultDecl) -> anyhow::Result<()> {
        match decl {
            DefaultDecl::Fn(fn_expr) => {
                let name = fn_expr
                    .ident
                    .as_ref()
                    .map(|ident| ident.sym.to_string())
                    .unwrap_or_else(|| DEFAULT_EXPORT.to_string());
                let mut item = single_item(context, &format!("function {}() {{}}", name))?;
                match &mut item {
                    ModuleItem::Stmt(Stmt::Decl(Decl::Fn(fn_decl))) => {
                        fn_decl.function = fn_expr.function;
                    }
                    _ => bail!("Unexpected function template"),
                }
                self.export("default".to_string(), name);
                self.body.push(item);
            }
            DefaultDecl::Class(class_expr) => {
                let name = class_expr
                    .ident
                    .as_ref()
                    .map(|ident| ident.sym.to_string())
                    .unwrap_or_else(|| DEFAULT_EXPORT.to_string());
                let mut item = single_item(context, &format!("class {} {{}}", name))?;
                match &mut item {
                    ModuleItem::Stmt(Stmt::Decl(Decl::Class(class_decl))) => {
                        class_decl.class = class_expr.class;
                    }
                    _ => bail!("Unexpected class template"),
                }
                self.export("default".to_string(), name);
                self.body.push(item);
            }
            _ => bail!("Unsupported default export in {}", context.path.display()),
        }
        Ok(())
    }

    fn export_default_expr(&mut self, context: &ModuleContext, expr: Box<Expr>) -> anyhow::Result<()> {
        let mut item = single_item(context, &format!("const {} = 0;", DEFAULT_EXPORT))?;
        match &mut item {
            ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) if var.decls.len() == 1 => {
                var.decls[0].init = Some(expr);
            }
            _ => bail!("Unexpected default export template"),
        }
        self.export("default".to_string(), DEFAULT_EXPORT.to_string());
        self.body.push(item);
        Ok(())
    }
}

fn single_item(context: &ModuleContext, code: &str) -> anyhow::Result<ModuleItem> {
    let mut items = parse_items(&context.source_map, code)?;
    match (items.pop(), items.is_empty()) {
        (Some(item), true) => Ok(item),
        _ => bail!("Expected a single statement in `{}`", code),
    }
}

enum Pending {
    Load(usize),
    Call(CallSite),
}

pub async fn transform(
    context: &ModuleContext<'_>,
    text: String,
    deps: &mut dyn Dependencies,
) -> anyhow::Result<Transformed> {
    let mut module = parse_module(&context.source_map, Some(context.path), text)?;

    let mut analysis = Analysis::default();
    for item in std::mem::take(&mut module.body) {
        match item {
            ModuleItem::Stmt(stmt) => analysis.body.push(ModuleItem::Stmt(stmt)),
            ModuleItem::ModuleDecl(decl) => match decl {
                ModuleDecl::Import(import) => analysis.import(&import)?,
                ModuleDecl::ExportDecl(export) => analysis.export_decl(export.decl),
                ModuleDecl::ExportNamed(named) => analysis.export_named(&named)?,
                ModuleDecl::ExportDefaultDecl(default) => {
                    analysis.export_default(context, default.decl)?
                }
                ModuleDecl::ExportDefaultExpr(default) => {
                    analysis.export_default_expr(context, default.expr)?
                }
                ModuleDecl::ExportAll(all) => {
                    let index = analysis.load(&all.src, all.with.as_deref())?;
                    analysis.loads[index].star = true;
                    analysis.keys.push(ExportKey::Star(index));
                }
                _ => bail!("Unsupported module declaration in {}", context.path.display()),
            },
        }
    }
    module.body = std::mem::take(&mut analysis.body);

    // Resolve static loads and dynamic imports in source order
    let mut pending: Vec<(BytePos, Pending)> = analysis
        .loads
        .iter()
        .enumerate()
        .map(|(index, load)| (load.position, Pending::Load(index)))
        .chain(
            CallSiteCollector::collect(&module, false)
                .into_iter()
                .map(|site| (site.span.lo, Pending::Call(site))),
        )
        .collect();
    pending.sort_by_key(|(position, _)| *position);

    let mut load_dependencies: Vec<Option<Dependency>> = vec![None; analysis.loads.len()];
    let mut replacer = SpanReplacer::default();
    for (_, request) in pending {
        match request {
            Pending::Load(index) => {
                let load = &analysis.loads[index];
                let hint = import_type_hint(load.import_type.as_deref(), context.path);
                load_dependencies[index] = Some(deps.dependency(&load.specifier, hint).await?);
            }
            Pending::Call(site) => {
                let hint = call_site_hint(&site, context.path);
                let dependency = deps.dependency(&site.specifier, hint).await?;
                replacer.insert(site.span, call_site_replacement(context, site.kind, &dependency)?);
            }
        }
    }

    if context.minify_literals {
        replacer.extend(minify_literals(&context.source_map, &module, context.minifiers).await?);
    }

    module.visit_mut_with(&mut replacer);
    module.visit_mut_with(&mut BindingRewriter::new(&context.source_map, &analysis.bindings)?);
    module.visit_mut_with(&mut ImportMetaRewriter::new(&context.source_map)?);

    let mut header = Vec::new();
    for (key, read) in &analysis.registrations {
        header.push(format!("__export_es_key({}, () => {});", js_string(key), read));
    }
    for (load, dependency) in analysis.loads.iter().zip(&load_dependencies) {
        let dependency = dependency
            .as_ref()
            .ok_or_else(|| anyhow!("Import of \"{}\" was never resolved", load.specifier))?;
        let expr = match dependency {
            Dependency::Bundled(descriptor) if descriptor.is_commonjs => {
                format!("await __load_commonjs_module_for_es({})", descriptor.module_id)
            }
            Dependency::Bundled(descriptor) => {
                format!("await __load_es_module({})", descriptor.module_id)
            }
            Dependency::Native(specifier) => format!("await import({})", js_string(specifier)),
        };

        if load.used || load.star {
            header.push(format!("const {} = {};", load.namespace, expr));
        } else {
            header.push(format!("{};", expr));
        }
        if load.star {
            header.push(format!("__export_es_object({});", load.namespace));
        }
    }

    let mut exported_keys: Vec<String> = Vec::new();
    for key in &analysis.keys {
        let keys = match key {
            ExportKey::Key(key) => vec![key.clone()],
            ExportKey::Star(index) => match &load_dependencies[*index] {
                Some(Dependency::Bundled(descriptor)) => {
                    if descriptor.exported_keys.is_empty() {
                        log::debug!(
                            "Export keys of {} are not known yet, `export *` in {} adds none",
                            descriptor.identity.display(),
                            context.path.display()
                        );
                    }
                    descriptor
                        .exported_keys
                        .iter()
                        .filter(|key| key.as_str() != "default")
                        .cloned()
                        .collect()
                }
                _ => Vec::new(),
            },
        };
        for key in keys {
            if !exported_keys.contains(&key) {
                exported_keys.push(key);
            }
        }
    }

    let body = emit_module(&context.source_map, &module, false)?;
    let code = if header.is_empty() {
        body
    } else {
        format!("{}\n{}", header.join("\n"), body)
    };

    Ok(Transformed {
        code,
        exported_keys,
    })
}

//! Source transformer.
//!
//! Rewrites one module so that every cross-module reference goes through the
//! runtime loader:
//! 1. Asset kinds (stylesheets, JSON) are turned into module source first
//! 2. The source is parsed with swc and its call sites are resolved, in
//!    source order, through [`Dependencies`]
//! 3. The tree is rewritten and printed back
//!
//! Declarative modules additionally get their import/export declarations
//! replaced by loader calls and getter registrations (see [`esm`]).

use std::path::{Path, PathBuf};

use deno_ast::swc::ast::{Expr, ModuleItem};
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::SourceMap;
use futures::future::LocalBoxFuture;

use crate::graph::record::{AssetHint, AssetKind, Classification, Dependency};
use crate::loader::LoadedSource;
use crate::minify::Minifiers;
use crate::text::js_string;

pub mod commonjs;
pub mod esm;
pub mod import_meta;
pub mod json;
pub mod literals;
pub mod parse;
pub mod requests;
pub mod scope;
pub mod stylesheet;

use import_meta::ImportMetaFinder;
use requests::{CallKind, CallSite};

/// Graph access for the module being transformed.
pub trait Dependencies {
    /// Resolves a module requested by this module and makes sure it is part
    /// of the bundle.
    fn dependency<'a>(
        &'a mut self,
        specifier: &'a str,
        hint: Option<AssetHint>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Dependency>>;

    /// Resolves and reads a file referenced by a stylesheet.
    fn asset<'a>(
        &'a mut self,
        specifier: &'a str,
    ) -> LocalBoxFuture<'a, anyhow::Result<(PathBuf, Vec<u8>)>>;
}

/// Output of the transformer for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// Factory body.
    pub code: String,
    /// Export keys in declaration order, without duplicates.
    pub exported_keys: Vec<String>,
}

/// State shared by the passes working on one module.
pub struct ModuleContext<'a> {
    pub source_map: Lrc<SourceMap>,
    pub path: &'a Path,
    pub minifiers: &'a Minifiers,
    /// Off for synthetic modules, whose only literal is already minified.
    pub minify_literals: bool,
}

/// Transforms `source` into the body of its module factory.
pub async fn transform(
    source: &LoadedSource,
    classification: Classification,
    asset_kind: AssetKind,
    deps: &mut dyn Dependencies,
    minifiers: &Minifiers,
) -> anyhow::Result<Transformed> {
    let commonjs = classification.is_commonjs();
    let (text, minify_literals) = match asset_kind {
        AssetKind::Source => (source.text.clone(), true),
        AssetKind::Json => (json::synthesize(source, commonjs)?, false),
        AssetKind::Stylesheet => (
            stylesheet::synthesize(source, commonjs, deps, minifiers).await?,
            false,
        ),
    };

    let context = ModuleContext {
        source_map: Lrc::new(SourceMap::default()),
        path: &source.path,
        minifiers,
        minify_literals,
    };

    match classification {
        Classification::Declarative => esm::transform(&context, text, deps).await,
        Classification::Imperative => commonjs::transform(&context, text, deps).await,
    }
}

/// Whether a source without a telling extension is an ES module: it must
/// parse as a module and contain an import/export declaration or
/// `import.meta`.
pub fn looks_declarative(path: &Path, text: &str) -> bool {
    let source_map = Lrc::new(SourceMap::default());
    match parse::parse_module(&source_map, Some(path), text.to_string()) {
        Ok(module) => {
            module
                .body
                .iter()
                .any(|item| matches!(item, ModuleItem::ModuleDecl(_)))
                || ImportMetaFinder::find(&module)
        }
        Err(err) => {
            log::debug!("Treating {} as CommonJS: {:#}", path.display(), err);
            false
        }
    }
}

/// Hint implied by an import attribute `type`.
pub fn import_type_hint(import_type: Option<&str>, path: &Path) -> Option<AssetHint> {
    let import_type = import_type?;
    let hint = AssetHint::from_import_type(import_type);
    if hint.is_none() {
        log::warn!(
            "Ignoring unsupported import type \"{}\" in {}",
            import_type,
            path.display()
        );
    }
    hint
}

/// Hint a `require()` or `import()` call site carries.
pub fn call_site_hint(site: &CallSite, path: &Path) -> Option<AssetHint> {
    match site.kind {
        CallKind::Require => Some(AssetHint::CommonJs),
        CallKind::DynamicImport => import_type_hint(site.import_type.as_deref(), path),
    }
}

/// Expression replacing a resolved `require()` or `import()` call.
pub fn call_site_replacement(
    context: &ModuleContext,
    kind: CallKind,
    dependency: &Dependency,
) -> anyhow::Result<Box<Expr>> {
    let code = match (kind, dependency) {
        (CallKind::Require, Dependency::Bundled(descriptor)) => {
            format!("__load_commonjs_module({})", descriptor.module_id)
        }
        (CallKind::Require, Dependency::Native(specifier)) => {
            format!("require({})", js_string(specifier))
        }
        (CallKind::DynamicImport, Dependency::Bundled(descriptor)) if descriptor.is_commonjs => {
            format!("__load_commonjs_module_for_es({})", descriptor.module_id)
        }
        (CallKind::DynamicImport, Dependency::Bundled(descriptor)) => {
            format!("__load_es_module({}, true)", descriptor.module_id)
        }
        (CallKind::DynamicImport, Dependency::Native(specifier)) => {
            format!("import({})", js_string(specifier))
        }
    };

    parse::parse_expr(&context.source_map, &code)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`Dependencies`] for transformer tests.

    use std::collections::HashMap;
    use std::path::PathBuf;

    use futures::future::{FutureExt, LocalBoxFuture};

    use super::Dependencies;
    use crate::graph::record::{AssetHint, BundleDescriptor, Dependency, ModuleId};

    #[derive(Default)]
    pub struct FakeDependencies {
        pub modules: HashMap<String, Dependency>,
        pub requested: Vec<(String, Option<AssetHint>)>,
    }

    impl FakeDependencies {
        pub fn with(mut self, specifier: &str, dependency: Dependency) -> Self {
            self.modules.insert(specifier.to_string(), dependency);
            self
        }

        pub fn es(self, specifier: &str, id: usize, keys: &[&str]) -> Self {
            self.with(specifier, bundled(id, keys, false))
        }

        pub fn commonjs(self, specifier: &str, id: usize) -> Self {
            self.with(specifier, bundled(id, &["default"], true))
        }
    }

    pub fn bundled(id: usize, keys: &[&str], is_commonjs: bool) -> Dependency {
        Dependency::Bundled(BundleDescriptor {
            module_id: ModuleId::Index(id),
            leading_directive: None,
            exported_keys: keys.iter().map(|key| key.to_string()).collect(),
            identity: PathBuf::from(format!("/src/{}.js", id)),
            is_commonjs,
        })
    }

    impl Dependencies for FakeDependencies {
        fn dependency<'a>(
            &'a mut self,
            specifier: &'a str,
            hint: Option<AssetHint>,
        ) -> LocalBoxFuture<'a, anyhow::Result<Dependency>> {
            self.requested.push((specifier.to_string(), hint));
            let dependency = self
                .modules
                .get(specifier)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Cannot resolve \"{}\"", specifier));
            async move { dependency }.boxed_local()
        }

        fn asset<'a>(
            &'a mut self,
            specifier: &'a str,
        ) -> LocalBoxFuture<'a, anyhow::Result<(PathBuf, Vec<u8>)>> {
            async move { Err(anyhow::anyhow!("no asset {}", specifier)) }.boxed_local()
        }
    }
}

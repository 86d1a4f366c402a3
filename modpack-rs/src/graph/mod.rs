//! Graph builder.
//!
//! Discovers every module reachable from the entry, depth first and in
//! source order. Each module is classified once, gets a slot in its
//! classification's table before its own requests are followed, and is
//! transformed into a factory stored in that slot.
//!
//! JSON and stylesheet assets are always bundled as CommonJS, so a file that
//! is both imported and required is still evaluated once. Importers reach
//! them through the CommonJS-for-ES adapter.

pub mod ids;
pub mod record;
pub mod table;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::bail;
use futures::future::{FutureExt, LocalBoxFuture};

use crate::loader::{extension_of, SourceLoader};
use crate::minify::Minifiers;
use crate::resolver::{Resolution, Resolver};
use crate::runtime;
use crate::transform::{self, looks_declarative, Dependencies};
use ids::IdStrategy;
use record::{AssetHint, AssetKind, BundleDescriptor, Classification, Dependency, ModuleRecord};
use table::{ModuleTable, SlotState};

pub struct GraphBuilder {
    resolver: Resolver,
    loader: SourceLoader,
    minifiers: Minifiers,
    es_modules: ModuleTable,
    commonjs_modules: ModuleTable,
    /// First classification of every identity, never recomputed.
    classified: HashMap<PathBuf, (Classification, AssetKind)>,
}

impl GraphBuilder {
    pub fn new(resolver: Resolver, minifiers: Minifiers, ids: Rc<dyn IdStrategy>) -> Self {
        Self {
            resolver,
            loader: SourceLoader::new(),
            minifiers,
            es_modules: ModuleTable::new(Classification::Declarative, ids.clone()),
            commonjs_modules: ModuleTable::new(Classification::Imperative, ids),
            classified: HashMap::new(),
        }
    }

    pub fn es_modules(&self) -> &ModuleTable {
        &self.es_modules
    }

    pub fn commonjs_modules(&self) -> &ModuleTable {
        &self.commonjs_modules
    }

    fn table(&self, classification: Classification) -> &ModuleTable {
        match classification {
            Classification::Declarative => &self.es_modules,
            Classification::Imperative => &self.commonjs_modules,
        }
    }

    fn table_mut(&mut self, classification: Classification) -> &mut ModuleTable {
        match classification {
            Classification::Declarative => &mut self.es_modules,
            Classification::Imperative => &mut self.commonjs_modules,
        }
    }

    /// Makes sure the module `specifier` names (as requested from `parent`)
    /// is part of the bundle and returns what its importer needs to know.
    ///
    /// Builtins and skipped specifiers come back as [`Dependency::Native`].
    pub fn build<'a>(
        &'a mut self,
        specifier: &'a str,
        parent: Option<&'a Path>,
        hint: Option<AssetHint>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Dependency>> {
        async move {
            let required = hint == Some(AssetHint::CommonJs);
            let identity = match self.resolver.resolve(specifier, parent, required).await? {
                Resolution::Module(path) => path,
                Resolution::Builtin(name) => return Ok(Dependency::Native(name)),
                Resolution::Skip => return Ok(Dependency::Native(specifier.to_string())),
            };

            let (classification, asset_kind) = self.classify(&identity, hint).await?;

            if let Some(descriptor) = self.existing(&identity, classification) {
                return Ok(Dependency::Bundled(descriptor));
            }

            let source = self.loader.load(&identity).await?;
            let descriptor = self
                .table_mut(classification)
                .reserve(&identity, source.directive.clone())?;
            log::debug!(
                "Bundling {} as {:?} {:?} module {}",
                identity.display(),
                classification,
                asset_kind,
                descriptor.module_id
            );

            let minifiers = self.minifiers.clone();
            let transformed = {
                let mut scope = ModuleScope {
                    builder: self,
                    parent: &identity,
                };
                transform::transform(&source, classification, asset_kind, &mut scope, &minifiers)
                    .await?
            };

            let record = ModuleRecord {
                module_id: descriptor.module_id,
                identity: identity.clone(),
                classification,
                asset_kind,
                exported_keys: transformed.exported_keys,
                leading_directive: descriptor.leading_directive,
                factory: runtime::factory(classification, &transformed.code)?,
            };
            let descriptor = self.table_mut(classification).fill(record)?;

            Ok(Dependency::Bundled(descriptor))
        }
        .boxed_local()
    }

    /// Descriptor of an identity that already has a slot.
    fn existing(
        &self,
        identity: &Path,
        classification: Classification,
    ) -> Option<BundleDescriptor> {
        match self.table(classification).state(identity) {
            SlotState::Unvisited => None,
            SlotState::Reserved(descriptor) => Some(descriptor.clone()),
            SlotState::Filled(record) => Some(record.descriptor()),
        }
    }

    async fn classify(
        &mut self,
        identity: &Path,
        hint: Option<AssetHint>,
    ) -> anyhow::Result<(Classification, AssetKind)> {
        let required = hint == Some(AssetHint::CommonJs);
        let requested = match hint {
            Some(AssetHint::Stylesheet) => AssetKind::Stylesheet,
            Some(AssetHint::Json) => AssetKind::Json,
            _ => match extension_of(identity).as_str() {
                "css" => AssetKind::Stylesheet,
                "json" => AssetKind::Json,
                _ => AssetKind::Source,
            },
        };

        let (classification, asset_kind) = match self.classified.get(identity) {
            Some(&(classification, asset_kind)) => {
                if asset_kind != requested {
                    log::warn!(
                        "{} was already bundled as {:?}, reusing it for a {:?} request",
                        identity.display(),
                        asset_kind,
                        requested
                    );
                }
                (classification, asset_kind)
            }
            None => {
                let classification = match (requested, extension_of(identity).as_str()) {
                    (AssetKind::Stylesheet | AssetKind::Json, _) => Classification::Imperative,
                    (_, "mjs") => Classification::Declarative,
                    (_, "cjs") => Classification::Imperative,
                    _ => self.infer(identity).await?,
                };
                self.classified
                    .insert(identity.to_path_buf(), (classification, requested));
                (classification, requested)
            }
        };

        if required && classification == Classification::Declarative {
            bail!(
                "Cannot require() ES module {}, use import() instead",
                identity.display()
            );
        }

        Ok((classification, asset_kind))
    }

    /// Syntax heuristic for sources without a telling extension.
    async fn infer(&mut self, identity: &Path) -> anyhow::Result<Classification> {
        let source = self.loader.load(identity).await?;
        if looks_declarative(identity, &source.text) {
            Ok(Classification::Declarative)
        } else {
            Ok(Classification::Imperative)
        }
    }
}

/// The builder as seen from one module being transformed.
struct ModuleScope<'b> {
    builder: &'b mut GraphBuilder,
    parent: &'b Path,
}

impl Dependencies for ModuleScope<'_> {
    fn dependency<'a>(
        &'a mut self,
        specifier: &'a str,
        hint: Option<AssetHint>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Dependency>> {
        self.builder.build(specifier, Some(self.parent), hint)
    }

    fn asset<'a>(
        &'a mut self,
        specifier: &'a str,
    ) -> LocalBoxFuture<'a, anyhow::Result<(PathBuf, Vec<u8>)>> {
        async move {
            let path = match self
                .builder
                .resolver
                .resolve(specifier, Some(self.parent), false)
                .await?
            {
                Resolution::Module(path) => path,
                _ => bail!("\"{}\" does not name a file", specifier),
            };
            let bytes = self.builder.loader.load_bytes(&path).await?;

            Ok((path, bytes))
        }
        .boxed_local()
    }
}

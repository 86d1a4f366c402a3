//! Packager: turns an entry module into a single artifact file.

use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context};

use crate::graph::ids::{DenseIds, IdStrategy, IdentityKeys};
use crate::graph::record::{BundleDescriptor, Dependency};
use crate::graph::GraphBuilder;
use crate::minify::{self, Minifiers};
use crate::resolver::{ResolveOverride, Resolver};
use crate::runtime::{self, LoaderInput};

/// Options for [`bundle`].
#[derive(Clone)]
pub struct BundleOptions {
    /// Consulted before the default resolution for every specifier.
    pub resolve_override: Option<Rc<dyn ResolveOverride>>,
    pub minifiers: Minifiers,
    /// Minify the artifact. Defaults to `!debug`.
    pub minify: Option<bool>,
    /// Key modules by absolute path instead of dense integer ids.
    pub debug: bool,
    /// Emit a CommonJS artifact (`module.exports = ...`) instead of an ES module.
    pub output_commonjs: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            resolve_override: None,
            minifiers: Minifiers::builtin(),
            minify: None,
            debug: false,
            output_commonjs: false,
        }
    }
}

/// Bundles the module graph rooted at `input` into the file `output`.
///
/// Relative paths are taken against the working directory. A new output
/// file gets the permissions of the entry; an existing one keeps its own.
pub async fn bundle(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: BundleOptions,
) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let input = cwd.join(input.as_ref());
    let output = cwd.join(output.as_ref());

    let ids: Rc<dyn IdStrategy> = if options.debug {
        Rc::new(IdentityKeys)
    } else {
        Rc::new(DenseIds)
    };
    let mut graph = GraphBuilder::new(
        Resolver::with_cwd(options.resolve_override.clone(), cwd),
        options.minifiers.clone(),
        ids,
    );

    let entry = input.to_string_lossy().to_string();
    let root = match graph
        .build(&entry, None, None)
        .await
        .with_context(|| format!("Failed to bundle {}", input.display()))?
    {
        Dependency::Bundled(descriptor) => descriptor,
        Dependency::Native(specifier) => {
            bail!("Entry {} resolves to native module {}", input.display(), specifier)
        }
    };

    if options.output_commonjs && !root.is_commonjs {
        bail!(
            "Cannot emit a CommonJS bundle for ES module entry {}",
            root.identity.display()
        );
    }

    let permissions = if tokio::fs::try_exists(&output).await.unwrap_or(false) {
        None
    } else {
        let metadata = tokio::fs::metadata(&root.identity)
            .await
            .with_context(|| format!("Failed to read metadata of {}", root.identity.display()))?;
        Some(metadata.permissions())
    };

    let code = render_artifact(&graph, &root, options.output_commonjs)?;
    let code = if options.minify.unwrap_or(!options.debug) {
        minify::apply(options.minifiers.javascript(options.output_commonjs), code).await?
    } else {
        code
    };
    let code = match &root.leading_directive {
        Some(directive) => format!("{}\n{}", directive, code),
        None => code,
    };

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&output, code)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if let Some(permissions) = permissions {
        tokio::fs::set_permissions(&output, permissions)
            .await
            .with_context(|| format!("Failed to set permissions of {}", output.display()))?;
    }

    log::info!(
        "Bundle {} -> {} ({} ES modules, {} CommonJS modules)",
        input.display(),
        output.display(),
        graph.es_modules().len(),
        graph.commonjs_modules().len()
    );

    Ok(())
}

/// Artifact text without the leading directive.
fn render_artifact(
    graph: &GraphBuilder,
    root: &BundleDescriptor,
    output_commonjs: bool,
) -> anyhow::Result<String> {
    let input = LoaderInput {
        es_modules: graph.es_modules().render()?,
        commonjs_modules: graph.commonjs_modules().render()?,
        init_loaded_modules: graph.es_modules().empty_state(),
        root,
    };
    let invocation = runtime::loader_invocation(&input, output_commonjs)?;

    Ok(if output_commonjs {
        invocation + "\n"
    } else {
        runtime::export_wrapper(&invocation, &root.exported_keys)
    })
}

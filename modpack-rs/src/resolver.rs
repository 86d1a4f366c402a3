//! Module specifier resolution.
//!
//! Follows the Node.js resolution algorithm: platform builtins, relative and
//! absolute paths with extension probing, package `imports`/`exports` maps,
//! package self-references and the `node_modules` walk. A caller supplied
//! [`ResolveOverride`] gets the first say on every specifier.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::Deserialize;
use serde_json::Value;

const BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file on disk, canonicalized.
    Module(PathBuf),
    /// A platform builtin, carried in its `node:` prefixed form.
    Builtin(String),
    /// The override asked to keep the reference as is.
    Skip,
}

/// Answer of a [`ResolveOverride`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideResolution {
    /// Use this file instead of running the default resolution.
    Path(PathBuf),
    /// Leave the reference untouched in the output.
    Skip,
}

/// Caller supplied resolution hook, consulted before the default algorithm.
///
/// Returning `Ok(None)` falls through to the default resolution.
pub trait ResolveOverride {
    fn resolve(
        &self,
        specifier: &str,
        parent: Option<&Path>,
        is_commonjs: bool,
    ) -> LocalBoxFuture<'static, anyhow::Result<Option<OverrideResolution>>>;
}

impl<F, Fut> ResolveOverride for F
where
    F: Fn(String, Option<PathBuf>, bool) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<OverrideResolution>>> + 'static,
{
    fn resolve(
        &self,
        specifier: &str,
        parent: Option<&Path>,
        is_commonjs: bool,
    ) -> LocalBoxFuture<'static, anyhow::Result<Option<OverrideResolution>>> {
        self(
            specifier.to_string(),
            parent.map(Path::to_path_buf),
            is_commonjs,
        )
        .boxed_local()
    }
}

/// The parts of the algorithm that differ between `require()` and `import`.
struct ResolutionMode {
    extensions: &'static [&'static str],
    /// Active export conditions, matched in package order.
    conditions: &'static [&'static str],
    main_fields: &'static [&'static str],
}

const COMMONJS_MODE: ResolutionMode = ResolutionMode {
    extensions: &[".js", ".json", ".node"],
    conditions: &["node", "require", "default"],
    main_fields: &["main"],
};

const ES_MODE: ResolutionMode = ResolutionMode {
    extensions: &[".js", ".mjs", ".cjs", ".json"],
    conditions: &["node", "import", "module", "default"],
    main_fields: &["module", "main"],
};

/// Minimal package.json structure for resolution
#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    name: Option<String>,
    main: Option<String>,
    module: Option<String>,
    exports: Option<Value>,
    imports: Option<Value>,
}

impl PackageJson {
    fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(package) => Some(package),
            Err(err) => {
                log::warn!("Ignoring unreadable {}: {}", path.display(), err);
                None
            }
        }
    }

    fn main_field(&self, field: &str) -> Option<&str> {
        match field {
            "module" => self.module.as_deref(),
            "main" => self.main.as_deref(),
            _ => None,
        }
    }
}

/// Resolves specifiers to module identities.
#[derive(Clone)]
pub struct Resolver {
    resolve_override: Option<Rc<dyn ResolveOverride>>,
    cwd: PathBuf,
}

impl Resolver {
    pub fn new(resolve_override: Option<Rc<dyn ResolveOverride>>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        Ok(Self::with_cwd(resolve_override, cwd))
    }

    /// Creates a resolver that resolves entry specifiers against `cwd`.
    pub fn with_cwd(resolve_override: Option<Rc<dyn ResolveOverride>>, cwd: PathBuf) -> Self {
        Self {
            resolve_override,
            cwd,
        }
    }

    /// Check if a specifier names a platform builtin
    pub fn is_builtin(specifier: &str) -> bool {
        specifier.starts_with("node:") || BUILTINS.contains(&specifier)
    }

    /// Resolves `specifier` as requested from `parent` (or from the working
    /// directory when `parent` is `None`).
    pub async fn resolve(
        &self,
        specifier: &str,
        parent: Option<&Path>,
        is_commonjs: bool,
    ) -> anyhow::Result<Resolution> {
        if let Some(resolve_override) = &self.resolve_override {
            match resolve_override
                .resolve(specifier, parent, is_commonjs)
                .await?
            {
                Some(OverrideResolution::Path(path)) => {
                    let path = self.base_dir(parent).join(path);
                    return canonicalize(&path).map(Resolution::Module);
                }
                Some(OverrideResolution::Skip) => return Ok(Resolution::Skip),
                None => {}
            }
        }

        self.resolve_default(specifier, parent, is_commonjs)
    }

    /// Runs the default algorithm without consulting the override.
    pub fn resolve_default(
        &self,
        specifier: &str,
        parent: Option<&Path>,
        is_commonjs: bool,
    ) -> anyhow::Result<Resolution> {
        if Self::is_builtin(specifier) {
            let name = specifier.strip_prefix("node:").unwrap_or(specifier);
            return Ok(Resolution::Builtin(format!("node:{}", name)));
        }

        let mode = if is_commonjs {
            &COMMONJS_MODE
        } else {
            &ES_MODE
        };
        let base_dir = self.base_dir(parent);

        let resolved = if let Some(path) = specifier.strip_prefix("file://") {
            self.resolve_path(Path::new(path), mode)
        } else if is_path_specifier(specifier) {
            self.resolve_path(&base_dir.join(specifier), mode)
        } else if specifier.starts_with('#') {
            self.resolve_package_imports(specifier, &base_dir, mode)
        } else {
            self.resolve_package_self(specifier, &base_dir, mode)
                .or_else(|| self.resolve_node_modules(specifier, &base_dir, mode))
        };

        let path = resolved.ok_or_else(|| {
            anyhow!(
                "Cannot resolve \"{}\" from {}",
                specifier,
                parent
                    .map(|parent| parent.display().to_string())
                    .unwrap_or_else(|| self.cwd.display().to_string())
            )
        })?;

        canonicalize(&path).map(Resolution::Module)
    }

    fn base_dir(&self, parent: Option<&Path>) -> PathBuf {
        match parent.and_then(Path::parent) {
            Some(dir) => dir.to_path_buf(),
            None => self.cwd.clone(),
        }
    }

    /// Resolve a file path, trying extensions and directory entry points
    fn resolve_path(&self, path: &Path, mode: &ResolutionMode) -> Option<PathBuf> {
        self.resolve_file(path, mode)
            .or_else(|| self.resolve_directory(path, mode))
    }

    fn resolve_file(&self, path: &Path, mode: &ResolutionMode) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let file_name = path.file_name()?.to_string_lossy().to_string();
        mode.extensions.iter().find_map(|ext| {
            let with_ext = path.with_file_name(format!("{}{}", file_name, ext));
            with_ext.is_file().then_some(with_ext)
        })
    }

    /// Resolve a directory (look for package.json main fields or index files)
    fn resolve_directory(&self, dir: &Path, mode: &ResolutionMode) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }

        if let Some(package) = PackageJson::read(&dir.join("package.json")) {
            for field in mode.main_fields {
                if let Some(main) = package.main_field(field) {
                    let main_path = dir.join(main);
                    if let Some(path) = self.resolve_file(&main_path, mode) {
                        return Some(path);
                    }
                    if let Some(path) = self.resolve_index(&main_path, mode) {
                        return Some(path);
                    }
                }
            }
        }

        self.resolve_index(dir, mode)
    }

    fn resolve_index(&self, dir: &Path, mode: &ResolutionMode) -> Option<PathBuf> {
        mode.extensions.iter().find_map(|ext| {
            let index = dir.join(format!("index{}", ext));
            index.is_file().then_some(index)
        })
    }

    /// Resolve `#name` through the `imports` map of the nearest package.json
    fn resolve_package_imports(
        &self,
        specifier: &str,
        base_dir: &Path,
        mode: &ResolutionMode,
    ) -> Option<PathBuf> {
        let (package_dir, package) = nearest_package(base_dir)?;
        let imports = package.imports.as_ref()?.as_object()?;
        let (target, pattern_match) = match_subpath(imports, specifier)?;

        self.resolve_target(&package_dir, target, pattern_match.as_deref(), mode, true)
    }

    /// Resolve a package importing itself by name
    fn resolve_package_self(
        &self,
        specifier: &str,
        base_dir: &Path,
        mode: &ResolutionMode,
    ) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);
        let (package_dir, package) = nearest_package(base_dir)?;
        if package.name.as_deref() != Some(package_name) {
            return None;
        }

        let exports = package.exports.as_ref()?;
        self.resolve_exports(&package_dir, exports, subpath, mode)
    }

    /// Resolve a module from node_modules
    fn resolve_node_modules(
        &self,
        specifier: &str,
        base_dir: &Path,
        mode: &ResolutionMode,
    ) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        // Walk up directory tree looking for node_modules
        let mut current = Some(base_dir);
        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(package_name);

            if package_dir.is_dir() {
                let package = PackageJson::read(&package_dir.join("package.json"));
                if let Some(exports) = package.as_ref().and_then(|p| p.exports.as_ref()) {
                    return self.resolve_exports(&package_dir, exports, subpath, mode);
                }

                let resolved = match subpath {
                    Some(sub) => self.resolve_path(&package_dir.join(sub), mode),
                    None => self.resolve_directory(&package_dir, mode),
                };
                if resolved.is_some() {
                    return resolved;
                }
            }

            current = dir.parent();
        }

        None
    }

    fn resolve_exports(
        &self,
        package_dir: &Path,
        exports: &Value,
        subpath: Option<&str>,
        mode: &ResolutionMode,
    ) -> Option<PathBuf> {
        let subpath = match subpath {
            Some(sub) => format!("./{}", sub),
            None => ".".to_string(),
        };

        let is_subpath_map = exports
            .as_object()
            .map(|map| map.keys().any(|key| key.starts_with('.')))
            .unwrap_or(false);

        if !is_subpath_map {
            return if subpath == "." {
                self.resolve_target(package_dir, exports, None, mode, false)
            } else {
                None
            };
        }

        let map = exports.as_object()?;
        let (target, pattern_match) = match_subpath(map, &subpath)?;
        self.resolve_target(package_dir, target, pattern_match.as_deref(), mode, false)
    }

    fn resolve_target(
        &self,
        package_dir: &Path,
        target: &Value,
        pattern_match: Option<&str>,
        mode: &ResolutionMode,
        allow_bare: bool,
    ) -> Option<PathBuf> {
        match target {
            Value::String(target) => {
                let target = match pattern_match {
                    Some(matched) => target.replace('*', matched),
                    None => target.clone(),
                };

                if let Some(relative) = target.strip_prefix("./") {
                    let path = package_dir.join(relative);
                    path.is_file().then_some(path)
                } else if allow_bare && !target.starts_with('/') && !target.starts_with("../") {
                    self.resolve_node_modules(&target, package_dir, mode)
                } else {
                    None
                }
            }
            Value::Array(targets) => targets.iter().find_map(|target| {
                self.resolve_target(package_dir, target, pattern_match, mode, allow_bare)
            }),
            // Keys are tried in the order the package lists them
            Value::Object(conditions) => conditions
                .iter()
                .filter(|(condition, _)| mode.conditions.contains(&condition.as_str()))
                .find_map(|(_, target)| {
                    self.resolve_target(package_dir, target, pattern_match, mode, allow_bare)
                }),
            _ => None,
        }
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || (cfg!(windows) && specifier.chars().nth(1) == Some(':'))
}

fn canonicalize(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Failed to canonicalize {}", path.display()))
}

/// Finds the nearest package.json at or above `dir`.
fn nearest_package(dir: &Path) -> Option<(PathBuf, PackageJson)> {
    let mut current = Some(dir);
    while let Some(dir) = current {
        let manifest = dir.join("package.json");
        if manifest.is_file() {
            return PackageJson::read(&manifest).map(|package| (dir.to_path_buf(), package));
        }
        current = dir.parent();
    }
    None
}

/// Looks `subpath` up in an `exports`/`imports` map, exact keys first, then
/// the `*` pattern with the longest prefix.
fn match_subpath<'a>(
    map: &'a serde_json::Map<String, Value>,
    subpath: &str,
) -> Option<(&'a Value, Option<String>)> {
    if let Some(target) = map.get(subpath) {
        if !subpath.contains('*') {
            return Some((target, None));
        }
    }

    map.iter()
        .filter_map(|(key, target)| {
            let (prefix, suffix) = key.split_once('*')?;
            let matched = subpath.strip_prefix(prefix)?.strip_suffix(suffix)?;
            Some((prefix.len(), target, matched.to_string()))
        })
        .max_by_key(|(prefix_len, _, _)| *prefix_len)
        .map(|(_, target, matched)| (target, Some(matched)))
}

/// Parse a package specifier into name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let name_end = if specifier.starts_with('@') {
        // Scoped package: @scope/name or @scope/name/subpath
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(index, _)| index)
    } else {
        specifier.find('/')
    };

    match name_end {
        Some(index) => (&specifier[..index], Some(&specifier[index + 1..])),
        None => (specifier, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn resolve(resolver: &Resolver, specifier: &str, parent: &Path, cjs: bool) -> PathBuf {
        match resolver.resolve_default(specifier, Some(parent), cjs).unwrap() {
            Resolution::Module(path) => path,
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    #[test]
    fn test_is_builtin() {
        assert!(Resolver::is_builtin("fs"));
        assert!(Resolver::is_builtin("fs/promises"));
        assert!(Resolver::is_builtin("node:anything"));
        assert!(!Resolver::is_builtin("lodash"));
    }

    #[test]
    fn test_builtins_are_normalized() {
        let resolver = Resolver::with_cwd(None, PathBuf::from("/"));
        assert_eq!(
            resolver.resolve_default("path", None, true).unwrap(),
            Resolution::Builtin("node:path".to_string())
        );
        assert_eq!(
            resolver.resolve_default("node:fs", None, false).unwrap(),
            Resolution::Builtin("node:fs".to_string())
        );
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash", None));
        assert_eq!(
            parse_package_specifier("lodash/get"),
            ("lodash", Some("get"))
        );
        assert_eq!(parse_package_specifier("@types/node"), ("@types/node", None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index"),
            ("@babel/core", Some("lib/index"))
        );
    }

    #[test]
    fn test_relative_with_extension_probing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root.join("main.js"), "");
        write(&root.join("util.mjs"), "");
        write(&root.join("data.json"), "{}");
        write(&root.join("lib/index.js"), "");

        let resolver = Resolver::with_cwd(None, root.clone());
        let parent = root.join("main.js");
        assert_eq!(resolve(&resolver, "./util", &parent, false), root.join("util.mjs"));
        assert_eq!(resolve(&resolver, "./data", &parent, true), root.join("data.json"));
        assert_eq!(resolve(&resolver, "./lib", &parent, true), root.join("lib/index.js"));
        assert!(resolver.resolve_default("./util", Some(&parent), true).is_err());
    }

    #[test]
    fn test_main_fields_differ_by_context() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root.join("main.js"), "");
        write(
            &root.join("node_modules/pkg/package.json"),
            r#"{"main": "./cjs.js", "module": "./esm.js"}"#,
        );
        write(&root.join("node_modules/pkg/cjs.js"), "");
        write(&root.join("node_modules/pkg/esm.js"), "");

        let resolver = Resolver::with_cwd(None, root.clone());
        let parent = root.join("main.js");
        assert_eq!(
            resolve(&resolver, "pkg", &parent, true),
            root.join("node_modules/pkg/cjs.js")
        );
        assert_eq!(
            resolve(&resolver, "pkg", &parent, false),
            root.join("node_modules/pkg/esm.js")
        );
    }

    #[test]
    fn test_exports_conditions_and_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root.join("src/main.js"), "");
        write(
            &root.join("node_modules/@scope/pkg/package.json"),
            r#"{
                "exports": {
                    ".": {"require": "./index.cjs", "import": "./index.mjs"},
                    "./features/*": "./dist/features/*.js"
                }
            }"#,
        );
        write(&root.join("node_modules/@scope/pkg/index.cjs"), "");
        write(&root.join("node_modules/@scope/pkg/index.mjs"), "");
        write(&root.join("node_modules/@scope/pkg/dist/features/a.js"), "");

        let resolver = Resolver::with_cwd(None, root.clone());
        let parent = root.join("src/main.js");
        let package = root.join("node_modules/@scope/pkg");
        assert_eq!(
            resolve(&resolver, "@scope/pkg", &parent, true),
            package.join("index.cjs")
        );
        assert_eq!(
            resolve(&resolver, "@scope/pkg", &parent, false),
            package.join("index.mjs")
        );
        assert_eq!(
            resolve(&resolver, "@scope/pkg/features/a", &parent, false),
            package.join("dist/features/a.js")
        );
        assert!(resolver
            .resolve_default("@scope/pkg/index.cjs", Some(&parent), true)
            .is_err());
    }

    #[test]
    fn test_exports_conditions_follow_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root.join("main.js"), "");
        write(
            &root.join("node_modules/pkg/package.json"),
            r#"{"exports": {"import": "./i.mjs", "node": "./n.cjs"}}"#,
        );
        write(
            &root.join("node_modules/late/package.json"),
            r#"{"exports": {"browser": "./b.js", "default": "./d.js", "node": "./n.js"}}"#,
        );
        for file in ["pkg/i.mjs", "pkg/n.cjs", "late/b.js", "late/d.js", "late/n.js"] {
            write(&root.join("node_modules").join(file), "");
        }

        let resolver = Resolver::with_cwd(None, root.clone());
        let parent = root.join("main.js");
        assert_eq!(
            resolve(&resolver, "pkg", &parent, false),
            root.join("node_modules/pkg/i.mjs")
        );
        assert_eq!(
            resolve(&resolver, "pkg", &parent, true),
            root.join("node_modules/pkg/n.cjs")
        );
        assert_eq!(
            resolve(&resolver, "late", &parent, true),
            root.join("node_modules/late/d.js")
        );
    }

    #[test]
    fn test_imports_and_self_reference() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(
            &root.join("package.json"),
            r##"{
                "name": "app",
                "exports": {"./tools": "./src/tools.js"},
                "imports": {"#internal/*": "./src/internal/*.js"}
            }"##,
        );
        write(&root.join("src/main.js"), "");
        write(&root.join("src/tools.js"), "");
        write(&root.join("src/internal/db.js"), "");

        let resolver = Resolver::with_cwd(None, root.clone());
        let parent = root.join("src/main.js");
        assert_eq!(
            resolve(&resolver, "#internal/db", &parent, false),
            root.join("src/internal/db.js")
        );
        assert_eq!(
            resolve(&resolver, "app/tools", &parent, true),
            root.join("src/tools.js")
        );
    }

    #[tokio::test]
    async fn test_override_is_consulted_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root.join("replacement.js"), "");

        let resolve_override = |specifier: String, _parent: Option<PathBuf>, _cjs: bool| async move {
            Ok::<_, anyhow::Error>(match specifier.as_str() {
                "virtual" => Some(OverrideResolution::Path(PathBuf::from("replacement.js"))),
                "external" => Some(OverrideResolution::Skip),
                _ => None,
            })
        };
        let resolver = Resolver::with_cwd(Some(Rc::new(resolve_override)), root.clone());

        assert_eq!(
            resolver.resolve("virtual", None, false).await.unwrap(),
            Resolution::Module(root.join("replacement.js"))
        );
        assert_eq!(
            resolver.resolve("external", None, false).await.unwrap(),
            Resolution::Skip
        );
        let err = resolver.resolve("missing", None, false).await.unwrap_err();
        assert!(err.to_string().contains("Cannot resolve \"missing\""));
    }
}

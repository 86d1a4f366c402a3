//! Records describing discovered modules.

use std::fmt;
use std::path::PathBuf;

use crate::text::js_string;

/// Module system a module is evaluated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Static `import`/`export` syntax with live bindings.
    Declarative,
    /// Synchronous `require()`/`module.exports`.
    Imperative,
}

impl Classification {
    pub fn is_commonjs(self) -> bool {
        self == Classification::Imperative
    }
}

/// What kind of file backs a module, orthogonal to its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Source,
    Stylesheet,
    Json,
}

/// What a call site forces onto the module it requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetHint {
    /// `require()` call.
    CommonJs,
    /// `with { type: "css" }`.
    Stylesheet,
    /// `with { type: "json" }`.
    Json,
}

impl AssetHint {
    /// Maps an import attribute `type` value onto a hint.
    pub fn from_import_type(import_type: &str) -> Option<Self> {
        match import_type {
            "css" => Some(AssetHint::Stylesheet),
            "json" => Some(AssetHint::Json),
            _ => None,
        }
    }
}

/// Identifier of a module inside its classification's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleId {
    /// Position in a dense table.
    Index(usize),
    /// Identity key in a keyed table.
    Key(String),
}

impl ModuleId {
    /// Renders the id as a JavaScript literal.
    pub fn to_js(&self) -> String {
        match self {
            ModuleId::Index(index) => index.to_string(),
            ModuleId::Key(key) => js_string(key),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js())
    }
}

/// What importers and the packager know about a bundled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub module_id: ModuleId,
    pub leading_directive: Option<String>,
    /// Export keys, in declaration order without duplicates. Empty while the
    /// module is still being transformed.
    pub exported_keys: Vec<String>,
    pub identity: PathBuf,
    pub is_commonjs: bool,
}

/// Result of resolving one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Module included in the bundle.
    Bundled(BundleDescriptor),
    /// Reference kept native: a `node:` builtin or a skipped specifier.
    Native(String),
}

/// A fully transformed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub module_id: ModuleId,
    pub identity: PathBuf,
    pub classification: Classification,
    pub asset_kind: AssetKind,
    pub exported_keys: Vec<String>,
    pub leading_directive: Option<String>,
    /// Transformed body, already wrapped in its factory template.
    pub factory: String,
}

impl ModuleRecord {
    pub fn descriptor(&self) -> BundleDescriptor {
        BundleDescriptor {
            module_id: self.module_id.clone(),
            leading_directive: self.leading_directive.clone(),
            exported_keys: self.exported_keys.clone(),
            identity: self.identity.clone(),
            is_commonjs: self.classification.is_commonjs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_literals() {
        assert_eq!(ModuleId::Index(3).to_js(), "3");
        assert_eq!(ModuleId::Key("/src/a.js".to_string()).to_js(), "\"/src/a.js\"");
    }

    #[test]
    fn test_import_type_hints() {
        assert_eq!(AssetHint::from_import_type("css"), Some(AssetHint::Stylesheet));
        assert_eq!(AssetHint::from_import_type("json"), Some(AssetHint::Json));
        assert_eq!(AssetHint::from_import_type("wasm"), None);
    }
}

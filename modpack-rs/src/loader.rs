//! Source loader for the graph builder.
//!
//! Reads every module file once, normalizes its text and keeps it cached by
//! canonical path for the rest of the invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;

use crate::text::{normalize_newlines, split_directive, strip_bom};

/// A module file as the transformer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub path: PathBuf,
    /// Leading `#!` line, kept out of the parsed text.
    pub directive: Option<String>,
    /// Text with the BOM removed and line endings normalized to `\n`.
    pub text: String,
}

impl LoadedSource {
    /// Lowercased file extension, empty when the path has none.
    pub fn extension(&self) -> String {
        extension_of(&self.path)
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Loader implementation for serving module sources during bundling.
#[derive(Default)]
pub struct SourceLoader {
    cache: HashMap<PathBuf, Rc<LoadedSource>>,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a module's source code, reading the file only on first use.
    pub async fn load(&mut self, path: &Path) -> anyhow::Result<Rc<LoadedSource>> {
        if let Some(source) = self.cache.get(path) {
            return Ok(source.clone());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (directive, text) = split_directive(&normalize_newlines(strip_bom(&content)));

        log::debug!("Loaded {}", path.display());
        let source = Rc::new(LoadedSource {
            path: path.to_path_buf(),
            directive,
            text,
        });
        self.cache.insert(path.to_path_buf(), source.clone());

        Ok(source)
    }

    /// Reads a binary asset. Assets are inlined once per reference, so they
    /// are not cached.
    pub async fn load_bytes(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

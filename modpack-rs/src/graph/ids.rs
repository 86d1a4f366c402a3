//! Module id assignment strategies.
//!
//! Packed bundles number modules densely and render their tables as arrays;
//! debug bundles key modules by their absolute path and render objects.

use std::path::Path;

use itertools::Itertools;

use super::record::ModuleId;
use crate::text::js_string;

/// Assigns ids within one classification's table and renders that table.
pub trait IdStrategy {
    /// Id of the module stored at `slot` (its position in discovery order).
    fn assign(&self, slot: usize, identity: &Path) -> ModuleId;

    /// Renders the table literal from `(id, factory)` pairs in slot order.
    fn render_table(&self, entries: &[(ModuleId, String)]) -> String;

    /// Literal used to seed the runtime's per-module state cache.
    fn empty_state(&self) -> &'static str;
}

/// Dense integer ids, array tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseIds;

impl IdStrategy for DenseIds {
    fn assign(&self, slot: usize, _identity: &Path) -> ModuleId {
        ModuleId::Index(slot)
    }

    fn render_table(&self, entries: &[(ModuleId, String)]) -> String {
        if entries.is_empty() {
            return "[]".to_string();
        }
        format!(
            "[\n{}\n]",
            entries
                .iter()
                .map(|(id, factory)| format!("// {}\n{}", id, factory))
                .join(",\n")
        )
    }

    fn empty_state(&self) -> &'static str {
        "[]"
    }
}

/// Absolute path ids, object tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeys;

impl IdStrategy for IdentityKeys {
    fn assign(&self, _slot: usize, identity: &Path) -> ModuleId {
        ModuleId::Key(identity.to_string_lossy().to_string())
    }

    fn render_table(&self, entries: &[(ModuleId, String)]) -> String {
        if entries.is_empty() {
            return "{}".to_string();
        }
        format!(
            "{{\n{}\n}}",
            entries
                .iter()
                .map(|(id, factory)| match id {
                    ModuleId::Key(key) => format!("{}: {}", js_string(key), factory),
                    ModuleId::Index(index) => format!("{}: {}", index, factory),
                })
                .join(",\n")
        )
    }

    fn empty_state(&self) -> &'static str {
        "{}"
    }
}

//! Slot arena holding the modules of one classification.
//!
//! A slot is reserved before the module's own imports are followed, which is
//! what lets cyclic imports terminate: re-entering a reserved slot returns
//! its descriptor instead of recursing again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, bail};

use super::ids::IdStrategy;
use super::record::{BundleDescriptor, Classification, ModuleId, ModuleRecord};

/// Status of the slot for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState<'a> {
    Unvisited,
    /// Discovered, transformation in progress.
    Reserved(&'a BundleDescriptor),
    Filled(&'a ModuleRecord),
}

#[derive(Debug)]
struct Slot {
    descriptor: BundleDescriptor,
    record: Option<ModuleRecord>,
}

pub struct ModuleTable {
    classification: Classification,
    strategy: Rc<dyn IdStrategy>,
    slots: Vec<Slot>,
    index: HashMap<PathBuf, usize>,
}

impl ModuleTable {
    pub fn new(classification: Classification, strategy: Rc<dyn IdStrategy>) -> Self {
        Self {
            classification,
            strategy,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, identity: &Path) -> SlotState<'_> {
        match self.index.get(identity).map(|slot| &self.slots[*slot]) {
            None => SlotState::Unvisited,
            Some(Slot {
                record: Some(record),
                ..
            }) => SlotState::Filled(record),
            Some(slot) => SlotState::Reserved(&slot.descriptor),
        }
    }

    /// Reserves the next slot for `identity` and assigns its id.
    pub fn reserve(
        &mut self,
        identity: &Path,
        leading_directive: Option<String>,
    ) -> anyhow::Result<BundleDescriptor> {
        if self.index.contains_key(identity) {
            bail!("Module {} was reserved twice", identity.display());
        }

        let slot = self.slots.len();
        let descriptor = BundleDescriptor {
            module_id: self.strategy.assign(slot, identity),
            leading_directive,
            exported_keys: Vec::new(),
            identity: identity.to_path_buf(),
            is_commonjs: self.classification.is_commonjs(),
        };

        self.slots.push(Slot {
            descriptor: descriptor.clone(),
            record: None,
        });
        self.index.insert(identity.to_path_buf(), slot);

        Ok(descriptor)
    }

    /// Stores the transformed module in its reserved slot.
    pub fn fill(&mut self, record: ModuleRecord) -> anyhow::Result<BundleDescriptor> {
        let slot = self
            .index
            .get(&record.identity)
            .and_then(|slot| self.slots.get_mut(*slot))
            .ok_or_else(|| anyhow!("Module {} was never reserved", record.identity.display()))?;

        if slot.record.is_some() {
            bail!("Module {} was filled twice", record.identity.display());
        }

        slot.descriptor = record.descriptor();
        slot.record = Some(record);

        Ok(slot.descriptor.clone())
    }

    /// Filled records in slot order.
    pub fn records(&self) -> anyhow::Result<Vec<&ModuleRecord>> {
        self.slots
            .iter()
            .map(|slot| {
                slot.record.as_ref().ok_or_else(|| {
                    anyhow!(
                        "Module {} was never transformed",
                        slot.descriptor.identity.display()
                    )
                })
            })
            .collect()
    }

    /// Renders the table literal embedded in the artifact.
    pub fn render(&self) -> anyhow::Result<String> {
        let entries: Vec<(ModuleId, String)> = self
            .records()?
            .into_iter()
            .map(|record| (record.module_id.clone(), record.factory.clone()))
            .collect();

        Ok(self.strategy.render_table(&entries))
    }

    pub fn empty_state(&self) -> &'static str {
        self.strategy.empty_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ids::{DenseIds, IdentityKeys};
    use crate::graph::record::AssetKind;

    fn record(descriptor: &BundleDescriptor, factory: &str) -> ModuleRecord {
        ModuleRecord {
            module_id: descriptor.module_id.clone(),
            identity: descriptor.identity.clone(),
            classification: Classification::Declarative,
            asset_kind: AssetKind::Source,
            exported_keys: vec!["default".to_string()],
            leading_directive: None,
            factory: factory.to_string(),
        }
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut table = ModuleTable::new(Classification::Declarative, Rc::new(DenseIds));
        let identity = Path::new("/src/a.js");
        assert_eq!(table.state(identity), SlotState::Unvisited);

        let descriptor = table.reserve(identity, None).unwrap();
        assert_eq!(descriptor.module_id, ModuleId::Index(0));
        assert!(descriptor.exported_keys.is_empty());
        assert!(matches!(table.state(identity), SlotState::Reserved(_)));
        assert!(table.records().is_err());

        let filled = table.fill(record(&descriptor, "f")).unwrap();
        assert_eq!(filled.exported_keys, vec!["default".to_string()]);
        assert!(matches!(table.state(identity), SlotState::Filled(_)));
        assert!(table.fill(record(&descriptor, "f")).is_err());
        assert_eq!(table.render().unwrap(), "[\n// 0\nf\n]");
    }

    #[test]
    fn test_ids_follow_discovery_order() {
        let mut table = ModuleTable::new(Classification::Imperative, Rc::new(DenseIds));
        let a = table.reserve(Path::new("/a.js"), None).unwrap();
        let b = table.reserve(Path::new("/b.js"), None).unwrap();
        assert_eq!(a.module_id, ModuleId::Index(0));
        assert_eq!(b.module_id, ModuleId::Index(1));
        assert!(b.is_commonjs);
        assert!(table
            .reserve(Path::new("/a.js"), None)
            .is_err());
    }

    #[test]
    fn test_keyed_table() {
        let mut table = ModuleTable::new(Classification::Declarative, Rc::new(IdentityKeys));
        let descriptor = table
            .reserve(Path::new("/src/a.js"), None)
            .unwrap();
        table.fill(record(&descriptor, "f")).unwrap();
        assert_eq!(table.empty_state(), "{}");
        assert_eq!(table.render().unwrap(), "{\n\"/src/a.js\": f\n}");
    }
}

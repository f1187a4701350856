//! Write-once registry of named reusable feature subdiagrams.
//!
//! Registration fails on duplicate names; lookup is pure and clones the
//! registered tree so callers can stamp it into larger models.

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::fm::feature::Feature;

static GLOBAL_REGISTRY: Lazy<SubdiagramRegistry> = Lazy::new(SubdiagramRegistry::new);

#[derive(Default)]
pub struct SubdiagramRegistry {
    entries: DashMap<String, Feature>,
}

impl SubdiagramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SubdiagramRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register a reusable subdiagram. Write-once per name: a second
    /// registration under the same name is rejected.
    pub fn register(&self, name: impl Into<String>, diagram: Feature) -> Result<(), String> {
        let name = name.into();
        // DashMap entry gives atomic check-and-insert.
        match self.entries.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(format!("subdiagram '{}' is already registered", name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(diagram);
                Ok(())
            }
        }
    }

    /// Clone out a registered subdiagram.
    pub fn instantiate(&self, name: &str) -> Option<Feature> {
        self.entries.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::feature::FeatureModel;

    #[test]
    fn test_write_once() {
        let registry = SubdiagramRegistry::new();
        let diagram = Feature::xor("storage").child("mem").child("disk");
        assert!(registry.register("storage", diagram.clone()).is_ok());
        assert!(registry.register("storage", diagram).is_err());
    }

    #[test]
    fn test_instantiate_into_model() {
        let registry = SubdiagramRegistry::new();
        registry
            .register("storage", Feature::xor("storage").child("mem").child("disk"))
            .unwrap();
        let sub = registry.instantiate("storage").unwrap();
        let model = FeatureModel::check(Feature::and("Root").child(sub));
        assert!(model.errors().is_empty());
        assert_eq!(model.lookup().len(), 4);
    }
}

use std::collections::{BTreeMap, BTreeSet};

use crate::config::FleetConfig;
use crate::error::{HeimdallError, Result};

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// One independently deployed tenant/region of the routing platform.
#[derive(Debug, Clone)]
pub struct Instance {
    name: String,
    pub excluded: bool,
    pub first_deploy: bool,
    pub data_file: String,
    pub source_dir: String,
}

impl Instance {
    /// The name is fixed at registration; everything else is mutable state.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// InstanceRegistry
// ---------------------------------------------------------------------------

/// In-memory set of registered instances, unique by name, iterated in name
/// order so runs process the fleet deterministically.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<String, Instance>,
}

impl InstanceRegistry {
    pub fn from_config(config: &FleetConfig) -> Self {
        let mut registry = Self::default();
        for (name, entry) in &config.instances {
            let instance = Instance {
                name: name.clone(),
                excluded: config.excluded_instances.contains(name),
                first_deploy: entry.first_deploy,
                data_file: config.data_file(name),
                source_dir: config.source_dir(name),
            };
            // config.instances is a map, so names are already unique
            let _ = registry.register(instance);
        }
        registry
    }

    pub fn register(&mut self, instance: Instance) -> Result<()> {
        if self.instances.contains_key(instance.name()) {
            return Err(HeimdallError::InstanceExists(instance.name().to_string()));
        }
        self.instances.insert(instance.name().to_string(), instance);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Instance> {
        self.instances
            .get(name)
            .ok_or_else(|| HeimdallError::InstanceNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ExclusionSet
// ---------------------------------------------------------------------------

/// Instances skipped for binarization in the current run.
///
/// A fresh set is built per run and written during preflight only; workers
/// read it without locking during the parallel phase.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.as_str())
    }
}

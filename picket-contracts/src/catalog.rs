use std::collections::BTreeMap;

use picket_model::PluginDescriptor;

use crate::plugin::PluginExecution;

/// Describes an installable plugin and builds fresh instances of it.
#[derive(Clone)]
pub struct PluginFactory {
    pub descriptor: PluginDescriptor,
    build: fn() -> PluginExecution,
}

impl PluginFactory {
    pub fn new(
        name: &str,
        version: &str,
        class: &str,
        build: fn() -> PluginExecution,
    ) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: name.to_string(),
                version: version.to_string(),
                class: class.to_string(),
            },
            build,
        }
    }

    pub fn instantiate(&self) -> PluginExecution {
        (self.build)()
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Named set of plugins available to a Plugin Service and its runners.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; a later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, factory: PluginFactory) -> &mut Self {
        self.factories
            .insert(factory.descriptor.name.clone(), factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.get(name).map(|factory| &factory.descriptor)
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.factories
            .values()
            .map(|factory| factory.descriptor.clone())
            .collect()
    }

    pub fn instantiate(&self, name: &str) -> Option<PluginExecution> {
        self.get(name).map(PluginFactory::instantiate)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

use crate::ConfigurationError;

use std::collections::BTreeMap;

/// A table of named factories, filled at startup.
///
/// Environments, robots and evaluation functions are
/// selected by name from configuration files.
///
/// # Examples
/// ```
/// use oxievo::simulation::PluginRegistry;
///
/// let mut registry: PluginRegistry<fn(u32) -> u32> = PluginRegistry::new();
/// registry.register("double", |x| x * 2).unwrap();
///
/// assert_eq!(registry.get("double").unwrap()(21), 42);
/// assert!(registry.get("triple").is_err());
/// ```
#[derive(Clone, Debug)]
pub struct PluginRegistry<F> {
    factories: BTreeMap<String, F>,
}

impl<F> Default for PluginRegistry<F> {
    fn default() -> Self {
        PluginRegistry {
            factories: BTreeMap::new(),
        }
    }
}

impl<F> PluginRegistry<F> {
    pub fn new() -> PluginRegistry<F> {
        PluginRegistry::default()
    }

    /// Registers `factory` under `name`. Names are unique.
    pub fn register<S: Into<String>>(&mut self, name: S, factory: F) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(ConfigurationError::DuplicatePlugin(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Returns the factory registered under `name`.
    pub fn get(&self, name: &str) -> Result<&F, ConfigurationError> {
        self.factories
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownPlugin(name.to_string()))
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

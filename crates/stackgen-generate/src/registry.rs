//! App-type registry
//!
//! Maps a configuration section key (`apps`, `functions`, `compose`) to the
//! constructor of the [`AppGenerator`] that handles it. The loader is given
//! [`Registry::discriminants`] so unknown sections fail at load time; the
//! driver resolves each app's generator from the same table.

use std::collections::BTreeMap;

use stackgen_config::model::{APPS_SECTION, COMPOSE_SECTION, FUNCTIONS_SECTION};

use crate::apps::{ComposeApp, ContainerApp, FunctionApp};
use crate::error::GenerateError;
use crate::generator::AppGenerator;
use crate::Result;

/// Constructor of an app generator
pub type AppGeneratorFactory = fn() -> Box<dyn AppGenerator>;

/// Discriminant to app generator table
pub struct Registry {
    entries: Vec<(String, AppGeneratorFactory)>,
    index: BTreeMap<String, usize>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Registry with the built-in app types
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, AppGeneratorFactory); 3] = [
            (APPS_SECTION, || Box::new(ContainerApp)),
            (FUNCTIONS_SECTION, || Box::new(FunctionApp)),
            (COMPOSE_SECTION, || Box::new(ComposeApp)),
        ];
        for (discriminant, factory) in builtins {
            registry.insert(discriminant, factory);
        }
        registry
    }

    /// Add an app type.
    ///
    /// Registering a discriminant twice is an error.
    pub fn register(&mut self, discriminant: &str, factory: AppGeneratorFactory) -> Result<()> {
        if self.index.contains_key(discriminant) {
            return Err(GenerateError::DuplicateAppType {
                discriminant: discriminant.to_string(),
            });
        }
        self.insert(discriminant, factory);
        Ok(())
    }

    fn insert(&mut self, discriminant: &str, factory: AppGeneratorFactory) {
        self.index
            .insert(discriminant.to_string(), self.entries.len());
        self.entries.push((discriminant.to_string(), factory));
    }

    /// Generator for a discriminant
    pub fn resolve(&self, discriminant: &str) -> Result<Box<dyn AppGenerator>> {
        self.index
            .get(discriminant)
            .map(|&i| (self.entries[i].1)())
            .ok_or_else(|| GenerateError::UnknownAppType {
                discriminant: discriminant.to_string(),
            })
    }

    /// Registered discriminants, in registration order
    pub fn discriminants(&self) -> Vec<&str> {
        self.entries.iter().map(|(d, _)| d.as_str()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

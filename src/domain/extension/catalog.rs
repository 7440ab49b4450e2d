//! Factories turning `[[extensions.units]]` entries into extension units

use super::unit::ExtensionUnit;
use crate::config::UnitConfig;
use crate::domain::shared::{DomainError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds one kind of unit from its configuration
pub type UnitFactory =
    Box<dyn Fn(&UnitConfig) -> anyhow::Result<Arc<dyn ExtensionUnit>> + Send + Sync>;

/// Unit kinds known to this process
#[derive(Default)]
pub struct UnitCatalog {
    factories: HashMap<String, UnitFactory>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&UnitConfig) -> anyhow::Result<Arc<dyn ExtensionUnit>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(&self, config: &UnitConfig) -> Result<Arc<dyn ExtensionUnit>> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| DomainError::UnknownUnitKind(config.kind.clone()))?;
        factory(config).map_err(|err| {
            DomainError::Validation(format!("unit {} ({}): {:#}", config.name, config.kind, err))
        })
    }
}

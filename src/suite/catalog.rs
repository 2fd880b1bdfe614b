//! Suite configurations, the static catalog and the suite registry

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::common::{Error, Result};

use super::interpolate::ParameterBag;

/// A resolved suite configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteConfiguration {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub suite_type: Option<String>,
    pub settings: Mapping,
}

impl SuiteConfiguration {
    pub fn new(name: impl Into<String>, suite_type: Option<String>, settings: Mapping) -> Self {
        Self {
            name: name.into(),
            suite_type,
            settings,
        }
    }

    /// Split a `default.suites.<name>` entry into type and settings
    ///
    /// A string `type` key becomes the suite type; every other key is a setting.
    pub fn from_entry(name: &str, entry: &Value) -> Result<Self> {
        let empty = Mapping::new();
        let entry = match entry {
            Value::Mapping(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(Error::Config(format!(
                    "suite '{}' must be a mapping of settings",
                    name
                )))
            }
        };
        // Preserves setting order
        let settings: Mapping = entry
            .iter()
            .filter(|(key, _)| key.as_str() != Some("type"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let suite_type = match entry.get("type").cloned() {
            Some(Value::String(t)) => Some(t),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::Config(format!(
                    "suite '{}' has a non-string type: {:?}",
                    name, other
                )))
            }
        };
        Ok(Self::new(name, suite_type, settings))
    }
}

/// Suite configurations known at process start
#[derive(Debug, Clone, Default)]
pub struct SuiteCatalog {
    suites: BTreeMap<String, SuiteConfiguration>,
}

impl SuiteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from a root `default.suites` mapping
    ///
    /// Settings are interpolated here, so catalog entries are final.
    pub fn from_suites(suites: &Mapping, params: &ParameterBag) -> Result<Self> {
        let mut catalog = Self::new();
        for (key, entry) in suites {
            let name = key.as_str().ok_or_else(|| {
                Error::Config(format!("suite names must be strings, found {:?}", key))
            })?;
            let mut config = SuiteConfiguration::from_entry(name, entry)?;
            config.settings = match params.resolve_value(&Value::Mapping(config.settings))? {
                Value::Mapping(settings) => settings,
                _ => Mapping::new(),
            };
            catalog.insert(config)?;
        }
        Ok(catalog)
    }

    /// Add a configuration; names are unique
    pub fn insert(&mut self, config: SuiteConfiguration) -> Result<()> {
        if self.suites.contains_key(&config.name) {
            return Err(Error::SuiteAlreadyRegistered(config.name));
        }
        self.suites.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SuiteConfiguration> {
        self.suites.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.suites.contains_key(name)
    }

    /// Configurations in name order
    pub fn iter(&self) -> impl Iterator<Item = &SuiteConfiguration> {
        self.suites.values()
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

/// Suites registered for this run
///
/// Registration is append-only. Registering an identical configuration
/// again is a no-op; a different configuration under a taken name fails.
#[derive(Debug, Default)]
pub struct SuiteRegistry {
    suites: Vec<SuiteConfiguration>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite, returning whether it was newly added
    pub fn register(&mut self, config: SuiteConfiguration) -> Result<bool> {
        if let Some(existing) = self.get(&config.name) {
            if *existing == config {
                tracing::debug!(suite = %config.name, "Suite already registered");
                return Ok(false);
            }
            return Err(Error::SuiteAlreadyRegistered(config.name));
        }
        tracing::debug!(suite = %config.name, "Registered suite");
        self.suites.push(config);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&SuiteConfiguration> {
        self.suites.iter().find(|s| s.name == name)
    }

    /// Registered suites in registration order
    pub fn suites(&self) -> &[SuiteConfiguration] {
        &self.suites
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

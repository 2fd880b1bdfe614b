//! Suite configuration resolution
//!
//! Maps a module reference or suite name to a concrete, interpolated suite
//! configuration, falling back from the static catalog to per-module
//! behat.yml files.

pub mod catalog;
pub mod interpolate;
pub mod locator;
pub mod module;

pub use catalog::{SuiteCatalog, SuiteConfiguration, SuiteRegistry};
pub use interpolate::ParameterBag;
pub use locator::{candidate_config_paths, find_module_config, SuiteLocator, SuiteRequest};
pub use module::{
    resolve_module, DirectoryManifest, Module, ModuleManifest, ModuleReference, StaticManifest,
};

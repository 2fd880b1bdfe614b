//! Suite configuration resolution
//!
//! Decides which suites get registered for a run. Precedence:
//! 1. no module and no suite: every static catalog entry
//! 2. `--init`: nothing
//! 3. `@module`: the suite named after the module's short name
//! 4. `--suite name`: that suite, with the module looked up for its path only
//!
//! A suite in the static catalog always wins; otherwise it is loaded from
//! the module's own behat.yml.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::common::config::EXTENSION_ID;
use crate::common::{Error, Result};

use super::catalog::{SuiteCatalog, SuiteConfiguration, SuiteRegistry};
use super::interpolate::ParameterBag;
use super::module::{resolve_module, Module, ModuleManifest};

/// Config file names tried in a module, in order
const CONFIG_FILE_NAMES: [&str; 2] = ["behat.yml", ".behat.yml"];

/// What the command line asked for
#[derive(Debug, Clone, Default)]
pub struct SuiteRequest {
    /// `@name` or `@vendor/name`
    pub module: Option<String>,
    /// `--suite` value
    pub suite: Option<String>,
    /// `--init` mode
    pub init: bool,
}

impl SuiteRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn module(token: impl Into<String>) -> Self {
        Self {
            module: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn suite(name: impl Into<String>) -> Self {
        Self {
            suite: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Resolves suite requests against the static catalog and module files
pub struct SuiteLocator<'a> {
    catalog: &'a SuiteCatalog,
    manifest: &'a dyn ModuleManifest,
    params: &'a ParameterBag,
    exists: Box<dyn Fn(&Path) -> bool + 'a>,
}

impl<'a> SuiteLocator<'a> {
    pub fn new(
        catalog: &'a SuiteCatalog,
        manifest: &'a dyn ModuleManifest,
        params: &'a ParameterBag,
    ) -> Self {
        Self {
            catalog,
            manifest,
            params,
            exists: Box::new(|path: &Path| path.is_file()),
        }
    }

    /// Replace the file existence check used for config discovery
    pub fn with_exists(mut self, exists: impl Fn(&Path) -> bool + 'a) -> Self {
        self.exists = Box::new(exists);
        self
    }

    /// Resolve a request into the configurations to register
    pub fn locate(&self, request: &SuiteRequest) -> Result<Vec<SuiteConfiguration>> {
        let module_arg = request.module.as_deref().filter(|m| !m.is_empty());
        let suite_arg = request.suite.as_deref().filter(|s| !s.is_empty());

        let (suite_name, module) = match (module_arg, suite_arg) {
            (None, None) => {
                tracing::debug!(count = self.catalog.len(), "Registering all catalog suites");
                return Ok(self.catalog.iter().cloned().collect());
            }
            _ if request.init => {
                tracing::debug!("Init mode, no suites registered");
                return Ok(Vec::new());
            }
            (Some(token), _) => {
                let module = resolve_module(self.manifest, token, true)?;
                (module.short_name.clone(), Ok(module))
            }
            (None, Some(suite)) => (suite.to_string(), resolve_module(self.manifest, suite, false)),
        };

        if let Some(config) = self.catalog.get(&suite_name) {
            tracing::info!(suite = %suite_name, "Using suite from static catalog");
            return Ok(vec![config.clone()]);
        }

        let module = match module {
            Ok(module) => module,
            Err(Error::AmbiguousModuleReference { name, candidates }) => {
                return Err(Error::AmbiguousModuleReference { name, candidates })
            }
            Err(e) => {
                tracing::debug!(suite = %suite_name, error = %e, "No module for suite");
                return Err(Error::SuiteNotFound(suite_name));
            }
        };

        let config = self.load_suite_configuration(&suite_name, &module)?;
        Ok(vec![config])
    }

    /// Resolve a request and register the result, returning how many suites were added
    pub fn execute(&self, request: &SuiteRequest, registry: &mut SuiteRegistry) -> Result<usize> {
        let mut added = 0;
        for config in self.locate(request)? {
            if registry.register(config)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Module-relative directory that may hold a nested config
    fn features_path(&self) -> Result<String> {
        let name = format!("{}.context.features_path", EXTENSION_ID);
        match self.params.get(&name) {
            Some(value) => match self.params.resolve_value(value)? {
                Value::String(path) => Ok(path),
                other => Err(Error::Config(format!(
                    "parameter {} must be a string, found {:?}",
                    name, other
                ))),
            },
            None => Err(Error::Interpolation(format!(
                "You have requested a non-existent parameter \"{}\"",
                name
            ))),
        }
    }

    /// Locate the behat.yml for a module
    pub fn find_module_config(&self, module: &Module) -> Result<PathBuf> {
        let features_path = self.features_path()?;
        find_module_config(module, &features_path, &*self.exists)
    }

    /// Load `default.suites.<suite>` from a module's behat.yml
    pub fn load_suite_configuration(
        &self,
        suite: &str,
        module: &Module,
    ) -> Result<SuiteConfiguration> {
        let path = self.find_module_config(module)?;
        tracing::info!(suite, module = %module.name(), path = %path.display(), "Loading suite from module config");

        let content = std::fs::read_to_string(&path).map_err(|e| Error::file_read(&path, e))?;
        let root: Value = serde_yaml::from_str(&content)
            .map_err(|e| Error::ConfigParse(format!("{}: {}", path.display(), e)))?;

        let entry = root
            .get("default")
            .and_then(|profile| profile.get("suites"))
            .and_then(|suites| suites.get(suite))
            .filter(|entry| !is_empty_value(entry))
            .ok_or_else(|| Error::suite_config_missing(&path, suite))?;

        let settings = match self.params.resolve_value(entry)? {
            Value::Mapping(settings) => settings,
            _ => {
                return Err(Error::Config(format!(
                    "{}: default.suites.{} must be a mapping of settings",
                    path.display(),
                    suite
                )))
            }
        };

        Ok(SuiteConfiguration::new(suite, None, settings))
    }
}

/// The four places a module's config may live, in lookup order
pub fn candidate_config_paths(module_path: &Path, features_path: &str) -> [PathBuf; 4] {
    let nested = module_path.join(features_path);
    let [plain, hidden] = CONFIG_FILE_NAMES;
    [
        module_path.join(plain),
        nested.join(plain),
        module_path.join(hidden),
        nested.join(hidden),
    ]
}

/// First existing candidate config for a module
pub fn find_module_config(
    module: &Module,
    features_path: &str,
    exists: &dyn Fn(&Path) -> bool,
) -> Result<PathBuf> {
    let candidates = candidate_config_paths(&module.path, features_path);
    candidates
        .iter()
        .find(|candidate| exists(candidate))
        .cloned()
        .ok_or_else(|| Error::config_file_not_found(&module.name(), &candidates))
}

/// Values that count as "no configuration"
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Sequence(items) => items.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        Value::Tagged(tagged) => is_empty_value(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::ExtensionSettings;
    use crate::suite::module::StaticManifest;
    use serde_yaml::Mapping;
    use std::cell::RefCell;
    use tempfile::{tempdir, TempDir};

    fn yaml(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    struct Fixture {
        dir: TempDir,
        catalog: SuiteCatalog,
        manifest: StaticManifest,
        params: ParameterBag,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let root = dir.path().to_path_buf();
            let params = ParameterBag::from_settings(&ExtensionSettings::default(), &root);

            let mut catalog = SuiteCatalog::new();
            catalog
                .insert(SuiteConfiguration::new(
                    "cms",
                    None,
                    yaml("paths: [static/cms]\n"),
                ))
                .unwrap();
            catalog
                .insert(SuiteConfiguration::new(
                    "app",
                    Some("custom".to_string()),
                    yaml("paths: [static/app]\n"),
                ))
                .unwrap();

            let mut manifest = StaticManifest::default();
            for (vendor, name) in [
                (Some("silverstripe"), "cms"),
                (Some("silverstripe"), "admin"),
                (Some("acme"), "blog"),
                (Some("other"), "blog"),
            ] {
                let path = match vendor {
                    Some(v) => root.join("vendor").join(v).join(name),
                    None => root.join(name),
                };
                std::fs::create_dir_all(&path).unwrap();
                manifest.push(Module::new(vendor, name, path));
            }

            Self {
                dir,
                catalog,
                manifest,
                params,
            }
        }

        fn locator(&self) -> SuiteLocator<'_> {
            SuiteLocator::new(&self.catalog, &self.manifest, &self.params)
        }

        fn module_dir(&self, vendor: &str, name: &str) -> PathBuf {
            self.dir.path().join("vendor").join(vendor).join(name)
        }

        fn write(&self, path: PathBuf, content: &str) {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_no_args_registers_whole_catalog() {
        let fx = Fixture::new();
        let suites = fx.locator().locate(&SuiteRequest::all()).unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["app", "cms"]);
        assert_eq!(suites[0].suite_type.as_deref(), Some("custom"));
    }

    #[test]
    fn test_no_args_ignores_init() {
        let fx = Fixture::new();
        let request = SuiteRequest {
            init: true,
            ..SuiteRequest::all()
        };
        assert_eq!(fx.locator().locate(&request).unwrap().len(), 2);
    }

    #[test]
    fn test_registering_catalog_twice_is_idempotent() {
        let fx = Fixture::new();
        let locator = fx.locator();
        let mut registry = SuiteRegistry::new();
        assert_eq!(locator.execute(&SuiteRequest::all(), &mut registry).unwrap(), 2);
        assert_eq!(locator.execute(&SuiteRequest::all(), &mut registry).unwrap(), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("cms"), fx.catalog.get("cms"));
    }

    #[test]
    fn test_init_mode_registers_nothing() {
        let fx = Fixture::new();
        let request = SuiteRequest {
            init: true,
            ..SuiteRequest::module("@silverstripe/admin")
        };
        assert!(fx.locator().locate(&request).unwrap().is_empty());
    }

    #[test]
    fn test_module_argument_requires_prefix() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.locator().locate(&SuiteRequest::module("admin")),
            Err(Error::InvalidModuleReference(_))
        ));
    }

    #[test]
    fn test_static_catalog_takes_precedence() {
        let fx = Fixture::new();
        fx.write(
            fx.module_dir("silverstripe", "cms").join("behat.yml"),
            "default:\n  suites:\n    cms:\n      paths: [dynamic]\n",
        );
        let suites = fx
            .locator()
            .locate(&SuiteRequest::module("@silverstripe/cms"))
            .unwrap();
        assert_eq!(suites, vec![fx.catalog.get("cms").unwrap().clone()]);
    }

    #[test]
    fn test_dynamic_load_uses_short_name_and_interpolates() {
        let fx = Fixture::new();
        fx.write(
            fx.module_dir("silverstripe", "admin").join("behat.yml"),
            "default:\n  suites:\n    admin:\n      paths: ['%paths.base%/vendor/silverstripe/admin/tests']\n      contexts: [AdminContext]\n",
        );
        let suites = fx
            .locator()
            .locate(&SuiteRequest::module("@silverstripe/admin"))
            .unwrap();
        assert_eq!(suites.len(), 1);
        let suite = &suites[0];
        assert_eq!(suite.name, "admin");
        assert!(suite.suite_type.is_none());
        let expected = format!(
            "paths: ['{}/vendor/silverstripe/admin/tests']\ncontexts: [AdminContext]\n",
            fx.dir.path().display()
        );
        assert_eq!(suite.settings, yaml(&expected));
    }

    #[test]
    fn test_dynamic_load_from_features_path() {
        let fx = Fixture::new();
        fx.write(
            fx.module_dir("silverstripe", "admin")
                .join("tests/behat/.behat.yml"),
            "default:\n  suites:\n    admin:\n      paths: [nested]\n",
        );
        let suites = fx.locator().locate(&SuiteRequest::suite("admin")).unwrap();
        assert_eq!(suites[0].settings, yaml("paths: [nested]\n"));
    }

    #[test]
    fn test_missing_suite_key_is_an_error() {
        let fx = Fixture::new();
        let path = fx.module_dir("silverstripe", "admin").join("behat.yml");
        fx.write(
            path.clone(),
            "default:\n  suites:\n    other:\n      paths: [x]\n",
        );
        let result = fx.locator().locate(&SuiteRequest::module("@admin"));
        match result {
            Err(Error::SuiteConfigMissing { path: p, suite }) => {
                assert_eq!(p, path.display().to_string());
                assert_eq!(suite, "admin");
            }
            other => panic!("Expected SuiteConfigMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_suite_entry_is_missing() {
        let fx = Fixture::new();
        fx.write(
            fx.module_dir("silverstripe", "admin").join("behat.yml"),
            "default:\n  suites:\n    admin: {}\n",
        );
        assert!(matches!(
            fx.locator().locate(&SuiteRequest::module("@admin")),
            Err(Error::SuiteConfigMissing { .. })
        ));
    }

    #[test]
    fn test_no_config_file() {
        let fx = Fixture::new();
        let result = fx.locator().locate(&SuiteRequest::module("@silverstripe/admin"));
        match result {
            Err(Error::ConfigFileNotFound { module, .. }) => {
                assert_eq!(module, "silverstripe/admin")
            }
            other => panic!("Expected ConfigFileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let fx = Fixture::new();
        fx.write(
            fx.module_dir("silverstripe", "admin").join("behat.yml"),
            "default:\n  suites:\n    admin:\n      paths: ['%nope%']\n",
        );
        assert!(matches!(
            fx.locator().locate(&SuiteRequest::module("@admin")),
            Err(Error::Interpolation(_))
        ));
    }

    #[test]
    fn test_suite_option_static_without_module() {
        let fx = Fixture::new();
        let suites = fx.locator().locate(&SuiteRequest::suite("app")).unwrap();
        assert_eq!(suites[0].name, "app");
    }

    #[test]
    fn test_suite_option_unknown() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.locator().locate(&SuiteRequest::suite("nothing")),
            Err(Error::SuiteNotFound(ref s)) if s == "nothing"
        ));
    }

    #[test]
    fn test_suite_option_ambiguous_module() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.locator().locate(&SuiteRequest::suite("blog")),
            Err(Error::AmbiguousModuleReference { .. })
        ));
    }

    #[test]
    fn test_candidate_order() {
        let paths = candidate_config_paths(Path::new("/m"), "tests/behat");
        assert_eq!(
            paths,
            [
                PathBuf::from("/m/behat.yml"),
                PathBuf::from("/m/tests/behat/behat.yml"),
                PathBuf::from("/m/.behat.yml"),
                PathBuf::from("/m/tests/behat/.behat.yml"),
            ]
        );
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let module = Module::new(None, "app", "/m");

        let only_third = |p: &Path| p == Path::new("/m/.behat.yml");
        assert_eq!(
            find_module_config(&module, "tests/behat", &only_third).unwrap(),
            PathBuf::from("/m/.behat.yml")
        );

        let first_and_third =
            |p: &Path| p == Path::new("/m/behat.yml") || p == Path::new("/m/.behat.yml");
        assert_eq!(
            find_module_config(&module, "tests/behat", &first_and_third).unwrap(),
            PathBuf::from("/m/behat.yml")
        );
    }

    #[test]
    fn test_injected_exists_is_consulted_lazily() {
        let fx = Fixture::new();
        let seen = RefCell::new(Vec::new());
        let locator = fx.locator().with_exists(|p: &Path| {
            seen.borrow_mut().push(p.to_path_buf());
            p.ends_with("tests/behat/behat.yml")
        });
        let module = Module::new(None, "app", "/m");
        let found = locator.find_module_config(&module).unwrap();
        assert_eq!(found, PathBuf::from("/m/tests/behat/behat.yml"));
        assert_eq!(seen.borrow().len(), 2);
    }
}

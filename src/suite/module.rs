//! Module references and module discovery
//!
//! A module is referenced on the command line as `@name` or `@vendor/name`.
//! The short name (vendor stripped) is the canonical suite name.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Marker that prefixes explicit module references
pub const MODULE_PREFIX: char = '@';

/// Files or directories that mark a root-level directory as a module
const MODULE_MARKERS: [&str; 3] = ["_config.php", "_config", "composer.json"];

/// An installed module
#[derive(Debug, Clone, Eq)]
pub struct Module {
    pub vendor_name: Option<String>,
    pub short_name: String,
    pub path: PathBuf,
}

impl Module {
    pub fn new(vendor_name: Option<&str>, short_name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            vendor_name: vendor_name.map(str::to_string),
            short_name: short_name.to_string(),
            path: path.into(),
        }
    }

    /// Full name: `vendor/name`, or the short name for root modules
    pub fn name(&self) -> String {
        match &self.vendor_name {
            Some(vendor) => format!("{}/{}", vendor, self.short_name),
            None => self.short_name.clone(),
        }
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.short_name == other.short_name && self.path == other.path
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.path.display())
    }
}

/// A parsed `[@][vendor/]name` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub vendor: Option<String>,
    pub name: String,
}

impl ModuleReference {
    /// Parse a module token
    ///
    /// With `require_prefix` the token must start with `@`; without it a
    /// leading `@` is still accepted and stripped.
    pub fn parse(token: &str, require_prefix: bool) -> Result<Self> {
        let body = match token.strip_prefix(MODULE_PREFIX) {
            Some(body) => body,
            None if require_prefix => {
                return Err(Error::InvalidModuleReference(token.to_string()))
            }
            None => token,
        };

        let (vendor, name) = match body.split_once('/') {
            Some((vendor, name)) => (Some(vendor), name),
            None => (None, body),
        };

        if !is_plain_segment(name) || vendor.is_some_and(|v| !is_plain_segment(v)) {
            return Err(Error::InvalidModuleReference(token.to_string()));
        }

        Ok(Self {
            vendor: vendor.map(str::to_string),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vendor {
            Some(vendor) => write!(f, "{}/{}", vendor, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Lookup of installed modules
pub trait ModuleManifest {
    /// All installed modules matching a short name, restricted to a vendor if given
    fn find(&self, vendor: Option<&str>, name: &str) -> Vec<Module>;
}

/// Resolve a module token against a manifest
pub fn resolve_module(
    manifest: &dyn ModuleManifest,
    token: &str,
    require_prefix: bool,
) -> Result<Module> {
    let reference = ModuleReference::parse(token, require_prefix)?;
    let mut matches = manifest.find(reference.vendor.as_deref(), &reference.name);

    match matches.len() {
        0 => Err(Error::ModuleNotFound(token.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let names: Vec<String> = matches.iter().map(Module::name).collect();
            Err(Error::ambiguous_module(&reference.name, &names))
        }
    }
}

/// In-memory manifest
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    modules: Vec<Module>,
}

impl StaticManifest {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    pub fn push(&mut self, module: Module) {
        self.modules.push(module);
    }
}

impl ModuleManifest for StaticManifest {
    fn find(&self, vendor: Option<&str>, name: &str) -> Vec<Module> {
        self.modules
            .iter()
            .filter(|m| m.short_name == name)
            .filter(|m| vendor.is_none() || m.vendor_name.as_deref() == vendor)
            .cloned()
            .collect()
    }
}

/// Manifest backed by a project directory layout
///
/// Root modules are `<root>/<name>` directories carrying a module marker;
/// vendor modules are `<root>/<vendor_dir>/<vendor>/<name>`.
#[derive(Debug, Clone)]
pub struct DirectoryManifest {
    root: PathBuf,
    vendor_dir: PathBuf,
}

impl DirectoryManifest {
    pub fn new(root: impl Into<PathBuf>, vendor_dir: &str) -> Self {
        let root = root.into();
        let vendor_dir = root.join(vendor_dir);
        Self { root, vendor_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn root_module(&self, name: &str) -> Option<Module> {
        let path = self.root.join(name);
        if path == self.vendor_dir || !is_module_dir(&path) {
            return None;
        }
        Some(Module::new(None, name, canonical(path)))
    }

    fn vendor_module(&self, vendor: &str, name: &str) -> Option<Module> {
        let path = self.vendor_dir.join(vendor).join(name);
        path.is_dir()
            .then(|| Module::new(Some(vendor), name, canonical(path)))
    }

    fn vendors(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.vendor_dir) else {
            return Vec::new();
        };
        let mut vendors: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        vendors.sort();
        vendors
    }
}

impl ModuleManifest for DirectoryManifest {
    fn find(&self, vendor: Option<&str>, name: &str) -> Vec<Module> {
        if !is_plain_segment(name) || vendor.is_some_and(|v| !is_plain_segment(v)) {
            return Vec::new();
        }
        if let Some(vendor) = vendor {
            return self.vendor_module(vendor, name).into_iter().collect();
        }

        let mut found: Vec<Module> = self.root_module(name).into_iter().collect();
        for vendor in self.vendors() {
            if let Some(module) = self.vendor_module(&vendor, name) {
                if !found.contains(&module) {
                    found.push(module);
                }
            }
        }
        found
    }
}

/// A single directory name: not empty, no separator, not `.` or `..`
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/') && segment != "." && segment != ".."
}

fn is_module_dir(path: &Path) -> bool {
    path.is_dir() && MODULE_MARKERS.iter().any(|marker| path.join(marker).exists())
}

fn canonical(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manifest() -> StaticManifest {
        StaticManifest::new(vec![
            Module::new(Some("silverstripe"), "admin", "/p/vendor/silverstripe/admin"),
            Module::new(Some("silverstripe"), "cms", "/p/vendor/silverstripe/cms"),
            Module::new(Some("acme"), "cms", "/p/vendor/acme/cms"),
            Module::new(None, "app", "/p/app"),
        ])
    }

    #[test]
    fn test_parse_vendor_reference() {
        let r = ModuleReference::parse("@silverstripe/admin", true).unwrap();
        assert_eq!(r.vendor.as_deref(), Some("silverstripe"));
        assert_eq!(r.name, "admin");
    }

    #[test]
    fn test_parse_requires_prefix() {
        assert!(matches!(
            ModuleReference::parse("admin", true),
            Err(Error::InvalidModuleReference(_))
        ));
        assert_eq!(ModuleReference::parse("admin", false).unwrap().name, "admin");
        assert_eq!(ModuleReference::parse("@admin", false).unwrap().name, "admin");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for token in ["@", "@/admin", "@vendor/", "@a/b/c", "@..", "@.", "@acme/..", "@../admin"] {
            assert!(
                matches!(
                    ModuleReference::parse(token, true),
                    Err(Error::InvalidModuleReference(_))
                ),
                "{token} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_vendor_module_drops_vendor_from_short_name() {
        let module = resolve_module(&manifest(), "@silverstripe/admin", true).unwrap();
        assert_eq!(module.short_name, "admin");
        assert_eq!(module.name(), "silverstripe/admin");
    }

    #[test]
    fn test_resolve_unqualified_unique() {
        let module = resolve_module(&manifest(), "@admin", true).unwrap();
        assert_eq!(module.vendor_name.as_deref(), Some("silverstripe"));
    }

    #[test]
    fn test_resolve_ambiguous() {
        let err = resolve_module(&manifest(), "@cms", true).unwrap_err();
        match err {
            Error::AmbiguousModuleReference { name, candidates } => {
                assert_eq!(name, "cms");
                assert!(candidates.contains("silverstripe/cms"));
                assert!(candidates.contains("acme/cms"));
            }
            other => panic!("Expected AmbiguousModuleReference, got {other:?}"),
        }
        assert!(resolve_module(&manifest(), "@acme/cms", true).is_ok());
    }

    #[test]
    fn test_resolve_not_found() {
        assert!(matches!(
            resolve_module(&manifest(), "@missing", true),
            Err(Error::ModuleNotFound(ref t)) if t == "@missing"
        ));
    }

    #[test]
    fn test_module_equality_ignores_vendor() {
        let a = Module::new(Some("x"), "cms", "/m/cms");
        let b = Module::new(None, "cms", "/m/cms");
        assert_eq!(a, b);
        assert_ne!(a, Module::new(Some("x"), "cms", "/other/cms"));
    }

    #[test]
    fn test_directory_manifest() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("app/_config")).unwrap();
        std::fs::create_dir_all(root.join("assets")).unwrap();
        std::fs::create_dir_all(root.join("vendor/silverstripe/admin")).unwrap();
        std::fs::create_dir_all(root.join("vendor/acme/admin")).unwrap();

        let manifest = DirectoryManifest::new(root, "vendor");
        assert_eq!(manifest.find(None, "app").len(), 1);
        assert!(manifest.find(None, "assets").is_empty());
        assert_eq!(manifest.find(None, "admin").len(), 2);

        let admin = manifest.find(Some("acme"), "admin");
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].name(), "acme/admin");
        assert!(admin[0].path.is_absolute());
    }

    #[test]
    fn test_directory_manifest_ignores_relative_segments() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(root.join("vendor/acme/admin")).unwrap();
        std::fs::write(root.join("composer.json"), "{}").unwrap();

        let manifest = DirectoryManifest::new(&root, "vendor");
        assert!(manifest.find(Some("acme"), "..").is_empty());
        assert!(manifest.find(None, "..").is_empty());
        assert!(manifest.find(None, ".").is_empty());
        assert!(matches!(
            resolve_module(&manifest, "@acme/..", true),
            Err(Error::InvalidModuleReference(_))
        ));
        assert!(matches!(
            resolve_module(&manifest, "@..", true),
            Err(Error::InvalidModuleReference(_))
        ));
    }
}

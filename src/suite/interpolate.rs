//! `%parameter%` interpolation for suite settings
//!
//! Settings loaded from a module's behat.yml may reference process parameters
//! such as `%paths.base%` or `%silverstripe_extension.context.features_path%`.
//! Resolution is a pure function of the settings tree and a [`ParameterBag`].

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Number, Value};

use crate::common::config::{ExtensionSettings, EXTENSION_ID};
use crate::common::{Error, Result};

/// Named process parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    params: BTreeMap<String, Value>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the parameters the extension exposes, plus `paths.base`
    pub fn from_settings(settings: &ExtensionSettings, base: &Path) -> Self {
        let mut bag = Self::new();
        let ns = |field: &str| format!("{}.{}", EXTENSION_ID, field);
        let opt = |value: &Option<String>| match value {
            Some(s) => Value::String(s.clone()),
            None => Value::Null,
        };

        bag.set(
            "paths.base",
            Value::String(base.to_string_lossy().into_owned()),
        );
        bag.set(ns("admin_url"), Value::String(settings.admin_url.clone()));
        bag.set(ns("login_url"), Value::String(settings.login_url.clone()));
        bag.set(ns("screenshot_path"), opt(&settings.screenshot_path));
        bag.set(
            ns("ajax_timeout"),
            Value::Number(Number::from(settings.ajax_timeout)),
        );
        bag.set(
            ns("ajax_steps"),
            Value::Sequence(
                settings
                    .ajax_steps
                    .iter()
                    .map(|s| Value::String(s.clone()))
                    .collect(),
            ),
        );
        bag.set(ns("region_map"), Value::Mapping(settings.region_map.clone()));
        bag.set(ns("bootstrap_file"), opt(&settings.bootstrap_file));
        bag.set(
            ns("error_reporting"),
            Value::Number(Number::from(settings.error_reporting)),
        );
        bag.set(
            ns("retry_seconds"),
            Value::Number(Number::from(settings.retry_seconds)),
        );
        bag.set(
            ns("context.features_path"),
            Value::String(settings.context.features_path.clone()),
        );
        bag
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Substitute every `%name%` placeholder in a settings tree
    ///
    /// A string that is exactly one placeholder takes the parameter's value
    /// with its type; placeholders inside longer strings must be strings or
    /// numbers and are replaced by their text. `%%` is a literal percent sign. Mapping keys are
    /// resolved as well as values.
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        self.resolve_inner(value, &mut Vec::new())
    }

    fn resolve_inner(&self, value: &Value, stack: &mut Vec<String>) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, stack),
            Value::Sequence(items) => items
                .iter()
                .map(|item| self.resolve_inner(item, stack))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(
                        self.resolve_inner(key, stack)?,
                        self.resolve_inner(item, stack)?,
                    );
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Tagged(tagged) => {
                let mut tagged = tagged.as_ref().clone();
                tagged.value = self.resolve_inner(&tagged.value, stack)?;
                Ok(Value::Tagged(Box::new(tagged)))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, s: &str, stack: &mut Vec<String>) -> Result<Value> {
        if let Some(name) = whole_placeholder(s) {
            return self.resolve_parameter(name, stack);
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            if let Some(stripped) = after.strip_prefix('%') {
                out.push('%');
                rest = stripped;
                continue;
            }
            match after.find('%') {
                Some(end) if is_parameter_name(&after[..end]) => {
                    let name = &after[..end];
                    let value = self.resolve_parameter(name, stack)?;
                    out.push_str(&scalar_text(name, s, &value)?);
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn resolve_parameter(&self, name: &str, stack: &mut Vec<String>) -> Result<Value> {
        if stack.iter().any(|seen| seen == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(Error::Interpolation(format!(
                "circular reference detected for parameter \"{}\" ({})",
                name,
                chain.join(" > ")
            )));
        }
        let value = self.params.get(name).ok_or_else(|| {
            Error::Interpolation(format!("You have requested a non-existent parameter \"{}\"", name))
        })?;

        stack.push(name.to_string());
        let resolved = self.resolve_inner(value, stack);
        stack.pop();
        resolved
    }
}

/// `%name%` with nothing around it
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('%')?.strip_suffix('%')?;
    is_parameter_name(inner).then_some(inner)
}

fn is_parameter_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('%') && !name.chars().any(char::is_whitespace)
}

fn scalar_text(name: &str, template: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::Interpolation(format!(
            "parameter \"{}\" must be a string or number to be embedded in \"{}\"",
            name, template
        ))),
    }
}

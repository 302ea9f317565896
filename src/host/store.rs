//! Layered configuration store
//!
//! A global [`Store`] holds recipe-wide values. Every host gets a
//! [`HostConfig`] with its own layer on top; reads fall back to the global
//! layer. An optional override layer (command-line `-o` values) sits above
//! both. Values are either literals or deferred providers that are evaluated
//! on first read and then memoised in the reading host's layer.

use crate::error::{ExecutionError, ExecutionResult};
use crate::host::{interpolate, Host};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A lazily computed configuration value
pub type Provider = Arc<dyn Fn(&HostConfig) -> ExecutionResult<Value> + Send + Sync>;

/// A configuration entry
#[derive(Clone)]
pub enum ConfigValue {
    Literal(Value),
    Deferred(Provider),
}

/// Build a deferred value from a closure
pub fn deferred<F>(provider: F) -> ConfigValue
where
    F: Fn(&HostConfig) -> ExecutionResult<Value> + Send + Sync + 'static,
{
    ConfigValue::Deferred(Arc::new(provider))
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ConfigValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        ConfigValue::Literal(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Literal(Value::String(value))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Literal(Value::Bool(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Literal(Value::Number(value.into()))
    }
}

/// One layer of configuration values
#[derive(Debug, Default)]
pub struct Store {
    values: RwLock<HashMap<String, ConfigValue>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Get the stored entry without evaluating or interpolating it
    pub fn raw(&self, key: &str) -> Option<ConfigValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// All keys in this layer, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Configuration as seen from one host
#[derive(Debug)]
pub struct HostConfig {
    host: Arc<Host>,
    global: Arc<Store>,
    overrides: Option<Arc<Store>>,
    local: Store,
}

impl HostConfig {
    /// Create the host view and seed the host's own values and built-in keys
    ///
    /// Built-ins: `alias`, `hostname`, `labels`, and `remote_user` / `port`
    /// when the host defines them. Built-ins win over host values.
    pub fn new(host: Arc<Host>, global: Arc<Store>) -> Self {
        let local = Store::new();
        for (key, value) in &host.config {
            local.set(key.clone(), value.clone());
        }
        local.set("alias", host.alias.as_str());
        local.set("hostname", host.address());
        if let Some(user) = &host.remote_user {
            local.set("remote_user", user.as_str());
        }
        if let Some(port) = host.port {
            local.set("port", i64::from(port));
        }
        let labels = host
            .labels
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
            .collect();
        local.set("labels", Value::Mapping(labels));

        HostConfig {
            host,
            global,
            overrides: None,
            local,
        }
    }

    /// Put a layer above the host's own values
    pub fn with_overrides(mut self, overrides: Arc<Store>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_arc(&self) -> Arc<Host> {
        Arc::clone(&self.host)
    }

    /// Set a value for this host only
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.local.set(key, value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.overrides.as_ref().map_or(false, |o| o.has(key))
            || self.local.has(key)
            || self.global.has(key)
    }

    /// Resolve a key without interpolation, evaluating deferred values
    ///
    /// Deferred values are evaluated in this host's context and the result is
    /// cached in the host layer, so each host evaluates a provider at most once.
    pub fn resolve(&self, key: &str) -> ExecutionResult<Option<Value>> {
        let entry = self
            .overrides
            .as_ref()
            .and_then(|o| o.raw(key))
            .or_else(|| self.local.raw(key))
            .or_else(|| self.global.raw(key));
        let entry = match entry {
            Some(entry) => entry,
            None => return Ok(None),
        };

        match entry {
            ConfigValue::Literal(value) => Ok(Some(value)),
            ConfigValue::Deferred(provider) => {
                let value = provider(self)?;
                self.local.set(key, value.clone());
                Ok(Some(value))
            }
        }
    }

    /// Get an interpolated value, failing when the key was never set
    pub fn get(&self, key: &str) -> ExecutionResult<Value> {
        match self.resolve(key)? {
            Some(value) => self.interpolate_value(value),
            None => Err(ExecutionError::MissingConfig(key.to_string())),
        }
    }

    /// Get an interpolated value or fall back to a default
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> ExecutionResult<Value> {
        match self.resolve(key)? {
            Some(value) => self.interpolate_value(value),
            None => self.interpolate_value(default.into()),
        }
    }

    /// Get a value rendered as a string
    pub fn get_string(&self, key: &str) -> ExecutionResult<String> {
        Ok(value_to_string(&self.get(key)?))
    }

    /// Interpolate `{{key}}` placeholders against this host's configuration
    pub fn parse(&self, template: &str) -> ExecutionResult<String> {
        let lookup = |key: &str| -> ExecutionResult<Option<String>> {
            Ok(self.resolve(key)?.map(|v| value_to_string(&v)))
        };
        interpolate(template, &lookup)
    }

    fn interpolate_value(&self, value: Value) -> ExecutionResult<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.parse(&s)?)),
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.interpolate_value(item))
                .collect::<ExecutionResult<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut out = serde_yaml::Mapping::new();
                for (k, v) in map {
                    out.insert(k, self.interpolate_value(v)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other),
        }
    }
}

/// Render a value the way it is substituted into commands
///
/// Scalars render as-is, `null` as the empty string, sequences as
/// space-separated items and mappings as inline YAML.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Mapping(_) | Value::Tagged(_) => serde_yaml::to_string(value)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

//! Deployment targets and host selection

use crate::error::{ConfigError, ConfigResult};
use globset::{Glob, GlobMatcher};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A deployment target
///
/// Only identity and connection details live here; configuration values are
/// kept in a [`HostConfig`](crate::host::HostConfig) layered over the global store.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    /// Alias used in selectors, logs and reports
    pub alias: String,

    /// Address to connect to (defaults to the alias)
    pub hostname: Option<String>,

    /// SSH user
    pub remote_user: Option<String>,

    /// SSH port
    pub port: Option<u16>,

    /// Run commands on this machine instead of over SSH
    pub local: bool,

    /// Labels matched by `key=value` selector terms
    pub labels: BTreeMap<String, String>,

    /// Host-level configuration values seeded into the host's layer
    pub config: BTreeMap<String, Value>,
}

impl Host {
    /// Create a remote host with the given alias
    pub fn new(alias: impl Into<String>) -> Self {
        Host {
            alias: alias.into(),
            hostname: None,
            remote_user: None,
            port: None,
            local: false,
            labels: BTreeMap::new(),
            config: BTreeMap::new(),
        }
    }

    /// Create a host that runs every command locally
    pub fn localhost(alias: impl Into<String>) -> Self {
        Host {
            local: true,
            ..Host::new(alias)
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_remote_user(mut self, user: impl Into<String>) -> Self {
        self.remote_user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Address used for connections
    pub fn address(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.alias)
    }

    /// `user@address` (or just the address when no user is set)
    pub fn connection_string(&self) -> String {
        match &self.remote_user {
            Some(user) => format!("{}@{}", user, self.address()),
            None => self.address().to_string(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias)
    }
}

/// A parsed host selector
///
/// Grammar: empty or `all` selects every host. Otherwise a comma-separated
/// list of terms where `key=value` matches a label and anything else is a
/// glob over host aliases. A host is selected when any term matches.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    terms: Vec<SelectorTerm>,
}

#[derive(Debug, Clone)]
enum SelectorTerm {
    All,
    Label { key: String, value: String },
    Alias(GlobMatcher),
}

impl Selector {
    /// Parse a selector string
    pub fn parse(selector: &str) -> ConfigResult<Self> {
        let source = selector.trim().to_string();
        let mut terms = Vec::new();

        for raw in source.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if raw == "all" {
                terms.push(SelectorTerm::All);
            } else if let Some((key, value)) = raw.split_once('=') {
                if key.trim().is_empty() {
                    return Err(ConfigError::InvalidSelector {
                        selector: source.clone(),
                        error: format!("empty label name in '{}'", raw),
                    });
                }
                terms.push(SelectorTerm::Label {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                });
            } else {
                let glob = Glob::new(raw).map_err(|e| ConfigError::InvalidSelector {
                    selector: source.clone(),
                    error: e.to_string(),
                })?;
                terms.push(SelectorTerm::Alias(glob.compile_matcher()));
            }
        }

        if terms.is_empty() {
            terms.push(SelectorTerm::All);
        }

        Ok(Selector { source, terms })
    }

    /// Check whether a host is selected
    pub fn matches(&self, host: &Host) -> bool {
        self.terms.iter().any(|term| match term {
            SelectorTerm::All => true,
            SelectorTerm::Label { key, value } => host.labels.get(key) == Some(value),
            SelectorTerm::Alias(matcher) => matcher.is_match(&host.alias),
        })
    }

    /// Select matching hosts, ordered by alias
    ///
    /// Selecting nothing is an error: a deploy against zero hosts is almost
    /// always a typo in the selector.
    pub fn select<'a, I>(&self, hosts: I) -> ConfigResult<Vec<&'a Host>>
    where
        I: IntoIterator<Item = &'a Host>,
    {
        let mut selected: Vec<&Host> = hosts.into_iter().filter(|h| self.matches(h)).collect();
        selected.sort_by(|a, b| a.alias.cmp(&b.alias));

        if selected.is_empty() {
            return Err(ConfigError::EmptySelection(self.source.clone()));
        }
        Ok(selected)
    }
}

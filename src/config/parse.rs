//! Recipe file parsing and discovery

use crate::config::types::RecipeConfig;
use crate::config::validate_recipe;
use crate::error::{ConfigError, ConfigResult, DeployerError};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default recipe file names to search for
const RECIPE_FILE_NAMES: &[&str] = &["deploy.yml", "deploy.yaml"];

/// A parsed recipe file
#[derive(Debug, Clone)]
pub struct RecipeSource {
    /// File the recipe was read from, if any
    pub path: Option<PathBuf>,

    /// Directory relative paths in the recipe are resolved against
    pub base_dir: PathBuf,

    pub config: RecipeConfig,
}

impl RecipeSource {
    /// A recipe given as a string; relative paths resolve against the
    /// current directory
    pub fn inline(yaml: &str) -> Result<Self, DeployerError> {
        Ok(RecipeSource {
            path: None,
            base_dir: PathBuf::from("."),
            config: parse_recipe(yaml)?,
        })
    }

    /// Resolve a path relative to the recipe's directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Find the recipe file by searching current and parent directories
pub fn find_recipe_file() -> ConfigResult<PathBuf> {
    find_recipe_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the recipe file starting from a specific directory
pub fn find_recipe_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in RECIPE_FILE_NAMES {
            let recipe_path = current_dir.join(file_name);
            searched_paths.push(recipe_path.display().to_string());

            if recipe_path.is_file() {
                return Ok(recipe_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a single recipe from a string, without following imports
pub fn parse_recipe(yaml: &str) -> Result<RecipeConfig, DeployerError> {
    let config: RecipeConfig = serde_yaml::from_str(yaml)?;
    validate_recipe(&config)?;
    Ok(config)
}

/// Parse a recipe file and everything it imports
///
/// Returns the recipes in the order they must be applied: imports first,
/// depth-first and in listed order, the requested file last. A file that
/// is imported more than once is only applied at its first position.
pub fn parse_recipe_file(path: &Path) -> Result<Vec<RecipeSource>, DeployerError> {
    let mut loader = ImportLoader::default();
    loader.load(path)?;
    Ok(loader.sources)
}

/// Parse a recipe with automatic file discovery
pub fn parse_recipe_auto() -> Result<(Vec<RecipeSource>, PathBuf), DeployerError> {
    let recipe_path = find_recipe_file()?;
    let sources = parse_recipe_file(&recipe_path)?;
    Ok((sources, recipe_path))
}

#[derive(Default)]
struct ImportLoader {
    sources: Vec<RecipeSource>,
    loaded: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
}

impl ImportLoader {
    fn load(&mut self, path: &Path) -> Result<(), DeployerError> {
        let canonical = fs::canonicalize(path).map_err(|e| ConfigError::Import {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        if self.stack.contains(&canonical) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(ConfigError::Import {
                path: path.to_path_buf(),
                error: format!("circular import: {}", chain.join(" -> ")),
            }
            .into());
        }
        if self.loaded.contains(&canonical) {
            return Ok(());
        }

        let contents = fs::read_to_string(&canonical).map_err(|e| ConfigError::Import {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config = parse_recipe(&contents).map_err(|e| {
            if self.stack.is_empty() {
                e
            } else {
                ConfigError::Import {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
                .into()
            }
        })?;

        let base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        self.stack.push(canonical.clone());
        for import in &config.import {
            for import_path in expand_import(&base_dir, import)? {
                self.load(&import_path)?;
            }
        }
        self.stack.pop();

        tracing::debug!(path = %canonical.display(), "recipe loaded");
        self.loaded.insert(canonical.clone());
        self.sources.push(RecipeSource {
            path: Some(canonical),
            base_dir,
            config,
        });
        Ok(())
    }
}

/// Resolve an import entry to files, expanding glob patterns
fn expand_import(base_dir: &Path, import: &str) -> ConfigResult<Vec<PathBuf>> {
    let full = base_dir.join(import);
    if !import.contains(['*', '?', '[']) {
        return Ok(vec![full]);
    }

    let pattern = full.to_string_lossy().into_owned();
    let entries = glob::glob(&pattern).map_err(|e| ConfigError::Import {
        path: full.clone(),
        error: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ConfigError::Import {
            path: full.clone(),
            error: e.to_string(),
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

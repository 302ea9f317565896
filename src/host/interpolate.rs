//! Variable interpolation for strings
//!
//! This module replaces `{{key}}` placeholders in commands and configuration
//! values. Values may themselves contain placeholders; they are expanded
//! recursively and a placeholder that refers back to itself is an error.

use crate::error::{InterpolationError, InterpolationResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_./:-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Interpolate placeholders in a string
///
/// `lookup` returns the raw (not yet interpolated) value for a key, or `None`
/// when the key is not defined. Errors from `lookup` are passed through.
pub fn interpolate<F, E>(template: &str, lookup: &F) -> Result<String, E>
where
    F: Fn(&str) -> Result<Option<String>, E>,
    E: From<InterpolationError>,
{
    let mut stack = Vec::new();
    expand(template, lookup, &mut stack)
}

fn expand<F, E>(template: &str, lookup: &F, stack: &mut Vec<String>) -> Result<String, E>
where
    F: Fn(&str) -> Result<Option<String>, E>,
    E: From<InterpolationError>,
{
    let mut result = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let key = key.as_str();

        if stack.iter().any(|k| k == key) {
            let mut chain = stack.clone();
            chain.push(key.to_string());
            return Err(InterpolationError::RecursiveInterpolation(chain.join(" -> ")).into());
        }

        let raw = lookup(key)?
            .ok_or_else(|| InterpolationError::UndefinedVariable(key.to_string()))?;

        stack.push(key.to_string());
        let value = expand(&raw, lookup, stack)?;
        stack.pop();

        result.push_str(&template[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }

    result.push_str(&template[last..]);
    Ok(result)
}

/// Interpolate against a plain map of variables
pub fn interpolate_map(template: &str, vars: &HashMap<String, String>) -> InterpolationResult<String> {
    let lookup = |key: &str| -> InterpolationResult<Option<String>> { Ok(vars.get(key).cloned()) };
    interpolate(template, &lookup)
}

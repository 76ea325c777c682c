//! `{{name}}` placeholder handling for parameterized SQL.
//!
//! Substitution is plain text replacement. Values are not quoted or escaped.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{Result, ZeusError};

const PLACEHOLDER_PATTERN: &str = r"\{\{([^}]+)\}\}";

fn placeholder_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN))
        .as_ref()
        .map_err(|e| ZeusError::internal(format!("Invalid placeholder pattern: {e}")))
}

/// Returns the distinct placeholder names in `sql`, in order of first appearance.
///
/// Names are trimmed, so `{{ day }}` and `{{day}}` are the same parameter.
pub fn extract_parameters(sql: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_regex()?.captures_iter(sql) {
        let name = caps[1].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Replaces every placeholder whose name has a value in `params`.
///
/// Placeholders without a value are left in place.
pub fn substitute_parameters(sql: &str, params: &BTreeMap<String, String>) -> Result<String> {
    Ok(placeholder_regex()?
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            match params.get(caps[1].trim()) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned())
}

/// Names of placeholders in `sql` that have no non-blank value in `params`.
pub fn missing_parameters(sql: &str, params: &BTreeMap<String, String>) -> Result<Vec<String>> {
    Ok(extract_parameters(sql)?
        .into_iter()
        .filter(|name| params.get(name).map_or(true, |v| v.trim().is_empty()))
        .collect())
}

/// Substitutes parameters and rejects SQL that would still contain placeholders.
pub fn render(sql: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let missing = missing_parameters(sql, params)?;
    if !missing.is_empty() {
        return Err(ZeusError::validation(format!(
            "Missing values for parameters: {}",
            missing.join(", ")
        )));
    }
    substitute_parameters(sql, params)
}

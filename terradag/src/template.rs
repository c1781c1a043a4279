// src/template.rs

//! `{{.name}}`-style placeholder replacement.
//!
//! Dependency filters and remote backend configuration values may reference
//! execution variables, e.g. `bucket: "state-{{.environment}}"`. Rendering
//! replaces each placeholder with the value from a name→value map and
//! reports whether everything resolved, so callers can distinguish "this
//! string is ready to use" from "a variable is still missing".

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Marker inserted for placeholders whose name is not in the variable map.
pub const NO_VALUE: &str = "<no value>";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex")
    })
}

/// Outcome of rendering a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// All placeholders (if any) were replaced.
    Resolved(String),
    /// At least one placeholder had no value; `text` contains [`NO_VALUE`]
    /// markers and `missing` lists the unresolved names.
    Unresolved { text: String, missing: Vec<String> },
}

impl Rendered {
    /// The rendered text regardless of resolution, with missing placeholders
    /// replaced by [`NO_VALUE`].
    pub fn text(&self) -> &str {
        match self {
            Rendered::Resolved(s) => s,
            Rendered::Unresolved { text, .. } => text,
        }
    }

    pub fn into_resolved(self) -> Result<String, Vec<String>> {
        match self {
            Rendered::Resolved(s) => Ok(s),
            Rendered::Unresolved { missing, .. } => Err(missing),
        }
    }
}

/// Replace `{{.name}}` placeholders in `input` using `vars`.
pub fn render(input: &str, vars: &BTreeMap<String, String>) -> Rendered {
    let mut missing = Vec::new();

    let text = placeholder_re()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.push(name.to_string());
                    NO_VALUE.to_string()
                }
            }
        })
        .into_owned();

    if missing.is_empty() {
        Rendered::Resolved(text)
    } else {
        missing.sort();
        missing.dedup();
        Rendered::Unresolved { text, missing }
    }
}

/// Render every value of a map, keeping keys untouched. Missing placeholders
/// are left as [`NO_VALUE`] markers; the caller decides whether that is an
/// error.
pub fn render_map_values(
    input: &BTreeMap<String, String>,
    vars: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    input
        .iter()
        .map(|(k, v)| (k.clone(), render(v, vars).text().to_string()))
        .collect()
}

/// Render every value of a map, requiring full resolution. On failure the
/// sorted, deduplicated list of missing variable names is returned.
pub fn render_map_values_strict(
    input: &BTreeMap<String, String>,
    vars: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, Vec<String>> {
    let mut out = BTreeMap::new();
    let mut missing = Vec::new();

    for (k, v) in input {
        match render(v, vars) {
            Rendered::Resolved(s) => {
                out.insert(k.clone(), s);
            }
            Rendered::Unresolved { missing: m, .. } => missing.extend(m),
        }
    }

    if missing.is_empty() {
        Ok(out)
    } else {
        missing.sort();
        missing.dedup();
        Err(missing)
    }
}

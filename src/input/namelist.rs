//! Fortran-style namelist parser for the run input file.
//!
//! The file is a sequence of `&name ... /` (or `&name ... &end`) blocks.
//! Lines starting with `#` or `!` are comments; text between blocks is
//! ignored. Inside a block, assignments look like `name = value[, value]`
//! and a line without `=` continues the previous assignment. Variable names
//! are matched case-insensitively by unambiguous prefix against the
//! registry in [`schema`](crate::input::schema).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::InputError;
use crate::input::schema::{self, InputSpec, VarKind, VarSpec, VarValue};

/// Split a raw list value on `,` or `;`, but only where neither
/// neighboring character is a digit (so `"1,2,3"` and `"-1,-1,-1"` stay
/// one grid triple). Quotes are stripped before splitting.
pub fn split_list(raw: &str) -> Vec<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let chars: Vec<char> = cleaned.chars().collect();
    let mut items = Vec::new();
    let mut current = String::new();
    for (i, c) in chars.iter().enumerate() {
        let is_delim = *c == ',' || *c == ';';
        if is_delim {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
            if !prev_digit && !next_digit {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
        }
        current.push(*c);
    }
    items.push(current.trim().to_string());
    items.retain(|s| !s.is_empty());
    items
}

fn strip_quotes(raw: &str) -> String {
    raw.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

fn convert(ns: &str, var: &VarSpec, raw: &str) -> Result<VarValue, InputError> {
    let mismatch = || InputError::TypeMismatch {
        namespace: ns.to_string(),
        name: var.name.to_string(),
        expected: var.kind.label(),
        got: raw.to_string(),
    };
    match var.kind {
        VarKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(VarValue::Int)
            .map_err(|_| mismatch()),
        VarKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(VarValue::Float)
            .map_err(|_| mismatch()),
        VarKind::Str => Ok(VarValue::Str(strip_quotes(raw.trim()))),
        VarKind::List => Ok(VarValue::List(split_list(raw))),
    }
}

/// Resolve a user token to a variable of `ns`. Exact (case-insensitive)
/// names win; otherwise the token must be a prefix of exactly one name and
/// long enough to clear that name's minimum match length.
fn resolve_var<'a>(
    ns: &'a schema::NamespaceSpec,
    token: &str,
) -> Result<&'a VarSpec, InputError> {
    let lower = token.to_ascii_lowercase();
    if let Some(var) = ns
        .vars
        .iter()
        .find(|v| v.name.to_ascii_lowercase() == lower)
    {
        return Ok(var);
    }
    let candidates: Vec<&VarSpec> = ns
        .vars
        .iter()
        .filter(|v| {
            let name = v.name.to_ascii_lowercase();
            lower.len() >= schema::MIN_CHARS_TO_MATCH.min(name.len()) && name.starts_with(&lower)
        })
        .collect();
    match candidates.len() {
        0 => Err(InputError::UnknownVariable {
            namespace: ns.key.to_string(),
            token: token.to_string(),
        }),
        1 => {
            let var = candidates[0];
            if lower.len() >= var.min_match {
                Ok(var)
            } else {
                Err(InputError::UnknownVariable {
                    namespace: ns.key.to_string(),
                    token: token.to_string(),
                })
            }
        }
        _ => Err(InputError::AmbiguousPrefix {
            namespace: ns.key.to_string(),
            token: token.to_string(),
            first: candidates[0].name.to_string(),
            second: candidates[1].name.to_string(),
        }),
    }
}

/// The raw parse result: one value per declared variable of every
/// namespace (defaults where the file was silent), plus the set of
/// namespaces that actually appeared.
#[derive(Debug, Clone)]
pub struct ParsedInput {
    spec: InputSpec,
    values: HashMap<(String, String), VarValue>,
    pub triggered: HashSet<String>,
    /// Verbatim text of the input file, echoed into reports.
    pub text: String,
}

impl ParsedInput {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|_| InputError::FileNotFound(path.as_ref().display().to_string()))?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self, InputError> {
        let spec = schema::input_spec();
        let mut values: HashMap<(String, String), VarValue> = HashMap::new();
        for ns in &spec.namespaces {
            for var in &ns.vars {
                values.insert(
                    (ns.key.to_string(), var.name.to_string()),
                    var.default.clone(),
                );
            }
        }

        let mut triggered: HashSet<String> = HashSet::new();
        // (namespace key, raw fields) per declared block
        let mut blocks: Vec<(String, Vec<String>)> = Vec::new();
        let mut in_block = false;

        for line in text.lines() {
            let stripped = line.trim();
            if !in_block && !stripped.starts_with('&') {
                continue;
            }
            if stripped.starts_with('#') || stripped.starts_with('!') {
                continue;
            }
            if in_block && stripped.starts_with('&') && stripped != "&end" {
                return Err(InputError::UnterminatedNamespace);
            }
            if in_block && (stripped == "/" || stripped == "&end") {
                in_block = false;
            } else if !in_block && stripped.starts_with('&') {
                in_block = true;
                let token = stripped[1..].to_ascii_lowercase();
                let ns = spec
                    .resolve_namespace(&token)
                    .ok_or_else(|| InputError::UnknownNamespace(token.clone()))?;
                if triggered.contains(ns.key) {
                    return Err(InputError::DuplicateNamespace(ns.key.to_string()));
                }
                triggered.insert(ns.key.to_string());
                blocks.push((ns.key.to_string(), Vec::new()));
            } else if in_block {
                let (_, fields) = blocks
                    .last_mut()
                    .expect("a namelist block must be open here");
                for item in stripped.split(',') {
                    let item = item.trim();
                    if !item.is_empty() {
                        fields.push(item.to_string());
                    }
                }
            }
        }

        // Fold continuation fields (no '=') back into the assignment they
        // extend, so commas inside list values survive the line split.
        for (key, fields) in &mut blocks {
            let mut last_assign: Option<usize> = None;
            let mut folded: Vec<String> = Vec::new();
            for field in fields.iter() {
                if field.contains('=') {
                    folded.push(field.clone());
                    last_assign = Some(folded.len() - 1);
                } else if let Some(idx) = last_assign {
                    let target = &mut folded[idx];
                    target.push(',');
                    target.push_str(field);
                } else {
                    return Err(InputError::StrayField(key.clone()));
                }
            }
            *fields = folded;
        }

        for (key, fields) in &blocks {
            let ns = spec
                .namespace(key)
                .expect("block keys come from the registry");
            let mut seen: HashSet<&'static str> = HashSet::new();
            for field in fields {
                let (name, value) = field
                    .split_once('=')
                    .expect("continuations were folded away");
                let var = resolve_var(ns, name.trim())?;
                if !seen.insert(var.name) {
                    return Err(InputError::DuplicateVariable {
                        namespace: ns.key.to_string(),
                        name: var.name.to_string(),
                    });
                }
                let converted = convert(ns.key, var, value.trim())?;
                values.insert((ns.key.to_string(), var.name.to_string()), converted);
            }
        }

        Ok(ParsedInput {
            spec,
            values,
            triggered,
            text: text.to_string(),
        })
    }

    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }

    pub fn value(&self, ns: &str, name: &str) -> &VarValue {
        self.values
            .get(&(ns.to_string(), name.to_string()))
            .unwrap_or_else(|| panic!("unregistered variable {}.{}", ns, name))
    }

    pub fn int(&self, ns: &str, name: &str) -> i64 {
        match self.value(ns, name) {
            VarValue::Int(v) => *v,
            other => panic!("{}.{} is not an integer: {:?}", ns, name, other),
        }
    }

    pub fn float(&self, ns: &str, name: &str) -> f64 {
        match self.value(ns, name) {
            VarValue::Float(v) => *v,
            other => panic!("{}.{} is not a float: {:?}", ns, name, other),
        }
    }

    pub fn string(&self, ns: &str, name: &str) -> String {
        match self.value(ns, name) {
            VarValue::Str(v) => v.clone(),
            other => panic!("{}.{} is not a string: {:?}", ns, name, other),
        }
    }

    pub fn list(&self, ns: &str, name: &str) -> Vec<String> {
        match self.value(ns, name) {
            VarValue::List(v) => v.clone(),
            other => panic!("{}.{} is not a list: {:?}", ns, name, other),
        }
    }

    /// Render the triggered namespaces back to canonical namelist text.
    /// Reparsing the result reproduces the same values and triggers.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for ns in &self.spec.namespaces {
            if !self.triggered.contains(ns.key) {
                continue;
            }
            let _ = writeln!(out, "&{}", ns.full_name);
            for var in &ns.vars {
                let value = self.value(ns.key, var.name);
                let _ = writeln!(out, "  {} = {}", var.name, value);
            }
            let _ = writeln!(out, "/");
        }
        out
    }
}

#[cfg(test)]
mod tests;

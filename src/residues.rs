//! Residue identities and the residue map handed over by the topology
//! builder, plus the small selection language used by `print_res` and
//! `mutant_res`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// One residue of the complex, identified the way the topology builder
/// reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Residue {
    /// 1-based index within the complex.
    pub index: usize,
    pub chain: String,
    pub number: i64,
    #[serde(default)]
    pub icode: String,
    pub name: String,
    /// Which partner owns it: `"REC"` or `"LIG"`.
    pub owner: String,
}

impl Residue {
    pub fn label(&self) -> String {
        if self.icode.is_empty() {
            format!("{}:{}:{}", self.chain, self.name, self.number)
        } else {
            format!("{}:{}:{}:{}", self.chain, self.name, self.number, self.icode)
        }
    }

    /// Does this residue match a `(chain, number, icode)` selection entry?
    pub fn matches(&self, chain: &str, number: i64, icode: &str) -> bool {
        self.chain.eq_ignore_ascii_case(chain) && self.number == number && self.icode == icode
    }
}

impl fmt::Display for Residue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The residue map for one system (normal or mutant), as produced by the
/// topology builder. Receptor and ligand lists are slices of the complex
/// list with their own 1-based indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidueMap {
    pub complex: Vec<Residue>,
    pub receptor: Vec<Residue>,
    pub ligand: Vec<Residue>,
    pub receptor_mask: String,
    pub ligand_mask: String,
}

impl ResidueMap {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("could not read residue map {}", path.as_ref().display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("malformed residue map {}", path.as_ref().display()))
    }

    /// Rename the mutated residue, returning the label of the mutation
    /// (e.g. `A:ARG:35 -> ALA`). Used to build the mutant residue lists.
    pub fn apply_mutation(&self, selection: &str, new_name: &str) -> Result<(ResidueMap, String)> {
        let entries = match parse_selection(selection)? {
            Selection::Residues(entries) if entries.len() == 1 => entries,
            Selection::Residues(_) => {
                bail!("exactly one residue must be selected for mutation, got `{selection}`")
            }
            Selection::Within(_) => {
                bail!("a distance selection cannot pick the residue to mutate")
            }
        };
        let (chain, number, icode) = &entries[0];
        let mut mutated = self.clone();
        let mut label = None;
        for list in [
            &mut mutated.complex,
            &mut mutated.receptor,
            &mut mutated.ligand,
        ] {
            for res in list.iter_mut() {
                if res.matches(chain, *number, icode) {
                    if label.is_none() {
                        label = Some(format!("{} -> {}", res.label(), new_name));
                    }
                    res.name = new_name.to_string();
                }
            }
        }
        let label = label.ok_or_else(|| {
            anyhow::anyhow!("mutant_res `{selection}` does not name a residue of the complex")
        })?;
        Ok((mutated, label))
    }
}

/// A `print_res`/`mutant_res` selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `within <dist>`: all residues within the given distance of the
    /// partner interface.
    Within(f64),
    /// Explicit `(chain, number, insertion code)` entries.
    Residues(Vec<(String, i64, String)>),
}

/// Parse a residue selection. The grammar is either `within <dist>` or a
/// whitespace/semicolon separated run of `CHAIN/items`, where items are
/// comma-separated residue numbers or `start-end` ranges, each optionally
/// carrying an insertion code after a colon.
pub fn parse_selection(selection: &str) -> Result<Selection> {
    let selection = selection.trim();
    if let Some(rest) = selection.strip_prefix("within") {
        let dist: f64 = rest
            .trim()
            .parse()
            .with_context(|| format!("invalid dist, expected a float value but got `{}`", rest.trim()))?;
        return Ok(Selection::Within(dist));
    }

    let mut entries: Vec<(String, i64, String)> = Vec::new();
    for group in selection.split([' ', ';']).filter(|s| !s.is_empty()) {
        let (chain, items) = group
            .split_once(['/', ':'])
            .with_context(|| format!("expected something like A/2-10,35,41 but got `{group}`"))?;
        if chain.is_empty() || !chain.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("expected a chain letter before `/` in `{group}`");
        }
        for item in items.split(',').filter(|s| !s.is_empty()) {
            if let Some((start, end)) = item.split_once('-') {
                let start: i64 = start
                    .parse()
                    .with_context(|| format!("range bounds must be integers, got `{item}`"))?;
                let end: i64 = end
                    .parse()
                    .with_context(|| format!("range bounds must be integers, got `{item}`"))?;
                for number in start..=end {
                    push_unique(&mut entries, (chain.to_string(), number, String::new()));
                }
            } else {
                let (number, icode) = match item.split_once(':') {
                    Some((n, ic)) => (n, ic.to_string()),
                    None => (item, String::new()),
                };
                let number: i64 = number
                    .parse()
                    .with_context(|| format!("residue numbers must be integers, got `{item}`"))?;
                push_unique(&mut entries, (chain.to_string(), number, icode));
            }
        }
    }
    if entries.is_empty() {
        bail!("empty residue selection `{selection}`");
    }
    Ok(Selection::Residues(entries))
}

fn push_unique(entries: &mut Vec<(String, i64, String)>, entry: (String, i64, String)) {
    if entries.contains(&entry) {
        warn!(
            "found duplicated residue in selection: CHAIN:{} RES_NUM:{} ICODE:{}",
            entry.0, entry.1, entry.2
        );
        return;
    }
    entries.push(entry);
}

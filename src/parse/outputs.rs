//! Parsers for the textual records the external solvers write.
//!
//! Each model's record is line-oriented: energy terms appear as
//! `NAME = value` pairs, one value per trajectory frame. Rank-shard files
//! (`<base>.<rank>`) are concatenated in rank order before scanning, so
//! frame order is preserved end to end. Term names come from a fixed,
//! closed vocabulary; synonyms are folded onto canonical names and
//! anything else on the line is ignored as solver noise.

use anyhow::Result;
use phf::phf_map;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use strum_macros::Display;

use crate::error::EndstateError;
use crate::parse::energy::EnergyVector;

/// The solvation models with their canonical report names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Model {
    #[strum(serialize = "gb")]
    Gb,
    #[strum(serialize = "pb")]
    Pb,
    #[strum(serialize = "rism std")]
    RismStd,
    #[strum(serialize = "rism gf")]
    RismGf,
}

/// Canonical names of the gas-phase terms, in report order. UB/IMP/CMAP
/// only show up for CHARMM-derived topologies, ESCF only for QM/MM.
pub const GAS_TERMS: &[&str] = &[
    "BOND", "ANGLE", "DIHED", "VDWAALS", "EEL", "1-4 VDW", "1-4 EEL", "UB", "IMP", "CMAP", "ESCF",
];

/// Synonym folding for the gas terms shared by every model.
static GAS_SYNONYMS: phf::Map<&'static str, &'static str> = phf_map! {
    "BOND" => "BOND",
    "ANGLE" => "ANGLE",
    "DIHED" => "DIHED",
    "VDWAALS" => "VDWAALS",
    "VDW" => "VDWAALS",
    "EEL" => "EEL",
    "ELEC" => "EEL",
    "1-4 VDW" => "1-4 VDW",
    "1-4 NB" => "1-4 VDW",
    "1-4 EEL" => "1-4 EEL",
    "UB" => "UB",
    "IMP" => "IMP",
    "CMAP" => "CMAP",
    "ESCF" => "ESCF",
};

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Za-z_][0-9A-Za-z_\- ]*?)\s*=\s*(-?\d+\.?\d*(?:[eE][-+]?\d+)?|\*+)")
        .expect("the pair pattern is valid")
});

/// One species' term-keyed energy vectors, insertion-ordered so the
/// report prints terms the way the solver emitted them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnergyTerms {
    terms: Vec<(String, EnergyVector)>,
}

impl EnergyTerms {
    pub fn new() -> EnergyTerms {
        EnergyTerms::default()
    }

    pub fn get(&self, name: &str) -> Option<&EnergyVector> {
        self.terms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, name: &str, vector: EnergyVector) {
        match self.terms.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = vector,
            None => self.terms.push((name.to_string(), vector)),
        }
    }

    pub fn push_value(&mut self, name: &str, value: f64) {
        match self.terms.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => v.push(value),
            None => {
                let mut v = EnergyVector::new();
                v.push(value);
                self.terms.push((name.to_string(), v));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnergyVector)> {
        self.terms.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Every vector must hold exactly one value per analyzed frame.
    pub fn check_lengths(&self, expected: usize, origin: &Path) -> Result<()> {
        for (name, v) in &self.terms {
            if v.len() != expected {
                return Err(EndstateError::Parse {
                    path: origin.to_path_buf(),
                    reason: format!(
                        "term {} has {} values but {} frames were analyzed",
                        name,
                        v.len(),
                        expected
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// What a given model needs from the raw record besides the gas terms.
fn solvation_synonyms(model: Model, polardecomp: bool) -> Vec<(&'static str, &'static str)> {
    match model {
        Model::Gb => vec![("EGB", "EGB"), ("ESURF", "ESURF")],
        Model::Pb => vec![
            ("EPB", "EPB"),
            ("PB", "EPB"),
            ("ENPOLAR", "ENPOLAR"),
            ("ECAVITY", "ENPOLAR"),
            ("EDISPER", "EDISPER"),
            ("EDISP", "EDISPER"),
        ],
        Model::RismStd => {
            if polardecomp {
                vec![("rism_polar", "POLAR"), ("rism_apolar", "APOLAR")]
            } else {
                vec![("rism_exchem", "ERISM"), ("ERISM", "ERISM")]
            }
        }
        Model::RismGf => {
            if polardecomp {
                vec![("rism_polarGF", "POLAR"), ("rism_apolarGF", "APOLAR")]
            } else {
                vec![("rism_exchGF", "ERISM"), ("ERISMGF", "ERISM")]
            }
        }
    }
}

fn normalize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

/// Scan one record's text, appending every recognized `NAME = value` pair.
fn scan_pairs(
    text: &str,
    path: &Path,
    extra: &[(&'static str, &'static str)],
    skip_esurf: bool,
    terms: &mut EnergyTerms,
) -> Result<()> {
    for caps in PAIR_RE.captures_iter(text) {
        let token = normalize_token(&caps[1]);
        let canonical = GAS_SYNONYMS
            .get(token.to_ascii_uppercase().as_str())
            .copied()
            .or_else(|| {
                extra
                    .iter()
                    .find(|(syn, _)| *syn == token.as_str())
                    .map(|(_, c)| *c)
            });
        let Some(canonical) = canonical else {
            continue;
        };
        if skip_esurf && canonical == "ESURF" {
            continue;
        }
        let raw_value = &caps[2];
        if raw_value.starts_with('*') {
            return Err(EndstateError::Parse {
                path: path.to_path_buf(),
                reason: format!("term {} overflowed the solver's field width", canonical),
            }
            .into());
        }
        let value: f64 = raw_value.parse().map_err(|_| EndstateError::Parse {
            path: path.to_path_buf(),
            reason: format!("could not read a number for {}: `{}`", canonical, raw_value),
        })?;
        terms.push_value(canonical, value);
    }
    Ok(())
}

fn rank_files(workdir: &Path, template: &str, ranks: usize) -> Vec<PathBuf> {
    (0..ranks)
        .map(|r| workdir.join(template.replace("%d", &r.to_string())))
        .collect()
}

fn read_required(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        EndstateError::Parse {
            path: path.to_path_buf(),
            reason: format!("could not read solver output: {}", e),
        }
        .into()
    })
}

/// Parse one species' record for `model`, concatenating the rank shards
/// in rank order. `surf_template` carries the surface-area data files for
/// GB (the `ESURF` term comes from there, scaled by the surface tension).
pub struct ModelParse<'a> {
    pub workdir: &'a Path,
    pub ranks: usize,
    pub polardecomp: bool,
    pub surften: f64,
    pub surfoff: f64,
}

impl ModelParse<'_> {
    pub fn parse(
        &self,
        model: Model,
        mdout_template: &str,
        surf_template: Option<&str>,
    ) -> Result<EnergyTerms> {
        let mut terms = EnergyTerms::new();
        let extra = solvation_synonyms(model, self.polardecomp);
        // when a dedicated surface run exists it owns ESURF, not the mdout
        let skip_esurf = surf_template.is_some();
        for path in rank_files(self.workdir, mdout_template, self.ranks) {
            let text = read_required(&path)?;
            scan_pairs(&text, &path, &extra, skip_esurf, &mut terms)?;
        }
        if let Some(surf_template) = surf_template {
            let mut esurf = EnergyVector::new();
            for path in rank_files(self.workdir, surf_template, self.ranks) {
                let text = read_required(&path)?;
                for area in parse_surf_data(&text, &path)? {
                    esurf.push(area * self.surften + self.surfoff);
                }
            }
            terms.insert("ESURF", esurf);
        }
        Ok(terms)
    }
}

/// Surface-area datasets are `frame value` rows with `#` comment lines.
fn parse_surf_data(text: &str, path: &Path) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.split_whitespace();
        let _frame = cols.next();
        let value = cols
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| EndstateError::Parse {
                path: path.to_path_buf(),
                reason: format!("unreadable surface-area row `{}`", line),
            })?;
        values.push(value);
    }
    Ok(values)
}

/// Sum the named constituents into a composite term. Present terms only;
/// every present constituent must cover the same frames.
fn sum_terms(terms: &EnergyTerms, names: &[&str], origin: &Path) -> Result<Option<EnergyVector>> {
    let mut acc: Option<EnergyVector> = None;
    for name in names {
        let Some(v) = terms.get(name) else { continue };
        acc = Some(match acc {
            None => v.clone(),
            Some(a) => a.checked_add(v).map_err(|e| EndstateError::Parse {
                path: origin.to_path_buf(),
                reason: format!("constituents of a composite disagree on frames: {}", e),
            })?,
        });
    }
    Ok(acc)
}

/// Build `G gas`, `G solv`, and `TOTAL` from the raw terms.
pub fn fill_composite_terms(
    terms: &mut EnergyTerms,
    model: Model,
    inp: i64,
    polardecomp: bool,
    origin: &Path,
) -> Result<()> {
    let gas = sum_terms(terms, GAS_TERMS, origin)?.unwrap_or_default();
    let solv_names: &[&str] = match model {
        Model::Gb => &["EGB", "ESURF"],
        Model::Pb => {
            if inp == 2 {
                &["EPB", "ENPOLAR", "EDISPER"]
            } else {
                &["EPB", "ENPOLAR"]
            }
        }
        Model::RismStd | Model::RismGf => {
            if polardecomp {
                &["POLAR", "APOLAR"]
            } else {
                &["ERISM"]
            }
        }
    };
    let solv = sum_terms(terms, solv_names, origin)?.unwrap_or_default();
    let total = gas.checked_add(&solv).map_err(|e| EndstateError::Parse {
        path: origin.to_path_buf(),
        reason: format!("G gas and G solv disagree on frames: {}", e),
    })?;
    terms.insert("G gas", gas);
    terms.insert("G solv", solv);
    terms.insert("TOTAL", total);
    Ok(())
}

/// Normal-mode records: one `Translational/Rotational/Vibrational/Total`
/// block per frame, entropies in cal/mol-K. Values are stored as
/// `T*S` in kcal/mol so they subtract directly from enthalpies.
pub fn parse_nmode(
    workdir: &Path,
    template: &str,
    ranks: usize,
    temperature: f64,
) -> Result<EnergyTerms> {
    static NM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(Translational|Rotational|Vibrational|Total)\s*[=:]\s*(-?\d+\.?\d*)")
            .expect("the nmode pattern is valid")
    });
    let mut terms = EnergyTerms::new();
    for path in rank_files(workdir, template, ranks) {
        let text = read_required(&path)?;
        for caps in NM_RE.captures_iter(&text) {
            let name = &caps[1];
            let entropy: f64 = caps[2].parse().map_err(|_| EndstateError::Parse {
                path: path.clone(),
                reason: format!("could not read a number for {}", name),
            })?;
            terms.push_value(name, entropy * temperature / 1000.0);
        }
    }
    Ok(terms)
}

/// Quasi-harmonic entropies per species, cal/mol-K, components
/// `[Total, Translational, Rotational, Vibrational]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QhOutput {
    pub complex: [f64; 4],
    pub receptor: [f64; 4],
    pub ligand: [f64; 4],
    temperature: f64,
}

pub const QH_COMPONENTS: [&str; 4] = ["Total", "Translational", "Rotational", "Vibrational"];

impl QhOutput {
    /// The trajectory tool prints one thermochemistry block per species,
    /// complex first, then receptor, then ligand (a stability run only
    /// has the complex block).
    pub fn from_file(path: &Path, temperature: f64) -> Result<QhOutput> {
        static QH_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?m)^\s*(Total|Translational|Rotational|Vibrational)\s*[=:]\s*(-?\d+\.?\d*)")
                .expect("the qh pattern is valid")
        });
        let text = read_required(path)?;
        let mut out = QhOutput {
            temperature,
            ..QhOutput::default()
        };
        let mut seen = [0usize; 4];
        for caps in QH_RE.captures_iter(&text) {
            let idx = QH_COMPONENTS
                .iter()
                .position(|c| *c == &caps[1])
                .expect("the pattern only matches known components");
            let value: f64 = caps[2].parse().map_err(|_| EndstateError::Parse {
                path: path.to_path_buf(),
                reason: format!("could not read a number for {}", &caps[1]),
            })?;
            match seen[idx] {
                0 => out.complex[idx] = value,
                1 => out.receptor[idx] = value,
                2 => out.ligand[idx] = value,
                _ => {
                    return Err(EndstateError::Parse {
                        path: path.to_path_buf(),
                        reason: format!("more than three {} entries", &caps[1]),
                    }
                    .into())
                }
            }
            seen[idx] += 1;
        }
        if seen[0] == 0 {
            return Err(EndstateError::Parse {
                path: path.to_path_buf(),
                reason: "no thermochemistry blocks found".to_string(),
            }
            .into());
        }
        Ok(out)
    }

    pub fn delta(&self, component: usize) -> f64 {
        self.complex[component] - self.receptor[component] - self.ligand[component]
    }

    /// `-T*dS` of the total component, kcal/mol: the additive free-energy
    /// correction.
    pub fn minus_t_delta_s(&self) -> f64 {
        -self.temperature * self.delta(0) / 1000.0
    }

    /// `T*S` of one species' total, kcal/mol.
    pub fn species_ts(&self, values: &[f64; 4]) -> f64 {
        self.temperature * values[0] / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GB_FRAME: &str = "\
 BOND    =       34.9734  ANGLE   =       94.7999  DIHED      =      156.6561
 VDWAALS =     -110.6289  EEL     =    -1295.1162  EGB        =    -1298.3417
 1-4 VDW =       49.3934  1-4 EEL =      791.9188  RESTRAINT  =        0.0000
";

    fn write_shards(dir: &Path, template: &str, shards: &[&str]) {
        for (rank, content) in shards.iter().enumerate() {
            fs::write(dir.join(template.replace("%d", &rank.to_string())), content).unwrap();
        }
    }

    #[test]
    fn gb_record_scans_terms_and_surface_data() {
        let dir = tempfile::tempdir().unwrap();
        let two_frames = format!("{GB_FRAME}\n{GB_FRAME}");
        write_shards(dir.path(), "complex_gb.mdout.%d", &[&two_frames, GB_FRAME]);
        write_shards(
            dir.path(),
            "complex_gb_surf.dat.%d",
            &["#Frame SURF\n1 1000.0\n2 1010.0\n", "1 1020.0\n"],
        );
        let parser = ModelParse {
            workdir: dir.path(),
            ranks: 2,
            polardecomp: false,
            surften: 0.0072,
            surfoff: 0.0,
        };
        let mut terms = parser
            .parse(Model::Gb, "complex_gb.mdout.%d", Some("complex_gb_surf.dat.%d"))
            .unwrap();
        assert_eq!(terms.get("BOND").unwrap().len(), 3);
        assert_eq!(terms.get("EGB").unwrap().len(), 3);
        // restraint is outside the closed set
        assert!(terms.get("RESTRAINT").is_none());
        let esurf = terms.get("ESURF").unwrap();
        assert_eq!(esurf.len(), 3);
        assert!((esurf[0] - 7.2).abs() < 1e-9);

        let origin = dir.path().join("complex_gb.mdout.0");
        fill_composite_terms(&mut terms, Model::Gb, 2, false, &origin).unwrap();
        terms.check_lengths(3, &origin).unwrap();
        let gas = terms.get("G gas").unwrap();
        let solv = terms.get("G solv").unwrap();
        let total = terms.get("TOTAL").unwrap();
        for i in 0..3 {
            assert!((total[i] - (gas[i] + solv[i])).abs() == 0.0, "bitwise sum");
        }
        let expected_gas = 34.9734 + 94.7999 + 156.6561 - 110.6289 - 1295.1162 + 49.3934 + 791.9188;
        assert!((gas[0] - expected_gas).abs() < 1e-9);
    }

    #[test]
    fn sander_synonyms_fold_onto_canonical_names() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(
            dir.path(),
            "lig_pb.mdout.%d",
            &[" BOND = 1.0  1-4 NB = 2.0\n EPB = -3.0  ENPOLAR = 0.5  EDISPER = 0.1\n"],
        );
        let parser = ModelParse {
            workdir: dir.path(),
            ranks: 1,
            polardecomp: false,
            surften: 0.0,
            surfoff: 0.0,
        };
        let terms = parser.parse(Model::Pb, "lig_pb.mdout.%d", None).unwrap();
        assert!((terms.get("1-4 VDW").unwrap()[0] - 2.0).abs() < 1e-12);
        assert!((terms.get("EPB").unwrap()[0] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn rism_models_pick_their_own_tokens() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(
            dir.path(),
            "com_rism.mdout.%d",
            &["BOND = 1.0\nrism_exchem = -5.0\nrism_exchGF = -4.0\n"],
        );
        let parser = ModelParse {
            workdir: dir.path(),
            ranks: 1,
            polardecomp: false,
            surften: 0.0,
            surfoff: 0.0,
        };
        let std = parser.parse(Model::RismStd, "com_rism.mdout.%d", None).unwrap();
        assert!((std.get("ERISM").unwrap()[0] + 5.0).abs() < 1e-12);
        let gf = parser.parse(Model::RismGf, "com_rism.mdout.%d", None).unwrap();
        assert!((gf.get("ERISM").unwrap()[0] + 4.0).abs() < 1e-12);
    }

    #[test]
    fn overflowed_fields_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), "com_gb.mdout.%d", &["EGB = ********\n"]);
        let parser = ModelParse {
            workdir: dir.path(),
            ranks: 1,
            polardecomp: false,
            surften: 0.0,
            surfoff: 0.0,
        };
        assert!(parser.parse(Model::Gb, "com_gb.mdout.%d", None).is_err());
    }

    #[test]
    fn frame_count_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), "c.mdout.%d", &["BOND = 1.0\nBOND = 2.0\nANGLE = 0.5\n"]);
        let parser = ModelParse {
            workdir: dir.path(),
            ranks: 1,
            polardecomp: false,
            surften: 0.0,
            surfoff: 0.0,
        };
        let terms = parser.parse(Model::Gb, "c.mdout.%d", None).unwrap();
        let origin = dir.path().join("c.mdout.0");
        assert!(terms.check_lengths(2, &origin).is_err());
    }

    #[test]
    fn nmode_record_scales_to_kcal() {
        let dir = tempfile::tempdir().unwrap();
        let frame = "\
Translational = 13.0
Rotational = 12.0
Vibrational = 500.0
Total = 525.0
";
        write_shards(dir.path(), "complex_nm.out.%d", &[frame, frame]);
        let terms = parse_nmode(dir.path(), "complex_nm.out.%d", 2, 300.0).unwrap();
        let total = terms.get("Total").unwrap();
        assert_eq!(total.len(), 2);
        assert!((total[0] - 525.0 * 300.0 / 1000.0).abs() < 1e-9);
    }

    #[test]
    fn qh_blocks_map_to_species_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpptraj_entropy.out");
        fs::write(
            &path,
            "Total = 1500.0\nTranslational = 10.0\nRotational = 20.0\nVibrational = 1470.0\n\
             Total = 1000.0\nTranslational = 8.0\nRotational = 16.0\nVibrational = 976.0\n\
             Total = 400.0\nTranslational = 4.0\nRotational = 8.0\nVibrational = 388.0\n",
        )
        .unwrap();
        let qh = QhOutput::from_file(&path, 300.0).unwrap();
        assert!((qh.delta(0) - 100.0).abs() < 1e-9);
        assert!((qh.minus_t_delta_s() + 30.0).abs() < 1e-9);
    }
}

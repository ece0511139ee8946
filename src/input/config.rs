//! Typed run configuration built from a [`ParsedInput`].
//!
//! Construction happens in three stages: conversion of the raw values into
//! typed namespace structs, cross-field validation (everything here is a
//! `ConfigError` and fires before any external program runs), and a
//! post-processing pass that derives the handful of values the planner
//! wants in a different shape (inverted grid scale, trajectory suffix,
//! lowercased RISM thermo).

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::error::EndstateError;
use crate::input::namelist::ParsedInput;

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    EndstateError::Config(msg.into()).into()
}

const QM_THEORIES: &[&str] = &[
    "PM3", "AM1", "MNDO", "PDDG-PM3", "PM3PDDG", "PDDG-MNDO", "PDDGMNDO", "PM3-CARB1", "PM3CARB1",
    "DFTB", "SCC-DFTB", "RM1", "PM6", "PM3-ZnB", "PM3-MAIS", "PM6-D", "PM6-DH+", "AM1-DH+",
    "AM1-D*", "PM3ZNB", "MNDO/D", "MNDOD",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mutation {
    Alanine,
    Glycine,
}

impl Mutation {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "ALA" | "A" => Ok(Mutation::Alanine),
            "GLY" | "G" => Ok(Mutation::Glycine),
            other => Err(invalid(format!(
                "the mutant must be ALA (or A) or GLY (or G), not {}",
                other
            ))),
        }
    }

    pub fn residue_name(self) -> &'static str {
        match self {
            Mutation::Alanine => "ALA",
            Mutation::Glycine => "GLY",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralOpts {
    pub assign_chain_id: bool,
    pub debug_printlevel: i64,
    pub startframe: i64,
    pub endframe: i64,
    pub interval: i64,
    pub qh_entropy: bool,
    pub interaction_entropy: bool,
    pub ie_segment: i64,
    pub c2_entropy: bool,
    pub c2_segment: i64,
    pub exp_ki: f64,
    pub full_traj: bool,
    pub keep_files: i64,
    pub forcefields: Vec<String>,
    pub netcdf: bool,
    pub pb_radii: i64,
    pub save_mode: bool,
    pub solvated_trajectory: bool,
    pub strip_mask: String,
    pub sys_name: String,
    pub temperature: f64,
    pub use_sander: bool,
    pub verbose: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GbOpts {
    pub igb: i64,
    pub extdiel: f64,
    pub saltcon: f64,
    pub surften: f64,
    pub rgbmax: f64,
    pub intdiel: f64,
    pub ifqnt: bool,
    pub qm_theory: String,
    pub qm_residues: String,
    pub qmcharge_com: i64,
    pub qmcharge_rec: i64,
    pub qmcharge_lig: i64,
    pub qmcut: f64,
    pub surfoff: f64,
    pub molsurf: bool,
    pub msoffset: f64,
    pub probe: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PbOpts {
    pub ntb: i64,
    pub cut: f64,
    pub nsnb: i64,
    pub imin: i64,
    pub maxcyc: i64,
    pub ioutfm: i64,
    pub ntx: i64,
    pub inp: i64,
    pub smoothopt: i64,
    pub radiopt: i64,
    pub npbopt: i64,
    pub solvopt: i64,
    pub linit: i64,
    pub nfocus: i64,
    pub fscale: i64,
    pub indi: f64,
    pub exdi: f64,
    pub istrng: f64,
    pub prbrad: f64,
    pub iprob: f64,
    pub accept: f64,
    pub fillratio: f64,
    /// Stored inverted after validation: the finite-difference grid spacing.
    pub scale: f64,
    pub bcopt: i64,
    pub eneopt: i64,
    pub cutnb: f64,
    pub sprob: f64,
    pub cavity_surften: f64,
    pub cavity_offset: f64,
    pub emem: f64,
    pub memopt: i64,
    pub sasopt: i64,
    pub mthick: f64,
    pub mctrdz: f64,
    pub maxarcdot: i64,
    pub poretype: i64,
    pub npbverb: i64,
    pub frcopt: i64,
    pub cutfd: f64,
    pub ipb: i64,
    pub sander_apbs: bool,
    pub pbtemp: f64,
    pub arcres: f64,
    pub mprob: f64,
    pub nbuffer: f64,
    pub npbgrid: i64,
    pub scalec: i64,
    pub nsnba: i64,
    pub phiout: i64,
    pub phiform: i64,
    pub decompopt: i64,
    pub use_rmin: i64,
    pub vprob: f64,
    pub rhow_effect: f64,
    pub use_sav: i64,
    pub maxsph: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlaOpts {
    pub mutant_only: bool,
    pub mutant: Mutation,
    pub mutant_res: String,
    pub cas_intdiel: bool,
    pub intdiel_nonpolar: i64,
    pub intdiel_polar: i64,
    pub intdiel_positive: i64,
    pub intdiel_negative: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NmodeOpts {
    pub dielc: f64,
    pub drms: f64,
    pub maxcyc: i64,
    pub nminterval: i64,
    pub nmstartframe: i64,
    pub nmendframe: i64,
    pub nmode_igb: i64,
    pub nmode_istrng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecompOpts {
    pub csv_format: bool,
    pub dec_verbose: i64,
    pub idecomp: i64,
    pub print_res: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RismOpts {
    pub closure: String,
    pub buffer: f64,
    pub grdspc: f64,
    pub solvcut: f64,
    pub tolerance: f64,
    pub closureorder: i64,
    pub ng: String,
    pub solvbox: String,
    pub polardecomp: bool,
    pub rism_verbose: i64,
    pub thermo: String,
    pub asymp_corr: i64,
    pub mdiis_del: f64,
    pub mdiis_restart: f64,
    pub mdiis_nvec: i64,
    pub maxstep: i64,
    pub npropagate: i64,
    pub centering: i64,
    pub entropic_decomp: i64,
    pub pcplus: i64,
    pub uccoeff: String,
    pub tree_dcf: i64,
    pub tree_tcf: i64,
    pub tree_coulomb: i64,
    pub tree_dcf_order: i64,
    pub tree_tcf_order: i64,
    pub tree_coulomb_order: i64,
    pub tree_dcf_n0: i64,
    pub tree_tcf_n0: i64,
    pub tree_coulomb_n0: i64,
    pub tree_dcf_mac: f64,
    pub tree_tcf_mac: f64,
    pub tree_coulomb_mac: f64,
    pub asymp_kspace_tolerance: f64,
    pub lj_tolerance: f64,
}

/// The fully validated run configuration. Built once, immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub general: GeneralOpts,
    pub gb: GbOpts,
    pub pb: PbOpts,
    pub ala: AlaOpts,
    pub nmode: NmodeOpts,
    pub decomp: DecompOpts,
    pub rism: RismOpts,

    pub gbrun: bool,
    pub pbrun: bool,
    pub rismrun: bool,
    pub nmoderun: bool,
    pub alarun: bool,
    pub decomprun: bool,
    pub rismrun_std: bool,
    pub rismrun_gf: bool,

    /// Stability calculation: complex only, no binding delta.
    pub stability: bool,
    /// Suffix of the intermediate trajectories handed to the solvers.
    pub trajectory_suffix: &'static str,
    /// Non-fatal advisories raised during validation, echoed in the report.
    pub warnings: Vec<String>,
}

fn flag(p: &ParsedInput, ns: &str, name: &str) -> Result<bool> {
    match p.int(ns, name) {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(invalid(format!(
            "{} must be set to 0 or 1, not {}",
            name.to_uppercase(),
            other
        ))),
    }
}

impl RunConfig {
    /// Convert, validate, and post-process in one go.
    pub fn build(parsed: &ParsedInput, stability: bool) -> Result<RunConfig> {
        let mut cfg = Self::convert(parsed, stability)?;
        cfg.validate()?;
        cfg.post_process();
        Ok(cfg)
    }

    fn convert(p: &ParsedInput, stability: bool) -> Result<RunConfig> {
        let general = GeneralOpts {
            assign_chain_id: flag(p, "general", "assign_chainID")?,
            debug_printlevel: p.int("general", "debug_printlevel"),
            startframe: p.int("general", "startframe"),
            endframe: p.int("general", "endframe"),
            interval: p.int("general", "interval"),
            qh_entropy: flag(p, "general", "qh_entropy")?,
            interaction_entropy: flag(p, "general", "interaction_entropy")?,
            ie_segment: p.int("general", "ie_segment"),
            c2_entropy: flag(p, "general", "c2_entropy")?,
            c2_segment: p.int("general", "c2_segment"),
            exp_ki: p.float("general", "exp_ki"),
            full_traj: flag(p, "general", "full_traj")?,
            keep_files: p.int("general", "keep_files"),
            forcefields: p.list("general", "forcefields"),
            netcdf: flag(p, "general", "netcdf")?,
            pb_radii: p.int("general", "PBRadii"),
            save_mode: flag(p, "general", "save_mode")?,
            solvated_trajectory: flag(p, "general", "solvated_trajectory")?,
            strip_mask: p.string("general", "strip_mask"),
            sys_name: p.string("general", "sys_name"),
            temperature: p.float("general", "temperature"),
            use_sander: flag(p, "general", "use_sander")?,
            verbose: p.int("general", "verbose"),
        };
        let gb = GbOpts {
            igb: p.int("gb", "igb"),
            extdiel: p.float("gb", "extdiel"),
            saltcon: p.float("gb", "saltcon"),
            surften: p.float("gb", "surften"),
            rgbmax: p.float("gb", "rgbmax"),
            intdiel: p.float("gb", "intdiel"),
            ifqnt: flag(p, "gb", "ifqnt")?,
            qm_theory: p.string("gb", "qm_theory"),
            qm_residues: p.string("gb", "qm_residues"),
            qmcharge_com: p.int("gb", "qmcharge_com"),
            qmcharge_rec: p.int("gb", "qmcharge_rec"),
            qmcharge_lig: p.int("gb", "qmcharge_lig"),
            qmcut: p.float("gb", "qmcut"),
            surfoff: p.float("gb", "surfoff"),
            molsurf: flag(p, "gb", "molsurf")?,
            msoffset: p.float("gb", "msoffset"),
            probe: p.float("gb", "probe"),
        };
        let pb = PbOpts {
            ntb: p.int("pb", "ntb"),
            cut: p.float("pb", "cut"),
            nsnb: p.int("pb", "nsnb"),
            imin: p.int("pb", "imin"),
            maxcyc: p.int("pb", "maxcyc"),
            ioutfm: p.int("pb", "ioutfm"),
            ntx: p.int("pb", "ntx"),
            inp: p.int("pb", "inp"),
            smoothopt: p.int("pb", "smoothopt"),
            radiopt: p.int("pb", "radiopt"),
            npbopt: p.int("pb", "npbopt"),
            solvopt: p.int("pb", "solvopt"),
            linit: p.int("pb", "linit"),
            nfocus: p.int("pb", "nfocus"),
            fscale: p.int("pb", "fscale"),
            indi: p.float("pb", "indi"),
            exdi: p.float("pb", "exdi"),
            istrng: p.float("pb", "istrng"),
            prbrad: p.float("pb", "prbrad"),
            iprob: p.float("pb", "iprob"),
            accept: p.float("pb", "accept"),
            fillratio: p.float("pb", "fillratio"),
            scale: p.float("pb", "scale"),
            bcopt: p.int("pb", "bcopt"),
            eneopt: p.int("pb", "eneopt"),
            cutnb: p.float("pb", "cutnb"),
            sprob: p.float("pb", "sprob"),
            cavity_surften: p.float("pb", "cavity_surften"),
            cavity_offset: p.float("pb", "cavity_offset"),
            emem: p.float("pb", "emem"),
            memopt: p.int("pb", "memopt"),
            sasopt: p.int("pb", "sasopt"),
            mthick: p.float("pb", "mthick"),
            mctrdz: p.float("pb", "mctrdz"),
            maxarcdot: p.int("pb", "maxarcdot"),
            poretype: p.int("pb", "poretype"),
            npbverb: p.int("pb", "npbverb"),
            frcopt: p.int("pb", "frcopt"),
            cutfd: p.float("pb", "cutfd"),
            ipb: p.int("pb", "ipb"),
            sander_apbs: flag(p, "pb", "sander_apbs")?,
            pbtemp: p.float("pb", "pbtemp"),
            arcres: p.float("pb", "arcres"),
            mprob: p.float("pb", "mprob"),
            nbuffer: p.float("pb", "nbuffer"),
            npbgrid: p.int("pb", "npbgrid"),
            scalec: p.int("pb", "scalec"),
            nsnba: p.int("pb", "nsnba"),
            phiout: p.int("pb", "phiout"),
            phiform: p.int("pb", "phiform"),
            decompopt: p.int("pb", "decompopt"),
            use_rmin: p.int("pb", "use_rmin"),
            vprob: p.float("pb", "vprob"),
            rhow_effect: p.float("pb", "rhow_effect"),
            use_sav: p.int("pb", "use_sav"),
            maxsph: p.int("pb", "maxsph"),
        };
        let ala = AlaOpts {
            mutant_only: flag(p, "ala", "mutant_only")?,
            mutant: Mutation::parse(&p.string("ala", "mutant"))?,
            mutant_res: p.string("ala", "mutant_res"),
            cas_intdiel: flag(p, "ala", "cas_intdiel")?,
            intdiel_nonpolar: p.int("ala", "intdiel_nonpolar"),
            intdiel_polar: p.int("ala", "intdiel_polar"),
            intdiel_positive: p.int("ala", "intdiel_positive"),
            intdiel_negative: p.int("ala", "intdiel_negative"),
        };
        let nmode = NmodeOpts {
            dielc: p.float("nmode", "dielc"),
            drms: p.float("nmode", "drms"),
            maxcyc: p.int("nmode", "maxcyc"),
            nminterval: p.int("nmode", "nminterval"),
            nmstartframe: p.int("nmode", "nmstartframe"),
            nmendframe: p.int("nmode", "nmendframe"),
            nmode_igb: p.int("nmode", "nmode_igb"),
            nmode_istrng: p.float("nmode", "nmode_istrng"),
        };
        let decomp = DecompOpts {
            csv_format: flag(p, "decomp", "csv_format")?,
            dec_verbose: p.int("decomp", "dec_verbose"),
            idecomp: p.int("decomp", "idecomp"),
            print_res: p.string("decomp", "print_res"),
        };
        let rism = RismOpts {
            closure: p.string("rism", "closure").to_ascii_lowercase(),
            buffer: p.float("rism", "buffer"),
            grdspc: p.float("rism", "grdspc"),
            solvcut: p.float("rism", "solvcut"),
            tolerance: p.float("rism", "tolerance"),
            closureorder: p.int("rism", "closureorder"),
            ng: p.string("rism", "ng"),
            solvbox: p.string("rism", "solvbox"),
            polardecomp: flag(p, "rism", "polardecomp")?,
            rism_verbose: p.int("rism", "rism_verbose"),
            thermo: p.string("rism", "thermo").to_ascii_lowercase(),
            asymp_corr: p.int("rism", "asympCorr"),
            mdiis_del: p.float("rism", "mdiis_del"),
            mdiis_restart: p.float("rism", "mdiis_restart"),
            mdiis_nvec: p.int("rism", "mdiis_nvec"),
            maxstep: p.int("rism", "maxstep"),
            npropagate: p.int("rism", "npropagate"),
            centering: p.int("rism", "centering"),
            entropic_decomp: p.int("rism", "entropicDecomp"),
            pcplus: p.int("rism", "pc+"),
            uccoeff: p.string("rism", "uccoeff"),
            tree_dcf: p.int("rism", "treeDCF"),
            tree_tcf: p.int("rism", "treeTCF"),
            tree_coulomb: p.int("rism", "treeCoulomb"),
            tree_dcf_order: p.int("rism", "treeDCFOrder"),
            tree_tcf_order: p.int("rism", "treeTCFOrder"),
            tree_coulomb_order: p.int("rism", "treeCoulombOrder"),
            tree_dcf_n0: p.int("rism", "treeDCFN0"),
            tree_tcf_n0: p.int("rism", "treeTCFN0"),
            tree_coulomb_n0: p.int("rism", "treeCoulombN0"),
            tree_dcf_mac: p.float("rism", "treeDCFMAC"),
            tree_tcf_mac: p.float("rism", "treeTCFMAC"),
            tree_coulomb_mac: p.float("rism", "treeCoulombMAC"),
            asymp_kspace_tolerance: p.float("rism", "asympKSpaceTolerance"),
            lj_tolerance: p.float("rism", "ljTolerance"),
        };

        let gbrun = p.triggered.contains("gb");
        let pbrun = p.triggered.contains("pb");
        let rismrun = p.triggered.contains("rism");
        let nmoderun = p.triggered.contains("nmode");
        let alarun = p.triggered.contains("ala");
        let decomprun = p.triggered.contains("decomp");

        Ok(RunConfig {
            general,
            gb,
            pb,
            ala,
            nmode,
            decomp,
            rism,
            gbrun,
            pbrun,
            rismrun,
            nmoderun,
            alarun,
            decomprun,
            rismrun_std: false,
            rismrun_gf: false,
            stability,
            trajectory_suffix: "mdcrd",
            warnings: Vec::new(),
        })
    }

    fn warn(&mut self, msg: String) {
        warn!("{}", msg);
        self.warnings.push(msg);
    }

    fn validate(&mut self) -> Result<()> {
        if ![1, 2, 5, 7, 8].contains(&self.gb.igb) {
            return Err(invalid(format!(
                "invalid value for IGB ({}); it must be 1, 2, 5, 7, or 8",
                self.gb.igb
            )));
        }
        if self.gb.saltcon < 0.0 {
            return Err(invalid("SALTCON must be non-negative"));
        }
        if self.gb.surften < 0.0 {
            return Err(invalid("SURFTEN must be non-negative"));
        }
        if self.pb.indi < 0.0 {
            return Err(invalid("INDI must be non-negative"));
        }
        if self.pb.exdi < 0.0 {
            return Err(invalid("EXDI must be non-negative"));
        }
        if self.pb.scale <= 0.0 {
            return Err(invalid("SCALE must be positive"));
        }
        if self.pb.linit < 0 {
            return Err(invalid("LINIT must be a positive integer"));
        }
        if self.pb.prbrad != 1.4 && self.pb.prbrad != 1.6 {
            return Err(invalid(format!(
                "PRBRAD ({}) must be 1.4 or 1.6",
                self.pb.prbrad
            )));
        }
        if self.pb.istrng < 0.0 {
            return Err(invalid("ISTRNG must be non-negative"));
        }
        if ![0, 1, 2].contains(&self.pb.inp) {
            return Err(invalid(format!("INP ({}) must be 0, 1, or 2", self.pb.inp)));
        }
        if self.pb.cavity_surften < 0.0 {
            return Err(invalid("CAVITY_SURFTEN must be non-negative"));
        }
        if self.pb.fillratio <= 0.0 {
            return Err(invalid("FILLRATIO must be positive"));
        }
        if ![0, 1].contains(&self.pb.radiopt) {
            return Err(invalid(format!(
                "RADIOPT ({}) must be 0 or 1",
                self.pb.radiopt
            )));
        }
        if self.pb.maxcyc < 1 {
            return Err(invalid("MAXCYC must be a positive integer"));
        }
        if self.nmode.dielc <= 0.0 {
            return Err(invalid("DIELC must be positive"));
        }
        if self.nmode.maxcyc < 1 {
            return Err(invalid("nmode MAXCYC must be a positive integer"));
        }
        if ![0, 1, 2, 3, 4].contains(&self.decomp.idecomp) {
            return Err(invalid(format!(
                "IDECOMP ({}) must be 1, 2, 3, or 4",
                self.decomp.idecomp
            )));
        }
        if self.decomp.idecomp != 0 && self.pb.sander_apbs {
            return Err(invalid("IDECOMP cannot be used with sander.APBS"));
        }
        if self.alarun && self.general.netcdf {
            return Err(invalid(
                "alanine scanning is incompatible with NetCDF intermediates",
            ));
        }
        if self.decomprun && self.decomp.idecomp == 0 {
            return Err(invalid("IDECOMP cannot be 0 for decomposition analysis"));
        }
        if ![1, 2, 3, 4].contains(&self.general.pb_radii) {
            return Err(invalid("PBRadii must be 1, 2, 3 or 4"));
        }
        if self.gb.ifqnt {
            if !QM_THEORIES.contains(&self.gb.qm_theory.as_str()) {
                return Err(invalid(format!(
                    "invalid QM_THEORY ({}); see the solver manual for allowable options",
                    self.gb.qm_theory
                )));
            }
            if self.gb.qm_residues.is_empty() {
                return Err(invalid("QM_RESIDUES must be specified for IFQNT = 1"));
            }
            if self.decomprun {
                return Err(invalid("QM/MM and decomposition are incompatible"));
            }
            if self.gb.qmcharge_lig + self.gb.qmcharge_rec != self.gb.qmcharge_com
                && !self.stability
            {
                return Err(invalid(
                    "the total charge of the ligand and receptor does not equal \
                     the charge of the complex",
                ));
            }
        }
        if self.rismrun {
            if !(0..=2).contains(&self.rism.rism_verbose) {
                return Err(invalid("RISM_VERBOSE must be 0, 1, or 2"));
            }
            if self.rism.buffer < 0.0 && self.rism.solvcut < 0.0 {
                return Err(invalid("if BUFFER < 0, SOLVCUT must be > 0"));
            }
            if self.rism.tolerance <= 0.0 {
                return Err(invalid("TOLERANCE must be positive"));
            }
            if self.rism.buffer < 0.0 && self.rism.ng.is_empty() {
                return Err(invalid("NG must be specified if BUFFER < 0"));
            }
            if self.rism.closure == "pse" && self.rism.closureorder < 1 {
                return Err(invalid("CLOSUREORDER must be specified if CLOSURE=pse"));
            }
            if !["std", "gf", "both"].contains(&self.rism.thermo.as_str()) {
                return Err(invalid("THERMO must be \"std\", \"gf\", or \"both\""));
            }
        }
        if !(self.gbrun
            || self.pbrun
            || self.rismrun
            || self.nmoderun
            || self.general.qh_entropy)
        {
            return Err(invalid("you did not specify any type of calculation"));
        }
        if self.decomprun && !(self.gbrun || self.pbrun) {
            return Err(invalid("DECOMP must be run with either GB or PB"));
        }
        if !(1..=100).contains(&self.general.ie_segment) {
            return Err(invalid("IE_SEGMENT must be between 1 and 100"));
        }
        if !(1..=100).contains(&self.general.c2_segment) {
            return Err(invalid("C2_SEGMENT must be between 1 and 100"));
        }
        if self.general.interval < 1 {
            return Err(invalid("INTERVAL must be a positive integer"));
        }

        // Non-fatal advisories
        if !self.gb.molsurf && (self.gb.msoffset != 0.0 || self.gb.probe != 1.4) {
            self.warn("msoffset and probe are molsurf-only options".to_string());
        }
        if self.gb.intdiel > 10.0 {
            self.warn(format!(
                "INTDIEL is greater than 10 ({}); check your input",
                self.gb.intdiel
            ));
        }
        if self.general.startframe < 1 {
            let msg = format!(
                "the startframe variable must be >= 1; changing startframe from {} to 1",
                self.general.startframe
            );
            self.warn(msg);
            self.general.startframe = 1;
        }
        if self.nmode.nmstartframe < 1 {
            let msg = format!(
                "the nmstartframe variable must be >= 1; changing nmstartframe from {} to 1",
                self.nmode.nmstartframe
            );
            self.warn(msg);
            self.nmode.nmstartframe = 1;
        }
        if self.general.endframe < self.general.startframe {
            return Err(invalid(format!(
                "ENDFRAME ({}) must not precede STARTFRAME ({})",
                self.general.endframe, self.general.startframe
            )));
        }
        Ok(())
    }

    /// Constraints that only apply once the topology builder has told us
    /// the complex came out of a CHARMM conversion.
    pub fn apply_chamber_constraints(&mut self) -> Result<()> {
        if self.rismrun {
            return Err(invalid("CHAMBER topologies cannot be used with 3D-RISM"));
        }
        if self.nmoderun {
            return Err(invalid(
                "CHAMBER topologies cannot be used with normal mode analysis",
            ));
        }
        self.general.use_sander = true;
        Ok(())
    }

    fn post_process(&mut self) {
        // The deck writer wants the grid spacing, not its reciprocal.
        self.pb.scale = 1.0 / self.pb.scale;

        self.trajectory_suffix = if self.general.netcdf { "nc" } else { "mdcrd" };

        if self.rism.solvcut < 0.0 {
            self.rism.solvcut = self.rism.buffer;
        }
        self.rismrun_std = self.rismrun && matches!(self.rism.thermo.as_str(), "std" | "both");
        self.rismrun_gf = self.rismrun && matches!(self.rism.thermo.as_str(), "gf" | "both");

        // A dielectric other than vacuum needs the full solver.
        if self.gb.intdiel > 1.0 {
            self.general.use_sander = true;
        }

        // Nothing cancels in a stability run, so print every term.
        if self.stability {
            self.general.verbose = 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::namelist::ParsedInput;

    fn build(text: &str) -> Result<RunConfig> {
        let parsed = ParsedInput::from_str(text).expect("input text parses");
        RunConfig::build(&parsed, false)
    }

    #[test]
    fn minimal_gb_run() {
        let cfg = build("&general\n startframe=1, endframe=10, interval=1\n/\n&gb\n igb=5\n/\n")
            .unwrap();
        assert!(cfg.gbrun);
        assert!(!cfg.pbrun && !cfg.rismrun && !cfg.nmoderun);
        assert_eq!(cfg.general.endframe, 10);
        assert_eq!(cfg.trajectory_suffix, "mdcrd");
    }

    #[test]
    fn no_calculation_is_an_error() {
        let err = build("&general\n startframe=1\n/\n").unwrap_err();
        assert!(err.to_string().contains("any type of calculation"), "{err}");
    }

    #[test]
    fn scale_is_stored_inverted() {
        let cfg = build("&pb\n scale = 2.0\n/\n").unwrap();
        assert!((cfg.pb.scale * 2.0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn thermo_enables_both_rism_flavors() {
        let cfg = build("&rism\n thermo = BOTH\n/\n").unwrap();
        assert!(cfg.rismrun && cfg.rismrun_std && cfg.rismrun_gf);
        let cfg = build("&rism\n thermo = gf\n/\n").unwrap();
        assert!(cfg.rismrun_gf && !cfg.rismrun_std);
        let cfg = build("&rism\n/\n").unwrap();
        assert!(cfg.rismrun_std && !cfg.rismrun_gf);
    }

    #[test]
    fn decomp_requires_gb_or_pb() {
        let err = build("&rism\n/\n&decomp\n idecomp = 1\n/\n").unwrap_err();
        assert!(err.to_string().contains("GB or PB"), "{err}");
    }

    #[test]
    fn decomp_requires_nonzero_idecomp() {
        let err = build("&gb\n/\n&decomp\n/\n").unwrap_err();
        assert!(err.to_string().contains("IDECOMP"), "{err}");
    }

    #[test]
    fn alanine_scanning_rejects_netcdf() {
        let err =
            build("&general\n netcdf = 1\n/\n&gb\n/\n&ala\n mutant_res = \"A/35\"\n/\n")
                .unwrap_err();
        assert!(err.to_string().contains("NetCDF"), "{err}");
    }

    #[test]
    fn mutant_must_be_ala_or_gly() {
        let err = build("&gb\n/\n&ala\n mutant = TRP\n/\n").unwrap_err();
        assert!(err.to_string().contains("ALA"), "{err}");
        let cfg = build("&gb\n/\n&ala\n mutant = g\n/\n").unwrap();
        assert_eq!(cfg.ala.mutant, Mutation::Glycine);
    }

    #[test]
    fn qmmm_charges_must_balance() {
        let text = "&gb\n ifqnt=1, qm_theory=PM3, qm_residues=\"A/35\",\n \
                    qmcharge_com=1, qmcharge_rec=0, qmcharge_lig=0\n/\n";
        let err = build(text).unwrap_err();
        assert!(err.to_string().contains("charge"), "{err}");
        // a stability run skips the balance check
        let parsed = ParsedInput::from_str(text).unwrap();
        assert!(RunConfig::build(&parsed, true).is_ok());
    }

    #[test]
    fn startframe_below_one_is_clamped_with_warning() {
        let cfg = build("&general\n startframe = 0, endframe = 5\n/\n&gb\n/\n").unwrap();
        assert_eq!(cfg.general.startframe, 1);
        assert!(cfg.warnings.iter().any(|w| w.contains("startframe")));
    }

    #[test]
    fn stability_forces_full_verbosity() {
        let parsed = ParsedInput::from_str("&gb\n/\n").unwrap();
        let cfg = RunConfig::build(&parsed, true).unwrap();
        assert_eq!(cfg.general.verbose, 2);
    }

    #[test]
    fn intdiel_forces_sander() {
        let cfg = build("&gb\n intdiel = 4.0\n/\n").unwrap();
        assert!(cfg.general.use_sander);
    }

    #[test]
    fn idecomp_conflicts_with_apbs() {
        let err = build("&gb\n/\n&pb\n sander_apbs = 1\n/\n&decomp\n idecomp = 1\n/\n")
            .unwrap_err();
        assert!(err.to_string().contains("APBS"), "{err}");
    }
}

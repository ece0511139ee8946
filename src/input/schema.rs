//! The variable registry backing the namelist input format.
//!
//! Every namespace (`&general`, `&gb`, ...) declares a closed vocabulary of
//! typed variables. The registry is built once at startup; variable name
//! matching in the parser is a scan over these tables, with the minimum
//! unambiguous prefix length for each variable precomputed here.

use std::fmt;

/// Default Amber mask stripped from solvated topologies.
pub static DEFAULT_STRIP_MASK: &str = ":WAT,Cl*,CIO,Cs+,IB,K*,Li+,MG*,Na+,Rb+,CS,RB,NA,F,CL";

/// Fewest characters a user token needs before prefix matching kicks in,
/// unless the canonical name itself is shorter.
pub const MIN_CHARS_TO_MATCH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Int,
    Float,
    Str,
    List,
}

impl VarKind {
    pub fn label(self) -> &'static str {
        match self {
            VarKind::Int => "integer",
            VarKind::Float => "float",
            VarKind::Str => "string",
            VarKind::List => "list",
        }
    }
}

/// A parsed (or default) value for one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Int(v) => write!(f, "{}", v),
            VarValue::Float(v) => write!(f, "{}", v),
            VarValue::Str(v) => write!(f, "\"{}\"", v),
            VarValue::List(v) => write!(f, "\"{}\"", v.join(", ")),
        }
    }
}

/// One entry of a namespace vocabulary.
#[derive(Debug, Clone)]
pub struct VarSpec {
    pub name: &'static str,
    pub kind: VarKind,
    pub default: VarValue,
    pub description: &'static str,
    /// Minimum token length for prefix matching, computed against the other
    /// names in the same namespace so no prefix of this length is shared.
    pub min_match: usize,
}

/// A namespace block (`&name ... /`) and its vocabulary.
#[derive(Debug, Clone)]
pub struct NamespaceSpec {
    /// Short key used throughout the pipeline (`gb`, `ala`, ...).
    pub key: &'static str,
    /// Full name accepted in the input file (`alanine_scanning`, ...).
    pub full_name: &'static str,
    pub vars: Vec<VarSpec>,
}

impl NamespaceSpec {
    /// Namespace names match on a case-insensitive prefix of at least three
    /// characters (spaces already normalized to underscores by the parser).
    pub fn matches(&self, token: &str) -> bool {
        let token = token.to_ascii_lowercase();
        token.len() >= 3.min(self.full_name.len())
            && self.full_name.to_ascii_lowercase().starts_with(&token)
    }

    pub fn var(&self, name: &str) -> Option<&VarSpec> {
        self.vars.iter().find(|v| v.name == name)
    }
}

/// The whole input vocabulary, namespaces in declaration order.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub namespaces: Vec<NamespaceSpec>,
}

impl InputSpec {
    pub fn namespace(&self, key: &str) -> Option<&NamespaceSpec> {
        self.namespaces.iter().find(|n| n.key == key)
    }

    /// Resolve a namespace token from the input file to its short key.
    pub fn resolve_namespace(&self, token: &str) -> Option<&NamespaceSpec> {
        let token = token.replace(' ', "_");
        self.namespaces.iter().find(|n| n.matches(&token))
    }
}

struct NsBuilder {
    key: &'static str,
    full_name: &'static str,
    vars: Vec<VarSpec>,
}

impl NsBuilder {
    fn new(key: &'static str, full_name: &'static str) -> Self {
        NsBuilder {
            key,
            full_name,
            vars: Vec::new(),
        }
    }

    fn int(mut self, name: &'static str, default: i64, description: &'static str) -> Self {
        self.vars.push(VarSpec {
            name,
            kind: VarKind::Int,
            default: VarValue::Int(default),
            description,
            min_match: MIN_CHARS_TO_MATCH,
        });
        self
    }

    fn float(mut self, name: &'static str, default: f64, description: &'static str) -> Self {
        self.vars.push(VarSpec {
            name,
            kind: VarKind::Float,
            default: VarValue::Float(default),
            description,
            min_match: MIN_CHARS_TO_MATCH,
        });
        self
    }

    fn string(mut self, name: &'static str, default: &str, description: &'static str) -> Self {
        self.vars.push(VarSpec {
            name,
            kind: VarKind::Str,
            default: VarValue::Str(default.to_string()),
            description,
            min_match: MIN_CHARS_TO_MATCH,
        });
        self
    }

    fn list(mut self, name: &'static str, default: &str, description: &'static str) -> Self {
        let items = crate::input::namelist::split_list(default);
        self.vars.push(VarSpec {
            name,
            kind: VarKind::List,
            default: VarValue::List(items),
            description,
            min_match: MIN_CHARS_TO_MATCH,
        });
        self
    }

    /// Compute the per-variable minimum unambiguous prefix lengths, then
    /// freeze the namespace.
    fn finish(mut self) -> NamespaceSpec {
        let names: Vec<String> = self
            .vars
            .iter()
            .map(|v| v.name.to_ascii_lowercase())
            .collect();
        for (i, var) in self.vars.iter_mut().enumerate() {
            let mut need = MIN_CHARS_TO_MATCH;
            for (j, other) in names.iter().enumerate() {
                if i == j {
                    continue;
                }
                let me = &names[i];
                let shared = me
                    .bytes()
                    .zip(other.bytes())
                    .take_while(|(a, b)| a == b)
                    .count();
                if shared == me.len() {
                    // `me` is a prefix of (or equal to) `other`: only the
                    // exact name selects it unambiguously.
                    need = need.max(me.len());
                } else if shared == other.len() {
                    // `other` is a prefix of `me`; one extra character past
                    // the shared run disambiguates.
                    need = need.max(other.len() + 1);
                } else {
                    need = need.max(shared + 1);
                }
            }
            var.min_match = need.min(var.name.len());
        }
        NamespaceSpec {
            key: self.key,
            full_name: self.full_name,
            vars: self.vars,
        }
    }
}

/// Build the full input vocabulary. Mirrors the documented namelist
/// inventory; defaults are the documented defaults.
pub fn input_spec() -> InputSpec {
    let general = NsBuilder::new("general", "general")
        .int("assign_chainID", 0, "Assign chains ID")
        .int("debug_printlevel", 0, "Increase debugging info printed")
        .int("endframe", 9999999, "Last frame to analyze")
        .int("qh_entropy", 0, "Do quasi-harmonic calculation")
        .int("interaction_entropy", 0, "Do Interaction Entropy calculation")
        .int(
            "ie_segment",
            25,
            "Trajectory segment to calculate interaction entropy",
        )
        .int("c2_entropy", 0, "Do C2 Entropy calculation")
        .int("c2_segment", 25, "Trajectory segment to calculate c2 entropy")
        .float("exp_ki", 0.0, "Experimental Ki in nM")
        .int(
            "full_traj",
            0,
            "Print a full traj. AND the thread trajectories",
        )
        .int("interval", 1, "Number of frames between adjacent frames analyzed")
        .int(
            "keep_files",
            2,
            "How many files to keep after successful completion",
        )
        .list(
            "forcefields",
            "oldff/leaprc.ff99SB, leaprc.gaff",
            "Force fields used to build the topologies",
        )
        .int("netcdf", 0, "Use NetCDF intermediate trajectories")
        .int("PBRadii", 3, "Radii set used when building the topologies")
        .int(
            "solvated_trajectory",
            1,
            "Define if it is necessary to cleanup the trajectories",
        )
        .int("save_mode", 1, "Write the structured results archive")
        .int("startframe", 1, "First frame to analyze")
        .string(
            "strip_mask",
            DEFAULT_STRIP_MASK,
            "Amber mask to strip from solvated topologies",
        )
        .string("sys_name", "", "System name")
        .float(
            "temperature",
            298.15,
            "Temperature (K) for entropy and Ki conversions",
        )
        .int("use_sander", 0, "Use sander to compute energies")
        .int("verbose", 1, "How many energy terms to print in the final output")
        .finish();

    let gb = NsBuilder::new("gb", "gb")
        .int("igb", 5, "GB model to use")
        .float("extdiel", 78.3, "External dielectric constant")
        .float("saltcon", 0.0, "Salt concentration (M)")
        .float("surften", 0.0072, "Surface tension")
        .float(
            "rgbmax",
            999.0,
            "Distance cutoff in Angstroms for effective GB radii",
        )
        .float("intdiel", 1.0, "Internal dielectric constant")
        .int("ifqnt", 0, "Use QM on part of the system")
        .string("qm_theory", "", "Semi-empirical QM theory to use")
        .string("qm_residues", "", "Residues to treat with QM")
        .int("qmcharge_com", 0, "Charge of QM region in complex")
        .int("qmcharge_lig", 0, "Charge of QM region in ligand")
        .int("qmcharge_rec", 0, "Charge of QM region in receptor")
        .float("qmcut", 9999.0, "Cutoff in the QM region")
        .float("surfoff", 0.0, "Surface tension offset")
        .int("molsurf", 0, "Use Connolly surfaces via the molsurf program")
        .float("msoffset", 0.0, "Offset for molsurf calculation")
        .float("probe", 1.4, "Solvent probe radius for surface area calc")
        .finish();

    let pb = NsBuilder::new("pb", "pb")
        .int("ntb", 0, "Apply PBC conditions?")
        .float("cut", 999.0, "Nonbonded cutoff in Angstroms")
        .int("nsnb", 99999, "Frequency of nonbonded list updates")
        .int("imin", 5, "Trajectory post-processing mode")
        .int("maxcyc", 1, "Maximum number of minimization cycles")
        .int("ioutfm", 0, "Format of coordinate trajectory files")
        .int("ntx", 1, "How initial coordinates are read")
        .int("inp", 2, "Nonpolar solvation method")
        .int(
            "smoothopt",
            1,
            "Dielectric smoothing at the solute/solvent boundary",
        )
        .int("radiopt", 1, "Use optimized radii?")
        .int("npbopt", 0, "Use NonLinear PB solver?")
        .int("solvopt", 1, "Select iterative solver")
        .int("linit", 1000, "Number of SCF iterations")
        .int("nfocus", 2, "Electrostatic focusing calculation")
        .int("fscale", 8, "Ratio between coarse and fine grid spacings")
        .float("indi", 1.0, "Internal dielectric constant")
        .float("exdi", 80.0, "External dielectric constant")
        .float("istrng", 0.0, "Ionic strength (M)")
        .float("prbrad", 1.4, "Probe radius")
        .float("iprob", 2.0, "Mobile ion probe radius for the Stern layer")
        .float("accept", 0.001, "Iteration convergence criterion")
        .float("fillratio", 4.0, "Ratio between grid size and solute size")
        .float("scale", 2.0, "1/scale = grid spacing for the solver")
        .int("bcopt", 5, "Boundary condition option")
        .int("eneopt", 2, "Compute electrostatic energy and forces")
        .float("cutnb", 0.0, "Cutoff for nonbonded interactions")
        .float(
            "sprob",
            0.557,
            "Solvent probe radius for the dispersion-term SASA",
        )
        .float("cavity_surften", 0.0378, "Surface tension")
        .float("cavity_offset", -0.5692, "Offset for nonpolar solvation calc")
        .float("emem", 1.0, "Membrane dielectric constant")
        .int("memopt", 0, "Use PB optimization for membrane")
        .int("sasopt", 0, "Molecular surface in PB implicit model")
        .float("mthick", 40.0, "Membrane thickness")
        .float("mctrdz", 0.0, "Distance to offset membrane in Z direction")
        .int("maxarcdot", 1500, "Number of dots used to store arc dots per atom")
        .int("poretype", 1, "Use exclusion region for channel proteins")
        .int("npbverb", 0, "Option to turn on verbose mode")
        .int("frcopt", 0, "Output for computing electrostatic forces")
        .float("cutfd", 5.0, "Cutoff for finite-difference interactions")
        .int("ipb", 2, "Dielectric model for PB")
        .int("sander_apbs", 0, "Use sander.APBS?")
        .float("pbtemp", 300.0, "Temperature (K) used for the PB equation")
        .float("arcres", 0.25, "Resolution (A) of solvent accessible arcs")
        .float("mprob", 2.70, "Membrane probe radius in A")
        .float("nbuffer", 0.0, "Grid-unit gap between grid boundary and solute")
        .int("npbgrid", 1, "How often the finite-difference grid is regenerated")
        .int("scalec", 0, "Compute reaction field energy and forces")
        .int("nsnba", 1, "How often the atom-based pairlist is generated")
        .int("phiout", 0, "Output the electrostatic potential map?")
        .int("phiform", 0, "Format of the electrostatic potential file")
        .int("decompopt", 2, "Decomposition scheme when INP = 2")
        .int("use_rmin", 1, "How van der Waals radii are set up")
        .float("vprob", 1.300, "Solvent probe radius for molecular volume")
        .float("rhow_effect", 1.129, "Effective water density for dispersion")
        .int("use_sav", 1, "Use molecular volume or surface for the cavity term")
        .int("maxsph", 400, "Dots representing the maximum atomic surface")
        .finish();

    let ala = NsBuilder::new("ala", "alanine_scanning")
        .int("mutant_only", 0, "Only compute mutant energies")
        .string("mutant", "ALA", "Mutate to Alanine or Glycine")
        .string("mutant_res", "", "Which residue will be mutated")
        .int(
            "cas_intdiel",
            0,
            "Pick intdiel from the class of the mutated residue",
        )
        .int("intdiel_nonpolar", 1, "intdiel for nonpolar residues")
        .int("intdiel_polar", 3, "intdiel for polar residues")
        .int("intdiel_positive", 5, "intdiel for positively charged residues")
        .int("intdiel_negative", 5, "intdiel for negatively charged residues")
        .finish();

    let nmode = NsBuilder::new("nmode", "nmode")
        .float("dielc", 1.0, "Dielectric constant")
        .float("drms", 0.001, "Minimization gradient cutoff")
        .int("maxcyc", 10000, "Maximum number of minimization cycles")
        .int("nminterval", 1, "Interval between normal-mode snapshots")
        .int("nmendframe", 1000000, "Last frame to analyze for normal modes")
        .int("nmode_igb", 1, "GB model for the normal mode calculation")
        .float("nmode_istrng", 0.0, "Ionic strength for the GB model (M)")
        .int("nmstartframe", 1, "First frame to analyze for normal modes")
        .finish();

    let decomp = NsBuilder::new("decomp", "decomposition")
        .int("csv_format", 1, "Write decomposition data in CSV format")
        .int("dec_verbose", 0, "Which energy terms are printed to the output")
        .int("idecomp", 0, "Which type of decomposition analysis to do")
        .string(
            "print_res",
            "within 6",
            "Which residues to print decomposition data for",
        )
        .finish();

    let rism = NsBuilder::new("rism", "rism")
        .string("closure", "kh", "Closure equation to use")
        .float("buffer", 14.0, "Distance between solute and edge of grid")
        .float("grdspc", 0.5, "Grid spacing")
        .float("solvcut", -1.0, "Cutoff of the box (negative: use buffer)")
        .float("tolerance", 1.0e-5, "Convergence tolerance")
        .int("closureorder", 1, "Order of closure if PSE")
        .string("ng", "-1,-1,-1", "Number of grid points")
        .string("solvbox", "-1,-1,-1", "Box limits")
        .int(
            "polardecomp",
            0,
            "Break solvation energy into polar and nonpolar terms",
        )
        .int("rism_verbose", 0, "How much 3D-RISM info to print")
        .string("thermo", "std", "Type of thermodynamic analysis to do")
        .int("asympCorr", 1, "Long range asymptotic corrections")
        .float("mdiis_del", 0.7, "MDIIS step size")
        .float("mdiis_restart", 10.0, "MDIIS restart threshold")
        .int("mdiis_nvec", 5, "Previous iterations MDIIS uses")
        .int("maxstep", 10000, "Maximum iterative steps per solution")
        .int("npropagate", 5, "Previous solutions used in prediction")
        .int("centering", 1, "How the solute is centered in the solvent box")
        .int(
            "entropicDecomp",
            0,
            "Decompose solvation free energy into energy and entropy",
        )
        .int("pc+", 0, "Compute the PC+/3D-RISM excess chemical potential")
        .string(
            "uccoeff",
            "0.0,0.0,0.0,0.0",
            "UC excess chemical potential coefficients",
        )
        .int("treeDCF", 1, "Treecode approximation for the DCF correction")
        .int("treeTCF", 1, "Treecode approximation for the TCF correction")
        .int("treeCoulomb", 0, "Treecode approximation for Coulomb energy")
        .int("treeDCFOrder", 2, "Treecode Taylor order for the DCF correction")
        .int("treeTCFOrder", 2, "Treecode Taylor order for the TCF correction")
        .int("treeCoulombOrder", 2, "Treecode Taylor order for Coulomb energy")
        .int("treeDCFN0", 500, "Treecode leaf size for the DCF correction")
        .int("treeTCFN0", 500, "Treecode leaf size for the TCF correction")
        .int("treeCoulombN0", 500, "Treecode leaf size for Coulomb energy")
        .float("treeDCFMAC", 0.1, "Treecode acceptance for the DCF correction")
        .float("treeTCFMAC", 0.1, "Treecode acceptance for the TCF correction")
        .float("treeCoulombMAC", 0.1, "Treecode acceptance for Coulomb energy")
        .float(
            "asympKSpaceTolerance",
            -1.0,
            "Reciprocal-space asymptotics cutoff accuracy",
        )
        .float("ljTolerance", -1.0, "Lennard-Jones cutoff accuracy")
        .finish();

    InputSpec {
        namespaces: vec![general, gb, pb, ala, nmode, decomp, rism],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_match_floors_at_four_without_conflicts() {
        let spec = input_spec();
        let general = spec.namespace("general").unwrap();
        let endframe = general.var("endframe").unwrap();
        assert_eq!(endframe.min_match, 4);
    }

    #[test]
    fn min_match_grows_on_shared_prefixes() {
        let spec = input_spec();
        let general = spec.namespace("general").unwrap();
        // interval vs interaction_entropy share "inter"
        let interval = general.var("interval").unwrap();
        assert!(interval.min_match >= 6, "got {}", interval.min_match);
        // names shorter than the floor are capped at their own length
        let gb = spec.namespace("gb").unwrap();
        let igb = gb.var("igb").unwrap();
        assert_eq!(igb.min_match, 3);
    }

    #[test]
    fn substring_names_require_exact_match() {
        let spec = input_spec();
        let ala = spec.namespace("ala").unwrap();
        // mutant is a prefix of mutant_res and mutant_only
        let mutant = ala.var("mutant").unwrap();
        assert_eq!(mutant.min_match, "mutant".len());
        let mutant_res = ala.var("mutant_res").unwrap();
        assert!(mutant_res.min_match >= "mutant".len() + 1);
    }

    #[test]
    fn namespace_prefix_resolution() {
        let spec = input_spec();
        assert_eq!(spec.resolve_namespace("ala").unwrap().key, "ala");
        assert_eq!(
            spec.resolve_namespace("alanine scanning").unwrap().key,
            "ala"
        );
        assert_eq!(spec.resolve_namespace("decomposition").unwrap().key, "decomp");
        assert_eq!(spec.resolve_namespace("GENERAL").unwrap().key, "general");
        assert!(spec.resolve_namespace("bogus").is_none());
    }
}

//! Writers for the solver input decks referenced by the calculation plan.
//!
//! Deck files are written once by the master before execution starts;
//! their names are fixed by convention (`<pre>gb.mdin`,
//! `<pre>pb_decomp_com.mdin`, ...) and the plan builder refers to them by
//! those names.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::input::RunConfig;
use crate::residues::{parse_selection, ResidueMap, Selection};

/// Write every deck the current configuration needs. `pre` is the
/// intermediate-file prefix; decks land in the working directory.
pub fn create_inputs(
    cfg: &RunConfig,
    map: &ResidueMap,
    pre: &str,
    workdir: &Path,
) -> Result<()> {
    let write = |name: String, content: String| -> Result<()> {
        let path = workdir.join(&name);
        std::fs::write(&path, content)
            .with_context(|| format!("could not write input deck {}", path.display()))
    };

    if cfg.gbrun {
        if cfg.decomprun {
            for tag in ["com", "rec", "lig"] {
                write(
                    format!("{pre}gb_decomp_{tag}.mdin"),
                    gb_decomp_mdin(cfg, map, tag)?,
                )?;
            }
        } else if cfg.gb.ifqnt {
            for tag in ["com", "rec", "lig"] {
                write(format!("{pre}gb_qmmm_{tag}.mdin"), gb_qmmm_mdin(cfg, tag))?;
            }
        } else {
            write(format!("{pre}gb.mdin"), gb_mdin(cfg))?;
        }
    }

    if cfg.pbrun {
        if cfg.decomprun {
            for tag in ["com", "rec", "lig"] {
                write(
                    format!("{pre}pb_decomp_{tag}.mdin"),
                    pb_decomp_mdin(cfg, map, tag)?,
                )?;
            }
        } else {
            write(format!("{pre}pb.mdin"), pb_mdin(cfg, false))?;
            write(format!("{pre}pb.mdin2"), pb_mdin(cfg, true))?;
        }
    }

    if cfg.general.qh_entropy {
        write(
            format!("{pre}cpptrajentropy.in"),
            entropy_script(cfg, map, pre, false),
        )?;
        if cfg.alarun {
            write(
                format!("{pre}mutant_cpptrajentropy.in"),
                entropy_script(cfg, map, pre, true),
            )?;
        }
    }

    Ok(())
}

fn gb_mdin(cfg: &RunConfig) -> String {
    format!(
        "GB energy calculation\n\
         &cntrl\n\
         \x20  ntb=0, cut=999.0, imin=5, maxcyc=1, ntx=1,\n\
         \x20  igb={igb}, saltcon={saltcon},\n\
         \x20  intdiel={intdiel}, extdiel={extdiel},\n\
         \x20  rgbmax={rgbmax}, surften={surften},\n\
         /\n",
        igb = cfg.gb.igb,
        saltcon = cfg.gb.saltcon,
        intdiel = cfg.gb.intdiel,
        extdiel = cfg.gb.extdiel,
        rgbmax = cfg.gb.rgbmax,
        surften = cfg.gb.surften,
    )
}

fn gb_qmmm_mdin(cfg: &RunConfig, tag: &str) -> String {
    let qmcharge = match tag {
        "com" => cfg.gb.qmcharge_com,
        "rec" => cfg.gb.qmcharge_rec,
        _ => cfg.gb.qmcharge_lig,
    };
    format!(
        "GB QM/MM energy calculation\n\
         &cntrl\n\
         \x20  ntb=0, cut=999.0, imin=5, maxcyc=1, ntx=1,\n\
         \x20  igb={igb}, saltcon={saltcon},\n\
         \x20  intdiel={intdiel}, extdiel={extdiel},\n\
         \x20  ifqnt=1,\n\
         /\n\
         &qmmm\n\
         \x20  qm_theory='{theory}', qmmask='{mask}',\n\
         \x20  qmcharge={qmcharge}, qmcut={qmcut},\n\
         /\n",
        igb = cfg.gb.igb,
        saltcon = cfg.gb.saltcon,
        intdiel = cfg.gb.intdiel,
        extdiel = cfg.gb.extdiel,
        theory = cfg.gb.qm_theory,
        mask = cfg.gb.qm_residues,
        qmcharge = qmcharge,
        qmcut = cfg.gb.qmcut,
    )
}

/// The shared `&pb` namelist carrying the solver tunables. `scale` is
/// already the grid spacing here (inverted during post-processing).
fn pb_namelist(cfg: &RunConfig, fillratio: f64) -> String {
    let p = &cfg.pb;
    format!(
        "&pb\n\
         \x20  indi={indi}, exdi={exdi}, istrng={istrng}, radiopt={radiopt},\n\
         \x20  prbrad={prbrad}, iprob={iprob}, fillratio={fillratio}, space={space},\n\
         \x20  accept={accept}, bcopt={bcopt}, eneopt={eneopt}, npbopt={npbopt},\n\
         \x20  solvopt={solvopt}, linit={linit}, nfocus={nfocus}, fscale={fscale},\n\
         \x20  smoothopt={smoothopt}, cutnb={cutnb}, cutfd={cutfd}, nbuffer={nbuffer},\n\
         \x20  npbgrid={npbgrid}, arcres={arcres}, sasopt={sasopt}, maxarcdot={maxarcdot},\n\
         \x20  inp={inp}, decompopt={decompopt}, use_rmin={use_rmin}, sprob={sprob},\n\
         \x20  vprob={vprob}, rhow_effect={rhow_effect}, use_sav={use_sav}, maxsph={maxsph},\n\
         \x20  cavity_surften={cavity_surften}, cavity_offset={cavity_offset},\n\
         \x20  pbtemp={pbtemp}, ipb={ipb},\n\
         /\n",
        indi = p.indi,
        exdi = p.exdi,
        istrng = p.istrng * 1000.0, // the solver expects mM
        radiopt = p.radiopt,
        prbrad = p.prbrad,
        iprob = p.iprob,
        fillratio = fillratio,
        space = p.scale,
        accept = p.accept,
        bcopt = p.bcopt,
        eneopt = p.eneopt,
        npbopt = p.npbopt,
        solvopt = p.solvopt,
        linit = p.linit,
        nfocus = p.nfocus,
        fscale = p.fscale,
        smoothopt = p.smoothopt,
        cutnb = p.cutnb,
        cutfd = p.cutfd,
        nbuffer = p.nbuffer,
        npbgrid = p.npbgrid,
        arcres = p.arcres,
        sasopt = p.sasopt,
        maxarcdot = p.maxarcdot,
        inp = p.inp,
        decompopt = p.decompopt,
        use_rmin = p.use_rmin,
        sprob = p.sprob,
        vprob = p.vprob,
        rhow_effect = p.rhow_effect,
        use_sav = p.use_sav,
        maxsph = p.maxsph,
        cavity_surften = p.cavity_surften,
        cavity_offset = p.cavity_offset,
        pbtemp = p.pbtemp,
        ipb = p.ipb,
    )
}

/// `ligand_deck` widens the grid so a single-residue ligand does not end
/// up with a degenerate box.
fn pb_mdin(cfg: &RunConfig, ligand_deck: bool) -> String {
    let p = &cfg.pb;
    let fillratio = if ligand_deck {
        p.fillratio.max(10.0)
    } else {
        p.fillratio
    };
    format!(
        "PB energy calculation\n\
         &cntrl\n\
         \x20  ntb={ntb}, cut={cut}, imin={imin}, maxcyc={maxcyc},\n\
         \x20  ntx={ntx}, nsnb={nsnb}, ioutfm={ioutfm}, ipb={ipb}, inp={inp},\n\
         /\n{pb}",
        ntb = p.ntb,
        cut = p.cut,
        imin = p.imin,
        maxcyc = p.maxcyc,
        ntx = p.ntx,
        nsnb = p.nsnb,
        ioutfm = p.ioutfm,
        ipb = p.ipb,
        inp = p.inp,
        pb = pb_namelist(cfg, fillratio),
    )
}

/// Residue index span of the receptor/ligand within the given species.
fn species_spans(map: &ResidueMap, tag: &str) -> (usize, usize, usize) {
    let nrec = map.receptor.len();
    let nlig = map.ligand.len();
    match tag {
        "com" => (nrec, nlig, map.complex.len()),
        "rec" => (nrec, 0, nrec),
        _ => (0, nlig, nlig),
    }
}

/// The `print_res` selection resolved to 1-based indices of the given
/// species. A `within` selection keeps every residue; the distance cut is
/// the trajectory tool's business, not ours.
fn printed_residues(cfg: &RunConfig, map: &ResidueMap, tag: &str) -> Result<Vec<usize>> {
    let list = match tag {
        "com" => &map.complex,
        "rec" => &map.receptor,
        _ => &map.ligand,
    };
    match parse_selection(&cfg.decomp.print_res)? {
        Selection::Within(_) => Ok((1..=list.len()).collect()),
        Selection::Residues(entries) => {
            let mut out = Vec::new();
            for (i, res) in list.iter().enumerate() {
                if entries
                    .iter()
                    .any(|(c, n, ic)| res.matches(c, *n, ic))
                {
                    out.push(i + 1);
                }
            }
            Ok(out)
        }
    }
}

fn decomp_groups(cfg: &RunConfig, map: &ResidueMap, tag: &str) -> Result<String> {
    let (nrec, nlig, total) = species_spans(map, tag);
    let mut out = String::new();
    if nrec > 0 {
        let _ = writeln!(out, "Residues considered as REC\nRRES 1 {}\nEND", nrec);
    }
    if nlig > 0 {
        let _ = writeln!(
            out,
            "Residues considered as LIG\nLRES {} {}\nEND",
            nrec + 1,
            total
        );
    }
    let printed = printed_residues(cfg, map, tag)?;
    let _ = writeln!(out, "Residues to print");
    for idx in printed {
        let _ = writeln!(out, "RES {idx} {idx}");
    }
    let _ = writeln!(out, "END\nEND");
    Ok(out)
}

fn gb_decomp_mdin(cfg: &RunConfig, map: &ResidueMap, tag: &str) -> Result<String> {
    // Decomposition needs the solver's own surface-area term, hence gbsa=2.
    Ok(format!(
        "GB decomposition analysis\n\
         &cntrl\n\
         \x20  ntb=0, cut=999.0, imin=5, maxcyc=1, ntx=1,\n\
         \x20  igb={igb}, saltcon={saltcon},\n\
         \x20  intdiel={intdiel}, extdiel={extdiel},\n\
         \x20  gbsa=2, idecomp={idecomp},\n\
         /\n{groups}",
        igb = cfg.gb.igb,
        saltcon = cfg.gb.saltcon,
        intdiel = cfg.gb.intdiel,
        extdiel = cfg.gb.extdiel,
        idecomp = cfg.decomp.idecomp,
        groups = decomp_groups(cfg, map, tag)?,
    ))
}

fn pb_decomp_mdin(cfg: &RunConfig, map: &ResidueMap, tag: &str) -> Result<String> {
    let p = &cfg.pb;
    Ok(format!(
        "PB decomposition analysis\n\
         &cntrl\n\
         \x20  ntb={ntb}, cut={cut}, imin={imin}, maxcyc={maxcyc},\n\
         \x20  ntx={ntx}, ipb={ipb}, inp={inp}, idecomp={idecomp},\n\
         /\n{pb}{groups}",
        ntb = p.ntb,
        cut = p.cut,
        imin = p.imin,
        maxcyc = p.maxcyc,
        ntx = p.ntx,
        ipb = p.ipb,
        inp = p.inp,
        idecomp = cfg.decomp.idecomp,
        pb = pb_namelist(cfg, p.fillratio),
        groups = decomp_groups(cfg, map, tag)?,
    ))
}

/// Trajectory-tool script for the quasi-harmonic entropy estimate: three
/// mass-weighted covariance analyses (complex, receptor, ligand) in one
/// pass, each reported through the thermochemistry printer.
fn entropy_script(cfg: &RunConfig, map: &ResidueMap, pre: &str, mutant: bool) -> String {
    let prefix = if mutant {
        format!("{pre}mutant_")
    } else {
        pre.to_string()
    };
    let sfx = cfg.trajectory_suffix;
    let temp = cfg.general.temperature;
    format!(
        "trajin {prefix}complex.{sfx}\n\
         matrix mwcovar name com_mat\n\
         matrix mwcovar name rec_mat {rec_mask}\n\
         matrix mwcovar name lig_mat {lig_mask}\n\
         analyze matrix com_mat thermo temp {temp}\n\
         analyze matrix rec_mat thermo temp {temp}\n\
         analyze matrix lig_mat thermo temp {temp}\n\
         go\n",
        rec_mask = map.receptor_mask,
        lig_mask = map.ligand_mask,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ParsedInput;
    use crate::residues::Residue;

    fn small_map() -> ResidueMap {
        let mk = |index, number, name: &str, owner: &str| Residue {
            index,
            chain: "A".to_string(),
            number,
            icode: String::new(),
            name: name.to_string(),
            owner: owner.to_string(),
        };
        let complex = vec![
            mk(1, 10, "GLY", "REC"),
            mk(2, 11, "ARG", "REC"),
            mk(3, 12, "LIG", "LIG"),
        ];
        ResidueMap {
            receptor: complex[..2].to_vec(),
            ligand: complex[2..].to_vec(),
            complex,
            receptor_mask: ":1-2".to_string(),
            ligand_mask: ":3".to_string(),
        }
    }

    fn config(text: &str) -> crate::input::RunConfig {
        let parsed = ParsedInput::from_str(text).unwrap();
        crate::input::RunConfig::build(&parsed, false).unwrap()
    }

    #[test]
    fn gb_deck_carries_the_model_settings() {
        let cfg = config("&gb\n igb = 2, saltcon = 0.15\n/\n");
        let deck = gb_mdin(&cfg);
        assert!(deck.contains("igb=2"));
        assert!(deck.contains("saltcon=0.15"));
        assert!(deck.contains("imin=5"));
    }

    #[test]
    fn pb_deck_uses_the_inverted_scale_as_spacing() {
        let cfg = config("&pb\n scale = 2.0\n/\n");
        let deck = pb_mdin(&cfg, false);
        assert!(deck.contains("space=0.5"), "{deck}");
    }

    #[test]
    fn ligand_pb_deck_widens_the_grid() {
        let cfg = config("&pb\n/\n");
        assert!(pb_mdin(&cfg, false).contains("fillratio=4"));
        assert!(pb_mdin(&cfg, true).contains("fillratio=10"));
    }

    #[test]
    fn decomp_deck_partitions_receptor_and_ligand() {
        let cfg = config("&gb\n/\n&decomp\n idecomp = 1, print_res = \"A/11\"\n/\n");
        let deck = gb_decomp_mdin(&cfg, &small_map(), "com").unwrap();
        assert!(deck.contains("gbsa=2"));
        assert!(deck.contains("idecomp=1"));
        assert!(deck.contains("RRES 1 2"));
        assert!(deck.contains("LRES 3 3"));
        assert!(deck.contains("RES 2 2"));
        // the receptor deck prints receptor-local indices
        let rec = gb_decomp_mdin(&cfg, &small_map(), "rec").unwrap();
        assert!(rec.contains("RRES 1 2"));
        assert!(!rec.contains("LRES"));
    }

    #[test]
    fn within_selection_prints_everything() {
        let cfg = config("&gb\n/\n&decomp\n idecomp = 1\n/\n");
        let deck = gb_decomp_mdin(&cfg, &small_map(), "com").unwrap();
        assert!(deck.contains("RES 1 1"));
        assert!(deck.contains("RES 3 3"));
    }

    #[test]
    fn entropy_script_strips_by_mask() {
        let cfg = config("&general\n qh_entropy = 1\n/\n&gb\n/\n");
        let script = entropy_script(&cfg, &small_map(), "_ENDSTATE_", false);
        assert!(script.contains("trajin _ENDSTATE_complex.mdcrd"));
        assert!(script.contains("rec_mat :1-2"));
        assert!(script.contains("thermo temp 298.15"));
        let mutant = entropy_script(&cfg, &small_map(), "_ENDSTATE_", true);
        assert!(mutant.contains("trajin _ENDSTATE_mutant_complex.mdcrd"));
    }
}

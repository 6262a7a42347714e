//! Rendering of GROMACS run-parameter (`.mdp`) files.
//!
//! Each function produces the complete file for one run from the typed
//! parameters. Values not exposed as parameters use common settings for a
//! solvated protein with PME electrostatics.

use mdk_protocol::{EquilibrationParams, MinimizationParams, ProductionParams};
use std::fmt::Write;

/// Parameters for the `grompp` call that prepares ion placement.
pub fn render_ions() -> String {
    let mut mdp = String::new();
    header(&mut mdp, "Ion placement");
    line(&mut mdp, "integrator", "steep");
    line(&mut mdp, "emtol", "1000.0");
    line(&mut mdp, "emstep", "0.01");
    line(&mut mdp, "nsteps", "50000");
    neighbours(&mut mdp, 1);
    mdp
}

pub fn render_minimization(params: &MinimizationParams) -> String {
    let mut mdp = String::new();
    header(&mut mdp, "Energy minimization");
    line(&mut mdp, "integrator", &params.integrator);
    line(&mut mdp, "emtol", &params.emtol.to_string());
    line(&mut mdp, "emstep", &params.emstep.to_string());
    line(&mut mdp, "nsteps", &params.nsteps.to_string());
    neighbours(&mut mdp, 1);
    mdp
}

/// NVT equilibration with position restraints on the protein.
pub fn render_nvt(params: &EquilibrationParams) -> String {
    let mut mdp = String::new();
    header(&mut mdp, "NVT equilibration");
    line(&mut mdp, "define", "-DPOSRES");
    dynamics(&mut mdp, params.nvt_steps, params.dt, 500);
    line(&mut mdp, "continuation", "no");
    constraints(&mut mdp);
    neighbours(&mut mdp, 10);
    thermostat(&mut mdp, params.temperature);
    line(&mut mdp, "pcoupl", "no");
    line(&mut mdp, "pbc", "xyz");
    line(&mut mdp, "DispCorr", "EnerPres");
    line(&mut mdp, "gen_vel", "yes");
    line(&mut mdp, "gen_temp", &params.temperature.to_string());
    line(&mut mdp, "gen_seed", "-1");
    mdp
}

/// NPT equilibration, continuing from the NVT run.
pub fn render_npt(params: &EquilibrationParams) -> String {
    let mut mdp = String::new();
    header(&mut mdp, "NPT equilibration");
    line(&mut mdp, "define", "-DPOSRES");
    dynamics(&mut mdp, params.npt_steps, params.dt, 500);
    line(&mut mdp, "continuation", "yes");
    constraints(&mut mdp);
    neighbours(&mut mdp, 10);
    thermostat(&mut mdp, params.temperature);
    barostat(&mut mdp, "Parrinello-Rahman", params.pressure);
    line(&mut mdp, "refcoord_scaling", "com");
    line(&mut mdp, "pbc", "xyz");
    line(&mut mdp, "DispCorr", "EnerPres");
    line(&mut mdp, "gen_vel", "no");
    mdp
}

/// Unrestrained production dynamics.
pub fn render_production(params: &ProductionParams) -> String {
    let mut mdp = String::new();
    header(&mut mdp, "Production MD");
    dynamics(&mut mdp, params.nsteps, params.dt, 5000);
    line(&mut mdp, "nstxout-compressed", "5000");
    line(&mut mdp, "compressed-x-grps", "System");
    line(&mut mdp, "continuation", "yes");
    constraints(&mut mdp);
    neighbours(&mut mdp, 10);
    thermostat(&mut mdp, params.temperature);
    barostat(&mut mdp, "Parrinello-Rahman", params.pressure);
    line(&mut mdp, "pbc", "xyz");
    line(&mut mdp, "DispCorr", "EnerPres");
    line(&mut mdp, "gen_vel", "no");
    mdp
}

fn header(mdp: &mut String, title: &str) {
    let _ = writeln!(mdp, "; {title}");
    let _ = writeln!(mdp, "title = {title}");
}

fn line(mdp: &mut String, key: &str, value: &str) {
    let _ = writeln!(mdp, "{key:<24}= {value}");
}

fn dynamics(mdp: &mut String, nsteps: u64, dt: f64, output_interval: u64) {
    line(mdp, "integrator", "md");
    line(mdp, "nsteps", &nsteps.to_string());
    line(mdp, "dt", &dt.to_string());
    line(mdp, "nstenergy", &output_interval.to_string());
    line(mdp, "nstlog", &output_interval.to_string());
}

fn constraints(mdp: &mut String) {
    line(mdp, "constraint_algorithm", "lincs");
    line(mdp, "constraints", "h-bonds");
    line(mdp, "lincs_iter", "1");
    line(mdp, "lincs_order", "4");
}

fn neighbours(mdp: &mut String, nstlist: u32) {
    line(mdp, "cutoff-scheme", "Verlet");
    line(mdp, "nstlist", &nstlist.to_string());
    line(mdp, "coulombtype", "PME");
    line(mdp, "rcoulomb", "1.0");
    line(mdp, "rvdw", "1.0");
    line(mdp, "pme_order", "4");
    line(mdp, "fourierspacing", "0.16");
}

fn thermostat(mdp: &mut String, temperature: f64) {
    line(mdp, "tcoupl", "V-rescale");
    line(mdp, "tc-grps", "Protein Non-Protein");
    line(mdp, "tau_t", "0.1 0.1");
    line(mdp, "ref_t", &format!("{temperature} {temperature}"));
}

fn barostat(mdp: &mut String, kind: &str, pressure: f64) {
    line(mdp, "pcoupl", kind);
    line(mdp, "pcoupltype", "isotropic");
    line(mdp, "tau_p", "2.0");
    line(mdp, "ref_p", &pressure.to_string());
    line(mdp, "compressibility", "4.5e-5");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(mdp: &'a str, key: &str) -> Option<&'a str> {
        mdp.lines()
            .filter(|l| !l.starts_with(';'))
            .filter_map(|l| l.split_once('='))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim())
    }

    #[test]
    fn test_minimization_uses_params() {
        let params = MinimizationParams {
            integrator: "cg".to_string(),
            emtol: 250.0,
            emstep: 0.02,
            nsteps: 1234,
        };
        let mdp = render_minimization(&params);
        assert_eq!(value(&mdp, "integrator"), Some("cg"));
        assert_eq!(value(&mdp, "emtol"), Some("250"));
        assert_eq!(value(&mdp, "nsteps"), Some("1234"));
    }

    #[test]
    fn test_equilibration_phases_differ() {
        let params = EquilibrationParams {
            nvt_steps: 100,
            npt_steps: 200,
            temperature: 310.0,
            pressure: 1.0,
            dt: 0.002,
        };
        let nvt = render_nvt(&params);
        let npt = render_npt(&params);

        assert_eq!(value(&nvt, "nsteps"), Some("100"));
        assert_eq!(value(&nvt, "pcoupl"), Some("no"));
        assert_eq!(value(&nvt, "gen_vel"), Some("yes"));
        assert_eq!(value(&nvt, "ref_t"), Some("310 310"));

        assert_eq!(value(&npt, "nsteps"), Some("200"));
        assert_eq!(value(&npt, "pcoupl"), Some("Parrinello-Rahman"));
        assert_eq!(value(&npt, "continuation"), Some("yes"));
    }

    #[test]
    fn test_production_has_no_restraints() {
        let mdp = render_production(&ProductionParams::default());
        assert_eq!(value(&mdp, "define"), None);
        assert_eq!(value(&mdp, "nsteps"), Some("500000"));
    }
}

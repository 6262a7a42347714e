//! Non-fatal parameter advice.
//!
//! These checks flag values that are legal but unusual for protein
//! simulations. They never block a stage; callers log or display them.

use mdk_protocol::{EffectiveParams, StageName};

const COMMON_FORCE_FIELDS: &[&str] = &[
    "amber99sb-ildn",
    "amber99sb",
    "amber03",
    "charmm27",
    "charmm36",
    "gromos54a7",
    "oplsaa",
];

const COMMON_WATER_MODELS: &[&str] = &["tip3p", "tip4p", "tip5p", "spc", "spce"];

/// Advice for the parameters a stage consumes.
pub fn advisories(params: &EffectiveParams, stage: StageName) -> Vec<String> {
    let mut notes = Vec::new();

    match stage {
        StageName::Prepare => {
            let system = &params.system;
            if let Some(file) = system.structure_file.as_deref() {
                let lower = file.to_ascii_lowercase();
                if !(lower.ends_with(".pdb") || lower.ends_with(".gro")) {
                    notes.push(format!("structure {file} is neither PDB nor GRO"));
                }
            }
            if !COMMON_FORCE_FIELDS.contains(&system.force_field.as_str()) {
                notes.push(format!(
                    "force field {} is not a common protein force field",
                    system.force_field
                ));
            }
            if !COMMON_WATER_MODELS.contains(&system.water_model.as_str()) {
                notes.push(format!(
                    "water model {} is not a common water model",
                    system.water_model
                ));
            }
        }
        StageName::Minimize => {
            let em = &params.minimization;
            if em.integrator != "steep" && em.integrator != "cg" {
                notes.push("use steepest descent (steep) or conjugate gradient (cg) for minimization".to_string());
            }
            if em.emtol > 2000.0 {
                notes.push(format!("emtol {} is large, minimization may be incomplete", em.emtol));
            } else if em.emtol < 100.0 {
                notes.push(format!("emtol {} is small, minimization may run long", em.emtol));
            }
            if em.nsteps < 10_000 {
                notes.push(format!("{} minimization steps may be too few, 10000 or more is typical", em.nsteps));
            } else if em.nsteps > 100_000 {
                notes.push(format!("{} minimization steps is more than usually needed", em.nsteps));
            }
        }
        StageName::Equilibrate => {
            let eq = &params.equilibration;
            if eq.nvt_steps < 25_000 {
                notes.push(format!("{} NVT steps may be too few, 25000 or more is typical", eq.nvt_steps));
            }
            if eq.npt_steps < 25_000 {
                notes.push(format!("{} NPT steps may be too few, 25000 or more is typical", eq.npt_steps));
            }
            temperature_note(eq.temperature, &mut notes);
            pressure_note(eq.pressure, &mut notes);
            timestep_note(eq.dt, &mut notes);
        }
        StageName::Produce => {
            let md = &params.production;
            if md.duration_ps() < 1000.0 {
                notes.push(format!(
                    "production covers {:.1} ps, at least 1 ns is recommended",
                    md.duration_ps()
                ));
            }
            temperature_note(md.temperature, &mut notes);
            pressure_note(md.pressure, &mut notes);
            timestep_note(md.dt, &mut notes);
        }
        StageName::Analyze => {}
    }

    notes
}

fn temperature_note(kelvin: f64, notes: &mut Vec<String>) {
    if !(273.0..=373.0).contains(&kelvin) {
        notes.push(format!("temperature {kelvin} K is outside the usual 273-373 K range"));
    }
}

fn pressure_note(bar: f64, notes: &mut Vec<String>) {
    if (bar - 1.0).abs() > 1e-9 {
        notes.push(format!("pressure {bar} bar differs from 1 bar"));
    }
}

fn timestep_note(dt: f64, notes: &mut Vec<String>) {
    if dt > 0.002 {
        notes.push(format!("timestep {dt} ps may be unstable"));
    } else if dt < 0.0005 {
        notes.push(format!("timestep {dt} ps is inefficient"));
    }
}

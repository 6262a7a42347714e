//! Strongly typed simulation parameters.
//!
//! Parameter trees arrive loosely typed (TOML defaults, JSON call overrides).
//! The configuration resolver in `mdk-core` merges them and coerces the result
//! into [`EffectiveParams`] before anything is handed to a stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

/// Fully merged parameters for a stage invocation.
///
/// Unknown top-level keys are kept in `extra` so that newer callers can pass
/// settings this version does not understand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
pub struct EffectiveParams {
    #[serde(default)]
    pub system: SystemParams,

    #[serde(default)]
    pub minimization: MinimizationParams,

    #[serde(default)]
    pub equilibration: EquilibrationParams,

    #[serde(default)]
    pub production: ProductionParams,

    #[serde(default)]
    pub analysis: AnalysisParams,

    #[serde(default)]
    pub run: RunParams,

    #[serde(flatten)]
    #[ts(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// System preparation settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct SystemParams {
    /// Input structure. Relative paths are looked up in the workflow
    /// directory first, then in the configured structure search paths.
    pub structure_file: Option<String>,
    pub force_field: String,
    pub water_model: String,
    pub box_type: String,
    /// Solute to box edge distance in nm.
    pub box_distance: f64,
    /// Salt concentration in mol/L.
    pub ions_concentration: f64,
    pub ignore_hydrogens: bool,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            structure_file: None,
            force_field: "amber99sb-ildn".to_string(),
            water_model: "tip3p".to_string(),
            box_type: "cubic".to_string(),
            box_distance: 1.0,
            ions_concentration: 0.15,
            ignore_hydrogens: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct MinimizationParams {
    pub integrator: String,
    /// Convergence threshold on the maximum force, kJ/mol/nm.
    pub emtol: f64,
    pub emstep: f64,
    pub nsteps: u64,
}

impl Default for MinimizationParams {
    fn default() -> Self {
        Self {
            integrator: "steep".to_string(),
            emtol: 1000.0,
            emstep: 0.01,
            nsteps: 50_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct EquilibrationParams {
    pub nvt_steps: u64,
    pub npt_steps: u64,
    /// Kelvin.
    pub temperature: f64,
    /// Bar.
    pub pressure: f64,
    /// Picoseconds.
    pub dt: f64,
}

impl Default for EquilibrationParams {
    fn default() -> Self {
        Self {
            nvt_steps: 50_000,
            npt_steps: 50_000,
            temperature: 300.0,
            pressure: 1.0,
            dt: 0.002,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct ProductionParams {
    pub nsteps: u64,
    pub temperature: f64,
    pub pressure: f64,
    pub dt: f64,
}

impl Default for ProductionParams {
    fn default() -> Self {
        Self {
            nsteps: 500_000,
            temperature: 300.0,
            pressure: 1.0,
            dt: 0.002,
        }
    }
}

impl ProductionParams {
    /// Simulated time in picoseconds.
    pub fn duration_ps(&self) -> f64 {
        self.nsteps as f64 * self.dt
    }
}

/// Supported trajectory analyses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TS)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Rmsd,
    Rmsf,
    Gyrate,
    Hbond,
    Sasa,
    Density,
    /// Distance between the position pairs of a selection.
    Distance,
    /// Angle spanned by the position triplets of a selection.
    Angle,
    SecondaryStructure,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 9] = [
        AnalysisKind::Rmsd,
        AnalysisKind::Rmsf,
        AnalysisKind::Gyrate,
        AnalysisKind::Hbond,
        AnalysisKind::Sasa,
        AnalysisKind::Density,
        AnalysisKind::Distance,
        AnalysisKind::Angle,
        AnalysisKind::SecondaryStructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Rmsd => "rmsd",
            AnalysisKind::Rmsf => "rmsf",
            AnalysisKind::Gyrate => "gyrate",
            AnalysisKind::Hbond => "hbond",
            AnalysisKind::Sasa => "sasa",
            AnalysisKind::Density => "density",
            AnalysisKind::Distance => "distance",
            AnalysisKind::Angle => "angle",
            AnalysisKind::SecondaryStructure => "secondary_structure",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown analysis kind '{s}'"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct AnalysisParams {
    pub kind: AnalysisKind,
    /// Index group fed to the analysis tool.
    pub selection: String,
    pub output_prefix: String,
    /// Picoseconds.
    pub begin_time: f64,
    /// Picoseconds. `-1` analyses until the last frame.
    pub end_time: f64,
    /// Frame spacing in picoseconds.
    pub dt: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            kind: AnalysisKind::Rmsd,
            selection: "Protein".to_string(),
            output_prefix: "analysis".to_string(),
            begin_time: 0.0,
            end_time: -1.0,
            dt: 1.0,
        }
    }
}

/// Engine invocation knobs shared by every stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct RunParams {
    /// Passed to `grompp -maxwarn`.
    pub maxwarn: u32,
    /// Extra arguments appended to every `mdrun` call.
    pub mdrun_args: Vec<String>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            maxwarn: 1,
            mdrun_args: Vec::new(),
        }
    }
}

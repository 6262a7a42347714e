//! The stage graph and the command plan of each stage.
//!
//! The pipeline is a fixed chain: prepare, minimize, equilibrate, produce,
//! with analyze hanging off produce. A plan turns validated parameters into
//! the command lines, input files and expected outputs of one attempt.

use crate::error::{OrchestratorError, OrchestratorResult, ResourceKind};
use crate::executor::stage::{StageInput, StageRequest};
use crate::pipeline::{analysis, mdp};
use mdk_protocol::{CommandLine, EffectiveParams, StageName};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Direct prerequisites of a stage.
pub fn prerequisites(stage: StageName) -> &'static [StageName] {
    match stage {
        StageName::Prepare => &[],
        StageName::Minimize => &[StageName::Prepare],
        StageName::Equilibrate => &[StageName::Minimize],
        StageName::Produce => &[StageName::Equilibrate],
        StageName::Analyze => &[StageName::Produce],
    }
}

/// Every stage up to and including `target`, in topological order.
pub fn path_to(target: StageName) -> Vec<StageName> {
    let mut path = vec![target];
    let mut current = target;
    while let Some(previous) = prerequisites(current).first() {
        path.push(*previous);
        current = *previous;
    }
    path.reverse();
    path
}

/// Commands, inputs and outputs of one stage attempt.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: StageName,
    pub label: Option<String>,
    pub commands: Vec<CommandLine>,
    pub inputs: Vec<StageInput>,
    pub expected_outputs: Vec<PathBuf>,
}

impl StagePlan {
    fn new(stage: StageName) -> Self {
        Self {
            stage,
            label: None,
            commands: Vec::new(),
            inputs: Vec::new(),
            expected_outputs: Vec::new(),
        }
    }

    fn write(&mut self, path: &str, contents: String) {
        self.inputs.push(StageInput::Write {
            path: PathBuf::from(path),
            contents,
        });
    }

    fn outputs(&mut self, paths: &[&str]) {
        self.expected_outputs.extend(paths.iter().map(PathBuf::from));
    }

    pub fn into_request(self, timeout: Duration) -> StageRequest {
        StageRequest {
            stage: self.stage,
            label: self.label,
            commands: self.commands,
            inputs: self.inputs,
            expected_outputs: self.expected_outputs,
            timeout,
            params: None,
        }
    }
}

/// Builds the plan for `stage`.
///
/// # Arguments
///
/// * `gmx` - Resolved simulation engine executable
/// * `root_dir` - The workflow directory, the working directory of every command
/// * `search_paths` - Extra directories searched for the input structure
///
/// # Errors
///
/// Returns `NotFound` with kind `File` if the input structure of `prepare`
/// cannot be found.
pub fn build_plan(
    stage: StageName,
    params: &EffectiveParams,
    gmx: &Path,
    root_dir: &Path,
    search_paths: &[PathBuf],
) -> OrchestratorResult<StagePlan> {
    let mut plan = StagePlan::new(stage);
    let grompp = |mdp_file: &str, coords: &str, tpr: &str| {
        CommandLine::new(gmx)
            .args(["grompp", "-f", mdp_file, "-c", coords, "-p", "topol.top", "-o", tpr])
            .args(["-maxwarn".to_string(), params.run.maxwarn.to_string()])
    };
    let mdrun = |deffnm: &str| {
        CommandLine::new(gmx)
            .args(["mdrun", "-deffnm", deffnm])
            .args(params.run.mdrun_args.iter().cloned())
    };

    match stage {
        StageName::Prepare => {
            let system = &params.system;
            let requested = system.structure_file.as_deref().unwrap_or_default();
            let structure = match locate_structure(requested, root_dir, search_paths)? {
                Located::InRoot(relative) => relative,
                Located::External(from) => {
                    let name = from
                        .file_name()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("structure.pdb"));
                    plan.inputs.push(StageInput::Copy {
                        from,
                        to: name.clone(),
                    });
                    name
                }
            };

            plan.write("ions.mdp", mdp::render_ions());

            let mut pdb2gmx = CommandLine::new(gmx).args([
                "pdb2gmx".to_string(),
                "-f".to_string(),
                structure.display().to_string(),
                "-o".to_string(),
                "processed.gro".to_string(),
                "-p".to_string(),
                "topol.top".to_string(),
                "-i".to_string(),
                "posre.itp".to_string(),
                "-ff".to_string(),
                system.force_field.clone(),
                "-water".to_string(),
                system.water_model.clone(),
            ]);
            if system.ignore_hydrogens {
                pdb2gmx = pdb2gmx.arg("-ignh");
            }
            plan.commands.push(pdb2gmx);

            plan.commands.push(CommandLine::new(gmx).args([
                "editconf".to_string(),
                "-f".to_string(),
                "processed.gro".to_string(),
                "-o".to_string(),
                "box.gro".to_string(),
                "-c".to_string(),
                "-d".to_string(),
                system.box_distance.to_string(),
                "-bt".to_string(),
                system.box_type.clone(),
            ]));
            plan.commands.push(CommandLine::new(gmx).args([
                "solvate", "-cp", "box.gro", "-cs", "spc216.gro", "-o", "solv.gro", "-p",
                "topol.top",
            ]));
            plan.commands.push(grompp("ions.mdp", "solv.gro", "ions.tpr"));
            plan.commands.push(
                CommandLine::new(gmx)
                    .args([
                        "genion".to_string(),
                        "-s".to_string(),
                        "ions.tpr".to_string(),
                        "-o".to_string(),
                        "solv_ions.gro".to_string(),
                        "-p".to_string(),
                        "topol.top".to_string(),
                        "-pname".to_string(),
                        "NA".to_string(),
                        "-nname".to_string(),
                        "CL".to_string(),
                        "-neutral".to_string(),
                        "-conc".to_string(),
                        system.ions_concentration.to_string(),
                    ])
                    .stdin("SOL\n"),
            );
            plan.outputs(&["topol.top", "solv_ions.gro"]);
        }
        StageName::Minimize => {
            plan.write("em/em.mdp", mdp::render_minimization(&params.minimization));
            plan.commands.push(grompp("em/em.mdp", "solv_ions.gro", "em/em.tpr"));
            plan.commands.push(mdrun("em/em"));
            plan.outputs(&["em/em.gro", "em/em.edr", "em/em.log"]);
        }
        StageName::Equilibrate => {
            plan.write("nvt/nvt.mdp", mdp::render_nvt(&params.equilibration));
            plan.write("npt/npt.mdp", mdp::render_npt(&params.equilibration));
            plan.commands.push(
                grompp("nvt/nvt.mdp", "em/em.gro", "nvt/nvt.tpr").args(["-r", "em/em.gro"]),
            );
            plan.commands.push(mdrun("nvt/nvt"));
            plan.commands.push(
                grompp("npt/npt.mdp", "nvt/nvt.gro", "npt/npt.tpr")
                    .args(["-r", "nvt/nvt.gro", "-t", "nvt/nvt.cpt"]),
            );
            plan.commands.push(mdrun("npt/npt"));
            plan.outputs(&["npt/npt.gro", "npt/npt.cpt"]);
        }
        StageName::Produce => {
            plan.write("md/md.mdp", mdp::render_production(&params.production));
            plan.commands.push(
                grompp("md/md.mdp", "npt/npt.gro", "md/md.tpr").args(["-t", "npt/npt.cpt"]),
            );
            plan.commands.push(mdrun("md/md"));
            plan.outputs(&["md/md.gro", "md/md.xtc", "md/md.cpt"]);
        }
        StageName::Analyze => {
            let analysis = &params.analysis;
            plan.label = Some(analysis.kind.to_string());
            let (command, output) = analysis::command(analysis, gmx);
            plan.commands.push(command);
            plan.expected_outputs.push(output);
        }
    }

    Ok(plan)
}

/// Where an input structure was found.
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    /// Already inside the workflow directory, relative to it.
    InRoot(PathBuf),
    /// Outside the workflow directory; must be copied in.
    External(PathBuf),
}

/// Finds an input structure file.
///
/// Relative names are tried against `root_dir` first, then each search path.
pub fn locate_structure(
    requested: &str,
    root_dir: &Path,
    search_paths: &[PathBuf],
) -> OrchestratorResult<Located> {
    let not_found = || OrchestratorError::NotFound {
        kind: ResourceKind::File,
        name: requested.to_string(),
    };
    let requested_path = Path::new(requested);

    if requested_path.is_absolute() {
        if !requested_path.is_file() {
            return Err(not_found());
        }
        return Ok(match requested_path.strip_prefix(root_dir) {
            Ok(relative) => Located::InRoot(relative.to_path_buf()),
            Err(_) => Located::External(requested_path.to_path_buf()),
        });
    }

    if stays_inside(requested_path) && root_dir.join(requested_path).is_file() {
        return Ok(Located::InRoot(requested_path.to_path_buf()));
    }

    search_paths
        .iter()
        .map(|dir| dir.join(requested_path))
        .find(|candidate| candidate.is_file())
        .map(Located::External)
        .ok_or_else(not_found)
}

/// True if a relative path never climbs above its base.
pub(crate) fn stays_inside(path: &Path) -> bool {
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_to_is_topological() {
        assert_eq!(path_to(StageName::Prepare), vec![StageName::Prepare]);
        assert_eq!(
            path_to(StageName::Produce),
            vec![
                StageName::Prepare,
                StageName::Minimize,
                StageName::Equilibrate,
                StageName::Produce
            ]
        );
        assert_eq!(path_to(StageName::Analyze).len(), 5);
    }

    #[test]
    fn test_prepare_plan_copies_structure_from_search_path() {
        let root = tempdir().expect("Failed to create temp dir");
        let library = tempdir().expect("Failed to create temp dir");
        std::fs::write(library.path().join("1aki.pdb"), "ATOM").expect("write pdb");

        let mut params = EffectiveParams::default();
        params.system.structure_file = Some("1aki.pdb".to_string());

        let plan = build_plan(
            StageName::Prepare,
            &params,
            Path::new("/usr/bin/gmx"),
            root.path(),
            &[library.path().to_path_buf()],
        )
        .expect("plan");

        assert!(plan.inputs.contains(&StageInput::Copy {
            from: library.path().join("1aki.pdb"),
            to: PathBuf::from("1aki.pdb"),
        }));
        assert_eq!(plan.commands.len(), 5);
        assert_eq!(plan.commands[0].args[0], "pdb2gmx");
        assert!(plan.commands[0].args.contains(&"-ignh".to_string()));
        assert_eq!(plan.commands[4].stdin.as_deref(), Some("SOL\n"));
        assert_eq!(
            plan.expected_outputs,
            vec![PathBuf::from("topol.top"), PathBuf::from("solv_ions.gro")]
        );
    }

    #[test]
    fn test_missing_structure_is_not_found() {
        let root = tempdir().expect("Failed to create temp dir");
        let err = locate_structure("missing.pdb", root.path(), &[]).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
        assert!(locate_structure("../escape.pdb", root.path(), &[]).is_err());
    }

    #[test]
    fn test_production_plan_continues_from_npt() {
        let root = tempdir().expect("Failed to create temp dir");
        let mut params = EffectiveParams::default();
        params.run.mdrun_args = vec!["-nt".to_string(), "4".to_string()];

        let plan = build_plan(
            StageName::Produce,
            &params,
            Path::new("gmx"),
            root.path(),
            &[],
        )
        .expect("plan");

        let grompp = &plan.commands[0].args;
        assert!(grompp.windows(2).any(|w| w == ["-t", "npt/npt.cpt"]));
        let mdrun = &plan.commands[1].args;
        assert_eq!(mdrun[..3], ["mdrun", "-deffnm", "md/md"]);
        assert!(mdrun.ends_with(&["-nt".to_string(), "4".to_string()]));
    }
}

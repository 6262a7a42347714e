//! Files each stage left behind in a workflow directory.

use crate::pipeline::analysis::ANALYSIS_DIR;
use mdk_protocol::{ArtifactFile, StageArtifacts, StageName, Workflow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of engine checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = "cpt";

/// Files the prepare stage writes at the top of the workflow directory.
const PREPARE_FILES: &[&str] = &[
    "processed.gro",
    "topol.top",
    "posre.itp",
    "box.gro",
    "solv.gro",
    "ions.mdp",
    "ions.tpr",
    "solv_ions.gro",
];

/// Directories owned by a stage, relative to the workflow root.
pub fn stage_directories(stage: StageName) -> &'static [&'static str] {
    match stage {
        StageName::Prepare => &[],
        StageName::Minimize => &["em"],
        StageName::Equilibrate => &["nvt", "npt"],
        StageName::Produce => &["md"],
        StageName::Analyze => &[ANALYSIS_DIR],
    }
}

/// Lists the files of every stage, or of `stage` alone, in pipeline order.
///
/// Files recorded as outputs of a stage are always included; files that no
/// longer exist are left out.
pub fn list_artifacts(workflow: &Workflow, stage: Option<StageName>) -> Vec<StageArtifacts> {
    let stages = match stage {
        Some(stage) => vec![stage],
        None => StageName::ALL.to_vec(),
    };

    stages
        .into_iter()
        .map(|stage| StageArtifacts {
            stage,
            files: stage_files(workflow, stage),
        })
        .collect()
}

fn stage_files(workflow: &Workflow, stage: StageName) -> Vec<ArtifactFile> {
    let root = workflow.root_dir.as_path();
    let mut paths: BTreeSet<PathBuf> = BTreeSet::new();

    for dir in stage_directories(stage) {
        let files = WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file());
        for entry in files {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                paths.insert(relative.to_path_buf());
            }
        }
    }

    if stage == StageName::Prepare {
        paths.extend(PREPARE_FILES.iter().map(PathBuf::from));
        paths.extend(chain_topologies(root));
    }

    paths.extend(
        workflow
            .records
            .iter()
            .filter(|record| record.stage_name == stage)
            .flat_map(|record| record.outputs.iter().cloned()),
    );

    paths
        .into_iter()
        .filter_map(|relative| {
            let meta = std::fs::metadata(root.join(&relative)).ok()?;
            if !meta.is_file() {
                return None;
            }
            let checkpoint = relative
                .extension()
                .is_some_and(|ext| ext == CHECKPOINT_EXTENSION);
            Some(ArtifactFile {
                path: relative,
                size_bytes: meta.len(),
                checkpoint,
            })
        })
        .collect()
}

// Multi-chain systems get one `topol_*.itp` / `posre_*.itp` per chain.
fn chain_topologies(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| PathBuf::from(entry.file_name()))
        .filter(|name| {
            let text = name.to_string_lossy();
            (text.starts_with("topol_") || text.starts_with("posre_")) && text.ends_with(".itp")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn touch(root: &Path, relative: &str, bytes: usize) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, vec![b'x'; bytes]).expect("write");
    }

    #[test]
    fn test_files_are_grouped_by_stage() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        touch(root, "topol.top", 10);
        touch(root, "topol_Protein_chain_A.itp", 4);
        touch(root, "protein.pdb", 4);
        touch(root, "em/em.gro", 8);
        touch(root, "nvt/nvt.gro", 8);
        touch(root, "npt/npt.cpt", 16);
        touch(root, "logs/prepare-1.stdout.log", 3);

        let workflow = Workflow::new(Uuid::new_v4(), "wf".to_string(), root.to_path_buf(), Utc::now());
        let listing = list_artifacts(&workflow, None);
        assert_eq!(listing.len(), StageName::ALL.len());

        let files = |stage: StageName| -> Vec<String> {
            listing
                .iter()
                .find(|entry| entry.stage == stage)
                .map(|entry| entry.files.iter().map(|f| f.path.display().to_string()).collect())
                .unwrap_or_default()
        };
        assert_eq!(
            files(StageName::Prepare),
            vec!["topol.top", "topol_Protein_chain_A.itp"]
        );
        assert_eq!(files(StageName::Minimize), vec!["em/em.gro"]);
        assert_eq!(files(StageName::Equilibrate), vec!["npt/npt.cpt", "nvt/nvt.gro"]);
        assert!(files(StageName::Analyze).is_empty());

        let equilibrate = &listing[StageName::Equilibrate as usize];
        let checkpoint = &equilibrate.files[0];
        assert!(checkpoint.checkpoint);
        assert_eq!(checkpoint.size_bytes, 16);
        assert!(!equilibrate.files[1].checkpoint);
    }

    #[test]
    fn test_single_stage_listing() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(dir.path(), "md/md.cpt", 1);
        let workflow = Workflow::new(
            Uuid::new_v4(),
            "wf".to_string(),
            dir.path().to_path_buf(),
            Utc::now(),
        );

        let listing = list_artifacts(&workflow, Some(StageName::Produce));
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].stage, StageName::Produce);
        assert_eq!(listing[0].files[0].path, PathBuf::from("md/md.cpt"));
    }
}

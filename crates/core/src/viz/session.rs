//! Rendering of visualization session scripts.
//!
//! A session is a Tcl script that loads a structure (and optionally a
//! trajectory) from the workflow directory, then applies one of the built-in
//! templates. Building a session has no side effects.

use crate::error::{OrchestratorError, OrchestratorResult, ResourceKind};
use crate::viz::templates::{get_template, DEFAULT_TEMPLATE};
use mdk_protocol::{SessionScript, Workflow};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Directory, relative to a workflow's root, for viewer scripts and output.
pub const VIZ_DIR: &str = "vmd";

/// Renders a session for `workflow`.
///
/// # Arguments
///
/// * `structure_file` - Structure to load, relative to the workflow root or absolute inside it
/// * `trajectory_file` - Optional trajectory appended to the structure
/// * `template` - Built-in template name; `default` when `None`
///
/// # Errors
///
/// * `NotFound` (kind `File`) if a file is missing or lies outside the workflow root
/// * `UnknownTemplate` if no built-in template has that name
pub fn build_session(
    workflow: &Workflow,
    structure_file: &Path,
    trajectory_file: Option<&Path>,
    template: Option<&str>,
) -> OrchestratorResult<SessionScript> {
    let template_name = template.unwrap_or(DEFAULT_TEMPLATE);
    let body = get_template(template_name)
        .ok_or_else(|| OrchestratorError::UnknownTemplate(template_name.to_string()))?;

    let structure = resolve_in_root(&workflow.root_dir, structure_file)?;
    let trajectory = trajectory_file
        .map(|file| resolve_in_root(&workflow.root_dir, file))
        .transpose()?;

    let output_dir = workflow.root_dir.join(VIZ_DIR);

    let mut script = String::new();
    let _ = writeln!(script, "# Session for workflow {} ({})", workflow.name, workflow.id);
    let _ = writeln!(script, "# Template: {template_name}");
    let _ = writeln!(
        script,
        "mol new {{{}}} type {} waitfor all",
        structure.display(),
        file_type(&structure, "pdb")
    );
    if let Some(trajectory) = &trajectory {
        let _ = writeln!(
            script,
            "mol addfile {{{}}} type {} waitfor all",
            trajectory.display(),
            file_type(trajectory, "xtc")
        );
    }
    script.push('\n');
    script.push_str(
        &body
            .replace("{{OUTPUT_DIR}}", &output_dir.display().to_string())
            .replace("{{NAME}}", &workflow.name),
    );

    Ok(SessionScript {
        workflow_id: workflow.id,
        template: template_name.to_string(),
        structure_file: structure,
        trajectory_file: trajectory,
        working_dir: workflow.root_dir.clone(),
        script,
    })
}

/// Resolves `path` against `root` and rejects anything outside it.
fn resolve_in_root(root: &Path, path: &Path) -> OrchestratorResult<PathBuf> {
    let not_found = || OrchestratorError::NotFound {
        kind: ResourceKind::File,
        name: path.display().to_string(),
    };

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved = joined.canonicalize().map_err(|_| not_found())?;
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    if !resolved.starts_with(&root) || !resolved.is_file() {
        return Err(not_found());
    }
    Ok(resolved)
}

fn file_type(path: &Path, fallback: &str) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn workflow_in(dir: &Path) -> Workflow {
        Workflow::new(
            Uuid::new_v4(),
            "barnase".to_string(),
            dir.canonicalize().expect("canonical dir"),
            Utc::now(),
        )
    }

    #[test]
    fn test_session_loads_structure_and_trajectory() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("md")).expect("mkdir");
        std::fs::write(dir.path().join("md/md.gro"), "gro").expect("write");
        std::fs::write(dir.path().join("md/md.xtc"), "xtc").expect("write");
        let workflow = workflow_in(dir.path());

        let session = build_session(
            &workflow,
            Path::new("md/md.gro"),
            Some(Path::new("md/md.xtc")),
            Some("rmsd_trace"),
        )
        .expect("session");

        assert_eq!(session.template, "rmsd_trace");
        assert_eq!(session.working_dir, workflow.root_dir);
        assert!(session.script.contains("type gro waitfor all"));
        assert!(session.script.contains("mol addfile"));
        assert!(session.script.contains(&workflow.root_dir.join("vmd").display().to_string()));
        assert!(!session.script.contains("{{"));
    }

    #[test]
    fn test_unknown_template_and_missing_files() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("conf.pdb"), "ATOM").expect("write");
        let workflow = workflow_in(dir.path());

        let err = build_session(&workflow, Path::new("conf.pdb"), None, Some("sparkles")).unwrap_err();
        assert_eq!(err.kind(), "UNKNOWN_TEMPLATE");

        let err = build_session(&workflow, Path::new("missing.pdb"), None, None).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");

        let outside = tempdir().expect("Failed to create temp dir");
        let foreign = outside.path().join("other.pdb");
        std::fs::write(&foreign, "ATOM").expect("write");
        let err = build_session(&workflow, &foreign, None, None).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");

        let session = build_session(&workflow, Path::new("conf.pdb"), None, None).expect("default");
        assert_eq!(session.template, DEFAULT_TEMPLATE);
        assert!(session.trajectory_file.is_none());
    }
}

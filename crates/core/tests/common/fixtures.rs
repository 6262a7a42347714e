//! Test fixtures: temporary workspaces and fake external tools.
//!
//! The fake engine is a shell script that understands just enough of the
//! engine's command line to create the files a stage is expected to produce.

use mdk_core::config::models::ServiceConfig;
use mdk_core::pipeline::PipelineCoordinator;
use mdk_core::workflow::WorkflowStore;
use mdk_protocol::config_models::GlobalConfig;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Name of the input structure placed in the search path.
pub const STRUCTURE: &str = "protein.pdb";

const FAKE_GMX_BODY: &str = r#"sub="$1"
shift
echo "gmx $sub"
make_output() {
  mkdir -p "$(dirname "$1")"
  case "$1" in
    *.xvg)
      printf '# fake output\n@ title "fake"\n@ s0 legend "value"\n0.0 1.0\n1.0 2.0\n2.0 3.0\n' > "$1"
      ;;
    *)
      echo "$sub output" >> "$1"
      ;;
  esac
}
while [ $# -gt 0 ]; do
  case "$1" in
    -o|-p|-i|-num|-oall|-oav)
      make_output "$2"
      shift
      ;;
    -deffnm)
      for ext in gro edr log cpt xtc tpr; do
        make_output "$2.$ext"
      done
      shift
      ;;
  esac
  shift
done
exit 0
"#;

/// Builder for a fake engine executable.
#[derive(Debug, Default, Clone)]
pub struct FakeGmx {
    fail_on: Vec<String>,
    sleep_on: Vec<String>,
}

#[allow(dead_code)]
impl FakeGmx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit 1 with a fatal error when the command line contains `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    /// Hang when the command line contains `pattern`.
    pub fn sleep_on(mut self, pattern: &str) -> Self {
        self.sleep_on.push(pattern.to_string());
        self
    }

    /// Writes the script to `dir/gmx` and returns its path.
    pub fn install(&self, dir: &Path) -> PathBuf {
        let mut script = String::from("#!/bin/sh\ncase \"$*\" in\n");
        for pattern in &self.fail_on {
            script.push_str(&format!(
                "  *\"{pattern}\"*) echo \"Fatal error: simulated failure in {pattern}\" >&2; exit 1 ;;\n"
            ));
        }
        for pattern in &self.sleep_on {
            script.push_str(&format!("  *\"{pattern}\"*) exec sleep 30 ;;\n"));
        }
        script.push_str("esac\n");
        script.push_str(FAKE_GMX_BODY);

        write_executable(&dir.join("gmx"), &script)
    }
}

/// Installs a viewer that records its arguments next to itself and exits.
pub fn install_fake_vmd(dir: &Path) -> PathBuf {
    let record = dir.join("vmd-args.txt");
    let script = format!("#!/bin/sh\necho \"$@\" > \"{}\"\nexit 0\n", record.display());
    write_executable(&dir.join("vmd"), &script)
}

fn write_executable(path: &Path, contents: &str) -> PathBuf {
    std::fs::write(path, contents).expect("Failed to write fake tool");
    let mut perms = std::fs::metadata(path)
        .expect("Failed to stat fake tool")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("Failed to chmod fake tool");
    path.to_path_buf()
}

/// A temporary project with fake tools and an input structure.
///
/// Layout:
/// - `bin/` holds the fake `gmx` and `vmd`
/// - `structures/protein.pdb` is found through the search path
/// - `workflows/` is the workspace root
pub struct TestWorkspace {
    pub dir: TempDir,
    pub config: Arc<ServiceConfig>,
}

#[allow(dead_code)]
impl TestWorkspace {
    /// A workspace whose engine always succeeds.
    pub fn new() -> Self {
        Self::with_gmx(FakeGmx::new())
    }

    pub fn with_gmx(gmx: FakeGmx) -> Self {
        Self::build(gmx, |config| config)
    }

    /// Like [`TestWorkspace::with_gmx`], with extra config adjustments.
    pub fn build(gmx: FakeGmx, adjust: impl FnOnce(ServiceConfig) -> ServiceConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir");

        let bin = root.join("bin");
        let structures = root.join("structures");
        std::fs::create_dir_all(&bin).expect("Failed to create bin dir");
        std::fs::create_dir_all(&structures).expect("Failed to create structures dir");
        std::fs::write(
            structures.join(STRUCTURE),
            "ATOM      1  N   MET A   1      11.104  13.207  10.000  1.00  0.00           N\nEND\n",
        )
        .expect("Failed to write structure");

        let gmx_path = gmx.install(&bin);
        let vmd_path = install_fake_vmd(&bin);

        let config = ServiceConfig::new(GlobalConfig::default(), &root)
            .with_workspace_root(root.join("workflows"))
            .with_gmx_path(gmx_path.display().to_string())
            .with_vmd_path(vmd_path.display().to_string())
            .with_termination_grace_secs(1)
            .with_structure_search_path(&structures)
            .with_defaults(json!({
                "system": { "structure_file": STRUCTURE }
            }));

        Self {
            dir,
            config: Arc::new(adjust(config)),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.config.base_dir.clone()
    }

    /// File the fake viewer writes its arguments to.
    pub fn vmd_args_file(&self) -> PathBuf {
        self.root().join("bin").join("vmd-args.txt")
    }

    pub async fn store(&self) -> Arc<WorkflowStore> {
        Arc::new(
            WorkflowStore::open(Arc::clone(&self.config))
                .await
                .expect("Failed to open store"),
        )
    }

    pub async fn coordinator(&self) -> PipelineCoordinator {
        PipelineCoordinator::new(Arc::clone(&self.config), self.store().await)
    }
}

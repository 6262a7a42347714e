//! A temporary project with `.mdkit/config.toml`, a fake engine and a
//! structure file, plus a helper to run `mdk` inside it.

use assert_cmd::Command;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_GMX: &str = r#"#!/bin/sh
sub="$1"
shift
echo "gmx $sub"
while [ $# -gt 0 ]; do
  case "$1" in
    -o|-p|-i|-num|-oall|-oav)
      mkdir -p "$(dirname "$2")"
      case "$2" in
        *.xvg) printf '@ s0 legend "value"\n0.0 1.0\n1.0 3.0\n' > "$2" ;;
        *) echo "$sub output" >> "$2" ;;
      esac
      shift
      ;;
    -deffnm)
      mkdir -p "$(dirname "$2")"
      for ext in gro edr log cpt xtc tpr; do
        echo "$sub output" >> "$2.$ext"
      done
      shift
      ;;
  esac
  shift
done
"#;

pub struct Project {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        let gmx = root.join("bin").join("gmx");
        std::fs::create_dir_all(gmx.parent().expect("bin dir")).expect("mkdir bin");
        std::fs::write(&gmx, FAKE_GMX).expect("write fake gmx");
        let mut perms = std::fs::metadata(&gmx).expect("stat").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&gmx, perms).expect("chmod");

        std::fs::create_dir_all(root.join("structures")).expect("mkdir structures");
        std::fs::write(root.join("structures/protein.pdb"), "ATOM\nEND\n").expect("write pdb");

        std::fs::create_dir_all(root.join(".mdkit")).expect("mkdir .mdkit");
        let config = format!(
            r#"[tools]
gmx_path = "{}"

[workspace]
root = "workflows"
structure_search_paths = ["structures"]

[execution]
termination_grace_secs = 1

[defaults.system]
structure_file = "protein.pdb"
"#,
            gmx.display()
        );
        std::fs::write(root.join(".mdkit/config.toml"), config).expect("write config");

        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.path().join("workflows")
    }

    /// `mdk` with the project as working directory and logging silenced.
    pub fn mdk(&self) -> Command {
        let mut cmd = Command::cargo_bin("mdk").expect("mdk binary");
        cmd.current_dir(self.path()).arg("-q");
        cmd
    }
}

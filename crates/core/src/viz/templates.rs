//! Built-in visualization templates.
//!
//! This module uses `rust-embed` to embed the Tcl files of the project root
//! `templates/vmd/` directory at compile time. With the `debug-embed`
//! feature, debug builds still embed them so tests see the same set as
//! release builds.

use rust_embed::RustEmbed;

/// Template used when a session does not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Embedded Tcl templates from `templates/vmd/`.
///
/// `CARGO_MANIFEST_DIR` is `crates/core`, so `../../templates/vmd` is the
/// directory at the repository root.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../templates/vmd"]
pub struct VizTemplates;

/// Body of the template called `name` (without the `.tcl` extension).
pub fn get_template(name: &str) -> Option<String> {
    VizTemplates::get(&format!("{name}.tcl"))
        .map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}

/// Names of all built-in templates, sorted.
pub fn list_templates() -> Vec<String> {
    let mut names: Vec<String> = VizTemplates::iter()
        .filter_map(|path| path.strip_suffix(".tcl").map(str::to_string))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_are_embedded() {
        let names = list_templates();
        for expected in [
            "default",
            "ligand_licorice",
            "movie_frames",
            "protein_cartoon",
            "protein_surface",
            "rmsd_trace",
            "water_points",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_get_template() {
        let default = get_template(DEFAULT_TEMPLATE).expect("default template");
        assert!(default.contains("NewCartoon"));
        assert!(get_template("no_such_template").is_none());
    }
}

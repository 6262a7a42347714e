//! Trajectory analyses and their `.xvg` outputs.
//!
//! Each [`AnalysisKind`] maps to one engine tool. Group selections are fed
//! through stdin, the way the tools prompt for them interactively. The
//! selection-based tools (`distance`, `gangle`, `dssp`) take the selection
//! as an argument instead.

use mdk_protocol::ipc::ColumnSummary;
use mdk_protocol::{AnalysisKind, AnalysisParams, CommandLine};
use std::path::{Path, PathBuf};

/// Directory, relative to a workflow's root, holding analysis outputs.
pub const ANALYSIS_DIR: &str = "analysis";

/// Topology and trajectory of the production run.
const RUN_INPUT: &str = "md/md.tpr";
const TRAJECTORY: &str = "md/md.xtc";

/// The command for one analysis and the file it writes.
pub fn command(params: &AnalysisParams, gmx: &Path) -> (CommandLine, PathBuf) {
    let output = PathBuf::from(ANALYSIS_DIR).join(format!(
        "{}_{}.xvg",
        params.output_prefix, params.kind
    ));
    let output_arg = output.display().to_string();
    let out = output_arg.as_str();
    let group = params.selection.as_str();

    let base = CommandLine::new(gmx);
    let command = match params.kind {
        AnalysisKind::Rmsd => base
            .args(["rms", "-s", RUN_INPUT, "-f", TRAJECTORY, "-o", out, "-tu", "ns"])
            .stdin(format!("{group}\n{group}\n")),
        AnalysisKind::Rmsf => base
            .args(["rmsf", "-s", RUN_INPUT, "-f", TRAJECTORY, "-o", out, "-res"])
            .stdin(format!("{group}\n")),
        AnalysisKind::Gyrate => base
            .args(["gyrate", "-s", RUN_INPUT, "-f", TRAJECTORY, "-o", out])
            .stdin(format!("{group}\n")),
        AnalysisKind::Hbond => base
            .args(["hbond", "-s", RUN_INPUT, "-f", TRAJECTORY, "-num", out])
            .stdin(format!("{group}\n{group}\n")),
        AnalysisKind::Sasa => base
            .args(["sasa", "-s", RUN_INPUT, "-f", TRAJECTORY, "-o", out])
            .stdin(format!("{group}\n")),
        AnalysisKind::Density => base
            .args(["density", "-s", RUN_INPUT, "-f", TRAJECTORY, "-o", out, "-d", "Z"])
            .stdin(format!("{group}\n")),
        AnalysisKind::Distance => base.args([
            "distance", "-s", RUN_INPUT, "-f", TRAJECTORY, "-select", group, "-oall", out,
        ]),
        AnalysisKind::Angle => base.args([
            "gangle", "-s", RUN_INPUT, "-f", TRAJECTORY, "-g1", "angle", "-group1", group, "-oav",
            out,
        ]),
        AnalysisKind::SecondaryStructure => {
            let map = output.with_extension("dat").display().to_string();
            base.args([
                "dssp", "-s", RUN_INPUT, "-f", TRAJECTORY, "-sel", group, "-o", map.as_str(), "-num", out,
            ])
        }
    };

    (with_time_window(command, params), output)
}

fn with_time_window(mut command: CommandLine, params: &AnalysisParams) -> CommandLine {
    if params.begin_time > 0.0 {
        command = command.args(["-b".to_string(), params.begin_time.to_string()]);
    }
    if params.end_time >= 0.0 {
        command = command.args(["-e".to_string(), params.end_time.to_string()]);
    }
    if params.dt > 0.0 && (params.dt - 1.0).abs() > f64::EPSILON {
        command = command.args(["-dt".to_string(), params.dt.to_string()]);
    }
    command
}

/// Parsed data of an `.xvg` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XvgData {
    /// Legends declared with `@ sN legend`, by data column (0 = first y column).
    pub legends: Vec<(usize, String)>,
    /// Numeric rows; the first value of each row is the x value.
    pub rows: Vec<Vec<f64>>,
}

/// Parses `.xvg` text, skipping `#` comments and `@` directives other than
/// series legends. Lines that are not fully numeric are ignored.
pub fn parse_xvg(content: &str) -> XvgData {
    let mut data = XvgData::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(directive) = line.strip_prefix('@') {
            if let Some(legend) = parse_legend(directive) {
                data.legends.push(legend);
            }
            continue;
        }
        let row: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse::<f64>).collect();
        if let Ok(row) = row {
            if !row.is_empty() {
                data.rows.push(row);
            }
        }
    }

    data
}

// `@ s0 legend "RMSD"`
fn parse_legend(directive: &str) -> Option<(usize, String)> {
    let mut parts = directive.trim().splitn(3, char::is_whitespace);
    let series = parts.next()?.strip_prefix('s')?.parse().ok()?;
    if parts.next()? != "legend" {
        return None;
    }
    let text = parts.next()?.trim().trim_matches('"').to_string();
    Some((series, text))
}

/// Mean, standard deviation and range of every y column.
pub fn summarize(data: &XvgData) -> Vec<ColumnSummary> {
    let columns = data.rows.iter().map(Vec::len).max().unwrap_or(0);

    (1..columns)
        .filter_map(|column| {
            let values: Vec<f64> = data.rows.iter().filter_map(|row| row.get(column).copied()).collect();
            if values.is_empty() {
                return None;
            }
            let samples = values.len();
            let mean = values.iter().sum::<f64>() / samples as f64;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let legend = data
                .legends
                .iter()
                .find(|(series, _)| *series == column - 1)
                .map(|(_, text)| text.clone());

            Some(ColumnSummary {
                column,
                legend,
                samples,
                mean,
                std: variance.sqrt(),
                min,
                max,
            })
        })
        .collect()
}

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cluster_table::{NONCORE_PRESENCE_ABSENCE_FILE_NAME, SOFTCORE_PRESENCE_ABSENCE_FILE_NAME};
use crate::command::run_command;
use crate::error::{PanfillError, Result};
use crate::summary::SummaryStatistics;

pub const RING_CHART_SCRIPT: &str = "PlotRingChart.R";
pub const UPSET_SCRIPT: &str = "PlotUsingUpSet.R";

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Arguments to the ring chart script, after the script path itself.
pub fn ring_chart_arguments(summary: &SummaryStatistics) -> Vec<String> {
    let (labels, counts) = summary.ring_chart_segments();
    vec![
        summary.core_proteins.to_string(),
        summary.softcore_proteins.to_string(),
        summary.noncore_proteins.to_string(),
        join(&labels),
        join(&counts),
    ]
}

fn rscript(script_directory: &Path, script: &str, args: &[String], output_directory: &Path) -> Command {
    let mut cmd = Command::new("Rscript");
    cmd.arg(script_directory.join(script))
        .args(args)
        .current_dir(output_directory);
    cmd
}

fn run_plot(mut cmd: Command, description: &str) -> Result<()> {
    run_command(&mut cmd, "Rscript").map_err(|e| {
        PanfillError::PlottingFailure(format!(
            "unable to create {} ({}), attempted command was {:?}",
            description, e, cmd
        ))
    })
}

pub fn plot_ring_chart(
    summary: &SummaryStatistics,
    script_directory: &Path,
    output_directory: &Path,
) -> Result<()> {
    info!("Creating ring chart in R ..");
    run_plot(
        rscript(
            script_directory,
            RING_CHART_SCRIPT,
            &ring_chart_arguments(summary),
            output_directory,
        ),
        "ring chart",
    )
}

/// UpSet plot of a presence/absence matrix in `output_directory`, written
/// next to it as `<stem>_upset.eps`.
pub fn plot_upset(
    presence_absence_file_name: &str,
    script_directory: &Path,
    output_directory: &Path,
) -> Result<()> {
    let plot_name = upset_plot_name(presence_absence_file_name);
    info!("Creating UpSet plot {} in R ..", plot_name.display());
    run_plot(
        rscript(
            script_directory,
            UPSET_SCRIPT,
            &[
                presence_absence_file_name.to_string(),
                plot_name.to_string_lossy().to_string(),
            ],
            output_directory,
        ),
        "UpSet plot",
    )
}

fn upset_plot_name(presence_absence_file_name: &str) -> PathBuf {
    let stem = presence_absence_file_name
        .strip_suffix("_pam.txt")
        .unwrap_or(presence_absence_file_name);
    PathBuf::from(format!("{}_upset.eps", stem))
}

/// Render every chart. Failures are logged and never abort the run.
pub fn plot_all(summary: &SummaryStatistics, script_directory: &Path, output_directory: &Path) {
    let results = vec![
        plot_ring_chart(summary, script_directory, output_directory),
        plot_upset(
            SOFTCORE_PRESENCE_ABSENCE_FILE_NAME,
            script_directory,
            output_directory,
        ),
        plot_upset(
            NONCORE_PRESENCE_ABSENCE_FILE_NAME,
            script_directory,
            output_directory,
        ),
    ];
    for result in results {
        if let Err(e) = result {
            warn!("{}", e);
        }
    }
}

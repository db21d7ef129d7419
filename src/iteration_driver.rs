use std::path::{Path, PathBuf};

use crate::cluster_merger::{self, MergeStats};
use crate::cluster_table::ClusterTable;
use crate::error::{PanfillError, Result};
use crate::gap_finder::{self, GapParams};
use crate::homology::HomologyView;
use crate::HomologySearcher;

/// Settings for a refinement run.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    pub gap_params: GapParams,
    /// Number of times to sweep cluster sizes N-1 down to 1.
    pub iterations: usize,
    /// Where to keep each pass's pool FASTA and raw search output. When None
    /// they are discarded along with the pass's temporary directory.
    pub intermediate_directory: Option<PathBuf>,
}

impl Default for RefineConfig {
    fn default() -> RefineConfig {
        RefineConfig {
            gap_params: GapParams::default(),
            iterations: 1,
            intermediate_directory: None,
        }
    }
}

/// Record of one pass, i.e. one homology search and the merges that followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub iteration: usize,
    pub size: usize,
    pub pool_size: usize,
    pub stats: MergeStats,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub passes: Vec<PassReport>,
    pub totals: MergeStats,
}

pub struct IterationDriver<'a, S: HomologySearcher> {
    config: RefineConfig,
    searcher: &'a S,
    work_directory: PathBuf,
}

impl<'a, S: HomologySearcher> IterationDriver<'a, S> {
    /// Each pass runs in its own temporary directory created inside
    /// `work_directory`.
    pub fn new(config: RefineConfig, searcher: &'a S, work_directory: &Path) -> Self {
        IterationDriver {
            config,
            searcher,
            work_directory: work_directory.to_path_buf(),
        }
    }

    pub fn run(&self, table: &mut ClusterTable) -> Result<RunReport> {
        let genome_count = table.genome_count();
        info!(
            "Refining {} noncore clusters across {} genomes using {} homology, {} iteration(s)",
            table.noncore().len(),
            genome_count,
            self.searcher.method_name(),
            self.config.iterations
        );
        std::fs::create_dir_all(&self.work_directory)?;

        let mut report = RunReport::default();
        'iterations: for iteration in 1..=self.config.iterations {
            info!("Starting iteration {}", iteration);
            for size in (1..genome_count).rev() {
                if table.noncore().is_empty() {
                    info!("No noncore clusters remain");
                    break 'iterations;
                }
                if !table.noncore().values().any(|c| c.size() == size) {
                    debug!("No noncore clusters of size {}, skipping", size);
                    continue;
                }
                let pass = self.run_pass(iteration, size, table)?;
                report.totals += pass.stats;
                report.passes.push(pass);
            }
        }

        info!(
            "Finished refinement: {} merges made {} softcore clusters, {} merges left clusters noncore",
            report.totals.total(),
            report.totals.softcore,
            report.totals.noncore
        );
        Ok(report)
    }

    fn run_pass(
        &self,
        iteration: usize,
        size: usize,
        table: &mut ClusterTable,
    ) -> Result<PassReport> {
        let search_failure = |detail: String| PanfillError::HomologySearchFailure {
            iteration,
            size,
            detail,
        };

        let pass_directory = tempfile::Builder::new()
            .prefix("panfill-pass")
            .tempdir_in(&self.work_directory)?;
        let output_prefix = pass_directory
            .path()
            .join(format!("ClusterBLAST_{}.fasta", size));

        let (view, pool_size) = {
            let pool = table.proteins_in_scope();
            info!(
                "Iteration {}, cluster size {}: searching {} proteins from {} noncore clusters",
                iteration,
                size,
                pool.len(),
                table.noncore().len()
            );
            let hits = self
                .searcher
                .search(&pool, &output_prefix)
                .map_err(|e| search_failure(e.to_string()))?;
            (HomologyView::new(hits), pool.len())
        };
        debug!(
            "Search returned hits for {} query proteins",
            view.num_queries()
        );

        if let Some(dir) = &self.config.intermediate_directory {
            self.keep_intermediates(dir, iteration, &output_prefix)?;
        }

        let candidates =
            gap_finder::find_candidates(size, table, &view, &self.config.gap_params);
        let stats = cluster_merger::apply(&candidates, table).map_err(|e| match e {
            PanfillError::InternalConsistencyFault(detail) => {
                PanfillError::InternalConsistencyFault(format!(
                    "iteration {}, cluster size {}: {}",
                    iteration, size, detail
                ))
            }
            e => e,
        })?;

        info!(
            "At cluster size (n = {}): merged {} homologous clusters into {} softcore clusters",
            size,
            2 * stats.softcore,
            stats.softcore
        );
        info!(
            "At cluster size (n = {}): merged {} homologous clusters into {} noncore clusters",
            size,
            2 * stats.noncore,
            stats.noncore
        );

        Ok(PassReport {
            iteration,
            size,
            pool_size,
            stats,
        })
    }

    fn keep_intermediates(&self, dir: &Path, iteration: usize, output_prefix: &Path) -> Result<()> {
        let file_name = match output_prefix.file_name() {
            Some(f) => f.to_string_lossy().to_string(),
            None => return Ok(()),
        };
        let results = PathBuf::from(format!("{}.results", output_prefix.display()));

        for (source, sub_directory, kept_name) in [
            (output_prefix.to_path_buf(), "faa", format!("iteration{}_{}", iteration, file_name)),
            (
                results,
                "results",
                format!("iteration{}_{}.results", iteration, file_name),
            ),
        ] {
            if !source.exists() {
                trace!("No {} to keep", source.display());
                continue;
            }
            let destination = dir.join(sub_directory);
            std::fs::create_dir_all(&destination)?;
            std::fs::copy(&source, destination.join(&kept_name))?;
            debug!("Kept {} as {}", source.display(), kept_name);
        }
        Ok(())
    }
}

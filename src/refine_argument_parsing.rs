use std::path::{Path, PathBuf};

use clap::*;

use crate::blastp::BlastpSearcher;
use crate::cluster_table::ClusterTable;
use crate::error::{PanfillError, Result};
use crate::external_command_checker;
use crate::gap_finder::GapParams;
use crate::iteration_driver::{IterationDriver, RefineConfig, RunReport};
use crate::plotting;
use crate::precomputed::PrecomputedSearcher;
use crate::sequence_index::SequenceIndex;
use crate::summary::SummaryStatistics;
use crate::{
    HomologySearcher, DEFAULT_EMPTY_MARKER, DEFAULT_EVALUE, DEFAULT_HOMOLOGY_METHOD,
    DEFAULT_ITERATIONS, DEFAULT_MIN_IDENTITY, DEFAULT_MIN_LENGTH_RATIO, DEFAULT_STRAIN_CUTOFF,
};

pub fn add_refine_subcommand(app: Command) -> Command {
    let refine_subcommand = bird_tool_utils::clap_utils::add_clap_verbosity_flags(
        Command::new("refine")
            .about("Merge noncore clusters of a PanOCT matchtable that are reciprocal best homologs")
            .arg(
                Arg::new("matchtable")
                    .long("matchtable")
                    .required(true)
                    .help("Tab-separated cluster table, one cluster per row and one genome per column"),
            )
            .arg(
                Arg::new("protein-fasta")
                    .long("protein-fasta")
                    .help("Protein sequences of every protein in the matchtable [required for --homology-method blastp]"),
            )
            .arg(
                Arg::new("homology-method")
                    .long("homology-method")
                    .value_parser(["blastp", "precomputed"])
                    .default_value(DEFAULT_HOMOLOGY_METHOD)
                    .help("How to find homologs: 'blastp' searches the remaining noncore proteins on each pass, 'precomputed' reuses an all-vs-all result table"),
            )
            .arg(
                Arg::new("precomputed-hits")
                    .long("precomputed-hits")
                    .help("All-vs-all BLAST output in '-outfmt \"6 std qlen slen\"' format [required for --homology-method precomputed]"),
            )
            .arg(
                Arg::new("output-directory")
                    .long("output-directory")
                    .required(true)
                    .help("Directory to write refined tables into, created if missing"),
            )
            .arg(
                Arg::new("min-identity")
                    .long("min-identity")
                    .value_parser(value_parser!(f32))
                    .default_value(DEFAULT_MIN_IDENTITY)
                    .help("Percent identity required for a hit to be considered"),
            )
            .arg(
                Arg::new("strain-cutoff")
                    .long("strain-cutoff")
                    .value_parser(value_parser!(f32))
                    .default_value(DEFAULT_STRAIN_CUTOFF)
                    .help("Percentage of cluster members that must agree on each reciprocal best hit test, given as a fraction up to 1 or out of 100"),
            )
            .arg(
                Arg::new("min-length-ratio")
                    .long("min-length-ratio")
                    .value_parser(value_parser!(f32))
                    .default_value(DEFAULT_MIN_LENGTH_RATIO)
                    .help("Minimum ratio of shorter to longer sequence length for a hit"),
            )
            .arg(
                Arg::new("iterations")
                    .long("iterations")
                    .value_parser(value_parser!(usize))
                    .default_value(DEFAULT_ITERATIONS)
                    .help("Number of sweeps over cluster sizes"),
            )
            .arg(
                Arg::new("evalue")
                    .long("evalue")
                    .value_parser(value_parser!(f64))
                    .default_value(DEFAULT_EVALUE)
                    .help("E-value threshold passed to blastp"),
            )
            .arg(
                Arg::new("empty-marker")
                    .long("empty-marker")
                    .default_value(DEFAULT_EMPTY_MARKER)
                    .help("Matchtable cell value meaning no protein from that genome"),
            )
            .arg(
                Arg::new("intermediate-directory")
                    .long("intermediate-directory")
                    .help("Keep the FASTA and search output of each pass in this directory"),
            )
            .arg(
                Arg::new("r-script-directory")
                    .long("r-script-directory")
                    .help("Directory containing PlotRingChart.R and PlotUsingUpSet.R. Charts are only drawn when given"),
            )
            .arg(
                Arg::new("threads")
                    .short('t')
                    .long("threads")
                    .value_parser(value_parser!(usize))
                    .default_value("1")
                    .help("Number of CPU threads to use"),
            ),
    );

    app.subcommand(refine_subcommand)
}

/// Parse a percentage given either as a fraction or out of 100. Values up to
/// and including 1 are fractions, so `1` means 100%. Values above 1 and up
/// to 100 are divided by 100.
pub fn parse_percentage(m: &ArgMatches, parameter: &str) -> Result<Option<f32>> {
    match m.get_one::<f32>(parameter) {
        Some(value) => {
            let mut percentage = *value;
            if percentage > 1.0 && percentage <= 100.0 {
                percentage /= 100.0;
            } else if !(0.0..=1.0).contains(&percentage) {
                error!("Invalid percentage: '{}'", percentage);
                return Err(PanfillError::InvalidArgument(format!(
                    "Invalid percentage specified for --{}: '{}'",
                    parameter, percentage
                )));
            }
            debug!("Using {} {}%", parameter, percentage * 100.0);
            Ok(Some(percentage))
        }
        None => Ok(None),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(m: &'a ArgMatches, parameter: &str) -> Result<&'a T> {
    m.get_one::<T>(parameter).ok_or_else(|| {
        PanfillError::InvalidArgument(format!("--{} must be specified", parameter))
    })
}

pub fn parse_refine_config(m: &ArgMatches) -> Result<RefineConfig> {
    let min_identity = *required::<f32>(m, "min-identity")?;
    if !(0.0..=100.0).contains(&min_identity) {
        return Err(PanfillError::InvalidArgument(format!(
            "--min-identity must be between 0 and 100, found {}",
            min_identity
        )));
    }
    let min_length_ratio = *required::<f32>(m, "min-length-ratio")?;
    if !(0.0..=1.0).contains(&min_length_ratio) {
        return Err(PanfillError::InvalidArgument(format!(
            "--min-length-ratio must be between 0 and 1, found {}",
            min_length_ratio
        )));
    }
    let strain_cutoff = parse_percentage(m, "strain-cutoff")?.ok_or_else(|| {
        PanfillError::InvalidArgument("--strain-cutoff must be specified".to_string())
    })?;
    let iterations = *required::<usize>(m, "iterations")?;
    if iterations == 0 {
        return Err(PanfillError::InvalidArgument(
            "--iterations must be at least 1".to_string(),
        ));
    }

    Ok(RefineConfig {
        gap_params: GapParams {
            min_identity,
            strain_cutoff,
            min_length_ratio,
        },
        iterations,
        intermediate_directory: m
            .get_one::<String>("intermediate-directory")
            .map(PathBuf::from),
    })
}

pub fn run_refine_subcommand(m: &ArgMatches) {
    if let Err(e) = refine(m) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn refine(m: &ArgMatches) -> Result<()> {
    let num_threads = *required::<usize>(m, "threads")?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| {
            PanfillError::InvalidArgument(format!("Unable to set up {} threads: {}", num_threads, e))
        })?;

    let config = parse_refine_config(m)?;
    let empty_marker = required::<String>(m, "empty-marker")?;
    let matchtable = PathBuf::from(required::<String>(m, "matchtable")?);
    let output_directory = PathBuf::from(required::<String>(m, "output-directory")?);
    let r_script_directory = m.get_one::<String>("r-script-directory").map(PathBuf::from);

    let mut table = ClusterTable::from_path(&matchtable, empty_marker)?;
    std::fs::create_dir_all(&output_directory)?;

    match required::<String>(m, "homology-method")?.as_str() {
        "blastp" => {
            let protein_fasta = m.get_one::<String>("protein-fasta").ok_or_else(|| {
                PanfillError::InvalidArgument(
                    "--protein-fasta must be specified when using --homology-method blastp"
                        .to_string(),
                )
            })?;
            external_command_checker::check_for_blast()?;
            let sequences = SequenceIndex::from_path(Path::new(protein_fasta))?;
            if let Some(missing) = table
                .proteins_in_scope()
                .into_iter()
                .find(|p| sequences.get(p).is_none())
            {
                return Err(PanfillError::Fasta(format!(
                    "Protein {} from the matchtable is missing from {}",
                    missing, protein_fasta
                )));
            }
            let evalue = *required::<f64>(m, "evalue")?;
            let searcher = BlastpSearcher {
                sequences,
                shards: num_threads,
                evalue,
            };
            refine_with(
                &searcher,
                config,
                &mut table,
                &output_directory,
                r_script_directory.as_deref(),
            )?;
        }
        "precomputed" => {
            let hits_path = m.get_one::<String>("precomputed-hits").ok_or_else(|| {
                PanfillError::InvalidArgument(
                    "--precomputed-hits must be specified when using --homology-method precomputed"
                        .to_string(),
                )
            })?;
            let searcher = PrecomputedSearcher::from_path(Path::new(hits_path))?;
            refine_with(
                &searcher,
                config,
                &mut table,
                &output_directory,
                r_script_directory.as_deref(),
            )?;
        }
        other => {
            return Err(PanfillError::InvalidArgument(format!(
                "Unknown homology method '{}'",
                other
            )))
        }
    }
    info!("Finished refining {}", matchtable.display());
    Ok(())
}

/// Refine `table`, then write the output tables, the summary and, when a
/// script directory is given, the charts into `output_directory`.
pub fn refine_with<S: HomologySearcher>(
    searcher: &S,
    config: RefineConfig,
    table: &mut ClusterTable,
    output_directory: &Path,
    r_script_directory: Option<&Path>,
) -> Result<RunReport> {
    let report = {
        let work_directory = tempfile::Builder::new()
            .prefix("panfill-work")
            .tempdir_in(output_directory)?;
        IterationDriver::new(config, searcher, work_directory.path()).run(table)?
    };

    table.serialise(output_directory)?;
    let summary = SummaryStatistics::from_table(table);
    summary.log();
    summary.write_to_directory(output_directory)?;

    match r_script_directory {
        Some(dir) => plotting::plot_all(&summary, dir, output_directory),
        None => debug!("No R script directory given, so not drawing charts"),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn refine_matches(args: &[&str]) -> ArgMatches {
        let app = add_refine_subcommand(Command::new("panfill"));
        let mut full = vec!["panfill", "refine", "--matchtable", "m.txt", "--output-directory", "out"];
        full.extend_from_slice(args);
        let matches = app.try_get_matches_from(full).unwrap();
        matches.subcommand_matches("refine").unwrap().clone()
    }

    #[test]
    fn test_defaults() {
        init();
        let config = parse_refine_config(&refine_matches(&[])).unwrap();
        assert_eq!(30.0, config.gap_params.min_identity);
        assert_eq!(1.0, config.gap_params.strain_cutoff);
        assert_eq!(0.6, config.gap_params.min_length_ratio);
        assert_eq!(1, config.iterations);
        assert!(config.intermediate_directory.is_none());
    }

    #[test]
    fn test_strain_cutoff_percentage() {
        init();
        let m = refine_matches(&["--strain-cutoff", "60"]);
        assert_eq!(Some(0.6), parse_percentage(&m, "strain-cutoff").unwrap());
        let m = refine_matches(&["--strain-cutoff", "0.75"]);
        assert_eq!(Some(0.75), parse_percentage(&m, "strain-cutoff").unwrap());
        let m = refine_matches(&["--strain-cutoff", "150"]);
        assert!(parse_percentage(&m, "strain-cutoff").is_err());
    }

    #[test]
    fn test_strain_cutoff_of_one_is_a_fraction() {
        init();
        for value in &["1", "1.0", "100"] {
            let m = refine_matches(&["--strain-cutoff", *value]);
            assert_eq!(Some(1.0), parse_percentage(&m, "strain-cutoff").unwrap());
        }
        let m = refine_matches(&["--strain-cutoff", "50"]);
        assert_eq!(Some(0.5), parse_percentage(&m, "strain-cutoff").unwrap());
    }

    #[test]
    fn test_invalid_arguments() {
        init();
        assert!(parse_refine_config(&refine_matches(&["--iterations", "0"])).is_err());
        assert!(parse_refine_config(&refine_matches(&["--min-length-ratio", "1.5"])).is_err());
        assert!(parse_refine_config(&refine_matches(&["--min-identity", "101"])).is_err());
    }

    #[test]
    fn test_refine_with_writes_outputs() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let mut table = ClusterTable::from_reader(
            "1\ta|1\tb|1\n2\ta|2\t----------\n3\t----------\tb|2\n".as_bytes(),
            DEFAULT_EMPTY_MARKER,
        )
        .unwrap();
        let searcher = PrecomputedSearcher::new(vec![
            crate::homology::tests::hit("a|2", "b|2", 90.0, 100.0),
            crate::homology::tests::hit("b|2", "a|2", 90.0, 100.0),
        ]);
        let report = refine_with(
            &searcher,
            RefineConfig::default(),
            &mut table,
            td.path(),
            None,
        )
        .unwrap();
        assert_eq!(1, report.totals.softcore);
        assert_eq!(
            "1\ta|1\tb|1\n2\ta|2\tb|2\n",
            std::fs::read_to_string(td.path().join("new_matchtable.txt")).unwrap()
        );
        assert!(td.path().join(crate::summary::SUMMARY_FILE_NAME).exists());
        // Only outputs remain, the work directory is gone
        assert_eq!(6, std::fs::read_dir(td.path()).unwrap().count());
    }
}

pub mod blastp;
pub mod cluster_merger;
pub mod cluster_table;
pub mod command;
pub mod error;
pub mod external_command_checker;
pub mod gap_finder;
pub mod homology;
pub mod iteration_driver;
pub mod plotting;
pub mod precomputed;
pub mod refine_argument_parsing;
pub mod sequence_index;
pub mod summary;

#[macro_use]
extern crate log;
extern crate clap;
extern crate rayon;

use std::path::Path;

use crate::homology::HomologyHit;

/// An all-vs-all protein similarity search over a pool of proteins.
pub trait HomologySearcher {
    fn method_name(&self) -> &str;

    /// Search every protein in `proteins` against every other. Any files
    /// written are named from `output_prefix`: the pool FASTA at the prefix
    /// itself and the raw results at `<prefix>.results`.
    fn search(&self, proteins: &[&str], output_prefix: &Path) -> error::Result<Vec<HomologyHit>>;
}

pub const DEFAULT_EMPTY_MARKER: &str = "----------";
pub const DEFAULT_MIN_IDENTITY: &str = "30";
pub const DEFAULT_STRAIN_CUTOFF: &str = "100";
pub const DEFAULT_MIN_LENGTH_RATIO: &str = "0.6";
pub const DEFAULT_ITERATIONS: &str = "1";
pub const DEFAULT_EVALUE: &str = "0.0001";
pub const DEFAULT_HOMOLOGY_METHOD: &str = "blastp";

pub const MIN_LENGTH_RATIO: f32 = 0.6;

use thiserror::Error;

/// Failures that can occur while refining a cluster table.
#[derive(Error, Debug)]
pub enum PanfillError {
    /// The input cluster table cannot be interpreted, so the genome count
    /// cannot be established.
    #[error("Malformed cluster table: {0}")]
    MalformedInput(String),
    /// A homology search for one pass failed or produced unusable output.
    #[error("Homology search failed in iteration {iteration} at cluster size {size}: {detail}")]
    HomologySearchFailure {
        iteration: usize,
        size: usize,
        detail: String,
    },
    /// Chart rendering failed. Never fatal, callers log it and carry on.
    #[error("Plotting failed: {0}")]
    PlottingFailure(String),
    /// A merge was attempted that GapFinder should never have proposed.
    #[error("Internal consistency fault: {0}")]
    InternalConsistencyFault(String),
    #[error("Error running {program}: {detail}")]
    ExternalCommand { program: String, detail: String },
    #[error("Unable to parse homology search output: {0}")]
    HomologyParse(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unable to read protein FASTA: {0}")]
    Fasta(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PanfillError>;

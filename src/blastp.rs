use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::command::run_command;
use crate::error::{PanfillError, Result};
use crate::homology::{parse_blast_tabular, HomologyHit};
use crate::sequence_index::SequenceIndex;
use crate::HomologySearcher;

/// All-vs-all search with BLAST+. The pool is split into shards which are
/// searched concurrently on the global rayon pool, one single-threaded
/// blastp per shard.
pub struct BlastpSearcher {
    pub sequences: SequenceIndex,
    pub shards: usize,
    pub evalue: f64,
}

impl HomologySearcher for BlastpSearcher {
    fn method_name(&self) -> &str {
        "blastp"
    }

    fn search(&self, proteins: &[&str], output_prefix: &Path) -> Result<Vec<HomologyHit>> {
        parallel_blastp(
            &self.sequences,
            proteins,
            self.shards,
            self.evalue,
            output_prefix,
        )
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Split `proteins` into at most `shards` contiguous chunks of near-equal size.
pub fn shard_proteins<'a>(proteins: &'a [&'a str], shards: usize) -> Vec<&'a [&'a str]> {
    if proteins.is_empty() {
        return vec![];
    }
    let shards = shards.clamp(1, proteins.len());
    let chunk_size = (proteins.len() + shards - 1) / shards;
    proteins.chunks(chunk_size).collect()
}

fn parallel_blastp(
    sequences: &SequenceIndex,
    proteins: &[&str],
    shards: usize,
    evalue: f64,
    output_prefix: &Path,
) -> Result<Vec<HomologyHit>> {
    if proteins.is_empty() {
        return Ok(vec![]);
    }

    let database_fasta = output_prefix.to_path_buf();
    sequences.write_fasta(proteins, BufWriter::new(File::create(&database_fasta)?))?;
    debug!(
        "Wrote {} sequences to {}",
        proteins.len(),
        database_fasta.display()
    );

    let database = with_suffix(output_prefix, ".db");
    let mut cmd = std::process::Command::new("makeblastdb");
    cmd.arg("-in")
        .arg(&database_fasta)
        .arg("-dbtype")
        .arg("prot")
        .arg("-out")
        .arg(&database);
    run_command(&mut cmd, "makeblastdb")?;

    let shards = shard_proteins(proteins, shards);
    info!(
        "Running blastp on {} sequences split into {} shards ..",
        proteins.len(),
        shards.len()
    );

    // Each shard writes only its own files. Results are gathered in shard
    // order and the first failure aborts the whole search.
    let shard_outputs: Vec<PathBuf> = shards
        .par_iter()
        .enumerate()
        .map(|(i, shard)| -> Result<PathBuf> {
            let query = with_suffix(output_prefix, &format!(".part{}.faa", i + 1));
            sequences.write_fasta(shard, BufWriter::new(File::create(&query)?))?;
            let out = with_suffix(output_prefix, &format!(".part{}.subblast", i + 1));

            let mut cmd = std::process::Command::new("blastp");
            cmd.arg("-query")
                .arg(&query)
                .arg("-db")
                .arg(&database)
                .arg("-outfmt")
                .arg("6 std qlen slen")
                .arg("-evalue")
                .arg(format!("{}", evalue))
                .arg("-out")
                .arg(&out)
                .arg("-num_threads")
                .arg("1");
            run_command(&mut cmd, "blastp")?;
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;

    let results = with_suffix(output_prefix, ".results");
    {
        let mut writer = BufWriter::new(File::create(&results)?);
        for shard_output in &shard_outputs {
            let mut reader = File::open(shard_output).map_err(|e| PanfillError::HomologyParse(
                format!("Missing blastp output {}: {}", shard_output.display(), e),
            ))?;
            std::io::copy(&mut reader, &mut writer)?;
        }
    }
    debug!("Concatenated blastp output into {}", results.display());

    let hits = parse_blast_tabular(BufReader::new(File::open(&results)?))?;
    info!(
        "Finished blastp of {} sequences, found {} hits",
        proteins.len(),
        hits.len()
    );
    Ok(hits)
}

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::cluster_table::{Cluster, ClusterTable};
use crate::error::Result;

pub const SUMMARY_FILE_NAME: &str = "summary.tsv";

/// Cluster and protein counts of each partition after refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryStatistics {
    pub genome_count: usize,
    pub core_clusters: usize,
    pub core_proteins: usize,
    pub softcore_clusters: usize,
    pub softcore_proteins: usize,
    pub noncore_clusters: usize,
    pub noncore_proteins: usize,
    /// Noncore cluster size to the total number of proteins in clusters of
    /// that size.
    pub noncore_size_histogram: BTreeMap<usize, usize>,
}

fn protein_count<'a>(clusters: impl Iterator<Item = &'a Cluster>) -> usize {
    clusters.map(|c| c.size()).sum()
}

impl SummaryStatistics {
    pub fn from_table(table: &ClusterTable) -> SummaryStatistics {
        let mut noncore_size_histogram = BTreeMap::new();
        for cluster in table.noncore().values() {
            *noncore_size_histogram.entry(cluster.size()).or_insert(0) += cluster.size();
        }
        SummaryStatistics {
            genome_count: table.genome_count(),
            core_clusters: table.core().len(),
            core_proteins: protein_count(table.core().values()),
            softcore_clusters: table.softcore().len(),
            softcore_proteins: protein_count(table.softcore().values()),
            noncore_clusters: table.noncore().len(),
            noncore_proteins: protein_count(table.noncore().values()),
            noncore_size_histogram,
        }
    }

    /// Size labels and protein counts for the ring chart, smallest size
    /// first. The final segment `n<N>` holds all core and softcore proteins.
    pub fn ring_chart_segments(&self) -> (Vec<String>, Vec<usize>) {
        let mut labels = vec![];
        let mut counts = vec![];
        for (size, proteins) in &self.noncore_size_histogram {
            labels.push(if *size < 10 {
                format!("n0{}", size)
            } else {
                format!("n{}", size)
            });
            counts.push(*proteins);
        }
        labels.push(format!("n{}", self.genome_count));
        counts.push(self.core_proteins + self.softcore_proteins);
        (labels, counts)
    }

    pub fn log(&self) {
        info!(
            "Core: {} clusters, {} proteins. Softcore: {} clusters, {} proteins. Noncore: {} clusters, {} proteins.",
            self.core_clusters,
            self.core_proteins,
            self.softcore_clusters,
            self.softcore_proteins,
            self.noncore_clusters,
            self.noncore_proteins
        );
        for (size, proteins) in &self.noncore_size_histogram {
            debug!(
                "{} noncore proteins in clusters of size {}",
                proteins, size
            );
        }
    }

    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(["category", "clusters", "proteins"])?;
        for (category, clusters, proteins) in [
            ("core", self.core_clusters, self.core_proteins),
            ("softcore", self.softcore_clusters, self.softcore_proteins),
            ("noncore", self.noncore_clusters, self.noncore_proteins),
        ] {
            wtr.write_record(&[
                category.to_string(),
                clusters.to_string(),
                proteins.to_string(),
            ])?;
        }
        for (size, proteins) in &self.noncore_size_histogram {
            wtr.write_record(&[
                format!("noncore_size_{}", size),
                (proteins / size).to_string(),
                proteins.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_to_directory(&self, output_directory: &Path) -> Result<()> {
        let path = output_directory.join(SUMMARY_FILE_NAME);
        self.write_tsv(std::fs::File::create(&path)?)?;
        debug!("Wrote summary to {}", path.display());
        Ok(())
    }
}

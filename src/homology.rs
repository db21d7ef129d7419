use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::str::FromStr;

use crate::cluster_table::strain_of;
use crate::error::{PanfillError, Result};

/// Number of columns in BLAST tabular output run with `-outfmt "6 std qlen slen"`.
pub const BLAST_TABULAR_COLUMNS: usize = 14;

/// One directed hit from a query protein to a subject protein.
#[derive(Debug, Clone, PartialEq)]
pub struct HomologyHit {
    pub query: String,
    pub subject: String,
    pub percent_identity: f32,
    pub alignment_length: u32,
    pub query_length: u32,
    pub subject_length: u32,
    pub evalue: f64,
    pub bitscore: f32,
}

impl HomologyHit {
    pub fn subject_strain(&self) -> &str {
        strain_of(&self.subject)
    }

    /// Shorter over longer of the two sequence lengths.
    pub fn length_ratio(&self) -> f32 {
        let (short, long) = if self.query_length < self.subject_length {
            (self.query_length, self.subject_length)
        } else {
            (self.subject_length, self.query_length)
        };
        if long == 0 {
            0.0
        } else {
            short as f32 / long as f32
        }
    }
}

fn parse_field<T: FromStr>(record: &csv::StringRecord, index: usize, name: &str) -> Result<T> {
    record[index].trim().parse::<T>().map_err(|_| {
        PanfillError::HomologyParse(format!(
            "Failed to parse {} '{}' in record {:?}",
            name, &record[index], record
        ))
    })
}

/// Parse BLAST tabular output with the standard 12 columns followed by query
/// and subject lengths.
pub fn parse_blast_tabular<R: Read>(reader: R) -> Result<Vec<HomologyHit>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut hits = vec![];
    for record_res in rdr.records() {
        let record = record_res
            .map_err(|e| PanfillError::HomologyParse(format!("Error reading hits: {}", e)))?;
        if record.len() != BLAST_TABULAR_COLUMNS {
            return Err(PanfillError::HomologyParse(format!(
                "Expected {} columns in BLAST tabular output, found {}: {:?}",
                BLAST_TABULAR_COLUMNS,
                record.len(),
                record
            )));
        }
        hits.push(HomologyHit {
            query: record[0].to_string(),
            subject: record[1].to_string(),
            percent_identity: parse_field(&record, 2, "percent identity")?,
            alignment_length: parse_field(&record, 3, "alignment length")?,
            evalue: parse_field(&record, 10, "evalue")?,
            bitscore: parse_field(&record, 11, "bitscore")?,
            query_length: parse_field(&record, 12, "query length")?,
            subject_length: parse_field(&record, 13, "subject length")?,
        });
    }
    trace!("Parsed {} BLAST hits", hits.len());
    Ok(hits)
}

/// The hits of one all-vs-all search, grouped by query protein and ordered by
/// descending bitscore and then subject id. A query may hold several hits to
/// the same subject. Lookups apply the identity cutoff first and then use the
/// best remaining hit of each pair.
#[derive(Debug, Default)]
pub struct HomologyView {
    by_query: BTreeMap<String, Vec<HomologyHit>>,
}

impl HomologyView {
    pub fn new(hits: Vec<HomologyHit>) -> HomologyView {
        let mut by_query: BTreeMap<String, Vec<HomologyHit>> = BTreeMap::new();
        for hit in hits {
            by_query.entry(hit.query.clone()).or_default().push(hit);
        }
        for hits in by_query.values_mut() {
            hits.sort_by(|a, b| {
                b.bitscore
                    .total_cmp(&a.bitscore)
                    .then_with(|| a.subject.cmp(&b.subject))
            });
        }
        HomologyView { by_query }
    }

    pub fn num_queries(&self) -> usize {
        self.by_query.len()
    }

    /// Hits of `protein` with at least `min_identity` percent identity, one
    /// per subject.
    pub fn hits_for(&self, protein: &str, min_identity: f32) -> Vec<&HomologyHit> {
        let mut seen = BTreeSet::new();
        match self.by_query.get(protein) {
            Some(hits) => hits
                .iter()
                .filter(|h| h.percent_identity >= min_identity)
                .filter(|&h| seen.insert(h.subject.as_str()))
                .collect(),
            None => vec![],
        }
    }

    /// Best hit from `protein` to any protein of `strain`.
    pub fn top_hit_to_strain(
        &self,
        protein: &str,
        strain: &str,
        min_identity: f32,
    ) -> Option<&HomologyHit> {
        self.by_query.get(protein).and_then(|hits| {
            hits.iter()
                .find(|h| h.percent_identity >= min_identity && h.subject_strain() == strain)
        })
    }

    /// True when `subject` is the top hit to its own strain for at least
    /// `strain_cutoff` of the `query_set` proteins.
    pub fn is_reciprocal_top_hit(
        &self,
        query_set: &[&str],
        subject: &str,
        strain_cutoff: f32,
        min_identity: f32,
    ) -> bool {
        if query_set.is_empty() {
            return false;
        }
        let strain = strain_of(subject);
        let agreeing = query_set
            .iter()
            .filter(|q| {
                self.top_hit_to_strain(q, strain, min_identity)
                    .map_or(false, |h| h.subject == subject)
            })
            .count();
        agreeing as f32 / query_set.len() as f32 >= strain_cutoff
    }

    /// Fraction of `(from, to)` protein pairs in which `to` is the top hit of
    /// `from` to the strain of `to`.
    pub fn top_hit_fraction(&self, from: &[&str], to: &[&str], min_identity: f32) -> f32 {
        if from.is_empty() || to.is_empty() {
            return 0.0;
        }
        let agreeing: usize = to
            .iter()
            .map(|target| {
                let strain = strain_of(target);
                from.iter()
                    .filter(|f| {
                        self.top_hit_to_strain(f, strain, min_identity)
                            .map_or(false, |h| h.subject == *target)
                    })
                    .count()
            })
            .sum();
        agreeing as f32 / (from.len() * to.len()) as f32
    }
}

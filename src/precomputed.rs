use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{PanfillError, Result};
use crate::homology::{parse_blast_tabular, HomologyHit};
use crate::HomologySearcher;

/// Homology from an all-vs-all search run once before refinement. Each pass
/// sees only the hits whose query and subject are both in the current pool.
pub struct PrecomputedSearcher {
    hits: Vec<HomologyHit>,
}

impl PrecomputedSearcher {
    pub fn new(hits: Vec<HomologyHit>) -> PrecomputedSearcher {
        PrecomputedSearcher { hits }
    }

    pub fn from_path(path: &Path) -> Result<PrecomputedSearcher> {
        info!("Reading precomputed hits from {} ..", path.display());
        let file = std::fs::File::open(path).map_err(|e| {
            PanfillError::HomologyParse(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let hits = parse_blast_tabular(std::io::BufReader::new(file))?;
        info!("Read {} precomputed hits", hits.len());
        Ok(PrecomputedSearcher::new(hits))
    }
}

impl HomologySearcher for PrecomputedSearcher {
    fn method_name(&self) -> &str {
        "precomputed"
    }

    fn search(&self, proteins: &[&str], _output_prefix: &Path) -> Result<Vec<HomologyHit>> {
        let pool: BTreeSet<&str> = proteins.iter().copied().collect();
        let hits: Vec<HomologyHit> = self
            .hits
            .iter()
            .filter(|h| pool.contains(h.query.as_str()) && pool.contains(h.subject.as_str()))
            .cloned()
            .collect();
        debug!(
            "Restricted {} precomputed hits to {} within a pool of {} proteins",
            self.hits.len(),
            hits.len(),
            pool.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homology::tests::hit;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_restricted_to_pool() {
        init();
        let searcher = PrecomputedSearcher::new(vec![
            hit("1|a", "2|a", 90.0, 100.0),
            hit("1|a", "3|a", 90.0, 100.0),
            hit("3|a", "2|a", 90.0, 100.0),
        ]);
        let hits = searcher
            .search(&["1|a", "2|a"], Path::new("unused"))
            .unwrap();
        assert_eq!(1, hits.len());
        assert_eq!("2|a", hits[0].subject);
    }

    #[test]
    fn test_missing_file() {
        init();
        assert!(PrecomputedSearcher::from_path(Path::new("tests/data/does_not_exist.tsv")).is_err());
    }
}

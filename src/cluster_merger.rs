use std::ops::AddAssign;

use crate::cluster_table::{Category, Cluster, ClusterTable};
use crate::error::{PanfillError, Result};
use crate::gap_finder::MergeCandidates;

/// Merges carried out by one call to [`apply`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Merges that completed a cluster, moving it to softcore.
    pub softcore: usize,
    /// Merges whose result is still missing genomes.
    pub noncore: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.softcore + self.noncore
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: MergeStats) {
        self.softcore += other.softcore;
        self.noncore += other.noncore;
    }
}

/// Fill the empty slots of `query` with the members of `subject`.
fn splice(query: &Cluster, subject: &Cluster) -> Result<Vec<Option<String>>> {
    query
        .slots()
        .iter()
        .zip(subject.slots())
        .enumerate()
        .map(|(column, slots)| match slots {
            (Some(q), None) => Ok(Some(q.clone())),
            (None, Some(s)) => Ok(Some(s.clone())),
            (None, None) => Ok(None),
            (Some(q), Some(s)) => Err(PanfillError::InternalConsistencyFault(format!(
                "clusters {} and {} both have a member in genome column {} ({} and {})",
                query.label,
                subject.label,
                column + 1,
                q,
                s
            ))),
        })
        .collect()
}

/// Carry out the merges proposed by GapFinder. Candidates whose query or
/// subject has already been absorbed during this call, or whose strains now
/// overlap, are skipped.
pub fn apply(candidates: &MergeCandidates, table: &mut ClusterTable) -> Result<MergeStats> {
    let total_genomes = table.genome_count();
    let mut stats = MergeStats::default();

    for (query_id, subject_ids) in candidates {
        for subject_id in subject_ids {
            if query_id == subject_id {
                return Err(PanfillError::InternalConsistencyFault(format!(
                    "cluster {} proposed for merging with itself",
                    query_id
                )));
            }
            let (query, subject) = match (
                table.noncore().get(query_id),
                table.noncore().get(subject_id),
            ) {
                (Some(q), Some(s)) => (q, s),
                _ => {
                    debug!(
                        "Not merging {} and {} since one was already merged",
                        query_id, subject_id
                    );
                    continue;
                }
            };

            if !query.strains().is_disjoint(&subject.strains()) {
                debug!(
                    "Not merging {} and {} since they now share a strain",
                    query.label, subject.label
                );
                continue;
            }

            let merged_size = query.size() + subject.size();
            if merged_size > total_genomes {
                return Err(PanfillError::InternalConsistencyFault(format!(
                    "merging {} (size {}) and {} (size {}) would give {} members but there are only {} genomes",
                    query.label,
                    query.size(),
                    subject.label,
                    subject.size(),
                    merged_size,
                    total_genomes
                )));
            }
            let slots = splice(query, subject)?;

            info!(
                "{} (size: {}) has a homologous cluster: {} (size: {})",
                query.label,
                query.size(),
                subject.label,
                subject.size()
            );
            info!(
                "Merging smaller cluster {} into larger cluster {}, merged size {}",
                subject.label, query.label, merged_size
            );

            table.remove(*subject_id)?;
            if merged_size == total_genomes {
                table.promote(*query_id, slots, Category::Softcore)?;
                stats.softcore += 1;
            } else {
                table.promote(*query_id, slots, Category::Noncore)?;
                stats.noncore += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_table::ClusterId;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn table(text: &str) -> ClusterTable {
        ClusterTable::from_reader(text.as_bytes(), "----------").unwrap()
    }

    fn candidates(pairs: &[(usize, Vec<usize>)]) -> MergeCandidates {
        pairs
            .iter()
            .map(|(q, subjects)| {
                (
                    ClusterId(*q),
                    subjects.iter().map(|s| ClusterId(*s)).collect(),
                )
            })
            .collect()
    }

    fn slots(cluster: &Cluster) -> Vec<Option<&str>> {
        cluster.slots().iter().map(|s| s.as_deref()).collect()
    }

    #[test]
    fn test_merge_to_softcore() {
        init();
        let mut t = table(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\n\
             A\t1|p1\t2|p2\t3|p3\t----------\t----------\n\
             B\t----------\t----------\t----------\t4|p4\t5|p5\n",
        );
        let stats = apply(&candidates(&[(1, vec![2])]), &mut t).unwrap();
        assert_eq!(MergeStats { softcore: 1, noncore: 0 }, stats);
        assert!(t.noncore().is_empty());
        assert_eq!(
            vec![Some("1|p1"), Some("2|p2"), Some("3|p3"), Some("4|p4"), Some("5|p5")],
            slots(&t.softcore()[&ClusterId(1)])
        );
        assert_eq!("A", t.softcore()[&ClusterId(1)].label);
    }

    #[test]
    fn test_partial_merge_stays_noncore() {
        init();
        let mut t = table(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\n\
             A\t1|p1\t2|p2\t----------\t----------\t----------\n\
             B\t----------\t----------\t----------\t4|p4\t5|p5\n",
        );
        let stats = apply(&candidates(&[(1, vec![2])]), &mut t).unwrap();
        assert_eq!(MergeStats { softcore: 0, noncore: 1 }, stats);
        assert!(t.softcore().is_empty());
        assert_eq!(vec![ClusterId(1)], t.noncore().keys().cloned().collect::<Vec<_>>());
        assert_eq!(4, t.noncore()[&ClusterId(1)].size());
    }

    #[test]
    fn test_successive_merges_into_one_query() {
        init();
        let mut t = table(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\n\
             A\t1|p1\t2|p2\t3|p3\t----------\t----------\n\
             S1\t----------\t----------\t----------\t4|p4\t----------\n\
             S2\t----------\t----------\t----------\t----------\t5|p5\n",
        );
        let stats = apply(&candidates(&[(1, vec![2, 3])]), &mut t).unwrap();
        assert_eq!(MergeStats { softcore: 1, noncore: 1 }, stats);
        assert_eq!(2, stats.total());
        assert!(t.noncore().is_empty());
        assert_eq!(5, t.softcore()[&ClusterId(1)].size());
    }

    #[test]
    fn test_retired_and_overlapping_candidates_are_skipped() {
        init();
        let mut t = table(
            "core\t1|c\t2|c\t3|c\t4|c\n\
             A\t1|p1\t2|p2\t----------\t----------\n\
             B\t----------\t----------\t3|p3\t----------\n\
             C\t----------\t2|p9\t----------\t4|p4\n",
        );
        // B is absorbed by A, so the later B -> C candidate is skipped; A -> C
        // overlaps on strain 2.
        let stats = apply(&candidates(&[(1, vec![2, 3]), (2, vec![3])]), &mut t).unwrap();
        assert_eq!(MergeStats { softcore: 0, noncore: 1 }, stats);
        assert_eq!(
            vec![ClusterId(1), ClusterId(3)],
            t.noncore().keys().cloned().collect::<Vec<_>>()
        );
    }

    fn cluster(label: &str, slots: &[Option<&str>]) -> Cluster {
        Cluster::new(label, slots.iter().map(|s| s.map(String::from)).collect())
    }

    #[test]
    fn test_oversized_merge_is_a_fault() {
        init();
        let mut t = table(
            "core\ta|c\tb|c\tc|c\n\
             A\ta|1\tb|1\t----------\n",
        );
        // A well formed table can never hold B, whose strains match no column
        t.insert_noncore_unchecked(
            ClusterId(2),
            cluster("B", &[Some("x|1"), Some("y|1"), None]),
        );
        assert!(matches!(
            apply(&candidates(&[(1, vec![2])]), &mut t),
            Err(PanfillError::InternalConsistencyFault(_))
        ));
    }

    #[test]
    fn test_column_collision_is_a_fault() {
        init();
        let mut t = table(
            "core\ta|c\tb|c\tc|c\n\
             A\ta|1\t----------\t----------\n",
        );
        t.insert_noncore_unchecked(ClusterId(2), cluster("B", &[Some("c|1"), None, None]));
        assert!(matches!(
            apply(&candidates(&[(1, vec![2])]), &mut t),
            Err(PanfillError::InternalConsistencyFault(_))
        ));
        // Nothing was changed
        assert_eq!(2, t.noncore().len());
    }
}

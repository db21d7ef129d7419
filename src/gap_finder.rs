use std::collections::{BTreeMap, BTreeSet};

use crate::cluster_table::{Cluster, ClusterId, ClusterTable};
use crate::homology::{HomologyHit, HomologyView};

/// Thresholds used when deciding whether two noncore clusters are the same
/// gene family.
#[derive(Debug, Clone)]
pub struct GapParams {
    /// Percent identity a hit needs to be considered at all.
    pub min_identity: f32,
    /// Fraction of cluster members that must agree on each reciprocity test.
    pub strain_cutoff: f32,
    /// Minimum shorter/longer sequence length ratio between member and hit.
    pub min_length_ratio: f32,
}

impl Default for GapParams {
    fn default() -> GapParams {
        GapParams {
            min_identity: 30.0,
            strain_cutoff: 1.0,
            min_length_ratio: crate::MIN_LENGTH_RATIO,
        }
    }
}

/// Query cluster id mapped to the subject clusters proposed for merging into it.
pub type MergeCandidates = BTreeMap<ClusterId, Vec<ClusterId>>;

fn fraction(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

/// Propose merges for every noncore cluster with exactly `current_size`
/// members. The table is only read, merging happens afterwards.
pub fn find_candidates(
    current_size: usize,
    table: &ClusterTable,
    view: &HomologyView,
    params: &GapParams,
) -> MergeCandidates {
    let mut protein_to_cluster: BTreeMap<&str, ClusterId> = BTreeMap::new();
    for (id, cluster) in table.noncore() {
        for member in cluster.members() {
            protein_to_cluster.insert(member, *id);
        }
    }

    let mut candidates = MergeCandidates::new();
    for (query_id, query) in table.noncore() {
        if query.size() != current_size {
            continue;
        }
        let subjects =
            find_subjects_for_cluster(*query_id, query, table, &protein_to_cluster, view, params);
        if !subjects.is_empty() {
            candidates.insert(*query_id, subjects);
        }
    }
    debug!(
        "Found {} clusters of size {} with merge candidates",
        candidates.len(),
        current_size
    );
    candidates
}

fn find_subjects_for_cluster<'a>(
    query_id: ClusterId,
    query: &'a Cluster,
    table: &'a ClusterTable,
    protein_to_cluster: &BTreeMap<&str, ClusterId>,
    view: &'a HomologyView,
    params: &GapParams,
) -> Vec<ClusterId> {
    let members: Vec<&str> = query.members().collect();
    let query_strains = query.strains();
    let hit_dictionary: Vec<(&str, Vec<&HomologyHit>)> = members
        .iter()
        .map(|m| (*m, view.hits_for(m, params.min_identity)))
        .collect();
    let query_hit_subjects: BTreeSet<&str> = hit_dictionary
        .iter()
        .flat_map(|(_, hits)| hits.iter().map(|h| h.subject.as_str()))
        .collect();

    let mut found: BTreeSet<&str> = BTreeSet::new();
    let mut rejected: BTreeSet<ClusterId> = BTreeSet::new();
    let mut subjects = vec![];

    for (member, hits) in &hit_dictionary {
        for hit in hits {
            let strain = hit.subject_strain();
            if query_strains.contains(strain) || found.contains(strain) {
                continue;
            }
            if hit.length_ratio() < params.min_length_ratio {
                trace!(
                    "Length ratio {} of {} and {} is too low",
                    hit.length_ratio(),
                    member,
                    hit.subject
                );
                continue;
            }
            if !view.is_reciprocal_top_hit(
                &members,
                &hit.subject,
                params.strain_cutoff,
                params.min_identity,
            ) {
                continue;
            }

            let subject_id = match protein_to_cluster.get(hit.subject.as_str()) {
                Some(id) => *id,
                None => continue,
            };
            if rejected.contains(&subject_id) {
                continue;
            }
            let subject = &table.noncore()[&subject_id];
            if query.size() + subject.size() > table.genome_count() {
                trace!(
                    "Cluster {} too large to fill gaps in {}",
                    subject.label,
                    query.label
                );
                rejected.insert(subject_id);
                continue;
            }

            let reciprocity = ReciprocityCheck {
                query_members: &members,
                query_strains: &query_strains,
                query_hit_subjects: &query_hit_subjects,
                view,
                params,
            };
            if let Err(reason) = reciprocity.check(subject) {
                trace!(
                    "Cluster {} is not reciprocal with {}: {:?}",
                    subject.label,
                    query.label,
                    reason
                );
                rejected.insert(subject_id);
                continue;
            }

            debug!(
                "Cluster {} {} (size {}) has a reciprocal homolog cluster {} {} (size {})",
                query.label,
                query_id,
                query.size(),
                subject.label,
                subject_id,
                subject.size()
            );
            found.extend(subject.strains());
            subjects.push(subject_id);
        }
    }
    subjects
}

/// Reciprocity between a query cluster and one subject cluster.
///
/// Both directions require strain-scoped top hits: for at least
/// `strain_cutoff` of all (query member, subject member) pairs, each protein
/// must be the other's best hit within its strain. A multi-member subject must
/// also be covered collectively by the query's hits and vice versa, and must
/// not share a strain with the query. For a singleton these extra conditions
/// hold by construction, since the subject was reached through a hit to a
/// strain the query lacks.
struct ReciprocityCheck<'a> {
    query_members: &'a [&'a str],
    query_strains: &'a BTreeSet<&'a str>,
    query_hit_subjects: &'a BTreeSet<&'a str>,
    view: &'a HomologyView,
    params: &'a GapParams,
}

/// Why a subject failed [`ReciprocityCheck::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    SubjectNotCoveredByQueryHits,
    SharedStrain,
    QueryNotCoveredBySubjectHits,
    ForwardTopHits,
    ReverseTopHits,
}

impl ReciprocityCheck<'_> {
    fn check(&self, subject: &Cluster) -> std::result::Result<(), Rejection> {
        let subject_members: Vec<&str> = subject.members().collect();
        let cutoff = self.params.strain_cutoff;
        let min_identity = self.params.min_identity;

        // Coverage is implied by the top hit fractions below.
        if subject_members.len() > 1 {
            let covered = subject_members
                .iter()
                .filter(|s| self.query_hit_subjects.contains(*s))
                .count();
            if fraction(covered, subject_members.len()) < cutoff {
                return Err(Rejection::SubjectNotCoveredByQueryHits);
            }

            if subject
                .strains()
                .iter()
                .any(|s| self.query_strains.contains(s))
            {
                return Err(Rejection::SharedStrain);
            }

            let subject_hit_subjects: BTreeSet<&str> = subject_members
                .iter()
                .flat_map(|s| self.view.hits_for(s, min_identity))
                .map(|h| h.subject.as_str())
                .collect();
            let recovered = self
                .query_members
                .iter()
                .filter(|q| subject_hit_subjects.contains(*q))
                .count();
            if fraction(recovered, self.query_members.len()) < cutoff {
                return Err(Rejection::QueryNotCoveredBySubjectHits);
            }
        }

        let forward = self
            .view
            .top_hit_fraction(self.query_members, &subject_members, min_identity);
        if forward < cutoff {
            return Err(Rejection::ForwardTopHits);
        }
        let reverse = self
            .view
            .top_hit_fraction(&subject_members, self.query_members, min_identity);
        if reverse < cutoff {
            return Err(Rejection::ReverseTopHits);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homology::tests::hit;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const MARKER: &str = "----------";

    fn table(text: &str) -> ClusterTable {
        ClusterTable::from_reader(text.as_bytes(), MARKER).unwrap()
    }

    /// Hits in both directions between every protein of `a` and every protein of `b`.
    fn all_reciprocal(a: &[&str], b: &[&str], bitscore: f32) -> Vec<HomologyHit> {
        let mut hits = vec![];
        for x in a {
            for y in b {
                hits.push(hit(x, y, 80.0, bitscore));
                hits.push(hit(y, x, 80.0, bitscore));
            }
        }
        hits
    }

    fn five_genome_table(extra: &str) -> ClusterTable {
        table(&format!(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\n\
             A\t1|p1\t2|p2\t3|p3\t----------\t----------\n\
             B\t----------\t----------\t----------\t4|p4\t5|p5\n{}",
            extra
        ))
    }

    #[test]
    fn test_reciprocal_clusters_become_candidates() {
        init();
        let t = five_genome_table("");
        let mut hits = all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|p4", "5|p5"], 200.0);
        hits.extend(all_reciprocal(&["1|p1"], &["2|p2", "3|p3"], 200.0));
        hits.extend(all_reciprocal(&["2|p2"], &["3|p3"], 200.0));
        let view = HomologyView::new(hits);

        let candidates = find_candidates(3, &t, &view, &GapParams::default());
        let mut expected = MergeCandidates::new();
        expected.insert(ClusterId(1), vec![ClusterId(2)]);
        assert_eq!(expected, candidates);

        // And from the smaller cluster's point of view
        let candidates = find_candidates(2, &t, &view, &GapParams::default());
        let mut expected = MergeCandidates::new();
        expected.insert(ClusterId(2), vec![ClusterId(1)]);
        assert_eq!(expected, candidates);
    }

    #[test]
    fn test_broken_top_hit_blocks_merge() {
        init();
        let t = five_genome_table("C\t----------\t----------\t----------\t4|p6\t----------\n");
        let mut hits = all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|p4", "5|p5"], 200.0);
        // p2 prefers p6 in strain 4
        hits.push(hit("2|p2", "4|p6", 80.0, 400.0));
        hits.push(hit("4|p6", "2|p2", 80.0, 400.0));
        let view = HomologyView::new(hits);

        assert!(find_candidates(3, &t, &view, &GapParams::default()).is_empty());
    }

    #[test]
    fn test_relaxed_strain_cutoff_allows_merge() {
        init();
        let t = five_genome_table("C\t----------\t----------\t----------\t4|p6\t----------\n");
        let mut hits = all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|p4", "5|p5"], 200.0);
        hits.push(hit("2|p2", "4|p6", 80.0, 400.0));
        hits.push(hit("4|p6", "2|p2", 80.0, 400.0));
        let view = HomologyView::new(hits);

        let params = GapParams {
            strain_cutoff: 0.6,
            ..GapParams::default()
        };
        let candidates = find_candidates(3, &t, &view, &params);
        assert_eq!(Some(&vec![ClusterId(2)]), candidates.get(&ClusterId(1)));
    }

    #[test]
    fn test_singleton_subject() {
        init();
        let t = table(
            "core\t1|c\t2|c\t3|c\n\
             A\t1|p1\t2|p2\t----------\n\
             S\t----------\t----------\t3|p3\n",
        );
        let view = HomologyView::new(all_reciprocal(&["1|p1", "2|p2"], &["3|p3"], 150.0));
        let candidates = find_candidates(2, &t, &view, &GapParams::default());
        assert_eq!(Some(&vec![ClusterId(2)]), candidates.get(&ClusterId(1)));
    }

    #[test]
    fn test_singleton_without_reverse_top_hit() {
        init();
        let t = table(
            "core\t1|c\t2|c\t3|c\n\
             A\t1|p1\t2|p2\t----------\n\
             S\t----------\t----------\t3|p3\n\
             D\t----------\t2|p9\t----------\n",
        );
        let mut hits = all_reciprocal(&["1|p1", "2|p2"], &["3|p3"], 150.0);
        // p3 prefers p9 in strain 2
        hits.push(hit("3|p3", "2|p9", 90.0, 300.0));
        let view = HomologyView::new(hits);
        assert!(find_candidates(2, &t, &view, &GapParams::default()).is_empty());
    }

    #[test]
    fn test_oversized_subject_is_skipped() {
        init();
        let t = five_genome_table("D\t----------\t----------\t3|q3\t4|q4\t5|q5\n");
        let mut hits = all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|q4", "5|q5"], 500.0);
        hits.extend(all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|p4", "5|p5"], 100.0));
        let view = HomologyView::new(hits);

        let candidates = find_candidates(3, &t, &view, &GapParams::default());
        // D would overflow the genome count, so nothing is proposed from A
        assert!(candidates.get(&ClusterId(1)).is_none());
    }

    #[test]
    fn test_several_subjects_for_one_query() {
        init();
        let t = table(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\n\
             A\t1|p1\t2|p2\t3|p3\t----------\t----------\n\
             S1\t----------\t----------\t----------\t4|p4\t----------\n\
             S2\t----------\t----------\t----------\t----------\t5|p5\n",
        );
        let mut hits = all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["4|p4"], 300.0);
        hits.extend(all_reciprocal(&["1|p1", "2|p2", "3|p3"], &["5|p5"], 200.0));
        let view = HomologyView::new(hits);

        let candidates = find_candidates(3, &t, &view, &GapParams::default());
        assert_eq!(
            Some(&vec![ClusterId(2), ClusterId(3)]),
            candidates.get(&ClusterId(1))
        );
    }

    #[test]
    fn test_identity_and_length_gates() {
        init();
        let t = table(
            "core\t1|c\t2|c\n\
             A\t1|p1\t----------\n\
             S\t----------\t2|p2\n",
        );
        let low_identity = HomologyView::new(vec![
            hit("1|p1", "2|p2", 25.0, 90.0),
            hit("2|p2", "1|p1", 25.0, 90.0),
        ]);
        assert!(find_candidates(1, &t, &low_identity, &GapParams::default()).is_empty());

        let mut short = hit("1|p1", "2|p2", 80.0, 90.0);
        short.subject_length = 50;
        let mut short_back = hit("2|p2", "1|p1", 80.0, 90.0);
        short_back.query_length = 50;
        let view = HomologyView::new(vec![short, short_back]);
        assert!(find_candidates(1, &t, &view, &GapParams::default()).is_empty());

        let view = HomologyView::new(all_reciprocal(&["1|p1"], &["2|p2"], 90.0));
        let candidates = find_candidates(1, &t, &view, &GapParams::default());
        assert_eq!(Some(&vec![ClusterId(2)]), candidates.get(&ClusterId(1)));
    }

    fn reciprocity(
        t: &ClusterTable,
        view: &HomologyView,
        query: usize,
        subject: usize,
    ) -> std::result::Result<(), Rejection> {
        let params = GapParams::default();
        let query = &t.noncore()[&ClusterId(query)];
        let members: Vec<&str> = query.members().collect();
        let query_strains = query.strains();
        let query_hit_subjects: BTreeSet<&str> = members
            .iter()
            .flat_map(|m| view.hits_for(m, params.min_identity))
            .map(|h| h.subject.as_str())
            .collect();
        ReciprocityCheck {
            query_members: &members,
            query_strains: &query_strains,
            query_hit_subjects: &query_hit_subjects,
            view,
            params: &params,
        }
        .check(&t.noncore()[&ClusterId(subject)])
    }

    fn four_genome_table() -> ClusterTable {
        table(
            "core\t1|c\t2|c\t3|c\t4|c\n\
             Q\t1|q1\t2|q2\t----------\t----------\n\
             S\t----------\t----------\t3|s3\t4|s4\n",
        )
    }

    #[test]
    fn test_subject_sharing_a_strain_is_rejected() {
        init();
        let t = table(
            "core\t1|c\t2|c\t3|c\t4|c\t5|c\t6|c\n\
             Q\t1|q1\t2|q2\t3|q3\t----------\t----------\t----------\n\
             S\t----------\t----------\t3|s3\t4|s4\t5|s5\t----------\n",
        );
        let view = HomologyView::new(all_reciprocal(
            &["1|q1", "2|q2", "3|q3"],
            &["3|s3", "4|s4", "5|s5"],
            200.0,
        ));
        assert_eq!(Err(Rejection::SharedStrain), reciprocity(&t, &view, 1, 2));
        assert!(find_candidates(3, &t, &view, &GapParams::default()).is_empty());
    }

    #[test]
    fn test_subject_not_covered_by_query_hits_is_rejected() {
        init();
        let t = four_genome_table();
        let mut hits = all_reciprocal(&["1|q1", "2|q2"], &["3|s3"], 200.0);
        // s4 finds the query but no query member finds s4
        hits.push(hit("4|s4", "1|q1", 80.0, 200.0));
        hits.push(hit("4|s4", "2|q2", 80.0, 200.0));
        let view = HomologyView::new(hits);
        assert_eq!(
            Err(Rejection::SubjectNotCoveredByQueryHits),
            reciprocity(&t, &view, 1, 2)
        );
        assert_eq!(
            Err(Rejection::QueryNotCoveredBySubjectHits),
            reciprocity(&t, &view, 2, 1)
        );
        assert!(find_candidates(2, &t, &view, &GapParams::default()).is_empty());
    }

    #[test]
    fn test_query_not_covered_by_subject_hits_is_rejected() {
        init();
        let t = four_genome_table();
        let view = HomologyView::new(vec![
            hit("1|q1", "3|s3", 80.0, 200.0),
            hit("1|q1", "4|s4", 80.0, 200.0),
            hit("2|q2", "3|s3", 80.0, 200.0),
            hit("2|q2", "4|s4", 80.0, 200.0),
            // Nothing in the subject finds q2
            hit("3|s3", "1|q1", 80.0, 200.0),
            hit("4|s4", "1|q1", 80.0, 200.0),
        ]);
        assert_eq!(
            Err(Rejection::QueryNotCoveredBySubjectHits),
            reciprocity(&t, &view, 1, 2)
        );
        assert!(find_candidates(2, &t, &view, &GapParams::default()).is_empty());
    }

    #[test]
    fn test_fully_reciprocal_clusters_pass() {
        init();
        let t = four_genome_table();
        let view = HomologyView::new(all_reciprocal(&["1|q1", "2|q2"], &["3|s3", "4|s4"], 200.0));
        assert_eq!(Ok(()), reciprocity(&t, &view, 1, 2));
        assert_eq!(Ok(()), reciprocity(&t, &view, 2, 1));
    }
}

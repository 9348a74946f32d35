//! Match classification: turns scored pairs into accepted match edges.

use std::cmp::Ordering;

use ahash::AHashSet;
use tracing::debug;

use crate::candidates::CandidatePair;
use crate::config::MatchPolicy;
use crate::error::Result;
use crate::record::{RecordId, RecordStore};
use crate::similarity::SimilarityScore;

/// A candidate pair accepted as a match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchEdge {
    pair: CandidatePair,
    score: f64,
}

impl MatchEdge {
    pub fn new(pair: CandidatePair, score: f64) -> Self {
        Self { pair, score }
    }

    pub fn pair(&self) -> CandidatePair {
        self.pair
    }

    pub fn a(&self) -> RecordId {
        self.pair.a()
    }

    pub fn b(&self) -> RecordId {
        self.pair.b()
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Ranking used by the one-to-one policy: score descending, then pair ascending
fn rank(x: &MatchEdge, y: &MatchEdge) -> Ordering {
    y.score
        .total_cmp(&x.score)
        .then_with(|| x.pair.cmp(&y.pair))
}

#[derive(Clone, Copy, Debug)]
pub struct MatchClassifier {
    threshold: f64,
    policy: MatchPolicy,
}

impl MatchClassifier {
    pub fn new(threshold: f64, policy: MatchPolicy) -> Self {
        Self { threshold, policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Whether a score clears the threshold
    pub fn passes(&self, score: &SimilarityScore) -> bool {
        score.score() >= self.threshold
    }

    /// Threshold filter only; safe to apply batch by batch
    pub fn accept(&self, scores: &[SimilarityScore]) -> Vec<MatchEdge> {
        scores
            .iter()
            .filter(|s| self.passes(s))
            .map(|s| MatchEdge::new(s.pair(), s.score()))
            .collect()
    }

    /// Apply the policy constraint to threshold-passing edges.
    ///
    /// Returns edges in canonical pair order. Fails with `NotFound` if the
    /// one-to-one policy meets an edge to a record outside `store`.
    pub fn finalize(&self, store: &RecordStore, mut edges: Vec<MatchEdge>) -> Result<Vec<MatchEdge>> {
        if self.policy == MatchPolicy::OneToOne {
            edges = one_to_one(store, edges)?;
        }
        edges.sort_unstable_by(|x, y| x.pair.cmp(&y.pair));
        Ok(edges)
    }

    /// Threshold then policy, in one call
    pub fn classify(
        &self,
        store: &RecordStore,
        scores: &[SimilarityScore],
    ) -> Result<Vec<MatchEdge>> {
        self.finalize(store, self.accept(scores))
    }
}

/// Greedy best-first matching: a record keeps at most one partner per
/// counterpart collection
fn one_to_one(store: &RecordStore, mut edges: Vec<MatchEdge>) -> Result<Vec<MatchEdge>> {
    edges.sort_unstable_by(rank);

    // (record, counterpart collection) for both ends of every edge
    let sides = edges
        .iter()
        .map(|edge| {
            let collection_a = store.get(edge.a())?.collection();
            let collection_b = store.get(edge.b())?.collection();
            Ok(((edge.a(), collection_b), (edge.b(), collection_a)))
        })
        .collect::<Result<Vec<_>>>()?;

    let before = edges.len();
    let mut taken: AHashSet<(RecordId, u32)> = AHashSet::with_capacity(before * 2);
    let kept: Vec<MatchEdge> = edges
        .into_iter()
        .zip(sides)
        .filter(|(_, (side_a, side_b))| {
            if taken.contains(side_a) || taken.contains(side_b) {
                return false;
            }
            taken.insert(*side_a);
            taken.insert(*side_b);
            true
        })
        .map(|(edge, _)| edge)
        .collect();

    debug!(
        kept = kept.len(),
        dropped = before - kept.len(),
        "classify: one-to-one constraint applied"
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Comparator, FieldComparison};
    use crate::record::FieldValue;
    use crate::similarity::SimilarityScorer;

    fn linkage_store() -> RecordStore {
        // left: 0, 1    right: 2, 3
        RecordStore::load(vec![
            ("left", "l0", vec![("title", FieldValue::from("a b c d"))]),
            ("left", "l1", vec![("title", FieldValue::from("a b c e"))]),
            ("right", "r0", vec![("title", FieldValue::from("a b c d"))]),
            ("right", "r1", vec![("title", FieldValue::from("a b c e"))]),
        ])
        .unwrap()
    }

    fn scores(store: &RecordStore) -> Vec<SimilarityScore> {
        let scorer = SimilarityScorer::new(
            store,
            &[FieldComparison {
                field: "title".into(),
                comparator: Comparator::TokenSet,
                weight: 1.0,
                missing: 0.0,
            }],
        );
        let pairs = [(0, 2), (0, 3), (1, 2), (1, 3)];
        pairs
            .iter()
            .map(|&(a, b)| {
                scorer
                    .score(CandidatePair::new(RecordId(a), RecordId(b)).unwrap())
                    .unwrap()
            })
            .collect()
    }

    fn ends(edges: &[MatchEdge]) -> Vec<(u32, u32)> {
        edges.iter().map(|e| (e.a().0, e.b().0)).collect()
    }

    #[test]
    fn test_threshold_policy() {
        let store = linkage_store();
        let classifier = MatchClassifier::new(0.5, MatchPolicy::Threshold);
        let edges = classifier.classify(&store, &scores(&store)).unwrap();
        // exact pairs score 1.0, cross pairs 3/5
        assert_eq!(ends(&edges), vec![(0, 2), (0, 3), (1, 2), (1, 3)]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let store = linkage_store();
        let classifier = MatchClassifier::new(0.6, MatchPolicy::Threshold);
        assert_eq!(classifier.classify(&store, &scores(&store)).unwrap().len(), 4);
        let classifier = MatchClassifier::new(0.61, MatchPolicy::Threshold);
        assert_eq!(classifier.classify(&store, &scores(&store)).unwrap().len(), 2);
    }

    #[test]
    fn test_one_to_one_keeps_best() {
        let store = linkage_store();
        let classifier = MatchClassifier::new(0.5, MatchPolicy::OneToOne);
        let edges = classifier.classify(&store, &scores(&store)).unwrap();
        assert_eq!(ends(&edges), vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn test_one_to_one_tie_break_by_pair() {
        let store = linkage_store();
        let pair = |a, b| CandidatePair::new(RecordId(a), RecordId(b)).unwrap();
        let edges = vec![
            MatchEdge::new(pair(1, 2), 0.8),
            MatchEdge::new(pair(0, 2), 0.8),
            MatchEdge::new(pair(0, 3), 0.8),
        ];
        let classifier = MatchClassifier::new(0.5, MatchPolicy::OneToOne);
        let kept = classifier.finalize(&store, edges).unwrap();
        // (0,2) wins the tie, which blocks (1,2) and (0,3)
        assert_eq!(ends(&kept), vec![(0, 2)]);
    }

    #[test]
    fn test_one_to_one_within_single_collection() {
        let store = RecordStore::load(vec![
            ("c", "0", vec![("t", FieldValue::from("x"))]),
            ("c", "1", vec![("t", FieldValue::from("x"))]),
            ("c", "2", vec![("t", FieldValue::from("x"))]),
        ])
        .unwrap();
        let pair = |a, b| CandidatePair::new(RecordId(a), RecordId(b)).unwrap();
        let edges = vec![
            MatchEdge::new(pair(0, 1), 0.9),
            MatchEdge::new(pair(1, 2), 0.95),
            MatchEdge::new(pair(0, 2), 0.7),
        ];
        let kept = MatchClassifier::new(0.5, MatchPolicy::OneToOne)
            .finalize(&store, edges)
            .unwrap();
        assert_eq!(ends(&kept), vec![(1, 2)]);
    }

    #[test]
    fn test_one_to_one_rejects_unknown_record() {
        let store = linkage_store();
        let edge = MatchEdge::new(CandidatePair::new(RecordId(0), RecordId(9)).unwrap(), 0.9);
        assert!(matches!(
            MatchClassifier::new(0.5, MatchPolicy::OneToOne).finalize(&store, vec![edge]),
            Err(crate::error::ResolveError::NotFound { .. })
        ));
    }
}

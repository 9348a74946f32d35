//! End-to-end resolution: blocking, candidates, scoring, classification,
//! clustering.
//!
//! Candidate pairs are pulled from the lazy generator in batches and each
//! batch is scored on the rayon pool. Cancellation and the deadline are
//! checked between batches; clustering always runs to completion on the
//! edges accepted so far.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::blocking::BlockingIndex;
use crate::candidates::generate;
use crate::classify::{MatchClassifier, MatchEdge};
use crate::cluster::{cluster, ClusterAssignment};
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::record::RecordStore;
use crate::similarity::SimilarityScorer;

/// Shared flag that asks a running resolution to stop generating work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Caller-side limits on a run.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl RunControl {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub records: usize,
    pub blocks: usize,
    pub largest_block: usize,
    pub overflow_records: usize,
    pub candidates: usize,
    pub duplicate_pairs: usize,
    pub matches: usize,
    pub clusters: usize,
}

/// Output of one resolution run.
#[derive(Debug)]
pub struct Resolution {
    pub assignment: ClusterAssignment,
    /// Accepted edges, in canonical pair order
    pub edges: Vec<MatchEdge>,
    pub stats: ResolveStats,
    /// Recovered degradations (schema mismatches, truncations)
    pub warnings: Vec<ResolveError>,
    /// False if cancellation or the deadline cut candidate generation short
    pub complete: bool,
}

impl Resolution {
    /// `(record external id, cluster external id)` for every record
    pub fn labels(&self, store: &RecordStore) -> Result<Vec<(String, String)>> {
        self.assignment
            .iter()
            .map(|(id, cluster)| Ok((store.external_id(id)?, store.external_id(cluster)?)))
            .collect()
    }
}

pub struct Resolver {
    config: ResolverConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Resolver {
    /// Validate `config` and set up the worker pool
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let pool = match config.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("specmatch-{i}"))
                    .build()
                    .map_err(|e| ResolveError::invalid(format!("worker pool: {e}")))?,
            ),
            None => None,
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(&self, store: &RecordStore) -> Result<Resolution> {
        self.resolve_with(store, &RunControl::default())
    }

    pub fn resolve_with(&self, store: &RecordStore, control: &RunControl) -> Result<Resolution> {
        match &self.pool {
            Some(pool) => pool.install(|| self.run(store, control)),
            None => self.run(store, control),
        }
    }

    fn run(&self, store: &RecordStore, control: &RunControl) -> Result<Resolution> {
        let config = &self.config;
        let started = Instant::now();
        info!(records = store.len(), "resolve: starting");

        let mut index = BlockingIndex::build(store, &config.blocking);
        let mut warnings = index.take_warnings();
        info!(
            blocks = index.len(),
            largest = index.largest_block(),
            pair_bound = index.pair_upper_bound(),
            "resolve: blocking done"
        );

        let mut scorer = SimilarityScorer::new(store, &config.fields);
        warnings.extend(scorer.take_warnings());
        let classifier = MatchClassifier::new(config.threshold, config.policy);

        let mut candidates = generate(&index).with_limit(config.max_candidates);
        let mut edges: Vec<MatchEdge> = Vec::new();
        let mut complete = true;
        let mut batch = Vec::with_capacity(config.batch_size);
        loop {
            if control.should_stop() {
                warn!(
                    scored = candidates.emitted(),
                    "resolve: stopped early; clustering edges accepted so far"
                );
                complete = false;
                break;
            }
            batch.clear();
            batch.extend(candidates.by_ref().take(config.batch_size));
            if batch.is_empty() {
                break;
            }
            let scores = scorer.score_batch(&batch)?;
            edges.extend(classifier.accept(&scores));
            debug!(
                scored = candidates.emitted(),
                accepted = edges.len(),
                "resolve: batch scored"
            );
        }

        if let Some(limit) = config.max_candidates {
            if candidates.truncated() {
                let err = ResolveError::CapacityExceeded {
                    what: "candidate set".to_string(),
                    limit,
                    actual: index.pair_upper_bound(),
                };
                warn!("resolve: {err}");
                warnings.push(err);
            }
        }

        let edges = classifier.finalize(store, edges)?;
        let assignment = cluster(store.len(), &edges)?;

        let stats = ResolveStats {
            records: store.len(),
            blocks: index.len(),
            largest_block: index.largest_block(),
            overflow_records: index.overflow().map_or(0, |b| b.len()),
            candidates: candidates.emitted(),
            duplicate_pairs: candidates.duplicates(),
            matches: edges.len(),
            clusters: assignment.cluster_count(),
        };
        info!(
            candidates = stats.candidates,
            matches = stats.matches,
            clusters = stats.clusters,
            elapsed_ms = started.elapsed().as_millis(),
            "resolve: done"
        );

        Ok(Resolution {
            assignment,
            edges,
            stats,
            warnings,
            complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlockingConfig, BlockingStrategy, Comparator, FieldComparison, MatchPolicy};
    use crate::record::{FieldValue, RecordId};

    fn token_config(threshold: f64) -> ResolverConfig {
        ResolverConfig {
            threshold,
            policy: MatchPolicy::Threshold,
            threads: Some(2),
            max_candidates: None,
            batch_size: 2,
            blocking: BlockingConfig {
                keys: vec![BlockingStrategy::Tokens {
                    field: "title".into(),
                    min_len: 1,
                }],
                max_block_size: 100,
                overflow_cap: 100,
                seed: 3,
            },
            fields: vec![FieldComparison {
                field: "title".into(),
                comparator: Comparator::TokenSet,
                weight: 1.0,
                missing: 0.0,
            }],
        }
    }

    fn store(titles: &[&str]) -> RecordStore {
        RecordStore::load(
            titles
                .iter()
                .enumerate()
                .map(|(i, t)| ("", i.to_string(), vec![("title", FieldValue::from(*t))])),
        )
        .unwrap()
    }

    #[test]
    fn test_iphone_scenario() {
        let store = store(&["Apple iPhone 12", "iPhone 12 by Apple"]);
        let resolution = Resolver::new(token_config(0.5)).unwrap().resolve(&store).unwrap();
        assert!(resolution.complete);
        assert_eq!(resolution.stats.matches, 1);
        assert_eq!(
            resolution.assignment.cluster_of(RecordId(1)),
            Some(RecordId(0))
        );
    }

    #[test]
    fn test_invalid_config_fails_before_run() {
        let mut config = token_config(0.5);
        config.fields[0].weight = 0.3;
        assert!(matches!(
            Resolver::new(config),
            Err(ResolveError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_cancelled_run_still_partitions() {
        let store = store(&["a b", "a b", "a c", "d"]);
        let control = RunControl::default();
        control.cancel.cancel();
        let resolution = Resolver::new(token_config(0.1))
            .unwrap()
            .resolve_with(&store, &control)
            .unwrap();
        assert!(!resolution.complete);
        assert_eq!(resolution.stats.candidates, 0);
        assert_eq!(resolution.assignment.len(), 4);
        assert_eq!(resolution.assignment.cluster_count(), 4);
    }

    #[test]
    fn test_candidate_cap_warns() {
        let store = store(&["x", "x", "x", "x"]);
        let mut config = token_config(0.5);
        config.max_candidates = Some(3);
        let resolution = Resolver::new(config).unwrap().resolve(&store).unwrap();
        assert_eq!(resolution.stats.candidates, 3);
        assert!(resolution
            .warnings
            .iter()
            .any(|w| matches!(w, ResolveError::CapacityExceeded { limit: 3, .. })));
        // Pairs (0,1), (0,2), (0,3) already join everything
        assert_eq!(resolution.stats.clusters, 1);
    }

    #[test]
    fn test_cap_equal_to_distinct_pairs_is_silent() {
        let store = store(&["a b", "a b", "a b"]);
        let mut config = token_config(0.5);
        config.max_candidates = Some(3);
        let resolution = Resolver::new(config).unwrap().resolve(&store).unwrap();
        assert_eq!(resolution.stats.candidates, 3);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_expired_deadline_stops_before_scoring() {
        let store = store(&["a b", "a b", "a c", "d"]);
        let control = RunControl {
            deadline: Some(Instant::now()),
            ..RunControl::default()
        };
        let resolution = Resolver::new(token_config(0.1))
            .unwrap()
            .resolve_with(&store, &control)
            .unwrap();
        assert!(!resolution.complete);
        assert_eq!(resolution.stats.candidates, 0);
        assert!(resolution.edges.is_empty());
        assert_eq!(resolution.assignment.cluster_count(), 4);
    }

    #[test]
    fn test_labels_use_external_ids() {
        let store = RecordStore::load(vec![
            ("www.a.com", "1", vec![("title", FieldValue::from("sony a7"))]),
            ("www.b.com", "9", vec![("title", FieldValue::from("sony a7"))]),
        ])
        .unwrap();
        let resolution = Resolver::new(token_config(0.5)).unwrap().resolve(&store).unwrap();
        let labels = resolution.labels(&store).unwrap();
        assert_eq!(
            labels,
            vec![
                ("www.a.com//1".to_string(), "www.a.com//1".to_string()),
                ("www.b.com//9".to_string(), "www.a.com//1".to_string()),
            ]
        );
    }
}

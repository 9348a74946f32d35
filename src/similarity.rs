//! Multi-field similarity scoring of candidate pairs.
//!
//! Each configured [`FieldComparison`] yields a per-field similarity in
//! `[0, 1]`; the pair score is their weighted arithmetic mean. Field values
//! are normalized once per record when the scorer is built, so scoring a
//! pair does no allocation beyond token sets.

use rayon::prelude::*;
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::warn;

use crate::candidates::CandidatePair;
use crate::config::{Comparator, FieldComparison};
use crate::error::{ResolveError, Result};
use crate::record::{FieldSlot, RecordId, RecordStore};
use crate::text::{normalize, token_set, token_sort_similarity};

/// Scalar similarity attached to a candidate pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityScore {
    pair: CandidatePair,
    score: f64,
}

impl SimilarityScore {
    pub fn pair(&self) -> CandidatePair {
        self.pair
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// One record's field value, normalized for comparison.
#[derive(Clone, Debug, PartialEq)]
enum Prepared {
    Missing,
    Value { norm: String, number: Option<f64> },
}

/// A field comparison bound to the schema, with per-record prepared values.
struct BoundComparison {
    comparator: Comparator,
    weight: f64,
    missing: f64,
    /// `None` when the field is not in the schema at all
    values: Option<Vec<Prepared>>,
}

impl BoundComparison {
    fn similarity(&self, a: RecordId, b: RecordId) -> f64 {
        let Some(values) = &self.values else {
            return 0.0;
        };
        match (&values[a.index()], &values[b.index()]) {
            (
                Prepared::Value {
                    norm: norm_a,
                    number: num_a,
                },
                Prepared::Value {
                    norm: norm_b,
                    number: num_b,
                },
            ) => {
                // Fixed operand order makes every comparator symmetric
                let (x, nx, y, ny) = if norm_a <= norm_b {
                    (norm_a.as_str(), *num_a, norm_b.as_str(), *num_b)
                } else {
                    (norm_b.as_str(), *num_b, norm_a.as_str(), *num_a)
                };
                compare(&self.comparator, x, nx, y, ny).clamp(0.0, 1.0)
            }
            _ => self.missing,
        }
    }
}

/// Per-field similarity of two present, normalized values
fn compare(comparator: &Comparator, x: &str, nx: Option<f64>, y: &str, ny: Option<f64>) -> f64 {
    match comparator {
        Comparator::Exact => f64::from(u8::from(x == y)),
        Comparator::Levenshtein => normalized_levenshtein(x, y),
        Comparator::JaroWinkler => jaro_winkler(x, y),
        Comparator::TokenSort => token_sort_similarity(x, y),
        Comparator::TokenSet => {
            let tx = token_set(x);
            let ty = token_set(y);
            let union = tx.union(&ty).count();
            if union == 0 {
                return 0.0;
            }
            tx.intersection(&ty).count() as f64 / union as f64
        }
        Comparator::SharedTokens { required } => {
            let tx = token_set(x);
            let ty = token_set(y);
            let shared = tx.intersection(&ty).count();
            (shared as f64 / *required as f64).min(1.0)
        }
        Comparator::Numeric { scale } => match (nx, ny) {
            (Some(a), Some(b)) => (1.0 - (a - b).abs() / scale).max(0.0),
            // Unparseable numbers degrade the score instead of failing
            _ => 0.0,
        },
    }
}

/// Scores candidate pairs against a fixed [`RecordStore`].
pub struct SimilarityScorer<'a> {
    store: &'a RecordStore,
    comparisons: Vec<BoundComparison>,
    warnings: Vec<ResolveError>,
}

impl<'a> SimilarityScorer<'a> {
    pub fn new(store: &'a RecordStore, fields: &[FieldComparison]) -> Self {
        let mut warnings = Vec::new();
        let comparisons = fields
            .iter()
            .map(|fc| {
                let values = match store.field_slot(&fc.field) {
                    Some(slot) => Some(prepare(store, slot)),
                    None => {
                        let err = ResolveError::SchemaMismatch {
                            field: fc.field.clone(),
                        };
                        warn!("scoring: {err}; contributing similarity 0");
                        warnings.push(err);
                        None
                    }
                };
                BoundComparison {
                    comparator: fc.comparator.clone(),
                    weight: fc.weight,
                    missing: fc.missing,
                    values,
                }
            })
            .collect();

        Self {
            store,
            comparisons,
            warnings,
        }
    }

    /// Per-field similarities, in configuration order
    pub fn field_scores(&self, a: RecordId, b: RecordId) -> Result<Vec<f64>> {
        self.check(a)?;
        self.check(b)?;
        Ok(self
            .comparisons
            .iter()
            .map(|c| c.similarity(a, b))
            .collect())
    }

    /// Weighted similarity of two records, in `[0, 1]`
    pub fn score_records(&self, a: RecordId, b: RecordId) -> Result<f64> {
        self.check(a)?;
        self.check(b)?;
        let total: f64 = self
            .comparisons
            .iter()
            .map(|c| c.weight * c.similarity(a, b))
            .sum();
        Ok(total.clamp(0.0, 1.0))
    }

    pub fn score(&self, pair: CandidatePair) -> Result<SimilarityScore> {
        Ok(SimilarityScore {
            pair,
            score: self.score_records(pair.a(), pair.b())?,
        })
    }

    /// Score a batch of pairs in parallel, preserving input order
    pub fn score_batch(&self, pairs: &[CandidatePair]) -> Result<Vec<SimilarityScore>> {
        pairs.par_iter().map(|&pair| self.score(pair)).collect()
    }

    pub fn warnings(&self) -> &[ResolveError] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<ResolveError> {
        std::mem::take(&mut self.warnings)
    }

    fn check(&self, id: RecordId) -> Result<()> {
        self.store.get(id).map(|_| ())
    }
}

/// Normalize one field of every record, in parallel
fn prepare(store: &RecordStore, slot: FieldSlot) -> Vec<Prepared> {
    store
        .records()
        .par_iter()
        .map(|record| {
            let value = record.value(slot);
            if value.is_missing() {
                return Prepared::Missing;
            }
            let norm = value.as_text().map(|t| normalize(&t)).unwrap_or_default();
            let number = value.as_number();
            if norm.is_empty() && number.is_none() {
                Prepared::Missing
            } else {
                Prepared::Value { norm, number }
            }
        })
        .collect()
}

//! Entity resolution for product specifications.
//!
//! Pipeline: [`RecordStore`] -> [`BlockingIndex`] -> candidate pairs ->
//! [`SimilarityScorer`] -> [`MatchClassifier`] -> union-find clustering.
//! [`Resolver`] runs all stages from one [`ResolverConfig`].
//!
//! ```rust
//! use specmatch::{FieldValue, RecordStore, Resolver, ResolverConfig};
//!
//! let store = RecordStore::load(vec![
//!     ("www.a.com", "1", vec![("<page title>", FieldValue::from("Canon EOS 80D body"))]),
//!     ("www.b.com", "7", vec![("<page title>", FieldValue::from("canon eos 80d"))]),
//! ])
//! .unwrap();
//!
//! let resolution = Resolver::new(ResolverConfig::default())
//!     .unwrap()
//!     .resolve(&store)
//!     .unwrap();
//! assert_eq!(resolution.stats.clusters, 1);
//! ```

pub mod blocking;
pub mod candidates;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod similarity;
pub mod submission;
pub mod text;

#[cfg(feature = "python")]
mod python;

pub use blocking::{Block, BlockKey, BlockingIndex};
pub use candidates::{generate, CandidatePair, CandidatePairs};
pub use classify::{MatchClassifier, MatchEdge};
pub use cluster::{cluster, Cluster, ClusterAssignment, UnionFind, WithinClusterPairs};
pub use config::{
    BlockingConfig, BlockingStrategy, Comparator, FieldComparison, MatchPolicy, ResolverConfig,
    PAGE_TITLE,
};
pub use dataset::load_dataset;
pub use error::{ResolveError, Result};
pub use pipeline::{CancelToken, Resolution, Resolver, ResolveStats, RunControl};
pub use record::{FieldSlot, FieldValue, Record, RecordId, RecordStore, Schema};
pub use similarity::{SimilarityScore, SimilarityScorer};
pub use submission::SubmissionFormat;

//! Resolver configuration.
//!
//! A single immutable [`ResolverConfig`] is passed explicitly to every stage.
//! It deserializes from TOML:
//!
//! ```toml
//! threshold = 0.5
//! policy = "one_to_one"
//!
//! [blocking]
//! max_block_size = 2000
//! overflow_cap = 500
//!
//! [[blocking.keys]]
//! kind = "tokens"
//! field = "<page title>"
//! min_len = 2
//!
//! [[fields]]
//! field = "<page title>"
//! weight = 1.0
//! comparator = { kind = "token_set" }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ResolveError, Result};

/// Title field of the product specification dataset.
pub const PAGE_TITLE: &str = "<page title>";

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Strategy deriving blocking keys from one record field.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BlockingStrategy {
    /// Whole normalized field value
    ExactNormalized { field: String },
    /// First `chars` characters of the normalized value
    Prefix { field: String, chars: usize },
    /// Every distinct normalized token of at least `min_len` characters
    Tokens {
        field: String,
        #[serde(default = "default_min_token_len")]
        min_len: usize,
    },
    /// Every distinct character n-gram of the normalized value
    Ngrams { field: String, n: usize },
    /// `floor(value / width)`, plus `spread` neighbouring buckets on each side
    NumericBucket {
        field: String,
        width: f64,
        #[serde(default)]
        spread: u32,
    },
}

impl BlockingStrategy {
    pub fn field(&self) -> &str {
        match self {
            Self::ExactNormalized { field }
            | Self::Prefix { field, .. }
            | Self::Tokens { field, .. }
            | Self::Ngrams { field, .. }
            | Self::NumericBucket { field, .. } => field,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Prefix { chars: 0, .. } => Err(ResolveError::invalid("prefix chars must be > 0")),
            Self::Tokens { min_len: 0, .. } => {
                Err(ResolveError::invalid("tokens min_len must be > 0"))
            }
            Self::Ngrams { n: 0, .. } => Err(ResolveError::invalid("ngram size must be > 0")),
            Self::NumericBucket { width, .. } if !(width.is_finite() && *width > 0.0) => Err(
                ResolveError::invalid(format!("numeric bucket width must be > 0, got {width}")),
            ),
            _ => Ok(()),
        }
    }
}

fn default_min_token_len() -> usize {
    2
}

/// Per-field similarity function.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Comparator {
    /// 1 if normalized values are equal, else 0
    Exact,
    /// Normalized Levenshtein similarity
    Levenshtein,
    /// Jaro-Winkler similarity of the normalized values
    JaroWinkler,
    /// Jaro-Winkler over alphabetically sorted tokens
    TokenSort,
    /// Jaccard similarity of token sets
    TokenSet,
    /// `min(shared_tokens / required, 1)`
    SharedTokens { required: usize },
    /// `max(0, 1 - |a - b| / scale)`
    Numeric { scale: f64 },
}

impl Comparator {
    fn validate(&self) -> Result<()> {
        match self {
            Self::SharedTokens { required: 0 } => {
                Err(ResolveError::invalid("shared_tokens required must be > 0"))
            }
            Self::Numeric { scale } if !(scale.is_finite() && *scale > 0.0) => Err(
                ResolveError::invalid(format!("numeric scale must be > 0, got {scale}")),
            ),
            _ => Ok(()),
        }
    }
}

/// One weighted field comparison.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldComparison {
    pub field: String,
    pub comparator: Comparator,
    pub weight: f64,
    /// Similarity used when either record lacks a value for the field
    #[serde(default)]
    pub missing: f64,
}

/// Match acceptance policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Accept every pair scoring at or above the threshold
    #[default]
    Threshold,
    /// Each record keeps at most one accepted partner per counterpart collection
    OneToOne,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockingConfig {
    pub keys: Vec<BlockingStrategy>,
    /// Hard cap on the record count of a keyed block
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
    /// Cap on the overflow block holding records with no derivable key
    #[serde(default = "default_overflow_cap")]
    pub overflow_cap: usize,
    /// Seed for deterministic sampling of truncated blocks
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_block_size() -> usize {
    5_000
}

fn default_overflow_cap() -> usize {
    1_000
}

fn default_seed() -> u64 {
    42
}

fn default_batch_size() -> usize {
    16_384
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub threshold: f64,
    #[serde(default)]
    pub policy: MatchPolicy,
    /// Worker threads; `None` uses the global rayon pool
    #[serde(default)]
    pub threads: Option<usize>,
    /// Cap on deduplicated candidate pairs
    #[serde(default)]
    pub max_candidates: Option<usize>,
    /// Candidate pairs scored per parallel batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub blocking: BlockingConfig,
    pub fields: Vec<FieldComparison>,
}

impl Default for ResolverConfig {
    /// Baseline of the product specification harness: block on the first
    /// three title characters and on title tokens, match pairs sharing at
    /// least two title tokens.
    fn default() -> Self {
        Self {
            threshold: 1.0,
            policy: MatchPolicy::Threshold,
            threads: None,
            max_candidates: None,
            batch_size: default_batch_size(),
            blocking: BlockingConfig {
                keys: vec![
                    BlockingStrategy::Prefix {
                        field: PAGE_TITLE.to_string(),
                        chars: 3,
                    },
                    BlockingStrategy::Tokens {
                        field: PAGE_TITLE.to_string(),
                        min_len: 3,
                    },
                ],
                max_block_size: default_max_block_size(),
                overflow_cap: default_overflow_cap(),
                seed: default_seed(),
            },
            fields: vec![FieldComparison {
                field: PAGE_TITLE.to_string(),
                comparator: Comparator::SharedTokens { required: 2 },
                weight: 1.0,
                missing: 0.0,
            }],
        }
    }
}

impl ResolverConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        // Unknown strategy names surface here as serde variant errors
        let config: Self = toml::from_str(s).map_err(|e| ResolveError::invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Check every setting before any record is processed
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ResolveError::invalid(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if self.threads == Some(0) {
            return Err(ResolveError::invalid("threads must be > 0"));
        }
        if self.max_candidates == Some(0) {
            return Err(ResolveError::invalid("max_candidates must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(ResolveError::invalid("batch_size must be > 0"));
        }

        if self.blocking.keys.is_empty() {
            return Err(ResolveError::invalid("at least one blocking key is required"));
        }
        if self.blocking.max_block_size < 2 {
            return Err(ResolveError::invalid("max_block_size must be >= 2"));
        }
        if self.blocking.overflow_cap < 2 {
            return Err(ResolveError::invalid("overflow_cap must be >= 2"));
        }
        for key in &self.blocking.keys {
            key.validate()?;
        }

        if self.fields.is_empty() {
            return Err(ResolveError::invalid("at least one field comparison is required"));
        }
        let mut total = 0.0;
        for fc in &self.fields {
            if !(fc.weight.is_finite() && fc.weight >= 0.0) {
                return Err(ResolveError::invalid(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    fc.field, fc.weight
                )));
            }
            if !(0.0..=1.0).contains(&fc.missing) {
                return Err(ResolveError::invalid(format!(
                    "missing default for '{}' must be in [0, 1], got {}",
                    fc.field, fc.missing
                )));
            }
            fc.comparator.validate()?;
            total += fc.weight;
        }
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ResolveError::invalid(format!(
                "field weights must sum to 1, got {total}"
            )));
        }
        Ok(())
    }
}

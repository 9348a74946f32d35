//! Blocking index: groups records sharing a cheap derived key.
//!
//! Every configured [`BlockingStrategy`] maps a record to zero or more keys;
//! a record may land in several blocks. Records without any key go to a
//! single overflow block so they remain comparable. Blocks larger than their
//! cap are sampled down by a seeded splitmix64 rank; sampled-out records stay attached
//! to the block as `excluded` so the index still covers every record.

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{BlockingConfig, BlockingStrategy};
use crate::error::ResolveError;
use crate::record::{FieldSlot, Record, RecordId, RecordStore};
use crate::text::{char_ngrams, normalize, prefix, tokens};

/// Key shared by the members of one block.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKey {
    /// Value derived by the strategy at index `strategy` of the configuration
    Keyed { strategy: usize, value: String },
    /// Records with no derivable key under any strategy
    Overflow,
}

/// Records sharing one [`BlockKey`].
#[derive(Clone, Debug)]
pub struct Block {
    key: BlockKey,
    members: Vec<RecordId>,
    excluded: Vec<RecordId>,
}

impl Block {
    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    /// Records compared against each other, ascending
    pub fn members(&self) -> &[RecordId] {
        &self.members
    }

    /// Records dropped from comparison by the size cap, ascending
    pub fn excluded(&self) -> &[RecordId] {
        &self.excluded
    }

    pub fn len(&self) -> usize {
        self.members.len() + self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unordered pairs this block contributes before cross-block dedup
    pub fn pair_count(&self) -> usize {
        let n = self.members.len();
        n * n.saturating_sub(1) / 2
    }
}

/// A blocking strategy bound to the store's schema.
struct KeyFunction<'a> {
    strategy: &'a BlockingStrategy,
    slot: Option<FieldSlot>,
}

impl KeyFunction<'_> {
    fn keys(&self, index: usize, record: &Record, out: &mut Vec<BlockKey>) {
        let Some(slot) = self.slot else {
            return;
        };
        let value = record.value(slot);
        if value.is_missing() {
            return;
        }

        let keyed = |value: String| BlockKey::Keyed {
            strategy: index,
            value,
        };

        match self.strategy {
            BlockingStrategy::ExactNormalized { .. } => {
                let norm = value.as_text().map(|t| normalize(&t)).unwrap_or_default();
                if !norm.is_empty() {
                    out.push(keyed(norm));
                }
            }
            BlockingStrategy::Prefix { chars, .. } => {
                let norm = value.as_text().map(|t| normalize(&t)).unwrap_or_default();
                if let Some(p) = prefix(&norm, *chars) {
                    out.push(keyed(p));
                }
            }
            BlockingStrategy::Tokens { min_len, .. } => {
                let norm = value.as_text().map(|t| normalize(&t)).unwrap_or_default();
                out.extend(
                    tokens(&norm)
                        .filter(|t| t.chars().count() >= *min_len)
                        .map(|t| keyed(t.to_string())),
                );
            }
            BlockingStrategy::Ngrams { n, .. } => {
                let norm = value.as_text().map(|t| normalize(&t)).unwrap_or_default();
                out.extend(char_ngrams(&norm, *n).into_iter().map(keyed));
            }
            BlockingStrategy::NumericBucket { width, spread, .. } => {
                if let Some(number) = value.as_number() {
                    #[allow(clippy::cast_possible_truncation)]
                    let bucket = (number / width).floor() as i64;
                    let spread = i64::from(*spread);
                    for offset in -spread..=spread {
                        out.push(keyed(bucket.saturating_add(offset).to_string()));
                    }
                }
            }
        }
    }
}

/// Blocks of one run, in deterministic key order with the overflow block last.
#[derive(Debug)]
pub struct BlockingIndex {
    blocks: Vec<Block>,
    record_count: usize,
    warnings: Vec<ResolveError>,
}

impl BlockingIndex {
    /// Derive keys for every record and group records into capped blocks
    pub fn build(store: &RecordStore, config: &BlockingConfig) -> Self {
        let mut warnings = Vec::new();

        let key_functions: Vec<KeyFunction> = config
            .keys
            .iter()
            .map(|strategy| {
                let slot = store.field_slot(strategy.field());
                if slot.is_none() {
                    let err = ResolveError::SchemaMismatch {
                        field: strategy.field().to_string(),
                    };
                    warn!("blocking: {err}");
                    warnings.push(err);
                }
                KeyFunction { strategy, slot }
            })
            .collect();

        // Key derivation is independent per record
        let per_record: Vec<Vec<BlockKey>> = store
            .records()
            .par_iter()
            .map(|record| {
                let mut keys = Vec::new();
                for (index, function) in key_functions.iter().enumerate() {
                    function.keys(index, record, &mut keys);
                }
                keys.sort_unstable();
                keys.dedup();
                keys
            })
            .collect();

        // Records are visited in id order, so member lists come out ascending
        let mut grouped: AHashMap<BlockKey, Vec<RecordId>> = AHashMap::new();
        let mut overflow: Vec<RecordId> = Vec::new();
        for (record, keys) in store.records().iter().zip(per_record) {
            if keys.is_empty() {
                overflow.push(record.id());
                continue;
            }
            for key in keys {
                grouped.entry(key).or_default().push(record.id());
            }
        }

        let mut blocks: Vec<Block> = grouped
            .into_iter()
            .map(|(key, members)| Block {
                key,
                members,
                excluded: Vec::new(),
            })
            .collect();
        blocks.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        if !overflow.is_empty() {
            debug!(records = overflow.len(), "blocking: records without keys");
            blocks.push(Block {
                key: BlockKey::Overflow,
                members: overflow,
                excluded: Vec::new(),
            });
        }

        for block in &mut blocks {
            let (limit, what) = match block.key {
                BlockKey::Overflow => (config.overflow_cap, "overflow block".to_string()),
                BlockKey::Keyed { .. } => (config.max_block_size, format!("block {:?}", block.key)),
            };
            if block.members.len() > limit {
                let err = ResolveError::CapacityExceeded {
                    what,
                    limit,
                    actual: block.members.len(),
                };
                warn!("blocking: {err}");
                warnings.push(err);
                sample_down(block, limit, config.seed);
            }
        }

        debug!(
            blocks = blocks.len(),
            records = store.len(),
            "blocking: index built"
        );

        Self {
            blocks,
            record_count: store.len(),
            warnings,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn overflow(&self) -> Option<&Block> {
        self.blocks
            .last()
            .filter(|b| matches!(b.key, BlockKey::Overflow))
    }

    pub fn largest_block(&self) -> usize {
        self.blocks.iter().map(Block::len).max().unwrap_or(0)
    }

    /// Upper bound on candidate pairs, `Σ |block|²/2`
    pub fn pair_upper_bound(&self) -> usize {
        self.blocks.iter().map(Block::pair_count).sum()
    }

    /// Number of records in the store the index was built from
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn warnings(&self) -> &[ResolveError] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<ResolveError> {
        std::mem::take(&mut self.warnings)
    }
}

/// splitmix64 of `seed ^ id`: fixed output on every platform and build
fn sample_rank(seed: u64, id: RecordId) -> u64 {
    let mut x = (seed ^ u64::from(id.0)).wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Keep `limit` members chosen by seeded rank; the rest become excluded
fn sample_down(block: &mut Block, limit: usize, seed: u64) {
    let mut ranked: Vec<(u64, RecordId)> = block
        .members
        .iter()
        .map(|&id| (sample_rank(seed, id), id))
        .collect();
    ranked.sort_unstable();

    let mut kept: Vec<RecordId> = ranked[..limit].iter().map(|&(_, id)| id).collect();
    let mut excluded: Vec<RecordId> = ranked[limit..].iter().map(|&(_, id)| id).collect();
    kept.sort_unstable();
    excluded.sort_unstable();

    block.members = kept;
    block.excluded = excluded;
}

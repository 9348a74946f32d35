// Property-based tests for partition, candidate and scoring invariants.
// CI: 128 cases (default). Soak: PROPTEST_CASES=5000 cargo test --release

use std::collections::HashSet;

use proptest::prelude::*;
use specmatch::{
    cluster, generate, BlockingConfig, BlockingIndex, BlockingStrategy, CandidatePair, Comparator,
    FieldComparison, FieldValue, MatchEdge, MatchPolicy, RecordId, RecordStore, Resolver,
    ResolverConfig, SimilarityScorer,
};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_128() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Short titles over a small vocabulary so blocks actually overlap.
fn arb_title() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => prop::collection::vec(
            prop::sample::select(vec!["canon", "eos", "80d", "nikon", "d3500", "kit", "body", "24mp"]),
            1..5,
        )
        .prop_map(|words| words.join(" ")),
        1 => Just(String::new()),
    ]
}

fn arb_titles() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_title(), 0..24)
}

/// Edges over `n` records.
fn arb_edges(n: u32) -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0..n, 0..n), 0..40)
}

fn store(titles: &[String]) -> RecordStore {
    RecordStore::load(titles.iter().enumerate().map(|(i, t)| {
        let source = if i % 2 == 0 { "www.a.com" } else { "www.b.com" };
        (source, i.to_string(), vec![("title", FieldValue::from(t.as_str()))])
    }))
    .unwrap()
}

fn blocking() -> BlockingConfig {
    BlockingConfig {
        keys: vec![
            BlockingStrategy::Tokens {
                field: "title".into(),
                min_len: 2,
            },
            BlockingStrategy::Prefix {
                field: "title".into(),
                chars: 2,
            },
        ],
        max_block_size: 8,
        overflow_cap: 4,
        seed: 11,
    }
}

fn fields() -> Vec<FieldComparison> {
    vec![
        FieldComparison {
            field: "title".into(),
            comparator: Comparator::TokenSet,
            weight: 0.5,
            missing: 0.0,
        },
        FieldComparison {
            field: "title".into(),
            comparator: Comparator::JaroWinkler,
            weight: 0.3,
            missing: 0.0,
        },
        FieldComparison {
            field: "title".into(),
            comparator: Comparator::SharedTokens { required: 2 },
            weight: 0.2,
            missing: 0.0,
        },
    ]
}

fn resolver_config(policy: MatchPolicy) -> ResolverConfig {
    ResolverConfig {
        threshold: 0.6,
        policy,
        threads: None,
        max_candidates: None,
        batch_size: 7,
        blocking: blocking(),
        fields: fields(),
    }
}

fn to_edges(raw: &[(u32, u32)]) -> Vec<MatchEdge> {
    raw.iter()
        .filter_map(|&(a, b)| CandidatePair::new(RecordId(a), RecordId(b)))
        .map(|pair| MatchEdge::new(pair, 1.0))
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_128())]

    #[test]
    fn partition_covers_every_record_once(titles in arb_titles(), policy in prop_oneof![Just(MatchPolicy::Threshold), Just(MatchPolicy::OneToOne)]) {
        let store = store(&titles);
        let resolution = Resolver::new(resolver_config(policy)).unwrap().resolve(&store).unwrap();

        let clusters = resolution.assignment.clusters();
        let total: usize = clusters.iter().map(|c| c.members.len()).sum();
        prop_assert_eq!(total, store.len());

        let mut seen = HashSet::new();
        for cluster in &clusters {
            prop_assert_eq!(cluster.id, cluster.members[0]);
            for member in &cluster.members {
                prop_assert!(seen.insert(*member));
            }
        }
        prop_assert_eq!(seen.len(), store.len());
    }

    #[test]
    fn clustering_ignores_edge_order(raw in arb_edges(12), seed in any::<u64>()) {
        let edges = to_edges(&raw);
        let mut shuffled = edges.clone();
        // Deterministic permutation driven by the seed
        shuffled.sort_by_key(|e| (u64::from(e.a().0) ^ seed).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ u64::from(e.b().0));

        let forward = cluster(12, &edges).unwrap();
        let permuted = cluster(12, &shuffled).unwrap();
        let mut reversed_edges = edges.clone();
        reversed_edges.reverse();
        let reversed = cluster(12, &reversed_edges).unwrap();

        prop_assert_eq!(&forward, &permuted);
        prop_assert_eq!(&forward, &reversed);
    }

    #[test]
    fn candidates_are_distinct_and_canonical(titles in arb_titles()) {
        let store = store(&titles);
        let index = BlockingIndex::build(&store, &blocking());

        let mut seen = HashSet::new();
        for pair in generate(&index) {
            prop_assert!(pair.a() < pair.b());
            prop_assert!(seen.insert(pair));
        }
    }

    #[test]
    fn blocks_cover_every_record(titles in arb_titles()) {
        let store = store(&titles);
        let index = BlockingIndex::build(&store, &blocking());

        let mut covered = HashSet::new();
        for block in index.blocks() {
            prop_assert!(block.members().len() <= 8);
            covered.extend(block.members().iter().copied());
            covered.extend(block.excluded().iter().copied());
        }
        prop_assert_eq!(covered.len(), store.len());
    }

    #[test]
    fn scores_are_bounded_and_symmetric(titles in arb_titles()) {
        let store = store(&titles);
        let scorer = SimilarityScorer::new(&store, &fields());
        let n = u32::try_from(store.len()).unwrap();
        for a in 0..n {
            for b in 0..n {
                let ab = scorer.score_records(RecordId(a), RecordId(b)).unwrap();
                let ba = scorer.score_records(RecordId(b), RecordId(a)).unwrap();
                prop_assert!((0.0..=1.0).contains(&ab));
                prop_assert_eq!(ab.to_bits(), ba.to_bits());
            }
        }
    }

    #[test]
    fn rerun_reproduces_assignment(titles in arb_titles()) {
        let store = store(&titles);
        let resolver = Resolver::new(resolver_config(MatchPolicy::OneToOne)).unwrap();
        let first = resolver.resolve(&store).unwrap();
        let second = resolver.resolve(&store).unwrap();
        prop_assert_eq!(first.assignment, second.assignment);
        prop_assert_eq!(first.edges, second.edges);
    }
}

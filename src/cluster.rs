//! Clustering of accepted matches into a partition of the record universe.
//!
//! Union-find over dense record indices (parent/size arrays, union by size,
//! path halving). The engine takes the transitive closure of whatever edges
//! it is given; it never splits a component back apart. Cluster identifiers
//! are canonicalized to the smallest member id, so the same edge set yields
//! the same assignment in any processing order.

use tracing::debug;

use crate::candidates::CandidatePair;
use crate::classify::MatchEdge;
use crate::error::{ResolveError, Result};
use crate::record::RecordId;

/// Disjoint-set forest over `0..n`.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let parent = (0..n).map(|i| i as u32).collect();
        Self {
            parent,
            size: vec![1; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of the set containing `x`
    pub fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merge the sets of `x` and `y`; returns false if already merged
    pub fn union(&mut self, x: u32, y: u32) -> bool {
        let mut rx = self.find(x);
        let mut ry = self.find(y);
        if rx == ry {
            return false;
        }
        if self.size[rx as usize] < self.size[ry as usize] {
            std::mem::swap(&mut rx, &mut ry);
        }
        self.parent[ry as usize] = rx;
        self.size[rx as usize] += self.size[ry as usize];
        true
    }
}

/// One resolved entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    /// Smallest member id
    pub id: RecordId,
    /// Members, ascending
    pub members: Vec<RecordId>,
}

/// Frozen mapping from every record to its cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterAssignment {
    cluster_of: Vec<RecordId>,
}

impl ClusterAssignment {
    pub fn cluster_of(&self, id: RecordId) -> Option<RecordId> {
        self.cluster_of.get(id.index()).copied()
    }

    /// `(record, cluster)` for every record in the universe, by record id
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.cluster_of
            .iter()
            .enumerate()
            .map(|(i, &c)| (RecordId(u32::try_from(i).unwrap_or(u32::MAX)), c))
    }

    /// Number of records covered
    pub fn len(&self) -> usize {
        self.cluster_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster_of.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.iter().filter(|(id, cluster)| id == cluster).count()
    }

    /// Clusters ordered by id, singletons included
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut slot_of: Vec<Option<usize>> = vec![None; self.cluster_of.len()];
        let mut clusters: Vec<Cluster> = Vec::new();
        for (id, cluster) in self.iter() {
            // A cluster's id is its smallest member, so it is seen first
            let slot = *slot_of[cluster.index()].get_or_insert_with(|| {
                clusters.push(Cluster {
                    id: cluster,
                    members: Vec::new(),
                });
                clusters.len() - 1
            });
            clusters[slot].members.push(id);
        }
        clusters
    }

    /// Every unordered pair of records sharing a cluster, produced lazily
    /// cluster by cluster, each cluster's pairs in canonical order
    pub fn within_cluster_pairs(&self) -> WithinClusterPairs {
        WithinClusterPairs {
            clusters: self.clusters().into_iter(),
            members: Vec::new(),
            i: 0,
            j: 1,
        }
    }
}

/// Iterator returned by [`ClusterAssignment::within_cluster_pairs`].
pub struct WithinClusterPairs {
    clusters: std::vec::IntoIter<Cluster>,
    members: Vec<RecordId>,
    i: usize,
    j: usize,
}

impl Iterator for WithinClusterPairs {
    type Item = CandidatePair;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.j < self.members.len() {
                let (a, b) = (self.members[self.i], self.members[self.j]);
                self.j += 1;
                if let Some(pair) = CandidatePair::new(a, b) {
                    return Some(pair);
                }
                continue;
            }
            if self.i + 2 < self.members.len() {
                self.i += 1;
                self.j = self.i + 1;
                continue;
            }
            self.members = self.clusters.next()?.members;
            self.i = 0;
            self.j = 1;
        }
    }
}

/// Partition `universe_len` records using `edges`.
///
/// Fails with `NotFound` if an edge references a record outside the universe.
pub fn cluster<'e>(
    universe_len: usize,
    edges: impl IntoIterator<Item = &'e MatchEdge>,
) -> Result<ClusterAssignment> {
    let mut forest = UnionFind::new(universe_len);
    let mut unions = 0usize;

    for edge in edges {
        for id in [edge.a(), edge.b()] {
            if id.index() >= universe_len {
                return Err(ResolveError::NotFound { id: id.to_string() });
            }
        }
        if forest.union(edge.a().0, edge.b().0) {
            unions += 1;
        }
    }

    // Canonical label per root: smallest member, found by ascending scan
    let mut label: Vec<Option<RecordId>> = vec![None; universe_len];
    let mut cluster_of = Vec::with_capacity(universe_len);
    for i in 0..universe_len {
        #[allow(clippy::cast_possible_truncation)]
        let id = i as u32;
        let root = forest.find(id) as usize;
        let canonical = *label[root].get_or_insert(RecordId(id));
        cluster_of.push(canonical);
    }

    debug!(
        records = universe_len,
        clusters = universe_len - unions,
        "cluster: partition finalized"
    );

    Ok(ClusterAssignment { cluster_of })
}

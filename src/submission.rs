//! CSV writers for resolution output.

use std::path::Path;

use tracing::info;

use crate::cluster::ClusterAssignment;
use crate::error::{ResolveError, Result};
use crate::record::RecordStore;

/// Output layout of a submission file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmissionFormat {
    /// `left_spec_id,right_spec_id`, one row per matching pair
    #[default]
    Pairs,
    /// `spec_id,cluster_id`, one row per record
    Clusters,
}

fn csv_error(path: &Path, err: csv::Error) -> ResolveError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => ResolveError::io(path, source),
        other => ResolveError::Dataset {
            path: path.to_path_buf(),
            reason: format!("{other:?}"),
        },
    }
}

/// Every within-cluster pair as external ids, cluster by cluster in
/// canonical record order. Holds all rows in memory; [`write_pairs`] streams.
pub fn matching_pairs(
    store: &RecordStore,
    assignment: &ClusterAssignment,
) -> Result<Vec<(String, String)>> {
    assignment
        .within_cluster_pairs()
        .map(|pair| Ok((store.external_id(pair.a())?, store.external_id(pair.b())?)))
        .collect()
}

/// Stream one row per within-cluster pair; returns the number of rows written
pub fn write_pairs(path: &Path, store: &RecordStore, assignment: &ClusterAssignment) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(["left_spec_id", "right_spec_id"])
        .map_err(|e| csv_error(path, e))?;

    let mut rows = 0usize;
    for cluster in assignment.clusters() {
        if cluster.members.len() < 2 {
            continue;
        }
        // Labels for one cluster only; memory stays linear in its size
        let labels = cluster
            .members
            .iter()
            .map(|&id| store.external_id(id))
            .collect::<Result<Vec<_>>>()?;
        for (i, left) in labels.iter().enumerate() {
            for right in &labels[i + 1..] {
                writer
                    .write_record([left, right])
                    .map_err(|e| csv_error(path, e))?;
                rows += 1;
            }
        }
    }
    writer.flush().map_err(|e| ResolveError::io(path, e))?;
    info!(path = %path.display(), pairs = rows, "submission: pairs written");
    Ok(rows)
}

pub fn write_clusters(
    path: &Path,
    store: &RecordStore,
    assignment: &ClusterAssignment,
) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(["spec_id", "cluster_id"])
        .map_err(|e| csv_error(path, e))?;
    let mut rows = 0usize;
    for (id, cluster) in assignment.iter() {
        writer
            .write_record([store.external_id(id)?, store.external_id(cluster)?])
            .map_err(|e| csv_error(path, e))?;
        rows += 1;
    }
    writer.flush().map_err(|e| ResolveError::io(path, e))?;
    info!(path = %path.display(), records = rows, "submission: clusters written");
    Ok(rows)
}

/// Write `assignment` in `format`; returns the number of data rows
pub fn write(
    path: &Path,
    format: SubmissionFormat,
    store: &RecordStore,
    assignment: &ClusterAssignment,
) -> Result<usize> {
    match format {
        SubmissionFormat::Pairs => write_pairs(path, store, assignment),
        SubmissionFormat::Clusters => write_clusters(path, store, assignment),
    }
}

//! Loader for product specification datasets.
//!
//! Layout: one directory per source website, each holding one JSON object per
//! specification (`www.sourceA.com/1.json`). The record id is the file stem and
//! its collection is the source directory, giving the external id
//! `www.sourceA.com//1`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ResolveError, Result};
use crate::record::{FieldValue, RecordStore};

/// Convert a JSON attribute to a field value; `None` for values without text
fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            (!parts.is_empty()).then(|| FieldValue::Text(parts.join(" ")))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Entries of `dir` sorted by name, so loads are reproducible
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ResolveError::io(dir, e))? {
        let entry = entry.map_err(|e| ResolveError::io(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Numeric stems in numeric order: 2.json before 10.json
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        (number, name)
    });
    Ok(entries)
}

/// Parse one specification file into `(field, value)` pairs
pub fn parse_specification(path: &Path) -> Result<Vec<(String, FieldValue)>> {
    let text = fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
    let json: Value = serde_json::from_str(&text).map_err(|e| ResolveError::Dataset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Value::Object(attributes) = json else {
        return Err(ResolveError::Dataset {
            path: path.to_path_buf(),
            reason: "specification is not a JSON object".to_string(),
        });
    };
    Ok(attributes
        .iter()
        .filter_map(|(name, value)| field_value(value).map(|v| (name.clone(), v)))
        .collect())
}

/// Load every specification under `dataset_path`
pub fn load_dataset(dataset_path: &Path) -> Result<RecordStore> {
    info!(path = %dataset_path.display(), "dataset: loading");
    let mut builder = RecordStore::builder();

    for source_dir in sorted_entries(dataset_path)? {
        if !source_dir.is_dir() {
            continue;
        }
        let source = source_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut loaded = 0usize;
        for spec_path in sorted_entries(&source_dir)? {
            if spec_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let spec_number = spec_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let fields = parse_specification(&spec_path)?;
            builder
                .push(&source, spec_number, fields)
                .map_err(|e| match e {
                    ResolveError::Dataset { reason, .. } => ResolveError::Dataset {
                        path: spec_path.clone(),
                        reason,
                    },
                    other => other,
                })?;
            loaded += 1;
        }
        debug!(source = %source, specifications = loaded, "dataset: source loaded");
    }

    let store = builder.build();
    info!(
        records = store.len(),
        sources = store.collection_count(),
        "dataset: loaded"
    );
    Ok(store)
}

//! Python bindings (cargo feature `python`).

use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::pipeline::Resolver;
use crate::record::{FieldValue, RecordStore};

/// A field value passed from Python: `str` or a number
#[derive(Debug, FromPyObject)]
enum FieldData {
    Text(String),
    Number(f64),
}

impl From<FieldData> for FieldValue {
    fn from(value: FieldData) -> Self {
        match value {
            FieldData::Text(s) => FieldValue::Text(s),
            FieldData::Number(n) => FieldValue::Number(n),
        }
    }
}

fn to_py_err(err: ResolveError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Build a store from `{"id": str, "source": str?, "fields": dict}` items
fn store_from_records(records: &[Bound<'_, PyDict>]) -> PyResult<RecordStore> {
    let mut builder = RecordStore::builder();
    for record in records {
        let id: String = record
            .get_item("id")?
            .ok_or_else(|| PyValueError::new_err("record is missing 'id'"))?
            .extract()?;
        let source: String = match record.get_item("source")? {
            Some(source) if !source.is_none() => source.extract()?,
            _ => String::new(),
        };
        let fields: HashMap<String, FieldData> = match record.get_item("fields")? {
            Some(fields) => fields.extract()?,
            None => HashMap::new(),
        };

        // HashMap order is arbitrary; intern fields in name order
        let mut fields: Vec<(String, FieldData)> = fields.into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        builder
            .push(
                &source,
                id,
                fields.into_iter().map(|(name, value)| (name, FieldValue::from(value))),
            )
            .map_err(to_py_err)?;
    }
    Ok(builder.build())
}

/// Resolve records into clusters: returns record id -> cluster id
#[pyfunction]
#[pyo3(signature = (records, config_toml=None))]
fn resolve_records(
    py: Python<'_>,
    records: Vec<Bound<'_, PyDict>>,
    config_toml: Option<&str>,
) -> PyResult<HashMap<String, String>> {
    let config = match config_toml {
        Some(text) => ResolverConfig::from_toml_str(text).map_err(to_py_err)?,
        None => ResolverConfig::default(),
    };
    let store = store_from_records(&records)?;

    py.allow_threads(|| {
        let resolver = Resolver::new(config)?;
        let resolution = resolver.resolve(&store)?;
        resolution.labels(&store)
    })
    .map(|labels| labels.into_iter().collect())
    .map_err(to_py_err)
}

/// Token sort ratio for Python: returns float 0.0-100.0
#[pyfunction]
fn token_sort_ratio(s1: &str, s2: &str) -> f64 {
    crate::text::token_sort_ratio(s1, s2)
}

/// Python module `specmatch`.
#[pymodule]
fn specmatch(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(resolve_records, m)?)?;
    m.add_function(wrap_pyfunction!(token_sort_ratio, m)?)?;
    Ok(())
}

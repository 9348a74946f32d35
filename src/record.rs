//! Immutable, indexed record storage.
//!
//! Records are free-form field maps at the boundary. On load every field name
//! is interned into a [`Schema`] and each record is laid out as one
//! [`FieldValue`] slot per schema field, so downstream stages resolve a field
//! name to a slot once and never do per-record name lookups.

use std::fmt;

use ahash::AHashMap;

use crate::error::{ResolveError, Result};

/// Dense record identifier, assigned in load order.
///
/// The total order on `RecordId` is the canonical order used for candidate
/// pairs and cluster identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u32);

impl RecordId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw value of one field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Missing,
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(n) => !n.is_finite(),
        }
    }

    /// Text view of the value (numbers are formatted)
    pub fn as_text(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Self::Missing => None,
            Self::Text(s) => Some(std::borrow::Cow::Borrowed(s)),
            Self::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
        }
    }

    /// Numeric view of the value (text is parsed for its first number)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Missing => None,
            Self::Text(s) => crate::text::leading_number(s),
            Self::Number(n) => n.is_finite().then_some(*n),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Slot index of a field within the [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldSlot(pub usize);

/// Interned field names, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    names: Vec<String>,
    slots: AHashMap<String, FieldSlot>,
}

impl Schema {
    fn intern(&mut self, name: &str) -> FieldSlot {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = FieldSlot(self.names.len());
        self.names.push(name.to_string());
        self.slots.insert(name.to_string(), slot);
        slot
    }

    pub fn slot(&self, name: &str) -> Option<FieldSlot> {
        self.slots.get(name).copied()
    }

    pub fn name(&self, slot: FieldSlot) -> &str {
        &self.names[slot.0]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One loaded record.
#[derive(Clone, Debug)]
pub struct Record {
    id: RecordId,
    collection: u32,
    key: String,
    values: Vec<FieldValue>,
}

static MISSING: FieldValue = FieldValue::Missing;

impl Record {
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// External identifier, unique within the record's collection
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Index of the source collection this record was loaded from
    pub fn collection(&self) -> u32 {
        self.collection
    }

    /// Value in `slot`; slots interned after this record was pushed read as missing
    pub fn value(&self, slot: FieldSlot) -> &FieldValue {
        self.values.get(slot.0).unwrap_or(&MISSING)
    }
}

/// Read-only collection of records shared by every pipeline stage.
#[derive(Debug, Default)]
pub struct RecordStore {
    schema: Schema,
    collections: Vec<String>,
    records: Vec<Record>,
    by_key: AHashMap<(u32, String), RecordId>,
}

impl RecordStore {
    pub fn builder() -> RecordStoreBuilder {
        RecordStoreBuilder::default()
    }

    /// Build a store from `(collection, id, fields)` tuples
    pub fn load<C, K, F, N, V>(records: impl IntoIterator<Item = (C, K, F)>) -> Result<Self>
    where
        C: AsRef<str>,
        K: Into<String>,
        F: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut builder = Self::builder();
        for (collection, key, fields) in records {
            builder.push(collection.as_ref(), key, fields)?;
        }
        Ok(builder.build())
    }

    pub fn get(&self, id: RecordId) -> Result<&Record> {
        self.records
            .get(id.index())
            .ok_or_else(|| ResolveError::NotFound { id: id.to_string() })
    }

    /// Look up a record by collection name and external id
    pub fn find(&self, collection: &str, key: &str) -> Result<&Record> {
        let not_found = || ResolveError::NotFound {
            id: format!("{collection}//{key}"),
        };
        let collection_idx = self
            .collections
            .iter()
            .position(|c| c == collection)
            .ok_or_else(not_found)?;
        let id = self
            .by_key
            .get(&(collection_idx as u32, key.to_string()))
            .ok_or_else(not_found)?;
        self.get(*id)
    }

    /// `"<collection>//<key>"`, or the bare key for the unnamed collection
    pub fn external_id(&self, id: RecordId) -> Result<String> {
        let record = self.get(id)?;
        let collection = self.collection_name(record.collection());
        Ok(if collection.is_empty() {
            record.key().to_string()
        } else {
            format!("{collection}//{}", record.key())
        })
    }

    /// Name of the collection `id` was loaded from
    pub fn collection_of(&self, id: RecordId) -> Result<&str> {
        let record = self.get(id)?;
        Ok(self.collection_name(record.collection()))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn field_slot(&self, name: &str) -> Option<FieldSlot> {
        self.schema.slot(name)
    }

    pub fn collection_name(&self, collection: u32) -> &str {
        &self.collections[collection as usize]
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.iter().map(Record::id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Incremental constructor for a [`RecordStore`].
#[derive(Debug, Default)]
pub struct RecordStoreBuilder {
    store: RecordStore,
}

impl RecordStoreBuilder {
    /// Append one record; `key` must be unique within `collection`
    pub fn push<N, V>(
        &mut self,
        collection: &str,
        key: impl Into<String>,
        fields: impl IntoIterator<Item = (N, V)>,
    ) -> Result<RecordId>
    where
        N: AsRef<str>,
        V: Into<FieldValue>,
    {
        let store = &mut self.store;
        let key = key.into();

        let collection_idx = match store.collections.iter().position(|c| c == collection) {
            Some(idx) => idx as u32,
            None => {
                store.collections.push(collection.to_string());
                (store.collections.len() - 1) as u32
            }
        };

        if store.by_key.contains_key(&(collection_idx, key.clone())) {
            return Err(ResolveError::Dataset {
                path: collection.into(),
                reason: format!("duplicate record id '{key}'"),
            });
        }

        let id = u32::try_from(store.records.len())
            .map(RecordId)
            .map_err(|_| ResolveError::invalid("record count exceeds u32 range"))?;

        let mut values = vec![FieldValue::Missing; store.schema.len()];
        for (name, value) in fields {
            let slot = store.schema.intern(name.as_ref());
            if slot.0 >= values.len() {
                values.resize(slot.0 + 1, FieldValue::Missing);
            }
            values[slot.0] = value.into();
        }

        store.by_key.insert((collection_idx, key.clone()), id);
        store.records.push(Record {
            id,
            collection: collection_idx,
            key,
            values,
        });
        Ok(id)
    }

    pub fn build(self) -> RecordStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordStore {
        RecordStore::load(vec![
            ("shop-a", "1", vec![("title", FieldValue::from("Apple iPhone 12"))]),
            (
                "shop-b",
                "1",
                vec![
                    ("title", FieldValue::from("iPhone 12 by Apple")),
                    ("price", FieldValue::from(799.0)),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_load_and_get() {
        let store = sample();
        assert_eq!(store.len(), 2);
        assert_eq!(store.collection_count(), 2);

        let rec = store.get(RecordId(1)).unwrap();
        assert_eq!(rec.key(), "1");
        assert_eq!(store.collection_name(rec.collection()), "shop-b");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = sample();
        assert!(matches!(
            store.get(RecordId(7)),
            Err(ResolveError::NotFound { .. })
        ));
        assert!(store.find("shop-c", "1").is_err());
    }

    #[test]
    fn test_late_field_reads_missing() {
        let store = sample();
        let price = store.field_slot("price").unwrap();
        let first = store.find("shop-a", "1").unwrap();
        assert_eq!(first.value(price), &FieldValue::Missing);
        assert_eq!(
            store.find("shop-b", "1").unwrap().value(price).as_number(),
            Some(799.0)
        );
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut builder = RecordStore::builder();
        builder.push("a", "1", [("title", "x")]).unwrap();
        // Same id in another collection is fine
        builder.push("b", "1", [("title", "x")]).unwrap();
        assert!(builder.push("a", "1", [("title", "y")]).is_err());
    }

    #[test]
    fn test_external_id() {
        let store = RecordStore::load(vec![
            ("www.a.com", "12", vec![("title", "x")]),
            ("", "sku-9", vec![("title", "y")]),
        ])
        .unwrap();
        assert_eq!(store.external_id(RecordId(0)).unwrap(), "www.a.com//12");
        assert_eq!(store.external_id(RecordId(1)).unwrap(), "sku-9");
        assert_eq!(store.collection_of(RecordId(0)).unwrap(), "www.a.com");
        assert!(store.collection_of(RecordId(2)).is_err());
    }

    #[test]
    fn test_blank_text_counts_as_missing() {
        assert!(FieldValue::from("   ").is_missing());
        assert!(FieldValue::Number(f64::NAN).is_missing());
        assert!(!FieldValue::from("x").is_missing());
    }
}

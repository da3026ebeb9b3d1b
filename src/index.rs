//! In-memory lookup indexes from natural keys to remote ids.
//!
//! Built once per run after the corresponding objects have been created.
//! Keys are normalized (trimmed, lowercased) on insert and on query.
//! Duplicate keys are last-write-wins in input order.

use std::collections::HashMap;

use crate::models::RemoteId;
use crate::records::{CompanyRecord, ContactRecord, ImportRecord};

/// Normalization applied to every index key and query.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Map from a normalized natural key to a remote id.
#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
    entries: HashMap<String, RemoteId>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing any earlier entry for the same normalized key.
    pub fn insert(&mut self, key: &str, id: impl Into<RemoteId>) {
        let key = normalize_key(key);
        if key.is_empty() {
            return;
        }
        self.entries.insert(key, id.into());
    }

    pub fn get(&self, key: &str) -> Option<&RemoteId> {
        self.entries.get(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index every record that has both a natural key and a remote id.
    fn from_records<'a, T: ImportRecord + 'a>(records: impl IntoIterator<Item = &'a T>) -> Self {
        let mut index = Self::new();
        for record in records {
            if let (Some(key), Some(id)) = (record.natural_key(), record.remote_id()) {
                index.insert(key, id.clone());
            }
        }
        index
    }
}

/// `email → contact id` over contacts that have been created.
pub fn build_contact_index<'a>(contacts: impl IntoIterator<Item = &'a ContactRecord>) -> LookupIndex {
    let index = LookupIndex::from_records(contacts);
    tracing::debug!(entries = index.len(), "built contact index");
    index
}

/// `company name → company id` over companies that have been created.
pub fn build_company_index<'a>(companies: impl IntoIterator<Item = &'a CompanyRecord>) -> LookupIndex {
    let index = LookupIndex::from_records(companies);
    tracing::debug!(entries = index.len(), "built company index");
    index
}

pub fn find_contact_by_email<'a>(index: &'a LookupIndex, email: &str) -> Option<&'a RemoteId> {
    index.get(email)
}

pub fn find_company_by_name<'a>(index: &'a LookupIndex, name: &str) -> Option<&'a RemoteId> {
    index.get(name)
}

//! Typed input records and CSV loading.
//!
//! Each input file becomes a [`RecordSet`] of one record type. The fields
//! the pipeline reasons about (company name, contact email and company,
//! ticket subject and content) are named; every other column is kept in an
//! `extra` map so it can still be mapped to a remote property.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{EntityKind, RemoteId};

/// Columns never sent to the remote system; ids are assigned remotely.
const RESERVED_COLUMNS: [&str; 2] = ["id", "hs_object_id"];

/// Behaviour shared by the three record types.
pub trait ImportRecord {
    const KIND: EntityKind;

    /// Build a record from one row. Empty cells must already be dropped.
    fn from_row(row: usize, fields: BTreeMap<String, String>) -> Self;

    /// Zero-based row index in the input file.
    fn row(&self) -> usize;

    /// Value of a named column, whether it is a typed field or an extra.
    fn field(&self, name: &str) -> Option<&str>;

    /// All (column, value) pairs present on this record.
    fn fields(&self) -> Vec<(&str, &str)>;

    /// Natural key used by the lookup index (company name, contact email).
    fn natural_key(&self) -> Option<&str> {
        None
    }

    fn remote_id(&self) -> Option<&RemoteId>;

    fn set_remote_id(&mut self, id: RemoteId);

    /// Remote properties for this record under `mapping` (column → property).
    fn properties(&self, mapping: &BTreeMap<String, String>) -> Map<String, Value> {
        self.fields()
            .into_iter()
            .filter(|(column, _)| !RESERVED_COLUMNS.contains(&column.to_lowercase().as_str()))
            .filter_map(|(column, value)| {
                mapping
                    .get(column)
                    .map(|prop| (prop.clone(), Value::String(value.to_string())))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyRecord {
    pub row: usize,
    pub name: Option<String>,
    pub extra: BTreeMap<String, String>,
    pub remote_id: Option<RemoteId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactRecord {
    pub row: usize,
    pub email: Option<String>,
    /// Free-text company name, matched against the company index.
    pub company: Option<String>,
    pub extra: BTreeMap<String, String>,
    pub remote_id: Option<RemoteId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketRecord {
    pub row: usize,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub extra: BTreeMap<String, String>,
    pub remote_id: Option<RemoteId>,
}

impl TicketRecord {
    /// Subject and content joined into the text scanned for contact details.
    pub fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.subject.as_deref().unwrap_or(""),
            self.content.as_deref().unwrap_or("")
        )
    }
}

fn named_then_extra<'a>(
    named: &[(&'a str, &'a Option<String>)],
    extra: &'a BTreeMap<String, String>,
) -> Vec<(&'a str, &'a str)> {
    named
        .iter()
        .filter_map(|&(k, v)| v.as_deref().map(|v| (k, v)))
        .chain(extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .collect()
}

impl ImportRecord for CompanyRecord {
    const KIND: EntityKind = EntityKind::Company;

    fn from_row(row: usize, mut fields: BTreeMap<String, String>) -> Self {
        Self {
            row,
            name: fields.remove("name"),
            extra: fields,
            remote_id: None,
        }
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => self.name.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    fn fields(&self) -> Vec<(&str, &str)> {
        named_then_extra(&[("name", &self.name)], &self.extra)
    }

    fn natural_key(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    fn set_remote_id(&mut self, id: RemoteId) {
        self.remote_id = Some(id);
    }
}

impl ImportRecord for ContactRecord {
    const KIND: EntityKind = EntityKind::Contact;

    fn from_row(row: usize, mut fields: BTreeMap<String, String>) -> Self {
        Self {
            row,
            email: fields.remove("email"),
            company: fields.remove("company"),
            extra: fields,
            remote_id: None,
        }
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => self.email.as_deref(),
            "company" => self.company.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    fn fields(&self) -> Vec<(&str, &str)> {
        named_then_extra(
            &[("email", &self.email), ("company", &self.company)],
            &self.extra,
        )
    }

    fn natural_key(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    fn set_remote_id(&mut self, id: RemoteId) {
        self.remote_id = Some(id);
    }
}

impl ImportRecord for TicketRecord {
    const KIND: EntityKind = EntityKind::Ticket;

    fn from_row(row: usize, mut fields: BTreeMap<String, String>) -> Self {
        Self {
            row,
            subject: fields.remove("subject"),
            content: fields.remove("content"),
            extra: fields,
            remote_id: None,
        }
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "subject" => self.subject.as_deref(),
            "content" => self.content.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    fn fields(&self) -> Vec<(&str, &str)> {
        named_then_extra(
            &[("subject", &self.subject), ("content", &self.content)],
            &self.extra,
        )
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    fn set_remote_id(&mut self, id: RemoteId) {
        self.remote_id = Some(id);
    }
}

/// Records of one kind plus the column headers they were read with.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet<T> {
    pub headers: Vec<String>,
    pub records: Vec<T>,
}

impl<T: ImportRecord> RecordSet<T> {
    pub fn new(headers: Vec<String>, records: Vec<T>) -> Self {
        Self { headers, records }
    }

    /// Build a set from in-memory rows; headers are the union of their columns.
    pub fn from_rows(rows: Vec<BTreeMap<String, String>>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| T::from_row(i, row))
            .collect();
        Self { headers, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// The three record sets of one run.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub companies: RecordSet<CompanyRecord>,
    pub contacts: RecordSet<ContactRecord>,
    pub tickets: RecordSet<TicketRecord>,
}

impl Dataset {
    pub fn total_records(&self) -> usize {
        self.companies.len() + self.contacts.len() + self.tickets.len()
    }
}

/// Read one CSV file into a typed record set.
///
/// Empty cells (after trimming) are treated as absent values.
pub fn load_csv<T: ImportRecord>(path: &Path) -> Result<RecordSet<T>> {
    if !path.exists() {
        bail!("CSV file not found: {}", path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers: {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Invalid CSV row {} in {}", row + 1, path.display()))?;
        let fields: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        records.push(T::from_row(row, fields));
    }

    tracing::info!(
        kind = %T::KIND,
        rows = records.len(),
        file = %path.display(),
        "loaded records"
    );

    Ok(RecordSet { headers, records })
}

/// Load all three input files from the configured input directory.
pub fn load_dataset(input: &crate::config::InputConfig) -> Result<Dataset> {
    Ok(Dataset {
        companies: load_csv(&input.path_for(EntityKind::Company))?,
        contacts: load_csv(&input.path_for(EntityKind::Contact))?,
        tickets: load_csv(&input.path_for(EntityKind::Ticket))?,
    })
}

//! Pre-submission validation and data-quality assessment.
//!
//! Three checks run against each loaded record set:
//!
//! - **Columns**: every required field must be a header. A missing column
//!   blocks the run unless the operator passes `--force`.
//! - **Rows**: rows lacking a required value are excluded before submission.
//!   They are counted here, never sent, and never reported as API errors.
//! - **Emails and phones**: contact emails that do not look like an
//!   address, and phone numbers that do not parse as a valid number
//!   (default region US), are reported as warnings only.
//!
//! Duplicate natural keys (company names, contact emails) are also listed.
//! They are not errors: the lookup index keeps the last one.

use anyhow::{bail, Result};
use phonenumber::country;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::config::{Config, RequiredFields};
use crate::index::normalize_key;
use crate::models::EntityKind;
use crate::records::{load_dataset, ContactRecord, Dataset, ImportRecord, RecordSet};
use crate::report::render_validation;

static EMAIL_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// Size and fill rate of one record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub rows: usize,
    pub columns: usize,
    /// Non-empty cells over total cells, as a percentage.
    pub completeness: f64,
    pub empty_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidEmail {
    pub row: usize,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneProblem {
    Unparseable,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidPhone {
    pub row: usize,
    pub phone: String,
    pub problem: PhoneProblem,
}

/// A natural key shared by more than one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    pub key: String,
    pub rows: Vec<usize>,
}

/// Validation outcome for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    pub kind: EntityKind,
    pub missing_columns: Vec<String>,
    /// Rows that will be left out of submission.
    pub excluded_rows: usize,
    pub invalid_emails: Vec<InvalidEmail>,
    pub invalid_phones: Vec<InvalidPhone>,
    pub duplicates: Vec<DuplicateKey>,
    pub quality: QualityMetrics,
}

impl KindReport {
    pub fn is_valid(&self) -> bool {
        self.missing_columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub kinds: Vec<KindReport>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.kinds.iter().all(KindReport::is_valid)
    }

    /// First kind with missing columns, in creation order.
    pub fn first_failure(&self) -> Option<&KindReport> {
        self.kinds.iter().find(|k| !k.is_valid())
    }

    pub fn get(&self, kind: EntityKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn excluded(&self, kind: EntityKind) -> usize {
        self.get(kind).map(|k| k.excluded_rows).unwrap_or(0)
    }
}

/// Required fields absent from the header row.
pub fn missing_columns<T: ImportRecord>(set: &RecordSet<T>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|field| !set.has_column(field))
        .cloned()
        .collect()
}

/// Whether `record` carries a value for every required field.
pub fn has_required_values<T: ImportRecord>(record: &T, required: &[String]) -> bool {
    required.iter().all(|field| record.field(field).is_some())
}

/// Contacts whose email is present but malformed.
pub fn invalid_emails(contacts: &RecordSet<ContactRecord>) -> Vec<InvalidEmail> {
    contacts
        .records
        .iter()
        .filter_map(|c| {
            let email = c.email.as_deref()?;
            (!EMAIL_FORMAT_RE.is_match(email)).then(|| InvalidEmail {
                row: c.row,
                email: email.to_string(),
            })
        })
        .collect()
}

/// Contacts whose `phone` cell is not a valid number.
pub fn invalid_phones(contacts: &RecordSet<ContactRecord>) -> Vec<InvalidPhone> {
    contacts
        .records
        .iter()
        .filter_map(|c| {
            let phone = c.field("phone")?;
            let problem = match phonenumber::parse(Some(country::Id::US), phone) {
                Ok(number) if phonenumber::is_valid(&number) => return None,
                Ok(_) => PhoneProblem::Invalid,
                Err(_) => PhoneProblem::Unparseable,
            };
            Some(InvalidPhone {
                row: c.row,
                phone: phone.to_string(),
                problem,
            })
        })
        .collect()
}

/// Natural keys (after normalization) that appear on more than one row.
pub fn duplicate_keys<T: ImportRecord>(set: &RecordSet<T>) -> Vec<DuplicateKey> {
    let mut rows_by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for record in &set.records {
        if let Some(key) = record.natural_key().map(normalize_key) {
            if !key.is_empty() {
                rows_by_key.entry(key).or_default().push(record.row());
            }
        }
    }
    rows_by_key
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(key, rows)| DuplicateKey { key, rows })
        .collect()
}

pub fn assess_quality<T: ImportRecord>(set: &RecordSet<T>) -> QualityMetrics {
    let rows = set.len();
    let columns = set.headers.len();
    let total_cells = rows * columns;

    let filled: usize = set
        .records
        .iter()
        .map(|r| {
            r.fields()
                .iter()
                .filter(|(column, _)| set.has_column(column))
                .count()
        })
        .sum();
    let empty_rows = set.records.iter().filter(|r| r.fields().is_empty()).count();

    let completeness = if total_cells > 0 {
        ((filled as f64 / total_cells as f64) * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    QualityMetrics {
        rows,
        columns,
        completeness,
        empty_rows,
    }
}

fn check_set<T: ImportRecord>(set: &RecordSet<T>, required: &[String]) -> KindReport {
    let missing = missing_columns(set, required);
    let excluded_rows = set
        .records
        .iter()
        .filter(|r| !has_required_values(*r, required))
        .count();

    if !missing.is_empty() {
        tracing::warn!(kind = %T::KIND, missing = ?missing, "required columns missing");
    }
    let duplicates = duplicate_keys(set);
    for dup in &duplicates {
        tracing::warn!(kind = %T::KIND, key = %dup.key, rows = ?dup.rows, "duplicate key; last row wins");
    }
    if excluded_rows > 0 {
        tracing::warn!(kind = %T::KIND, rows = excluded_rows, "rows missing required values will be skipped");
    }

    KindReport {
        kind: T::KIND,
        missing_columns: missing,
        excluded_rows,
        invalid_emails: Vec::new(),
        invalid_phones: Vec::new(),
        duplicates,
        quality: assess_quality(set),
    }
}

/// Run every check over the loaded dataset.
pub fn validate_dataset(dataset: &Dataset, required: &RequiredFields) -> ValidationReport {
    let companies = check_set(&dataset.companies, required.for_kind(EntityKind::Company));
    let mut contacts = check_set(&dataset.contacts, required.for_kind(EntityKind::Contact));
    let tickets = check_set(&dataset.tickets, required.for_kind(EntityKind::Ticket));

    contacts.invalid_emails = invalid_emails(&dataset.contacts);
    for bad in &contacts.invalid_emails {
        tracing::warn!(row = bad.row, email = %bad.email, "invalid email format");
    }
    contacts.invalid_phones = invalid_phones(&dataset.contacts);
    for bad in &contacts.invalid_phones {
        tracing::warn!(row = bad.row, phone = %bad.phone, problem = ?bad.problem, "invalid phone number");
    }

    ValidationReport {
        kinds: vec![companies, contacts, tickets],
    }
}

/// `crm-import validate`: load the input files and print the report.
///
/// Fails on missing required columns unless `force` is set.
pub fn run_validate(config: &Config, force: bool) -> Result<()> {
    let dataset = load_dataset(&config.input)?;
    let report = validate_dataset(&dataset, &config.required_fields);
    print!("{}", render_validation(&report));

    if let Some(failure) = report.first_failure() {
        if !force {
            bail!(
                "validation failed: {} missing required columns: {}",
                failure.kind,
                failure.missing_columns.join(", ")
            );
        }
        tracing::warn!("validation failed; ignored because of --force");
    }
    Ok(())
}

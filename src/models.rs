//! Core data types shared by the import pipeline.
//!
//! These describe the entity kinds being loaded, the per-chunk bookkeeping
//! returned by the submitters, the per-ticket enrichment output, and the
//! final run summary handed to the report renderer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier assigned by the CRM when an object is created.
pub type RemoteId = String;

/// The three object types this tool creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Company,
    Contact,
    Ticket,
}

impl EntityKind {
    /// Creation order; companies must exist before contacts, contacts before tickets.
    pub const ALL: [EntityKind; 3] = [EntityKind::Company, EntityKind::Contact, EntityKind::Ticket];

    pub fn singular(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Contact => "contact",
            EntityKind::Ticket => "ticket",
        }
    }

    /// Object type name used in remote endpoint paths.
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Contact => "contacts",
            EntityKind::Ticket => "tickets",
        }
    }

    pub fn objects_path(&self) -> String {
        format!("/crm/v3/objects/{}", self.plural())
    }

    pub fn batch_create_path(&self) -> String {
        format!("{}/batch/create", self.objects_path())
    }

    /// Key into the relationship-code table: `"{source}_to_{target}"`.
    pub fn association_key(source: EntityKind, target: EntityKind) -> String {
        format!("{}_to_{}", source.singular(), target.singular())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Directed relationship kinds created after the objects exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ContactToCompany,
    TicketToContact,
    TicketToCompany,
}

impl RelationshipKind {
    pub fn source(&self) -> EntityKind {
        match self {
            RelationshipKind::ContactToCompany => EntityKind::Contact,
            RelationshipKind::TicketToContact | RelationshipKind::TicketToCompany => {
                EntityKind::Ticket
            }
        }
    }

    pub fn target(&self) -> EntityKind {
        match self {
            RelationshipKind::ContactToCompany | RelationshipKind::TicketToCompany => {
                EntityKind::Company
            }
            RelationshipKind::TicketToContact => EntityKind::Contact,
        }
    }

    pub fn key(&self) -> String {
        EntityKind::association_key(self.source(), self.target())
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A (source, target) pair waiting to be linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationPair {
    pub from_id: RemoteId,
    pub to_id: RemoteId,
}

impl AssociationPair {
    pub fn new(from_id: impl Into<RemoteId>, to_id: impl Into<RemoteId>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
        }
    }
}

/// One failed chunk, with enough context for manual remediation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    /// Zero-based chunk index within the call.
    pub batch_index: usize,
    pub record_count: usize,
    pub message: String,
}

/// Outcome of one batched create (objects or associations).
///
/// `success_count + error_count` always equals the number of inputs, and
/// for object creation `created_ids` is index-aligned with the successfully
/// submitted inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub success_count: usize,
    pub error_count: usize,
    pub created_ids: Vec<RemoteId>,
    pub errors: Vec<BatchError>,
    pub duration_seconds: f64,
}

impl BatchResult {
    /// Result for a call that failed before any chunk was sent.
    pub fn failed_entirely(record_count: usize, message: impl Into<String>) -> Self {
        Self {
            success_count: 0,
            error_count: record_count,
            created_ids: Vec::new(),
            errors: vec![BatchError {
                batch_index: 0,
                record_count,
                message: message.into(),
            }],
            duration_seconds: 0.0,
        }
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.error_count
    }
}

/// Per-ticket output of the enricher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    /// Row index of the ticket in its input file.
    pub ticket_row: usize,
    /// Filled in once the ticket itself has been created.
    pub ticket_id: Option<RemoteId>,
    pub extracted_emails: Vec<String>,
    pub extracted_phones: Vec<String>,
    pub associated_contact_id: Option<RemoteId>,
    pub associated_company_id: Option<RemoteId>,
}

/// Aggregate counters across every batch call of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Percentage, two decimals; `0.0` when nothing was processed.
    pub success_rate: f64,
}

impl Totals {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a BatchResult>) -> Self {
        let (succeeded, failed) = results.into_iter().fold((0, 0), |(ok, err), r| {
            (ok + r.success_count, err + r.error_count)
        });
        let processed = succeeded + failed;
        let success_rate = if processed > 0 {
            ((succeeded as f64 / processed as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            processed,
            succeeded,
            failed,
            success_rate,
        }
    }
}

/// Structured result of a complete run, rendered by the report module.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub dry_run: bool,
    pub objects: BTreeMap<EntityKind, BatchResult>,
    pub associations: BTreeMap<RelationshipKind, BatchResult>,
    /// Rows dropped before submission for missing a required value.
    pub excluded: BTreeMap<EntityKind, usize>,
    /// Relationships that could not be resolved (not errors).
    pub skipped: BTreeMap<RelationshipKind, usize>,
    pub totals: Totals,
}

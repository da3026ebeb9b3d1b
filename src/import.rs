//! Import orchestrator.
//!
//! Drives one run through a fixed, strictly forward sequence of stages:
//!
//! ```text
//! Loaded → Validated → Enriched → CompaniesCreated → ContactsCreated
//!        → TicketsCreated → AssociationsCreated → Reported
//! ```
//!
//! Only three things abort a run: unreadable input (before this module is
//! reached), missing required columns (unless forced) and a failed
//! connectivity probe. Both of the latter happen before any object is
//! created. Every later failure is collected into the summary.
//!
//! Companies are created before contacts and contacts before tickets: each
//! step builds the lookup index the next one resolves against.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::client::{ApiRequest, DryRunTransport, HttpTransport, Transport, PROBE_PATH};
use crate::config::{Config, MAX_BATCH_SIZE};
use crate::enrich::{
    assign_ticket_ids, contact_company_pairs, contacts_by_remote_id, extract_all, resolve,
    to_association_pairs,
};
use crate::index::{build_company_index, build_contact_index};
use crate::models::{
    AssociationPair, BatchResult, EntityKind, ImportSummary, RelationshipKind, Totals,
};
use crate::progress::{ImportEvent, ImportObserver};
use crate::records::{load_dataset, Dataset, ImportRecord, RecordSet};
use crate::report::{render_summary, summary_json};
use crate::retry::{send_with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::submit::BatchSubmitter;
use crate::validate::{has_required_values, validate_dataset, ValidationReport};

/// Run-aborting failures. Chunk-level failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("required columns missing for {kind}: {}", .missing.join(", "))]
    Validation {
        kind: EntityKind,
        missing: Vec<String>,
    },
    #[error("connectivity check failed: {0}")]
    Connectivity(String),
    #[error(transparent)]
    Input(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Loaded,
    Validated,
    Enriched,
    CompaniesCreated,
    ContactsCreated,
    TicketsCreated,
    AssociationsCreated,
    Reported,
}

impl ImportStage {
    pub fn name(&self) -> &'static str {
        match self {
            ImportStage::Loaded => "loaded",
            ImportStage::Validated => "validated",
            ImportStage::Enriched => "enriched",
            ImportStage::CompaniesCreated => "companies_created",
            ImportStage::ContactsCreated => "contacts_created",
            ImportStage::TicketsCreated => "tickets_created",
            ImportStage::AssociationsCreated => "associations_created",
            ImportStage::Reported => "reported",
        }
    }

    /// One-line description for human progress output.
    pub fn describe(&self) -> &'static str {
        match self {
            ImportStage::Loaded => "Input loaded",
            ImportStage::Validated => "Validation passed",
            ImportStage::Enriched => "Extracted contact details from tickets",
            ImportStage::CompaniesCreated => "Companies created",
            ImportStage::ContactsCreated => "Contacts created",
            ImportStage::TicketsCreated => "Tickets created",
            ImportStage::AssociationsCreated => "Associations created",
            ImportStage::Reported => "Summary ready",
        }
    }
}

/// Sequences a full import over one transport.
pub struct Importer<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    observer: &'a dyn ImportObserver,
    force: bool,
    dry_run: bool,
}

impl<'a> Importer<'a> {
    pub fn new(
        config: &'a Config,
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        observer: &'a dyn ImportObserver,
    ) -> Self {
        Self {
            config,
            transport,
            sleeper,
            observer,
            force: false,
            dry_run: false,
        }
    }

    /// Proceed past missing required columns with a warning.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Mark the summary as a dry run. The transport decides what is actually sent.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn enter(&self, stage: ImportStage) {
        tracing::info!(stage = stage.name(), "import stage");
        self.observer.report(ImportEvent::Stage { stage });
    }

    fn submitter(&self) -> BatchSubmitter<'_> {
        BatchSubmitter::new(
            self.transport,
            self.sleeper,
            self.observer,
            RetryPolicy::from_config(&self.config.import),
            self.config.import.batch_size,
        )
    }

    /// Probe the API with a single cheap read, using the normal retry policy.
    pub async fn check_connectivity(&self) -> Result<(), ImportError> {
        let policy = RetryPolicy::from_config(&self.config.import);
        send_with_retry(
            self.transport,
            self.sleeper,
            &policy,
            self.observer,
            "connectivity",
            &ApiRequest::get(PROBE_PATH),
        )
        .await
        .map(|_| ())
        .map_err(|e| ImportError::Connectivity(e.to_string()))
    }

    /// Fail on missing required columns unless forced.
    pub fn check_validation(&self, report: &ValidationReport) -> Result<(), ImportError> {
        let Some(failure) = report.first_failure() else {
            return Ok(());
        };
        if self.force {
            tracing::warn!(
                kind = %failure.kind,
                missing = ?failure.missing_columns,
                "validation failed; continuing because of --force"
            );
            return Ok(());
        }
        Err(ImportError::Validation {
            kind: failure.kind,
            missing: failure.missing_columns.clone(),
        })
    }

    /// Run every stage over `dataset` and return the structured summary.
    ///
    /// Records in `dataset` have their remote ids filled in as a side effect.
    pub async fn run(&self, dataset: &mut Dataset) -> Result<ImportSummary, ImportError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, records = dataset.total_records(), "starting import");
        self.enter(ImportStage::Loaded);

        let report = validate_dataset(dataset, &self.config.required_fields);
        self.check_validation(&report)?;
        self.enter(ImportStage::Validated);

        let mut enrichment = extract_all(&dataset.tickets.records);
        self.enter(ImportStage::Enriched);

        self.check_connectivity().await?;

        let submitter = self.submitter();
        let mut objects = BTreeMap::new();
        let mut associations = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        let excluded: BTreeMap<EntityKind, usize> = EntityKind::ALL
            .iter()
            .map(|&kind| (kind, report.excluded(kind)))
            .collect();

        let companies = self.create(&submitter, &mut dataset.companies).await;
        objects.insert(EntityKind::Company, companies);
        let company_index = build_company_index(&dataset.companies.records);
        self.enter(ImportStage::CompaniesCreated);

        let contacts = self.create(&submitter, &mut dataset.contacts).await;
        objects.insert(EntityKind::Contact, contacts);
        let contact_index = build_contact_index(&dataset.contacts.records);
        let (contact_company, unlinked_contacts) =
            contact_company_pairs(&dataset.contacts.records, &company_index);
        skipped.insert(RelationshipKind::ContactToCompany, unlinked_contacts);
        self.enter(ImportStage::ContactsCreated);

        resolve(
            &mut enrichment,
            &contact_index,
            &company_index,
            &contacts_by_remote_id(&dataset.contacts.records),
        );

        let tickets = self.create(&submitter, &mut dataset.tickets).await;
        objects.insert(EntityKind::Ticket, tickets);
        assign_ticket_ids(&mut enrichment, &dataset.tickets.records);
        self.enter(ImportStage::TicketsCreated);

        let ticket_pairs = to_association_pairs(&enrichment);
        let created_tickets = enrichment.iter().filter(|r| r.ticket_id.is_some()).count();
        skipped.insert(
            RelationshipKind::TicketToContact,
            created_tickets - ticket_pairs.ticket_to_contact.len(),
        );
        skipped.insert(
            RelationshipKind::TicketToCompany,
            created_tickets - ticket_pairs.ticket_to_company.len(),
        );

        let plan: [(RelationshipKind, &[AssociationPair]); 3] = [
            (RelationshipKind::ContactToCompany, contact_company.as_slice()),
            (RelationshipKind::TicketToContact, ticket_pairs.ticket_to_contact.as_slice()),
            (RelationshipKind::TicketToCompany, ticket_pairs.ticket_to_company.as_slice()),
        ];
        for (relationship, pairs) in plan {
            let result = submitter
                .create_associations(
                    relationship.source(),
                    relationship.target(),
                    pairs,
                    self.config,
                )
                .await;
            associations.insert(relationship, result);
        }
        self.enter(ImportStage::AssociationsCreated);

        let totals = Totals::from_results(objects.values().chain(associations.values()));
        let summary = ImportSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_seconds: clock.elapsed().as_secs_f64(),
            dry_run: self.dry_run,
            objects,
            associations,
            excluded,
            skipped,
            totals,
        };
        tracing::info!(
            run_id = %summary.run_id,
            processed = summary.totals.processed,
            failed = summary.totals.failed,
            "import finished"
        );
        self.enter(ImportStage::Reported);

        Ok(summary)
    }

    /// Create every record that carries its required values.
    async fn create<T: ImportRecord>(
        &self,
        submitter: &BatchSubmitter<'_>,
        set: &mut RecordSet<T>,
    ) -> BatchResult {
        let required = self.config.required_fields.for_kind(T::KIND);
        let mapping = self.config.mappings.for_kind(T::KIND);

        let mut pending: Vec<&mut T> = set
            .records
            .iter_mut()
            .filter(|r| has_required_values(&**r, required))
            .collect();
        let properties: Vec<_> = pending.iter().map(|r| r.properties(mapping)).collect();

        submitter.create_records(&mut pending, &properties).await
    }
}

/// Flags of `crm-import run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub force: bool,
    pub dry_run: bool,
    pub json: bool,
    pub batch_size: Option<usize>,
}

fn transport_for(config: &Config, dry_run: bool) -> anyhow::Result<Box<dyn Transport>> {
    if dry_run {
        Ok(Box::new(DryRunTransport::new()))
    } else {
        Ok(Box::new(HttpTransport::from_config(&config.api)?))
    }
}

/// `crm-import check`: probe the API and report whether it answered.
pub async fn run_check(config: &Config, observer: &dyn ImportObserver) -> anyhow::Result<()> {
    let transport = transport_for(config, false)?;
    Importer::new(config, transport.as_ref(), &TokioSleeper, observer)
        .check_connectivity()
        .await?;
    println!("Connected to {}", config.api.base_url);
    Ok(())
}

/// `crm-import run`: load, import and print the summary to stdout.
pub async fn run_import(
    config: &Config,
    options: &RunOptions,
    observer: &dyn ImportObserver,
) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(batch_size) = options.batch_size {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            anyhow::bail!("--batch-size must be in 1..={}", MAX_BATCH_SIZE);
        }
        config.import.batch_size = batch_size;
    }

    let mut dataset = load_dataset(&config.input)?;
    let transport = transport_for(&config, options.dry_run)?;

    let summary = Importer::new(&config, transport.as_ref(), &TokioSleeper, observer)
        .force(options.force)
        .dry_run(options.dry_run)
        .run(&mut dataset)
        .await?;

    if options.json {
        println!("{}", summary_json(&summary)?);
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiResponse, DryRunTransport};
    use crate::progress::NoProgress;
    use crate::retry::testing::*;
    use crate::retry::RecordingSleeper;
    use std::sync::Mutex;

    fn dataset() -> Dataset {
        fn rows(data: &[&[(&str, &str)]]) -> Vec<BTreeMap<String, String>> {
            data.iter()
                .map(|r| r.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
                .collect()
        }
        Dataset {
            companies: RecordSet::from_rows(rows(&[&[("name", "Acme")], &[("name", "Globex")]])),
            contacts: RecordSet::from_rows(rows(&[
                &[("email", "jane@acme.io"), ("company", "Acme")],
                &[("email", "bob@nowhere.io"), ("company", "Initech")],
                &[("company", "Acme")],
            ])),
            tickets: RecordSet::from_rows(rows(&[
                &[("subject", "Login"), ("content", "from JANE@acme.io")],
                &[("subject", "No sender")],
            ])),
        }
    }

    fn test_config() -> Config {
        let mut config = Config::minimal();
        config.import.inter_chunk_delay_ms = 0;
        config
    }

    struct Stages(Mutex<Vec<ImportStage>>);

    impl ImportObserver for Stages {
        fn report(&self, event: ImportEvent) {
            if let ImportEvent::Stage { stage } = event {
                self.0.lock().unwrap().push(stage);
            }
        }
    }

    #[tokio::test]
    async fn test_dry_run_end_to_end() {
        let config = test_config();
        let transport = DryRunTransport::new();
        let sleeper = RecordingSleeper::new();
        let stages = Stages(Mutex::new(Vec::new()));
        let mut data = dataset();

        let summary = Importer::new(&config, &transport, &sleeper, &stages)
            .dry_run(true)
            .run(&mut data)
            .await
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.objects[&EntityKind::Company].success_count, 2);
        assert_eq!(summary.objects[&EntityKind::Contact].success_count, 2);
        assert_eq!(summary.excluded[&EntityKind::Contact], 1);
        assert_eq!(summary.associations[&RelationshipKind::ContactToCompany].success_count, 1);
        assert_eq!(summary.skipped[&RelationshipKind::ContactToCompany], 1);
        assert_eq!(summary.associations[&RelationshipKind::TicketToContact].success_count, 1);
        assert_eq!(summary.associations[&RelationshipKind::TicketToCompany].success_count, 1);
        assert_eq!(summary.skipped[&RelationshipKind::TicketToContact], 1);
        assert_eq!(summary.totals.failed, 0);
        assert_eq!(summary.totals.success_rate, 100.0);
        assert!(data.contacts.records[2].remote_id.is_none());

        let seen = stages.0.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&ImportStage::Loaded));
        assert_eq!(seen.last(), Some(&ImportStage::Reported));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_missing_column_aborts_before_any_request() {
        let config = test_config();
        let transport = ScriptedTransport::new(vec![], echo_ids("x"));
        let sleeper = RecordingSleeper::new();
        let mut data = dataset();
        data.companies = RecordSet::new(vec!["domain".into()], vec![]);

        let err = Importer::new(&config, &transport, &sleeper, &NoProgress)
            .run(&mut data)
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Validation { kind: EntityKind::Company, .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_force_overrides_missing_column() {
        let config = test_config();
        let transport = DryRunTransport::new();
        let sleeper = RecordingSleeper::new();
        let mut data = dataset();
        data.companies = RecordSet::new(vec!["domain".into()], vec![]);

        let summary = Importer::new(&config, &transport, &sleeper, &NoProgress)
            .force(true)
            .run(&mut data)
            .await
            .unwrap();
        assert_eq!(summary.objects[&EntityKind::Company].processed(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_creates_nothing() {
        let mut config = test_config();
        config.import.max_retries = 1;
        let transport = ScriptedTransport::new(vec![], |_| ApiResponse::new(401, "unauthorized"));
        let sleeper = RecordingSleeper::new();
        let mut data = dataset();

        let err = Importer::new(&config, &transport, &sleeper, &NoProgress)
            .run(&mut data)
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Connectivity(_)));
        assert_eq!(transport.request_count(), 1);
        assert!(err.to_string().contains("HTTP 401"));
    }
}

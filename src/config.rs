//! TOML configuration parsing.
//!
//! Every section has defaults, so a missing table (or a near-empty file)
//! yields the standard CRM endpoints, batch limits, required fields,
//! relationship codes and property mappings.
//!
//! ```toml
//! [api]
//! base_url = "https://api.hubapi.com"
//! api_key_env = "CRM_API_KEY"
//!
//! [import]
//! batch_size = 100
//! max_retries = 3
//! retry_delay_secs = 2.0
//! inter_chunk_delay_ms = 100
//!
//! [input]
//! dir = "data"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::EntityKind;

/// Largest batch the remote batch endpoints accept.
pub const MAX_BATCH_SIZE: usize = 100;

/// Ceiling for `import.retry_delay_secs`.
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub required_fields: RequiredFields,
    #[serde(default = "default_association_types")]
    pub association_types: BTreeMap<String, u32>,
    #[serde(default)]
    pub mappings: Mappings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            import: ImportConfig::default(),
            input: InputConfig::default(),
            required_fields: RequiredFields::default(),
            association_types: default_association_types(),
            mappings: Mappings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}
fn default_api_key_env() -> String {
    "CRM_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
        }
    }
}

impl ImportConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> f64 {
    2.0
}
fn default_inter_chunk_delay_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_companies_file")]
    pub companies: String,
    #[serde(default = "default_contacts_file")]
    pub contacts: String,
    #[serde(default = "default_tickets_file")]
    pub tickets: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            companies: default_companies_file(),
            contacts: default_contacts_file(),
            tickets: default_tickets_file(),
        }
    }
}

impl InputConfig {
    /// Resolved path of the CSV file holding records of `kind`.
    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        let file = match kind {
            EntityKind::Company => &self.companies,
            EntityKind::Contact => &self.contacts,
            EntityKind::Ticket => &self.tickets,
        };
        self.dir.join(file)
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_companies_file() -> String {
    "companies.csv".to_string()
}
fn default_contacts_file() -> String {
    "contacts.csv".to_string()
}
fn default_tickets_file() -> String {
    "tickets.csv".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RequiredFields {
    #[serde(default = "default_required_companies")]
    pub companies: Vec<String>,
    #[serde(default = "default_required_contacts")]
    pub contacts: Vec<String>,
    #[serde(default = "default_required_tickets")]
    pub tickets: Vec<String>,
}

impl Default for RequiredFields {
    fn default() -> Self {
        Self {
            companies: default_required_companies(),
            contacts: default_required_contacts(),
            tickets: default_required_tickets(),
        }
    }
}

impl RequiredFields {
    pub fn for_kind(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Company => &self.companies,
            EntityKind::Contact => &self.contacts,
            EntityKind::Ticket => &self.tickets,
        }
    }
}

fn default_required_companies() -> Vec<String> {
    vec!["name".to_string()]
}
fn default_required_contacts() -> Vec<String> {
    vec!["email".to_string()]
}
fn default_required_tickets() -> Vec<String> {
    vec!["subject".to_string()]
}

fn default_association_types() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("contact_to_company".to_string(), 1),
        ("ticket_to_contact".to_string(), 16),
        ("ticket_to_company".to_string(), 26),
    ])
}

/// Column → remote property name tables, one per entity kind.
#[derive(Debug, Deserialize, Clone)]
pub struct Mappings {
    #[serde(default = "default_company_mapping")]
    pub companies: BTreeMap<String, String>,
    #[serde(default = "default_contact_mapping")]
    pub contacts: BTreeMap<String, String>,
    #[serde(default = "default_ticket_mapping")]
    pub tickets: BTreeMap<String, String>,
}

impl Default for Mappings {
    fn default() -> Self {
        Self {
            companies: default_company_mapping(),
            contacts: default_contact_mapping(),
            tickets: default_ticket_mapping(),
        }
    }
}

impl Mappings {
    pub fn for_kind(&self, kind: EntityKind) -> &BTreeMap<String, String> {
        match kind {
            EntityKind::Company => &self.companies,
            EntityKind::Contact => &self.contacts,
            EntityKind::Ticket => &self.tickets,
        }
    }
}

fn identity_mapping(columns: &[&str]) -> BTreeMap<String, String> {
    columns
        .iter()
        .map(|c| (c.to_string(), c.to_string()))
        .collect()
}

fn default_company_mapping() -> BTreeMap<String, String> {
    identity_mapping(&[
        "name",
        "domain",
        "industry",
        "city",
        "state",
        "country",
        "phone",
        "numberofemployees",
        "annualrevenue",
        "lifecyclestage",
        "hs_lead_status",
    ])
}

fn default_contact_mapping() -> BTreeMap<String, String> {
    identity_mapping(&[
        "firstname",
        "lastname",
        "email",
        "phone",
        "company",
        "jobtitle",
        "lifecyclestage",
        "hs_lead_status",
    ])
}

fn default_ticket_mapping() -> BTreeMap<String, String> {
    identity_mapping(&[
        "subject",
        "content",
        "hs_ticket_priority",
        "hs_pipeline_stage",
        "hs_ticket_category",
        "source_type",
        "createdate",
        "closed_date",
    ])
}

impl Config {
    /// All-defaults configuration for commands that can run without a file.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Relationship code for `"{source}_to_{target}"`, if configured.
    pub fn association_type(&self, source: EntityKind, target: EntityKind) -> Option<u32> {
        self.association_types
            .get(&EntityKind::association_key(source, target))
            .copied()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.import.batch_size == 0 || config.import.batch_size > MAX_BATCH_SIZE {
        anyhow::bail!("import.batch_size must be in 1..={}", MAX_BATCH_SIZE);
    }

    let delay = config.import.retry_delay_secs;
    if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&delay) {
        anyhow::bail!(
            "import.retry_delay_secs must be in 0..={}",
            MAX_RETRY_DELAY_SECS
        );
    }

    if config.api.base_url.trim().is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }

    for kind in EntityKind::ALL {
        if config.mappings.for_kind(kind).is_empty() {
            anyhow::bail!("mappings.{} must map at least one column", kind.plural());
        }
    }

    Ok(())
}

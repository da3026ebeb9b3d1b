//! # CRM Bulk Import
//!
//! Loads companies, contacts and tickets from CSV files into a CRM over its
//! REST API, then links them: contacts to their companies, and tickets to
//! the contact (and that contact's company) whose email appears in the
//! ticket text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │   CSV    │──▶│  Validate  │──▶│   Batched    │──▶│  CRM API  │
//! │  files   │   │  + extract │   │ create+retry │   │ (or dry)  │
//! └──────────┘   └────────────┘   └──────┬───────┘   └───────────┘
//!                                        │ remote ids
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │  Lookup indexes  │──▶ associations
//!                               └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crm-import validate                 # check the input files
//! crm-import enrich                   # preview emails/phones found in tickets
//! crm-import run --dry-run            # full pipeline, no network
//! CRM_API_KEY=... crm-import run      # real import
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the run summary |
//! | [`records`] | Typed records and CSV loading |
//! | [`validate`] | Required fields and data-quality checks |
//! | [`extract`] | Email and phone extraction from free text |
//! | [`index`] | Natural key → remote id lookup tables |
//! | [`enrich`] | Ticket contact/company resolution |
//! | [`client`] | Transport trait, HTTP and dry-run transports |
//! | [`retry`] | Backoff retry for a single call |
//! | [`submit`] | Batched object creation |
//! | [`associate`] | Batched association creation |
//! | [`import`] | Stage-by-stage orchestrator |
//! | [`progress`] | Progress observers |
//! | [`report`] | Summary rendering |

pub mod associate;
pub mod client;
pub mod config;
pub mod enrich;
pub mod extract;
pub mod import;
pub mod index;
pub mod models;
pub mod progress;
pub mod records;
pub mod report;
pub mod retry;
pub mod submit;
pub mod validate;

//! Relationship resolution for created records.
//!
//! Tickets carry no foreign keys; their contact is derived from the first
//! email address found in the subject or content, and their company from
//! that contact's company name. Contacts link to companies by name. An
//! unresolved link is a normal outcome, not an error.

use anyhow::Result;
use std::collections::HashMap;

use crate::config::Config;
use crate::extract::{extract_emails, extract_phones};
use crate::index::{find_company_by_name, find_contact_by_email, LookupIndex};
use crate::models::{AssociationPair, EntityKind, EnrichmentResult, RemoteId};
use crate::records::{load_csv, ContactRecord, ImportRecord, RecordSet, TicketRecord};

/// Contacts keyed by their remote id, for the ticket → company hop.
pub fn contacts_by_remote_id(contacts: &[ContactRecord]) -> HashMap<&str, &ContactRecord> {
    contacts
        .iter()
        .filter_map(|c| c.remote_id().map(|id| (id.as_str(), c)))
        .collect()
}

/// Extract contact details from every ticket and resolve its contact and company.
pub fn enrich(
    tickets: &[TicketRecord],
    contact_index: &LookupIndex,
    company_index: &LookupIndex,
    contacts_by_id: &HashMap<&str, &ContactRecord>,
) -> Vec<EnrichmentResult> {
    let mut results = extract_all(tickets);
    resolve(&mut results, contact_index, company_index, contacts_by_id);
    results
}

/// Scan each ticket's subject and content; nothing is resolved yet.
pub fn extract_all(tickets: &[TicketRecord]) -> Vec<EnrichmentResult> {
    tickets
        .iter()
        .map(|ticket| {
            let text = ticket.search_text();
            EnrichmentResult {
                ticket_row: ticket.row(),
                ticket_id: ticket.remote_id().cloned(),
                extracted_emails: extract_emails(Some(&text)),
                extracted_phones: extract_phones(Some(&text)),
                associated_contact_id: None,
                associated_company_id: None,
            }
        })
        .collect()
}

/// Fill in the contact and company of each result from the lookup indexes.
pub fn resolve(
    results: &mut [EnrichmentResult],
    contact_index: &LookupIndex,
    company_index: &LookupIndex,
    contacts_by_id: &HashMap<&str, &ContactRecord>,
) {
    for result in results.iter_mut() {
        // Single-candidate policy: only the first email is looked up.
        result.associated_contact_id = result
            .extracted_emails
            .first()
            .and_then(|email| find_contact_by_email(contact_index, email))
            .cloned();

        result.associated_company_id = result
            .associated_contact_id
            .as_deref()
            .and_then(|id| contacts_by_id.get(id))
            .and_then(|contact| contact.company.as_deref())
            .and_then(|name| find_company_by_name(company_index, name))
            .cloned();
    }

    let stats = EnrichmentStats::from_results(results);
    tracing::info!(
        tickets = results.len(),
        with_email = stats.with_email,
        contacts = stats.contacts_found,
        companies = stats.companies_found,
        "enrichment complete"
    );
}

/// Copy ticket remote ids onto their enrichment results, matching by row.
pub fn assign_ticket_ids(results: &mut [EnrichmentResult], tickets: &[TicketRecord]) {
    let ids: HashMap<usize, &RemoteId> = tickets
        .iter()
        .filter_map(|t| t.remote_id().map(|id| (t.row(), id)))
        .collect();
    for result in results.iter_mut() {
        if let Some(id) = ids.get(&result.ticket_row) {
            result.ticket_id = Some((*id).clone());
        }
    }
}

/// Association pairs derived from enrichment, one list per relationship.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketAssociations {
    pub ticket_to_contact: Vec<AssociationPair>,
    pub ticket_to_company: Vec<AssociationPair>,
}

/// Keep only tickets that exist remotely and have a resolved target.
pub fn to_association_pairs(results: &[EnrichmentResult]) -> TicketAssociations {
    let mut pairs = TicketAssociations::default();
    for result in results {
        let Some(ticket_id) = &result.ticket_id else {
            continue;
        };
        if let Some(contact_id) = &result.associated_contact_id {
            pairs
                .ticket_to_contact
                .push(AssociationPair::new(ticket_id.clone(), contact_id.clone()));
        }
        if let Some(company_id) = &result.associated_company_id {
            pairs
                .ticket_to_company
                .push(AssociationPair::new(ticket_id.clone(), company_id.clone()));
        }
    }
    pairs
}

/// Contact → company pairs for created contacts whose company name resolves.
///
/// Returns the pairs and the number of created contacts left unlinked.
pub fn contact_company_pairs(
    contacts: &[ContactRecord],
    company_index: &LookupIndex,
) -> (Vec<AssociationPair>, usize) {
    let mut pairs = Vec::new();
    let mut skipped = 0;
    for contact in contacts {
        let Some(contact_id) = contact.remote_id() else {
            continue;
        };
        match contact
            .company
            .as_deref()
            .and_then(|name| find_company_by_name(company_index, name))
        {
            Some(company_id) => pairs.push(AssociationPair::new(contact_id.clone(), company_id.clone())),
            None => skipped += 1,
        }
    }
    (pairs, skipped)
}

/// Counters reported after enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub with_email: usize,
    pub with_phone: usize,
    pub contacts_found: usize,
    pub companies_found: usize,
}

impl EnrichmentStats {
    pub fn from_results(results: &[EnrichmentResult]) -> Self {
        let mut stats = Self::default();
        for r in results {
            stats.with_email += usize::from(!r.extracted_emails.is_empty());
            stats.with_phone += usize::from(!r.extracted_phones.is_empty());
            stats.contacts_found += usize::from(r.associated_contact_id.is_some());
            stats.companies_found += usize::from(r.associated_company_id.is_some());
        }
        stats
    }
}

/// `crm-import enrich`: show what would be extracted from each ticket.
///
/// Reads only the tickets file and makes no API calls.
pub fn run_enrich(config: &Config, json: bool) -> Result<()> {
    let tickets: RecordSet<TicketRecord> = load_csv(&config.input.path_for(EntityKind::Ticket))?;
    let results = extract_all(&tickets.records);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("{:<6} {:<40} PHONES", "ROW", "EMAILS");
    println!("{}", "-".repeat(72));
    for r in results
        .iter()
        .filter(|r| !r.extracted_emails.is_empty() || !r.extracted_phones.is_empty())
    {
        println!(
            "{:<6} {:<40} {}",
            r.ticket_row + 1,
            r.extracted_emails.join(", "),
            r.extracted_phones.join(", ")
        );
    }

    let stats = EnrichmentStats::from_results(&results);
    println!();
    println!(
        "{} tickets, {} with an email, {} with a phone number",
        results.len(),
        stats.with_email,
        stats.with_phone
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_company_index, build_contact_index};
    use crate::records::CompanyRecord;

    fn ticket(row: usize, subject: &str, content: Option<&str>) -> TicketRecord {
        TicketRecord {
            row,
            subject: Some(subject.to_string()),
            content: content.map(String::from),
            ..Default::default()
        }
    }

    fn contact(email: &str, company: Option<&str>, id: &str) -> ContactRecord {
        ContactRecord {
            email: Some(email.to_string()),
            company: company.map(String::from),
            remote_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn company(name: &str, id: &str) -> CompanyRecord {
        CompanyRecord {
            name: Some(name.to_string()),
            remote_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_contact_resolved_from_content() {
        let contacts = vec![contact("john@x.com", None, "C1")];
        let contact_index = build_contact_index(&contacts);
        let by_id = contacts_by_remote_id(&contacts);
        let results = enrich(
            &[ticket(0, "Printer", Some("Contact: john@x.com"))],
            &contact_index,
            &LookupIndex::new(),
            &by_id,
        );
        assert_eq!(results[0].associated_contact_id.as_deref(), Some("C1"));
        assert_eq!(results[0].associated_company_id, None);
    }

    #[test]
    fn test_no_email_yields_no_association() {
        let contacts = vec![contact("john@x.com", None, "C1")];
        let contact_index = build_contact_index(&contacts);
        let results = enrich(
            &[ticket(0, "Printer jammed", None)],
            &contact_index,
            &LookupIndex::new(),
            &contacts_by_remote_id(&contacts),
        );
        assert!(results[0].extracted_emails.is_empty());
        assert_eq!(results[0].associated_contact_id, None);
    }

    #[test]
    fn test_company_resolved_through_contact() {
        let contacts = vec![contact("amy@globex.io", Some(" globex "), "C7")];
        let companies = vec![company("Globex", "CO3")];
        let results = enrich(
            &[ticket(0, "Refund for amy@globex.io", Some("call +442079460958"))],
            &build_contact_index(&contacts),
            &build_company_index(&companies),
            &contacts_by_remote_id(&contacts),
        );
        assert_eq!(results[0].associated_company_id.as_deref(), Some("CO3"));
        assert_eq!(results[0].extracted_phones, vec!["+442079460958"]);
    }

    #[test]
    fn test_only_first_email_is_used() {
        let contacts = vec![contact("second@x.com", None, "C2")];
        let results = enrich(
            &[ticket(0, "from first@x.com", Some("cc second@x.com"))],
            &build_contact_index(&contacts),
            &LookupIndex::new(),
            &contacts_by_remote_id(&contacts),
        );
        assert_eq!(results[0].extracted_emails.len(), 2);
        assert_eq!(results[0].associated_contact_id, None);
    }

    #[test]
    fn test_extract_all_leaves_links_unresolved() {
        let results = extract_all(&[ticket(3, "from a@b.co and a@b.co", None)]);
        assert_eq!(results[0].ticket_row, 3);
        assert_eq!(results[0].extracted_emails, vec!["a@b.co"]);
        assert_eq!(results[0].associated_contact_id, None);
    }

    #[test]
    fn test_pairs_require_ticket_id() {
        let mut results = vec![
            EnrichmentResult {
                ticket_row: 0,
                ticket_id: None,
                extracted_emails: vec![],
                extracted_phones: vec![],
                associated_contact_id: Some("C1".into()),
                associated_company_id: Some("CO1".into()),
            },
            EnrichmentResult {
                ticket_row: 1,
                ticket_id: None,
                extracted_emails: vec![],
                extracted_phones: vec![],
                associated_contact_id: Some("C2".into()),
                associated_company_id: None,
            },
        ];
        assert_eq!(to_association_pairs(&results), TicketAssociations::default());

        let tickets = vec![TicketRecord {
            row: 1,
            remote_id: Some("T9".into()),
            ..Default::default()
        }];
        assign_ticket_ids(&mut results, &tickets);
        let pairs = to_association_pairs(&results);
        assert_eq!(pairs.ticket_to_contact, vec![AssociationPair::new("T9", "C2")]);
        assert!(pairs.ticket_to_company.is_empty());
    }

    #[test]
    fn test_contact_company_pairs_count_skips() {
        let contacts = vec![
            contact("a@x.io", Some("Acme"), "C1"),
            contact("b@x.io", Some("Unknown Ltd"), "C2"),
            contact("c@x.io", None, "C3"),
            ContactRecord {
                email: Some("d@x.io".into()),
                company: Some("Acme".into()),
                ..Default::default()
            },
        ];
        let index = build_company_index(&[company("acme", "CO1")]);
        let (pairs, skipped) = contact_company_pairs(&contacts, &index);
        assert_eq!(pairs, vec![AssociationPair::new("C1", "CO1")]);
        assert_eq!(skipped, 2);
    }
}

//! Batched association creation.
//!
//! Pairs are chunked and retried exactly like object creation. The
//! relationship code for `(source, target)` is resolved first; an unknown
//! pair is a configuration error and fails the whole call without a single
//! request.

use serde_json::json;

use crate::client::ApiRequest;
use crate::config::Config;
use crate::models::{AssociationPair, BatchResult, EntityKind};
use crate::retry::SubmitError;
use crate::submit::BatchSubmitter;

fn association_path(source: EntityKind, target: EntityKind) -> String {
    format!(
        "/crm/v3/associations/{}/{}/batch/create",
        source.plural(),
        target.plural()
    )
}

impl BatchSubmitter<'_> {
    /// Link each `(from_id, to_id)` pair with the configured relationship code.
    ///
    /// The code comes from the `[association_types]` table in `config`.
    pub async fn create_associations(
        &self,
        source: EntityKind,
        target: EntityKind,
        pairs: &[AssociationPair],
        config: &Config,
    ) -> BatchResult {
        let key = EntityKind::association_key(source, target);
        if pairs.is_empty() {
            tracing::info!(association = %key, "no associations to create");
            return BatchResult::default();
        }

        let Some(code) = config.association_type(source, target) else {
            let err = SubmitError::UnknownAssociation(key.clone());
            tracing::error!(association = %key, pairs = pairs.len(), "{}", err);
            return BatchResult::failed_entirely(pairs.len(), err.to_string());
        };

        tracing::info!(association = %key, pairs = pairs.len(), "creating associations");
        let path = association_path(source, target);

        let outcome = self
            .run_chunks(
                &key,
                pairs,
                |chunk| {
                    let inputs: Vec<_> = chunk
                        .iter()
                        .map(|p| {
                            json!({
                                "from": { "id": p.from_id },
                                "to": { "id": p.to_id },
                                "type": code,
                            })
                        })
                        .collect();
                    ApiRequest::post(path.clone(), json!({ "inputs": inputs }))
                },
                |_, _| Ok(Vec::new()),
            )
            .await;

        outcome.result
    }
}

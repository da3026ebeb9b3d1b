//! Batched object creation.
//!
//! Records are split into consecutive chunks of at most `batch_size`, each
//! sent as one `POST <objects>/batch/create` call through
//! [`send_with_retry`]. A failed chunk never aborts the call: it is
//! recorded in [`BatchResult::errors`] and the remaining chunks are still
//! attempted. A fixed pause separates successive chunks.

use serde_json::{json, Map, Value};
use std::time::Instant;

use crate::client::{ApiRequest, Transport};
use crate::models::{BatchError, BatchResult, EntityKind, RemoteId};
use crate::progress::{ImportEvent, ImportObserver};
use crate::records::ImportRecord;
use crate::retry::{send_with_retry, RetryPolicy, Sleeper, SubmitError};

/// Submits batches through a transport with the shared retry policy.
pub struct BatchSubmitter<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) sleeper: &'a dyn Sleeper,
    pub(crate) observer: &'a dyn ImportObserver,
    pub(crate) policy: RetryPolicy,
    pub(crate) batch_size: usize,
}

/// Per-chunk callback result: ids for object creation, nothing for associations.
pub(crate) type ChunkIds = Vec<RemoteId>;

/// Outcome of a chunked call plus, for each input, the id it received.
pub(crate) struct ChunkedOutcome {
    pub result: BatchResult,
    pub assignments: Vec<Option<RemoteId>>,
}

impl<'a> BatchSubmitter<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        observer: &'a dyn ImportObserver,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            transport,
            sleeper,
            observer,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Create one remote object per property map.
    ///
    /// `created_ids` lists the ids of successful chunks, in input order.
    pub async fn create_all(&self, kind: EntityKind, records: &[Map<String, Value>]) -> BatchResult {
        self.create_chunked(kind, records).await.result
    }

    /// Create remote objects for `records` and store the assigned ids on them.
    ///
    /// Returns the batch result; records in failed chunks keep `remote_id == None`.
    pub async fn create_records<T: ImportRecord>(
        &self,
        records: &mut [&mut T],
        properties: &[Map<String, Value>],
    ) -> BatchResult {
        let outcome = self.create_chunked(T::KIND, properties).await;
        for (record, id) in records.iter_mut().zip(outcome.assignments) {
            if let Some(id) = id {
                record.set_remote_id(id);
            }
        }
        outcome.result
    }

    async fn create_chunked(&self, kind: EntityKind, records: &[Map<String, Value>]) -> ChunkedOutcome {
        tracing::info!(kind = %kind, records = records.len(), "starting batch create");
        let path = kind.batch_create_path();

        let outcome = self
            .run_chunks(
                kind.plural(),
                records,
                |chunk| {
                    let inputs: Vec<Value> = chunk
                        .iter()
                        .map(|props| json!({ "properties": props }))
                        .collect();
                    ApiRequest::post(path.clone(), json!({ "inputs": inputs }))
                },
                |chunk, body| parse_created_ids(&body, chunk.len()),
            )
            .await;

        tracing::info!(
            kind = %kind,
            success = outcome.result.success_count,
            errors = outcome.result.error_count,
            duration_secs = outcome.result.duration_seconds,
            "batch create complete"
        );
        outcome
    }

    /// Shared chunk loop for object and association creation.
    ///
    /// `on_success` turns a 2xx body into the ids for that chunk; an empty
    /// list means "no ids expected". An error from it fails the chunk.
    pub(crate) async fn run_chunks<T>(
        &self,
        label: &str,
        items: &[T],
        build_request: impl Fn(&[T]) -> ApiRequest,
        on_success: impl Fn(&[T], Value) -> Result<ChunkIds, SubmitError>,
    ) -> ChunkedOutcome {
        let started = Instant::now();
        let mut result = BatchResult::default();
        let mut assignments: Vec<Option<RemoteId>> = Vec::with_capacity(items.len());
        let total = items.len().div_ceil(self.batch_size);

        for (index, chunk) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.policy.inter_chunk_delay.is_zero() {
                self.sleeper.sleep(self.policy.inter_chunk_delay).await;
            }

            let request = build_request(chunk);
            let outcome = match send_with_retry(
                self.transport,
                self.sleeper,
                &self.policy,
                self.observer,
                label,
                &request,
            )
            .await
            {
                Ok(body) => on_success(chunk, body),
                Err(e) => Err(e),
            };

            let ok = outcome.is_ok();
            match outcome {
                Ok(ids) => {
                    result.success_count += chunk.len();
                    if ids.is_empty() {
                        assignments.resize(assignments.len() + chunk.len(), None);
                    } else {
                        assignments.extend(ids.iter().cloned().map(Some));
                        result.created_ids.extend(ids);
                    }
                }
                Err(e) => {
                    tracing::error!(label, batch = index + 1, total, error = %e, "batch failed");
                    result.error_count += chunk.len();
                    result.errors.push(BatchError {
                        batch_index: index,
                        record_count: chunk.len(),
                        message: e.to_string(),
                    });
                    assignments.resize(assignments.len() + chunk.len(), None);
                }
            }

            self.observer.report(ImportEvent::Chunk {
                label: label.to_string(),
                index,
                total,
                records: chunk.len(),
                ok,
            });
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        ChunkedOutcome {
            result,
            assignments,
        }
    }
}

/// Pull `results[].id` out of a batch-create response.
///
/// The response must carry exactly one id per input; otherwise the id to
/// record alignment is unknown and the chunk is treated as failed.
fn parse_created_ids(body: &Value, expected: usize) -> Result<ChunkIds, SubmitError> {
    let results = body
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| SubmitError::InvalidResponse("missing results array".to_string()))?;

    let ids: Vec<RemoteId> = results
        .iter()
        .filter_map(|r| match r.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if ids.len() != expected {
        return Err(SubmitError::InvalidResponse(format!(
            "expected {} ids, got {} (objects may have been created; verify remotely)",
            expected,
            ids.len()
        )));
    }
    Ok(ids)
}

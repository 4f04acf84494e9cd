//! The transport seam between the flush engine and the document store.

use async_trait::async_trait;
use docrelay_bulk::WriteOperation;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("error talking to the backend: {source}")]
    Transport { source: reqwest::Error },

    #[error("backend returned HTTP {status} for a bulk write")]
    Status { status: u16 },

    #[error("invalid backend url: {source}")]
    Url { source: url::ParseError },
}

impl BackendError {
    /// Whether a retry has any chance of succeeding. Decode errors and
    /// client-side rejections do not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source } => !source.is_decode(),
            Self::Status { status } => *status >= 500,
            Self::Url { .. } => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(source: reqwest::Error) -> Self {
        Self::Transport { source }
    }
}

/// One operation the backend rejected inside an otherwise delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Zero-based position of the operation within the submitted batch.
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

/// The per-item result of a delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub item_failures: Vec<ItemFailure>,
}

/// A client capable of submitting one batched write per call.
///
/// Implementations must not reorder operations; the engine relies on batch
/// order matching arrival order.
#[async_trait]
pub trait BackendClient: std::fmt::Debug + Send + Sync + 'static {
    async fn bulk_write(
        &self,
        collection: &str,
        operations: &[WriteOperation],
    ) -> Result<BulkWriteOutcome, BackendError>;
}

/// A [`BackendClient`] speaking the document store's native NDJSON bulk
/// protocol over HTTP.
#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    bulk_url: Url,
}

impl HttpBackend {
    /// Builds the client for the store rooted at `base`. This is the only
    /// construction in the system that is allowed to be fatal at startup.
    pub fn new(base: Url) -> Result<Self, BackendError> {
        let bulk_url = base.join("_bulk").map_err(|source| BackendError::Url { source })?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, bulk_url })
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl BulkResponse {
    fn item_failures(&self) -> Vec<ItemFailure> {
        if !self.errors {
            return vec![];
        }
        self.items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| {
                // Each item wraps a single action key, mirroring the request.
                let (_, result) = item.iter().next()?;
                let status = result
                    .get("status")
                    .and_then(|s| s.as_u64())
                    .unwrap_or_default() as u16;
                match result.get("error") {
                    Some(error) if !error.is_null() => {
                        let reason = error
                            .get("reason")
                            .and_then(|r| r.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| error.to_string());
                        Some(ItemFailure { position, status, reason })
                    }
                    _ if status >= 400 => Some(ItemFailure {
                        position,
                        status,
                        reason: format!("HTTP {status}"),
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn bulk_write(
        &self,
        _collection: &str,
        operations: &[WriteOperation],
    ) -> Result<BulkWriteOutcome, BackendError> {
        let mut payload = Vec::new();
        for operation in operations {
            operation.encode_into(&mut payload);
        }

        let response = self
            .client
            .post(self.bulk_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
            });
        }

        let response: BulkResponse = response.json().await?;
        Ok(BulkWriteOutcome {
            item_failures: response.item_failures(),
        })
    }
}

pub mod mock {
    //! A recording, programmable [`BackendClient`] for tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// One recorded [`BackendClient::bulk_write`] call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedBulkWrite {
        pub collection: String,
        pub operations: Vec<WriteOperation>,
    }

    /// Programmed result for one future call: either a delivered batch with
    /// the given item failures, or a whole-call HTTP failure.
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        Outcome(BulkWriteOutcome),
        Status(u16),
    }

    /// Records every batch it is handed and answers with programmed
    /// responses, defaulting to full success once the programmed queue is
    /// exhausted.
    #[derive(Debug, Default)]
    pub struct MockBackend {
        calls: Mutex<Vec<RecordedBulkWrite>>,
        responses: Mutex<VecDeque<MockResponse>>,
    }

    impl MockBackend {
        pub fn with_response(self, response: MockResponse) -> Self {
            self.responses.lock().push_back(response);
            self
        }

        pub fn push_response(&self, response: MockResponse) {
            self.responses.lock().push_back(response);
        }

        pub fn calls(&self) -> Vec<RecordedBulkWrite> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl BackendClient for MockBackend {
        async fn bulk_write(
            &self,
            collection: &str,
            operations: &[WriteOperation],
        ) -> Result<BulkWriteOutcome, BackendError> {
            self.calls.lock().push(RecordedBulkWrite {
                collection: collection.to_string(),
                operations: operations.to_vec(),
            });
            match self.responses.lock().pop_front() {
                None => Ok(BulkWriteOutcome::default()),
                Some(MockResponse::Outcome(outcome)) => Ok(outcome),
                Some(MockResponse::Status(status)) => Err(BackendError::Status { status }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrelay_bulk::decode_operations;
    use pretty_assertions::assert_eq;

    fn sample_operations() -> Vec<WriteOperation> {
        decode_operations(
            "{\"index\":{\"_index\":\"logs\",\"_id\":\"1\"}}\n{\"msg\":\"a\"}\n\
             {\"delete\":{\"_index\":\"logs\",\"_id\":\"2\"}}\n",
        )
        .collect::<Result<_, _>>()
        .unwrap()
    }

    #[tokio::test]
    async fn http_backend_posts_ndjson_and_parses_success() {
        let mut server = mockito::Server::new_async().await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_header("content-type", "application/x-ndjson")
            .match_body(mockito::Matcher::Regex(
                "\\{\"index\":\\{\"_index\":\"logs\",\"_id\":\"1\"\\}\\}\n\\{\"msg\":\"a\"\\}\n".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"errors": false, "items": [{"index": {"status": 201}}, {"delete": {"status": 200}}]}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(Url::parse(&server.url()).unwrap()).unwrap();
        let outcome = backend
            .bulk_write("logs", &sample_operations())
            .await
            .unwrap();

        bulk.assert_async().await;
        assert_eq!(outcome, BulkWriteOutcome::default());
    }

    #[tokio::test]
    async fn http_backend_reports_item_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/_bulk")
            .with_status(200)
            .with_body(
                r#"{"errors": true, "items": [
                    {"index": {"status": 201}},
                    {"delete": {"status": 404, "error": {"type": "not_found", "reason": "no such document"}}}
                ]}"#,
            )
            .create_async()
            .await;

        let backend = HttpBackend::new(Url::parse(&server.url()).unwrap()).unwrap();
        let outcome = backend
            .bulk_write("logs", &sample_operations())
            .await
            .unwrap();

        assert_eq!(
            outcome.item_failures,
            vec![ItemFailure {
                position: 1,
                status: 404,
                reason: "no such document".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn http_backend_surfaces_status_errors_as_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/_bulk")
            .with_status(503)
            .create_async()
            .await;

        let backend = HttpBackend::new(Url::parse(&server.url()).unwrap()).unwrap();
        let error = backend
            .bulk_write("logs", &sample_operations())
            .await
            .unwrap_err();

        assert!(matches!(error, BackendError::Status { status: 503 }));
        assert!(error.is_retryable());
        assert!(!BackendError::Status { status: 400 }.is_retryable());
    }
}

//! HTTP surface for operators.
//!
//! - `POST /documents/:id/enqueue` – Enqueue a document (deduplicated while a job is live).
//! - `POST /documents/:id/retry` – Re-enqueue a failed document; completed stages are skipped.
//! - `POST /documents/:id/reprocess` – Drop vectors and chunks and process from scratch.
//! - `DELETE /documents/:id` – Remove a document with its vectors, bytes, and records.
//! - `GET /documents/:id` – Document status with its processing job and stage map.
//! - `POST /documents/:id/verify` – Compare chunk rows with stored vectors.
//! - `GET /queue/stats` – Queue depth counters.
//! - `GET /metrics` – Pipeline counters.
//! - `POST /search` – Semantic search within a collection.

use crate::service::{IngestApi, SearchRequest, ServiceError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Build the operator router.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestApi + 'static,
{
    Router::new()
        .route(
            "/documents/:id",
            get(get_document::<S>).delete(delete_document::<S>),
        )
        .route("/documents/:id/enqueue", post(enqueue_document::<S>))
        .route("/documents/:id/retry", post(retry_document::<S>))
        .route("/documents/:id/reprocess", post(reprocess_document::<S>))
        .route("/documents/:id/verify", post(verify_document::<S>))
        .route("/queue/stats", get(queue_stats::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/search", post(search::<S>))
        .with_state(service)
}

async fn enqueue_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let receipt = service.enqueue(&id).await?;
    let status = if receipt.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(receipt)).into_response())
}

async fn retry_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let receipt = service.retry(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)).into_response())
}

async fn reprocess_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let receipt = service.reprocess(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)).into_response())
}

async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: IngestApi,
{
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let view = service.document(&id).await?;
    Ok(Json(view).into_response())
}

async fn verify_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let report = service.verify(&id).await?;
    let consistent = report.is_consistent();
    Ok(Json(json!({ "consistent": consistent, "report": report })).into_response())
}

async fn queue_stats<S>(State(service): State<Arc<S>>) -> Result<Response, AppError>
where
    S: IngestApi,
{
    let stats = service.queue_stats().await?;
    Ok(Json(stats).into_response())
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: IngestApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Response body for `POST /search`.
#[derive(Serialize)]
struct SearchResponse {
    hits: Vec<crate::qdrant::ScoredPoint>,
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: IngestApi,
{
    let hits = service.search(request).await?;
    Ok(Json(SearchResponse { hits }))
}

struct AppError(ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.0.is_conflict() {
            StatusCode::CONFLICT
        } else if matches!(self.0, ServiceError::InvalidRequest(_)) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{PipelineError, VerificationReport};
    use crate::qdrant::ScoredPoint;
    use crate::queue::{DispatchError, EnqueueReceipt, QueueStats};
    use crate::service::{DocumentView, IngestApi, SearchRequest, ServiceError};
    use crate::store::{DocumentStatus, JobStatus};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubIngestService {
        calls: Mutex<Vec<String>>,
        searches: Mutex<Vec<SearchRequest>>,
    }

    impl StubIngestService {
        async fn record(&self, call: String) {
            self.calls.lock().await.push(call);
        }

        async fn recorded_calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }

        fn receipt(id: &str) -> Result<EnqueueReceipt, ServiceError> {
            if id == "missing" {
                return Err(ServiceError::Pipeline(PipelineError::NotFound(format!(
                    "document '{id}' not found"
                ))));
            }
            Ok(EnqueueReceipt {
                document_id: id.to_string(),
                queue_job_id: Some(format!("job-{id}")),
                deduplicated: id == "live",
            })
        }
    }

    #[async_trait]
    impl IngestApi for StubIngestService {
        async fn enqueue(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
            self.record(format!("enqueue:{document_id}")).await;
            Self::receipt(document_id)
        }

        async fn retry(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
            self.record(format!("retry:{document_id}")).await;
            if document_id == "running" {
                return Err(ServiceError::Dispatch(DispatchError::InvalidState {
                    document_id: document_id.to_string(),
                    status: JobStatus::Processing,
                    action: "retry",
                }));
            }
            Self::receipt(document_id)
        }

        async fn reprocess(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
            self.record(format!("reprocess:{document_id}")).await;
            Self::receipt(document_id)
        }

        async fn delete(&self, document_id: &str) -> Result<(), ServiceError> {
            self.record(format!("delete:{document_id}")).await;
            Self::receipt(document_id).map(|_| ())
        }

        async fn document(&self, document_id: &str) -> Result<DocumentView, ServiceError> {
            Self::receipt(document_id)?;
            Ok(DocumentView {
                id: document_id.to_string(),
                collection_id: "col-1".into(),
                name: "notes.txt".into(),
                status: DocumentStatus::Completed,
                total_chunks: Some(3),
                embedding_model: Some("text-embedding-3-small".into()),
                processing_error: None,
                processed_at: None,
                job: None,
            })
        }

        async fn verify(&self, document_id: &str) -> Result<VerificationReport, ServiceError> {
            Ok(VerificationReport {
                document_id: document_id.to_string(),
                chunk_rows: 2,
                vectors: 1,
                missing_vectors: vec!["chunk-2".into()],
                ..Default::default()
            })
        }

        async fn queue_stats(&self) -> Result<QueueStats, ServiceError> {
            Ok(QueueStats {
                queued: 2,
                active: 1,
                deferred: 0,
                total: 5,
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_completed: 4,
                ..Default::default()
            }
        }

        async fn search(&self, request: SearchRequest) -> Result<Vec<ScoredPoint>, ServiceError> {
            self.searches.lock().await.push(request);
            Ok(vec![ScoredPoint {
                id: "point-1".into(),
                score: 0.9,
                payload: None,
            }])
        }
    }

    async fn send(
        service: Arc<StubIngestService>,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = create_router(service);
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    #[tokio::test]
    async fn enqueue_returns_accepted_receipt() {
        let service = Arc::new(StubIngestService::default());
        let (status, body) = send(service.clone(), Method::POST, "/documents/doc-1/enqueue", None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["documentId"], "doc-1");
        assert_eq!(body["queueJobId"], "job-doc-1");
        assert_eq!(body["deduplicated"], false);
        assert_eq!(service.recorded_calls().await, vec!["enqueue:doc-1"]);
    }

    #[tokio::test]
    async fn deduplicated_enqueue_returns_ok() {
        let service = Arc::new(StubIngestService::default());
        let (status, body) = send(service, Method::POST, "/documents/live/enqueue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deduplicated"], true);
    }

    #[tokio::test]
    async fn missing_documents_map_to_not_found() {
        let service = Arc::new(StubIngestService::default());
        let (status, body) = send(service.clone(), Method::GET, "/documents/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap_or_default().contains("missing"));

        let (status, _) = send(service, Method::DELETE, "/documents/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_of_running_job_conflicts() {
        let service = Arc::new(StubIngestService::default());
        let (status, _) = send(service, Method::POST, "/documents/running/retry", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_and_reprocess_route_to_service() {
        let service = Arc::new(StubIngestService::default());
        let (status, _) = send(service.clone(), Method::DELETE, "/documents/doc-1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(service.clone(), Method::POST, "/documents/doc-1/reprocess", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            service.recorded_calls().await,
            vec!["delete:doc-1", "reprocess:doc-1"]
        );
    }

    #[tokio::test]
    async fn verify_reports_consistency() {
        let service = Arc::new(StubIngestService::default());
        let (status, body) = send(service, Method::POST, "/documents/doc-1/verify", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consistent"], false);
        assert_eq!(body["report"]["missing_vectors"], json!(["chunk-2"]));
    }

    #[tokio::test]
    async fn stats_and_metrics_are_exposed() {
        let service = Arc::new(StubIngestService::default());
        let (status, body) = send(service.clone(), Method::GET, "/queue/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], 2);
        assert_eq!(body["total"], 5);

        let (status, body) = send(service, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents_completed"], 4);
    }

    #[tokio::test]
    async fn search_accepts_camel_case_payload() {
        let service = Arc::new(StubIngestService::default());
        let payload = json!({
            "collectionId": "col-1",
            "query": "vector databases",
            "limit": 3,
            "documentId": "doc-9"
        });
        let (status, body) = send(service.clone(), Method::POST, "/search", Some(payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"][0]["id"], "point-1");
        let searches = service.searches.lock().await;
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].collection_id, "col-1");
        assert_eq!(searches[0].limit, Some(3));
        assert_eq!(searches[0].document_id.as_deref(), Some("doc-9"));
    }
}

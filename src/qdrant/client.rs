//! HTTP client wrapper for interacting with Qdrant.

use crate::embedding::dimension_for;
use crate::qdrant::{
    filters::{build_search_filter, document_filter},
    payload::point_id_for_chunk,
    types::{
        QdrantError, QueryResponse, QueryResponseResult, ScoredPoint,
        SearchFilterArgs, UpsertSummary, VectorRecord,
    },
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

const PAYLOAD_INDEXES: [(&str, &str); 3] = [
    ("collectionId", "keyword"),
    ("documentId", "keyword"),
    ("chunkIndex", "integer"),
];

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docuralis-ingest/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create `collection_name` sized for `model` unless it already exists, then make sure the
    /// scope payload indexes are present.
    pub async fn ensure_collection(
        &self,
        collection_name: &str,
        model: &str,
    ) -> Result<(), QdrantError> {
        let vector_size = dimension_for(model)
            .map_err(|_| QdrantError::UnknownDimension(model.to_string()))?;

        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::info!(
            collection = collection_name,
            model,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size as u64)
            .await?;
        self.ensure_payload_indexes(collection_name).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Write chunk vectors in a single batch and wait for durability.
    ///
    /// Records without a chunk id, with an empty vector, or whose vector length differs from the
    /// model dimension are skipped; the call fails only if nothing valid remains. Point ids are
    /// derived from chunk ids, so rewriting a chunk overwrites its previous point.
    pub async fn upsert(
        &self,
        collection_name: &str,
        records: Vec<VectorRecord>,
        model: &str,
    ) -> Result<UpsertSummary, QdrantError> {
        let dimension = dimension_for(model)
            .map_err(|_| QdrantError::UnknownDimension(model.to_string()))?;

        let total = records.len();
        let mut written = Vec::with_capacity(total);
        let mut points = Vec::with_capacity(total);
        for record in records {
            if record.chunk_id.trim().is_empty()
                || record.vector.is_empty()
                || record.vector.len() != dimension
            {
                tracing::warn!(
                    collection = collection_name,
                    chunk_id = %record.chunk_id,
                    vector_len = record.vector.len(),
                    expected = dimension,
                    "Skipping invalid vector record"
                );
                continue;
            }
            let point_id = point_id_for_chunk(&record.chunk_id);
            points.push(json!({
                "id": point_id,
                "vector": record.vector,
                "payload": record.payload,
            }));
            written.push((record.chunk_id, point_id));
        }

        if points.is_empty() {
            return Err(QdrantError::NoValidRecords {
                collection: collection_name.to_string(),
            });
        }

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(UpsertSummary {
            skipped: total - written.len(),
            written,
        })
    }

    /// Delete every point whose payload `documentId` matches.
    ///
    /// A missing collection means there is nothing to delete.
    pub async fn delete_by_document(
        &self,
        collection_name: &str,
        document_id: &str,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": document_filter(document_id) }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(
                collection = collection_name,
                document_id,
                "Collection missing; nothing to delete"
            );
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                document_id,
                "Document vectors deleted"
            );
        })
        .await
    }

    /// Similarity search scoped by the optional collection/document filter, best match first.
    pub async fn search(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &SearchFilterArgs,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter_value) = build_search_filter(filter)
            && let Some(object) = body.as_object_mut()
        {
            object.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let mut results: Vec<ScoredPoint> = points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(results)
    }

    /// Ensure the scope payload indexes exist. Failures are logged and tolerated.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        for (field, schema) in PAYLOAD_INDEXES {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
                    continue;
                }
            };

            if response.status().is_success() {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index ensured"
                );
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index already exists"
                );
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Whether `collection_name` exists.
    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_service(base_url: String) -> QdrantService {
    QdrantService {
        client: Client::builder()
            .user_agent("docuralis-ingest-test")
            .build()
            .expect("client"),
        base_url,
        api_key: None,
    }
}

//! Streaming helpers for iterating Qdrant scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use super::client::{QdrantService, stringify_point_id};
use super::filters::document_filter;
use super::types::{QdrantError, ScrollResponse, StoredPoint};

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream every point stored for `document_id`, payload included and vectors omitted.
///
/// A missing collection yields an empty stream.
pub fn stream_document_points<'a>(
    service: &'a QdrantService,
    collection: &'a str,
    document_id: &'a str,
) -> impl Stream<Item = Result<StoredPoint, QdrantError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let filter_body = document_filter(document_id);

        loop {
            let body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                break;
            }
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let Some(id) = point.id {
                        yield StoredPoint {
                            id: stringify_point_id(id),
                            payload: point.payload.unwrap_or_default(),
                        };
                    }
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = Some(next),
                    _ => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection, document_id, status = %status, "Failed to scroll document points");
                Err::<(), _>(QdrantError::UnexpectedStatus { status, body })?;
            }
        }
    }
}

//! Pipeline stage endpoints: extract, embed, ready and query.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ValidationKind};
use crate::search::QueryAnswer;

use super::AppState;

/// Response for the extract stage
#[derive(Serialize)]
pub struct ExtractResponse {
    pub id: String,
    pub status: DocumentStatus,
    pub preview_text: String,
    pub page_count: u32,
    pub chunk_count: usize,
}

/// Response for stages that only move the status
#[derive(Serialize)]
pub struct StageResponse {
    pub id: String,
    pub status: DocumentStatus,
}

impl From<Document> for StageResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            status: document.status,
        }
    }
}

/// Query request body
#[derive(Deserialize)]
pub struct QueryRequest {
    pub id: String,
    pub question: String,
}

/// Extract text from an uploaded document
pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExtractResponse>, ServiceError> {
    let outcome = state.service.extract(&id).await?;

    Ok(Json(ExtractResponse {
        id: outcome.document.id,
        status: outcome.document.status,
        preview_text: outcome.preview_text,
        page_count: outcome.page_count,
        chunk_count: outcome.document.chunk_count,
    }))
}

/// Embed the chunks of an extracted document
pub async fn embed_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StageResponse>, ServiceError> {
    let document = state.service.embed(&id).await?;
    Ok(Json(document.into()))
}

/// Mark an embedded document ready for questions
pub async fn ready_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StageResponse>, ServiceError> {
    let document = state.service.mark_ready(&id).await?;
    Ok(Json(document.into()))
}

/// Ask a question about a ready document
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryAnswer>, ServiceError> {
    let Json(request) = request.map_err(|rejection| {
        ServiceError::validation(ValidationKind::InvalidRequest, rejection.body_text())
    })?;
    let answer = state.service.query(&request.id, &request.question).await?;
    Ok(Json(answer))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::ingestion::pdf::fixtures::{pdf_with_pages, sample_pdf};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, json_body(response).await)
    }

    fn post(uri: String) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    fn query(id: &str, question: &str) -> Request<Body> {
        Request::post("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "id": id, "question": question }).to_string(),
            ))
            .unwrap()
    }

    async fn upload(router: &Router, bytes: &[u8]) -> String {
        let (status, body) = call(router, upload_request("doc.pdf", bytes, None)).await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_pipeline_over_http() {
        let app = app().await;
        let id = upload(&app.router, &sample_pdf()).await;

        let (status, body) = call(
            &app.router,
            Request::get(format!("/extract/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "extracted");
        assert_eq!(body["page_count"], 1);
        assert!(body["chunk_count"].as_u64().unwrap() > 0);
        assert!(body["preview_text"].as_str().unwrap().contains("quarterly"));

        let (status, body) = call(&app.router, post(format!("/embed/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": id, "status": "embedded" }));

        let (status, body) = call(&app.router, post(format!("/ready/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        let (status, body) = call(&app.router, query(&id, "How much did revenue grow?")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().contains("twelve percent"));
        assert!(!body["sources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_stage_is_conflict() {
        let app = app().await;
        let id = upload(&app.router, &sample_pdf()).await;

        let (status, body) = call(&app.router, post(format!("/embed/{}", id))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_transition");

        let (status, _) = call(&app.router, post(format!("/ready/{}", id))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app.router, query(&id, "anything?")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_repeated_extract_is_conflict() {
        let app = app().await;
        let id = upload(&app.router, &sample_pdf()).await;
        let extract = || {
            Request::get(format!("/extract/{}", id))
                .body(Body::empty())
                .unwrap()
        };

        let (status, _) = call(&app.router, extract()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app.router, extract()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_transition");
    }

    #[tokio::test]
    async fn test_extract_without_text() {
        let app = app().await;
        let id = upload(&app.router, &pdf_with_pages(&[&[]])).await;

        let (status, body) = call(
            &app.router,
            Request::get(format!("/extract/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "no_text");
    }

    #[tokio::test]
    async fn test_stages_on_unknown_document() {
        let app = app().await;
        let missing = "00000000-0000-4000-8000-000000000000";

        let (status, _) = call(
            &app.router,
            Request::get(format!("/extract/{}", missing))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app.router, post(format!("/embed/{}", missing))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app.router, query(missing, "hello?")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_empty_question() {
        let app = app().await;
        let id = upload(&app.router, &sample_pdf()).await;

        let (status, body) = call(&app.router, query(&id, " ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_question");
    }

    #[tokio::test]
    async fn test_query_malformed_body() {
        let app = app().await;

        let missing_question = Request::post("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"id":"x"}"#))
            .unwrap();
        let (status, body) = call(&app.router, missing_question).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
        assert!(body["message"].as_str().unwrap().contains("question"));

        let not_json = Request::post("/query")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("what?"))
            .unwrap();
        let (status, body) = call(&app.router, not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
    }
}

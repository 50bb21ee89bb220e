//! HTTP calls to the ChatZ service.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::wizard::DocumentStatus;

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub deduplicated: bool,
    pub page_count: u32,
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct ExtractResponse {
    pub id: String,
    pub status: DocumentStatus,
    pub preview_text: String,
    pub page_count: u32,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct StageResponse {
    pub id: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub file_name: String,
    pub status: DocumentStatus,
    pub page_count: u32,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    code: String,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http {
                url: base_url.clone(),
                source: e,
            })?;

        Ok(Self { http, base_url })
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<UploadResponse> {
        let url = self.url("/upload");
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ClientError::Http {
                url: url.clone(),
                source: e,
            })?;
        let form = Form::new().part("file", part);

        let response = self.http.post(&url).multipart(form).send().await;
        parse(&url, response).await
    }

    pub async fn extract(&self, id: &str) -> ClientResult<ExtractResponse> {
        let url = self.url(&format!("/extract/{}", id));
        let response = self.http.get(&url).send().await;
        parse(&url, response).await
    }

    pub async fn embed(&self, id: &str) -> ClientResult<StageResponse> {
        let url = self.url(&format!("/embed/{}", id));
        let response = self.http.post(&url).send().await;
        parse(&url, response).await
    }

    pub async fn ready(&self, id: &str) -> ClientResult<StageResponse> {
        let url = self.url(&format!("/ready/{}", id));
        let response = self.http.post(&url).send().await;
        parse(&url, response).await
    }

    pub async fn query(&self, id: &str, question: &str) -> ClientResult<QueryResponse> {
        let url = self.url("/query");
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "id": id, "question": question }))
            .send()
            .await;
        parse(&url, response).await
    }

    pub async fn document(&self, id: &str) -> ClientResult<DocumentResponse> {
        let url = self.url(&format!("/documents/{}", id));
        let response = self.http.get(&url).send().await;
        parse(&url, response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn parse<T: DeserializeOwned>(
    url: &str,
    response: Result<Response, reqwest::Error>,
) -> ClientResult<T> {
    let http_error = |source: reqwest::Error| ClientError::Http {
        url: url.to_string(),
        source,
    };

    let response = response.map_err(http_error)?;
    let status = response.status();
    debug!(url = %url, status = status.as_u16(), "Response received");

    if status.is_success() {
        return response.json().await.map_err(http_error);
    }

    let text = response.text().await.map_err(http_error)?;
    Err(api_error(status.as_u16(), &text))
}

/// Build an error from a non-success response body
fn api_error(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(body) => ClientError::Api {
            status,
            code: body.code,
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: "unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/embed/abc"), "http://localhost:8000/embed/abc");
    }

    #[test]
    fn test_api_error_from_json_body() {
        let err = api_error(
            409,
            r#"{"message":"Document abc is uploaded, expected extracted","code":"invalid_transition"}"#,
        );
        assert!(err.is_conflict());
        match err {
            ClientError::Api { code, message, .. } => {
                assert_eq!(code, "invalid_transition");
                assert!(message.contains("expected extracted"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_api_error_from_plain_body() {
        let err = api_error(502, "Bad Gateway\n");
        assert!(!err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Server rejected the request (502 unknown): Bad Gateway"
        );
    }

    #[test]
    fn test_responses_deserialize() {
        let upload: UploadResponse = serde_json::from_str(
            r#"{"id":"a","name":"r.pdf","status":"uploaded","deduplicated":true,"page_count":3,"file_size":10}"#,
        )
        .unwrap();
        assert!(upload.deduplicated);
        assert_eq!(upload.status, DocumentStatus::Uploaded);

        let doc: DocumentResponse = serde_json::from_str(
            r#"{"id":"a","file_name":"r.pdf","status":"ready","file_size":10,"page_count":3,
                "content_hash":"h","chunk_count":2,"created_at":"2024-01-01T00:00:00Z",
                "updated_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.chunk_count, 2);
    }
}

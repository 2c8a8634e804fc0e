//! Shared fixtures for integration tests: an in-memory database, a scripted
//! model provider and a router wired the way the server wires it.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use credentialing_service::config::Config;
use credentialing_service::llm::{
    GenerateRequest, GenerateResponse, LlmClient, Provider, RetryPolicy,
};
use credentialing_service::pipeline::{DocumentImager, PageRenderer};
use credentialing_service::{AppState, build_router, db};

pub const BOUNDARY: &str = "credentialing-test-boundary";

/// Answers each pipeline stage with canned JSON and remembers what it was
/// asked.
pub struct ScriptedProvider {
    pub extract_reply: String,
    pub layout_reply: String,
    pub report_reply: String,
    pub fail: bool,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            extract_reply: r#"```json
{"fn": "Jane", "fn_confident_score": 0.95, "ln": "Doe", "ln_confident_score": 0.93, "npi": "1234567893", "npi_confident_score": 0.99}
```"#
                .to_string(),
            layout_reply: r#"{"match": true, "reason": "Same NPI card layout", "confidance_score": 0.9}"#
                .to_string(),
            report_reply: "### Detailed Findings\n- All submitted documents were reviewed."
                .to_string(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn stages(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.stage.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.requests.lock().unwrap().push(req.clone());
        if self.fail {
            anyhow::bail!("scripted provider is offline");
        }

        let content = match req.stage.as_str() {
            "extract" => self.extract_reply.clone(),
            "layout" => self.layout_reply.clone(),
            _ => self.report_reply.clone(),
        };

        Ok(GenerateResponse {
            content,
            model: req.model.clone(),
            input_tokens: 100,
            output_tokens: 20,
            cost_usd: 0.0,
            finish_reason: "stop".to_string(),
            provider: "scripted".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Stands in for pdfium so PDFs never touch the disk.
pub struct FakeRenderer;

impl PageRenderer for FakeRenderer {
    fn render_first_page(&self, _path: &Path) -> anyhow::Result<Vec<u8>> {
        Ok(b"\x89PNG fake page".to_vec())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub provider: Arc<ScriptedProvider>,
    pub dir: TempDir,
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        upload_dir: dir.join("uploads"),
        reference_dir: dir.join("ref_uploads"),
        openai_api_key: Some("test-key".to_string()),
        report_llm_enabled: false,
        ..Config::default()
    }
}

pub async fn spawn_app_with(provider: ScriptedProvider, configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let pool = db::create_pool(&config.database_url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let provider = Arc::new(provider);
    let llm_client = LlmClient::single(provider.clone(), RetryPolicy::no_retry());

    let state = AppState {
        pool,
        config,
        llm_client: Arc::new(llm_client),
        imager: DocumentImager::new(Arc::new(FakeRenderer)),
    };

    TestApp {
        router: build_router(state.clone()),
        state,
        provider,
        dir,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(ScriptedProvider::new(), |_| {}).await
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_json("POST", uri, body).await
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(
        &self,
        form_id: &str,
        file_type: &str,
        filename: &str,
        contents: &[u8],
    ) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/forms/upload-file")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(form_id, file_type, filename, contents)))
                .unwrap(),
        )
        .await
    }

    /// Creates and saves an intake form for Jane Doe.
    pub async fn seed_form(&self, form_id: &str) {
        let (status, _) = self
            .post_json("/api/forms/create-form", serde_json::json!({ "formId": form_id }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = self
            .post_json(
                "/api/forms/save-form",
                serde_json::json!({
                    "formId": form_id,
                    "typeForm": "provider",
                    "data": {
                        "providerName": "Jane",
                        "providerLastName": "Doe",
                        "npi": "1234567893",
                        "specialty": "Cardiology",
                        "degreeType": "MD",
                        "university": "State University",
                        "year": "2010",
                        "dob": "1980-04-02",
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Creates an application for `form_id` and returns its id.
    pub async fn seed_application(&self, form_id: &str) -> String {
        let (status, body) = self
            .post_json(
                "/api/applications",
                serde_json::json!({
                    "formId": form_id,
                    "name": "Jane",
                    "providerLastName": "Doe",
                    "npi": "1234567893",
                    "specialty": "Cardiology",
                    "market": "North",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn multipart_body(form_id: &str, file_type: &str, filename: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [("formId", form_id), ("fileType", file_type)] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

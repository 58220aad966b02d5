//! OCR Routes
//!
//! Endpoints:
//! - POST /ocr - Plain text of every page
//! - POST /ocr-template - Zone name to text, guided by a form template
//!
//! Both accept `application/json` (base64 payloads) or `multipart/form-data`
//! (file parts). Staged files are released on every exit path: explicitly
//! once the response is ready, by drop when a step fails.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::header,
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::engine::ZoneMap;
use crate::error::{AppError, Result};
use crate::staging::{StagedFile, StorageError};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

/// JSON body for plain OCR
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(rename = "Base64")]
    pub base64: String,
}

/// JSON body for template OCR
#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    #[serde(rename = "TemplateBase64")]
    pub template_base64: String,
    #[serde(rename = "Base64")]
    pub base64: String,
}

/// Plain OCR response
#[derive(Debug, Serialize, Deserialize)]
pub struct TextResponse {
    #[serde(rename = "Text")]
    pub text: String,
}

/// Query parameters for plain OCR
#[derive(Debug, Default, Deserialize)]
pub struct TextParams {
    /// Overrides the configured recognition language for this request
    pub language: Option<String>,
}

/// Payload encodings the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Json,
    Multipart,
}

/// A staged multipart file part
struct StagedPart {
    name: Option<String>,
    file: StagedFile,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ocr", post(ocr_text))
        .route("/ocr-template", post(ocr_template))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /ocr
async fn ocr_text(
    State(state): State<AppState>,
    Query(params): Query<TextParams>,
    request: Request,
) -> Result<Json<TextResponse>> {
    let language = params.language.as_deref();

    let text = match negotiate(&request)? {
        Transport::Json => {
            let body: TextRequest = decode_json(request, &state).await?;
            let image = stage_base64(&state, "Base64", &body.base64).await?;

            let text = state.ocr().recognize_text(image.path(), language).await?;
            release_all([image]);
            text
        }
        Transport::Multipart => {
            let parts = stage_parts(request, &state).await?;

            let mut texts = Vec::with_capacity(parts.len());
            for part in &parts {
                texts.push(state.ocr().recognize_text(part.file.path(), language).await?);
            }
            release_all(parts.into_iter().map(|p| p.file));
            // Separate uploads are separate documents: no page separator between them.
            texts.concat()
        }
    };

    Ok(Json(TextResponse { text }))
}

/// POST /ocr-template
async fn ocr_template(State(state): State<AppState>, request: Request) -> Result<Json<ZoneMap>> {
    let (template, image) = match negotiate(&request)? {
        Transport::Json => {
            let body: TemplateRequest = decode_json(request, &state).await?;
            let image = stage_base64(&state, "Base64", &body.base64).await?;
            let template = stage_base64(&state, "TemplateBase64", &body.template_base64).await?;
            (template, image)
        }
        Transport::Multipart => split_template_parts(stage_parts(request, &state).await?)?,
    };

    let zones = state
        .ocr()
        .recognize_zones(template.path(), image.path())
        .await?;
    release_all([template, image]);

    Ok(Json(zones))
}

// ============================================================================
// Helpers
// ============================================================================

/// Pick the transport from Content-Type, ignoring parameters
fn negotiate(request: &Request) -> Result<Transport> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let media_type = content_type.split(';').next().unwrap_or("").trim();

    if media_type.eq_ignore_ascii_case("application/json") {
        Ok(Transport::Json)
    } else if media_type.eq_ignore_ascii_case("multipart/form-data") {
        Ok(Transport::Multipart)
    } else {
        Err(AppError::UnsupportedMedia(media_type.to_string()))
    }
}

async fn decode_json<T: DeserializeOwned>(request: Request, state: &AppState) -> Result<T> {
    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| AppError::Decode(format!("failed to read request body: {e}")))?;

    serde_json::from_slice(&body).map_err(|e| AppError::Decode(format!("invalid JSON body: {e}")))
}

async fn stage_base64(state: &AppState, field: &str, encoded: &str) -> Result<StagedFile> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| AppError::Decode(format!("invalid base64 in {field}: {e}")))?;

    Ok(state.ocr().stager().stage(&bytes).await?)
}

/// Stream every file part to a staged file, in arrival order
///
/// Parts without a filename are form fields and are skipped.
async fn stage_parts(request: Request, state: &AppState) -> Result<Vec<StagedPart>> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::Decode(format!("invalid multipart request: {e}")))?;

    let mut parts = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Decode(format!("failed to read multipart field: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = field.name().map(str::to_string);

        let (staged, mut file) = state.ocr().stager().create().await?;
        let mut size = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Decode(format!("failed to read {file_name}: {e}")))?
        {
            size += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(StorageError::write(staged.path()))?;
        }
        file.flush().await.map_err(StorageError::write(staged.path()))?;

        tracing::debug!(
            field = ?name,
            file_name = %file_name,
            bytes = size,
            path = %staged.path().display(),
            "Staged multipart file"
        );

        parts.push(StagedPart { name, file: staged });
    }

    Ok(parts)
}

/// Template and image from multipart parts
///
/// Parts named `template` and `image` win when both are present; otherwise
/// the first file is the template and the second the image.
fn split_template_parts(parts: Vec<StagedPart>) -> Result<(StagedFile, StagedFile)> {
    let named = |wanted: &str| parts.iter().position(|p| p.name.as_deref() == Some(wanted));

    let (template_index, image_index) = match (named("template"), named("image")) {
        (Some(template), Some(image)) => (template, image),
        _ if parts.len() >= 2 => (0, 1),
        _ => {
            return Err(AppError::Decode(format!(
                "expected a template file part and an image file part, got {} file part(s)",
                parts.len()
            )))
        }
    };

    let mut files: Vec<Option<StagedFile>> = parts.into_iter().map(|p| Some(p.file)).collect();
    match (files[template_index].take(), files[image_index].take()) {
        (Some(template), Some(image)) => Ok((template, image)),
        _ => Err(AppError::Decode("template and image must be different parts".to_string())),
    }
}

/// Delete staged files once the result is ready
///
/// A failed delete is logged; it never discards a finished OCR result.
fn release_all(files: impl IntoIterator<Item = StagedFile>) {
    for file in files {
        if let Err(e) = file.release() {
            tracing::warn!(error = %e, "Failed to clean up staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::mock::ScriptedEngine;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "omnipage-test-boundary";

    fn test_app(engine: ScriptedEngine, dir: &TempDir) -> Router {
        let mut config = Config::default();
        config.staging.tmp_dir = dir.path().to_path_buf();
        crate::routes::app(AppState::new(config, vec![Box::new(engine)]))
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Parts are (field name, file name, content)
    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn staged_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_json_plain_ocr() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["Nota fiscal 123"]), &temp_dir);

        let (status, body) = send(
            app,
            json_request("/ocr", serde_json::json!({ "Base64": BASE64.encode(b"fake tiff") })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: TextResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.text, "Nota fiscal 123");
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_json_multi_page_text() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["one", "two", "three"]), &temp_dir);

        let (status, body) = send(
            app,
            json_request("/ocr", serde_json::json!({ "Base64": BASE64.encode(b"tiff") })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["Text"], "one\u{c}two\u{c}three");
    }

    #[tokio::test]
    async fn test_content_type_parameters_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["ok"]), &temp_dir);

        let mut request = json_request("/ocr", serde_json::json!({ "Base64": BASE64.encode(b"x") }));
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_pages(&["never"]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let request = http::Request::builder()
            .method("POST")
            .uri("/ocr-template")
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from("hello"))
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Content-Type: \"text/plain\" not supported");
        assert!(calls.lock().is_empty());
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["never"]), &temp_dir);

        let request = http::Request::builder()
            .method("POST")
            .uri("/ocr")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Content-Type: \"\" not supported");
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["never"]), &temp_dir);

        let request = http::Request::builder()
            .method("POST")
            .uri("/ocr")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn test_invalid_base64() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["never"]), &temp_dir);

        let (status, body) = send(
            app,
            json_request("/ocr", serde_json::json!({ "Base64": "***" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("invalid base64 in Base64"));
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_template_base64_error_cleans_image() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_zones(&[]), &temp_dir);

        let (status, body) = send(
            app,
            json_request(
                "/ocr-template",
                serde_json::json!({ "Base64": BASE64.encode(b"image"), "TemplateBase64": "%%%" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("TemplateBase64"));
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_count_pages_failure() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_pages(&["a"]).failing("count_pages", "unsupported image format");
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let (status, body) = send(
            app,
            json_request("/ocr", serde_json::json!({ "Base64": BASE64.encode(b"png") })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "count_pages failed: unsupported image format");
        assert!(!calls.lock().iter().any(|c| c.starts_with("ocr_page_to_file")));
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_json_template_ocr() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_zones(&[("nome", "Joana"), ("valor", "10,00")]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let (status, body) = send(
            app,
            json_request(
                "/ocr-template",
                serde_json::json!({
                    "TemplateBase64": BASE64.encode(b"TEMPLATE"),
                    "Base64": BASE64.encode(b"IMAGE"),
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let zones: ZoneMap = serde_json::from_str(&body).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones["valor"], "10,00");
        assert!(calls.lock().contains(&"load_template TEMPLATE".to_string()));
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_multipart_plain_ocr_skips_form_fields() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["scanned"]), &temp_dir);

        let request = multipart_request(
            "/ocr",
            &[
                ("note", None, b"not a file"),
                ("file", Some("scan.tif"), b"tiff bytes"),
            ],
        );
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        let response: TextResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.text, "scanned");
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_multipart_files_concatenated_without_separator() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_pages(&["p0", "p1"]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let request = multipart_request(
            "/ocr",
            &[
                ("file", Some("first.tif"), b"one"),
                ("file", Some("second.tif"), b"two"),
            ],
        );
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        let response: TextResponse = serde_json::from_str(&body).unwrap();
        // Pages within a file are separated; the files themselves are not.
        assert_eq!(response.text, "p0\u{c}p1p0\u{c}p1");
        assert_eq!(calls.lock().iter().filter(|c| *c == "count_pages").count(), 2);
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_multipart_plain_ocr_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(ScriptedEngine::with_pages(&["never"]), &temp_dir);

        let (status, body) = send(app, multipart_request("/ocr", &[("note", None, b"x")])).await;

        assert_eq!(status, StatusCode::OK);
        let response: TextResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.text, "");
    }

    #[tokio::test]
    async fn test_multipart_template_positional() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_zones(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let request = multipart_request(
            "/ocr-template",
            &[
                ("file", Some("form.ftl"), b"FIRST"),
                ("file", Some("scan.tif"), b"SECOND"),
            ],
        );
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        let zones: ZoneMap = serde_json::from_str(&body).unwrap();
        assert_eq!(zones.len(), 3);
        assert!(calls.lock().contains(&"load_template FIRST".to_string()));
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_multipart_template_named_parts_win() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_zones(&[("a", "1")]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let request = multipart_request(
            "/ocr-template",
            &[
                ("image", Some("scan.tif"), b"IMAGE"),
                ("template", Some("form.ftl"), b"TEMPLATE"),
            ],
        );
        let (status, _) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(calls.lock().contains(&"load_template TEMPLATE".to_string()));
    }

    #[tokio::test]
    async fn test_multipart_template_missing_image() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_zones(&[("a", "1")]);
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let request = multipart_request("/ocr-template", &[("file", Some("form.ftl"), b"T")]);
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("got 1 file part(s)"));
        assert!(calls.lock().is_empty());
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test]
    async fn test_template_failure_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_zones(&[("a", "1")]).failing("load_template", "bad library");
        let app = test_app(engine, &temp_dir);

        let request = multipart_request(
            "/ocr-template",
            &[("t", Some("form.ftl"), b"T"), ("i", Some("scan.tif"), b"I")],
        );
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "load_template failed: bad library");
        assert_eq!(staged_count(&temp_dir), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_do_not_interleave() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::with_pages(&["p0", "p1"])
            .echo_language()
            .with_delay(Duration::from_millis(20));
        let calls = engine.calls();
        let app = test_app(engine, &temp_dir);

        let body = serde_json::json!({ "Base64": BASE64.encode(b"tiff") });
        let (english, german) = tokio::join!(
            send(app.clone(), json_request("/ocr?language=en", body.clone())),
            send(app.clone(), json_request("/ocr?language=de", body.clone())),
        );

        assert_eq!(english.0, StatusCode::OK);
        assert_eq!(german.0, StatusCode::OK);
        let english: TextResponse = serde_json::from_str(&english.1).unwrap();
        let german: TextResponse = serde_json::from_str(&german.1).unwrap();
        assert_eq!(english.text, "[en] p0\u{c}[en] p1");
        assert_eq!(german.text, "[de] p0\u{c}[de] p1");

        // Each request's calls form one unbroken run.
        let calls = calls.lock().clone();
        assert_eq!(calls.len(), 10);
        for run in calls.chunks(5) {
            assert!(run[0].starts_with("set_language"));
            assert!(run[1..].iter().all(|c| !c.starts_with("set_language")));
        }
    }
}

//! Upload Routes
//!
//! HTTP endpoints for chunked, session-batched asset uploads.
//!
//! Endpoints:
//! - POST /upload - Append one chunk (multipart with chunk metadata)
//! - POST /upload - Single-shot upload (multipart with only `file`)
//! - POST /upload?commit=1 - Publish every file of a session as one commit
//! - GET /upload/sessions/:session_id - Session progress

use axum::{
    body::Bytes,
    extract::{
        multipart::Field, DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::assets::{is_valid_file_name, AssetKind};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{ChunkAck, ChunkUpload, SessionProgress};

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload))
        .route("/sessions/:session_id", get(session_progress))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct UploadQuery {
    commit: Option<String>,
}

impl UploadQuery {
    fn is_commit(&self) -> bool {
        matches!(self.commit.as_deref(), Some("1") | Some("true"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommitResponse {
    ok: bool,
    commit: String,
    files: usize,
}

#[derive(Debug, Serialize)]
struct SingleUploadResponse {
    ok: bool,
    path: String,
    kind: AssetKind,
    commit: String,
}

/// Fields of a multipart upload request
#[derive(Debug, Default)]
struct UploadForm {
    session_id: Option<String>,
    file_id: Option<String>,
    file_name: Option<String>,
    index: Option<String>,
    total: Option<String>,
    file: Option<Bytes>,
    /// Filename attached to the `file` part itself
    part_file_name: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            tracing::error!("Failed to read multipart field: {}", e);
            AppError::BadRequest(format!("Failed to read upload: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    form.part_file_name = field.file_name().map(str::to_string);
                    let data = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read file data: {}", e))
                    })?;
                    form.file = Some(data);
                }
                "sessionId" => form.session_id = read_text(field).await?,
                "fileId" => form.file_id = read_text(field).await?,
                "fileName" => form.file_name = read_text(field).await?,
                "index" => form.index = read_text(field).await?,
                "total" => form.total = read_text(field).await?,
                _ => tracing::debug!(field = %name, "Ignoring unknown upload field"),
            }
        }

        Ok(form)
    }

    /// Whether any chunk-protocol field was sent
    fn has_chunk_metadata(&self) -> bool {
        self.session_id.is_some()
            || self.file_id.is_some()
            || self.index.is_some()
            || self.total.is_some()
    }
}

/// Read a text field; blank values count as absent
async fn read_text(field: Field<'_>) -> Result<Option<String>> {
    let text = field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read field: {}", e)))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload
///
/// Dispatches on the `commit` query flag, then on the multipart shape.
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    request: Request,
) -> Result<Response> {
    if query.is_commit() {
        let Json(body) = Json::<CommitRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        return commit(&state, body).await.map(IntoResponse::into_response);
    }

    let multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;
    let form = UploadForm::read(multipart).await?;

    if form.has_chunk_metadata() {
        append_chunk(&state, form).await.map(IntoResponse::into_response)
    } else {
        single_shot(&state, form).await.map(IntoResponse::into_response)
    }
}

/// Store one chunk of one file in a session
async fn append_chunk(state: &AppState, form: UploadForm) -> Result<Json<ChunkAck>> {
    let mut missing = Vec::new();
    let mut require = |value: Option<String>, name: &'static str| {
        if value.is_none() {
            missing.push(name);
        }
        value.unwrap_or_default()
    };

    let session_id = require(form.session_id, "sessionId");
    let file_id = require(form.file_id, "fileId");
    let file_name = require(form.file_name, "fileName");
    let index = require(form.index, "index");
    let total = require(form.total, "total");

    let data = form.file.filter(|data| !data.is_empty());
    if data.is_none() {
        missing.push("file");
    }
    if !missing.is_empty() {
        return Err(AppError::missing_params(&missing));
    }

    if !is_valid_file_name(&file_name) {
        return Err(AppError::BadRequest(format!("Invalid fileName: {}", file_name)));
    }

    let chunk = ChunkUpload {
        session_id,
        file_id,
        file_name,
        index: parse_count("index", &index)?,
        total: parse_count("total", &total)?,
        data: data.unwrap_or_default(),
    };

    let ack = state.sessions().append_chunk(chunk).await?;
    Ok(Json(ack))
}

/// Publish a whole session as one commit
async fn commit(state: &AppState, request: CommitRequest) -> Result<Json<CommitResponse>> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::missing_params(&["sessionId"]))?;

    // Held until the commit finishes so no append can slip in between
    // assembly and publication.
    let guard = state.sessions().lock_session(&session_id).await?;
    let batch = state.publisher().prepare_batch(&guard)?;

    tracing::info!(
        session_id = %session_id,
        files = batch.len(),
        "Committing upload session"
    );

    let result = state.publisher().publish_batch(state.branch(), batch).await?;
    state.sessions().complete_session(guard);

    Ok(Json(CommitResponse {
        ok: true,
        commit: result.commit,
        files: result.files,
    }))
}

/// Upload one whole file into its category folder
async fn single_shot(state: &AppState, form: UploadForm) -> Result<Json<SingleUploadResponse>> {
    let data = form
        .file
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::missing_params(&["file"]))?;
    let name = form
        .file_name
        .or(form.part_file_name)
        .ok_or_else(|| AppError::missing_params(&["fileName"]))?;

    if !is_valid_file_name(&name) {
        return Err(AppError::BadRequest(format!("Invalid fileName: {}", name)));
    }
    let kind = AssetKind::from_file_name(&name).ok_or_else(|| {
        tracing::warn!(file_name = %name, "Rejected upload with disallowed extension");
        AppError::FileTypeNotAllowed(name.clone())
    })?;

    let relative = format!("{}/{}", kind.folder(), name);
    let result = state
        .publisher()
        .publish_single(state.branch(), &relative, &data)
        .await
        .map_err(|e| {
            if e.is_existing_file_conflict() {
                AppError::AlreadyExists(state.publisher().asset_path(&relative))
            } else {
                AppError::Remote(e)
            }
        })?;

    Ok(Json(SingleUploadResponse {
        ok: true,
        path: result.path,
        kind,
        commit: result.commit,
    }))
}

/// GET /upload/sessions/:session_id
async fn session_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionProgress>> {
    let progress = state.sessions().progress(&session_id).await?;
    Ok(Json(progress))
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_count(name: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", name, value)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::config::Config;
    use crate::github::memory::MemoryRepo;
    use crate::github::ApiStep;

    fn setup() -> (TestServer, Arc<MemoryRepo>, AppState) {
        let repo = Arc::new(MemoryRepo::new("main"));
        let state = AppState::new(Config::for_tests(), repo.clone());
        let server = TestServer::new(crate::app(state.clone())).unwrap();
        (server, repo, state)
    }

    fn chunk_form(
        session: &str,
        file_id: &str,
        name: &str,
        index: usize,
        total: usize,
        data: &[u8],
    ) -> MultipartForm {
        MultipartForm::new()
            .add_text("sessionId", session)
            .add_text("fileId", file_id)
            .add_text("fileName", name)
            .add_text("index", index.to_string())
            .add_text("total", total.to_string())
            .add_part("file", Part::bytes(data.to_vec()).file_name("blob"))
    }

    async fn send_chunk(
        server: &TestServer,
        session: &str,
        file_id: &str,
        name: &str,
        index: usize,
        total: usize,
        data: &[u8],
    ) -> Value {
        let response = server
            .post("/upload")
            .multipart(chunk_form(session, file_id, name, index, total, data))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json::<Value>()
    }

    async fn send_commit(server: &TestServer, session: &str) -> axum_test::TestResponse {
        server
            .post("/upload")
            .add_query_param("commit", "1")
            .json(&json!({ "sessionId": session }))
            .await
    }

    #[tokio::test]
    async fn test_append_acknowledges_index() {
        let (server, _repo, _state) = setup();

        let body = send_chunk(&server, "s1", "f1", "logo.png", 1, 3, b"middle").await;
        assert_eq!(body, json!({ "ok": true, "index": 1, "received": 1, "total": 3 }));
    }

    #[tokio::test]
    async fn test_append_missing_fields() {
        let (server, _repo, state) = setup();

        let form = MultipartForm::new()
            .add_text("sessionId", "s1")
            .add_part("file", Part::bytes(b"data".to_vec()).file_name("blob"));
        let response = server.post("/upload").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["error"], "Missing params: fileId, fileName, index, total");
        assert_eq!(state.sessions().session_count(), 0);
    }

    #[tokio::test]
    async fn test_append_rejects_invalid_chunk() {
        let (server, _repo, _state) = setup();

        let response = server
            .post("/upload")
            .multipart(chunk_form("s1", "f1", "a.png", 3, 3, b"x"))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "CHUNK_INDEX_OUT_OF_BOUNDS");

        let form = chunk_form("s1", "f1", "a.png", 0, 3, b"x").add_text("index", "zero");
        let response = server.post("/upload").multipart(form).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server
            .post("/upload")
            .multipart(chunk_form("s1", "f1", "../a.png", 0, 1, b"x"))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_two_files_commit_atomically() {
        let (server, repo, state) = setup();
        let parent = repo.head("main").unwrap();

        // Interleaved and out of order
        for (file_id, name, index, data) in [
            ("f2", "intro.mp4", 2, "v3"),
            ("f1", "hero.png", 1, "p2"),
            ("f2", "intro.mp4", 0, "v1"),
            ("f1", "hero.png", 2, "p3"),
            ("f1", "hero.png", 0, "p1"),
            ("f2", "intro.mp4", 1, "v2"),
        ] {
            send_chunk(&server, "batch", file_id, name, index, 3, data.as_bytes()).await;
        }

        let response = send_commit(&server, "batch").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["ok"], true);
        assert_eq!(body["files"], 2);

        let commit = body["commit"].as_str().unwrap().to_string();
        assert_eq!(repo.head("main"), Some(commit.clone()));
        assert_eq!(repo.commit_parents(&commit), vec![parent]);

        let files = repo.files_at(&commit);
        assert_eq!(files["public/assets/hero.png"], b"p1p2p3");
        assert_eq!(files["public/assets/intro.mp4"], b"v1v2v3");

        assert!(state.sessions().get_session("batch").is_err());
        let response = server.get("/upload/sessions/batch").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resent_chunk_last_write_wins() {
        let (server, repo, _state) = setup();

        send_chunk(&server, "s1", "f1", "a.png", 0, 2, b"old").await;
        send_chunk(&server, "s1", "f1", "a.png", 1, 2, b"-tail").await;
        send_chunk(&server, "s1", "f1", "a.png", 0, 2, b"new").await;

        let body = send_commit(&server, "s1").await.json::<Value>();
        let commit = body["commit"].as_str().unwrap();
        assert_eq!(repo.files_at(commit)["public/assets/a.png"], b"new-tail");
    }

    #[tokio::test]
    async fn test_commit_unknown_session_makes_no_remote_calls() {
        let (server, repo, _state) = setup();

        let response = send_commit(&server, "nope").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["error"], "Session not found");
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_requires_session_id() {
        let (server, repo, _state) = setup();

        let response = server
            .post("/upload")
            .add_query_param("commit", "1")
            .json(&json!({}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "Missing params: sessionId");
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_incomplete_keeps_session() {
        let (server, repo, state) = setup();

        send_chunk(&server, "s1", "f1", "a.png", 0, 2, b"a").await;

        let response = send_commit(&server, "s1").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "INCOMPLETE_UPLOAD");
        assert_eq!(body["details"]["missing"], json!([1]));
        assert!(repo.calls().is_empty());
        assert!(state.sessions().get_session("s1").is_ok());

        send_chunk(&server, "s1", "f1", "a.png", 1, 2, b"b").await;
        let response = send_commit(&server, "s1").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failed_tree_step_leaves_branch_and_session() {
        let (server, repo, state) = setup();
        let before = repo.head("main");

        send_chunk(&server, "s1", "f1", "a.png", 0, 1, b"a").await;
        repo.fail_at(ApiStep::CreateTree);

        let response = send_commit(&server, "s1").await;
        assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "REMOTE_API_ERROR");
        assert_eq!(body["details"]["step"], "create_tree");
        assert_eq!(repo.head("main"), before);
        assert!(state.sessions().get_session("s1").is_ok());

        repo.clear_failure();
        let response = send_commit(&server, "s1").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_ne!(repo.head("main"), before);
    }

    #[tokio::test]
    async fn test_recommit_is_rejected() {
        let (server, repo, _state) = setup();

        send_chunk(&server, "s1", "f1", "a.png", 0, 1, b"a").await;
        assert_eq!(send_commit(&server, "s1").await.status_code(), StatusCode::OK);
        let head = repo.head("main");
        let calls = repo.calls().len();

        let response = send_commit(&server, "s1").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "Session not found");
        assert_eq!(repo.head("main"), head);
        assert_eq!(repo.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_concurrent_commits_publish_once() {
        let (server, repo, _state) = setup();
        let before = repo.head("main");

        send_chunk(&server, "s1", "f1", "a.png", 0, 1, b"a").await;
        send_chunk(&server, "s1", "f2", "b.png", 0, 1, b"b").await;

        let (first, second) =
            tokio::join!(send_commit(&server, "s1"), send_commit(&server, "s1"));

        let mut statuses = [first.status_code(), second.status_code()];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);

        let ref_updates = repo
            .calls()
            .into_iter()
            .filter(|step| *step == ApiStep::UpdateRef)
            .count();
        assert_eq!(ref_updates, 1);

        let head = repo.head("main").unwrap();
        assert_eq!(repo.commit_parents(&head), vec![before.unwrap()]);
    }

    #[tokio::test]
    async fn test_session_progress() {
        let (server, _repo, _state) = setup();

        send_chunk(&server, "s1", "f1", "a.png", 0, 2, b"a").await;

        let response = server.get("/upload/sessions/s1").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["sessionId"], "s1");
        assert_eq!(
            body["files"],
            json!([{
                "fileId": "f1",
                "name": "a.png",
                "received": 1,
                "total": 2,
                "complete": false
            }])
        );
    }

    #[tokio::test]
    async fn test_single_shot_classifies_by_extension() {
        let (server, repo, _state) = setup();

        for (name, path) in [
            ("photo.PNG", "public/assets/img/photo.PNG"),
            ("clip.mp4", "public/assets/video/clip.mp4"),
        ] {
            let form = MultipartForm::new()
                .add_part("file", Part::bytes(b"bytes".to_vec()).file_name(name));
            let response = server.post("/upload").multipart(form).await;

            assert_eq!(response.status_code(), StatusCode::OK);
            let body = response.json::<Value>();
            assert_eq!(body["path"], path);
            let commit = body["commit"].as_str().unwrap();
            assert_eq!(repo.files_at(commit)[path], b"bytes");
        }
    }

    #[tokio::test]
    async fn test_single_shot_rejects_unknown_extension() {
        let (server, repo, _state) = setup();

        let form = MultipartForm::new()
            .add_part("file", Part::bytes(b"fLaC".to_vec()).file_name("track.flac"));
        let response = server.post("/upload").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "File type not allowed");
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_shot_existing_name_conflicts() {
        let (server, repo, _state) = setup();

        let form = || {
            MultipartForm::new()
                .add_part("file", Part::bytes(b"v1".to_vec()).file_name("logo.png"))
        };
        let response = server.post("/upload").multipart(form()).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let head = repo.head("main");

        let response = server.post("/upload").multipart(form()).await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "FILE_EXISTS");
        assert_eq!(body["details"]["path"], "public/assets/img/logo.png");
        assert_eq!(repo.head("main"), head);
    }
}

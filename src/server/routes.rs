use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::parse_timestamp;
use crate::pair::{non_empty, AssignOutcome, PairHistoryView, ReplaceRequest, ReplaceResult, ScanInput, SearchQuery};
use crate::server::{AppState, ACTOR_HEADER};
use crate::tag::Tag;
use crate::Error;

#[derive(Deserialize)]
pub struct ListTagsParams {
    pub since: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct ReplaceFailure {
    pub success: bool,
    pub message: String,
}

/// Engine error rendered as `{"error": ...}`
pub struct ApiError(Error);

/// Engine error rendered as `{"success": false, "message": ...}`
pub struct ReplaceError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<Error> for ReplaceError {
    fn from(err: Error) -> Self {
        ReplaceError(err)
    }
}

fn status_and_message(err: &Error) -> (StatusCode, String) {
    match err {
        Error::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        other => {
            tracing::error!("Request failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = status_and_message(&self.0);
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl IntoResponse for ReplaceError {
    fn into_response(self) -> Response {
        let (status, message) = status_and_message(&self.0);
        (status, Json(ReplaceFailure { success: false, message })).into_response()
    }
}

fn actor(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(state.default_actor.as_str())
        .to_string()
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListTagsParams>, QueryRejection>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    let Query(params) = params.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let since = match non_empty(&params.since) {
        Some(raw) => Some(
            parse_timestamp(raw).ok_or_else(|| Error::InvalidRequest(format!("Invalid since timestamp: {}", raw)))?,
        ),
        None => None,
    };

    let tags = state.run(move |engine| engine.list_tags(since)).await?;
    Ok(Json(tags))
}

pub async fn assign_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<Vec<AssignOutcome>>, ApiError> {
    let Json(body) = body.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let serde_json::Value::Array(values) = body else {
        return Err(Error::InvalidRequest("Expected array of pairs".to_string()).into());
    };

    let items = ScanInput::from_json_items(values);
    let actor = actor(&headers, &state);
    let outcomes = state.run(move |engine| engine.assign_batch(&items, &actor)).await?;
    Ok(Json(outcomes))
}

pub async fn search_pairs(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<PairHistoryView>, ApiError> {
    let Query(query) = query.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let view = state.run(move |engine| engine.search_pairs(&query)).await?;
    Ok(Json(view))
}

pub async fn replace_pair(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Result<Json<ReplaceRequest>, JsonRejection>,
) -> Result<Json<ReplaceResult>, ReplaceError> {
    let Json(request) = request.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let actor = actor(&headers, &state);
    let result = state.run(move |engine| engine.replace_pair(&request, &actor)).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::server::router;
    use crate::storage::SqliteStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let store = SqliteStore::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
        Arc::new(AppState::new(store, clock, "system"))
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(ACTOR_HEADER, "scanner-7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_batch_records_actor_and_outcomes() {
        let state = test_state();
        let body = serde_json::json!([
            {"asset_tag": "T1", "serial": "S1"},
            {"serial": "S2"},
            "not an object",
        ]);

        let (status, json) = send(&state, json_request("POST", "/pairs/batch", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["status"], "ok_inserted");
        assert_eq!(json[1]["status"], "error");
        assert_eq!(json[2]["message"], "Missing asset_tag or serial");

        let (status, json) = send(&state, get("/pairs/search?asset_tag=T1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "used");
        assert_eq!(json["history"][0]["assigned_by"], "scanner-7");
    }

    #[tokio::test]
    async fn test_batch_rejects_non_array() {
        let state = test_state();
        let body = serde_json::json!({"asset_tag": "T1", "serial": "S1"});

        let (status, json) = send(&state, json_request("POST", "/pairs/batch", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Expected array of pairs");
    }

    #[tokio::test]
    async fn test_search_errors() {
        let state = test_state();

        let (status, json) = send(&state, get("/pairs/search")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Either asset_tag or serial required");

        let (status, json) = send(&state, get("/pairs/search?serial=ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "No pairs found");
    }

    #[tokio::test]
    async fn test_replace_round() {
        let state = test_state();
        let batch = serde_json::json!([{"asset_tag": "T1", "serial": "S1"}]);
        send(&state, json_request("POST", "/pairs/batch", batch)).await;

        let missing = serde_json::json!({"searchBy": "asset_tag", "value": "T1"});
        let (status, json) = send(&state, json_request("PUT", "/pairs/replace", missing)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);

        let unknown = serde_json::json!({"searchBy": "serial", "value": "S9", "new_serial": "S10"});
        let (status, _) = send(&state, json_request("PUT", "/pairs/replace", unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let replace = serde_json::json!({"searchBy": "asset_tag", "value": "T1", "new_asset_tag": "T2"});
        let (status, json) = send(&state, json_request("PUT", "/pairs/replace", replace)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Successfully replaced asset_tag T1 with new serial S1");
    }

    #[tokio::test]
    async fn test_list_tags_since() {
        let state = test_state();
        let batch = serde_json::json!([{"asset_tag": "T1", "serial": "S1"}]);
        send(&state, json_request("POST", "/pairs/batch", batch)).await;

        let (status, json) = send(&state, get("/asset-tags")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["tag"], "T1");
        assert_eq!(json[0]["last_serial"], "S1");

        let (_, json) = send(&state, get("/asset-tags?since=2024-06-01T08:00:00Z")).await;
        assert_eq!(json.as_array().unwrap().len(), 0);

        let (status, _) = send(&state, get("/asset-tags?since=tomorrow")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_json_errors() {
        let state = test_state();

        let broken = Request::builder()
            .method("POST")
            .uri("/pairs/batch")
            .header("content-type", "application/json")
            .body(Body::from("[{\"asset_tag\": "))
            .unwrap();
        let (status, json) = send(&state, broken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some_and(|m| !m.is_empty()));

        let no_content_type = Request::builder()
            .method("POST")
            .uri("/pairs/batch")
            .body(Body::from("[]"))
            .unwrap();
        let (status, json) = send(&state, no_content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let numeric_value = serde_json::json!({"searchBy": "serial", "value": 7, "new_serial": "S2"});
        let (status, json) = send(&state, json_request("PUT", "/pairs/replace", numeric_value)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_batch_reports_bad_field_types() {
        let state = test_state();
        let body = serde_json::json!([
            {"asset_tag": "T1", "serial": "S1", "scanned_at": 1717228800},
            {"asset_tag": {"id": 1}, "serial": "S2"},
            {"asset_tag": 1001, "serial": 55},
        ]);

        let (status, json) = send(&state, json_request("POST", "/pairs/batch", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["message"], "Invalid scanned_at");
        assert_eq!(json[1]["message"], "Invalid asset_tag or serial");
        assert_eq!(json[2]["status"], "ok_inserted");
        assert_eq!(json[2]["asset_tag"], "1001");
        assert_eq!(json[2]["serial"], "55");
    }

    #[tokio::test]
    async fn test_failed_background_task_is_internal_error() {
        let state = test_state();
        let result: crate::Result<()> = state.run(|_| panic!("engine crashed")).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Task(_)));

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_locked_database_does_not_stall_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
        let state = Arc::new(AppState::new(store, clock, "system"));

        // Another connection holds the write lock until released
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder_path = path.clone();
        let holder = std::thread::spawn(move || {
            let other = SqliteStore::open(&holder_path).unwrap();
            other
                .write(|_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let pending = Arc::clone(&state);
        let request = tokio::spawn(async move {
            let batch = serde_json::json!([{"asset_tag": "T1", "serial": "S1"}]);
            send(&pending, json_request("POST", "/pairs/batch", batch)).await
        });

        // The single runtime thread keeps ticking while the batch waits
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!request.is_finished());

        release_tx.send(()).unwrap();
        let (status, json) = request.await.unwrap();
        holder.join().unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["status"], "ok_inserted");
    }
}

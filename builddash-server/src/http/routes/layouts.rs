//! Layout CRUD endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::http::error::ApiError;
use crate::http::extractors::{ApiJson, ApiPath};
use crate::http::server::AppState;
use crate::layouts::{Layout, LayoutInput};

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

/// GET /layouts - every saved layout
async fn list_layouts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Layout>>, ApiError> {
    Ok(Json(state.layouts.list().await?))
}

/// POST /layouts - save a new layout
async fn create_layout(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LayoutInput>,
) -> Result<(StatusCode, Json<Layout>), ApiError> {
    let layout = state.layouts.create(&req).await?;
    Ok((StatusCode::CREATED, Json(layout)))
}

/// GET /layouts/{id} - numeric segments look up by id, anything else by name
async fn get_layout(
    State(state): State<Arc<AppState>>,
    ApiPath(id_or_name): ApiPath<String>,
) -> Result<Json<Layout>, ApiError> {
    let layout = match id_or_name.parse::<i64>() {
        Ok(id) => state.layouts.get_by_id(id).await?,
        Err(_) => state.layouts.get_by_name(&id_or_name).await?,
    };
    Ok(Json(layout))
}

/// GET /layouts/name/{name}
async fn get_layout_by_name(
    State(state): State<Arc<AppState>>,
    ApiPath(name): ApiPath<String>,
) -> Result<Json<Layout>, ApiError> {
    Ok(Json(state.layouts.get_by_name(&name).await?))
}

/// PUT /layouts/{id}
async fn update_layout(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<LayoutInput>,
) -> Result<Json<Layout>, ApiError> {
    Ok(Json(state.layouts.update(id, &req).await?))
}

/// DELETE /layouts/{id}
async fn delete_layout(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.layouts.delete(id).await?;
    Ok(Json(DeleteResponse {
        message: "Layout deleted successfully",
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/layouts", get(list_layouts).post(create_layout))
        .route(
            "/layouts/{id}",
            get(get_layout).put(update_layout).delete(delete_layout),
        )
        .route("/layouts/name/{name}", get(get_layout_by_name))
}

#[cfg(test)]
mod tests {
    use crate::http::routes::testing::{send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    fn grid() -> serde_json::Value {
        json!([{"i": "chart-1", "x": 0, "y": 0, "w": 6, "h": 4}])
    }

    #[tokio::test]
    async fn create_returns_201_then_duplicate_is_400() {
        let app = test_app().await;
        let body = json!({"name": "dash1", "layout_config": grid()});

        let (status, created) = send(&app, "POST", "/api/layouts", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "dash1");
        assert_eq!(created["layout_config"], grid());

        let (status, err) = send(&app, "POST", "/api/layouts", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "duplicate_name");

        let (_, all) = send(&app, "GET", "/api/layouts", None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_accepts_id_or_name() {
        let app = test_app().await;
        let (_, created) = send(
            &app,
            "POST",
            "/api/layouts",
            Some(json!({"name": "ops", "layout_config": grid()})),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (status, by_id) = send(&app, "GET", &format!("/api/layouts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, by_segment_name) = send(&app, "GET", "/api/layouts/ops", None).await;
        let (_, by_name) = send(&app, "GET", "/api/layouts/name/ops", None).await;

        assert_eq!(by_id, created);
        assert_eq!(by_segment_name, created);
        assert_eq!(by_name, created);
    }

    #[tokio::test]
    async fn missing_layout_is_404() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/layouts/name/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/layouts/42",
            Some(json!({"name": "x", "layout_config": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_then_delete() {
        let app = test_app().await;
        let (_, created) = send(
            &app,
            "POST",
            "/api/layouts",
            Some(json!({"name": "ops", "layout_config": grid()})),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let new_grid = json!([{"i": "metric-1", "x": 1, "y": 1, "w": 2, "h": 2}]);
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/layouts/{id}"),
            Some(json!({"name": "ops-v2", "layout_config": new_grid})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "ops-v2");
        assert_eq!(updated["layout_config"], new_grid);

        let (status, body) = send(&app, "DELETE", &format!("/api/layouts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Layout deleted successfully");

        let (status, _) = send(&app, "GET", &format!("/api/layouts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let app = test_app().await;

        let (status, body) =
            send(&app, "POST", "/api/layouts", Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("layout_config"));

        let (status, body) = send(&app, "DELETE", "/api/layouts/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/layouts/abc",
            Some(json!({"name": "x", "layout_config": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn blank_name_is_400() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/layouts",
            Some(json!({"name": "  ", "layout_config": []})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}

//! HTTP surface: run lifecycle (start, cancel, query, history), saved
//! configuration CRUD, the validation-type catalogue, and health.

use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::ProgressPublisher;
use crate::executor;
use crate::models::LoadTestConfig;
use crate::session::{CancelOutcome, SessionRegistry};
use crate::storage::Storage;
use crate::utils::hardware;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub publisher: ProgressPublisher,
    pub storage: Storage,
}

/// Route table, shared by the binary and the handler tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/test/start", web::post().to(start_test))
        // history must precede the {session_id} matcher
        .route("/api/test/history", web::get().to(test_history))
        .route("/api/test/{session_id}", web::get().to(get_test))
        .route("/api/test/{session_id}/cancel", web::post().to(cancel_test))
        .route("/api/config/save", web::post().to(save_config))
        .route("/api/config/list", web::get().to(list_configs))
        .service(
            web::resource("/api/config/{config_id}")
                .route(web::get().to(get_config))
                .route(web::delete().to(delete_config)),
        )
        .route("/api/validation-types", web::get().to(validation_types))
        .route("/api/health", web::get().to(health))
        .route("/ws", web::get().to(ws::ws_handler));
}

/// Accepts a config, validates it synchronously, and spawns the run. The
/// session id comes back immediately; progress arrives over the socket.
pub async fn start_test(
    state: web::Data<AppState>,
    config: web::Json<LoadTestConfig>,
) -> Result<HttpResponse, ApiError> {
    let config = config.into_inner();
    config.validate()?;

    let (session_id, cancel) = state.registry.create(config.clone());
    tracing::info!(%session_id, target = %config.base_url, "accepted load test");

    tokio::spawn(executor::run_load_test(
        state.registry.clone(),
        state.publisher.clone(),
        state.storage.clone(),
        session_id,
        config,
        cancel,
    ));

    Ok(HttpResponse::Accepted().json(json!({
        "session_id": session_id,
        "status": "pending",
    })))
}

pub async fn get_test(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let session = state
        .registry
        .snapshot(session_id)
        .ok_or(ApiError::SessionNotFound(session_id))?;
    Ok(HttpResponse::Ok().json(session))
}

pub async fn cancel_test(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    match state.registry.cancel(session_id) {
        CancelOutcome::Requested => {
            tracing::info!(%session_id, "cancellation requested");
            Ok(HttpResponse::Ok().json(json!({
                "session_id": session_id,
                "status": "cancellation_requested",
            })))
        }
        CancelOutcome::AlreadyTerminal(status) => Ok(HttpResponse::Ok().json(json!({
            "session_id": session_id,
            "status": "already_terminal",
            "session_status": status,
        }))),
        CancelOutcome::NotFound => Err(ApiError::SessionNotFound(session_id)),
    }
}

pub async fn test_history(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let sessions = state.storage.history().await?;
    Ok(HttpResponse::Ok().json(json!({ "sessions": sessions })))
}

pub async fn save_config(
    state: web::Data<AppState>,
    doc: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    let saved = state.storage.save_config(doc.into_inner()).await?;
    Ok(HttpResponse::Ok().json(saved))
}

pub async fn list_configs(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let configs = state.storage.list_configs().await?;
    Ok(HttpResponse::Ok().json(json!({ "configs": configs })))
}

pub async fn get_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let config = state.storage.get_config(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(config))
}

pub async fn delete_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.storage.delete_config(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "message": "Config deleted" })))
}

/// Rule-kind catalogue consumed by UI clients when building rule editors.
pub async fn validation_types() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "types": [
            {
                "value": "exists",
                "label": "String Exists",
                "description": "Check if a string exists in the response",
                "requires_value": true,
                "requires_field_path": false,
            },
            {
                "value": "not_exists",
                "label": "String Does Not Exist",
                "description": "Check if a string does not exist in the response",
                "requires_value": true,
                "requires_field_path": false,
            },
            {
                "value": "status_code",
                "label": "Status Code Check",
                "description": "Validate the HTTP status code",
                "requires_value": true,
                "requires_field_path": false,
            },
            {
                "value": "regex",
                "label": "Regex Pattern Match",
                "description": "Check if the response matches a regex pattern",
                "requires_value": true,
                "requires_field_path": false,
            },
            {
                "value": "json_path",
                "label": "JSON Path Exists",
                "description": "Check that a dot-separated key path exists in the JSON response",
                "requires_value": false,
                "requires_field_path": true,
            },
        ]
    }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "hardware": hardware::snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn state() -> (tempfile::TempDir, web::Data<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState {
            registry: SessionRegistry::new(),
            publisher: ProgressPublisher::default(),
            storage: Storage::new(dir.path()),
        });
        (dir, state)
    }

    #[actix_web::test]
    async fn start_rejects_out_of_bound_config() {
        let (_dir, state) = state();
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/test/start")
            .set_json(json!({
                "base_url": "http://localhost:1/api",
                "concurrent_calls": 1001,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("concurrent_calls"));
    }

    #[actix_web::test]
    async fn unknown_session_is_404() {
        let (_dir, state) = state();
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/test/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn cancel_on_terminal_session_reports_not_fails() {
        let (_dir, state) = state();
        let (session_id, _) = state.registry.create(
            serde_json::from_value(json!({ "base_url": "http://localhost:1/api" })).unwrap(),
        );
        state
            .registry
            .finalize(session_id, crate::models::SessionState::Completed, None);

        let app = test::init_service(App::new().app_data(state).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri(&format!("/api/test/{session_id}/cancel"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "already_terminal");
        assert_eq!(body["session_status"], "completed");
    }

    #[actix_web::test]
    async fn validation_types_lists_the_closed_kind_set() {
        let (_dir, state) = state();
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/validation-types")
            .to_request();
        let body: serde_json::Value =
            test::read_body_json(test::call_service(&app, req).await).await;
        let kinds: Vec<&str> = body["types"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["value"].as_str().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec!["exists", "not_exists", "status_code", "regex", "json_path"]
        );
    }
}

pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::builder::handlers as builder;
use crate::evidence::handlers as evidence;
use crate::quality::handlers as quality;
use crate::rewrite::handlers as rewrite;
use crate::state::AppState;
use crate::variants::handlers as variants;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Evidence
        .route("/api/v1/evidence/rank", post(evidence::handle_rank))
        .route("/api/v1/evidence/matrix", post(evidence::handle_matrix))
        // Sections
        .route("/api/v1/sections/score", post(quality::handle_score))
        .route(
            "/api/v1/sections/variants",
            post(variants::handle_generate_variants),
        )
        .route("/api/v1/sections/rewrite", post(rewrite::handle_rewrite))
        .route("/api/v1/sections/validate", post(rewrite::handle_validate))
        // Builder sessions
        .route("/api/v1/sessions", post(builder::handle_create_session))
        .route("/api/v1/sessions/:id", get(builder::handle_get_session))
        .route(
            "/api/v1/sessions/:id/assessment",
            post(builder::handle_assessment),
        )
        .route("/api/v1/sessions/:id/build", post(builder::handle_build))
        .route("/api/v1/sessions/:id/review", post(builder::handle_review))
        .route(
            "/api/v1/sessions/:id/finalize",
            post(builder::handle_finalize),
        )
        .route(
            "/api/v1/sessions/:id/navigate",
            post(builder::handle_navigate),
        )
        .route("/api/v1/sessions/:id/save", post(builder::handle_save))
        .route(
            "/api/v1/sessions/:id/history",
            get(builder::handle_history),
        )
        .route("/api/v1/sessions/:id/revert", post(builder::handle_revert))
        .route(
            "/api/v1/sessions/:id/validations/:section",
            get(rewrite::handle_validation_status),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::llm_client::testing::ScriptedGenerator;
    use crate::state::testing::test_state;

    fn app() -> Router {
        let generator = Arc::new(ScriptedGenerator::always(
            "Built Python services handling 2M requests daily",
        ));
        build_router(test_state(generator).0)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn target() -> Value {
        json!({
            "jobTitle": "Backend Engineer",
            "jobDescription": "Build Python services",
            "requirements": [{ "text": "Python services", "priority": "required" }],
            "atsKeywords": { "critical": ["Python"] },
            "evidence": [{ "id": "e1", "text": "Built Python services", "keywords": ["python"] }],
            "sections": ["experience"]
        })
    }

    #[tokio::test]
    async fn test_health_reports_service_name() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "builder-api");
    }

    #[tokio::test]
    async fn test_score_endpoint_returns_quality_score() {
        let (status, body) = send(
            &app(),
            "POST",
            "/api/v1/sections/score",
            Some(json!({
                "text": "Led Python services",
                "atsKeywords": { "critical": ["Python"] }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["overall"].as_u64().unwrap() <= 100);
        assert_eq!(body["keywordsMatched"], json!(["Python"]));
    }

    #[tokio::test]
    async fn test_session_flow_over_http() {
        let app = app();
        let (status, session) = send(&app, "POST", "/api/v1/sessions", Some(target())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = session["sessionId"].as_str().unwrap().to_string();

        // Build before assessment is a transition error.
        let build = json!({ "section": "experience" });
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/build"),
            Some(build.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

        let (status, matrix) =
            send(&app, "POST", &format!("/api/v1/sessions/{id}/assessment"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(matrix["rows"][0]["selectedEvidence"]["id"], "e1");

        let (status, built) = send(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/build"),
            Some(build),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(built["stored"], true);
        assert!(built["comparison"].is_object());

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/review"),
            Some(json!({ "selections": { "experience": { "strategy": "personalized" } } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, finalized) =
            send(&app, "POST", &format!("/api/v1/sessions/{id}/finalize"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            finalized["content"]["experience"],
            "Built Python services handling 2M requests daily"
        );

        let (status, history) =
            send(&app, "GET", &format!("/api/v1/sessions/{id}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        let steps: Vec<&str> = history["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["stepCompleted"].as_str().unwrap())
            .collect();
        assert_eq!(
            steps,
            ["target", "assessment", "build", "review", "finalize"]
        );

        let first = history["entries"][0]["id"].as_str().unwrap();
        let (status, reverted) = send(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/revert"),
            Some(json!({ "versionId": first })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reverted["currentStep"], "assessment");
        assert!(reverted["variants"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let uri = format!("/api/v1/sessions/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_blank_job_description_is_400() {
        let (status, body) = send(
            &app(),
            "POST",
            "/api/v1/sessions",
            Some(json!({ "jobDescription": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "input_error");
    }
}

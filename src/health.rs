use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Liveness endpoint; reports uptime and whether the gateway session is up.
#[derive(Clone)]
pub struct HealthState {
    pub started_at: Instant,
    pub bot_name: Arc<OnceLock<String>>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "bot": state.bot_name.get().map_or("Not ready", String::as_str),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

pub async fn serve(state: HealthState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Health endpoint listening on port {port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn state() -> HealthState {
        HealthState {
            started_at: Instant::now(),
            bot_name: Arc::new(OnceLock::new()),
        }
    }

    #[tokio::test]
    async fn health_reports_not_ready_before_login() {
        let response = router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["bot"], "Not ready");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = router(state())
            .oneshot(Request::get("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // TPA-server registration surface
    let tpa_routes = Router::new()
        .route("/register", post(routes::tpa::register))
        .route("/heartbeat", post(routes::tpa::heartbeat))
        .route("/restart", post(routes::tpa::restart));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .route("/glasses", get(ws::glasses::ws_upgrade))
        .route("/tpa", get(ws::tpa::ws_upgrade))
        .nest("/api/tpa", tpa_routes)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

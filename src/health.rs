use std::sync::Arc;

use anyhow::Result;
use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::AppContext;

pub fn router(app: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .with_state(app)
}

async fn status(State(app): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "name": app.settings.app.name,
        "env": app.settings.env,
        "guilds_tracked": app.guard.guild_count(),
    }))
}

/// Simple HTTP server exposing a healthcheck.
pub async fn serve(addr: &str, app: Arc<AppContext>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "health endpoint listening");
    axum::serve(listener, router(app)).await?;
    Ok(())
}

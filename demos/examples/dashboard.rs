//! Dashboard server behind the session gate.
//!
//! Page routes are gated by `coinwatch-tower`: `/dashboard` needs a session,
//! `/admin` needs a staff session and `/auth` is only shown to visitors
//! without one. Market data comes from the cached query layer, so repeated
//! page loads within the stale time do not reach the backend.
//!
//! Run:
//!   NEXT_PUBLIC_API_BASE_URL=http://localhost:8000 \
//!     cargo run -p coinwatch-demos --example dashboard
//!
//! Try it:
//!   curl -v http://localhost:3000/dashboard                       # 307 to /auth
//!   curl -v -H 'Cookie: access=...' http://localhost:3000/dashboard?page=2
//!   curl -v -X POST -H 'Cookie: access=...' http://localhost:3000/dashboard/refresh
//!   curl -v http://localhost:3000/health                          # never gated

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use coinwatch::{CryptoQueries, QueryClient, QueryError};
use coinwatch_client::{ApiClient, ClientConfig};
use coinwatch_core::Coin;
use coinwatch_tower::RouteGate;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    crypto: CryptoQueries<ApiClient>,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default = "first_page")]
    page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct CoinRow {
    #[serde(flatten)]
    coin: Coin,
    sparkline: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct DashboardPage {
    page: u32,
    total_pages: Option<u32>,
    coins: Vec<CoinRow>,
}

fn bad_gateway(error: QueryError) -> (StatusCode, String) {
    (StatusCode::BAD_GATEWAY, error.message())
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<DashboardPage>, (StatusCode, String)> {
    let view = state
        .crypto
        .with_history(params.page.max(1))
        .await
        .map_err(bad_gateway)?;

    let coins = view
        .coins
        .items
        .iter()
        .map(|coin| CoinRow {
            sparkline: view
                .history
                .get(coin.symbol.to_ascii_uppercase().as_str())
                .cloned()
                .unwrap_or_default(),
            coin: coin.clone(),
        })
        .collect();

    Ok(Json(DashboardPage {
        page: view.page,
        total_pages: view.total_pages,
        coins,
    }))
}

async fn refresh(State(state): State<AppState>) -> Json<serde_json::Value> {
    let keys = state.crypto.refresh_all().await;
    tracing::info!(invalidated = keys.len(), "dashboard refresh");
    Json(serde_json::json!({ "invalidated": keys.len() }))
}

async fn admin() -> &'static str {
    "staff area"
}

async fn auth() -> &'static str {
    "login form"
}

async fn health() -> &'static str {
    "OK"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,coinwatch=debug,coinwatch_tower=debug")),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let gate = RouteGate::remote(&config)?;
    let api = Arc::new(ApiClient::new(config)?);
    let state = AppState {
        crypto: CryptoQueries::new(api, QueryClient::default()),
    };

    let app = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/dashboard/refresh", post(refresh))
        .route("/admin", get(admin))
        .route("/auth", get(auth))
        .route("/health", get(health))
        .layer(gate)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

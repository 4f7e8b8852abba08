// 8Ball Markets - Main Entry Point
//
// Peer-to-peer betting marketplace backend: wallet ledger, escrow
// settlement engine, bet threads, leaderboard. All money truth lives in
// the append-only ledger; every settlement operation commits atomically
// under the shared state lock.

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use eightball_markets::app_state::{AppState, SharedState};
use eightball_markets::handlers::*;
use eightball_markets::routes::auth::{grant_admin, list_users, login, set_user_active, signup};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🎱 8Ball Markets Settlement Service");
    println!("═══════════════════════════════════════════════\n");

    let state_file =
        std::env::var("EIGHTBALL_STATE_FILE").unwrap_or_else(|_| "data/state.json".to_string());
    let port: u16 = std::env::var("EIGHTBALL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8888);

    let state: SharedState = Arc::new(Mutex::new(AppState::load_or_new(&state_file)));
    let shutdown_state = state.clone();

    let app = Router::new()
        // ===== AUTHENTICATION =====
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        // ===== SETTLEMENT OPERATIONS =====
        .route("/bets/propose", post(propose_bet))
        .route("/bets/:id/accept", post(accept_bet))
        .route("/bets/:id/resolve", post(resolve_bet))
        .route("/bets/:id/dispute", post(dispute_bet))
        .route("/bets/:id/cancel", post(cancel_bet))
        // ===== BET LISTINGS =====
        .route("/bets/marketplace", get(get_marketplace))
        .route("/bets/resolved", get(get_resolved_bets))
        .route("/bets/user/:user_id", get(get_user_bets))
        .route("/bets/arbiter/:user_id", get(get_arbiter_bets))
        // ===== BET THREADS =====
        .route("/bets/:id/thread", get(get_bet_thread))
        .route("/bets/:id/thread/messages", post(post_bet_message))
        // ===== WALLET & LEDGER =====
        .route("/balance/:user_id", get(get_balance))
        .route("/ledger/activity", get(get_ledger_activity))
        .route("/ledger/:user_id", get(get_user_ledger))
        // ===== LEADERBOARD =====
        .route("/leaderboard", get(get_leaderboard))
        // ===== ADMIN =====
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/active", post(set_user_active))
        .route("/admin/users/:id/grant-admin", post(grant_admin))
        // ===== HEALTH =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    // Snapshot state on shutdown so the ledger survives restarts
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");

        tracing::info!("shutdown signal received, saving state");
        match shutdown_state.lock() {
            Ok(app_state) => {
                if let Err(e) = app_state.save_to_disk() {
                    tracing::error!("failed to save state: {}", e);
                } else {
                    tracing::info!("state saved");
                }
            }
            Err(_) => tracing::error!("state lock poisoned, snapshot skipped"),
        }
        std::process::exit(0);
    });

    axum::serve(listener, app).await.expect("Server error");
}

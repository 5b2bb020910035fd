//! Shield endpoints.
//!
//! The public challenge flow (issue and verify) plus the admin-only journal
//! view scoped to shield events. Verification failures all collapse to one
//! generic rejection; only the honeypot case is distinguishable, as a 403.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{client_ip, error_response};
use crate::journal::{EventPage, Retain, ShieldJournal};
use crate::shield::{Challenge, ShieldEngine, VerifyOutcome};

/// State shared by the shield endpoints.
#[derive(Clone)]
pub struct ShieldApiState {
    pub engine: Arc<ShieldEngine>,
    pub shield_journal: ShieldJournal,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub nonce: String,
    pub solution: String,
    pub fingerprint: Option<String>,
    /// Honeypot field. Hidden in the real form; any non-empty value here
    /// marks the client as a bot.
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JournalQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ClearShieldRequest {
    pub retain_days: Option<u32>,
}

/// GET /challenge - issue a proof-of-work challenge for the caller
async fn get_challenge(
    State(state): State<ShieldApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Challenge>, (StatusCode, String)> {
    let ip = client_ip(&headers, Some(&addr));
    let challenge = state.engine.issue_challenge(&ip).await.map_err(error_response)?;
    Ok(Json(challenge))
}

/// POST /verify-connection - verify a solution for the caller
async fn verify_connection(
    State(state): State<ShieldApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if payload.nonce.is_empty() || payload.solution.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "nonce and solution are required".to_string(),
        ));
    }

    let ip = client_ip(&headers, Some(&addr));
    let outcome = state
        .engine
        .verify_solution(
            &ip,
            &payload.nonce,
            &payload.solution,
            payload.fingerprint.as_deref(),
            payload.website.as_deref(),
        )
        .await
        .map_err(error_response)?;

    match outcome {
        VerifyOutcome::Verified => Ok(Json(json!({ "verified": true }))),
        VerifyOutcome::Honeypot => Err((StatusCode::FORBIDDEN, "forbidden".to_string())),
        VerifyOutcome::Invalid(_) => Ok(Json(json!({
            "verified": false,
            "error": "verification failed",
        }))),
    }
}

/// GET /shield-journal - paginated shield events (admin)
async fn shield_journal(
    State(state): State<ShieldApiState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<EventPage>, (StatusCode, String)> {
    let page = state
        .shield_journal
        .query(query.page.unwrap_or(1), query.per_page.unwrap_or(50))
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}

/// GET /shield-stats - shield event counts (admin)
async fn shield_stats(
    State(state): State<ShieldApiState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let days = query.days.unwrap_or(7);
    let counts = state
        .shield_journal
        .stats(days)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "days": days, "counts": counts })))
}

/// POST /clear-shield - prune shield events and reset attempt counters (admin)
async fn clear_shield(
    State(state): State<ShieldApiState>,
    Json(payload): Json<ClearShieldRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let retain = match payload.retain_days {
        Some(days) => Retain::Days(days),
        None => Retain::All,
    };
    let removed = state
        .shield_journal
        .prune(retain)
        .await
        .map_err(error_response)?;
    let counters_cleared = state.engine.clear_attempts().await.map_err(error_response)?;
    Ok(Json(json!({
        "removed": removed,
        "counters_cleared": counters_cleared,
    })))
}

/// Create the shield router
pub fn create_shield_router(state: ShieldApiState) -> Router {
    Router::new()
        .route("/challenge", get(get_challenge))
        .route("/verify-connection", post(verify_connection))
        .route("/shield-journal", get(shield_journal))
        .route("/shield-stats", get(shield_stats))
        .route("/clear-shield", post(clear_shield))
        .with_state(state)
}

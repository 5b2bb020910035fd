//! Admin security endpoints.
//!
//! Journal queries, stats, alerts, block/unblock (single and bulk),
//! whitelist management, and cache clearing. All routes here sit behind the
//! admin API key middleware.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{client_ip, error_response};
use crate::alerts::AlertEngine;
use crate::journal::{EventFilter, EventJournal, EventPage, EventType, Retain, SecurityEvent};
use crate::reputation::{BlockOutcome, CacheKeyKind, ReputationTracker};

/// State shared by the admin endpoints.
#[derive(Clone)]
pub struct SecurityApiState {
    pub tracker: Arc<ReputationTracker>,
    pub journal: Arc<EventJournal>,
    pub alerts: Arc<AlertEngine>,
}

// Request/response types

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub event_type: Option<String>,
    pub ip: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub ip: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnblockRequest {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkBlockRequest {
    pub ips: Vec<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkUnblockRequest {
    pub ips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkOutcome {
    pub blocked: usize,
    pub skipped: usize,
    /// Per-item reasons for skipped entries, keyed by the submitted value.
    pub reasons: Vec<SkippedItem>,
}

#[derive(Debug, Serialize)]
pub struct SkippedItem {
    pub ip: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub ip: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearAttemptsRequest {
    pub ip: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub retain_days: Option<u32>,
}

// Endpoints

/// GET /logs - filtered, paginated security events
async fn list_logs(
    State(state): State<SecurityApiState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<EventPage>, (StatusCode, String)> {
    let event_type = match query.event_type.as_deref() {
        Some(raw) => Some(EventType::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("unknown event type: {raw}"),
            )
        })?),
        None => None,
    };

    let filter = EventFilter {
        event_type,
        ip: query.ip,
        user_id: query.user_id,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = state
        .journal
        .query(&filter, query.page.unwrap_or(1), query.per_page.unwrap_or(50))
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}

/// GET /logs/{id} - single event
async fn show_log(
    State(state): State<SecurityApiState>,
    Path(id): Path<String>,
) -> Result<Json<SecurityEvent>, (StatusCode, String)> {
    state
        .journal
        .get(&id)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "event not found".to_string()))
}

/// GET /stats - per-type event counts over the trailing days
async fn stats(
    State(state): State<SecurityApiState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let days = query.days.unwrap_or(7);
    let counts = state.journal.stats(days).await.map_err(error_response)?;
    Ok(Json(json!({ "days": days, "counts": counts })))
}

/// GET /alerts - derived alerts, ranked
async fn alerts(
    State(state): State<SecurityApiState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let alerts = state.alerts.compute_alerts().await.map_err(error_response)?;
    Ok(Json(json!({ "count": alerts.len(), "alerts": alerts })))
}

/// GET /blocklist - currently blocked IPs
async fn blocklist(
    State(state): State<SecurityApiState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let blocked = state.tracker.blocklist().await.map_err(error_response)?;
    Ok(Json(json!({ "count": blocked.len(), "blocked": blocked })))
}

/// POST /block - block one IP, temporarily or permanently
async fn block(
    State(state): State<SecurityApiState>,
    Json(payload): Json<BlockRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let reason = payload.reason.as_deref().unwrap_or("blocked by admin");
    let outcome = if payload.permanent {
        state.tracker.block_permanently(&payload.ip, reason).await
    } else {
        state.tracker.block_temporarily(&payload.ip, reason).await
    }
    .map_err(error_response)?;

    Ok(Json(match outcome {
        BlockOutcome::Applied { seconds_blocked } => json!({
            "blocked": true,
            "permanent": payload.permanent,
            "seconds_blocked": seconds_blocked,
        }),
        BlockOutcome::Denied => json!({
            "blocked": false,
            "reason": "ip is whitelisted",
        }),
    }))
}

/// POST /unblock - lift any block from one IP
async fn unblock(
    State(state): State<SecurityApiState>,
    Json(payload): Json<UnblockRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .tracker
        .unblock(&payload.ip)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "unblocked": true })))
}

/// POST /bulk-block - block many IPs; partial success, per-item reasons
async fn bulk_block(
    State(state): State<SecurityApiState>,
    Json(payload): Json<BulkBlockRequest>,
) -> Result<Json<BulkOutcome>, (StatusCode, String)> {
    let reason = payload.reason.as_deref().unwrap_or("blocked by admin");
    let mut blocked = 0;
    let mut reasons = Vec::new();

    for ip in &payload.ips {
        let result = if payload.permanent {
            state.tracker.block_permanently(ip, reason).await
        } else {
            state.tracker.block_temporarily(ip, reason).await
        };
        match result {
            Ok(outcome) if outcome.is_applied() => blocked += 1,
            Ok(_) => reasons.push(SkippedItem {
                ip: ip.clone(),
                reason: "whitelisted".to_string(),
            }),
            Err(e) => reasons.push(SkippedItem {
                ip: ip.clone(),
                reason: e.to_string(),
            }),
        }
    }

    Ok(Json(BulkOutcome {
        blocked,
        skipped: reasons.len(),
        reasons,
    }))
}

/// POST /bulk-unblock - unblock many IPs; partial success
async fn bulk_unblock(
    State(state): State<SecurityApiState>,
    Json(payload): Json<BulkUnblockRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut unblocked = 0;
    let mut reasons = Vec::new();

    for ip in &payload.ips {
        match state.tracker.unblock(ip).await {
            Ok(()) => unblocked += 1,
            Err(e) => reasons.push(SkippedItem {
                ip: ip.clone(),
                reason: e.to_string(),
            }),
        }
    }

    Ok(Json(json!({
        "unblocked": unblocked,
        "skipped": reasons.len(),
        "reasons": reasons,
    })))
}

/// GET /whitelist - whitelist entries
async fn get_whitelist(
    State(state): State<SecurityApiState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let entries = state.tracker.whitelist().await.map_err(error_response)?;
    Ok(Json(json!({ "count": entries.len(), "whitelist": entries })))
}

/// POST /whitelist - add an IP; implicitly unblocks it
async fn add_whitelist(
    State(state): State<SecurityApiState>,
    Json(payload): Json<WhitelistRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let reason = payload.reason.as_deref().unwrap_or("added by admin");
    let entry = state
        .tracker
        .add_to_whitelist(&payload.ip, reason)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "added": true, "entry": entry })))
}

/// DELETE /whitelist - remove an IP
async fn remove_whitelist(
    State(state): State<SecurityApiState>,
    Json(payload): Json<UnblockRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .tracker
        .remove_from_whitelist(&payload.ip)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "removed": true })))
}

/// GET /check - status for one IP, defaulting to the caller's
async fn check(
    State(state): State<SecurityApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<CheckQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let ip = query
        .ip
        .unwrap_or_else(|| client_ip(&headers, Some(&addr)));
    let status = state.tracker.check_status(&ip).await.map_err(error_response)?;
    Ok(Json(json!(status)))
}

/// POST /clear-attempts - reset failure counters for an IP and/or email
async fn clear_attempts(
    State(state): State<SecurityApiState>,
    Json(payload): Json<ClearAttemptsRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if payload.ip.is_none() && payload.email.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "either ip or email is required".to_string(),
        ));
    }

    if let Some(ref ip) = payload.ip {
        state
            .tracker
            .clear_security_cache(ip, CacheKeyKind::Ip)
            .await
            .map_err(error_response)?;
    }
    if let Some(ref email) = payload.email {
        state
            .tracker
            .clear_security_cache(email, CacheKeyKind::Email)
            .await
            .map_err(error_response)?;
    }
    Ok(Json(json!({ "cleared": true })))
}

/// POST /clear - prune the journal by age, or entirely
async fn clear_logs(
    State(state): State<SecurityApiState>,
    Json(payload): Json<ClearRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let retain = match payload.retain_days {
        Some(days) => Retain::Days(days),
        None => Retain::All,
    };
    let removed = state.journal.prune(retain).await.map_err(error_response)?;
    Ok(Json(json!({ "removed": removed })))
}

/// Create the admin security router
pub fn create_security_router(state: SecurityApiState) -> Router {
    Router::new()
        .route("/logs", get(list_logs))
        .route("/logs/{id}", get(show_log))
        .route("/stats", get(stats))
        .route("/alerts", get(alerts))
        .route("/blocklist", get(blocklist))
        .route("/block", post(block))
        .route("/unblock", post(unblock))
        .route("/bulk-block", post(bulk_block))
        .route("/bulk-unblock", post(bulk_unblock))
        .route(
            "/whitelist",
            get(get_whitelist).post(add_whitelist).delete(remove_whitelist),
        )
        .route("/check", get(check))
        .route("/clear-attempts", post(clear_attempts))
        .route("/clear", post(clear_logs))
        .with_state(state)
}

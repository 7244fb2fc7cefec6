//! HTTP surface of the authorization service.
//!
//! - `POST /authz/check` - evaluate one request
//! - `GET|POST|DELETE /authz/policies` - manage grant rules
//! - `GET|POST|DELETE /authz/roles` - manage role membership
//! - `POST /authz/reload` - force an immediate ruleset reload
//! - `GET /authz/stats` - cache and alias counters

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use guarita_authz::AuthzError;
use guarita_authz::engine::AuthzEngine;
use guarita_authz::policy::{AuthorizationRequest, Effect, PolicyRule};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The authorization engine.
    pub engine: Arc<AuthzEngine>,
}

/// Build the service router.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/authz/check", post(check))
        .route(
            "/authz/policies",
            get(list_policies).post(add_policy).delete(remove_policy),
        )
        .route(
            "/authz/roles",
            get(list_roles).post(add_role).delete(remove_role),
        )
        .route("/authz/reload", post(reload))
        .route("/authz/stats", get(stats))
        .with_state(state)
}

fn error_response(e: &AuthzError) -> (StatusCode, Json<Value>) {
    let status = match e {
        AuthzError::InvalidPolicy { .. } => StatusCode::BAD_REQUEST,
        AuthzError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "success": false, "error": e.to_string() })))
}

// =============================================================================
// Check
// =============================================================================

/// Extract the client IP from proxy headers.
///
/// `x-forwarded-for` wins (first hop), then `cf-connecting-ip`, then
/// `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    for header in ["cf-connecting-ip", "x-real-ip"] {
        if let Some(ip) = headers.get(header).and_then(|v| v.to_str().ok()) {
            return Some(ip.to_string());
        }
    }
    None
}

/// `POST /authz/check`
///
/// Evaluates the request through the engine. The client IP and user agent
/// observed at the HTTP layer are injected into the context when the caller
/// did not supply them, so policies can predicate on them without trusting
/// the request body.
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<AuthorizationRequest>,
) -> impl IntoResponse {
    if !request.context.contains_key("ip") {
        if let Some(ip) = client_ip(&headers) {
            request.context.insert("ip".to_string(), ip.into());
        }
    }
    if !request.context.contains_key("userAgent") {
        if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
            request
                .context
                .insert("userAgent".to_string(), agent.into());
        }
    }

    let decision = state.engine.check_permission(&request).await;
    Json(decision)
}

// =============================================================================
// Policies
// =============================================================================

/// Body of policy add/remove calls.
#[derive(Debug, Deserialize)]
pub struct PolicyBody {
    /// Rule subject.
    pub subject: String,
    /// Rule object.
    pub object: String,
    /// Rule action.
    pub action: String,
    /// Allow or deny; defaults to allow.
    #[serde(default = "default_effect")]
    pub effect: Effect,
    /// Optional context predicate.
    #[serde(default)]
    pub conditions: Option<Map<String, Value>>,
}

fn default_effect() -> Effect {
    Effect::Allow
}

/// `GET /authz/policies`
pub async fn list_policies(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.list_policies().await {
        Ok(policies) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": policies })),
        ),
        Err(e) => error_response(&e),
    }
}

/// `POST /authz/policies`
pub async fn add_policy(
    State(state): State<AppState>,
    Json(body): Json<PolicyBody>,
) -> impl IntoResponse {
    let mut rule = PolicyRule::grant(body.subject, body.object, body.action, body.effect);
    rule.predicate = body.conditions;

    match state.engine.add_policy(rule).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "policy already exists" })),
        ),
        Err(e) => error_response(&e),
    }
}

/// `DELETE /authz/policies`
pub async fn remove_policy(
    State(state): State<AppState>,
    Json(body): Json<PolicyBody>,
) -> impl IntoResponse {
    match state
        .engine
        .remove_policy(&body.subject, &body.object, &body.action, body.effect)
        .await
    {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "policy not found" })),
        ),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Roles
// =============================================================================

/// Body of role membership calls.
#[derive(Debug, Deserialize)]
pub struct RoleBody {
    /// Principal being grouped.
    pub principal: String,
    /// Role the principal inherits.
    pub role: String,
}

/// `GET /authz/roles`
pub async fn list_roles(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.list_groupings().await {
        Ok(groupings) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": groupings })),
        ),
        Err(e) => error_response(&e),
    }
}

/// `POST /authz/roles`
pub async fn add_role(
    State(state): State<AppState>,
    Json(body): Json<RoleBody>,
) -> impl IntoResponse {
    match state.engine.add_grouping(body.principal, body.role).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "grouping already exists" })),
        ),
        Err(e) => error_response(&e),
    }
}

/// `DELETE /authz/roles`
pub async fn remove_role(
    State(state): State<AppState>,
    Json(body): Json<RoleBody>,
) -> impl IntoResponse {
    match state.engine.remove_grouping(&body.principal, &body.role).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "grouping not found" })),
        ),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Operations
// =============================================================================

/// `POST /authz/reload`
pub async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    let reloaded = state.engine.reload().await;
    let status = if reloaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "success": reloaded })))
}

/// Stats payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Total rules in the active snapshot.
    pub rule_count: usize,
    /// Grant rules in the active snapshot.
    pub grant_count: usize,
    /// Grouping rules in the active snapshot.
    pub grouping_count: usize,
    /// Snapshot version.
    pub version: u64,
    /// Live identity alias cache entries.
    pub cached_aliases: usize,
}

/// `GET /authz/stats`
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.stats().await;
    Json(StatsResponse {
        rule_count: stats.cache.rule_count,
        grant_count: stats.cache.grant_count,
        grouping_count: stats.cache.grouping_count,
        version: stats.cache.version,
        cached_aliases: stats.cached_aliases,
    })
}

//! HTTP handlers for auth and AI flows
//!
//! Each browser client is identified by a `session-id` cookie naming its
//! [`AuthContext`](crate::auth::AuthContext) in the registry.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ai::{
    generate_progress_insights, generate_smart_notifications, generate_study_tips, FlowOutcome,
    ProgressInsightsInput, SmartNotificationsInput, StudyTipsInput,
};
use crate::auth::{AuthError, Cookie, SharedContext};
use crate::server::ServerState;
use crate::session::ClientInfo;
use crate::types::{ProfileUpdate, User, UserRole};

/// Cookie naming the client's auth context
pub const CLIENT_COOKIE: &str = "session-id";

/// Set when a flow answered with its fallback payload
pub const FLOW_FALLBACK_HEADER: &str = "x-flow-fallback";

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthRequest {
    pub id_token: String,
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
}

fn default_provider_id() -> String {
    "google.com".to_string()
}

/// Session response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: Option<User>,
    pub valid: bool,
    pub remaining_ms: i64,
    pub demo_mode: bool,
}

/// Status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub demo_mode: bool,
    pub active_clients: usize,
}

enum SignInMethod {
    Password(SignInRequest),
    SignUp(SignUpRequest),
    OAuth(OAuthRequest),
}

pub async fn sign_in_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<SignInRequest>,
) -> Response {
    authenticate(&state, &headers, SignInMethod::Password(req)).await
}

pub async fn sign_up_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<SignUpRequest>,
) -> Response {
    authenticate(&state, &headers, SignInMethod::SignUp(req)).await
}

pub async fn oauth_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<OAuthRequest>,
) -> Response {
    authenticate(&state, &headers, SignInMethod::OAuth(req)).await
}

async fn authenticate(state: &ServerState, headers: &HeaderMap, method: SignInMethod) -> Response {
    let (client_id, shared, is_new) = match client_id(headers) {
        Some(id) => match state.registry.get(&id).await {
            Some(shared) => (id, shared, false),
            None => (id, new_context(state, headers), false),
        },
        None => (uuid::Uuid::new_v4().to_string(), new_context(state, headers), true),
    };

    let mut ctx = shared.lock().await;
    ctx.set_client_info(client_info(headers));
    let result = match &method {
        SignInMethod::Password(req) => state.auth.sign_in(&mut ctx, &req.email, &req.password).await,
        SignInMethod::SignUp(req) => {
            state
                .auth
                .sign_up(&mut ctx, &req.email, &req.password, &req.display_name, req.role)
                .await
        }
        SignInMethod::OAuth(req) => {
            state
                .auth
                .sign_in_with_oauth(&mut ctx, &req.id_token, &req.provider_id)
                .await
        }
    };
    let mut cookies = ctx.cookies_mut().take_outgoing();
    drop(ctx);

    match result {
        Ok(user) => {
            state.registry.insert(client_id.clone(), shared).await;
            if is_new {
                cookies.push(client_cookie(state, &client_id));
            }
            with_cookies((StatusCode::OK, Json(json!({ "user": user }))).into_response(), cookies)
        }
        Err(e) => with_cookies(auth_error_response(&e), cookies),
    }
}

pub async fn sign_out_handler(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let id = client_id(&headers);
    let shared = match &id {
        Some(id) => state.registry.remove(id).await,
        None => None,
    };
    // Unknown clients still get their auth cookies cleared
    let shared = shared.unwrap_or_else(|| new_context(&state, &headers));

    let mut ctx = shared.lock().await;
    let result = state.auth.sign_out(&mut ctx).await;
    let cookies = ctx.cookies_mut().take_outgoing();
    drop(ctx);

    match result {
        Ok(()) => with_cookies(StatusCode::NO_CONTENT.into_response(), cookies),
        Err(e) => with_cookies(auth_error_response(&e), cookies),
    }
}

pub async fn refresh_handler(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let Some((id, shared)) = registered_context(&state, &headers).await else {
        return (StatusCode::OK, Json(json!({ "refreshed": false }))).into_response();
    };

    let mut ctx = shared.lock().await;
    let refreshed = state.auth.enforce_validity(&mut ctx).await
        && state.auth.record_activity(&mut ctx).await
        && state.auth.refresh_session(&mut ctx).await;
    let signed_in = ctx.is_signed_in();
    let cookies = ctx.cookies_mut().take_outgoing();
    drop(ctx);

    if !signed_in {
        state.registry.remove(&id).await;
    }
    with_cookies(
        (StatusCode::OK, Json(json!({ "refreshed": refreshed }))).into_response(),
        cookies,
    )
}

pub async fn session_handler(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let demo_mode = state.auth.is_demo_mode();
    let Some((id, shared)) = registered_context(&state, &headers).await else {
        let response = SessionResponse {
            user: None,
            valid: false,
            remaining_ms: 0,
            demo_mode,
        };
        return (StatusCode::OK, Json(response)).into_response();
    };

    let mut ctx = shared.lock().await;
    let valid = state.auth.enforce_validity(&mut ctx).await;
    if valid {
        state.auth.record_activity(&mut ctx).await;
    }
    let response = SessionResponse {
        user: ctx.user().cloned(),
        valid,
        remaining_ms: state.auth.session_time_remaining(&ctx).num_milliseconds(),
        demo_mode,
    };
    let cookies = ctx.cookies_mut().take_outgoing();
    drop(ctx);

    if !valid {
        state.registry.remove(&id).await;
    }
    with_cookies((StatusCode::OK, Json(response)).into_response(), cookies)
}

pub async fn profile_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(updates): Json<ProfileUpdate>,
) -> Response {
    let Some((id, shared)) = registered_context(&state, &headers).await else {
        return auth_error_response(&AuthError::NotSignedIn);
    };

    let mut ctx = shared.lock().await;
    let result = if state.auth.enforce_validity(&mut ctx).await {
        state.auth.record_activity(&mut ctx).await;
        state.auth.update_user_profile(&mut ctx, &updates).await
    } else {
        state.registry.remove(&id).await;
        Err(AuthError::NotSignedIn)
    };
    let cookies = ctx.cookies_mut().take_outgoing();
    drop(ctx);

    match result {
        Ok(user) => with_cookies((StatusCode::OK, Json(json!({ "user": user }))).into_response(), cookies),
        Err(e) => with_cookies(auth_error_response(&e), cookies),
    }
}

pub async fn study_tips_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(input): Json<StudyTipsInput>,
) -> Response {
    touch_client(&state, &headers).await;
    flow_response(generate_study_tips(state.model.as_ref(), &input).await)
}

pub async fn progress_insights_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(input): Json<ProgressInsightsInput>,
) -> Response {
    touch_client(&state, &headers).await;
    flow_response(generate_progress_insights(state.model.as_ref(), &input).await)
}

pub async fn smart_notifications_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(input): Json<SmartNotificationsInput>,
) -> Response {
    touch_client(&state, &headers).await;
    flow_response(generate_smart_notifications(state.model.as_ref(), &input).await)
}

/// Status handler (public)
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        demo_mode: state.auth.is_demo_mode(),
        active_clients: state.registry.len().await,
    })
}

fn flow_response<T: Serialize>(outcome: FlowOutcome<T>) -> Response {
    if let Some(reason) = outcome.fallback_reason() {
        debug!("Serving fallback payload: {}", reason);
    }
    let fallback = outcome.is_fallback();
    let mut response = (StatusCode::OK, Json(outcome.into_inner())).into_response();
    if fallback {
        response
            .headers_mut()
            .insert(FLOW_FALLBACK_HEADER, HeaderValue::from_static("true"));
    }
    response
}

pub fn auth_error_response(e: &AuthError) -> Response {
    let status = match e {
        _ if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
        AuthError::UnsupportedInDemoMode(_) | AuthError::InvalidRole(_) | AuthError::Provider { .. } => {
            StatusCode::BAD_REQUEST
        }
        AuthError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Auth operation failed: {}", e);
    }

    (
        status,
        Json(json!({
            "error": e.to_string(),
            "code": e.error_code()
        })),
    )
        .into_response()
}

fn with_cookies(mut response: Response, cookies: Vec<Cookie>) -> Response {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unencodable cookie {}: {}", cookie.name, e),
        }
    }
    response
}

fn client_cookie(state: &ServerState, id: &str) -> Cookie {
    Cookie::new(CLIENT_COOKIE, id, state.config.cookies.path.clone())
        .max_age(state.config.cookies.max_age_secs)
        .same_site(state.config.cookies.same_site.clone())
        .http_only()
}

fn new_context(state: &ServerState, headers: &HeaderMap) -> SharedContext {
    Arc::new(Mutex::new(state.auth.new_context(client_info(headers))))
}

async fn registered_context(state: &ServerState, headers: &HeaderMap) -> Option<(String, SharedContext)> {
    let id = client_id(headers)?;
    let shared = state.registry.get(&id).await?;
    Some((id, shared))
}

/// Count a request from a signed-in client as session activity
async fn touch_client(state: &ServerState, headers: &HeaderMap) {
    if let Some((_, shared)) = registered_context(state, headers).await {
        let mut ctx = shared.lock().await;
        if state.auth.is_session_valid(&ctx) {
            state.auth.record_activity(&mut ctx).await;
        }
    }
}

/// Read the client id from the `Cookie` header
pub fn client_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CLIENT_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    ClientInfo {
        user_agent: header_str(header::USER_AGENT.as_str()),
        ip_address: header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("user-role=student; session-id=abc-123; auth-token=x"),
        );
        assert_eq!(client_id(&headers).as_deref(), Some("abc-123"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session-id="));
        assert_eq!(client_id(&headers), None);
    }

    #[test]
    fn test_client_info_takes_first_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));

        let info = client_info(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(info.ip_address.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            auth_error_response(&AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_error_response(&AuthError::UnsupportedInDemoMode("Sign up")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            auth_error_response(&AuthError::ProviderUnavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            auth_error_response(&AuthError::Profile("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

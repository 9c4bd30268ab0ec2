use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn ok_json<T: Serialize>(data: T) -> warp::reply::Json {
    warp::reply::json(&ApiResponse::ok(data))
}

/// Runs one service call under the request deadline.
async fn bounded<T, F>(deadline: Duration, call: F) -> Result<T, warp::Rejection>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(ApiErrorCode::from).map_err(reject::custom),
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "request deadline exceeded");
            Err(reject::custom(ApiErrorCode::Timeout))
        }
    }
}

fn check_field(name: &str, value: &str, max_len: usize) -> Result<(), warp::Rejection> {
    let len = value.trim().chars().count();
    if len == 0 || len > max_len {
        return Err(reject::custom(ApiErrorCode::InvalidRequest(format!(
            "{name} must be 1 to {max_len} characters"
        ))));
    }
    Ok(())
}

pub async fn health(auth_service: Arc<dyn AuthService>) -> Result<impl warp::Reply, warp::Rejection> {
    let report = auth_service.health().await;
    let status = if report.store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(warp::reply::with_status(ok_json(report), status))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

pub async fn register(
    _meta: ClientMeta,
    request: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_field("name", &request.name, 100)?;
    check_field("email", &request.email, 100)?;
    if !request.email.contains('@') {
        return Err(reject::custom(ApiErrorCode::InvalidRequest(
            "email is malformed".to_string(),
        )));
    }
    if request.description.chars().count() > 500 {
        return Err(reject::custom(ApiErrorCode::InvalidRequest(
            "description must be at most 500 characters".to_string(),
        )));
    }

    let input = RegisterClientInput {
        name: request.name.trim().to_owned(),
        email: request.email.trim().to_owned(),
        is_active: request.is_active,
        description: request.description,
    };
    let registered = bounded(deadline, auth_service.register_client(input)).await?;

    Ok(warp::reply::with_status(
        ok_json(registered),
        StatusCode::CREATED,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub client_id: String,
    pub secret: String,
}

pub async fn login(
    meta: ClientMeta,
    request: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_field("client_id", &request.client_id, 100)?;
    check_field("secret", &request.secret, 100)?;

    let input = LoginInput {
        client_id: ClientId(request.client_id),
        secret: request.secret,
        meta,
    };
    let tokens = bounded(deadline, auth_service.login(input)).await?;
    Ok(ok_json(tokens))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    meta: ClientMeta,
    request: RefreshRequest,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_field("refresh_token", &request.refresh_token, 100)?;

    let input = RefreshInput {
        refresh_token: request.refresh_token,
        meta,
    };
    let refreshed = bounded(deadline, auth_service.refresh(input)).await?;
    Ok(ok_json(refreshed))
}

#[derive(Debug, Serialize)]
struct MeResponse {
    client_id: ClientId,
}

pub async fn me(_meta: ClientMeta, ctx: AuthContext) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(ok_json(MeResponse {
        client_id: ctx.client_id,
    }))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

pub async fn logout(
    _meta: ClientMeta,
    ctx: AuthContext,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    bounded(deadline, auth_service.logout(&ctx)).await?;
    Ok(ok_json(MessageResponse {
        message: "logged out",
    }))
}

/// Session as shown to its owner. `token` is what `DELETE /auth/sessions/<token>` takes.
#[derive(Debug, Serialize)]
struct SessionView {
    token: String,
    current: bool,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    device_type: DeviceClass,
}

impl SessionView {
    fn new(session: SessionData, current_token: &str) -> Self {
        SessionView {
            current: session.token == current_token,
            token: session.token,
            login_time: session.login_time,
            last_activity: session.last_activity,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            device_type: session.device_type,
        }
    }
}

pub async fn list_sessions(
    _meta: ClientMeta,
    ctx: AuthContext,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions = bounded(deadline, auth_service.list_sessions(&ctx.client_id)).await?;
    let views: Vec<SessionView> = sessions
        .into_iter()
        .map(|s| SessionView::new(s, &ctx.token))
        .collect();
    Ok(ok_json(views))
}

pub async fn revoke_session(
    token: String,
    _meta: ClientMeta,
    ctx: AuthContext,
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    bounded(deadline, auth_service.revoke_session(&ctx.client_id, &token)).await?;
    Ok(ok_json(MessageResponse {
        message: "session revoked",
    }))
}

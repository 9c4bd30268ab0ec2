use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::LimitClass;
use crate::server::*;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use warp::{Filter, http, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let auth_service = server.auth_service.clone();
    let limiter = server.rate_limiter.clone();
    let deadline = server.request_timeout;

    let health = warp::get()
        .and(warp::path!("health"))
        .and(with(auth_service.clone()))
        .and_then(handler::health);

    let register = warp::post()
        .and(warp::path!("auth" / "register"))
        .and(rate_limited(limiter.clone(), LimitClass::Register))
        .and(json_body())
        .and(with(auth_service.clone()))
        .and(with_deadline(deadline))
        .and_then(handler::register);

    let login = warp::post()
        .and(warp::path!("auth" / "login"))
        .and(rate_limited(limiter.clone(), LimitClass::Login))
        .and(json_body())
        .and(with(auth_service.clone()))
        .and(with_deadline(deadline))
        .and_then(handler::login);

    let refresh = warp::post()
        .and(warp::path!("auth" / "refresh"))
        .and(rate_limited(limiter.clone(), LimitClass::Api))
        .and(json_body())
        .and(with(auth_service.clone()))
        .and(with_deadline(deadline))
        .and_then(handler::refresh);

    let me = warp::get()
        .and(warp::path!("auth" / "me"))
        .and(rate_limited(limiter.clone(), LimitClass::Api))
        .and(with_auth(auth_service.clone(), deadline))
        .and_then(handler::me);

    let logout = warp::post()
        .and(warp::path!("auth" / "logout"))
        .and(rate_limited(limiter.clone(), LimitClass::Api))
        .and(with_auth(auth_service.clone(), deadline))
        .and(with(auth_service.clone()))
        .and(with_deadline(deadline))
        .and_then(handler::logout);

    let list_sessions = warp::get()
        .and(warp::path!("auth" / "sessions"))
        .and(rate_limited(limiter.clone(), LimitClass::Api))
        .and(with_auth(auth_service.clone(), deadline))
        .and(with(auth_service.clone()))
        .and(with_deadline(deadline))
        .and_then(handler::list_sessions);

    let revoke_session = warp::delete()
        .and(warp::path!("auth" / "sessions" / String))
        .and(rate_limited(limiter, LimitClass::Api))
        .and(with_auth(auth_service.clone(), deadline))
        .and(with(auth_service))
        .and(with_deadline(deadline))
        .and_then(handler::revoke_session);

    health
        .or(register)
        .or(login)
        .or(refresh)
        .or(me)
        .or(logout)
        .or(list_sessions)
        .or(revoke_session)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_deadline(deadline: Duration) -> impl Filter<Extract = (Duration,), Error = Infallible> + Clone {
    warp::any().map(move || deadline)
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Picks the caller address: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer.
pub(crate) fn client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = real_ip.map(str::trim).filter(|v| !v.is_empty());

    forwarded
        .or(real)
        .map(str::to_owned)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn with_client_meta() -> impl Filter<Extract = (ClientMeta,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .and(warp::header::optional::<String>("x-real-ip"))
        .and(warp::addr::remote())
        .and(warp::header::optional::<String>(http::header::USER_AGENT.as_str()))
        .map(
            |forwarded: Option<String>,
             real_ip: Option<String>,
             peer: Option<SocketAddr>,
             user_agent: Option<String>| ClientMeta {
                ip_address: client_ip(forwarded.as_deref(), real_ip.as_deref(), peer),
                user_agent: user_agent.unwrap_or_default(),
            },
        )
}

/// Counts the request against `class` for the caller's address, passing the
/// resolved [`ClientMeta`] on.
fn rate_limited(
    limiter: Arc<dyn RateLimiter>,
    class: LimitClass,
) -> impl Filter<Extract = (ClientMeta,), Error = warp::Rejection> + Clone {
    with_client_meta().and_then(move |meta: ClientMeta| {
        let limiter = limiter.clone();
        async move {
            limiter
                .check(class, &meta.ip_address)
                .await
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)?;
            Ok::<_, warp::Rejection>(meta)
        }
    })
}

fn with_auth(
    auth_service: Arc<dyn AuthService>,
    deadline: Duration,
) -> impl Filter<Extract = (AuthContext,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_str()).and_then(move |header: String| {
        let auth_service = auth_service.clone();
        async move {
            let Some(token) = header.strip_prefix("Bearer ") else {
                return Err(reject::custom(ApiErrorCode::InvalidToken));
            };
            match tokio::time::timeout(deadline, auth_service.authenticate(token.trim())).await {
                Ok(ctx) => ctx.map_err(ApiErrorCode::from).map_err(reject::custom),
                Err(_) => Err(reject::custom(ApiErrorCode::Timeout)),
            }
        }
    })
}

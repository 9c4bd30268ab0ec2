use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if let Some(missing) = err.find::<reject::MissingHeader>() {
        if missing.name() == warp::http::header::AUTHORIZATION.as_str() {
            ApiErrorCode::InvalidToken
        } else {
            ApiErrorCode::InvalidRequest(missing.to_string())
        }
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        ApiErrorCode::InvalidRequest(e.to_string())
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        ApiErrorCode::InvalidRequest("body too large".to_string())
    } else if err.find::<reject::LengthRequired>().is_some() {
        ApiErrorCode::InvalidRequest("content-length required".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::NotFound
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {:?}", err))
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    #[error("Invalid client id or secret")]
    InvalidCredentials,
    #[error("Client already exists")]
    ClientExists,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Session belongs to another client")]
    Forbidden,
    #[error("Rate limit exceeded. Maximum {max} requests per {window_secs}s")]
    RateLimited { max: u64, window_secs: u64 },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("Request timed out")]
    Timeout,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::TokenRevoked => StatusCode::UNAUTHORIZED,
            ApiErrorCode::ClientExists => StatusCode::CONFLICT,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::ClientExists => ApiErrorCode::ClientExists,
            AuthError::NotFoundOrExpired => ApiErrorCode::InvalidToken,
            AuthError::Revoked => ApiErrorCode::TokenRevoked,
            AuthError::Forbidden => ApiErrorCode::Forbidden,
            AuthError::RateLimited { max, window } => ApiErrorCode::RateLimited {
                max,
                window_secs: window.as_secs(),
            },
            AuthError::StoreTimeout => {
                warn!("store operation timed out");
                ApiErrorCode::Timeout
            }
            e @ (AuthError::CacheUnavailable(_) | AuthError::Store(_)) => ApiErrorCode::internal(e),
        }
    }
}

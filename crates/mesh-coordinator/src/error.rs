//! `ApiError`: maps the core `mesh_domain::Error` taxonomy onto HTTP
//! responses for the JSON gateway (spec §6: "the JSON gateway is a thin
//! façade... but core must not surface non-JSON-renderable types").
//!
//! The teacher has no generic `IntoResponse for Error` impl anywhere — every
//! gateway handler builds its own response inline. This crate's RPC surface
//! is uniform enough (every handler returns `mesh_domain::Result<T>`) that a
//! single wrapper pulls its weight; it reuses the `{"error": "..."}` body
//! shape from `auth::require_api_token`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mesh_domain::{Error, ErrorKind};

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::domain::repositories::storage_repository::StorageError;
use crate::utils::errors::CrawlError;

/// 请求级错误
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// 应用错误类型
///
/// 封装所有可能的应用层错误，统一输出 `{"error": ...}`
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<RequestError>() {
            return match e {
                RequestError::NotFound(_) => StatusCode::NOT_FOUND,
                RequestError::Invalid(_) => StatusCode::BAD_REQUEST,
            };
        }
        if self.0.downcast_ref::<ValidationErrors>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<CrawlError>() {
            Some(CrawlError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            Some(CrawlError::SessionEstablishment(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Some(CrawlError::Storage(StorageError::InvalidKey(_))) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.0.to_string();
        if status.is_server_error() {
            error!("Request failed: {}", error_message);
        }

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: AppError = RequestError::NotFound("x".into()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid: AppError = CrawlError::InvalidQuery("empty".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let browser: AppError = CrawlError::SessionEstablishment("down".into()).into();
        assert_eq!(browser.status(), StatusCode::SERVICE_UNAVAILABLE);

        let other: AppError = CrawlError::Task("boom".into()).into();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

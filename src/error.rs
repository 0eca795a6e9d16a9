// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ledger::LedgerError;
use crate::monitor::MonitorError;
use crate::ownership::VerifyError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { .. } | LedgerError::InvalidState(_) => {
                Self::unprocessable(err.to_string())
            }
            LedgerError::InvalidAmount(_) => Self::bad_request(err.to_string()),
            LedgerError::Storage(e) => Self::internal(e.to_string()),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::ChallengeExpired(_) => Self::gone(err.to_string()),
            VerifyError::SignatureInvalid => Self::unprocessable(err.to_string()),
            VerifyError::AddressAlreadyClaimed => Self::conflict(err.to_string()),
            VerifyError::NotFound(_) => Self::not_found(err.to_string()),
            VerifyError::Storage(e) => Self::internal(e.to_string()),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::UnsupportedChain(_) => Self::bad_request(err.to_string()),
            MonitorError::NotFound(_) => Self::not_found(err.to_string()),
            MonitorError::Storage(e) => Self::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal::Decimal;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unp.message, "oops");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let insufficient = ApiError::from(LedgerError::InsufficientBalance {
            asset: "SOL".to_string(),
            requested: Decimal::from(10),
            available: Decimal::from(1),
        });
        assert_eq!(insufficient.status, StatusCode::UNPROCESSABLE_ENTITY);

        let invalid = ApiError::from(LedgerError::InvalidAmount("zero".to_string()));
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn verification_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(VerifyError::ChallengeExpired("addr".to_string())).status,
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::from(VerifyError::SignatureInvalid).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(VerifyError::AddressAlreadyClaimed).status,
            StatusCode::CONFLICT
        );
    }
}

//! HTTP 错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use nmdose_core::DoseError;
use serde_json::json;
use tracing::{error, warn};

/// 包装领域错误以生成 HTTP 响应
#[derive(Debug)]
pub struct ApiError(pub DoseError);

impl From<DoseError> for ApiError {
    fn from(err: DoseError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DoseError::NotFound(_) => StatusCode::NOT_FOUND,
            DoseError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", self.0.error_code(), self.0);
        }

        let body = Json(json!({
            "ok": false,
            "status": "error",
            "code": self.0.error_code(),
            "error": self.0.to_string()
        }));

        (status, body).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn healthy() -> Self {
        Self {
            message: "healthcheck ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub id: String,
    pub string_val: String,
    pub int_val: i64,
    pub array_val: Vec<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed records served by the sample endpoint.
pub fn fixture_samples() -> Vec<Sample> {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();

    (1..=3)
        .map(|n| Sample {
            id: n.to_string(),
            string_val: format!("sample-{}", n),
            int_val: n * 100,
            array_val: vec!["alpha".to_string(), "beta".to_string()],
            email: format!("sample{}@example.com", n),
            created_at: created,
            updated_at: created,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            error_type: error_type.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

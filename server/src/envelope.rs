//! Response envelope shared by every route.
//!
//! `{ "success": bool, "data"?, "error"?: { code, message, details }, "timestamp" }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Vec<String>,
}

/// 200 OK with a data payload.
pub fn ok<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::OK, data)
}

/// 201 Created with a data payload.
pub fn created<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::CREATED, data)
}

pub fn with_status<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        error: None,
        timestamp: Utc::now(),
    };
    (status, Json(body)).into_response()
}

pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = Envelope::<()> {
        success: false,
        data: None,
        error: Some(ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
            details: Vec::new(),
        }),
        timestamp: Utc::now(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error() {
        let env = Envelope {
            success: true,
            data: Some(42),
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn error_envelope_omits_data() {
        let env = Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: "NOT_FOUND".into(),
                message: "conversation not found".into(),
                details: vec![],
            }),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }
}

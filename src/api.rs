use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgnoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Ok,
    #[default]
    Fail,
}

impl ApiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiStatus::Ok => "ok",
            ApiStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiStatus {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ok" => Ok(ApiStatus::Ok),
            "fail" => Ok(ApiStatus::Fail),
            other => Err(AgnoError::unknown_variant("api status", other)),
        }
    }
}

/// Status/message envelope returned by API endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
    #[serde(default)]
    pub message_log: Option<Vec<String>>,
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            status: ApiStatus::Fail,
            message: "invalid request".into(),
            message_log: None,
        }
    }
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Ok,
            message: message.into(),
            message_log: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Fail,
            message: message.into(),
            message_log: None,
        }
    }

    pub fn with_log(mut self, lines: Vec<String>) -> Self {
        self.message_log = Some(lines);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ApiStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_envelope_is_a_failed_request() {
        let envelope = ApiResponse::default();
        assert_eq!(envelope.status, ApiStatus::Fail);
        assert_eq!(envelope.message, "invalid request");
        assert_eq!(envelope.message_log, None);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"status": "fail", "message": "invalid request", "message_log": null})
        );
    }

    #[test]
    fn status_and_message_are_required_when_decoding() {
        assert!(serde_json::from_value::<ApiResponse>(json!({"status": "ok"})).is_err());
        assert!(serde_json::from_value::<ApiResponse>(json!({"message": "hi"})).is_err());
        let decoded: ApiResponse =
            serde_json::from_value(json!({"status": "ok", "message": "done"})).unwrap();
        assert!(decoded.is_ok());
        assert_eq!(decoded.message_log, None);
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert!("error".parse::<ApiStatus>().is_err());
        assert_eq!("ok".parse::<ApiStatus>().unwrap(), ApiStatus::Ok);
        assert!(serde_json::from_value::<ApiResponse>(
            json!({"status": "pending", "message": "x"})
        )
        .is_err());
    }

    #[test]
    fn log_lines_are_kept_in_order() {
        let envelope = ApiResponse::ok("deployed").with_log(vec!["built".into(), "pushed".into()]);
        assert_eq!(
            envelope.message_log.as_deref(),
            Some(&["built".to_string(), "pushed".to_string()][..])
        );
    }
}

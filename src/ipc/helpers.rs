use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::EngineError;
use crate::ipc::error::err;

/// A failed handler step, turned into an error response by the caller.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn db(code: &'static str, e: rusqlite::Error) -> Self {
        Self::new(code, e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        Self {
            code: e.code(),
            details: e.details(),
            message: e.to_string(),
        }
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))?;
    if value.is_empty() {
        return Err(HandlerErr::new("bad_params", format!("{} must not be empty", key)));
    }
    Ok(value)
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Deserializes `params[key]` (or all of `params` when `key` is `None`).
pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value, key: Option<&str>) -> Result<T, HandlerErr> {
    let value = match key {
        Some(k) => params
            .get(k)
            .cloned()
            .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", k)))?,
        None => params.clone(),
    };
    serde_json::from_value(value).map_err(|e| {
        HandlerErr::new("bad_params", e.to_string()).with_details(json!({ "param": key }))
    })
}

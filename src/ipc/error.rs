use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Response for a line that is not a valid request.
pub fn bad_json(id: &str, e: &serde_json::Error) -> serde_json::Value {
    err(
        id,
        "bad_json",
        e.to_string(),
        Some(json!({ "line": e.line(), "column": e.column() })),
    )
}

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

/// Reads a required, non-empty string param.
pub fn required_str(
    req_id: &str,
    params: &serde_json::Value,
    key: &str,
) -> Result<String, serde_json::Value> {
    match params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        Some(_) => Err(err(req_id, "bad_params", format!("{key} must not be empty"), None)),
        None => Err(err(req_id, "bad_params", format!("missing {key}"), None)),
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;
use crate::request::GenerationRequest;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// What was saved by a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedImage {
    pub path: String,
    pub bytes_written: u64,
    pub mime_type: Option<String>,
    pub sha256: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub fn build_receipt(
    run_id: &str,
    request: &GenerationRequest,
    endpoint: &str,
    api_request: &Value,
    api_response: &Map<String, Value>,
    model_text: &[String],
    image: &SavedImage,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("run_id".to_string(), Value::String(run_id.to_string()));
    root.insert("ts".to_string(), Value::String(now_utc_iso()));
    root.insert(
        "request".to_string(),
        serde_json::to_value(request).unwrap_or(Value::Null),
    );
    root.insert("endpoint".to_string(), Value::String(endpoint.to_string()));
    root.insert("api_request".to_string(), sanitize_payload(api_request));
    root.insert(
        "api_response".to_string(),
        sanitize_payload(&Value::Object(api_response.clone())),
    );
    root.insert(
        "model_text".to_string(),
        Value::Array(model_text.iter().cloned().map(Value::String).collect()),
    );
    root.insert(
        "image".to_string(),
        serde_json::to_value(image).unwrap_or(Value::Null),
    );
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Replaces inline base64 payloads so receipts and event logs stay small.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                if key.eq_ignore_ascii_case("data") && row.is_string() {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gemimg_contracts::models::ModelSpec;
use gemimg_contracts::request::{GenerationRequest, MAX_REFERENCE_IMAGES};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub fn to_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": BASE64.encode(&self.bytes),
            }
        })
    }
}

/// Validates every path before reading any of them.
pub fn load_references(paths: &[PathBuf]) -> Result<Vec<ReferenceImage>> {
    if paths.len() > MAX_REFERENCE_IMAGES {
        bail!(
            "Maximum {MAX_REFERENCE_IMAGES} reference images allowed (got {})",
            paths.len()
        );
    }
    if let Some(missing) = paths.iter().find(|path| !path.exists()) {
        bail!("Reference image not found: {}", missing.display());
    }

    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path)
                .with_context(|| format!("failed reading reference image {}", path.display()))?;
            Ok(ReferenceImage {
                path: path.clone(),
                mime_type: mime_for_path(path),
                bytes,
            })
        })
        .collect()
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// `generateContent` body for `request`. Image config is only sent to models
/// that accept it; the search tool only when grounding is on.
pub fn build_payload(
    request: &GenerationRequest,
    model: &ModelSpec,
    references: &[ReferenceImage],
) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    parts.extend(references.iter().map(ReferenceImage::to_part));

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        Value::Array(vec![json!({
            "role": "user",
            "parts": parts,
        })]),
    );

    let mut generation_config = Map::new();
    generation_config.insert(
        "responseModalities".to_string(),
        json!(["TEXT", "IMAGE"]),
    );
    if model.supports_image_config() {
        generation_config.insert(
            "imageConfig".to_string(),
            json!({
                "aspectRatio": request.aspect_ratio.as_str(),
                "imageSize": request.size.as_str().to_ascii_uppercase(),
            }),
        );
    }
    payload.insert(
        "generationConfig".to_string(),
        Value::Object(generation_config),
    );

    if request.grounding {
        payload.insert("tools".to_string(), json!([{ "google_search": {} }]));
    }

    Value::Object(payload)
}

/// Loads the references named by `request` and builds the body.
pub fn build_request(request: &GenerationRequest, model: &ModelSpec) -> Result<Value> {
    let references = load_references(&request.references)?;
    Ok(build_payload(request, model, &references))
}

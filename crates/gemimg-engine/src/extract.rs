use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gemimg_contracts::request::MultipleImagePolicy;
use serde_json::Value;

pub const TEXT_PREVIEW_CHARS: usize = 200;
pub const RESPONSE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Everything pulled out of one response, in items -> candidates -> parts order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Visible text parts; `thought` parts are dropped.
    pub texts: Vec<String>,
    /// First inline image, decoded.
    pub image: Option<InlineImage>,
    /// Inline image parts seen, including the ones ignored after the first.
    pub images_found: usize,
}

impl Extraction {
    /// First 200 characters of the space-joined text, if any text came back.
    pub fn text_preview(&self) -> Option<String> {
        if self.texts.is_empty() {
            return None;
        }
        Some(truncate_chars(&self.texts.join(" "), TEXT_PREVIEW_CHARS))
    }

    /// The image to save under `policy`, or the error explaining why there is none.
    pub fn require_image(
        &self,
        response: &Value,
        policy: MultipleImagePolicy,
    ) -> Result<&InlineImage> {
        let Some(image) = self.image.as_ref() else {
            bail!(
                "No image found in response\nResponse preview: {}",
                response_preview(response)
            );
        };
        if policy == MultipleImagePolicy::Error && self.images_found > 1 {
            bail!(
                "Response contained {} images; refusing to pick one (--on-multiple-images error)",
                self.images_found
            );
        }
        Ok(image)
    }
}

/// A reply is either one object or an array of chunks.
pub fn response_items(response: &Value) -> Vec<&Value> {
    match response {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

pub fn extract_response(response: &Value) -> Result<Extraction> {
    let mut out = Extraction::default();

    for item in response_items(response) {
        let candidates = item
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for part in parts {
                collect_part(part, &mut out)?;
            }
        }
    }

    Ok(out)
}

fn collect_part(part: &Value, out: &mut Extraction) -> Result<()> {
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if !is_thought(part.get("thought")) {
            out.texts.push(text.to_string());
        }
    }

    let Some(inline) = part
        .get("inlineData")
        .or_else(|| part.get("inline_data"))
    else {
        return Ok(());
    };
    let data = inline
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if data.is_empty() {
        return Ok(());
    }

    out.images_found += 1;
    if out.image.is_some() {
        return Ok(());
    }
    let bytes = BASE64
        .decode(data.trim().as_bytes())
        .context("Gemini image base64 decode failed")?;
    let mime_type = inline
        .get("mimeType")
        .or_else(|| inline.get("mime_type"))
        .and_then(Value::as_str)
        .map(str::to_string);
    out.image = Some(InlineImage { bytes, mime_type });
    Ok(())
}

/// Any flag value other than absent, `null`, `false`, zero or an empty
/// string/array/object marks the part as a thought.
fn is_thought(flag: Option<&Value>) -> bool {
    match flag {
        None | Some(Value::Null) => false,
        Some(Value::Bool(value)) => *value,
        Some(Value::Number(value)) => value.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Some(Value::String(value)) => !value.is_empty(),
        Some(Value::Array(rows)) => !rows.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Writes straight to `path`, creating the parent directory first.
pub fn write_image(path: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len() as u64)
}

/// Size of the file at `path`; absent or empty files are an error.
pub fn verify_output(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => bail!("Output file not created or is empty: {}", path.display()),
    }
}

pub fn response_preview(response: &Value) -> String {
    let raw = serde_json::to_string(response).unwrap_or_default();
    truncate_chars(&raw, RESPONSE_PREVIEW_CHARS)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use base64::Engine as _;
    use gemimg_contracts::request::MultipleImagePolicy;
    use serde_json::{json, Value};

    use super::{
        extract_response, response_items, verify_output, write_image, BASE64,
        RESPONSE_PREVIEW_CHARS,
    };

    fn image_part(bytes: &[u8]) -> Value {
        json!({ "inlineData": { "mimeType": "image/png", "data": BASE64.encode(bytes) } })
    }

    fn reply(parts: Vec<Value>) -> Value {
        json!({ "candidates": [{ "content": { "role": "model", "parts": parts } }] })
    }

    #[test]
    fn single_object_is_wrapped_as_one_item() {
        let single = json!({ "candidates": [] });
        assert_eq!(response_items(&single).len(), 1);
        let chunked = json!([{ "candidates": [] }, { "candidates": [] }]);
        assert_eq!(response_items(&chunked).len(), 2);
    }

    #[test]
    fn thought_text_is_excluded_and_visible_text_previewed() -> anyhow::Result<()> {
        let response = reply(vec![
            json!({ "text": "planning the layout", "thought": true }),
            json!({ "text": "Here is" }),
            json!({ "text": "your image." }),
            image_part(b"png"),
        ]);
        let extraction = extract_response(&response)?;
        assert_eq!(extraction.texts, vec!["Here is", "your image."]);
        assert_eq!(extraction.text_preview().as_deref(), Some("Here is your image."));
        Ok(())
    }

    #[test]
    fn non_bool_thought_flags_follow_truthiness() -> anyhow::Result<()> {
        let response = reply(vec![
            json!({ "text": "secret", "thought": "true" }),
            json!({ "text": "also hidden", "thought": 1 }),
            json!({ "text": "shown", "thought": null }),
            json!({ "text": "shown too", "thought": false }),
            json!({ "text": "and this", "thought": "" }),
        ]);
        let extraction = extract_response(&response)?;
        assert_eq!(extraction.texts, vec!["shown", "shown too", "and this"]);
        Ok(())
    }

    #[test]
    fn text_preview_is_capped_at_two_hundred_chars() -> anyhow::Result<()> {
        let long = "é".repeat(450);
        let extraction = extract_response(&reply(vec![json!({ "text": long })]))?;
        assert_eq!(
            extraction.text_preview().map(|text| text.chars().count()),
            Some(200)
        );
        Ok(())
    }

    #[test]
    fn thought_only_reply_yields_no_image_found() -> anyhow::Result<()> {
        let response = reply(vec![json!({ "text": "thinking...", "thought": true })]);
        let extraction = extract_response(&response)?;
        assert!(extraction.texts.is_empty());
        assert_eq!(extraction.text_preview(), None);

        let err = extraction
            .require_image(&response, MultipleImagePolicy::First)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(
            err.starts_with("No image found in response\nResponse preview: {"),
            "{err}"
        );
        Ok(())
    }

    #[test]
    fn response_preview_is_truncated() -> anyhow::Result<()> {
        let response = json!({ "promptFeedback": { "blockReason": "x".repeat(2000) } });
        let extraction = extract_response(&response)?;
        let err = extraction
            .require_image(&response, MultipleImagePolicy::First)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        let preview = err
            .split_once("Response preview: ")
            .map(|(_, rest)| rest)
            .unwrap_or("");
        assert_eq!(preview.chars().count(), RESPONSE_PREVIEW_CHARS);
        Ok(())
    }

    #[test]
    fn first_image_across_items_wins() -> anyhow::Result<()> {
        let response = Value::Array(vec![
            json!({ "candidates": [{ "content": { "parts": [{ "text": "chunk one" }] } }] }),
            reply(vec![image_part(b"first"), image_part(b"second")]),
            reply(vec![image_part(b"third")]),
        ]);
        let extraction = extract_response(&response)?;
        assert_eq!(extraction.images_found, 3);
        let image = extraction.require_image(&response, MultipleImagePolicy::First)?;
        assert_eq!(image.bytes, b"first".to_vec());
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
        Ok(())
    }

    #[test]
    fn error_policy_refuses_multiple_images() -> anyhow::Result<()> {
        let response = reply(vec![image_part(b"first"), image_part(b"second")]);
        let extraction = extract_response(&response)?;
        let err = extraction
            .require_image(&response, MultipleImagePolicy::Error)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("Response contained 2 images"), "{err}");

        let single = reply(vec![image_part(b"only")]);
        let extraction = extract_response(&single)?;
        assert!(extraction
            .require_image(&single, MultipleImagePolicy::Error)
            .is_ok());
        Ok(())
    }

    #[test]
    fn malformed_shapes_are_skipped() -> anyhow::Result<()> {
        let response = json!([
            "not an object",
            { "candidates": "nope" },
            { "candidates": [{ "finishReason": "SAFETY" }] },
            { "candidates": [{ "content": { "parts": [
                { "inlineData": { "data": "" } },
                { "inline_data": { "mime_type": "image/jpeg", "data": BASE64.encode(b"snake") } }
            ] } }] }
        ]);
        let extraction = extract_response(&response)?;
        assert_eq!(extraction.images_found, 1);
        let image = extraction
            .image
            .clone()
            .ok_or_else(|| anyhow::anyhow!("snake_case image part was not picked up"))?;
        assert_eq!(image.bytes, b"snake".to_vec());
        assert_eq!(image.mime_type.as_deref(), Some("image/jpeg"));
        Ok(())
    }

    #[test]
    fn undecodable_first_image_is_an_error() {
        let response = reply(vec![json!({ "inlineData": { "data": "***not base64***" } })]);
        let err = extract_response(&response)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "Gemini image base64 decode failed");
    }

    #[test]
    fn write_creates_parent_and_verify_checks_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("dir").join("out.png");
        assert!(verify_output(&path).is_err());

        assert_eq!(write_image(&path, b"\x89PNG")?, 4);
        assert_eq!(fs::read(&path)?, b"\x89PNG".to_vec());
        assert_eq!(verify_output(&path)?, 4);

        fs::write(&path, b"")?;
        let err = verify_output(&path)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("Output file not created or is empty"), "{err}");
        Ok(())
    }
}

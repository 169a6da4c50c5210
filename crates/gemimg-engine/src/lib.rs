//! Prompt-to-image generation against the Gemini `generateContent` API.
//!
//! The engine is stepwise so a driver can report progress between steps:
//! [`ImageEngine::prepare`] builds the body, [`ImageEngine::send`] performs the
//! single HTTP call, [`ImageEngine::extract`] walks the reply and
//! [`ImageEngine::save`] writes the first image.

pub mod client;
pub mod credentials;
pub mod extract;
pub mod request;

use std::path::Path;

use anyhow::Result;
use gemimg_contracts::events::{EventPayload, EventWriter, RunEvent};
use gemimg_contracts::models::{ModelRegistry, ModelSpec};
use gemimg_contracts::receipts::{build_receipt, sanitize_payload, write_receipt, SavedImage};
use gemimg_contracts::request::{GenerationRequest, MultipleImagePolicy};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub use client::GeminiClient;
pub use credentials::{KeyResolver, KeySource, ResolvedKey};
pub use extract::{Extraction, InlineImage};

/// A request body ready to send.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub model: ModelSpec,
    pub endpoint: String,
    pub payload: Value,
    pub reference_count: usize,
}

pub struct ImageEngine {
    client: GeminiClient,
    registry: ModelRegistry,
    events: EventWriter,
    policy: MultipleImagePolicy,
}

impl ImageEngine {
    pub fn new(client: GeminiClient, events: EventWriter, policy: MultipleImagePolicy) -> Self {
        Self {
            client,
            registry: ModelRegistry::default(),
            events,
            policy,
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn run_id(&self) -> &str {
        self.events.run_id()
    }

    pub fn model_spec(&self, model: &str) -> ModelSpec {
        self.registry.resolve(model)
    }

    pub fn start(&self, request: &GenerationRequest) -> Result<()> {
        self.events.emit(
            RunEvent::GenerationStarted,
            map_object(json!({
                "model": request.model,
                "aspect_ratio": request.aspect_ratio.as_str(),
                "size": request.size.as_str(),
                "grounding": request.grounding,
                "references": request.references.len(),
                "prompt_chars": request.prompt.chars().count(),
            })),
        )?;
        Ok(())
    }

    /// Validates references and builds the body. Nothing touches the network.
    pub fn prepare(&self, request: &GenerationRequest) -> Result<PreparedRequest> {
        let model = self.model_spec(&request.model);
        let references = request::load_references(&request.references)?;
        let payload = request::build_payload(request, &model, &references);
        let endpoint = self.client.endpoint_for_model(&model.name);

        self.events.emit(
            RunEvent::RequestBuilt,
            map_object(json!({
                "endpoint": endpoint,
                "image_config": model.supports_image_config(),
                "payload": sanitize_payload(&payload),
            })),
        )?;

        Ok(PreparedRequest {
            model,
            endpoint,
            payload,
            reference_count: references.len(),
        })
    }

    pub fn send(&self, api_key: &str, prepared: &PreparedRequest) -> Result<Value> {
        let response = self
            .client
            .generate_content(api_key, &prepared.model.name, &prepared.payload)?;
        self.events
            .emit(RunEvent::ResponseReceived, response_summary(&response))?;
        Ok(response)
    }

    pub fn extract(&self, response: &Value) -> Result<Extraction> {
        extract::extract_response(response)
    }

    /// Writes the image chosen under the engine's policy and checks the file landed.
    pub fn save(
        &self,
        response: &Value,
        extraction: &Extraction,
        output: &Path,
    ) -> Result<SavedImage> {
        let image = extraction.require_image(response, self.policy)?;
        extract::write_image(output, &image.bytes)?;
        let bytes_written = extract::verify_output(output)?;
        let dimensions = image::image_dimensions(output).ok();

        let saved = SavedImage {
            path: output.to_string_lossy().to_string(),
            bytes_written,
            mime_type: image.mime_type.clone(),
            sha256: hex::encode(Sha256::digest(&image.bytes)),
            width: dimensions.map(|(width, _)| width),
            height: dimensions.map(|(_, height)| height),
        };
        self.events.emit(
            RunEvent::ImageSaved,
            map_object(json!({
                "image": saved,
                "images_found": extraction.images_found,
                "texts": extraction.texts.len(),
            })),
        )?;
        Ok(saved)
    }

    pub fn write_receipt(
        &self,
        path: &Path,
        request: &GenerationRequest,
        prepared: &PreparedRequest,
        response: &Value,
        extraction: &Extraction,
        saved: &SavedImage,
    ) -> Result<()> {
        let payload = build_receipt(
            self.run_id(),
            request,
            &prepared.endpoint,
            &prepared.payload,
            &response_summary(response),
            &extraction.texts,
            saved,
        );
        write_receipt(path, &payload)
    }

    /// Records a failed run. Event log errors are swallowed so the original error surfaces.
    pub fn fail(&self, err: &anyhow::Error) {
        let _ = self.events.emit(
            RunEvent::GenerationFailed,
            map_object(json!({ "error": format!("{err:#}") })),
        );
    }
}

fn response_summary(response: &Value) -> EventPayload {
    let items = extract::response_items(response);
    let candidates = items
        .iter()
        .filter_map(|item| item.get("candidates").and_then(Value::as_array))
        .map(Vec::len)
        .sum::<usize>();
    let usage_metadata = items
        .iter()
        .rev()
        .find_map(|item| item.get("usageMetadata"))
        .cloned()
        .unwrap_or(Value::Null);
    let model_version = items
        .iter()
        .find_map(|item| item.get("modelVersion"))
        .cloned()
        .unwrap_or(Value::Null);
    map_object(json!({
        "items": items.len(),
        "candidates": candidates,
        "model_version": model_version,
        "usage_metadata": usage_metadata,
    }))
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

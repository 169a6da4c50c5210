use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    GenerationStarted,
    RequestBuilt,
    ResponseReceived,
    ImageSaved,
    GenerationFailed,
}

impl RunEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RunEvent::GenerationStarted => "generation_started",
            RunEvent::RequestBuilt => "request_built",
            RunEvent::ResponseReceived => "response_received",
            RunEvent::ImageSaved => "image_saved",
            RunEvent::GenerationFailed => "generation_failed",
        }
    }
}

/// Append-only JSONL log of one generation run.
///
/// - default fields are `type`, `run_id`, `ts`
/// - caller payload is merged last
/// - one compact JSON object per line
///
/// A writer without a path accepts events and drops them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: Option<PathBuf>,
    run_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            run_id: run_id.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            run_id: new_run_id(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: RunEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(event.as_str().to_string()));
        record.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        record.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            record.insert(key, value);
        }

        let Some(path) = self.path.as_ref() else {
            return Ok(Value::Object(record));
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(record))
    }
}

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

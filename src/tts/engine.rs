use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged segment of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single unit of work for the engine: the prompt plus decoding parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub messages: Vec<ChatTurn>,
    pub max_new_tokens: i64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub stop_strings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_audio: Option<String>,
}

/// Mono samples and their rate, exactly as the engine produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read-only facts about a constructed engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub model: String,
    pub device: String,
    pub accelerator_available: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The engine itself raised; `kind` is its own name for the failure.
    #[error("{kind}: {message}")]
    Synthesis { kind: String, message: String },

    #[error("Engine worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine worker protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    MalformedAudio(String),

    #[error("Engine is unavailable after an earlier failure")]
    Unavailable,
}

pub trait SpeechEngine: Send {
    fn describe(&self) -> EngineInfo;

    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<GenerationResult, EngineError>;
}

/// Shared handle to the one engine in the process.
///
/// The engine is not assumed to be reentrant: `synthesize` admits exactly one
/// caller at a time and everybody else waits on the mutex. `info` is captured
/// once at construction so the health check never touches the lock.
pub struct EngineHandle {
    info: EngineInfo,
    engine: Mutex<Box<dyn SpeechEngine>>,
}

impl EngineHandle {
    pub fn new<E: SpeechEngine + 'static>(engine: E) -> Self {
        Self {
            info: engine.describe(),
            engine: Mutex::new(Box::new(engine)),
        }
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<GenerationResult, EngineError> {
        // A panic mid-synthesis may have left the worker half way through a
        // frame, so a poisoned engine is not reused.
        let mut engine = self.engine.lock().map_err(|_| EngineError::Unavailable)?;
        engine.synthesize(request)
    }
}

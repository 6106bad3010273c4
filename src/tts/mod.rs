pub mod engine;
pub mod higgs;
#[cfg(test)]
pub mod stub;
pub mod wav;

use tracing::info;

use crate::error::AppError;

pub use engine::{ChatTurn, EngineError, EngineHandle, EngineInfo, SynthesisRequest};
pub use higgs::HiggsEngine;

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const DEFAULT_TOP_K: i64 = 50;
pub const DEFAULT_MAX_NEW_TOKENS: i64 = 1024;

/// Fixed system turn describing the recording conditions.
pub const SYSTEM_PROMPT: &str = "Generate audio following instruction.\n\n\
<|scene_desc_start|>\n\
Audio is recorded from a quiet room.\n\
<|scene_desc_end|>";

/// Markers that end generation.
pub const STOP_STRINGS: [&str; 2] = ["<|end_of_text|>", "<|eot_id|>"];

/// A validated generate call. Decoding parameters are passed to the engine
/// uninterpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: String,
    pub reference_audio: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub max_new_tokens: i64,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference_audio: None,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

pub fn build_messages(text: &str) -> Vec<ChatTurn> {
    vec![ChatTurn::system(SYSTEM_PROMPT), ChatTurn::user(text)]
}

pub struct TtsService {
    engine: EngineHandle,
}

impl TtsService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn engine_info(&self) -> &EngineInfo {
        self.engine.info()
    }

    /// Runs one blocking synthesis and returns the WAV bytes.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, AppError> {
        info!(
            text_len = request.text.chars().count(),
            temperature = request.temperature,
            max_new_tokens = request.max_new_tokens,
            reference_audio = request.reference_audio.as_deref().unwrap_or("-"),
            "Generating audio"
        );

        // 1. Prompt
        let synthesis = SynthesisRequest {
            messages: build_messages(&request.text),
            max_new_tokens: request.max_new_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop_strings: STOP_STRINGS.iter().map(|s| s.to_string()).collect(),
            ref_audio: request.reference_audio.clone(),
        };

        // 2. Synthesize
        let result = self.engine.synthesize(&synthesis)?;

        // 3. Encode WAV
        let wav = wav::samples_to_wav(&result.samples, result.sample_rate)?;

        info!(
            "Generated audio: {} samples, {}Hz",
            result.samples.len(),
            result.sample_rate
        );

        Ok(wav)
    }
}

//! Deterministic in-process engine used by the unit and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::engine::{
    EngineError, EngineInfo, GenerationResult, Role, SpeechEngine, SynthesisRequest,
};

/// Samples per character of user text.
pub const SAMPLES_PER_CHAR: usize = 240;

#[derive(Default)]
struct MonitorState {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_request: Mutex<Option<SynthesisRequest>>,
}

/// Observes a `StubEngine` after it has been moved into a handle.
#[derive(Clone, Default)]
pub struct StubMonitor(Arc<MonitorState>);

impl StubMonitor {
    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.0.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.0.last_request.lock().unwrap().clone()
    }
}

pub struct StubEngine {
    sample_rate: u32,
    delay: Duration,
    failure: Option<(String, String)>,
    fixed: Option<Vec<f32>>,
    monitor: StubMonitor,
}

impl StubEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            delay: Duration::ZERO,
            failure: None,
            fixed: None,
            monitor: StubMonitor::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, kind: &str, message: &str) -> Self {
        self.failure = Some((kind.to_string(), message.to_string()));
        self
    }

    pub fn returning(mut self, samples: Vec<f32>) -> Self {
        self.fixed = Some(samples);
        self
    }

    pub fn monitor(&self) -> StubMonitor {
        self.monitor.clone()
    }
}

/// The waveform the stub produces for a given user text.
pub fn expected_samples(text: &str) -> Vec<f32> {
    let seed: usize = text.bytes().map(usize::from).sum();
    (0..text.chars().count() * SAMPLES_PER_CHAR)
        .map(|i| ((seed + i) % 200) as f32 / 100.0 - 1.0)
        .collect()
}

impl SpeechEngine for StubEngine {
    fn describe(&self) -> EngineInfo {
        EngineInfo {
            model: "stub-model".to_string(),
            device: "cpu".to_string(),
            accelerator_available: false,
        }
    }

    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<GenerationResult, EngineError> {
        let state = &self.monitor.0;
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        *state.last_request.lock().unwrap() = Some(request.clone());

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let text = request
            .messages
            .iter()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();

        let outcome = match (&self.failure, &self.fixed) {
            (Some((kind, message)), _) => Err(EngineError::Synthesis {
                kind: kind.clone(),
                message: message.clone(),
            }),
            (None, Some(samples)) => Ok(GenerationResult {
                samples: samples.clone(),
                sample_rate: self.sample_rate,
            }),
            (None, None) => Ok(GenerationResult {
                samples: expected_samples(text),
                sample_rate: self.sample_rate,
            }),
        };

        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        state.calls.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

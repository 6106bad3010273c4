//! Engine backed by a long-lived Higgs Audio worker process.
//!
//! The worker loads the model once and then answers requests over its
//! stdin/stdout. Every message is a 4-byte big-endian length followed by that
//! many bytes of JSON. The first frame the worker writes is its ready report.

use std::io::{BufReader, BufWriter, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::engine::{EngineError, EngineInfo, GenerationResult, SpeechEngine, SynthesisRequest};
use crate::config::EngineConfig;

const MAX_FRAME_LEN: usize = 512 * 1024 * 1024;

/// How long a worker gets to exit after the shutdown frame before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum WorkerCommand<'a> {
    Generate(&'a SynthesisRequest),
    Shutdown,
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    accelerator_available: Option<bool>,
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl WorkerReply {
    fn into_result(mut self) -> Result<Self, EngineError> {
        match self.error.take() {
            Some(message) => Err(EngineError::Synthesis {
                kind: self.kind.take().unwrap_or_else(|| "WorkerError".to_string()),
                message,
            }),
            None => Ok(self),
        }
    }
}

pub struct HiggsEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    info: EngineInfo,
    /// Set once the stream may be out of frame alignment. A broken engine
    /// never reads from the worker again.
    broken: bool,
}

impl HiggsEngine {
    /// Start the worker and block until it reports the model as loaded.
    pub fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        info!(
            "Starting engine worker: {} {}",
            config.python,
            config.worker_script.display()
        );

        let mut child = Command::new(&config.python)
            .arg(&config.worker_script)
            .arg("--model")
            .arg(&config.model_path)
            .arg("--tokenizer")
            .arg(&config.tokenizer_path)
            .arg("--device")
            .arg(config.device.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Protocol(
                    "worker pipes were not captured".to_string(),
                ));
            }
        };

        // From here on Drop takes care of the child if the handshake fails.
        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            info: EngineInfo {
                model: config.model_path.clone(),
                device: config.device.to_string(),
                accelerator_available: false,
            },
            broken: false,
        };

        let ready: WorkerReply = read_frame(&mut engine.stdout)?;
        let ready = ready.into_result()?;

        if ready.status.as_deref() != Some("ok") {
            return Err(EngineError::Protocol(format!(
                "unexpected ready status: {:?}",
                ready.status
            )));
        }

        engine.info.device = ready
            .device
            .ok_or_else(|| EngineError::Protocol("ready frame is missing the device".into()))?;
        engine.info.accelerator_available = ready.accelerator_available.unwrap_or(false);

        info!(
            "Engine worker ready on device {} (accelerator available: {})",
            engine.info.device, engine.info.accelerator_available
        );

        Ok(engine)
    }
}

impl HiggsEngine {
    fn exchange(&mut self, request: &SynthesisRequest) -> Result<WorkerReply, EngineError> {
        write_frame(&mut self.stdin, &WorkerCommand::Generate(request))?;
        read_frame(&mut self.stdout)
    }

    fn mark_broken(&mut self, cause: &EngineError) {
        error!("Engine worker stream is unusable, stopping worker: {}", cause);
        self.broken = true;
        if let Err(e) = self.child.kill() {
            debug!("Engine worker already exited: {}", e);
        }
    }

    /// Give the worker a bounded chance to exit on its own.
    fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20))
                }
                Ok(None) => return false,
                Err(e) => {
                    warn!("Failed to poll engine worker: {}", e);
                    return false;
                }
            }
        }
    }
}

impl SpeechEngine for HiggsEngine {
    fn describe(&self) -> EngineInfo {
        self.info.clone()
    }

    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<GenerationResult, EngineError> {
        if self.broken {
            return Err(EngineError::Unavailable);
        }

        let reply = match self.exchange(request) {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, EngineError::Io(_) | EngineError::Protocol(_)) {
                    self.mark_broken(&e);
                }
                return Err(e);
            }
        };
        let reply = reply.into_result()?;

        let audio = reply
            .audio_base64
            .ok_or_else(|| EngineError::MalformedAudio("reply has no audio".into()))?;
        let sample_rate = reply
            .sample_rate
            .ok_or_else(|| EngineError::MalformedAudio("reply has no sample rate".into()))?;

        let samples = decode_samples(&audio)?;
        debug!("Worker returned {} samples at {} Hz", samples.len(), sample_rate);

        Ok(GenerationResult {
            samples,
            sample_rate,
        })
    }
}

impl Drop for HiggsEngine {
    fn drop(&mut self) {
        if !self.broken {
            match write_frame(&mut self.stdin, &WorkerCommand::Shutdown) {
                Ok(()) if self.wait_for_exit(SHUTDOWN_GRACE) => return,
                Ok(()) => warn!("Engine worker ignored shutdown, killing it"),
                Err(e) => debug!("Could not send shutdown to engine worker: {}", e),
            }
        }
        if let Err(e) = self.child.kill() {
            debug!("Engine worker already exited: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap engine worker: {}", e);
        }
    }
}

fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), EngineError> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| EngineError::Protocol(format!("failed to serialize frame: {}", e)))?;

    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, EngineError> {
    let mut length = [0u8; 4];
    reader.read_exact(&mut length)?;
    let length = u32::from_be_bytes(length) as usize;

    if length > MAX_FRAME_LEN {
        return Err(EngineError::Protocol(format!(
            "frame of {} bytes exceeds the {} byte limit",
            length, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    serde_json::from_slice(&payload).map_err(|e| {
        EngineError::Protocol(format!(
            "failed to parse frame: {} - {}",
            e,
            String::from_utf8_lossy(&payload[..payload.len().min(256)])
        ))
    })
}

/// Little-endian f32 samples, base64 encoded.
fn decode_samples(audio_base64: &str) -> Result<Vec<f32>, EngineError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(audio_base64.trim())
        .map_err(|e| EngineError::MalformedAudio(format!("invalid base64 audio: {}", e)))?;

    if bytes.len() % 4 != 0 {
        return Err(EngineError::MalformedAudio(format!(
            "audio payload of {} bytes is not a whole number of f32 samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

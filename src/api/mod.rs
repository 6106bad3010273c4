pub mod handlers;
pub mod request;
pub mod routes;

use serde::Serialize;

use crate::tts::EngineInfo;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub device: String,
    pub accelerator_available: bool,
}

impl HealthResponse {
    pub fn ok(info: &EngineInfo) -> Self {
        Self {
            status: "ok",
            model: info.model.clone(),
            device: info.device.clone(),
            accelerator_available: info.accelerator_available,
        }
    }
}

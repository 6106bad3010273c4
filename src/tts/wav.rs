use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::AppError;

/// Encode mono samples as a 32-bit float WAV.
///
/// Samples are written as-is: no gain, clamping or resampling, so decoding
/// the buffer gives back the exact values.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    if samples.is_empty() {
        return Err(AppError::Encoding("Engine returned no audio samples".into()));
    }

    if sample_rate == 0 {
        return Err(AppError::Encoding("Engine returned a zero sample rate".into()));
    }

    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(AppError::Encoding(format!(
            "Engine returned a non-finite sample at index {}",
            index
        )));
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut buffer = Vec::with_capacity(44 + samples.len() * 4);
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec)
            .map_err(|e| AppError::Encoding(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AppError::Encoding(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::Encoding(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer)
}

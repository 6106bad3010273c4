//! Turns an untrusted generate body into a `GenerationRequest`.

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::tts::{
    GenerationRequest, DEFAULT_MAX_NEW_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P,
};

pub const NO_DATA: &str = "No JSON data provided";
pub const MISSING_TEXT: &str = "Missing 'text' parameter";

pub fn parse_generation_request(body: &[u8]) -> Result<GenerationRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::InvalidRequest(NO_DATA.into()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let fields = match value {
        Value::Null => return Err(AppError::InvalidRequest(NO_DATA.into())),
        Value::Object(fields) if fields.is_empty() => {
            return Err(AppError::InvalidRequest(NO_DATA.into()))
        }
        Value::Object(fields) => fields,
        _ => {
            return Err(AppError::InvalidRequest(
                "Request body must be a JSON object".into(),
            ))
        }
    };

    let text = match field(&fields, &["text"]) {
        None => return Err(AppError::InvalidRequest(MISSING_TEXT.into())),
        Some(Value::String(text)) if text.is_empty() => {
            return Err(AppError::InvalidRequest(MISSING_TEXT.into()))
        }
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(AppError::InvalidRequest("'text' must be a string".into())),
    };

    let reference_audio = match field(&fields, &["reference_audio", "ref_audio"]) {
        None => None,
        Some(Value::String(path)) if path.is_empty() => None,
        Some(Value::String(path)) => Some(path.clone()),
        Some(_) => {
            return Err(AppError::InvalidRequest(
                "'reference_audio' must be a string".into(),
            ))
        }
    };

    Ok(GenerationRequest {
        reference_audio,
        temperature: float_field(&fields, "temperature", DEFAULT_TEMPERATURE)?,
        top_p: float_field(&fields, "top_p", DEFAULT_TOP_P)?,
        top_k: int_field(&fields, "top_k", DEFAULT_TOP_K)?,
        max_new_tokens: int_field(&fields, "max_new_tokens", DEFAULT_MAX_NEW_TOKENS)?,
        ..GenerationRequest::new(text)
    })
}

/// First present, non-null value among `names`.
fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| !value.is_null())
}

fn float_field(fields: &Map<String, Value>, name: &str, default: f64) -> Result<f64, AppError> {
    let parsed = match field(fields, &[name]) {
        None => return Ok(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| AppError::InvalidRequest(format!("'{}' must be a number", name)))
}

/// Integers, or numbers truncated toward zero, or integer strings.
fn int_field(fields: &Map<String, Value>, name: &str, default: i64) -> Result<i64, AppError> {
    let parsed = match field(fields, &[name]) {
        None => return Ok(default),
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| AppError::InvalidRequest(format!("'{}' must be an integer", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<GenerationRequest, AppError> {
        parse_generation_request(body.as_bytes())
    }

    fn rejection(body: &str) -> String {
        match parse(body) {
            Err(AppError::InvalidRequest(msg)) => msg,
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let request = parse(r#"{"text": "Hello world"}"#).unwrap();
        assert_eq!(request, GenerationRequest::new("Hello world"));
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.top_p, 0.95);
        assert_eq!(request.top_k, 50);
        assert_eq!(request.max_new_tokens, 1024);
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(rejection(""), NO_DATA);
        assert_eq!(rejection("  \n"), NO_DATA);
        assert_eq!(rejection("null"), NO_DATA);
    }

    #[test]
    fn test_empty_object_has_no_data() {
        assert_eq!(rejection("{}"), NO_DATA);
    }

    #[test]
    fn test_missing_or_empty_text() {
        assert_eq!(rejection(r#"{"temperature": 0.5}"#), MISSING_TEXT);
        assert_eq!(rejection(r#"{"text": ""}"#), MISSING_TEXT);
        assert_eq!(rejection(r#"{"text": null}"#), MISSING_TEXT);
    }

    #[test]
    fn test_non_string_text() {
        assert!(rejection(r#"{"text": 42}"#).contains("'text'"));
    }

    #[test]
    fn test_malformed_json_and_non_objects() {
        assert!(rejection("{not json").starts_with("Invalid JSON body"));
        assert!(rejection(r#"["Hello"]"#).contains("JSON object"));
    }

    #[test]
    fn test_numeric_coercion() {
        let request = parse(
            r#"{"text": "Hi", "temperature": "0.7", "top_p": 1, "top_k": 40.9, "max_new_tokens": "256"}"#,
        )
        .unwrap();
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.top_p, 1.0);
        assert_eq!(request.top_k, 40);
        assert_eq!(request.max_new_tokens, 256);
    }

    #[test]
    fn test_numeric_coercion_failure() {
        assert!(rejection(r#"{"text": "Hi", "temperature": "warm"}"#).contains("temperature"));
        assert!(rejection(r#"{"text": "Hi", "top_k": "4.5"}"#).contains("top_k"));
        assert!(rejection(r#"{"text": "Hi", "max_new_tokens": true}"#).contains("max_new_tokens"));
    }

    #[test]
    fn test_integers_beyond_i64_are_rejected() {
        assert!(rejection(r#"{"text": "Hi", "top_k": 99999999999999999999}"#).contains("top_k"));
        assert!(rejection(r#"{"text": "Hi", "max_new_tokens": -1e30}"#).contains("max_new_tokens"));
        assert!(rejection(r#"{"text": "Hi", "top_k": "99999999999999999999"}"#).contains("top_k"));
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let request =
            parse(r#"{"text": "Hi", "temperature": -2, "top_k": 0, "max_new_tokens": -5}"#).unwrap();
        assert_eq!(request.temperature, -2.0);
        assert_eq!(request.top_k, 0);
        assert_eq!(request.max_new_tokens, -5);
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let request = parse(r#"{"text": "Hi", "top_p": null}"#).unwrap();
        assert_eq!(request.top_p, DEFAULT_TOP_P);
    }

    #[test]
    fn test_reference_audio_aliases() {
        let request = parse(r#"{"text": "Hi", "reference_audio": "a.wav"}"#).unwrap();
        assert_eq!(request.reference_audio.as_deref(), Some("a.wav"));

        let request = parse(r#"{"text": "Hi", "ref_audio": "b.wav"}"#).unwrap();
        assert_eq!(request.reference_audio.as_deref(), Some("b.wav"));
    }
}

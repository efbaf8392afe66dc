//! Request validation for code execution submissions.
//!
//! Validation runs before any isolation resource exists and either produces
//! a fully-formed [`ExecutionRequest`] or a single [`ValidationError`]; it
//! never partially succeeds and has no side effects on failure. Rules apply
//! in a fixed order (payload shape, language, code type, emptiness, length)
//! and the first failing rule wins.

use serde_json::Value;

use crate::errors::ValidationError;
use crate::registry::LanguageRegistry;

/// Language assumed when the payload does not name one.
pub const DEFAULT_LANGUAGE: &str = "python";

/// A validated submission: a registry-resolvable (lower-cased) language
/// identifier and the source code exactly as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
}

/// Parse a raw request body and validate it.
///
/// The parse step is validation rule one: a body that is not JSON at all
/// maps to [`ValidationError::MalformedPayload`], same as a JSON value
/// that is not an object.
pub fn validate_raw(
    body: &[u8],
    registry: &LanguageRegistry,
    max_code_length: usize,
) -> Result<ExecutionRequest, ValidationError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::MalformedPayload)?;
    validate_payload(&payload, registry, max_code_length)
}

/// Validate an already-parsed payload.
///
/// Rules, in order: the payload must be a JSON object; `language`
/// (defaulting to [`DEFAULT_LANGUAGE`]) must resolve in the registry after
/// lower-casing; `code` must be a string (absent means empty); trimmed
/// `code` must be non-empty; `code` must not exceed `max_code_length`
/// characters. Exactly at the limit passes.
pub fn validate_payload(
    payload: &Value,
    registry: &LanguageRegistry,
    max_code_length: usize,
) -> Result<ExecutionRequest, ValidationError> {
    let object = payload
        .as_object()
        .ok_or(ValidationError::MalformedPayload)?;

    let language = match object.get("language") {
        None => DEFAULT_LANGUAGE.to_string(),
        Some(Value::String(language)) => language.to_lowercase(),
        // Non-string values are rendered as text so the error can name them.
        Some(other) => other.to_string().to_lowercase(),
    };
    if registry.resolve(&language).is_none() {
        return Err(ValidationError::unsupported_language(
            language,
            registry.supported_label(),
        ));
    }

    let code = match object.get("code") {
        None => "",
        Some(Value::String(code)) => code.as_str(),
        // A non-string `code` is rejected the same way as an empty one.
        Some(_) => return Err(ValidationError::EmptyCode),
    };
    if code.trim().is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    if code.chars().count() > max_code_length {
        return Err(ValidationError::CodeTooLong {
            limit: max_code_length,
        });
    }

    Ok(ExecutionRequest {
        language,
        code: code.to_string(),
    })
}

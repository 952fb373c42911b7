use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::store::Store;

/// Form submission request from the client.
///
/// Missing or null fields decode as empty strings so they are reported by
/// [`validate_submission`] rather than as a malformed body.
#[derive(Debug, Clone, Default)]
pub struct FormSubmissionRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// The persisted record echoed back after a successful submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub exported: u8,
}

/// Decodes a JSON request body.
///
/// Only the first JSON value in the body is read; anything after it is
/// ignored. Field names match exactly first, then case-insensitively.
pub fn parse_submission(body: &[u8]) -> Result<FormSubmissionRequest, AppError> {
    let value = serde_json::Deserializer::from_slice(body)
        .into_iter::<Value>()
        .next()
        .ok_or(AppError::InvalidBody)?
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected submission body");
            AppError::InvalidBody
        })?;

    match value {
        Value::Null => Ok(FormSubmissionRequest::default()),
        Value::Object(fields) => Ok(FormSubmissionRequest {
            first_name: string_field(&fields, "first_name")?,
            last_name: string_field(&fields, "last_name")?,
            email: string_field(&fields, "email")?,
        }),
        _ => Err(AppError::InvalidBody),
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<String, AppError> {
    let value = fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    });
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(AppError::InvalidBody),
    }
}

/// Validates a form submission. Email format is deliberately not checked.
pub fn validate_submission(req: &FormSubmissionRequest) -> Result<(), AppError> {
    if req.first_name.is_empty() || req.last_name.is_empty() || req.email.is_empty() {
        return Err(AppError::MissingFields);
    }
    Ok(())
}

/// Validates and stores one submission, returning the stored record
pub fn record_submission(
    store: &Store,
    req: FormSubmissionRequest,
) -> Result<SubmissionResponse, AppError> {
    validate_submission(&req)?;

    let id = store
        .insert(&req.first_name, &req.last_name, &req.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Insert error");
            AppError::Store(e)
        })?;

    tracing::info!(id, "Stored submission");

    Ok(SubmissionResponse {
        id,
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        exported: 0,
    })
}

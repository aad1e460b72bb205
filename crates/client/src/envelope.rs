//! The backend's `{code, message, data}` reply envelope.

use ragent_core::{AppError, AppResult};
use serde_json::Value;

/// Return `data` from a reply whose application `code` is 0.
///
/// A non-zero code becomes `AppError::Validation` with the backend message;
/// a missing `data` field yields `Value::Null`.
pub fn into_data(mut reply: Value) -> AppResult<Value> {
    let code = reply.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("backend returned code {}", code));
        return Err(AppError::Validation(message));
    }

    Ok(reply
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

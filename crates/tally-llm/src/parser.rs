//! Parse model output into extraction result fields

use crate::LlmError;
use serde_json::{Map, Value};
use tally_domain::Field;
use tracing::debug;

/// Parse one backend reply and pick out the requested fields.
///
/// Keys the model did not return, or returned as `null`, are left out so the
/// result falls back to the field default.
pub fn parse_fields(response: &str, fields: &[Field]) -> Result<Map<String, Value>, LlmError> {
    let json_str = extract_json(response)?;

    let json: Value = serde_json::from_str(&json_str)
        .map_err(|e| LlmError::InvalidResponse(format!("JSON parse error: {}", e)))?;

    let obj = json
        .as_object()
        .ok_or_else(|| LlmError::InvalidResponse("Expected JSON object".to_string()))?;

    let mut picked = Map::new();
    for field in fields {
        match obj.get(field.json_key()) {
            Some(Value::Null) | None => debug!("Model left '{}' unset", field.json_key()),
            Some(value) => {
                picked.insert(field.json_key().to_string(), value.clone());
            }
        }
    }
    Ok(picked)
}

/// Extract JSON from response, handling markdown code blocks
fn extract_json(response: &str) -> Result<String, LlmError> {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() < 2 {
            return Err(LlmError::InvalidResponse("Empty code block".to_string()));
        }

        // Skip the opening fence line and a closing fence if present
        let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
            lines.len() - 1
        } else {
            lines.len()
        };
        Ok(lines[1..end].join("\n"))
    } else {
        Ok(trimmed.to_string())
    }
}

use common::{
    error::AppError,
    storage::types::{article::ArticleSummary, stage_status::SummaryCategory},
};
use serde_json::{Map, Value};

/// Removes a leading reasoning block and surrounding markdown code fences.
fn strip_wrappers(raw: &str) -> &str {
    let mut text = raw.trim();

    if text.starts_with("<think>") {
        if let Some(end) = text.find("</think>") {
            text = text.get(end + "</think>".len()..).unwrap_or_default().trim();
        }
    }

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the fence line, including an optional language tag.
        text = rest.split_once('\n').map_or("", |(_, body)| body);
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a Value, AppError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(missing()),
        Some(Value::String(s)) if s.trim().is_empty() => Err(missing()),
        Some(value) => Ok(value),
    }
}

fn missing() -> AppError {
    AppError::LLMParsing("Summary response missing required fields".into())
}

fn string_list(object: &Map<String, Value>, field: &str) -> Result<Vec<String>, AppError> {
    match present(object, field)? {
        Value::Array(items) => Ok(items.iter().map(as_text).collect()),
        _ => Err(AppError::LLMParsing(format!("Summary field '{field}' is not an array"))),
    }
}

/// Parses and validates the summarize model output.
///
/// All five text fields must be present; array elements are coerced to strings and the sentiment
/// is kept verbatim rather than checked against a vocabulary. The category is optional and
/// anything outside [`SummaryCategory`] becomes `news`.
pub fn parse_summary_response(raw: &str) -> Result<ArticleSummary, AppError> {
    let cleaned = strip_wrappers(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| AppError::LLMParsing(format!("Failed to parse summary JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(AppError::LLMParsing("Summary response is not a JSON object".into()));
    };

    let tldr = as_text(present(&object, "tldr")?);
    let bullets = string_list(&object, "bullets")?;
    let tags = string_list(&object, "tags")?;
    let sentiment = match present(&object, "sentiment")? {
        Value::String(s) => s.trim().to_string(),
        _ => return Err(AppError::LLMParsing("Summary field 'sentiment' is not a string".into())),
    };
    present(&object, "sentiment_reasoning")?;
    let category = match object.get("category") {
        Some(Value::String(raw)) => SummaryCategory::coerce(raw),
        _ => SummaryCategory::default(),
    };

    Ok(ArticleSummary {
        tldr,
        bullets,
        tags,
        sentiment,
        category,
    })
}

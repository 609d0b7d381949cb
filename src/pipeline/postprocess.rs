//! Post-processing: turn raw model output into a validated [`LabelData`].
//!
//! JSON mode makes fenced or prefixed output rare, but not every provider
//! behind `edgequake-llm` honours `response_format`. Two cheap normalisations
//! run before parsing:
//!
//! 1. Strip a byte-order mark and surrounding whitespace
//! 2. Unwrap one outer ```` ```json ```` / ```` ``` ```` fence
//!
//! Nothing else is repaired: if the unwrapped text is not valid JSON the
//! result is [`LabelError::MalformedResponse`] and the request fails.

use crate::error::LabelError;
use crate::label::LabelData;
use once_cell::sync::Lazy;
use regex::Regex;

/// Parse and validate a model response.
pub fn parse_label_response(raw: &str) -> Result<LabelData, LabelError> {
    let body = strip_json_fences(raw.trim_start_matches('\u{FEFF}').trim());

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| LabelError::MalformedResponse {
            detail: format!("{} (response began with {:?})", e, preview(body)),
        })?;

    LabelData::from_model_json(&value).map_err(|e| LabelError::MalformedResponse {
        detail: e.to_string(),
    })
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

fn strip_json_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => input,
    }
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}

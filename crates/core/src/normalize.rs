//! Response-shape normalization for generated images.
//!
//! Workers have shipped several response layouts over time. Each known
//! layout is an [`ImageShape`]; [`extract_images`] tries them in the
//! fixed order of [`IMAGE_SHAPES`] and returns the first that yields at
//! least one image. Both backend clients go through this module so the
//! parsing rules live in one place.
//!
//! Accepted image entries:
//!
//! | Entry                                         | Result                   |
//! |-----------------------------------------------|--------------------------|
//! | `"iVBORw0..."`                                | base64                   |
//! | `"data:image/png;base64,iVBORw0..."`          | base64 (prefix stripped) |
//! | `"https://bucket/img.png"`                    | url                      |
//! | `{"filename", "type": "base64", "data"}`      | base64                   |
//! | `{"filename", "type": "s3_url", "data"}`      | url                      |
//! | `{"image": "..."}` / `{"url": "..."}`         | inferred / url           |

use serde_json::{Map, Value};

use crate::error::NormalizationError;
use crate::job::GeneratedImage;

/// A known response layout carrying an image list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageShape {
    /// `{"images": [...]}`
    ImageList,
    /// `{"job_results": {"images": [...]}}`
    JobResults,
    /// Either of the above nested under `{"output": {...}}`.
    NestedOutput,
    /// `{"message": "<base64>"}`, a single image.
    LegacyMessage,
}

/// Order in which shapes are tried.
pub const IMAGE_SHAPES: [ImageShape; 4] = [
    ImageShape::ImageList,
    ImageShape::JobResults,
    ImageShape::NestedOutput,
    ImageShape::LegacyMessage,
];

impl ImageShape {
    /// Strategy name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::ImageList => "image_list",
            Self::JobResults => "job_results",
            Self::NestedOutput => "nested_output",
            Self::LegacyMessage => "legacy_message",
        }
    }

    /// Extract images if `body` has this shape and every entry parses.
    ///
    /// Returns `None` when the shape does not apply or the list is empty.
    pub fn extract(self, body: &Value) -> Option<Vec<GeneratedImage>> {
        let images = match self {
            Self::ImageList => parse_list(body.get("images")?)?,
            Self::JobResults => parse_list(body.get("job_results")?.get("images")?)?,
            Self::NestedOutput => {
                let inner = body.get("output")?;
                Self::ImageList
                    .extract(inner)
                    .or_else(|| Self::JobResults.extract(inner))?
            }
            Self::LegacyMessage => {
                // Plain-text status messages share this key.
                let message = body.get("message")?.as_str()?;
                if message.contains(char::is_whitespace) {
                    return None;
                }
                vec![image_from_str(message)?]
            }
        };
        (!images.is_empty()).then_some(images)
    }
}

/// Try every known shape in order and return the first match.
pub fn extract_images(
    body: &Value,
) -> Result<(ImageShape, Vec<GeneratedImage>), NormalizationError> {
    for shape in IMAGE_SHAPES {
        if let Some(images) = shape.extract(body) {
            tracing::debug!(shape = shape.name(), count = images.len(), "Matched image shape");
            return Ok((shape, images));
        }
    }
    Err(NormalizationError(describe(body)))
}

/// Error text reported inside a response body, if any.
///
/// Recognizes `"error": "..."`, `"error": {"message": "..."}`, and either
/// of those nested under `"output"`.
pub fn error_message(body: &Value) -> Option<String> {
    fn direct(body: &Value) -> Option<String> {
        match body.get("error")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
    direct(body).or_else(|| body.get("output").and_then(direct))
}

/// Copy the listed top-level fields of `body` into a metadata map.
pub fn pick_metadata(body: &Value, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| body.get(*key).map(|v| ((*key).to_string(), v.clone())))
        .collect()
}

/// Every top-level field of `body` except the ones holding image data.
pub fn residual_metadata(body: &Value) -> Map<String, Value> {
    const IMAGE_KEYS: [&str; 4] = ["images", "job_results", "output", "message"];
    match body {
        Value::Object(obj) => obj
            .iter()
            .filter(|(k, _)| !IMAGE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Map::new(),
    }
}

fn parse_list(value: &Value) -> Option<Vec<GeneratedImage>> {
    value.as_array()?.iter().map(parse_image).collect()
}

fn parse_image(entry: &Value) -> Option<GeneratedImage> {
    match entry {
        Value::String(s) => image_from_str(s),
        Value::Object(obj) => {
            let filename = obj.get("filename").and_then(Value::as_str);
            let declared = obj.get("type").and_then(Value::as_str);

            let (data, from_url_key) = match ["data", "image", "base64"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
            {
                Some(data) => (data, false),
                None => (obj.get("url").and_then(Value::as_str)?, true),
            };

            let mut image = match declared {
                Some("base64") => GeneratedImage::base64(strip_data_uri(data)),
                Some("s3_url" | "url") => GeneratedImage::url(data),
                _ if from_url_key => GeneratedImage::url(data),
                _ => image_from_str(data)?,
            };
            if let Some(name) = filename {
                image = image.with_filename(name);
            }
            (!image.data.is_empty()).then_some(image)
        }
        _ => None,
    }
}

fn image_from_str(s: &str) -> Option<GeneratedImage> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with("http://") || s.starts_with("https://") {
        Some(GeneratedImage::url(s))
    } else {
        Some(GeneratedImage::base64(strip_data_uri(s)))
    }
}

fn strip_data_uri(s: &str) -> &str {
    match s.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(s, |(_, payload)| payload),
        None => s,
    }
}

/// Short description of the top-level keys, for error messages.
fn describe(body: &Value) -> String {
    match body {
        Value::Object(obj) if obj.is_empty() => "empty object".to_string(),
        Value::Object(obj) => {
            let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            format!("no image list among keys [{}]", keys.join(", "))
        }
        Value::Null => "empty body".to_string(),
        other => format!("expected an object, got {}", type_name(other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

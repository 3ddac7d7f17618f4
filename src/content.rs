// What comes back from the content collaborator is model output: maybe
// fenced, maybe malformed. One bad element rejects the whole script; a
// missing id is repaired per element. Image failures never reject anything,
// they fall back to a deterministic placeholder.

use serde_json::Value;

use crate::error::ReelError;
use crate::phrase::segment_caption;
use crate::types::{Slide, SlideId, SourceChunk, SourceLink};

/// Unwrap a single surrounding markdown code fence, language tag and all.
/// Text without a complete fence pair comes back merely trimmed.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    body.trim()
}

/// Parse the generated slide script. The script must be a JSON array where
/// every element carries string `caption` and `imagePrompt` fields; any
/// element failing that rejects the whole batch. Missing or empty ids are
/// repaired as `slide-{index}-{generation}`.
pub fn parse_slide_payload(body: &str, generation: u64) -> Result<Vec<Slide>, ReelError> {
    let cleaned = strip_code_fence(body);
    if cleaned.is_empty() {
        return Err(ReelError::NoContent);
    }

    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| ReelError::MalformedContent(format!("script is not valid JSON: {}", e)))?;
    let items = value
        .as_array()
        .ok_or_else(|| ReelError::MalformedContent("script is not a JSON array".to_string()))?;
    if items.is_empty() {
        return Err(ReelError::MalformedContent(
            "script contains no slides".to_string(),
        ));
    }

    let mut slides = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let caption = item
            .get("caption")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(index, "caption"))?;
        let image_prompt = item
            .get("imagePrompt")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(index, "imagePrompt"))?;
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(SlideId::new)
            .unwrap_or_else(|| SlideId::new(format!("slide-{}-{}", index, generation)));

        slides.push(Slide {
            id,
            caption: caption.to_string(),
            image_prompt: image_prompt.to_string(),
            image_url: None,
            phrases: segment_caption(caption),
        });
    }
    Ok(slides)
}

fn missing_field(index: usize, field: &str) -> ReelError {
    ReelError::MalformedContent(format!("slide {} has no string `{}`", index, field))
}

/// Keep only grounding chunks that can actually be rendered as a link.
pub fn collect_source_links(chunks: &[SourceChunk]) -> Vec<SourceLink> {
    chunks
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            Some(SourceLink {
                uri: web.uri.clone()?,
                title: web.title.clone()?,
            })
        })
        .collect()
}

/// Placeholder image for a slide whose generation failed, keyed by the
/// prompt so the same slide always gets the same stand-in, at reel aspect.
pub fn fallback_image_url(prompt: &str) -> String {
    format!(
        "https://picsum.photos/seed/{}/540/960",
        urlencoding::encode(prompt)
    )
}

//! Salvage a JSON object from a free-form model reply.

/// Extract the first usable JSON object from `reply`.
///
/// Fenced ```json blocks are tried first; failing that, the span from the
/// first `{` to the last `}` is parsed as a bare object. Returns `None`
/// when neither strategy yields valid JSON.
pub fn extract_json(reply: &str) -> Option<serde_json::Value> {
    if let Some(fenced) = fenced_block(reply) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Some(value);
        }
    }

    let trimmed = reply.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn fenced_block(reply: &str) -> Option<&str> {
    let after_fence = &reply[reply.find("```json")? + "```json".len()..];
    let body_start = after_fence.find(|c: char| !c.is_whitespace())?;
    let body = &after_fence[body_start..];
    let fence_end = body.find("```")?;
    Some(body[..fence_end].trim())
}

/// Pulls a structured block out of free-form model text.
///
/// Preference order: the whole payload when it is already a bare
/// object, then fenced code blocks (the first one mentioning
/// `expected_field` wins over the first block overall), then the first
/// balanced `{...}` object found by a depth scan.
pub fn extract_structured_block(raw: &str, expected_field: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let candidates = fenced_blocks(raw);
    if let Some(block) = candidates
        .iter()
        .find(|block| block.contains(expected_field))
        .or_else(|| candidates.first())
    {
        return Some(block.clone());
    }

    balanced_object(raw)
}

fn fenced_blocks(raw: &str) -> Vec<String> {
    const FENCE: &str = "```";
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find(FENCE) {
        let after_fence = &rest[start + FENCE.len()..];
        // Skip a language tag like `json` directly after the fence.
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        match after_lang.find(FENCE) {
            Some(end) => {
                let block = after_lang[..end].trim();
                if block.contains('{') || block.contains('(') {
                    blocks.push(block.to_string());
                }
                rest = &after_lang[end + FENCE.len()..];
            }
            None => break,
        }
    }
    blocks
}

fn balanced_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let rest = &raw[start..];
    let mut depth = 0i32;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[..=idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

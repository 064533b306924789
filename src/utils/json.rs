//! Extraction of structured payloads from backend completions.
//!
//! Backends frequently wrap JSON in markdown fences or prepend reasoning
//! text. Extraction tries the most reliable shapes first:
//! 1. A ```json fenced block
//! 2. Any generic fenced block that parses as JSON
//! 3. Content that itself starts with `{` or `[`
//! 4. The first balanced object or array found anywhere in the text

/// Extracts the first JSON object or array from a completion.
///
/// Returns `None` when nothing in the content parses as JSON.
pub fn extract_json(content: &str) -> Option<String> {
    let trimmed = content.trim();

    for lang in ["json", ""] {
        if let Some(block) = fenced_block(trimmed, lang) {
            let candidate = block.trim();
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    for open in ['{', '['] {
        if let Some(start) = trimmed.find(open) {
            let tail = &trimmed[start..];
            if let Some(end) = balanced_end(tail, open) {
                let candidate = &tail[..=end];
                if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    None
}

/// Extracts the contents of a fenced code block for `lang` (e.g. "js",
/// "html"), falling back to any generic fence, then to the raw content.
///
/// Used for completions expected to be source text rather than JSON.
pub fn extract_code_block(content: &str, lang: &str) -> String {
    let trimmed = content.trim();
    if let Some(block) = fenced_block(trimmed, lang) {
        return block.trim().to_string();
    }
    if let Some(block) = fenced_block(trimmed, "") {
        return block.trim().to_string();
    }
    trimmed.to_string()
}

/// Returns the body of the first ``` fence with the given language tag.
/// An empty `lang` matches any fence.
fn fenced_block(content: &str, lang: &str) -> Option<String> {
    let mut search_from = 0;
    loop {
        let open = content[search_from..].find("```")? + search_from;
        let after_ticks = &content[open + 3..];
        let line_end = after_ticks.find('\n')?;
        let tag = after_ticks[..line_end].trim();

        let body_start = open + 3 + line_end + 1;
        let body = &content[body_start..];
        let close = body.find("```")?;

        if lang.is_empty() || tag.eq_ignore_ascii_case(lang) {
            return Some(body[..close].to_string());
        }
        search_from = body_start + close + 3;
    }
}

/// Index of the character closing the balanced JSON value that starts at
/// index 0 with `open`, honoring string literals and escapes.
fn balanced_end(s: &str, open: char) -> Option<usize> {
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_json_fence() {
        let content = "Here you go:\n```json\n{\"steps\": []}\n```\nDone.";
        assert_eq!(extract_json(content).as_deref(), Some("{\"steps\": []}"));
    }

    #[test]
    fn extracts_from_generic_fence() {
        let content = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(content).as_deref(), Some("[1, 2, 3]"));
    }

    #[test]
    fn extracts_direct_object() {
        let content = "{\"a\": {\"b\": \"}\"}} trailing";
        assert_eq!(
            extract_json(content).as_deref(),
            Some("{\"a\": {\"b\": \"}\"}}")
        );
    }

    #[test]
    fn extracts_object_after_reasoning_text() {
        let content = "The plan is simple. {\"pages\": [\"index.html\"]} as requested.";
        assert_eq!(
            extract_json(content).as_deref(),
            Some("{\"pages\": [\"index.html\"]}")
        );
    }

    #[test]
    fn rejects_truncated_json() {
        assert_eq!(extract_json("{\"a\": [1, 2"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn code_block_prefers_matching_language() {
        let content = "```html\n<p>hi</p>\n```\n```js\nconsole.log(1);\n```";
        assert_eq!(extract_code_block(content, "js"), "console.log(1);");
        assert_eq!(extract_code_block(content, "html"), "<p>hi</p>");
    }

    #[test]
    fn code_block_falls_back_to_raw_content() {
        assert_eq!(extract_code_block("const x = 1;", "js"), "const x = 1;");
    }
}

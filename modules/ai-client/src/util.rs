/// Strip markdown code fences from a model reply.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Return the outermost `{ ... }` span of a reply that wraps JSON in prose.
/// Assistants without a response format often add a sentence before or after.
pub fn outermost_json_object(response: &str) -> Option<&str> {
    let stripped = strip_code_blocks(response);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    (end > start).then(|| &stripped[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn finds_json_inside_prose() {
        let reply = "Here is my rating:\n{\"score\": 3, \"explanation\": \"ok\"}\nThanks!";
        assert_eq!(
            outermost_json_object(reply),
            Some("{\"score\": 3, \"explanation\": \"ok\"}")
        );
    }

    #[test]
    fn no_json_object() {
        assert_eq!(outermost_json_object("Rating: 4"), None);
        assert_eq!(outermost_json_object("} {"), None);
    }
}

//! Locate the JSON object in a model reply

/// Extract a JSON object from a reply that may wrap it in Markdown.
///
/// Handles ```json fences, bare ``` fences, and a raw object surrounded by
/// prose.
pub fn extract_json_object(text: &str) -> Result<&str, String> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Ok(text[json_start..json_start + end].trim());
        }
    }

    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        let content_start = text[block_start..]
            .find('\n')
            .map(|i| block_start + i + 1)
            .unwrap_or(block_start);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim());
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Ok(&text[start..=end]);
        }
    }

    Err("No JSON object found in response".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_plain_fence() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_raw_object_in_prose() {
        let text = "Result: {\"name\": \"test\"} done";
        assert_eq!(extract_json_object(text).unwrap(), "{\"name\": \"test\"}");
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_object("I cannot classify this.").is_err());
        assert!(extract_json_object("} backwards {").is_err());
    }
}

/// Instructions for durability triage
pub const CLASSIFY_INSTRUCTIONS: &str = r#"You are a document triage assistant. Decide how long the document below stays useful.

CATEGORIES:
- evergreen: keeps its value indefinitely (manuals, reference material, contracts still in force, research, recipes, personal records worth keeping)
- temporal: value decays with time (event notices, newsletters, expired offers, weekly reports, meeting logistics, drafts superseded by later versions)
- unknown: not enough signal to decide

RULES:
1. Judge the content, not the file format
2. Use "unknown" rather than guessing
3. confidence is your certainty between 0.0 and 1.0
4. topics are 1-5 short keywords describing the subject

Respond with ONLY a JSON object, no prose, exactly these fields:
{"classification": "evergreen" | "temporal" | "unknown", "confidence": 0.0-1.0, "reason": "one or two sentences", "topics": ["keyword", ...]}"#;

/// Appended when the document text was shortened before sending
pub const TRUNCATION_WARNING: &str = "WARNING: the middle of this document was removed to fit the input budget. Only the beginning and end are shown; do not assume the excerpt is complete.";

/// Instructions for the optional pre-classification summary
pub const SUMMARY_INSTRUCTIONS: &str = r#"Summarise the document below so that someone can judge how long it stays useful.

Keep: what the document is, who it is for, any dates, deadlines or validity periods, and its main subject.
Drop: boilerplate, repeated headers, tables of raw numbers.

Respond with the summary only, in plain text, at most 300 words."#;

/// Build the classification prompt for one document
pub fn build_classify_prompt(filename: &str, extension: &str, text: &str, truncated: bool) -> String {
    let mut prompt = format!(
        r#"{}

FILENAME: {}
EXTENSION: {}
Truncated: {}"#,
        CLASSIFY_INSTRUCTIONS, filename, extension, truncated
    );

    if truncated {
        prompt.push('\n');
        prompt.push_str(TRUNCATION_WARNING);
    }

    prompt.push_str(&format!(
        r#"

DOCUMENT TEXT:
---
{}
---"#,
        text
    ));

    prompt
}

/// Build the summary prompt for one document
pub fn build_summary_prompt(filename: &str, text: &str) -> String {
    format!(
        r#"{}

FILENAME: {}

DOCUMENT TEXT:
---
{}
---"#,
        SUMMARY_INSTRUCTIONS, filename, text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prompt_flags_truncation() {
        let prompt = build_classify_prompt("notes.md", ".md", "body text", true);
        assert!(prompt.contains("FILENAME: notes.md"));
        assert!(prompt.contains("EXTENSION: .md"));
        assert!(prompt.contains("Truncated: true"));
        assert!(prompt.contains(TRUNCATION_WARNING));
        assert!(prompt.contains("body text"));
    }

    #[test]
    fn test_classify_prompt_untruncated() {
        let prompt = build_classify_prompt("a.txt", ".txt", "body", false);
        assert!(prompt.contains("Truncated: false"));
        assert!(!prompt.contains(TRUNCATION_WARNING));
    }

    #[test]
    fn test_summary_prompt() {
        let prompt = build_summary_prompt("report.pdf", "quarterly numbers");
        assert!(prompt.starts_with(SUMMARY_INSTRUCTIONS));
        assert!(prompt.contains("FILENAME: report.pdf"));
        assert!(prompt.contains("quarterly numbers"));
    }
}

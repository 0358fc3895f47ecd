//! Prompt context from ranked results

use campus_assist_config::constants::rag::{CONTEXT_MAX_CHARS, CONTEXT_MIN_SCORE, CONTEXT_RESULTS};
use campus_assist_core::SearchResult;

/// Guidance used when retrieval returned nothing
pub const NO_INFO_FOUND: &str =
    "No specific info found. Give general helpful advice and suggest contacting Student Support.";

/// Guidance used when every result is weak
pub const NO_RELEVANT_INFO: &str =
    "No highly relevant info found. Give general helpful advice and suggest contacting Student Support.";

/// Render the strongest results as prompt context
///
/// Each entry is `**title**\ncontent\nMore info: url`; long content is cut
/// and marked with `...`.
pub fn build_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_INFO_FOUND.to_string();
    }

    let parts: Vec<String> = results
        .iter()
        .filter(|r| r.score > CONTEXT_MIN_SCORE)
        .take(CONTEXT_RESULTS)
        .map(|r| {
            format!(
                "**{}**\n{}\nMore info: {}",
                r.document.title,
                shorten(&r.document.content),
                r.document.url
            )
        })
        .collect();

    if parts.is_empty() {
        return NO_RELEVANT_INFO.to_string();
    }
    parts.join("\n\n---\n\n")
}

fn shorten(content: &str) -> String {
    if content.chars().count() <= CONTEXT_MAX_CHARS {
        return content.to_string();
    }
    let mut short: String = content.chars().take(CONTEXT_MAX_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_assist_core::Document;

    fn result(title: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            document: Document {
                id: title.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                url: format!("https://www.example.ac.uk/{}", title.to_lowercase()),
                keywords: Vec::new(),
                category: "General".to_string(),
            },
            score,
            category: "General".to_string(),
        }
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(build_context(&[]), NO_INFO_FOUND);
    }

    #[test]
    fn test_only_weak_results() {
        assert_eq!(build_context(&[result("Weak", "x", 0.1)]), NO_RELEVANT_INFO);
    }

    #[test]
    fn test_top_two_joined() {
        let context = build_context(&[
            result("Fees", "Pay online.", 0.9),
            result("Halls", "Apply early.", 0.8),
            result("Library", "Open late.", 0.7),
        ]);
        assert_eq!(
            context,
            "**Fees**\nPay online.\nMore info: https://www.example.ac.uk/fees\
             \n\n---\n\n\
             **Halls**\nApply early.\nMore info: https://www.example.ac.uk/halls"
        );
    }

    #[test]
    fn test_long_content_truncated() {
        let long = "é".repeat(CONTEXT_MAX_CHARS + 20);
        let context = build_context(&[result("Long", &long, 0.9)]);
        let expected = format!("{}...", "é".repeat(CONTEXT_MAX_CHARS));
        assert!(context.contains(&expected));
        assert_eq!(context.matches('é').count(), CONTEXT_MAX_CHARS);
    }
}

use common::storage::types::stage_status::SummaryCategory;

/// Adjective used in the analyst persona for a region shard.
fn region_adjective(region_id: &str) -> Option<&'static str> {
    match region_id {
        "jp" => Some("Japanese"),
        "us" => Some("American"),
        "ph" => Some("Philippine"),
        "tw" => Some("Taiwanese"),
        _ => None,
    }
}

/// System prompt for the summarize stage, asking for strict JSON output.
pub fn summary_system_prompt(region_id: &str, category_id: &str) -> String {
    let persona = match region_adjective(region_id) {
        Some(adjective) => format!("a {adjective} media analyst"),
        None => "an international media analyst".to_string(),
    };
    let specialty = if category_id.is_empty() {
        String::new()
    } else {
        format!(" specializing in {category_id}")
    };

    let names: Vec<&str> = SummaryCategory::ALL.iter().map(|c| c.as_str()).collect();
    let categories = names.join("|");
    let category_list = names.join(", ");

    format!(
        r#"You are {persona}{specialty}. Given an article (which may be in any language), produce a structured JSON analysis.

IMPORTANT: ALL output must be in English. If the article is not in English, translate your analysis into English.

Respond with ONLY valid JSON in this exact format:
{{
  "tldr": "A single-sentence summary of the article in English (max 280 characters)",
  "bullets": ["Key point 1 in English", "Key point 2 in English", "Key point 3 in English"],
  "tags": ["tag1", "tag2", "tag3"],
  "sentiment": "positive|negative|neutral|mixed|bullish|bearish|restrictive|permissive",
  "sentiment_reasoning": "Brief explanation of why this sentiment was chosen, in English",
  "category": "{categories}"
}}

Rules:
- ALL fields must be in English, even if the source article is in another language
- tldr: One sentence, max 280 characters
- bullets: 3-5 key points
- tags: 2-5 lowercase tags relevant to the content
- sentiment: Must be exactly one of: positive, negative, neutral, mixed, bullish, bearish, restrictive, permissive
- sentiment_reasoning: 1-2 sentences explaining the sentiment choice
- category: Must be exactly one of: {category_list}. Choose based on the primary topic of the article."#
    )
}

pub fn summary_user_message(title: &str, content: &str) -> String {
    format!("Title: {title}\n\n{content}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_follows_region_and_category() {
        let prompt = summary_system_prompt("jp", "jp-law");
        assert!(prompt.starts_with("You are a Japanese media analyst specializing in jp-law."));
        assert!(prompt.contains("\"sentiment_reasoning\""));
        assert!(prompt.contains(
            r#""category": "politics|news|tech|government|underreported|law|economics""#
        ));

        let fallback = summary_system_prompt("de", "");
        assert!(fallback.starts_with("You are an international media analyst."));
    }
}

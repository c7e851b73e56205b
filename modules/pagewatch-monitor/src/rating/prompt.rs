use std::path::Path;

use anyhow::{Context, Result};
use pagewatch_common::file_config::RatingConfig;
use pagewatch_common::ExtractedItem;

const SCALE: &str = "\
Rate the content on a scale from 1 to 5:
1 = Not interesting (routine updates, small edits)
2 = Somewhat interesting (minor news, limited local interest)
3 = Moderately interesting (local news of normal importance)
4 = Very interesting (significant local development, affects many people)
5 = Extremely interesting (major local development, breaking news)";

const REPLY_FORMAT: &str = "\
Reply with a single JSON object and nothing else:
{\"score\": <integer 1-5>, \"explanation\": \"<2-3 sentences>\", \
\"items\": [{\"title\": \"<item title>\", \"date\": \"<date or null>\", \
\"score\": <integer 1-5>, \"excerpt\": \"<one sentence or null>\"}]}
Rate each listed item separately in \"items\"; use an empty list when none are listed.";

/// What the oracle is asked about one page.
#[derive(Debug, Clone, Copy)]
pub struct RatingInput<'a> {
    pub url: &'a str,
    pub site_name: &'a str,
    pub content: &'a str,
    pub diff_summary: &'a str,
    pub items: &'a [ExtractedItem],
}

/// System + user message pair sent to an oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    prompt_chars: usize,
    max_items: usize,
}

impl PromptBuilder {
    pub fn new(domain_focus: &str, prompt_chars: usize, max_items: usize) -> Self {
        Self {
            system: default_system_prompt(domain_focus),
            prompt_chars,
            max_items,
        }
    }

    /// Built-in prompt unless `system_prompt_path` points at a replacement.
    pub fn from_config(config: &RatingConfig) -> Result<Self> {
        let mut builder = Self::new(&config.domain_focus, config.prompt_chars, config.max_items);
        if let Some(path) = &config.system_prompt_path {
            builder.system = load_prompt(path)?;
        }
        Ok(builder)
    }

    pub fn build(&self, input: &RatingInput<'_>) -> RatingRequest {
        let content = truncate(input.content, self.prompt_chars);
        let mut user = format!(
            "Analyse the following web content from {} ({}).\n\nContent:\n{}\n",
            input.site_name, input.url, content
        );

        if !input.diff_summary.trim().is_empty() {
            user.push_str(&format!("\nRecent changes:\n{}\n", input.diff_summary));
        }

        let listed: Vec<String> = input
            .items
            .iter()
            .take(self.max_items)
            .map(|item| {
                format!(
                    "- \"{}\" ({})",
                    item.title,
                    item.date.as_deref().unwrap_or("no date")
                )
            })
            .collect();
        if !listed.is_empty() {
            user.push_str(&format!("\nItems to rate individually:\n{}\n", listed.join("\n")));
        }

        user.push('\n');
        user.push_str(REPLY_FORMAT);

        RatingRequest {
            system: self.system.clone(),
            user,
        }
    }
}

fn default_system_prompt(domain_focus: &str) -> String {
    format!(
        "You are a content analyst who evaluates changes on monitored web pages for news value, \
         relevance and impact on the audience.\n\n{SCALE}\n\nFocus: {}\n\n\
         Be strict: routine edits, opening-hour tweaks and already well-known information rate 1-2.",
        domain_focus.trim()
    )
}

fn load_prompt(path: &Path) -> Result<String> {
    let prompt = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt: {}", path.display()))?;
    if prompt.trim().is_empty() {
        anyhow::bail!("System prompt file is empty: {}", path.display());
    }
    Ok(prompt)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, date: Option<&str>) -> ExtractedItem {
        ExtractedItem {
            title: title.into(),
            date: date.map(str::to_string),
            content: String::new(),
            first_seen: None,
        }
    }

    #[test]
    fn content_is_truncated_and_items_capped() {
        let builder = PromptBuilder::new("Local news", 10, 2);
        let items = [
            item("Ett", Some("1 mars")),
            item("Två", None),
            item("Tre", None),
        ];
        let request = builder.build(&RatingInput {
            url: "https://example.se",
            site_name: "Example",
            content: "0123456789ABCDEF",
            diff_summary: "+ ny rad",
            items: &items,
        });

        assert!(request.user.contains("0123456789\n"));
        assert!(!request.user.contains("ABCDEF"));
        assert!(request.user.contains("- \"Ett\" (1 mars)"));
        assert!(request.user.contains("- \"Två\" (no date)"));
        assert!(!request.user.contains("Tre"));
        assert!(request.user.contains("Recent changes:\n+ ny rad"));
        assert!(request.system.contains("Focus: Local news"));
    }

    #[test]
    fn empty_diff_and_items_are_omitted() {
        let builder = PromptBuilder::new("x", 100, 5);
        let request = builder.build(&RatingInput {
            url: "https://example.se",
            site_name: "Example",
            content: "Hello",
            diff_summary: "",
            items: &[],
        });
        assert!(!request.user.contains("Recent changes"));
        assert!(!request.user.contains("Items to rate"));
        assert!(request.user.contains("\"score\""));
    }

    #[test]
    fn custom_prompt_file_replaces_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Custom instructions").unwrap();

        let config = RatingConfig {
            system_prompt_path: Some(path),
            ..Default::default()
        };
        let builder = PromptBuilder::from_config(&config).unwrap();
        let request = builder.build(&RatingInput {
            url: "https://a.se",
            site_name: "A",
            content: "c",
            diff_summary: "",
            items: &[],
        });
        assert_eq!(request.system, "Custom instructions");
    }
}

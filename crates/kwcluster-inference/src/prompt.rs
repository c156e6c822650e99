//! Prompt construction and reply parsing for keyword intent labelling.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use kwcluster_core::{defaults, IntentLabels};

/// Maximum number of result URLs included in a prompt.
pub const MAX_PROMPT_LINKS: usize = 10;

/// System instruction sent with every classification request.
pub const SYSTEM_INSTRUCTION: &str = r#"You label search keywords for an SEO content plan.
Reply with a single JSON object and nothing else: no preamble, no explanation,
no markdown fences. The reply starts with '{' and ends with '}'.

Shape:
{"intent": "<intent>", "type": "<page type>"}

Allowed "intent" values (one value or one hyphenated combination):
- Informational
- Navigational
- Commercial
- Transactional
- Commercial-Transactional
- Informational-Commercial

Allowed "type" values (exactly one, lowercase):
- product category
- product
- blog
- page-landing

Decide from the keyword and the pages currently ranking for it.

Examples:
{"intent": "Commercial-Transactional", "type": "product category"}
{"intent": "Informational", "type": "blog"}
{"intent": "Transactional", "type": "product"}
{"intent": "Navigational", "type": "page-landing"}"#;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("JSON object pattern is valid"));

/// User prompt: the keyword followed by its numbered result URLs.
pub fn build_prompt(keyword: &str, links: &[String]) -> String {
    let urls = links
        .iter()
        .take(MAX_PROMPT_LINKS)
        .enumerate()
        .map(|(i, link)| format!("{}. {}", i + 1, link))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Keyword: {}\nURLs:\n{}", keyword, urls)
}

/// Extract intent labels from a model reply.
///
/// The reply may wrap the object in prose or code fences; the span from the
/// first `{` to the last `}` is parsed. A missing or non-string field becomes
/// `N/A`. Returns `None` when no JSON object can be recovered.
pub fn parse_labels(reply: &str) -> Option<IntentLabels> {
    let span = JSON_OBJECT.find(reply)?;
    let value: Value = serde_json::from_str(span.as_str()).ok()?;
    let object = value.as_object()?;

    let field = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults::NOT_APPLICABLE)
            .to_string()
    };
    Some(IntentLabels::new(field("intent"), field("type")))
}

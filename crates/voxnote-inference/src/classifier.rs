//! LLM-backed transcript classifier.
//!
//! Sends the transcript plus the user's existing categories to a chat model
//! and parses the reply into a strict [`ClassificationResult`]. Anything the
//! model returns that does not fit the contract is a hard
//! `Error::Classification`; there is no partial result.

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use voxnote_core::defaults;
use voxnote_core::{
    ClassificationResult, ClassifierBackend, ClassifyRequest, Error, GenerationBackend, Result,
};

const CLASSIFY_SYSTEM_PROMPT: &str = "You file short voice notes into the user's categories. \
Reply with a single JSON object and nothing else, using exactly these keys: \
\"cleaned_transcript\" (the transcript with filler words and false starts removed), \
\"title\" (at most six words), \
\"category_name\" (an existing category name when one fits, otherwise a new short name), \
\"is_explicit_placement\" (true only when the speaker names the category, for example \"put this in Travel\"), \
\"confidence\" (number between 0 and 1), \
\"suggested_new_category\" (a short name when no existing category fits, otherwise null). \
Write the title and any new category name in the language of the locale.";

const TITLE_SYSTEM_PROMPT: &str = "Write a title of at most six words for the voice note. \
Reply with the title only, no quotes, in the language of the locale.";

/// Wire shape of the classifier reply.
///
/// Every field except `suggested_new_category` is required.
#[derive(Debug, Deserialize)]
struct RawClassification {
    cleaned_transcript: String,
    title: String,
    category_name: String,
    is_explicit_placement: bool,
    confidence: f32,
    #[serde(default)]
    suggested_new_category: Option<String>,
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap())
}

/// Extract the JSON object from a model reply.
///
/// Strips reasoning blocks and markdown code fences, then takes the span
/// from the first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let without_think = think_block().find(raw).map(|m| &raw[m.end()..]).unwrap_or(raw);
    let body = code_fence()
        .captures(without_think)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(without_think);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse a classifier reply into a typed result.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult> {
    let json = extract_json_object(raw)
        .ok_or_else(|| Error::Classification("Reply contains no JSON object".to_string()))?;

    let parsed: RawClassification = serde_json::from_str(json)
        .map_err(|e| Error::Classification(format!("Malformed classifier reply: {}", e)))?;

    let category_name = parsed.category_name.trim().to_string();
    if category_name.is_empty() {
        return Err(Error::Classification(
            "Classifier returned an empty category name".to_string(),
        ));
    }
    if !parsed.confidence.is_finite() {
        return Err(Error::Classification(
            "Classifier returned a non-numeric confidence".to_string(),
        ));
    }

    Ok(ClassificationResult {
        cleaned_transcript: parsed.cleaned_transcript.trim().to_string(),
        title: clean_title(&parsed.title),
        category_name,
        is_explicit_placement: parsed.is_explicit_placement,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        suggested_new_category: parsed
            .suggested_new_category
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// Trim quotes and whitespace and bound the length of a generated title.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim();
    trimmed.chars().take(defaults::MAX_TITLE_CHARS).collect()
}

/// Title derived from the first words of the transcript.
pub fn fallback_title(transcript: &str) -> String {
    let words: Vec<&str> = transcript.split_whitespace().take(6).collect();
    if words.is_empty() {
        defaults::FALLBACK_TITLE.to_string()
    } else {
        clean_title(&words.join(" "))
    }
}

/// Render the user prompt for a classification request.
pub fn build_classify_prompt(req: &ClassifyRequest) -> String {
    let mut prompt = format!("Locale: {}\n\nExisting categories:\n", req.locale);
    if req.categories.is_empty() {
        prompt.push_str("(none)\n");
    }
    for hint in &req.categories {
        match &hint.recent_item {
            Some(item) => {
                let _ = writeln!(prompt, "- {} (recent: {})", hint.name, item);
            }
            None => {
                let _ = writeln!(prompt, "- {}", hint.name);
            }
        }
    }
    let _ = write!(prompt, "\nTranscript:\n{}", req.transcript);
    prompt
}

/// Classifier that delegates to any [`GenerationBackend`].
pub struct LlmClassifier {
    backend: Arc<dyn GenerationBackend>,
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ClassifierBackend for LlmClassifier {
    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult> {
        let start = Instant::now();
        let prompt = build_classify_prompt(req);
        let raw = self
            .backend
            .generate_json(CLASSIFY_SYSTEM_PROMPT, &prompt)
            .await?;

        let result = parse_classification(&raw).inspect_err(|e| {
            warn!(
                subsystem = "inference",
                component = "classifier",
                op = "classify",
                response_len = raw.len(),
                error = %e,
                "Rejected classifier reply"
            );
        })?;

        debug!(
            subsystem = "inference",
            component = "classifier",
            op = "classify",
            model = self.backend.model_name(),
            category = %result.category_name,
            explicit = result.is_explicit_placement,
            confidence = result.confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            "Classified transcript"
        );
        Ok(result)
    }

    async fn generate_title(&self, transcript: &str, locale: &str) -> Result<String> {
        let prompt = format!("Locale: {}\n\nVoice note:\n{}", locale, transcript);
        let raw = self
            .backend
            .generate_with_system(TITLE_SYSTEM_PROMPT, &prompt)
            .await?;
        let title = clean_title(&raw);
        if title.is_empty() {
            Ok(fallback_title(transcript))
        } else {
            Ok(title)
        }
    }

    fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnote_core::CategoryHint;

    fn valid_reply() -> &'static str {
        r#"{
            "cleaned_transcript": "Book flights to Lisbon",
            "title": "Lisbon flights",
            "category_name": "Travel",
            "is_explicit_placement": false,
            "confidence": 0.82,
            "suggested_new_category": null
        }"#
    }

    #[test]
    fn test_parse_valid_reply() {
        let result = parse_classification(valid_reply()).unwrap();
        assert_eq!(result.category_name, "Travel");
        assert_eq!(result.title, "Lisbon flights");
        assert!(!result.is_explicit_placement);
        assert!((result.confidence - 0.82).abs() < 1e-6);
        assert!(result.suggested_new_category.is_none());
    }

    #[test]
    fn test_parse_fenced_reply_with_think_block() {
        let raw = format!(
            "<think>the user talks about a trip</think>\n```json\n{}\n```",
            valid_reply()
        );
        let result = parse_classification(&raw).unwrap();
        assert_eq!(result.category_name, "Travel");
    }

    #[test]
    fn test_parse_missing_field_is_error() {
        let raw = r#"{"title": "x", "category_name": "Work", "confidence": 0.5}"#;
        let err = parse_classification(raw).unwrap_err();
        assert!(matches!(err, Error::Classification(_)));
    }

    #[test]
    fn test_parse_no_json_is_error() {
        let err = parse_classification("I think this is about travel.").unwrap_err();
        assert!(matches!(err, Error::Classification(_)));
    }

    #[test]
    fn test_parse_blank_category_is_error() {
        let raw = r#"{"cleaned_transcript": "a", "title": "b", "category_name": "  ",
            "is_explicit_placement": false, "confidence": 0.5}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn test_parse_clamps_confidence_and_blank_suggestion() {
        let raw = r#"{"cleaned_transcript": "a", "title": "b", "category_name": "Work",
            "is_explicit_placement": true, "confidence": 1.7, "suggested_new_category": " "}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.confidence, 1.0);
        assert!(result.suggested_new_category.is_none());
        assert!(result.is_explicit_placement);
    }

    #[test]
    fn test_clean_title_strips_quotes() {
        assert_eq!(clean_title("  \"Grocery run\"\n"), "Grocery run");
        assert_eq!(clean_title("\n\n**Plan**"), "Plan");
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(
            fallback_title("remember to call the plumber about the leak tomorrow"),
            "remember to call the plumber about"
        );
        assert_eq!(fallback_title("   "), defaults::FALLBACK_TITLE);
    }

    #[test]
    fn test_prompt_lists_categories_with_recent_items() {
        let req = ClassifyRequest {
            transcript: "pack sunscreen".to_string(),
            categories: vec![
                CategoryHint {
                    name: "Travel".to_string(),
                    recent_item: Some("Lisbon flights".to_string()),
                },
                CategoryHint {
                    name: "Work".to_string(),
                    recent_item: None,
                },
            ],
            locale: "en".to_string(),
        };
        let prompt = build_classify_prompt(&req);
        assert!(prompt.contains("- Travel (recent: Lisbon flights)"));
        assert!(prompt.contains("- Work\n"));
        assert!(prompt.ends_with("pack sunscreen"));
    }

    #[test]
    fn test_prompt_without_categories() {
        let req = ClassifyRequest {
            transcript: "hello".to_string(),
            categories: vec![],
            locale: "de".to_string(),
        };
        let prompt = build_classify_prompt(&req);
        assert!(prompt.contains("(none)"));
        assert!(prompt.starts_with("Locale: de"));
    }
}

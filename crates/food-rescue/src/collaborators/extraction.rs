use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{call_with_timeout, Assisted, CollaboratorError, Offline};
use crate::workflows::rescue::domain::Urgency;

const SERVICE: &str = "text extraction";
const DEFAULT_PORTIONS: u32 = 50;

/// Structured shape of a free-text shelter request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestExtraction {
    pub portion_count: u32,
    pub urgency: Urgency,
    pub dietary_preferences: Vec<String>,
    pub timeframe: String,
    pub additional_notes: String,
}

#[async_trait]
pub trait RequestExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        shelter_name: Option<&str>,
    ) -> Result<Value, CollaboratorError>;
}

#[async_trait]
impl RequestExtractor for Offline {
    async fn extract(
        &self,
        _text: &str,
        _shelter_name: Option<&str>,
    ) -> Result<Value, CollaboratorError> {
        Err(Offline::unavailable(SERVICE))
    }
}

fn quantity_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\s*(people|persons?|individuals?|portions?|meals?)").ok())
        .as_ref()
}

const DIETARY_KEYWORDS: &[(&[&str], &str)] = &[
    (&["vegetarian", "veggie"], "vegetarian"),
    (&["vegan"], "vegan"),
    (&["gluten-free", "gluten free"], "gluten-free"),
    (&["nut-free", "nut free"], "nut-free"),
    (&["halal"], "halal"),
    (&["kosher"], "kosher"),
    (&["dairy-free", "dairy free"], "dairy-free"),
];

fn heuristic_urgency(lowered: &str) -> Urgency {
    let any = |words: &[&str]| words.iter().any(|word| lowered.contains(word));
    if any(&["emergency", "critical"]) {
        Urgency::Critical
    } else if any(&["urgent", "asap", "immediately", "tonight"]) {
        Urgency::High
    } else if any(&["tomorrow", "next week", "planning"]) {
        Urgency::Low
    } else {
        Urgency::Medium
    }
}

fn heuristic_timeframe(lowered: &str) -> &'static str {
    if lowered.contains("tonight") || lowered.contains("evening") {
        "tonight"
    } else if lowered.contains("tomorrow") {
        "tomorrow"
    } else if lowered.contains("lunch") {
        "lunch"
    } else if lowered.contains("dinner") {
        "dinner"
    } else if lowered.contains("breakfast") {
        "breakfast"
    } else {
        "today"
    }
}

/// Keyword-based reading of a request; never fails.
pub fn heuristic(text: &str) -> RequestExtraction {
    let lowered = text.to_lowercase();

    let portion_count = quantity_pattern()
        .and_then(|pattern| pattern.captures(&lowered))
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
        .filter(|count| *count > 0)
        .unwrap_or(DEFAULT_PORTIONS);

    let dietary_preferences = DIETARY_KEYWORDS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(_, tag)| (*tag).to_string())
        .collect();

    RequestExtraction {
        portion_count,
        urgency: heuristic_urgency(&lowered),
        dietary_preferences,
        timeframe: heuristic_timeframe(&lowered).to_string(),
        additional_notes: text.trim().to_string(),
    }
}

impl RequestExtraction {
    /// Coerce collaborator JSON, substituting heuristic values for anything
    /// missing, non-positive, or unrecognised.
    pub fn from_value(value: &Value, text: &str) -> Result<Self, CollaboratorError> {
        let object = value.as_object().ok_or_else(|| CollaboratorError::Malformed {
            service: SERVICE,
            reason: "expected a JSON object".to_string(),
        })?;
        let field = |camel: &str, snake: &str| object.get(camel).or_else(|| object.get(snake));
        let guess = heuristic(text);

        let portion_count = field("portionCount", "portion_count")
            .and_then(|count| match count {
                Value::Number(number) => number.as_u64(),
                Value::String(raw) => raw.trim().parse::<u64>().ok(),
                _ => None,
            })
            .and_then(|count| u32::try_from(count).ok())
            .filter(|count| *count > 0)
            .unwrap_or(guess.portion_count);

        let urgency = field("urgency", "urgency")
            .and_then(Value::as_str)
            .and_then(Urgency::parse)
            .unwrap_or(guess.urgency);

        let dietary_preferences = match field("dietaryPreferences", "dietary_preferences") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => guess.dietary_preferences,
        };

        let text_or = |camel: &str, snake: &str, fallback: String| {
            field(camel, snake)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|raw| !raw.is_empty())
                .map(str::to_string)
                .unwrap_or(fallback)
        };

        Ok(Self {
            portion_count,
            urgency,
            dietary_preferences,
            timeframe: text_or("timeframe", "timeframe", guess.timeframe),
            additional_notes: text_or("additionalNotes", "additional_notes", guess.additional_notes),
        })
    }
}

/// Extract a structured request, falling back to [`heuristic`] on any failure.
pub async fn extract_or_heuristic(
    extractor: &dyn RequestExtractor,
    text: &str,
    shelter_name: Option<&str>,
    timeout: Duration,
) -> Assisted<RequestExtraction> {
    let outcome = call_with_timeout(SERVICE, timeout, extractor.extract(text, shelter_name))
        .await
        .and_then(|value| RequestExtraction::from_value(&value, text));

    match outcome {
        Ok(extraction) => Assisted::live(extraction),
        Err(err) => {
            warn!(error = %err, "request extraction failed; using keyword heuristic");
            Assisted::fallback(heuristic(text))
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{call_with_timeout, Assisted, CollaboratorError, Offline};
use crate::workflows::rescue::domain::NutritionInfo;

const SERVICE: &str = "vision analysis";

/// Photo of a donation plus an optional hint from the kitchen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisRequest {
    pub image_base64: String,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Structured description of pictured food, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysis {
    pub description: String,
    pub nutrition: NutritionInfo,
    pub dietary_tags: Vec<String>,
    pub allergens: Vec<String>,
    pub suggested_food_types: Vec<String>,
}

/// Turns an image into loosely-typed analysis JSON.
#[async_trait]
pub trait FoodImageAnalyzer: Send + Sync {
    async fn analyze(&self, request: &ImageAnalysisRequest) -> Result<Value, CollaboratorError>;
}

#[async_trait]
impl FoodImageAnalyzer for Offline {
    async fn analyze(&self, _request: &ImageAnalysisRequest) -> Result<Value, CollaboratorError> {
        Err(Offline::unavailable(SERVICE))
    }
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

fn list_field(value: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| field.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl FoodAnalysis {
    /// Content-independent stand-in used whenever analysis is unavailable.
    pub fn fallback() -> Self {
        Self {
            description: "Assorted prepared food (photo analysis unavailable)".to_string(),
            nutrition: NutritionInfo {
                calories: "unknown".to_string(),
                protein: "unknown".to_string(),
                carbohydrates: "unknown".to_string(),
                fat: "unknown".to_string(),
            },
            dietary_tags: Vec::new(),
            allergens: vec!["unknown".to_string()],
            suggested_food_types: vec!["mixed".to_string()],
        }
    }

    /// Coerce collaborator JSON into the fixed schema. Wrong-typed optional
    /// fields become defaults; a missing description rejects the payload.
    pub fn from_value(value: &Value) -> Result<Self, CollaboratorError> {
        if !value.is_object() {
            return Err(CollaboratorError::Malformed {
                service: SERVICE,
                reason: "expected a JSON object".to_string(),
            });
        }

        let description =
            text_field(value, &["description"]).ok_or_else(|| CollaboratorError::Malformed {
                service: SERVICE,
                reason: "missing description".to_string(),
            })?;

        let nutrition_value = value
            .get("nutritionInfo")
            .or_else(|| value.get("nutrition_info"))
            .or_else(|| value.get("nutrition"))
            .cloned()
            .unwrap_or(Value::Null);
        let nutrient = |keys: &[&str]| {
            text_field(&nutrition_value, keys).unwrap_or_else(|| "unknown".to_string())
        };

        Ok(Self {
            description,
            nutrition: NutritionInfo {
                calories: nutrient(&["calories"]),
                protein: nutrient(&["protein"]),
                carbohydrates: nutrient(&["carbohydrates", "carbs"]),
                fat: nutrient(&["fat"]),
            },
            dietary_tags: list_field(value, &["dietaryTags", "dietary_tags"]),
            allergens: list_field(value, &["allergens"]),
            suggested_food_types: list_field(value, &["suggestedFoodTypes", "suggested_food_types"]),
        })
    }
}

/// Analyze a donation photo, substituting [`FoodAnalysis::fallback`] on any failure.
pub async fn analyze_or_default(
    analyzer: &dyn FoodImageAnalyzer,
    request: &ImageAnalysisRequest,
    timeout: Duration,
) -> Assisted<FoodAnalysis> {
    let outcome = call_with_timeout(SERVICE, timeout, analyzer.analyze(request))
        .await
        .and_then(|value| FoodAnalysis::from_value(&value));

    match outcome {
        Ok(analysis) => Assisted::live(analysis),
        Err(err) => {
            warn!(error = %err, "food image analysis failed; using default analysis");
            Assisted::fallback(FoodAnalysis::fallback())
        }
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::domain::{
    Address, Donation, DonationId, DonationStatus, PortionLedger, ShelterRequest,
    ShelterRequestId, ShelterRequestStatus, Urgency, VehicleClass, Volunteer, VolunteerId,
    VolunteerStatus,
};
use crate::collaborators::{FoodAnalysis, ImageAnalysisRequest, RequestExtraction};

/// Values collaborators and forms use to mean "nothing here".
const PLACEHOLDER_TAGS: &[&str] = &[
    "none",
    "none detected",
    "no specific preferences",
    "no preference",
    "n/a",
    "na",
    "-",
];

const DEFAULT_MAX_PORTIONS: u32 = 10_000;

/// Validation errors raised while turning submissions into entities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must be at least 1 (found {found})")]
    NotPositive { field: &'static str, found: u32 },
    #[error("{field} exceeds the intake limit of {max} (found {found})")]
    TooLarge {
        field: &'static str,
        max: u32,
        found: u32,
    },
    #[error("{field} must be in the future")]
    NotInFuture { field: &'static str },
    #[error("max distance must be a positive number of miles (found {0})")]
    InvalidDistance(f64),
    #[error("volunteer must be available on at least one day")]
    NoAvailableDays,
}

/// Kitchen-facing donation form. An image may stand in for the description
/// and tags; explicit fields win over analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationSubmission {
    pub kitchen_name: String,
    pub pickup: Address,
    #[serde(default)]
    pub description: Option<String>,
    pub portions: u32,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub image_hint: Option<String>,
}

impl DonationSubmission {
    pub fn image_request(&self) -> Option<ImageAnalysisRequest> {
        self.image_base64
            .as_ref()
            .filter(|image| !image.trim().is_empty())
            .map(|image| ImageAnalysisRequest {
                image_base64: image.clone(),
                hint: self.image_hint.clone(),
            })
    }
}

/// Shelter-facing request form. Free text may stand in for the structured
/// fields; explicit fields win over extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelterRequestSubmission {
    pub shelter_name: String,
    pub dropoff: Address,
    #[serde(default)]
    pub portions: Option<u32>,
    /// `Some(vec![])` states "no preference" and overrides extraction.
    #[serde(default)]
    pub dietary_preferences: Option<Vec<String>>,
    #[serde(default)]
    pub prohibited_allergens: Option<Vec<String>>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub request_text: Option<String>,
}

impl ShelterRequestSubmission {
    pub fn free_text(&self) -> Option<&str> {
        self.request_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerSubmission {
    pub name: String,
    pub contact: String,
    pub vehicle: VehicleClass,
    pub max_distance_miles: f64,
    pub max_deliveries_per_week: u32,
    pub available_days: Vec<Weekday>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Trim, lower-case, de-duplicate, and drop placeholder values.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty() && !PLACEHOLDER_TAGS.contains(&tag.as_str()))
        .collect()
}

fn required_text(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Blank(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn address(raw: Address, field: &'static str) -> Result<Address, ValidationError> {
    Ok(Address {
        line: required_text(&raw.line, field)?,
        location: raw.location,
    })
}

/// Guard responsible for producing registry-ready entities from submissions.
#[derive(Debug, Clone)]
pub struct IntakeGuard {
    max_portions: u32,
}

impl Default for IntakeGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PORTIONS)
    }
}

impl IntakeGuard {
    pub fn new(max_portions: u32) -> Self {
        Self {
            max_portions: if max_portions == 0 {
                DEFAULT_MAX_PORTIONS
            } else {
                max_portions
            },
        }
    }

    fn portions(&self, field: &'static str, found: u32) -> Result<u32, ValidationError> {
        if found == 0 {
            return Err(ValidationError::NotPositive { field, found });
        }
        if found > self.max_portions {
            return Err(ValidationError::TooLarge {
                field,
                max: self.max_portions,
                found,
            });
        }
        Ok(found)
    }

    pub fn donation_from_submission(
        &self,
        submission: DonationSubmission,
        analysis: Option<&FoodAnalysis>,
        now: DateTime<Utc>,
    ) -> Result<Donation, ValidationError> {
        let kitchen_name = required_text(&submission.kitchen_name, "kitchen name")?;
        let pickup = address(submission.pickup, "pickup address")?;
        let portions = self.portions("portions", submission.portions)?;
        if submission.expires_at <= now {
            return Err(ValidationError::NotInFuture {
                field: "expiry time",
            });
        }

        let description = optional_text(submission.description.as_deref())
            .or_else(|| analysis.map(|analysis| analysis.description.clone()))
            .ok_or(ValidationError::Missing("description"))?;

        let dietary_tags = if submission.dietary_tags.is_empty() {
            normalize_tags(analysis.map(|a| a.dietary_tags.as_slice()).unwrap_or_default())
        } else {
            normalize_tags(&submission.dietary_tags)
        };
        let allergens = if submission.allergens.is_empty() {
            normalize_tags(analysis.map(|a| a.allergens.as_slice()).unwrap_or_default())
        } else {
            normalize_tags(&submission.allergens)
        };

        Ok(Donation {
            id: DonationId("pending".to_string()),
            kitchen_name,
            pickup,
            description,
            portions: PortionLedger::new(portions),
            dietary_tags,
            allergens,
            nutrition: analysis.map(|analysis| analysis.nutrition.clone()),
            created_at: now,
            expires_at: submission.expires_at,
            status: DonationStatus::Open,
        })
    }

    pub fn shelter_request_from_submission(
        &self,
        submission: ShelterRequestSubmission,
        extraction: Option<&RequestExtraction>,
        now: DateTime<Utc>,
    ) -> Result<ShelterRequest, ValidationError> {
        let shelter_name = required_text(&submission.shelter_name, "shelter name")?;
        let dropoff = address(submission.dropoff, "dropoff address")?;
        if submission.deadline <= now {
            return Err(ValidationError::NotInFuture { field: "deadline" });
        }

        let requested = submission
            .portions
            .or_else(|| extraction.map(|extraction| extraction.portion_count))
            .ok_or(ValidationError::Missing("portions"))?;
        let portions = self.portions("portions", requested)?;

        let dietary_preferences = match (&submission.dietary_preferences, extraction) {
            (Some(explicit), _) => normalize_tags(explicit),
            (None, Some(extraction)) => normalize_tags(&extraction.dietary_preferences),
            (None, None) => BTreeSet::new(),
        };

        let urgency = submission
            .urgency
            .or_else(|| extraction.map(|extraction| extraction.urgency))
            .unwrap_or(Urgency::Medium);

        let timeframe = optional_text(submission.timeframe.as_deref()).or_else(|| {
            extraction.and_then(|extraction| optional_text(Some(extraction.timeframe.as_str())))
        });
        let notes = optional_text(submission.notes.as_deref()).or_else(|| {
            extraction.and_then(|extraction| optional_text(Some(extraction.additional_notes.as_str())))
        });

        Ok(ShelterRequest {
            id: ShelterRequestId("pending".to_string()),
            shelter_name,
            dropoff,
            portions: PortionLedger::new(portions),
            dietary_preferences,
            prohibited_allergens: submission.prohibited_allergens.map(normalize_tags),
            urgency,
            timeframe,
            notes,
            created_at: now,
            deadline: submission.deadline,
            status: ShelterRequestStatus::Open,
        })
    }

    pub fn volunteer_from_submission(
        &self,
        submission: VolunteerSubmission,
        now: DateTime<Utc>,
    ) -> Result<Volunteer, ValidationError> {
        let name = required_text(&submission.name, "volunteer name")?;
        let contact = required_text(&submission.contact, "contact")?;

        if !submission.max_distance_miles.is_finite() || submission.max_distance_miles <= 0.0 {
            return Err(ValidationError::InvalidDistance(
                submission.max_distance_miles,
            ));
        }
        if submission.max_deliveries_per_week == 0 {
            return Err(ValidationError::NotPositive {
                field: "max deliveries per week",
                found: 0,
            });
        }

        let mut available_days = Vec::new();
        for day in submission.available_days {
            if !available_days.contains(&day) {
                available_days.push(day);
            }
        }
        if available_days.is_empty() {
            return Err(ValidationError::NoAvailableDays);
        }
        available_days.sort_by_key(|day| day.num_days_from_monday());

        Ok(Volunteer {
            id: VolunteerId("pending".to_string()),
            name,
            contact,
            vehicle: submission.vehicle,
            max_distance_miles: submission.max_distance_miles,
            max_deliveries_per_week: submission.max_deliveries_per_week,
            available_days,
            committed_deliveries: 0,
            completed_in_window: 0,
            window_start: now,
            created_at: now,
            status: if submission.active {
                VolunteerStatus::Active
            } else {
                VolunteerStatus::Inactive
            },
        })
    }
}

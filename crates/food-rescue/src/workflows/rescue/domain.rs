use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier for a kitchen's food donation.
    DonationId
);
entity_id!(
    /// Identifier for a shelter's request for food.
    ShelterRequestId
);
entity_id!(
    /// Identifier for a registered courier.
    VolunteerId
);
entity_id!(
    /// Identifier for a donation/shelter/volunteer allocation.
    MatchId
);

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Street address with optional pre-geocoded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl Address {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            location: None,
        }
    }

    pub fn at(line: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            line: line.into(),
            location: Some(GeoPoint {
                latitude,
                longitude,
            }),
        }
    }
}

/// Total versus still-unallocated portions for one side of a match.
///
/// `remaining` never exceeds `total` and never underflows; every mutation
/// goes through [`PortionLedger::take`] or [`PortionLedger::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortionLedger {
    total: u32,
    remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PortionError {
    #[error("requested {requested} portions but only {remaining} remain")]
    Insufficient { requested: u32, remaining: u32 },
    #[error("returning {returned} portions would exceed the total of {total}")]
    Overflow { returned: u32, total: u32 },
}

impl PortionLedger {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            remaining: total,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn allocated(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn is_untouched(&self) -> bool {
        self.remaining == self.total
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn take(&mut self, portions: u32) -> Result<(), PortionError> {
        if portions > self.remaining {
            return Err(PortionError::Insufficient {
                requested: portions,
                remaining: self.remaining,
            });
        }
        self.remaining -= portions;
        Ok(())
    }

    pub fn restore(&mut self, portions: u32) -> Result<(), PortionError> {
        match self.remaining.checked_add(portions) {
            Some(next) if next <= self.total => {
                self.remaining = next;
                Ok(())
            }
            _ => Err(PortionError::Overflow {
                returned: portions,
                total: self.total,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Open,
    PartiallyMatched,
    FullyMatched,
    Expired,
    Withdrawn,
}

impl DonationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DonationStatus::Open => "open",
            DonationStatus::PartiallyMatched => "partially_matched",
            DonationStatus::FullyMatched => "fully_matched",
            DonationStatus::Expired => "expired",
            DonationStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DonationStatus::Expired | DonationStatus::Withdrawn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShelterRequestStatus {
    Open,
    PartiallyFulfilled,
    Fulfilled,
    Expired,
    Withdrawn,
}

impl ShelterRequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ShelterRequestStatus::Open => "open",
            ShelterRequestStatus::PartiallyFulfilled => "partially_fulfilled",
            ShelterRequestStatus::Fulfilled => "fulfilled",
            ShelterRequestStatus::Expired => "expired",
            ShelterRequestStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ShelterRequestStatus::Expired | ShelterRequestStatus::Withdrawn
        )
    }
}

/// How pressing a shelter's need is; ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub const fn label(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "medium" | "normal" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Bicycle,
    Car,
    Suv,
    Van,
    Truck,
}

impl VehicleClass {
    pub const fn label(self) -> &'static str {
        match self {
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::Car => "car",
            VehicleClass::Suv => "SUV",
            VehicleClass::Van => "van",
            VehicleClass::Truck => "truck",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bicycle" | "bike" | "cargo bike" => Some(VehicleClass::Bicycle),
            "car" | "sedan" => Some(VehicleClass::Car),
            "suv" => Some(VehicleClass::Suv),
            "van" | "minivan" => Some(VehicleClass::Van),
            "truck" | "pickup" => Some(VehicleClass::Truck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolunteerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: String,
    pub protein: String,
    pub carbohydrates: String,
    pub fat: String,
}

/// A kitchen's offer of a bounded quantity of food with a spoilage deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    pub kitchen_name: String,
    pub pickup: Address,
    pub description: String,
    pub portions: PortionLedger,
    pub dietary_tags: BTreeSet<String>,
    pub allergens: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: DonationStatus,
}

impl Donation {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Open or partially matched, unexpired, and with portions left to give.
    pub fn is_matchable(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            DonationStatus::Open | DonationStatus::PartiallyMatched
        ) && !self.is_past_deadline(now)
            && !self.portions.is_exhausted()
    }

    /// Recompute the non-terminal status from the ledger.
    pub(crate) fn settle_status(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.portions.is_exhausted() {
            DonationStatus::FullyMatched
        } else if self.portions.is_untouched() {
            DonationStatus::Open
        } else {
            DonationStatus::PartiallyMatched
        };
    }
}

/// A shelter's need for a bounded quantity of food by a deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelterRequest {
    pub id: ShelterRequestId,
    pub shelter_name: String,
    pub dropoff: Address,
    pub portions: PortionLedger,
    pub dietary_preferences: BTreeSet<String>,
    /// `None` means the shelter excludes no allergens.
    #[serde(default)]
    pub prohibited_allergens: Option<BTreeSet<String>>,
    pub urgency: Urgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: ShelterRequestStatus,
}

impl ShelterRequest {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    pub fn is_matchable(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            ShelterRequestStatus::Open | ShelterRequestStatus::PartiallyFulfilled
        ) && !self.is_past_deadline(now)
            && !self.portions.is_exhausted()
    }

    pub(crate) fn settle_status(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.portions.is_exhausted() {
            ShelterRequestStatus::Fulfilled
        } else if self.portions.is_untouched() {
            ShelterRequestStatus::Open
        } else {
            ShelterRequestStatus::PartiallyFulfilled
        };
    }
}

/// Registered courier and their rolling weekly commitments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: VolunteerId,
    pub name: String,
    pub contact: String,
    pub vehicle: VehicleClass,
    pub max_distance_miles: f64,
    pub max_deliveries_per_week: u32,
    pub available_days: Vec<Weekday>,
    pub committed_deliveries: u32,
    pub completed_in_window: u32,
    pub window_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: VolunteerStatus,
}

impl Volunteer {
    pub fn is_active(&self) -> bool {
        self.status == VolunteerStatus::Active
    }

    pub fn is_available_on(&self, day: Weekday) -> bool {
        self.available_days.contains(&day)
    }

    /// Deliveries still open this window once `outstanding_offers` are honored.
    pub fn spare_capacity(&self, outstanding_offers: u32) -> u32 {
        self.max_deliveries_per_week
            .saturating_sub(self.committed_deliveries)
            .saturating_sub(outstanding_offers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Proposed,
    OfferedToVolunteer,
    Accepted,
    Declined,
    InProgress,
    Completed,
    Expired,
    Cancelled,
}

impl MatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            MatchStatus::Proposed => "proposed",
            MatchStatus::OfferedToVolunteer => "offered_to_volunteer",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Declined => "declined",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
            MatchStatus::Expired => "expired",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchStatus::Declined
                | MatchStatus::Completed
                | MatchStatus::Expired
                | MatchStatus::Cancelled
        )
    }

    /// Portions for the match are still held against both entities.
    pub const fn holds_portions(self) -> bool {
        !matches!(
            self,
            MatchStatus::Declined | MatchStatus::Expired | MatchStatus::Cancelled
        )
    }
}

/// Where a match's courier message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Composed,
    Template,
}

/// Allocation linking one donation, one shelter request, and eventually one volunteer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub donation_id: DonationId,
    pub shelter_request_id: ShelterRequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<VolunteerId>,
    pub portions: u32,
    pub distance_miles: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_source: Option<MessageSource>,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn status_view(&self) -> MatchStatusView {
        MatchStatusView {
            match_id: self.id.clone(),
            status: self.status.label(),
            donation_id: self.donation_id.clone(),
            shelter_request_id: self.shelter_request_id.clone(),
            volunteer_id: self.volunteer_id.clone(),
            portions: self.portions,
            distance_miles: self.distance_miles,
            message: self.message.clone(),
            template_used: self.message_source == Some(MessageSource::Template),
        }
    }
}

/// Sanitized representation of a match for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatusView {
    pub match_id: MatchId,
    pub status: &'static str,
    pub donation_id: DonationId,
    pub shelter_request_id: ShelterRequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<VolunteerId>,
    pub portions: u32,
    pub distance_miles: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub template_used: bool,
}

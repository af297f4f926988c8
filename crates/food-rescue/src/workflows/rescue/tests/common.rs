use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc, Weekday};
use serde_json::Value;

use crate::collaborators::{
    CollaboratorError, Collaborators, CourierBriefing, DeliveryOutcome, KnownLocations,
    MessageComposer, Notifier, OutboundMessage,
};
use crate::workflows::rescue::domain::{
    Address, Donation, DonationId, DonationStatus, PortionLedger, ShelterRequest,
    ShelterRequestId, ShelterRequestStatus, Urgency, VehicleClass, Volunteer, VolunteerId,
    VolunteerStatus,
};
use crate::workflows::rescue::intake::{
    DonationSubmission, ShelterRequestSubmission, VolunteerSubmission,
};
use crate::workflows::rescue::{MatchingConfig, Registry, RescueCoordinator};

const MILES_PER_DEGREE_LATITUDE: f64 = 69.0934;

pub(super) const KITCHEN_LAT: f64 = 34.0;
pub(super) const KITCHEN_LON: f64 = -118.0;

/// Monday, so default volunteers (weekdays) are available.
pub(super) fn now() -> DateTime<Utc> {
    "2026-03-02T12:00:00Z".parse().expect("valid timestamp")
}

pub(super) fn kitchen_address() -> Address {
    Address::at("1 College Ave", KITCHEN_LAT, KITCHEN_LON)
}

/// Address due north of the kitchen at the given great-circle distance.
pub(super) fn miles_north(line: &str, miles: f64) -> Address {
    Address::at(line, KITCHEN_LAT + miles / MILES_PER_DEGREE_LATITUDE, KITCHEN_LON)
}

pub(super) fn tags(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub(super) fn donation(id: &str, portions: u32, dietary: &[&str]) -> Donation {
    Donation {
        id: DonationId(id.to_string()),
        kitchen_name: "North Campus Dining".to_string(),
        pickup: kitchen_address(),
        description: "Pasta trays".to_string(),
        portions: PortionLedger::new(portions),
        dietary_tags: tags(dietary),
        allergens: BTreeSet::new(),
        nutrition: None,
        created_at: now() - Duration::minutes(30),
        expires_at: now() + Duration::hours(6),
        status: DonationStatus::Open,
    }
}

pub(super) fn shelter(id: &str, portions: u32, preferences: &[&str], urgency: Urgency) -> ShelterRequest {
    ShelterRequest {
        id: ShelterRequestId(id.to_string()),
        shelter_name: "Harbor Shelter".to_string(),
        dropoff: miles_north("20 Pier Rd", 3.0),
        portions: PortionLedger::new(portions),
        dietary_preferences: tags(preferences),
        prohibited_allergens: None,
        urgency,
        timeframe: None,
        notes: None,
        created_at: now() - Duration::minutes(20),
        deadline: now() + Duration::hours(8),
        status: ShelterRequestStatus::Open,
    }
}

pub(super) fn weekdays() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

pub(super) fn volunteer(id: &str, vehicle: VehicleClass, max_distance_miles: f64) -> Volunteer {
    Volunteer {
        id: VolunteerId(id.to_string()),
        name: "Ana Ruiz".to_string(),
        contact: "+15550100".to_string(),
        vehicle,
        max_distance_miles,
        max_deliveries_per_week: 3,
        available_days: weekdays(),
        committed_deliveries: 0,
        completed_in_window: 0,
        window_start: now() - Duration::days(1),
        created_at: now() - Duration::days(2),
        status: VolunteerStatus::Active,
    }
}

pub(super) fn donation_submission(portions: u32, dietary: &[&str]) -> DonationSubmission {
    DonationSubmission {
        kitchen_name: "North Campus Dining".to_string(),
        pickup: kitchen_address(),
        description: Some("Vegetable lasagna".to_string()),
        portions,
        dietary_tags: dietary.iter().map(|tag| tag.to_string()).collect(),
        allergens: Vec::new(),
        expires_at: now() + Duration::hours(6),
        image_base64: None,
        image_hint: None,
    }
}

pub(super) fn shelter_submission(
    portions: u32,
    preferences: &[&str],
    miles: f64,
) -> ShelterRequestSubmission {
    ShelterRequestSubmission {
        shelter_name: "Harbor Shelter".to_string(),
        dropoff: miles_north("20 Pier Rd", miles),
        portions: Some(portions),
        dietary_preferences: Some(preferences.iter().map(|tag| tag.to_string()).collect()),
        prohibited_allergens: None,
        urgency: Some(Urgency::High),
        timeframe: None,
        notes: None,
        deadline: now() + Duration::hours(8),
        request_text: None,
    }
}

pub(super) fn volunteer_submission(vehicle: VehicleClass, max_distance_miles: f64) -> VolunteerSubmission {
    VolunteerSubmission {
        name: "Ana Ruiz".to_string(),
        contact: "+15550100".to_string(),
        vehicle,
        max_distance_miles,
        max_deliveries_per_week: 3,
        available_days: weekdays(),
        active: true,
    }
}

/// Notifier that records every message it is asked to send.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(
        &self,
        messages: &[OutboundMessage],
    ) -> Result<Vec<DeliveryOutcome>, CollaboratorError> {
        self.sent
            .lock()
            .expect("notifier lock")
            .extend(messages.iter().cloned());
        Ok(vec![DeliveryOutcome::Delivered; messages.len()])
    }
}

pub(super) struct FriendlyComposer;

#[async_trait]
impl MessageComposer for FriendlyComposer {
    async fn compose(&self, briefing: &CourierBriefing) -> Result<String, CollaboratorError> {
        Ok(format!(
            "Thanks {}! {} portions to {}.",
            briefing.volunteer_name, briefing.portions, briefing.shelter_name
        ))
    }
}

pub(super) fn offline_coordinator() -> (Arc<RescueCoordinator>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let mut collaborators = Collaborators::offline(KnownLocations::new());
    collaborators.notifier = notifier.clone();
    let coordinator = RescueCoordinator::new(
        Arc::new(Registry::new()),
        collaborators,
        MatchingConfig::default(),
    );
    (Arc::new(coordinator), notifier)
}

pub(super) fn composing_coordinator() -> Arc<RescueCoordinator> {
    let mut collaborators = Collaborators::offline(KnownLocations::new());
    collaborators.messages = Arc::new(FriendlyComposer);
    Arc::new(RescueCoordinator::new(
        Arc::new(Registry::new()),
        collaborators,
        MatchingConfig::default(),
    ))
}

pub(super) async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::{call_with_timeout, Assisted, CollaboratorError, Offline};

const SERVICE: &str = "message composition";

/// Marker closing every template-built message.
pub const TEMPLATE_MARKER: &str = "(Template message: automated composition unavailable)";

/// Everything a courier needs to know about one delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourierBriefing {
    pub volunteer_name: String,
    pub vehicle: String,
    pub max_distance_miles: f64,
    pub kitchen_name: String,
    pub pickup_address: String,
    pub shelter_name: String,
    pub dropoff_address: String,
    pub portions: u32,
    pub distance_miles: f64,
    pub food_description: String,
}

#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose(&self, briefing: &CourierBriefing) -> Result<String, CollaboratorError>;
}

#[async_trait]
impl MessageComposer for Offline {
    async fn compose(&self, _briefing: &CourierBriefing) -> Result<String, CollaboratorError> {
        Err(Offline::unavailable(SERVICE))
    }
}

pub fn template_message(briefing: &CourierBriefing) -> String {
    format!(
        "Hi {volunteer}! We have a delivery that fits your route.\n\
         \n\
         {kitchen} has {portions} portions ready for pickup for {shelter}, \
         {distance:.1} miles away and within your {range:.1}-mile range.\n\
         \n\
         Pickup: {kitchen}\n\
         Address: {pickup}\n\
         \n\
         Delivery: {shelter}\n\
         Address: {dropoff}\n\
         \n\
         Distance: {distance:.1} miles\n\
         Food: {food}\n\
         Vehicle: {vehicle}\n\
         \n\
         {marker}",
        volunteer = briefing.volunteer_name,
        kitchen = briefing.kitchen_name,
        portions = briefing.portions,
        shelter = briefing.shelter_name,
        distance = briefing.distance_miles,
        range = briefing.max_distance_miles,
        pickup = briefing.pickup_address,
        dropoff = briefing.dropoff_address,
        food = briefing.food_description,
        vehicle = briefing.vehicle,
        marker = TEMPLATE_MARKER,
    )
}

/// Compose a courier message, falling back to [`template_message`]. Blank
/// compositions count as malformed.
pub async fn compose_or_template(
    composer: &dyn MessageComposer,
    briefing: &CourierBriefing,
    timeout: Duration,
) -> Assisted<String> {
    let outcome = call_with_timeout(SERVICE, timeout, composer.compose(briefing))
        .await
        .and_then(|message| {
            let trimmed = message.trim();
            if trimmed.is_empty() {
                Err(CollaboratorError::Malformed {
                    service: SERVICE,
                    reason: "empty message".to_string(),
                })
            } else {
                Ok(trimmed.to_string())
            }
        });

    match outcome {
        Ok(message) => Assisted::live(message),
        Err(err) => {
            warn!(error = %err, volunteer = %briefing.volunteer_name, "using template courier message");
            Assisted::fallback(template_message(briefing))
        }
    }
}

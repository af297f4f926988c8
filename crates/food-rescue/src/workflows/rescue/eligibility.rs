//! Hard constraints. Nothing here performs I/O: distances arrive precomputed.

use chrono::{DateTime, Utc, Weekday};
use serde::Serialize;

use super::config::VehicleCapacities;
use super::domain::{Donation, ShelterRequest, Volunteer};

/// Allergen recorded when a donation's contents could not be analysed.
pub const UNKNOWN_ALLERGEN: &str = "unknown";

/// A donation/shelter pairing with the portions it would move and its road distance.
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair<'a> {
    pub donation: &'a Donation,
    pub shelter: &'a ShelterRequest,
    pub portions: u32,
    pub distance_miles: f64,
}

/// Why a pairing or courier assignment was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Ineligibility {
    DonationClosed,
    DonationExpired,
    ShelterClosed,
    ShelterExpired,
    DietaryMismatch,
    ProhibitedAllergen { allergen: String },
    VolunteerInactive,
    WeeklyCapacityReached,
    BeyondRange { distance_miles: f64, max_miles: f64 },
    VehicleTooSmall { portions: u32, capacity: u32 },
    UnavailableOn { day: String },
}

impl Ineligibility {
    pub fn summary(&self) -> String {
        match self {
            Ineligibility::DonationClosed => "donation is not open".to_string(),
            Ineligibility::DonationExpired => "donation has expired".to_string(),
            Ineligibility::ShelterClosed => "shelter request is not open".to_string(),
            Ineligibility::ShelterExpired => "shelter request deadline passed".to_string(),
            Ineligibility::DietaryMismatch => "no dietary tag matches shelter preferences".to_string(),
            Ineligibility::ProhibitedAllergen { allergen } => {
                format!("donation contains prohibited allergen '{allergen}'")
            }
            Ineligibility::VolunteerInactive => "volunteer is inactive".to_string(),
            Ineligibility::WeeklyCapacityReached => "volunteer weekly limit reached".to_string(),
            Ineligibility::BeyondRange {
                distance_miles,
                max_miles,
            } => format!("{distance_miles:.1} mi exceeds volunteer range of {max_miles:.1} mi"),
            Ineligibility::VehicleTooSmall { portions, capacity } => {
                format!("{portions} portions exceed vehicle capacity of {capacity}")
            }
            Ineligibility::UnavailableOn { day } => format!("volunteer unavailable on {day}"),
        }
    }
}

/// Status, deadline, dietary, and allergen constraints between a donation and a request.
pub fn check_pair(
    donation: &Donation,
    shelter: &ShelterRequest,
    now: DateTime<Utc>,
) -> Result<(), Ineligibility> {
    if donation.is_past_deadline(now) {
        return Err(Ineligibility::DonationExpired);
    }
    if !donation.is_matchable(now) {
        return Err(Ineligibility::DonationClosed);
    }
    if shelter.is_past_deadline(now) {
        return Err(Ineligibility::ShelterExpired);
    }
    if !shelter.is_matchable(now) {
        return Err(Ineligibility::ShelterClosed);
    }

    if !shelter.dietary_preferences.is_empty()
        && shelter
            .dietary_preferences
            .is_disjoint(&donation.dietary_tags)
    {
        return Err(Ineligibility::DietaryMismatch);
    }

    if let Some(prohibited) = &shelter.prohibited_allergens {
        if let Some(allergen) = donation.allergens.intersection(prohibited).next() {
            return Err(Ineligibility::ProhibitedAllergen {
                allergen: allergen.clone(),
            });
        }
        // Unanalysed food cannot be cleared against an exclusion list.
        if !prohibited.is_empty() && donation.allergens.contains(UNKNOWN_ALLERGEN) {
            return Err(Ineligibility::ProhibitedAllergen {
                allergen: UNKNOWN_ALLERGEN.to_string(),
            });
        }
    }

    Ok(())
}

pub fn pair_feasible(donation: &Donation, shelter: &ShelterRequest, now: DateTime<Utc>) -> bool {
    check_pair(donation, shelter, now).is_ok()
}

/// Constraints between a pairing and the courier who would carry it.
///
/// `outstanding_offers` counts offers the volunteer holds but has not
/// answered; they reserve weekly capacity.
pub fn check_courier(
    pair: &CandidatePair<'_>,
    volunteer: &Volunteer,
    outstanding_offers: u32,
    vehicles: &VehicleCapacities,
    delivery_day: Weekday,
) -> Result<(), Ineligibility> {
    if !volunteer.is_active() {
        return Err(Ineligibility::VolunteerInactive);
    }
    if volunteer.spare_capacity(outstanding_offers) == 0 {
        return Err(Ineligibility::WeeklyCapacityReached);
    }
    if !pair.distance_miles.is_finite() || pair.distance_miles > volunteer.max_distance_miles {
        return Err(Ineligibility::BeyondRange {
            distance_miles: pair.distance_miles,
            max_miles: volunteer.max_distance_miles,
        });
    }
    let capacity = vehicles.portions_for(volunteer.vehicle);
    if capacity < pair.portions {
        return Err(Ineligibility::VehicleTooSmall {
            portions: pair.portions,
            capacity,
        });
    }
    if !volunteer.is_available_on(delivery_day) {
        return Err(Ineligibility::UnavailableOn {
            day: delivery_day.to_string(),
        });
    }
    Ok(())
}

pub fn courier_feasible(
    pair: &CandidatePair<'_>,
    volunteer: &Volunteer,
    outstanding_offers: u32,
    vehicles: &VehicleCapacities,
    delivery_day: Weekday,
) -> bool {
    check_courier(pair, volunteer, outstanding_offers, vehicles, delivery_day).is_ok()
}

use serde::Serialize;

use super::config::{ScoringWeights, UrgencyWeights};
use super::domain::{Urgency, Volunteer};
use super::eligibility::CandidatePair;

/// Per-term contributions to a score, kept for audits and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub urgency: f64,
    pub proximity: f64,
    pub portion_fit: f64,
    pub load_balance: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.urgency + self.proximity + self.portion_fit + self.load_balance
    }
}

fn urgency_weight(weights: &UrgencyWeights, urgency: Urgency) -> f64 {
    match urgency {
        Urgency::Low => weights.low,
        Urgency::Medium => weights.medium,
        Urgency::High => weights.high,
        Urgency::Critical => weights.critical,
    }
}

/// 1.0 at zero distance, 0.5 at the half distance, tending to 0.
fn proximity(distance_miles: f64, half_distance_miles: f64) -> f64 {
    if !distance_miles.is_finite() || distance_miles < 0.0 {
        return 0.0;
    }
    let half = if half_distance_miles > 0.0 {
        half_distance_miles
    } else {
        1.0
    };
    1.0 / (1.0 + distance_miles / half)
}

/// 1.0 when the allocation empties both sides, falling with leftovers.
fn portion_fit(portions: u32, donation_remaining: u32, shelter_remaining: u32) -> f64 {
    let available = f64::from(donation_remaining) + f64::from(shelter_remaining);
    if available == 0.0 {
        return 0.0;
    }
    let leftover = f64::from(donation_remaining.saturating_sub(portions))
        + f64::from(shelter_remaining.saturating_sub(portions));
    1.0 - leftover / available
}

pub fn breakdown(
    weights: &ScoringWeights,
    pair: &CandidatePair<'_>,
    volunteer: Option<&Volunteer>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        urgency: urgency_weight(&weights.urgency, pair.shelter.urgency),
        proximity: weights.proximity
            * proximity(pair.distance_miles, weights.proximity_half_distance_miles),
        portion_fit: weights.portion_fit
            * portion_fit(
                pair.portions,
                pair.donation.portions.remaining(),
                pair.shelter.portions.remaining(),
            ),
        load_balance: volunteer
            .map(|volunteer| {
                weights.load_balance / (1.0 + f64::from(volunteer.committed_deliveries))
            })
            .unwrap_or(0.0),
    }
}

/// Soft-preference score for a feasible pairing, optionally with its courier.
pub fn score(
    weights: &ScoringWeights,
    pair: &CandidatePair<'_>,
    volunteer: Option<&Volunteer>,
) -> f64 {
    breakdown(weights, pair, volunteer).total()
}

use super::common::*;

use crate::workflows::rescue::config::ScoringWeights;
use crate::workflows::rescue::domain::{Urgency, VehicleClass};
use crate::workflows::rescue::eligibility::CandidatePair;
use crate::workflows::rescue::scoring::{breakdown, score};

fn pair_score(urgency: Urgency, distance_miles: f64, portions: u32, needed: u32) -> f64 {
    let donation = donation("don-1", portions, &[]);
    let request = shelter("req-1", needed, &[], urgency);
    let pair = CandidatePair {
        donation: &donation,
        shelter: &request,
        portions: portions.min(needed),
        distance_miles,
    };
    score(&ScoringWeights::default(), &pair, None)
}

#[test]
fn more_urgent_requests_score_higher() {
    let ordered: Vec<f64> = [Urgency::Low, Urgency::Medium, Urgency::High, Urgency::Critical]
        .into_iter()
        .map(|urgency| pair_score(urgency, 3.0, 40, 40))
        .collect();
    assert!(ordered.windows(2).all(|pair| pair[0] < pair[1]), "{ordered:?}");
}

#[test]
fn closer_pairs_score_higher() {
    assert!(pair_score(Urgency::High, 1.0, 40, 40) > pair_score(Urgency::High, 8.0, 40, 40));
}

#[test]
fn tighter_portion_fit_scores_higher() {
    assert!(pair_score(Urgency::High, 3.0, 40, 40) > pair_score(Urgency::High, 3.0, 40, 200));
}

#[test]
fn scoring_is_deterministic() {
    assert_eq!(
        pair_score(Urgency::Medium, 4.2, 33, 70).to_bits(),
        pair_score(Urgency::Medium, 4.2, 33, 70).to_bits()
    );
}

#[test]
fn less_loaded_volunteers_earn_a_bonus() {
    let donation = donation("don-1", 40, &[]);
    let request = shelter("req-1", 40, &[], Urgency::High);
    let pair = CandidatePair {
        donation: &donation,
        shelter: &request,
        portions: 40,
        distance_miles: 3.0,
    };
    let fresh = volunteer("vol-1", VehicleClass::Car, 10.0);
    let mut busy = volunteer("vol-2", VehicleClass::Car, 10.0);
    busy.committed_deliveries = 2;

    let weights = ScoringWeights::default();
    let fresh_terms = breakdown(&weights, &pair, Some(&fresh));
    let busy_terms = breakdown(&weights, &pair, Some(&busy));

    assert_eq!(fresh_terms.load_balance, 0.5);
    assert!(busy_terms.load_balance < fresh_terms.load_balance);
    assert_eq!(breakdown(&weights, &pair, None).load_balance, 0.0);
    assert_eq!(fresh_terms.urgency, busy_terms.urgency);
}

use super::common::*;
use std::collections::HashMap;

use chrono::Duration;

use crate::workflows::rescue::config::MatchingConfig;
use crate::workflows::rescue::domain::{
    Donation, DonationId, Match, MatchId, MatchStatus, ShelterRequest, ShelterRequestId,
    Urgency, VehicleClass, VolunteerId,
};
use crate::workflows::rescue::matcher::{
    passed_over, plan_allocations, plan_couriers, DistanceTable, PassedOver,
};

fn distances(pairs: &[(&str, &str, f64)]) -> DistanceTable {
    pairs
        .iter()
        .map(|(donation, shelter, miles)| {
            (
                (
                    DonationId(donation.to_string()),
                    ShelterRequestId(shelter.to_string()),
                ),
                *miles,
            )
        })
        .collect()
}

fn proposed(id: &str, donation: &str, shelter: &str, portions: u32, miles: f64) -> Match {
    Match {
        id: MatchId(id.to_string()),
        donation_id: DonationId(donation.to_string()),
        shelter_request_id: ShelterRequestId(shelter.to_string()),
        volunteer_id: None,
        portions,
        distance_miles: miles,
        score: 5.0,
        message: None,
        message_source: None,
        status: MatchStatus::Proposed,
        created_at: now(),
        updated_at: now(),
    }
}

fn by_id<T, K: std::hash::Hash + Eq>(items: Vec<T>, key: impl Fn(&T) -> K) -> HashMap<K, T> {
    items.into_iter().map(|item| (key(&item), item)).collect()
}

#[test]
fn exact_fit_allocates_everything() {
    let donations = [donation("don-1", 50, &["vegetarian"])];
    let shelters = [shelter("req-1", 50, &["vegetarian"], Urgency::High)];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-1", "req-1", 3.0)]),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].portions, 50);
}

#[test]
fn partial_fulfilment_takes_what_the_donation_has() {
    let donations = [donation("don-1", 30, &[])];
    let shelters = [shelter("req-1", 50, &[], Urgency::Medium)];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-1", "req-1", 3.0)]),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].portions, 30);
}

#[test]
fn urgent_shelter_is_served_first() {
    let donations = [donation("don-1", 40, &[])];
    let shelters = [
        shelter("req-low", 40, &[], Urgency::Low),
        shelter("req-critical", 40, &[], Urgency::Critical),
    ];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-1", "req-low", 2.0), ("don-1", "req-critical", 2.0)]),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].shelter_request_id.0, "req-critical");
}

#[test]
fn one_donation_spreads_across_requests_without_overdrawing() {
    let donations = [donation("don-1", 100, &[])];
    let shelters = [
        shelter("req-1", 60, &[], Urgency::High),
        shelter("req-2", 60, &[], Urgency::High),
    ];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-1", "req-1", 2.0), ("don-1", "req-2", 4.0)]),
        &MatchingConfig::default(),
        now(),
    );

    let total: u32 = plan.iter().map(|allocation| allocation.portions).sum();
    assert_eq!(total, 100);
    assert_eq!(plan[0].shelter_request_id.0, "req-1");
    assert_eq!(plan[0].portions, 60);
    assert_eq!(plan[1].portions, 40);
}

#[test]
fn ties_break_by_earliest_donation_then_request() {
    let mut older = donation("don-b", 20, &[]);
    older.created_at = now() - Duration::hours(2);
    let newer = donation("don-a", 20, &[]);
    let donations = [newer, older];
    let shelters = [shelter("req-1", 20, &[], Urgency::High)];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-a", "req-1", 2.0), ("don-b", "req-1", 2.0)]),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].donation_id.0, "don-b");
}

#[test]
fn pairs_without_distance_are_excluded() {
    let donations = [donation("don-1", 20, &[])];
    let shelters = [shelter("req-1", 20, &[], Urgency::Critical)];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &DistanceTable::new(),
        &MatchingConfig::default(),
        now(),
    );

    assert!(plan.is_empty());
}

#[test]
fn infeasible_pairs_yield_an_empty_plan() {
    let donations = [donation("don-1", 20, &["vegan"])];
    let shelters = [shelter("req-1", 20, &["halal"], Urgency::Critical)];

    let plan = plan_allocations(
        &donations,
        &shelters,
        &distances(&[("don-1", "req-1", 1.0)]),
        &MatchingConfig::default(),
        now(),
    );

    assert!(plan.is_empty());
}

fn courier_fixture() -> (HashMap<DonationId, Donation>, HashMap<ShelterRequestId, ShelterRequest>) {
    (
        by_id(vec![donation("don-1", 100, &[])], |d: &Donation| d.id.clone()),
        by_id(
            vec![shelter("req-1", 100, &[], Urgency::High)],
            |s: &ShelterRequest| s.id.clone(),
        ),
    )
}

#[test]
fn out_of_range_matches_stay_unassigned() {
    let (donations, shelters) = courier_fixture();
    let matches = [proposed("match-1", "don-1", "req-1", 40, 12.0)];
    let volunteers = [volunteer("vol-1", VehicleClass::Van, 10.0)];

    let plan = plan_couriers(
        &matches,
        &donations,
        &shelters,
        &volunteers,
        &HashMap::new(),
        &PassedOver::new(),
        &MatchingConfig::default(),
        now(),
    );

    assert!(plan.is_empty());
}

#[test]
fn courier_capacity_is_shared_across_the_plan() {
    let (donations, shelters) = courier_fixture();
    let matches = [
        proposed("match-1", "don-1", "req-1", 10, 2.0),
        proposed("match-2", "don-1", "req-1", 10, 2.0),
        proposed("match-3", "don-1", "req-1", 10, 2.0),
    ];
    let mut solo = volunteer("vol-1", VehicleClass::Car, 10.0);
    solo.max_deliveries_per_week = 2;
    let outstanding = HashMap::from([(VolunteerId("vol-1".to_string()), 1)]);

    let plan = plan_couriers(
        &matches,
        &donations,
        &shelters,
        &[solo],
        &outstanding,
        &PassedOver::new(),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].match_id.0, "match-1");
}

#[test]
fn less_loaded_volunteer_wins_the_offer() {
    let (donations, shelters) = courier_fixture();
    let matches = [proposed("match-1", "don-1", "req-1", 10, 2.0)];
    let mut busy = volunteer("vol-1", VehicleClass::Car, 10.0);
    busy.committed_deliveries = 2;
    let fresh = volunteer("vol-2", VehicleClass::Car, 10.0);

    let plan = plan_couriers(
        &matches,
        &donations,
        &shelters,
        &[busy, fresh],
        &HashMap::new(),
        &PassedOver::new(),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].volunteer_id.0, "vol-2");
}

#[test]
fn matches_for_expired_donations_are_skipped() {
    let (mut donations, shelters) = courier_fixture();
    if let Some(donation) = donations.get_mut(&DonationId("don-1".to_string())) {
        donation.expires_at = now() - Duration::minutes(5);
    }
    let matches = [proposed("match-1", "don-1", "req-1", 10, 2.0)];

    let plan = plan_couriers(
        &matches,
        &donations,
        &shelters,
        &[volunteer("vol-1", VehicleClass::Car, 10.0)],
        &HashMap::new(),
        &PassedOver::new(),
        &MatchingConfig::default(),
        now(),
    );

    assert!(plan.is_empty());
}

#[test]
fn courier_who_declined_a_pair_is_not_asked_again() {
    let (donations, shelters) = courier_fixture();
    let mut declined = proposed("match-1", "don-1", "req-1", 40, 2.0);
    declined.status = MatchStatus::Declined;
    declined.volunteer_id = Some(VolunteerId("vol-1".to_string()));
    let matches = [proposed("match-2", "don-1", "req-1", 40, 2.0)];
    let volunteers = [
        volunteer("vol-1", VehicleClass::Van, 10.0),
        volunteer("vol-2", VehicleClass::Van, 10.0),
    ];

    let plan = plan_couriers(
        &matches,
        &donations,
        &shelters,
        &volunteers,
        &HashMap::new(),
        &passed_over(&[declined]),
        &MatchingConfig::default(),
        now(),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].volunteer_id.0, "vol-2");
}

#[test]
fn passed_over_ignores_open_and_completed_history() {
    let mut accepted = proposed("match-1", "don-1", "req-1", 10, 2.0);
    accepted.status = MatchStatus::Completed;
    accepted.volunteer_id = Some(VolunteerId("vol-1".to_string()));
    let mut expired = proposed("match-2", "don-1", "req-1", 10, 2.0);
    expired.status = MatchStatus::Expired;
    expired.volunteer_id = Some(VolunteerId("vol-2".to_string()));
    let unassigned = proposed("match-3", "don-1", "req-1", 10, 2.0);

    let skipped = passed_over(&[accepted, expired, unassigned]);

    assert_eq!(skipped.len(), 1);
    assert!(skipped.contains(&(
        DonationId("don-1".to_string()),
        ShelterRequestId("req-1".to_string()),
        VolunteerId("vol-2".to_string()),
    )));
}

use super::common::*;
use chrono::{Duration, Weekday};

use crate::workflows::rescue::config::VehicleCapacities;
use crate::workflows::rescue::domain::{
    DonationStatus, ShelterRequestStatus, Urgency, VehicleClass, VolunteerStatus,
};
use crate::workflows::rescue::eligibility::{
    check_courier, check_pair, pair_feasible, CandidatePair, Ineligibility, UNKNOWN_ALLERGEN,
};

#[test]
fn shared_dietary_tag_or_no_preference_is_feasible() {
    let donation = donation("don-1", 50, &["vegetarian", "nut-free"]);

    assert!(pair_feasible(
        &donation,
        &shelter("req-1", 50, &["vegetarian"], Urgency::High),
        now()
    ));
    assert!(pair_feasible(
        &donation,
        &shelter("req-2", 50, &[], Urgency::Low),
        now()
    ));
    assert_eq!(
        check_pair(
            &donation,
            &shelter("req-3", 50, &["halal"], Urgency::High),
            now()
        ),
        Err(Ineligibility::DietaryMismatch)
    );
}

#[test]
fn prohibited_allergens_exclude_the_pair() {
    let mut donation = donation("don-1", 50, &[]);
    donation.allergens = tags(&["peanuts", "soy"]);
    let mut request = shelter("req-1", 50, &[], Urgency::High);

    assert!(pair_feasible(&donation, &request, now()));

    request.prohibited_allergens = Some(tags(&["peanuts"]));
    assert_eq!(
        check_pair(&donation, &request, now()),
        Err(Ineligibility::ProhibitedAllergen {
            allergen: "peanuts".to_string()
        })
    );
}

#[test]
fn unanalysed_food_cannot_reach_allergen_sensitive_shelters() {
    let mut donation = donation("don-1", 50, &[]);
    donation.allergens = tags(&[UNKNOWN_ALLERGEN]);
    let mut request = shelter("req-1", 50, &[], Urgency::High);

    request.prohibited_allergens = Some(tags(&[]));
    assert!(pair_feasible(&donation, &request, now()));

    request.prohibited_allergens = Some(tags(&["shellfish"]));
    assert!(!pair_feasible(&donation, &request, now()));
}

#[test]
fn closed_or_expired_entities_are_infeasible() {
    let request = shelter("req-1", 50, &[], Urgency::High);

    let mut withdrawn = donation("don-1", 50, &[]);
    withdrawn.status = DonationStatus::Withdrawn;
    assert_eq!(
        check_pair(&withdrawn, &request, now()),
        Err(Ineligibility::DonationClosed)
    );

    let mut spoiled = donation("don-2", 50, &[]);
    spoiled.expires_at = now() - Duration::minutes(1);
    assert_eq!(
        check_pair(&spoiled, &request, now()),
        Err(Ineligibility::DonationExpired)
    );

    let mut fulfilled = shelter("req-2", 50, &[], Urgency::High);
    fulfilled.status = ShelterRequestStatus::Fulfilled;
    assert_eq!(
        check_pair(&donation("don-3", 50, &[]), &fulfilled, now()),
        Err(Ineligibility::ShelterClosed)
    );

    let mut late = shelter("req-3", 50, &[], Urgency::High);
    late.deadline = now();
    assert_eq!(
        check_pair(&donation("don-4", 50, &[]), &late, now()),
        Err(Ineligibility::ShelterExpired)
    );
}

#[test]
fn courier_constraints_are_each_enforced() {
    let donation = donation("don-1", 50, &[]);
    let request = shelter("req-1", 50, &[], Urgency::High);
    let vehicles = VehicleCapacities::default();
    let pair = CandidatePair {
        donation: &donation,
        shelter: &request,
        portions: 50,
        distance_miles: 8.0,
    };

    let car = volunteer("vol-1", VehicleClass::Car, 10.0);
    assert_eq!(check_courier(&pair, &car, 0, &vehicles, Weekday::Mon), Ok(()));

    let bike = volunteer("vol-2", VehicleClass::Bicycle, 10.0);
    assert_eq!(
        check_courier(&pair, &bike, 0, &vehicles, Weekday::Mon),
        Err(Ineligibility::VehicleTooSmall {
            portions: 50,
            capacity: 20
        })
    );

    let short_range = volunteer("vol-3", VehicleClass::Car, 5.0);
    assert!(matches!(
        check_courier(&pair, &short_range, 0, &vehicles, Weekday::Mon),
        Err(Ineligibility::BeyondRange { .. })
    ));

    assert!(matches!(
        check_courier(&pair, &car, 0, &vehicles, Weekday::Sat),
        Err(Ineligibility::UnavailableOn { .. })
    ));

    assert_eq!(
        check_courier(&pair, &car, 3, &vehicles, Weekday::Mon),
        Err(Ineligibility::WeeklyCapacityReached)
    );

    let mut resting = volunteer("vol-4", VehicleClass::Van, 30.0);
    resting.status = VolunteerStatus::Inactive;
    assert_eq!(
        check_courier(&pair, &resting, 0, &vehicles, Weekday::Mon),
        Err(Ineligibility::VolunteerInactive)
    );
}

#[test]
fn unmeasurable_distance_fails_closed() {
    let donation = donation("don-1", 10, &[]);
    let request = shelter("req-1", 10, &[], Urgency::High);
    let pair = CandidatePair {
        donation: &donation,
        shelter: &request,
        portions: 10,
        distance_miles: f64::NAN,
    };
    let van = volunteer("vol-1", VehicleClass::Van, 500.0);

    assert!(check_courier(&pair, &van, 0, &VehicleCapacities::default(), Weekday::Mon).is_err());
}

#[test]
fn summaries_are_human_readable() {
    assert_eq!(
        Ineligibility::BeyondRange {
            distance_miles: 12.04,
            max_miles: 10.0
        }
        .summary(),
        "12.0 mi exceeds volunteer range of 10.0 mi"
    );
}

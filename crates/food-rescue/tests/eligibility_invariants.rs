//! Seeded random pools checking that matching cycles only produce eligible work.
//!
//! Every match a cycle proposes must pass the pair constraints against the
//! entities as they stood before the cycle, and every offer must pass the
//! courier constraints against the volunteer as they stood before the cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use food_rescue::collaborators::{Collaborators, KnownLocations};
use food_rescue::workflows::rescue::eligibility::CandidatePair;
use food_rescue::workflows::rescue::{
    courier_feasible, pair_feasible, Address, Donation, DonationId, DonationStatus,
    MatchingConfig, PortionLedger, Registry, RescueCoordinator, ShelterRequest,
    ShelterRequestId, ShelterRequestStatus, Urgency, VehicleClass, Volunteer, VolunteerId,
    VolunteerStatus,
};

const MILES_PER_DEGREE_LATITUDE: f64 = 69.0934;
const ORIGIN: (f64, f64) = (41.8781, -87.6298);
const TAGS: [&str; 4] = ["vegetarian", "vegan", "halal", "gluten-free"];
const ALLERGENS: [&str; 4] = ["peanuts", "dairy", "shellfish", "unknown"];
const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];
const VEHICLES: [VehicleClass; 5] = [
    VehicleClass::Bicycle,
    VehicleClass::Car,
    VehicleClass::Suv,
    VehicleClass::Van,
    VehicleClass::Truck,
];

/// A Wednesday morning.
fn start() -> DateTime<Utc> {
    "2026-03-04T09:00:00Z".parse().expect("valid timestamp")
}

fn somewhere(rng: &mut StdRng, line: String) -> Address {
    let north = rng.gen_range(-8.0..8.0) / MILES_PER_DEGREE_LATITUDE;
    let east = rng.gen_range(-8.0..8.0) / MILES_PER_DEGREE_LATITUDE;
    Address::at(line, ORIGIN.0 + north, ORIGIN.1 + east)
}

fn some_of(rng: &mut StdRng, items: &[&str], chance: f64) -> BTreeSet<String> {
    items
        .iter()
        .filter(|_| rng.gen_bool(chance))
        .map(|item| item.to_string())
        .collect()
}

fn seed_pool(registry: &Registry, rng: &mut StdRng) {
    for index in 0..rng.gen_range(3..=8) {
        registry
            .insert_donation(Donation {
                id: DonationId("pending".to_string()),
                kitchen_name: format!("Kitchen {index}"),
                pickup: somewhere(rng, format!("{index} Market St")),
                description: "Assorted trays".to_string(),
                portions: PortionLedger::new(rng.gen_range(5..=150)),
                dietary_tags: some_of(rng, &TAGS, 0.4),
                allergens: some_of(rng, &ALLERGENS, 0.2),
                nutrition: None,
                created_at: start(),
                expires_at: start() + Duration::minutes(rng.gen_range(-60..=600)),
                status: DonationStatus::Open,
            })
            .expect("donation");
    }
    for index in 0..rng.gen_range(3..=8) {
        let prohibited = some_of(rng, &ALLERGENS[..3], 0.3);
        registry
            .insert_shelter_request(ShelterRequest {
                id: ShelterRequestId("pending".to_string()),
                shelter_name: format!("Shelter {index}"),
                dropoff: somewhere(rng, format!("{index} Lake Shore Dr")),
                portions: PortionLedger::new(rng.gen_range(5..=150)),
                dietary_preferences: some_of(rng, &TAGS, 0.25),
                prohibited_allergens: if prohibited.is_empty() {
                    None
                } else {
                    Some(prohibited)
                },
                urgency: [Urgency::Low, Urgency::Medium, Urgency::High, Urgency::Critical]
                    [rng.gen_range(0..4)],
                timeframe: None,
                notes: None,
                created_at: start(),
                deadline: start() + Duration::minutes(rng.gen_range(-60..=600)),
                status: ShelterRequestStatus::Open,
            })
            .expect("request");
    }
    for index in 0..rng.gen_range(2..=6) {
        let max_deliveries_per_week = rng.gen_range(1..=4);
        registry
            .insert_volunteer(Volunteer {
                id: VolunteerId("pending".to_string()),
                name: format!("Courier {index}"),
                contact: format!("+1555010{index}"),
                vehicle: VEHICLES[rng.gen_range(0..VEHICLES.len())],
                max_distance_miles: rng.gen_range(1.0..20.0),
                max_deliveries_per_week,
                available_days: WEEK.iter().copied().filter(|_| rng.gen_bool(0.6)).collect(),
                committed_deliveries: rng.gen_range(0..=max_deliveries_per_week),
                completed_in_window: 0,
                window_start: start(),
                created_at: start(),
                status: if rng.gen_bool(0.8) {
                    VolunteerStatus::Active
                } else {
                    VolunteerStatus::Inactive
                },
            })
            .expect("volunteer");
    }
}

struct Snapshot {
    donations: HashMap<DonationId, Donation>,
    shelters: HashMap<ShelterRequestId, ShelterRequest>,
    volunteers: HashMap<VolunteerId, Volunteer>,
    outstanding: HashMap<VolunteerId, u32>,
}

fn snapshot(registry: &Registry) -> Snapshot {
    Snapshot {
        donations: registry
            .donations()
            .expect("donations")
            .into_iter()
            .map(|donation| (donation.id.clone(), donation))
            .collect(),
        shelters: registry
            .shelter_requests()
            .expect("requests")
            .into_iter()
            .map(|shelter| (shelter.id.clone(), shelter))
            .collect(),
        volunteers: registry
            .volunteers()
            .expect("volunteers")
            .into_iter()
            .map(|volunteer| (volunteer.id.clone(), volunteer))
            .collect(),
        outstanding: registry.outstanding_offers().expect("outstanding offers"),
    }
}

async fn check_cycle(coordinator: &RescueCoordinator, config: &MatchingConfig, now: DateTime<Utc>) {
    let registry = coordinator.registry();
    let before = snapshot(registry);

    let report = coordinator.run_matching_cycle(now).await.expect("cycle");

    for id in &report.proposed {
        let record = registry.get_match(id).expect("proposed match");
        let donation = &before.donations[&record.donation_id];
        let shelter = &before.shelters[&record.shelter_request_id];
        assert!(
            pair_feasible(donation, shelter, now),
            "{} pairs {} with {} against the rules",
            record.id,
            donation.id,
            shelter.id
        );
        assert!(record.portions > 0);
        assert!(record.portions <= donation.portions.remaining());
        assert!(record.portions <= shelter.portions.remaining());
    }

    let mut offers_per_volunteer: HashMap<VolunteerId, u32> = HashMap::new();
    for id in &report.offered {
        let record = registry.get_match(id).expect("offered match");
        let volunteer_id = record.volunteer_id.clone().expect("offer names a courier");
        let volunteer = &before.volunteers[&volunteer_id];
        let pair = CandidatePair {
            donation: &before.donations[&record.donation_id],
            shelter: &before.shelters[&record.shelter_request_id],
            portions: record.portions,
            distance_miles: record.distance_miles,
        };
        let outstanding = before.outstanding.get(&volunteer_id).copied().unwrap_or(0);
        assert!(
            courier_feasible(&pair, volunteer, outstanding, &config.vehicles, now.weekday()),
            "{} offered to ineligible courier {}",
            record.id,
            volunteer_id
        );
        *offers_per_volunteer.entry(volunteer_id).or_default() += 1;
    }

    for (volunteer_id, offers) in offers_per_volunteer {
        let volunteer = &before.volunteers[&volunteer_id];
        let outstanding = before.outstanding.get(&volunteer_id).copied().unwrap_or(0);
        assert!(
            offers <= volunteer.spare_capacity(outstanding),
            "{volunteer_id} handed {offers} offers beyond spare capacity"
        );
    }
}

#[tokio::test]
async fn matching_cycles_only_produce_eligible_work() {
    let config = MatchingConfig::default();
    for seed in [3_u64, 11, 256, 4_096, 65_537] {
        let mut rng = StdRng::seed_from_u64(seed);
        let registry = Arc::new(Registry::new());
        seed_pool(&registry, &mut rng);
        let coordinator = RescueCoordinator::new(
            registry,
            Collaborators::offline(KnownLocations::new()),
            config.clone(),
        );

        let mut now = start();
        for _ in 0..3 {
            check_cycle(&coordinator, &config, now).await;
            seed_pool(coordinator.registry(), &mut rng);
            now += Duration::minutes(rng.gen_range(5..=90));
        }
    }
}

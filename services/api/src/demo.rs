use chrono::{DateTime, Duration, Utc, Weekday};
use clap::Args;
use food_rescue::collaborators::KnownLocations;
use food_rescue::config::RescueConfig;
use food_rescue::error::AppError;
use food_rescue::workflows::rescue::{
    Address, DonationSubmission, RescueCoordinator, ShelterRequestSubmission, Urgency,
    VehicleClass, VolunteerSubmission,
};
use food_rescue::workflows::roster::RosterImporter;
use std::path::PathBuf;

use crate::infra::offline_coordinator;

const CAMPUS: (f64, f64) = (42.3736, -71.1097);
const MILES_PER_DEGREE_LATITUDE: f64 = 69.0934;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Volunteer roster CSV to use instead of the built-in couriers
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Walk the first accepted offer through pickup and delivery
    #[arg(long)]
    pub(crate) deliver: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RosterCheckArgs {
    /// Roster CSV export to validate
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

pub(crate) fn run_roster_check(args: RosterCheckArgs) -> Result<(), AppError> {
    let import = RosterImporter::from_path(&args.csv)?;

    println!("Roster check: {}", args.csv.display());
    println!("- {} usable rows", import.entries.len());
    for entry in &import.entries {
        let submission = &entry.submission;
        println!(
            "  line {:>3}: {} ({}, {:.0} mi, {} per week{})",
            entry.line,
            submission.name,
            submission.vehicle.label(),
            submission.max_distance_miles,
            submission.max_deliveries_per_week,
            if submission.active { "" } else { ", inactive" }
        );
    }
    if import.issues.is_empty() {
        println!("- no rejected rows");
    } else {
        println!("- {} rejected rows", import.issues.len());
        for issue in &import.issues {
            println!("  line {:>3}: {}", issue.line, issue.reason);
        }
    }
    Ok(())
}

fn near_campus(line: &str, miles_north: f64) -> Address {
    Address::at(
        line,
        CAMPUS.0 + miles_north / MILES_PER_DEGREE_LATITUDE,
        CAMPUS.1,
    )
}

fn sample_donations(now: DateTime<Utc>) -> Vec<DonationSubmission> {
    vec![
        DonationSubmission {
            kitchen_name: "Annenberg Dining Hall".to_string(),
            pickup: near_campus("45 Quincy St", 0.0),
            description: Some("Vegetable curry with rice".to_string()),
            portions: 50,
            dietary_tags: vec!["vegetarian".to_string(), "gluten-free".to_string()],
            allergens: Vec::new(),
            expires_at: now + Duration::hours(4),
            image_base64: None,
            image_hint: None,
        },
        DonationSubmission {
            kitchen_name: "Quad Grille".to_string(),
            pickup: near_campus("60 Linnaean St", 0.8),
            description: None,
            portions: 30,
            dietary_tags: Vec::new(),
            allergens: Vec::new(),
            expires_at: now + Duration::hours(3),
            image_base64: Some("c2FtcGxlIHRyYXkgcGhvdG8=".to_string()),
            image_hint: Some("sandwich trays".to_string()),
        },
    ]
}

fn sample_requests(now: DateTime<Utc>) -> Vec<ShelterRequestSubmission> {
    vec![
        ShelterRequestSubmission {
            shelter_name: "Harbor Family Shelter".to_string(),
            dropoff: near_campus("210 Mass Ave", 3.2),
            portions: Some(40),
            dietary_preferences: Some(vec!["vegetarian".to_string()]),
            prohibited_allergens: None,
            urgency: Some(Urgency::High),
            timeframe: Some("tonight".to_string()),
            notes: None,
            deadline: now + Duration::hours(5),
            request_text: None,
        },
        ShelterRequestSubmission {
            shelter_name: "Eastside Youth Center".to_string(),
            dropoff: near_campus("18 Cambridge St", 6.5),
            portions: None,
            dietary_preferences: None,
            prohibited_allergens: Some(vec!["peanuts".to_string()]),
            urgency: None,
            timeframe: None,
            notes: None,
            deadline: now + Duration::hours(6),
            request_text: Some("Urgent: about 25 meals needed for dinner tonight".to_string()),
        },
    ]
}

fn sample_volunteers() -> Vec<VolunteerSubmission> {
    let every_day = vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    vec![
        VolunteerSubmission {
            name: "Ana Ruiz".to_string(),
            contact: "+15550100".to_string(),
            vehicle: VehicleClass::Car,
            max_distance_miles: 10.0,
            max_deliveries_per_week: 3,
            available_days: every_day.clone(),
            active: true,
        },
        VolunteerSubmission {
            name: "Chloe Nguyen".to_string(),
            contact: "+15550102".to_string(),
            vehicle: VehicleClass::Bicycle,
            max_distance_miles: 4.0,
            max_deliveries_per_week: 6,
            available_days: every_day,
            active: true,
        },
    ]
}

fn register_volunteers(
    coordinator: &RescueCoordinator,
    roster: Option<PathBuf>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    match roster {
        Some(path) => {
            let import = RosterImporter::from_path(&path)?;
            let registration = coordinator.register_roster(import, now)?;
            println!(
                "- {} volunteers loaded from {} ({} rows skipped)",
                registration.registered.len(),
                path.display(),
                registration.issues.len()
            );
        }
        None => {
            for submission in sample_volunteers() {
                let volunteer = coordinator.register_volunteer(submission, now)?;
                println!(
                    "- volunteer {} {} ({}, {:.0} mi range)",
                    volunteer.id,
                    volunteer.name,
                    volunteer.vehicle.label(),
                    volunteer.max_distance_miles
                );
            }
        }
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let now = Utc::now();
    let coordinator = offline_coordinator(&RescueConfig::default(), KnownLocations::new());

    println!("Food rescue demo (offline collaborators)");
    for submission in sample_donations(now) {
        let registered = coordinator.register_donation(submission, now).await?;
        println!(
            "- donation {} from {}: {} portions of {}{}",
            registered.value.id,
            registered.value.kitchen_name,
            registered.value.portions.total(),
            registered.value.description,
            if registered.fallback_used {
                " [photo analysis fallback]"
            } else {
                ""
            }
        );
    }
    for submission in sample_requests(now) {
        let registered = coordinator.register_shelter_request(submission, now).await?;
        println!(
            "- request {} from {}: {} portions, {} urgency{}",
            registered.value.id,
            registered.value.shelter_name,
            registered.value.portions.total(),
            registered.value.urgency.label(),
            if registered.fallback_used {
                " [text extraction fallback]"
            } else {
                ""
            }
        );
    }
    register_volunteers(&coordinator, args.roster, now)?;

    let report = coordinator.run_matching_cycle(now).await?;
    println!(
        "\nMatching cycle: {} proposed | {} offered | {} awaiting courier | {} unreachable pairs",
        report.proposed.len(),
        report.offered.len(),
        report.awaiting_courier.len(),
        report.unreachable_pairs
    );
    for id in &report.proposed {
        let record = coordinator.get_match(id)?;
        println!(
            "  - {} {} -> {}: {} portions over {:.1} mi, {}",
            record.id,
            record.donation_id,
            record.shelter_request_id,
            record.portions,
            record.distance_miles,
            record.status.label()
        );
        if let Some(message) = &record.message {
            for line in message.lines().filter(|line| !line.trim().is_empty()) {
                println!("      | {line}");
            }
        }
    }

    if args.deliver {
        if let Some(id) = report.offered.first() {
            coordinator.accept(id, now)?;
            coordinator.confirm_pickup(id, now + Duration::minutes(20))?;
            let done = coordinator.confirm_delivery(id, now + Duration::minutes(45))?;
            println!("\nDelivery walk-through: {} is {}", done.id, done.status.label());
        } else {
            println!("\nDelivery walk-through skipped: no offers were made");
        }
    }

    let timeout = Duration::from_std(coordinator.config().offer_timeout)
        .unwrap_or_else(|_| Duration::minutes(30));
    let sweep = coordinator.sweep(now + timeout + Duration::minutes(1))?;
    println!(
        "\nSweep after the offer timeout: {} offers expired, {} matches lapsed",
        sweep.expired_offers.len(),
        sweep.lapsed_matches.len()
    );

    Ok(())
}

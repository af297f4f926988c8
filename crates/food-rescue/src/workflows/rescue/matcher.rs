//! Greedy best-first assignment in two passes: donations to shelter requests,
//! then couriers to the resulting proposed matches.
//!
//! The planning functions are pure and deterministic; [`Matcher`] feeds them
//! registry snapshots and measured distances, then commits each planned
//! allocation through the registry, which has the final say when a
//! concurrent change got there first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::config::MatchingConfig;
use super::domain::{
    Donation, DonationId, Match, MatchId, MatchStatus, ShelterRequest, ShelterRequestId,
    Volunteer, VolunteerId,
};
use super::eligibility::{check_courier, check_pair, CandidatePair};
use super::registry::{AllocationRequest, Registry, RegistryError};
use super::scoring::score;
use crate::collaborators::distance::distance_or_exclude;
use crate::collaborators::DistanceOracle;

/// Measured pickup-to-dropoff miles per donation/request pair.
pub type DistanceTable = HashMap<(DonationId, ShelterRequestId), f64>;

/// Couriers who already declined, or let lapse, an offer for a pair.
pub type PassedOver = HashSet<(DonationId, ShelterRequestId, VolunteerId)>;

/// Collect the couriers who passed on each pair from its match history.
pub fn passed_over(history: &[Match]) -> PassedOver {
    history
        .iter()
        .filter(|record| matches!(record.status, MatchStatus::Declined | MatchStatus::Expired))
        .filter_map(|record| {
            record.volunteer_id.clone().map(|volunteer_id| {
                (
                    record.donation_id.clone(),
                    record.shelter_request_id.clone(),
                    volunteer_id,
                )
            })
        })
        .collect()
}

/// A courier chosen for a proposed match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourierAssignment {
    pub match_id: MatchId,
    pub volunteer_id: VolunteerId,
    pub score: f64,
}

struct PairEdge<'a> {
    donation: &'a Donation,
    shelter: &'a ShelterRequest,
    distance_miles: f64,
    score: f64,
}

/// Plan conflict-free donation/request allocations.
///
/// Pairs without a measured distance are left out. Edges are taken in
/// descending score order; ties go to the earlier donation, then the earlier
/// request. Each edge moves as many portions as both sides still have.
pub fn plan_allocations(
    donations: &[Donation],
    shelters: &[ShelterRequest],
    distances: &DistanceTable,
    config: &MatchingConfig,
    now: DateTime<Utc>,
) -> Vec<AllocationRequest> {
    let mut edges = Vec::new();
    for donation in donations {
        for shelter in shelters {
            if check_pair(donation, shelter, now).is_err() {
                continue;
            }
            let Some(&distance_miles) = distances.get(&(donation.id.clone(), shelter.id.clone()))
            else {
                continue;
            };
            let pair = CandidatePair {
                donation,
                shelter,
                portions: donation
                    .portions
                    .remaining()
                    .min(shelter.portions.remaining()),
                distance_miles,
            };
            edges.push(PairEdge {
                donation,
                shelter,
                distance_miles,
                score: score(&config.scoring, &pair, None),
            });
        }
    }

    edges.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.donation.created_at.cmp(&b.donation.created_at))
            .then_with(|| a.donation.id.cmp(&b.donation.id))
            .then_with(|| a.shelter.created_at.cmp(&b.shelter.created_at))
            .then_with(|| a.shelter.id.cmp(&b.shelter.id))
    });

    let mut donation_left: HashMap<&DonationId, u32> = donations
        .iter()
        .map(|donation| (&donation.id, donation.portions.remaining()))
        .collect();
    let mut shelter_left: HashMap<&ShelterRequestId, u32> = shelters
        .iter()
        .map(|shelter| (&shelter.id, shelter.portions.remaining()))
        .collect();

    let mut plan = Vec::new();
    for edge in edges {
        let available = donation_left.get(&edge.donation.id).copied().unwrap_or(0);
        let needed = shelter_left.get(&edge.shelter.id).copied().unwrap_or(0);
        let portions = available.min(needed);
        if portions == 0 {
            continue;
        }
        donation_left.insert(&edge.donation.id, available - portions);
        shelter_left.insert(&edge.shelter.id, needed - portions);

        plan.push(AllocationRequest {
            donation_id: edge.donation.id.clone(),
            shelter_request_id: edge.shelter.id.clone(),
            portions,
            distance_miles: edge.distance_miles,
            score: edge.score,
        });
    }

    plan
}

/// Plan one courier per proposed, unassigned match.
///
/// Delivery day is the weekday of `now`. Spare weekly capacity is tracked
/// across the plan so no volunteer is handed more offers than they can take.
/// A courier in `passed_over` for the match's pair is not asked again.
pub fn plan_couriers(
    proposed: &[Match],
    donations: &HashMap<DonationId, Donation>,
    shelters: &HashMap<ShelterRequestId, ShelterRequest>,
    volunteers: &[Volunteer],
    outstanding_offers: &HashMap<VolunteerId, u32>,
    passed_over: &PassedOver,
    config: &MatchingConfig,
    now: DateTime<Utc>,
) -> Vec<CourierAssignment> {
    let delivery_day = now.weekday();
    let offers_for = |id: &VolunteerId| outstanding_offers.get(id).copied().unwrap_or(0);

    let mut edges: Vec<(&Match, &Volunteer, f64)> = Vec::new();
    for record in proposed {
        if record.status != MatchStatus::Proposed || record.volunteer_id.is_some() {
            continue;
        }
        let (Some(donation), Some(shelter)) = (
            donations.get(&record.donation_id),
            shelters.get(&record.shelter_request_id),
        ) else {
            continue;
        };
        if donation.status.is_terminal()
            || shelter.status.is_terminal()
            || donation.is_past_deadline(now)
            || shelter.is_past_deadline(now)
        {
            continue;
        }

        let pair = CandidatePair {
            donation,
            shelter,
            portions: record.portions,
            distance_miles: record.distance_miles,
        };
        for volunteer in volunteers {
            let key = (
                record.donation_id.clone(),
                record.shelter_request_id.clone(),
                volunteer.id.clone(),
            );
            if passed_over.contains(&key) {
                debug!(
                    match_id = %record.id,
                    volunteer_id = %volunteer.id,
                    "courier already passed on this pair"
                );
                continue;
            }
            match check_courier(
                &pair,
                volunteer,
                offers_for(&volunteer.id),
                &config.vehicles,
                delivery_day,
            ) {
                Ok(()) => edges.push((
                    record,
                    volunteer,
                    score(&config.scoring, &pair, Some(volunteer)),
                )),
                Err(reason) => debug!(
                    match_id = %record.id,
                    volunteer_id = %volunteer.id,
                    reason = %reason.summary(),
                    "courier ineligible"
                ),
            }
        }
    }

    edges.sort_by(|(match_a, vol_a, score_a), (match_b, vol_b, score_b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| match_a.created_at.cmp(&match_b.created_at))
            .then_with(|| match_a.id.cmp(&match_b.id))
            .then_with(|| vol_a.created_at.cmp(&vol_b.created_at))
            .then_with(|| vol_a.id.cmp(&vol_b.id))
    });

    let mut spare: HashMap<&VolunteerId, u32> = volunteers
        .iter()
        .map(|volunteer| (&volunteer.id, volunteer.spare_capacity(offers_for(&volunteer.id))))
        .collect();
    let mut assigned: HashSet<&MatchId> = HashSet::new();
    let mut plan = Vec::new();

    for (record, volunteer, score) in edges {
        if assigned.contains(&record.id) {
            continue;
        }
        let Some(left) = spare.get_mut(&volunteer.id) else {
            continue;
        };
        if *left == 0 {
            continue;
        }
        *left -= 1;
        assigned.insert(&record.id);
        plan.push(CourierAssignment {
            match_id: record.id.clone(),
            volunteer_id: volunteer.id.clone(),
            score,
        });
    }

    plan
}

/// Result of committing one allocation pass to the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationPass {
    pub proposed: Vec<Match>,
    /// Pairs whose distance could not be measured this cycle.
    pub unreachable_pairs: usize,
    /// Planned allocations the registry refused because the entities changed.
    pub conflicts: usize,
}

pub struct Matcher {
    registry: Arc<Registry>,
    distance: Arc<dyn DistanceOracle>,
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(
        registry: Arc<Registry>,
        distance: Arc<dyn DistanceOracle>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            registry,
            distance,
            config,
        }
    }

    /// Measure every eligible pair, leaving out pairs the oracle cannot answer.
    pub async fn measure(
        &self,
        donations: &[Donation],
        shelters: &[ShelterRequest],
        now: DateTime<Utc>,
    ) -> (DistanceTable, usize) {
        let mut table = DistanceTable::new();
        let mut unreachable = 0;

        for donation in donations {
            for shelter in shelters {
                if check_pair(donation, shelter, now).is_err() {
                    continue;
                }
                match distance_or_exclude(
                    self.distance.as_ref(),
                    &donation.pickup,
                    &shelter.dropoff,
                    self.config.collaborator_timeout,
                )
                .await
                {
                    Ok(miles) => {
                        table.insert((donation.id.clone(), shelter.id.clone()), miles);
                    }
                    Err(err) => {
                        unreachable += 1;
                        debug!(
                            donation_id = %donation.id,
                            shelter_request_id = %shelter.id,
                            error = %err,
                            "pair excluded: distance unavailable"
                        );
                    }
                }
            }
        }

        (table, unreachable)
    }

    /// Allocate open donations to open requests and record proposed matches.
    pub async fn propose(&self, now: DateTime<Utc>) -> Result<AllocationPass, RegistryError> {
        let donations: Vec<Donation> = self
            .registry
            .donations()?
            .into_iter()
            .filter(|donation| donation.is_matchable(now))
            .collect();
        let shelters: Vec<ShelterRequest> = self
            .registry
            .shelter_requests()?
            .into_iter()
            .filter(|shelter| shelter.is_matchable(now))
            .collect();

        if donations.is_empty() || shelters.is_empty() {
            return Ok(AllocationPass::default());
        }

        let (distances, unreachable_pairs) = self.measure(&donations, &shelters, now).await;
        let plan = plan_allocations(&donations, &shelters, &distances, &self.config, now);

        let mut pass = AllocationPass {
            unreachable_pairs,
            ..AllocationPass::default()
        };
        for allocation in plan {
            match self.registry.allocate(allocation, now) {
                Ok(record) => pass.proposed.push(record),
                Err(
                    err @ (RegistryError::InsufficientPortions { .. }
                    | RegistryError::Closed { .. }),
                ) => {
                    pass.conflicts += 1;
                    debug!(error = %err, "planned allocation lost to a concurrent change");
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            proposed = pass.proposed.len(),
            unreachable = pass.unreachable_pairs,
            conflicts = pass.conflicts,
            "allocation pass finished"
        );
        Ok(pass)
    }

    /// Choose couriers for every match still waiting on one.
    pub fn assign_couriers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CourierAssignment>, RegistryError> {
        let (proposed, history): (Vec<Match>, Vec<Match>) = self
            .registry
            .matches()?
            .into_iter()
            .partition(|record| record.status == MatchStatus::Proposed);
        if proposed.is_empty() {
            return Ok(Vec::new());
        }
        let passed_over = passed_over(&history);

        let donations = self
            .registry
            .donations()?
            .into_iter()
            .map(|donation| (donation.id.clone(), donation))
            .collect();
        let shelters = self
            .registry
            .shelter_requests()?
            .into_iter()
            .map(|shelter| (shelter.id.clone(), shelter))
            .collect();
        let volunteers = self.registry.volunteers()?;
        let outstanding = self.registry.outstanding_offers()?;

        Ok(plan_couriers(
            &proposed,
            &donations,
            &shelters,
            &volunteers,
            &outstanding,
            &passed_over,
            &self.config,
            now,
        ))
    }
}

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::domain::{
    Donation, DonationId, DonationStatus, Match, MatchId, MatchStatus, MessageSource,
    PortionError, ShelterRequest, ShelterRequestId, ShelterRequestStatus, Volunteer, VolunteerId,
    VolunteerStatus,
};
use super::lifecycle::{next_status, MatchAction, Transition, TransitionError};

type Slot<T> = Arc<Mutex<T>>;
type Table<K, T> = RwLock<HashMap<K, Slot<T>>>;

/// Error enumeration for registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{kind} {id} is {status} and no longer accepts changes")]
    Closed {
        kind: &'static str,
        id: String,
        status: &'static str,
    },
    #[error("{kind} {id} cannot supply {requested} portions ({remaining} remaining)")]
    InsufficientPortions {
        kind: &'static str,
        id: String,
        requested: u32,
        remaining: u32,
    },
    #[error("volunteer {0} has no remaining weekly capacity")]
    CapacityExhausted(VolunteerId),
    #[error("volunteer {0} is inactive")]
    VolunteerInactive(VolunteerId),
    #[error("match {0} has no volunteer assigned")]
    Unassigned(MatchId),
    #[error("portion accounting for {kind} {id} is inconsistent: {source}")]
    Ledger {
        kind: &'static str,
        id: String,
        source: PortionError,
    },
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Outcome of applying a lifecycle action to a match.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: Match,
    pub changed: bool,
}

/// Allocation request handed to [`Registry::allocate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub donation_id: DonationId,
    pub shelter_request_id: ShelterRequestId,
    pub portions: u32,
    pub distance_miles: f64,
    pub score: f64,
}

/// Courier offer handed to [`Registry::offer`].
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRequest {
    pub volunteer_id: VolunteerId,
    pub score: f64,
    pub message: String,
    pub message_source: MessageSource,
}

/// In-memory entity store. Every record sits behind its own mutex; the
/// tables themselves are only locked long enough to clone a record handle.
///
/// Lock order for multi-entity operations is match, donation, shelter
/// request, volunteer.
#[derive(Default)]
pub struct Registry {
    donations: Table<DonationId, Donation>,
    shelter_requests: Table<ShelterRequestId, ShelterRequest>,
    volunteers: Table<VolunteerId, Volunteer>,
    matches: Table<MatchId, Match>,
    donation_seq: AtomicU64,
    request_seq: AtomicU64,
    volunteer_seq: AtomicU64,
    match_seq: AtomicU64,
}

fn lock<T>(slot: &Mutex<T>) -> Result<MutexGuard<'_, T>, RegistryError> {
    slot.lock()
        .map_err(|_| RegistryError::Unavailable("entity lock poisoned".to_string()))
}

fn next_id(sequence: &AtomicU64, prefix: &str) -> String {
    let id = sequence.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{prefix}-{id:06}")
}

fn slot<K, T>(table: &Table<K, T>, id: &K, kind: &'static str) -> Result<Slot<T>, RegistryError>
where
    K: Eq + Hash + fmt::Display,
{
    let guard = table
        .read()
        .map_err(|_| RegistryError::Unavailable(format!("{kind} table poisoned")))?;
    guard
        .get(id)
        .cloned()
        .ok_or_else(|| RegistryError::not_found(kind, id))
}

fn insert<K, T>(table: &Table<K, T>, id: K, record: T, kind: &'static str) -> Result<(), RegistryError>
where
    K: Eq + Hash,
{
    let mut guard = table
        .write()
        .map_err(|_| RegistryError::Unavailable(format!("{kind} table poisoned")))?;
    guard.insert(id, Arc::new(Mutex::new(record)));
    Ok(())
}

fn handles<K, T>(table: &Table<K, T>, kind: &'static str) -> Result<Vec<Slot<T>>, RegistryError> {
    let guard = table
        .read()
        .map_err(|_| RegistryError::Unavailable(format!("{kind} table poisoned")))?;
    Ok(guard.values().cloned().collect())
}

fn snapshot<K, T: Clone>(table: &Table<K, T>, kind: &'static str) -> Result<Vec<T>, RegistryError> {
    handles(table, kind)?
        .iter()
        .map(|slot| lock(slot).map(|record| record.clone()))
        .collect()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_donation(&self, mut donation: Donation) -> Result<Donation, RegistryError> {
        donation.id = DonationId(next_id(&self.donation_seq, "don"));
        insert(&self.donations, donation.id.clone(), donation.clone(), "donation")?;
        info!(donation_id = %donation.id, portions = donation.portions.total(), "donation registered");
        Ok(donation)
    }

    pub fn insert_shelter_request(
        &self,
        mut request: ShelterRequest,
    ) -> Result<ShelterRequest, RegistryError> {
        request.id = ShelterRequestId(next_id(&self.request_seq, "req"));
        insert(
            &self.shelter_requests,
            request.id.clone(),
            request.clone(),
            "shelter request",
        )?;
        info!(
            shelter_request_id = %request.id,
            portions = request.portions.total(),
            urgency = request.urgency.label(),
            "shelter request registered"
        );
        Ok(request)
    }

    pub fn insert_volunteer(&self, mut volunteer: Volunteer) -> Result<Volunteer, RegistryError> {
        volunteer.id = VolunteerId(next_id(&self.volunteer_seq, "vol"));
        insert(&self.volunteers, volunteer.id.clone(), volunteer.clone(), "volunteer")?;
        info!(volunteer_id = %volunteer.id, vehicle = volunteer.vehicle.label(), "volunteer registered");
        Ok(volunteer)
    }

    pub fn donation(&self, id: &DonationId) -> Result<Donation, RegistryError> {
        let slot = slot(&self.donations, id, "donation")?;
        let record = lock(&slot)?;
        Ok(record.clone())
    }

    pub fn shelter_request(&self, id: &ShelterRequestId) -> Result<ShelterRequest, RegistryError> {
        let slot = slot(&self.shelter_requests, id, "shelter request")?;
        let record = lock(&slot)?;
        Ok(record.clone())
    }

    pub fn volunteer(&self, id: &VolunteerId) -> Result<Volunteer, RegistryError> {
        let slot = slot(&self.volunteers, id, "volunteer")?;
        let record = lock(&slot)?;
        Ok(record.clone())
    }

    pub fn get_match(&self, id: &MatchId) -> Result<Match, RegistryError> {
        let slot = slot(&self.matches, id, "match")?;
        let record = lock(&slot)?;
        Ok(record.clone())
    }

    /// Donations ordered by creation time, then id.
    pub fn donations(&self) -> Result<Vec<Donation>, RegistryError> {
        let mut records = snapshot(&self.donations, "donation")?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn shelter_requests(&self) -> Result<Vec<ShelterRequest>, RegistryError> {
        let mut records = snapshot(&self.shelter_requests, "shelter request")?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn volunteers(&self) -> Result<Vec<Volunteer>, RegistryError> {
        let mut records = snapshot(&self.volunteers, "volunteer")?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn matches(&self) -> Result<Vec<Match>, RegistryError> {
        let mut records = snapshot(&self.matches, "match")?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn matches_for_donation(&self, id: &DonationId) -> Result<Vec<Match>, RegistryError> {
        Ok(self
            .matches()?
            .into_iter()
            .filter(|record| &record.donation_id == id)
            .collect())
    }

    pub fn matches_for_shelter_request(
        &self,
        id: &ShelterRequestId,
    ) -> Result<Vec<Match>, RegistryError> {
        Ok(self
            .matches()?
            .into_iter()
            .filter(|record| &record.shelter_request_id == id)
            .collect())
    }

    pub fn matches_for_volunteer(&self, id: &VolunteerId) -> Result<Vec<Match>, RegistryError> {
        Ok(self
            .matches()?
            .into_iter()
            .filter(|record| record.volunteer_id.as_ref() == Some(id))
            .collect())
    }

    /// Open offers per volunteer, derived from the match table.
    pub fn outstanding_offers(&self) -> Result<HashMap<VolunteerId, u32>, RegistryError> {
        let mut counts = HashMap::new();
        for record in self.matches()? {
            if record.status != MatchStatus::OfferedToVolunteer {
                continue;
            }
            if let Some(volunteer_id) = record.volunteer_id {
                *counts.entry(volunteer_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Atomically take portions from both sides and record a proposed match.
    ///
    /// Both entity locks are held for the whole check-and-decrement, so two
    /// allocators racing for the same remaining portions cannot both win.
    pub fn allocate(
        &self,
        request: AllocationRequest,
        now: DateTime<Utc>,
    ) -> Result<Match, RegistryError> {
        let donation_slot = slot(&self.donations, &request.donation_id, "donation")?;
        let shelter_slot = slot(
            &self.shelter_requests,
            &request.shelter_request_id,
            "shelter request",
        )?;

        let mut donation = lock(&donation_slot)?;
        let mut shelter = lock(&shelter_slot)?;

        if !donation.is_matchable(now) {
            return Err(RegistryError::Closed {
                kind: "donation",
                id: donation.id.to_string(),
                status: donation.status.label(),
            });
        }
        if !shelter.is_matchable(now) {
            return Err(RegistryError::Closed {
                kind: "shelter request",
                id: shelter.id.to_string(),
                status: shelter.status.label(),
            });
        }

        donation
            .portions
            .take(request.portions)
            .map_err(|_| RegistryError::InsufficientPortions {
                kind: "donation",
                id: donation.id.to_string(),
                requested: request.portions,
                remaining: donation.portions.remaining(),
            })?;

        if shelter.portions.take(request.portions).is_err() {
            let remaining = shelter.portions.remaining();
            donation
                .portions
                .restore(request.portions)
                .map_err(|source| RegistryError::Ledger {
                    kind: "donation",
                    id: donation.id.to_string(),
                    source,
                })?;
            return Err(RegistryError::InsufficientPortions {
                kind: "shelter request",
                id: shelter.id.to_string(),
                requested: request.portions,
                remaining,
            });
        }

        donation.settle_status();
        shelter.settle_status();

        let record = Match {
            id: MatchId(next_id(&self.match_seq, "match")),
            donation_id: donation.id.clone(),
            shelter_request_id: shelter.id.clone(),
            volunteer_id: None,
            portions: request.portions,
            distance_miles: request.distance_miles,
            score: request.score,
            message: None,
            message_source: None,
            status: MatchStatus::Proposed,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = insert(&self.matches, record.id.clone(), record.clone(), "match") {
            // Undo both decrements so the entities look untouched.
            let _ = donation.portions.restore(request.portions);
            let _ = shelter.portions.restore(request.portions);
            donation.settle_status();
            shelter.settle_status();
            return Err(err);
        }

        info!(
            match_id = %record.id,
            donation_id = %record.donation_id,
            shelter_request_id = %record.shelter_request_id,
            portions = record.portions,
            donation_status = donation.status.label(),
            shelter_status = shelter.status.label(),
            "match proposed"
        );

        Ok(record)
    }

    /// Attach a courier to a proposed match.
    pub fn offer(
        &self,
        id: &MatchId,
        offer: OfferRequest,
        now: DateTime<Utc>,
    ) -> Result<Match, RegistryError> {
        let match_slot = slot(&self.matches, id, "match")?;
        let volunteer_slot = slot(&self.volunteers, &offer.volunteer_id, "volunteer")?;

        let mut record = lock(&match_slot)?;
        let next = match next_status(record.status, MatchAction::Offer)? {
            Transition::Moved(next) => next,
            Transition::Unchanged if record.volunteer_id.as_ref() == Some(&offer.volunteer_id) => {
                return Ok(record.clone());
            }
            Transition::Unchanged => {
                return Err(TransitionError::InvalidTransition {
                    from: record.status,
                    action: MatchAction::Offer,
                }
                .into());
            }
        };

        let volunteer = lock(&volunteer_slot)?;
        if !volunteer.is_active() {
            return Err(RegistryError::VolunteerInactive(volunteer.id.clone()));
        }
        if volunteer.committed_deliveries >= volunteer.max_deliveries_per_week {
            return Err(RegistryError::CapacityExhausted(volunteer.id.clone()));
        }

        record.volunteer_id = Some(volunteer.id.clone());
        record.score = offer.score;
        record.message = Some(offer.message);
        record.message_source = Some(offer.message_source);
        record.status = next;
        record.updated_at = now;

        info!(match_id = %record.id, volunteer_id = %volunteer.id, "match offered to volunteer");
        Ok(record.clone())
    }

    /// Apply a lifecycle action with all of its side effects, or none of them.
    pub fn apply(
        &self,
        id: &MatchId,
        action: MatchAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, RegistryError> {
        let match_slot = slot(&self.matches, id, "match")?;
        let mut record = lock(&match_slot)?;

        let next = match next_status(record.status, action)? {
            Transition::Moved(next) => next,
            Transition::Unchanged => {
                return Ok(TransitionOutcome {
                    record: record.clone(),
                    changed: false,
                })
            }
        };
        let previous = record.status;

        let touches_volunteer = matches!(
            action,
            MatchAction::Accept | MatchAction::ConfirmDelivery | MatchAction::Cancel
        );
        let volunteer_slot = if touches_volunteer {
            let volunteer_id = record
                .volunteer_id
                .clone()
                .ok_or_else(|| RegistryError::Unassigned(record.id.clone()))?;
            Some(slot(&self.volunteers, &volunteer_id, "volunteer")?)
        } else {
            None
        };

        let entity_slots = if action.releases_portions() {
            Some((
                slot(&self.donations, &record.donation_id, "donation")?,
                slot(
                    &self.shelter_requests,
                    &record.shelter_request_id,
                    "shelter request",
                )?,
            ))
        } else {
            None
        };

        let mut entities = match &entity_slots {
            Some((donation_slot, shelter_slot)) => {
                Some((lock(donation_slot)?, lock(shelter_slot)?))
            }
            None => None,
        };
        let mut volunteer = match &volunteer_slot {
            Some(slot) => Some(lock(slot)?),
            None => None,
        };

        if action == MatchAction::Accept {
            if let Some(volunteer) = volunteer.as_ref() {
                if volunteer.committed_deliveries >= volunteer.max_deliveries_per_week {
                    return Err(RegistryError::CapacityExhausted(volunteer.id.clone()));
                }
            }
        }

        if let Some((donation, shelter)) = entities.as_mut() {
            donation
                .portions
                .restore(record.portions)
                .map_err(|source| RegistryError::Ledger {
                    kind: "donation",
                    id: donation.id.to_string(),
                    source,
                })?;
            if let Err(source) = shelter.portions.restore(record.portions) {
                // Roll the donation back so neither side changes.
                let _ = donation.portions.take(record.portions);
                return Err(RegistryError::Ledger {
                    kind: "shelter request",
                    id: shelter.id.to_string(),
                    source,
                });
            }
            donation.settle_status();
            shelter.settle_status();
            debug!(
                match_id = %record.id,
                portions = record.portions,
                donation_remaining = donation.portions.remaining(),
                shelter_remaining = shelter.portions.remaining(),
                "portions returned"
            );
        }

        if let Some(volunteer) = volunteer.as_mut() {
            match action {
                MatchAction::Accept => volunteer.committed_deliveries += 1,
                MatchAction::ConfirmDelivery => volunteer.completed_in_window += 1,
                MatchAction::Cancel => {
                    volunteer.committed_deliveries = volunteer.committed_deliveries.saturating_sub(1)
                }
                _ => {}
            }
        }

        record.status = next;
        record.updated_at = now;

        info!(
            match_id = %record.id,
            %action,
            from = previous.label(),
            to = next.label(),
            "match transitioned"
        );

        Ok(TransitionOutcome {
            record: record.clone(),
            changed: true,
        })
    }

    pub fn withdraw_donation(
        &self,
        id: &DonationId,
        now: DateTime<Utc>,
    ) -> Result<Donation, RegistryError> {
        let slot = slot(&self.donations, id, "donation")?;
        let mut donation = lock(&slot)?;
        if donation.status.is_terminal() {
            return Err(RegistryError::Closed {
                kind: "donation",
                id: id.to_string(),
                status: donation.status.label(),
            });
        }
        donation.status = DonationStatus::Withdrawn;
        info!(donation_id = %id, at = %now, "donation withdrawn");
        Ok(donation.clone())
    }

    pub fn withdraw_shelter_request(
        &self,
        id: &ShelterRequestId,
        now: DateTime<Utc>,
    ) -> Result<ShelterRequest, RegistryError> {
        let slot = slot(&self.shelter_requests, id, "shelter request")?;
        let mut request = lock(&slot)?;
        if request.status.is_terminal() {
            return Err(RegistryError::Closed {
                kind: "shelter request",
                id: id.to_string(),
                status: request.status.label(),
            });
        }
        request.status = ShelterRequestStatus::Withdrawn;
        info!(shelter_request_id = %id, at = %now, "shelter request withdrawn");
        Ok(request.clone())
    }

    pub fn set_volunteer_status(
        &self,
        id: &VolunteerId,
        status: VolunteerStatus,
    ) -> Result<Volunteer, RegistryError> {
        let slot = slot(&self.volunteers, id, "volunteer")?;
        let mut volunteer = lock(&slot)?;
        volunteer.status = status;
        Ok(volunteer.clone())
    }

    /// Move every past-deadline, non-terminal donation and request to expired.
    pub fn expire_entities(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Vec<DonationId>, Vec<ShelterRequestId>), RegistryError> {
        let mut donations = Vec::new();
        for slot in handles(&self.donations, "donation")? {
            let mut donation = lock(&slot)?;
            if !donation.status.is_terminal() && donation.is_past_deadline(now) {
                donation.status = DonationStatus::Expired;
                donations.push(donation.id.clone());
            }
        }

        let mut requests = Vec::new();
        for slot in handles(&self.shelter_requests, "shelter request")? {
            let mut request = lock(&slot)?;
            if !request.status.is_terminal() && request.is_past_deadline(now) {
                request.status = ShelterRequestStatus::Expired;
                requests.push(request.id.clone());
            }
        }

        if !donations.is_empty() || !requests.is_empty() {
            warn!(
                donations = donations.len(),
                shelter_requests = requests.len(),
                "entities expired before being fully matched"
            );
        }

        Ok((donations, requests))
    }

    /// Advance volunteer weekly windows, releasing completed deliveries.
    pub fn roll_volunteer_windows(&self, now: DateTime<Utc>) -> Result<usize, RegistryError> {
        let week = Duration::days(7);
        let mut rolled = 0;

        for slot in handles(&self.volunteers, "volunteer")? {
            let mut volunteer = lock(&slot)?;
            if now < volunteer.window_start + week {
                continue;
            }
            while now >= volunteer.window_start + week {
                volunteer.window_start += week;
            }
            volunteer.committed_deliveries = volunteer
                .committed_deliveries
                .saturating_sub(volunteer.completed_in_window);
            volunteer.completed_in_window = 0;
            rolled += 1;
            debug!(
                volunteer_id = %volunteer.id,
                committed = volunteer.committed_deliveries,
                "volunteer window rolled"
            );
        }

        Ok(rolled)
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{Match, MatchId, MatchStatus};
use super::registry::{Registry, RegistryError};

/// Event driving a match through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    Offer,
    Accept,
    Decline,
    ExpireOffer,
    ConfirmPickup,
    ConfirmDelivery,
    Cancel,
    /// Donation or shelter deadline passed before a courier took the match.
    Lapse,
    /// Donation or shelter request was withdrawn before a courier took the match.
    Void,
}

impl MatchAction {
    pub const fn label(self) -> &'static str {
        match self {
            MatchAction::Offer => "offer",
            MatchAction::Accept => "accept",
            MatchAction::Decline => "decline",
            MatchAction::ExpireOffer => "expire offer for",
            MatchAction::ConfirmPickup => "confirm pickup for",
            MatchAction::ConfirmDelivery => "confirm delivery for",
            MatchAction::Cancel => "cancel",
            MatchAction::Lapse => "lapse",
            MatchAction::Void => "void",
        }
    }

    /// Actions whose target state hands allocated portions back to both entities.
    pub const fn releases_portions(self) -> bool {
        matches!(
            self,
            MatchAction::Decline
                | MatchAction::ExpireOffer
                | MatchAction::Cancel
                | MatchAction::Lapse
                | MatchAction::Void
        )
    }
}

impl fmt::Display for MatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a match that is {}", .from.label())]
    InvalidTransition {
        from: MatchStatus,
        action: MatchAction,
    },
}

/// Result of applying an action to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved(MatchStatus),
    /// The action already produced the current status; nothing to do.
    Unchanged,
}

pub fn next_status(
    current: MatchStatus,
    action: MatchAction,
) -> Result<Transition, TransitionError> {
    use MatchAction as A;
    use MatchStatus as S;

    let moved = match (current, action) {
        (S::Proposed, A::Offer) => S::OfferedToVolunteer,
        (S::OfferedToVolunteer, A::Accept) => S::Accepted,
        (S::OfferedToVolunteer, A::Decline) => S::Declined,
        (S::OfferedToVolunteer, A::ExpireOffer) => S::Expired,
        (S::Accepted, A::ConfirmPickup) => S::InProgress,
        (S::InProgress, A::ConfirmDelivery) => S::Completed,
        (S::Accepted | S::InProgress, A::Cancel) => S::Cancelled,
        (S::Proposed | S::OfferedToVolunteer, A::Lapse) => S::Expired,
        (S::Proposed | S::OfferedToVolunteer, A::Void) => S::Cancelled,
        (S::OfferedToVolunteer, A::Offer)
        | (S::Accepted, A::Accept)
        | (S::Declined, A::Decline)
        | (S::Expired, A::ExpireOffer | A::Lapse)
        | (S::InProgress, A::ConfirmPickup)
        | (S::Completed, A::ConfirmDelivery)
        | (S::Cancelled, A::Cancel | A::Void) => return Ok(Transition::Unchanged),
        (from, action) => return Err(TransitionError::InvalidTransition { from, action }),
    };

    Ok(Transition::Moved(moved))
}

/// Matches moved by one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub expired_offers: Vec<MatchId>,
    pub lapsed_matches: Vec<MatchId>,
    pub expired_donations: usize,
    pub expired_shelter_requests: usize,
    pub rolled_volunteer_windows: usize,
}

/// Drives matches through accept/decline/pickup/delivery/cancel and enforces
/// offer timeouts and entity deadlines on each sweep.
pub struct LifecycleManager {
    registry: Arc<Registry>,
    offer_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(registry: Arc<Registry>, offer_timeout: Duration) -> Self {
        Self {
            registry,
            offer_timeout,
        }
    }

    pub fn accept(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RegistryError> {
        self.drive(id, MatchAction::Accept, now)
    }

    pub fn decline(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RegistryError> {
        self.drive(id, MatchAction::Decline, now)
    }

    pub fn confirm_pickup(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RegistryError> {
        self.drive(id, MatchAction::ConfirmPickup, now)
    }

    pub fn confirm_delivery(
        &self,
        id: &MatchId,
        now: DateTime<Utc>,
    ) -> Result<Match, RegistryError> {
        self.drive(id, MatchAction::ConfirmDelivery, now)
    }

    pub fn cancel(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RegistryError> {
        self.drive(id, MatchAction::Cancel, now)
    }

    fn drive(
        &self,
        id: &MatchId,
        action: MatchAction,
        now: DateTime<Utc>,
    ) -> Result<Match, RegistryError> {
        let outcome = self.registry.apply(id, action, now)?;
        if !outcome.changed {
            debug!(match_id = %id, %action, "repeated action ignored");
        }
        Ok(outcome.record)
    }

    fn offer_timed_out(&self, record: &Match, now: DateTime<Utc>) -> bool {
        (now - record.updated_at)
            .to_std()
            .map(|elapsed| elapsed >= self.offer_timeout)
            .unwrap_or(false)
    }

    /// Expire stale offers, lapse matches whose entities ran out of time,
    /// expire past-deadline entities, and roll volunteer windows.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RegistryError> {
        let mut report = SweepReport::default();

        for record in self.registry.matches()? {
            if !matches!(
                record.status,
                MatchStatus::Proposed | MatchStatus::OfferedToVolunteer
            ) {
                continue;
            }

            let donation = self.registry.donation(&record.donation_id)?;
            let request = self.registry.shelter_request(&record.shelter_request_id)?;
            if donation.is_past_deadline(now) || request.is_past_deadline(now) {
                if self.apply_quietly(&record.id, MatchAction::Lapse, now)? {
                    report.lapsed_matches.push(record.id);
                }
                continue;
            }

            if record.status == MatchStatus::OfferedToVolunteer
                && self.offer_timed_out(&record, now)
                && self.apply_quietly(&record.id, MatchAction::ExpireOffer, now)?
            {
                report.expired_offers.push(record.id);
            }
        }

        let (donations, requests) = self.registry.expire_entities(now)?;
        report.expired_donations = donations.len();
        report.expired_shelter_requests = requests.len();
        report.rolled_volunteer_windows = self.registry.roll_volunteer_windows(now)?;

        info!(
            expired_offers = report.expired_offers.len(),
            lapsed = report.lapsed_matches.len(),
            expired_donations = report.expired_donations,
            expired_shelter_requests = report.expired_shelter_requests,
            rolled_windows = report.rolled_volunteer_windows,
            "expiry sweep finished"
        );

        Ok(report)
    }

    /// A concurrent accept/decline may win the race against the sweep; that
    /// is not a sweep failure.
    fn apply_quietly(
        &self,
        id: &MatchId,
        action: MatchAction,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        match self.registry.apply(id, action, now) {
            Ok(outcome) => Ok(outcome.changed),
            Err(RegistryError::Transition(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

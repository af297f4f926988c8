use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::config::MatchingConfig;
use super::domain::{
    Donation, DonationId, Match, MatchId, MatchStatus, MessageSource, ShelterRequest,
    ShelterRequestId, Volunteer, VolunteerId, VolunteerStatus,
};
use super::intake::{
    DonationSubmission, IntakeGuard, ShelterRequestSubmission, ValidationError,
    VolunteerSubmission,
};
use super::lifecycle::{LifecycleManager, MatchAction, SweepReport};
use super::matcher::{CourierAssignment, Matcher};
use super::registry::{OfferRequest, Registry, RegistryError};
use crate::collaborators::{
    analyze_or_default, compose_or_template, extract_or_heuristic, notify_all, Assisted,
    Collaborators, CourierBriefing, DeliveryReport, OutboundMessage,
};
use crate::workflows::roster::{RosterImport, RosterImportError, RosterIssue};

/// Outcome of one matching cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub proposed: Vec<MatchId>,
    pub offered: Vec<MatchId>,
    /// Proposed matches still waiting on a courier after this cycle.
    pub awaiting_courier: Vec<MatchId>,
    pub unreachable_pairs: usize,
    pub allocation_conflicts: usize,
    pub template_messages: usize,
    pub notifications: DeliveryReport,
}

/// A withdrawn entity plus the pending matches it took down with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal<T> {
    pub record: T,
    pub voided_matches: Vec<MatchId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RosterRegistration {
    pub registered: Vec<Volunteer>,
    pub issues: Vec<RosterIssue>,
}

/// Error raised by the rescue coordinator.
#[derive(Debug, thiserror::Error)]
pub enum RescueServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Roster(#[from] RosterImportError),
}

/// Service composing intake, the registry, the matcher, the lifecycle
/// manager, and the external collaborators.
pub struct RescueCoordinator {
    registry: Arc<Registry>,
    collaborators: Collaborators,
    config: MatchingConfig,
    guard: IntakeGuard,
    matcher: Matcher,
    lifecycle: LifecycleManager,
    cycle_lock: Mutex<()>,
}

impl RescueCoordinator {
    pub fn new(
        registry: Arc<Registry>,
        collaborators: Collaborators,
        config: MatchingConfig,
    ) -> Self {
        Self::with_guard(IntakeGuard::default(), registry, collaborators, config)
    }

    pub fn with_guard(
        guard: IntakeGuard,
        registry: Arc<Registry>,
        collaborators: Collaborators,
        config: MatchingConfig,
    ) -> Self {
        let matcher = Matcher::new(
            registry.clone(),
            collaborators.distance.clone(),
            config.clone(),
        );
        let lifecycle = LifecycleManager::new(registry.clone(), config.offer_timeout);

        Self {
            registry,
            collaborators,
            config,
            guard,
            matcher,
            lifecycle,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Register a donation, consulting photo analysis when an image is attached.
    pub async fn register_donation(
        &self,
        submission: DonationSubmission,
        now: DateTime<Utc>,
    ) -> Result<Assisted<Donation>, RescueServiceError> {
        let analysis = match submission.image_request() {
            Some(request) => Some(
                analyze_or_default(
                    self.collaborators.vision.as_ref(),
                    &request,
                    self.config.collaborator_timeout,
                )
                .await,
            ),
            None => None,
        };
        let fallback_used = analysis
            .as_ref()
            .map(|analysis| analysis.fallback_used)
            .unwrap_or(false);

        let donation = self.guard.donation_from_submission(
            submission,
            analysis.as_ref().map(|analysis| &analysis.value),
            now,
        )?;
        let stored = self.registry.insert_donation(donation)?;

        Ok(Assisted {
            value: stored,
            fallback_used,
        })
    }

    /// Register a shelter request, consulting text extraction when free text is attached.
    pub async fn register_shelter_request(
        &self,
        submission: ShelterRequestSubmission,
        now: DateTime<Utc>,
    ) -> Result<Assisted<ShelterRequest>, RescueServiceError> {
        let extraction = match submission.free_text() {
            Some(text) => Some(
                extract_or_heuristic(
                    self.collaborators.extraction.as_ref(),
                    text,
                    Some(submission.shelter_name.as_str()),
                    self.config.collaborator_timeout,
                )
                .await,
            ),
            None => None,
        };
        let fallback_used = extraction
            .as_ref()
            .map(|extraction| extraction.fallback_used)
            .unwrap_or(false);

        let request = self.guard.shelter_request_from_submission(
            submission,
            extraction.as_ref().map(|extraction| &extraction.value),
            now,
        )?;
        let stored = self.registry.insert_shelter_request(request)?;

        Ok(Assisted {
            value: stored,
            fallback_used,
        })
    }

    pub fn register_volunteer(
        &self,
        submission: VolunteerSubmission,
        now: DateTime<Utc>,
    ) -> Result<Volunteer, RescueServiceError> {
        let volunteer = self.guard.volunteer_from_submission(submission, now)?;
        Ok(self.registry.insert_volunteer(volunteer)?)
    }

    /// Register every valid roster entry; invalid ones join the import's issues.
    pub fn register_roster(
        &self,
        import: RosterImport,
        now: DateTime<Utc>,
    ) -> Result<RosterRegistration, RescueServiceError> {
        let mut registration = RosterRegistration {
            registered: Vec::new(),
            issues: import.issues,
        };

        for entry in import.entries {
            match self.guard.volunteer_from_submission(entry.submission, now) {
                Ok(volunteer) => registration
                    .registered
                    .push(self.registry.insert_volunteer(volunteer)?),
                Err(err) => registration.issues.push(RosterIssue {
                    line: entry.line,
                    reason: err.to_string(),
                }),
            }
        }
        registration.issues.sort_by_key(|issue| issue.line);

        info!(
            registered = registration.registered.len(),
            issues = registration.issues.len(),
            "volunteer roster imported"
        );
        Ok(registration)
    }

    pub fn set_volunteer_active(
        &self,
        id: &VolunteerId,
        active: bool,
    ) -> Result<Volunteer, RescueServiceError> {
        let status = if active {
            VolunteerStatus::Active
        } else {
            VolunteerStatus::Inactive
        };
        Ok(self.registry.set_volunteer_status(id, status)?)
    }

    pub fn withdraw_donation(
        &self,
        id: &DonationId,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal<Donation>, RescueServiceError> {
        self.registry.withdraw_donation(id, now)?;
        let voided_matches = self.void_pending(self.registry.matches_for_donation(id)?, now)?;
        Ok(Withdrawal {
            record: self.registry.donation(id)?,
            voided_matches,
        })
    }

    pub fn withdraw_shelter_request(
        &self,
        id: &ShelterRequestId,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal<ShelterRequest>, RescueServiceError> {
        self.registry.withdraw_shelter_request(id, now)?;
        let voided_matches =
            self.void_pending(self.registry.matches_for_shelter_request(id)?, now)?;
        Ok(Withdrawal {
            record: self.registry.shelter_request(id)?,
            voided_matches,
        })
    }

    fn void_pending(
        &self,
        matches: Vec<Match>,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchId>, RescueServiceError> {
        let mut voided = Vec::new();
        for record in matches {
            if !matches!(
                record.status,
                MatchStatus::Proposed | MatchStatus::OfferedToVolunteer
            ) {
                continue;
            }
            match self.registry.apply(&record.id, MatchAction::Void, now) {
                Ok(outcome) if outcome.changed => voided.push(record.id),
                Ok(_) | Err(RegistryError::Transition(_)) => {}
                Err(other) => return Err(other.into()),
            }
        }
        Ok(voided)
    }

    /// Run one full matching cycle: allocate, pick couriers, compose and send
    /// offers. Cycles never overlap.
    pub async fn run_matching_cycle(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, RescueServiceError> {
        let _cycle = self.cycle_lock.lock().await;

        let pass = self.matcher.propose(now).await?;
        let mut report = CycleReport {
            proposed: pass.proposed.iter().map(|record| record.id.clone()).collect(),
            unreachable_pairs: pass.unreachable_pairs,
            allocation_conflicts: pass.conflicts,
            ..CycleReport::default()
        };

        let mut outbound = Vec::new();
        for assignment in self.matcher.assign_couriers(now)? {
            let (briefing, contact) = match self.briefing(&assignment) {
                Ok(found) => found,
                Err(err) => {
                    warn!(match_id = %assignment.match_id, error = %err, "skipping courier offer");
                    continue;
                }
            };
            let message = compose_or_template(
                self.collaborators.messages.as_ref(),
                &briefing,
                self.config.collaborator_timeout,
            )
            .await;
            let message_source = if message.fallback_used {
                MessageSource::Template
            } else {
                MessageSource::Composed
            };

            let offer = OfferRequest {
                volunteer_id: assignment.volunteer_id.clone(),
                score: assignment.score,
                message: message.value.clone(),
                message_source,
            };
            match self.registry.offer(&assignment.match_id, offer, now) {
                Ok(record) => {
                    if message.fallback_used {
                        report.template_messages += 1;
                    }
                    outbound.push(OutboundMessage {
                        contact,
                        body: message.value,
                    });
                    report.offered.push(record.id);
                }
                Err(
                    err @ (RegistryError::CapacityExhausted(_)
                    | RegistryError::VolunteerInactive(_)
                    | RegistryError::Transition(_)),
                ) => {
                    warn!(match_id = %assignment.match_id, error = %err, "offer not made");
                }
                Err(other) => return Err(other.into()),
            }
        }

        report.notifications = notify_all(
            self.collaborators.notifier.as_ref(),
            &outbound,
            self.config.collaborator_timeout,
        )
        .await;

        report.awaiting_courier = self
            .registry
            .matches()?
            .into_iter()
            .filter(|record| record.status == MatchStatus::Proposed)
            .map(|record| record.id)
            .collect();

        info!(
            proposed = report.proposed.len(),
            offered = report.offered.len(),
            awaiting_courier = report.awaiting_courier.len(),
            templates = report.template_messages,
            notified = report.notifications.delivered,
            "matching cycle finished"
        );
        Ok(report)
    }

    fn briefing(
        &self,
        assignment: &CourierAssignment,
    ) -> Result<(CourierBriefing, String), RegistryError> {
        let record = self.registry.get_match(&assignment.match_id)?;
        let donation = self.registry.donation(&record.donation_id)?;
        let shelter = self.registry.shelter_request(&record.shelter_request_id)?;
        let volunteer = self.registry.volunteer(&assignment.volunteer_id)?;

        let briefing = CourierBriefing {
            volunteer_name: volunteer.name,
            vehicle: volunteer.vehicle.label().to_string(),
            max_distance_miles: volunteer.max_distance_miles,
            kitchen_name: donation.kitchen_name,
            pickup_address: donation.pickup.line,
            shelter_name: shelter.shelter_name,
            dropoff_address: shelter.dropoff.line,
            portions: record.portions,
            distance_miles: record.distance_miles,
            food_description: donation.description,
        };
        Ok((briefing, volunteer.contact))
    }

    pub fn accept(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RescueServiceError> {
        Ok(self.lifecycle.accept(id, now)?)
    }

    pub fn decline(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RescueServiceError> {
        Ok(self.lifecycle.decline(id, now)?)
    }

    pub fn confirm_pickup(
        &self,
        id: &MatchId,
        now: DateTime<Utc>,
    ) -> Result<Match, RescueServiceError> {
        Ok(self.lifecycle.confirm_pickup(id, now)?)
    }

    pub fn confirm_delivery(
        &self,
        id: &MatchId,
        now: DateTime<Utc>,
    ) -> Result<Match, RescueServiceError> {
        Ok(self.lifecycle.confirm_delivery(id, now)?)
    }

    pub fn cancel(&self, id: &MatchId, now: DateTime<Utc>) -> Result<Match, RescueServiceError> {
        Ok(self.lifecycle.cancel(id, now)?)
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RescueServiceError> {
        Ok(self.lifecycle.sweep(now)?)
    }

    pub fn get_match(&self, id: &MatchId) -> Result<Match, RescueServiceError> {
        Ok(self.registry.get_match(id)?)
    }
}

//! Food-rescue matching and assignment: intake, the entity registry, hard
//! eligibility constraints, soft scoring, the greedy matcher, and the match
//! lifecycle, composed behind [`RescueCoordinator`].

pub mod config;
pub mod domain;
pub mod eligibility;
pub mod intake;
pub mod lifecycle;
pub mod matcher;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use config::{MatchingConfig, ScoringWeights, UrgencyWeights, VehicleCapacities};
pub use domain::{
    Address, Donation, DonationId, DonationStatus, GeoPoint, Match, MatchId, MatchStatus,
    MatchStatusView, MessageSource, NutritionInfo, PortionLedger, ShelterRequest,
    ShelterRequestId, ShelterRequestStatus, Urgency, VehicleClass, Volunteer, VolunteerId,
    VolunteerStatus,
};
pub use eligibility::{check_courier, check_pair, courier_feasible, pair_feasible, Ineligibility};
pub use intake::{
    DonationSubmission, IntakeGuard, ShelterRequestSubmission, ValidationError,
    VolunteerSubmission,
};
pub use lifecycle::{LifecycleManager, MatchAction, SweepReport, TransitionError};
pub use matcher::{
    passed_over, plan_allocations, plan_couriers, CourierAssignment, Matcher, PassedOver,
};
pub use registry::{Registry, RegistryError};
pub use router::rescue_router;
pub use service::{CycleReport, RescueCoordinator, RescueServiceError, Withdrawal};

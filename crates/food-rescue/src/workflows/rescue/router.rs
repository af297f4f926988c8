use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use super::domain::{DonationId, MatchId, ShelterRequestId, VolunteerId};
use super::intake::{DonationSubmission, ShelterRequestSubmission, VolunteerSubmission};
use super::lifecycle::MatchAction;
use super::registry::RegistryError;
use super::service::{RescueCoordinator, RescueServiceError};
use crate::workflows::roster::{RosterImportError, RosterImporter};

/// Router builder exposing intake, matching, and match lifecycle endpoints.
pub fn rescue_router(coordinator: Arc<RescueCoordinator>) -> Router {
    Router::new()
        .route("/api/v1/donations", post(register_donation_handler))
        .route(
            "/api/v1/donations/:donation_id/withdraw",
            post(withdraw_donation_handler),
        )
        .route(
            "/api/v1/shelter-requests",
            post(register_shelter_request_handler),
        )
        .route(
            "/api/v1/shelter-requests/:request_id/withdraw",
            post(withdraw_shelter_request_handler),
        )
        .route("/api/v1/volunteers", post(register_volunteer_handler))
        .route("/api/v1/volunteers/import", post(import_roster_handler))
        .route(
            "/api/v1/volunteers/:volunteer_id/activate",
            post(activate_volunteer_handler),
        )
        .route(
            "/api/v1/volunteers/:volunteer_id/deactivate",
            post(deactivate_volunteer_handler),
        )
        .route("/api/v1/matching/run", post(run_matching_handler))
        .route("/api/v1/sweep", post(sweep_handler))
        .route("/api/v1/matches/:match_id", get(match_status_handler))
        .route("/api/v1/matches/:match_id/:action", post(match_action_handler))
        .with_state(coordinator)
}

pub(crate) fn error_response(error: RescueServiceError) -> Response {
    let status = match &error {
        RescueServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RescueServiceError::Roster(RosterImportError::Csv(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        RescueServiceError::Registry(RegistryError::NotFound { .. }) => StatusCode::NOT_FOUND,
        RescueServiceError::Registry(
            RegistryError::Transition(_)
            | RegistryError::Closed { .. }
            | RegistryError::InsufficientPortions { .. }
            | RegistryError::CapacityExhausted(_)
            | RegistryError::VolunteerInactive(_)
            | RegistryError::Unassigned(_),
        ) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn register_donation_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    axum::Json(submission): axum::Json<DonationSubmission>,
) -> Response {
    match coordinator.register_donation(submission, Utc::now()).await {
        Ok(registered) => {
            let payload = json!({
                "donation": registered.value,
                "fallback_used": registered.fallback_used,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_shelter_request_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    axum::Json(submission): axum::Json<ShelterRequestSubmission>,
) -> Response {
    match coordinator
        .register_shelter_request(submission, Utc::now())
        .await
    {
        Ok(registered) => {
            let payload = json!({
                "shelter_request": registered.value,
                "fallback_used": registered.fallback_used,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_volunteer_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    axum::Json(submission): axum::Json<VolunteerSubmission>,
) -> Response {
    match coordinator.register_volunteer(submission, Utc::now()) {
        Ok(volunteer) => (StatusCode::CREATED, axum::Json(volunteer)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn import_roster_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    body: String,
) -> Response {
    let registration = RosterImporter::from_reader(body.as_bytes())
        .map_err(RescueServiceError::from)
        .and_then(|import| coordinator.register_roster(import, Utc::now()));

    match registration {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn set_volunteer_active(
    coordinator: Arc<RescueCoordinator>,
    volunteer_id: String,
    active: bool,
) -> Response {
    match coordinator.set_volunteer_active(&VolunteerId(volunteer_id), active) {
        Ok(volunteer) => (StatusCode::OK, axum::Json(volunteer)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn activate_volunteer_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path(volunteer_id): Path<String>,
) -> Response {
    set_volunteer_active(coordinator, volunteer_id, true).await
}

pub(crate) async fn deactivate_volunteer_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path(volunteer_id): Path<String>,
) -> Response {
    set_volunteer_active(coordinator, volunteer_id, false).await
}

pub(crate) async fn withdraw_donation_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path(donation_id): Path<String>,
) -> Response {
    match coordinator.withdraw_donation(&DonationId(donation_id), Utc::now()) {
        Ok(withdrawal) => (StatusCode::OK, axum::Json(withdrawal)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn withdraw_shelter_request_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path(request_id): Path<String>,
) -> Response {
    match coordinator.withdraw_shelter_request(&ShelterRequestId(request_id), Utc::now()) {
        Ok(withdrawal) => (StatusCode::OK, axum::Json(withdrawal)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_matching_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
) -> Response {
    match coordinator.run_matching_cycle(Utc::now()).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sweep_handler(State(coordinator): State<Arc<RescueCoordinator>>) -> Response {
    match coordinator.sweep(Utc::now()) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn match_status_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path(match_id): Path<String>,
) -> Response {
    match coordinator.get_match(&MatchId(match_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

fn action_from_path(segment: &str) -> Option<MatchAction> {
    match segment {
        "accept" => Some(MatchAction::Accept),
        "decline" => Some(MatchAction::Decline),
        "pickup" => Some(MatchAction::ConfirmPickup),
        "deliver" => Some(MatchAction::ConfirmDelivery),
        "cancel" => Some(MatchAction::Cancel),
        _ => None,
    }
}

pub(crate) async fn match_action_handler(
    State(coordinator): State<Arc<RescueCoordinator>>,
    Path((match_id, action)): Path<(String, String)>,
) -> Response {
    let Some(action) = action_from_path(&action) else {
        let payload = json!({
            "error": format!("unknown match action '{action}'"),
        });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    };

    let id = MatchId(match_id);
    let now = Utc::now();
    let result = match action {
        MatchAction::Accept => coordinator.accept(&id, now),
        MatchAction::Decline => coordinator.decline(&id, now),
        MatchAction::ConfirmPickup => coordinator.confirm_pickup(&id, now),
        MatchAction::ConfirmDelivery => coordinator.confirm_delivery(&id, now),
        _ => coordinator.cancel(&id, now),
    };

    match result {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

//! Narrow interfaces to the unreliable services around the matching engine.
//!
//! Every AI-backed collaborator has a pure, offline substitute with the same
//! output shape; callers go through the `*_or_*` helpers, which apply the
//! configured timeout and fall back instead of failing. Distance is the one
//! exception: it fails closed and the pair drops out of the cycle.

pub mod distance;
pub mod extraction;
pub mod messaging;
pub mod notification;
pub mod vision;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use distance::{haversine_miles, DistanceOracle, Geocoder, HaversineDistance, KnownLocations};
pub use extraction::{extract_or_heuristic, RequestExtraction, RequestExtractor};
pub use messaging::{compose_or_template, template_message, CourierBriefing, MessageComposer};
pub use notification::{
    notify_all, DeliveryOutcome, DeliveryReport, LogNotifier, Notifier, OutboundMessage,
};
pub use vision::{analyze_or_default, FoodAnalysis, FoodImageAnalyzer, ImageAnalysisRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} timed out after {timeout_ms} ms")]
    Timeout { service: &'static str, timeout_ms: u64 },
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
    #[error("{service} returned malformed output: {reason}")]
    Malformed {
        service: &'static str,
        reason: String,
    },
}

/// A collaborator result plus whether the deterministic substitute produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assisted<T> {
    pub value: T,
    pub fallback_used: bool,
}

impl<T> Assisted<T> {
    pub fn live(value: T) -> Self {
        Self {
            value,
            fallback_used: false,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            fallback_used: true,
        }
    }
}

/// Bound a collaborator call by `timeout`.
pub async fn call_with_timeout<T, F>(
    service: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            service,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Collaborator that has no backend; every call reports it unavailable so
/// callers take their offline path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Offline {
    pub(crate) fn unavailable(service: &'static str) -> CollaboratorError {
        CollaboratorError::Unavailable {
            service,
            reason: "no backend configured".to_string(),
        }
    }
}

/// The full set of collaborators a coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub vision: Arc<dyn FoodImageAnalyzer>,
    pub extraction: Arc<dyn RequestExtractor>,
    pub messages: Arc<dyn MessageComposer>,
    pub notifier: Arc<dyn Notifier>,
    pub distance: Arc<dyn DistanceOracle>,
}

impl Collaborators {
    /// AI services offline, notifications logged, distances from known coordinates.
    pub fn offline(locations: KnownLocations) -> Self {
        Self {
            vision: Arc::new(Offline),
            extraction: Arc::new(Offline),
            messages: Arc::new(Offline),
            notifier: Arc::new(LogNotifier),
            distance: Arc::new(HaversineDistance::new(locations)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_calls_become_timeouts() {
        let result: Result<u32, _> = call_with_timeout("geocoder", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(7)
        })
        .await;

        assert_eq!(
            result,
            Err(CollaboratorError::Timeout {
                service: "geocoder",
                timeout_ms: 5
            })
        );
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = call_with_timeout("geocoder", Duration::from_secs(1), async { Ok(7u32) }).await;
        assert_eq!(result, Ok(7));
    }
}

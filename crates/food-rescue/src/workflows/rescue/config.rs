use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::VehicleClass;
use crate::config::RescueConfig;

/// Relative pull of each urgency level; must increase from low to critical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for UrgencyWeights {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 2.0,
            high: 3.0,
            critical: 4.0,
        }
    }
}

/// Soft-preference weights consumed by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub urgency: UrgencyWeights,
    pub proximity: f64,
    /// Distance at which the proximity term has fallen to half its maximum.
    pub proximity_half_distance_miles: f64,
    pub portion_fit: f64,
    pub load_balance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            urgency: UrgencyWeights::default(),
            proximity: 2.0,
            proximity_half_distance_miles: 5.0,
            portion_fit: 1.5,
            load_balance: 0.5,
        }
    }
}

/// Portions each vehicle class can carry in one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCapacities {
    pub bicycle: u32,
    pub car: u32,
    pub suv: u32,
    pub van: u32,
    pub truck: u32,
}

impl VehicleCapacities {
    pub fn portions_for(&self, vehicle: VehicleClass) -> u32 {
        match vehicle {
            VehicleClass::Bicycle => self.bicycle,
            VehicleClass::Car => self.car,
            VehicleClass::Suv => self.suv,
            VehicleClass::Van => self.van,
            VehicleClass::Truck => self.truck,
        }
    }
}

impl Default for VehicleCapacities {
    fn default() -> Self {
        Self {
            bicycle: 20,
            car: 60,
            suv: 100,
            van: 250,
            truck: 600,
        }
    }
}

/// Everything the matcher and lifecycle manager need to run a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub scoring: ScoringWeights,
    pub vehicles: VehicleCapacities,
    pub offer_timeout: Duration,
    pub collaborator_timeout: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self::from(&RescueConfig::default())
    }
}

impl From<&RescueConfig> for MatchingConfig {
    fn from(config: &RescueConfig) -> Self {
        Self {
            scoring: ScoringWeights::default(),
            vehicles: VehicleCapacities::default(),
            offer_timeout: config.offer_timeout,
            collaborator_timeout: config.collaborator_timeout,
        }
    }
}

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{call_with_timeout, CollaboratorError};
use crate::workflows::rescue::domain::{Address, GeoPoint};

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Road-agnostic distance between two addresses, in miles.
#[async_trait]
pub trait DistanceOracle: Send + Sync {
    async fn distance_miles(&self, from: &Address, to: &Address) -> Result<f64, CollaboratorError>;
}

/// Resolves an address line to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &str) -> Result<GeoPoint, CollaboratorError>;
}

pub fn haversine_miles(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

/// Great-circle distance over coordinates carried on the address, or geocoded.
pub struct HaversineDistance<G> {
    geocoder: G,
}

impl<G: Geocoder> HaversineDistance<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    async fn point_for(&self, address: &Address) -> Result<GeoPoint, CollaboratorError> {
        match address.location {
            Some(point) => Ok(point),
            None => self.geocoder.locate(&address.line).await,
        }
    }
}

#[async_trait]
impl<G: Geocoder> DistanceOracle for HaversineDistance<G> {
    async fn distance_miles(&self, from: &Address, to: &Address) -> Result<f64, CollaboratorError> {
        let origin = self.point_for(from).await?;
        let destination = self.point_for(to).await?;
        let miles = haversine_miles(origin, destination);
        if miles.is_finite() {
            Ok(miles)
        } else {
            Err(CollaboratorError::Malformed {
                service: "distance",
                reason: format!("non-finite distance between '{}' and '{}'", from.line, to.line),
            })
        }
    }
}

/// Static address book, keyed case- and whitespace-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KnownLocations {
    points: HashMap<String, GeoPoint>,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
}

fn address_key(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl KnownLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, latitude: f64, longitude: f64) -> Self {
        self.insert(address, latitude, longitude);
        self
    }

    /// Load an `Address,Latitude,Longitude` CSV export.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut locations = Self::new();
        for row in csv_reader.deserialize::<LocationRow>() {
            let row = row?;
            locations.insert(&row.address, row.latitude, row.longitude);
        }
        Ok(locations)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn insert(&mut self, address: &str, latitude: f64, longitude: f64) {
        self.points.insert(
            address_key(address),
            GeoPoint {
                latitude,
                longitude,
            },
        );
    }
}

#[async_trait]
impl Geocoder for KnownLocations {
    async fn locate(&self, address: &str) -> Result<GeoPoint, CollaboratorError> {
        self.points
            .get(&address_key(address))
            .copied()
            .ok_or_else(|| CollaboratorError::Unavailable {
                service: "geocoder",
                reason: format!("unknown address '{address}'"),
            })
    }
}

/// Distance with a timeout. Any error keeps the pair out of the cycle.
pub async fn distance_or_exclude(
    oracle: &dyn DistanceOracle,
    from: &Address,
    to: &Address,
    timeout: Duration,
) -> Result<f64, CollaboratorError> {
    call_with_timeout("distance", timeout, oracle.distance_miles(from, to)).await
}

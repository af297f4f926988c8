//! Volunteer roster import from spreadsheet CSV exports.

mod parser;

use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::workflows::rescue::domain::VehicleClass;
use crate::workflows::rescue::intake::VolunteerSubmission;

use parser::RosterRow;

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read volunteer roster: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid volunteer roster CSV: {}", err),
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// A roster row that parsed into a submission, not yet validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub line: u64,
    pub submission: VolunteerSubmission,
}

/// A roster row that could not be used, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterIssue {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RosterImport {
    pub entries: Vec<RosterEntry>,
    pub issues: Vec<RosterIssue>,
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<RosterImport, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse every row; bad rows become issues instead of failing the import.
    pub fn from_reader<R: Read>(reader: R) -> Result<RosterImport, RosterImportError> {
        let mut import = RosterImport::default();

        for parsed in parser::parse_rows(reader)? {
            match parsed.row.and_then(submission_from_row) {
                Ok(submission) => import.entries.push(RosterEntry {
                    line: parsed.line,
                    submission,
                }),
                Err(reason) => import.issues.push(RosterIssue {
                    line: parsed.line,
                    reason,
                }),
            }
        }

        Ok(import)
    }
}

fn required(value: Option<String>, column: &str) -> Result<String, String> {
    value.ok_or_else(|| format!("missing {column}"))
}

fn submission_from_row(row: RosterRow) -> Result<VolunteerSubmission, String> {
    let name = required(row.name, "Name")?;
    let contact = required(row.contact, "Contact")?;

    let vehicle_raw = required(row.vehicle, "Vehicle")?;
    let vehicle = VehicleClass::parse(&vehicle_raw)
        .ok_or_else(|| format!("unrecognised vehicle '{vehicle_raw}'"))?;

    let distance_raw = required(row.max_distance_miles, "Max Distance Miles")?;
    let max_distance_miles = distance_raw
        .parse::<f64>()
        .map_err(|_| format!("Max Distance Miles '{distance_raw}' is not a number"))?;

    let deliveries_raw = required(row.max_deliveries_per_week, "Max Deliveries Per Week")?;
    let max_deliveries_per_week = deliveries_raw
        .parse::<u32>()
        .map_err(|_| format!("Max Deliveries Per Week '{deliveries_raw}' is not a whole number"))?;

    let available_days = parser::parse_days(&required(row.available_days, "Available Days")?)?;
    let active = parser::parse_active(row.active.as_deref())?;

    Ok(VolunteerSubmission {
        name,
        contact,
        vehicle,
        max_distance_miles,
        max_deliveries_per_week,
        available_days,
        active,
    })
}

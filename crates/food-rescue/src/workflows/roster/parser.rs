use std::io::Read;

use chrono::Weekday;
use serde::{Deserialize, Deserializer};

/// One roster row before validation; every column arrives as text.
#[derive(Debug, Deserialize)]
pub(crate) struct RosterRow {
    #[serde(rename = "Name", default, deserialize_with = "empty_string_as_none")]
    pub(crate) name: Option<String>,
    #[serde(rename = "Contact", default, deserialize_with = "empty_string_as_none")]
    pub(crate) contact: Option<String>,
    #[serde(rename = "Vehicle", default, deserialize_with = "empty_string_as_none")]
    pub(crate) vehicle: Option<String>,
    #[serde(
        rename = "Max Distance Miles",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) max_distance_miles: Option<String>,
    #[serde(
        rename = "Max Deliveries Per Week",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) max_deliveries_per_week: Option<String>,
    #[serde(
        rename = "Available Days",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) available_days: Option<String>,
    #[serde(rename = "Active", default, deserialize_with = "empty_string_as_none")]
    pub(crate) active: Option<String>,
}

/// A row with the 1-based file line it came from.
#[derive(Debug)]
pub(crate) struct ParsedRow {
    pub(crate) line: u64,
    pub(crate) row: Result<RosterRow, String>,
}

pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<ParsedRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.byte_records() {
        let record = record?;
        let line = record.position().map(|position| position.line()).unwrap_or(0);
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let row = csv::StringRecord::from_byte_record(record)
            .map_err(|err| {
                format!(
                    "column {} is not valid UTF-8",
                    column_name(&headers, err.utf8_error().field())
                )
            })
            .and_then(|record| {
                record
                    .deserialize::<RosterRow>(Some(&headers))
                    .map_err(|err| err.to_string())
            });
        rows.push(ParsedRow { line, row });
    }

    Ok(rows)
}

fn column_name(headers: &csv::StringRecord, index: usize) -> String {
    headers
        .get(index)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index + 1))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

const WEEK: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

fn parse_day(token: &str) -> Option<Vec<Weekday>> {
    let token = token.to_ascii_lowercase();
    match token.as_str() {
        "daily" | "any" | "all" => return Some(WEEK.iter().map(|(_, day)| *day).collect()),
        "weekdays" => return Some(WEEK[..5].iter().map(|(_, day)| *day).collect()),
        "weekends" => return Some(vec![Weekday::Sat, Weekday::Sun]),
        _ => {}
    }
    if token.len() < 3 {
        return None;
    }
    WEEK.iter()
        .find(|(name, _)| name.starts_with(token.as_str()))
        .map(|(_, day)| vec![*day])
}

/// Split a free-form day list (`Mon; Wed`, `monday/friday`, `weekends`).
pub(crate) fn parse_days(raw: &str) -> Result<Vec<Weekday>, String> {
    let mut days = Vec::new();
    for token in raw
        .split(|c: char| c == ';' || c == ',' || c == '/' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        let parsed = parse_day(token).ok_or_else(|| format!("unrecognised day '{token}'"))?;
        for day in parsed {
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }
    Ok(days)
}

pub(crate) fn parse_active(raw: Option<&str>) -> Result<bool, String> {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(true),
        Some(value) => match value.as_str() {
            "yes" | "y" | "true" | "1" | "active" => Ok(true),
            "no" | "n" | "false" | "0" | "inactive" => Ok(false),
            _ => Err(format!("unrecognised Active value '{value}'")),
        },
    }
}

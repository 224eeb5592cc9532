// Barangay statistics
//
// Pure functions over the project list. Everything here is recomputed from
// scratch on each refresh.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One project row as served by the backend.
///
/// The backend is loose about types: ids and costs arrive as numbers or
/// strings, coordinates as numbers, numeric strings, empty strings or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    #[serde(deserialize_with = "de_lenient_u64")]
    pub id: Option<u64>,
    pub name: Option<String>,
    pub barangay: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "de_cost")]
    pub project_cost: Option<String>,
    #[serde(deserialize_with = "de_lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "de_lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "de_lenient_f64")]
    pub progress: Option<f64>,
}

impl ProjectRecord {
    pub fn status(&self) -> ProjectStatus {
        ProjectStatus::parse(self.status.as_deref().unwrap_or(""))
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    fn barangay_name(&self) -> Option<&str> {
        self.barangay.as_deref().filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    Planned,
    Ongoing,
    Completed,
    Delayed,
    Other(String),
}

impl ProjectStatus {
    /// Case-insensitive; `pending` is planned and `in_progress` is ongoing.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "planned" | "pending" => ProjectStatus::Planned,
            "ongoing" | "in_progress" => ProjectStatus::Ongoing,
            "completed" => ProjectStatus::Completed,
            "delayed" => ProjectStatus::Delayed,
            other => ProjectStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Planned => f.write_str("planned"),
            ProjectStatus::Ongoing => f.write_str("ongoing"),
            ProjectStatus::Completed => f.write_str("completed"),
            ProjectStatus::Delayed => f.write_str("delayed"),
            ProjectStatus::Other(other) => f.write_str(other),
        }
    }
}

/// Per-barangay totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStat {
    pub total_projects: u64,
    pub total_cost: f64,
    pub completed_projects: u64,
    pub ongoing_projects: u64,
    pub planned_projects: u64,
}

/// Aggregate projects by barangay. Records without a barangay are skipped;
/// statuses outside the known buckets only count towards the total.
pub fn aggregate(records: &[ProjectRecord]) -> BTreeMap<String, RegionStat> {
    let mut stats: BTreeMap<String, RegionStat> = BTreeMap::new();

    for record in records {
        let Some(barangay) = record.barangay_name() else {
            continue;
        };
        let stat = stats.entry(barangay.to_string()).or_default();

        stat.total_projects += 1;
        stat.total_cost += record.project_cost.as_deref().map(parse_cost).unwrap_or(0.0);

        match record.status() {
            ProjectStatus::Completed => stat.completed_projects += 1,
            ProjectStatus::Ongoing => stat.ongoing_projects += 1,
            ProjectStatus::Planned => stat.planned_projects += 1,
            ProjectStatus::Delayed | ProjectStatus::Other(_) => {}
        }
    }

    stats
}

/// Keep only digits and `.`, then parse. Anything unparsable is zero.
///
/// The whole cleaned string must parse: `"1.2.3"` is zero, not a prefix `1.2`.
pub fn parse_cost(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

/// Totals shown in the map's summary panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub total: u64,
    pub completed: u64,
    pub ongoing: u64,
    pub planned: u64,
    pub delayed: u64,
}

fn is_visible(record: &ProjectRecord, valid_regions: &BTreeSet<String>) -> bool {
    record.has_coordinates()
        && record
            .barangay_name()
            .is_some_and(|b| valid_regions.contains(b))
}

/// Summary over records that can actually be drawn: a barangay with a
/// boundary polygon and both coordinates present.
pub fn summarize(records: &[ProjectRecord], valid_regions: &BTreeSet<String>) -> ProjectSummary {
    let mut summary = ProjectSummary::default();
    for record in records.iter().filter(|r| is_visible(r, valid_regions)) {
        summary.total += 1;
        match record.status() {
            ProjectStatus::Completed => summary.completed += 1,
            ProjectStatus::Ongoing => summary.ongoing += 1,
            ProjectStatus::Planned => summary.planned += 1,
            ProjectStatus::Delayed => summary.delayed += 1,
            ProjectStatus::Other(_) => {}
        }
    }
    summary
}

/// Delayed projects left off the map (missing coordinates or unknown barangay).
pub fn hidden_delayed<'a>(
    records: &'a [ProjectRecord],
    valid_regions: &BTreeSet<String>,
) -> Vec<&'a ProjectRecord> {
    records
        .iter()
        .filter(|r| r.status() == ProjectStatus::Delayed && !is_visible(r, valid_regions))
        .collect()
}

/// Philippine peso, no decimals: `₱1,500`.
pub fn format_currency(amount: f64) -> String {
    let rounded = amount.round();
    let grouped = group_thousands(rounded.abs());

    if rounded < 0.0 {
        format!("-₱{grouped}")
    } else {
        format!("₱{grouped}")
    }
}

/// `1234567.0` -> `1,234,567`; fractions are rounded away.
pub(crate) fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value);
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    grouped.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Number or numeric string; empty strings, null and junk are `None`.
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn de_lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_f64(&value))
}

fn de_lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_cost<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// src/validate/report.rs

use serde::Serialize;
use std::{collections::BTreeMap, fmt};

use super::rules::Severity;
use crate::schema::FieldKey;

/// Status of one field, and of a whole company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Accepted,
    Flagged,
    Rejected,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Accepted => "accepted",
            Status::Flagged => "flagged",
            Status::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim() {
            "accepted" => Some(Status::Accepted),
            "flagged" => Some(Status::Flagged),
            "rejected" => Some(Status::Rejected),
            _ => None,
        }
    }
}

impl From<Severity> for Status {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Flag => Status::Flagged,
            Severity::Reject => Status::Rejected,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed check. Cross-field violations list every participating field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Rule id, with the data year for per-year rules.
    pub rule: String,
    pub severity: Severity,
    pub fields: Vec<FieldKey>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldVerdict {
    pub status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub fields: BTreeMap<FieldKey, FieldVerdict>,
    pub violations: Vec<Violation>,
    pub overall: Status,
}

impl ValidationReport {
    pub(crate) fn record(&mut self, violation: Violation) {
        for field in &violation.fields {
            let verdict = self.fields.entry(field.clone()).or_default();
            verdict.status = verdict.status.max(violation.severity.into());
            verdict.rules.push(violation.rule.clone());
        }
        self.overall = self.overall.max(violation.severity.into());
        self.violations.push(violation);
    }

    pub fn status_of(&self, field: &FieldKey) -> Status {
        self.fields.get(field).map_or(Status::Accepted, |v| v.status)
    }

    pub fn is_accepted(&self) -> bool {
        self.overall != Status::Rejected
    }

    pub fn fields_with(&self, status: Status) -> Vec<&FieldKey> {
        self.fields
            .iter()
            .filter(|(_, v)| v.status == status)
            .map(|(k, _)| k)
            .collect()
    }

    /// Violations of rule `id` (any year).
    pub fn violations_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations
            .iter()
            .filter(move |v| v.rule == id || v.rule.strip_prefix(id).map_or(false, |r| r.starts_with(' ')))
    }
}

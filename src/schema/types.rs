// src/schema/types.rs

use serde::{Serialize, Serializer};
use std::{borrow::Cow, collections::BTreeMap, fmt};

use crate::load::Role;
use crate::validate::ValidationReport;

/// Identifies one output field: a metric, and for year-series metrics the
/// data year it describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldKey {
    pub metric: Cow<'static, str>,
    pub year: Option<u16>,
}

impl FieldKey {
    pub fn scalar(metric: impl Into<Cow<'static, str>>) -> Self {
        Self {
            metric: metric.into(),
            year: None,
        }
    }

    pub fn yearly(metric: impl Into<Cow<'static, str>>, year: u16) -> Self {
        Self {
            metric: metric.into(),
            year: Some(year),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} {}", self.metric, year),
            None => f.write_str(&self.metric),
        }
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Number,
    Category,
    Text,
    Flag,
}

/// Target unit of a numeric field. Every reported quantity is normalised to
/// this unit before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    /// metric tonnes CO2-equivalent
    TonnesCo2e,
    MegawattHours,
    Megawatts,
    Percent,
    Year,
    Count,
}

impl Unit {
    pub fn label(self) -> &'static str {
        match self {
            Unit::TonnesCo2e => "tCO2e",
            Unit::MegawattHours => "MWh",
            Unit::Megawatts => "MW",
            Unit::Percent => "%",
            Unit::Year => "year",
            Unit::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Category(String),
    Text(String),
    Flag(bool),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Category(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Spreadsheet cell text for this value.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Category(s) | Value::Text(s) => s.clone(),
            Value::Flag(true) => "yes".to_string(),
            Value::Flag(false) => "no".to_string(),
        }
    }

    /// Cell text as written to a sheet. Text a spreadsheet would open as a
    /// formula gets a leading `'`; see [`unquote_cell`].
    pub fn to_sheet_cell(&self) -> String {
        let cell = self.to_cell();
        match self {
            Value::Number(_) => cell,
            _ if cell.starts_with(FORMULA_LEADS) => format!("'{}", cell),
            _ => cell,
        }
    }
}

/// First characters that make a spreadsheet evaluate a cell, plus the quote
/// itself so quoting stays reversible.
const FORMULA_LEADS: [char; 5] = ['=', '+', '-', '@', '\''];

/// Inverse of [`Value::to_sheet_cell`] for text: drops one leading `'`.
/// The flag is set when a quote was removed.
pub fn unquote_cell(cell: &str) -> (&str, bool) {
    match cell.strip_prefix('\'') {
        Some(rest) => (rest, true),
        None => (cell, false),
    }
}

/// Shortest exact rendering: integers without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Found,
    NotFound,
    /// Present, but outside the controlled vocabulary or not parseable as
    /// the field's type. Left for the validator to judge.
    Uncontrolled,
}

/// Where in the questionnaire set a value was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLocation {
    pub role: Role,
    pub question: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SourceLocation {
    pub fn new(role: Role, question: impl Into<Cow<'static, str>>) -> Self {
        Self {
            role,
            question: question.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.question)?;
        if let Some(label) = &self.label {
            write!(f, " [{}]", label)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedValue {
    pub field: FieldKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Source text before normalisation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    pub status: ExtractionStatus,
}

impl ExtractedValue {
    pub fn not_found(field: FieldKey) -> Self {
        Self {
            field,
            value: None,
            raw: None,
            source: None,
            status: ExtractionStatus::NotFound,
        }
    }

    pub fn found(field: FieldKey, value: Value, raw: impl Into<String>, source: SourceLocation) -> Self {
        Self {
            field,
            value: Some(value),
            raw: Some(raw.into()),
            source: Some(source),
            status: ExtractionStatus::Found,
        }
    }

    pub fn uncontrolled(field: FieldKey, value: Value, raw: impl Into<String>, source: SourceLocation) -> Self {
        Self {
            status: ExtractionStatus::Uncontrolled,
            ..Self::found(field, value, raw, source)
        }
    }

    pub fn number(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::as_number)
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// One company's composed row. Built once by the composer and never mutated;
/// a corrected rerun writes a new record into a fresh output location.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyRecord {
    pub company: String,
    pub reporting_year: u16,
    pub values: BTreeMap<FieldKey, ExtractedValue>,
    pub validation: ValidationReport,
}

impl CompanyRecord {
    pub fn new(
        company: impl Into<String>,
        reporting_year: u16,
        values: BTreeMap<FieldKey, ExtractedValue>,
        validation: ValidationReport,
    ) -> Self {
        Self {
            company: company.into(),
            reporting_year,
            values,
            validation,
        }
    }

    pub fn get(&self, field: &FieldKey) -> Option<&ExtractedValue> {
        self.values.get(field)
    }
}

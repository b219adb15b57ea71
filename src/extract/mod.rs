// src/extract/mod.rs
//
// Field extraction: every locator reads one questionnaire into a per-role
// field set, then the role sets are merged into one value per schema field.

mod emissions;
mod energy;
mod period;
mod sourcing;
mod targets;
pub mod units;
mod utilities;
pub mod vocab;

use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::error::UnitParseError;
use crate::load::{QuestionnaireDocument, QuestionnaireSet, Role};
use crate::schema::{
    schema, ExtractedValue, ExtractionStatus, FieldKey, SourceLocation, Unit, Value,
};
pub use period::{reporting_year_of, ReportingPeriod};
use units::{parse_quantity, Quantity};
use vocab::Vocabulary;

/// Output of extraction for one company: one value per schema field.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub values: BTreeMap<FieldKey, ExtractedValue>,
    /// Data year of the newest questionnaire.
    pub reporting_year: u16,
}

/// Per-document facts that steer the locators.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    /// Years the questionnaire reports on (C0.2), 1 for legacy cycles.
    pub n_years: u16,
    /// The document is the newest of the set. The utility module is read
    /// from it alone.
    pub newest: bool,
}

/// Values read from a single questionnaire.
pub(crate) struct RoleFields {
    role: Role,
    values: BTreeMap<FieldKey, ExtractedValue>,
}

impl RoleFields {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            values: BTreeMap::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn data_year(&self) -> u16 {
        self.role.data_year()
    }

    pub fn source(&self, question: &'static str, label: &str) -> SourceLocation {
        let loc = SourceLocation::new(self.role, question);
        if label.is_empty() {
            loc
        } else {
            loc.with_label(label)
        }
    }

    pub fn get(&self, key: &FieldKey) -> Option<&ExtractedValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, value: ExtractedValue) {
        self.values.insert(value.field.clone(), value);
    }

    /// Parse a numeric answer into `key`, replacing any earlier value.
    /// Returns whether anything was recorded.
    pub fn number(
        &mut self,
        key: FieldKey,
        raw: &str,
        assumed: Option<&str>,
        source: SourceLocation,
    ) -> Result<bool, UnitParseError> {
        match parse_quantity(&key.to_string(), raw, unit_of(&key), assumed)? {
            Quantity::Missing => Ok(false),
            Quantity::Number(n) => {
                self.set(ExtractedValue::found(key, Value::Number(n), raw.trim(), source));
                Ok(true)
            }
            Quantity::Prose(text) => {
                self.set(ExtractedValue::uncontrolled(key, Value::Text(text), raw.trim(), source));
                Ok(true)
            }
        }
    }

    /// Parse a numeric answer and add it to whatever `key` already holds.
    pub fn add_number(
        &mut self,
        key: FieldKey,
        raw: &str,
        assumed: Option<&str>,
        source: SourceLocation,
    ) -> Result<Option<f64>, UnitParseError> {
        match parse_quantity(&key.to_string(), raw, unit_of(&key), assumed)? {
            Quantity::Missing => Ok(None),
            Quantity::Number(n) => {
                self.accumulate(key, n, raw.trim(), source);
                Ok(Some(n))
            }
            Quantity::Prose(text) => {
                if !self.values.contains_key(&key) {
                    self.set(ExtractedValue::uncontrolled(key, Value::Text(text), raw.trim(), source));
                }
                Ok(None)
            }
        }
    }

    /// Add an already normalised amount to `key`.
    pub fn accumulate(&mut self, key: FieldKey, amount: f64, raw: &str, source: SourceLocation) {
        match self.values.get_mut(&key) {
            Some(existing) if existing.status == ExtractionStatus::Found => {
                if let Some(Value::Number(n)) = existing.value.as_mut() {
                    *n += amount;
                    let joined = match existing.raw.take() {
                        Some(prev) => format!("{} + {}", prev, raw),
                        None => raw.to_string(),
                    };
                    existing.raw = Some(joined);
                }
            }
            Some(_) => {}
            None => self.set(ExtractedValue::found(key, Value::Number(amount), raw, source)),
        }
    }

    /// Match free text against a controlled vocabulary. Unmatched answers are
    /// kept as uncontrolled text.
    pub fn category(&mut self, key: FieldKey, vocab: Vocabulary, raw: &str, source: SourceLocation) {
        if units::is_placeholder(raw) {
            return;
        }
        match vocab::classify(vocab, raw) {
            Some(term) => self.set(ExtractedValue::found(key, Value::Category(term.into()), raw.trim(), source)),
            None => {
                warn!(role = %self.role, field = %key, raw, "answer outside the controlled vocabulary");
                self.set(ExtractedValue::uncontrolled(key, Value::Category(raw.trim().into()), raw.trim(), source))
            }
        }
    }

    pub fn text(&mut self, key: FieldKey, text: &str, source: SourceLocation) {
        self.set(ExtractedValue::found(key, Value::Text(text.to_string()), text, source));
    }

    pub fn flag(&mut self, key: FieldKey, flag: bool, source: SourceLocation) {
        let raw = if flag { "present" } else { "absent" };
        self.set(ExtractedValue::found(key, Value::Flag(flag), raw, source));
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

fn unit_of(key: &FieldKey) -> Unit {
    schema()
        .metric_of(key)
        .and_then(|m| m.unit)
        .unwrap_or(Unit::Count)
}

/// Text that follows each occurrence of `label`, in order. A following text
/// that is itself one of `stops` means the answer was left empty.
pub(crate) fn answers_after<'t>(texts: &'t [String], label: &str, stops: &[&str]) -> Vec<Option<&'t str>> {
    texts
        .iter()
        .enumerate()
        .filter(|(_, t)| t.as_str() == label)
        .map(|(i, _)| {
            texts
                .get(i + 1)
                .map(String::as_str)
                .filter(|next| !stops.contains(next))
        })
        .collect()
}

/// Read every questionnaire of a company and merge the results.
///
/// Missing answers are never an error; a unit that cannot be interpreted is,
/// and aborts the company.
#[instrument(level = "debug", skip(set), fields(company = set.company()))]
pub fn extract_company(set: &QuestionnaireSet) -> Result<Extraction, UnitParseError> {
    let newest = set.newest().role();
    let mut per_role = Vec::new();

    // 1) newest first, so restated years from newer cycles are seen first
    for doc in set.iter() {
        let fields = extract_document(doc, doc.role() == newest)?;
        debug!(role = %doc.role(), values = fields.len(), "document read");
        per_role.push(fields);
    }

    // 2) cross-document warnings the locators cannot raise on their own
    utilities::check_flag_history(set);

    // 3) merge by precedence and fill the rest of the schema
    let values = merge(per_role);
    let found = values.values().filter(|v| v.is_present()).count();
    info!(
        company = set.company(),
        found,
        fields = values.len(),
        "extraction finished"
    );

    Ok(Extraction {
        values,
        reporting_year: newest.data_year(),
    })
}

fn extract_document(doc: &QuestionnaireDocument, newest: bool) -> Result<RoleFields, UnitParseError> {
    let mut out = RoleFields::new(doc.role());

    let period = period::extract(doc, newest, &mut out)?;
    let ctx = Context {
        n_years: period.map_or(1, |p| p.n_years),
        newest,
    };

    emissions::extract(doc, &ctx, &mut out)?;
    energy::extract(doc, &ctx, &mut out)?;
    sourcing::extract(doc, &ctx, &mut out)?;
    utilities::extract(doc, &ctx, &mut out)?;
    targets::extract(doc, &ctx, &mut out)?;
    Ok(out)
}

/// Year-series fields take the questionnaire whose data year equals the
/// field year; restatements only fill gaps. Scalar fields keep the first
/// (newest) answer.
fn merge(per_role: Vec<RoleFields>) -> BTreeMap<FieldKey, ExtractedValue> {
    let schema = schema();
    let mut merged: BTreeMap<FieldKey, ExtractedValue> = BTreeMap::new();

    for fields in per_role {
        let own_year = fields.data_year();
        for (key, value) in fields.values {
            if !schema.contains(&key) {
                debug!(field = %key, role = %fields.role, "outside the schema, dropped");
                continue;
            }
            match key.year {
                Some(year) if year == own_year => {
                    if let Some(previous) = merged.get(&key) {
                        if previous.value != value.value {
                            debug!(field = %key, restated = ?previous.raw, own = ?value.raw, "restatement superseded");
                        }
                    }
                    merged.insert(key, value);
                }
                _ => {
                    merged.entry(key).or_insert(value);
                }
            }
        }
    }

    for key in schema.fields() {
        merged
            .entry(key.clone())
            .or_insert_with(|| ExtractedValue::not_found(key.clone()));
    }
    merged
}

// src/validate/mod.rs
//
// Applies the static rule set to one company's values. Validation never
// touches the values themselves; outcomes are data, not errors.

pub mod report;
pub mod rules;

pub use report::{FieldVerdict, Status, ValidationReport, Violation};
pub use rules::{cross_field_instances, rules, RuleInstance, Severity, ValidationRule};

use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::schema::fields::REPORTING_YEAR;
use crate::schema::{format_number, schema, CompanyRecord, ExtractedValue, FieldKey, Value};
use rules::Check;

/// Relative tolerance for sum-to-total checks.
pub const DEFAULT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    sum_tolerance: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            sum_tolerance: DEFAULT_SUM_TOLERANCE,
        }
    }
}

impl Validator {
    pub fn new(sum_tolerance: f64) -> Self {
        Self { sum_tolerance }
    }

    pub fn sum_tolerance(&self) -> f64 {
        self.sum_tolerance
    }

    pub fn validate_record(&self, record: &CompanyRecord) -> ValidationReport {
        self.validate(&record.values, record.reporting_year)
    }

    /// Run every rule over `values`. `reporting_year` is the data year of the
    /// newest questionnaire.
    #[instrument(level = "debug", skip(self, values), fields(fields = values.len()))]
    pub fn validate(&self, values: &BTreeMap<FieldKey, ExtractedValue>, reporting_year: u16) -> ValidationReport {
        let mut report = ValidationReport::default();
        for key in values.keys() {
            report.fields.entry(key.clone()).or_default();
        }

        // 1) single-field rules
        for rule in rules::single_field_rules() {
            for violation in self.single(rule, values, reporting_year) {
                report.record(violation);
            }
        }

        // 2) cross-field rules
        for inst in rules::cross_field_instances() {
            if let Some(violation) = self.cross(inst, values, reporting_year) {
                report.record(violation);
            }
        }

        debug!(overall = %report.overall, violations = report.violations.len(), "validated");
        report
    }

    fn single(
        &self,
        rule: &'static ValidationRule,
        values: &BTreeMap<FieldKey, ExtractedValue>,
        reporting_year: u16,
    ) -> Vec<Violation> {
        let violation = |field: &FieldKey, message: String| Violation {
            rule: rule.id.to_string(),
            severity: rule.severity,
            fields: vec![field.clone()],
            message,
        };

        match &rule.check {
            Check::Required { metric } => {
                let key = match schema().metric(metric) {
                    Some(m) if m.series => FieldKey::yearly(*metric, reporting_year),
                    _ => FieldKey::scalar(*metric),
                };
                match values.get(&key) {
                    Some(v) if v.is_present() => Vec::new(),
                    _ => vec![violation(&key, format!("{} is missing", key))],
                }
            }
            Check::Absent { metric } => values
                .values()
                .filter(|v| v.field.metric() == *metric && v.is_present())
                .map(|v| violation(&v.field, format!("{} needs checking: {}", v.field, cell(v))))
                .collect(),
            Check::NumericType(sel) => values
                .values()
                .filter(|v| sel.matches(&v.field))
                .filter(|v| matches!(&v.value, Some(val) if val.as_number().is_none()))
                .map(|v| violation(&v.field, format!("{} is not a number: {}", v.field, cell(v))))
                .collect(),
            Check::Range { fields, min, max } => values
                .values()
                .filter(|v| fields.matches(&v.field))
                .filter_map(|v| v.number().map(|n| (v, n)))
                .filter(|(_, n)| n < min || n > max)
                .map(|(v, n)| {
                    violation(
                        &v.field,
                        format!("{} = {} outside {}..={}", v.field, format_number(n), bound(*min), bound(*max)),
                    )
                })
                .collect(),
            Check::Vocabulary { fields, terms } => values
                .values()
                .filter(|v| fields.matches(&v.field))
                .filter_map(|v| v.value.as_ref().and_then(Value::as_str).map(|s| (v, s)))
                .filter(|(_, s)| !terms.iter().any(|t| t == s))
                .map(|(v, s)| violation(&v.field, format!("{} `{}` is not a known term", v.field, s)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn cross(
        &self,
        inst: &RuleInstance,
        values: &BTreeMap<FieldKey, ExtractedValue>,
        reporting_year: u16,
    ) -> Option<Violation> {
        let num = |i: usize| inst.fields.get(i).and_then(|k| values.get(k)).and_then(ExtractedValue::number);
        let present = |i: usize| {
            inst.fields
                .get(i)
                .and_then(|k| values.get(k))
                .map_or(false, ExtractedValue::is_present)
        };
        let rule = inst.rule;

        let message = match &rule.check {
            Check::YearOrder { strict, .. } => {
                let (earlier, later) = (num(0)?, num(1)?);
                let ok = if *strict { later > earlier } else { later >= earlier };
                if ok {
                    return None;
                }
                format!(
                    "{} {} is {} {} {}",
                    inst.fields[1],
                    format_number(later),
                    if *strict { "not after" } else { "before" },
                    inst.fields[0],
                    format_number(earlier)
                )
            }
            Check::SumEquals { parts, .. } => {
                let total = num(parts.len())?;
                let given: Vec<f64> = (0..parts.len()).filter_map(num).collect();
                if given.is_empty() {
                    return None;
                }
                let sum: f64 = given.iter().sum();
                if (sum - total).abs() <= self.sum_tolerance * total.abs().max(1.0) {
                    return None;
                }
                format!(
                    "{} = {} but its parts sum to {}",
                    inst.fields[parts.len()],
                    format_number(total),
                    format_number(sum)
                )
            }
            Check::SumAtMost { parts, .. } => {
                let total = num(parts.len())?;
                let sum: f64 = (0..parts.len()).filter_map(num).sum();
                if sum <= total * (1.0 + self.sum_tolerance) {
                    return None;
                }
                format!(
                    "parts sum to {}, above {} = {}",
                    format_number(sum),
                    inst.fields[parts.len()],
                    format_number(total)
                )
            }
            Check::AtLeast { .. } => {
                let (larger, smaller) = (num(0)?, num(1)?);
                if larger >= smaller {
                    return None;
                }
                format!(
                    "{} = {} is below {} = {}",
                    inst.fields[0],
                    format_number(larger),
                    inst.fields[1],
                    format_number(smaller)
                )
            }
            Check::PairedPresence { .. } => {
                if present(0) == present(1) {
                    return None;
                }
                let (given, missing) = if present(0) { (0, 1) } else { (1, 0) };
                format!("{} given without {}", inst.fields[given], inst.fields[missing])
            }
            Check::ReportingYearMatchesCycle => {
                let year = num(0)?;
                if year == f64::from(reporting_year) {
                    return None;
                }
                format!(
                    "{} {} differs from the newest questionnaire's data year {}",
                    REPORTING_YEAR,
                    format_number(year),
                    reporting_year
                )
            }
            _ => return None,
        };

        Some(Violation {
            rule: inst.name(),
            severity: rule.severity,
            fields: inst.fields.clone(),
            message,
        })
    }
}

fn cell(v: &ExtractedValue) -> String {
    v.value.as_ref().map(Value::to_cell).unwrap_or_default()
}

fn bound(b: f64) -> String {
    if b.is_infinite() {
        String::new()
    } else {
        format_number(b)
    }
}

/// Validate with the default settings.
pub fn validate(values: &BTreeMap<FieldKey, ExtractedValue>, reporting_year: u16) -> ValidationReport {
    Validator::default().validate(values, reporting_year)
}

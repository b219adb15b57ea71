// src/validate/rules.rs
//
// The static rule set. Single-field rules run first, cross-field rules after.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::borrow::Cow;

use crate::extract::vocab;
use crate::schema::fields::*;
use crate::schema::{schema, FieldKey, Unit, ValueKind, DATA_YEARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Flag,
    Reject,
}

/// Which fields a single-field rule applies to.
#[derive(Debug, Clone)]
pub enum Selector {
    Kind(ValueKind),
    Unit(Unit),
    Metrics(Vec<Cow<'static, str>>),
}

impl Selector {
    fn metrics<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        Selector::Metrics(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, key: &FieldKey) -> bool {
        match self {
            Selector::Kind(kind) => schema().metric_of(key).map_or(false, |m| m.kind == *kind),
            Selector::Unit(unit) => schema().metric_of(key).map_or(false, |m| m.unit == Some(*unit)),
            Selector::Metrics(names) => names.iter().any(|n| n == key.metric()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Check {
    /// A numeric field holds something that is not a number.
    NumericType(Selector),
    /// A number lies outside `min..=max`.
    Range { fields: Selector, min: f64, max: f64 },
    /// A category outside the controlled terms.
    Vocabulary { fields: Selector, terms: Vec<&'static str> },
    /// The field must be present; for series metrics, at the reporting year.
    Required { metric: &'static str },
    /// The field should be empty; anything in it needs a check.
    Absent { metric: &'static str },

    /// `later` must come after `earlier` (or equal it when not strict).
    YearOrder { earlier: &'static str, later: &'static str, strict: bool },
    /// `total` equals the sum of `parts` within the validator's tolerance.
    SumEquals { parts: Vec<Cow<'static, str>>, total: &'static str },
    /// `larger >= smaller`.
    AtLeast { larger: &'static str, smaller: &'static str },
    /// Both present or both absent.
    PairedPresence { a: &'static str, b: &'static str },
    /// The sum of `parts` does not exceed `total`.
    SumAtMost { parts: Vec<Cow<'static, str>>, total: &'static str },
    /// `reporting year` equals the data year of the newest questionnaire.
    ReportingYearMatchesCycle,
}

impl Check {
    pub fn is_cross_field(&self) -> bool {
        !matches!(
            self,
            Check::NumericType(_)
                | Check::Range { .. }
                | Check::Vocabulary { .. }
                | Check::Required { .. }
                | Check::Absent { .. }
        )
    }

    /// Metrics a cross-field check reads.
    pub fn metrics(&self) -> Vec<Cow<'static, str>> {
        match self {
            Check::YearOrder { earlier, later, .. } => vec![(*earlier).into(), (*later).into()],
            Check::SumEquals { parts, total } | Check::SumAtMost { parts, total } => {
                let mut m = parts.clone();
                m.push((*total).into());
                m
            }
            Check::AtLeast { larger, smaller } => vec![(*larger).into(), (*smaller).into()],
            Check::PairedPresence { a, b } => vec![(*a).into(), (*b).into()],
            Check::ReportingYearMatchesCycle => vec![REPORTING_YEAR.into()],
            Check::Required { metric } | Check::Absent { metric } => vec![(*metric).into()],
            Check::NumericType(_) | Check::Range { .. } | Check::Vocabulary { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub id: &'static str,
    pub severity: Severity,
    pub check: Check,
}

impl ValidationRule {
    fn new(id: &'static str, severity: Severity, check: Check) -> Self {
        Self { id, severity, check }
    }

    /// Concrete applications of a cross-field rule: one per data year for
    /// series metrics, a single one otherwise.
    pub fn instances(&'static self) -> Vec<RuleInstance> {
        let metrics = self.check.metrics();
        let series = metrics
            .first()
            .and_then(|m| schema().metric(m))
            .map_or(false, |m| m.series);

        if series {
            DATA_YEARS
                .map(|year| RuleInstance {
                    rule: self,
                    year: Some(year),
                    fields: metrics.iter().map(|m| FieldKey::yearly(m.clone(), year)).collect(),
                })
                .collect()
        } else {
            vec![RuleInstance {
                rule: self,
                year: None,
                fields: metrics.into_iter().map(FieldKey::scalar).collect(),
            }]
        }
    }
}

/// A cross-field rule bound to concrete fields.
#[derive(Debug, Clone)]
pub struct RuleInstance {
    pub rule: &'static ValidationRule,
    pub year: Option<u16>,
    pub fields: Vec<FieldKey>,
}

impl RuleInstance {
    /// Column name in the workbook, e.g. `fuel-total-matches-parts 2019`.
    pub fn name(&self) -> String {
        match self.year {
            Some(year) => format!("{} {}", self.rule.id, year),
            None => self.rule.id.to_string(),
        }
    }
}

/// Largest plausible annual Scope 1/2/3 figure for a single company.
pub const EMISSIONS_CEILING: f64 = 2e9;
/// Largest plausible annual energy figure, in MWh.
pub const ENERGY_CEILING: f64 = 5e9;

static RULES: Lazy<Vec<ValidationRule>> = Lazy::new(|| {
    use Severity::*;

    let instruments: Vec<Cow<'static, str>> = SOURCING_INSTRUMENTS
        .iter()
        .map(|c| Cow::Owned(sourcing_metric(c)))
        .collect();

    vec![
        // single field
        ValidationRule::new("numeric-type", Reject, Check::NumericType(Selector::Kind(ValueKind::Number))),
        ValidationRule::new(
            "emissions-non-negative",
            Reject,
            Check::Range { fields: Selector::Unit(Unit::TonnesCo2e), min: 0.0, max: f64::INFINITY },
        ),
        ValidationRule::new(
            "emissions-plausible",
            Flag,
            Check::Range { fields: Selector::Unit(Unit::TonnesCo2e), min: f64::NEG_INFINITY, max: EMISSIONS_CEILING },
        ),
        ValidationRule::new(
            "energy-non-negative",
            Reject,
            Check::Range { fields: Selector::Unit(Unit::MegawattHours), min: 0.0, max: f64::INFINITY },
        ),
        ValidationRule::new(
            "energy-plausible",
            Flag,
            Check::Range { fields: Selector::Unit(Unit::MegawattHours), min: f64::NEG_INFINITY, max: ENERGY_CEILING },
        ),
        ValidationRule::new(
            "capacity-non-negative",
            Reject,
            Check::Range { fields: Selector::Unit(Unit::Megawatts), min: 0.0, max: f64::INFINITY },
        ),
        ValidationRule::new(
            "percent-range",
            Reject,
            Check::Range { fields: Selector::Unit(Unit::Percent), min: 0.0, max: 100.0 },
        ),
        ValidationRule::new(
            "year-range",
            Reject,
            Check::Range { fields: Selector::Unit(Unit::Year), min: 1990.0, max: 2100.0 },
        ),
        ValidationRule::new(
            "reporting-years-range",
            Reject,
            Check::Range { fields: Selector::metrics([REPORTING_YEARS]), min: 1.0, max: 4.0 },
        ),
        ValidationRule::new(
            "methodology-vocabulary",
            Flag,
            Check::Vocabulary { fields: Selector::metrics([METHODOLOGY]), terms: vocab::terms(vocab::METHODOLOGY) },
        ),
        ValidationRule::new(
            "verification-vocabulary",
            Flag,
            Check::Vocabulary { fields: Selector::metrics(VERIFICATION), terms: vocab::terms(vocab::VERIFICATION) },
        ),
        ValidationRule::new(
            "heating-value-vocabulary",
            Flag,
            Check::Vocabulary { fields: Selector::metrics([HEATING_VALUE]), terms: vocab::terms(vocab::HEATING_VALUE) },
        ),
        ValidationRule::new(
            "target-scope-vocabulary",
            Flag,
            Check::Vocabulary { fields: Selector::metrics([TARGET_SCOPE]), terms: vocab::terms(vocab::TARGET_SCOPE) },
        ),
        ValidationRule::new("scope1-required", Flag, Check::Required { metric: S1 }),
        ValidationRule::new("reporting-period-required", Flag, Check::Required { metric: REPORTING_START }),
        ValidationRule::new("sourcing-classified", Flag, Check::Absent { metric: S2MB_UNCLASSIFIED }),
        // cross field
        ValidationRule::new(
            "target-year-after-base-year",
            Reject,
            Check::YearOrder { earlier: TARGET_BASE_YEAR, later: TARGET_YEAR, strict: true },
        ),
        ValidationRule::new(
            "target-start-not-before-base",
            Flag,
            Check::YearOrder { earlier: TARGET_BASE_YEAR, later: TARGET_START_YEAR, strict: false },
        ),
        ValidationRule::new(
            "fuel-total-matches-parts",
            Flag,
            Check::SumEquals { parts: vec![CR_FUEL.into(), CNR_FUEL.into()], total: CT_FUEL },
        ),
        ValidationRule::new(
            "electricity-total-matches-parts",
            Flag,
            Check::SumEquals { parts: vec![CR_ELECTRICITY.into(), CNR_ELECTRICITY.into()], total: CT_ELECTRICITY },
        ),
        ValidationRule::new(
            "hsc-total-matches-parts",
            Flag,
            Check::SumEquals { parts: vec![CR_HSC.into(), CNR_HSC.into()], total: CT_HSC },
        ),
        ValidationRule::new(
            "energy-total-matches-parts",
            Flag,
            Check::SumEquals { parts: vec![CR_ENERGY.into(), CNR_ENERGY.into()], total: CT_ENERGY },
        ),
        ValidationRule::new(
            "electricity-gross-covers-self",
            Flag,
            Check::AtLeast { larger: GT_GROSS_ELECTRICITY, smaller: GT_SELF_ELECTRICITY },
        ),
        ValidationRule::new(
            "electricity-gross-covers-renewable",
            Flag,
            Check::AtLeast { larger: GT_GROSS_ELECTRICITY, smaller: GR_GROSS_ELECTRICITY },
        ),
        ValidationRule::new(
            "renewable-electricity-gross-covers-self",
            Flag,
            Check::AtLeast { larger: GR_GROSS_ELECTRICITY, smaller: GR_SELF_ELECTRICITY },
        ),
        ValidationRule::new(
            "hsc-gross-covers-self",
            Flag,
            Check::AtLeast { larger: GT_GROSS_HSC, smaller: GT_SELF_HSC },
        ),
        ValidationRule::new(
            "hsc-gross-covers-renewable",
            Flag,
            Check::AtLeast { larger: GT_GROSS_HSC, smaller: GR_GROSS_HSC },
        ),
        ValidationRule::new("scope2-paired", Flag, Check::PairedPresence { a: S2_LB, b: S2_MB }),
        ValidationRule::new(
            "sourcing-within-total",
            Flag,
            Check::SumAtMost { parts: instruments, total: S2MB_TOTAL },
        ),
        ValidationRule::new("reporting-year-matches-cycle", Flag, Check::ReportingYearMatchesCycle),
    ]
});

/// The whole static rule set, single-field rules first.
pub fn rules() -> &'static [ValidationRule] {
    &RULES
}

pub fn single_field_rules() -> impl Iterator<Item = &'static ValidationRule> {
    rules().iter().filter(|r| !r.check.is_cross_field())
}

pub fn cross_field_rules() -> impl Iterator<Item = &'static ValidationRule> {
    rules().iter().filter(|r| r.check.is_cross_field())
}

static INSTANCES: Lazy<Vec<RuleInstance>> =
    Lazy::new(|| cross_field_rules().flat_map(ValidationRule::instances).collect());

/// Every cross-field rule instance, in rule order.
pub fn cross_field_instances() -> &'static [RuleInstance] {
    &INSTANCES
}

pub fn rule(id: &str) -> Option<&'static ValidationRule> {
    rules().iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = rules().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), rules().len());
    }

    #[test]
    fn single_field_rules_come_first() {
        let first_cross = rules().iter().position(|r| r.check.is_cross_field()).unwrap();
        assert!(rules()[first_cross..].iter().all(|r| r.check.is_cross_field()));
    }

    #[test]
    fn series_rules_expand_per_year() {
        let fuel = rule("fuel-total-matches-parts").unwrap().instances();
        assert_eq!(fuel.len(), DATA_YEARS.count());
        assert_eq!(fuel[0].name(), "fuel-total-matches-parts 2015");
        assert_eq!(fuel[0].fields[2], FieldKey::yearly(CT_FUEL, 2015));

        let target = rule("target-year-after-base-year").unwrap().instances();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].name(), "target-year-after-base-year");
    }

    #[test]
    fn every_rule_field_is_in_the_schema() {
        for inst in cross_field_instances() {
            for f in &inst.fields {
                assert!(schema().contains(f), "{}", f);
            }
        }
    }
}
